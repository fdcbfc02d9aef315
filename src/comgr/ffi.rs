//! Raw bindings to `libamd_comgr`, resolved at runtime.
//!
//! Only the entry points the pipeline needs are bound. Enum values follow
//! the comgr 2.x headers shipped with ROCm 6.

use libloading::{Library, Symbol};
use std::ffi::{c_char, c_int};
use std::path::{Path, PathBuf};

pub type Status = c_int;

pub const STATUS_SUCCESS: Status = 0;
pub const STATUS_ERROR: Status = 1;
pub const STATUS_ERROR_INVALID_ARGUMENT: Status = 2;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawData {
    pub handle: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawDataSet {
    pub handle: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawActionInfo {
    pub handle: u64,
}

/// `amd_comgr_data_kind_t`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    Source = 0x1,
    Log = 0x5,
    Bitcode = 0x6,
    Relocatable = 0x7,
    Executable = 0x8,
}

/// `amd_comgr_language_t`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Hip = 0x4,
}

/// `amd_comgr_action_kind_t`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    CodegenBcToRelocatable = 0x6,
    LinkRelocatableToExecutable = 0x9,
    AssembleSourceToRelocatable = 0xA,
    CompileSourceWithDeviceLibsToBc = 0xF,
}

impl ActionKind {
    /// Human readable stage name used in errors and logs.
    pub fn stage_name(self) -> &'static str {
        match self {
            ActionKind::CodegenBcToRelocatable => "codegen bitcode to relocatable",
            ActionKind::LinkRelocatableToExecutable => "link relocatable to executable",
            ActionKind::AssembleSourceToRelocatable => "assemble source to relocatable",
            ActionKind::CompileSourceWithDeviceLibsToBc => "compile source to bitcode",
        }
    }
}

type StatusStringFn = unsafe extern "C" fn(Status, *mut *const c_char) -> Status;
type CreateDataFn = unsafe extern "C" fn(DataKind, *mut RawData) -> Status;
type ReleaseDataFn = unsafe extern "C" fn(RawData) -> Status;
type SetDataFn = unsafe extern "C" fn(RawData, usize, *const c_char) -> Status;
type SetDataNameFn = unsafe extern "C" fn(RawData, *const c_char) -> Status;
type GetDataFn = unsafe extern "C" fn(RawData, *mut usize, *mut c_char) -> Status;
type CreateDataSetFn = unsafe extern "C" fn(*mut RawDataSet) -> Status;
type DestroyDataSetFn = unsafe extern "C" fn(RawDataSet) -> Status;
type DataSetAddFn = unsafe extern "C" fn(RawDataSet, RawData) -> Status;
type ActionDataCountFn = unsafe extern "C" fn(RawDataSet, DataKind, *mut usize) -> Status;
type ActionDataGetDataFn = unsafe extern "C" fn(RawDataSet, DataKind, usize, *mut RawData) -> Status;
type CreateActionInfoFn = unsafe extern "C" fn(*mut RawActionInfo) -> Status;
type DestroyActionInfoFn = unsafe extern "C" fn(RawActionInfo) -> Status;
type SetIsaNameFn = unsafe extern "C" fn(RawActionInfo, *const c_char) -> Status;
type SetLanguageFn = unsafe extern "C" fn(RawActionInfo, Language) -> Status;
type SetOptionListFn = unsafe extern "C" fn(RawActionInfo, *const *const c_char, usize) -> Status;
type SetLoggingFn = unsafe extern "C" fn(RawActionInfo, bool) -> Status;
type DoActionFn = unsafe extern "C" fn(ActionKind, RawActionInfo, RawDataSet, RawDataSet) -> Status;

/// Resolved comgr entry points.
///
/// The function pointers stay valid for as long as `_library` is loaded,
/// which is the lifetime of this struct. Tables with no library point at
/// functions linked into this binary.
pub struct ComgrApi {
    pub status_string: StatusStringFn,
    pub create_data: CreateDataFn,
    pub release_data: ReleaseDataFn,
    pub set_data: SetDataFn,
    pub set_data_name: SetDataNameFn,
    pub get_data: GetDataFn,
    pub create_data_set: CreateDataSetFn,
    pub destroy_data_set: DestroyDataSetFn,
    pub data_set_add: DataSetAddFn,
    pub action_data_count: ActionDataCountFn,
    pub action_data_get_data: ActionDataGetDataFn,
    pub create_action_info: CreateActionInfoFn,
    pub destroy_action_info: DestroyActionInfoFn,
    pub action_info_set_isa_name: SetIsaNameFn,
    pub action_info_set_language: SetLanguageFn,
    pub action_info_set_option_list: SetOptionListFn,
    pub action_info_set_logging: SetLoggingFn,
    pub do_action: DoActionFn,
    pub(super) _library: Option<Library>,
}

fn resolve<T: Copy>(library: &Library, name: &str) -> Result<T, String> {
    let symbol_name = format!("{name}\0");
    // SAFETY: every caller pairs `name` with the signature declared in amd_comgr.h.
    let symbol: Symbol<T> = unsafe { library.get(symbol_name.as_bytes()) }
        .map_err(|e| format!("missing symbol {}: {}", name, e))?;
    Ok(*symbol)
}

impl ComgrApi {
    /// Load comgr from `path` and resolve every entry point.
    pub fn open(path: &Path) -> Result<Self, String> {
        // SAFETY: loading comgr runs its static initializers, which have no
        // preconditions on the host process.
        let library = unsafe { Library::new(path) }
            .map_err(|e| format!("{}: {}", path.display(), e))?;

        Ok(Self {
            status_string: resolve(&library, "amd_comgr_status_string")?,
            create_data: resolve(&library, "amd_comgr_create_data")?,
            release_data: resolve(&library, "amd_comgr_release_data")?,
            set_data: resolve(&library, "amd_comgr_set_data")?,
            set_data_name: resolve(&library, "amd_comgr_set_data_name")?,
            get_data: resolve(&library, "amd_comgr_get_data")?,
            create_data_set: resolve(&library, "amd_comgr_create_data_set")?,
            destroy_data_set: resolve(&library, "amd_comgr_destroy_data_set")?,
            data_set_add: resolve(&library, "amd_comgr_data_set_add")?,
            action_data_count: resolve(&library, "amd_comgr_action_data_count")?,
            action_data_get_data: resolve(&library, "amd_comgr_action_data_get_data")?,
            create_action_info: resolve(&library, "amd_comgr_create_action_info")?,
            destroy_action_info: resolve(&library, "amd_comgr_destroy_action_info")?,
            action_info_set_isa_name: resolve(&library, "amd_comgr_action_info_set_isa_name")?,
            action_info_set_language: resolve(&library, "amd_comgr_action_info_set_language")?,
            action_info_set_option_list: resolve(&library, "amd_comgr_action_info_set_option_list")?,
            action_info_set_logging: resolve(&library, "amd_comgr_action_info_set_logging")?,
            do_action: resolve(&library, "amd_comgr_do_action")?,
            _library: Some(library),
        })
    }
}

/// Library paths tried, in order, when no explicit path is configured.
pub fn candidate_paths(rocm: &Path) -> Vec<PathBuf> {
    let lib = rocm.join("lib");
    vec![
        lib.join("libamd_comgr.so"),
        lib.join("libamd_comgr.so.2"),
        PathBuf::from("libamd_comgr.so"),
        PathBuf::from("libamd_comgr.so.2"),
    ]
}
