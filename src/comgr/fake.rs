//! In-process comgr entry point table for unit tests.
//!
//! Mimics comgr's reference counting closely enough to catch leaks and double
//! releases at the C boundary. Every native call is recorded in a per-thread
//! [`FakeState`], so tests running in parallel never see each other's objects.
//! Actions do no compilation: they check their input kind and add a log and a
//! placeholder product to the output set.

use super::ffi::{
    ActionKind, ComgrApi, DataKind, Language, RawActionInfo, RawData, RawDataSet, Status, STATUS_ERROR,
    STATUS_ERROR_INVALID_ARGUMENT, STATUS_SUCCESS,
};
use super::Comgr;
use crate::core::Config;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{c_char, CStr};
use std::path::PathBuf;

/// Path the fake table is registered under.
pub(crate) const FAKE_LIBRARY: &str = "/fake/rocm/lib/libamd_comgr.so";

const STATUS_TEXT: &[u8] = b"fake comgr status\0";

/// A destroyed set or options bag, in destruction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Teardown {
    Set(u64),
    Info(u64),
}

struct FakeData {
    kind: DataKind,
    bytes: Vec<u8>,
    refs: usize,
}

#[derive(Default)]
pub(crate) struct FakeState {
    next_handle: u64,
    data: HashMap<u64, FakeData>,
    sets: HashMap<u64, Vec<u64>>,
    infos: HashMap<u64, Vec<String>>,
    fail_at: Option<ActionKind>,
    silent_failure: bool,
    /// References handed to the caller by `create_data` and `action_data_get_data`.
    pub(crate) data_acquired: usize,
    pub(crate) data_released: usize,
    pub(crate) sets_created: Vec<u64>,
    pub(crate) infos_created: Vec<u64>,
    pub(crate) teardown: Vec<Teardown>,
    /// Every action run, with the option list it saw.
    pub(crate) actions: Vec<(ActionKind, Vec<String>)>,
    /// Releases of handles that were not live.
    pub(crate) bad_releases: usize,
}

impl FakeState {
    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    /// Objects comgr still holds.
    pub(crate) fn live_objects(&self) -> usize {
        self.data.len() + self.sets.len() + self.infos.len()
    }

    /// Every object created was destroyed exactly once.
    pub(crate) fn is_balanced(&self) -> bool {
        self.live_objects() == 0
            && self.bad_releases == 0
            && self.data_acquired == self.data_released
            && self.teardown.len() == self.sets_created.len() + self.infos_created.len()
    }

    fn unref(&mut self, handle: u64) -> bool {
        match self.data.get_mut(&handle) {
            Some(data) => {
                data.refs -= 1;
                if data.refs == 0 {
                    self.data.remove(&handle);
                }
                true
            }
            None => false,
        }
    }

    fn add_output(&mut self, set: u64, kind: DataKind, bytes: Vec<u8>) {
        let handle = self.next();
        self.data.insert(handle, FakeData { kind, bytes, refs: 1 });
        if let Some(members) = self.sets.get_mut(&set) {
            members.push(handle);
        }
    }

    fn members(&self, set: u64, kind: DataKind) -> Vec<u64> {
        self.sets
            .get(&set)
            .map(|members| {
                members
                    .iter()
                    .copied()
                    .filter(|h| self.data.get(h).is_some_and(|d| d.kind == kind))
                    .collect()
            })
            .unwrap_or_default()
    }
}

thread_local! {
    static STATE: RefCell<FakeState> = RefCell::new(FakeState::default());
}

pub(crate) fn with_state<R>(f: impl FnOnce(&mut FakeState) -> R) -> R {
    STATE.with(|state| f(&mut state.borrow_mut()))
}

/// Reset this thread's fake and return a configuration that loads it.
pub(crate) fn install() -> Config {
    with_state(|state| *state = FakeState::default());
    Comgr::register(PathBuf::from(FAKE_LIBRARY), table());
    Config {
        comgr_library: Some(PathBuf::from(FAKE_LIBRARY)),
        ..Config::default()
    }
}

/// Make `action` fail, writing a log to its output set unless `silent`.
pub(crate) fn fail_at(action: ActionKind, silent: bool) {
    with_state(|state| {
        state.fail_at = Some(action);
        state.silent_failure = silent;
    });
}

fn table() -> ComgrApi {
    ComgrApi {
        status_string,
        create_data,
        release_data,
        set_data,
        set_data_name,
        get_data,
        create_data_set,
        destroy_data_set,
        data_set_add,
        action_data_count,
        action_data_get_data,
        create_action_info,
        destroy_action_info,
        action_info_set_isa_name: set_isa_name,
        action_info_set_language: set_language,
        action_info_set_option_list: set_option_list,
        action_info_set_logging: set_logging,
        do_action,
        _library: None,
    }
}

unsafe extern "C" fn status_string(_status: Status, text: *mut *const c_char) -> Status {
    unsafe { *text = STATUS_TEXT.as_ptr().cast() };
    STATUS_SUCCESS
}

unsafe extern "C" fn create_data(kind: DataKind, out: *mut RawData) -> Status {
    let handle = with_state(|s| {
        let handle = s.next();
        s.data.insert(
            handle,
            FakeData {
                kind,
                bytes: Vec::new(),
                refs: 1,
            },
        );
        s.data_acquired += 1;
        handle
    });
    unsafe { *out = RawData { handle } };
    STATUS_SUCCESS
}

unsafe extern "C" fn release_data(data: RawData) -> Status {
    with_state(|s| {
        if s.unref(data.handle) {
            s.data_released += 1;
            STATUS_SUCCESS
        } else {
            s.bad_releases += 1;
            STATUS_ERROR_INVALID_ARGUMENT
        }
    })
}

unsafe extern "C" fn set_data(data: RawData, size: usize, bytes: *const c_char) -> Status {
    let bytes = unsafe { std::slice::from_raw_parts(bytes.cast::<u8>(), size) }.to_vec();
    with_state(|s| match s.data.get_mut(&data.handle) {
        Some(entry) => {
            entry.bytes = bytes;
            STATUS_SUCCESS
        }
        None => STATUS_ERROR_INVALID_ARGUMENT,
    })
}

unsafe extern "C" fn set_data_name(data: RawData, name: *const c_char) -> Status {
    let _name = unsafe { CStr::from_ptr(name) };
    with_state(|s| {
        if s.data.contains_key(&data.handle) {
            STATUS_SUCCESS
        } else {
            STATUS_ERROR_INVALID_ARGUMENT
        }
    })
}

unsafe extern "C" fn get_data(data: RawData, size: *mut usize, buffer: *mut c_char) -> Status {
    let Some(bytes) = with_state(|s| s.data.get(&data.handle).map(|d| d.bytes.clone())) else {
        return STATUS_ERROR_INVALID_ARGUMENT;
    };
    unsafe {
        if !buffer.is_null() {
            let len = bytes.len().min(*size);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), buffer.cast::<u8>(), len);
        }
        *size = bytes.len();
    }
    STATUS_SUCCESS
}

unsafe extern "C" fn create_data_set(out: *mut RawDataSet) -> Status {
    let handle = with_state(|s| {
        let handle = s.next();
        s.sets.insert(handle, Vec::new());
        s.sets_created.push(handle);
        handle
    });
    unsafe { *out = RawDataSet { handle } };
    STATUS_SUCCESS
}

unsafe extern "C" fn destroy_data_set(set: RawDataSet) -> Status {
    with_state(|s| match s.sets.remove(&set.handle) {
        Some(members) => {
            for member in members {
                s.unref(member);
            }
            s.teardown.push(Teardown::Set(set.handle));
            STATUS_SUCCESS
        }
        None => {
            s.bad_releases += 1;
            STATUS_ERROR_INVALID_ARGUMENT
        }
    })
}

unsafe extern "C" fn data_set_add(set: RawDataSet, data: RawData) -> Status {
    with_state(|s| {
        let Some(entry) = s.data.get_mut(&data.handle) else {
            return STATUS_ERROR_INVALID_ARGUMENT;
        };
        let Some(members) = s.sets.get_mut(&set.handle) else {
            return STATUS_ERROR_INVALID_ARGUMENT;
        };
        entry.refs += 1;
        members.push(data.handle);
        STATUS_SUCCESS
    })
}

unsafe extern "C" fn action_data_count(set: RawDataSet, kind: DataKind, count: *mut usize) -> Status {
    let Some(n) = with_state(|s| s.sets.contains_key(&set.handle).then(|| s.members(set.handle, kind).len()))
    else {
        return STATUS_ERROR_INVALID_ARGUMENT;
    };
    unsafe { *count = n };
    STATUS_SUCCESS
}

unsafe extern "C" fn action_data_get_data(
    set: RawDataSet,
    kind: DataKind,
    index: usize,
    out: *mut RawData,
) -> Status {
    let found = with_state(|s| {
        let handle = *s.members(set.handle, kind).get(index)?;
        s.data.get_mut(&handle)?.refs += 1;
        s.data_acquired += 1;
        Some(handle)
    });
    match found {
        Some(handle) => {
            unsafe { *out = RawData { handle } };
            STATUS_SUCCESS
        }
        None => STATUS_ERROR_INVALID_ARGUMENT,
    }
}

unsafe extern "C" fn create_action_info(out: *mut RawActionInfo) -> Status {
    let handle = with_state(|s| {
        let handle = s.next();
        s.infos.insert(handle, Vec::new());
        s.infos_created.push(handle);
        handle
    });
    unsafe { *out = RawActionInfo { handle } };
    STATUS_SUCCESS
}

unsafe extern "C" fn destroy_action_info(info: RawActionInfo) -> Status {
    with_state(|s| {
        if s.infos.remove(&info.handle).is_some() {
            s.teardown.push(Teardown::Info(info.handle));
            STATUS_SUCCESS
        } else {
            s.bad_releases += 1;
            STATUS_ERROR_INVALID_ARGUMENT
        }
    })
}

fn info_exists(info: RawActionInfo) -> Status {
    with_state(|s| {
        if s.infos.contains_key(&info.handle) {
            STATUS_SUCCESS
        } else {
            STATUS_ERROR_INVALID_ARGUMENT
        }
    })
}

unsafe extern "C" fn set_isa_name(info: RawActionInfo, _isa: *const c_char) -> Status {
    info_exists(info)
}

unsafe extern "C" fn set_language(info: RawActionInfo, _language: Language) -> Status {
    info_exists(info)
}

unsafe extern "C" fn set_logging(info: RawActionInfo, _enabled: bool) -> Status {
    info_exists(info)
}

unsafe extern "C" fn set_option_list(info: RawActionInfo, options: *const *const c_char, count: usize) -> Status {
    let options: Vec<String> = (0..count)
        .map(|i| unsafe { CStr::from_ptr(*options.add(i)) }.to_string_lossy().into_owned())
        .collect();
    with_state(|s| match s.infos.get_mut(&info.handle) {
        Some(current) => {
            *current = options;
            STATUS_SUCCESS
        }
        None => STATUS_ERROR_INVALID_ARGUMENT,
    })
}

unsafe extern "C" fn do_action(
    action: ActionKind,
    info: RawActionInfo,
    input: RawDataSet,
    output: RawDataSet,
) -> Status {
    let (consumes, produces) = match action {
        ActionKind::CompileSourceWithDeviceLibsToBc => (DataKind::Source, DataKind::Bitcode),
        ActionKind::CodegenBcToRelocatable => (DataKind::Bitcode, DataKind::Relocatable),
        ActionKind::AssembleSourceToRelocatable => (DataKind::Source, DataKind::Relocatable),
        ActionKind::LinkRelocatableToExecutable => (DataKind::Relocatable, DataKind::Executable),
    };
    with_state(|s| {
        let Some(options) = s.infos.get(&info.handle).cloned() else {
            return STATUS_ERROR_INVALID_ARGUMENT;
        };
        if !s.sets.contains_key(&output.handle) || s.members(input.handle, consumes).is_empty() {
            return STATUS_ERROR_INVALID_ARGUMENT;
        }
        s.actions.push((action, options));

        let stage = action.stage_name();
        if s.fail_at == Some(action) {
            if !s.silent_failure {
                s.add_output(output.handle, DataKind::Log, format!("error: {stage} rejected its input\n").into_bytes());
            }
            return STATUS_ERROR;
        }
        s.add_output(output.handle, DataKind::Log, format!("note: {stage} ok\n").into_bytes());
        s.add_output(output.handle, produces, format!("fake {produces:?}").into_bytes());
        STATUS_SUCCESS
    })
}
