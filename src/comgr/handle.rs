//! Owned comgr handles.
//!
//! Each wrapper releases its native object exactly once in `Drop` and reports
//! both ends of its life to the [`CompilationSession`] of the run that created
//! it. Release failures cannot propagate out of `Drop`; they are logged.

use super::ffi::{
    ActionKind, DataKind, Language, RawActionInfo, RawData, RawDataSet, STATUS_ERROR_INVALID_ARGUMENT,
    STATUS_SUCCESS,
};
use super::Comgr;
use crate::core::{decode_log, CompilationSession, CompileError, CompileResult, ResourceKind};
use std::ffi::{c_char, CString};

fn c_string(call: &'static str, value: &str) -> CompileResult<CString> {
    CString::new(value).map_err(|_| CompileError::Native {
        call,
        status: STATUS_ERROR_INVALID_ARGUMENT as u32,
        message: format!("{value:?} contains a NUL byte"),
    })
}

/// Creates handles bound to one comgr library and one session.
#[derive(Clone, Copy)]
pub struct ComgrScope<'s> {
    comgr: &'s Comgr,
    session: &'s CompilationSession,
}

impl<'s> ComgrScope<'s> {
    pub fn new(comgr: &'s Comgr, session: &'s CompilationSession) -> Self {
        Self { comgr, session }
    }

    /// Create an empty data object of `kind`.
    pub fn data(&self, kind: DataKind) -> CompileResult<Data<'s>> {
        let mut raw = RawData { handle: 0 };
        // SAFETY: `raw` is a valid out pointer.
        let status = unsafe { (self.comgr.api().create_data)(kind, &mut raw) };
        self.comgr.check("amd_comgr_create_data", status)?;
        Ok(Data::adopt(*self, raw, kind))
    }

    /// Create a named data object holding a copy of `bytes`.
    pub fn data_from_bytes(&self, kind: DataKind, name: &str, bytes: &[u8]) -> CompileResult<Data<'s>> {
        let data = self.data(kind)?;
        data.set_bytes(bytes)?;
        data.set_name(name)?;
        Ok(data)
    }

    /// Create an empty data set. `stage` names it in logs and errors.
    pub fn data_set(&self, stage: &'static str) -> CompileResult<DataSet<'s>> {
        let mut raw = RawDataSet { handle: 0 };
        // SAFETY: `raw` is a valid out pointer.
        let status = unsafe { (self.comgr.api().create_data_set)(&mut raw) };
        self.comgr.check("amd_comgr_create_data_set", status)?;
        self.session.record_acquire(ResourceKind::DataSet);
        log::trace!("created data set {:#x} ({})", raw.handle, stage);
        Ok(DataSet {
            scope: *self,
            raw,
            stage,
        })
    }

    /// Create an empty options bag.
    pub fn action_info(&self) -> CompileResult<ActionInfo<'s>> {
        let mut raw = RawActionInfo { handle: 0 };
        // SAFETY: `raw` is a valid out pointer.
        let status = unsafe { (self.comgr.api().create_action_info)(&mut raw) };
        self.comgr.check("amd_comgr_create_action_info", status)?;
        self.session.record_acquire(ResourceKind::ActionInfo);
        log::trace!("created action info {:#x}", raw.handle);
        Ok(ActionInfo { scope: *self, raw })
    }
}

/// A comgr data object (`amd_comgr_data_t`).
pub struct Data<'s> {
    scope: ComgrScope<'s>,
    raw: RawData,
    kind: DataKind,
}

impl<'s> Data<'s> {
    /// Take ownership of a reference comgr handed out.
    fn adopt(scope: ComgrScope<'s>, raw: RawData, kind: DataKind) -> Self {
        scope.session.record_acquire(ResourceKind::Data);
        log::trace!("acquired {:?} data {:#x}", kind, raw.handle);
        Self { scope, raw, kind }
    }

    pub fn set_bytes(&self, bytes: &[u8]) -> CompileResult<()> {
        let comgr = self.scope.comgr;
        // SAFETY: comgr copies `bytes.len()` bytes from a live slice.
        let status = unsafe {
            (comgr.api().set_data)(self.raw, bytes.len(), bytes.as_ptr() as *const c_char)
        };
        comgr.check("amd_comgr_set_data", status)
    }

    pub fn set_name(&self, name: &str) -> CompileResult<()> {
        let comgr = self.scope.comgr;
        let name = c_string("amd_comgr_set_data_name", name)?;
        // SAFETY: `name` outlives the call; comgr copies it.
        let status = unsafe { (comgr.api().set_data_name)(self.raw, name.as_ptr()) };
        comgr.check("amd_comgr_set_data_name", status)
    }

    /// Copy the object's bytes out of comgr.
    pub fn bytes(&self) -> CompileResult<Vec<u8>> {
        let comgr = self.scope.comgr;
        let mut size = 0usize;
        // SAFETY: a null buffer asks comgr for the size only.
        let status = unsafe { (comgr.api().get_data)(self.raw, &mut size, std::ptr::null_mut()) };
        comgr.check("amd_comgr_get_data", status)?;

        let mut buffer = vec![0u8; size];
        // SAFETY: `buffer` holds `size` writable bytes.
        let status = unsafe {
            (comgr.api().get_data)(self.raw, &mut size, buffer.as_mut_ptr() as *mut c_char)
        };
        comgr.check("amd_comgr_get_data", status)?;
        buffer.truncate(size);
        Ok(buffer)
    }
}

impl Drop for Data<'_> {
    fn drop(&mut self) {
        // SAFETY: this wrapper owns exactly one reference to `raw`.
        let status = unsafe { (self.scope.comgr.api().release_data)(self.raw) };
        if status != STATUS_SUCCESS {
            log::warn!(
                "Releasing {:?} data {:#x} failed: {}",
                self.kind,
                self.raw.handle,
                self.scope.comgr.status_message(status)
            );
        }
        self.scope.session.record_release(ResourceKind::Data);
    }
}

/// A comgr data set (`amd_comgr_data_set_t`), the input or output of one stage.
pub struct DataSet<'s> {
    scope: ComgrScope<'s>,
    raw: RawDataSet,
    stage: &'static str,
}

impl<'s> DataSet<'s> {
    /// Add `data` to the set. The set keeps its own reference.
    pub fn add(&self, data: &Data<'_>) -> CompileResult<()> {
        let comgr = self.scope.comgr;
        // SAFETY: both handles are live.
        let status = unsafe { (comgr.api().data_set_add)(self.raw, data.raw) };
        comgr.check("amd_comgr_data_set_add", status)
    }

    /// Number of objects of `kind` in the set.
    pub fn count(&self, kind: DataKind) -> CompileResult<usize> {
        let comgr = self.scope.comgr;
        let mut count = 0usize;
        // SAFETY: `count` is a valid out pointer.
        let status = unsafe { (comgr.api().action_data_count)(self.raw, kind, &mut count) };
        comgr.check("amd_comgr_action_data_count", status)?;
        Ok(count)
    }

    /// Fetch the `index`th object of `kind`. The returned handle is owned.
    pub fn get(&self, kind: DataKind, index: usize) -> CompileResult<Data<'s>> {
        let comgr = self.scope.comgr;
        let mut raw = RawData { handle: 0 };
        // SAFETY: `raw` is a valid out pointer.
        let status = unsafe { (comgr.api().action_data_get_data)(self.raw, kind, index, &mut raw) };
        comgr.check("amd_comgr_action_data_get_data", status)?;
        Ok(Data::adopt(self.scope, raw, kind))
    }

    /// Copy out the bytes of the first object of `kind`.
    pub fn first_bytes(&self, kind: DataKind) -> CompileResult<Vec<u8>> {
        self.get(kind, 0)?.bytes()
    }

    /// Build logs in this set, decoded best-effort. Never fails.
    pub fn log_text(&self) -> String {
        let collect = || -> CompileResult<String> {
            let mut text = Vec::new();
            for index in 0..self.count(DataKind::Log)? {
                text.push(decode_log(&self.get(DataKind::Log, index)?.bytes()?));
            }
            Ok(text.join("\n"))
        };
        collect().unwrap_or_else(|e| {
            log::warn!("Could not read build log of {}: {}", self.stage, e);
            String::new()
        })
    }
}

impl Drop for DataSet<'_> {
    fn drop(&mut self) {
        // SAFETY: this wrapper owns the set.
        let status = unsafe { (self.scope.comgr.api().destroy_data_set)(self.raw) };
        if status != STATUS_SUCCESS {
            log::warn!(
                "Destroying data set {} failed: {}",
                self.stage,
                self.scope.comgr.status_message(status)
            );
        }
        log::trace!("destroyed data set {:#x} ({})", self.raw.handle, self.stage);
        self.scope.session.record_release(ResourceKind::DataSet);
    }
}

/// A comgr options bag (`amd_comgr_action_info_t`).
pub struct ActionInfo<'s> {
    scope: ComgrScope<'s>,
    raw: RawActionInfo,
}

impl ActionInfo<'_> {
    pub fn set_isa_name(&self, isa: &str) -> CompileResult<()> {
        let comgr = self.scope.comgr;
        let isa = c_string("amd_comgr_action_info_set_isa_name", isa)?;
        // SAFETY: comgr copies the string.
        let status = unsafe { (comgr.api().action_info_set_isa_name)(self.raw, isa.as_ptr()) };
        comgr.check("amd_comgr_action_info_set_isa_name", status)
    }

    pub fn set_language(&self, language: Language) -> CompileResult<()> {
        let comgr = self.scope.comgr;
        // SAFETY: plain value arguments.
        let status = unsafe { (comgr.api().action_info_set_language)(self.raw, language) };
        comgr.check("amd_comgr_action_info_set_language", status)
    }

    pub fn set_logging(&self, enabled: bool) -> CompileResult<()> {
        let comgr = self.scope.comgr;
        // SAFETY: plain value arguments.
        let status = unsafe { (comgr.api().action_info_set_logging)(self.raw, enabled) };
        comgr.check("amd_comgr_action_info_set_logging", status)
    }

    /// Replace the whole option list. An empty slice clears it.
    pub fn set_options<S: AsRef<str>>(&self, options: &[S]) -> CompileResult<()> {
        let comgr = self.scope.comgr;
        let owned = options
            .iter()
            .map(|o| c_string("amd_comgr_action_info_set_option_list", o.as_ref()))
            .collect::<CompileResult<Vec<_>>>()?;
        let pointers: Vec<*const c_char> = owned.iter().map(|o| o.as_ptr()).collect();
        log::trace!(
            "options: {}",
            options.iter().map(|o| o.as_ref()).collect::<Vec<_>>().join(" ")
        );
        // SAFETY: `pointers` and the strings behind them outlive the call.
        let status = unsafe {
            (comgr.api().action_info_set_option_list)(self.raw, pointers.as_ptr(), pointers.len())
        };
        comgr.check("amd_comgr_action_info_set_option_list", status)
    }

    /// Run `action` from `input` into `output`.
    ///
    /// A non-zero status becomes [`CompileError::StageAction`] carrying the
    /// build log found in `output`, which is empty when comgr wrote none.
    pub fn run(&self, action: ActionKind, input: &DataSet<'_>, output: &DataSet<'_>) -> CompileResult<()> {
        let comgr = self.scope.comgr;
        let stage = action.stage_name();
        self.scope.session.enter_stage(stage);
        // SAFETY: all three handles are live for the duration of the call.
        let status = unsafe { (comgr.api().do_action)(action, self.raw, input.raw, output.raw) };
        if status == STATUS_SUCCESS {
            return Ok(());
        }

        let log = output.log_text();
        log::debug!("{} failed with status {}", stage, status);
        Err(CompileError::StageAction {
            stage,
            status: status as u32,
            log,
        })
    }
}

impl Drop for ActionInfo<'_> {
    fn drop(&mut self) {
        // SAFETY: this wrapper owns the options bag.
        let status = unsafe { (self.scope.comgr.api().destroy_action_info)(self.raw) };
        if status != STATUS_SUCCESS {
            log::warn!(
                "Destroying action info failed: {}",
                self.scope.comgr.status_message(status)
            );
        }
        self.scope.session.record_release(ResourceKind::ActionInfo);
    }
}
