// This module binds the AMD code-object manager (comgr) that drives the ROCm toolchain's
// built-in compile actions. Each shared library is loaded once per process with libloading,
// so hipcomp builds and links on machines without ROCm and only fails at compile time when
// comgr is genuinely unavailable. Every comgr object a pipeline run creates goes through the
// RAII wrappers in `handle`, which report to the run's CompilationSession so the handle
// ledger can be checked after success and failure alike.

//! Runtime bindings to `libamd_comgr`.
//!
//! # Structure
//!
//! - [`ffi`]: raw types, enum values and the resolved entry point table
//! - [`handle`]: owned [`Data`], [`DataSet`] and [`ActionInfo`] wrappers
//!
//! [`Comgr::load`] is the only way to obtain the library. Loaded libraries are
//! kept for the rest of the process, keyed by path, and each path is opened
//! at most once. Failed loads are not remembered, so a caller may retry with
//! a corrected [`Config`].

pub mod ffi;
pub mod handle;

#[cfg(test)]
pub(crate) mod fake;

pub use ffi::{ActionKind, DataKind, Language};
pub use handle::{ActionInfo, ComgrScope, Data, DataSet};

use crate::core::{CompileError, CompileResult, Config};
use ffi::{ComgrApi, Status, STATUS_SUCCESS};
use std::collections::HashMap;
use std::ffi::{c_char, CStr};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

static LOADED: OnceLock<Mutex<HashMap<PathBuf, &'static Comgr>>> = OnceLock::new();

fn loaded() -> MutexGuard<'static, HashMap<PathBuf, &'static Comgr>> {
    LOADED
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// A loaded comgr library.
pub struct Comgr {
    api: ComgrApi,
}

impl Comgr {
    /// The comgr library `config` names, loading it on first use.
    ///
    /// Thread-safe: the registry lock is held while a library is opened, so
    /// concurrent first calls for one path load it once.
    pub fn load(config: &Config) -> CompileResult<&'static Comgr> {
        let candidates = match &config.comgr_library {
            Some(path) => vec![path.clone()],
            None => ffi::candidate_paths(&config.rocm_path),
        };

        let mut loaded = loaded();
        if let Some(comgr) = candidates.iter().find_map(|path| loaded.get(path)) {
            return Ok(*comgr);
        }

        let mut failures = Vec::new();
        for path in candidates {
            match ComgrApi::open(&path) {
                Ok(api) => {
                    log::info!("Loaded comgr from {}", path.display());
                    let comgr: &'static Comgr = Box::leak(Box::new(Comgr { api }));
                    loaded.insert(path, comgr);
                    return Ok(comgr);
                }
                Err(e) => {
                    log::trace!("comgr not at {}: {}", path.display(), e);
                    failures.push(e);
                }
            }
        }
        Err(CompileError::LibraryLoad {
            reason: failures.join("; "),
        })
    }

    /// Make `api` the library behind `path`.
    #[cfg(test)]
    pub(crate) fn register(path: PathBuf, api: ComgrApi) -> &'static Comgr {
        let mut loaded = loaded();
        if let Some(comgr) = loaded.get(&path) {
            return *comgr;
        }
        let comgr: &'static Comgr = Box::leak(Box::new(Comgr { api }));
        loaded.insert(path, comgr);
        comgr
    }

    pub(crate) fn api(&self) -> &ComgrApi {
        &self.api
    }

    /// Turn a comgr status into a result.
    pub(crate) fn check(&self, call: &'static str, status: Status) -> CompileResult<()> {
        if status == STATUS_SUCCESS {
            return Ok(());
        }
        Err(CompileError::Native {
            call,
            status: status as u32,
            message: self.status_message(status),
        })
    }

    /// Text comgr associates with `status`.
    pub fn status_message(&self, status: Status) -> String {
        let mut text: *const c_char = std::ptr::null();
        // SAFETY: comgr writes a pointer to a static string on success.
        let rc = unsafe { (self.api.status_string)(status, &mut text) };
        if rc != STATUS_SUCCESS || text.is_null() {
            return format!("unknown status {status}");
        }
        // SAFETY: the string is static and NUL terminated.
        unsafe { CStr::from_ptr(text) }
            .to_string_lossy()
            .into_owned()
    }
}
