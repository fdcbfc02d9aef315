//! Pipeline configuration.
//!
//! Everything here comes from environment toggles that live outside the
//! pipeline itself. [`Config::from_lookup`] does the parsing so it can be
//! exercised without touching the process environment.

use super::error::{CompileError, CompileResult};
use crate::backend::BackendKind;
use crate::link::LinkerKind;
use std::path::PathBuf;

pub const ENV_BACKEND: &str = "HIPCOMP_BACKEND";
pub const ENV_LINKER: &str = "HIPCOMP_LINKER";
pub const ENV_ROCM_PATH: &str = "ROCM_PATH";
pub const ENV_COMGR_LIB: &str = "HIPCOMP_COMGR_LIB";
pub const ENV_COMGR_LOGGING: &str = "HIPCOMP_COMGR_LOGGING";
pub const ENV_NO_UNROLL: &str = "HIPCOMP_NO_UNROLL";
pub const ENV_NO_VECTORIZE: &str = "HIPCOMP_NO_VECTORIZE";
pub const ENV_NO_SLP: &str = "HIPCOMP_NO_SLP";

const DEFAULT_ROCM_PATH: &str = "/opt/rocm";

/// Toggles for the in-process optimization pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassOptions {
    pub loop_unrolling: bool,
    pub loop_vectorization: bool,
    pub slp_vectorization: bool,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            loop_unrolling: true,
            loop_vectorization: true,
            slp_vectorization: true,
        }
    }
}

/// Compiler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Backend servicing compile requests.
    pub backend: BackendKind,
    /// Driver used by the link stage.
    pub linker: LinkerKind,
    /// ROCm installation root.
    pub rocm_path: PathBuf,
    /// Explicit comgr library, otherwise searched under `rocm_path`.
    pub comgr_library: Option<PathBuf>,
    /// Ask comgr to capture build logs.
    pub comgr_logging: bool,
    pub passes: PassOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Comgr,
            linker: LinkerKind::Comgr,
            rocm_path: PathBuf::from(DEFAULT_ROCM_PATH),
            comgr_library: None,
            comgr_logging: true,
            passes: PassOptions::default(),
        }
    }
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> CompileResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> CompileResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = non_empty(lookup(ENV_BACKEND)) {
            config.backend = value.parse()?;
        }
        if let Some(value) = non_empty(lookup(ENV_LINKER)) {
            config.linker = value.parse()?;
        }
        if let Some(value) = non_empty(lookup(ENV_ROCM_PATH)) {
            config.rocm_path = PathBuf::from(value);
        }
        config.comgr_library = non_empty(lookup(ENV_COMGR_LIB)).map(PathBuf::from);
        if let Some(value) = non_empty(lookup(ENV_COMGR_LOGGING)) {
            config.comgr_logging = parse_flag(ENV_COMGR_LOGGING, &value)?;
        }

        let disabled = |key: &str| -> CompileResult<bool> {
            match non_empty(lookup(key)) {
                Some(value) => parse_flag(key, &value),
                None => Ok(false),
            }
        };
        config.passes = PassOptions {
            loop_unrolling: !disabled(ENV_NO_UNROLL)?,
            loop_vectorization: !disabled(ENV_NO_VECTORIZE)?,
            slp_vectorization: !disabled(ENV_NO_SLP)?,
        };

        Ok(config)
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_linker(mut self, linker: LinkerKind) -> Self {
        self.linker = linker;
        self
    }

    pub fn with_rocm_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.rocm_path = path.into();
        self
    }

    /// Path of a tool in the ROCm LLVM distribution.
    pub fn llvm_tool(&self, name: &str) -> PathBuf {
        self.rocm_path.join("llvm").join("bin").join(name)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_flag(key: &str, value: &str) -> CompileResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CompileError::Config {
            reason: format!("{key}={value:?} is not a boolean"),
        }),
    }
}
