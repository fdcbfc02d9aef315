// This module is the shared infrastructure every backend builds on: the error taxonomy,
// the per-call compilation session that keeps the native handle ledger, structured
// per-architecture toolchain flags, environment driven configuration and the helper used
// to run external ROCm tools.

//! Core hipcomp infrastructure.
//!
//! # Key Components
//!
//! - [`error`]: [`CompileError`] and the [`CompileResult`] alias
//! - [`session`]: per-call [`CompilationSession`] and its [`SessionStats`] ledger
//! - [`arch`]: [`Arch`] parsing and every flag derived from it
//! - [`config`]: [`Config`] read from the environment
//! - [`tool`]: blocking external tool invocation

pub mod arch;
pub mod config;
pub mod error;
pub mod session;
pub mod tool;

pub use arch::{Arch, HipVersion, AMDGCN_TRIPLE, HIP_VERSION, TARGET_FEATURES};
pub use config::{Config, PassOptions};
pub use error::{decode_log, CompileError, CompileResult};
pub use session::{CompilationSession, ResourceKind, SessionStats};
pub use tool::run_tool;
