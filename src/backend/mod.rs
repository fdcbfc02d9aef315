//! Interchangeable compile backends.
//!
//! Every backend turns one [`CompileRequest`] into a linked code object and
//! finishes through the shared [`LinkStage`](crate::link::LinkStage). The set
//! is closed and selected by [`BackendKind`]; callers only ever see the
//! [`Backend`] trait, so adding or removing a strategy does not touch them.
//!
//! | Kind | Middle stages |
//! |------|---------------|
//! | [`BackendKind::Comgr`] | comgr actions for bitcode and codegen |
//! | [`BackendKind::Ir`] | comgr bitcode, then in-process LLVM O3 and object emission |
//! | [`BackendKind::Clang`] | `clang` and `llc` (or `llvm-mc`) child processes |

pub mod action;
pub mod ir;
pub mod process;

pub use action::ActionBackend;
pub use ir::{initialize_amdgpu_target, IrBackend};
pub use process::ProcessBackend;

use crate::core::{Arch, CompilationSession, CompileError, CompileResult, Config};
use std::fmt;
use std::str::FromStr;

/// One compile call's input.
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub source: &'a str,
    pub arch: &'a Arch,
    /// `source` is GCN assembly rather than HIP.
    pub assembly: bool,
}

impl<'a> CompileRequest<'a> {
    pub fn new(source: &'a str, arch: &'a Arch) -> Self {
        Self {
            source,
            arch,
            assembly: false,
        }
    }

    pub fn assembly(source: &'a str, arch: &'a Arch) -> Self {
        Self {
            source,
            arch,
            assembly: true,
        }
    }
}

/// A strategy lowering source to a linked code object.
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Compile `request`, creating every native resource through `session`.
    fn compile(
        &self,
        request: &CompileRequest<'_>,
        config: &Config,
        session: &CompilationSession,
    ) -> CompileResult<Vec<u8>>;
}

/// The available backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// comgr action pipeline.
    Comgr,
    /// comgr frontend, in-process LLVM code generation.
    Ir,
    /// Legacy clang/llc process chain.
    Clang,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::Comgr, BackendKind::Ir, BackendKind::Clang];

    pub fn instantiate(self) -> Box<dyn Backend> {
        match self {
            BackendKind::Comgr => Box::new(ActionBackend),
            BackendKind::Ir => Box::new(IrBackend),
            BackendKind::Clang => Box::new(ProcessBackend),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Comgr => "comgr",
            BackendKind::Ir => "ir",
            BackendKind::Clang => "clang",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "comgr" | "action" => Ok(BackendKind::Comgr),
            "ir" | "llvm" => Ok(BackendKind::Ir),
            "clang" | "process" => Ok(BackendKind::Clang),
            other => Err(CompileError::Config {
                reason: format!("unknown backend {other:?}, expected comgr, ir or clang"),
            }),
        }
    }
}
