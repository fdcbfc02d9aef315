//! hipcomp - ahead-of-time HIP kernel compilation for AMD GPUs.
//!
//! hipcomp turns HIP C++ device source (or GCN assembly) into a loadable
//! AMDGPU code object for one target architecture. The whole pipeline runs
//! in-process through ROCm's code object manager (comgr) and LLVM; no HIP
//! runtime, device or driver is needed.
//!
//! # Primary Usage
//!
//! Kernels are declared with `__attribute__((global))`: no HIP headers are
//! included, so the `__global__` macro is not defined.
//!
//! ```no_run
//! use hipcomp::Compiler;
//!
//! let compiler = Compiler::new("gfx1100")?;
//! let lib = compiler.compile(r#"extern "C" __attribute__((global)) void k(float* a) { a[0] = 1.0f; }"#)?;
//! hipcomp::elf::validate_code_object(&lib)?;
//! # Ok::<(), hipcomp::CompileError>(())
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Shared infrastructure (errors, arch, config, session, tools)
//! - [`comgr`] - Runtime-loaded comgr library and owned handles
//! - [`backend`] - Interchangeable compile strategies
//! - [`link`] - Relocatable to shared-object link stage
//! - [`elf`] - Code object inspection
//! - [`disasm`] - Debug disassembly

pub mod backend;
pub mod comgr;
pub mod core;
pub mod disasm;
pub mod elf;
pub mod link;

pub use crate::backend::{Backend, BackendKind, CompileRequest};
pub use crate::core::{
    Arch, CompilationSession, CompileError, CompileResult, Config, PassOptions, SessionStats,
};
pub use crate::link::{LinkStage, LinkerKind};

use std::fmt;

/// Compiles kernels for one architecture through the configured backend.
///
/// A `Compiler` holds no native state between calls; each compile creates
/// and releases its own handles, so one instance may be shared across
/// threads.
pub struct Compiler {
    arch: Arch,
    config: Config,
    backend: Box<dyn Backend>,
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("arch", &self.arch)
            .field("backend", &self.backend.kind())
            .field("config", &self.config)
            .finish()
    }
}

impl Compiler {
    /// Compiler for `arch`, configured from the environment.
    pub fn new(arch: &str) -> CompileResult<Self> {
        Self::with_config(arch, Config::from_env()?)
    }

    pub fn with_config(arch: &str, config: Config) -> CompileResult<Self> {
        let arch = Arch::parse(arch)?;
        let backend = config.backend.instantiate();
        log::debug!("compiler for {} using the {} backend", arch, backend.kind());
        Ok(Self {
            arch,
            config,
            backend,
        })
    }

    pub fn arch(&self) -> &Arch {
        &self.arch
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Compile HIP source to a code object.
    pub fn compile(&self, source: &str) -> CompileResult<Vec<u8>> {
        self.compile_with_stats(source, false).0
    }

    /// Assemble GCN assembly to a code object.
    pub fn compile_asm(&self, source: &str) -> CompileResult<Vec<u8>> {
        self.compile_with_stats(source, true).0
    }

    /// Compile and also report what the call did with native resources.
    ///
    /// The stats are returned on failure too, after every handle of the
    /// call has been dropped.
    pub fn compile_with_stats(
        &self,
        source: &str,
        assembly: bool,
    ) -> (CompileResult<Vec<u8>>, SessionStats) {
        let request = if assembly {
            CompileRequest::assembly(source, &self.arch)
        } else {
            CompileRequest::new(source, &self.arch)
        };
        self.compile_tracked(&request)
    }

    /// Compile an explicit request, possibly for another architecture.
    pub fn compile_request(&self, request: &CompileRequest<'_>) -> CompileResult<Vec<u8>> {
        self.compile_tracked(request).0
    }

    fn compile_tracked(&self, request: &CompileRequest<'_>) -> (CompileResult<Vec<u8>>, SessionStats) {
        let session = CompilationSession::new();
        let result = self.run(request, &session);
        let stats = session.into_stats();
        if !stats.is_balanced() {
            log::warn!("{} native handles outstanding after compile", stats.outstanding());
        }
        (result, stats)
    }

    fn run(&self, request: &CompileRequest<'_>, session: &CompilationSession) -> CompileResult<Vec<u8>> {
        log::info!(
            "🚀 compiling {} bytes of {} for {} ({} backend)",
            request.source.len(),
            if request.assembly { "assembly" } else { "HIP" },
            request.arch,
            self.backend.kind()
        );
        match self.backend.compile(request, &self.config, session) {
            Ok(lib) => {
                session.set_artifact_size(lib.len());
                log::info!("✅ {} byte code object for {}", lib.len(), request.arch);
                Ok(lib)
            }
            Err(e) => {
                log::debug!("compile for {} failed: {}", request.arch, e);
                Err(e)
            }
        }
    }

    /// Print the disassembly of a code object produced by this compiler.
    pub fn disassemble(&self, lib: &[u8]) -> CompileResult<()> {
        disasm::disassemble(lib, &self.config)
    }
}

/// Compile HIP source for `arch` with the environment's configuration.
pub fn compile(source: &str, arch: &str) -> CompileResult<Vec<u8>> {
    Compiler::new(arch)?.compile(source)
}
