//! Legacy process-chain backend.
//!
//! Drives the ROCm LLVM tools as child processes: `clang` compiles HIP to
//! textual IR for the device only, `llc` lowers it to an object, and raw
//! assembly goes through `llvm-mc`. The object then takes the same link stage
//! as every other backend. Kept for environments where comgr misbehaves.

use super::{Backend, BackendKind, CompileRequest};
use crate::core::{run_tool, CompilationSession, CompileError, CompileResult, Config};
use crate::link::LinkStage;

/// Compiles by chaining ROCm LLVM tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessBackend;

impl ProcessBackend {
    /// Fail early with a clear message when a device library is missing,
    /// instead of a wall of clang diagnostics.
    fn check_device_libraries(request: &CompileRequest<'_>, config: &Config) -> CompileResult<()> {
        let missing: Vec<String> = request
            .arch
            .device_libraries(&config.rocm_path)
            .into_iter()
            .filter(|path| !path.exists())
            .map(|path| path.display().to_string())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(CompileError::Config {
            reason: format!("missing device libraries for {}: {}", request.arch, missing.join(", ")),
        })
    }
}

impl Backend for ProcessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Clang
    }

    fn compile(
        &self,
        request: &CompileRequest<'_>,
        config: &Config,
        session: &CompilationSession,
    ) -> CompileResult<Vec<u8>> {
        let arch = request.arch;
        let relocatable = if request.assembly {
            session.enter_stage("llvm-mc");
            run_tool(&config.llvm_tool("llvm-mc"), &arch.mc_args(), request.source.as_bytes())?
        } else {
            Self::check_device_libraries(request, config)?;
            session.enter_stage("clang");
            let ir = run_tool(
                &config.llvm_tool("clang"),
                &arch.clang_args(&config.rocm_path),
                request.source.as_bytes(),
            )?;
            log::trace!("device IR: {} bytes", ir.len());
            session.enter_stage("llc");
            run_tool(&config.llvm_tool("llc"), &arch.llc_args(), &ir)?
        };

        LinkStage::new(arch, config, session).link(&[&relocatable])
    }
}
