// This module implements the IR pipeline backend. It keeps comgr for the frontend (HIP source
// to bitcode with the device libraries linked in) and replaces the comgr codegen action with
// direct control of LLVM through inkwell: the bitcode is parsed into an in-process module,
// verified, optimized with the O3 pipeline under explicit unroll and vectorize toggles, and
// emitted as an AMDGPU object into a memory buffer. The object bytes are copied out before
// the buffer and module are dropped, and then handed to the shared link stage. LLVM's AMDGPU
// target is initialised once per process behind a OnceLock, together with the backend option
// that internalizes non-kernel symbols.

//! In-process LLVM code generation backend.

use super::action::ComgrRun;
use super::{Backend, BackendKind, CompileRequest};
use crate::comgr::{Comgr, ComgrScope};
use crate::core::arch::INTERNALIZE_SYMBOLS;
use crate::core::{Arch, CompilationSession, CompileError, CompileResult, Config, PassOptions, AMDGCN_TRIPLE};
use crate::link::LinkStage;
use inkwell::context::Context;
use inkwell::memory_buffer::MemoryBuffer;
use inkwell::module::Module;
use inkwell::passes::PassBuilderOptions;
use inkwell::targets::{CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine, TargetTriple};
use inkwell::OptimizationLevel;
use std::ffi::{c_char, c_int, CString};
use std::sync::OnceLock;

/// Stage name recorded for in-process code generation.
pub const IR_CODEGEN_STAGE: &str = "llvm codegen";

/// Pass pipeline matching the toolchain's top optimization tier.
const PASS_PIPELINE: &str = "default<O3>";

static AMDGPU_TARGET: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialise LLVM's AMDGPU target once per process.
///
/// Registers target info, machine code, asm printer, asm parser and
/// disassembler, then sets the backend's internalize option. Safe to call from
/// any number of threads; only the first call does work and every call sees
/// its outcome.
pub fn initialize_amdgpu_target() -> CompileResult<()> {
    AMDGPU_TARGET
        .get_or_init(|| {
            Target::initialize_amd_gpu(&InitializationConfig::default());
            Target::from_triple(&TargetTriple::create(AMDGCN_TRIPLE))
                .map_err(|e| format!("LLVM has no AMDGPU target: {e}"))?;
            register_backend_options()?;
            log::debug!("AMDGPU target initialised");
            Ok(())
        })
        .clone()
        .map_err(|reason| CompileError::BackendInit { reason })
}

fn register_backend_options() -> Result<(), String> {
    let args = ["hipcomp", INTERNALIZE_SYMBOLS]
        .iter()
        .map(|a| CString::new(*a).map_err(|e| e.to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    let argv: Vec<*const c_char> = args.iter().map(|a| a.as_ptr()).collect();
    let overview = CString::default();
    // SAFETY: argv holds valid C strings that outlive the call. The option is
    // registered by the AMDGPU backend, which was verified to be present.
    unsafe {
        llvm_sys::support::LLVMParseCommandLineOptions(
            argv.len() as c_int,
            argv.as_ptr(),
            overview.as_ptr(),
        );
    }
    Ok(())
}

/// Target machine for `arch`: PIC, default code model, aggressive opt level.
pub fn create_target_machine(arch: &Arch) -> CompileResult<TargetMachine> {
    initialize_amdgpu_target()?;
    let triple = TargetTriple::create(AMDGCN_TRIPLE);
    let target = Target::from_triple(&triple).map_err(|e| CompileError::BackendInit {
        reason: e.to_string(),
    })?;
    target
        .create_target_machine(
            &triple,
            arch.processor(),
            &arch.target_features(),
            OptimizationLevel::Aggressive,
            RelocMode::PIC,
            CodeModel::Default,
        )
        .ok_or_else(|| CompileError::BackendInit {
            reason: format!("no target machine for {arch}"),
        })
}

fn optimize(module: &Module<'_>, machine: &TargetMachine, passes: &PassOptions) -> CompileResult<()> {
    let options = PassBuilderOptions::create();
    options.set_verify_each(true);
    options.set_loop_unrolling(passes.loop_unrolling);
    options.set_loop_vectorization(passes.loop_vectorization);
    options.set_loop_slp_vectorization(passes.slp_vectorization);

    module
        .run_passes(PASS_PIPELINE, machine, options)
        .map_err(|e| CompileError::Codegen {
            reason: format!("{PASS_PIPELINE} failed: {e}"),
        })
}

/// Lower LLVM bitcode to an AMDGPU relocatable object.
pub fn codegen_bitcode(bitcode: &[u8], arch: &Arch, passes: &PassOptions) -> CompileResult<Vec<u8>> {
    let machine = create_target_machine(arch)?;

    let context = Context::create();
    let buffer = MemoryBuffer::create_from_memory_range_copy(bitcode, "kernel.bc");
    let module = Module::parse_bitcode_from_buffer(&buffer, &context).map_err(|e| {
        CompileError::Verification {
            reason: format!("unreadable bitcode: {e}"),
        }
    })?;
    module.verify().map_err(|e| CompileError::Verification {
        reason: e.to_string(),
    })?;
    module.set_triple(&machine.get_triple());
    module.set_data_layout(&machine.get_target_data().get_data_layout());

    optimize(&module, &machine, passes)?;

    let object = machine
        .write_to_memory_buffer(&module, FileType::Object)
        .map_err(|e| CompileError::Codegen {
            reason: format!("object emission failed: {e}"),
        })?;
    // Copy out before the buffer and the module go away.
    let bytes = object.as_slice().to_vec();
    drop(object);
    drop(module);

    if bytes.is_empty() {
        return Err(CompileError::Codegen {
            reason: "LLVM emitted an empty object".to_string(),
        });
    }
    log::trace!("emitted {} byte object for {}", bytes.len(), arch);
    Ok(bytes)
}

/// comgr frontend followed by in-process LLVM code generation.
#[derive(Debug, Default, Clone, Copy)]
pub struct IrBackend;

impl Backend for IrBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ir
    }

    fn compile(
        &self,
        request: &CompileRequest<'_>,
        config: &Config,
        session: &CompilationSession,
    ) -> CompileResult<Vec<u8>> {
        let comgr = Comgr::load(config)?;
        let scope = ComgrScope::new(comgr, session);

        let relocatable = if request.assembly {
            // No IR exists for assembly input; comgr assembles it directly.
            let run = ComgrRun::start(scope, request, config)?;
            run.assemble(request.arch)?;
            run.relocatable_bytes()?
        } else {
            let bitcode = {
                let run = ComgrRun::start(scope, request, config)?;
                run.compile_source(request.arch, config)?;
                run.bitcode_bytes()?
            };
            session.enter_stage(IR_CODEGEN_STAGE);
            codegen_bitcode(&bitcode, request.arch, &config.passes)?
        };

        LinkStage::new(request.arch, config, session).link(&[&relocatable])
    }
}
