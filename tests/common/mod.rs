//! Shared helpers for the end-to-end tests.
//!
//! These tests need a ROCm installation. When the pieces a backend depends on
//! are missing the helpers return `None` and the test returns early.

#![allow(dead_code)]

use hipcomp::backend::initialize_amdgpu_target;
use hipcomp::comgr::Comgr;
use hipcomp::{Arch, BackendKind, CompileError, Compiler, Config, LinkerKind};

pub const ARCH: &str = "gfx1100";

/// Elementwise add, written against compiler builtins only.
pub const ADD_KERNEL: &str = r#"
extern "C" __attribute__((global)) void add(float* a, const float* b) {
  int i = __builtin_amdgcn_workitem_id_x();
  a[i] += b[i];
}
"#;

/// Two kernels in one translation unit.
pub const TWO_KERNELS: &str = r#"
extern "C" __attribute__((global)) void scale(float* a, float s) {
  int i = __builtin_amdgcn_workitem_id_x();
  a[i] *= s;
}
extern "C" __attribute__((global)) void zero(float* a) {
  a[__builtin_amdgcn_workitem_id_x()] = 0.0f;
}
"#;

/// A kernel with a loop the optimizer can unroll and vectorize.
pub const LOOP_KERNEL: &str = r#"
extern "C" __attribute__((global)) void sum(float* out, const float* in) {
  float acc = 0.0f;
  for (int j = 0; j < 16; j++) acc += in[j];
  out[0] = acc;
}
"#;

pub const BROKEN_KERNEL: &str = r#"
extern "C" __attribute__((global)) void broken(float* a) {
  a[0] = undeclared_identifier;
}
"#;

/// Bare GCN assembly with one function.
pub const ASM_SOURCE: &str = "
  .text
  .globl stub
  .p2align 8
  .type stub,@function
stub:
  s_endpgm
";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn tool_exists(config: &Config, name: &str) -> bool {
    config.llvm_tool(name).exists()
}

/// Whether everything `kind` needs is installed.
pub fn backend_available(kind: BackendKind, config: &Config) -> bool {
    let linker_ready = match config.linker {
        LinkerKind::Comgr => Comgr::load(config).is_ok(),
        LinkerKind::Lld => tool_exists(config, "ld.lld"),
    };
    let ready = match kind {
        BackendKind::Comgr => Comgr::load(config).is_ok(),
        BackendKind::Ir => Comgr::load(config).is_ok() && initialize_amdgpu_target().is_ok(),
        BackendKind::Clang => {
            let arch = match Arch::parse(ARCH) {
                Ok(arch) => arch,
                Err(_) => return false,
            };
            ["clang", "llc", "llvm-mc"].iter().all(|t| tool_exists(config, t))
                && arch.device_libraries(&config.rocm_path).iter().all(|p| p.exists())
        }
    };
    ready && linker_ready
}

/// A compiler for `kind`, or `None` when ROCm is not installed.
pub fn compiler_or_skip(kind: BackendKind) -> Option<Compiler> {
    init_logging();
    let config = Config::from_env().ok()?.with_backend(kind);
    if !backend_available(kind, &config) {
        println!("⏭️  skipping: {} backend unavailable", kind);
        return None;
    }
    let compiler = Compiler::with_config(ARCH, config).ok()?;
    if kind == BackendKind::Ir && !bitcode_compatible(&compiler) {
        println!("⏭️  skipping: comgr emits bitcode the linked LLVM cannot read");
        return None;
    }
    Some(compiler)
}

/// The IR backend parses comgr's bitcode with the LLVM hipcomp links
/// against; a newer ROCm LLVM writes bitcode an older reader rejects.
fn bitcode_compatible(compiler: &Compiler) -> bool {
    match compiler.compile(ADD_KERNEL) {
        Err(CompileError::Verification { reason }) if reason.contains("unreadable bitcode") => false,
        _ => true,
    }
}

pub fn objdump_or_skip() -> Option<Config> {
    init_logging();
    let config = Config::from_env().ok()?;
    if !tool_exists(&config, "llvm-objdump") {
        println!("⏭️  skipping: llvm-objdump unavailable");
        return None;
    }
    Some(config)
}
