//! End-to-end compilation through every backend.

mod common;

use common::*;
use hipcomp::{elf, BackendKind, CompileError, Compiler};
use std::thread;

#[test]
fn test_minimal_kernel_produces_loadable_code_object() {
    for kind in BackendKind::ALL {
        let Some(compiler) = compiler_or_skip(kind) else { continue };

        let lib = compiler.compile(ADD_KERNEL).expect("compile failed");
        assert!(!lib.is_empty());
        let info = elf::validate_code_object(&lib).expect("not a code object");
        assert!(info.is_amdgpu());
        assert_eq!(elf::kernel_names(&lib).unwrap(), vec!["add".to_string()]);

        println!("✅ {} backend: {} byte code object", kind, lib.len());
    }
}

#[test]
fn test_documented_kernel_compiles_without_hip_headers() {
    let Some(compiler) = compiler_or_skip(BackendKind::Comgr) else { return };

    // The crate-level usage example.
    let lib = compiler
        .compile(r#"extern "C" __attribute__((global)) void k(float* a) { a[0] = 1.0f; }"#)
        .expect("documented example failed");
    assert_eq!(elf::kernel_names(&lib).unwrap(), vec!["k".to_string()]);
    println!("✅ documented example: {} bytes", lib.len());
}

#[test]
fn test_every_kernel_is_exported() {
    for kind in BackendKind::ALL {
        let Some(compiler) = compiler_or_skip(kind) else { continue };

        let lib = compiler.compile(TWO_KERNELS).unwrap();
        assert_eq!(
            elf::kernel_names(&lib).unwrap(),
            vec!["scale".to_string(), "zero".to_string()]
        );
    }
}

#[test]
fn test_invalid_source_fails_with_log() {
    for kind in BackendKind::ALL {
        let Some(compiler) = compiler_or_skip(kind) else { continue };

        let (result, stats) = compiler.compile_with_stats(BROKEN_KERNEL, false);
        let err = result.expect_err("broken source compiled");
        match &err {
            CompileError::StageAction { log, .. } => {
                assert!(log.contains("undeclared_identifier"), "log: {log}");
            }
            CompileError::ProcessInvocation { stderr, .. } => {
                assert!(stderr.contains("undeclared_identifier"), "stderr: {stderr}");
            }
            other => panic!("{} backend: unexpected error {other}", kind),
        }
        assert_eq!(stats.artifact_size, 0);
        println!("✅ {} backend rejected broken source: {}", kind, err);
    }
}

#[test]
fn test_handles_balance_on_success_and_failure() {
    let Some(compiler) = compiler_or_skip(BackendKind::Comgr) else { return };

    let (result, stats) = compiler.compile_with_stats(ADD_KERNEL, false);
    assert!(result.is_ok());
    assert!(stats.handles_acquired > 0);
    assert!(stats.is_balanced(), "{stats}");
    assert_eq!(stats.data_acquired, stats.data_released);
    assert_eq!(stats.sets_acquired, stats.sets_released);
    assert_eq!(stats.infos_acquired, stats.infos_released);
    assert!(stats.stages.last().unwrap().contains("link"));

    let (result, stats) = compiler.compile_with_stats(BROKEN_KERNEL, false);
    assert!(result.is_err());
    assert!(stats.handles_acquired > 0);
    assert!(stats.is_balanced(), "{stats}");
    assert!(!stats.stages.iter().any(|s| s.contains("link")));
}

#[test]
fn test_ir_backend_handles_balance() {
    let Some(compiler) = compiler_or_skip(BackendKind::Ir) else { return };

    let (result, stats) = compiler.compile_with_stats(LOOP_KERNEL, false);
    assert!(result.is_ok());
    assert!(stats.is_balanced(), "{stats}");
    assert!(stats.stages.contains(&"llvm codegen"));
}

#[test]
fn test_compilation_is_deterministic() {
    for kind in BackendKind::ALL {
        let Some(compiler) = compiler_or_skip(kind) else { continue };

        let first = compiler.compile(LOOP_KERNEL).unwrap();
        let second = compiler.compile(LOOP_KERNEL).unwrap();
        assert_eq!(first, second, "{} backend is not deterministic", kind);
    }
}

#[test]
fn test_concurrent_compiles_match_sequential() {
    let Some(reference) = compiler_or_skip(BackendKind::Comgr) else { return };
    let config = reference.config().clone();
    let jobs = [
        (ADD_KERNEL, "gfx1100"),
        (TWO_KERNELS, "gfx1030"),
        (LOOP_KERNEL, "gfx90a"),
        (ADD_KERNEL, "gfx908"),
    ];

    let sequential: Vec<Vec<u8>> = jobs
        .iter()
        .map(|(source, arch)| {
            Compiler::with_config(arch, config.clone())
                .unwrap()
                .compile(source)
                .unwrap()
        })
        .collect();

    let concurrent: Vec<Vec<u8>> = thread::scope(|scope| {
        let handles: Vec<_> = jobs
            .iter()
            .map(|(source, arch)| {
                let config = config.clone();
                scope.spawn(move || Compiler::with_config(arch, config).unwrap().compile(source).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(sequential, concurrent);
}

#[test]
fn test_backends_are_functionally_equivalent() {
    let outputs: Vec<(BackendKind, Vec<u8>)> = BackendKind::ALL
        .into_iter()
        .filter_map(|kind| compiler_or_skip(kind).map(|c| (kind, c)))
        .map(|(kind, compiler)| (kind, compiler.compile(TWO_KERNELS).unwrap()))
        .collect();

    for (kind, lib) in &outputs {
        elf::validate_code_object(lib).unwrap_or_else(|e| panic!("{kind}: {e}"));
        assert_eq!(
            elf::kernel_names(lib).unwrap(),
            elf::kernel_names(&outputs[0].1).unwrap(),
            "{kind} exports different kernels"
        );
    }
}

#[test]
fn test_assembly_mode() {
    for kind in BackendKind::ALL {
        let Some(compiler) = compiler_or_skip(kind) else { continue };

        let lib = compiler.compile_asm(ASM_SOURCE).expect("assembly failed");
        elf::validate_code_object(&lib).unwrap();

        let err = compiler.compile_asm("  not_an_instruction v0\n").unwrap_err();
        assert!(err.log().is_some() || matches!(err, CompileError::ProcessInvocation { .. }));
    }
}
