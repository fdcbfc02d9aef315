//! AMDGPU code object inspection.
//!
//! A loadable code object is an ELF64 little-endian shared object with the
//! AMDGPU machine type and the HSA OS ABI. [`validate_code_object`] checks
//! exactly that. [`kernel_names`] lists the kernels it exports.

use crate::core::{CompileError, CompileResult};
use object::read::elf::{ElfFile64, FileHeader};
use object::{Endianness, Object, ObjectKind, ObjectSymbol};

pub const EM_AMDGPU: u16 = 224;
pub const ELFOSABI_AMDGPU_HSA: u8 = 64;

/// Suffix of kernel descriptor symbols.
const KERNEL_DESCRIPTOR_SUFFIX: &str = ".kd";

/// Header fields of an ELF object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfInfo {
    pub kind: ObjectKind,
    pub machine: u16,
    pub os_abi: u8,
    pub abi_version: u8,
    pub flags: u32,
}

impl ElfInfo {
    pub fn is_amdgpu(&self) -> bool {
        self.machine == EM_AMDGPU
    }
}

fn parse(bytes: &[u8]) -> CompileResult<ElfFile64<'_, Endianness>> {
    ElfFile64::<Endianness>::parse(bytes).map_err(|e| CompileError::Link {
        reason: format!("not an ELF64 object: {e}"),
        log: String::new(),
    })
}

/// Read the header of an ELF64 object.
pub fn inspect(bytes: &[u8]) -> CompileResult<ElfInfo> {
    let file = parse(bytes)?;
    let endian = file.endian();
    let header = file.elf_header();
    let ident = header.e_ident();
    Ok(ElfInfo {
        kind: file.kind(),
        machine: header.e_machine(endian),
        os_abi: ident.os_abi,
        abi_version: ident.abi_version,
        flags: header.e_flags(endian),
    })
}

/// Check that `bytes` is a loadable AMDGPU HSA code object.
pub fn validate_code_object(bytes: &[u8]) -> CompileResult<ElfInfo> {
    let info = inspect(bytes)?;
    let reject = |reason: String| {
        Err(CompileError::Link {
            reason,
            log: String::new(),
        })
    };
    if !info.is_amdgpu() {
        return reject(format!("ELF machine {} is not AMDGPU", info.machine));
    }
    if info.os_abi != ELFOSABI_AMDGPU_HSA {
        return reject(format!("ELF OS ABI {} is not AMDGPU HSA", info.os_abi));
    }
    if info.kind != ObjectKind::Dynamic {
        return reject(format!("{:?} object is not a shared object", info.kind));
    }
    Ok(info)
}

/// Names of the kernels a code object exports, sorted.
pub fn kernel_names(bytes: &[u8]) -> CompileResult<Vec<String>> {
    let file = parse(bytes)?;
    let mut names: Vec<String> = file
        .dynamic_symbols()
        .chain(file.symbols())
        .filter_map(|symbol| symbol.name().ok().map(str::to_string))
        .filter_map(|name| name.strip_suffix(KERNEL_DESCRIPTOR_SUFFIX).map(str::to_string))
        .collect();
    names.sort();
    names.dedup();
    Ok(names)
}
