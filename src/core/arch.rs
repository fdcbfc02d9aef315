//! Per-architecture toolchain configuration.
//!
//! Every flag handed to comgr, clang, llc or the linker is derived here from
//! structured data. The spelling must match what the ROCm toolchain expects;
//! a mismatch surfaces as a compile or link failure, never a silent miscompile.

use super::error::{CompileError, CompileResult};
use std::fmt;
use std::path::{Path, PathBuf};

/// LLVM target triple for AMD GPUs running under the HSA runtime.
pub const AMDGCN_TRIPLE: &str = "amdgcn-amd-amdhsa";

/// Target features enabled for every architecture.
pub const TARGET_FEATURES: &str = "+cumode";

/// HIP runtime version the kernels are compiled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HipVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

pub const HIP_VERSION: HipVersion = HipVersion {
    major: 6,
    minor: 0,
    patch: 32830,
};

impl fmt::Display for HipVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Code object ABI version of the linked device libraries.
const ABI_VERSION: u32 = 500;

/// Optimization flag used by every compiling stage.
const OPT_LEVEL: &str = "-O3";

/// Frontend flags shared by all architectures, after the version macros.
const FRONTEND_FLAGS: &[&str] = &[
    "-std=c++14",
    "-nogpuinc",
    "-Wno-gnu-line-marker",
    "-Wno-missing-prototypes",
];

/// Backend option keeping only kernel entry points externally visible.
pub const INTERNALIZE_SYMBOLS: &str = "-amdgpu-internalize-symbols";

/// Device library toggles linked into every kernel, in link order.
const DEVICE_LIBRARY_TOGGLES: &[&str] = &[
    "oclc_daz_opt_off",
    "oclc_unsafe_math_off",
    "oclc_finite_only_off",
    "oclc_correctly_rounded_sqrt_on",
];

/// A parsed AMDGPU architecture such as `gfx1100`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Arch {
    name: String,
}

impl Arch {
    /// Parse an architecture id.
    ///
    /// Accepts `gfx` followed by a hex ISA version (`gfx90a`, `gfx1100`), and an
    /// optional target-id suffix such as `:xnack-`.
    pub fn parse(name: &str) -> CompileResult<Self> {
        let invalid = || CompileError::InvalidArch {
            arch: name.to_string(),
        };
        let (processor, _target_id) = name.split_once(':').unwrap_or((name, ""));
        let version = processor.strip_prefix("gfx").ok_or_else(invalid)?;
        if version.len() < 3 || !version.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        if version.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(invalid());
        }
        Ok(Self {
            name: name.to_string(),
        })
    }

    /// Full architecture id, including any target-id suffix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Processor name without target-id features, used as the LLVM CPU.
    pub fn processor(&self) -> &str {
        self.name.split(':').next().unwrap_or(&self.name)
    }

    /// ISA version digits, e.g. `1100` for `gfx1100`.
    pub fn isa_version(&self) -> &str {
        &self.processor()[3..]
    }

    /// ISA name understood by comgr.
    pub fn isa_name(&self) -> String {
        format!("{}--{}", AMDGCN_TRIPLE, self.name)
    }

    /// LLVM feature string: the shared features plus any target-id settings,
    /// e.g. `gfx90a:xnack-` gives `+cumode,-xnack`.
    pub fn target_features(&self) -> String {
        let mut features = vec![TARGET_FEATURES.to_string()];
        for setting in self.name.split(':').skip(1) {
            if let Some(feature) = setting.strip_suffix('+') {
                features.push(format!("+{feature}"));
            } else if let Some(feature) = setting.strip_suffix('-') {
                features.push(format!("-{feature}"));
            }
        }
        features.join(",")
    }

    /// GFX9 and older run 64-wide wavefronts; RDNA defaults to wave32.
    pub fn wavefront64(&self) -> bool {
        self.isa_version().len() == 3
    }

    /// Preprocessor macros defined for the HIP frontend.
    pub fn macros(&self) -> Vec<(&'static str, Option<String>)> {
        vec![
            ("HIP_VERSION_MAJOR", Some(HIP_VERSION.major.to_string())),
            ("HIP_VERSION_MINOR", Some(HIP_VERSION.minor.to_string())),
            ("HIP_VERSION_PATCH", Some(HIP_VERSION.patch.to_string())),
            ("__HIPCC_RTC__", None),
        ]
    }

    fn macro_flags(&self) -> impl Iterator<Item = String> {
        self.macros().into_iter().map(|(name, value)| match value {
            Some(value) => format!("-D{name}={value}"),
            None => format!("-D{name}"),
        })
    }

    /// Options for the comgr SOURCE -> BITCODE stage.
    pub fn compile_options(&self, rocm: &Path) -> Vec<String> {
        let mut options = vec![
            OPT_LEVEL.to_string(),
            "-mcumode".to_string(),
            format!("--hip-version={}", HIP_VERSION),
        ];
        options.extend(self.macro_flags());
        options.extend(FRONTEND_FLAGS.iter().map(|f| f.to_string()));
        options.push(format!("--offload-arch={}", self.name));
        options.push(format!("-I{}", rocm.join("include").display()));
        // Leave optimization to the codegen stage.
        options.push("-Xclang".to_string());
        options.push("-disable-llvm-passes".to_string());
        options
    }

    /// Options for the comgr BITCODE -> RELOCATABLE stage.
    pub fn codegen_options(&self) -> Vec<String> {
        vec![
            OPT_LEVEL.to_string(),
            "-mllvm".to_string(),
            INTERNALIZE_SYMBOLS.to_string(),
        ]
    }

    /// Options for assembling raw GCN assembly.
    pub fn assemble_options(&self) -> Vec<String> {
        Vec::new()
    }

    /// Device bitcode libraries linked by the frontend, in link order.
    pub fn device_libraries(&self, rocm: &Path) -> Vec<PathBuf> {
        let dir = rocm.join("amdgcn").join("bitcode");
        let wave = if self.wavefront64() { "on" } else { "off" };
        let mut names: Vec<String> = vec!["hip".into(), "ocml".into(), "ockl".into()];
        names.extend(DEVICE_LIBRARY_TOGGLES.iter().map(|n| n.to_string()));
        names.push(format!("oclc_wavefrontsize64_{wave}"));
        names.push(format!("oclc_isa_version_{}", self.isa_version()));
        names.push(format!("oclc_abi_version_{ABI_VERSION}"));
        names
            .into_iter()
            .map(|name| dir.join(format!("{name}.bc")))
            .collect()
    }

    /// Arguments for the legacy clang device-only compile to textual IR.
    pub fn clang_args(&self, rocm: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-x".into(),
            "hip".into(),
            format!("--rocm-path={}", rocm.display()),
            format!("--offload-arch={}", self.name),
            OPT_LEVEL.into(),
            "-S".into(),
            "-emit-llvm".into(),
            "--cuda-device-only".into(),
            "-nogpuinc".into(),
        ];
        args.extend(self.macro_flags());
        args.extend(["-".into(), "-o".into(), "-".into()]);
        args
    }

    /// Arguments for `llc` lowering textual IR to an object on stdout.
    pub fn llc_args(&self) -> Vec<String> {
        vec![
            format!("-mtriple={AMDGCN_TRIPLE}"),
            format!("-mcpu={}", self.processor()),
            OPT_LEVEL.into(),
            "-filetype=obj".into(),
            format!("-mattr={}", self.target_features()),
            "-".into(),
            "-o".into(),
            "-".into(),
        ]
    }

    /// Arguments for `llvm-mc` assembling GCN assembly to an object on stdout.
    pub fn mc_args(&self) -> Vec<String> {
        vec![
            format!("-triple={AMDGCN_TRIPLE}"),
            format!("-mcpu={}", self.processor()),
            "-filetype=obj".into(),
            "-".into(),
            "-o".into(),
            "-".into(),
        ]
    }

    /// Arguments for `ld.lld`, given the relocatable object paths.
    pub fn lld_args(&self, objects: &[PathBuf]) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--no-undefined".into(),
            "-shared".into(),
            "--enable-new-dtags".into(),
        ];
        args.extend(objects.iter().map(|p| p.display().to_string()));
        args.push(format!("-plugin-opt=mcpu={}", self.processor()));
        args.extend(["-o".into(), "-".into()]);
        args
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl std::str::FromStr for Arch {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Arch::parse(s)
    }
}
