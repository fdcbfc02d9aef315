//! Link stage: relocatable objects to a loadable code object.
//!
//! Every backend finishes here, so link behaviour does not depend on how the
//! relocatables were produced. The driver is chosen by [`LinkerKind`]:
//!
//! - [`LinkerKind::Comgr`]: comgr's `LINK_RELOCATABLE_TO_EXECUTABLE` action
//!   with its own data sets and an options bag whose option list is empty
//! - [`LinkerKind::Lld`]: ROCm's `ld.lld`, fed through temporary files
//!
//! A link failure is terminal; nothing is retried.

use crate::comgr::{ActionKind, Comgr, ComgrScope, DataKind};
use crate::core::{run_tool, Arch, CompilationSession, CompileError, CompileResult, Config};
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

pub const LINK_STAGE: &str = "link";

/// Which linker drives the link stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkerKind {
    Comgr,
    Lld,
}

impl FromStr for LinkerKind {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "comgr" => Ok(LinkerKind::Comgr),
            "lld" | "ld.lld" => Ok(LinkerKind::Lld),
            other => Err(CompileError::Config {
                reason: format!("unknown linker {other:?}, expected comgr or lld"),
            }),
        }
    }
}

impl fmt::Display for LinkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkerKind::Comgr => "comgr",
            LinkerKind::Lld => "lld",
        })
    }
}

/// The link stage for one compile call.
pub struct LinkStage<'a> {
    arch: &'a Arch,
    config: &'a Config,
    session: &'a CompilationSession,
}

impl<'a> LinkStage<'a> {
    pub fn new(arch: &'a Arch, config: &'a Config, session: &'a CompilationSession) -> Self {
        Self {
            arch,
            config,
            session,
        }
    }

    /// Link `objects` into a shared object for the target ISA.
    pub fn link(&self, objects: &[&[u8]]) -> CompileResult<Vec<u8>> {
        if objects.is_empty() || objects.iter().any(|o| o.is_empty()) {
            return Err(CompileError::Link {
                reason: "no relocatable object to link".to_string(),
                log: String::new(),
            });
        }
        log::debug!(
            "Linking {} object(s) for {} with {}",
            objects.len(),
            self.arch,
            self.config.linker
        );
        match self.config.linker {
            LinkerKind::Comgr => self.link_with_comgr(objects),
            LinkerKind::Lld => self.link_with_lld(objects),
        }
    }

    fn link_with_comgr(&self, objects: &[&[u8]]) -> CompileResult<Vec<u8>> {
        let comgr = Comgr::load(self.config)?;
        let scope = ComgrScope::new(comgr, self.session);

        let info = scope.action_info()?;
        info.set_isa_name(&self.arch.isa_name())?;
        info.set_logging(self.config.comgr_logging)?;
        // The linker takes no compiler flags.
        info.set_options::<&str>(&[])?;

        let relocatable = scope.data_set("relocatable")?;
        let executable = scope.data_set("executable")?;
        for (index, object) in objects.iter().enumerate() {
            let data =
                scope.data_from_bytes(DataKind::Relocatable, &format!("object{index}.o"), object)?;
            relocatable.add(&data)?;
        }

        info.run(ActionKind::LinkRelocatableToExecutable, &relocatable, &executable)
            .map_err(|e| match e {
                CompileError::StageAction { status, log, .. } => CompileError::Link {
                    reason: format!("comgr link action returned status {status}"),
                    log,
                },
                other => other,
            })?;
        executable.first_bytes(DataKind::Executable)
    }

    fn link_with_lld(&self, objects: &[&[u8]]) -> CompileResult<Vec<u8>> {
        self.session.enter_stage(LINK_STAGE);
        let mut files = Vec::with_capacity(objects.len());
        for object in objects {
            let mut file = tempfile::Builder::new()
                .prefix("hipcomp")
                .suffix(".o")
                .tempfile()?;
            file.write_all(object)?;
            file.flush()?;
            files.push(file);
        }
        let paths: Vec<PathBuf> = files.iter().map(|f| f.path().to_path_buf()).collect();

        let lld = self.config.llvm_tool("ld.lld");
        run_tool(&lld, &self.arch.lld_args(&paths), &[]).map_err(|e| match e {
            CompileError::ProcessInvocation { code, stderr, .. } => CompileError::Link {
                reason: match code {
                    Some(code) => format!("ld.lld exited with code {code}"),
                    None => "ld.lld was killed".to_string(),
                },
                log: stderr,
            },
            other => other,
        })
    }
}
