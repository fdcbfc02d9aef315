// This module implements the action-pipeline backend. Compilation is modelled as a sequence
// of comgr actions over data sets: SOURCE is compiled with the device libraries linked in to
// BITCODE, BITCODE is lowered to a RELOCATABLE object, and the relocatable goes through the
// shared link stage to become the EXECUTABLE code object. In assembly mode the source is
// assembled straight to a relocatable. The options bag is rewritten before every action so
// no flags leak from one stage to the next. When an action fails, the build log is pulled
// from the failing stage's output set and surfaced with the error. ComgrRun owns the sets
// and the options bag of one run and is reused by the IR backend for its frontend stage.

//! comgr action-pipeline backend.

use super::{Backend, BackendKind, CompileRequest};
use crate::comgr::{ActionInfo, ActionKind, Comgr, ComgrScope, DataKind, DataSet, Language};
use crate::core::{Arch, CompilationSession, CompileResult, Config};
use crate::link::LinkStage;

/// Source name comgr sees for HIP input.
const SOURCE_NAME: &str = "<null>";
/// Source name comgr sees for assembly input; the suffix selects the assembler.
const ASSEMBLY_NAME: &str = "<null>.s";

/// The comgr handles of one run.
///
/// Every run creates the same three sets whatever the request; in assembly
/// mode the bitcode set stays empty and is destroyed with the others.
/// Fields drop in declaration order, so teardown always destroys the source,
/// bitcode and relocatable sets, then the options bag.
pub(crate) struct ComgrRun<'s> {
    source: DataSet<'s>,
    bitcode: DataSet<'s>,
    relocatable: DataSet<'s>,
    info: ActionInfo<'s>,
}

impl<'s> ComgrRun<'s> {
    /// Create the run's handles and load the request source.
    pub(crate) fn start(
        scope: ComgrScope<'s>,
        request: &CompileRequest<'_>,
        config: &Config,
    ) -> CompileResult<Self> {
        let info = scope.action_info()?;
        info.set_language(Language::Hip)?;
        info.set_isa_name(&request.arch.isa_name())?;
        info.set_logging(config.comgr_logging)?;

        let run = Self {
            source: scope.data_set("source")?,
            bitcode: scope.data_set("bitcode")?,
            relocatable: scope.data_set("relocatable")?,
            info,
        };

        let name = if request.assembly { ASSEMBLY_NAME } else { SOURCE_NAME };
        let source = scope.data_from_bytes(DataKind::Source, name, request.source.as_bytes())?;
        run.source.add(&source)?;
        Ok(run)
    }

    /// SOURCE -> BITCODE with device libraries linked in.
    pub(crate) fn compile_source(&self, arch: &Arch, config: &Config) -> CompileResult<()> {
        self.info.set_options(&arch.compile_options(&config.rocm_path))?;
        self.info.run(
            ActionKind::CompileSourceWithDeviceLibsToBc,
            &self.source,
            &self.bitcode,
        )
    }

    /// BITCODE -> RELOCATABLE.
    pub(crate) fn codegen(&self, arch: &Arch) -> CompileResult<()> {
        self.info.set_options(&arch.codegen_options())?;
        self.info.run(
            ActionKind::CodegenBcToRelocatable,
            &self.bitcode,
            &self.relocatable,
        )
    }

    /// SOURCE (assembly) -> RELOCATABLE.
    pub(crate) fn assemble(&self, arch: &Arch) -> CompileResult<()> {
        self.info.set_options(&arch.assemble_options())?;
        self.info.run(
            ActionKind::AssembleSourceToRelocatable,
            &self.source,
            &self.relocatable,
        )
    }

    pub(crate) fn bitcode_bytes(&self) -> CompileResult<Vec<u8>> {
        self.bitcode.first_bytes(DataKind::Bitcode)
    }

    pub(crate) fn relocatable_bytes(&self) -> CompileResult<Vec<u8>> {
        self.relocatable.first_bytes(DataKind::Relocatable)
    }
}

/// Compiles through comgr's built-in actions.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActionBackend;

impl Backend for ActionBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Comgr
    }

    fn compile(
        &self,
        request: &CompileRequest<'_>,
        config: &Config,
        session: &CompilationSession,
    ) -> CompileResult<Vec<u8>> {
        let comgr = Comgr::load(config)?;
        let scope = ComgrScope::new(comgr, session);

        let relocatable = {
            let run = ComgrRun::start(scope, request, config)?;
            if request.assembly {
                run.assemble(request.arch)?;
            } else {
                run.compile_source(request.arch, config)?;
                run.codegen(request.arch)?;
            }
            // Copy out before the sets are destroyed.
            run.relocatable_bytes()?
        };
        log::debug!("Relocatable object: {} bytes", relocatable.len());

        LinkStage::new(request.arch, config, session).link(&[&relocatable])
    }
}
