// This module provides per-call compilation session management. A CompilationSession is
// created for every compile request and shared by reference with every native handle the
// run creates. Handles report their acquisition and release to the session, which keeps a
// ledger per handle kind, so the caller can check after the run that every comgr data
// object, data set and action info was released exactly once, including on failure paths.
// The session also records which stages ran and how many bytes were produced. SessionStats
// is the plain snapshot of that ledger handed back to callers and tests.

//! Per-call compilation session and handle ledger.

use std::cell::RefCell;
use std::fmt;

/// Kinds of native resources tracked by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Data,
    DataSet,
    ActionInfo,
}

/// Statistics gathered during one compile call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// Native handles created, of any kind.
    pub handles_acquired: usize,
    /// Native handles released, of any kind.
    pub handles_released: usize,
    pub data_acquired: usize,
    pub data_released: usize,
    pub sets_acquired: usize,
    pub sets_released: usize,
    pub infos_acquired: usize,
    pub infos_released: usize,
    /// Names of the stages that ran, in order.
    pub stages: Vec<&'static str>,
    /// Size of the produced artifact, zero on failure.
    pub artifact_size: usize,
}

impl SessionStats {
    /// Whether every acquired handle has been released.
    pub fn is_balanced(&self) -> bool {
        self.handles_acquired == self.handles_released
            && self.data_acquired == self.data_released
            && self.sets_acquired == self.sets_released
            && self.infos_acquired == self.infos_released
    }

    /// Handles still alive.
    pub fn outstanding(&self) -> usize {
        self.handles_acquired.saturating_sub(self.handles_released)
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Statistics:")?;
        writeln!(f, "  Stages: {}", self.stages.join(" -> "))?;
        writeln!(
            f,
            "  Handles: {} acquired, {} released",
            self.handles_acquired, self.handles_released
        )?;
        writeln!(
            f,
            "    data {}/{}, sets {}/{}, infos {}/{}",
            self.data_acquired,
            self.data_released,
            self.sets_acquired,
            self.sets_released,
            self.infos_acquired,
            self.infos_released
        )?;
        write!(f, "  Artifact: {} bytes", self.artifact_size)
    }
}

/// Session state for a single compile call.
///
/// Not shared across threads: every call creates its own session.
#[derive(Debug, Default)]
pub struct CompilationSession {
    stats: RefCell<SessionStats>,
}

impl CompilationSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a native handle was created.
    pub fn record_acquire(&self, kind: ResourceKind) {
        let mut stats = self.stats.borrow_mut();
        stats.handles_acquired += 1;
        match kind {
            ResourceKind::Data => stats.data_acquired += 1,
            ResourceKind::DataSet => stats.sets_acquired += 1,
            ResourceKind::ActionInfo => stats.infos_acquired += 1,
        }
    }

    /// Record that a native handle was released.
    pub fn record_release(&self, kind: ResourceKind) {
        let mut stats = self.stats.borrow_mut();
        stats.handles_released += 1;
        match kind {
            ResourceKind::Data => stats.data_released += 1,
            ResourceKind::DataSet => stats.sets_released += 1,
            ResourceKind::ActionInfo => stats.infos_released += 1,
        }
    }

    /// Record that a pipeline stage started.
    pub fn enter_stage(&self, stage: &'static str) {
        log::debug!("stage: {}", stage);
        self.stats.borrow_mut().stages.push(stage);
    }

    pub fn set_artifact_size(&self, size: usize) {
        self.stats.borrow_mut().artifact_size = size;
    }

    /// Snapshot of the current statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }

    pub fn into_stats(self) -> SessionStats {
        self.stats.into_inner()
    }
}
