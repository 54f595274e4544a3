//! Mutable state of a single pipeline run.

use crate::core::{StageId, StageResult, StageResults};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::warn;

/// Why a stage ended without producing an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CauseKind {
    Failed,
    Cancelled,
}

/// The root cause recorded for a failed or skipped stage.
///
/// `origin` is the stage where the problem started; descendants inherit it so
/// skip reasons always name the offending ancestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TerminalCause {
    pub origin: StageId,
    pub kind: CauseKind,
}

impl TerminalCause {
    pub const fn failed(origin: StageId) -> Self {
        Self {
            origin,
            kind: CauseKind::Failed,
        }
    }

    pub const fn cancelled(origin: StageId) -> Self {
        Self {
            origin,
            kind: CauseKind::Cancelled,
        }
    }

    /// Skip reason for a descendant of `origin`.
    pub fn upstream_reason(&self) -> String {
        match self.kind {
            CauseKind::Failed => format!("upstream stage '{}' failed", self.origin),
            CauseKind::Cancelled => format!("upstream stage '{}' was cancelled", self.origin),
        }
    }
}

/// Per-run bookkeeping.
///
/// Each key is written by at most one stage future, so the concurrent maps
/// never see contended writes to the same entry.
#[derive(Debug, Default)]
pub(crate) struct RunState {
    results: DashMap<StageId, StageResult>,
    completed_outputs: DashMap<StageId, serde_json::Value>,
    terminal: DashMap<StageId, TerminalCause>,
}

impl RunState {
    /// Creates state with every in-scope stage pending.
    pub fn new(
        stages: impl IntoIterator<Item = StageId>,
        preseeded: &HashMap<StageId, serde_json::Value>,
    ) -> Self {
        let state = Self::default();
        for stage in stages {
            state.results.insert(stage, StageResult::pending(stage));
        }
        for (stage, output) in preseeded {
            state.completed_outputs.insert(*stage, output.clone());
        }
        state
    }

    /// Applies a status transition. Returns false if it would regress the stage.
    pub fn transition(&self, result: &StageResult) -> bool {
        match self.results.entry(result.stage) {
            Entry::Occupied(mut entry) => {
                let current = entry.get().status;
                if current.can_transition_to(result.status) {
                    entry.insert(result.clone());
                    true
                } else {
                    warn!(
                        stage = %result.stage,
                        from = %current,
                        to = %result.status,
                        "Ignoring illegal stage status transition"
                    );
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(result.clone());
                true
            }
        }
    }

    /// Returns true if the stage already reached a terminal status.
    pub fn is_settled(&self, stage: StageId) -> bool {
        self.results
            .get(&stage)
            .is_some_and(|r| r.status.is_terminal())
    }

    /// Stores a stage output. The first write wins.
    pub fn record_output(&self, stage: StageId, output: serde_json::Value) {
        self.completed_outputs.entry(stage).or_insert(output);
    }

    /// Returns a completed output.
    pub fn output(&self, stage: StageId) -> Option<serde_json::Value> {
        self.completed_outputs.get(&stage).map(|o| o.value().clone())
    }

    /// Marks a stage as failed or skipped.
    pub fn mark_terminal(&self, stage: StageId, cause: TerminalCause) {
        self.terminal.entry(stage).or_insert(cause);
    }

    /// Returns the cause inherited from the first blocked dependency, if any.
    pub fn blocking_cause(&self, dependencies: &[StageId]) -> Option<TerminalCause> {
        dependencies
            .iter()
            .find_map(|dep| self.terminal.get(dep).map(|cause| *cause))
    }

    /// Consumes the state into the final status map.
    ///
    /// Stages left non-terminal are reported as skipped so callers never see
    /// an indeterminate status.
    pub fn into_results(self) -> StageResults {
        self.results
            .into_iter()
            .map(|(stage, result)| {
                if result.status.is_terminal() {
                    (stage, result)
                } else {
                    warn!(stage = %stage, status = %result.status, "Stage left unsettled at end of run");
                    (stage, result.skip("not executed"))
                }
            })
            .collect()
    }
}
