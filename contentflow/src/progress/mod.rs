//! Progress reporting for pipeline runs.
//!
//! The orchestrator calls [`ProgressSink::on_update`] once per stage status
//! transition. Any `Fn(StageId, &StageResult)` closure is a sink, so callers
//! can bridge progress into whatever presentation layer they use.

use crate::core::{StageId, StageResult, StageStatus};
use parking_lot::RwLock;
use tracing::{debug, info, Level};

/// Observer invoked on every stage status transition.
///
/// Implementations must not block; they run on the orchestrator's task.
pub trait ProgressSink: Send + Sync {
    /// Receives the new state of `stage`.
    fn on_update(&self, stage: StageId, result: &StageResult);
}

impl<F> ProgressSink for F
where
    F: Fn(StageId, &StageResult) + Send + Sync,
{
    fn on_update(&self, stage: StageId, result: &StageResult) {
        self(stage, result);
    }
}

/// A sink that discards all updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgress;

impl ProgressSink for NoOpProgress {
    fn on_update(&self, _stage: StageId, _result: &StageResult) {}
}

/// A sink that logs updates using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingProgress {
    level: Level,
}

impl Default for LoggingProgress {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingProgress {
    /// Creates a logging sink with the specified level.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl ProgressSink for LoggingProgress {
    fn on_update(&self, stage: StageId, result: &StageResult) {
        if self.level == Level::DEBUG {
            debug!(
                stage = %stage,
                status = %result.status,
                error = ?result.error,
                "Stage {}: {}", stage, result.status
            );
        } else {
            info!(
                stage = %stage,
                status = %result.status,
                error = ?result.error,
                "Stage {}: {}", stage, result.status
            );
        }
    }
}

/// One update captured by [`CollectingProgress`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// The stage.
    pub stage: StageId,
    /// The status it moved to.
    pub status: StageStatus,
    /// Error or skip reason at the time of the update.
    pub error: Option<String>,
}

/// A sink that collects updates, for tests and for replaying progress.
#[derive(Debug, Default)]
pub struct CollectingProgress {
    updates: RwLock<Vec<ProgressUpdate>>,
}

impl CollectingProgress {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected updates in arrival order.
    #[must_use]
    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.read().clone()
    }

    /// Returns the statuses a stage moved through, in order.
    #[must_use]
    pub fn statuses_for(&self, stage: StageId) -> Vec<StageStatus> {
        self.updates
            .read()
            .iter()
            .filter(|u| u.stage == stage)
            .map(|u| u.status)
            .collect()
    }

    /// Returns the number of collected updates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.updates.read().len()
    }

    /// Returns true if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.read().is_empty()
    }
}

impl ProgressSink for CollectingProgress {
    fn on_update(&self, stage: StageId, result: &StageResult) {
        self.updates.write().push(ProgressUpdate {
            stage,
            status: result.status,
            error: result.error.clone(),
        });
    }
}
