//! Aggregated view of a finished run.

use crate::core::{StageId, StageResults, StageStatus};
use serde::{Deserialize, Serialize};

/// Record of a stage that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Stage name.
    pub stage: StageId,
    /// Final status (`failed` or `skipped`).
    pub status: StageStatus,
    /// Error message or skip reason.
    pub reason: String,
}

/// Summary of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Total number of in-scope stages.
    pub total_stages: usize,
    /// Number of completed stages.
    pub completed_stages: usize,
    /// Number of failed stages.
    pub failed_stages: usize,
    /// Number of skipped stages.
    pub skipped_stages: usize,
    /// Failed and skipped stages, ordered by stage.
    pub failures: Vec<FailureRecord>,
}

impl RunSummary {
    /// Builds a summary from a run's results.
    #[must_use]
    pub fn from_results(results: &StageResults) -> Self {
        let mut summary = Self {
            total_stages: results.len(),
            ..Self::default()
        };

        let mut stages: Vec<_> = results.values().collect();
        stages.sort_by_key(|r| r.stage);

        for result in stages {
            match result.status {
                StageStatus::Completed => summary.completed_stages += 1,
                StageStatus::Failed | StageStatus::Skipped => {
                    if result.status == StageStatus::Failed {
                        summary.failed_stages += 1;
                    } else {
                        summary.skipped_stages += 1;
                    }
                    summary.failures.push(FailureRecord {
                        stage: result.stage,
                        status: result.status,
                        reason: result.error.clone().unwrap_or_default(),
                    });
                }
                StageStatus::Pending | StageStatus::Running => {}
            }
        }

        summary
    }

    /// Returns the share of stages that completed.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total_stages == 0 {
            return 0.0;
        }
        self.completed_stages as f64 / self.total_stages as f64
    }

    /// Returns true if every stage completed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.completed_stages == self.total_stages
    }
}
