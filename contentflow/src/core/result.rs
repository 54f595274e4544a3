//! Per-stage result records produced by the orchestrator.

use super::{StageId, StageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A map of named input or output fields.
pub type FieldMap = HashMap<String, serde_json::Value>;

/// Final status map of a pipeline run, keyed by stage.
pub type StageResults = HashMap<StageId, StageResult>;

/// Usage metrics reported by the execution collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageMetrics {
    /// Wall-clock latency of the model call in milliseconds.
    pub latency_ms: f64,
    /// Prompt tokens consumed.
    pub input_tokens: u32,
    /// Completion tokens produced.
    pub output_tokens: u32,
}

impl StageMetrics {
    /// Returns total tokens.
    #[must_use]
    pub const fn total_tokens(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// The observable state of one stage in one run.
///
/// `output` is present only for completed stages and `error` only for
/// failed or skipped ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// The stage this result belongs to.
    pub stage: StageId,
    /// Current status.
    pub status: StageStatus,
    /// Parsed stage output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// Failure message or skip reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the runner was invoked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the stage reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Model usage metrics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<StageMetrics>,
    /// Quality score reported by the execution collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
}

impl StageResult {
    /// Creates a pending result.
    #[must_use]
    pub const fn pending(stage: StageId) -> Self {
        Self {
            stage,
            status: StageStatus::Pending,
            output: None,
            error: None,
            started_at: None,
            completed_at: None,
            metrics: None,
            quality_score: None,
        }
    }

    /// Creates a running result stamped with the current time.
    #[must_use]
    pub fn running(stage: StageId) -> Self {
        Self {
            status: StageStatus::Running,
            started_at: Some(Utc::now()),
            ..Self::pending(stage)
        }
    }

    /// Transitions to completed with the given output.
    #[must_use]
    pub fn complete(mut self, output: serde_json::Value) -> Self {
        self.status = StageStatus::Completed;
        self.output = Some(output);
        self.error = None;
        self.completed_at = Some(Utc::now());
        self
    }

    /// Transitions to failed with an error message.
    #[must_use]
    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.status = StageStatus::Failed;
        self.output = None;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        self
    }

    /// Transitions to skipped with a reason.
    #[must_use]
    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.status = StageStatus::Skipped;
        self.output = None;
        self.error = Some(reason.into());
        self.completed_at = Some(Utc::now());
        self
    }

    /// Attaches usage metrics.
    #[must_use]
    pub const fn with_metrics(mut self, metrics: StageMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Attaches a quality score.
    #[must_use]
    pub const fn with_quality_score(mut self, score: Option<f64>) -> Self {
        self.quality_score = score;
        self
    }

    /// Returns the wall-clock duration between start and completion, if both are known.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}
