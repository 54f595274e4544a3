//! Error types for contentflow.
//!
//! Configuration errors are fatal and raised before any stage runs. Stage
//! execution errors are recovered by the orchestrator and turned into
//! `failed`/`skipped` results.

use crate::core::StageId;
use thiserror::Error;

/// The main error type for contentflow operations.
#[derive(Debug, Error)]
pub enum ContentflowError {
    /// The stage graph or run request is malformed.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// A single stage failed to execute.
    #[error("{0}")]
    StageExecution(#[from] StageExecutionError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error raised when the dependency declaration cannot be scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The dependency graph contains a cycle.
    #[error("Cycle detected in stage graph: {}", format_path(.path))]
    CycleDetected {
        /// Stages forming the cycle; the first stage is repeated at the end.
        path: Vec<StageId>,
    },

    /// A stage lists itself as a dependency.
    #[error("Stage '{stage}' cannot depend on itself")]
    SelfDependency {
        /// The offending stage.
        stage: StageId,
    },

    /// A stage lists the same dependency twice.
    #[error("Stage '{stage}' lists dependency '{dependency}' more than once")]
    DuplicateDependency {
        /// The offending stage.
        stage: StageId,
        /// The repeated dependency.
        dependency: StageId,
    },

    /// A stage depends on a stage that is not declared in the graph.
    #[error("Stage '{stage}' depends on unknown stage '{dependency}'")]
    UnknownDependency {
        /// The offending stage.
        stage: StageId,
        /// The missing dependency.
        dependency: StageId,
    },

    /// A run targeted a stage that is not part of the graph.
    #[error("Stage '{stage}' is not part of the stage graph")]
    UnknownStage {
        /// The requested stage.
        stage: StageId,
    },
}

impl ConfigurationError {
    /// Returns the stages involved in the error.
    #[must_use]
    pub fn stages(&self) -> Vec<StageId> {
        match self {
            Self::CycleDetected { path } => path.clone(),
            Self::SelfDependency { stage } | Self::UnknownStage { stage } => vec![*stage],
            Self::DuplicateDependency { stage, dependency }
            | Self::UnknownDependency { stage, dependency } => vec![*stage, *dependency],
        }
    }
}

fn format_path(path: &[StageId]) -> String {
    path.iter()
        .map(|stage| stage.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Error raised by the stage runner for a single stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageExecutionError {
    /// The execution collaborator rejected the call.
    #[error("Stage '{stage}' failed: {message}")]
    Failed {
        /// The stage that failed.
        stage: StageId,
        /// Collaborator error message.
        message: String,
    },

    /// The run was cancelled before or during the call.
    #[error("Stage '{stage}' cancelled: {reason}")]
    Cancelled {
        /// The stage that was cancelled.
        stage: StageId,
        /// Cancellation reason.
        reason: String,
        /// Whether the collaborator call had already started.
        started: bool,
    },
}

impl StageExecutionError {
    /// Creates a failure error.
    #[must_use]
    pub fn failed(stage: StageId, message: impl Into<String>) -> Self {
        Self::Failed {
            stage,
            message: message.into(),
        }
    }

    /// Returns the stage the error belongs to.
    #[must_use]
    pub const fn stage(&self) -> StageId {
        match self {
            Self::Failed { stage, .. } | Self::Cancelled { stage, .. } => *stage,
        }
    }

    /// Returns the human-readable message without the stage prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Failed { message, .. } => message,
            Self::Cancelled { reason, .. } => reason,
        }
    }

    /// Returns true if the error was a cancellation observed before any work started.
    #[must_use]
    pub const fn cancelled_before_start(&self) -> bool {
        matches!(self, Self::Cancelled { started: false, .. })
    }
}
