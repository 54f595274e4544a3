//! Collaborator ports used by the stage runner.
//!
//! The orchestrator never talks to a model, a configuration store or a
//! database directly. These traits are the seams where callers plug in the
//! real services.

use super::{StageConfig, StageParameters};
use crate::cancellation::CancellationToken;
use crate::core::{FieldMap, StageId, StageMetrics, StageStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use uuid::Uuid;

/// Everything the execution collaborator needs to run one stage.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionRequest<'a> {
    /// The stage to run.
    pub stage: StageId,
    /// Identifier of the active configuration, if one was found.
    pub config_id: Option<&'a str>,
    /// Resolved model parameters.
    pub parameters: &'a StageParameters,
    /// Effective input fields.
    pub input: &'a FieldMap,
    /// Output language.
    pub language: &'a str,
    /// Run cancellation token, for aborting in-flight work.
    pub cancel: &'a CancellationToken,
}

/// A normalized response from the execution collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResponse {
    /// Parsed output; `None` is recorded as JSON null.
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    /// Raw model text.
    #[serde(default)]
    pub raw_response: String,
    /// Usage metrics.
    #[serde(default)]
    pub metrics: StageMetrics,
    /// Quality score, if the collaborator computes one.
    #[serde(default)]
    pub quality_score: Option<f64>,
}

impl ExecutionResponse {
    /// Creates a response carrying a parsed output.
    #[must_use]
    pub fn with_output(output: serde_json::Value) -> Self {
        Self {
            raw_response: output.to_string(),
            output: Some(output),
            ..Self::default()
        }
    }
}

/// Runs one LLM-backed stage.
///
/// Returning `Err` is the only way to signal a stage failure.
#[async_trait]
pub trait StageExecutor: Send + Sync + Debug {
    /// Executes the stage.
    async fn execute(&self, request: ExecutionRequest<'_>) -> anyhow::Result<ExecutionResponse>;
}

/// Resolves the active configuration for a stage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StageConfigProvider: Send + Sync + Debug {
    /// Returns the active configuration, or `None` to use defaults.
    async fn fetch_config(&self, stage: StageId) -> anyhow::Result<Option<StageConfig>>;
}

/// One stage execution as handed to the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRunRecord {
    /// Pipeline run the execution belongs to.
    pub run_id: Uuid,
    /// The stage.
    pub stage: StageId,
    /// Active configuration id, if any.
    pub config_id: Option<String>,
    /// Output language.
    pub language: String,
    /// Effective input.
    pub input: FieldMap,
    /// `completed` or `failed`.
    pub status: StageStatus,
    /// Parsed output for completed runs.
    pub output: Option<serde_json::Value>,
    /// Raw model text for completed runs.
    pub raw_response: Option<String>,
    /// Usage metrics for completed runs.
    pub metrics: Option<StageMetrics>,
    /// Quality score for completed runs.
    pub quality_score: Option<f64>,
    /// Error message for failed runs.
    pub error: Option<String>,
    /// When the record was produced.
    pub recorded_at: DateTime<Utc>,
}

/// Persists stage executions. Failures never affect the pipeline.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RunRecorder: Send + Sync + Debug {
    /// Records one stage execution.
    async fn record_run(&self, record: &StageRunRecord) -> anyhow::Result<()>;
}

/// Configuration provider that never has an active configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfigProvider;

#[async_trait]
impl StageConfigProvider for DefaultConfigProvider {
    async fn fetch_config(&self, _stage: StageId) -> anyhow::Result<Option<StageConfig>> {
        Ok(None)
    }
}

/// Configuration provider backed by a fixed map.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigProvider {
    configs: HashMap<StageId, StageConfig>,
}

impl StaticConfigProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an active configuration for a stage.
    #[must_use]
    pub fn with_config(mut self, stage: StageId, config: StageConfig) -> Self {
        self.configs.insert(stage, config);
        self
    }
}

#[async_trait]
impl StageConfigProvider for StaticConfigProvider {
    async fn fetch_config(&self, stage: StageId) -> anyhow::Result<Option<StageConfig>> {
        Ok(self.configs.get(&stage).cloned())
    }
}

/// A recorder that discards all records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpRecorder;

#[async_trait]
impl RunRecorder for NoOpRecorder {
    async fn record_run(&self, _record: &StageRunRecord) -> anyhow::Result<()> {
        Ok(())
    }
}
