//! Stage runner: the boundary around one stage execution.
//!
//! The runner resolves the active configuration, calls the execution
//! collaborator under the run's cancellation token, normalizes the outcome
//! and hands a record to the persistence collaborator on a best-effort basis.

mod params;
mod ports;

pub use params::{StageConfig, StageParameters};
pub use ports::{
    DefaultConfigProvider, ExecutionRequest, ExecutionResponse, NoOpRecorder,
    RunRecorder, StageConfigProvider, StageExecutor, StageRunRecord, StaticConfigProvider,
};

#[cfg(test)]
pub use ports::{MockRunRecorder, MockStageConfigProvider};

use crate::cancellation::CancellationToken;
use crate::core::{FieldMap, StageId, StageMetrics, StageStatus};
use crate::errors::StageExecutionError;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default upper bound for a single persistence call.
pub const DEFAULT_RECORD_TIMEOUT: Duration = Duration::from_secs(5);

/// A successful stage execution.
#[derive(Debug, Clone, PartialEq)]
pub struct StageRunOutcome {
    /// Parsed stage output.
    pub output: serde_json::Value,
    /// Raw model text.
    pub raw_response: String,
    /// Usage metrics.
    pub metrics: StageMetrics,
    /// Quality score, if reported.
    pub quality_score: Option<f64>,
    /// Active configuration id used, if any.
    pub config_id: Option<String>,
}

/// Executes single stages against the configured collaborators.
#[derive(Debug, Clone)]
pub struct StageRunner {
    executor: Arc<dyn StageExecutor>,
    config_provider: Arc<dyn StageConfigProvider>,
    recorder: Arc<dyn RunRecorder>,
    record_timeout: Duration,
}

impl StageRunner {
    /// Creates a runner with default configuration and no persistence.
    #[must_use]
    pub fn new(executor: Arc<dyn StageExecutor>) -> Self {
        Self {
            executor,
            config_provider: Arc::new(DefaultConfigProvider),
            recorder: Arc::new(NoOpRecorder),
            record_timeout: DEFAULT_RECORD_TIMEOUT,
        }
    }

    /// Sets the configuration collaborator.
    #[must_use]
    pub fn with_config_provider(mut self, provider: Arc<dyn StageConfigProvider>) -> Self {
        self.config_provider = provider;
        self
    }

    /// Sets the persistence collaborator.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Arc<dyn RunRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Sets the upper bound for a single persistence call.
    #[must_use]
    pub const fn with_record_timeout(mut self, timeout: Duration) -> Self {
        self.record_timeout = timeout;
        self
    }

    /// Executes one stage.
    ///
    /// # Errors
    ///
    /// Returns [`StageExecutionError::Cancelled`] when the token is signaled
    /// (`started` tells whether the collaborator had been called) and
    /// [`StageExecutionError::Failed`] when the collaborator rejects the call.
    pub async fn execute(
        &self,
        run_id: Uuid,
        stage: StageId,
        input: &FieldMap,
        language: &str,
        cancel: &CancellationToken,
    ) -> Result<StageRunOutcome, StageExecutionError> {
        if cancel.is_cancelled() {
            return Err(StageExecutionError::Cancelled {
                stage,
                reason: cancel.reason_or_default(),
                started: false,
            });
        }

        let (config_id, parameters) = self.resolve_config(stage).await;
        let request = ExecutionRequest {
            stage,
            config_id: config_id.as_deref(),
            parameters: &parameters,
            input,
            language,
            cancel,
        };

        let start = Instant::now();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(StageExecutionError::Cancelled {
                stage,
                reason: cancel.reason_or_default(),
                started: true,
            }),
            response = self.executor.execute(request) => response
                .map(|response| normalize(response, config_id.clone(), start))
                .map_err(|e| StageExecutionError::failed(stage, format!("{e:#}"))),
        };

        let record = StageRunRecord {
            run_id,
            stage,
            config_id,
            language: language.to_string(),
            input: input.clone(),
            status: if result.is_ok() {
                StageStatus::Completed
            } else {
                StageStatus::Failed
            },
            output: result.as_ref().ok().map(|o| o.output.clone()),
            raw_response: result.as_ref().ok().map(|o| o.raw_response.clone()),
            metrics: result.as_ref().ok().map(|o| o.metrics),
            quality_score: result.as_ref().ok().and_then(|o| o.quality_score),
            error: result.as_ref().err().map(|e| e.message().to_string()),
            recorded_at: Utc::now(),
        };
        self.record(&record).await;

        result
    }

    async fn resolve_config(&self, stage: StageId) -> (Option<String>, StageParameters) {
        match self.config_provider.fetch_config(stage).await {
            Ok(Some(config)) => {
                debug!(stage = %stage, config_id = %config.config_id, "Using active stage configuration");
                (Some(config.config_id), config.parameters)
            }
            Ok(None) => (None, StageParameters::defaults_for(stage)),
            Err(e) => {
                warn!(stage = %stage, error = %e, "Stage configuration lookup failed, using defaults");
                (None, StageParameters::defaults_for(stage))
            }
        }
    }

    async fn record(&self, record: &StageRunRecord) {
        match tokio::time::timeout(self.record_timeout, self.recorder.record_run(record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(stage = %record.stage, run_id = %record.run_id, error = %e, "Failed to record stage run");
            }
            Err(_) => {
                warn!(stage = %record.stage, run_id = %record.run_id, "Recording stage run timed out");
            }
        }
    }
}

fn normalize(response: ExecutionResponse, config_id: Option<String>, start: Instant) -> StageRunOutcome {
    let mut metrics = response.metrics;
    if metrics.latency_ms <= 0.0 {
        metrics.latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    }
    StageRunOutcome {
        output: response.output.unwrap_or(serde_json::Value::Null),
        raw_response: response.raw_response,
        metrics,
        quality_score: response.quality_score,
        config_id,
    }
}
