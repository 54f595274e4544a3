//! Scripted collaborators for testing pipelines.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::{FieldMap, StageId, StageMetrics};
use crate::runner::{ExecutionRequest, ExecutionResponse, RunRecorder, StageExecutor, StageRunRecord};

/// One call observed by [`ScriptedExecutor`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorCall {
    /// The stage that was executed.
    pub stage: StageId,
    /// Effective input.
    pub input: FieldMap,
    /// Output language.
    pub language: String,
    /// Active configuration id.
    pub config_id: Option<String>,
    /// Model from the resolved parameters.
    pub model: String,
}

#[derive(Debug, Clone)]
enum Script {
    Respond(ExecutionResponse),
    Fail(String),
    CancelRun(String),
}

/// An execution collaborator that returns scripted responses per stage.
///
/// Unscripted stages succeed with `{"stage": "<name>"}`.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: HashMap<StageId, Script>,
    delays: HashMap<StageId, Duration>,
    default_delay: Duration,
    calls: Mutex<Vec<ExecutorCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedExecutor {
    /// Creates an executor where every stage succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a stage succeed with the given output.
    #[must_use]
    pub fn with_output(self, stage: StageId, output: serde_json::Value) -> Self {
        self.with_response(stage, ExecutionResponse::with_output(output))
    }

    /// Makes a stage return the given response.
    #[must_use]
    pub fn with_response(mut self, stage: StageId, response: ExecutionResponse) -> Self {
        self.scripts.insert(stage, Script::Respond(response));
        self
    }

    /// Makes a stage fail with an error.
    #[must_use]
    pub fn with_failure(mut self, stage: StageId, error: impl Into<String>) -> Self {
        self.scripts.insert(stage, Script::Fail(error.into()));
        self
    }

    /// Makes a stage cancel the whole run while it is in flight.
    #[must_use]
    pub fn with_run_cancellation(mut self, stage: StageId, reason: impl Into<String>) -> Self {
        self.scripts.insert(stage, Script::CancelRun(reason.into()));
        self
    }

    /// Delays every call.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Delays calls for one stage.
    #[must_use]
    pub fn with_stage_delay(mut self, stage: StageId, delay: Duration) -> Self {
        self.delays.insert(stage, delay);
        self
    }

    /// Returns every call in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<ExecutorCall> {
        self.calls.lock().clone()
    }

    /// Returns the stages that were invoked, in arrival order.
    #[must_use]
    pub fn invoked_stages(&self) -> Vec<StageId> {
        self.calls.lock().iter().map(|c| c.stage).collect()
    }

    /// Returns how often a stage was invoked.
    #[must_use]
    pub fn call_count(&self, stage: StageId) -> usize {
        self.calls.lock().iter().filter(|c| c.stage == stage).count()
    }

    /// Returns the total number of calls.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the input of the first call for a stage.
    #[must_use]
    pub fn input_for(&self, stage: StageId) -> Option<FieldMap> {
        self.calls
            .lock()
            .iter()
            .find(|c| c.stage == stage)
            .map(|c| c.input.clone())
    }

    /// Returns the highest number of calls that were in flight at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StageExecutor for ScriptedExecutor {
    async fn execute(&self, request: ExecutionRequest<'_>) -> anyhow::Result<ExecutionResponse> {
        self.calls.lock().push(ExecutorCall {
            stage: request.stage,
            input: request.input.clone(),
            language: request.language.to_string(),
            config_id: request.config_id.map(str::to_string),
            model: request.parameters.model.clone(),
        });

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let delay = self
            .delays
            .get(&request.stage)
            .copied()
            .unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match self.scripts.get(&request.stage) {
            Some(Script::Respond(response)) => Ok(response.clone()),
            Some(Script::Fail(error)) => Err(anyhow::anyhow!("{error}")),
            Some(Script::CancelRun(reason)) => {
                request.cancel.cancel(reason.clone());
                std::future::pending().await
            }
            None => Ok(ExecutionResponse {
                output: Some(serde_json::json!({ "stage": request.stage.as_str() })),
                raw_response: String::new(),
                metrics: StageMetrics {
                    latency_ms: 1.0,
                    input_tokens: 10,
                    output_tokens: 5,
                },
                quality_score: None,
            }),
        }
    }
}

/// A recorder that always fails, for checking failure isolation.
#[derive(Debug, Default)]
pub struct FailingRecorder {
    attempts: AtomicUsize,
}

impl FailingRecorder {
    /// Creates a new failing recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many records were attempted.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RunRecorder for FailingRecorder {
    async fn record_run(&self, _record: &StageRunRecord) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("persistence unavailable")
    }
}

/// A recorder that keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    records: Mutex<Vec<StageRunRecord>>,
}

impl MemoryRecorder {
    /// Creates a new in-memory recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all records.
    #[must_use]
    pub fn records(&self) -> Vec<StageRunRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl RunRecorder for MemoryRecorder {
    async fn record_run(&self, record: &StageRunRecord) -> anyhow::Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}
