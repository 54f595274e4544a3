//! Level-by-level pipeline orchestrator.
//!
//! Levels run strictly in sequence. Within a level every stage is driven
//! concurrently by a `FuturesUnordered` that is drained before the next level
//! starts, which is the only synchronization barrier besides the inter-level
//! delay.

use super::state::{RunState, TerminalCause};
use super::{OrchestratorConfig, PipelineConfig};
use crate::cancellation::CancellationToken;
use crate::core::{FieldMap, StageId, StageResult, StageResults, StageStatus};
use crate::errors::ConfigurationError;
use crate::graph::{build_levels, ExecutionLevel, ExtractionRules, LevelScope, StageGraph};
use crate::progress::ProgressSink;
use crate::runner::StageRunner;
use futures::stream::{FuturesUnordered, StreamExt};
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, debug_span, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Skip reason used when a stage never started because the run was cancelled.
pub const CANCELLED_REASON: &str = "cancelled";

/// Runs content stages according to their dependency graph.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    graph: StageGraph,
    rules: ExtractionRules,
    runner: StageRunner,
    config: OrchestratorConfig,
}

/// Borrowed inputs shared by every stage future of a run.
struct RunContext<'a, P: ?Sized> {
    run_id: Uuid,
    graph: &'a StageGraph,
    config: &'a PipelineConfig,
    state: &'a RunState,
    permits: Option<&'a Semaphore>,
    on_update: &'a P,
    cancel: &'a CancellationToken,
}

impl Orchestrator {
    /// Creates an orchestrator over the default content graph and rules.
    #[must_use]
    pub fn new(runner: StageRunner) -> Self {
        Self {
            graph: StageGraph::default_content_graph(),
            rules: ExtractionRules::default_rules(),
            runner,
            config: OrchestratorConfig::default(),
        }
    }

    /// Sets the stage graph.
    #[must_use]
    pub fn with_graph(mut self, graph: StageGraph) -> Self {
        self.graph = graph;
        self
    }

    /// Sets the extraction rules.
    #[must_use]
    pub fn with_rules(mut self, rules: ExtractionRules) -> Self {
        self.rules = rules;
        self
    }

    /// Sets the scheduler settings.
    #[must_use]
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the stage graph.
    #[must_use]
    pub const fn graph(&self) -> &StageGraph {
        &self.graph
    }

    /// Returns the scheduler settings.
    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Computes the levels a run would execute, without running anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is cyclic or the target is unknown.
    pub fn plan(
        &self,
        config: &PipelineConfig,
        scope: LevelScope,
    ) -> Result<Vec<ExecutionLevel>, ConfigurationError> {
        self.scoped_graph(config, scope)
            .and_then(|graph| build_levels(&graph, scope))
    }

    /// Runs every stage enabled by `config`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] before any stage runs if the graph
    /// cannot be scheduled. Stage failures are reported in the results.
    pub async fn run<P>(
        &self,
        config: &PipelineConfig,
        on_update: &P,
        cancel: &CancellationToken,
    ) -> Result<StageResults, ConfigurationError>
    where
        P: ProgressSink + ?Sized,
    {
        self.run_scoped(config, LevelScope::All, on_update, cancel).await
    }

    /// Runs `target` and its upstream chain only.
    ///
    /// Optional ancestors of `target` run even when they are not enabled.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] if the graph is cyclic or `target` is
    /// not part of it.
    pub async fn run_up_to<P>(
        &self,
        target: StageId,
        base_input: FieldMap,
        language: &str,
        on_update: &P,
        cancel: &CancellationToken,
    ) -> Result<StageResults, ConfigurationError>
    where
        P: ProgressSink + ?Sized,
    {
        let config = PipelineConfig::new(base_input).with_language(language);
        self.run_up_to_with_config(target, &config, on_update, cancel)
            .await
    }

    /// Runs `target` and its upstream chain with a full run configuration.
    ///
    /// # Errors
    ///
    /// Same as [`Self::run_up_to`].
    pub async fn run_up_to_with_config<P>(
        &self,
        target: StageId,
        config: &PipelineConfig,
        on_update: &P,
        cancel: &CancellationToken,
    ) -> Result<StageResults, ConfigurationError>
    where
        P: ProgressSink + ?Sized,
    {
        self.run_scoped(config, LevelScope::UpTo(target), on_update, cancel)
            .await
    }

    fn scoped_graph(
        &self,
        config: &PipelineConfig,
        scope: LevelScope,
    ) -> Result<StageGraph, ConfigurationError> {
        let target = match scope {
            LevelScope::All => None,
            LevelScope::UpTo(target) => {
                if !self.graph.contains(target) {
                    return Err(ConfigurationError::UnknownStage { stage: target });
                }
                Some(target)
            }
        };
        Ok(self
            .graph
            .with_enabled_optional(&config.effective_optional_stages(), target))
    }

    async fn run_scoped<P>(
        &self,
        config: &PipelineConfig,
        scope: LevelScope,
        on_update: &P,
        cancel: &CancellationToken,
    ) -> Result<StageResults, ConfigurationError>
    where
        P: ProgressSink + ?Sized,
    {
        let graph = self.scoped_graph(config, scope)?;
        let levels = build_levels(&graph, scope)?;

        let run_id = Uuid::new_v4();
        let start = Instant::now();
        let state = RunState::new(
            levels.iter().flat_map(|l| l.stages.iter().copied()),
            &config.preseeded_outputs,
        );
        let permits = self
            .config
            .max_concurrent_stages
            .map(|limit| Semaphore::new(limit.max(1)));
        let ctx = RunContext {
            run_id,
            graph: &graph,
            config,
            state: &state,
            permits: permits.as_ref(),
            on_update,
            cancel,
        };

        info!(
            run_id = %run_id,
            scope = ?scope,
            levels = levels.len(),
            "Starting pipeline run"
        );

        Self::settle_preseeded(&ctx, &levels);
        self.drive_levels(&ctx, &levels)
            .instrument(info_span!("pipeline_run", run_id = %run_id))
            .await;

        let results = state.into_results();
        info!(
            run_id = %run_id,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            stages = results.len(),
            failed = results.values().filter(|r| r.status == StageStatus::Failed).count(),
            "Pipeline run finished"
        );
        Ok(results)
    }

    async fn drive_levels<P>(&self, ctx: &RunContext<'_, P>, levels: &[ExecutionLevel])
    where
        P: ProgressSink + ?Sized,
    {
        let delay = self.config.inter_level_delay();

        for (index, level) in levels.iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                Self::skip_remaining(ctx, &levels[index..]);
                return;
            }

            if index > 0 && !delay.is_zero() {
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = ctx.cancel.cancelled() => {}
                }
                if ctx.cancel.is_cancelled() {
                    Self::skip_remaining(ctx, &levels[index..]);
                    return;
                }
            }

            debug!(run_id = %ctx.run_id, level = level.level, stages = ?level.stages, "Starting execution level");

            let mut in_flight: FuturesUnordered<_> = level
                .stages
                .iter()
                .copied()
                .filter(|stage| !ctx.state.is_settled(*stage))
                .map(|stage| {
                    self.run_stage(ctx, stage)
                        .instrument(debug_span!("stage", stage = %stage))
                })
                .collect();
            while in_flight.next().await.is_some() {}
        }
    }

    async fn run_stage<P>(&self, ctx: &RunContext<'_, P>, stage: StageId)
    where
        P: ProgressSink + ?Sized,
    {
        let dependencies = ctx.graph.dependencies(stage);
        if let Some(cause) = ctx.state.blocking_cause(dependencies) {
            debug!(run_id = %ctx.run_id, stage = %stage, origin = %cause.origin, "Skipping stage");
            ctx.state.mark_terminal(stage, cause);
            Self::publish(ctx, &StageResult::pending(stage).skip(cause.upstream_reason()));
            return;
        }

        let _permit = match ctx.permits {
            Some(semaphore) => semaphore.acquire().await.ok(),
            None => None,
        };

        if ctx.cancel.is_cancelled() {
            Self::skip_cancelled(ctx, StageResult::pending(stage));
            return;
        }

        let input = self.effective_input(ctx, stage);
        if let Some(declaration) = ctx.graph.config(stage) {
            let missing = declaration.missing_fields(&input);
            if !missing.is_empty() {
                debug!(stage = %stage, missing = ?missing, "Stage input lacks required fields");
            }
        }

        let running = StageResult::running(stage);
        Self::publish(ctx, &running);

        match self
            .runner
            .execute(ctx.run_id, stage, &input, &ctx.config.language, ctx.cancel)
            .await
        {
            Ok(outcome) => {
                ctx.state.record_output(stage, outcome.output.clone());
                let result = running
                    .complete(outcome.output)
                    .with_metrics(outcome.metrics)
                    .with_quality_score(outcome.quality_score);
                Self::publish(ctx, &result);
            }
            Err(err) if err.cancelled_before_start() => {
                Self::skip_cancelled(ctx, running);
            }
            Err(err) => {
                warn!(run_id = %ctx.run_id, stage = %stage, error = %err, "Stage failed");
                ctx.state.mark_terminal(stage, TerminalCause::failed(stage));
                Self::publish(ctx, &running.fail(err.message()));
            }
        }
    }

    /// Merges the base input with fields extracted from every dependency.
    ///
    /// Dependencies are applied in declaration order, so a later dependency
    /// overwrites an earlier one on field collisions.
    fn effective_input<P>(&self, ctx: &RunContext<'_, P>, stage: StageId) -> FieldMap
    where
        P: ProgressSink + ?Sized,
    {
        let mut input = ctx.config.base_input.clone();
        for &dep in ctx.graph.dependencies(stage) {
            if let Some(output) = ctx.state.output(dep) {
                input.extend(self.rules.extract(dep, stage, &output));
            }
        }
        input
    }

    fn settle_preseeded<P>(ctx: &RunContext<'_, P>, levels: &[ExecutionLevel])
    where
        P: ProgressSink + ?Sized,
    {
        for stage in levels.iter().flat_map(|l| l.stages.iter().copied()) {
            if let Some(output) = ctx.config.preseeded_outputs.get(&stage) {
                debug!(run_id = %ctx.run_id, stage = %stage, "Reusing preseeded output");
                Self::publish(ctx, &StageResult::pending(stage).complete(output.clone()));
            }
        }
    }

    fn skip_remaining<P>(ctx: &RunContext<'_, P>, levels: &[ExecutionLevel])
    where
        P: ProgressSink + ?Sized,
    {
        info!(run_id = %ctx.run_id, reason = ?ctx.cancel.reason(), "Run cancelled, skipping remaining stages");
        for stage in levels.iter().flat_map(|l| l.stages.iter().copied()) {
            if !ctx.state.is_settled(stage) {
                Self::skip_cancelled(ctx, StageResult::pending(stage));
            }
        }
    }

    fn skip_cancelled<P>(ctx: &RunContext<'_, P>, result: StageResult)
    where
        P: ProgressSink + ?Sized,
    {
        let stage = result.stage;
        let reason = ctx.cancel.reason().map_or_else(
            || CANCELLED_REASON.to_string(),
            |reason| format!("{CANCELLED_REASON}: {reason}"),
        );
        ctx.state.mark_terminal(stage, TerminalCause::cancelled(stage));
        Self::publish(ctx, &result.skip(reason));
    }

    fn publish<P>(ctx: &RunContext<'_, P>, result: &StageResult)
    where
        P: ProgressSink + ?Sized,
    {
        if ctx.state.transition(result) {
            ctx.on_update.on_update(result.stage, result);
        }
    }
}
