//! Integration tests for orchestrated pipeline runs.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::core::{FieldMap, StageId, StageResult, StageStatus};
    use crate::errors::ConfigurationError;
    use crate::graph::{StageDependencyConfig, StageGraph};
    use crate::pipeline::{Orchestrator, OrchestratorConfig, PipelineConfig, RunSummary};
    use crate::progress::{CollectingProgress, NoOpProgress};
    use crate::runner::StageRunner;
    use crate::testing::{
        assert_all_terminal, assert_result_stages, assert_stage_completed,
        assert_stage_skipped_by, assert_stage_status, FailingRecorder, MemoryRecorder,
        ScriptedExecutor,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn orchestrator(executor: &Arc<ScriptedExecutor>) -> Orchestrator {
        Orchestrator::new(StageRunner::new(executor.clone()))
            .with_config(OrchestratorConfig::new().with_inter_level_delay(Duration::ZERO))
    }

    fn product_input() -> FieldMap {
        [("productName".to_string(), json!("Galaxy S25"))]
            .into_iter()
            .collect()
    }

    fn position(progress: &CollectingProgress, stage: StageId, status: StageStatus) -> usize {
        progress
            .updates()
            .iter()
            .position(|u| u.stage == stage && u.status == status)
            .unwrap_or_else(|| panic!("no {status} update for '{stage}'"))
    }

    fn roots(stages: &[StageId]) -> StageGraph {
        StageGraph::new(stages.iter().map(|&s| (s, StageDependencyConfig::new()))).unwrap()
    }

    #[tokio::test]
    async fn test_full_run_completes_every_required_stage() {
        let executor = Arc::new(ScriptedExecutor::new());
        let progress = CollectingProgress::new();
        let config = PipelineConfig::new(product_input());

        let results = orchestrator(&executor)
            .run(&config, &progress, &CancellationToken::new())
            .await
            .unwrap();

        assert_result_stages(
            &results,
            &[
                StageId::Usps,
                StageId::Chapters,
                StageId::Faq,
                StageId::Keywords,
                StageId::Description,
                StageId::Hashtags,
            ],
        );
        for stage in results.keys() {
            assert_stage_completed(&results, *stage);
            assert_eq!(
                progress.statuses_for(*stage),
                vec![StageStatus::Running, StageStatus::Completed]
            );
        }
        assert_eq!(executor.total_calls(), 6);
        assert_eq!(executor.call_count(StageId::Grounding), 0);
        assert!(RunSummary::from_results(&results).is_success());
    }

    #[tokio::test]
    async fn test_dependencies_complete_before_dependents_start() {
        let executor = Arc::new(ScriptedExecutor::new().with_stage_delay(StageId::Chapters, Duration::from_millis(30)));
        let progress = CollectingProgress::new();
        let config = PipelineConfig::new(product_input())
            .with_optional_stage(StageId::Grounding)
            .with_optional_stage(StageId::CaseStudies);
        let orchestrator = orchestrator(&executor);

        let results = orchestrator
            .run(&config, &progress, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(results.len(), StageId::ALL.len());
        for &stage in results.keys() {
            let started = position(&progress, stage, StageStatus::Running);
            for &dep in orchestrator.graph().dependencies(stage) {
                assert!(position(&progress, dep, StageStatus::Completed) < started);
            }
        }

        // chapters is slow, but its level still has to settle before faq starts
        assert!(
            position(&progress, StageId::Chapters, StageStatus::Completed)
                < position(&progress, StageId::Faq, StageStatus::Running)
        );
    }

    #[tokio::test]
    async fn test_cyclic_graph_fails_before_any_call() {
        let executor = Arc::new(ScriptedExecutor::new());
        let graph = StageGraph::new([
            (StageId::Usps, StageDependencyConfig::new().depends_on([StageId::Description])),
            (StageId::Description, StageDependencyConfig::new().depends_on([StageId::Usps])),
            (StageId::Chapters, StageDependencyConfig::new()),
        ])
        .unwrap();
        let progress = CollectingProgress::new();

        let err = orchestrator(&executor)
            .with_graph(graph)
            .run(&PipelineConfig::default(), &progress, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ConfigurationError::CycleDetected { .. }));
        assert_eq!(executor.total_calls(), 0);
        assert!(progress.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_target_is_rejected() {
        let executor = Arc::new(ScriptedExecutor::new());
        let err = orchestrator(&executor)
            .with_graph(roots(&[StageId::Usps]))
            .run_up_to(StageId::Hashtags, FieldMap::new(), "en", &NoOpProgress, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, ConfigurationError::UnknownStage { stage: StageId::Hashtags });
        assert_eq!(executor.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_failure_skips_transitive_dependents() {
        let executor = Arc::new(ScriptedExecutor::new().with_failure(StageId::Usps, "model refused"));
        let progress = CollectingProgress::new();

        let results = orchestrator(&executor)
            .run(&PipelineConfig::new(product_input()), &progress, &CancellationToken::new())
            .await
            .unwrap();

        assert_stage_status(&results, StageId::Usps, StageStatus::Failed);
        assert_eq!(results[&StageId::Usps].error.as_deref(), Some("model refused"));
        assert_stage_completed(&results, StageId::Chapters);

        for stage in [StageId::Faq, StageId::Keywords, StageId::Description, StageId::Hashtags] {
            assert_stage_skipped_by(&results, stage, "usps");
            assert!(!progress.statuses_for(stage).contains(&StageStatus::Running));
            assert_eq!(executor.call_count(stage), 0);
        }

        let summary = RunSummary::from_results(&results);
        assert_eq!(summary.failed_stages, 1);
        assert_eq!(summary.skipped_stages, 4);
    }

    #[tokio::test]
    async fn test_sibling_failure_is_isolated() {
        let executor = Arc::new(ScriptedExecutor::new().with_failure(StageId::Faq, "timeout"));

        let results = orchestrator(&executor)
            .run(&PipelineConfig::new(product_input()), &NoOpProgress, &CancellationToken::new())
            .await
            .unwrap();

        assert_stage_status(&results, StageId::Faq, StageStatus::Failed);
        for stage in [StageId::Keywords, StageId::Description, StageId::Hashtags] {
            assert_stage_completed(&results, stage);
        }
    }

    #[tokio::test]
    async fn test_outputs_flow_into_dependents() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .with_output(StageId::Usps, json!({"usps": ["A", "B"], "rationale": "internal"})),
        );
        let graph = StageGraph::new([
            (StageId::Usps, StageDependencyConfig::new()),
            (StageId::Description, StageDependencyConfig::new().depends_on([StageId::Usps])),
            (StageId::Hashtags, StageDependencyConfig::new().depends_on([StageId::Description])),
        ])
        .unwrap();

        let results = orchestrator(&executor)
            .with_graph(graph)
            .run(&PipelineConfig::new(product_input()), &NoOpProgress, &CancellationToken::new())
            .await
            .unwrap();

        assert_all_terminal(&results);
        let input = executor.input_for(StageId::Description).unwrap();
        assert_eq!(input["productName"], json!("Galaxy S25"));
        assert_eq!(input["usps"], json!(["A", "B"]));
        assert!(!input.contains_key("rationale"));

        let hashtags = executor.input_for(StageId::Hashtags).unwrap();
        assert_eq!(hashtags["productName"], json!("Galaxy S25"));
        assert!(!hashtags.contains_key("usps"));
    }

    #[tokio::test]
    async fn test_run_up_to_only_runs_upstream_chain() {
        let executor = Arc::new(ScriptedExecutor::new());
        let graph = StageGraph::new([
            (StageId::Usps, StageDependencyConfig::new()),
            (StageId::Chapters, StageDependencyConfig::new()),
            (StageId::Description, StageDependencyConfig::new().depends_on([StageId::Usps])),
            (StageId::Hashtags, StageDependencyConfig::new().depends_on([StageId::Description])),
        ])
        .unwrap();
        let progress = CollectingProgress::new();

        let results = orchestrator(&executor)
            .with_graph(graph)
            .run_up_to(StageId::Description, product_input(), "de", &progress, &CancellationToken::new())
            .await
            .unwrap();

        assert_result_stages(&results, &[StageId::Usps, StageId::Description]);
        assert_eq!(executor.invoked_stages(), vec![StageId::Usps, StageId::Description]);
        assert!(executor.calls().iter().all(|c| c.language == "de"));
        assert!(progress.statuses_for(StageId::Hashtags).is_empty());
    }

    #[tokio::test]
    async fn test_run_up_to_optional_target_is_included() {
        let executor = Arc::new(ScriptedExecutor::new());

        let results = orchestrator(&executor)
            .run_up_to(StageId::CaseStudies, product_input(), "en", &NoOpProgress, &CancellationToken::new())
            .await
            .unwrap();

        assert_result_stages(&results, &[StageId::Grounding, StageId::Usps, StageId::CaseStudies]);
        assert_stage_completed(&results, StageId::CaseStudies);
    }

    #[tokio::test]
    async fn test_run_up_to_runs_optional_ancestors() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .with_output(StageId::Grounding, json!({"facts": ["IP68"], "sources": ["press kit"]})),
        );

        let results = orchestrator(&executor)
            .run_up_to(StageId::Usps, product_input(), "en", &NoOpProgress, &CancellationToken::new())
            .await
            .unwrap();

        assert_result_stages(&results, &[StageId::Grounding, StageId::Usps]);
        assert_eq!(executor.invoked_stages(), vec![StageId::Grounding, StageId::Usps]);
        let input = executor.input_for(StageId::Usps).unwrap();
        assert_eq!(input["grounding_facts"], json!(["IP68"]));
        assert_eq!(input["grounding_sources"], json!(["press kit"]));
    }

    #[tokio::test]
    async fn test_run_up_to_reuses_preseeded_ancestor() {
        let executor = Arc::new(ScriptedExecutor::new());
        let progress = CollectingProgress::new();
        let config = PipelineConfig::new(product_input())
            .with_preseeded_output(StageId::Usps, json!({"usps": ["Titanium frame"], "target_audience": "creators"}))
            .with_preseeded_output(StageId::Keywords, json!({"keywords": ["galaxy", "s25"]}));

        let results = orchestrator(&executor)
            .run_up_to_with_config(StageId::Description, &config, &progress, &CancellationToken::new())
            .await
            .unwrap();

        assert_result_stages(
            &results,
            &[StageId::Grounding, StageId::Usps, StageId::Keywords, StageId::Description],
        );
        assert_eq!(executor.call_count(StageId::Usps), 0);
        assert_eq!(executor.call_count(StageId::Keywords), 0);
        assert_eq!(progress.statuses_for(StageId::Usps), vec![StageStatus::Completed]);
        assert_stage_completed(&results, StageId::Description);

        let input = executor.input_for(StageId::Description).unwrap();
        assert_eq!(input["usps"], json!(["Titanium frame"]));
        assert_eq!(input["target_audience"], json!("creators"));
        assert_eq!(input["keywords"], json!(["galaxy", "s25"]));
    }

    #[tokio::test]
    async fn test_cancel_before_start_skips_everything() {
        let executor = Arc::new(ScriptedExecutor::new());
        let cancel = CancellationToken::new();
        cancel.cancel("user closed the page");

        let results = orchestrator(&executor)
            .run(&PipelineConfig::new(product_input()), &NoOpProgress, &cancel)
            .await
            .unwrap();

        assert_eq!(results.len(), 6);
        for stage in results.keys() {
            assert_stage_skipped_by(&results, *stage, "cancelled: user closed the page");
        }
        assert_eq!(executor.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_run_fails_in_flight_and_skips_rest() {
        let executor = Arc::new(ScriptedExecutor::new().with_run_cancellation(StageId::Keywords, "user abort"));
        let progress = CollectingProgress::new();
        let cancel = CancellationToken::new();

        let results = orchestrator(&executor)
            .run(&PipelineConfig::new(product_input()), &progress, &cancel)
            .await
            .unwrap();

        assert!(cancel.is_cancelled());
        assert_all_terminal(&results);
        assert_stage_completed(&results, StageId::Usps);
        assert_stage_status(&results, StageId::Keywords, StageStatus::Failed);
        assert_stage_skipped_by(&results, StageId::Description, "cancelled: user abort");
        assert_stage_skipped_by(&results, StageId::Hashtags, "cancelled: user abort");
        assert_eq!(executor.call_count(StageId::Description), 0);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_inter_level_delay() {
        let executor = Arc::new(ScriptedExecutor::new());
        let graph = StageGraph::new([
            (StageId::Usps, StageDependencyConfig::new()),
            (StageId::Description, StageDependencyConfig::new().depends_on([StageId::Usps])),
        ])
        .unwrap();
        let orchestrator = orchestrator(&executor)
            .with_graph(graph)
            .with_config(OrchestratorConfig::new().with_inter_level_delay(Duration::from_secs(60)));
        let cancel = CancellationToken::new();
        let on_update = |stage: StageId, result: &StageResult| {
            if stage == StageId::Usps && result.status == StageStatus::Completed {
                cancel.cancel("stop");
            }
        };

        let results = tokio::time::timeout(
            Duration::from_secs(5),
            orchestrator.run(&PipelineConfig::default(), &on_update, &cancel),
        )
        .await
        .expect("delay should be interrupted")
        .unwrap();

        assert_stage_completed(&results, StageId::Usps);
        assert_stage_skipped_by(&results, StageId::Description, "cancelled: stop");
    }

    #[tokio::test]
    async fn test_preseeded_outputs_are_reused() {
        let executor = Arc::new(ScriptedExecutor::new());
        let progress = CollectingProgress::new();
        let config = PipelineConfig::new(product_input()).with_preseeded_output(
            StageId::Usps,
            json!({"usps": ["Long battery"], "target_audience": "commuters"}),
        );

        let results = orchestrator(&executor)
            .run(&config, &progress, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(executor.call_count(StageId::Usps), 0);
        assert_stage_completed(&results, StageId::Usps);
        assert_eq!(progress.statuses_for(StageId::Usps), vec![StageStatus::Completed]);

        let input = executor.input_for(StageId::Description).unwrap();
        assert_eq!(input["usps"], json!(["Long battery"]));
        assert_eq!(input["target_audience"], json!("commuters"));
    }

    #[tokio::test]
    async fn test_enabled_optional_stage_feeds_dependents() {
        let executor = Arc::new(
            ScriptedExecutor::new()
                .with_output(StageId::Grounding, json!({"facts": ["5000 mAh"], "sources": ["spec sheet"]})),
        );
        let config = PipelineConfig::new(product_input()).with_optional_stage(StageId::Grounding);

        let results = orchestrator(&executor)
            .run(&config, &NoOpProgress, &CancellationToken::new())
            .await
            .unwrap();

        assert_stage_completed(&results, StageId::Grounding);
        assert!(!results.contains_key(&StageId::CaseStudies));
        assert_eq!(executor.invoked_stages()[0], StageId::Grounding);

        let usps = executor.input_for(StageId::Usps).unwrap();
        assert_eq!(usps["grounding_facts"], json!(["5000 mAh"]));
        assert_eq!(usps["grounding_sources"], json!(["spec sheet"]));
    }

    #[tokio::test]
    async fn test_concurrency_limit_is_respected() {
        let stages = [StageId::Usps, StageId::Chapters, StageId::Faq, StageId::Keywords];

        let bounded = Arc::new(ScriptedExecutor::new().with_delay(Duration::from_millis(20)));
        let results = orchestrator(&bounded)
            .with_graph(roots(&stages))
            .with_config(
                OrchestratorConfig::new()
                    .with_inter_level_delay(Duration::ZERO)
                    .with_max_concurrent_stages(2),
            )
            .run(&PipelineConfig::default(), &NoOpProgress, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 4);
        assert!(bounded.max_in_flight() <= 2);

        let unbounded = Arc::new(ScriptedExecutor::new().with_delay(Duration::from_millis(20)));
        orchestrator(&unbounded)
            .with_graph(roots(&stages))
            .run(&PipelineConfig::default(), &NoOpProgress, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(unbounded.max_in_flight(), 4);
    }

    #[tokio::test]
    async fn test_recorder_failure_does_not_fail_run() {
        let executor = Arc::new(ScriptedExecutor::new());
        let recorder = Arc::new(FailingRecorder::new());
        let runner = StageRunner::new(executor.clone()).with_recorder(recorder.clone());
        let orchestrator = Orchestrator::new(runner)
            .with_config(OrchestratorConfig::new().with_inter_level_delay(Duration::ZERO));

        let results = orchestrator
            .run(&PipelineConfig::new(product_input()), &NoOpProgress, &CancellationToken::new())
            .await
            .unwrap();

        assert!(RunSummary::from_results(&results).is_success());
        assert_eq!(recorder.attempts(), 6);
    }

    #[tokio::test]
    async fn test_records_share_run_id() {
        let executor = Arc::new(ScriptedExecutor::new());
        let recorder = Arc::new(MemoryRecorder::new());
        let runner = StageRunner::new(executor.clone()).with_recorder(recorder.clone());
        let orchestrator = Orchestrator::new(runner)
            .with_config(OrchestratorConfig::new().with_inter_level_delay(Duration::ZERO));
        let config = PipelineConfig::new(product_input());

        orchestrator
            .run(&config, &NoOpProgress, &CancellationToken::new())
            .await
            .unwrap();
        let first = recorder.records();
        assert_eq!(first.len(), 6);
        assert!(first.iter().all(|r| r.run_id == first[0].run_id));
        assert!(first.iter().all(|r| r.status == StageStatus::Completed));

        orchestrator
            .run(&config, &NoOpProgress, &CancellationToken::new())
            .await
            .unwrap();
        let records = recorder.records();
        assert_eq!(records.len(), 12);
        assert_ne!(records[6].run_id, first[0].run_id);
    }

    #[tokio::test]
    async fn test_plan_matches_executed_levels() {
        let executor = Arc::new(ScriptedExecutor::new());
        let orchestrator = orchestrator(&executor);

        let levels = orchestrator
            .plan(&PipelineConfig::default(), crate::graph::LevelScope::All)
            .unwrap();
        let stages: Vec<Vec<StageId>> = levels.into_iter().map(|l| l.stages).collect();

        assert_eq!(
            stages,
            vec![
                vec![StageId::Usps, StageId::Chapters],
                vec![StageId::Faq, StageId::Keywords],
                vec![StageId::Description],
                vec![StageId::Hashtags],
            ]
        );
        assert_eq!(executor.total_calls(), 0);
    }
}
