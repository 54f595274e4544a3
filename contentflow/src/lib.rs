//! # Contentflow
//!
//! Dependency-aware orchestration of LLM-backed marketing content stages.
//!
//! Contentflow runs a fixed set of generation stages (unique selling points,
//! FAQ, chapters, keywords, description, hashtags and more) according to a
//! declared dependency graph:
//!
//! - **Level scheduling**: stages are grouped into levels by dependency depth;
//!   each level runs concurrently and fully settles before the next starts
//! - **Field extraction**: outputs of completed stages are mapped into the
//!   input of their dependents through declarative rules
//! - **Failure propagation**: a failed or cancelled stage causes every
//!   transitive dependent to be skipped
//! - **Partial runs**: run a target stage and only its upstream chain
//! - **Progress reporting**: a callback per stage status transition
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use contentflow::prelude::*;
//!
//! let runner = StageRunner::new(Arc::new(MyExecutor::new()));
//! let orchestrator = Orchestrator::new(runner);
//!
//! let config = PipelineConfig::new(base_input).with_language("en");
//! let results = orchestrator
//!     .run(&config, &LoggingProgress::default(), &CancellationToken::new())
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod core;
pub mod errors;
pub mod graph;
pub mod observability;
pub mod pipeline;
pub mod progress;
pub mod runner;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::core::{FieldMap, StageId, StageMetrics, StageResult, StageResults, StageStatus};
    pub use crate::errors::{ConfigurationError, ContentflowError, StageExecutionError};
    pub use crate::graph::{
        build_levels, extract, ExecutionLevel, ExtractionRules, FieldRule, LevelScope,
        StageDependencyConfig, StageGraph,
    };
    pub use crate::observability::{init_tracing, LoggingConfig};
    pub use crate::pipeline::{
        Orchestrator, OrchestratorConfig, PipelineConfig, RunSummary, CANCELLED_REASON,
    };
    pub use crate::progress::{CollectingProgress, LoggingProgress, NoOpProgress, ProgressSink};
    pub use crate::runner::{
        ExecutionRequest, ExecutionResponse, RunRecorder, StageConfig, StageConfigProvider,
        StageExecutor, StageParameters, StageRunner,
    };
}
