//! Pipeline orchestration.
//!
//! This module provides:
//! - Run inputs and scheduler settings
//! - The level-by-level orchestrator
//! - Run summaries

mod config;
mod orchestrator;
mod state;
mod summary;

#[cfg(test)]
mod integration_tests;

pub use config::{OrchestratorConfig, PipelineConfig};
pub use orchestrator::{Orchestrator, CANCELLED_REASON};
pub use summary::{FailureRecord, RunSummary};
