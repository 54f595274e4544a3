//! Testing utilities for contentflow pipelines.
//!
//! This module provides:
//! - A scripted execution collaborator
//! - Recorders for checking persistence behavior
//! - Assertions over run results

mod assertions;
mod mocks;

pub use assertions::{
    assert_all_terminal, assert_result_stages, assert_stage_completed,
    assert_stage_skipped_by, assert_stage_status,
};
pub use mocks::{ExecutorCall, FailingRecorder, MemoryRecorder, ScriptedExecutor};
