//! Core domain model types for contentflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - The closed set of stage identifiers
//! - Stage status enum
//! - Per-stage result records

mod result;
mod stage_id;
mod status;

pub use result::{FieldMap, StageMetrics, StageResult, StageResults};
pub use stage_id::{StageId, UnknownStageName};
pub use status::StageStatus;
