//! Run inputs and orchestrator settings.

use crate::core::{FieldMap, StageId};
use crate::errors::ContentflowError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Inputs for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Fields every stage receives.
    #[serde(default)]
    pub base_input: FieldMap,
    /// Output language.
    #[serde(default = "default_language")]
    pub language: String,
    /// Optional stages to include in the run.
    #[serde(default)]
    pub enabled_optional_stages: HashSet<StageId>,
    /// Outputs computed by an earlier run; these stages are not re-invoked.
    #[serde(default)]
    pub preseeded_outputs: HashMap<StageId, serde_json::Value>,
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_input: FieldMap::new(),
            language: default_language(),
            enabled_optional_stages: HashSet::new(),
            preseeded_outputs: HashMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with the given base input.
    #[must_use]
    pub fn new(base_input: FieldMap) -> Self {
        Self {
            base_input,
            ..Self::default()
        }
    }

    /// Sets the output language.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Adds a base input field.
    #[must_use]
    pub fn with_input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.base_input.insert(key.into(), value);
        self
    }

    /// Enables an optional stage.
    #[must_use]
    pub fn with_optional_stage(mut self, stage: StageId) -> Self {
        self.enabled_optional_stages.insert(stage);
        self
    }

    /// Supplies an already-computed output for a stage.
    #[must_use]
    pub fn with_preseeded_output(mut self, stage: StageId, output: serde_json::Value) -> Self {
        self.preseeded_outputs.insert(stage, output);
        self
    }

    /// Optional stages that take part in the run.
    ///
    /// A preseeded output counts as enabling its stage.
    #[must_use]
    pub fn effective_optional_stages(&self) -> HashSet<StageId> {
        self.enabled_optional_stages
            .iter()
            .chain(self.preseeded_outputs.keys())
            .copied()
            .collect()
    }
}

/// Scheduler settings shared by every run of an orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Pause between consecutive levels, in milliseconds.
    #[serde(default = "default_inter_level_delay_ms")]
    pub inter_level_delay_ms: u64,
    /// Upper bound on concurrent stage calls; `None` means unbounded.
    #[serde(default)]
    pub max_concurrent_stages: Option<usize>,
}

const fn default_inter_level_delay_ms() -> u64 {
    500
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            inter_level_delay_ms: default_inter_level_delay_ms(),
            max_concurrent_stages: None,
        }
    }
}

impl OrchestratorConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON; missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json_str(json: &str) -> Result<Self, ContentflowError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the inter-level delay.
    #[must_use]
    pub fn with_inter_level_delay(mut self, delay: Duration) -> Self {
        self.inter_level_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Bounds the number of concurrent stage calls.
    #[must_use]
    pub const fn with_max_concurrent_stages(mut self, limit: usize) -> Self {
        self.max_concurrent_stages = Some(limit);
        self
    }

    /// Returns the inter-level delay.
    #[must_use]
    pub const fn inter_level_delay(&self) -> Duration {
        Duration::from_millis(self.inter_level_delay_ms)
    }
}
