//! Stage configuration and model parameters.

use crate::core::StageId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Model parameters for one stage invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageParameters {
    /// Model identifier passed to the execution collaborator.
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Completion token budget.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Collaborator-specific extras.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

const fn default_temperature() -> f32 {
    0.7
}

const fn default_max_tokens() -> u32 {
    1024
}

impl Default for StageParameters {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            extra: HashMap::new(),
        }
    }
}

impl StageParameters {
    /// Documented defaults used when no active configuration exists for a stage.
    #[must_use]
    pub fn defaults_for(stage: StageId) -> Self {
        let base = Self::default();
        match stage {
            StageId::Grounding => base.with_temperature(0.2),
            StageId::Description | StageId::Chapters | StageId::CaseStudies => {
                base.with_max_tokens(2048)
            }
            StageId::Hashtags => base.with_temperature(0.9).with_max_tokens(256),
            StageId::Keywords => base.with_temperature(0.3).with_max_tokens(512),
            StageId::Usps | StageId::Faq => base,
        }
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the completion token budget.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// An active stage configuration returned by the configuration collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Identifier of the stored configuration.
    pub config_id: String,
    /// Parameters to use.
    #[serde(default)]
    pub parameters: StageParameters,
}

impl StageConfig {
    /// Creates a configuration.
    #[must_use]
    pub fn new(config_id: impl Into<String>, parameters: StageParameters) -> Self {
        Self {
            config_id: config_id.into(),
            parameters,
        }
    }
}
