//! Static stage dependency graph.
//!
//! The graph is pure data: a table of [`StageDependencyConfig`] entries keyed
//! by [`StageId`]. It is validated on construction for structural problems
//! (self references, duplicates, unknown stages); cycles are reported by the
//! level builder because they only surface once depths are computed.

mod extract;
mod levels;

pub use extract::{extract, ExtractionRules, FieldRule};
pub use levels::{build_levels, ExecutionLevel, LevelScope};

use crate::core::{FieldMap, StageId};
use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Dependency declaration for one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDependencyConfig {
    /// Stages whose output this stage consumes, in declaration order.
    #[serde(default)]
    pub depends_on: Vec<StageId>,
    /// Fields a complete input for this stage should contain.
    ///
    /// Informational only: missing fields never block execution.
    #[serde(default)]
    pub required_fields: Vec<String>,
    /// Whether the stage only runs when explicitly enabled.
    #[serde(default)]
    pub optional: bool,
}

impl StageDependencyConfig {
    /// Creates a declaration with no dependencies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn depends_on(mut self, deps: impl IntoIterator<Item = StageId>) -> Self {
        self.depends_on = deps.into_iter().collect();
        self
    }

    /// Sets the required fields.
    #[must_use]
    pub fn requires(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.required_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Marks the stage as optional.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Returns the required fields absent from `input`.
    #[must_use]
    pub fn missing_fields<'a>(&'a self, input: &FieldMap) -> Vec<&'a str> {
        self.required_fields
            .iter()
            .filter(|field| !input.contains_key(field.as_str()))
            .map(String::as_str)
            .collect()
    }

    fn validate(&self, stage: StageId) -> Result<(), ConfigurationError> {
        let mut seen = HashSet::new();
        for &dep in &self.depends_on {
            if dep == stage {
                return Err(ConfigurationError::SelfDependency { stage });
            }
            if !seen.insert(dep) {
                return Err(ConfigurationError::DuplicateDependency {
                    stage,
                    dependency: dep,
                });
            }
        }
        Ok(())
    }
}

/// Default content graph: (stage, dependencies, required fields, optional).
const CONTENT_GRAPH: &[(StageId, &[StageId], &[&str], bool)] = &[
    (StageId::Grounding, &[], &["productName"], true),
    (StageId::Usps, &[StageId::Grounding], &["productName", "grounding_facts"], false),
    (StageId::Chapters, &[StageId::Grounding], &["productName", "grounding_facts"], false),
    (StageId::Faq, &[StageId::Usps], &["productName", "usps"], false),
    (StageId::CaseStudies, &[StageId::Usps], &["productName", "usps"], true),
    (StageId::Keywords, &[StageId::Usps], &["productName", "usps"], false),
    (
        StageId::Description,
        &[StageId::Usps, StageId::Keywords],
        &["productName", "usps", "keywords"],
        false,
    ),
    (
        StageId::Hashtags,
        &[StageId::Description, StageId::Keywords],
        &["description", "keywords"],
        false,
    ),
];

/// A validated table of stage dependency declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageGraph {
    stages: BTreeMap<StageId, StageDependencyConfig>,
}

impl StageGraph {
    /// Creates a graph from declarations.
    ///
    /// # Errors
    ///
    /// Returns an error if a stage depends on itself, lists a dependency
    /// twice, or depends on a stage that is not declared.
    pub fn new(
        entries: impl IntoIterator<Item = (StageId, StageDependencyConfig)>,
    ) -> Result<Self, ConfigurationError> {
        let graph = Self {
            stages: entries.into_iter().collect(),
        };
        graph.validate()?;
        Ok(graph)
    }

    /// The built-in marketing content graph.
    ///
    /// `grounding` and `case_studies` are optional.
    #[must_use]
    pub fn default_content_graph() -> Self {
        let stages = CONTENT_GRAPH
            .iter()
            .map(|&(stage, deps, fields, optional)| {
                let mut config = StageDependencyConfig::new()
                    .depends_on(deps.iter().copied())
                    .requires(fields.iter().copied());
                config.optional = optional;
                (stage, config)
            })
            .collect();
        Self { stages }
    }

    /// Checks structural validity of every declaration.
    ///
    /// # Errors
    ///
    /// Returns the first structural problem found.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (&stage, config) in &self.stages {
            config.validate(stage)?;
            if let Some(&missing) = config.depends_on.iter().find(|d| !self.stages.contains_key(*d)) {
                return Err(ConfigurationError::UnknownDependency {
                    stage,
                    dependency: missing,
                });
            }
        }
        Ok(())
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the graph has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Returns true if the stage is declared.
    #[must_use]
    pub fn contains(&self, stage: StageId) -> bool {
        self.stages.contains_key(&stage)
    }

    /// Iterates stages in ascending order.
    pub fn stages(&self) -> impl Iterator<Item = StageId> + '_ {
        self.stages.keys().copied()
    }

    /// Returns the declaration for a stage.
    #[must_use]
    pub fn config(&self, stage: StageId) -> Option<&StageDependencyConfig> {
        self.stages.get(&stage)
    }

    /// Returns the dependencies of a stage (empty for unknown stages).
    #[must_use]
    pub fn dependencies(&self, stage: StageId) -> &[StageId] {
        self.stages
            .get(&stage)
            .map(|config| config.depends_on.as_slice())
            .unwrap_or_default()
    }

    /// Returns `target` together with its transitive dependencies.
    #[must_use]
    pub fn ancestors(&self, target: StageId) -> BTreeSet<StageId> {
        let mut closure = BTreeSet::new();
        let mut stack = vec![target];
        while let Some(stage) = stack.pop() {
            if closure.insert(stage) {
                stack.extend(self.dependencies(stage).iter().copied());
            }
        }
        closure
    }

    /// Returns a copy without optional stages that are not enabled.
    ///
    /// `target` and all of its ancestors are retained even if optional and not
    /// enabled. Edges pointing at removed stages are dropped from the
    /// remaining declarations.
    #[must_use]
    pub fn with_enabled_optional(&self, enabled: &HashSet<StageId>, target: Option<StageId>) -> Self {
        let required = target.map(|t| self.ancestors(t)).unwrap_or_default();
        let retained: BTreeSet<StageId> = self
            .stages
            .iter()
            .filter(|(stage, config)| {
                !config.optional || enabled.contains(*stage) || required.contains(*stage)
            })
            .map(|(stage, _)| *stage)
            .collect();

        let stages = self
            .stages
            .iter()
            .filter(|(stage, _)| retained.contains(*stage))
            .map(|(stage, config)| {
                let mut config = config.clone();
                config.depends_on.retain(|dep| retained.contains(dep));
                (*stage, config)
            })
            .collect();

        Self { stages }
    }
}

impl Default for StageGraph {
    fn default() -> Self {
        Self::default_content_graph()
    }
}
