//! Field extraction along dependency edges.
//!
//! Each `(from, to)` edge may carry a list of field renames that copy parts
//! of the upstream output into the downstream stage's input. Extraction is
//! best-effort: absent source fields are left out and edges without rules
//! contribute nothing.

use crate::core::{FieldMap, StageId};
use std::collections::HashMap;

/// Built-in edge rules: (from, to, [(source field, target field)]).
const DEFAULT_RULES: &[(StageId, StageId, &[(&str, &str)])] = &[
    (
        StageId::Grounding,
        StageId::Usps,
        &[("facts", "grounding_facts"), ("sources", "grounding_sources")],
    ),
    (StageId::Grounding, StageId::Chapters, &[("facts", "grounding_facts")]),
    (StageId::Usps, StageId::Faq, &[("usps", "usps")]),
    (
        StageId::Usps,
        StageId::CaseStudies,
        &[("usps", "usps"), ("target_audience", "target_audience")],
    ),
    (StageId::Usps, StageId::Keywords, &[("usps", "usps")]),
    (
        StageId::Usps,
        StageId::Description,
        &[("usps", "usps"), ("target_audience", "target_audience")],
    ),
    (StageId::Keywords, StageId::Description, &[("keywords", "keywords")]),
    (StageId::Keywords, StageId::Hashtags, &[("keywords", "keywords")]),
    (
        StageId::Description,
        StageId::Hashtags,
        &[("description", "description"), ("title", "title")],
    ),
];

/// Copies one upstream field into a downstream input field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    /// Field name in the upstream output.
    pub source: String,
    /// Field name in the downstream input.
    pub target: String,
}

impl FieldRule {
    /// Creates a rule that copies `source` into `target`.
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Creates a rule that copies a field under the same name.
    #[must_use]
    pub fn copy(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(field.clone(), field)
    }
}

/// Extraction rules keyed by dependency edge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionRules {
    rules: HashMap<(StageId, StageId), Vec<FieldRule>>,
}

impl ExtractionRules {
    /// Creates an empty rule table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in content rules.
    #[must_use]
    pub fn default_rules() -> Self {
        let rules = DEFAULT_RULES
            .iter()
            .map(|&(from, to, fields)| {
                let fields = fields
                    .iter()
                    .map(|&(source, target)| FieldRule::new(source, target))
                    .collect();
                ((from, to), fields)
            })
            .collect();
        Self { rules }
    }

    /// Sets the rules for one edge, replacing any existing ones.
    #[must_use]
    pub fn with_rule(mut self, from: StageId, to: StageId, fields: Vec<FieldRule>) -> Self {
        self.rules.insert((from, to), fields);
        self
    }

    /// Returns the rules for an edge.
    #[must_use]
    pub fn rules_for(&self, from: StageId, to: StageId) -> &[FieldRule] {
        self.rules
            .get(&(from, to))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Builds `to`'s extra input fields from `from`'s output.
    #[must_use]
    pub fn extract(&self, from: StageId, to: StageId, from_output: &serde_json::Value) -> FieldMap {
        apply(
            self.rules_for(from, to)
                .iter()
                .map(|rule| (rule.source.as_str(), rule.target.as_str())),
            from_output,
        )
    }
}

/// Builds `to`'s extra input fields from `from`'s output using the built-in rules.
#[must_use]
pub fn extract(from: StageId, to: StageId, from_output: &serde_json::Value) -> FieldMap {
    let fields = DEFAULT_RULES
        .iter()
        .find(|(f, t, _)| *f == from && *t == to)
        .map(|(_, _, fields)| *fields)
        .unwrap_or_default();
    apply(fields.iter().copied(), from_output)
}

fn apply<'a>(
    fields: impl Iterator<Item = (&'a str, &'a str)>,
    from_output: &serde_json::Value,
) -> FieldMap {
    let Some(object) = from_output.as_object() else {
        return FieldMap::new();
    };
    fields
        .filter_map(|(source, target)| {
            object
                .get(source)
                .map(|value| (target.to_string(), value.clone()))
        })
        .collect()
}
