//! The closed set of content generation stages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a content generation stage.
///
/// The set is closed: every stage the orchestrator can schedule is listed
/// here. Ordering follows declaration order and is used to keep execution
/// levels deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Collects grounding facts about the product from external sources.
    Grounding,
    /// Extracts unique selling points.
    Usps,
    /// Writes frequently asked questions.
    Faq,
    /// Splits long-form content into chapters.
    Chapters,
    /// Builds customer case studies.
    CaseStudies,
    /// Derives search keywords.
    Keywords,
    /// Builds social hashtags.
    Hashtags,
    /// Writes the product description.
    Description,
}

impl StageId {
    /// Every stage, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Grounding,
        Self::Usps,
        Self::Faq,
        Self::Chapters,
        Self::CaseStudies,
        Self::Keywords,
        Self::Hashtags,
        Self::Description,
    ];

    /// Returns the wire name of the stage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Grounding => "grounding",
            Self::Usps => "usps",
            Self::Faq => "faq",
            Self::Chapters => "chapters",
            Self::CaseStudies => "case_studies",
            Self::Keywords => "keywords",
            Self::Hashtags => "hashtags",
            Self::Description => "description",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown stage name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown stage '{0}'")]
pub struct UnknownStageName(pub String);

impl FromStr for StageId {
    type Err = UnknownStageName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| UnknownStageName(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_serde() {
        for stage in StageId::ALL {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{stage}\""));
        }
    }

    #[test]
    fn test_from_str() {
        assert_eq!("case_studies".parse::<StageId>().unwrap(), StageId::CaseStudies);
        assert!("summary".parse::<StageId>().is_err());
    }

    #[test]
    fn test_ordering_follows_declaration() {
        assert!(StageId::Grounding < StageId::Usps);
        assert!(StageId::Hashtags < StageId::Description);
    }
}
