//! Build-vs-query intent classification.
//!
//! Classification is a case-insensitive substring check against a fixed
//! vocabulary. A missed build request costs more than an unnecessary one, so
//! the vocabulary is broad and ambiguous input leans towards `Build`.

use serde::{Deserialize, Serialize};

/// Phrases that mark a request to build or change a chart
pub const BUILD_VOCABULARY: &[&str] = &[
    "build",
    "create",
    "make",
    "funnel",
    "segment",
    "compare",
    "comparison",
    "show me",
    "chart",
    "graph",
    "plot",
    "visualize",
    "visualise",
    "breakdown",
    "break down",
    "break it down",
    "group by",
    "split by",
    "by device",
    "by source",
    "retention",
    "cohort",
    "conversion",
    "over time",
    "trend",
    "add step",
    "add a step",
    "remove step",
    "filter",
    "drill",
    "switch to",
    "change to",
    "dashboard",
    "paths",
];

/// Where a user message is routed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Build or mutate a chart configuration
    Build,
    /// Ask a question about the data
    Query,
}

impl Intent {
    pub fn classify(text: &str) -> Self {
        if is_build_intent(text) {
            Self::Build
        } else {
            Self::Query
        }
    }
}

/// `true` when the text asks for a chart to be built or changed
pub fn is_build_intent(text: &str) -> bool {
    let lower = text.to_lowercase();
    BUILD_VOCABULARY.iter().any(|phrase| lower.contains(phrase))
}
