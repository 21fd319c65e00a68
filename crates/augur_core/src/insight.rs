//! Micro-insights and next-step suggestions.

use serde::{Deserialize, Serialize};

/// Maximum headline length, in characters.
pub const MAX_HEADLINE_CHARS: usize = 200;
/// Maximum explanation length, in characters.
pub const MAX_EXPLANATION_CHARS: usize = 500;
/// Maximum number of suggested actions per insight.
pub const MAX_SUGGESTED_ACTIONS: usize = 3;

/// Clamp a confidence or action score into `[0, 100]`. NaN becomes 0.
pub fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Truncate to at most `max` characters (not bytes).
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Pattern an insight describes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InsightCategory {
    #[default]
    Spike,
    Drop,
    Anomaly,
    Trend,
    Correlation,
    Opportunity,
}

/// A follow-up the user can take from an insight
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsightAction {
    pub label: String,
    /// Request text that can be submitted back to the orchestrator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl InsightAction {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            prompt: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

/// A single auto-generated observation attached to a data point in a chart
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MicroInsight {
    pub id: String,
    pub data_point_index: usize,
    pub headline: String,
    pub explanation: String,
    /// 0-100
    pub confidence: f64,
    pub category: InsightCategory,
    #[serde(default)]
    pub suggested_actions: Vec<InsightAction>,
}

/// Kind of next step a suggestion proposes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionType {
    Compare,
    Drill,
    Segment,
    Forecast,
    Diagnose,
}

/// A context-aware next step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Suggestion {
    pub id: String,
    #[serde(rename = "type")]
    pub suggestion_type: SuggestionType,
    pub title: String,
    pub description: String,
    /// 0-100
    pub action_score: f64,
    /// Request text that performs the suggestion when submitted
    pub suggested_action: String,
}

impl Suggestion {
    pub fn new(
        suggestion_type: SuggestionType,
        title: impl Into<String>,
        description: impl Into<String>,
        action_score: f64,
        suggested_action: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            suggestion_type,
            title: title.into(),
            description: description.into(),
            action_score: clamp_score(action_score),
            suggested_action: suggested_action.into(),
        }
    }
}
