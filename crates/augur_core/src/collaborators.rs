//! Contracts for the external collaborators the orchestrator consumes.
//!
//! Transport is out of scope here: an implementation may call an LLM over
//! HTTP, a local model, or a scripted fake. Every call is an asynchronous
//! suspension point and every failure is a [`CollaboratorError`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorResult;
use crate::insight::{InsightAction, InsightCategory, Suggestion};
use crate::types::ConversationTurn;
use crate::view::{ConfigUpdates, ViewConfig};

/// Request sent to the reasoning collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReasoningRequest {
    pub query: String,
    #[serde(default)]
    pub messages: Vec<ConversationTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_config: Option<ViewConfig>,
    pub mutation_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_summary: Option<String>,
}

/// Reply from the reasoning collaborator.
///
/// `config_updates` is optional on the wire so that a reply without it can be
/// recognized as malformed instead of failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReasoningResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_updates: Option<ConfigUpdates>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_spec: Option<serde_json::Value>,
}

/// Translates natural language into chart configuration
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn reason(&self, request: ReasoningRequest) -> CollaboratorResult<ReasoningResponse>;
}

/// Request sent to the insight analysis collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsightRequest {
    pub chart_data: Vec<serde_json::Value>,
    pub chart_type: String,
    pub persona: String,
    pub max_insights: usize,
}

/// An insight as returned on the wire, before validation.
///
/// Everything is optional; the insight agent decides what is usable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawInsight {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub data_point_index: Option<usize>,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub category: Option<InsightCategory>,
    #[serde(default)]
    pub suggested_actions: Vec<InsightAction>,
}

/// Reply from the insight analysis collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct InsightResponse {
    #[serde(default)]
    pub insights: Vec<RawInsight>,
}

/// Detects patterns in rendered chart data
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InsightAnalyzer: Send + Sync {
    async fn analyze(&self, request: InsightRequest) -> CollaboratorResult<InsightResponse>;
}

/// Request sent to the suggestion scoring collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuggestionRequest {
    pub current_view_config: ViewConfig,
    /// At most the last five applied views
    pub session_history: Vec<ViewConfig>,
}

/// Reply from the suggestion scoring collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SuggestionResponse {
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
}

/// Ranks next-step suggestions for a view
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SuggestionScorer: Send + Sync {
    async fn score(&self, request: SuggestionRequest) -> CollaboratorResult<SuggestionResponse>;
}

/// Request sent to the summarization collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryRequest {
    /// At most the last twenty messages
    pub messages: Vec<ConversationTurn>,
}

/// Reply from the summarization collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SummaryResponse {
    pub summary: String,
}

/// Condenses a conversation into a short summary
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, request: SummaryRequest) -> CollaboratorResult<SummaryResponse>;
}

/// Request sent to the Q&A collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerRequest {
    pub question: String,
    #[serde(default)]
    pub messages: Vec<ConversationTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_config: Option<ViewConfig>,
}

/// Reply from the Q&A collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AnswerResponse {
    pub answer: String,
}

/// Answers questions about the data (query path)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuestionAnswerer: Send + Sync {
    async fn answer(&self, request: AnswerRequest) -> CollaboratorResult<AnswerResponse>;
}
