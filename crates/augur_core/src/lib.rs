//! # augur_core
//!
//! Data model, session store and collaborator contracts for the Augur
//! analytics orchestrator.
//!
//! This crate holds everything that does not talk to a collaborator on its
//! own:
//! - **Sessions**: bounded chat and analysis history with an active pointer
//! - **View configs**: the structured description of a chart
//! - **Intent**: build-vs-query classification of user text
//! - **Contracts**: async traits for the reasoning, insight, suggestion,
//!   summarization and Q&A collaborators
//!
//! The build pipeline, insight agent and suggestion engine live in
//! `augur_chat`.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod insight;
pub mod intent;
pub mod labels;
pub mod session;
pub mod summary;
pub mod telemetry;
pub mod types;
pub mod view;

pub use collaborators::{
    AnswerRequest, AnswerResponse, InsightAnalyzer, InsightRequest, InsightResponse,
    QuestionAnswerer, RawInsight, Reasoner, ReasoningRequest, ReasoningResponse, Summarizer,
    SummaryRequest, SummaryResponse, SuggestionRequest, SuggestionResponse, SuggestionScorer,
};
pub use config::OrchestratorConfig;
pub use error::{CollaboratorError, CollaboratorResult, CoreError, CoreResult};
pub use insight::{
    clamp_score, truncate_chars, InsightAction, InsightCategory, MicroInsight, Suggestion,
    SuggestionType, MAX_EXPLANATION_CHARS, MAX_HEADLINE_CHARS, MAX_SUGGESTED_ACTIONS,
};
pub use intent::{is_build_intent, Intent};
pub use labels::{business_label, EventLabel, LabelConfidence};
pub use session::{SessionStore, SharedSessionStore, MAX_ANALYSES, MAX_MESSAGES};
pub use summary::summarize_conversation;
pub use telemetry::init_tracing;
pub use types::*;
pub use view::*;
