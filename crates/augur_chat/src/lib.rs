//! # augur_chat - Conversation layer for Augur
//!
//! Turns chat input into chart configuration and watches the result:
//! - **Build pipeline**: reasoning collaborator, confidence gate, confirm/cancel, undo
//! - **Insight agent**: debounced, timeout-bounded analysis of rendered chart data
//! - **Suggestions**: remote-scored next steps with a local rule tier
//! - **LLM optional**: every collaborator has a local fallback when no key is set
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │   User input    │────▶│  Orchestrator   │────▶│  Session store  │
//! └─────────────────┘     └────────┬────────┘     └─────────────────┘
//!                                  │
//!         ┌────────────────────────┼────────────────────────┐
//!         ▼                        ▼                        ▼
//! ┌───────────────┐      ┌───────────────┐       ┌───────────────┐
//! │ Build pipeline│      │ Insight agent │       │  Suggestions  │
//! └───────┬───────┘      └───────┬───────┘       └───────┬───────┘
//!         └────────────────────────┼────────────────────────┘
//!                                  ▼
//!                        ┌───────────────┐
//!                        │ Collaborators │
//!                        │ (LLM or mock) │
//!                        └───────────────┘
//! ```

pub mod build;
mod busy;
pub mod debounce;
pub mod error;
pub mod events;
pub mod insight_agent;
pub mod llm;
pub mod mock;
pub mod orchestrator;
pub mod suggestions;
pub mod templates;

pub use build::{view_from_updates, BuildPipeline, BuildRequest, BuildResult, BuildState, MAX_UNDO_DEPTH};
pub use debounce::Debouncer;
pub use error::{ChatError, ChatResult};
pub use events::{OrchestratorEvent, EVENT_CHANNEL_CAPACITY};
pub use insight_agent::{kpi_trend_insight, validate_insights, InsightAgent};
pub use llm::{extract_json, LlmAdapter, LlmCollaborator, LlmProvider};
pub use orchestrator::{Collaborators, Orchestrator, QueryOutcome};
pub use suggestions::{local_suggestions, SuggestionEngine};
pub use templates::{fallback_for_query, FallbackTemplate, BOOKING_FUNNEL_STEPS};
