//! Conversation summarization.
//!
//! Summaries are best effort: any failure degrades to "no summary" and is
//! never returned to the caller as an error.

use tracing::{debug, warn};

use crate::collaborators::{Summarizer, SummaryRequest};
use crate::config::OrchestratorConfig;
use crate::session::SharedSessionStore;
use crate::types::ConversationTurn;

/// Summarize a session's recent conversation and store the result in its
/// metadata.
///
/// Proceeds only when the session has at least `summary_min_messages`
/// messages; sends the last `summary_window` of them. Returns `None` when
/// skipped or on any failure.
pub async fn summarize_conversation(
    store: &SharedSessionStore,
    summarizer: &dyn Summarizer,
    session_id: &str,
    config: &OrchestratorConfig,
) -> Option<String> {
    let messages: Vec<ConversationTurn> = {
        let guard = store.read();
        let session = guard.get_session(session_id)?;
        if session.messages.len() < config.summary_min_messages {
            debug!(
                "Skipping summary for session {}: {} messages",
                session_id,
                session.messages.len()
            );
            return None;
        }
        session
            .recent_messages(config.summary_window)
            .iter()
            .map(ConversationTurn::from)
            .collect()
    };

    let summary = match summarizer.summarize(SummaryRequest { messages }).await {
        Ok(response) if !response.summary.trim().is_empty() => response.summary,
        Ok(_) => {
            warn!("Summarizer returned an empty summary for session {}", session_id);
            return None;
        }
        Err(e) => {
            warn!("Summarization failed for session {}: {}", session_id, e);
            return None;
        }
    };

    match store.write().set_conversation_summary(session_id, summary.clone()) {
        Ok(()) => Some(summary),
        Err(e) => {
            warn!("Could not store summary: {}", e);
            None
        }
    }
}
