//! Error types for the chat layer.

use augur_core::{CollaboratorError, CoreError, SessionId};
use thiserror::Error;

/// Result type for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Chat layer errors
#[derive(Error, Debug)]
pub enum ChatError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("No build awaiting confirmation in session {0}")]
    NoPendingBuild(SessionId),

    /// The reasoning collaborator failed and the request matched no local template
    #[error("Could not build a chart for this request: {0}")]
    NoBuildFallback(String),

    #[error("LLM not configured. Set OPENAI_API_KEY or ANTHROPIC_API_KEY")]
    LlmNotConfigured,

    #[error("LLM error: {0}")]
    Llm(String),
}

impl From<CollaboratorError> for ChatError {
    fn from(err: CollaboratorError) -> Self {
        Self::Core(CoreError::Collaborator(err))
    }
}

impl ChatError {
    /// Neutral text suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            Self::NoBuildFallback(_) => {
                "I couldn't turn that into a chart right now. Try naming the analysis, for example \"build a booking funnel\".".to_string()
            }
            Self::NoPendingBuild(_) => "There is nothing waiting for confirmation.".to_string(),
            _ => "The analysis service is unavailable right now. Please try again shortly.".to_string(),
        }
    }
}
