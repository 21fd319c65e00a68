//! Core types for sessions and conversations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::insight::{MicroInsight, Suggestion};
use crate::view::{ConfigUpdates, ViewConfig};

/// Unique identifier for an analysis session
pub type SessionId = String;

/// Default session timezone
pub const DEFAULT_TIMEZONE: &str = "UTC";
/// Default session currency
pub const DEFAULT_CURRENCY: &str = "USD";

/// Message role in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Model,
}

/// Where a build result came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BuildSource {
    /// The reasoning collaborator
    Remote,
    /// The local template heuristic
    Fallback,
}

/// Structured data attached to a model message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuredPayload {
    Build {
        config_updates: ConfigUpdates,
        confidence: f64,
        requires_confirmation: bool,
        source: BuildSource,
    },
    Insights {
        items: Vec<MicroInsight>,
    },
    Suggestions {
        items: Vec<Suggestion>,
    },
}

/// A single chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Unique message ID (UUID)
    pub id: String,
    pub role: MessageRole,
    pub text: String,
    /// Stamped by the session store when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<StructuredPayload>,
}

impl ChatMessage {
    /// Create a new user message
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: MessageRole::User,
            text: text.into(),
            timestamp: None,
            structured: None,
        }
    }

    /// Create a new model message
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: MessageRole::Model,
            text: text.into(),
            timestamp: None,
            structured: None,
        }
    }

    /// Attach a structured payload
    pub fn with_structured(mut self, payload: StructuredPayload) -> Self {
        self.structured = Some(payload);
        self
    }
}

/// Role/content pair sent to collaborators as conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: MessageRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Model,
            content: content.into(),
        }
    }
}

impl From<&ChatMessage> for ConversationTurn {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role,
            content: message.text.clone(),
        }
    }
}

/// Per-session settings and derived context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    /// Data schema the session analyzes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
    pub timezone: String,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_summary: Option<String>,
}

impl Default for SessionMetadata {
    fn default() -> Self {
        Self {
            schema: None,
            timezone: DEFAULT_TIMEZONE.to_string(),
            currency: DEFAULT_CURRENCY.to_string(),
            conversation_summary: None,
        }
    }
}

/// An isolated bucket of chat history, analysis history and current configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    /// Audit trail of applied views, oldest first
    pub analyses: Vec<ViewConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_view_config: Option<ViewConfig>,
    pub metadata: SessionMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new empty session
    pub fn new(title: impl Into<String>, metadata: SessionMetadata) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            messages: Vec::new(),
            analyses: Vec::new(),
            current_view_config: None,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Conversation history as role/content pairs, oldest first
    pub fn history(&self) -> Vec<ConversationTurn> {
        self.messages.iter().map(ConversationTurn::from).collect()
    }

    /// The last `n` messages, oldest first
    pub fn recent_messages(&self, n: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// The last `n` applied views, oldest first
    pub fn recent_analyses(&self, n: usize) -> &[ViewConfig] {
        let start = self.analyses.len().saturating_sub(n);
        &self.analyses[start..]
    }
}

/// Options for creating a session. Unset fields are inherited from the
/// previously active session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSessionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl CreateSessionOptions {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }
}

/// Lightweight listing entry for a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    pub title: String,
    pub message_count: usize,
    pub analysis_count: usize,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}
