//! Events published by the orchestrator.

use serde::{Deserialize, Serialize};

use augur_core::{MicroInsight, SessionId, Suggestion};

use crate::build::BuildResult;

/// Capacity of the event channel; slow subscribers see `Lagged`
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A change observable by the UI layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    SessionCreated {
        session_id: SessionId,
    },
    SessionSwitched {
        session_id: SessionId,
    },
    SessionDeleted {
        session_id: SessionId,
        /// Session active after the deletion
        active: Option<SessionId>,
    },
    BuildAwaitingConfirmation {
        result: BuildResult,
    },
    BuildApplied {
        result: BuildResult,
    },
    BuildCancelled {
        session_id: SessionId,
    },
    BuildUndone {
        session_id: SessionId,
    },
    InsightsUpdated {
        session_id: SessionId,
        insights: Vec<MicroInsight>,
    },
    SuggestionsUpdated {
        session_id: SessionId,
        suggestions: Vec<Suggestion>,
    },
}

impl OrchestratorEvent {
    /// Session the event concerns
    pub fn session_id(&self) -> &str {
        match self {
            Self::SessionCreated { session_id }
            | Self::SessionSwitched { session_id }
            | Self::SessionDeleted { session_id, .. }
            | Self::BuildCancelled { session_id }
            | Self::BuildUndone { session_id }
            | Self::InsightsUpdated { session_id, .. }
            | Self::SuggestionsUpdated { session_id, .. } => session_id,
            Self::BuildAwaitingConfirmation { result } | Self::BuildApplied { result } => &result.session_id,
        }
    }
}
