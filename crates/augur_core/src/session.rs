//! In-memory session store.
//!
//! Owns every session, its bounded message and analysis history, and the
//! active-session pointer. The store itself does no locking: it is mutated by
//! a single logical owner. Components that run on other tasks share it as a
//! [`SharedSessionStore`] and never hold the lock across an `.await`.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};
use crate::types::{
    ChatMessage, CreateSessionOptions, Session, SessionId, SessionMetadata, SessionSummary,
};
use crate::view::{ViewConfig, ViewPatch};

/// Messages kept per session; older ones are evicted first.
pub const MAX_MESSAGES: usize = 50;
/// Applied views kept per session; older ones are evicted first.
pub const MAX_ANALYSES: usize = 5;
/// Title used when none is given.
pub const DEFAULT_SESSION_TITLE: &str = "New Analysis";

/// Store handle shared between the orchestrator's components.
pub type SharedSessionStore = Arc<RwLock<SessionStore>>;

/// Owner of all sessions
#[derive(Debug)]
pub struct SessionStore {
    sessions: Vec<Session>,
    active_id: Option<SessionId>,
    default_timezone: String,
    default_currency: String,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create an empty store with UTC/USD defaults
    pub fn new() -> Self {
        let metadata = SessionMetadata::default();
        Self {
            sessions: Vec::new(),
            active_id: None,
            default_timezone: metadata.timezone,
            default_currency: metadata.currency,
        }
    }

    /// Override the timezone and currency used when there is nothing to inherit from
    pub fn with_defaults(mut self, timezone: impl Into<String>, currency: impl Into<String>) -> Self {
        self.default_timezone = timezone.into();
        self.default_currency = currency.into();
        self
    }

    /// Wrap the store for sharing between components
    pub fn into_shared(self) -> SharedSessionStore {
        Arc::new(RwLock::new(self))
    }

    /// Create a session and make it active.
    ///
    /// Timezone, currency and schema are inherited from the previously active
    /// session unless given in `opts`.
    pub fn create_session(&mut self, opts: CreateSessionOptions) -> SessionId {
        let inherited = self.active_session().map(|s| s.metadata.clone());

        let metadata = SessionMetadata {
            schema: opts
                .schema
                .or_else(|| inherited.as_ref().and_then(|m| m.schema.clone())),
            timezone: opts
                .timezone
                .or_else(|| inherited.as_ref().map(|m| m.timezone.clone()))
                .unwrap_or_else(|| self.default_timezone.clone()),
            currency: opts
                .currency
                .or_else(|| inherited.as_ref().map(|m| m.currency.clone()))
                .unwrap_or_else(|| self.default_currency.clone()),
            conversation_summary: None,
        };

        let title = opts.title.unwrap_or_else(|| DEFAULT_SESSION_TITLE.to_string());
        let session = Session::new(title, metadata);
        let id = session.id.clone();

        info!("Created session {} ({})", id, session.title);
        self.sessions.push(session);
        self.active_id = Some(id.clone());
        id
    }

    /// Make `id` the active session. Unknown ids are ignored.
    pub fn switch_session(&mut self, id: &str) -> bool {
        if self.get_session(id).is_none() {
            debug!("Ignoring switch to unknown session {}", id);
            return false;
        }
        self.active_id = Some(id.to_string());
        true
    }

    /// Remove a session. If it was active, the first remaining session (or
    /// none) becomes active.
    pub fn delete_session(&mut self, id: &str) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        if self.sessions.len() == before {
            return false;
        }

        if self.active_id.as_deref() == Some(id) {
            self.active_id = self.sessions.first().map(|s| s.id.clone());
        }
        info!("Deleted session {}", id);
        true
    }

    /// Append a message, stamping a timestamp if absent and keeping the last
    /// [`MAX_MESSAGES`].
    pub fn append_message(&mut self, session_id: &str, mut message: ChatMessage) -> CoreResult<()> {
        let session = self.session_mut(session_id)?;
        let now = Utc::now();
        message.timestamp.get_or_insert(now);

        session.messages.push(message);
        if session.messages.len() > MAX_MESSAGES {
            let overflow = session.messages.len() - MAX_MESSAGES;
            session.messages.drain(..overflow);
        }
        session.updated_at = now;
        Ok(())
    }

    /// Commit a view: a timestamped copy (with `patch` merged in) is appended
    /// to the audit trail, trimmed to [`MAX_ANALYSES`], and becomes the
    /// current view. Returns the stored copy.
    pub fn apply_view_config(
        &mut self,
        session_id: &str,
        view: &ViewConfig,
        patch: Option<&ViewPatch>,
    ) -> CoreResult<ViewConfig> {
        let session = self.session_mut(session_id)?;
        let now = Utc::now();

        let mut stored = view.clone();
        if let Some(patch) = patch {
            stored.apply_patch(patch);
        }
        stored.created_at = now;

        session.analyses.push(stored.clone());
        if session.analyses.len() > MAX_ANALYSES {
            let overflow = session.analyses.len() - MAX_ANALYSES;
            session.analyses.drain(..overflow);
        }
        session.current_view_config = Some(stored.clone());
        session.updated_at = now;

        debug!(
            "Applied {} view {} to session {}",
            stored.analysis_type.as_str(),
            stored.id,
            session_id
        );
        Ok(stored)
    }

    /// Set the current view directly without touching the audit trail
    pub fn restore_view_config(&mut self, session_id: &str, view: Option<ViewConfig>) -> CoreResult<()> {
        let session = self.session_mut(session_id)?;
        session.current_view_config = view;
        session.updated_at = Utc::now();
        Ok(())
    }

    /// Store a conversation summary in the session metadata
    pub fn set_conversation_summary(&mut self, session_id: &str, summary: impl Into<String>) -> CoreResult<()> {
        let session = self.session_mut(session_id)?;
        session.metadata.conversation_summary = Some(summary.into());
        Ok(())
    }

    pub fn rename_session(&mut self, session_id: &str, title: impl Into<String>) -> CoreResult<()> {
        let session = self.session_mut(session_id)?;
        session.title = title.into();
        session.updated_at = Utc::now();
        Ok(())
    }

    /// Create a default session if there are none; otherwise make sure one is
    /// active. Returns the active session id.
    pub fn ensure_default_session(&mut self) -> SessionId {
        if let Some(id) = self.active_id.clone() {
            return id;
        }
        match self.sessions.first() {
            Some(first) => {
                let id = first.id.clone();
                self.active_id = Some(id.clone());
                id
            }
            None => self.create_session(CreateSessionOptions::default()),
        }
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.active_id.as_deref().and_then(|id| self.get_session(id))
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn get_session(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Sessions in creation order
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        self.sessions
            .iter()
            .map(|s| SessionSummary {
                id: s.id.clone(),
                title: s.title.clone(),
                message_count: s.messages.len(),
                analysis_count: s.analyses.len(),
                is_active: self.active_id.as_deref() == Some(s.id.as_str()),
                updated_at: s.updated_at,
            })
            .collect()
    }

    fn session_mut(&mut self, id: &str) -> CoreResult<&mut Session> {
        self.sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| CoreError::SessionNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{AnalysisType, LayoutTemplate};

    #[test]
    fn test_create_session_becomes_active() {
        let mut store = SessionStore::new();
        let id = store.create_session(CreateSessionOptions::titled("Bookings"));

        let active = store.active_session().unwrap();
        assert_eq!(active.id, id);
        assert_eq!(active.title, "Bookings");
        assert_eq!(active.metadata.timezone, "UTC");
        assert_eq!(active.metadata.currency, "USD");
    }

    #[test]
    fn test_new_session_inherits_metadata() {
        let mut store = SessionStore::new();
        store.create_session(CreateSessionOptions {
            timezone: Some("Europe/Brussels".to_string()),
            currency: Some("EUR".to_string()),
            schema: Some(serde_json::json!({"events": ["Landed"]})),
            ..Default::default()
        });

        let second = store.create_session(CreateSessionOptions::default());
        let session = store.get_session(&second).unwrap();
        assert_eq!(session.metadata.timezone, "Europe/Brussels");
        assert_eq!(session.metadata.currency, "EUR");
        assert!(session.metadata.schema.is_some());
        assert_eq!(session.title, DEFAULT_SESSION_TITLE);
    }

    #[test]
    fn test_store_defaults_apply_without_active_session() {
        let mut store = SessionStore::new().with_defaults("America/New_York", "CAD");
        let id = store.create_session(CreateSessionOptions::default());
        let session = store.get_session(&id).unwrap();
        assert_eq!(session.metadata.timezone, "America/New_York");
        assert_eq!(session.metadata.currency, "CAD");
    }

    #[test]
    fn test_switch_unknown_is_noop() {
        let mut store = SessionStore::new();
        let id = store.create_session(CreateSessionOptions::default());
        assert!(!store.switch_session("missing"));
        assert_eq!(store.active_session_id(), Some(id.as_str()));
    }

    #[test]
    fn test_delete_reassigns_active() {
        let mut store = SessionStore::new();
        let first = store.create_session(CreateSessionOptions::default());
        let second = store.create_session(CreateSessionOptions::default());
        assert_eq!(store.active_session_id(), Some(second.as_str()));

        assert!(store.delete_session(&second));
        assert_eq!(store.active_session_id(), Some(first.as_str()));

        assert!(store.delete_session(&first));
        assert!(store.active_session().is_none());
        assert!(!store.delete_session(&first));
    }

    #[test]
    fn test_delete_inactive_keeps_pointer() {
        let mut store = SessionStore::new();
        let first = store.create_session(CreateSessionOptions::default());
        let second = store.create_session(CreateSessionOptions::default());
        store.delete_session(&first);
        assert_eq!(store.active_session_id(), Some(second.as_str()));
    }

    #[test]
    fn test_append_message_fifo_eviction() {
        let mut store = SessionStore::new();
        let id = store.create_session(CreateSessionOptions::default());

        for i in 0..60 {
            store.append_message(&id, ChatMessage::user(format!("message {}", i))).unwrap();
        }

        let session = store.get_session(&id).unwrap();
        assert_eq!(session.messages.len(), 50);
        assert_eq!(session.messages[0].text, "message 10");
        assert_eq!(session.messages[49].text, "message 59");
        assert!(session.messages.iter().all(|m| m.timestamp.is_some()));
    }

    #[test]
    fn test_append_keeps_existing_timestamp() {
        let mut store = SessionStore::new();
        let id = store.create_session(CreateSessionOptions::default());
        let stamp = Utc::now() - chrono::Duration::hours(1);
        let mut message = ChatMessage::user("earlier");
        message.timestamp = Some(stamp);

        store.append_message(&id, message).unwrap();
        assert_eq!(store.get_session(&id).unwrap().messages[0].timestamp, Some(stamp));
    }

    #[test]
    fn test_append_to_unknown_session() {
        let mut store = SessionStore::new();
        let err = store.append_message("missing", ChatMessage::user("hi")).unwrap_err();
        assert!(matches!(err, CoreError::SessionNotFound(_)));
    }

    #[test]
    fn test_apply_view_config_trims_history() {
        let mut store = SessionStore::new();
        let id = store.create_session(CreateSessionOptions::default());

        let mut ids = Vec::new();
        for _ in 0..7 {
            let view = ViewConfig::new(AnalysisType::Funnel);
            ids.push(view.id.clone());
            store.apply_view_config(&id, &view, None).unwrap();
        }

        let session = store.get_session(&id).unwrap();
        assert_eq!(session.analyses.len(), 5);
        assert_eq!(session.analyses[0].id, ids[2]);
        assert_eq!(session.current_view_config.as_ref().unwrap().id, ids[6]);
    }

    #[test]
    fn test_apply_view_config_merges_patch() {
        let mut store = SessionStore::new();
        let id = store.create_session(CreateSessionOptions::default());
        let view = ViewConfig::new(AnalysisType::Segmentation);
        let patch = ViewPatch {
            layout_template: Some(LayoutTemplate::ExecutiveSummaryDashboard),
            ..Default::default()
        };

        let stored = store.apply_view_config(&id, &view, Some(&patch)).unwrap();
        assert_eq!(stored.layout_template, LayoutTemplate::ExecutiveSummaryDashboard);
        assert_eq!(view.layout_template, LayoutTemplate::SingleChart);
    }

    #[test]
    fn test_restore_does_not_touch_audit_trail() {
        let mut store = SessionStore::new();
        let id = store.create_session(CreateSessionOptions::default());
        let view = ViewConfig::new(AnalysisType::Funnel);
        store.apply_view_config(&id, &view, None).unwrap();

        store.restore_view_config(&id, None).unwrap();
        let session = store.get_session(&id).unwrap();
        assert!(session.current_view_config.is_none());
        assert_eq!(session.analyses.len(), 1);
    }

    #[test]
    fn test_ensure_default_session_idempotent() {
        let mut store = SessionStore::new();
        let id = store.ensure_default_session();
        assert_eq!(store.ensure_default_session(), id);
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn test_ensure_default_activates_first() {
        let mut store = SessionStore::new();
        let first = store.create_session(CreateSessionOptions::default());
        store.create_session(CreateSessionOptions::default());
        // No public operation clears the pointer while sessions remain
        store.active_id = None;

        assert_eq!(store.ensure_default_session(), first);
        assert_eq!(store.session_count(), 2);
    }

    #[test]
    fn test_list_sessions() {
        let mut store = SessionStore::new();
        let first = store.create_session(CreateSessionOptions::titled("A"));
        store.create_session(CreateSessionOptions::titled("B"));
        store.append_message(&first, ChatMessage::user("hi")).unwrap();

        let listing = store.list_sessions();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].title, "A");
        assert_eq!(listing[0].message_count, 1);
        assert!(!listing[0].is_active);
        assert!(listing[1].is_active);
    }
}
