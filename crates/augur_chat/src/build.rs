//! Build pipeline.
//!
//! Turns a build request into a view config: the reasoning collaborator
//! proposes `config_updates`, a confidence gate decides whether they are
//! applied right away or held for confirmation, and every apply records the
//! previous view so it can be undone.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use augur_core::{
    business_label, clamp_score, AiReasoning, BuildSource, CollaboratorError, ConfigUpdates,
    ConversationTurn, CoreError, FunnelDefinition, OrchestratorConfig, Reasoner, ReasoningRequest,
    ReasoningResponse, Session, SessionId, SegmentationState, SharedSessionStore,
    StructuredPayload, ViewConfig,
};

use crate::busy::BusyCounter;
use crate::error::{ChatError, ChatResult};
use crate::templates::fallback_for_query;

/// Undo entries kept across all sessions; the oldest is evicted first.
pub const MAX_UNDO_DEPTH: usize = 10;

/// Where a session's build request stands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    /// No request in progress
    #[default]
    Idle,
    /// Waiting on the reasoning collaborator
    Reasoning,
    /// Applied without confirmation
    AutoApplied,
    /// Held until the caller confirms or cancels
    AwaitingConfirmation,
    /// Applied after confirmation
    Confirmed,
    /// Dropped by the caller
    Cancelled,
}

/// Input to a single build
#[derive(Debug, Clone, PartialEq)]
pub struct BuildRequest {
    /// Session captured when the request was made; results land here
    pub session_id: SessionId,
    pub query: String,
    pub messages: Vec<ConversationTurn>,
    pub current_config: Option<ViewConfig>,
    pub mutation_mode: bool,
    pub conversation_summary: Option<String>,
}

impl BuildRequest {
    pub fn new(session_id: impl Into<SessionId>, query: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            query: query.into(),
            messages: Vec::new(),
            current_config: None,
            mutation_mode: false,
            conversation_summary: None,
        }
    }

    /// Request against a session, mutating its current view when it has one.
    pub fn for_session(session: &Session, query: impl Into<String>) -> Self {
        Self {
            session_id: session.id.clone(),
            query: query.into(),
            messages: session.history(),
            current_config: session.current_view_config.clone(),
            mutation_mode: session.current_view_config.is_some(),
            conversation_summary: session.metadata.conversation_summary.clone(),
        }
    }

    pub fn with_messages(mut self, messages: Vec<ConversationTurn>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_current_config(mut self, config: ViewConfig) -> Self {
        self.current_config = Some(config);
        self.mutation_mode = true;
        self
    }

    fn to_reasoning_request(&self) -> ReasoningRequest {
        ReasoningRequest {
            query: self.query.clone(),
            messages: self.messages.clone(),
            current_config: self.current_config.clone(),
            mutation_mode: self.mutation_mode,
            conversation_summary: self.conversation_summary.clone(),
        }
    }
}

/// Outcome of a build
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildResult {
    pub session_id: SessionId,
    pub config_updates: ConfigUpdates,
    pub explanation: String,
    /// 0-100
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_spec: Option<serde_json::Value>,
    pub source: BuildSource,
    pub mutation_mode: bool,
    pub requires_confirmation: bool,
    /// AutoApplied, AwaitingConfirmation, Confirmed or Cancelled
    pub state: BuildState,
    /// The view stored in the session, once applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_view: Option<ViewConfig>,
}

impl BuildResult {
    pub fn is_applied(&self) -> bool {
        self.applied_view.is_some()
    }

    /// Payload attached to the model message announcing this result
    pub fn to_payload(&self) -> StructuredPayload {
        StructuredPayload::Build {
            config_updates: self.config_updates.clone(),
            confidence: self.confidence,
            requires_confirmation: self.requires_confirmation,
            source: self.source,
        }
    }
}

#[derive(Debug, Clone)]
struct UndoEntry {
    session_id: SessionId,
    previous: Option<ViewConfig>,
}

#[derive(Debug, Default)]
struct PipelineState {
    states: HashMap<SessionId, BuildState>,
    pending: HashMap<SessionId, BuildResult>,
    undo: VecDeque<UndoEntry>,
}

/// Guided/autonomous chart builder
pub struct BuildPipeline {
    store: SharedSessionStore,
    reasoner: Arc<dyn Reasoner>,
    config: OrchestratorConfig,
    state: Mutex<PipelineState>,
    in_flight: BusyCounter,
}

impl BuildPipeline {
    pub fn new(store: SharedSessionStore, reasoner: Arc<dyn Reasoner>, config: OrchestratorConfig) -> Self {
        Self {
            store,
            reasoner,
            config,
            state: Mutex::new(PipelineState::default()),
            in_flight: BusyCounter::default(),
        }
    }

    /// Run a build request through the reasoning collaborator and the
    /// confidence gate.
    ///
    /// Falls back to a local template when the collaborator fails, times out
    /// or replies without `config_updates`. Fails with
    /// [`ChatError::NoBuildFallback`] when no template matches, leaving the
    /// session untouched.
    pub async fn build(&self, request: BuildRequest) -> ChatResult<BuildResult> {
        let _busy = self.in_flight.enter();
        let session_id = request.session_id.clone();
        self.set_state(&session_id, BuildState::Reasoning);

        let result = match self.call_reasoner(&request).await {
            Ok(response) => self.remote_result(&request, response),
            Err(err) => {
                warn!("Reasoning failed for session {}: {}", session_id, err);
                match self.fallback_result(&request) {
                    Some(result) => result,
                    None => {
                        self.restore_resting_state(&session_id);
                        return Err(ChatError::NoBuildFallback(err.to_string()));
                    }
                }
            }
        };

        if result.confidence >= self.config.auto_apply_threshold {
            info!(
                "Auto-applying build for session {} at confidence {:.0}",
                session_id, result.confidence
            );
            let applied = self.apply(&result);
            if applied.is_ok() && self.state.lock().pending.remove(&session_id).is_some() {
                info!("Dropped unconfirmed build for session {}, superseded by an applied one", session_id);
            }
            self.set_state(&session_id, BuildState::Idle);
            let view = applied?;
            Ok(BuildResult {
                state: BuildState::AutoApplied,
                applied_view: Some(view),
                ..result
            })
        } else {
            info!(
                "Build for session {} needs confirmation (confidence {:.0})",
                session_id, result.confidence
            );
            let pending = BuildResult {
                requires_confirmation: true,
                state: BuildState::AwaitingConfirmation,
                ..result
            };
            let mut state = self.state.lock();
            state.pending.insert(session_id.clone(), pending.clone());
            state.states.insert(session_id, BuildState::AwaitingConfirmation);
            Ok(pending)
        }
    }

    /// Apply the result held for confirmation in a session
    pub fn confirm(&self, session_id: &str) -> ChatResult<BuildResult> {
        let pending = self
            .state
            .lock()
            .pending
            .remove(session_id)
            .ok_or_else(|| ChatError::NoPendingBuild(session_id.to_string()))?;

        let applied = self.apply(&pending);
        self.set_state(session_id, BuildState::Idle);
        let view = applied?;
        info!("Confirmed build for session {}", session_id);

        Ok(BuildResult {
            state: BuildState::Confirmed,
            applied_view: Some(view),
            ..pending
        })
    }

    /// Drop the result held for confirmation in a session
    pub fn cancel(&self, session_id: &str) -> Option<BuildResult> {
        let mut state = self.state.lock();
        let pending = state.pending.remove(session_id)?;
        state.states.insert(session_id.to_string(), BuildState::Idle);
        info!("Cancelled build for session {}", session_id);

        Some(BuildResult {
            state: BuildState::Cancelled,
            ..pending
        })
    }

    /// Commit a result to its session.
    ///
    /// The session's current view is pushed onto the undo stack, a new view
    /// is constructed from the result's `config_updates` (on top of the
    /// current view in mutation mode) and stored through the session store.
    pub fn apply(&self, result: &BuildResult) -> ChatResult<ViewConfig> {
        let mut store = self.store.write();
        let previous = store
            .get_session(&result.session_id)
            .ok_or_else(|| CoreError::SessionNotFound(result.session_id.clone()))?
            .current_view_config
            .clone();

        let base = if result.mutation_mode { previous.as_ref() } else { None };
        let mut view = view_from_updates(base, &result.config_updates);
        view.ai_reasoning = Some(AiReasoning {
            observation: result.explanation.clone(),
            prediction: String::new(),
            action_score: result.confidence,
        });

        let stored = store.apply_view_config(&result.session_id, &view, None)?;
        // pushed under the store lock so undo order matches apply order
        self.push_undo(UndoEntry {
            session_id: result.session_id.clone(),
            previous,
        });
        Ok(stored)
    }

    /// Restore the view a session had before its most recent apply.
    ///
    /// Returns `false` without touching the session when there is nothing
    /// to undo. The restored view does not re-enter the audit trail.
    pub fn undo(&self, session_id: &str) -> ChatResult<bool> {
        let entry = {
            let mut state = self.state.lock();
            match state.undo.iter().rposition(|e| e.session_id == session_id) {
                Some(index) => state.undo.remove(index),
                None => None,
            }
        };

        let Some(entry) = entry else {
            debug!("Nothing to undo for session {}", session_id);
            return Ok(false);
        };

        self.store.write().restore_view_config(session_id, entry.previous)?;
        info!("Undid last build for session {}", session_id);
        Ok(true)
    }

    pub fn state(&self, session_id: &str) -> BuildState {
        self.state
            .lock()
            .states
            .get(session_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn pending(&self, session_id: &str) -> Option<BuildResult> {
        self.state.lock().pending.get(session_id).cloned()
    }

    /// Advisory busy flag: true while any build is waiting on the collaborator
    pub fn is_building(&self) -> bool {
        self.in_flight.is_busy()
    }

    pub fn undo_depth(&self) -> usize {
        self.state.lock().undo.len()
    }

    /// Forget everything held for a deleted session
    pub fn forget_session(&self, session_id: &str) {
        let mut state = self.state.lock();
        state.pending.remove(session_id);
        state.states.remove(session_id);
        state.undo.retain(|e| e.session_id != session_id);
    }

    async fn call_reasoner(&self, request: &BuildRequest) -> Result<ReasoningResponse, CollaboratorError> {
        let timeout = self.config.reasoning_timeout();
        let response = tokio::time::timeout(timeout, self.reasoner.reason(request.to_reasoning_request()))
            .await
            .map_err(|_| CollaboratorError::Timeout(timeout))??;

        if response.config_updates.is_none() {
            return Err(CollaboratorError::malformed("reply has no config_updates"));
        }
        Ok(response)
    }

    fn remote_result(&self, request: &BuildRequest, response: ReasoningResponse) -> BuildResult {
        BuildResult {
            session_id: request.session_id.clone(),
            config_updates: response.config_updates.unwrap_or_default(),
            explanation: response.explanation,
            confidence: clamp_score(response.confidence),
            component_spec: response.component_spec,
            source: BuildSource::Remote,
            mutation_mode: request.mutation_mode,
            requires_confirmation: false,
            state: BuildState::Reasoning,
            applied_view: None,
        }
    }

    fn fallback_result(&self, request: &BuildRequest) -> Option<BuildResult> {
        let template = fallback_for_query(&request.query)?;
        info!(
            "Using {} fallback template for session {}",
            template
                .config_updates
                .analysis_type
                .unwrap_or_default()
                .as_str(),
            request.session_id
        );

        Some(BuildResult {
            session_id: request.session_id.clone(),
            config_updates: template.config_updates,
            explanation: template.explanation,
            confidence: clamp_score(self.config.build_fallback_confidence),
            component_spec: None,
            source: BuildSource::Fallback,
            // a template always describes a whole view
            mutation_mode: false,
            requires_confirmation: false,
            state: BuildState::Reasoning,
            applied_view: None,
        })
    }

    fn set_state(&self, session_id: &str, next: BuildState) {
        let mut state = self.state.lock();
        let previous = state.states.insert(session_id.to_string(), next).unwrap_or_default();
        if previous != next {
            debug!("Build state for session {}: {:?} -> {:?}", session_id, previous, next);
        }
    }

    /// Back to `AwaitingConfirmation` if a result is still held, `Idle` otherwise
    fn restore_resting_state(&self, session_id: &str) {
        let resting = if self.state.lock().pending.contains_key(session_id) {
            BuildState::AwaitingConfirmation
        } else {
            BuildState::Idle
        };
        self.set_state(session_id, resting);
    }

    fn push_undo(&self, entry: UndoEntry) {
        let mut state = self.state.lock();
        state.undo.push_back(entry);
        while state.undo.len() > MAX_UNDO_DEPTH {
            state.undo.pop_front();
        }
    }
}

/// Build a view from `updates`, on top of `base` when given.
///
/// Unset fields keep the base's value, or the defaults for a new view
/// (30-day window, unique users, strict order, single chart). Updates that
/// change the analysis type ignore the base. Steps without a label get one
/// derived from their event type.
pub fn view_from_updates(base: Option<&ViewConfig>, updates: &ConfigUpdates) -> ViewConfig {
    let base = base.filter(|b| updates.analysis_type.map_or(true, |t| t == b.analysis_type));
    let mut view = match base {
        Some(base) => {
            let mut view = base.clone();
            view.id = uuid::Uuid::new_v4().to_string();
            view.ai_reasoning = None;
            view
        }
        None => ViewConfig::new(updates.analysis_type.unwrap_or_default()),
    };

    if let Some(analysis_type) = updates.analysis_type {
        view.analysis_type = analysis_type;
    }
    if let Some(ref measurement) = updates.measurement {
        view.measurement = Some(measurement.clone());
    }
    if let Some(layout) = updates.layout_template {
        view.layout_template = layout;
    }

    if view.is_funnel() || has_funnel_updates(updates) {
        let mut funnel = view.funnel_definition.take().unwrap_or_default();
        merge_funnel(&mut funnel, updates);
        view.funnel_definition = Some(funnel);
    }
    if view.is_segmentation() || has_segment_updates(updates) {
        let mut segmentation = view.segmentation_state.take().unwrap_or_default();
        merge_segmentation(&mut segmentation, updates);
        view.segmentation_state = Some(segmentation);
    }

    view
}

fn has_funnel_updates(updates: &ConfigUpdates) -> bool {
    updates.funnel_steps.is_some()
        || updates.funnel_view_type.is_some()
        || updates.funnel_completed_within.is_some()
        || updates.funnel_counting_by.is_some()
        || updates.funnel_group_by.is_some()
        || updates.funnel_segments.is_some()
        || updates.funnel_global_filters.is_some()
        || updates.funnel_order.is_some()
}

fn has_segment_updates(updates: &ConfigUpdates) -> bool {
    updates.segment_mode.is_some() || updates.segment_events.is_some() || updates.segment_group_by.is_some()
}

fn merge_funnel(funnel: &mut FunnelDefinition, updates: &ConfigUpdates) {
    if let Some(ref steps) = updates.funnel_steps {
        funnel.steps = steps
            .iter()
            .cloned()
            .map(|mut step| {
                if step.label.trim().is_empty() {
                    step.label = business_label(&step.event_type).business_label;
                }
                step
            })
            .collect();
    }
    if let Some(view_type) = updates.funnel_view_type {
        funnel.view_type = view_type;
    }
    if let Some(days) = updates.funnel_completed_within {
        funnel.completed_within = days;
    }
    if let Some(counting_by) = updates.funnel_counting_by {
        funnel.counting_by = counting_by;
    }
    if let Some(order) = updates.funnel_order {
        funnel.order = order;
    }
    if let Some(ref group_by) = updates.funnel_group_by {
        funnel.group_by = Some(group_by.clone());
    }
    if let Some(ref segments) = updates.funnel_segments {
        funnel.segments = segments.clone();
    }
    if let Some(ref filters) = updates.funnel_global_filters {
        funnel.global_filters = filters.clone();
    }
}

fn merge_segmentation(state: &mut SegmentationState, updates: &ConfigUpdates) {
    if let Some(mode) = updates.segment_mode {
        state.mode = mode;
    }
    if let Some(ref events) = updates.segment_events {
        state.events = events.clone();
    }
    if let Some(ref group_by) = updates.segment_group_by {
        state.group_by = Some(group_by.clone());
    }
}
