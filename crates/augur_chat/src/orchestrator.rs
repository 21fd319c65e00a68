//! UI-facing orchestrator.
//!
//! Wires the session store, build pipeline, insight agent and suggestion
//! engine together behind one set of operations. Every request captures the
//! active session id when it starts and writes its results there, even if
//! the caller has switched sessions by the time the collaborator answers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use augur_core::{
    summarize_conversation, AnswerRequest, AnswerResponse, ChatMessage, CollaboratorError,
    CollaboratorResult, CreateSessionOptions, InsightAnalyzer, InsightRequest, InsightResponse,
    Intent, MicroInsight, OrchestratorConfig, QuestionAnswerer, Reasoner, ReasoningRequest,
    ReasoningResponse, Session, SessionId, SessionStore, SessionSummary, SharedSessionStore,
    Suggestion, SuggestionRequest, SuggestionResponse, SuggestionScorer, Summarizer,
    SummaryRequest, SummaryResponse,
};

use crate::build::{BuildPipeline, BuildRequest, BuildResult, BuildState};
use crate::error::ChatResult;
use crate::events::{OrchestratorEvent, EVENT_CHANNEL_CAPACITY};
use crate::insight_agent::InsightAgent;
use crate::llm::LlmCollaborator;
use crate::suggestions::SuggestionEngine;

const ANSWER_UNAVAILABLE: &str =
    "I couldn't answer that right now. The analysis service is unavailable, please try again shortly.";

/// The external collaborators an orchestrator calls
#[derive(Clone)]
pub struct Collaborators {
    pub reasoner: Arc<dyn Reasoner>,
    pub analyzer: Arc<dyn InsightAnalyzer>,
    pub scorer: Arc<dyn SuggestionScorer>,
    pub summarizer: Arc<dyn Summarizer>,
    pub answerer: Arc<dyn QuestionAnswerer>,
}

impl Collaborators {
    /// Use one LLM for every contract
    pub fn from_llm(llm: LlmCollaborator) -> Self {
        let llm = Arc::new(llm);
        Self {
            reasoner: llm.clone(),
            analyzer: llm.clone(),
            scorer: llm.clone(),
            summarizer: llm.clone(),
            answerer: llm,
        }
    }

    /// Collaborators that are always unavailable, so every component runs
    /// on its local fallback
    pub fn offline() -> Self {
        let offline = Arc::new(Offline);
        Self {
            reasoner: offline.clone(),
            analyzer: offline.clone(),
            scorer: offline.clone(),
            summarizer: offline.clone(),
            answerer: offline,
        }
    }

    /// LLM collaborators when an API key is configured, offline otherwise
    pub fn from_env() -> Self {
        match LlmCollaborator::from_env() {
            Ok(llm) => Self::from_llm(llm),
            Err(e) => {
                warn!("{}; running with local fallbacks only", e);
                Self::offline()
            }
        }
    }
}

struct Offline;

impl Offline {
    fn unavailable<T>() -> CollaboratorResult<T> {
        Err(CollaboratorError::unavailable("no LLM configured"))
    }
}

#[async_trait]
impl Reasoner for Offline {
    async fn reason(&self, _request: ReasoningRequest) -> CollaboratorResult<ReasoningResponse> {
        Self::unavailable()
    }
}

#[async_trait]
impl InsightAnalyzer for Offline {
    async fn analyze(&self, _request: InsightRequest) -> CollaboratorResult<InsightResponse> {
        Self::unavailable()
    }
}

#[async_trait]
impl SuggestionScorer for Offline {
    async fn score(&self, _request: SuggestionRequest) -> CollaboratorResult<SuggestionResponse> {
        Self::unavailable()
    }
}

#[async_trait]
impl Summarizer for Offline {
    async fn summarize(&self, _request: SummaryRequest) -> CollaboratorResult<SummaryResponse> {
        Self::unavailable()
    }
}

#[async_trait]
impl QuestionAnswerer for Offline {
    async fn answer(&self, _request: AnswerRequest) -> CollaboratorResult<AnswerResponse> {
        Self::unavailable()
    }
}

/// What a submitted query turned into
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Build path: applied or awaiting confirmation
    Build(BuildResult),
    /// Query path answer
    Answer(String),
    /// Neutral message shown instead of a result
    Failed(String),
}

impl QueryOutcome {
    /// Text of the model message appended for this outcome
    pub fn message(&self) -> String {
        match self {
            Self::Build(result) => build_message(result),
            Self::Answer(text) | Self::Failed(text) => text.clone(),
        }
    }
}

fn build_message(result: &BuildResult) -> String {
    if result.requires_confirmation {
        format!(
            "{} (confidence {:.0}%). Confirm to apply these changes or cancel to keep the current view.",
            result.explanation, result.confidence
        )
    } else {
        result.explanation.clone()
    }
}

/// Conversation-driven analytics orchestrator
pub struct Orchestrator {
    store: SharedSessionStore,
    config: OrchestratorConfig,
    pipeline: BuildPipeline,
    insight_agent: InsightAgent,
    suggestion_engine: SuggestionEngine,
    summarizer: Arc<dyn Summarizer>,
    answerer: Arc<dyn QuestionAnswerer>,
    suggestions: RwLock<HashMap<SessionId, Vec<Suggestion>>>,
    events: broadcast::Sender<OrchestratorEvent>,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, config: OrchestratorConfig) -> Self {
        let store = SessionStore::new()
            .with_defaults(config.default_timezone.clone(), config.default_currency.clone())
            .into_shared();
        Self::with_store(store, collaborators, config)
    }

    /// Build over an existing store
    pub fn with_store(store: SharedSessionStore, collaborators: Collaborators, config: OrchestratorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            pipeline: BuildPipeline::new(store.clone(), collaborators.reasoner, config.clone()),
            insight_agent: InsightAgent::with_events(collaborators.analyzer, config.clone(), events.clone()),
            suggestion_engine: SuggestionEngine::new(collaborators.scorer),
            summarizer: collaborators.summarizer,
            answerer: collaborators.answerer,
            suggestions: RwLock::new(HashMap::new()),
            store,
            config,
            events,
        }
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: OrchestratorEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    // Sessions

    pub fn create_session(&self, opts: CreateSessionOptions) -> SessionId {
        let id = self.store.write().create_session(opts);
        self.emit(OrchestratorEvent::SessionCreated { session_id: id.clone() });
        id
    }

    pub fn switch_session(&self, id: &str) -> bool {
        let switched = self.store.write().switch_session(id);
        if switched {
            self.emit(OrchestratorEvent::SessionSwitched { session_id: id.to_string() });
        }
        switched
    }

    /// Delete a session and everything held for it
    pub fn delete_session(&self, id: &str) -> bool {
        let (deleted, active) = {
            let mut store = self.store.write();
            let deleted = store.delete_session(id);
            (deleted, store.active_session_id().map(str::to_string))
        };
        if !deleted {
            return false;
        }

        self.pipeline.forget_session(id);
        self.insight_agent.forget_session(id);
        self.suggestions.write().remove(id);
        self.emit(OrchestratorEvent::SessionDeleted {
            session_id: id.to_string(),
            active,
        });
        true
    }

    pub fn rename_session(&self, id: &str, title: impl Into<String>) -> ChatResult<()> {
        self.store.write().rename_session(id, title)?;
        Ok(())
    }

    /// Active session id, creating a default session when there is none
    pub fn ensure_session(&self) -> SessionId {
        let (id, created) = {
            let mut store = self.store.write();
            let before = store.session_count();
            let id = store.ensure_default_session();
            (id, store.session_count() > before)
        };
        if created {
            self.emit(OrchestratorEvent::SessionCreated { session_id: id.clone() });
        }
        id
    }

    // Conversation

    /// Handle one piece of user input.
    ///
    /// Build requests go through the build pipeline; everything else is
    /// answered by the Q&A collaborator. Failures become a neutral model
    /// message rather than an error.
    pub async fn submit_query(&self, text: &str) -> ChatResult<QueryOutcome> {
        let session_id = self.ensure_session();
        self.store
            .write()
            .append_message(&session_id, ChatMessage::user(text))?;

        let outcome = match Intent::classify(text) {
            Intent::Build => self.run_build(&session_id, text).await,
            Intent::Query => self.run_query(&session_id, text).await,
        };

        let message = ChatMessage::model(outcome.message());
        let message = match outcome {
            QueryOutcome::Build(ref result) => message.with_structured(result.to_payload()),
            _ => message,
        };
        self.append_to(&session_id, message);

        if let QueryOutcome::Build(ref result) = outcome {
            if result.is_applied() {
                futures::join!(self.update_suggestions(&session_id), self.maybe_summarize(&session_id));
                return Ok(outcome);
            }
        }
        self.maybe_summarize(&session_id).await;
        Ok(outcome)
    }

    async fn run_build(&self, session_id: &str, text: &str) -> QueryOutcome {
        let request = {
            let store = self.store.read();
            match store.get_session(session_id) {
                Some(session) => BuildRequest::for_session(session, text),
                None => BuildRequest::new(session_id, text),
            }
        };

        let had_pending = self.pipeline.pending(session_id).is_some();
        match self.pipeline.build(request).await {
            Ok(result) => {
                if had_pending && result.is_applied() {
                    // the unconfirmed build was dropped in favor of this one
                    self.emit(OrchestratorEvent::BuildCancelled {
                        session_id: session_id.to_string(),
                    });
                }
                if result.requires_confirmation {
                    self.emit(OrchestratorEvent::BuildAwaitingConfirmation { result: result.clone() });
                } else {
                    self.emit(OrchestratorEvent::BuildApplied { result: result.clone() });
                }
                QueryOutcome::Build(result)
            }
            Err(e) => {
                warn!("Build failed for session {}: {}", session_id, e);
                QueryOutcome::Failed(e.user_message())
            }
        }
    }

    async fn run_query(&self, session_id: &str, text: &str) -> QueryOutcome {
        let request = {
            let store = self.store.read();
            let session = store.get_session(session_id);
            AnswerRequest {
                question: text.to_string(),
                messages: session.map(Session::history).unwrap_or_default(),
                current_config: session.and_then(|s| s.current_view_config.clone()),
            }
        };

        match self.answerer.answer(request).await {
            Ok(response) if !response.answer.trim().is_empty() => QueryOutcome::Answer(response.answer),
            Ok(_) => QueryOutcome::Failed(ANSWER_UNAVAILABLE.to_string()),
            Err(e) => {
                warn!("Q&A failed for session {}: {}", session_id, e);
                QueryOutcome::Failed(ANSWER_UNAVAILABLE.to_string())
            }
        }
    }

    /// Apply the build awaiting confirmation in the active session
    pub async fn confirm_build(&self) -> ChatResult<BuildResult> {
        let session_id = self.ensure_session();
        let result = self.pipeline.confirm(&session_id)?;

        let text = format!("Applied the {} view.", result_type(&result));
        self.append_to(&session_id, ChatMessage::model(text).with_structured(result.to_payload()));
        self.emit(OrchestratorEvent::BuildApplied { result: result.clone() });
        self.update_suggestions(&session_id).await;
        Ok(result)
    }

    /// Drop the build awaiting confirmation in the active session
    pub fn cancel_build(&self) -> Option<BuildResult> {
        let session_id = self.ensure_session();
        let result = self.pipeline.cancel(&session_id)?;

        self.append_to(&session_id, ChatMessage::model("Kept the current view."));
        self.emit(OrchestratorEvent::BuildCancelled { session_id });
        Some(result)
    }

    /// Restore the active session's view from before its last build
    pub fn undo(&self) -> ChatResult<bool> {
        let session_id = self.ensure_session();
        let undone = self.pipeline.undo(&session_id)?;
        if undone {
            self.emit(OrchestratorEvent::BuildUndone { session_id });
        }
        Ok(undone)
    }

    fn append_to(&self, session_id: &str, message: ChatMessage) {
        if let Err(e) = self.store.write().append_message(session_id, message) {
            // session deleted while the request was in flight
            debug!("Dropping message for session {}: {}", session_id, e);
        }
    }

    async fn maybe_summarize(&self, session_id: &str) -> Option<String> {
        let count = self
            .store
            .read()
            .get_session(session_id)
            .map(|s| s.messages.len())
            .unwrap_or(0);

        let interval = self.config.summary_interval.max(1);
        if count < self.config.summary_min_messages || count % interval != 0 {
            return None;
        }

        info!("Summarizing session {} at {} messages", session_id, count);
        summarize_conversation(&self.store, self.summarizer.as_ref(), session_id, &self.config).await
    }

    // Insights

    /// Opt in or out of automatic insight generation
    pub fn set_auto_insights(&self, enabled: bool) {
        self.insight_agent.set_auto_generate(enabled);
    }

    /// Report freshly rendered chart data. Returns whether an analysis was
    /// scheduled.
    pub fn observe_chart(&self, chart_data: Vec<Value>, chart_type: &str) -> bool {
        let session_id = self.ensure_session();
        self.insight_agent.observe(session_id, chart_data, chart_type)
    }

    /// Analyze chart data now, regardless of the auto-generation setting
    pub async fn refresh_insights(&self, chart_data: Vec<Value>, chart_type: &str) -> Vec<MicroInsight> {
        let session_id = self.ensure_session();
        self.insight_agent.refresh(&session_id, chart_data, chart_type).await
    }

    // Suggestions

    /// Recompute suggestions for the active session
    pub async fn refresh_suggestions(&self) -> Vec<Suggestion> {
        let session_id = self.ensure_session();
        self.update_suggestions(&session_id).await
    }

    async fn update_suggestions(&self, session_id: &str) -> Vec<Suggestion> {
        let session = self.store.read().get_session(session_id).cloned();
        let Some(session) = session else {
            return Vec::new();
        };

        let suggestions = self.suggestion_engine.suggest_for_session(&session).await;
        self.suggestions
            .write()
            .insert(session_id.to_string(), suggestions.clone());
        self.emit(OrchestratorEvent::SuggestionsUpdated {
            session_id: session_id.to_string(),
            suggestions: suggestions.clone(),
        });
        suggestions
    }

    // Projections

    pub fn is_building(&self) -> bool {
        self.pipeline.is_building()
    }

    pub fn is_analyzing(&self) -> bool {
        self.insight_agent.is_analyzing()
    }

    /// Insights for the active session
    pub fn insights(&self) -> Vec<MicroInsight> {
        self.active_session_id()
            .map(|id| self.insight_agent.insights(&id))
            .unwrap_or_default()
    }

    /// Suggestions for the active session
    pub fn suggestions(&self) -> Vec<Suggestion> {
        self.active_session_id()
            .and_then(|id| self.suggestions.read().get(&id).cloned())
            .unwrap_or_default()
    }

    pub fn build_state(&self) -> BuildState {
        self.active_session_id()
            .map(|id| self.pipeline.state(&id))
            .unwrap_or_default()
    }

    pub fn pending_build(&self) -> Option<BuildResult> {
        self.active_session_id().and_then(|id| self.pipeline.pending(&id))
    }

    pub fn active_session_id(&self) -> Option<SessionId> {
        self.store.read().active_session_id().map(str::to_string)
    }

    /// Snapshot of the active session
    pub fn active_session(&self) -> Option<Session> {
        self.store.read().active_session().cloned()
    }

    pub fn session(&self, id: &str) -> Option<Session> {
        self.store.read().get_session(id).cloned()
    }

    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        self.store.read().list_sessions()
    }

    /// Shared store handle, for read access by the rendering layer
    pub fn store(&self) -> SharedSessionStore {
        self.store.clone()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }
}

fn result_type(result: &BuildResult) -> &'static str {
    result
        .applied_view
        .as_ref()
        .map(|view| view.analysis_type.as_str())
        .unwrap_or("new")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAnswerer, MockInsightAnalyzer, MockReasoner, MockSuggestionScorer, MockSummarizer};
    use augur_core::{AnalysisType, ConfigUpdates, MessageRole, StructuredPayload};

    fn collaborators(reasoner: MockReasoner) -> Collaborators {
        Collaborators {
            reasoner: Arc::new(reasoner),
            analyzer: Arc::new(MockInsightAnalyzer::new()),
            scorer: Arc::new(MockSuggestionScorer::new()),
            summarizer: Arc::new(MockSummarizer::new().when_empty(Ok(SummaryResponse {
                summary: "Built funnels.".to_string(),
            }))),
            answerer: Arc::new(MockAnswerer::new().respond_answer("Conversion is 12%.")),
        }
    }

    fn segmentation() -> ConfigUpdates {
        ConfigUpdates {
            analysis_type: Some(AnalysisType::Segmentation),
            segment_events: Some(vec!["Landed".to_string()]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_submit_creates_default_session() {
        let orchestrator = Orchestrator::new(collaborators(MockReasoner::unreachable()), OrchestratorConfig::default());
        assert!(orchestrator.active_session_id().is_none());

        let outcome = orchestrator.submit_query("Build a booking funnel").await.unwrap();
        assert!(matches!(outcome, QueryOutcome::Build(_)));

        let session = orchestrator.active_session().unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[1].role, MessageRole::Model);
        assert!(session.messages[1].text.contains("6 steps"));
        assert!(matches!(
            session.messages[1].structured,
            Some(StructuredPayload::Build { .. })
        ));
        assert!(session.current_view_config.unwrap().is_funnel());
    }

    #[tokio::test]
    async fn test_query_path_answers() {
        let orchestrator = Orchestrator::new(collaborators(MockReasoner::new()), OrchestratorConfig::default());
        let outcome = orchestrator.submit_query("why did bookings dip on Tuesday?").await.unwrap();
        assert_eq!(outcome, QueryOutcome::Answer("Conversion is 12%.".to_string()));

        let outcome = orchestrator.submit_query("and on Wednesday?").await.unwrap();
        // the answerer has nothing left to say
        assert!(matches!(outcome, QueryOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_query_failure_is_neutral() {
        let mut collaborators = collaborators(MockReasoner::unreachable());
        collaborators.answerer = Arc::new(MockAnswerer::unreachable());
        let orchestrator = Orchestrator::new(collaborators, OrchestratorConfig::default());

        let outcome = orchestrator.submit_query("how are we doing?").await.unwrap();
        assert!(matches!(outcome, QueryOutcome::Failed(_)));
        assert!(orchestrator.active_session().unwrap().current_view_config.is_none());
    }

    #[tokio::test]
    async fn test_confirm_and_cancel_flow() {
        let reasoner = MockReasoner::new()
            .respond_with(segmentation(), 60.0)
            .respond_with(segmentation(), 60.0);
        let orchestrator = Orchestrator::new(collaborators(reasoner), OrchestratorConfig::default());
        let mut events = orchestrator.subscribe();

        orchestrator.submit_query("segment guests by event").await.unwrap();
        assert_eq!(orchestrator.build_state(), BuildState::AwaitingConfirmation);
        assert!(orchestrator.pending_build().is_some());
        assert!(orchestrator.active_session().unwrap().current_view_config.is_none());

        let confirmed = orchestrator.confirm_build().await.unwrap();
        assert_eq!(confirmed.state, BuildState::Confirmed);
        assert!(orchestrator.active_session().unwrap().current_view_config.is_some());
        assert!(!orchestrator.suggestions().is_empty());

        orchestrator.submit_query("segment by country instead").await.unwrap();
        assert!(orchestrator.cancel_build().is_some());
        assert_eq!(orchestrator.build_state(), BuildState::Idle);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.iter().any(|e| matches!(e, OrchestratorEvent::BuildAwaitingConfirmation { .. })));
        assert!(seen.iter().any(|e| matches!(e, OrchestratorEvent::BuildApplied { .. })));
        assert!(seen.iter().any(|e| matches!(e, OrchestratorEvent::BuildCancelled { .. })));
    }

    #[tokio::test]
    async fn test_undo_emits_event() {
        let reasoner = MockReasoner::new().respond_with(segmentation(), 95.0);
        let orchestrator = Orchestrator::new(collaborators(reasoner), OrchestratorConfig::default());

        assert!(!orchestrator.undo().unwrap());
        orchestrator.submit_query("segment guests").await.unwrap();

        let mut events = orchestrator.subscribe();
        assert!(orchestrator.undo().unwrap());
        assert!(orchestrator.active_session().unwrap().current_view_config.is_none());
        assert!(matches!(events.try_recv(), Ok(OrchestratorEvent::BuildUndone { .. })));
    }

    #[tokio::test]
    async fn test_auto_summary_every_interval() {
        let summarizer = MockSummarizer::new().respond_summary("Asked about bookings.");
        let mut collaborators = collaborators(MockReasoner::new());
        collaborators.summarizer = Arc::new(summarizer.clone());
        let orchestrator = Orchestrator::new(collaborators, OrchestratorConfig::default());

        for i in 0..4 {
            orchestrator.submit_query(&format!("question {}?", i)).await.unwrap();
        }
        assert_eq!(summarizer.call_count(), 0);

        orchestrator.submit_query("question 4?").await.unwrap();
        assert_eq!(summarizer.call_count(), 1);
        assert_eq!(summarizer.last_call().unwrap().messages.len(), 10);
        assert_eq!(
            orchestrator.active_session().unwrap().metadata.conversation_summary.as_deref(),
            Some("Asked about bookings.")
        );
    }

    #[tokio::test]
    async fn test_delete_session_clears_results() {
        let orchestrator = Orchestrator::new(collaborators(MockReasoner::unreachable()), OrchestratorConfig::default());
        let first = orchestrator.create_session(CreateSessionOptions::titled("First"));
        orchestrator.submit_query("build a funnel").await.unwrap();
        assert!(!orchestrator.suggestions().is_empty());

        let second = orchestrator.create_session(CreateSessionOptions::titled("Second"));
        assert!(orchestrator.suggestions().is_empty());

        assert!(orchestrator.delete_session(&second));
        assert_eq!(orchestrator.active_session_id().as_deref(), Some(first.as_str()));
        assert!(orchestrator.delete_session(&first));
        assert!(orchestrator.active_session_id().is_none());
        assert!(!orchestrator.delete_session(&first));
    }
}
