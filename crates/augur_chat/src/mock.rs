//! Scripted collaborators for testing.
//!
//! [`Scripted`] implements every collaborator contract. It records each
//! request, answers from a queue of scripted replies, and can be held back
//! with a delay or a [`Notify`] gate so tests can interleave other work
//! while a call is outstanding.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::Notify;

use augur_core::{
    AnswerRequest, AnswerResponse, CollaboratorError, CollaboratorResult, ConfigUpdates,
    InsightAnalyzer, InsightRequest, InsightResponse, QuestionAnswerer, Reasoner,
    ReasoningRequest, ReasoningResponse, RawInsight, Suggestion, SuggestionRequest,
    SuggestionResponse, SuggestionScorer, Summarizer, SummaryRequest, SummaryResponse,
};

/// A collaborator that replays scripted replies and captures requests.
#[derive(Clone)]
pub struct Scripted<Req, Resp> {
    /// Replies returned in order, one per call.
    responses: Arc<RwLock<VecDeque<CollaboratorResult<Resp>>>>,
    /// Reply used once the queue is exhausted.
    when_empty: Arc<RwLock<CollaboratorResult<Resp>>>,
    /// Captured requests for verification.
    calls: Arc<RwLock<Vec<Req>>>,
    delay: Arc<RwLock<Option<Duration>>>,
    gate: Arc<RwLock<Option<Arc<Notify>>>>,
}

impl<Req, Resp> Default for Scripted<Req, Resp>
where
    Req: Clone,
    Resp: Clone + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<Req, Resp> Scripted<Req, Resp>
where
    Req: Clone,
    Resp: Clone + Default,
{
    /// Create a collaborator that answers with `Resp::default()`.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(RwLock::new(VecDeque::new())),
            when_empty: Arc::new(RwLock::new(Ok(Resp::default()))),
            calls: Arc::new(RwLock::new(Vec::new())),
            delay: Arc::new(RwLock::new(None)),
            gate: Arc::new(RwLock::new(None)),
        }
    }

    /// Create a collaborator whose every call fails as unreachable.
    pub fn unreachable() -> Self {
        Self::new().when_empty(Err(CollaboratorError::unavailable("connection refused")))
    }

    /// Queue a successful reply.
    pub fn respond(self, response: Resp) -> Self {
        self.responses.write().push_back(Ok(response));
        self
    }

    /// Queue a failure.
    pub fn fail(self, error: CollaboratorError) -> Self {
        self.responses.write().push_back(Err(error));
        self
    }

    /// Set the reply used once the queue is empty.
    pub fn when_empty(self, result: CollaboratorResult<Resp>) -> Self {
        *self.when_empty.write() = result;
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.write() = Some(delay);
        self
    }

    /// Hold each call until the gate is notified.
    pub fn with_gate(self, gate: Arc<Notify>) -> Self {
        *self.gate.write() = Some(gate);
        self
    }

    /// Get all captured requests.
    pub fn calls(&self) -> Vec<Req> {
        self.calls.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().len()
    }

    pub fn last_call(&self) -> Option<Req> {
        self.calls.read().last().cloned()
    }

    async fn call(&self, request: Req) -> CollaboratorResult<Resp> {
        self.calls.write().push(request);

        let gate = self.gate.read().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.responses.write().pop_front();
        next.unwrap_or_else(|| self.when_empty.read().clone())
    }
}

pub type MockReasoner = Scripted<ReasoningRequest, ReasoningResponse>;
pub type MockInsightAnalyzer = Scripted<InsightRequest, InsightResponse>;
pub type MockSuggestionScorer = Scripted<SuggestionRequest, SuggestionResponse>;
pub type MockSummarizer = Scripted<SummaryRequest, SummaryResponse>;
pub type MockAnswerer = Scripted<AnswerRequest, AnswerResponse>;

impl MockReasoner {
    /// Queue a reply carrying `updates` at the given confidence.
    pub fn respond_with(self, updates: ConfigUpdates, confidence: f64) -> Self {
        self.respond(ReasoningResponse {
            config_updates: Some(updates),
            explanation: format!("Configured at {:.0}% confidence", confidence),
            confidence,
            component_spec: None,
        })
    }
}

impl MockInsightAnalyzer {
    pub fn respond_insights(self, insights: Vec<RawInsight>) -> Self {
        self.respond(InsightResponse { insights })
    }
}

impl MockSuggestionScorer {
    pub fn respond_suggestions(self, suggestions: Vec<Suggestion>) -> Self {
        self.respond(SuggestionResponse { suggestions })
    }
}

impl MockSummarizer {
    pub fn respond_summary(self, summary: impl Into<String>) -> Self {
        self.respond(SummaryResponse { summary: summary.into() })
    }
}

impl MockAnswerer {
    pub fn respond_answer(self, answer: impl Into<String>) -> Self {
        self.respond(AnswerResponse { answer: answer.into() })
    }
}

#[async_trait]
impl Reasoner for MockReasoner {
    async fn reason(&self, request: ReasoningRequest) -> CollaboratorResult<ReasoningResponse> {
        self.call(request).await
    }
}

#[async_trait]
impl InsightAnalyzer for MockInsightAnalyzer {
    async fn analyze(&self, request: InsightRequest) -> CollaboratorResult<InsightResponse> {
        self.call(request).await
    }
}

#[async_trait]
impl SuggestionScorer for MockSuggestionScorer {
    async fn score(&self, request: SuggestionRequest) -> CollaboratorResult<SuggestionResponse> {
        self.call(request).await
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, request: SummaryRequest) -> CollaboratorResult<SummaryResponse> {
        self.call(request).await
    }
}

#[async_trait]
impl QuestionAnswerer for MockAnswerer {
    async fn answer(&self, request: AnswerRequest) -> CollaboratorResult<AnswerResponse> {
        self.call(request).await
    }
}
