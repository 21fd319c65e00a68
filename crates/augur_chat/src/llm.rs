//! HTTP-backed LLM collaborators.
//!
//! [`LlmAdapter`] talks to the OpenAI or Anthropic chat APIs, selected via
//! environment variables. [`LlmCollaborator`] puts a prompt in front of it
//! for each collaborator contract and parses the JSON block out of the reply.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use augur_core::{
    AnswerRequest, AnswerResponse, CollaboratorError, CollaboratorResult, ConversationTurn,
    InsightAnalyzer, InsightRequest, InsightResponse, MessageRole, QuestionAnswerer, Reasoner,
    ReasoningRequest, ReasoningResponse, Suggestion, SuggestionRequest, SuggestionResponse,
    SuggestionScorer, SuggestionType, Summarizer, SummaryRequest, SummaryResponse,
};

use crate::error::{ChatError, ChatResult};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const MAX_RETRIES: u32 = 3;
const MAX_TOKENS: u32 = 4096;

/// First `{` to last `}`, across lines
const JSON_BLOCK: &str = r"\{[\s\S]*\}";

/// LLM provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Anthropic,
}

impl LlmProvider {
    fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-4o-mini",
            Self::Anthropic => "claude-3-5-haiku-latest",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
        }
    }
}

/// LLM adapter that handles API calls
pub struct LlmAdapter {
    provider: LlmProvider,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl LlmAdapter {
    pub fn new(provider: LlmProvider, api_key: impl Into<String>, model: Option<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| provider.default_model().to_string()),
            client: reqwest::Client::new(),
        }
    }

    /// Create an adapter from environment variables.
    ///
    /// Uses `OPENAI_API_KEY` if set, then `ANTHROPIC_API_KEY`.
    /// `AUGUR_LLM_MODEL` overrides the provider's default model.
    pub fn from_env() -> ChatResult<Self> {
        let model = std::env::var("AUGUR_LLM_MODEL").ok().filter(|m| !m.is_empty());

        for (var, provider) in [
            ("OPENAI_API_KEY", LlmProvider::OpenAI),
            ("ANTHROPIC_API_KEY", LlmProvider::Anthropic),
        ] {
            if let Ok(key) = std::env::var(var) {
                if !key.is_empty() {
                    return Ok(Self::new(provider, key, model));
                }
            }
        }

        Err(ChatError::LlmNotConfigured)
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a system prompt plus conversation and return the reply text.
    ///
    /// Network errors, 5xx and 429 are retried with exponential backoff.
    pub async fn complete(&self, system: &str, turns: &[ConversationTurn]) -> ChatResult<String> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // 2s, 4s
                tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
            }

            let response = match self.request(system, turns).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(ChatError::Llm(format!("Network error: {}", e)));
                    continue;
                }
            };

            let status = response.status();
            if status.is_server_error() || status.as_u16() == 429 {
                let body = response.text().await.unwrap_or_default();
                warn!(
                    "{} API error {} (attempt {}/{})",
                    self.provider.name(),
                    status,
                    attempt + 1,
                    MAX_RETRIES
                );
                last_error = Some(ChatError::Llm(format!(
                    "{} API error {}: {}",
                    self.provider.name(),
                    status,
                    body
                )));
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ChatError::Llm(format!(
                    "{} API error {}: {}",
                    self.provider.name(),
                    status,
                    body
                )));
            }

            return match self.provider {
                LlmProvider::OpenAI => {
                    let result: OpenAIResponse = response
                        .json()
                        .await
                        .map_err(|e| ChatError::Llm(format!("Failed to parse response: {}", e)))?;
                    result
                        .choices
                        .into_iter()
                        .next()
                        .map(|c| c.message.content)
                        .ok_or_else(|| ChatError::Llm("No response from OpenAI".to_string()))
                }
                LlmProvider::Anthropic => {
                    let result: AnthropicResponse = response
                        .json()
                        .await
                        .map_err(|e| ChatError::Llm(format!("Failed to parse response: {}", e)))?;
                    result
                        .content
                        .into_iter()
                        .next()
                        .map(|c| c.text)
                        .ok_or_else(|| ChatError::Llm("No response from Anthropic".to_string()))
                }
            };
        }

        Err(last_error.unwrap_or_else(|| ChatError::Llm("Max retries exceeded".to_string())))
    }

    fn request(&self, system: &str, turns: &[ConversationTurn]) -> reqwest::RequestBuilder {
        match self.provider {
            LlmProvider::OpenAI => {
                let mut messages = vec![ApiMessage::new("system", system)];
                messages.extend(turns.iter().map(ApiMessage::from));
                self.client
                    .post(OPENAI_URL)
                    .bearer_auth(&self.api_key)
                    .json(&OpenAIRequest {
                        model: self.model.clone(),
                        messages,
                        max_completion_tokens: Some(MAX_TOKENS),
                    })
            }
            LlmProvider::Anthropic => self
                .client
                .post(ANTHROPIC_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", "2023-06-01")
                .json(&AnthropicRequest {
                    model: self.model.clone(),
                    max_tokens: MAX_TOKENS,
                    system: Some(system.to_string()),
                    messages: turns.iter().map(ApiMessage::from).collect(),
                }),
        }
    }
}

/// Parse the first JSON object embedded in an LLM reply
pub fn extract_json<T: DeserializeOwned>(reply: &str) -> CollaboratorResult<T> {
    let block = json_block()?
        .find(reply)
        .ok_or_else(|| CollaboratorError::malformed("no JSON object in reply"))?;

    serde_json::from_str(block.as_str()).map_err(|e| CollaboratorError::malformed(e.to_string()))
}

/// The compiled [`JSON_BLOCK`] pattern, built on first use
fn json_block() -> CollaboratorResult<&'static Regex> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(JSON_BLOCK))
        .as_ref()
        .map_err(|e| CollaboratorError::malformed(e.to_string()))
}

/// Implements every collaborator contract on top of an [`LlmAdapter`]
#[derive(Clone)]
pub struct LlmCollaborator {
    adapter: Arc<LlmAdapter>,
}

impl LlmCollaborator {
    pub fn new(adapter: LlmAdapter) -> Self {
        Self {
            adapter: Arc::new(adapter),
        }
    }

    pub fn from_env() -> ChatResult<Self> {
        Ok(Self::new(LlmAdapter::from_env()?))
    }

    async fn ask(&self, system: &str, turns: &[ConversationTurn]) -> CollaboratorResult<String> {
        debug!("Calling {} ({})", self.adapter.provider().name(), self.adapter.model());
        self.adapter
            .complete(system, turns)
            .await
            .map_err(|e| CollaboratorError::unavailable(e.to_string()))
    }
}

const REASONING_PROMPT: &str = "You configure product analytics charts. Reply with a single JSON object \
{\"config_updates\": {...}, \"explanation\": string, \"confidence\": 0-100}. \
config_updates may contain analysis_type (funnel|segmentation|retention|paths), measurement, \
funnel_steps [{id, label, event_type, event_category}], funnel_view_type, funnel_completed_within, \
funnel_counting_by (unique_users|sessions|events), funnel_group_by, funnel_segments, \
funnel_global_filters, funnel_order (strict|any), segment_mode, segment_events, segment_group_by \
and layout_template. Include only the fields the request needs.";

const INSIGHT_PROMPT: &str = "You find patterns in chart data. Reply with a single JSON object \
{\"insights\": [{\"dataPointIndex\": int, \"headline\": string, \"explanation\": string, \
\"confidence\": 0-100, \"category\": spike|drop|anomaly|trend|correlation|opportunity, \
\"suggestedActions\": [{\"label\": string, \"prompt\": string}]}]}.";

const SUGGESTION_PROMPT: &str = "You recommend the next analysis to run. Reply with a single JSON object \
{\"suggestions\": [{\"type\": compare|drill|segment|forecast|diagnose, \"title\": string, \
\"description\": string, \"action_score\": 0-100, \"suggested_action\": string}]}.";

const SUMMARY_PROMPT: &str = "Summarize this analytics conversation in two or three sentences. \
Mention the analyses built and any open questions. Reply with the summary only.";

const ANSWER_PROMPT: &str = "You are a product analytics assistant. Answer the user's question \
briefly, using the current chart configuration when it is relevant.";

#[async_trait]
impl Reasoner for LlmCollaborator {
    async fn reason(&self, request: ReasoningRequest) -> CollaboratorResult<ReasoningResponse> {
        let mut turns = request.messages.clone();
        turns.push(ConversationTurn::user(format!(
            "Request: {}\nMutate current config: {}\nCurrent config: {}\nConversation summary: {}",
            request.query,
            request.mutation_mode,
            to_json(&request.current_config),
            request.conversation_summary.as_deref().unwrap_or("none"),
        )));

        let reply = self.ask(REASONING_PROMPT, &turns).await?;
        extract_json(&reply)
    }
}

#[async_trait]
impl InsightAnalyzer for LlmCollaborator {
    async fn analyze(&self, request: InsightRequest) -> CollaboratorResult<InsightResponse> {
        let turn = ConversationTurn::user(format!(
            "Chart type: {}\nAudience: {}\nReturn at most {} insights.\nData: {}",
            request.chart_type,
            request.persona,
            request.max_insights,
            to_json(&request.chart_data),
        ));

        let reply = self.ask(INSIGHT_PROMPT, &[turn]).await?;
        extract_json(&reply)
    }
}

#[async_trait]
impl SuggestionScorer for LlmCollaborator {
    async fn score(&self, request: SuggestionRequest) -> CollaboratorResult<SuggestionResponse> {
        let turn = ConversationTurn::user(format!(
            "Current view: {}\nRecent views: {}",
            to_json(&request.current_view_config),
            to_json(&request.session_history),
        ));

        let reply = self.ask(SUGGESTION_PROMPT, &[turn]).await?;
        let parsed: LlmSuggestions = extract_json(&reply)?;
        Ok(SuggestionResponse {
            suggestions: parsed
                .suggestions
                .into_iter()
                .map(|s| {
                    Suggestion::new(
                        s.suggestion_type,
                        s.title,
                        s.description,
                        s.action_score,
                        s.suggested_action,
                    )
                })
                .collect(),
        })
    }
}

#[async_trait]
impl Summarizer for LlmCollaborator {
    async fn summarize(&self, request: SummaryRequest) -> CollaboratorResult<SummaryResponse> {
        let reply = self.ask(SUMMARY_PROMPT, &request.messages).await?;
        Ok(SummaryResponse {
            summary: reply.trim().to_string(),
        })
    }
}

#[async_trait]
impl QuestionAnswerer for LlmCollaborator {
    async fn answer(&self, request: AnswerRequest) -> CollaboratorResult<AnswerResponse> {
        let mut turns = request.messages.clone();
        turns.push(ConversationTurn::user(format!(
            "{}\n\nCurrent config: {}",
            request.question,
            to_json(&request.current_config),
        )));

        let reply = self.ask(ANSWER_PROMPT, &turns).await?;
        Ok(AnswerResponse {
            answer: reply.trim().to_string(),
        })
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Suggestions as the LLM writes them, without ids
#[derive(Debug, Deserialize)]
struct LlmSuggestions {
    #[serde(default)]
    suggestions: Vec<LlmSuggestion>,
}

#[derive(Debug, Deserialize)]
struct LlmSuggestion {
    #[serde(rename = "type")]
    suggestion_type: SuggestionType,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    action_score: f64,
    #[serde(default)]
    suggested_action: String,
}

// Wire types shared by both APIs
#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

impl ApiMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

impl From<&ConversationTurn> for ApiMessage {
    fn from(turn: &ConversationTurn) -> Self {
        let role = match turn.role {
            MessageRole::User => "user",
            MessageRole::Model => "assistant",
        };
        Self::new(role, &turn.content)
    }
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: String,
}
