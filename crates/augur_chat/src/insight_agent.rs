//! Insight agent.
//!
//! Watches rendered chart data and asks the insight collaborator for
//! micro-insights. Automatic triggers are debounced; every call is bounded by
//! a timeout. Replies are validated and filtered by a confidence floor, and
//! KPI charts get a locally computed trend insight when the collaborator has
//! nothing usable.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use augur_core::{
    clamp_score, truncate_chars, CollaboratorError, InsightAction, InsightAnalyzer,
    InsightCategory, InsightRequest, MicroInsight, OrchestratorConfig, RawInsight, SessionId,
    MAX_EXPLANATION_CHARS, MAX_HEADLINE_CHARS, MAX_SUGGESTED_ACTIONS,
};

use crate::busy::BusyCounter;
use crate::debounce::Debouncer;
use crate::events::OrchestratorEvent;

/// Chart type that gets the relaxed floor and the local trend fallback
pub const KPI_CHART_TYPE: &str = "kpi";

/// Debounced, timeout-bounded chart analysis
#[derive(Clone)]
pub struct InsightAgent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    analyzer: Arc<dyn InsightAnalyzer>,
    config: OrchestratorConfig,
    debouncer: Debouncer,
    /// Latest results per originating session
    results: RwLock<HashMap<SessionId, Vec<MicroInsight>>>,
    /// Inputs whose analysis timed out; automatic triggers skip them
    timed_out: Mutex<HashSet<u64>>,
    auto_generate: AtomicBool,
    in_flight: BusyCounter,
    events: Option<broadcast::Sender<OrchestratorEvent>>,
}

impl InsightAgent {
    pub fn new(analyzer: Arc<dyn InsightAnalyzer>, config: OrchestratorConfig) -> Self {
        Self::build(analyzer, config, None)
    }

    /// Publish an `InsightsUpdated` event after every completed analysis
    pub fn with_events(
        analyzer: Arc<dyn InsightAnalyzer>,
        config: OrchestratorConfig,
        events: broadcast::Sender<OrchestratorEvent>,
    ) -> Self {
        Self::build(analyzer, config, Some(events))
    }

    fn build(
        analyzer: Arc<dyn InsightAnalyzer>,
        config: OrchestratorConfig,
        events: Option<broadcast::Sender<OrchestratorEvent>>,
    ) -> Self {
        let debouncer = Debouncer::new(config.insight_debounce());
        Self {
            inner: Arc::new(AgentInner {
                analyzer,
                config,
                debouncer,
                results: RwLock::new(HashMap::new()),
                timed_out: Mutex::new(HashSet::new()),
                auto_generate: AtomicBool::new(false),
                in_flight: BusyCounter::default(),
                events,
            }),
        }
    }

    /// Opt in or out of automatic analysis on chart changes
    pub fn set_auto_generate(&self, enabled: bool) {
        self.inner.auto_generate.store(enabled, Ordering::SeqCst);
        if !enabled {
            self.inner.debouncer.cancel();
        }
    }

    pub fn auto_generate(&self) -> bool {
        self.inner.auto_generate.load(Ordering::SeqCst)
    }

    /// Note a chart change. When auto-generation is on, an analysis is
    /// scheduled after the debounce window; a newer change replaces it.
    ///
    /// Returns whether an analysis was scheduled. Inputs that timed out
    /// before are skipped until a manual refresh.
    pub fn observe(
        &self,
        session_id: impl Into<SessionId>,
        chart_data: Vec<Value>,
        chart_type: impl Into<String>,
    ) -> bool {
        if !self.auto_generate() {
            return false;
        }

        let chart_type = chart_type.into();
        let key = fingerprint(&chart_data, &chart_type);
        if self.inner.timed_out.lock().contains(&key) {
            debug!("Skipping automatic analysis of input that timed out before");
            return false;
        }

        let agent = self.clone();
        let session_id = session_id.into();
        self.inner.debouncer.schedule(async move {
            agent.analyze(&session_id, chart_data, &chart_type).await;
        });
        true
    }

    /// Analyze now, bypassing the debounce and forgetting earlier timeouts
    pub async fn refresh(&self, session_id: &str, chart_data: Vec<Value>, chart_type: &str) -> Vec<MicroInsight> {
        self.inner.debouncer.cancel();
        self.inner.timed_out.lock().clear();
        self.analyze(session_id, chart_data, chart_type).await
    }

    /// Run one analysis and store its results for `session_id`, replacing
    /// whatever was there.
    pub async fn analyze(&self, session_id: &str, chart_data: Vec<Value>, chart_type: &str) -> Vec<MicroInsight> {
        let _busy = self.inner.in_flight.enter();
        let config = &self.inner.config;
        let timeout = config.insight_timeout();

        let request = InsightRequest {
            chart_data: chart_data.clone(),
            chart_type: chart_type.to_string(),
            persona: config.persona.clone(),
            max_insights: config.max_insights,
        };

        let outcome = match tokio::time::timeout(timeout, self.inner.analyzer.analyze(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Insight analysis timed out after {:?}", timeout);
                self.inner.timed_out.lock().insert(fingerprint(&chart_data, chart_type));
                Err(CollaboratorError::Timeout(timeout))
            }
        };

        let floor = config.insight_floor(chart_type);
        let mut insights = match outcome {
            Ok(ref response) => validate_insights(response.insights.clone(), floor, config.max_insights),
            Err(ref e) => {
                warn!("Insight analysis failed: {}", e);
                Vec::new()
            }
        };

        if insights.is_empty() && chart_type.eq_ignore_ascii_case(KPI_CHART_TYPE) {
            let confidence = if outcome.is_ok() {
                config.kpi_fallback_confidence
            } else {
                config.kpi_error_fallback_confidence
            };
            if let Some(trend) = kpi_trend_insight(&chart_data, confidence) {
                info!("Using local KPI trend insight");
                insights.push(trend);
            }
        }

        debug!("Storing {} insights for session {}", insights.len(), session_id);
        self.inner
            .results
            .write()
            .insert(session_id.to_string(), insights.clone());

        if let Some(ref events) = self.inner.events {
            // no subscribers is fine
            let _ = events.send(OrchestratorEvent::InsightsUpdated {
                session_id: session_id.to_string(),
                insights: insights.clone(),
            });
        }
        insights
    }

    /// Latest insights for a session
    pub fn insights(&self, session_id: &str) -> Vec<MicroInsight> {
        self.inner.results.read().get(session_id).cloned().unwrap_or_default()
    }

    /// Advisory busy flag
    pub fn is_analyzing(&self) -> bool {
        self.inner.in_flight.is_busy()
    }

    /// Whether a debounced analysis is waiting to run
    pub fn has_pending(&self) -> bool {
        self.inner.debouncer.is_pending()
    }

    pub fn forget_session(&self, session_id: &str) {
        self.inner.results.write().remove(session_id);
    }
}

fn fingerprint(chart_data: &[Value], chart_type: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    chart_type.to_lowercase().hash(&mut hasher);
    for record in chart_data {
        record.to_string().hash(&mut hasher);
    }
    hasher.finish()
}

/// Validate raw insights: drop those without a headline or below `floor`,
/// clamp and truncate the rest, and keep at most `max`.
pub fn validate_insights(raw: Vec<RawInsight>, floor: f64, max: usize) -> Vec<MicroInsight> {
    raw.into_iter()
        .filter_map(validate_insight)
        .filter(|insight| insight.confidence >= floor)
        .take(max)
        .collect()
}

fn validate_insight(raw: RawInsight) -> Option<MicroInsight> {
    let headline = raw.headline.as_deref().map(str::trim).unwrap_or_default();
    if headline.is_empty() {
        return None;
    }

    let mut actions = raw.suggested_actions;
    actions.truncate(MAX_SUGGESTED_ACTIONS);

    Some(MicroInsight {
        id: raw.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        data_point_index: raw.data_point_index.unwrap_or(0),
        headline: truncate_chars(headline, MAX_HEADLINE_CHARS),
        explanation: truncate_chars(raw.explanation.as_deref().unwrap_or_default(), MAX_EXPLANATION_CHARS),
        confidence: clamp_score(raw.confidence.unwrap_or(0.0)),
        category: raw.category.unwrap_or_default(),
        suggested_actions: actions,
    })
}

fn numeric_value(record: &Value) -> Option<f64> {
    match record {
        Value::Number(n) => n.as_f64(),
        Value::Object(map) => map.get("value").and_then(Value::as_f64),
        _ => None,
    }
}

/// Synthesize a trend insight from the first and last values of a KPI series.
///
/// Needs at least two records with a numeric `value`.
pub fn kpi_trend_insight(chart_data: &[Value], confidence: f64) -> Option<MicroInsight> {
    if chart_data.len() < 2 {
        return None;
    }
    let first = numeric_value(chart_data.first()?)?;
    let last = numeric_value(chart_data.last()?)?;

    let change = if first == 0.0 {
        if last == 0.0 {
            0.0
        } else {
            100.0_f64.copysign(last)
        }
    } else {
        (last - first) / first.abs() * 100.0
    };

    let headline = if change > 0.0 {
        format!("KPI increased {:.1}% over the period", change)
    } else if change < 0.0 {
        format!("KPI decreased {:.1}% over the period", change.abs())
    } else {
        "KPI held steady over the period".to_string()
    };

    Some(MicroInsight {
        id: uuid::Uuid::new_v4().to_string(),
        data_point_index: chart_data.len() - 1,
        headline,
        explanation: format!(
            "Moved from {} to {} across {} data points.",
            first,
            last,
            chart_data.len()
        ),
        confidence: clamp_score(confidence),
        category: InsightCategory::Trend,
        suggested_actions: vec![
            InsightAction::new("Break down by device").with_prompt("Break this KPI down by device type"),
        ],
    })
}
