//! Next-step suggestions.
//!
//! Two tiers: a remote relevance scorer, and a local rule set derived from
//! the shape of the current view. The remote tier fails soft to an empty
//! list; the local tier never fails.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, warn};

use augur_core::{
    clamp_score, Session, SegmentMode, Suggestion, SuggestionRequest, SuggestionScorer,
    SuggestionType, ViewConfig, MAX_ANALYSES,
};

/// Produces ranked suggestions for a view
pub struct SuggestionEngine {
    scorer: Arc<dyn SuggestionScorer>,
}

impl SuggestionEngine {
    pub fn new(scorer: Arc<dyn SuggestionScorer>) -> Self {
        Self { scorer }
    }

    /// Ask the scorer for suggestions. Any failure, or no view, yields an
    /// empty list. Scores are clamped and sorted highest first.
    pub async fn suggest(&self, current: Option<&ViewConfig>, history: &[ViewConfig]) -> Vec<Suggestion> {
        let Some(current) = current else {
            return Vec::new();
        };

        let start = history.len().saturating_sub(MAX_ANALYSES);
        let request = SuggestionRequest {
            current_view_config: current.clone(),
            session_history: history[start..].to_vec(),
        };

        match self.scorer.score(request).await {
            Ok(response) => {
                let mut suggestions: Vec<Suggestion> = response
                    .suggestions
                    .into_iter()
                    .map(|mut s| {
                        s.action_score = clamp_score(s.action_score);
                        s
                    })
                    .collect();
                sort_by_score(&mut suggestions);
                suggestions
            }
            Err(e) => {
                warn!("Suggestion scoring failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Remote suggestions when there are any, local rules otherwise
    pub async fn suggest_with_fallback(&self, current: Option<&ViewConfig>, history: &[ViewConfig]) -> Vec<Suggestion> {
        let remote = self.suggest(current, history).await;
        if !remote.is_empty() {
            return remote;
        }
        match current {
            Some(view) => {
                debug!("Using local suggestion rules");
                local_suggestions(view)
            }
            None => Vec::new(),
        }
    }

    /// Suggestions for a session's current view and recent history
    pub async fn suggest_for_session(&self, session: &Session) -> Vec<Suggestion> {
        self.suggest_with_fallback(
            session.current_view_config.as_ref(),
            session.recent_analyses(MAX_ANALYSES),
        )
        .await
    }
}

fn sort_by_score(suggestions: &mut [Suggestion]) {
    suggestions.sort_by(|a, b| {
        b.action_score
            .partial_cmp(&a.action_score)
            .unwrap_or(Ordering::Equal)
    });
}

/// Deterministic suggestions derived from a view's shape
pub fn local_suggestions(view: &ViewConfig) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();

    if let Some(funnel) = view.funnel_definition.as_ref().filter(|_| view.is_funnel()) {
        if funnel.group_by.is_none() {
            suggestions.push(Suggestion::new(
                SuggestionType::Compare,
                "Compare by device",
                "See whether mobile and desktop users convert differently.",
                85.0,
                "Compare this funnel by device type",
            ));
            suggestions.push(Suggestion::new(
                SuggestionType::Compare,
                "Compare by traffic source",
                "Check which acquisition channels bring users who convert.",
                80.0,
                "Compare this funnel by traffic source",
            ));
        }

        if funnel.steps.len() > 3 {
            if let Some(step) = funnel.middle_step() {
                let name = if step.label.is_empty() { &step.event_type } else { &step.label };
                suggestions.push(Suggestion::new(
                    SuggestionType::Drill,
                    format!("Drill into {}", name),
                    format!("Look at what users do around the {} step.", name),
                    75.0,
                    format!("Drill into the {} step", name),
                ));
            }
        }

        if funnel.segments.is_empty() {
            suggestions.push(Suggestion::new(
                SuggestionType::Segment,
                "Segment mobile users",
                "Add a mobile-only segment to compare against everyone.",
                70.0,
                "Add a segment for mobile users",
            ));
        }
    }

    if let Some(state) = view.segmentation_state.as_ref().filter(|_| view.is_segmentation()) {
        if state.group_by.is_none() {
            suggestions.push(Suggestion::new(
                SuggestionType::Segment,
                "Break down by device",
                "Split these events by device type.",
                80.0,
                "Break this segmentation down by device type",
            ));
        }

        if matches!(state.mode, SegmentMode::Behavioral | SegmentMode::Guest) {
            suggestions.push(Suggestion::new(
                SuggestionType::Forecast,
                "Forecast the next 7 days",
                "Project where these numbers are heading this week.",
                65.0,
                "Forecast this segmentation for the next 7 days",
            ));
        }
    }

    sort_by_score(&mut suggestions);
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::view_from_updates;
    use crate::mock::MockSuggestionScorer;
    use crate::templates::{booking_funnel_template, segmentation_template};
    use augur_core::{AnalysisType, CollaboratorError, SegmentComparison};

    fn booking_funnel() -> ViewConfig {
        view_from_updates(None, &booking_funnel_template().config_updates)
    }

    fn titles(suggestions: &[Suggestion]) -> Vec<&str> {
        suggestions.iter().map(|s| s.title.as_str()).collect()
    }

    #[test]
    fn test_local_funnel_rules() {
        let suggestions = local_suggestions(&booking_funnel());
        assert_eq!(
            titles(&suggestions),
            vec![
                "Compare by device",
                "Compare by traffic source",
                "Drill into Room Select",
                "Segment mobile users",
            ]
        );
    }

    #[test]
    fn test_local_funnel_rules_respect_shape() {
        let mut view = booking_funnel();
        if let Some(funnel) = view.funnel_definition.as_mut() {
            funnel.group_by = Some("device_type".to_string());
            funnel.steps.truncate(3);
            funnel.segments.push(SegmentComparison {
                id: "1".to_string(),
                name: "Mobile".to_string(),
                filters: Vec::new(),
            });
        }
        assert!(local_suggestions(&view).is_empty());
    }

    #[test]
    fn test_local_segmentation_rules() {
        let view = view_from_updates(None, &segmentation_template().config_updates);
        let suggestions = local_suggestions(&view);
        assert_eq!(titles(&suggestions), vec!["Break down by device", "Forecast the next 7 days"]);
        assert_eq!(suggestions[1].suggestion_type, SuggestionType::Forecast);
    }

    #[test]
    fn test_no_local_rules_for_retention() {
        assert!(local_suggestions(&ViewConfig::new(AnalysisType::Retention)).is_empty());
    }

    #[tokio::test]
    async fn test_remote_sorted_and_clamped() {
        let scorer = MockSuggestionScorer::new().respond_suggestions(vec![
            Suggestion {
                action_score: 40.0,
                ..Suggestion::new(SuggestionType::Diagnose, "low", "", 0.0, "")
            },
            Suggestion {
                action_score: 140.0,
                ..Suggestion::new(SuggestionType::Compare, "high", "", 0.0, "")
            },
        ]);
        let engine = SuggestionEngine::new(Arc::new(scorer));

        let suggestions = engine.suggest(Some(&booking_funnel()), &[]).await;
        assert_eq!(titles(&suggestions), vec!["high", "low"]);
        assert_eq!(suggestions[0].action_score, 100.0);
    }

    #[tokio::test]
    async fn test_remote_failure_is_empty() {
        let scorer = MockSuggestionScorer::new().fail(CollaboratorError::unavailable("down"));
        let engine = SuggestionEngine::new(Arc::new(scorer));
        assert!(engine.suggest(Some(&booking_funnel()), &[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_no_view_skips_scorer() {
        let scorer = MockSuggestionScorer::new();
        let engine = SuggestionEngine::new(Arc::new(scorer.clone()));
        assert!(engine.suggest_with_fallback(None, &[]).await.is_empty());
        assert_eq!(scorer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let scorer = MockSuggestionScorer::new();
        let engine = SuggestionEngine::new(Arc::new(scorer.clone()));
        let history: Vec<ViewConfig> = (0..8).map(|_| booking_funnel()).collect();

        engine.suggest(Some(&booking_funnel()), &history).await;
        let request = scorer.last_call().unwrap();
        assert_eq!(request.session_history.len(), 5);
        assert_eq!(request.session_history[0].id, history[3].id);
    }

    #[tokio::test]
    async fn test_fallback_to_local_rules() {
        let engine = SuggestionEngine::new(Arc::new(MockSuggestionScorer::unreachable()));
        let suggestions = engine.suggest_with_fallback(Some(&booking_funnel()), &[]).await;
        assert_eq!(suggestions.len(), 4);
        assert_eq!(suggestions[0].action_score, 85.0);
    }
}
