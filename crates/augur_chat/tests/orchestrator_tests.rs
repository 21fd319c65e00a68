//! End-to-end tests for the orchestrator with scripted collaborators.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Notify;

use augur_chat::mock::{
    MockAnswerer, MockInsightAnalyzer, MockReasoner, MockSuggestionScorer, MockSummarizer,
};
use augur_chat::{
    BuildState, Collaborators, Orchestrator, OrchestratorEvent, QueryOutcome, BOOKING_FUNNEL_STEPS,
};
use augur_core::{
    AnalysisType, BuildSource, ConfigUpdates, CreateSessionOptions, InsightCategory,
    OrchestratorConfig, OrderedStep,
};

fn collaborators(reasoner: MockReasoner, analyzer: MockInsightAnalyzer) -> Collaborators {
    Collaborators {
        reasoner: Arc::new(reasoner),
        analyzer: Arc::new(analyzer),
        scorer: Arc::new(MockSuggestionScorer::unreachable()),
        summarizer: Arc::new(MockSummarizer::unreachable()),
        answerer: Arc::new(MockAnswerer::new().respond_answer("It went up.")),
    }
}

fn orchestrator(reasoner: MockReasoner) -> Orchestrator {
    Orchestrator::new(
        collaborators(reasoner, MockInsightAnalyzer::new()),
        OrchestratorConfig::default(),
    )
}

fn checkout_funnel() -> ConfigUpdates {
    ConfigUpdates {
        analysis_type: Some(AnalysisType::Funnel),
        funnel_steps: Some(vec![
            OrderedStep::new("1", "", "page_view", "web"),
            OrderedStep::new("2", "", "payment", "web"),
        ]),
        ..Default::default()
    }
}

/// Unreachable reasoning service: the booking template is applied.
#[tokio::test]
async fn test_booking_funnel_fallback() {
    let orchestrator = Orchestrator::new(Collaborators::offline(), OrchestratorConfig::default());

    let outcome = orchestrator.submit_query("Build a booking funnel").await.unwrap();
    let QueryOutcome::Build(result) = outcome else {
        panic!("expected a build outcome");
    };

    assert_eq!(result.source, BuildSource::Fallback);
    assert_eq!(result.config_updates.analysis_type, Some(AnalysisType::Funnel));
    assert!(result.explanation.contains("6 steps"));

    let view = orchestrator.active_session().unwrap().current_view_config.unwrap();
    let labels: Vec<String> = view
        .funnel_definition
        .unwrap()
        .steps
        .into_iter()
        .map(|s| s.label)
        .collect();
    assert_eq!(labels, BOOKING_FUNNEL_STEPS.to_vec());

    // local suggestion rules kick in when the scorer is unavailable
    assert!(!orchestrator.suggestions().is_empty());
}

#[tokio::test]
async fn test_confidence_gate_boundary() {
    let orchestrator = orchestrator(
        MockReasoner::new()
            .respond_with(checkout_funnel(), 90.0)
            .respond_with(checkout_funnel(), 89.0),
    );

    orchestrator.submit_query("build a checkout funnel").await.unwrap();
    let applied = orchestrator.active_session().unwrap().current_view_config;
    assert!(applied.is_some());

    orchestrator.submit_query("compare by device").await.unwrap();
    assert_eq!(orchestrator.build_state(), BuildState::AwaitingConfirmation);
    assert_eq!(orchestrator.active_session().unwrap().current_view_config, applied);

    orchestrator.confirm_build().await.unwrap();
    assert_ne!(orchestrator.active_session().unwrap().current_view_config, applied);
}

#[tokio::test]
async fn test_apply_then_undo_restores_previous_view() {
    let orchestrator = orchestrator(
        MockReasoner::new()
            .respond_with(checkout_funnel(), 95.0)
            .respond_with(
                ConfigUpdates {
                    funnel_group_by: Some("device_type".to_string()),
                    ..Default::default()
                },
                95.0,
            ),
    );

    orchestrator.submit_query("build a checkout funnel").await.unwrap();
    let before = orchestrator.active_session().unwrap().current_view_config;

    orchestrator.submit_query("group by device").await.unwrap();
    let mutated = orchestrator.active_session().unwrap().current_view_config.unwrap();
    assert_eq!(
        mutated.funnel_definition.as_ref().unwrap().group_by.as_deref(),
        Some("device_type")
    );
    assert_eq!(mutated.funnel_definition.unwrap().steps.len(), 2);

    assert!(orchestrator.undo().unwrap());
    assert_eq!(orchestrator.active_session().unwrap().current_view_config, before);
    assert_eq!(orchestrator.active_session().unwrap().analyses.len(), 2);
}

/// A build resolves into the session it started in, not the active one.
#[tokio::test]
async fn test_build_lands_in_originating_session() {
    let gate = Arc::new(Notify::new());
    let reasoner = MockReasoner::new()
        .respond_with(checkout_funnel(), 95.0)
        .with_gate(gate.clone());
    let orchestrator = Arc::new(orchestrator(reasoner.clone()));

    let a = orchestrator.create_session(CreateSessionOptions::titled("A"));
    let task = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.submit_query("build a checkout funnel").await })
    };

    while reasoner.call_count() == 0 {
        tokio::task::yield_now().await;
    }
    assert!(orchestrator.is_building());

    let b = orchestrator.create_session(CreateSessionOptions::titled("B"));
    assert_eq!(orchestrator.active_session_id().as_deref(), Some(b.as_str()));

    gate.notify_one();
    let outcome = task.await.unwrap().unwrap();
    assert!(matches!(outcome, QueryOutcome::Build(_)));
    assert!(!orchestrator.is_building());

    let session_a = orchestrator.session(&a).unwrap();
    assert!(session_a.current_view_config.is_some());
    assert_eq!(session_a.messages.len(), 2);

    let session_b = orchestrator.session(&b).unwrap();
    assert!(session_b.current_view_config.is_none());
    assert!(session_b.messages.is_empty());
    assert!(orchestrator.suggestions().is_empty());
}

#[tokio::test]
async fn test_kpi_trend_when_analyzer_is_silent() {
    let orchestrator = Orchestrator::new(
        collaborators(MockReasoner::new(), MockInsightAnalyzer::new().respond_insights(Vec::new())),
        OrchestratorConfig::default(),
    );
    let mut events = orchestrator.subscribe();

    let insights = orchestrator
        .refresh_insights(vec![json!({"value": 100}), json!({"value": 150})], "kpi")
        .await;

    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].category, InsightCategory::Trend);
    assert_eq!(insights[0].confidence, 70.0);
    assert!(insights[0].headline.contains("increased"));
    assert_eq!(orchestrator.insights(), insights);

    let mut updated = false;
    while let Ok(event) = events.try_recv() {
        updated |= matches!(event, OrchestratorEvent::InsightsUpdated { .. });
    }
    assert!(updated);
}

#[tokio::test(start_paused = true)]
async fn test_chart_changes_are_debounced() {
    let analyzer = MockInsightAnalyzer::new();
    let orchestrator = Orchestrator::new(
        collaborators(MockReasoner::new(), analyzer.clone()),
        OrchestratorConfig::default(),
    );

    // auto-generation is opt-in
    assert!(!orchestrator.observe_chart(vec![json!({"value": 1})], "bar"));

    orchestrator.set_auto_insights(true);
    for value in [1, 2, 3] {
        assert!(orchestrator.observe_chart(vec![json!({ "value": value })], "bar"));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(analyzer.call_count(), 0);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(analyzer.call_count(), 1);
    assert_eq!(analyzer.last_call().unwrap().chart_data, vec![json!({"value": 3})]);
}

#[tokio::test(start_paused = true)]
async fn test_insight_timeout_falls_back_for_kpi() {
    let analyzer = MockInsightAnalyzer::new().with_delay(Duration::from_secs(20));
    let orchestrator = Orchestrator::new(
        collaborators(MockReasoner::new(), analyzer),
        OrchestratorConfig::default(),
    );

    let insights = orchestrator
        .refresh_insights(vec![json!({"value": 200}), json!({"value": 100})], "kpi")
        .await;

    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].confidence, 65.0);
    assert!(insights[0].headline.contains("decreased"));
    assert!(!orchestrator.is_analyzing());
}

#[tokio::test]
async fn test_message_history_is_bounded() {
    let orchestrator = orchestrator(MockReasoner::new());
    for i in 0..30 {
        orchestrator.submit_query(&format!("what happened on day {}?", i)).await.unwrap();
    }

    let session = orchestrator.active_session().unwrap();
    assert_eq!(session.messages.len(), 50);
    assert_eq!(session.messages[0].text, "what happened on day 5?");
}

/// A confident build supersedes one still waiting for confirmation.
#[tokio::test]
async fn test_new_build_supersedes_unconfirmed_one() {
    let orchestrator = orchestrator(
        MockReasoner::new()
            .respond_with(
                ConfigUpdates {
                    analysis_type: Some(AnalysisType::Retention),
                    ..Default::default()
                },
                50.0,
            )
            .respond_with(
                ConfigUpdates {
                    analysis_type: Some(AnalysisType::Paths),
                    ..Default::default()
                },
                95.0,
            ),
    );
    let mut events = orchestrator.subscribe();

    orchestrator.submit_query("show me retention").await.unwrap();
    assert_eq!(orchestrator.build_state(), BuildState::AwaitingConfirmation);

    orchestrator.submit_query("show me paths").await.unwrap();
    assert_eq!(orchestrator.build_state(), BuildState::Idle);
    assert!(orchestrator.pending_build().is_none());
    assert!(orchestrator.confirm_build().await.is_err());

    let view = orchestrator.active_session().unwrap().current_view_config.unwrap();
    assert_eq!(view.analysis_type, AnalysisType::Paths);

    let mut cancelled = false;
    while let Ok(event) = events.try_recv() {
        cancelled |= matches!(event, OrchestratorEvent::BuildCancelled { .. });
    }
    assert!(cancelled);
}

/// Switching analysis type in a session with a view does not carry the old
/// type's settings over.
#[tokio::test]
async fn test_switching_analysis_type_drops_stale_state() {
    let orchestrator = orchestrator(
        MockReasoner::new()
            .respond_with(
                ConfigUpdates {
                    analysis_type: Some(AnalysisType::Segmentation),
                    segment_events: Some(vec!["Landed".to_string()]),
                    ..Default::default()
                },
                95.0,
            )
            .respond_with(checkout_funnel(), 95.0),
    );

    orchestrator.submit_query("segment guests").await.unwrap();
    orchestrator.submit_query("build a checkout funnel").await.unwrap();

    let view = orchestrator.active_session().unwrap().current_view_config.unwrap();
    assert!(view.is_funnel());
    assert!(view.segmentation_state.is_none());
    assert_eq!(view.funnel_definition.unwrap().steps.len(), 2);
}
