//! Local chart templates used when the reasoning collaborator is unavailable.

use augur_core::{
    is_build_intent, AnalysisType, ConfigUpdates, CountingBy, FunnelViewType, OrderedStep,
    SegmentMode,
};

/// Event category of the canonical booking funnel
pub const BOOKING_EVENT_CATEGORY: &str = "hospitality";

/// Canonical booking funnel, in order
pub const BOOKING_FUNNEL_STEPS: [&str; 6] = [
    "Landed",
    "Location Select",
    "Date Select",
    "Room Select",
    "Payment",
    "Confirmation",
];

/// Events tracked by the fallback segmentation
pub const SEGMENTATION_EVENTS: [&str; 3] = ["Landed", "Room Select", "Confirmation"];

/// A template chosen for a request, with the message shown to the user
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackTemplate {
    pub config_updates: ConfigUpdates,
    pub explanation: String,
}

/// Pick a template for a query, or `None` when the query has no build intent.
///
/// Queries that mention segments (and not funnels) get the segmentation
/// template; every other build request gets the booking funnel.
pub fn fallback_for_query(query: &str) -> Option<FallbackTemplate> {
    if !is_build_intent(query) {
        return None;
    }

    let lower = query.to_lowercase();
    if lower.contains("segment") && !lower.contains("funnel") {
        Some(segmentation_template())
    } else {
        Some(booking_funnel_template())
    }
}

pub fn booking_funnel_template() -> FallbackTemplate {
    let steps: Vec<OrderedStep> = BOOKING_FUNNEL_STEPS
        .iter()
        .enumerate()
        .map(|(i, label)| OrderedStep::new((i + 1).to_string(), *label, *label, BOOKING_EVENT_CATEGORY))
        .collect();

    let explanation = format!(
        "Built a booking funnel with {} steps: {}. The reasoning service was unavailable, so I used the standard booking template.",
        steps.len(),
        BOOKING_FUNNEL_STEPS.join(" → ")
    );

    FallbackTemplate {
        config_updates: ConfigUpdates {
            analysis_type: Some(AnalysisType::Funnel),
            funnel_steps: Some(steps),
            funnel_view_type: Some(FunnelViewType::Conversion),
            funnel_counting_by: Some(CountingBy::UniqueUsers),
            ..Default::default()
        },
        explanation,
    }
}

pub fn segmentation_template() -> FallbackTemplate {
    let explanation = format!(
        "Built a behavioral segmentation over {} events: {}. The reasoning service was unavailable, so I used the standard segmentation template.",
        SEGMENTATION_EVENTS.len(),
        SEGMENTATION_EVENTS.join(", ")
    );

    FallbackTemplate {
        config_updates: ConfigUpdates {
            analysis_type: Some(AnalysisType::Segmentation),
            segment_mode: Some(SegmentMode::Behavioral),
            segment_events: Some(SEGMENTATION_EVENTS.iter().map(|e| e.to_string()).collect()),
            ..Default::default()
        },
        explanation,
    }
}
