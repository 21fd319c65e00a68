//! Analysis configuration model.
//!
//! A [`ViewConfig`] describes the chart that is currently active in a
//! session. It is produced by the build pipeline from a set of
//! [`ConfigUpdates`] returned by the reasoning collaborator and is read-only
//! everywhere else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default conversion window for funnels, in days.
pub const DEFAULT_COMPLETED_WITHIN_DAYS: u32 = 30;

/// Kind of analysis a view renders
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    #[default]
    Funnel,
    Segmentation,
    Retention,
    Paths,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Funnel => "funnel",
            Self::Segmentation => "segmentation",
            Self::Retention => "retention",
            Self::Paths => "paths",
        }
    }
}

/// Dashboard layout used by the rendering layer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LayoutTemplate {
    #[default]
    SingleChart,
    ComparisonGrid,
    ExecutiveSummaryDashboard,
}

/// How a funnel is visualized
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum FunnelViewType {
    #[default]
    Conversion,
    OverTime,
    TimeToConvert,
    Frequency,
    Improvement,
    Significance,
}

/// Unit a funnel counts by
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CountingBy {
    #[default]
    UniqueUsers,
    Sessions,
    Events,
}

/// Whether funnel steps must happen in sequence
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepOrder {
    #[default]
    Strict,
    Any,
}

/// A single funnel step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderedStep {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub event_type: String,
    #[serde(default)]
    pub event_category: String,
}

impl OrderedStep {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        event_type: impl Into<String>,
        event_category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            event_type: event_type.into(),
            event_category: event_category.into(),
        }
    }
}

/// A property filter applied to a segment or the whole funnel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Filter {
    pub property: String,
    #[serde(default = "default_operator")]
    pub operator: String,
    pub value: serde_json::Value,
}

fn default_operator() -> String {
    "equals".to_string()
}

impl Filter {
    pub fn equals(property: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            property: property.into(),
            operator: default_operator(),
            value: value.into(),
        }
    }
}

/// A named segment compared side by side in a funnel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentComparison {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub filters: Vec<Filter>,
}

/// Ordered steps plus measurement settings describing a conversion funnel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunnelDefinition {
    pub steps: Vec<OrderedStep>,
    #[serde(default)]
    pub view_type: FunnelViewType,
    /// Conversion window in days
    #[serde(default = "default_completed_within")]
    pub completed_within: u32,
    #[serde(default)]
    pub counting_by: CountingBy,
    #[serde(default)]
    pub order: StepOrder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    #[serde(default)]
    pub segments: Vec<SegmentComparison>,
    #[serde(default)]
    pub global_filters: Vec<Filter>,
}

fn default_completed_within() -> u32 {
    DEFAULT_COMPLETED_WITHIN_DAYS
}

impl Default for FunnelDefinition {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            view_type: FunnelViewType::default(),
            completed_within: DEFAULT_COMPLETED_WITHIN_DAYS,
            counting_by: CountingBy::default(),
            order: StepOrder::default(),
            group_by: None,
            segments: Vec::new(),
            global_filters: Vec::new(),
        }
    }
}

impl FunnelDefinition {
    /// The step in the middle of the funnel, if there is one.
    pub fn middle_step(&self) -> Option<&OrderedStep> {
        self.steps.get(self.steps.len() / 2)
    }
}

/// How users are bucketed in a segmentation view
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SegmentMode {
    #[default]
    Behavioral,
    Guest,
    Event,
    #[serde(other)]
    Other,
}

/// Settings for a segmentation analysis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SegmentationState {
    #[serde(default)]
    pub mode: SegmentMode,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
}

/// Explanation attached to a view by the reasoning collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiReasoning {
    pub observation: String,
    #[serde(default)]
    pub prediction: String,
    /// 0-100
    pub action_score: f64,
}

/// The structured description of the analysis active in a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewConfig {
    pub id: String,
    pub analysis_type: AnalysisType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funnel_definition: Option<FunnelDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmentation_state: Option<SegmentationState>,
    #[serde(default)]
    pub layout_template: LayoutTemplate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_reasoning: Option<AiReasoning>,
    pub created_at: DateTime<Utc>,
}

impl ViewConfig {
    /// Create an empty view of the given type
    pub fn new(analysis_type: AnalysisType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            analysis_type,
            measurement: None,
            funnel_definition: None,
            segmentation_state: None,
            layout_template: LayoutTemplate::default(),
            ai_reasoning: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_funnel(&self) -> bool {
        self.analysis_type == AnalysisType::Funnel
    }

    pub fn is_segmentation(&self) -> bool {
        self.analysis_type == AnalysisType::Segmentation
    }

    /// Apply a patch in place. Only fields present in the patch change.
    pub fn apply_patch(&mut self, patch: &ViewPatch) {
        if let Some(layout) = patch.layout_template {
            self.layout_template = layout;
        }
        if let Some(ref reasoning) = patch.ai_reasoning {
            self.ai_reasoning = Some(reasoning.clone());
        }
        if let Some(ref measurement) = patch.measurement {
            self.measurement = Some(measurement.clone());
        }
    }
}

/// Optional patch merged into a view when it is committed to a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ViewPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_template: Option<LayoutTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_reasoning: Option<AiReasoning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement: Option<String>,
}

/// Partial configuration returned by the reasoning collaborator.
///
/// Every field is optional; unset fields fall back to defaults (new view) or
/// to the existing view (mutation mode).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ConfigUpdates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_type: Option<AnalysisType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funnel_steps: Option<Vec<OrderedStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funnel_view_type: Option<FunnelViewType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funnel_completed_within: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funnel_counting_by: Option<CountingBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funnel_group_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funnel_segments: Option<Vec<SegmentComparison>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funnel_global_filters: Option<Vec<Filter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funnel_order: Option<StepOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_mode: Option<SegmentMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_events: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_group_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_template: Option<LayoutTemplate>,
}

impl ConfigUpdates {
    /// Number of funnel steps carried by the update.
    pub fn step_count(&self) -> usize {
        self.funnel_steps.as_ref().map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_funnel_defaults() {
        let funnel = FunnelDefinition::default();
        assert_eq!(funnel.completed_within, 30);
        assert_eq!(funnel.counting_by, CountingBy::UniqueUsers);
        assert_eq!(funnel.order, StepOrder::Strict);
        assert!(funnel.middle_step().is_none());
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_value(LayoutTemplate::ExecutiveSummaryDashboard).unwrap();
        assert_eq!(json, "EXECUTIVE_SUMMARY_DASHBOARD");

        let json = serde_json::to_value(FunnelViewType::TimeToConvert).unwrap();
        assert_eq!(json, "timeToConvert");

        let json = serde_json::to_value(CountingBy::UniqueUsers).unwrap();
        assert_eq!(json, "unique_users");
    }

    #[test]
    fn test_config_updates_parse_partial() {
        let updates: ConfigUpdates = serde_json::from_str(
            r#"{
                "analysis_type": "funnel",
                "funnel_steps": [
                    {"id": "1", "label": "Landed", "event_type": "Landed", "event_category": "hospitality"},
                    {"id": "2", "event_type": "payment"}
                ],
                "funnel_group_by": "device_type"
            }"#,
        )
        .unwrap();

        assert_eq!(updates.analysis_type, Some(AnalysisType::Funnel));
        assert_eq!(updates.step_count(), 2);
        assert_eq!(updates.funnel_steps.as_ref().unwrap()[1].label, "");
        assert!(updates.funnel_completed_within.is_none());
    }

    #[test]
    fn test_unknown_segment_mode() {
        let state: SegmentationState =
            serde_json::from_str(r#"{"mode": "cohort", "events": ["Landed"]}"#).unwrap();
        assert_eq!(state.mode, SegmentMode::Other);
    }

    #[test]
    fn test_apply_patch() {
        let mut view = ViewConfig::new(AnalysisType::Funnel);
        view.apply_patch(&ViewPatch {
            layout_template: Some(LayoutTemplate::ComparisonGrid),
            ..Default::default()
        });
        assert_eq!(view.layout_template, LayoutTemplate::ComparisonGrid);
        assert!(view.ai_reasoning.is_none());
    }
}
