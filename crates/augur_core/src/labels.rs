//! Rule-based mapping from raw event names to business-friendly labels.

use serde::{Deserialize, Serialize};

/// How sure the mapping is
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LabelConfidence {
    High,
    Medium,
    Low,
}

/// Business label for a raw event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventLabel {
    pub business_label: String,
    pub category: String,
    pub confidence: LabelConfidence,
}

impl EventLabel {
    fn known(label: &str, category: &str) -> Self {
        Self {
            business_label: label.to_string(),
            category: category.to_string(),
            confidence: LabelConfidence::High,
        }
    }
}

// (event key, business label, category)
const KNOWN_EVENTS: &[(&str, &str, &str)] = &[
    ("page_view", "Page Viewed", "navigation"),
    ("click", "Click", "interaction"),
    ("form_submit", "Form Submitted", "engagement"),
    ("form_interaction", "Form Interaction", "engagement"),
    ("scroll", "Scroll", "engagement"),
    ("error", "Error", "error"),
    ("landed", "Landed", "navigation"),
    ("location_select", "Location Selected", "booking"),
    ("date_select", "Date Selected", "booking"),
    ("room_select", "Room Selected", "booking"),
    ("payment", "Payment", "booking"),
    ("confirmation", "Confirmation", "booking"),
];

/// Map a raw event name to a label.
///
/// Exact match first (spaces and dashes are treated as underscores), then a
/// partial match in either direction, then a title-cased fallback.
pub fn business_label(event_type: &str) -> EventLabel {
    let key = event_type.trim().to_lowercase().replace([' ', '-'], "_");

    if let Some((_, label, category)) = KNOWN_EVENTS.iter().find(|(k, _, _)| *k == key) {
        return EventLabel::known(label, category);
    }

    if !key.is_empty() {
        if let Some((_, label, category)) = KNOWN_EVENTS
            .iter()
            .find(|(k, _, _)| key.contains(k) || k.contains(key.as_str()))
        {
            return EventLabel {
                confidence: LabelConfidence::Medium,
                ..EventLabel::known(label, category)
            };
        }
    }

    EventLabel {
        business_label: title_case(event_type),
        category: "unknown".to_string(),
        confidence: LabelConfidence::Low,
    }
}

fn title_case(raw: &str) -> String {
    raw.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
