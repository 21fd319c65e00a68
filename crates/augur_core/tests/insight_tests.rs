//! Insight limits as seen from dependent crates.

use augur_core::{
    clamp_score, truncate_chars, MAX_EXPLANATION_CHARS, MAX_HEADLINE_CHARS, MAX_SUGGESTED_ACTIONS,
};

#[test]
fn test_limits_are_exported() {
    assert_eq!(MAX_HEADLINE_CHARS, 200);
    assert_eq!(MAX_EXPLANATION_CHARS, 500);
    assert_eq!(MAX_SUGGESTED_ACTIONS, 3);
}

#[test]
fn test_truncation_uses_exported_limits() {
    let headline = truncate_chars(&"é".repeat(250), MAX_HEADLINE_CHARS);
    assert_eq!(headline.chars().count(), MAX_HEADLINE_CHARS);
    assert_eq!(clamp_score(-5.0), 0.0);
}
