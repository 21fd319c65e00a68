//! Orchestrator configuration.
//!
//! Thresholds are named and overridable. Values come from
//! [`OrchestratorConfig::default`], environment variables
//! ([`OrchestratorConfig::from_env`]) or a TOML file
//! ([`OrchestratorConfig::from_toml_file`]).

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{DEFAULT_CURRENCY, DEFAULT_TIMEZONE};

/// Tunables for the build pipeline, insight agent and session summaries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Build results at or above this confidence are applied without confirmation
    pub auto_apply_threshold: f64,
    /// Confidence assigned to the local build template
    pub build_fallback_confidence: f64,
    /// Upper bound on a reasoning call
    pub reasoning_timeout_secs: u64,
    /// Insights below this confidence are discarded
    pub insight_min_confidence: f64,
    /// Relaxed floor for single-metric (`kpi`) charts
    pub kpi_min_confidence: f64,
    /// Coalescing window for automatic insight generation
    pub insight_debounce_ms: u64,
    /// Upper bound on an insight analysis call
    pub insight_timeout_secs: u64,
    /// Maximum insights kept per analysis
    pub max_insights: usize,
    /// Audience the insight collaborator writes for
    pub persona: String,
    /// Confidence of a synthesized kpi trend after an empty response
    pub kpi_fallback_confidence: f64,
    /// Confidence of a synthesized kpi trend after a failed call
    pub kpi_error_fallback_confidence: f64,
    /// Minimum messages before a conversation is summarized
    pub summary_min_messages: usize,
    /// Number of trailing messages sent for summarization
    pub summary_window: usize,
    /// Summarize automatically every this many messages (0 disables)
    pub summary_interval: usize,
    pub default_timezone: String,
    pub default_currency: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            auto_apply_threshold: 90.0,
            build_fallback_confidence: 90.0,
            reasoning_timeout_secs: 30,
            insight_min_confidence: 70.0,
            kpi_min_confidence: 50.0,
            insight_debounce_ms: 500,
            insight_timeout_secs: 10,
            max_insights: 3,
            persona: "analyst".to_string(),
            kpi_fallback_confidence: 70.0,
            kpi_error_fallback_confidence: 65.0,
            summary_min_messages: 5,
            summary_window: 20,
            summary_interval: 10,
            default_timezone: DEFAULT_TIMEZONE.to_string(),
            default_currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Load from environment variables, starting from the defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(value) = env_parse("AUGUR_AUTO_APPLY_THRESHOLD") {
            config.auto_apply_threshold = value;
        }
        if let Some(value) = env_parse("AUGUR_INSIGHT_MIN_CONFIDENCE") {
            config.insight_min_confidence = value;
        }
        if let Some(value) = env_parse("AUGUR_KPI_MIN_CONFIDENCE") {
            config.kpi_min_confidence = value;
        }
        if let Some(value) = env_parse("AUGUR_INSIGHT_DEBOUNCE_MS") {
            config.insight_debounce_ms = value;
        }
        if let Some(value) = env_parse("AUGUR_INSIGHT_TIMEOUT_SECS") {
            config.insight_timeout_secs = value;
        }
        if let Some(value) = env_parse("AUGUR_REASONING_TIMEOUT_SECS") {
            config.reasoning_timeout_secs = value;
        }
        if let Some(value) = env_parse("AUGUR_MAX_INSIGHTS") {
            config.max_insights = value;
        }
        if let Ok(persona) = std::env::var("AUGUR_PERSONA") {
            if !persona.is_empty() {
                config.persona = persona;
            }
        }
        if let Ok(timezone) = std::env::var("AUGUR_DEFAULT_TIMEZONE") {
            if !timezone.is_empty() {
                config.default_timezone = timezone;
            }
        }
        if let Ok(currency) = std::env::var("AUGUR_DEFAULT_CURRENCY") {
            if !currency.is_empty() {
                config.default_currency = currency.to_uppercase();
            }
        }

        config
    }

    /// Load from a TOML file. Missing keys keep their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject thresholds outside `[0, 100]` and empty windows
    pub fn validate(&self) -> CoreResult<()> {
        let scores = [
            ("auto_apply_threshold", self.auto_apply_threshold),
            ("build_fallback_confidence", self.build_fallback_confidence),
            ("insight_min_confidence", self.insight_min_confidence),
            ("kpi_min_confidence", self.kpi_min_confidence),
            ("kpi_fallback_confidence", self.kpi_fallback_confidence),
            ("kpi_error_fallback_confidence", self.kpi_error_fallback_confidence),
        ];
        for (name, value) in scores {
            if !(0.0..=100.0).contains(&value) {
                return Err(CoreError::Config(format!(
                    "{} must be within 0-100, got {}",
                    name, value
                )));
            }
        }
        if self.max_insights == 0 {
            return Err(CoreError::Config("max_insights must be at least 1".to_string()));
        }
        if self.summary_window == 0 {
            return Err(CoreError::Config("summary_window must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn insight_debounce(&self) -> Duration {
        Duration::from_millis(self.insight_debounce_ms)
    }

    pub fn insight_timeout(&self) -> Duration {
        Duration::from_secs(self.insight_timeout_secs)
    }

    pub fn reasoning_timeout(&self) -> Duration {
        Duration::from_secs(self.reasoning_timeout_secs)
    }

    /// Confidence floor for a chart type
    pub fn insight_floor(&self, chart_type: &str) -> f64 {
        if chart_type.eq_ignore_ascii_case("kpi") {
            self.kpi_min_confidence
        } else {
            self.insight_min_confidence
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.auto_apply_threshold, 90.0);
        assert_eq!(config.insight_floor("bar"), 70.0);
        assert_eq!(config.insight_floor("KPI"), 50.0);
        assert_eq!(config.insight_debounce(), Duration::from_millis(500));
        assert_eq!(config.insight_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("AUGUR_AUTO_APPLY_THRESHOLD", "80");
        std::env::set_var("AUGUR_DEFAULT_CURRENCY", "eur");
        std::env::set_var("AUGUR_MAX_INSIGHTS", "not-a-number");

        let config = OrchestratorConfig::from_env();
        assert_eq!(config.auto_apply_threshold, 80.0);
        assert_eq!(config.default_currency, "EUR");
        assert_eq!(config.max_insights, 3);

        std::env::remove_var("AUGUR_AUTO_APPLY_THRESHOLD");
        std::env::remove_var("AUGUR_DEFAULT_CURRENCY");
        std::env::remove_var("AUGUR_MAX_INSIGHTS");
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "auto_apply_threshold = 95.0").unwrap();
        writeln!(file, "persona = \"executive\"").unwrap();

        let config = OrchestratorConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.auto_apply_threshold, 95.0);
        assert_eq!(config.persona, "executive");
        assert_eq!(config.kpi_min_confidence, 50.0);
    }

    #[test]
    fn test_from_toml_file_rejects_out_of_range() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "insight_min_confidence = 120.0").unwrap();

        let err = OrchestratorConfig::from_toml_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("insight_min_confidence"));
    }

    #[test]
    fn test_missing_file() {
        let err = OrchestratorConfig::from_toml_file("/nonexistent/augur.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
