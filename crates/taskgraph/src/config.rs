//! Configuration management for taskgraph.
//!
//! The engine reads a single YAML document. Every section and field has a
//! default, so an empty file (or no file at all) yields a working setup:
//!
//! ```yaml
//! cache:
//!   ttl-secs: 300
//!   cleanup-interval-secs: 60
//! risk:
//!   affected-weight: 0.1
//!   high-priority-weight: 0.15
//!   critical-priority-weight: 0.25
//!   confidence-weight: 0.2
//!   medium-threshold: 0.3
//!   high-threshold: 0.6
//!   clamp-policy: per-step
//! automation:
//!   high-confidence-threshold: 0.8
//!   medium-confidence-threshold: 0.5
//!   require-human-approval-for-critical: true
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Result cache settings
    pub cache: CacheConfig,

    /// Risk-tier scoring settings
    pub risk: RiskConfig,

    /// Auto-completion thresholds
    pub automation: AutoCompletionConfig,
}

impl EngineConfig {
    /// Load configuration from a YAML file and validate it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read, and `Error::Config` if
    /// it does not parse or fails [`validate`](Self::validate).
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let config = Self::from_yaml(&content)?;
        tracing::debug!(path = %path.display(), "Loaded engine config");
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` on malformed YAML or invalid values.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| Error::Config(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that thresholds and weights are usable.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.cache.ttl_secs == 0 {
            return Err(Error::Config("cache.ttl-secs must be positive".into()));
        }
        if self.cache.cleanup_interval_secs == 0 {
            return Err(Error::Config(
                "cache.cleanup-interval-secs must be positive".into(),
            ));
        }

        let risk = &self.risk;
        for (name, value) in [
            ("risk.affected-weight", risk.affected_weight),
            ("risk.high-priority-weight", risk.high_priority_weight),
            ("risk.critical-priority-weight", risk.critical_priority_weight),
            ("risk.confidence-weight", risk.confidence_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        check_unit("risk.medium-threshold", risk.medium_threshold)?;
        check_unit("risk.high-threshold", risk.high_threshold)?;
        if risk.medium_threshold > risk.high_threshold {
            return Err(Error::Config(
                "risk.medium-threshold must not exceed risk.high-threshold".into(),
            ));
        }

        let auto = &self.automation;
        check_unit(
            "automation.medium-confidence-threshold",
            auto.medium_confidence_threshold,
        )?;
        check_unit(
            "automation.high-confidence-threshold",
            auto.high_confidence_threshold,
        )?;
        if auto.medium_confidence_threshold > auto.high_confidence_threshold {
            return Err(Error::Config(
                "automation.medium-confidence-threshold must not exceed the high threshold"
                    .into(),
            ));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::Config(format!("{name} must be within [0, 1], got {value}")))
    }
}

/// Result cache configuration section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CacheConfig {
    /// Lifetime of a cached analysis, in seconds
    pub ttl_secs: u64,

    /// How often the background cleanup purges expired entries, in seconds
    pub cleanup_interval_secs: u64,
}

impl CacheConfig {
    /// Entry lifetime as a `Duration`.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Cleanup period as a `Duration`.
    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            cleanup_interval_secs: 60,
        }
    }
}

/// When a running score is clamped to `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClampPolicy {
    /// Clamp after every increment
    #[default]
    PerStep,

    /// Sum everything, clamp once
    AtEnd,
}

/// Weights and thresholds for impact risk tiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RiskConfig {
    /// Score added per affected task
    pub affected_weight: f64,

    /// Extra score per high-priority affected task
    pub high_priority_weight: f64,

    /// Extra score per critical affected task
    pub critical_priority_weight: f64,

    /// Scale of the subject-confidence adjustment
    pub confidence_weight: f64,

    /// Minimum score for the medium tier
    pub medium_threshold: f64,

    /// Minimum score for the high tier
    pub high_threshold: f64,

    /// Clamping order for the accumulated score
    pub clamp_policy: ClampPolicy,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            affected_weight: 0.1,
            high_priority_weight: 0.15,
            critical_priority_weight: 0.25,
            confidence_weight: 0.2,
            medium_threshold: 0.3,
            high_threshold: 0.6,
            clamp_policy: ClampPolicy::PerStep,
        }
    }
}

/// Confidence thresholds for automatic task completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AutoCompletionConfig {
    /// At or above: complete the task
    pub high_confidence_threshold: f64,

    /// At or above (and below high): mark it in progress
    pub medium_confidence_threshold: f64,

    /// Critical tasks need a human even at high confidence
    pub require_human_approval_for_critical: bool,
}

impl Default for AutoCompletionConfig {
    fn default() -> Self {
        Self {
            high_confidence_threshold: 0.8,
            medium_confidence_threshold: 0.5,
            require_human_approval_for_critical: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::tempdir;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = EngineConfig::from_yaml("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.cache.ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_document_keeps_other_defaults() {
        let yaml = "cache:\n  ttl-secs: 30\nrisk:\n  clamp-policy: at-end\n";
        let config = EngineConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.cache.ttl_secs, 30);
        assert_eq!(config.cache.cleanup_interval_secs, 60);
        assert_eq!(config.risk.clamp_policy, ClampPolicy::AtEnd);
        assert!((config.risk.high_threshold - 0.6).abs() < f64::EPSILON);
    }

    #[rstest]
    #[case::zero_ttl("cache:\n  ttl-secs: 0\n", "ttl-secs")]
    #[case::threshold_order(
        "risk:\n  medium-threshold: 0.9\n  high-threshold: 0.5\n",
        "must not exceed"
    )]
    #[case::threshold_range("risk:\n  high-threshold: 1.5\n", "within [0, 1]")]
    #[case::negative_weight("risk:\n  affected-weight: -1\n", "non-negative")]
    #[case::automation_order(
        "automation:\n  high-confidence-threshold: 0.4\n",
        "must not exceed"
    )]
    #[case::malformed("cache: [1, 2", "")]
    fn test_invalid_config_rejected(#[case] yaml: &str, #[case] expected: &str) {
        let err = EngineConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains(expected), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("taskgraph.yaml");
        tokio::fs::write(&path, "automation:\n  require-human-approval-for-critical: false\n")
            .await
            .unwrap();

        let config = EngineConfig::load(&path).await.unwrap();
        assert!(!config.automation.require_human_approval_for_critical);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = EngineConfig::load(&dir.path().join("absent.yaml"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
