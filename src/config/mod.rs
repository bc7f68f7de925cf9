//! Configuration management for the dispatch router

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::{Domain, RouterError};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub router: RouterConfig,
    pub retry: RetryConfig,
    pub pipeline: PipelineConfig,
    pub audit: AuditConfig,
}

/// How raw handler confidence is mapped into [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalMapping {
    /// Clip into [0, 1]
    #[default]
    Clamp,
    /// Treat the signal as a percentage
    Percent,
    /// Logistic curve around `logistic_midpoint`
    Logistic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RouterConfig {
    /// Minimum normalized confidence for a result to be accepted
    pub accept_threshold: f64,
    /// Attempt budget per task (default: number of resolved candidates)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<usize>,
    /// Timeout for a single handler invocation
    pub invocation_timeout_ms: u64,
    pub signal_mapping: SignalMapping,
    pub logistic_midpoint: f64,
    pub logistic_steepness: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 0.6,
            max_attempts: None,
            invocation_timeout_ms: 30_000,
            signal_mapping: SignalMapping::Clamp,
            logistic_midpoint: 0.5,
            logistic_steepness: 10.0,
        }
    }
}

impl RouterConfig {
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation_timeout_ms)
    }
}

/// Backoff applied between fallback attempts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_delay_ms: 250,
            max_delay_ms: 5_000,
            exponential_base: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before the fallback following attempt number `attempt` (0-based)
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        let factor = self.exponential_base.powi(attempt.min(i32::MAX as usize) as i32);
        let delay_ms = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Stage the Director falls back to when no execution agent is confident
    pub fallback_stage: Domain,
    /// Minimum intent score for the Director to pick an execution agent
    pub intent_threshold: f64,
    /// Maximum number of stages a pipeline run may visit
    pub max_stages: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fallback_stage: Domain::Planner,
            intent_threshold: 0.25,
            max_stages: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub max_file_size: u64,
    pub max_rotated_files: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from(".innovator/dispatch"),
            max_file_size: 10 * 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "innovator") {
            let config_dir = proj_dirs.config_dir();
            std::fs::create_dir_all(config_dir)?;
            Ok(config_dir.join("config.toml"))
        } else {
            Ok(PathBuf::from("config.toml"))
        }
    }

    /// Reject values the router cannot work with
    pub fn validate(&self) -> Result<(), RouterError> {
        let router = &self.router;
        if !(0.0..=1.0).contains(&router.accept_threshold) {
            return Err(RouterError::InvalidConfig(format!(
                "accept_threshold must be within [0, 1], got {}",
                router.accept_threshold
            )));
        }
        if router.invocation_timeout_ms == 0 {
            return Err(RouterError::InvalidConfig(
                "invocation_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if router.max_attempts == Some(0) {
            return Err(RouterError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if !router.logistic_steepness.is_finite() || router.logistic_steepness <= 0.0 {
            return Err(RouterError::InvalidConfig(
                "logistic_steepness must be a positive number".to_string(),
            ));
        }
        if self.retry.exponential_base <= 0.0 {
            return Err(RouterError::InvalidConfig(
                "exponential_base must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.pipeline.intent_threshold) {
            return Err(RouterError::InvalidConfig(format!(
                "intent_threshold must be within [0, 1], got {}",
                self.pipeline.intent_threshold
            )));
        }
        if self.pipeline.max_stages == 0 {
            return Err(RouterError::InvalidConfig(
                "max_stages must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.router.accept_threshold, 0.6);
        assert_eq!(config.router.max_attempts, None);
        assert_eq!(config.router.invocation_timeout(), Duration::from_secs(30));
        assert_eq!(config.pipeline.fallback_stage, Domain::Planner);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [router]
            accept_threshold = 0.4
            signal_mapping = "percent"
            "#,
        )
        .unwrap();
        assert_eq!(config.router.accept_threshold, 0.4);
        assert_eq!(config.router.signal_mapping, SignalMapping::Percent);
        assert_eq!(config.router.invocation_timeout_ms, 30_000);
        assert!(!config.retry.enabled);
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let mut config = Config::default();
        config.router.accept_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(RouterError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let mut config = Config::default();
        config.router.max_attempts = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "[router]\nmax_attempts = 2\n\n[pipeline]\nfallback_stage = \"director\"\n",
        )
        .unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.router.max_attempts, Some(2));
        assert_eq!(config.pipeline.fallback_stage, Domain::Director);
    }

    #[test]
    fn test_load_from_rejects_invalid_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[router]\ninvocation_timeout_ms = 0\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_retry_delay_is_exponential_and_capped() {
        let retry = RetryConfig {
            enabled: true,
            initial_delay_ms: 100,
            max_delay_ms: 350,
            exponential_base: 2.0,
        };
        assert_eq!(retry.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(retry.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(retry.calculate_delay(2), Duration::from_millis(350));
        assert_eq!(
            RetryConfig::default().calculate_delay(3),
            Duration::ZERO
        );
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
