//! Coordinator configuration

use crate::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Playback coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Minimum spacing between two watch-progress sends (milliseconds)
    pub progress_interval_ms: u64,
    /// Retry policy for manifest resolution
    pub retry: RetryPolicy,
    /// Available bandwidth in kbps used for the initial quality pick
    pub bandwidth_hint_kbps: Option<u32>,
    /// Fraction of the duration after which progress counts as completed
    pub completion_threshold: f64,
    /// Player error kinds that end the session
    pub fatal_error_kinds: Vec<ErrorKind>,
    /// Request timeout for backend calls (milliseconds)
    pub request_timeout_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: 5_000,
            retry: RetryPolicy::default(),
            bandwidth_hint_kbps: None,
            completion_threshold: 0.95,
            fatal_error_kinds: vec![ErrorKind::Playback],
            request_timeout_ms: 10_000,
        }
    }
}

impl CoordinatorConfig {
    /// Load a JSON configuration file; missing fields keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the coordinator cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.progress_interval_ms == 0 {
            return Err(Error::InvalidConfig("progress_interval_ms must be positive".into()));
        }
        if !(self.completion_threshold > 0.0 && self.completion_threshold <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "completion_threshold must be in (0, 1], got {}",
                self.completion_threshold
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::InvalidConfig("retry.max_attempts must be at least 1".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig("request_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn is_fatal(&self, kind: ErrorKind) -> bool {
        self.fatal_error_kinds.contains(&kind)
    }
}

/// Bounded exponential backoff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt (milliseconds)
    pub base_delay_ms: u64,
    /// Upper bound for a single delay (milliseconds)
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Whether another attempt is allowed after `attempt` failures
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.progress_interval(), Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.is_fatal(ErrorKind::Playback));
        assert!(!config.is_fatal(ErrorKind::Subtitle));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_after(10), Duration::from_millis(8000));

        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: CoordinatorConfig =
            serde_json::from_str(r#"{ "progress_interval_ms": 2000, "fatal_error_kinds": ["playback", "connection"] }"#)
                .unwrap();
        assert_eq!(config.progress_interval_ms, 2000);
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.is_fatal(ErrorKind::Connection));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = CoordinatorConfig {
            completion_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = CoordinatorConfig {
            progress_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
