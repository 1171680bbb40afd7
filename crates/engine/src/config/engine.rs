//! Engine runtime configuration.

use serde::Deserialize;
use std::time::Duration;

const ENV_PREFIX: &str = "DOCFLOW_";

/// Engine configuration loaded from environment variables.
///
/// Environment variables are prefixed with `DOCFLOW_`:
/// - `DOCFLOW_EXECUTION_TIMEOUT_SECS`: Overall execution deadline (default: 300)
/// - `DOCFLOW_POLL_INTERVAL_SECS`: Delay between job status checks (default: 30)
/// - `DOCFLOW_MAX_POLLS`: Status checks allowed per job (default: 40)
/// - `DOCFLOW_DEFAULT_MAX_CONCURRENCY`: Map concurrency when a state sets none (default: 5)
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Overall execution deadline in seconds
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,

    /// Delay between job status checks in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Status checks allowed per job
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,

    /// Map concurrency when a state sets none
    #[serde(default = "default_max_concurrency")]
    pub default_max_concurrency: usize,
}

fn default_execution_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_max_polls() -> u32 {
    40
}

fn default_max_concurrency() -> usize {
    5
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed(ENV_PREFIX).from_env::<EngineConfig>()
    }

    /// Load configuration from an explicit list of variables.
    pub fn from_vars<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX).from_iter(vars)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            execution_timeout_secs: default_execution_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            max_polls: default_max_polls(),
            default_max_concurrency: default_max_concurrency(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.execution_timeout(), Duration::from_secs(300));
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.max_polls, 40);
        assert_eq!(config.default_max_concurrency, 5);
    }

    #[test]
    fn test_from_vars() {
        let config = EngineConfig::from_vars(vec![
            ("DOCFLOW_EXECUTION_TIMEOUT_SECS".to_string(), "60".to_string()),
            ("DOCFLOW_MAX_POLLS".to_string(), "3".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ])
        .unwrap();

        assert_eq!(config.execution_timeout_secs, 60);
        assert_eq!(config.max_polls, 3);
        assert_eq!(config.poll_interval_secs, 30);
    }

    #[test]
    fn test_from_vars_rejects_garbage() {
        let result = EngineConfig::from_vars(vec![(
            "DOCFLOW_POLL_INTERVAL_SECS".to_string(),
            "soon".to_string(),
        )]);
        assert!(result.is_err());
    }
}
