//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::RetryBackoff;
use crate::error::ConfigError;

/// Agent configuration. Read-only once handed to a runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent identifier, also the state store key.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Maximum number of tasks executing at once.
    pub max_concurrent_tasks: usize,
    /// Default retry ceiling for tasks that don't set their own.
    pub retry_attempts: u32,
    /// Per-task wall-clock budget in milliseconds.
    pub timeout_ms: u64,
    /// Delay policy between a failed attempt and its re-enqueue.
    #[serde(default)]
    pub retry_backoff: RetryBackoff,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: "agent-runner".to_string(),
            max_concurrent_tasks: 2,
            retry_attempts: 3,
            timeout_ms: 30_000,
            retry_backoff: RetryBackoff::Immediate,
            metadata: serde_json::Map::new(),
        }
    }
}

impl AgentConfig {
    /// Create a config with a fresh id and default limits.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: RetryBackoff) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reject configurations the runner cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(invalid("id", "must not be empty"));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(invalid("max_concurrent_tasks", "must be greater than 0"));
        }
        if self.max_concurrent_tasks > u32::MAX as usize {
            return Err(invalid("max_concurrent_tasks", "is too large"));
        }
        if self.timeout_ms == 0 {
            return Err(invalid("timeout_ms", "must be greater than 0"));
        }
        Ok(())
    }

    /// Load from `AGENT_RUNNER_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (environment, test map, ...).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(id) = lookup("AGENT_RUNNER_ID") {
            config.id = id;
        }
        if let Some(name) = lookup("AGENT_RUNNER_NAME") {
            config.name = name;
        }
        if let Some(max) = parse_var(&lookup, "AGENT_RUNNER_MAX_CONCURRENT")? {
            config.max_concurrent_tasks = max;
        }
        if let Some(retries) = parse_var(&lookup, "AGENT_RUNNER_RETRY_ATTEMPTS")? {
            config.retry_attempts = retries;
        }
        if let Some(timeout) = parse_var(&lookup, "AGENT_RUNNER_TIMEOUT_MS")? {
            config.timeout_ms = timeout;
        }

        let base_ms: Option<u64> = parse_var(&lookup, "AGENT_RUNNER_BACKOFF_BASE_MS")?;
        let max_ms: Option<u64> = parse_var(&lookup, "AGENT_RUNNER_BACKOFF_MAX_MS")?;
        config.retry_backoff = match base_ms {
            Some(base_ms) if base_ms > 0 => RetryBackoff::Exponential {
                base_ms,
                max_ms: max_ms.unwrap_or(base_ms.saturating_mul(32)),
                jitter: true,
            },
            _ => RetryBackoff::Immediate,
        };

        config.validate()?;
        Ok(config)
    }
}

/// Process-level settings for the `agent-runner` binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    /// libSQL database file. In-memory backends when unset.
    pub db_path: Option<PathBuf>,
    /// Directory for rolling log files. Logs go to stderr when unset.
    pub log_dir: Option<PathBuf>,
    /// How long to wait for the queue to drain before stopping.
    pub idle_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let agent = AgentConfig::from_lookup(&lookup)?;
        let idle_secs: u64 = parse_var(&lookup, "AGENT_RUNNER_IDLE_TIMEOUT_SECS")?.unwrap_or(300);

        Ok(Self {
            agent,
            db_path: lookup("AGENT_RUNNER_DB_PATH").map(PathBuf::from),
            log_dir: lookup("AGENT_RUNNER_LOG_DIR").map(PathBuf::from),
            idle_timeout: Duration::from_secs(idle_secs),
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| invalid(key, &format!("{raw:?}: {e}"))),
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry_backoff, RetryBackoff::Immediate);
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let config = AgentConfig::new("x").with_max_concurrent_tasks(0);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "max_concurrent_tasks"));
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = AgentConfig::new("x").with_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_lookup_reads_overrides() {
        let config = AgentConfig::from_lookup(lookup_from(&[
            ("AGENT_RUNNER_ID", "growth-bot"),
            ("AGENT_RUNNER_NAME", "Growth Bot"),
            ("AGENT_RUNNER_MAX_CONCURRENT", "4"),
            ("AGENT_RUNNER_RETRY_ATTEMPTS", "1"),
            ("AGENT_RUNNER_TIMEOUT_MS", "5000"),
        ]))
        .unwrap();

        assert_eq!(config.id, "growth-bot");
        assert_eq!(config.name, "Growth Bot");
        assert_eq!(config.max_concurrent_tasks, 4);
        assert_eq!(config.retry_attempts, 1);
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.retry_backoff, RetryBackoff::Immediate);
    }

    #[test]
    fn from_lookup_enables_backoff() {
        let config = AgentConfig::from_lookup(lookup_from(&[
            ("AGENT_RUNNER_BACKOFF_BASE_MS", "100"),
            ("AGENT_RUNNER_BACKOFF_MAX_MS", "800"),
        ]))
        .unwrap();
        assert_eq!(
            config.retry_backoff,
            RetryBackoff::Exponential {
                base_ms: 100,
                max_ms: 800,
                jitter: true
            }
        );
    }

    #[test]
    fn from_lookup_rejects_garbage() {
        let err = AgentConfig::from_lookup(lookup_from(&[("AGENT_RUNNER_MAX_CONCURRENT", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("AGENT_RUNNER_MAX_CONCURRENT"));
    }

    #[test]
    fn app_config_paths() {
        let app = AppConfig::from_lookup(lookup_from(&[
            ("AGENT_RUNNER_DB_PATH", "/tmp/agent.db"),
            ("AGENT_RUNNER_IDLE_TIMEOUT_SECS", "9"),
        ]))
        .unwrap();
        assert_eq!(app.db_path, Some(PathBuf::from("/tmp/agent.db")));
        assert!(app.log_dir.is_none());
        assert_eq!(app.idle_timeout, Duration::from_secs(9));
    }
}
