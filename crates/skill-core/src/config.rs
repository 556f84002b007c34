//! Process configuration read from the environment.

use std::time::Duration;

use skill_state::Environment;
use tracing::Level;

use crate::datasource::graphql::DEFAULT_RETRY_BACKOFF;
use crate::datasource::GraphqlDataProvider;
use crate::telemetry::TracingConfig;

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone, PartialEq)]
pub struct SkillConfig {
    /// Listener port (`PORT`).
    pub port: u16,
    /// Selects the results bucket (`SKILL_ENVIRONMENT`).
    pub environment: Environment,
    /// Default log level (`SKILL_LOG_LEVEL`).
    pub log_level: Level,
    /// JSON log lines when `SKILL_LOG_FORMAT=json`.
    pub json_logs: bool,
    /// Pause before retrying a failed query (`SKILL_QUERY_RETRY_BACKOFF_MS`).
    pub query_retry_backoff: Duration,
}

impl Default for SkillConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            environment: Environment::default(),
            log_level: Level::INFO,
            json_logs: false,
            query_retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

impl SkillConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Unparseable values fall back
    /// to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            port: lookup("PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.port),
            environment: lookup("SKILL_ENVIRONMENT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.environment),
            log_level: lookup("SKILL_LOG_LEVEL")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.log_level),
            json_logs: lookup("SKILL_LOG_FORMAT")
                .map(|v| v.trim().eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.json_logs),
            query_retry_backoff: lookup("SKILL_QUERY_RETRY_BACKOFF_MS")
                .and_then(|v| v.trim().parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.query_retry_backoff),
        }
    }

    pub fn tracing(&self) -> TracingConfig {
        TracingConfig::new(self.json_logs, self.log_level)
    }

    /// Live query provider using the configured retry backoff.
    pub fn graphql_provider(&self) -> GraphqlDataProvider {
        GraphqlDataProvider::new(self.query_retry_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = SkillConfig::from_lookup(lookup(&[]));
        assert_eq!(config, SkillConfig::default());
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn reads_variables() {
        let config = SkillConfig::from_lookup(lookup(&[
            ("PORT", "9090"),
            ("SKILL_ENVIRONMENT", "production"),
            ("SKILL_LOG_LEVEL", "debug"),
            ("SKILL_LOG_FORMAT", "JSON"),
            ("SKILL_QUERY_RETRY_BACKOFF_MS", "250"),
        ]));
        assert_eq!(config.port, 9090);
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.log_level, Level::DEBUG);
        assert!(config.json_logs);
        assert_eq!(config.query_retry_backoff, Duration::from_millis(250));
        assert!(!config.tracing().ansi);
    }

    #[test]
    fn garbage_falls_back() {
        let config = SkillConfig::from_lookup(lookup(&[("PORT", "eighty"), ("SKILL_LOG_LEVEL", "loud")]));
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn graphql_provider_is_online_only() {
        use crate::datasource::DataSourceProvider;

        let provider = SkillConfig::default().graphql_provider();
        assert!(!provider.available_offline());
    }
}
