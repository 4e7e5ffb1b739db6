//! Match service configuration.
//!
//! Configuration is loaded from environment variables.

use crate::actors::DEFAULT_MAILBOX_CAPACITY;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8082";

/// Default outbound queue capacity per connected session.
pub const DEFAULT_SESSION_QUEUE_CAPACITY: usize = 256;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::InvalidValue(format!(
                "MATCH_LOG_FORMAT must be 'text' or 'json', got '{other}'"
            ))),
        }
    }
}

/// Match service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Label of this node; embedded in every authoritative match id.
    pub node: String,

    /// Health endpoint bind address (default: "0.0.0.0:8082").
    pub health_bind_address: String,

    /// Mailbox capacity of each match actor (default: 128).
    pub mailbox_capacity: usize,

    /// Outbound envelope queue per session (default: 256).
    pub session_queue_capacity: usize,

    /// Player cap for the built-in broadcast module; unlimited when unset.
    pub max_players: Option<usize>,

    pub log_format: LogFormat,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// See [`Config::from_vars`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `MATCH_NODE` is unset or empty,
    /// and `ConfigError::InvalidValue` for unparseable or zero capacities.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let node = vars
            .get("MATCH_NODE")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("MATCH_NODE".to_string()))?;

        let health_bind_address = vars
            .get("MATCH_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let mailbox_capacity = parse_capacity(vars, "MATCH_MAILBOX_CAPACITY")?
            .unwrap_or(DEFAULT_MAILBOX_CAPACITY);

        let session_queue_capacity = parse_capacity(vars, "MATCH_SESSION_QUEUE_CAPACITY")?
            .unwrap_or(DEFAULT_SESSION_QUEUE_CAPACITY);

        let max_players = parse_capacity(vars, "MATCH_MAX_PLAYERS")?;

        let log_format = vars
            .get("MATCH_LOG_FORMAT")
            .map(|s| s.parse())
            .transpose()?
            .unwrap_or_default();

        Ok(Config {
            node,
            health_bind_address,
            mailbox_capacity,
            session_queue_capacity,
            max_players,
            log_format,
        })
    }
}

/// Parse an optional positive integer.
fn parse_capacity(vars: &HashMap<String, String>, name: &str) -> Result<Option<usize>, ConfigError> {
    let Some(raw) = vars.get(name) else {
        return Ok(None);
    };
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(ConfigError::InvalidValue(format!(
            "{name} must be greater than 0"
        ))),
        Ok(value) => Ok(Some(value)),
        Err(e) => Err(ConfigError::InvalidValue(format!(
            "{name} must be a positive integer: {e}"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([("MATCH_NODE".to_string(), "node-a".to_string())])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.node, "node-a");
        assert_eq!(config.health_bind_address, DEFAULT_HEALTH_BIND_ADDRESS);
        assert_eq!(config.mailbox_capacity, DEFAULT_MAILBOX_CAPACITY);
        assert_eq!(config.session_queue_capacity, DEFAULT_SESSION_QUEUE_CAPACITY);
        assert_eq!(config.max_players, None);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_from_vars_custom_values() {
        let mut vars = base_vars();
        vars.insert(
            "MATCH_HEALTH_BIND_ADDRESS".to_string(),
            "127.0.0.1:9000".to_string(),
        );
        vars.insert("MATCH_MAILBOX_CAPACITY".to_string(), "32".to_string());
        vars.insert("MATCH_SESSION_QUEUE_CAPACITY".to_string(), "64".to_string());
        vars.insert("MATCH_MAX_PLAYERS".to_string(), "8".to_string());
        vars.insert("MATCH_LOG_FORMAT".to_string(), "JSON".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.health_bind_address, "127.0.0.1:9000");
        assert_eq!(config.mailbox_capacity, 32);
        assert_eq!(config.session_queue_capacity, 64);
        assert_eq!(config.max_players, Some(8));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_missing_node() {
        let result = Config::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(var)) if var == "MATCH_NODE"));
    }

    #[test]
    fn test_blank_node_is_missing() {
        let vars = HashMap::from([("MATCH_NODE".to_string(), "   ".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut vars = base_vars();
        vars.insert("MATCH_MAILBOX_CAPACITY".to_string(), "0".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(msg)) if msg.contains("MATCH_MAILBOX_CAPACITY")
        ));
    }

    #[test]
    fn test_unparseable_capacity_rejected() {
        let mut vars = base_vars();
        vars.insert("MATCH_SESSION_QUEUE_CAPACITY".to_string(), "lots".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        let mut vars = base_vars();
        vars.insert("MATCH_LOG_FORMAT".to_string(), "xml".to_string());
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }
}
