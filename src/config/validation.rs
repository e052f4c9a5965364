//! Field-level validation and value parsing shared by the config loader
//! and the CLI.

use std::net::IpAddr;
use std::sync::OnceLock;
use std::time::Duration;

use regex::{Captures, Regex};
use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// A field holds an unusable value.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

impl ConfigError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }
}

/// Parse a human-readable duration such as `30s`, `5m` or `1h30m`.
///
/// Used by `pulseboard watch --interval`.
///
/// ```
/// use pulseboard::config::parse_duration;
///
/// assert_eq!(parse_duration("15s").unwrap().as_secs(), 15);
/// assert_eq!(parse_duration("5m").unwrap().as_secs(), 300);
/// assert_eq!(parse_duration(" 250ms ").unwrap().as_millis(), 250);
/// assert!(parse_duration("soon").is_err());
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    match s.trim() {
        "" => Err("duration string is empty".to_string()),
        s => humantime::parse_duration(s).map_err(|e| format!("invalid duration '{s}': {e}")),
    }
}

/// Replace `${VAR}` and `${VAR:-default}` references with environment
/// values. Unset variables without a default become empty.
pub fn expand_env_vars(input: &str) -> String {
    static ENV_REF: OnceLock<Regex> = OnceLock::new();

    let re = ENV_REF.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("failed to compile env var regex")
    });

    re.replace_all(input, |caps: &Captures| {
        std::env::var(&caps[1])
            .unwrap_or_else(|_| caps.get(2).map_or_else(String::new, |m| m.as_str().to_string()))
    })
    .into_owned()
}

/// The bind address must be a literal IP.
pub(crate) fn check_bind(bind: &str) -> Result<(), ConfigError> {
    bind.parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| ConfigError::invalid(format!("invalid server bind address: '{bind}'")))
}

/// Only SQLite URLs are supported.
pub(crate) fn check_sqlite_url(url: &str) -> Result<(), ConfigError> {
    if url.starts_with("sqlite:") {
        Ok(())
    } else {
        Err(ConfigError::invalid(format!(
            "database url must start with 'sqlite:', got '{url}'"
        )))
    }
}

pub(crate) fn check_positive(field: &str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(format!("{field} must be positive")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2h 30m").unwrap(), Duration::from_secs(9000));
        assert_eq!(parse_duration("100ms").unwrap(), Duration::from_millis(100));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("30x").unwrap_err().contains("30x"));
    }

    #[test]
    fn test_check_bind() {
        assert!(check_bind("0.0.0.0").is_ok());
        assert!(check_bind("::1").is_ok());
        assert!(check_bind("localhost").is_err());
    }

    #[test]
    fn test_check_sqlite_url() {
        assert!(check_sqlite_url("sqlite::memory:").is_ok());
        assert!(check_sqlite_url("sqlite:data/pb.db?mode=rwc").is_ok());
        let err = check_sqlite_url("postgres://localhost/pb").unwrap_err();
        assert!(err.to_string().contains("postgres://"));
    }

    #[test]
    fn test_check_positive() {
        assert!(check_positive("max_points", 1).is_ok());
        assert!(
            check_positive("max_points", 0)
                .unwrap_err()
                .to_string()
                .contains("max_points must be positive")
        );
    }

    #[test]
    fn test_expand_env_vars_default_and_literal() {
        assert_eq!(expand_env_vars("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            expand_env_vars("sqlite:${PULSEBOARD_NONEXISTENT_DIR_12345:-data}/pb.db"),
            "sqlite:data/pb.db"
        );
        assert_eq!(expand_env_vars("${PULSEBOARD_NONEXISTENT_DIR_12345}/pb.db"), "/pb.db");
    }

    #[test]
    fn test_expand_env_vars_from_env() {
        // SAFETY: only this test touches this variable.
        unsafe {
            std::env::set_var("PULSEBOARD_TEST_DATA_DIR", "/var/lib/pulseboard");
        }
        let result = expand_env_vars("sqlite:${PULSEBOARD_TEST_DATA_DIR:-data}/pb.db?mode=rwc");
        assert_eq!(result, "sqlite:/var/lib/pulseboard/pb.db?mode=rwc");
        // SAFETY: cleanup of the variable set above.
        unsafe {
            std::env::remove_var("PULSEBOARD_TEST_DATA_DIR");
        }
    }
}
