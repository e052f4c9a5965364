//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::realtime::LiveConfig;
use crate::realtime::live::{DEFAULT_AGGREGATION_INTERVAL, DEFAULT_MAX_POINTS};
use crate::refresh::{DEFAULT_INTERACTION_WINDOW, MIN_INTERVAL, RefreshClass, RefreshConfig};
use crate::storage::DEFAULT_FEED_CAPACITY;
pub use crate::storage::db::DEFAULT_MAX_CONNECTIONS;

use super::validation::{
    ConfigError, check_bind, check_positive, check_sqlite_url, expand_env_vars,
};

// =============================================================================
// Constants
// =============================================================================

/// Default database URL.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:data/pulseboard.db?mode=rwc";

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_feed_capacity() -> usize {
    DEFAULT_FEED_CAPACITY
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 8080).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Database configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite URL; `${VAR:-default}` references are expanded on load.
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Connection pool size (default: 5).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Capacity of the shared change-feed broadcast ring (default: 1024).
    /// Subscribers that fall further behind observe a lag.
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }
}

// =============================================================================
// Refresh Configuration
// =============================================================================

/// Smart-refresh settings used by the `watch` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshSettings {
    /// Cadence class; sets the interval when `interval` is omitted.
    pub class: RefreshClass,

    /// Polling interval (minimum 1s).
    #[serde(with = "humantime_serde")]
    pub interval: Option<Duration>,

    pub pause_on_interaction: bool,

    /// How long polling stays paused after an interaction (default: 5s).
    #[serde(with = "humantime_serde")]
    pub interaction_window: Duration,

    pub enabled: bool,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            class: RefreshClass::default(),
            interval: None,
            pause_on_interaction: true,
            interaction_window: DEFAULT_INTERACTION_WINDOW,
            enabled: true,
        }
    }
}

impl RefreshSettings {
    /// Scheduler configuration for one refreshed view.
    pub fn to_refresh_config(&self, cache_key: &str) -> RefreshConfig {
        RefreshConfig::for_class(self.class)
            .interval(self.interval.unwrap_or(self.class.default_interval()))
            .pause_on_interaction(self.pause_on_interaction)
            .interaction_window(self.interaction_window)
            .enabled(self.enabled)
            .cache_key(cache_key)
    }
}

// =============================================================================
// Live Metrics Configuration
// =============================================================================

/// Live session metrics buffer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveMetricsConfig {
    pub max_points: usize,

    /// Samples of one type closer together than this are merged (0s disables).
    #[serde(with = "humantime_serde")]
    pub aggregation_interval: Duration,
}

impl Default for LiveMetricsConfig {
    fn default() -> Self {
        Self {
            max_points: DEFAULT_MAX_POINTS,
            aggregation_interval: DEFAULT_AGGREGATION_INTERVAL,
        }
    }
}

impl From<&LiveMetricsConfig> for LiveConfig {
    fn from(config: &LiveMetricsConfig) -> Self {
        LiveConfig {
            max_points: config.max_points,
            aggregation_interval: config.aggregation_interval,
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Web server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Smart-refresh settings.
    #[serde(default)]
    pub refresh: RefreshSettings,

    /// Live session metrics settings.
    #[serde(default)]
    pub live_metrics: LiveMetricsConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse, expand and validate a YAML document.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(content)?;
        config.database.url = expand_env_vars(&config.database.url);
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_bind(&self.server.bind)?;
        if self.server.port == 0 {
            return Err(ConfigError::invalid("server port must be non-zero"));
        }

        check_sqlite_url(&self.database.url)?;
        check_positive(
            "database max_connections",
            self.database.max_connections as usize,
        )?;
        check_positive("database feed_capacity", self.database.feed_capacity)?;

        if let Some(interval) = self.refresh.interval
            && interval < MIN_INTERVAL
        {
            return Err(ConfigError::invalid(format!(
                "refresh interval must be at least {}",
                humantime::format_duration(MIN_INTERVAL)
            )));
        }

        check_positive("live_metrics max_points", self.live_metrics.max_points)
    }
}
