//! Configuration module for Pulseboard.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Database settings (URL, pool size, change-feed capacity)
//! - Smart-refresh and live-metrics settings

mod app;
mod validation;

pub use app::{
    AppConfig, DEFAULT_DATABASE_URL, DEFAULT_MAX_CONNECTIONS, DatabaseConfig, LiveMetricsConfig,
    RefreshSettings, ServerConfig,
};
pub use validation::{ConfigError, expand_env_vars, parse_duration};
