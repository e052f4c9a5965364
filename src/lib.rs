//! Pulseboard - Performance Monitoring Dashboard Backend
//!
//! This crate provides the core functionality for the Pulseboard dashboard.
//! It can be used as a library by other Rust projects, or run as a standalone
//! binary with the `pulseboard` executable.
//!
//! # Architecture
//!
//! - **Storage**: SQLite persistence with an in-process change feed
//! - **Refresh**: Smart polling scheduler with interaction-aware pausing
//! - **Realtime**: Change-feed adapters for alerts and live session metrics
//! - **Alerts**: Forward-only alert status lifecycle
//! - **Analytics**: Health score, route prediction and CPU inference
//! - **Dashboard**: View-models served by the REST API
//!
//! # Example
//!
//! ```rust,no_run
//! use pulseboard::dashboard::{RequestContext, fetch_performance_summary};
//! use pulseboard::{MetricScope, StorageBuilder};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let handles = StorageBuilder::new("sqlite:data/pulseboard.db?mode=rwc")
//!     .build()
//!     .await?;
//! let ctx = RequestContext::new(handles.clone(), MetricScope::default());
//! let summary = fetch_performance_summary(&ctx).await?;
//! println!("health: {} ({})", summary.health.overall, summary.health.grade);
//! handles.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod analytics;
pub mod config;
pub mod dashboard;
pub mod outcome;
pub mod realtime;
pub mod refresh;
pub mod server;
pub mod storage;

pub use alerts::{Actor, AlertAction, AlertError, AlertLifecycle};
pub use config::AppConfig;
pub use outcome::Outcome;
pub use refresh::{RefreshClass, RefreshConfig, SmartRefresh};
pub use storage::{
    AlertInstance, AlertStatus, MetricSample, MetricScope, MetricType, Session, StorageBuilder,
    StorageError, StorageHandles,
};
