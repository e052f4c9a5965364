//! Storage Layer
//!
//! SQLite storage through an `sqlx` connection pool, with embedded schema
//! migrations and an in-process change feed:
//! - **Writers** publish a row-level notification after every commit
//! - **Readers** run aggregation queries directly against the pool
//!
//! # Components
//!
//! - [`StorageWriter`]: Session and metric ingestion
//! - [`MetricReader`] / [`SessionReader`]: Read and aggregation facades
//! - [`AlertStore`] / [`AlertConfigStore`]: Alert instances and configuration CRUD
//! - [`FeedbackStore`]: Feedback records
//! - [`StorageAdmin`]: Health checks
//! - [`LocalChangeFeed`]: Change notifications for the realtime adapters
//! - [`StorageBuilder`] / [`StorageHandles`]: Initialization and lifecycle management

mod alert_store;
mod builder;
pub mod db;
mod error;
mod facades;
mod feed;
mod feedback_store;
mod rows;
mod types;

pub(crate) use alert_store::{insert_alert_config_tx, insert_alert_tx};
pub use alert_store::{
    AlertConfigInput, AlertConfigStore, AlertQuery, AlertStore, NewAlert, StatusChange,
};
pub use builder::{StorageBuilder, StorageHandles};
pub use error::StorageError;
pub use facades::{
    DailyAggregate, MetricAggregate, MetricQuery, MetricReader, MetricScope, RouteSessionRow,
    SessionCounts, SessionQuery, SessionReader, SortOrder, StorageAdmin, StorageWriter,
};
pub(crate) use facades::{insert_metric_tx, upsert_session_tx};
pub use feed::{ChangePublisher, DEFAULT_FEED_CAPACITY, LocalChangeFeed};
pub(crate) use feedback_store::insert_feedback_tx;
pub use feedback_store::{FeedbackInput, FeedbackStore};
pub use types::{
    AlertConfig, AlertInstance, AlertSeverity, AlertStatus, Feedback, FeedbackCategory,
    MetricSample, MetricType, Session,
};
