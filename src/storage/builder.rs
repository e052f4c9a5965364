//! Storage builder and handles.
//!
//! Provides a builder pattern for constructing the storage layer
//! and a handles struct for accessing all storage facades.

use std::path::Path;

use sqlx::{Sqlite, Transaction};

use crate::storage::db::{DEFAULT_MAX_CONNECTIONS, SqlitePool};
use crate::storage::feed::{ChangePublisher, DEFAULT_FEED_CAPACITY, LocalChangeFeed};
use crate::storage::{
    AlertConfigStore, AlertStore, FeedbackStore, MetricReader, SessionReader, StorageAdmin,
    StorageError, StorageWriter,
};

/// Builder for constructing the storage layer.
pub struct StorageBuilder {
    url: String,
    max_connections: u32,
    feed_capacity: usize,
}

impl StorageBuilder {
    /// Create a new storage builder for a SQLite URL
    /// (e.g. `sqlite:data/pulseboard.db` or `sqlite::memory:`).
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }

    /// Set the maximum number of pooled connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the broadcast capacity of the change feed.
    ///
    /// Subscribers that fall further behind than this observe a lag error.
    pub fn feed_capacity(mut self, capacity: usize) -> Self {
        self.feed_capacity = capacity;
        self
    }

    /// Connect, apply migrations, and return handles.
    pub async fn build(self) -> Result<StorageHandles, StorageError> {
        create_parent_dir(&self.url)?;

        let pool = SqlitePool::connect_with(&self.url, self.max_connections).await?;
        pool.migrate().await?;

        let publisher = ChangePublisher::new(self.feed_capacity);
        tracing::debug!(url = %self.url, max_connections = self.max_connections, "Storage ready");

        Ok(StorageHandles {
            writer: StorageWriter::new(pool.clone(), publisher.clone()),
            metric_reader: MetricReader::new(pool.clone()),
            session_reader: SessionReader::new(pool.clone()),
            alert_store: AlertStore::new(pool.clone(), publisher.clone()),
            alert_config_store: AlertConfigStore::new(pool.clone(), publisher.clone()),
            feedback_store: FeedbackStore::new(pool.clone(), publisher.clone()),
            admin: StorageAdmin::new(pool.clone()),
            feed: publisher.feed(),
            publisher,
            pool,
        })
    }
}

/// Create the database file's parent directory for file-backed URLs.
fn create_parent_dir(url: &str) -> Result<(), StorageError> {
    if url.contains(":memory:") || url.contains("mode=memory") {
        return Ok(());
    }
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            StorageError::Internal(format!(
                "Failed to create database directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Handles to all storage layer facades.
#[derive(Clone, Debug)]
pub struct StorageHandles {
    /// Session and metric writer.
    pub writer: StorageWriter,
    /// Facade for reading metric samples and aggregates.
    pub metric_reader: MetricReader,
    /// Facade for reading sessions.
    pub session_reader: SessionReader,
    /// Alert instance storage.
    pub alert_store: AlertStore,
    /// Alert configuration CRUD.
    pub alert_config_store: AlertConfigStore,
    /// Feedback storage.
    pub feedback_store: FeedbackStore,
    /// Facade for storage administration.
    pub admin: StorageAdmin,
    /// Change feed fed by every write above.
    pub feed: LocalChangeFeed,
    publisher: ChangePublisher,
    pool: SqlitePool,
}

impl StorageHandles {
    /// Open a transaction spanning every table.
    ///
    /// Writes made through it publish nothing; callers announce them via
    /// [`StorageHandles::publisher`] once the commit succeeds.
    pub(crate) async fn begin(&self) -> Result<Transaction<'static, Sqlite>, StorageError> {
        Ok(self.pool.inner().begin().await?)
    }

    pub(crate) fn publisher(&self) -> &ChangePublisher {
        &self.publisher
    }

    /// Gracefully shut down the storage layer, closing all pooled connections.
    pub async fn shutdown(self) {
        self.pool.close().await;
        tracing::debug!("Storage closed");
    }
}
