//! Change-feed interface.
//!
//! The hosted backend pushes row-level notifications; this module is the
//! narrow seam the adapters depend on: `subscribe(filter)` yields a stream
//! of typed [`RowChange`] events, and dropping or unsubscribing the
//! [`Subscription`] releases it.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Tables that publish change notifications.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Table {
    Sessions,
    Metrics,
    AlertConfigs,
    Alerts,
    Feedback,
}

/// Kind of row-level change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One row-level change notification.
///
/// For inserts and updates `row` holds the new record; for deletes it holds
/// the removed record (or at least its primary key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub table: Table,
    pub kind: ChangeKind,
    pub row: serde_json::Value,
    pub committed_at: DateTime<Utc>,
}

impl RowChange {
    /// Create a change stamped with the current time.
    pub fn new(table: Table, kind: ChangeKind, row: serde_json::Value) -> Self {
        Self {
            table,
            kind,
            row,
            committed_at: Utc::now(),
        }
    }

    /// Decode the row payload into a typed record.
    pub fn decode<R: DeserializeOwned>(&self) -> Result<R, FeedError> {
        serde_json::from_value(self.row.clone()).map_err(|e| FeedError::Decode(e.to_string()))
    }
}

/// Errors surfaced by a change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FeedError {
    /// The subscription could not be established.
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// The subscriber fell behind and notifications were dropped.
    #[error("subscriber lagged, {0} notifications dropped")]
    Lagged(u64),

    /// A notification payload did not match the expected record shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The feed closed the subscription.
    #[error("subscription closed")]
    Closed,
}

/// Subscription filter: one table plus an optional equality predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedFilter {
    pub table: Table,
    pub column_eq: Option<(String, serde_json::Value)>,
}

impl FeedFilter {
    /// Match every change on `table`.
    pub fn table(table: Table) -> Self {
        Self {
            table,
            column_eq: None,
        }
    }

    /// Only match rows whose `column` equals `value`.
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.column_eq = Some((column.into(), value.into()));
        self
    }

    /// Whether `change` passes this filter.
    pub fn matches(&self, change: &RowChange) -> bool {
        if change.table != self.table {
            return false;
        }
        match &self.column_eq {
            None => true,
            Some((column, value)) => change.row.get(column) == Some(value),
        }
    }
}

impl std::fmt::Display for FeedFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.column_eq {
            None => write!(f, "{}", self.table),
            Some((column, value)) => write!(f, "{}:{}=eq.{}", self.table, column, value),
        }
    }
}

/// Connection state of a feed adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// An open subscription.
///
/// Items arrive in the order the feed delivers them. Delivery is assumed
/// at-least-once and not gap-free.
pub struct Subscription {
    id: uuid::Uuid,
    filter: FeedFilter,
    rx: mpsc::Receiver<Result<RowChange, FeedError>>,
    forwarder: Option<AbortHandle>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Wrap a receiver produced by a feed implementation.
    ///
    /// `forwarder` is aborted when the subscription is released.
    pub fn new(
        filter: FeedFilter,
        rx: mpsc::Receiver<Result<RowChange, FeedError>>,
        forwarder: Option<AbortHandle>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            filter,
            rx,
            forwarder,
        }
    }

    /// Subscription identifier.
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Filter this subscription was opened with.
    pub fn filter(&self) -> &FeedFilter {
        &self.filter
    }

    /// Wait for the next notification.
    ///
    /// Returns `Ok(None)` once the feed has closed the subscription.
    pub async fn next(&mut self) -> Result<Option<RowChange>, FeedError> {
        match self.rx.recv().await {
            Some(Ok(change)) => Ok(Some(change)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Release the subscription.
    pub fn unsubscribe(self) {
        tracing::debug!(subscription = %self.id, filter = %self.filter, "Unsubscribed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handle) = self.forwarder.take() {
            handle.abort();
        }
    }
}

/// Push-based change feed.
#[async_trait::async_trait]
pub trait ChangeFeed: Send + Sync + 'static {
    /// Open a subscription scoped to `filter`.
    async fn subscribe(&self, filter: FeedFilter) -> Result<Subscription, FeedError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_matches_table_only() {
        let filter = FeedFilter::table(Table::Alerts);
        let change = RowChange::new(Table::Alerts, ChangeKind::Insert, json!({"id": "a-1"}));
        assert!(filter.matches(&change));

        let other = RowChange::new(Table::Metrics, ChangeKind::Insert, json!({"id": 1}));
        assert!(!filter.matches(&other));
    }

    #[test]
    fn test_filter_matches_column_predicate() {
        let filter = FeedFilter::table(Table::Metrics).eq("session_id", "s-1");
        let hit = RowChange::new(
            Table::Metrics,
            ChangeKind::Insert,
            json!({"id": 1, "session_id": "s-1"}),
        );
        let miss = RowChange::new(
            Table::Metrics,
            ChangeKind::Insert,
            json!({"id": 2, "session_id": "s-2"}),
        );
        assert!(filter.matches(&hit));
        assert!(!filter.matches(&miss));
        assert_eq!(filter.to_string(), "metrics:session_id=eq.\"s-1\"");
    }

    #[test]
    fn test_row_change_decode_error() {
        let change = RowChange::new(Table::Alerts, ChangeKind::Update, json!({"id": 5}));
        let result: Result<crate::storage::AlertInstance, _> = change.decode();
        assert!(matches!(result, Err(FeedError::Decode(_))));
    }

    #[tokio::test]
    async fn test_subscription_yields_until_closed() {
        let (tx, rx) = mpsc::channel(4);
        let mut sub = Subscription::new(FeedFilter::table(Table::Alerts), rx, None);

        let change = RowChange::new(Table::Alerts, ChangeKind::Delete, json!({"id": "a-1"}));
        tx.send(Ok(change.clone())).await.unwrap();
        tx.send(Err(FeedError::Lagged(3))).await.unwrap();
        drop(tx);

        assert_eq!(sub.next().await.unwrap(), Some(change));
        assert_eq!(sub.next().await.unwrap_err(), FeedError::Lagged(3));
        assert_eq!(sub.next().await.unwrap(), None);
    }
}
