//! In-process change feed.
//!
//! Every storage write publishes a [`RowChange`] on a broadcast channel.
//! [`LocalChangeFeed`] implements [`ChangeFeed`] on top of it: each
//! subscription gets a forwarding task that applies the filter and relays
//! matching notifications (and lag reports) to the subscriber.

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

use crate::realtime::{ChangeFeed, ChangeKind, FeedError, FeedFilter, RowChange, Subscription, Table};

/// Default broadcast capacity for change notifications.
pub const DEFAULT_FEED_CAPACITY: usize = 1_024;

/// Per-subscription buffer between the forwarder and the subscriber.
const SUBSCRIPTION_BUFFER: usize = 256;

/// Publishing side of the change feed, held by the storage facades.
#[derive(Clone)]
pub struct ChangePublisher {
    tx: broadcast::Sender<RowChange>,
}

impl std::fmt::Debug for ChangePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangePublisher")
            .field("receivers", &self.tx.receiver_count())
            .finish()
    }
}

impl ChangePublisher {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish a change for a serializable record.
    ///
    /// Publishing without subscribers is not an error.
    pub(crate) fn publish<T: Serialize>(&self, table: Table, kind: ChangeKind, record: &T) {
        match serde_json::to_value(record) {
            Ok(row) => {
                let _ = self.tx.send(RowChange::new(table, kind, row));
            }
            Err(e) => {
                tracing::warn!(table = %table, kind = %kind, error = %e, "Failed to encode change");
            }
        }
    }

    /// Feed handle for subscribers.
    pub fn feed(&self) -> LocalChangeFeed {
        LocalChangeFeed {
            tx: self.tx.clone(),
        }
    }
}

/// [`ChangeFeed`] backed by the in-process broadcast channel.
#[derive(Clone)]
pub struct LocalChangeFeed {
    tx: broadcast::Sender<RowChange>,
}

impl std::fmt::Debug for LocalChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalChangeFeed").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ChangeFeed for LocalChangeFeed {
    async fn subscribe(&self, filter: FeedFilter) -> Result<Subscription, FeedError> {
        let mut source = self.tx.subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let task_filter = filter.clone();

        let handle = tokio::spawn(async move {
            loop {
                let item = match source.recv().await {
                    Ok(change) if task_filter.matches(&change) => Ok(change),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(n)) => Err(FeedError::Lagged(n)),
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        tracing::debug!(filter = %filter, "Subscribed to change feed");
        Ok(Subscription::new(filter, rx, Some(handle.abort_handle())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_local_feed_filters_and_relays() {
        let publisher = ChangePublisher::new(16);
        let feed = publisher.feed();
        let mut sub = feed
            .subscribe(FeedFilter::table(Table::Metrics).eq("session_id", "s-1"))
            .await
            .unwrap();

        publisher.publish(
            Table::Metrics,
            ChangeKind::Insert,
            &json!({"id": 1, "session_id": "s-2"}),
        );
        publisher.publish(
            Table::Alerts,
            ChangeKind::Insert,
            &json!({"id": "a-1", "session_id": "s-1"}),
        );
        publisher.publish(
            Table::Metrics,
            ChangeKind::Insert,
            &json!({"id": 3, "session_id": "s-1"}),
        );

        let change = sub.next().await.unwrap().unwrap();
        assert_eq!(change.table, Table::Metrics);
        assert_eq!(change.row["id"], 3);
    }

    #[tokio::test]
    async fn test_local_feed_reports_lag() {
        let publisher = ChangePublisher::new(2);
        let feed = publisher.feed();
        let mut sub = feed.subscribe(FeedFilter::table(Table::Alerts)).await.unwrap();

        // Publish faster than the forwarder can drain so the broadcast ring overflows.
        for i in 0..10 {
            publisher.publish(Table::Alerts, ChangeKind::Insert, &json!({"id": i}));
        }

        let mut saw_lag = false;
        for _ in 0..10 {
            match tokio::time::timeout(std::time::Duration::from_millis(200), sub.next()).await {
                Ok(Err(FeedError::Lagged(n))) => {
                    assert!(n > 0);
                    saw_lag = true;
                    break;
                }
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        assert!(saw_lag);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_silent() {
        let publisher = ChangePublisher::new(4);
        publisher.publish(Table::Feedback, ChangeKind::Insert, &json!({"id": "f-1"}));
    }
}
