//! Per-request memo of shared aggregate queries.
//!
//! Several view-models read the same per-metric aggregates and session
//! counts. A [`RequestContext`] is created once per request (or per
//! refresh cycle) and computes each of them at most once; it is dropped
//! with the request, so nothing is cached across requests.

use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;

use crate::analytics::{AppAverages, MetricAverages};
use crate::storage::{
    MetricAggregate, MetricScope, MetricType, SessionCounts, SessionQuery, StorageError,
    StorageHandles,
};

/// Named look-back windows accepted by `range` parameters.
pub const RANGES: [&str; 7] = ["1h", "6h", "12h", "24h", "7d", "30d", "90d"];

/// Start of the named look-back window ending at `now`.
pub fn range_start(range: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let window = match range {
        "1h" => chrono::Duration::hours(1),
        "6h" => chrono::Duration::hours(6),
        "12h" => chrono::Duration::hours(12),
        "24h" => chrono::Duration::hours(24),
        "7d" => chrono::Duration::days(7),
        "30d" => chrono::Duration::days(30),
        "90d" => chrono::Duration::days(90),
        _ => return None,
    };
    Some(now - window)
}

pub struct RequestContext {
    storage: StorageHandles,
    scope: MetricScope,
    aggregates: OnceCell<Vec<MetricAggregate>>,
    counts: OnceCell<SessionCounts>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("scope", &self.scope)
            .field("aggregates_loaded", &self.aggregates.initialized())
            .field("counts_loaded", &self.counts.initialized())
            .finish()
    }
}

impl RequestContext {
    pub fn new(storage: StorageHandles, scope: MetricScope) -> Self {
        Self {
            storage,
            scope,
            aggregates: OnceCell::new(),
            counts: OnceCell::new(),
        }
    }

    pub fn storage(&self) -> &StorageHandles {
        &self.storage
    }

    pub fn scope(&self) -> &MetricScope {
        &self.scope
    }

    /// Per-metric-type aggregates within the scope, queried once.
    pub async fn aggregates(&self) -> Result<&[MetricAggregate], StorageError> {
        let aggregates = self
            .aggregates
            .get_or_try_init(|| self.storage.metric_reader.aggregates(&self.scope))
            .await?;
        Ok(aggregates)
    }

    /// Session and device counts for sessions matching the scope's filters
    /// and explicit bounds, queried once.
    pub async fn counts(&self) -> Result<SessionCounts, StorageError> {
        let counts = self
            .counts
            .get_or_try_init(|| async {
                let query = SessionQuery {
                    start: self.scope.start,
                    end: self.scope.end,
                    device_id: self.scope.device_id.clone(),
                    app_version: self.scope.app_version.clone(),
                    ..Default::default()
                };
                self.storage.session_reader.counts(&query).await
            })
            .await?;
        Ok(*counts)
    }

    /// Aggregate for one metric type, if any samples exist.
    pub async fn aggregate(
        &self,
        metric_type: MetricType,
    ) -> Result<Option<MetricAggregate>, StorageError> {
        Ok(self
            .aggregates()
            .await?
            .iter()
            .find(|a| a.metric_type == metric_type)
            .cloned())
    }

    /// Averages feeding the health score.
    pub async fn averages(&self) -> Result<MetricAverages, StorageError> {
        let aggregates = self.aggregates().await?;
        Ok(MetricAverages {
            fps: average_of(aggregates, MetricType::Fps),
            memory: average_of(aggregates, MetricType::MemoryUsage),
            load_time: average_of(aggregates, MetricType::LoadTime),
        })
    }

    /// Fleet averages route scores are normalized against.
    pub async fn app_averages(&self) -> Result<AppAverages, StorageError> {
        let aggregates = self.aggregates().await?;
        Ok(AppAverages {
            fps: average_of(aggregates, MetricType::Fps),
            memory: average_of(aggregates, MetricType::MemoryUsage),
            cpu: average_of(aggregates, MetricType::CpuUsage),
        })
    }

    /// Whole days between the first session in scope and `now` (0 without sessions).
    pub async fn days_since_first_seen(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let counts = self.counts().await?;
        Ok(counts
            .first_started_at
            .map_or(0, |first| (now - first).num_days().max(0) as u64))
    }
}

fn average_of(aggregates: &[MetricAggregate], metric_type: MetricType) -> Option<f64> {
    aggregates
        .iter()
        .find(|a| a.metric_type == metric_type && a.count > 0)
        .map(|a| a.avg)
}
