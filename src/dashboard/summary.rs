//! Fleet-wide summary, health score and daily trend view-models.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::analytics::{PerformanceScore, score_breakdown};
use crate::dashboard::RequestContext;
use crate::refresh::{FetchError, RefreshSource};
use crate::storage::{
    DailyAggregate, MetricAggregate, MetricScope, MetricType, StorageError, StorageHandles,
};

/// Default number of daily buckets in a trend.
pub const DEFAULT_TREND_DAYS: usize = 30;
/// Upper bound on `limit` for trends.
pub const MAX_TREND_DAYS: usize = 365;

/// Headline numbers for the dashboard overview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub total_sessions: i64,
    pub unique_devices: i64,
    pub total_samples: i64,
    pub avg_fps: Option<f64>,
    pub avg_memory: Option<f64>,
    pub avg_cpu: Option<f64>,
    pub avg_load_time: Option<f64>,
    /// Per-metric aggregates the averages above come from.
    pub metrics: Vec<MetricAggregate>,
    pub health: PerformanceScore,
    pub generated_at: DateTime<Utc>,
}

/// Build the overview summary.
pub async fn fetch_performance_summary(
    ctx: &RequestContext,
) -> Result<PerformanceSummary, StorageError> {
    let now = Utc::now();
    let aggregates = ctx.aggregates().await?.to_vec();
    let counts = ctx.counts().await?;
    let health = fetch_performance_score(ctx).await?;
    let avg = |metric_type: MetricType| {
        aggregates
            .iter()
            .find(|a| a.metric_type == metric_type)
            .map(|a| a.avg)
    };

    Ok(PerformanceSummary {
        total_sessions: counts.sessions,
        unique_devices: counts.devices,
        total_samples: aggregates.iter().map(|a| a.count).sum(),
        avg_fps: avg(MetricType::Fps),
        avg_memory: avg(MetricType::MemoryUsage),
        avg_cpu: avg(MetricType::CpuUsage),
        avg_load_time: avg(MetricType::LoadTime),
        metrics: aggregates,
        health,
        generated_at: now,
    })
}

/// Polls the overview summary, with a fresh [`RequestContext`] per fetch.
#[derive(Debug, Clone)]
pub struct SummarySource {
    storage: StorageHandles,
    scope: MetricScope,
}

impl SummarySource {
    pub fn new(storage: StorageHandles, scope: MetricScope) -> Self {
        Self { storage, scope }
    }
}

#[async_trait::async_trait]
impl RefreshSource for SummarySource {
    type Output = PerformanceSummary;

    async fn fetch(&self) -> Result<PerformanceSummary, FetchError> {
        let ctx = RequestContext::new(self.storage.clone(), self.scope.clone());
        fetch_performance_summary(&ctx).await.map_err(FetchError::new)
    }
}

/// Weighted health score for the context's scope.
pub async fn fetch_performance_score(ctx: &RequestContext) -> Result<PerformanceScore, StorageError> {
    let averages = ctx.averages().await?;
    let counts = ctx.counts().await?;
    let days = ctx.days_since_first_seen(Utc::now()).await?;
    Ok(score_breakdown(averages, counts.sessions.max(0) as u64, days))
}

/// One UTC day of averages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendBucket {
    pub day: NaiveDate,
    pub samples: i64,
    pub averages: BTreeMap<MetricType, f64>,
}

/// Daily averages, oldest day first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsTrend {
    pub days: Vec<TrendBucket>,
    /// Percent change of each metric between the first and last bucket
    /// that carry it.
    pub changes: BTreeMap<MetricType, f64>,
}

impl MetricsTrend {
    /// Fold daily aggregates into buckets, keeping the most recent `limit` days.
    pub fn from_daily(rows: &[DailyAggregate], limit: usize) -> Self {
        let mut by_day: BTreeMap<NaiveDate, TrendBucket> = BTreeMap::new();
        for row in rows {
            let bucket = by_day.entry(row.day).or_insert_with(|| TrendBucket {
                day: row.day,
                samples: 0,
                averages: BTreeMap::new(),
            });
            bucket.samples += row.count;
            bucket.averages.insert(row.metric_type, row.avg);
        }

        let skip = by_day.len().saturating_sub(limit);
        let days: Vec<TrendBucket> = by_day.into_values().skip(skip).collect();

        let mut changes = BTreeMap::new();
        for metric_type in MetricType::ALL {
            let mut values = days.iter().filter_map(|b| b.averages.get(&metric_type));
            let (Some(first), Some(last)) = (values.next(), values.last()) else {
                continue;
            };
            if *first != 0.0 {
                changes.insert(metric_type, (last - first) / first.abs() * 100.0);
            }
        }

        Self { days, changes }
    }
}

/// Daily trend for the context's scope. `limit` defaults to 30 days.
pub async fn fetch_metrics_trend(
    ctx: &RequestContext,
    limit: Option<usize>,
) -> Result<MetricsTrend, StorageError> {
    let limit = limit
        .unwrap_or(DEFAULT_TREND_DAYS)
        .clamp(1, MAX_TREND_DAYS);
    let rows = ctx
        .storage()
        .metric_reader
        .daily_aggregates(ctx.scope())
        .await?;
    Ok(MetricsTrend::from_daily(&rows, limit))
}
