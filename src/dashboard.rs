//! Dashboard view-models.
//!
//! Aggregation fetches that shape stored rows into the JSON served by the
//! API and rendered by the `watch` command. View-models are recomputed on
//! every fetch and never persisted.
//!
//! - [`context`]: per-request memo of shared aggregate queries
//! - [`summary`]: overview, health score and daily trend
//! - [`profiles`]: device and app-version drill-downs
//! - [`routes`]: per-route forecasts
//! - [`insights`]: sectioned report with derived findings
//! - [`dataset`]: JSON export and import of every table

pub mod context;
pub mod dataset;
pub mod insights;
pub mod profiles;
pub mod routes;
pub mod summary;

pub use context::{RANGES, RequestContext, range_start};
pub use dataset::{DATASET_VERSION, Dataset, ImportSummary, export_dataset, import_dataset};
pub use insights::{
    AlertDigest, FeedbackDigest, Insight, InsightLevel, InsightsReport, fetch_insights,
};
pub use profiles::{
    CpuEstimate, DeviceProfile, VersionDetails, device_scope, fetch_device_profile,
    fetch_version_details, version_scope,
};
pub use routes::{RouteAnalyticsReport, fetch_route_analytics};
pub use summary::{
    MetricsTrend, PerformanceSummary, SummarySource, TrendBucket, fetch_metrics_trend,
    fetch_performance_score, fetch_performance_summary,
};
