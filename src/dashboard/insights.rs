//! Insights report.
//!
//! Each section is fetched independently and carried as an [`Outcome`]:
//! a failed query shows up as a failed section while the others still
//! render. Findings are derived only from sections that succeeded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::Display;

use crate::analytics::{Grade, Priority};
use crate::dashboard::RequestContext;
use crate::dashboard::routes::{RouteAnalyticsReport, fetch_route_analytics};
use crate::dashboard::summary::{
    MetricsTrend, PerformanceSummary, fetch_metrics_trend, fetch_performance_summary,
};
use crate::outcome::{Outcome, attempt};
use crate::storage::{
    AlertQuery, AlertSeverity, AlertStatus, Feedback, FeedbackCategory, MetricType, StorageError,
};

const INSIGHT_TREND_DAYS: usize = 14;
const FEEDBACK_SAMPLE: u32 = 200;
/// Percent change in a metric that is worth calling out.
const NOTABLE_CHANGE: f64 = 10.0;
const LOW_RATING: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InsightLevel {
    Info,
    Warning,
    Critical,
}

/// One finding shown on the insights page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub level: InsightLevel,
    pub title: String,
    pub detail: String,
}

impl Insight {
    fn new(level: InsightLevel, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            detail: detail.into(),
        }
    }
}

/// Open alerts at report time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AlertDigest {
    pub active: usize,
    pub acknowledged: usize,
    pub critical_open: usize,
}

/// Recent feedback at a glance.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FeedbackDigest {
    pub count: usize,
    pub average_rating: Option<f64>,
    pub performance_reports: usize,
}

impl FeedbackDigest {
    pub fn from_records(records: &[Feedback]) -> Self {
        let ratings: Vec<f64> = records
            .iter()
            .filter_map(|f| f.rating.map(f64::from))
            .collect();
        Self {
            count: records.len(),
            average_rating: (!ratings.is_empty())
                .then(|| ratings.iter().sum::<f64>() / ratings.len() as f64),
            performance_reports: records
                .iter()
                .filter(|f| f.category == FeedbackCategory::Performance)
                .count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightsReport {
    pub summary: Outcome<PerformanceSummary>,
    pub trend: Outcome<MetricsTrend>,
    pub routes: Outcome<RouteAnalyticsReport>,
    pub alerts: Outcome<AlertDigest>,
    pub feedback: Outcome<FeedbackDigest>,
    /// Most severe first.
    pub insights: Vec<Insight>,
    pub generated_at: DateTime<Utc>,
}

impl InsightsReport {
    /// Number of sections that failed.
    pub fn failed_sections(&self) -> usize {
        [
            self.summary.is_success(),
            self.trend.is_success(),
            self.routes.is_success(),
            self.alerts.is_success(),
            self.feedback.is_success(),
        ]
        .into_iter()
        .filter(|ok| !ok)
        .count()
    }
}

async fn fetch_alert_digest(ctx: &RequestContext) -> Result<AlertDigest, StorageError> {
    let open = ctx
        .storage()
        .alert_store
        .list(AlertQuery {
            statuses: vec![AlertStatus::Active, AlertStatus::Acknowledged],
            limit: Some(u32::MAX),
        })
        .await?;
    Ok(AlertDigest {
        active: open.iter().filter(|a| a.status == AlertStatus::Active).count(),
        acknowledged: open
            .iter()
            .filter(|a| a.status == AlertStatus::Acknowledged)
            .count(),
        critical_open: open
            .iter()
            .filter(|a| a.severity == AlertSeverity::Critical)
            .count(),
    })
}

async fn fetch_feedback_digest(ctx: &RequestContext) -> Result<FeedbackDigest, StorageError> {
    let records = ctx
        .storage()
        .feedback_store
        .list(Some(FEEDBACK_SAMPLE))
        .await?;
    Ok(FeedbackDigest::from_records(&records))
}

/// Fetch every section concurrently and derive findings.
pub async fn fetch_insights(ctx: &RequestContext) -> InsightsReport {
    let (summary, trend, routes, alerts, feedback) = tokio::join!(
        attempt("summary", fetch_performance_summary(ctx)),
        attempt("trend", fetch_metrics_trend(ctx, Some(INSIGHT_TREND_DAYS))),
        attempt("routes", fetch_route_analytics(ctx)),
        attempt("alerts", fetch_alert_digest(ctx)),
        attempt("feedback", fetch_feedback_digest(ctx)),
    );

    let mut report = InsightsReport {
        summary,
        trend,
        routes,
        alerts,
        feedback,
        insights: Vec::new(),
        generated_at: Utc::now(),
    };
    report.insights = derive_insights(&report);
    report
}

/// Findings from the sections that succeeded, most severe first.
pub fn derive_insights(report: &InsightsReport) -> Vec<Insight> {
    let mut out = Vec::new();

    if let Some(summary) = report.summary.data() {
        let health = &summary.health;
        match health.grade {
            Grade::D | Grade::F => out.push(Insight::new(
                InsightLevel::Warning,
                "Low health score",
                format!("Overall health is {} (grade {})", health.overall, health.grade),
            )),
            Grade::A => out.push(Insight::new(
                InsightLevel::Info,
                "Healthy fleet",
                format!("Overall health is {}", health.overall),
            )),
            _ => {}
        }
        if health.averages.load_time.is_none() {
            out.push(Insight::new(
                InsightLevel::Info,
                "No load-time data",
                "Load time contributes 0 to the health score until samples arrive",
            ));
        }
    }

    if let Some(trend) = report.trend.data() {
        for (metric_type, change) in &trend.changes {
            let worse = if metric_type.lower_is_better() {
                *change > NOTABLE_CHANGE
            } else {
                *change < -NOTABLE_CHANGE
            };
            if worse {
                out.push(Insight::new(
                    InsightLevel::Warning,
                    format!("{} regressing", label(*metric_type)),
                    format!("{change:+.1}% over the last {} days", trend.days.len()),
                ));
            }
        }
    }

    if let Some(routes) = report.routes.data() {
        for route in routes.routes.iter().filter(|r| r.priority == Priority::High) {
            let week = route.forecast(7).map_or(0.0, |f| f.predicted_score);
            out.push(Insight::new(
                InsightLevel::Critical,
                format!("Route {} needs attention", route.route),
                format!(
                    "7-day forecast {week:.0}, risk {}, trend {}",
                    route.risk_level, route.trend
                ),
            ));
        }
    }

    if let Some(alerts) = report.alerts.data()
        && alerts.critical_open > 0
    {
        out.push(Insight::new(
            InsightLevel::Critical,
            "Critical alerts open",
            format!("{} critical alert(s) not yet resolved", alerts.critical_open),
        ));
    }

    if let Some(feedback) = report.feedback.data()
        && let Some(rating) = feedback.average_rating
        && rating < LOW_RATING
    {
        out.push(Insight::new(
            InsightLevel::Warning,
            "Low user ratings",
            format!("Average rating {rating:.1} across {} submissions", feedback.count),
        ));
    }

    out.sort_by(|a, b| b.level.cmp(&a.level));
    out
}

fn label(metric_type: MetricType) -> &'static str {
    match metric_type {
        MetricType::Fps => "Frame rate",
        MetricType::MemoryUsage => "Memory usage",
        MetricType::CpuUsage => "CPU usage",
        MetricType::LoadTime => "Load time",
        MetricType::NavigationTime => "Navigation time",
        MetricType::NetworkLatency => "Network latency",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{
        FeedbackInput, MetricSample, MetricScope, NewAlert, Session, StorageBuilder,
    };

    #[tokio::test]
    async fn test_report_on_populated_store() {
        let handles = StorageBuilder::new("sqlite::memory:").build().await.unwrap();
        let now = Utc::now();
        handles
            .writer
            .upsert_session(&Session {
                id: "s-1".to_string(),
                device_id: "d-1".to_string(),
                app_version: "1.0.0".to_string(),
                platform: "web".to_string(),
                device_type: None,
                started_at: now,
                ended_at: None,
            })
            .await
            .unwrap();
        handles
            .writer
            .insert_metrics(&[
                MetricSample::new("s-1", MetricType::Fps, 20.0, now).with_route("/feed"),
                MetricSample::new("s-1", MetricType::MemoryUsage, 900.0, now).with_route("/feed"),
            ])
            .await
            .unwrap();
        handles
            .alert_store
            .raise(NewAlert {
                config_id: "cfg-1".to_string(),
                severity: AlertSeverity::Critical,
                metric_value: 20.0,
                threshold: 30.0,
                message: "FPS below critical threshold".to_string(),
            })
            .await
            .unwrap();
        handles
            .feedback_store
            .create(FeedbackInput {
                session_id: Some("s-1".to_string()),
                category: FeedbackCategory::Performance,
                rating: Some(2),
                message: "Feed is laggy".to_string(),
            })
            .await
            .unwrap();

        let ctx = RequestContext::new(handles, MetricScope::default());
        let report = fetch_insights(&ctx).await;

        assert_eq!(report.failed_sections(), 0);
        assert_eq!(report.alerts.data().unwrap().critical_open, 1);
        assert_eq!(report.feedback.data().unwrap().performance_reports, 1);
        assert_eq!(report.insights[0].level, InsightLevel::Critical);
        assert!(report.insights.iter().any(|i| i.title == "Low user ratings"));
        assert!(report.insights.iter().any(|i| i.title == "Low health score"));
    }

    #[tokio::test]
    async fn test_failed_sections_do_not_fail_the_report() {
        let handles = StorageBuilder::new("sqlite::memory:").build().await.unwrap();
        let ctx = RequestContext::new(handles.clone(), MetricScope::default());
        handles.shutdown().await;

        let report = fetch_insights(&ctx).await;
        assert_eq!(report.failed_sections(), 5);
        assert!(report.summary.error().is_some());
        assert!(report.insights.is_empty());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["alerts"]["status"], "failure");
    }

    #[test]
    fn test_feedback_digest() {
        assert_eq!(FeedbackDigest::from_records(&[]), FeedbackDigest::default());
    }
}
