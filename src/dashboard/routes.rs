//! Route analytics: per-route forecasts ranked by recommendation priority.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analytics::{AppAverages, Priority, RoutePrediction, predict_route_performance};
use crate::dashboard::RequestContext;
use crate::storage::{RouteSessionRow, StorageError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteAnalyticsReport {
    /// Most urgent first; ties broken by route name.
    pub routes: Vec<RoutePrediction>,
    pub app_averages: AppAverages,
    pub high_priority: usize,
    pub generated_at: DateTime<Utc>,
}

impl RouteAnalyticsReport {
    /// Predict every route present in `rows`.
    ///
    /// `rows` need not be grouped; each route's sessions are collected first.
    pub fn build(rows: &[RouteSessionRow], app_averages: AppAverages) -> Self {
        let mut routes: Vec<&str> = rows.iter().map(|r| r.route.as_str()).collect();
        routes.sort_unstable();
        routes.dedup();

        let mut predictions: Vec<RoutePrediction> = routes
            .into_iter()
            .map(|route| {
                let sessions: Vec<RouteSessionRow> =
                    rows.iter().filter(|r| r.route == route).cloned().collect();
                predict_route_performance(route, &sessions, &app_averages)
            })
            .collect();
        predictions.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.route.cmp(&b.route)));

        Self {
            high_priority: predictions
                .iter()
                .filter(|p| p.priority == Priority::High)
                .count(),
            routes: predictions,
            app_averages,
            generated_at: Utc::now(),
        }
    }

    pub fn route(&self, route: &str) -> Option<&RoutePrediction> {
        self.routes.iter().find(|p| p.route == route)
    }
}

/// Forecast every route seen within the context's scope.
pub async fn fetch_route_analytics(
    ctx: &RequestContext,
) -> Result<RouteAnalyticsReport, StorageError> {
    let app_averages = ctx.app_averages().await?;
    let rows = ctx
        .storage()
        .metric_reader
        .route_sessions(ctx.scope())
        .await?;
    tracing::debug!(rows = rows.len(), "Building route analytics");
    Ok(RouteAnalyticsReport::build(&rows, app_averages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::PredictionModel;
    use chrono::Duration;

    fn row(route: &str, session: &str, days_ago: i64, fps: f64) -> RouteSessionRow {
        RouteSessionRow {
            route: route.to_string(),
            session_id: session.to_string(),
            started_at: Utc::now() - Duration::days(days_ago),
            avg_fps: Some(fps),
            avg_memory: None,
            avg_cpu: None,
        }
    }

    #[test]
    fn test_routes_ranked_by_priority() {
        let rows = vec![
            row("/home", "s-1", 3, 60.0),
            row("/home", "s-2", 2, 60.0),
            row("/home", "s-3", 1, 60.0),
            row("/checkout", "s-1", 3, 30.0),
            row("/checkout", "s-2", 2, 24.0),
            row("/checkout", "s-3", 1, 18.0),
            row("/settings", "s-4", 1, 59.0),
        ];

        let report = RouteAnalyticsReport::build(&rows, AppAverages::default());
        assert_eq!(report.routes.len(), 3);
        assert_eq!(report.routes[0].route, "/checkout");
        assert_eq!(report.routes[0].priority, Priority::High);
        assert_eq!(report.high_priority, 1);

        let home = report.route("/home").unwrap();
        assert_eq!(home.model, PredictionModel::LinearRegression);
        assert_eq!(home.priority, Priority::Low);

        let settings = report.route("/settings").unwrap();
        assert_eq!(settings.model, PredictionModel::InsufficientData);
        assert_eq!(settings.session_count, 1);
    }

    #[test]
    fn test_empty_report() {
        let report = RouteAnalyticsReport::build(&[], AppAverages::default());
        assert!(report.routes.is_empty());
        assert_eq!(report.high_priority, 0);
    }
}
