//! Route-performance prediction.
//!
//! Each session on a route gets a composite score (mean of the fps, memory
//! and CPU sub-scores it has data for). An ordinary least-squares line of
//! score against elapsed days since the route's first session is projected
//! 1, 7 and 30 days past the last observation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::analytics::health::{ScoredMetric, calculate_metric_score};
use crate::storage::RouteSessionRow;

/// Forecast horizons in days.
pub const HORIZONS: [u32; 3] = [1, 7, 30];

/// Minimum scored sessions for a regression.
pub const MIN_SESSIONS: usize = 3;

const DEFAULT_SCORE: f64 = 50.0;
const DEFAULT_INTERVAL: (f64, f64) = (30.0, 70.0);
const DEFAULT_STANDARD_ERROR: f64 = 20.0;
const Z_95: f64 = 1.96;
const TREND_SLOPE: f64 = 0.5;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Fleet-wide averages the sub-scores are normalized against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AppAverages {
    pub fps: Option<f64>,
    pub memory: Option<f64>,
    pub cpu: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PredictionModel {
    LinearRegression,
    InsufficientData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Degrading,
}

impl Trend {
    pub fn from_slope(slope: f64) -> Self {
        if slope > TREND_SLOPE {
            Self::Improving
        } else if slope < -TREND_SLOPE {
            Self::Degrading
        } else {
            Self::Stable
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Ordered from least to most urgent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Least-squares fit of `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination, clamped to [0, 1].
    pub r_squared: f64,
    /// `sqrt(RSS / (n - 2))`, or 20 when `n <= 2`.
    pub standard_error: f64,
    pub n: usize,
}

impl Regression {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Fit an ordinary least-squares line. `None` for an empty input.
pub fn linear_regression(points: &[(f64, f64)]) -> Option<Regression> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (sxx, sxy) = points.iter().fold((0.0, 0.0), |(sxx, sxy), (x, y)| {
        let dx = x - mean_x;
        (sxx + dx * dx, sxy + dx * (y - mean_y))
    });
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    let intercept = mean_y - slope * mean_x;

    let (rss, tss) = points.iter().fold((0.0, 0.0), |(rss, tss), (x, y)| {
        let residual = y - (slope * x + intercept);
        let deviation = y - mean_y;
        (rss + residual * residual, tss + deviation * deviation)
    });
    let r_squared = if tss > 0.0 { (1.0 - rss / tss).clamp(0.0, 1.0) } else { 0.0 };
    let standard_error = if points.len() > 2 {
        (rss / (n - 2.0)).sqrt()
    } else {
        DEFAULT_STANDARD_ERROR
    };

    Some(Regression {
        slope,
        intercept,
        r_squared,
        standard_error,
        n: points.len(),
    })
}

/// Predicted score and 95% interval at one horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub horizon_days: u32,
    pub predicted_score: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Forecast for one route pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePrediction {
    pub route: String,
    pub model: PredictionModel,
    pub session_count: usize,
    /// Most recent observed composite score.
    pub current_score: Option<f64>,
    pub forecasts: Vec<Forecast>,
    pub slope: f64,
    pub r_squared: f64,
    pub trend: Trend,
    pub risk_level: RiskLevel,
    pub priority: Priority,
    /// 0-100 estimate of how far the forecast can be trusted.
    pub accuracy: f64,
}

impl RoutePrediction {
    /// Forecast at `horizon_days`, if one was produced.
    pub fn forecast(&self, horizon_days: u32) -> Option<&Forecast> {
        self.forecasts.iter().find(|f| f.horizon_days == horizon_days)
    }
}

/// Composite 0-100 score for one session, or `None` without any data.
pub fn composite_score(session: &RouteSessionRow, app: &AppAverages) -> Option<f64> {
    let fps = session.avg_fps.map(|fps| clamp_score(fps / 60.0 * 100.0));
    let memory = session.avg_memory.map(|memory| match app.memory {
        Some(app_avg) if app_avg > 0.0 => clamp_score(100.0 * (2.0 - memory / app_avg)),
        _ => f64::from(calculate_metric_score(ScoredMetric::Memory, memory)),
    });
    let cpu = session.avg_cpu.map(|cpu| clamp_score(100.0 - cpu));

    let parts: Vec<f64> = [fps, memory, cpu].into_iter().flatten().collect();
    (!parts.is_empty()).then(|| parts.iter().sum::<f64>() / parts.len() as f64)
}

/// Risk from the route's mean composite score.
pub fn assess_route_risk(scores: &[f64]) -> RiskLevel {
    if scores.is_empty() {
        return RiskLevel::Medium;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    if mean < 50.0 {
        RiskLevel::High
    } else if mean < 70.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Recommendation priority for a predicted score.
pub fn recommendation_priority(predicted: f64, risk: RiskLevel, trend: Trend) -> Priority {
    if predicted < 50.0 || risk == RiskLevel::High {
        Priority::High
    } else if predicted < 70.0 || trend == Trend::Degrading {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// Equal blend of value consistency, sample adequacy (cap 20 sessions)
/// and span adequacy (cap 30 days).
pub fn forecast_accuracy(scores: &[f64], span_days: f64) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    let consistency = 100.0 / (1.0 + variance.sqrt() / 10.0);
    let samples = n.min(20.0) / 20.0 * 100.0;
    let span = span_days.clamp(0.0, 30.0) / 30.0 * 100.0;
    ((consistency + samples + span) / 3.0).clamp(0.0, 100.0)
}

/// Forecast a route's composite performance score.
///
/// With fewer than [`MIN_SESSIONS`] scored sessions the result is the
/// fixed `insufficient_data` default: score 50, interval [30, 70].
pub fn predict_route_performance(
    route: &str,
    sessions: &[RouteSessionRow],
    app: &AppAverages,
) -> RoutePrediction {
    let mut scored: Vec<(DateTime<Utc>, f64)> = sessions
        .iter()
        .filter_map(|s| composite_score(s, app).map(|score| (s.started_at, score)))
        .collect();
    scored.sort_by_key(|(at, _)| *at);

    let scores: Vec<f64> = scored.iter().map(|(_, score)| *score).collect();
    let risk_level = assess_route_risk(&scores);
    let current_score = scores.last().copied();

    let first = scored.first().map(|(at, _)| *at);
    let points: Vec<(f64, f64)> = scored
        .iter()
        .map(|(at, score)| {
            let elapsed = first.map_or(0.0, |first| {
                (*at - first).num_milliseconds() as f64 / 1_000.0 / SECONDS_PER_DAY
            });
            (elapsed, *score)
        })
        .collect();
    let span_days = points.last().map_or(0.0, |(x, _)| *x);

    let fit = if scored.len() >= MIN_SESSIONS {
        linear_regression(&points)
    } else {
        None
    };

    let Some(fit) = fit else {
        let forecasts = HORIZONS
            .iter()
            .map(|&horizon_days| Forecast {
                horizon_days,
                predicted_score: DEFAULT_SCORE,
                lower: DEFAULT_INTERVAL.0,
                upper: DEFAULT_INTERVAL.1,
            })
            .collect();
        return RoutePrediction {
            route: route.to_string(),
            model: PredictionModel::InsufficientData,
            session_count: scored.len(),
            current_score,
            forecasts,
            slope: 0.0,
            r_squared: 0.0,
            trend: Trend::Stable,
            risk_level,
            priority: recommendation_priority(DEFAULT_SCORE, risk_level, Trend::Stable),
            accuracy: forecast_accuracy(&scores, span_days),
        };
    };

    let max_x = points.iter().map(|(x, _)| *x).fold(0.0, f64::max);
    let margin = Z_95 * fit.standard_error;
    let forecasts: Vec<Forecast> = HORIZONS
        .iter()
        .map(|&horizon_days| {
            let predicted = fit.predict(max_x + f64::from(horizon_days));
            Forecast {
                horizon_days,
                predicted_score: clamp_score(predicted),
                lower: clamp_score(predicted - margin),
                upper: clamp_score(predicted + margin),
            }
        })
        .collect();

    let trend = Trend::from_slope(fit.slope);
    let headline = forecasts
        .iter()
        .find(|f| f.horizon_days == 7)
        .map_or(DEFAULT_SCORE, |f| f.predicted_score);

    tracing::debug!(route, sessions = scored.len(), slope = fit.slope, "Route forecast computed");

    RoutePrediction {
        route: route.to_string(),
        model: PredictionModel::LinearRegression,
        session_count: scored.len(),
        current_score,
        forecasts,
        slope: fit.slope,
        r_squared: fit.r_squared,
        trend,
        risk_level,
        priority: recommendation_priority(headline, risk_level, trend),
        accuracy: forecast_accuracy(&scores, span_days),
    }
}

fn clamp_score(value: f64) -> f64 {
    if value.is_finite() { value.clamp(0.0, 100.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(day: i64, fps: f64) -> RouteSessionRow {
        let base = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        RouteSessionRow {
            route: "/home".to_string(),
            session_id: format!("s-{day}"),
            started_at: base + Duration::days(day),
            avg_fps: Some(fps),
            avg_memory: None,
            avg_cpu: None,
        }
    }

    #[test]
    fn test_regression_on_exact_line() {
        let points: Vec<(f64, f64)> = (0..5).map(|i| (f64::from(i), 2.0 * f64::from(i) + 1.0)).collect();
        let fit = linear_regression(&points).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-9);
        assert!((fit.intercept - 1.0).abs() < 1e-9);
        assert!((fit.r_squared - 1.0).abs() < 1e-9);
        assert!(fit.standard_error.abs() < 1e-9);
    }

    #[test]
    fn test_regression_small_sample_uses_default_error() {
        let fit = linear_regression(&[(0.0, 10.0), (1.0, 20.0)]).unwrap();
        assert_eq!(fit.standard_error, 20.0);
        assert!(linear_regression(&[]).is_none());
    }

    #[test]
    fn test_increasing_series_predicts_higher() {
        // composite = fps / 60 * 100, rising from 50 to 65 over ten days
        let sessions: Vec<RouteSessionRow> = (0..10).map(|d| session(d, 30.0 + d as f64)).collect();
        let prediction = predict_route_performance("/home", &sessions, &AppAverages::default());

        assert_eq!(prediction.model, PredictionModel::LinearRegression);
        assert!(prediction.slope > 0.0);
        assert_eq!(prediction.trend, Trend::Improving);

        let last = prediction.current_score.unwrap();
        let week = prediction.forecast(7).unwrap();
        assert!(week.predicted_score > last);
        assert!(week.lower <= week.predicted_score && week.predicted_score <= week.upper);
        assert_eq!(prediction.forecasts.len(), 3);
    }

    #[test]
    fn test_insufficient_data_default() {
        for count in 0..3 {
            let sessions: Vec<RouteSessionRow> = (0..count).map(|d| session(d, 58.0)).collect();
            let prediction = predict_route_performance("/cart", &sessions, &AppAverages::default());
            assert_eq!(prediction.model, PredictionModel::InsufficientData);
            for forecast in &prediction.forecasts {
                assert_eq!(
                    (forecast.predicted_score, [forecast.lower, forecast.upper]),
                    (50.0, [30.0, 70.0])
                );
            }
        }
    }

    #[test]
    fn test_sessions_without_data_are_ignored() {
        let mut sessions: Vec<RouteSessionRow> = (0..2).map(|d| session(d, 50.0)).collect();
        let mut empty = session(5, 0.0);
        empty.avg_fps = None;
        sessions.push(empty);
        let prediction = predict_route_performance("/x", &sessions, &AppAverages::default());
        assert_eq!(prediction.session_count, 2);
        assert_eq!(prediction.model, PredictionModel::InsufficientData);
    }

    #[test]
    fn test_forecasts_are_clamped() {
        let sessions: Vec<RouteSessionRow> = (0..5).map(|d| session(d, 60.0 - 12.0 * d as f64)).collect();
        let prediction = predict_route_performance("/slow", &sessions, &AppAverages::default());
        assert_eq!(prediction.trend, Trend::Degrading);
        let month = prediction.forecast(30).unwrap();
        assert_eq!(month.predicted_score, 0.0);
        assert!(month.lower >= 0.0 && month.upper <= 100.0);
        assert_eq!(prediction.priority, Priority::High);
    }

    #[test]
    fn test_composite_score_normalizes_memory() {
        let app = AppAverages {
            fps: Some(55.0),
            memory: Some(400.0),
            cpu: Some(30.0),
        };
        let row = RouteSessionRow {
            route: "/home".to_string(),
            session_id: "s-1".to_string(),
            started_at: Utc::now(),
            avg_fps: Some(60.0),
            avg_memory: Some(400.0),
            avg_cpu: Some(40.0),
        };
        // (100 + 100 + 60) / 3
        let score = composite_score(&row, &app).unwrap();
        assert!((score - 260.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_priority_rules() {
        assert_eq!(recommendation_priority(45.0, RiskLevel::Low, Trend::Stable), Priority::High);
        assert_eq!(recommendation_priority(80.0, RiskLevel::High, Trend::Stable), Priority::High);
        assert_eq!(recommendation_priority(65.0, RiskLevel::Low, Trend::Stable), Priority::Medium);
        assert_eq!(recommendation_priority(90.0, RiskLevel::Low, Trend::Degrading), Priority::Medium);
        assert_eq!(recommendation_priority(90.0, RiskLevel::Low, Trend::Improving), Priority::Low);
    }

    #[test]
    fn test_forecast_accuracy_components() {
        let flat = vec![80.0; 20];
        assert!((forecast_accuracy(&flat, 30.0) - 100.0).abs() < 1e-9);
        assert_eq!(forecast_accuracy(&[], 10.0), 0.0);

        let sparse = forecast_accuracy(&[80.0, 80.0], 3.0);
        // consistency 100, samples 10, span 10
        assert!((sparse - 40.0).abs() < 1e-9);
    }
}
