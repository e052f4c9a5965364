//! Numeric utilities over metric data.
//!
//! - [`health`]: threshold-band scoring and the weighted health score
//! - [`cpu`]: heuristic CPU-usage inference
//! - [`prediction`]: least-squares route-performance forecasts
//!
//! Everything here is pure and deterministic.

pub mod cpu;
pub mod health;
pub mod prediction;

pub use cpu::{CpuGrade, CpuInference, CpuInputs, CpuValidation, DeviceClass, infer_cpu_usage};
pub use health::{
    Grade, MetricAverages, PerformanceScore, ScoredMetric, calculate_health_score,
    calculate_metric_score, score_breakdown,
};
pub use prediction::{
    AppAverages, Forecast, PredictionModel, Priority, Regression, RiskLevel, RoutePrediction,
    Trend, assess_route_risk, linear_regression, predict_route_performance,
};
