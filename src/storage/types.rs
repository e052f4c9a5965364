//! Core data types for the storage layer.
//!
//! This module defines the records persisted by the store:
//!
//! - [`Session`]: One run of the monitored application on one device
//! - [`MetricSample`]: Immutable typed observation belonging to a session
//! - [`AlertConfig`]: User-defined threshold rule for a metric type
//! - [`AlertInstance`]: A triggered violation with a status lifecycle
//! - [`Feedback`]: Free-form feedback records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Metric type tag carried by every [`MetricSample`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum MetricType {
    /// Rendered frames per second.
    Fps,
    /// Resident memory in megabytes.
    MemoryUsage,
    /// CPU usage percentage.
    CpuUsage,
    /// Screen or page load time in milliseconds.
    LoadTime,
    /// Navigation transition time in milliseconds.
    NavigationTime,
    /// Network round-trip latency in milliseconds.
    NetworkLatency,
}

impl MetricType {
    /// All known metric types.
    pub const ALL: [MetricType; 6] = [
        MetricType::Fps,
        MetricType::MemoryUsage,
        MetricType::CpuUsage,
        MetricType::LoadTime,
        MetricType::NavigationTime,
        MetricType::NetworkLatency,
    ];

    /// Unit used when a sample does not carry one.
    pub fn default_unit(&self) -> &'static str {
        match self {
            Self::Fps => "fps",
            Self::MemoryUsage => "MB",
            Self::CpuUsage => "%",
            Self::LoadTime | Self::NavigationTime | Self::NetworkLatency => "ms",
        }
    }

    /// Whether smaller values indicate better performance.
    pub fn lower_is_better(&self) -> bool {
        !matches!(self, Self::Fps)
    }
}

/// A session record stored in the `sessions` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier assigned by the monitored application.
    pub id: String,
    /// Device the session ran on.
    pub device_id: String,
    /// Application version string (e.g., "2.4.1").
    pub app_version: String,
    /// Platform label (e.g., "ios", "android", "web").
    pub platform: String,
    /// Optional device class label (e.g., "low_end", "flagship").
    #[serde(default)]
    pub device_type: Option<String>,
    /// Session start (UTC).
    pub started_at: DateTime<Utc>,
    /// Session end (UTC), if the session has finished.
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

/// A metric sample stored in the `metrics` table.
///
/// Samples are produced by the monitored application and are read-only
/// for the dashboard. `context` is free-form JSON; the `route` key, when
/// present, names the screen or page the sample was taken on.
///
/// # Example
///
/// ```
/// use pulseboard::{MetricSample, MetricType};
/// use chrono::Utc;
/// use serde_json::json;
///
/// let sample = MetricSample {
///     id: None,
///     session_id: "s-1".to_string(),
///     metric_type: MetricType::Fps,
///     value: 58.0,
///     unit: "fps".to_string(),
///     timestamp: Utc::now(),
///     context: json!({"route": "/home"}),
/// };
/// assert_eq!(sample.route(), Some("/home"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Auto-generated sample identifier.
    #[serde(default)]
    pub id: Option<i64>,
    /// Owning session.
    pub session_id: String,
    /// Metric type tag.
    pub metric_type: MetricType,
    /// Observed value.
    pub value: f64,
    /// Unit of `value`.
    pub unit: String,
    /// Observation time (UTC).
    pub timestamp: DateTime<Utc>,
    /// Free-form context snapshot.
    #[serde(default = "empty_context")]
    pub context: serde_json::Value,
}

fn empty_context() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl MetricSample {
    /// Create a sample with the metric's default unit and empty context.
    pub fn new(
        session_id: impl Into<String>,
        metric_type: MetricType,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            session_id: session_id.into(),
            metric_type,
            value,
            unit: metric_type.default_unit().to_string(),
            timestamp,
            context: empty_context(),
        }
    }

    /// Attach a route to the sample context.
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        if let serde_json::Value::Object(ref mut map) = self.context {
            map.insert("route".to_string(), serde_json::Value::String(route.into()));
        }
        self
    }

    /// Route recorded in the sample context, if any.
    pub fn route(&self) -> Option<&str> {
        self.context.get("route").and_then(|v| v.as_str())
    }
}

/// Alert severity classification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AlertSeverity {
    /// Value crossed the warning threshold.
    Warning,
    /// Value crossed the critical threshold.
    Critical,
}

/// Alert instance status.
///
/// Transitions are monotonic: `active → acknowledged → resolved`, with
/// `active → resolved` also allowed. Nothing moves backward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AlertStatus {
    /// Newly triggered.
    Active,
    /// Seen by an operator.
    Acknowledged,
    /// Closed.
    Resolved,
}

impl AlertStatus {
    /// Whether moving from `self` to `next` is a forward transition.
    pub fn can_transition_to(self, next: AlertStatus) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::Acknowledged)
                | (Self::Active, Self::Resolved)
                | (Self::Acknowledged, Self::Resolved)
        )
    }
}

/// An alert configuration stored in the `alert_configs` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Configuration identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Metric the rule watches.
    pub metric_type: MetricType,
    /// Value at which a warning alert is raised.
    pub warning_threshold: f64,
    /// Value at which a critical alert is raised.
    pub critical_threshold: f64,
    /// Whether the rule is evaluated.
    pub is_active: bool,
    /// Notification channel names (e.g., "email", "slack").
    #[serde(default)]
    pub notification_channels: Vec<String>,
    /// Creation timestamp (UTC).
    pub created_at: DateTime<Utc>,
    /// Last update timestamp (UTC).
    pub updated_at: DateTime<Utc>,
}

/// An alert instance stored in the `alerts` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertInstance {
    /// Alert identifier.
    pub id: String,
    /// Configuration that produced the alert.
    pub config_id: String,
    /// Severity at trigger time.
    pub severity: AlertSeverity,
    /// Observed metric value.
    pub metric_value: f64,
    /// Threshold that was violated.
    pub threshold: f64,
    /// Human-readable description.
    pub message: String,
    /// Lifecycle status.
    pub status: AlertStatus,
    /// Trigger time (UTC).
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub acknowledged_by: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_by: Option<String>,
}

/// Feedback category.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FeedbackCategory {
    Bug,
    Performance,
    Feature,
    Other,
}

/// A feedback record stored in the `feedback` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    /// Feedback identifier.
    pub id: String,
    /// Session the feedback refers to, if any.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Category tag.
    pub category: FeedbackCategory,
    /// Optional 1-5 rating.
    #[serde(default)]
    pub rating: Option<u8>,
    /// Feedback text.
    pub message: String,
    /// Submission time (UTC).
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    // =========================================================================
    // MetricType tests
    // =========================================================================

    #[test]
    fn test_metric_type_from_str_valid() {
        assert_eq!(MetricType::from_str("fps").unwrap(), MetricType::Fps);
        assert_eq!(
            MetricType::from_str("memory_usage").unwrap(),
            MetricType::MemoryUsage
        );
        assert_eq!(
            MetricType::from_str("LOAD_TIME").unwrap(),
            MetricType::LoadTime
        );
    }

    #[test]
    fn test_metric_type_from_str_invalid() {
        assert_eq!(
            MetricType::from_str("battery"),
            Err(strum::ParseError::VariantNotFound)
        );
    }

    #[test]
    fn test_metric_type_direction() {
        assert!(!MetricType::Fps.lower_is_better());
        assert!(MetricType::MemoryUsage.lower_is_better());
        assert!(MetricType::LoadTime.lower_is_better());
    }

    #[test]
    fn test_metric_sample_route() {
        let sample = MetricSample::new("s-1", MetricType::Fps, 60.0, Utc::now());
        assert_eq!(sample.route(), None);
        assert_eq!(sample.unit, "fps");

        let sample = sample.with_route("/checkout");
        assert_eq!(sample.route(), Some("/checkout"));
    }

    // =========================================================================
    // AlertStatus tests
    // =========================================================================

    #[test]
    fn test_alert_status_forward_transitions() {
        assert!(AlertStatus::Active.can_transition_to(AlertStatus::Acknowledged));
        assert!(AlertStatus::Active.can_transition_to(AlertStatus::Resolved));
        assert!(AlertStatus::Acknowledged.can_transition_to(AlertStatus::Resolved));
    }

    #[test]
    fn test_alert_status_never_moves_backward() {
        assert!(!AlertStatus::Resolved.can_transition_to(AlertStatus::Acknowledged));
        assert!(!AlertStatus::Resolved.can_transition_to(AlertStatus::Active));
        assert!(!AlertStatus::Acknowledged.can_transition_to(AlertStatus::Active));
        assert!(!AlertStatus::Active.can_transition_to(AlertStatus::Active));
    }

    #[test]
    fn test_alert_status_as_str() {
        assert_eq!(AlertStatus::Active.as_ref(), "active");
        assert_eq!(AlertStatus::Acknowledged.as_ref(), "acknowledged");
        assert_eq!(AlertStatus::Resolved.as_ref(), "resolved");
    }
}
