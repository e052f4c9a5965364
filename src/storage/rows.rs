//! Row decoding between SQLite columns and storage records.
//!
//! Timestamps are stored as Unix milliseconds; enums as their lowercase
//! string form; JSON columns as text.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::storage::StorageError;
use crate::storage::types::{
    AlertConfig, AlertInstance, AlertSeverity, AlertStatus, Feedback, FeedbackCategory,
    MetricSample, MetricType, Session,
};

/// Column list matching [`session_from_row`].
pub(crate) const SESSION_COLUMNS: &str =
    "id, device_id, app_version, platform, device_type, started_at, ended_at";

/// Column list matching [`metric_from_row`].
pub(crate) const METRIC_COLUMNS: &str = "id, session_id, metric_type, value, unit, ts, context";

/// Column list matching [`alert_from_row`].
pub(crate) const ALERT_COLUMNS: &str = "id, config_id, severity, metric_value, threshold, message, \
     status, created_at, acknowledged_at, acknowledged_by, resolved_at, resolved_by";

/// Column list matching [`alert_config_from_row`].
pub(crate) const ALERT_CONFIG_COLUMNS: &str = "id, name, metric_type, warning_threshold, \
     critical_threshold, is_active, notification_channels, created_at, updated_at";

/// Column list matching [`feedback_from_row`].
pub(crate) const FEEDBACK_COLUMNS: &str = "id, session_id, category, rating, message, created_at";

/// Convert a UTC timestamp to stored milliseconds.
#[inline]
pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Convert stored milliseconds to a UTC timestamp.
#[inline]
pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}

fn parse_enum<T: FromStr>(column: &str, raw: &str) -> Result<T, StorageError> {
    T::from_str(raw)
        .map_err(|_| StorageError::InvalidData(format!("unknown {column} value '{raw}'")))
}

pub(crate) fn session_from_row(row: &SqliteRow) -> Result<Session, StorageError> {
    Ok(Session {
        id: row.try_get("id")?,
        device_id: row.try_get("device_id")?,
        app_version: row.try_get("app_version")?,
        platform: row.try_get("platform")?,
        device_type: row.try_get("device_type")?,
        started_at: from_millis(row.try_get("started_at")?),
        ended_at: row
            .try_get::<Option<i64>, _>("ended_at")?
            .map(from_millis),
    })
}

pub(crate) fn metric_from_row(row: &SqliteRow) -> Result<MetricSample, StorageError> {
    let metric_type: String = row.try_get("metric_type")?;
    let context: String = row.try_get("context")?;
    Ok(MetricSample {
        id: Some(row.try_get("id")?),
        session_id: row.try_get("session_id")?,
        metric_type: parse_enum::<MetricType>("metric_type", &metric_type)?,
        value: row.try_get("value")?,
        unit: row.try_get("unit")?,
        timestamp: from_millis(row.try_get("ts")?),
        context: serde_json::from_str(&context)?,
    })
}

pub(crate) fn alert_from_row(row: &SqliteRow) -> Result<AlertInstance, StorageError> {
    let severity: String = row.try_get("severity")?;
    let status: String = row.try_get("status")?;
    Ok(AlertInstance {
        id: row.try_get("id")?,
        config_id: row.try_get("config_id")?,
        severity: parse_enum::<AlertSeverity>("severity", &severity)?,
        metric_value: row.try_get("metric_value")?,
        threshold: row.try_get("threshold")?,
        message: row.try_get("message")?,
        status: parse_enum::<AlertStatus>("status", &status)?,
        created_at: from_millis(row.try_get("created_at")?),
        acknowledged_at: row
            .try_get::<Option<i64>, _>("acknowledged_at")?
            .map(from_millis),
        acknowledged_by: row.try_get("acknowledged_by")?,
        resolved_at: row
            .try_get::<Option<i64>, _>("resolved_at")?
            .map(from_millis),
        resolved_by: row.try_get("resolved_by")?,
    })
}

pub(crate) fn alert_config_from_row(row: &SqliteRow) -> Result<AlertConfig, StorageError> {
    let metric_type: String = row.try_get("metric_type")?;
    let channels: String = row.try_get("notification_channels")?;
    Ok(AlertConfig {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        metric_type: parse_enum::<MetricType>("metric_type", &metric_type)?,
        warning_threshold: row.try_get("warning_threshold")?,
        critical_threshold: row.try_get("critical_threshold")?,
        is_active: row.try_get("is_active")?,
        notification_channels: serde_json::from_str(&channels)?,
        created_at: from_millis(row.try_get("created_at")?),
        updated_at: from_millis(row.try_get("updated_at")?),
    })
}

pub(crate) fn feedback_from_row(row: &SqliteRow) -> Result<Feedback, StorageError> {
    let category: String = row.try_get("category")?;
    let rating: Option<i64> = row.try_get("rating")?;
    Ok(Feedback {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        category: parse_enum::<FeedbackCategory>("category", &category)?,
        rating: rating.map(|r| r.clamp(0, u8::MAX as i64) as u8),
        message: row.try_get("message")?,
        created_at: from_millis(row.try_get("created_at")?),
    })
}
