//! Device and app-version drill-down view-models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analytics::{CpuInference, CpuInputs, PerformanceScore, infer_cpu_usage};
use crate::dashboard::RequestContext;
use crate::dashboard::summary::fetch_performance_score;
use crate::storage::{
    MetricAggregate, MetricScope, MetricType, Session, SessionQuery, SortOrder, StorageError,
};

const PROFILE_SESSION_LIMIT: u32 = 500;

/// CPU usage for a device: measured when samples exist, inferred otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CpuEstimate {
    Measured { cpu_percent: f64 },
    Inferred(CpuInference),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceProfile {
    pub device_id: String,
    pub platform: String,
    pub device_type: Option<String>,
    /// Versions seen on this device, most recent first.
    pub app_versions: Vec<String>,
    /// Sessions inside the requested window.
    pub session_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub metrics: Vec<MetricAggregate>,
    pub score: PerformanceScore,
    pub cpu: Option<CpuEstimate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionDetails {
    pub app_version: String,
    /// Sessions and devices inside the requested window.
    pub session_count: i64,
    pub device_count: i64,
    pub platforms: Vec<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub metrics: Vec<MetricAggregate>,
    pub score: PerformanceScore,
}

/// Scope for a device drill-down, keeping the caller's time bounds.
pub fn device_scope(base: &MetricScope, device_id: &str) -> MetricScope {
    MetricScope {
        device_id: Some(device_id.to_string()),
        ..base.clone()
    }
}

/// Scope for a version drill-down, keeping the caller's time bounds.
pub fn version_scope(base: &MetricScope, app_version: &str) -> MetricScope {
    MetricScope {
        app_version: Some(app_version.to_string()),
        ..base.clone()
    }
}

fn unique_in_order<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !out.iter().any(|v| v == value) {
            out.push(value.to_string());
        }
    }
    out
}

/// Sessions newest first, and the `(first, last)` start times.
fn span(sessions: &[Session]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let last = sessions.first()?.started_at;
    let first = sessions.last()?.started_at;
    Some((first, last))
}

/// Estimate CPU from device aggregates.
pub fn estimate_cpu(metrics: &[MetricAggregate], device_type: Option<&str>) -> Option<CpuEstimate> {
    let avg = |metric_type: MetricType| {
        metrics
            .iter()
            .find(|a| a.metric_type == metric_type)
            .map(|a| a.avg)
    };
    if let Some(cpu_percent) = avg(MetricType::CpuUsage) {
        return Some(CpuEstimate::Measured { cpu_percent });
    }
    let (fps, memory_mb) = (avg(MetricType::Fps)?, avg(MetricType::MemoryUsage)?);
    Some(CpuEstimate::Inferred(infer_cpu_usage(&CpuInputs {
        fps,
        memory_mb,
        load_time_ms: avg(MetricType::LoadTime).unwrap_or_default(),
        device_type: device_type.map(str::to_string),
    })))
}

/// Profile of one device. `ctx` must be scoped to the device (see [`device_scope`]).
///
/// # Errors
/// `StorageError::NotFound` if the device has no sessions.
pub async fn fetch_device_profile(
    ctx: &RequestContext,
    device_id: &str,
) -> Result<DeviceProfile, StorageError> {
    let sessions = ctx
        .storage()
        .session_reader
        .query(SessionQuery {
            device_id: Some(device_id.to_string()),
            limit: Some(PROFILE_SESSION_LIMIT),
            order: Some(SortOrder::Desc),
            ..Default::default()
        })
        .await?;
    let (Some(latest), Some((first_seen, last_seen))) = (sessions.first(), span(&sessions)) else {
        return Err(StorageError::NotFound(format!("device '{device_id}'")));
    };

    let counts = ctx.counts().await?;
    let metrics = ctx.aggregates().await?.to_vec();
    let device_type = sessions.iter().find_map(|s| s.device_type.clone());
    let cpu = estimate_cpu(&metrics, device_type.as_deref());
    let score = fetch_performance_score(ctx).await?;

    Ok(DeviceProfile {
        device_id: device_id.to_string(),
        platform: latest.platform.clone(),
        device_type,
        app_versions: unique_in_order(sessions.iter().map(|s| s.app_version.as_str())),
        session_count: counts.sessions,
        first_seen,
        last_seen,
        metrics,
        score,
        cpu,
    })
}

/// Details for one app version. `ctx` must be scoped to the version (see [`version_scope`]).
///
/// # Errors
/// `StorageError::NotFound` if no session ran the version.
pub async fn fetch_version_details(
    ctx: &RequestContext,
    app_version: &str,
) -> Result<VersionDetails, StorageError> {
    let sessions = ctx
        .storage()
        .session_reader
        .query(SessionQuery {
            app_version: Some(app_version.to_string()),
            limit: Some(PROFILE_SESSION_LIMIT),
            order: Some(SortOrder::Desc),
            ..Default::default()
        })
        .await?;
    let Some((first_seen, last_seen)) = span(&sessions) else {
        return Err(StorageError::NotFound(format!("app version '{app_version}'")));
    };

    let mut platforms = unique_in_order(sessions.iter().map(|s| s.platform.as_str()));
    platforms.sort();
    let counts = ctx.counts().await?;

    Ok(VersionDetails {
        app_version: app_version.to_string(),
        session_count: counts.sessions,
        device_count: counts.devices,
        platforms,
        first_seen,
        last_seen,
        metrics: ctx.aggregates().await?.to_vec(),
        score: fetch_performance_score(ctx).await?,
    })
}
