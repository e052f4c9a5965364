//! User-facing storage facades.
//!
//! Provides ergonomic APIs for storage operations:
//! - `StorageWriter`: Session and metric ingestion (publishes change notifications)
//! - `MetricReader`: Query metric samples and SQL-side aggregates
//! - `SessionReader`: Query sessions
//! - `StorageAdmin`: Readiness checks

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use strum_macros::{AsRefStr, EnumString};

use crate::realtime::{ChangeKind, Table};
use crate::storage::StorageError;
use crate::storage::db::SqlitePool;
use crate::storage::feed::ChangePublisher;
use crate::storage::rows::{
    METRIC_COLUMNS, SESSION_COLUMNS, from_millis, metric_from_row, session_from_row, to_millis,
};
use crate::storage::types::{MetricSample, MetricType, Session};

// =============================================================================
// Constants
// =============================================================================

const DEFAULT_LIMIT: u32 = 1_000;
const MAX_LIMIT: u32 = 10_000;

// =============================================================================
// Query Types
// =============================================================================

/// Sort order for queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Query for metric samples.
#[derive(Debug, Clone, Default)]
pub struct MetricQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub session_id: Option<String>,
    pub device_id: Option<String>,
    pub app_version: Option<String>,
    /// Restrict to these metric types (empty = all).
    pub metric_types: Vec<MetricType>,
    pub limit: Option<u32>,
    pub order: Option<SortOrder>,
}

/// Scope shared by the aggregate queries.
#[derive(Debug, Clone, Default)]
pub struct MetricScope {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub device_id: Option<String>,
    pub app_version: Option<String>,
}

impl MetricScope {
    /// Scope covering `[start, now]`.
    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            ..Default::default()
        }
    }

    /// Scope restricted to one device.
    pub fn device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            ..Default::default()
        }
    }

    /// Scope restricted to one app version.
    pub fn version(app_version: impl Into<String>) -> Self {
        Self {
            app_version: Some(app_version.into()),
            ..Default::default()
        }
    }

    /// Append `WHERE` clauses. Unset bounds leave the window open.
    fn push_filters(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        qb.push(" WHERE 1 = 1");
        if let Some(start) = self.start {
            qb.push(" AND m.ts >= ").push_bind(to_millis(start));
        }
        if let Some(end) = self.end {
            qb.push(" AND m.ts <= ").push_bind(to_millis(end));
        }
        if let Some(device_id) = &self.device_id {
            qb.push(" AND s.device_id = ").push_bind(device_id.clone());
        }
        if let Some(version) = &self.app_version {
            qb.push(" AND s.app_version = ").push_bind(version.clone());
        }
    }
}

/// Query for sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub device_id: Option<String>,
    pub app_version: Option<String>,
    pub limit: Option<u32>,
    pub order: Option<SortOrder>,
}

// =============================================================================
// Aggregate Rows
// =============================================================================

/// Per-metric-type aggregate computed in SQL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricAggregate {
    pub metric_type: MetricType,
    pub count: i64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// Per-day, per-metric-type aggregate computed in SQL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAggregate {
    pub day: NaiveDate,
    pub metric_type: MetricType,
    pub count: i64,
    pub avg: f64,
}

/// Per-route, per-session averages used by route analytics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteSessionRow {
    pub route: String,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub avg_fps: Option<f64>,
    pub avg_memory: Option<f64>,
    pub avg_cpu: Option<f64>,
}

// =============================================================================
// Writer
// =============================================================================

/// Ingestion facade for sessions and metric samples.
///
/// Every successful write publishes a change notification.
#[derive(Clone)]
pub struct StorageWriter {
    pool: SqlitePool,
    publisher: ChangePublisher,
}

impl std::fmt::Debug for StorageWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageWriter").finish_non_exhaustive()
    }
}

impl StorageWriter {
    pub(crate) fn new(pool: SqlitePool, publisher: ChangePublisher) -> Self {
        Self { pool, publisher }
    }

    /// Insert a session, or update its end time if it already exists.
    pub async fn upsert_session(&self, session: &Session) -> Result<(), StorageError> {
        let mut conn = self.pool.inner().acquire().await?;
        let kind = upsert_session_tx(&mut conn, session).await?;
        self.publisher.publish(Table::Sessions, kind, session);
        Ok(())
    }

    /// Insert one metric sample and return its identifier.
    pub async fn insert_metric(&self, sample: &MetricSample) -> Result<i64, StorageError> {
        let ids = self.insert_metrics(std::slice::from_ref(sample)).await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| StorageError::Internal("insert returned no id".to_string()))
    }

    /// Insert a batch of metric samples in one transaction.
    ///
    /// Notifications are published only after the transaction commits.
    pub async fn insert_metrics(&self, samples: &[MetricSample]) -> Result<Vec<i64>, StorageError> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.inner().begin().await?;
        let mut stored = Vec::with_capacity(samples.len());

        for sample in samples {
            let mut sample = sample.clone();
            sample.id = Some(insert_metric_tx(&mut tx, &sample).await?);
            stored.push(sample);
        }

        tx.commit().await?;

        tracing::debug!(count = stored.len(), "Inserted metric samples");
        Ok(stored
            .into_iter()
            .map(|sample| {
                self.publisher.publish(Table::Metrics, ChangeKind::Insert, &sample);
                sample.id.unwrap_or_default()
            })
            .collect())
    }
}

/// Upsert a session on an open connection; reports whether it was new.
pub(crate) async fn upsert_session_tx(
    conn: &mut SqliteConnection,
    session: &Session,
) -> Result<ChangeKind, StorageError> {
    let existed: Option<(String,)> = sqlx::query_as("SELECT id FROM sessions WHERE id = ?")
        .bind(&session.id)
        .fetch_optional(&mut *conn)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO sessions (id, device_id, app_version, platform, device_type, started_at, ended_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (id) DO UPDATE SET
            ended_at = EXCLUDED.ended_at,
            device_type = COALESCE(EXCLUDED.device_type, sessions.device_type)
        "#,
    )
    .bind(&session.id)
    .bind(&session.device_id)
    .bind(&session.app_version)
    .bind(&session.platform)
    .bind(&session.device_type)
    .bind(to_millis(session.started_at))
    .bind(session.ended_at.map(to_millis))
    .execute(&mut *conn)
    .await?;

    Ok(if existed.is_some() {
        ChangeKind::Update
    } else {
        ChangeKind::Insert
    })
}

/// Insert one metric sample on an open connection and return its id.
pub(crate) async fn insert_metric_tx(
    conn: &mut SqliteConnection,
    sample: &MetricSample,
) -> Result<i64, StorageError> {
    if !sample.value.is_finite() {
        return Err(StorageError::InvalidData(format!(
            "non-finite {} value for session '{}'",
            sample.metric_type, sample.session_id
        )));
    }
    let row = sqlx::query(
        r#"
        INSERT INTO metrics (session_id, metric_type, value, unit, ts, context)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&sample.session_id)
    .bind(sample.metric_type.as_ref())
    .bind(sample.value)
    .bind(&sample.unit)
    .bind(to_millis(sample.timestamp))
    .bind(sample.context.to_string())
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.try_get("id")?)
}

// =============================================================================
// Readers
// =============================================================================

/// Metric reader.
#[derive(Clone)]
pub struct MetricReader {
    pool: SqlitePool,
}

impl std::fmt::Debug for MetricReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricReader").finish_non_exhaustive()
    }
}

impl MetricReader {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Query metric samples with filters.
    pub async fn query(&self, q: MetricQuery) -> Result<Vec<MetricSample>, StorageError> {
        let limit = q.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let order = q.order.unwrap_or_default();
        let scope = MetricScope {
            start: q.start,
            end: q.end,
            device_id: q.device_id,
            app_version: q.app_version,
        };

        let columns = METRIC_COLUMNS
            .split(", ")
            .map(|c| format!("m.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {columns} FROM metrics m JOIN sessions s ON s.id = m.session_id"
        ));
        scope.push_filters(&mut qb);

        if let Some(session_id) = q.session_id {
            qb.push(" AND m.session_id = ").push_bind(session_id);
        }
        if !q.metric_types.is_empty() {
            qb.push(" AND m.metric_type IN (");
            let mut types = qb.separated(", ");
            for metric_type in &q.metric_types {
                types.push_bind(metric_type.as_ref().to_string());
            }
            types.push_unseparated(")");
        }

        qb.push(format!(" ORDER BY m.ts {}, m.id {} LIMIT ", order.as_sql(), order.as_sql()))
            .push_bind(i64::from(limit));

        let rows = qb.build().fetch_all(self.pool.inner()).await?;
        rows.iter().map(metric_from_row).collect()
    }

    /// Per-metric-type aggregates within `scope`.
    pub async fn aggregates(&self, scope: &MetricScope) -> Result<Vec<MetricAggregate>, StorageError> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT m.metric_type AS metric_type, COUNT(*) AS count, AVG(m.value) AS avg, \
             MIN(m.value) AS min, MAX(m.value) AS max \
             FROM metrics m JOIN sessions s ON s.id = m.session_id",
        );
        scope.push_filters(&mut qb);
        qb.push(" GROUP BY m.metric_type ORDER BY m.metric_type");

        let rows = qb.build().fetch_all(self.pool.inner()).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row.try_get("metric_type")?;
            let Ok(metric_type) = raw.parse::<MetricType>() else {
                tracing::warn!(metric_type = %raw, "Skipping unknown metric type");
                continue;
            };
            out.push(MetricAggregate {
                metric_type,
                count: row.try_get("count")?,
                avg: row.try_get("avg")?,
                min: row.try_get("min")?,
                max: row.try_get("max")?,
            });
        }
        Ok(out)
    }

    /// Per-day aggregates (UTC days) within `scope`, oldest day first.
    pub async fn daily_aggregates(
        &self,
        scope: &MetricScope,
    ) -> Result<Vec<DailyAggregate>, StorageError> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT strftime('%Y-%m-%d', m.ts / 1000, 'unixepoch') AS day, \
             m.metric_type AS metric_type, COUNT(*) AS count, AVG(m.value) AS avg \
             FROM metrics m JOIN sessions s ON s.id = m.session_id",
        );
        scope.push_filters(&mut qb);
        qb.push(" GROUP BY day, m.metric_type ORDER BY day ASC, m.metric_type");

        let rows = qb.build().fetch_all(self.pool.inner()).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let day: String = row.try_get("day")?;
            let raw: String = row.try_get("metric_type")?;
            let (Ok(day), Ok(metric_type)) = (
                NaiveDate::parse_from_str(&day, "%Y-%m-%d"),
                raw.parse::<MetricType>(),
            ) else {
                tracing::warn!(day = %day, metric_type = %raw, "Skipping malformed daily aggregate");
                continue;
            };
            out.push(DailyAggregate {
                day,
                metric_type,
                count: row.try_get("count")?,
                avg: row.try_get("avg")?,
            });
        }
        Ok(out)
    }

    /// Per-route, per-session fps/memory/cpu averages, ordered by route then session start.
    ///
    /// Only samples whose context carries a `route` take part.
    pub async fn route_sessions(
        &self,
        scope: &MetricScope,
    ) -> Result<Vec<RouteSessionRow>, StorageError> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT json_extract(m.context, '$.route') AS route, m.session_id AS session_id, \
             s.started_at AS started_at, \
             AVG(CASE WHEN m.metric_type = 'fps' THEN m.value END) AS avg_fps, \
             AVG(CASE WHEN m.metric_type = 'memory_usage' THEN m.value END) AS avg_memory, \
             AVG(CASE WHEN m.metric_type = 'cpu_usage' THEN m.value END) AS avg_cpu \
             FROM metrics m JOIN sessions s ON s.id = m.session_id",
        );
        scope.push_filters(&mut qb);
        qb.push(
            " AND json_extract(m.context, '$.route') IS NOT NULL \
             GROUP BY route, m.session_id, s.started_at \
             ORDER BY route ASC, s.started_at ASC",
        );

        let rows = qb.build().fetch_all(self.pool.inner()).await?;
        rows.iter()
            .map(|row| {
                Ok(RouteSessionRow {
                    route: row.try_get("route")?,
                    session_id: row.try_get("session_id")?,
                    started_at: from_millis(row.try_get("started_at")?),
                    avg_fps: row.try_get("avg_fps")?,
                    avg_memory: row.try_get("avg_memory")?,
                    avg_cpu: row.try_get("avg_cpu")?,
                })
            })
            .collect()
    }

    /// Every stored sample, oldest first. Used by dataset export.
    pub async fn all(&self) -> Result<Vec<MetricSample>, StorageError> {
        let sql = format!("SELECT {METRIC_COLUMNS} FROM metrics ORDER BY ts ASC, id ASC");
        let rows = sqlx::query(&sql).fetch_all(self.pool.inner()).await?;
        rows.iter().map(metric_from_row).collect()
    }
}

/// Session reader.
#[derive(Clone)]
pub struct SessionReader {
    pool: SqlitePool,
}

impl std::fmt::Debug for SessionReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionReader").finish_non_exhaustive()
    }
}

/// Session and device counts over a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionCounts {
    pub sessions: i64,
    pub devices: i64,
    /// Start of the earliest session in the window.
    pub first_started_at: Option<DateTime<Utc>>,
}

impl SessionReader {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetch one session by id.
    pub async fn get(&self, id: &str) -> Result<Option<Session>, StorageError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.pool.inner())
            .await?;
        row.as_ref().map(session_from_row).transpose()
    }

    /// Query sessions with filters.
    ///
    /// Without explicit bounds, all sessions are considered.
    pub async fn query(&self, q: SessionQuery) -> Result<Vec<Session>, StorageError> {
        let limit = q.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let order = q.order.unwrap_or_default();

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE 1 = 1"
        ));
        if let Some(start) = q.start {
            qb.push(" AND started_at >= ").push_bind(to_millis(start));
        }
        if let Some(end) = q.end {
            qb.push(" AND started_at <= ").push_bind(to_millis(end));
        }
        if let Some(device_id) = q.device_id {
            qb.push(" AND device_id = ").push_bind(device_id);
        }
        if let Some(version) = q.app_version {
            qb.push(" AND app_version = ").push_bind(version);
        }
        qb.push(format!(" ORDER BY started_at {} LIMIT ", order.as_sql()))
            .push_bind(i64::from(limit));

        let rows = qb.build().fetch_all(self.pool.inner()).await?;
        rows.iter().map(session_from_row).collect()
    }

    /// Every stored session, oldest first.
    pub async fn all(&self) -> Result<Vec<Session>, StorageError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions ORDER BY started_at ASC, id ASC");
        let rows = sqlx::query(&sql).fetch_all(self.pool.inner()).await?;
        rows.iter().map(session_from_row).collect()
    }

    /// Count sessions and distinct devices matching `q`'s filters.
    ///
    /// `limit` and `order` are ignored.
    pub async fn counts(&self, q: &SessionQuery) -> Result<SessionCounts, StorageError> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) AS sessions, COUNT(DISTINCT device_id) AS devices, \
             MIN(started_at) AS first_started_at FROM sessions WHERE 1 = 1",
        );
        if let Some(start) = q.start {
            qb.push(" AND started_at >= ").push_bind(to_millis(start));
        }
        if let Some(end) = q.end {
            qb.push(" AND started_at <= ").push_bind(to_millis(end));
        }
        if let Some(device_id) = &q.device_id {
            qb.push(" AND device_id = ").push_bind(device_id.clone());
        }
        if let Some(version) = &q.app_version {
            qb.push(" AND app_version = ").push_bind(version.clone());
        }
        let row = qb.build().fetch_one(self.pool.inner()).await?;

        Ok(SessionCounts {
            sessions: row.try_get("sessions")?,
            devices: row.try_get("devices")?,
            first_started_at: row
                .try_get::<Option<i64>, _>("first_started_at")?
                .map(from_millis),
        })
    }
}

// =============================================================================
// Admin
// =============================================================================

/// Storage administration.
#[derive(Clone)]
pub struct StorageAdmin {
    pool: SqlitePool,
}

impl std::fmt::Debug for StorageAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAdmin").finish_non_exhaustive()
    }
}

impl StorageAdmin {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Verify the database answers queries.
    pub async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(self.pool.inner()).await?;
        Ok(())
    }
}
