//! Alert storage.
//!
//! Provides CRUD operations for alert configurations, reads and status
//! transitions for alert instances, and raising new alerts (the role the
//! backend trigger plays in production). Every write publishes a change
//! notification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

use crate::realtime::{ChangeKind, Table};
use crate::storage::StorageError;
use crate::storage::db::SqlitePool;
use crate::storage::feed::ChangePublisher;
use crate::storage::rows::{
    ALERT_COLUMNS, ALERT_CONFIG_COLUMNS, alert_config_from_row, alert_from_row, to_millis,
};
use crate::storage::types::{AlertConfig, AlertInstance, AlertSeverity, AlertStatus, MetricType};

const DEFAULT_ALERT_LIMIT: u32 = 200;

// =============================================================================
// Types
// =============================================================================

/// Fields accepted when creating or replacing an alert configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfigInput {
    pub name: String,
    pub metric_type: MetricType,
    pub warning_threshold: f64,
    pub critical_threshold: f64,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub notification_channels: Vec<String>,
}

fn default_active() -> bool {
    true
}

impl AlertConfigInput {
    /// Validate thresholds against the metric's direction.
    ///
    /// For lower-is-better metrics the critical threshold must not be below
    /// the warning threshold; for higher-is-better metrics it must not be above.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.name.trim().is_empty() {
            return Err(StorageError::InvalidData(
                "alert config name must not be empty".to_string(),
            ));
        }
        if !self.warning_threshold.is_finite() || !self.critical_threshold.is_finite() {
            return Err(StorageError::InvalidData(
                "alert thresholds must be finite".to_string(),
            ));
        }
        let ordered = if self.metric_type.lower_is_better() {
            self.critical_threshold >= self.warning_threshold
        } else {
            self.critical_threshold <= self.warning_threshold
        };
        if !ordered {
            return Err(StorageError::InvalidData(format!(
                "critical threshold {} is less severe than warning threshold {} for {}",
                self.critical_threshold, self.warning_threshold, self.metric_type
            )));
        }
        Ok(())
    }
}

/// Fields for raising a new alert instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    pub config_id: String,
    pub severity: AlertSeverity,
    pub metric_value: f64,
    pub threshold: f64,
    pub message: String,
}

/// Query for alert instances.
#[derive(Debug, Clone, Default)]
pub struct AlertQuery {
    /// Restrict to these statuses (empty = all).
    pub statuses: Vec<AlertStatus>,
    pub limit: Option<u32>,
}

/// Status write applied by [`AlertStore::transition`].
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    /// Statuses the row must currently have for the write to apply.
    pub from: Vec<AlertStatus>,
    pub to: AlertStatus,
    pub actor: String,
    pub at: DateTime<Utc>,
}

// =============================================================================
// Alert Store
// =============================================================================

/// Alert instance storage facade.
#[derive(Clone)]
pub struct AlertStore {
    pool: SqlitePool,
    publisher: ChangePublisher,
}

impl std::fmt::Debug for AlertStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertStore").finish_non_exhaustive()
    }
}

impl AlertStore {
    pub(crate) fn new(pool: SqlitePool, publisher: ChangePublisher) -> Self {
        Self { pool, publisher }
    }

    /// Raise a new active alert.
    pub async fn raise(&self, alert: NewAlert) -> Result<AlertInstance, StorageError> {
        let record = AlertInstance {
            id: uuid::Uuid::new_v4().to_string(),
            config_id: alert.config_id,
            severity: alert.severity,
            metric_value: alert.metric_value,
            threshold: alert.threshold,
            message: alert.message,
            status: AlertStatus::Active,
            created_at: Utc::now(),
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
        };
        self.insert(&record).await?;
        Ok(record)
    }

    /// Insert a fully-formed alert record (used by imports).
    pub async fn insert(&self, record: &AlertInstance) -> Result<(), StorageError> {
        let mut conn = self.pool.inner().acquire().await?;
        insert_alert_tx(&mut conn, record).await?;
        tracing::info!(alert = %record.id, severity = %record.severity, "Alert raised");
        self.publisher.publish(Table::Alerts, ChangeKind::Insert, record);
        Ok(())
    }

    /// Fetch one alert by id.
    pub async fn get(&self, id: &str) -> Result<Option<AlertInstance>, StorageError> {
        let sql = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.pool.inner())
            .await?;
        row.as_ref().map(alert_from_row).transpose()
    }

    /// List alerts, newest first.
    pub async fn list(&self, q: AlertQuery) -> Result<Vec<AlertInstance>, StorageError> {
        let limit = q.limit.unwrap_or(DEFAULT_ALERT_LIMIT);
        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new(format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE 1 = 1"
        ));
        if !q.statuses.is_empty() {
            qb.push(" AND status IN (");
            let mut statuses = qb.separated(", ");
            for status in &q.statuses {
                statuses.push_bind(status.as_ref().to_string());
            }
            statuses.push_unseparated(")");
        }
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(limit));

        let rows = qb.build().fetch_all(self.pool.inner()).await?;
        rows.iter().map(alert_from_row).collect()
    }

    /// Conditionally move an alert to a new status.
    ///
    /// The write only applies when the row's current status is one of
    /// `change.from`. Returns `Ok(None)` when no row matched.
    pub async fn transition(
        &self,
        id: &str,
        change: &StatusChange,
    ) -> Result<Option<AlertInstance>, StorageError> {
        let (at_column, by_column) = match change.to {
            AlertStatus::Acknowledged => ("acknowledged_at", "acknowledged_by"),
            AlertStatus::Resolved => ("resolved_at", "resolved_by"),
            AlertStatus::Active => {
                return Err(StorageError::InvalidData(
                    "alerts cannot transition back to active".to_string(),
                ));
            }
        };

        let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new("UPDATE alerts SET status = ");
        qb.push_bind(change.to.as_ref().to_string())
            .push(format!(", {at_column} = "))
            .push_bind(to_millis(change.at))
            .push(format!(", {by_column} = "))
            .push_bind(change.actor.clone())
            .push(" WHERE id = ")
            .push_bind(id.to_string())
            .push(" AND status IN (");
        let mut from = qb.separated(", ");
        for status in &change.from {
            from.push_bind(status.as_ref().to_string());
        }
        from.push_unseparated(")");
        qb.push(format!(" RETURNING {ALERT_COLUMNS}"));

        let row = qb.build().fetch_optional(self.pool.inner()).await?;
        let updated = row.as_ref().map(alert_from_row).transpose()?;

        if let Some(alert) = &updated {
            tracing::info!(alert = %id, status = %alert.status, actor = %change.actor, "Alert status changed");
            self.publisher.publish(Table::Alerts, ChangeKind::Update, alert);
        }
        Ok(updated)
    }
}

// =============================================================================
// Alert Config Store
// =============================================================================

/// Alert configuration CRUD facade.
#[derive(Clone)]
pub struct AlertConfigStore {
    pool: SqlitePool,
    publisher: ChangePublisher,
}

impl std::fmt::Debug for AlertConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertConfigStore").finish_non_exhaustive()
    }
}

impl AlertConfigStore {
    pub(crate) fn new(pool: SqlitePool, publisher: ChangePublisher) -> Self {
        Self { pool, publisher }
    }

    /// Create a configuration.
    pub async fn create(&self, input: AlertConfigInput) -> Result<AlertConfig, StorageError> {
        input.validate()?;
        let now = Utc::now();
        let config = AlertConfig {
            id: uuid::Uuid::new_v4().to_string(),
            name: input.name,
            metric_type: input.metric_type,
            warning_threshold: input.warning_threshold,
            critical_threshold: input.critical_threshold,
            is_active: input.is_active,
            notification_channels: input.notification_channels,
            created_at: now,
            updated_at: now,
        };
        self.insert(&config).await?;
        Ok(config)
    }

    /// Insert a fully-formed configuration (used by imports).
    pub async fn insert(&self, config: &AlertConfig) -> Result<(), StorageError> {
        let mut conn = self.pool.inner().acquire().await?;
        insert_alert_config_tx(&mut conn, config).await?;
        tracing::info!(config = %config.id, name = %config.name, "Alert config created");
        self.publisher.publish(Table::AlertConfigs, ChangeKind::Insert, config);
        Ok(())
    }

    /// Replace a configuration's editable fields.
    pub async fn update(&self, id: &str, input: AlertConfigInput) -> Result<AlertConfig, StorageError> {
        input.validate()?;
        let sql = format!(
            r#"
            UPDATE alert_configs SET
                name = ?, metric_type = ?, warning_threshold = ?, critical_threshold = ?,
                is_active = ?, notification_channels = ?, updated_at = ?
            WHERE id = ?
            RETURNING {ALERT_CONFIG_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(&input.name)
            .bind(input.metric_type.as_ref())
            .bind(input.warning_threshold)
            .bind(input.critical_threshold)
            .bind(input.is_active)
            .bind(serde_json::to_string(&input.notification_channels)?)
            .bind(to_millis(Utc::now()))
            .bind(id)
            .fetch_optional(self.pool.inner())
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("alert config '{id}'")))?;

        let config = alert_config_from_row(&row)?;
        self.publisher.publish(Table::AlertConfigs, ChangeKind::Update, &config);
        Ok(config)
    }

    /// Delete a configuration. Returns whether a row was removed.
    pub async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let sql = format!("DELETE FROM alert_configs WHERE id = ? RETURNING {ALERT_CONFIG_COLUMNS}");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.pool.inner())
            .await?;

        match row {
            Some(row) => {
                let config = alert_config_from_row(&row)?;
                self.publisher.publish(Table::AlertConfigs, ChangeKind::Delete, &config);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Fetch one configuration.
    pub async fn get(&self, id: &str) -> Result<Option<AlertConfig>, StorageError> {
        let sql = format!("SELECT {ALERT_CONFIG_COLUMNS} FROM alert_configs WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.pool.inner())
            .await?;
        row.as_ref().map(alert_config_from_row).transpose()
    }

    /// List all configurations ordered by name.
    pub async fn list(&self) -> Result<Vec<AlertConfig>, StorageError> {
        let sql = format!("SELECT {ALERT_CONFIG_COLUMNS} FROM alert_configs ORDER BY name, id");
        let rows = sqlx::query(&sql).fetch_all(self.pool.inner()).await?;
        rows.iter().map(alert_config_from_row).collect()
    }
}

/// Insert an alert record on an open connection.
pub(crate) async fn insert_alert_tx(
    conn: &mut SqliteConnection,
    record: &AlertInstance,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO alerts (id, config_id, severity, metric_value, threshold, message, status,
                            created_at, acknowledged_at, acknowledged_by, resolved_at, resolved_by)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.id)
    .bind(&record.config_id)
    .bind(record.severity.as_ref())
    .bind(record.metric_value)
    .bind(record.threshold)
    .bind(&record.message)
    .bind(record.status.as_ref())
    .bind(to_millis(record.created_at))
    .bind(record.acknowledged_at.map(to_millis))
    .bind(&record.acknowledged_by)
    .bind(record.resolved_at.map(to_millis))
    .bind(&record.resolved_by)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Insert an alert configuration on an open connection.
pub(crate) async fn insert_alert_config_tx(
    conn: &mut SqliteConnection,
    config: &AlertConfig,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        INSERT INTO alert_configs (id, name, metric_type, warning_threshold, critical_threshold,
                                   is_active, notification_channels, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&config.id)
    .bind(&config.name)
    .bind(config.metric_type.as_ref())
    .bind(config.warning_threshold)
    .bind(config.critical_threshold)
    .bind(config.is_active)
    .bind(serde_json::to_string(&config.notification_channels)?)
    .bind(to_millis(config.created_at))
    .bind(to_millis(config.updated_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageBuilder;

    fn fps_config() -> AlertConfigInput {
        AlertConfigInput {
            name: "Low FPS".to_string(),
            metric_type: MetricType::Fps,
            warning_threshold: 45.0,
            critical_threshold: 30.0,
            is_active: true,
            notification_channels: vec!["email".to_string()],
        }
    }

    #[test]
    fn test_config_validation_direction() {
        assert!(fps_config().validate().is_ok());

        let mut inverted = fps_config();
        inverted.critical_threshold = 50.0;
        assert!(inverted.validate().is_err());

        let memory = AlertConfigInput {
            name: "High memory".to_string(),
            metric_type: MetricType::MemoryUsage,
            warning_threshold: 400.0,
            critical_threshold: 600.0,
            is_active: true,
            notification_channels: vec![],
        };
        assert!(memory.validate().is_ok());

        let mut unnamed = fps_config();
        unnamed.name = "  ".to_string();
        assert!(unnamed.validate().is_err());
    }

    #[tokio::test]
    async fn test_alert_config_crud() {
        let handles = StorageBuilder::new("sqlite::memory:").build().await.unwrap();
        let store = &handles.alert_config_store;

        let created = store.create(fps_config()).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);

        let mut edit = fps_config();
        edit.name = "Very low FPS".to_string();
        edit.is_active = false;
        let updated = store.update(&created.id, edit).await.unwrap();
        assert_eq!(updated.name, "Very low FPS");
        assert!(!updated.is_active);
        assert_eq!(updated.notification_channels, vec!["email".to_string()]);

        let missing = store.update("nope", fps_config()).await;
        assert!(matches!(missing, Err(StorageError::NotFound(_))));

        assert!(store.delete(&created.id).await.unwrap());
        assert!(!store.delete(&created.id).await.unwrap());
        assert!(store.get(&created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_alert_transition_is_conditional() {
        let handles = StorageBuilder::new("sqlite::memory:").build().await.unwrap();
        let store = &handles.alert_store;

        let alert = store
            .raise(NewAlert {
                config_id: "cfg-1".to_string(),
                severity: AlertSeverity::Critical,
                metric_value: 12.0,
                threshold: 30.0,
                message: "FPS dropped".to_string(),
            })
            .await
            .unwrap();

        let resolve = StatusChange {
            from: vec![AlertStatus::Active, AlertStatus::Acknowledged],
            to: AlertStatus::Resolved,
            actor: "ops".to_string(),
            at: Utc::now(),
        };
        let resolved = store.transition(&alert.id, &resolve).await.unwrap().unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert_eq!(resolved.resolved_by.as_deref(), Some("ops"));
        assert!(resolved.resolved_at.is_some());

        let acknowledge = StatusChange {
            from: vec![AlertStatus::Active],
            to: AlertStatus::Acknowledged,
            actor: "ops".to_string(),
            at: Utc::now(),
        };
        assert!(store.transition(&alert.id, &acknowledge).await.unwrap().is_none());

        let listed = store
            .list(AlertQuery {
                statuses: vec![AlertStatus::Resolved],
                limit: None,
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }
}
