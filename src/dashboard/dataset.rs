//! Dataset export and import.
//!
//! A [`Dataset`] is a JSON snapshot of every table, used for backups and
//! for seeding a fresh store. Serializing a dataset and parsing it back
//! yields an identical value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::realtime::{ChangeKind, Table};
use crate::storage::{
    AlertConfig, AlertInstance, AlertQuery, Feedback, MetricSample, Session, StorageError,
    StorageHandles, insert_alert_config_tx, insert_alert_tx, insert_feedback_tx, insert_metric_tx,
    upsert_session_tx,
};

/// Current export format version.
pub const DATASET_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub metrics: Vec<MetricSample>,
    #[serde(default)]
    pub alert_configs: Vec<AlertConfig>,
    #[serde(default)]
    pub alerts: Vec<AlertInstance>,
    #[serde(default)]
    pub feedback: Vec<Feedback>,
}

impl Default for Dataset {
    fn default() -> Self {
        Self {
            version: DATASET_VERSION,
            exported_at: Utc::now(),
            sessions: Vec::new(),
            metrics: Vec::new(),
            alert_configs: Vec::new(),
            alerts: Vec::new(),
            feedback: Vec::new(),
        }
    }
}

/// Rows written by [`import_dataset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ImportSummary {
    pub sessions: usize,
    pub metrics: usize,
    pub alert_configs: usize,
    pub alerts: usize,
    pub feedback: usize,
}

impl Dataset {
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
            && self.metrics.is_empty()
            && self.alert_configs.is_empty()
            && self.alerts.is_empty()
            && self.feedback.is_empty()
    }

    pub fn to_json(&self) -> Result<String, StorageError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, StorageError> {
        let dataset: Self = serde_json::from_str(json)?;
        if dataset.version > DATASET_VERSION {
            return Err(StorageError::InvalidData(format!(
                "unsupported dataset version {} (max {DATASET_VERSION})",
                dataset.version
            )));
        }
        Ok(dataset)
    }
}

/// Snapshot every table.
pub async fn export_dataset(storage: &StorageHandles) -> Result<Dataset, StorageError> {
    let dataset = Dataset {
        version: DATASET_VERSION,
        exported_at: Utc::now(),
        sessions: storage.session_reader.all().await?,
        metrics: storage.metric_reader.all().await?,
        alert_configs: storage.alert_config_store.list().await?,
        alerts: storage
            .alert_store
            .list(AlertQuery {
                limit: Some(u32::MAX),
                ..Default::default()
            })
            .await?,
        feedback: storage.feedback_store.list(Some(u32::MAX)).await?,
    };
    tracing::info!(
        sessions = dataset.sessions.len(),
        metrics = dataset.metrics.len(),
        alerts = dataset.alerts.len(),
        "Exported dataset"
    );
    Ok(dataset)
}

/// Write a dataset into the store in one transaction.
///
/// Sessions are upserted; other records are inserted and fail on
/// duplicate ids. Metric ids are reassigned by the store. A failure
/// rolls back every table, and change notifications go out only after
/// the commit.
pub async fn import_dataset(
    storage: &StorageHandles,
    dataset: &Dataset,
) -> Result<ImportSummary, StorageError> {
    let mut tx = storage.begin().await?;

    let mut session_kinds = Vec::with_capacity(dataset.sessions.len());
    for session in &dataset.sessions {
        session_kinds.push(upsert_session_tx(&mut tx, session).await?);
    }
    let mut metrics = Vec::with_capacity(dataset.metrics.len());
    for sample in &dataset.metrics {
        let mut sample = sample.clone();
        sample.id = Some(insert_metric_tx(&mut tx, &sample).await?);
        metrics.push(sample);
    }
    for config in &dataset.alert_configs {
        insert_alert_config_tx(&mut tx, config).await?;
    }
    for alert in &dataset.alerts {
        insert_alert_tx(&mut tx, alert).await?;
    }
    for feedback in &dataset.feedback {
        insert_feedback_tx(&mut tx, feedback).await?;
    }

    tx.commit().await?;

    let publisher = storage.publisher();
    for (session, kind) in dataset.sessions.iter().zip(session_kinds) {
        publisher.publish(Table::Sessions, kind, session);
    }
    for sample in &metrics {
        publisher.publish(Table::Metrics, ChangeKind::Insert, sample);
    }
    for config in &dataset.alert_configs {
        publisher.publish(Table::AlertConfigs, ChangeKind::Insert, config);
    }
    for alert in &dataset.alerts {
        publisher.publish(Table::Alerts, ChangeKind::Insert, alert);
    }
    for feedback in &dataset.feedback {
        publisher.publish(Table::Feedback, ChangeKind::Insert, feedback);
    }

    let summary = ImportSummary {
        sessions: dataset.sessions.len(),
        metrics: metrics.len(),
        alert_configs: dataset.alert_configs.len(),
        alerts: dataset.alerts.len(),
        feedback: dataset.feedback.len(),
    };
    tracing::info!(?summary, "Imported dataset");
    Ok(summary)
}
