//! Feedback storage.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

use crate::realtime::{ChangeKind, Table};
use crate::storage::StorageError;
use crate::storage::db::SqlitePool;
use crate::storage::feed::ChangePublisher;
use crate::storage::rows::{FEEDBACK_COLUMNS, feedback_from_row, to_millis};
use crate::storage::types::{Feedback, FeedbackCategory};

const DEFAULT_FEEDBACK_LIMIT: u32 = 100;

/// Fields accepted when submitting feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackInput {
    #[serde(default)]
    pub session_id: Option<String>,
    pub category: FeedbackCategory,
    #[serde(default)]
    pub rating: Option<u8>,
    pub message: String,
}

impl FeedbackInput {
    /// Validate rating range and message presence.
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.message.trim().is_empty() {
            return Err(StorageError::InvalidData(
                "feedback message must not be empty".to_string(),
            ));
        }
        if let Some(rating) = self.rating
            && !(1..=5).contains(&rating)
        {
            return Err(StorageError::InvalidData(format!(
                "rating must be between 1 and 5, got {rating}"
            )));
        }
        Ok(())
    }
}

/// Feedback storage facade.
#[derive(Clone)]
pub struct FeedbackStore {
    pool: SqlitePool,
    publisher: ChangePublisher,
}

impl std::fmt::Debug for FeedbackStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackStore").finish_non_exhaustive()
    }
}

impl FeedbackStore {
    pub(crate) fn new(pool: SqlitePool, publisher: ChangePublisher) -> Self {
        Self { pool, publisher }
    }

    /// Submit new feedback.
    pub async fn create(&self, input: FeedbackInput) -> Result<Feedback, StorageError> {
        input.validate()?;
        let feedback = Feedback {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: input.session_id,
            category: input.category,
            rating: input.rating,
            message: input.message,
            created_at: Utc::now(),
        };
        self.insert(&feedback).await?;
        Ok(feedback)
    }

    /// Insert a fully-formed record (used by imports).
    pub async fn insert(&self, feedback: &Feedback) -> Result<(), StorageError> {
        let mut conn = self.pool.inner().acquire().await?;
        insert_feedback_tx(&mut conn, feedback).await?;
        self.publisher.publish(Table::Feedback, ChangeKind::Insert, feedback);
        Ok(())
    }

    /// List feedback, newest first.
    pub async fn list(&self, limit: Option<u32>) -> Result<Vec<Feedback>, StorageError> {
        let sql = format!(
            "SELECT {FEEDBACK_COLUMNS} FROM feedback ORDER BY created_at DESC, id DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit.unwrap_or(DEFAULT_FEEDBACK_LIMIT)))
            .fetch_all(self.pool.inner())
            .await?;
        rows.iter().map(feedback_from_row).collect()
    }
}

/// Insert a feedback record on an open connection.
pub(crate) async fn insert_feedback_tx(
    conn: &mut SqliteConnection,
    feedback: &Feedback,
) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO feedback (id, session_id, category, rating, message, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&feedback.id)
    .bind(&feedback.session_id)
    .bind(feedback.category.as_ref())
    .bind(feedback.rating.map(i64::from))
    .bind(&feedback.message)
    .bind(to_millis(feedback.created_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageBuilder;

    #[test]
    fn test_feedback_validation() {
        let mut input = FeedbackInput {
            session_id: None,
            category: FeedbackCategory::Performance,
            rating: Some(4),
            message: "Scrolling stutters on the feed".to_string(),
        };
        assert!(input.validate().is_ok());

        input.rating = Some(6);
        assert!(input.validate().is_err());

        input.rating = None;
        input.message = String::new();
        assert!(input.validate().is_err());
    }

    #[tokio::test]
    async fn test_feedback_create_and_list() {
        let handles = StorageBuilder::new("sqlite::memory:").build().await.unwrap();
        let created = handles
            .feedback_store
            .create(FeedbackInput {
                session_id: Some("s-1".to_string()),
                category: FeedbackCategory::Bug,
                rating: Some(2),
                message: "Crash on launch".to_string(),
            })
            .await
            .unwrap();

        let listed = handles.feedback_store.list(None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
        assert_eq!(listed[0].rating, Some(2));
        assert_eq!(listed[0].category, FeedbackCategory::Bug);
    }
}
