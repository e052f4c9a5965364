//! Alert status lifecycle.
//!
//! Alerts move forward only: `active -> acknowledged -> resolved`, with
//! `active -> resolved` allowed directly. Each transition requires a known
//! actor and is applied as a conditional write, so concurrent transitions
//! of the same alert cannot move it backward.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

use crate::storage::{AlertInstance, AlertStatus, AlertStore, StatusChange, StorageError};

/// Authenticated user performing a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Actor from an optional raw identifier; blank means unauthenticated.
    pub fn from_raw(raw: Option<&str>) -> Option<Self> {
        raw.map(str::trim)
            .filter(|id| !id.is_empty())
            .map(Self::new)
    }
}

/// Status transition requested by a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AlertAction {
    Acknowledge,
    Resolve,
}

impl AlertAction {
    pub fn target(self) -> AlertStatus {
        match self {
            Self::Acknowledge => AlertStatus::Acknowledged,
            Self::Resolve => AlertStatus::Resolved,
        }
    }

    /// Statuses this action may be applied from.
    pub fn allowed_from(self) -> Vec<AlertStatus> {
        [AlertStatus::Active, AlertStatus::Acknowledged, AlertStatus::Resolved]
            .into_iter()
            .filter(|status| status.can_transition_to(self.target()))
            .collect()
    }
}

/// Errors from alert transitions.
#[derive(Debug, Error)]
pub enum AlertError {
    /// No authenticated actor; nothing was written.
    #[error("unauthenticated: an actor is required to {0} alerts")]
    Unauthenticated(AlertAction),

    #[error("alert not found: {0}")]
    NotFound(String),

    /// The alert's current status does not allow the action.
    #[error("cannot {action} alert {id} in status {from}")]
    InvalidTransition {
        id: String,
        from: AlertStatus,
        action: AlertAction,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Applies status transitions against the alert store.
#[derive(Debug, Clone)]
pub struct AlertLifecycle {
    store: AlertStore,
}

impl AlertLifecycle {
    pub fn new(store: AlertStore) -> Self {
        Self { store }
    }

    /// Move an `active` alert to `acknowledged`.
    pub async fn acknowledge(
        &self,
        id: &str,
        actor: Option<&Actor>,
    ) -> Result<AlertInstance, AlertError> {
        self.apply(id, AlertAction::Acknowledge, actor).await
    }

    /// Move an `active` or `acknowledged` alert to `resolved`.
    pub async fn resolve(&self, id: &str, actor: Option<&Actor>) -> Result<AlertInstance, AlertError> {
        self.apply(id, AlertAction::Resolve, actor).await
    }

    /// Apply `action` to alert `id` on behalf of `actor`.
    ///
    /// # Errors
    /// - `Unauthenticated` without an actor (checked before any query)
    /// - `NotFound` if the alert does not exist
    /// - `InvalidTransition` if its current status forbids the action
    pub async fn apply(
        &self,
        id: &str,
        action: AlertAction,
        actor: Option<&Actor>,
    ) -> Result<AlertInstance, AlertError> {
        let actor = actor.ok_or(AlertError::Unauthenticated(action))?;

        let change = StatusChange {
            from: action.allowed_from(),
            to: action.target(),
            actor: actor.id.clone(),
            at: Utc::now(),
        };
        if let Some(updated) = self.store.transition(id, &change).await? {
            return Ok(updated);
        }

        match self.store.get(id).await? {
            None => Err(AlertError::NotFound(id.to_string())),
            Some(current) => {
                tracing::debug!(alert = %id, status = %current.status, action = %action, "Transition rejected");
                Err(AlertError::InvalidTransition {
                    id: id.to_string(),
                    from: current.status,
                    action,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AlertSeverity, NewAlert, StorageBuilder, StorageHandles};

    async fn setup() -> (StorageHandles, AlertLifecycle, AlertInstance) {
        let handles = StorageBuilder::new("sqlite::memory:").build().await.unwrap();
        let alert = handles
            .alert_store
            .raise(NewAlert {
                config_id: "cfg-1".to_string(),
                severity: AlertSeverity::Warning,
                metric_value: 420.0,
                threshold: 400.0,
                message: "Memory above warning threshold".to_string(),
            })
            .await
            .unwrap();
        let lifecycle = AlertLifecycle::new(handles.alert_store.clone());
        (handles, lifecycle, alert)
    }

    #[test]
    fn test_allowed_from() {
        assert_eq!(AlertAction::Acknowledge.allowed_from(), vec![AlertStatus::Active]);
        assert_eq!(
            AlertAction::Resolve.allowed_from(),
            vec![AlertStatus::Active, AlertStatus::Acknowledged]
        );
    }

    #[test]
    fn test_actor_from_raw() {
        assert_eq!(Actor::from_raw(Some(" ops ")), Some(Actor::new("ops")));
        assert_eq!(Actor::from_raw(Some("   ")), None);
        assert_eq!(Actor::from_raw(None), None);
    }

    #[tokio::test]
    async fn test_missing_actor_is_rejected_without_mutation() {
        let (handles, lifecycle, alert) = setup().await;

        let result = lifecycle.resolve(&alert.id, None).await;
        assert!(matches!(result, Err(AlertError::Unauthenticated(AlertAction::Resolve))));

        let current = handles.alert_store.get(&alert.id).await.unwrap().unwrap();
        assert_eq!(current.status, AlertStatus::Active);
    }

    #[tokio::test]
    async fn test_resolve_active_alert() {
        let (_handles, lifecycle, alert) = setup().await;
        let actor = Actor::new("ops");

        let resolved = lifecycle.resolve(&alert.id, Some(&actor)).await.unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert_eq!(resolved.resolved_by.as_deref(), Some("ops"));
        assert!(resolved.resolved_at.is_some());
        assert!(resolved.acknowledged_at.is_none());
    }

    #[tokio::test]
    async fn test_acknowledge_then_resolve() {
        let (_handles, lifecycle, alert) = setup().await;
        let actor = Actor::new("ops");

        let acked = lifecycle.acknowledge(&alert.id, Some(&actor)).await.unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        assert_eq!(acked.acknowledged_by.as_deref(), Some("ops"));

        // acknowledging twice is rejected
        let again = lifecycle.acknowledge(&alert.id, Some(&actor)).await;
        assert!(matches!(
            again,
            Err(AlertError::InvalidTransition {
                from: AlertStatus::Acknowledged,
                ..
            })
        ));

        let resolved = lifecycle.resolve(&alert.id, Some(&actor)).await.unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert!(resolved.acknowledged_at.is_some());
    }

    #[tokio::test]
    async fn test_acknowledge_resolved_alert_is_rejected() {
        let (handles, lifecycle, alert) = setup().await;
        let actor = Actor::new("ops");
        lifecycle.resolve(&alert.id, Some(&actor)).await.unwrap();

        let result = lifecycle.acknowledge(&alert.id, Some(&actor)).await;
        assert!(matches!(result, Err(AlertError::InvalidTransition { .. })));

        let current = handles.alert_store.get(&alert.id).await.unwrap().unwrap();
        assert_eq!(current.status, AlertStatus::Resolved);
        assert!(current.acknowledged_at.is_none());
    }

    #[tokio::test]
    async fn test_unknown_alert_is_not_found() {
        let (_handles, lifecycle, _alert) = setup().await;
        let result = lifecycle.resolve("missing", Some(&Actor::new("ops"))).await;
        assert!(matches!(result, Err(AlertError::NotFound(_))));
    }
}
