//! Live alert list.
//!
//! [`AlertFeed`] is an actor task that keeps the alert list in sync with
//! the store. Any notification on the alerts table triggers a full
//! refetch. Acknowledge/resolve go through the actor: the remote write
//! runs first and the local list is patched only after it succeeds.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::alerts::{Actor, AlertAction, AlertError, AlertLifecycle};
use crate::realtime::feed::{
    ChangeFeed, ConnectionState, FeedError, FeedFilter, RowChange, Subscription, Table,
};
use crate::realtime::reducer::{Action, InsertOrder, KeyedState};
use crate::storage::{AlertInstance, AlertQuery, AlertStore, StorageError};

const COMMAND_BUFFER: usize = 32;

/// Snapshot of the alert feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertFeedState {
    /// Newest first.
    pub alerts: Vec<AlertInstance>,
    pub connection: ConnectionState,
    /// Subscription error; cleared by a successful reconnect.
    pub error: Option<FeedError>,
    /// Last refetch failure.
    pub fetch_error: Option<String>,
    /// Last failed acknowledge/resolve.
    pub mutation_error: Option<String>,
    pub last_synced: Option<DateTime<Utc>>,
}

/// Commands sent to the feed actor.
#[derive(Debug)]
enum Command {
    /// Tear down and re-establish the subscription.
    Reconnect,
    /// Reload the alert list.
    Refetch,
    /// Apply a status transition.
    Transition {
        id: String,
        action: AlertAction,
        actor: Option<Actor>,
        reply: oneshot::Sender<Result<AlertInstance, AlertError>>,
    },
}

/// Handle to a running alert feed.
///
/// Dropping the handle stops the actor and releases the subscription.
pub struct AlertFeed {
    state: watch::Receiver<AlertFeedState>,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for AlertFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertFeed").finish_non_exhaustive()
    }
}

impl AlertFeed {
    /// Subscribe to alert changes and load the initial list.
    pub fn spawn(feed: Arc<dyn ChangeFeed>, store: AlertStore) -> Self {
        let (state_tx, state) = watch::channel(AlertFeedState::default());
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);

        let actor = FeedActor {
            feed,
            lifecycle: AlertLifecycle::new(store.clone()),
            store,
            alerts: KeyedState::new(InsertOrder::Prepend),
            subscription: None,
            state: state_tx,
        };
        let task = tokio::spawn(actor.run(rx));

        Self {
            state,
            commands,
            task,
        }
    }

    pub fn state(&self) -> AlertFeedState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AlertFeedState> {
        self.state.clone()
    }

    pub async fn reconnect(&self) {
        let _ = self.commands.send(Command::Reconnect).await;
    }

    pub async fn refetch(&self) {
        let _ = self.commands.send(Command::Refetch).await;
    }

    pub async fn acknowledge(
        &self,
        id: &str,
        actor: Option<Actor>,
    ) -> Result<AlertInstance, AlertError> {
        self.transition(id, AlertAction::Acknowledge, actor).await
    }

    pub async fn resolve(&self, id: &str, actor: Option<Actor>) -> Result<AlertInstance, AlertError> {
        self.transition(id, AlertAction::Resolve, actor).await
    }

    async fn transition(
        &self,
        id: &str,
        action: AlertAction,
        actor: Option<Actor>,
    ) -> Result<AlertInstance, AlertError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Transition {
                id: id.to_string(),
                action,
                actor,
                reply,
            })
            .await
            .map_err(|_| feed_stopped())?;
        rx.await.map_err(|_| feed_stopped())?
    }
}

impl Drop for AlertFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn feed_stopped() -> AlertError {
    AlertError::Storage(StorageError::Internal("alert feed stopped".to_string()))
}

struct FeedActor {
    feed: Arc<dyn ChangeFeed>,
    store: AlertStore,
    lifecycle: AlertLifecycle,
    alerts: KeyedState<AlertInstance>,
    subscription: Option<Subscription>,
    state: watch::Sender<AlertFeedState>,
}

impl FeedActor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        self.connect().await;

        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.handle_command(cmd).await;
                }
                event = next_change(&mut self.subscription) => {
                    self.handle_event(event).await;
                }
            }
        }

        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    async fn connect(&mut self) {
        if let Some(previous) = self.subscription.take() {
            previous.unsubscribe();
        }
        self.state.send_modify(|s| s.connection = ConnectionState::Connecting);

        match self.feed.subscribe(FeedFilter::table(Table::Alerts)).await {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                self.state.send_modify(|s| {
                    s.connection = ConnectionState::Connected;
                    s.error = None;
                });
                self.refetch().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Alert feed subscription failed");
                self.state.send_modify(|s| {
                    s.connection = ConnectionState::Error;
                    s.error = Some(e);
                });
            }
        }
    }

    async fn refetch(&mut self) {
        match self.store.list(AlertQuery::default()).await {
            Ok(alerts) => {
                self.alerts.apply(Action::Replace(alerts));
                let alerts = self.alerts.to_vec();
                self.state.send_modify(|s| {
                    s.alerts = alerts;
                    s.fetch_error = None;
                    s.last_synced = Some(Utc::now());
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Alert refetch failed, keeping previous list");
                self.state.send_modify(|s| s.fetch_error = Some(e.to_string()));
            }
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Reconnect => self.connect().await,
            Command::Refetch => self.refetch().await,
            Command::Transition {
                id,
                action,
                actor,
                reply,
            } => {
                let result = self.lifecycle.apply(&id, action, actor.as_ref()).await;
                match &result {
                    Ok(updated) => {
                        self.alerts.apply(Action::Update(updated.clone()));
                        let alerts = self.alerts.to_vec();
                        self.state.send_modify(|s| {
                            s.alerts = alerts;
                            s.mutation_error = None;
                        });
                    }
                    Err(e) => {
                        let message = e.to_string();
                        self.state.send_modify(|s| s.mutation_error = Some(message));
                    }
                }
                let _ = reply.send(result);
            }
        }
    }

    async fn handle_event(&mut self, event: Result<Option<RowChange>, FeedError>) {
        match event {
            Ok(Some(change)) => {
                tracing::debug!(kind = %change.kind, "Alert change received, refetching");
                self.refetch().await;
            }
            Err(FeedError::Lagged(n)) => {
                tracing::warn!(dropped = n, "Alert feed lagged, refetching");
                self.refetch().await;
            }
            Ok(None) => {
                self.subscription = None;
                self.state.send_modify(|s| {
                    s.connection = ConnectionState::Disconnected;
                    s.error = Some(FeedError::Closed);
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Alert feed error");
                self.subscription = None;
                self.state.send_modify(|s| {
                    s.connection = ConnectionState::Error;
                    s.error = Some(e);
                });
            }
        }
    }
}

/// Next event from an open subscription; pending forever without one.
pub(crate) async fn next_change(
    subscription: &mut Option<Subscription>,
) -> Result<Option<RowChange>, FeedError> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}
