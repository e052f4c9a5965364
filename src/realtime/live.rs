//! Live metrics for one session.
//!
//! Metric rows for the session arrive through the change feed and are
//! folded into a bounded, time-ordered point buffer. Samples of the same
//! metric type that land within the aggregation interval of the latest
//! point for that type are merged into it as a running average.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::realtime::alerts::next_change;
use crate::realtime::feed::{
    ChangeFeed, ChangeKind, ConnectionState, FeedError, FeedFilter, RowChange, Subscription, Table,
};
use crate::realtime::reducer::{Action, InsertOrder, Keyed, KeyedState};
use crate::storage::{MetricSample, MetricType};

/// Default number of retained points.
pub const DEFAULT_MAX_POINTS: usize = 100;

/// Default coalescing interval.
pub const DEFAULT_AGGREGATION_INTERVAL: Duration = Duration::from_secs(1);

const COMMAND_BUFFER: usize = 8;

/// One (possibly coalesced) point in the live buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivePoint {
    /// Id of the first sample merged into this point.
    pub id: i64,
    pub metric_type: MetricType,
    /// Running average of the merged samples.
    pub value: f64,
    pub unit: String,
    /// Timestamp of the first merged sample.
    pub timestamp: DateTime<Utc>,
    pub samples: u32,
}

impl Keyed for LivePoint {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

/// Buffer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveConfig {
    pub max_points: usize,
    /// Zero disables coalescing.
    pub aggregation_interval: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            max_points: DEFAULT_MAX_POINTS,
            aggregation_interval: DEFAULT_AGGREGATION_INTERVAL,
        }
    }
}

/// Bounded point buffer with coalescing and duplicate suppression.
#[derive(Debug, Clone)]
pub struct LiveBuffer {
    points: KeyedState<LivePoint>,
    aggregation_interval: chrono::Duration,
    seen: HashSet<i64>,
    seen_order: VecDeque<i64>,
    seen_capacity: usize,
}

impl LiveBuffer {
    pub fn new(config: LiveConfig) -> Self {
        let max_points = config.max_points.max(1);
        Self {
            points: KeyedState::with_capacity(InsertOrder::Append, max_points),
            aggregation_interval: chrono::Duration::from_std(config.aggregation_interval)
                .unwrap_or(chrono::Duration::zero()),
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
            seen_capacity: max_points * 4,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Oldest first.
    pub fn points(&self) -> Vec<LivePoint> {
        self.points.to_vec()
    }

    /// Remember a sample id; false if it was already seen.
    fn remember(&mut self, id: i64) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.seen_order.push_back(id);
        while self.seen_order.len() > self.seen_capacity {
            if let Some(old) = self.seen_order.pop_front() {
                self.seen.remove(&old);
            }
        }
        true
    }

    /// Fold one sample in. Returns whether the buffer changed.
    pub fn push(&mut self, sample: &MetricSample) -> bool {
        if !sample.value.is_finite() {
            return false;
        }
        let Some(id) = sample.id else {
            tracing::debug!(session = %sample.session_id, "Ignoring live sample without id");
            return false;
        };
        if !self.remember(id) {
            return false;
        }

        let latest = self
            .points
            .iter()
            .rev()
            .find(|p| p.metric_type == sample.metric_type)
            .cloned();

        if let Some(mut point) = latest
            && self.aggregation_interval > chrono::Duration::zero()
            && (sample.timestamp - point.timestamp).abs() < self.aggregation_interval
        {
            let n = f64::from(point.samples);
            point.value = (point.value * n + sample.value) / (n + 1.0);
            point.samples += 1;
            return self.points.apply(Action::Update(point));
        }

        self.points.apply(Action::Insert(LivePoint {
            id,
            metric_type: sample.metric_type,
            value: sample.value,
            unit: sample.unit.clone(),
            timestamp: sample.timestamp,
            samples: 1,
        }))
    }
}

/// Snapshot of a live session stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LiveState {
    pub session_id: String,
    /// Oldest first.
    pub points: Vec<LivePoint>,
    pub connection: ConnectionState,
    pub error: Option<FeedError>,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum Command {
    Reconnect,
}

/// Handle to a live metric stream for one session.
///
/// Dropping the handle stops the actor and releases the subscription.
pub struct LiveSessionMetrics {
    state: watch::Receiver<LiveState>,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for LiveSessionMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSessionMetrics").finish_non_exhaustive()
    }
}

impl LiveSessionMetrics {
    /// Subscribe to metric inserts for `session_id`.
    ///
    /// Only samples recorded after the subscription opens are shown.
    pub fn spawn(feed: Arc<dyn ChangeFeed>, session_id: impl Into<String>, config: LiveConfig) -> Self {
        let session_id = session_id.into();
        let (state_tx, state) = watch::channel(LiveState {
            session_id: session_id.clone(),
            ..LiveState::default()
        });
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);

        let actor = LiveActor {
            feed,
            session_id,
            buffer: LiveBuffer::new(config),
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

    pub fn state(&self) -> LiveState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LiveState> {
        self.state.clone()
    }

    pub async fn reconnect(&self) {
        let _ = self.commands.send(Command::Reconnect).await;
    }
}

impl Drop for LiveSessionMetrics {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct LiveActor {
    feed: Arc<dyn ChangeFeed>,
    session_id: String,
    buffer: LiveBuffer,
    subscription: Option<Subscription>,
    state: watch::Sender<LiveState>,
}

impl LiveActor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        self.connect().await;

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Reconnect) => self.connect().await,
                    None => break,
                },
                event = next_change(&mut self.subscription) => self.handle_event(event),
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

        let filter = FeedFilter::table(Table::Metrics).eq("session_id", self.session_id.as_str());
        match self.feed.subscribe(filter).await {
            Ok(subscription) => {
                tracing::debug!(session = %self.session_id, "Live metrics connected");
                self.subscription = Some(subscription);
                self.state.send_modify(|s| {
                    s.connection = ConnectionState::Connected;
                    s.error = None;
                });
            }
            Err(e) => {
                tracing::warn!(session = %self.session_id, error = %e, "Live metrics subscription failed");
                self.state.send_modify(|s| {
                    s.connection = ConnectionState::Error;
                    s.error = Some(e);
                });
            }
        }
    }

    fn handle_event(&mut self, event: Result<Option<RowChange>, FeedError>) {
        match event {
            Ok(Some(change)) if change.kind == ChangeKind::Insert => {
                let sample: MetricSample = match change.decode() {
                    Ok(sample) => sample,
                    Err(e) => {
                        tracing::warn!(session = %self.session_id, error = %e, "Undecodable metric row");
                        return;
                    }
                };
                if self.buffer.push(&sample) {
                    let points = self.buffer.points();
                    self.state.send_modify(|s| {
                        s.points = points;
                        s.last_update = Some(Utc::now());
                    });
                }
            }
            // samples are immutable; updates and deletes do not affect the view
            Ok(Some(_)) => {}
            Err(FeedError::Lagged(n)) => {
                tracing::warn!(session = %self.session_id, dropped = n, "Live metrics lagged");
            }
            Ok(None) => {
                self.subscription = None;
                self.state.send_modify(|s| {
                    s.connection = ConnectionState::Disconnected;
                    s.error = Some(FeedError::Closed);
                });
            }
            Err(e) => {
                self.subscription = None;
                self.state.send_modify(|s| {
                    s.connection = ConnectionState::Error;
                    s.error = Some(e);
                });
            }
        }
    }
}
