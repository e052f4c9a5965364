//! Smart-refresh driver.
//!
//! [`SmartRefresh`] runs one tokio task per scheduler. The task owns a
//! [`RefreshMachine`], an interval timer and the current snapshot, and
//! publishes every change through a `watch` channel. Fetches run as
//! separate tasks that report back over a channel, so ticks keep being
//! processed (and skipped) while a fetch is in flight.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::refresh::machine::{ManualDecision, RefreshMachine, TickDecision};

/// Minimum allowed refresh interval (1 second).
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Default trailing window during which an interaction pauses refreshes.
pub const DEFAULT_INTERACTION_WINDOW: Duration = Duration::from_secs(5);

const COMMAND_BUFFER: usize = 32;

/// A failed fetch. The message is kept for display; prior data stays.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fetch failed: {message}")]
pub struct FetchError {
    pub message: String,
}

impl FetchError {
    pub fn new(message: impl std::fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Refresh cadence class with a default interval.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RefreshClass {
    /// 5 seconds.
    Realtime,
    /// 15 seconds.
    Frequent,
    /// 30 seconds.
    #[default]
    Standard,
    /// 5 minutes.
    Background,
}

impl RefreshClass {
    pub fn default_interval(self) -> Duration {
        match self {
            Self::Realtime => Duration::from_secs(5),
            Self::Frequent => Duration::from_secs(15),
            Self::Standard => Duration::from_secs(30),
            Self::Background => Duration::from_secs(300),
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshConfig {
    pub interval: Duration,
    pub pause_on_interaction: bool,
    pub interaction_window: Duration,
    pub enabled: bool,
    /// Identifies the scheduler in logs.
    pub cache_key: Option<String>,
    pub class: RefreshClass,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self::for_class(RefreshClass::default())
    }
}

impl RefreshConfig {
    /// Configuration using the class's default interval.
    pub fn for_class(class: RefreshClass) -> Self {
        Self {
            interval: class.default_interval(),
            pause_on_interaction: false,
            interaction_window: DEFAULT_INTERACTION_WINDOW,
            enabled: true,
            cache_key: None,
            class,
        }
    }

    /// Override the interval.
    ///
    /// Interval is clamped to a minimum of 1 second.
    pub fn interval(mut self, interval: Duration) -> Self {
        if interval < MIN_INTERVAL {
            tracing::warn!(min_interval = ?MIN_INTERVAL,
                "Refresh interval is less than minimum allowed. Using minimum interval."
            );
            self.interval = MIN_INTERVAL;
        } else {
            self.interval = interval;
        }
        self
    }

    pub fn pause_on_interaction(mut self, pause: bool) -> Self {
        self.pause_on_interaction = pause;
        self
    }

    pub fn interaction_window(mut self, window: Duration) -> Self {
        self.interaction_window = window;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }
}

/// Asynchronous data source polled by the scheduler.
#[async_trait::async_trait]
pub trait RefreshSource: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    async fn fetch(&self) -> Result<Self::Output, FetchError>;
}

/// [`RefreshSource`] backed by a closure returning a future.
pub struct FnSource<F>(pub F);

#[async_trait::async_trait]
impl<F, Fut, T> RefreshSource for FnSource<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    async fn fetch(&self) -> Result<T, FetchError> {
        (self.0)().await
    }
}

/// Snapshot published after every state change.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshState<T> {
    /// Latest successful data, or the supplied initial value.
    pub data: Option<T>,
    pub is_refreshing: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub next_refresh: Option<Instant>,
    /// Error from the most recent fetch; cleared by the next success.
    pub error: Option<FetchError>,
    pub is_paused: bool,
}

impl<T> Default for RefreshState<T> {
    fn default() -> Self {
        Self {
            data: None,
            is_refreshing: false,
            last_updated: None,
            next_refresh: None,
            error: None,
            is_paused: false,
        }
    }
}

#[derive(Debug)]
enum Command {
    Refresh,
    Interaction(Instant),
    SetEnabled(bool),
}

/// Handle to a running smart-refresh scheduler.
///
/// Dropping the handle stops the scheduler; a fetch already in flight runs
/// to completion but its result is discarded.
pub struct SmartRefresh<T> {
    state: watch::Receiver<RefreshState<T>>,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl<T> std::fmt::Debug for SmartRefresh<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartRefresh").finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> SmartRefresh<T> {
    /// Start polling `source`.
    ///
    /// Without `initial` data the first fetch runs immediately; with it, the
    /// first fetch happens on the first tick.
    pub fn spawn<S>(source: S, config: RefreshConfig, initial: Option<T>) -> Self
    where
        S: RefreshSource<Output = T>,
    {
        let (state_tx, state) = watch::channel(RefreshState {
            data: initial.clone(),
            ..RefreshState::default()
        });
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);

        let driver = Driver {
            source: Arc::new(source),
            machine: RefreshMachine::new(
                config.enabled,
                config.pause_on_interaction,
                config.interaction_window,
            ),
            config,
            state: state_tx,
        };
        let task = tokio::spawn(driver.run(command_rx, initial.is_some()));

        Self {
            state,
            commands,
            task,
        }
    }

    /// Current snapshot.
    pub fn state(&self) -> RefreshState<T> {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<RefreshState<T>> {
        self.state.clone()
    }

    /// Fetch now and restart the interval from this moment.
    pub async fn refresh(&self) {
        let _ = self.commands.send(Command::Refresh).await;
    }

    /// Record a user interaction.
    pub async fn notify_interaction(&self) {
        let _ = self
            .commands
            .send(Command::Interaction(Instant::now()))
            .await;
    }

    /// Enable or disable scheduled fetches. Manual refresh keeps working.
    pub async fn set_enabled(&self, enabled: bool) {
        let _ = self.commands.send(Command::SetEnabled(enabled)).await;
    }

    /// Stop the scheduler.
    pub fn shutdown(self) {}
}

impl<T> Drop for SmartRefresh<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Driver<S: RefreshSource> {
    source: Arc<S>,
    machine: RefreshMachine,
    config: RefreshConfig,
    state: watch::Sender<RefreshState<S::Output>>,
}

impl<S: RefreshSource> Driver<S> {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, has_initial: bool) {
        let key = self.config.cache_key.clone().unwrap_or_default();
        let period = self.config.interval;
        let mut next_tick = Instant::now() + period;
        let mut ticker = tokio::time::interval_at(next_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let (done_tx, mut done_rx) = mpsc::channel(1);
        // A manual refresh that joined an in-flight fetch restarts the
        // interval once that fetch settles.
        let mut reset_pending = false;

        tracing::debug!(cache_key = %key, class = %self.config.class, ?period, "Smart refresh started");

        self.machine.schedule();
        if !has_initial && self.machine.on_manual() == ManualDecision::Fetch {
            self.start_fetch(&done_tx);
        }
        self.publish_schedule(next_tick);

        loop {
            let resume_at = self.machine.resume_at().map(Instant::from_std);

            tokio::select! {
                _ = ticker.tick() => {
                    let now = Instant::now();
                    next_tick = now + period;
                    match self.machine.on_tick(now.into_std()) {
                        TickDecision::Fetch => self.start_fetch(&done_tx),
                        TickDecision::SkipInFlight => {
                            tracing::trace!(cache_key = %key, "Tick skipped, fetch in flight");
                        }
                        TickDecision::SkipPaused => {
                            tracing::debug!(cache_key = %key, "Tick skipped, recent interaction");
                        }
                        TickDecision::Disabled => {}
                    }
                    self.publish_schedule(next_tick);
                }
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    match cmd {
                        Command::Refresh => match self.machine.on_manual() {
                            ManualDecision::Fetch => {
                                self.start_fetch(&done_tx);
                                ticker.reset();
                                next_tick = Instant::now() + period;
                            }
                            ManualDecision::Coalesced => reset_pending = true,
                        },
                        Command::Interaction(at) => self.machine.on_interaction(at.into_std()),
                        Command::SetEnabled(enabled) => self.machine.set_enabled(enabled),
                    }
                    self.publish_schedule(next_tick);
                }
                Some(result) = done_rx.recv() => {
                    let now = Instant::now();
                    self.machine.on_complete(now.into_std());
                    self.finish_fetch(result, &key);
                    if std::mem::take(&mut reset_pending) {
                        ticker.reset();
                        next_tick = now + period;
                    }
                    self.publish_schedule(next_tick);
                }
                _ = tokio::time::sleep_until(resume_at.unwrap_or_else(Instant::now)), if resume_at.is_some() => {
                    if self.machine.on_resume(Instant::now().into_std()) {
                        tracing::debug!(cache_key = %key, "Interaction window elapsed, resuming");
                    }
                    self.publish_schedule(next_tick);
                }
            }
        }

        tracing::debug!(cache_key = %key, "Smart refresh stopped");
    }

    fn start_fetch(&self, done: &mpsc::Sender<Result<S::Output, FetchError>>) {
        let source = Arc::clone(&self.source);
        let done = done.clone();
        tokio::spawn(async move {
            let result = source.fetch().await;
            let _ = done.send(result).await;
        });
        self.state.send_modify(|state| state.is_refreshing = true);
    }

    fn finish_fetch(&self, result: Result<S::Output, FetchError>, key: &str) {
        self.state.send_modify(|state| {
            state.is_refreshing = false;
            match result {
                Ok(data) => {
                    state.data = Some(data);
                    state.error = None;
                    state.last_updated = Some(Utc::now());
                }
                Err(e) => {
                    tracing::warn!(cache_key = %key, error = %e, "Refresh failed, keeping previous data");
                    state.error = Some(e);
                }
            }
        });
    }

    fn publish_schedule(&self, next_tick: Instant) {
        let is_paused = self.machine.is_paused();
        let next_refresh = self.machine.is_enabled().then_some(next_tick);
        self.state.send_if_modified(|state| {
            let changed = state.is_paused != is_paused || state.next_refresh != next_refresh;
            state.is_paused = is_paused;
            state.next_refresh = next_refresh;
            changed
        });
    }
}
