//! Refresh scheduling as an explicit state machine.
//!
//! The machine has no timers of its own: the driver feeds it tick,
//! interaction, completion and manual-refresh events with the current
//! instant and acts on the decisions it returns. Keeping it pure makes
//! races such as a tick arriving during an in-flight fetch testable
//! without a runtime.

use std::time::{Duration, Instant};

use strum_macros::{AsRefStr, Display};

/// Scheduler phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    /// Not scheduled (disabled, or nothing fetched yet).
    Idle,
    /// Waiting for the next tick.
    Scheduled,
    /// A fetch is running.
    InFlight,
    /// Recent interaction; ticks are skipped until the window elapses.
    Paused,
}

/// What the driver should do with a timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    Fetch,
    SkipInFlight,
    SkipPaused,
    Disabled,
}

/// What the driver should do with a manual refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualDecision {
    Fetch,
    /// A fetch is already running; the request joins it.
    Coalesced,
}

#[derive(Debug, Clone)]
pub struct RefreshMachine {
    phase: Phase,
    enabled: bool,
    pause_on_interaction: bool,
    interaction_window: Duration,
    last_interaction: Option<Instant>,
}

impl RefreshMachine {
    pub fn new(enabled: bool, pause_on_interaction: bool, interaction_window: Duration) -> Self {
        Self {
            phase: Phase::Idle,
            enabled,
            pause_on_interaction,
            interaction_window,
            last_interaction: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_in_flight(&self) -> bool {
        self.phase == Phase::InFlight
    }

    pub fn is_paused(&self) -> bool {
        self.phase == Phase::Paused
    }

    /// Mark the machine as waiting for ticks without fetching.
    pub fn schedule(&mut self) {
        if self.enabled && self.phase == Phase::Idle {
            self.phase = Phase::Scheduled;
        }
    }

    fn interaction_active(&self, now: Instant) -> bool {
        self.pause_on_interaction
            && self
                .last_interaction
                .is_some_and(|at| now.saturating_duration_since(at) < self.interaction_window)
    }

    /// Timer tick.
    pub fn on_tick(&mut self, now: Instant) -> TickDecision {
        if !self.enabled {
            return TickDecision::Disabled;
        }
        if self.phase == Phase::InFlight {
            return TickDecision::SkipInFlight;
        }
        if self.interaction_active(now) {
            self.phase = Phase::Paused;
            return TickDecision::SkipPaused;
        }
        self.phase = Phase::InFlight;
        TickDecision::Fetch
    }

    /// Manual refresh: runs regardless of pause or timer phase.
    pub fn on_manual(&mut self) -> ManualDecision {
        if self.phase == Phase::InFlight {
            return ManualDecision::Coalesced;
        }
        self.phase = Phase::InFlight;
        ManualDecision::Fetch
    }

    /// User interaction at `at`.
    pub fn on_interaction(&mut self, at: Instant) {
        self.last_interaction = Some(self.last_interaction.map_or(at, |prev| prev.max(at)));
        if self.pause_on_interaction && self.enabled && self.phase != Phase::InFlight {
            self.phase = Phase::Paused;
        }
    }

    /// The running fetch settled (success or failure).
    pub fn on_complete(&mut self, now: Instant) {
        if self.phase != Phase::InFlight {
            return;
        }
        self.phase = if !self.enabled {
            Phase::Idle
        } else if self.interaction_active(now) {
            Phase::Paused
        } else {
            Phase::Scheduled
        };
    }

    /// Leave `Paused` once the interaction window has elapsed.
    ///
    /// Returns whether the machine resumed.
    pub fn on_resume(&mut self, now: Instant) -> bool {
        if self.phase == Phase::Paused && !self.interaction_active(now) {
            self.phase = Phase::Scheduled;
            return true;
        }
        false
    }

    /// When a paused machine may resume.
    pub fn resume_at(&self) -> Option<Instant> {
        if self.phase != Phase::Paused {
            return None;
        }
        self.last_interaction.map(|at| at + self.interaction_window)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        match (enabled, self.phase) {
            (_, Phase::InFlight) => {}
            (false, _) => self.phase = Phase::Idle,
            (true, Phase::Idle) => self.phase = Phase::Scheduled,
            (true, _) => {}
        }
    }
}
