//! Smart refresh: interaction-aware polling.
//!
//! - [`machine`]: the pure scheduling state machine
//! - [`scheduler`]: the tokio driver publishing [`RefreshState`] snapshots

pub mod machine;
pub mod scheduler;

pub use machine::{ManualDecision, Phase, RefreshMachine, TickDecision};
pub use scheduler::{
    DEFAULT_INTERACTION_WINDOW, FetchError, FnSource, MIN_INTERVAL, RefreshClass, RefreshConfig,
    RefreshSource, RefreshState, SmartRefresh,
};
