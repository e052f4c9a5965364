//! Real-time data layer.
//!
//! - [`feed`]: the change-feed interface (`subscribe(filter)` → typed row changes)
//! - [`reducer`]: keyed local state driven by insert/update/remove actions
//! - [`alerts`]: the live alert list with optimistic status patches
//! - [`live`]: bounded, coalesced live metrics for one session

pub mod alerts;
pub mod feed;
pub mod live;
pub mod reducer;

pub use alerts::{AlertFeed, AlertFeedState};
pub use feed::{
    ChangeFeed, ChangeKind, ConnectionState, FeedError, FeedFilter, RowChange, Subscription, Table,
};
pub use live::{LiveBuffer, LiveConfig, LivePoint, LiveSessionMetrics, LiveState};
pub use reducer::{Action, InsertOrder, Keyed, KeyedState};
