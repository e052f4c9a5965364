//! Keyed local state folded from tagged actions.
//!
//! Feed notifications and optimistic patches both go through
//! [`KeyedState::apply`], so merge behavior is testable without a feed.

use std::collections::VecDeque;
use std::fmt::Debug;

use serde::de::DeserializeOwned;

use crate::realtime::feed::{ChangeKind, FeedError, RowChange};
use crate::storage::AlertInstance;

/// Record with a primary key.
pub trait Keyed {
    type Key: PartialEq + Clone + Debug;

    fn key(&self) -> Self::Key;
}

impl Keyed for AlertInstance {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

/// Where new records go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertOrder {
    /// Newest first.
    #[default]
    Prepend,
    /// Oldest first.
    Append,
}

/// State change applied by the reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum Action<R: Keyed> {
    /// Add a record; an existing record with the same key is replaced in place.
    Insert(R),
    /// Replace the record with the same key; unknown keys are ignored.
    Update(R),
    Remove(R::Key),
    /// Replace the whole state (e.g. after a refetch).
    Replace(Vec<R>),
}

impl<R: Keyed + DeserializeOwned> Action<R> {
    /// Translate a feed notification into an action.
    pub fn from_change(change: &RowChange) -> Result<Self, FeedError> {
        let record: R = change.decode()?;
        Ok(match change.kind {
            ChangeKind::Insert => Self::Insert(record),
            ChangeKind::Update => Self::Update(record),
            ChangeKind::Delete => Self::Remove(record.key()),
        })
    }
}

/// Ordered records, unique by key, with optional FIFO capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedState<R> {
    items: VecDeque<R>,
    order: InsertOrder,
    capacity: Option<usize>,
}

impl<R> Default for KeyedState<R> {
    fn default() -> Self {
        Self::new(InsertOrder::default())
    }
}

impl<R> KeyedState<R> {
    pub fn new(order: InsertOrder) -> Self {
        Self {
            items: VecDeque::new(),
            order,
            capacity: None,
        }
    }

    /// Keep at most `capacity` records, evicting the oldest first.
    pub fn with_capacity(order: InsertOrder, capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            order,
            capacity: Some(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// In display order; reversible for newest/oldest lookups.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &R> {
        self.items.iter()
    }

    fn evict(&mut self) {
        let Some(capacity) = self.capacity else {
            return;
        };
        while self.items.len() > capacity {
            match self.order {
                InsertOrder::Prepend => self.items.pop_back(),
                InsertOrder::Append => self.items.pop_front(),
            };
        }
    }
}

impl<R: Clone> KeyedState<R> {
    pub fn to_vec(&self) -> Vec<R> {
        self.items.iter().cloned().collect()
    }
}

impl<R: Keyed> KeyedState<R> {
    pub fn get(&self, key: &R::Key) -> Option<&R> {
        self.items.iter().find(|r| &r.key() == key)
    }

    fn position(&self, key: &R::Key) -> Option<usize> {
        self.items.iter().position(|r| &r.key() == key)
    }

    /// Apply one action. Returns whether the state changed.
    pub fn apply(&mut self, action: Action<R>) -> bool {
        match action {
            Action::Insert(record) => {
                match self.position(&record.key()) {
                    Some(idx) => self.items[idx] = record,
                    None => {
                        match self.order {
                            InsertOrder::Prepend => self.items.push_front(record),
                            InsertOrder::Append => self.items.push_back(record),
                        }
                        self.evict();
                    }
                }
                true
            }
            Action::Update(record) => match self.position(&record.key()) {
                Some(idx) => {
                    self.items[idx] = record;
                    true
                }
                None => false,
            },
            Action::Remove(key) => self.position(&key).and_then(|idx| self.items.remove(idx)).is_some(),
            Action::Replace(records) => {
                self.items = records.into();
                self.evict();
                true
            }
        }
    }
}
