//! Listening history
//!
//! Bounded record of recently played items, used both for "previous track"
//! and for the repeat penalty when choosing what plays next.

use crate::catalog::ItemId;
use std::collections::VecDeque;

/// Default number of items remembered.
pub const DEFAULT_HISTORY_SIZE: usize = 100;

/// Ring of recently played items (most recent = back).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRing {
    items: VecDeque<ItemId>,
    capacity: usize,
}

impl HistoryRing {
    /// Create an empty ring. A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Rebuild a ring from ids ordered oldest first, keeping the newest
    /// `capacity` of them.
    #[must_use]
    pub fn from_ids(ids: impl IntoIterator<Item = ItemId>, capacity: usize) -> Self {
        let mut ring = Self::new(capacity);
        for id in ids {
            ring.push(id);
        }
        ring
    }

    /// Append an item, evicting the oldest one when full.
    pub fn push(&mut self, item: ItemId) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Remove and return the most recently pushed item.
    pub fn pop_last(&mut self) -> Option<ItemId> {
        self.items.pop_back()
    }

    #[must_use]
    pub fn last(&self) -> Option<ItemId> {
        self.items.back().copied()
    }

    #[must_use]
    pub fn contains(&self, item: ItemId) -> bool {
        self.items.contains(&item)
    }

    /// Oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = ItemId> + '_ {
        self.items.iter().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether a "previous" request has anything to go back to.
    #[must_use]
    pub fn can_go_back(&self) -> bool {
        !self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl Default for HistoryRing {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}
