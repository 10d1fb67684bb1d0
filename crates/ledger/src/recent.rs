//! Bounded, insertion-ordered set of recently seen content keys.
//!
//! HeapRb keeps insertion order for eviction, the HashSet answers lookups.

use std::collections::HashSet;
use std::fmt;

use contracts::ContentRef;
use ringbuf::{traits::*, HeapRb};

pub const DEFAULT_RECENT_CAPACITY: usize = 1000;

/// Fixed-capacity recent set; inserting into a full set evicts the oldest key
pub struct RecentSet {
    order: HeapRb<ContentRef>,
    members: HashSet<ContentRef>,
    capacity: usize,
    evicted: u64,
}

impl fmt::Debug for RecentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecentSet")
            .field("len", &self.members.len())
            .field("capacity", &self.capacity)
            .field("evicted", &self.evicted)
            .finish()
    }
}

impl Default for RecentSet {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_CAPACITY)
    }
}

impl RecentSet {
    /// `capacity` is clamped to at least 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: HeapRb::new(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    #[inline]
    pub fn contains(&self, key: &ContentRef) -> bool {
        self.members.contains(key)
    }

    /// Insert `key`; returns false if it was already present
    pub fn insert(&mut self, key: ContentRef) -> bool {
        if self.members.contains(&key) {
            return false;
        }

        if self.order.is_full() {
            if let Some(oldest) = self.order.try_pop() {
                self.members.remove(&oldest);
                self.evicted += 1;
            }
        }

        self.members.insert(key.clone());
        let _ = self.order.try_push(key);
        true
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys evicted since creation
    #[inline]
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}
