//! Bounded recent-message-id cache
//!
//! Insertion-ordered FIFO: once full, recording a new id evicts the oldest
//! one. The check and the insert happen under one lock, so concurrent
//! deliveries of the same id cannot both pass.

use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

use crate::config::DEFAULT_DEDUP_CAPACITY;

#[derive(Debug, Default)]
struct DedupInner {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

/// Set of recently seen message ids with a hard capacity
#[derive(Debug)]
pub struct DedupCache {
    inner: Mutex<DedupInner>,
    capacity: usize,
}

impl DedupCache {
    /// Create a cache holding at most `capacity` ids (minimum one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(DedupInner {
                order: VecDeque::with_capacity(capacity),
                seen: HashSet::with_capacity(capacity),
            }),
            capacity,
        }
    }

    /// Record `message_id` if unseen.
    ///
    /// Returns `true` for a first sighting, `false` for a duplicate.
    pub fn check_and_record(&self, message_id: &str) -> bool {
        let mut inner = self.inner.lock();

        if inner.seen.contains(message_id) {
            return false;
        }

        if inner.order.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.seen.remove(&oldest);
            }
        }

        inner.order.push_back(message_id.to_string());
        inner.seen.insert(message_id.to_string());
        true
    }

    /// Whether `message_id` is currently recorded
    pub fn contains(&self, message_id: &str) -> bool {
        self.inner.lock().seen.contains(message_id)
    }

    /// Number of recorded ids
    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of ids retained
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}
