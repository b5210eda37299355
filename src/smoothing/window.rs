//! Fixed-capacity FIFO buffer for recent predictions
//!
//! Storage is allocated once at construction and never grows: a push onto a
//! full window evicts the oldest entry first.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

/// Bounded first-in-first-out history
#[derive(Debug, Clone)]
pub struct SmoothingWindow<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> SmoothingWindow<T> {
    /// Create a window holding at most `capacity` entries
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.get()),
            capacity: capacity.get(),
        }
    }

    /// Push an entry, returning the evicted oldest entry if the window was full
    pub fn push(&mut self, entry: T) -> Option<T> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &T> + '_ {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
