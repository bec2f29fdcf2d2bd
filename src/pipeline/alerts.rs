//! Alert feed
//!
//! Append-only rolling log of classification results. Writers append under a
//! short write lock; the API reads the most recent window concurrently.

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use super::result::ClassificationResult;

/// Entries kept when no capacity is configured.
pub const DEFAULT_CAPACITY: usize = 1000;

pub struct AlertFeed {
    entries: RwLock<VecDeque<ClassificationResult>>,
    capacity: usize,
    appended: AtomicU64,
}

impl AlertFeed {
    /// `capacity` bounds memory; it must be at least the largest window the
    /// API reads. Zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
            appended: AtomicU64::new(0),
        }
    }

    pub fn append(&self, result: ClassificationResult) {
        let mut entries = self.entries.write();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(result);
        self.appended.fetch_add(1, Ordering::Relaxed);
    }

    /// The last `n` results, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ClassificationResult> {
        let entries = self.entries.read();
        let start = entries.len().saturating_sub(n);
        entries.iter().skip(start).cloned().collect()
    }

    /// Entries currently retained.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Results appended since startup, including evicted ones.
    pub fn total_appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }
}

impl Default for AlertFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
