//! Bounded Event Queue
//!
//! Decouples detection requests from the long-lived live-stream reader:
//! - Producers never block; past the bound the oldest entry is dropped
//! - One consumer waits with a timeout instead of sleeping in a loop
//! - Clearing on exam reset

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace};

/// Default bound (entries)
pub const DEFAULT_CAPACITY: usize = 200;

/// How long the stream reader waits on an empty queue before re-checking
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(400);

/// Bounded FIFO with drop-oldest overflow
pub struct EventQueue<T> {
    entries: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
    pushed: AtomicU64,
    dropped: AtomicU64,
}

impl<T> EventQueue<T> {
    /// Create a queue holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            pushed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Create a queue with the default bound (200)
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    // Every critical section leaves the deque consistent; poisoning is ignored
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an entry, evicting the oldest when full. Returns how many were evicted.
    pub fn push(&self, entry: T) -> usize {
        let evicted = {
            let mut entries = self.lock();
            let mut evicted = 0;
            while entries.len() >= self.capacity {
                entries.pop_front();
                evicted += 1;
            }
            entries.push_back(entry);
            evicted
        };
        self.pushed.fetch_add(1, Ordering::Relaxed);
        if evicted > 0 {
            self.dropped.fetch_add(evicted as u64, Ordering::Relaxed);
            debug!("Event queue full, dropped {} oldest", evicted);
        }
        self.notify.notify_one();
        evicted
    }

    /// Remove and return the oldest entry, if any
    pub fn pop_or_none(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Wait up to `timeout` for an entry.
    ///
    /// Returns `None` once the timeout elapses on an empty queue. Dropping
    /// the future cancels the wait without losing entries.
    pub async fn pop_wait(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(entry) = self.pop_or_none() {
                return Some(entry);
            }
            if timeout_at(deadline, self.notify.notified()).await.is_err() {
                trace!("Event queue wait timed out");
                return self.pop_or_none();
            }
        }
    }

    /// Empty the queue; returns how many entries were discarded
    pub fn clear(&self) -> usize {
        let mut entries = self.lock();
        let n = entries.len();
        entries.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total entries ever pushed
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Total entries evicted by overflow
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
