//! Pending-review pool.
//!
//! Reviews wait here between submission and block assembly. The pool is a
//! plain FIFO: the dispatcher takes a batch once enough have accumulated,
//! and a batch whose block failed to link goes back to the front so it is
//! retried before anything submitted later.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;

use crate::ledger::Review;

/// A thread-safe FIFO of reviews awaiting a block.
#[derive(Default)]
pub struct ReviewPool {
    queue: Mutex<VecDeque<Review>>,
}

impl fmt::Debug for ReviewPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReviewPool")
            .field("size", &self.len())
            .finish()
    }
}

impl ReviewPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a review. Never blocks on anything but the pool lock.
    pub fn push(&self, review: Review) {
        self.queue.lock().push_back(review);
    }

    /// Remove and return the oldest `threshold` reviews, but only if at
    /// least that many are waiting. A zero threshold is treated as one.
    pub fn take_batch(&self, threshold: usize) -> Option<Vec<Review>> {
        let threshold = threshold.max(1);
        let mut queue = self.queue.lock();
        if queue.len() < threshold {
            return None;
        }
        Some(queue.drain(..threshold).collect())
    }

    /// Put a batch back at the front, preserving its internal order.
    pub fn requeue_front(&self, batch: Vec<Review>) {
        let mut queue = self.queue.lock();
        for review in batch.into_iter().rev() {
            queue.push_front(review);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
