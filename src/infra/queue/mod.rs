//! Mutable priority-queue disciplines used for queued queries and eligible
//! sub-groups.
//!
//! One trait, three interchangeable implementations selected by scheduling
//! policy. Queue contents survive a live policy switch: the old structure is
//! drained and every entry re-inserted into a freshly built structure of the
//! new kind.

use std::hash::Hash;

use crate::util::serde::SchedulingPolicy;

pub mod fifo;
pub mod indexed;
pub mod stochastic;

pub use fifo::FifoQueue;
pub use indexed::IndexedPriorityQueue;
pub use stochastic::StochasticPriorityQueue;

/// A mutable priority queue supporting in-place priority updates and
/// removal by identity.
///
/// Priorities are `u64` values where larger means "dequeue sooner"; the
/// FIFO discipline ignores them and the stochastic discipline interprets
/// them as sampling weights.
pub trait UpdateablePriorityQueue<T>: Send {
    /// Insert `item`, or reposition it if already present. Returns `true`
    /// if the item was newly inserted.
    fn add_or_update(&mut self, item: T, priority: u64) -> bool;

    /// Whether `item` is currently queued.
    fn contains(&self, item: &T) -> bool;

    /// Remove `item` if present. Returns `true` if it was removed.
    fn remove(&mut self, item: &T) -> bool;

    /// Remove and return the next item together with its stored priority.
    fn poll_entry(&mut self) -> Option<(T, u64)>;

    /// Remove and return the next item.
    fn poll(&mut self) -> Option<T> {
        self.poll_entry().map(|(item, _)| item)
    }

    /// The next item, without removing it.
    fn peek(&self) -> Option<&T>;

    /// The stored priority of the next item.
    fn peek_priority(&self) -> Option<u64>;

    /// Number of queued items.
    fn len(&self) -> usize;

    /// Whether the queue is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over queued items. Order is the discipline's natural order
    /// where one exists (FIFO arrival order, strict priority order) and
    /// unspecified for the stochastic discipline.
    fn iter(&self) -> Box<dyn Iterator<Item = &T> + '_>;
}

/// Build the queue implementation matching a scheduling policy.
#[must_use]
pub fn queue_for_policy<T>(policy: SchedulingPolicy) -> Box<dyn UpdateablePriorityQueue<T>>
where
    T: Clone + Eq + Hash + Send + 'static,
{
    match policy {
        SchedulingPolicy::Fair => Box::new(FifoQueue::new()),
        SchedulingPolicy::Weighted | SchedulingPolicy::WeightedFair => {
            Box::new(StochasticPriorityQueue::new())
        }
        SchedulingPolicy::QueryPriority => Box::new(IndexedPriorityQueue::new()),
    }
}
