//! Infrastructure building blocks backing the scheduler core.

pub mod queue;

pub use queue::{
    queue_for_policy, FifoQueue, IndexedPriorityQueue, StochasticPriorityQueue,
    UpdateablePriorityQueue,
};
