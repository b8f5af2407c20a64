//! The query-execution collaborator consumed by the scheduler.
//!
//! The scheduler never runs queries itself; it holds handles implementing
//! [`QueryExecution`] and drives them through admission, queueing, start,
//! and completion bookkeeping.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;
use crate::util::serde::{QueryId, SessionInfo};

/// Lifecycle state of a query as observed by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    /// Accepted but not yet dispatched.
    Queued,
    /// Dispatched to the execution engine.
    Running,
    /// Finished successfully.
    Finished,
    /// Terminated with an error; the cause decides CPU attribution.
    Failed(FailureCause),
}

impl QueryState {
    /// Whether this state is terminal.
    #[must_use]
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Finished | Self::Failed(_))
    }
}

/// Who is responsible for a query failure. Cancellation counts as a
/// user-caused failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// The user caused the failure (syntax error, cancellation, ...).
    User,
    /// The system caused the failure (node loss, internal error, ...).
    System,
}

/// Callback invoked on every query state transition.
pub type StateChangeListener = Box<dyn Fn(QueryState) + Send + Sync>;

/// Handle to a query execution managed by the resource-group scheduler.
///
/// # Contract
///
/// * `add_state_change_listener` must invoke the listener immediately,
///   on the registering thread, if the query is already in a terminal
///   state; otherwise completion could race past registration and the
///   scheduler would leak bookkeeping.
/// * Listeners may be invoked from arbitrary threads and will acquire the
///   owning tree's lock; implementations must not hold that lock when
///   firing them.
pub trait QueryExecution: Send + Sync {
    /// Stable identity of this query.
    fn id(&self) -> QueryId;

    /// Session attributes driving priority and selection.
    fn session(&self) -> &SessionInfo;

    /// Current lifecycle state.
    fn state(&self) -> QueryState;

    /// Whether the query has reached a terminal state.
    fn is_done(&self) -> bool {
        self.state().is_done()
    }

    /// Register a listener for state transitions. See the trait contract
    /// for terminal-state registration semantics.
    fn add_state_change_listener(&self, listener: StateChangeListener);

    /// Begin execution. Invoked asynchronously after admission.
    fn start(&self);

    /// Fail the query synchronously, e.g. on admission rejection.
    fn fail(&self, error: SchedulerError);

    /// Total CPU time consumed so far, in milliseconds.
    fn total_cpu_time_millis(&self) -> u64;

    /// Current memory reservation in bytes.
    fn total_memory_reservation_bytes(&self) -> u64;

    /// Read-only summary for monitoring surfaces.
    fn info(&self) -> QueryExecutionInfo {
        QueryExecutionInfo {
            id: self.id(),
            state: self.state(),
            session: self.session().clone(),
            cpu_time_millis: self.total_cpu_time_millis(),
            memory_reservation_bytes: self.total_memory_reservation_bytes(),
        }
    }
}

/// Snapshot of a query execution for introspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryExecutionInfo {
    /// Query identity.
    pub id: QueryId,
    /// Lifecycle state at snapshot time.
    pub state: QueryState,
    /// Session attributes.
    pub session: SessionInfo,
    /// CPU time consumed so far.
    pub cpu_time_millis: u64,
    /// Memory reservation at snapshot time.
    pub memory_reservation_bytes: u64,
}

/// Abstraction for dispatching query starts onto a runtime.
///
/// Object-safe so a tree can hold it behind `Arc<dyn Spawn>`; the future is
/// boxed at the call site. Implementations must not run the future
/// synchronously on the calling thread: dispatch happens while the tree
/// lock is held, and the started query may immediately re-enter the
/// scheduler through its completion listener.
pub trait Spawn: Send + Sync {
    /// Spawn a future to completion in the background.
    fn spawn(&self, fut: Pin<Box<dyn Future<Output = ()> + Send + 'static>>);
}
