//! Shared test doubles: a scriptable query execution and a synchronous
//! spawner, so scheduling decisions are observable deterministically.

#![allow(dead_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use prometheus_resource_groups::core::{
    FailureCause, QueryExecution, QueryState, SchedulerError, Spawn, StateChangeListener,
};
use prometheus_resource_groups::util::serde::{QueryId, SessionInfo};

/// Shared log of query start order.
pub type StartLog = Arc<Mutex<Vec<QueryId>>>;

/// Create an empty start log.
pub fn start_log() -> StartLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Scriptable query execution: the test drives its lifecycle and the
/// scheduler observes it through the `QueryExecution` contract.
pub struct MockQuery {
    id: QueryId,
    session: SessionInfo,
    cpu_time_millis: AtomicU64,
    memory_bytes: AtomicU64,
    state: Mutex<QueryState>,
    listeners: Mutex<Vec<StateChangeListener>>,
    failure: Mutex<Option<SchedulerError>>,
    started: StartLog,
}

impl MockQuery {
    pub fn new(priority: u64) -> Arc<Self> {
        Self::with_log(priority, start_log())
    }

    pub fn with_log(priority: u64, started: StartLog) -> Arc<Self> {
        Arc::new(Self {
            id: QueryId::new(),
            session: SessionInfo::new("test-user").with_priority(priority),
            cpu_time_millis: AtomicU64::new(0),
            memory_bytes: AtomicU64::new(0),
            state: Mutex::new(QueryState::Queued),
            listeners: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            started,
        })
    }

    pub fn set_cpu_time_millis(&self, millis: u64) {
        self.cpu_time_millis.store(millis, Ordering::Relaxed);
    }

    pub fn set_memory_bytes(&self, bytes: u64) {
        self.memory_bytes.store(bytes, Ordering::Relaxed);
    }

    /// Complete successfully, notifying listeners. Calling twice fires the
    /// listeners twice, which exercises the scheduler's idempotence guard.
    pub fn finish(&self) {
        self.transition(QueryState::Finished);
    }

    /// Cancel: a user-caused terminal failure.
    pub fn cancel(&self) {
        self.transition(QueryState::Failed(FailureCause::User));
    }

    /// Fail with a system-attributed error.
    pub fn fail_with_system_error(&self) {
        self.transition(QueryState::Failed(FailureCause::System));
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock(), QueryState::Running)
    }

    pub fn rejection(&self) -> Option<SchedulerError> {
        self.failure.lock().clone()
    }

    fn transition(&self, next: QueryState) {
        *self.state.lock() = next;
        let listeners = self.listeners.lock();
        for listener in listeners.iter() {
            listener(next);
        }
    }
}

impl QueryExecution for MockQuery {
    fn id(&self) -> QueryId {
        self.id
    }

    fn session(&self) -> &SessionInfo {
        &self.session
    }

    fn state(&self) -> QueryState {
        *self.state.lock()
    }

    fn add_state_change_listener(&self, listener: StateChangeListener) {
        let current = *self.state.lock();
        if current.is_done() {
            listener(current);
        }
        self.listeners.lock().push(listener);
    }

    fn start(&self) {
        // A query cancelled or finished before dispatch stays terminal.
        if self.state().is_done() {
            return;
        }
        self.started.lock().push(self.id);
        self.transition(QueryState::Running);
    }

    fn fail(&self, error: SchedulerError) {
        *self.failure.lock() = Some(error);
        self.transition(QueryState::Failed(FailureCause::User));
    }

    fn total_cpu_time_millis(&self) -> u64 {
        self.cpu_time_millis.load(Ordering::Relaxed)
    }

    fn total_memory_reservation_bytes(&self) -> u64 {
        self.memory_bytes.load(Ordering::Relaxed)
    }
}

/// Spawner that runs the start future on the calling thread, making start
/// dispatch synchronous and test outcomes deterministic.
pub struct DirectSpawner;

impl Spawn for DirectSpawner {
    fn spawn(&self, fut: Pin<Box<dyn Future<Output = ()> + Send + 'static>>) {
        futures::executor::block_on(fut);
    }
}

/// A fresh spawner handle for building trees in tests.
pub fn direct_spawner() -> Arc<dyn Spawn> {
    Arc::new(DirectSpawner)
}
