//! Bounded, thread-safe collectors for diagnostic warnings.
//!
//! Producers call `add` from many threads while a single consumer reads
//! snapshots. Both collectors deduplicate by warning code and cap growth;
//! they differ in consumption semantics: one caches an immutable snapshot
//! for read-mostly polling, the other drains atomically for per-task reset.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use std::collections::HashMap;

use crate::util::clock::now_ms;

/// Code identifying a class of warning, the deduplication key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WarningCode(pub u32);

/// A single diagnostic warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    /// Deduplication code.
    pub code: WarningCode,
    /// Human-readable message.
    pub message: String,
    /// Creation timestamp in milliseconds since epoch.
    pub created_at_ms: u128,
}

impl Warning {
    /// Build a warning from a code and message, stamped with the current
    /// time.
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code: WarningCode(code),
            message: message.into(),
            created_at_ms: now_ms(),
        }
    }
}

/// Growth caps for a warning collector.
#[derive(Debug, Clone)]
pub struct WarningCollectorConfig {
    /// Maximum warnings retained in total.
    pub max_warnings: usize,
    /// Maximum number of distinct warning codes.
    pub max_distinct_codes: usize,
    /// Maximum warnings retained per individual code.
    pub max_warnings_per_code: usize,
}

impl Default for WarningCollectorConfig {
    fn default() -> Self {
        Self {
            max_warnings: 1_000,
            max_distinct_codes: 100,
            max_warnings_per_code: 10,
        }
    }
}

/// Shared contract of the collector variants.
pub trait WarningCollector: Send + Sync {
    /// Record a warning, subject to the configured caps. Over-cap warnings
    /// are dropped silently.
    fn add(&self, warning: Warning);

    /// Snapshot of the accumulated warnings.
    fn warnings(&self) -> Arc<Vec<Warning>>;
}

struct BoundedState {
    warnings: Vec<Warning>,
    per_code: HashMap<WarningCode, usize>,
    cached: Arc<Vec<Warning>>,
    cached_size: usize,
}

/// Collector whose snapshot is cached and only rebuilt when the underlying
/// size changed since the last read. Suited to read-mostly consumers that
/// poll `warnings` far more often than producers add.
pub struct BoundedWarningCollector {
    config: WarningCollectorConfig,
    state: Mutex<BoundedState>,
}

impl BoundedWarningCollector {
    /// Create a collector with the given caps.
    #[must_use]
    pub fn new(config: WarningCollectorConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BoundedState {
                warnings: Vec::new(),
                per_code: HashMap::new(),
                cached: Arc::new(Vec::new()),
                cached_size: 0,
            }),
        }
    }
}

impl WarningCollector for BoundedWarningCollector {
    fn add(&self, warning: Warning) {
        let mut state = self.state.lock();
        if state.warnings.len() >= self.config.max_warnings {
            return;
        }
        let seen = state.per_code.get(&warning.code).copied().unwrap_or(0);
        if seen == 0 && state.per_code.len() >= self.config.max_distinct_codes {
            return;
        }
        if seen >= self.config.max_warnings_per_code {
            return;
        }
        state.per_code.insert(warning.code, seen + 1);
        state.warnings.push(warning);
    }

    fn warnings(&self) -> Arc<Vec<Warning>> {
        let mut state = self.state.lock();
        if state.cached_size != state.warnings.len() {
            state.cached = Arc::new(state.warnings.clone());
            state.cached_size = state.warnings.len();
        }
        Arc::clone(&state.cached)
    }
}

struct DrainingState {
    warnings: Vec<Warning>,
    per_code: HashMap<WarningCode, usize>,
}

/// Collector drained atomically by its consumer, for per-task reset
/// semantics. Caps total size and distinct codes but not repeats of a
/// single code within one drain window.
pub struct DrainingWarningCollector {
    config: WarningCollectorConfig,
    state: Mutex<DrainingState>,
}

impl DrainingWarningCollector {
    /// Create a collector with the given caps.
    #[must_use]
    pub fn new(config: WarningCollectorConfig) -> Self {
        Self {
            config,
            state: Mutex::new(DrainingState {
                warnings: Vec::new(),
                per_code: HashMap::new(),
            }),
        }
    }

    /// Return the accumulated warnings and atomically empty the collector.
    #[must_use]
    pub fn take_warnings(&self) -> Vec<Warning> {
        let mut state = self.state.lock();
        state.per_code.clear();
        std::mem::take(&mut state.warnings)
    }
}

impl WarningCollector for DrainingWarningCollector {
    fn add(&self, warning: Warning) {
        let mut state = self.state.lock();
        if state.warnings.len() >= self.config.max_warnings {
            return;
        }
        let seen = state.per_code.get(&warning.code).copied().unwrap_or(0);
        if seen == 0 && state.per_code.len() >= self.config.max_distinct_codes {
            return;
        }
        state.per_code.insert(warning.code, seen + 1);
        state.warnings.push(warning);
    }

    fn warnings(&self) -> Arc<Vec<Warning>> {
        Arc::new(self.state.lock().warnings.clone())
    }
}
