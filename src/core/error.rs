//! Error types for scheduler operations.

use thiserror::Error;

use crate::util::serde::ResourceGroupId;

/// Errors produced by scheduler components.
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    /// Every ancestor queue slot is taken; the query cannot be admitted.
    #[error("queue full for group {group}")]
    QueueFull {
        /// Group the query was submitted to.
        group: ResourceGroupId,
    },
    /// A configuration value was rejected before it reached a live group.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
