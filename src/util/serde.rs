//! Serializable value types shared across the scheduler.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a query known to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryId(Uuid);

impl QueryId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Position of a group within a tree, as an ordered sequence of name
/// segments (e.g. `global.user-alice`). Immutable once the group exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceGroupId(Vec<String>);

impl ResourceGroupId {
    /// Identifier for a top-level (root) group.
    pub fn root(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// Identifier built from pre-split segments. Must be non-empty.
    ///
    /// # Panics
    ///
    /// Panics if `segments` is empty.
    #[must_use]
    pub fn from_segments(segments: Vec<String>) -> Self {
        assert!(!segments.is_empty(), "group id must have at least one segment");
        Self(segments)
    }

    /// Identifier of a child group under this one.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    /// The ordered name segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// The final segment (the group's own name).
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for ResourceGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Session attributes of a submitted query, consumed for admission and
/// priority decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Submitting user.
    pub user: String,
    /// Client source tag, if any.
    pub source: Option<String>,
    /// Query priority attribute; only meaningful under query-priority
    /// scheduling, treated as a weight otherwise.
    pub query_priority: u64,
}

impl SessionInfo {
    /// Session for `user` with default priority and no source.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            source: None,
            query_priority: 1,
        }
    }

    /// Same session with a different query priority.
    #[must_use]
    pub fn with_priority(mut self, priority: u64) -> Self {
        self.query_priority = priority;
        self
    }
}

/// Queueing discipline of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPolicy {
    /// First-in-first-out; priorities are ignored.
    Fair,
    /// Weighted random selection among queued entries.
    Weighted,
    /// Weighted random selection with fair-share weight interpretation.
    WeightedFair,
    /// Strict ordering by query priority, ties broken by arrival.
    QueryPriority,
}

impl SchedulingPolicy {
    /// Whether this policy orders strictly by the session query priority.
    #[must_use]
    pub const fn is_query_priority(self) -> bool {
        matches!(self, Self::QueryPriority)
    }
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self::Fair
    }
}

impl fmt::Display for SchedulingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fair => "fair",
            Self::Weighted => "weighted",
            Self::WeightedFair => "weighted_fair",
            Self::QueryPriority => "query_priority",
        };
        f.write_str(name)
    }
}
