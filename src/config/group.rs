//! Resource-group and selector configuration structures.
//!
//! These are the shapes an external configuration manager (file- or
//! database-backed) produces and pushes onto live trees. Selector matching
//! itself is the manager's concern; only the persisted shape lives here.

use serde::{Deserialize, Serialize};

use crate::util::serde::SchedulingPolicy;

/// Memory limit expressed as absolute bytes or as a fraction of the
/// coordinator's shared memory pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLimit {
    /// Absolute limit in bytes.
    Bytes(u64),
    /// Fraction of the shared pool, in `[0, 1]`.
    Fraction(f64),
}

impl MemoryLimit {
    /// Resolve to bytes against the given pool size.
    #[must_use]
    pub fn resolve(self, pool_bytes: u64) -> u64 {
        match self {
            Self::Bytes(bytes) => bytes,
            Self::Fraction(fraction) => (pool_bytes as f64 * fraction) as u64,
        }
    }
}

const fn default_weight() -> u64 {
    1
}

/// Hierarchical specification of one group and its sub-groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceGroupSpec {
    /// Group name; may be a template (e.g. `user-${USER}`) resolved by the
    /// configuration manager's selector machinery.
    pub name: String,
    /// Soft memory limit.
    pub soft_memory_limit: MemoryLimit,
    /// Queued-query ceiling.
    pub max_queued: u64,
    /// Running-query ceiling.
    pub max_running: u64,
    /// Queueing discipline. Defaults to fair.
    #[serde(default)]
    pub scheduling_policy: SchedulingPolicy,
    /// Weight within the parent under weighted policies. Defaults to 1.
    #[serde(default = "default_weight")]
    pub scheduling_weight: u64,
    /// Optional soft CPU limit in milliseconds of accumulated usage.
    #[serde(default)]
    pub soft_cpu_limit_millis: Option<u64>,
    /// Optional hard CPU limit in milliseconds of accumulated usage.
    #[serde(default)]
    pub hard_cpu_limit_millis: Option<u64>,
    /// Optional limit on how long a query may stay queued, in seconds.
    /// Enforced by the configuration manager, not by the scheduling core.
    #[serde(default)]
    pub queued_timeout_secs: Option<u64>,
    /// Optional limit on how long a query may run, in seconds. Enforced by
    /// the configuration manager, not by the scheduling core.
    #[serde(default)]
    pub running_timeout_secs: Option<u64>,
    /// Whether the group opts into stats export.
    #[serde(default)]
    pub export_stats: bool,
    /// Nested sub-group specifications.
    #[serde(default)]
    pub sub_groups: Vec<ResourceGroupSpec>,
}

/// Rule mapping a query's session attributes to a target group template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorSpec {
    /// Regex over the submitting user.
    #[serde(default)]
    pub user_regex: Option<String>,
    /// Regex over the client source tag.
    #[serde(default)]
    pub source_regex: Option<String>,
    /// Exact query type to match.
    #[serde(default)]
    pub query_type: Option<String>,
    /// Target group id template, segments joined with dots.
    pub group: String,
}

/// Root configuration: the group forest plus selector rules and the global
/// CPU quota period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceGroupsConfig {
    /// Top-level group specifications; each becomes an independent tree.
    pub root_groups: Vec<ResourceGroupSpec>,
    /// Selector rules, evaluated in order by the configuration manager.
    #[serde(default)]
    pub selectors: Vec<SelectorSpec>,
    /// Period over which a group's hard CPU limit is replenished.
    #[serde(default)]
    pub cpu_quota_period_secs: Option<u64>,
}

impl ResourceGroupSpec {
    /// Validate this spec and its sub-groups.
    pub fn validate(&self, has_quota_period: bool) -> Result<(), String> {
        if self.name.is_empty() || self.name.contains('.') {
            return Err(format!("invalid group name `{}`", self.name));
        }
        if self.scheduling_weight == 0 {
            return Err(format!("group `{}`: scheduling_weight must be positive", self.name));
        }
        if let (Some(soft), Some(hard)) = (self.soft_cpu_limit_millis, self.hard_cpu_limit_millis)
        {
            if soft > hard {
                return Err(format!(
                    "group `{}`: soft CPU limit exceeds hard CPU limit",
                    self.name
                ));
            }
        }
        if (self.soft_cpu_limit_millis.is_some() || self.hard_cpu_limit_millis.is_some())
            && !has_quota_period
        {
            return Err(format!(
                "group `{}`: CPU limits require a cpu_quota_period",
                self.name
            ));
        }
        if let MemoryLimit::Fraction(fraction) = self.soft_memory_limit {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(format!(
                    "group `{}`: memory fraction must be in [0, 1]",
                    self.name
                ));
            }
        }
        // Siblings must agree on whether they are weighted: a mixed set
        // makes the parent's eligible-set ordering meaningless.
        let weighted = |policy: SchedulingPolicy| {
            matches!(
                policy,
                SchedulingPolicy::Weighted | SchedulingPolicy::WeightedFair
            )
        };
        if let Some(first) = self.sub_groups.first() {
            let expect = weighted(first.scheduling_policy);
            if self
                .sub_groups
                .iter()
                .any(|sub| weighted(sub.scheduling_policy) != expect)
            {
                return Err(format!(
                    "group `{}`: mixed weighted and non-weighted sub-groups",
                    self.name
                ));
            }
        }
        if self.scheduling_policy.is_query_priority() {
            for sub in &self.sub_groups {
                if !sub.scheduling_policy.is_query_priority() {
                    return Err(format!(
                        "group `{}` uses query-priority scheduling, so sub-group `{}` must too",
                        self.name, sub.name
                    ));
                }
            }
        }
        for sub in &self.sub_groups {
            sub.validate(has_quota_period)?;
        }
        Ok(())
    }
}

impl ResourceGroupsConfig {
    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.root_groups.is_empty() {
            return Err("at least one root group must be defined".into());
        }
        if let Some(period) = self.cpu_quota_period_secs {
            if period == 0 {
                return Err("cpu_quota_period_secs must be greater than 0".into());
            }
        }
        for spec in &self.root_groups {
            spec.validate(self.cpu_quota_period_secs.is_some())?;
        }
        Ok(())
    }

    /// Parse a configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
