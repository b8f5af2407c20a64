//! Construct and configure resource-group trees from validated specs.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{ResourceGroupSpec, ResourceGroupsConfig};
use crate::core::{ResourceGroup, RootResourceGroup, SchedulerError, Spawn};

/// Build one tree per configured root group, applying every spec in the
/// hierarchy. Returns the trees keyed by root-group name.
pub fn build_trees(
    cfg: &ResourceGroupsConfig,
    memory_pool_bytes: u64,
    spawner: Arc<dyn Spawn>,
) -> Result<HashMap<String, RootResourceGroup>, SchedulerError> {
    cfg.validate().map_err(SchedulerError::InvalidConfiguration)?;

    let mut trees = HashMap::new();
    for spec in &cfg.root_groups {
        let root = RootResourceGroup::new(&spec.name, Arc::clone(&spawner));
        apply_spec(
            &root.group(),
            spec,
            memory_pool_bytes,
            cfg.cpu_quota_period_secs,
        );
        trees.insert(spec.name.clone(), root);
    }
    Ok(trees)
}

/// Apply a spec to a live group, creating sub-groups as needed. Reapplying
/// an updated spec to an existing tree reconfigures it in place.
pub fn apply_spec(
    group: &ResourceGroup,
    spec: &ResourceGroupSpec,
    memory_pool_bytes: u64,
    cpu_quota_period_secs: Option<u64>,
) {
    group.set_soft_memory_limit_bytes(spec.soft_memory_limit.resolve(memory_pool_bytes));
    group.set_max_running_queries(spec.max_running);
    group.set_max_queued_queries(spec.max_queued);
    group.set_scheduling_policy(spec.scheduling_policy);
    group.set_scheduling_weight(spec.scheduling_weight);
    group.set_export_stats(spec.export_stats);
    if let Some(soft) = spec.soft_cpu_limit_millis {
        group.set_soft_cpu_limit_millis(soft);
    }
    if let Some(hard) = spec.hard_cpu_limit_millis {
        group.set_hard_cpu_limit_millis(hard);
        // The quota replenishes the hard limit once per quota period.
        if let Some(period) = cpu_quota_period_secs {
            group.set_cpu_quota_generation_millis_per_second((hard / period).max(1));
        }
    }
    for sub in &spec.sub_groups {
        let child = group.get_or_create_sub_group(&sub.name);
        apply_spec(&child, sub, memory_pool_bytes, cpu_quota_period_secs);
    }
}
