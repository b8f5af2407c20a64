//! Resource-group tree: hierarchical admission control and query scheduling.
//!
//! A tree of groups shares exactly one lock, owned by the root. Public entry
//! points acquire it; the `TreeState` methods below assume it is held and
//! never lock themselves, which is how the recursive drain and the ancestor
//! walks stay deadlock-free without a reentrant primitive. Admission and
//! eligibility decisions read aggregate state across arbitrary ancestor
//! chains, so every read is consistent with every write by construction.
//!
//! Distinct trees have distinct locks and schedule fully in parallel.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::execution::{QueryExecution, QueryState, Spawn};
use crate::core::{FailureCause, SchedulerError};
use crate::infra::queue::{queue_for_policy, UpdateablePriorityQueue};
use crate::util::serde::{QueryId, ResourceGroupId, SchedulingPolicy};

/// Index of a group in its tree's node arena. Groups are never destroyed,
/// so keys stay valid for the life of the tree.
pub(crate) type GroupKey = usize;

pub(crate) const ROOT: GroupKey = 0;

/// Outcome of an admission decision, resolved under the tree lock.
enum Admission {
    Started,
    Queued,
    Rejected(ResourceGroupId),
}

/// One node of a group tree. A node either has children (internal) or may
/// hold queries directly (leaf); it can never switch from one to the other
/// while occupied.
pub(crate) struct GroupNode {
    pub(crate) id: ResourceGroupId,
    pub(crate) parent: Option<GroupKey>,
    pub(crate) children: Vec<GroupKey>,
    child_names: HashMap<String, GroupKey>,

    // Limits, set only by the external configuration manager.
    soft_memory_limit_bytes: u64,
    max_running_queries: u64,
    max_queued_queries: u64,
    soft_cpu_limit_millis: u64,
    hard_cpu_limit_millis: u64,
    cpu_quota_generation_millis_per_second: u64,
    pub(crate) scheduling_policy: SchedulingPolicy,
    scheduling_weight: u64,
    export_stats: bool,

    // Usage, mutated only under the root lock.
    cpu_usage_millis: u64,
    cached_memory_usage_bytes: u64,
    descendant_running_queries: u64,
    pub(crate) descendant_queued_queries: u64,
    dirty_children: HashSet<GroupKey>,

    pub(crate) queued_queries: Box<dyn UpdateablePriorityQueue<QueryId>>,
    running_queries: HashSet<QueryId>,
    pub(crate) eligible_subgroups: Box<dyn UpdateablePriorityQueue<GroupKey>>,
    pub(crate) members: HashMap<QueryId, Arc<dyn QueryExecution>>,
}

impl GroupNode {
    fn new(id: ResourceGroupId, parent: Option<GroupKey>, policy: SchedulingPolicy) -> Self {
        Self {
            id,
            parent,
            children: Vec::new(),
            child_names: HashMap::new(),
            soft_memory_limit_bytes: u64::MAX,
            max_running_queries: 0,
            max_queued_queries: 0,
            soft_cpu_limit_millis: u64::MAX,
            hard_cpu_limit_millis: u64::MAX,
            cpu_quota_generation_millis_per_second: u64::MAX,
            scheduling_policy: policy,
            scheduling_weight: 1,
            export_stats: false,
            cpu_usage_millis: 0,
            cached_memory_usage_bytes: 0,
            descendant_running_queries: 0,
            descendant_queued_queries: 0,
            dirty_children: HashSet::new(),
            queued_queries: queue_for_policy(policy),
            running_queries: HashSet::new(),
            eligible_subgroups: queue_for_policy(policy),
            members: HashMap::new(),
        }
    }
}

/// Mutable state of a whole tree, guarded by the root lock.
pub(crate) struct TreeState {
    pub(crate) nodes: Vec<GroupNode>,
}

pub(crate) struct TreeShared {
    pub(crate) state: Mutex<TreeState>,
    pub(crate) spawner: Arc<dyn Spawn>,
}

impl TreeState {
    fn can_run_more(&self, key: GroupKey) -> bool {
        let node = &self.nodes[key];
        if node.cpu_usage_millis >= node.hard_cpu_limit_millis {
            return false;
        }
        let mut effective_max = node.max_running_queries;
        if node.cpu_usage_millis >= node.soft_cpu_limit_millis
            && node.soft_cpu_limit_millis < node.hard_cpu_limit_millis
        {
            // Linear penalty between the soft and hard CPU limits. The
            // reduction is at least one query, and the ceiling never drops
            // below one.
            let over = (node.cpu_usage_millis - node.soft_cpu_limit_millis) as f64;
            let range = (node.hard_cpu_limit_millis - node.soft_cpu_limit_millis) as f64;
            let reduction = ((node.max_running_queries as f64 * (over / range)) as u64).max(1);
            effective_max = node.max_running_queries.saturating_sub(reduction).max(1);
        }
        let running = node.running_queries.len() as u64 + node.descendant_running_queries;
        running < effective_max && node.cached_memory_usage_bytes < node.soft_memory_limit_bytes
    }

    fn can_queue_more(&self, key: GroupKey) -> bool {
        let node = &self.nodes[key];
        node.queued_queries.len() as u64 + node.descendant_queued_queries
            < node.max_queued_queries
    }

    fn is_dirty(&self, key: GroupKey) -> bool {
        let node = &self.nodes[key];
        !node.running_queries.is_empty() || node.descendant_running_queries > 0
    }

    fn is_eligible_to_start_next(&self, key: GroupKey) -> bool {
        let node = &self.nodes[key];
        self.can_run_more(key)
            && (!node.queued_queries.is_empty() || !node.eligible_subgroups.is_empty())
    }

    /// Priority of a sub-group within its parent's eligible set: the
    /// subtree's best queued-query priority under query-priority
    /// scheduling, the group's scheduling weight otherwise.
    pub(crate) fn subgroup_scheduling_priority(
        &self,
        policy: SchedulingPolicy,
        key: GroupKey,
    ) -> u64 {
        if policy.is_query_priority() {
            self.highest_query_priority(key)
        } else {
            self.nodes[key].scheduling_weight
        }
    }

    fn highest_query_priority(&self, key: GroupKey) -> u64 {
        let node = &self.nodes[key];
        if node.children.is_empty() {
            node.queued_queries.peek_priority().unwrap_or(0)
        } else {
            node.eligible_subgroups.peek_priority().unwrap_or(0)
        }
    }

    /// Re-evaluate this group's membership in its parent's eligible set and
    /// propagate the re-evaluation root-ward.
    fn update_eligibility(&mut self, key: GroupKey) {
        let mut current = key;
        while let Some(parent) = self.nodes[current].parent {
            let priority =
                self.subgroup_scheduling_priority(self.nodes[parent].scheduling_policy, current);
            if self.is_eligible_to_start_next(current) {
                self.nodes[parent]
                    .eligible_subgroups
                    .add_or_update(current, priority);
            } else {
                self.nodes[parent].eligible_subgroups.remove(&current);
            }
            current = parent;
        }
    }

    fn admit(
        &mut self,
        key: GroupKey,
        query: &Arc<dyn QueryExecution>,
        spawner: &Arc<dyn Spawn>,
    ) -> Admission {
        assert!(
            self.nodes[key].children.is_empty(),
            "cannot add queries to {}: it is not a leaf group",
            self.nodes[key].id
        );
        let mut can_queue = true;
        let mut can_run = true;
        let mut cursor = Some(key);
        while let Some(current) = cursor {
            can_queue &= self.can_queue_more(current);
            can_run &= self.can_run_more(current);
            cursor = self.nodes[current].parent;
        }
        if !can_queue && !can_run {
            return Admission::Rejected(self.nodes[key].id.clone());
        }
        // Start immediately only when capacity holds end-to-end and nothing
        // is already waiting here; otherwise a new arrival would jump the
        // queue between drain ticks.
        if can_run && self.nodes[key].queued_queries.is_empty() {
            self.start_in_background(key, query.clone(), spawner);
            Admission::Started
        } else {
            self.enqueue_query(key, query.clone());
            Admission::Queued
        }
    }

    fn start_in_background(
        &mut self,
        key: GroupKey,
        query: Arc<dyn QueryExecution>,
        spawner: &Arc<dyn Spawn>,
    ) {
        let query_id = query.id();
        let node = &mut self.nodes[key];
        node.running_queries.insert(query_id);
        node.members.insert(query_id, query.clone());
        let mut current = key;
        while let Some(parent) = self.nodes[current].parent {
            let parent_node = &mut self.nodes[parent];
            parent_node.descendant_running_queries += 1;
            parent_node.dirty_children.insert(current);
            current = parent;
        }
        self.update_eligibility(key);
        tracing::debug!("query {} started in group {}", query_id, self.nodes[key].id);
        spawner.spawn(Box::pin(async move {
            query.start();
        }));
    }

    fn enqueue_query(&mut self, key: GroupKey, query: Arc<dyn QueryExecution>) {
        let query_id = query.id();
        let priority = query.session().query_priority;
        let node = &mut self.nodes[key];
        node.queued_queries.add_or_update(query_id, priority);
        node.members.insert(query_id, query);
        let mut current = key;
        while let Some(parent) = self.nodes[current].parent {
            self.nodes[parent].descendant_queued_queries += 1;
            current = parent;
        }
        self.update_eligibility(key);
        tracing::debug!("query {} queued in group {}", query_id, self.nodes[key].id);
    }

    /// Start one query somewhere in this subtree, following each level's
    /// queue discipline. Returns false when nothing can start.
    fn start_next(&mut self, key: GroupKey, spawner: &Arc<dyn Spawn>) -> bool {
        if !self.can_run_more(key) {
            return false;
        }
        if let Some(query_id) = self.nodes[key].queued_queries.poll() {
            let query = self.nodes[key]
                .members
                .get(&query_id)
                .cloned()
                .unwrap_or_else(|| {
                    panic!("queued query {query_id} has no execution handle")
                });
            self.start_in_background(key, query, spawner);
            return true;
        }
        let Some(child) = self.nodes[key].eligible_subgroups.poll() else {
            return false;
        };
        let started = self.start_next(child, spawner);
        assert!(
            started,
            "eligible sub-group {} produced no query",
            self.nodes[child].id
        );
        self.nodes[key].descendant_queued_queries -= 1;
        // No update_eligibility here: ancestors are re-evaluated once per
        // started query by the leaf's bookkeeping, not once per recursion
        // level. The sub-group was evicted by the poll above, so reinsert it
        // if it still has work; repeated draining then rotates through
        // same-priority siblings instead of starving them.
        if self.is_eligible_to_start_next(child) {
            let priority =
                self.subgroup_scheduling_priority(self.nodes[key].scheduling_policy, child);
            self.nodes[key]
                .eligible_subgroups
                .add_or_update(child, priority);
        }
        true
    }

    fn process_queued_queries(&mut self, spawner: &Arc<dyn Spawn>) {
        self.refresh_stats(ROOT);
        while self.start_next(ROOT, spawner) {}
    }

    /// Recompute cached memory usage. Leaves sum their running queries;
    /// internal nodes visit only dirty children, so the traversal is
    /// bounded by where queries actually run.
    fn refresh_stats(&mut self, key: GroupKey) {
        if self.nodes[key].children.is_empty() {
            let node = &self.nodes[key];
            let total = node.running_queries.iter().fold(0u64, |sum, query_id| {
                sum.saturating_add(node.members[query_id].total_memory_reservation_bytes())
            });
            self.nodes[key].cached_memory_usage_bytes = total;
            return;
        }
        let dirty: Vec<GroupKey> = self.nodes[key].dirty_children.iter().copied().collect();
        for child in dirty {
            let old_usage = self.nodes[child].cached_memory_usage_bytes;
            self.nodes[key].cached_memory_usage_bytes = self.nodes[key]
                .cached_memory_usage_bytes
                .saturating_sub(old_usage);
            self.refresh_stats(child);
            let new_usage = self.nodes[child].cached_memory_usage_bytes;
            self.nodes[key].cached_memory_usage_bytes = self.nodes[key]
                .cached_memory_usage_bytes
                .saturating_add(new_usage);
            if !self.is_dirty(child) {
                self.nodes[key].dirty_children.remove(&child);
            }
            if old_usage != new_usage {
                self.update_eligibility(child);
            }
        }
    }

    /// Replenish CPU quota for the whole subtree. Unlike the memory
    /// refresh this cannot be bounded by the dirty set: any group may have
    /// accrued usage since the last tick.
    fn generate_cpu_quota(&mut self, key: GroupKey, elapsed_seconds: u64) {
        let node = &mut self.nodes[key];
        let quota =
            elapsed_seconds.saturating_mul(node.cpu_quota_generation_millis_per_second);
        node.cpu_usage_millis = node.cpu_usage_millis.saturating_sub(quota);
        let children = self.nodes[key].children.clone();
        for child in children {
            self.generate_cpu_quota(child, elapsed_seconds);
        }
    }

    fn query_finished(&mut self, key: GroupKey, query_id: QueryId) {
        let was_running = self.nodes[key].running_queries.contains(&query_id);
        let was_queued = self.nodes[key].queued_queries.contains(&query_id);
        if !was_running && !was_queued {
            // Listener already fired for this query.
            return;
        }
        let query = self.nodes[key]
            .members
            .get(&query_id)
            .cloned()
            .unwrap_or_else(|| panic!("tracked query {query_id} has no execution handle"));

        // Successful queries and user-caused failures (cancellation
        // included) count against the quota; system-caused failures do not.
        let charge = matches!(
            query.state(),
            QueryState::Finished | QueryState::Failed(FailureCause::User)
        );
        if charge {
            let cpu = query.total_cpu_time_millis();
            let mut cursor = Some(key);
            while let Some(current) = cursor {
                let node = &mut self.nodes[current];
                node.cpu_usage_millis = node.cpu_usage_millis.saturating_add(cpu);
                cursor = node.parent;
            }
        }

        if was_running {
            self.nodes[key].running_queries.remove(&query_id);
            let mut current = key;
            while let Some(parent) = self.nodes[current].parent {
                self.nodes[parent].descendant_running_queries -= 1;
                current = parent;
            }
        } else {
            self.nodes[key].queued_queries.remove(&query_id);
            let mut current = key;
            while let Some(parent) = self.nodes[current].parent {
                self.nodes[parent].descendant_queued_queries -= 1;
                current = parent;
            }
        }
        self.nodes[key].members.remove(&query_id);
        self.update_eligibility(key);
        tracing::debug!("query {} finished in group {}", query_id, self.nodes[key].id);
    }

    fn set_scheduling_policy(&mut self, key: GroupKey, policy: SchedulingPolicy) {
        if self.nodes[key].scheduling_policy == policy {
            return;
        }
        if let Some(parent) = self.nodes[key].parent {
            assert!(
                !self.nodes[parent].scheduling_policy.is_query_priority()
                    || policy.is_query_priority(),
                "parent of {} uses query-priority scheduling, so it must too",
                self.nodes[key].id
            );
        }
        if policy.is_query_priority() {
            let children = self.nodes[key].children.clone();
            for child in children {
                self.set_scheduling_policy(child, policy);
            }
        }
        // Migrate both queues into structures of the new discipline,
        // re-keying every entry by its policy-appropriate priority. The
        // lock is held throughout, so no admission or drain observes a
        // half-migrated group.
        let mut subgroups = queue_for_policy::<GroupKey>(policy);
        while let Some(child) = self.nodes[key].eligible_subgroups.poll() {
            let priority = self.subgroup_scheduling_priority(policy, child);
            subgroups.add_or_update(child, priority);
        }
        self.nodes[key].eligible_subgroups = subgroups;

        let mut queued = queue_for_policy::<QueryId>(policy);
        while let Some(query_id) = self.nodes[key].queued_queries.poll() {
            let priority = self.nodes[key].members[&query_id].session().query_priority;
            queued.add_or_update(query_id, priority);
        }
        self.nodes[key].queued_queries = queued;
        self.nodes[key].scheduling_policy = policy;
    }

    /// Apply a limit mutation as a transaction: snapshot the derived
    /// capacity state, mutate, and propagate eligibility only if the
    /// derived state actually changed. Keeps no-op configuration pushes
    /// from churning the whole ancestor chain.
    fn update_limit<F: FnOnce(&mut GroupNode)>(&mut self, key: GroupKey, mutate: F) {
        let could_run = self.can_run_more(key);
        mutate(&mut self.nodes[key]);
        if self.can_run_more(key) != could_run {
            self.update_eligibility(key);
        }
    }

    fn get_or_create_child(&mut self, key: GroupKey, name: &str) -> GroupKey {
        if let Some(&existing) = self.nodes[key].child_names.get(name) {
            return existing;
        }
        assert!(
            self.nodes[key].running_queries.is_empty()
                && self.nodes[key].queued_queries.is_empty(),
            "cannot add sub-group to {} while queries are running or queued",
            self.nodes[key].id
        );
        let id = self.nodes[key].id.child(name);
        // Query-priority scheduling is forced on the whole subtree.
        let policy = if self.nodes[key].scheduling_policy.is_query_priority() {
            SchedulingPolicy::QueryPriority
        } else {
            SchedulingPolicy::Fair
        };
        let child = self.nodes.len();
        self.nodes.push(GroupNode::new(id, Some(key), policy));
        self.nodes[key].children.push(child);
        self.nodes[key].child_names.insert(name.to_string(), child);
        child
    }

    fn info(&self, key: GroupKey) -> ResourceGroupInfo {
        let node = &self.nodes[key];
        ResourceGroupInfo {
            id: node.id.clone(),
            scheduling_policy: node.scheduling_policy,
            scheduling_weight: node.scheduling_weight,
            soft_memory_limit_bytes: node.soft_memory_limit_bytes,
            memory_usage_bytes: node.cached_memory_usage_bytes,
            max_running_queries: node.max_running_queries,
            max_queued_queries: node.max_queued_queries,
            num_running_queries: node.running_queries.len() as u64
                + node.descendant_running_queries,
            num_queued_queries: node.queued_queries.len() as u64
                + node.descendant_queued_queries,
            cpu_usage_millis: node.cpu_usage_millis,
            export_stats: node.export_stats,
            sub_groups: node.children.iter().map(|&child| self.info(child)).collect(),
        }
    }

    fn check_invariants(&self, key: GroupKey) -> (u64, u64) {
        let node = &self.nodes[key];
        let mut running_below = 0;
        let mut queued_below = 0;
        for &child in &node.children {
            let (child_running, child_queued) = self.check_invariants(child);
            let child_node = &self.nodes[child];
            running_below += child_running + child_node.running_queries.len() as u64;
            queued_below += child_queued + child_node.queued_queries.len() as u64;

            let listed = node.eligible_subgroups.contains(&child);
            let eligible = self.is_eligible_to_start_next(child);
            assert!(
                listed == eligible,
                "group {} eligibility mismatch: listed={listed}, eligible={eligible}",
                child_node.id
            );
        }
        assert!(
            node.descendant_running_queries == running_below,
            "group {} descendant running counter {} != recount {}",
            node.id,
            node.descendant_running_queries,
            running_below
        );
        assert!(
            node.descendant_queued_queries == queued_below,
            "group {} descendant queued counter {} != recount {}",
            node.id,
            node.descendant_queued_queries,
            queued_below
        );
        (running_below, queued_below)
    }
}

/// Read-only recursive snapshot of a group for monitoring and export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceGroupInfo {
    /// Group identity.
    pub id: ResourceGroupId,
    /// Queueing discipline.
    pub scheduling_policy: SchedulingPolicy,
    /// Weight within the parent under weighted policies.
    pub scheduling_weight: u64,
    /// Soft memory limit in bytes.
    pub soft_memory_limit_bytes: u64,
    /// Cached aggregate memory usage in bytes.
    pub memory_usage_bytes: u64,
    /// Running-query ceiling before CPU penalties.
    pub max_running_queries: u64,
    /// Queued-query ceiling.
    pub max_queued_queries: u64,
    /// Running queries in this group and its subtree.
    pub num_running_queries: u64,
    /// Queued queries in this group and its subtree.
    pub num_queued_queries: u64,
    /// Accumulated CPU usage in milliseconds, net of quota replenishment.
    pub cpu_usage_millis: u64,
    /// Whether this group opted into stats export.
    pub export_stats: bool,
    /// Snapshots of all child groups, in creation order.
    pub sub_groups: Vec<ResourceGroupInfo>,
}

/// Handle to one group in a tree. Cheap to clone; all methods synchronize
/// on the tree's root lock.
#[derive(Clone)]
pub struct ResourceGroup {
    pub(crate) shared: Arc<TreeShared>,
    pub(crate) key: GroupKey,
}

impl ResourceGroup {
    /// This group's identifier.
    #[must_use]
    pub fn id(&self) -> ResourceGroupId {
        self.shared.state.lock().nodes[self.key].id.clone()
    }

    /// Fetch the child group `name`, creating it if absent.
    ///
    /// # Panics
    ///
    /// Panics if this group already holds running or queued queries; a
    /// group cannot become internal once it has accepted work.
    pub fn get_or_create_sub_group(&self, name: &str) -> Self {
        let key = self
            .shared
            .state
            .lock()
            .get_or_create_child(self.key, name);
        Self {
            shared: Arc::clone(&self.shared),
            key,
        }
    }

    /// Submit a query to this leaf group.
    ///
    /// Walks the ancestor chain once: if any ancestor is out of both
    /// running and queueing capacity the query fails synchronously with
    /// [`SchedulerError::QueueFull`]; otherwise it starts immediately or
    /// queues. The completion listener is registered after the admission
    /// critical section, so a query that is already terminal cleans itself
    /// up without deadlocking the tree lock.
    ///
    /// # Panics
    ///
    /// Panics if this group has sub-groups; only leaves accept queries.
    pub fn run(&self, query: Arc<dyn QueryExecution>) {
        let query_id = query.id();
        let admission = {
            let mut state = self.shared.state.lock();
            state.admit(self.key, &query, &self.shared.spawner)
        };
        if let Admission::Rejected(group) = admission {
            tracing::debug!("query {} rejected: queue full for group {}", query_id, group);
            query.fail(SchedulerError::QueueFull { group });
            return;
        }
        let shared = Arc::downgrade(&self.shared);
        let key = self.key;
        query.add_state_change_listener(Box::new(move |state| {
            if !state.is_done() {
                return;
            }
            if let Some(shared) = shared.upgrade() {
                shared.state.lock().query_finished(key, query_id);
            }
        }));
    }

    /// Running queries in this group and its subtree.
    #[must_use]
    pub fn num_running_queries(&self) -> u64 {
        let state = self.shared.state.lock();
        let node = &state.nodes[self.key];
        node.running_queries.len() as u64 + node.descendant_running_queries
    }

    /// Queued queries in this group and its subtree.
    #[must_use]
    pub fn num_queued_queries(&self) -> u64 {
        let state = self.shared.state.lock();
        let node = &state.nodes[self.key];
        node.queued_queries.len() as u64 + node.descendant_queued_queries
    }

    /// Accumulated CPU usage in milliseconds.
    #[must_use]
    pub fn cpu_usage_millis(&self) -> u64 {
        self.shared.state.lock().nodes[self.key].cpu_usage_millis
    }

    /// Cached aggregate memory usage in bytes, as of the last refresh.
    #[must_use]
    pub fn memory_usage_bytes(&self) -> u64 {
        self.shared.state.lock().nodes[self.key].cached_memory_usage_bytes
    }

    /// Current scheduling policy.
    #[must_use]
    pub fn scheduling_policy(&self) -> SchedulingPolicy {
        self.shared.state.lock().nodes[self.key].scheduling_policy
    }

    /// Recursive read-only snapshot of this group and its descendants.
    #[must_use]
    pub fn info(&self) -> ResourceGroupInfo {
        self.shared.state.lock().info(self.key)
    }

    /// Set the soft memory limit in bytes.
    pub fn set_soft_memory_limit_bytes(&self, limit: u64) {
        self.shared
            .state
            .lock()
            .update_limit(self.key, |node| node.soft_memory_limit_bytes = limit);
    }

    /// Set the running-query ceiling.
    pub fn set_max_running_queries(&self, limit: u64) {
        self.shared
            .state
            .lock()
            .update_limit(self.key, |node| node.max_running_queries = limit);
    }

    /// Set the queued-query ceiling.
    pub fn set_max_queued_queries(&self, limit: u64) {
        self.shared.state.lock().nodes[self.key].max_queued_queries = limit;
    }

    /// Set the soft CPU limit, raising the hard limit if it would fall
    /// below the new soft one.
    pub fn set_soft_cpu_limit_millis(&self, limit: u64) {
        self.shared.state.lock().update_limit(self.key, |node| {
            if limit > node.hard_cpu_limit_millis {
                node.hard_cpu_limit_millis = limit;
            }
            node.soft_cpu_limit_millis = limit;
        });
    }

    /// Set the hard CPU limit, lowering the soft limit if it would exceed
    /// the new hard one.
    pub fn set_hard_cpu_limit_millis(&self, limit: u64) {
        self.shared.state.lock().update_limit(self.key, |node| {
            if limit < node.soft_cpu_limit_millis {
                node.soft_cpu_limit_millis = limit;
            }
            node.hard_cpu_limit_millis = limit;
        });
    }

    /// Set the CPU quota replenishment rate in milliseconds per second.
    pub fn set_cpu_quota_generation_millis_per_second(&self, rate: u64) {
        self.shared.state.lock().nodes[self.key].cpu_quota_generation_millis_per_second = rate;
    }

    /// Set the scheduling weight used by weighted parent policies.
    pub fn set_scheduling_weight(&self, weight: u64) {
        let mut state = self.shared.state.lock();
        state.nodes[self.key].scheduling_weight = weight;
        if let Some(parent) = state.nodes[self.key].parent {
            let weighted = matches!(
                state.nodes[parent].scheduling_policy,
                SchedulingPolicy::Weighted | SchedulingPolicy::WeightedFair
            );
            if weighted && state.nodes[parent].eligible_subgroups.contains(&self.key) {
                state.nodes[parent]
                    .eligible_subgroups
                    .add_or_update(self.key, weight);
            }
        }
    }

    /// Switch the queueing discipline, migrating queue contents atomically.
    /// Switching to query-priority forces the whole subtree along.
    pub fn set_scheduling_policy(&self, policy: SchedulingPolicy) {
        self.shared.state.lock().set_scheduling_policy(self.key, policy);
    }

    /// Opt this group in or out of stats export.
    pub fn set_export_stats(&self, export: bool) {
        self.shared.state.lock().nodes[self.key].export_stats = export;
    }
}

/// The root of a resource-group tree.
///
/// Owns the tree's single lock and exposes the two periodic entry points an
/// external timer drives: draining queues as capacity allows and
/// replenishing CPU quota.
#[derive(Clone)]
pub struct RootResourceGroup {
    pub(crate) group: ResourceGroup,
}

impl RootResourceGroup {
    /// Create a new tree whose root group is named `name`. Query starts are
    /// dispatched through `spawner`.
    #[must_use]
    pub fn new(name: &str, spawner: Arc<dyn Spawn>) -> Self {
        let root = GroupNode::new(ResourceGroupId::root(name), None, SchedulingPolicy::Fair);
        let shared = Arc::new(TreeShared {
            state: Mutex::new(TreeState { nodes: vec![root] }),
            spawner,
        });
        Self {
            group: ResourceGroup {
                shared,
                key: ROOT,
            },
        }
    }

    /// Handle to the root group.
    #[must_use]
    pub fn group(&self) -> ResourceGroup {
        self.group.clone()
    }

    /// Refresh usage statistics, then start queued queries until no group
    /// has remaining capacity. Intended to run on a fixed-rate timer.
    pub fn process_queued_queries(&self) {
        let shared = &self.group.shared;
        shared.state.lock().process_queued_queries(&shared.spawner);
    }

    /// Replenish CPU quota across the whole tree for `elapsed_seconds` of
    /// wall time. A zero elapsed time is a no-op.
    pub fn generate_cpu_quota(&self, elapsed_seconds: u64) {
        if elapsed_seconds == 0 {
            return;
        }
        self.group
            .shared
            .state
            .lock()
            .generate_cpu_quota(ROOT, elapsed_seconds);
    }

    /// Verify the tree's internal invariants by full recount: descendant
    /// counters must match the true subtree sums, and eligible-set
    /// membership must match each group's actual eligibility. Debugging
    /// aid; panics on violation.
    pub fn check_invariants(&self) {
        self.group.shared.state.lock().check_invariants(ROOT);
    }
}
