//! Read-only snapshot of every queued query in a tree, in approximate
//! dequeue order.
//!
//! Draining the live priority queues destructively would corrupt the
//! scheduling order, so the builder mirrors them instead: under the root
//! lock, each live queue is drained into a shadow queue of the same
//! discipline and a freshly rebuilt live queue simultaneously, then the
//! shadows are drained root-first into the output list. The rebuild pass
//! costs O(n log n) but leaves the live ordering exactly as it was and
//! cannot race with concurrent admission.
//!
//! The resulting positions reflect each level's configured discipline
//! reasonably; they are not a hard global ordering guarantee.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::group::{GroupKey, RootResourceGroup, TreeState, ROOT};
use crate::infra::queue::{queue_for_policy, UpdateablePriorityQueue};
use crate::util::serde::{QueryId, ResourceGroupId, SessionInfo};

/// One queued query as seen by the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedQuerySnapshot {
    /// Leaf group holding the query.
    pub group: ResourceGroupId,
    /// Query identity.
    pub query: QueryId,
    /// Session attributes of the query.
    pub session: SessionInfo,
    /// Best-effort position in the global dequeue order, starting at 1.
    pub approximate_position: usize,
}

/// Mirror of one group's live queues, same discipline as the original.
struct ShadowNode {
    queued: Box<dyn UpdateablePriorityQueue<QueryId>>,
    children: Box<dyn UpdateablePriorityQueue<GroupKey>>,
}

/// Phase A: mirror every node's queues, rebuilding the live structures in
/// the same pass. Iterative with an explicit stack; trees can be deep.
fn build_shadows(state: &mut TreeState) -> HashMap<GroupKey, ShadowNode> {
    let mut shadows = HashMap::new();
    let mut stack = vec![ROOT];
    while let Some(key) = stack.pop() {
        let policy = state.nodes[key].scheduling_policy;

        let mut shadow_queued = queue_for_policy::<QueryId>(policy);
        let mut rebuilt_queued = queue_for_policy::<QueryId>(policy);
        while let Some((query, priority)) = state.nodes[key].queued_queries.poll_entry() {
            shadow_queued.add_or_update(query, priority);
            rebuilt_queued.add_or_update(query, priority);
        }
        state.nodes[key].queued_queries = rebuilt_queued;

        let mut shadow_children = queue_for_policy::<GroupKey>(policy);
        let mut rebuilt_children = queue_for_policy::<GroupKey>(policy);
        while let Some((child, priority)) = state.nodes[key].eligible_subgroups.poll_entry() {
            shadow_children.add_or_update(child, priority);
            rebuilt_children.add_or_update(child, priority);
        }
        state.nodes[key].eligible_subgroups = rebuilt_children;

        // The eligible set misses children whose subtrees hold queued work
        // but are out of running capacity right now; append them so every
        // queued query appears in the snapshot.
        for index in 0..state.nodes[key].children.len() {
            let child = state.nodes[key].children[index];
            let child_node = &state.nodes[child];
            let has_queued = !child_node.queued_queries.is_empty()
                || child_node.descendant_queued_queries > 0;
            if has_queued && !shadow_children.contains(&child) {
                let priority = state.subgroup_scheduling_priority(policy, child);
                shadow_children.add_or_update(child, priority);
            }
        }

        shadows.insert(
            key,
            ShadowNode {
                queued: shadow_queued,
                children: shadow_children,
            },
        );
        stack.extend(state.nodes[key].children.iter().copied());
    }
    shadows
}

/// Phase B: drain the shadows root-first, descending into the
/// highest-priority child with remaining work and re-inserting
/// still-nonempty intermediate nodes into their parent's shadow between
/// pops, so multi-level fairness is approximated.
fn drain_shadows(
    state: &TreeState,
    shadows: &mut HashMap<GroupKey, ShadowNode>,
) -> Vec<QueuedQuerySnapshot> {
    let mut output = Vec::new();
    loop {
        // Descend to the next query; `path` records the child edges taken
        // with the priority each child held in its parent's shadow.
        let mut path: Vec<(GroupKey, u64)> = Vec::new();
        let mut current = ROOT;
        let mut polled = None;
        loop {
            let shadow = shadows
                .get_mut(&current)
                .unwrap_or_else(|| panic!("no shadow built for group key {current}"));
            if let Some((query, _)) = shadow.queued.poll_entry() {
                polled = Some((current, query));
                break;
            }
            match shadow.children.poll_entry() {
                Some((child, priority)) => {
                    path.push((child, priority));
                    current = child;
                }
                None => break,
            }
        }
        let exhausted = polled.is_none() && path.is_empty();

        if let Some((leaf, query)) = polled {
            let node = &state.nodes[leaf];
            let session = node
                .members
                .get(&query)
                .unwrap_or_else(|| panic!("queued query {query} has no execution handle"))
                .session()
                .clone();
            output.push(QueuedQuerySnapshot {
                group: node.id.clone(),
                query,
                session,
                approximate_position: output.len() + 1,
            });
        }

        // Walk the path back up, deepest first, so a node's remaining work
        // is known before its parent decides whether to re-insert it.
        // Dead-end edges are dropped, which guarantees progress.
        for index in (0..path.len()).rev() {
            let (child, priority) = path[index];
            let parent = if index == 0 { ROOT } else { path[index - 1].0 };
            let has_work = {
                let shadow = &shadows[&child];
                !shadow.queued.is_empty() || !shadow.children.is_empty()
            };
            if has_work {
                if let Some(parent_shadow) = shadows.get_mut(&parent) {
                    parent_shadow.children.add_or_update(child, priority);
                }
            }
        }

        if exhausted {
            break;
        }
    }
    output
}

impl RootResourceGroup {
    /// Build a read-only list of all currently queued queries across the
    /// tree, ordered approximately as the configured per-level disciplines
    /// would dequeue them. Runs entirely under the root lock; the live
    /// queues are left in their exact prior order.
    #[must_use]
    pub fn queued_queries_snapshot(&self) -> Vec<QueuedQuerySnapshot> {
        let mut state = self.group.shared.state.lock();
        let mut shadows = build_shadows(&mut state);
        drain_shadows(&state, &mut shadows)
    }
}
