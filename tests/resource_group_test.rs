//! Integration tests for hierarchical admission control and scheduling.
//!
//! These validate:
//! 1. Capacity enforcement across ancestor chains
//! 2. CPU soft-limit penalties and hard cutoffs
//! 3. Quota replenishment over time
//! 4. Live scheduling-policy switches
//! 5. Weighted scheduling across sibling sub-groups
//! 6. Counter and eligibility invariants under churn

mod common;

use std::sync::Arc;

use common::{direct_spawner, start_log, MockQuery};
use prometheus_resource_groups::core::{
    QueryExecution, QueryState, RootResourceGroup, SchedulerError,
};
use prometheus_resource_groups::util::serde::SchedulingPolicy;

fn leaf_root(max_running: u64, max_queued: u64) -> RootResourceGroup {
    let root = RootResourceGroup::new("global", direct_spawner());
    root.group().set_max_running_queries(max_running);
    root.group().set_max_queued_queries(max_queued);
    root
}

#[test]
fn test_capacity_enforcement() {
    let root = leaf_root(1, 1);
    let group = root.group();

    let q1 = MockQuery::new(1);
    let q2 = MockQuery::new(1);
    let q3 = MockQuery::new(1);

    group.run(q1.clone());
    group.run(q2.clone());
    group.run(q3.clone());

    assert!(q1.is_running());
    assert_eq!(q2.state(), QueryState::Queued);
    assert!(q3.state().is_done());
    assert!(matches!(
        q3.rejection(),
        Some(SchedulerError::QueueFull { .. })
    ));

    assert_eq!(group.num_running_queries(), 1);
    assert_eq!(group.num_queued_queries(), 1);
    root.check_invariants();
}

#[test]
fn test_queued_query_starts_when_capacity_frees() {
    let root = leaf_root(1, 5);
    let group = root.group();

    let q1 = MockQuery::new(1);
    let q2 = MockQuery::new(1);
    group.run(q1.clone());
    group.run(q2.clone());
    assert!(q1.is_running());
    assert!(!q2.is_running());

    q1.finish();
    root.process_queued_queries();

    assert!(q2.is_running());
    assert_eq!(group.num_queued_queries(), 0);
    root.check_invariants();
}

#[test]
fn test_new_arrival_does_not_jump_queue() {
    let root = leaf_root(2, 5);
    let group = root.group();

    let log = start_log();
    let q1 = MockQuery::with_log(1, log.clone());
    let q2 = MockQuery::with_log(1, log.clone());
    let q3 = MockQuery::with_log(1, log.clone());
    group.run(q1.clone());
    group.run(q2.clone());
    group.run(q3.clone());
    assert!(!q3.is_running());

    q1.finish();
    // Capacity exists but q3 is ahead in the queue; q4 must wait its turn.
    let q4 = MockQuery::with_log(1, log.clone());
    group.run(q4.clone());
    assert!(!q4.is_running());

    root.process_queued_queries();
    assert!(q3.is_running());
    assert!(!q4.is_running());
    assert_eq!(log.lock().as_slice(), &[q1.id(), q2.id(), q3.id()]);
    root.check_invariants();
}

#[test]
fn test_query_finished_is_idempotent() {
    let root = leaf_root(5, 5);
    let group = root.group();

    let q = MockQuery::new(1);
    q.set_cpu_time_millis(100);
    group.run(q.clone());
    assert!(q.is_running());

    q.finish();
    q.finish();

    // The second listener invocation must not double-charge or underflow.
    assert_eq!(group.cpu_usage_millis(), 100);
    assert_eq!(group.num_running_queries(), 0);
    root.check_invariants();
}

#[test]
fn test_system_failure_does_not_charge_cpu() {
    let root = leaf_root(5, 5);
    let group = root.group();

    let q = MockQuery::new(1);
    q.set_cpu_time_millis(700);
    group.run(q.clone());
    q.fail_with_system_error();

    assert_eq!(group.cpu_usage_millis(), 0);
    assert_eq!(group.num_running_queries(), 0);
}

#[test]
fn test_cancellation_charges_cpu() {
    let root = leaf_root(5, 5);
    let group = root.group();

    let q = MockQuery::new(1);
    q.set_cpu_time_millis(300);
    group.run(q.clone());
    q.cancel();

    assert_eq!(group.cpu_usage_millis(), 300);
}

#[test]
fn test_soft_cpu_limit_penalty() {
    let root = leaf_root(10, 10);
    let group = root.group();
    group.set_soft_cpu_limit_millis(100);
    group.set_hard_cpu_limit_millis(200);

    // Accrue 150ms of usage: halfway into the penalty band.
    let warmup = MockQuery::new(1);
    warmup.set_cpu_time_millis(150);
    group.run(warmup.clone());
    warmup.finish();
    assert_eq!(group.cpu_usage_millis(), 150);

    // Effective ceiling: 10 - floor(10 * 0.5) = 5.
    let queries: Vec<_> = (0..6).map(|_| MockQuery::new(1)).collect();
    for q in &queries {
        group.run(q.clone());
    }
    let running = queries.iter().filter(|q| q.is_running()).count();
    assert_eq!(running, 5);
    assert_eq!(group.num_queued_queries(), 1);
    root.check_invariants();
}

#[test]
fn test_hard_cpu_limit_blocks_and_quota_unblocks() {
    let root = leaf_root(10, 10);
    let group = root.group();
    group.set_soft_cpu_limit_millis(100);
    group.set_hard_cpu_limit_millis(200);

    let warmup = MockQuery::new(1);
    warmup.set_cpu_time_millis(250);
    group.run(warmup.clone());
    warmup.finish();

    // Past the hard limit: submissions queue instead of starting.
    let q = MockQuery::new(1);
    group.run(q.clone());
    assert!(!q.is_running());
    assert_eq!(group.num_queued_queries(), 1);

    group.set_cpu_quota_generation_millis_per_second(40);
    root.generate_cpu_quota(5);
    assert_eq!(group.cpu_usage_millis(), 50);

    root.process_queued_queries();
    assert!(q.is_running());
    root.check_invariants();
}

#[test]
fn test_cpu_quota_decay() {
    let root = leaf_root(10, 10);
    let group = root.group();

    let warmup = MockQuery::new(1);
    warmup.set_cpu_time_millis(500);
    group.run(warmup.clone());
    warmup.finish();
    assert_eq!(group.cpu_usage_millis(), 500);

    group.set_cpu_quota_generation_millis_per_second(40);
    root.generate_cpu_quota(10);
    assert_eq!(group.cpu_usage_millis(), 100);

    // Zero elapsed time replenishes nothing.
    root.generate_cpu_quota(0);
    assert_eq!(group.cpu_usage_millis(), 100);
}

#[test]
fn test_soft_memory_limit_gates_admission() {
    let root = leaf_root(10, 10);
    let group = root.group();
    group.set_soft_memory_limit_bytes(1_000);

    let big = MockQuery::new(1);
    big.set_memory_bytes(1_500);
    group.run(big.clone());
    assert!(big.is_running());

    // The refresh pass picks up the reservation; admission then queues.
    root.process_queued_queries();
    assert_eq!(group.memory_usage_bytes(), 1_500);

    let q = MockQuery::new(1);
    group.run(q.clone());
    assert!(!q.is_running());

    big.finish();
    root.process_queued_queries();
    assert!(q.is_running());
    root.check_invariants();
}

#[test]
fn test_policy_switch_preserves_queue_membership() {
    let root = leaf_root(0, 10);
    let group = root.group();

    let log = start_log();
    let low = MockQuery::with_log(1, log.clone());
    let high = MockQuery::with_log(9, log.clone());
    let mid = MockQuery::with_log(5, log.clone());
    group.run(low.clone());
    group.run(high.clone());
    group.run(mid.clone());
    assert_eq!(group.num_queued_queries(), 3);

    group.set_scheduling_policy(SchedulingPolicy::QueryPriority);
    assert_eq!(group.num_queued_queries(), 3);
    root.check_invariants();

    group.set_max_running_queries(3);
    root.process_queued_queries();

    // Same three queries, none lost or duplicated, in priority order.
    assert_eq!(log.lock().as_slice(), &[high.id(), mid.id(), low.id()]);
    assert_eq!(group.num_running_queries(), 3);
}

#[test]
fn test_weighted_siblings_end_to_end() {
    let root = RootResourceGroup::new("global", direct_spawner());
    root.group().set_max_running_queries(2);
    root.group().set_max_queued_queries(10);
    root.group().set_scheduling_policy(SchedulingPolicy::Weighted);

    let group_a = root.group().get_or_create_sub_group("a");
    group_a.set_max_running_queries(1);
    group_a.set_max_queued_queries(10);
    group_a.set_scheduling_policy(SchedulingPolicy::Weighted);
    group_a.set_scheduling_weight(10);

    let group_b = root.group().get_or_create_sub_group("b");
    group_b.set_max_running_queries(1);
    group_b.set_max_queued_queries(10);
    group_b.set_scheduling_policy(SchedulingPolicy::Weighted);
    group_b.set_scheduling_weight(1);

    let a1 = MockQuery::new(1);
    let a2 = MockQuery::new(1);
    let b1 = MockQuery::new(1);
    let b2 = MockQuery::new(1);
    group_a.run(a1.clone());
    group_a.run(a2.clone());
    group_b.run(b1.clone());
    group_b.run(b2.clone());

    // One query runs per child (each child's own ceiling is 1); the rest queue.
    assert!(a1.is_running());
    assert!(b1.is_running());
    assert_eq!(root.group().num_running_queries(), 2);
    assert_eq!(root.group().num_queued_queries(), 2);
    root.check_invariants();

    // Cancelling A's runner promotes A's queued query; B's stays queued
    // behind B's own still-running query.
    a1.cancel();
    root.process_queued_queries();

    assert!(a2.is_running());
    assert!(!b2.is_running());
    assert_eq!(group_a.num_running_queries(), 1);
    assert_eq!(group_a.num_queued_queries(), 0);
    assert_eq!(group_b.num_queued_queries(), 1);
    assert_eq!(root.group().num_running_queries(), 2);
    root.check_invariants();
}

#[test]
fn test_counters_consistent_in_deep_tree() {
    let root = RootResourceGroup::new("global", direct_spawner());
    root.group().set_max_running_queries(10);
    root.group().set_max_queued_queries(10);
    let team = root.group().get_or_create_sub_group("team");
    team.set_max_running_queries(5);
    team.set_max_queued_queries(5);
    let leaf_a = team.get_or_create_sub_group("a");
    leaf_a.set_max_running_queries(1);
    leaf_a.set_max_queued_queries(2);
    let leaf_b = team.get_or_create_sub_group("b");
    leaf_b.set_max_running_queries(2);
    leaf_b.set_max_queued_queries(2);

    let queries: Vec<_> = (0..3).map(|_| MockQuery::new(1)).collect();
    leaf_a.run(queries[0].clone());
    leaf_a.run(queries[1].clone());
    leaf_b.run(queries[2].clone());
    root.check_invariants();

    assert_eq!(team.num_running_queries(), 2);
    assert_eq!(team.num_queued_queries(), 1);
    assert_eq!(root.group().num_running_queries(), 2);

    queries[0].finish();
    root.check_invariants();
    root.process_queued_queries();
    root.check_invariants();

    assert!(queries[1].is_running());
    assert_eq!(root.group().num_queued_queries(), 0);

    queries[1].finish();
    queries[2].finish();
    root.check_invariants();
    assert_eq!(root.group().num_running_queries(), 0);
}

#[test]
fn test_query_priority_forced_on_subtree() {
    let root = RootResourceGroup::new("global", direct_spawner());
    let child = root.group().get_or_create_sub_group("child");
    assert_eq!(child.scheduling_policy(), SchedulingPolicy::Fair);

    root.group()
        .set_scheduling_policy(SchedulingPolicy::QueryPriority);
    assert_eq!(child.scheduling_policy(), SchedulingPolicy::QueryPriority);

    // Children created afterwards inherit the forced policy.
    let grandchild = child.get_or_create_sub_group("grandchild");
    assert_eq!(
        grandchild.scheduling_policy(),
        SchedulingPolicy::QueryPriority
    );
}

#[test]
fn test_info_snapshot() {
    let root = leaf_root(2, 5);
    let group = root.group();
    group.set_export_stats(true);

    let q1 = MockQuery::new(1);
    let q2 = MockQuery::new(1);
    let q3 = MockQuery::new(1);
    group.run(q1.clone());
    group.run(q2.clone());
    group.run(q3.clone());

    let info = group.info();
    assert_eq!(info.id.to_string(), "global");
    assert_eq!(info.num_running_queries, 2);
    assert_eq!(info.num_queued_queries, 1);
    assert_eq!(info.max_running_queries, 2);
    assert!(info.export_stats);
    assert!(info.sub_groups.is_empty());

    // Snapshots serialize for export surfaces.
    let encoded = serde_json::to_string(&info).unwrap();
    assert!(encoded.contains("\"global\""));
}

#[test]
#[should_panic(expected = "not a leaf group")]
fn test_run_on_internal_group_panics() {
    let root = RootResourceGroup::new("global", direct_spawner());
    root.group().set_max_running_queries(1);
    root.group().set_max_queued_queries(1);
    let _child = root.group().get_or_create_sub_group("child");

    root.group().run(MockQuery::new(1));
}

#[test]
#[should_panic(expected = "while queries are running or queued")]
fn test_sub_group_creation_forbidden_once_occupied() {
    let root = leaf_root(1, 1);
    let group = root.group();
    group.run(MockQuery::new(1));

    group.get_or_create_sub_group("late");
}

#[test]
fn test_terminal_query_cleans_up_at_listener_registration() {
    let root = leaf_root(5, 5);
    let group = root.group();

    // The query reaches a terminal state before submission ever completes;
    // the listener fires synchronously at registration time, so the
    // bookkeeping entry added during admission is reclaimed immediately.
    let q = MockQuery::new(1);
    q.set_cpu_time_millis(40);
    q.finish();
    group.run(q.clone());

    assert_eq!(group.num_running_queries(), 0);
    assert_eq!(group.num_queued_queries(), 0);
    assert_eq!(group.cpu_usage_millis(), 40);
    root.check_invariants();
}
