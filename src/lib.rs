//! # Prometheus Resource Groups
//!
//! Hierarchical admission control and query scheduling for the Prometheus
//! SQL coordinator.
//!
//! This library decides which submitted queries may run immediately, which
//! must queue, and which must be rejected, under per-group limits on
//! concurrency, memory, and CPU usage. Groups form a tree: internal groups
//! subdivide capacity among sub-groups, leaf groups hold queries. Each
//! level picks what to run next with its own queueing discipline (FIFO,
//! weighted-random, or strict query priority).
//!
//! ## Core Problem Solved
//!
//! A coordinator admits queries from many users and sources against shared
//! cluster capacity:
//!
//! - **Concurrency limits**: each group caps how many queries run at once
//! - **Soft limits throttle, hard limits cut off**: CPU overuse shrinks a
//!   group's effective concurrency before it blocks the group entirely
//! - **CPU quota regenerates**: accumulated usage decays over time, so a
//!   group that overspent earns its capacity back
//! - **Live reconfiguration**: an external configuration manager may change
//!   any limit or scheduling policy at any time, without losing queued work
//!
//! ## Scheduling Model
//!
//! Every tree shares a single root-owned lock, so capacity decisions that
//! aggregate state across ancestor chains are always consistent. Query
//! starts are dispatched asynchronously through a [`core::Spawn`] executor
//! so the lock is held only for bookkeeping. A periodic driver calls
//! [`core::RootResourceGroup::process_queued_queries`] and
//! [`core::RootResourceGroup::generate_cpu_quota`] — see
//! [`runtime::spawn_scheduling_driver`].
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_resource_groups::core::RootResourceGroup;
//! use prometheus_resource_groups::runtime::TokioSpawner;
//!
//! let spawner = Arc::new(TokioSpawner::with_default_workers()?);
//! let root = RootResourceGroup::new("global", spawner);
//! root.group().set_max_running_queries(100);
//! root.group().set_max_queued_queries(1000);
//!
//! let adhoc = root.group().get_or_create_sub_group("adhoc");
//! adhoc.set_max_running_queries(10);
//! adhoc.set_max_queued_queries(100);
//!
//! adhoc.run(query); // query: Arc<dyn QueryExecution>
//! root.process_queued_queries();
//! ```
//!
//! For complete examples, see `tests/resource_group_test.rs`.

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: groups, admission, snapshots, warnings.
pub mod core;
/// Configuration models for group trees and selectors.
pub mod config;
/// Builders to construct live trees from configuration.
pub mod builders;
/// Runtime adapters (spawners, periodic driver).
pub mod runtime;
/// Infrastructure building blocks (priority queue disciplines).
pub mod infra;
/// Shared utilities.
pub mod util;
