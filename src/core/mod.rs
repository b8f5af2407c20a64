//! Core scheduling abstractions: the resource-group tree, admission
//! control, and supporting contracts.

pub mod error;
pub mod execution;
pub mod group;
pub mod snapshot;
pub mod warnings;

pub use error::{AppResult, SchedulerError};
pub use execution::{
    FailureCause, QueryExecution, QueryExecutionInfo, QueryState, Spawn, StateChangeListener,
};
pub use group::{ResourceGroup, ResourceGroupInfo, RootResourceGroup};
pub use snapshot::QueuedQuerySnapshot;
pub use warnings::{
    BoundedWarningCollector, DrainingWarningCollector, Warning, WarningCode, WarningCollector,
    WarningCollectorConfig,
};
