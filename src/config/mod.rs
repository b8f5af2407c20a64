//! Configuration models for resource-group trees and selectors.

pub mod group;

pub use group::{
    MemoryLimit, ResourceGroupSpec, ResourceGroupsConfig, SelectorSpec,
};
