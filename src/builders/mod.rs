//! Builders to construct live group trees from configuration.

pub mod group_builder;

pub use group_builder::{apply_spec, build_trees};
