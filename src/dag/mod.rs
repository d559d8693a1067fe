// src/dag/mod.rs

//! Dependency graph and shared per-run status.
//!
//! - [`graph`] holds the forward (`depends_on`) and reverse (dependent)
//!   edges between stacks, plus cycle detection and plan ordering.
//! - [`status_cache`] is the mutex-guarded map every scheduler task reads
//!   and writes to coordinate with the others.

pub mod graph;
pub mod status_cache;

pub use graph::StackGraph;
pub use status_cache::StatusCache;
