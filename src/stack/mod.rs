// src/stack/mod.rs

//! Stack records and how their remote state is derived.
//!
//! - [`model`] holds the per-stack record and remote name derivation.
//! - [`set`] holds the run's stack collection and template loading.
//! - [`state`] maps live backend answers onto [`StackState`](crate::types::StackState).

pub mod model;
pub mod set;
pub mod state;

pub use model::{remote_name, Stack};
pub use set::StackSet;
pub use state::{stack_exists, stack_state};
