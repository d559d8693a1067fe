// src/config/mod.rs

//! Configuration loading and validation for stackctl.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate names, dependencies, durations and acyclicity (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    BackendSection, ConfigFile, ConfigSection, ProjectSection, RawConfigFile, StackConfig,
};
