// src/errors.rs

//! Crate-wide error types.
//!
//! - [`StackctlError`] covers configuration, graph and I/O problems that stop
//!   a command before any stack is touched.
//! - [`BackendError`] is what a [`RemoteBackend`](crate::backend::RemoteBackend)
//!   returns. Absence of a stack is a typed variant so that state derivation
//!   never has to inspect error text.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackctlError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Stack not found: {0}")]
    StackNotFound(String),

    #[error("Dependency cycle detected: {0}")]
    DependencyCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("stack {0} does not exist")]
    NotFound(String),

    #[error("change set '{change_set}' does not exist for stack {stack}")]
    ChangeSetNotFound { stack: String, change_set: String },

    #[error("operation on {stack} ended in {status}: {reason}")]
    OperationFailed {
        stack: String,
        status: String,
        reason: String,
    },

    #[error("{operation} of {stack} did not settle within {limit:?}")]
    Timeout {
        operation: &'static str,
        stack: String,
        limit: Duration,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BackendError {
    /// Whether this error only signals that the stack is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound(_))
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, StackctlError>;
pub type BackendResult<T> = std::result::Result<T, BackendError>;
