// src/backend/mod.rs

//! Pluggable provisioning backend abstraction.
//!
//! The schedulers talk to a [`RemoteBackend`] instead of a concrete API
//! client, which lets tests swap in a scripted fake while the binary uses
//! [`local::LocalBackend`].
//!
//! Every method returns a boxed future so the trait stays object safe and
//! can be shared as [`SharedBackend`] across scheduler tasks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::BackendResult;
use crate::stack::Stack;

pub mod local;

pub use local::LocalBackend;

/// Future returned by every [`RemoteBackend`] method.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = BackendResult<T>> + Send + 'a>>;

/// Backend handle shared by all tasks of a batch.
pub type SharedBackend = Arc<dyn RemoteBackend>;

/// Most recent progress record of a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEvent {
    pub status: String,
    pub resource_type: String,
    pub logical_id: String,
    #[serde(default)]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// One resource-level change proposed by a change set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChange {
    /// `Add`, `Modify` or `Remove`.
    pub action: String,
    pub logical_id: String,
    pub resource_type: String,
}

/// Status and proposed changes of a change set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSetSummary {
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub changes: Vec<ResourceChange>,
}

/// Capabilities the orchestration core needs from a provisioning API.
pub trait RemoteBackend: Send + Sync {
    /// True iff the backend has any record of the stack, including one in a
    /// terminal failed state.
    fn exists<'a>(&'a self, remote_name: &'a str) -> BackendFuture<'a, bool>;

    /// Raw status string; absence is [`BackendError::NotFound`](crate::errors::BackendError::NotFound).
    fn current_status<'a>(&'a self, remote_name: &'a str) -> BackendFuture<'a, String>;

    /// Create the stack from its template and wait until the create settles.
    /// A create that ends in a failure status is an error.
    fn deploy<'a>(&'a self, stack: &'a Stack) -> BackendFuture<'a, ()>;

    /// Delete the stack and wait until the delete settles.
    fn terminate<'a>(&'a self, remote_name: &'a str) -> BackendFuture<'a, ()>;

    /// Latest event recorded for the stack, if any.
    fn latest_event<'a>(&'a self, remote_name: &'a str) -> BackendFuture<'a, Option<StackEvent>>;

    /// Start creating a change set from the stack's current template.
    fn create_change_set<'a>(&'a self, stack: &'a Stack, change_set: &'a str)
    -> BackendFuture<'a, ()>;

    fn describe_change_set<'a>(
        &'a self,
        remote_name: &'a str,
        change_set: &'a str,
    ) -> BackendFuture<'a, ChangeSetSummary>;

    fn list_change_sets<'a>(&'a self, remote_name: &'a str)
    -> BackendFuture<'a, Vec<ChangeSetSummary>>;

    /// Start applying a change set. Returns once the update has begun.
    fn execute_change_set<'a>(
        &'a self,
        remote_name: &'a str,
        change_set: &'a str,
    ) -> BackendFuture<'a, ()>;

    fn delete_change_set<'a>(
        &'a self,
        remote_name: &'a str,
        change_set: &'a str,
    ) -> BackendFuture<'a, ()>;
}
