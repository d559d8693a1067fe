// src/engine/mod.rs

//! Orchestration engine for stackctl.
//!
//! This module ties together:
//! - the deployment scheduler ([`deploy`]): forward-edge waits, then create
//! - the termination scheduler ([`terminate`]): reverse-edge waits, then delete
//! - the progress tail service ([`tail`])
//! - fixed-interval polling of remote operations ([`poll`])
//! - the change-set flow ([`changeset`])
//!
//! Both schedulers spawn one task per actioned stack and coordinate through a
//! batch-scoped [`StatusCache`](crate::dag::StatusCache).

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use crate::dag::StatusCache;
use crate::errors::{BackendError, BackendResult};
use crate::types::{StackName, StackState};

pub mod changeset;
pub mod deploy;
pub mod poll;
pub mod tail;
pub mod terminate;

pub use deploy::run_deployment;
pub use poll::{poll_until_terminal, TerminalStatuses};
pub use tail::{EventTail, TailHandle, TailRequest};
pub use terminate::run_termination;

/// Timing knobs shared by the schedulers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Tick of the deployment dependency wait loop.
    pub dependency_poll_interval: Duration,
    /// Tick of the termination wait for dependents to disappear.
    pub termination_poll_interval: Duration,
    /// Tick used when waiting for a remote operation to settle.
    pub status_poll_interval: Duration,
    /// How often each producer asks the tail service for progress.
    pub tail_interval: Duration,
    /// Upper bound on a single deploy/terminate call.
    pub operation_timeout: Option<Duration>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            dependency_poll_interval: Duration::from_secs(1),
            termination_poll_interval: Duration::from_millis(1500),
            status_poll_interval: Duration::from_millis(1500),
            tail_interval: Duration::from_millis(1300),
            operation_timeout: None,
        }
    }
}

/// Final state of every actioned stack after a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub states: BTreeMap<StackName, StackState>,
}

impl BatchReport {
    pub(crate) fn from_cache(cache: &StatusCache, actioned: &[StackName]) -> Self {
        Self {
            states: actioned
                .iter()
                .map(|name| (name.clone(), cache.get(name)))
                .collect(),
        }
    }

    pub fn state_of(&self, stack: &str) -> Option<StackState> {
        self.states.get(stack).copied()
    }

    /// Stacks that did not reach `complete`, sorted by name.
    pub fn unsettled(&self) -> Vec<&str> {
        self.states
            .iter()
            .filter(|(_, state)| **state != StackState::Complete)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn all_complete(&self) -> bool {
        self.unsettled().is_empty()
    }
}

/// Await `call`, failing with [`BackendError::Timeout`] once `limit` passes.
pub(crate) async fn with_deadline<T>(
    limit: Option<Duration>,
    operation: &'static str,
    remote_name: &str,
    call: impl Future<Output = BackendResult<T>>,
) -> BackendResult<T> {
    let Some(limit) = limit else {
        return call.await;
    };
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout {
            operation,
            stack: remote_name.to_string(),
            limit,
        }),
    }
}
