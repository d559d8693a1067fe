// src/dag/status_cache.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::types::{StackName, StackState};

/// Shared map from stack name to its last observed [`StackState`].
///
/// Cloning yields another handle to the same map. The lock is only held for
/// a single map access, never across a backend call. A missing entry reads
/// as `Pending`.
#[derive(Debug, Clone, Default)]
pub struct StatusCache {
    inner: Arc<Mutex<HashMap<StackName, StackState>>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `name`, `Pending` if nothing has been recorded.
    pub fn get(&self, name: &str) -> StackState {
        self.lookup(name).unwrap_or(StackState::Pending)
    }

    /// Recorded state of `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<StackState> {
        self.map().get(name).copied()
    }

    pub fn record(&self, name: &str, state: StackState) {
        let previous = self.map().insert(name.to_string(), state);
        if previous != Some(state) {
            trace!(stack = %name, ?previous, %state, "status cache updated");
        }
    }

    fn map(&self) -> MutexGuard<'_, HashMap<StackName, StackState>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
