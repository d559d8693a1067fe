// src/engine/poll.rs

//! Fixed-interval polling until a remote operation settles.

use std::future::Future;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::trace;

/// Statuses after which no further transition is expected for an operation.
///
/// Entries starting with `*` match by suffix, so `*_ROLLBACK_COMPLETE`
/// covers `UPDATE_ROLLBACK_COMPLETE` and friends.
#[derive(Debug, Clone, Copy)]
pub struct TerminalStatuses(&'static [&'static str]);

impl TerminalStatuses {
    pub const fn new(patterns: &'static [&'static str]) -> Self {
        Self(patterns)
    }

    pub fn contains(&self, status: &str) -> bool {
        self.0.iter().any(|pattern| match pattern.strip_prefix('*') {
            Some(suffix) => status.ends_with(suffix),
            None => *pattern == status,
        })
    }
}

pub const CREATE_TERMINAL: TerminalStatuses = TerminalStatuses::new(&[
    "CREATE_COMPLETE",
    "CREATE_FAILED",
    "ROLLBACK_COMPLETE",
    "ROLLBACK_FAILED",
    "*_ROLLBACK_COMPLETE",
    "*_ROLLBACK_FAILED",
]);

pub const UPDATE_TERMINAL: TerminalStatuses = TerminalStatuses::new(&[
    "UPDATE_COMPLETE",
    "UPDATE_FAILED",
    "*_ROLLBACK_COMPLETE",
    "*_ROLLBACK_FAILED",
]);

pub const DELETE_TERMINAL: TerminalStatuses =
    TerminalStatuses::new(&["DELETE_COMPLETE", "DELETE_FAILED"]);

pub const CHANGE_SET_TERMINAL: TerminalStatuses =
    TerminalStatuses::new(&["CREATE_COMPLETE", "DELETE_COMPLETE", "FAILED"]);

/// Whether a settled status means the operation did not succeed.
pub fn is_failure_status(status: &str) -> bool {
    let status = status.to_uppercase();
    status.contains("FAIL") || status.contains("ROLLBACK")
}

/// Call `status` until it returns a status in `terminal`, then return it.
///
/// The first call is made immediately and later calls are spaced at least
/// `every` apart. An error from `status` ends polling and is returned as is.
/// There is no deadline; wrap the call in `tokio::time::timeout` if needed.
pub async fn poll_until_terminal<F, Fut, E>(
    every: Duration,
    terminal: &TerminalStatuses,
    mut status: F,
) -> Result<String, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, E>>,
{
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let current = status().await?;
        if terminal.contains(&current) {
            return Ok(current);
        }
        trace!(status = %current, "operation not settled yet");
    }
}
