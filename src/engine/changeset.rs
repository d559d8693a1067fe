// src/engine/changeset.rs

//! Change-set flow: propose an update, inspect it, then apply it.

use tracing::{info, warn};

use crate::backend::{ChangeSetSummary, RemoteBackend, SharedBackend};
use crate::engine::poll::{is_failure_status, CHANGE_SET_TERMINAL, UPDATE_TERMINAL};
use crate::engine::tail::EventTail;
use crate::engine::{poll_until_terminal, with_deadline, SchedulerOptions};
use crate::errors::{BackendError, BackendResult};
use crate::stack::Stack;
use crate::types::OperationKind;

/// Create change set `name` for `stack` and wait until it is ready.
///
/// A change set that settles as `FAILED` is not an error here: the returned
/// summary carries the reason (typically that nothing changed).
pub async fn create_and_wait(
    backend: &dyn RemoteBackend,
    stack: &Stack,
    name: &str,
    options: &SchedulerOptions,
) -> BackendResult<ChangeSetSummary> {
    info!(stack = %stack.name, change_set = %name, "creating change set");
    backend.create_change_set(stack, name).await?;

    let remote = stack.remote_name.as_str();
    let status = poll_until_terminal(options.status_poll_interval, &CHANGE_SET_TERMINAL, || async move {
        backend
            .describe_change_set(remote, name)
            .await
            .map(|summary| summary.status)
    })
    .await?;

    let summary = backend.describe_change_set(remote, name).await?;
    if status == "FAILED" {
        warn!(
            stack = %stack.name,
            change_set = %name,
            reason = summary.reason.as_deref().unwrap_or("unknown"),
            "change set is not executable"
        );
    }
    Ok(summary)
}

/// Apply change set `name` and wait for the stack update to settle.
///
/// Progress for the update is tailed for the duration of the call.
pub async fn execute_and_wait(
    backend: SharedBackend,
    stack: &Stack,
    name: &str,
    options: &SchedulerOptions,
) -> BackendResult<String> {
    info!(stack = %stack.name, change_set = %name, "executing change set");
    backend.execute_change_set(&stack.remote_name, name).await?;

    let tail = EventTail::spawn(backend.clone(), options.tail_interval);
    let settled = {
        let _guard = tail.handle().attach(stack, OperationKind::Update);
        let remote = stack.remote_name.as_str();
        let backend = backend.as_ref();
        with_deadline(
            options.operation_timeout,
            "update",
            remote,
            poll_until_terminal(options.status_poll_interval, &UPDATE_TERMINAL, || {
                backend.current_status(remote)
            }),
        )
        .await
    };
    tail.shutdown().await;

    let status = settled?;
    if is_failure_status(&status) {
        let reason = match backend.latest_event(&stack.remote_name).await {
            Ok(Some(event)) => event.reason.unwrap_or_default(),
            _ => String::new(),
        };
        return Err(BackendError::OperationFailed {
            stack: stack.remote_name.clone(),
            status,
            reason,
        });
    }

    info!(stack = %stack.name, %status, "change set applied");
    Ok(status)
}

pub async fn describe(
    backend: &dyn RemoteBackend,
    stack: &Stack,
    name: &str,
) -> BackendResult<ChangeSetSummary> {
    backend.describe_change_set(&stack.remote_name, name).await
}

pub async fn list(backend: &dyn RemoteBackend, stack: &Stack) -> BackendResult<Vec<ChangeSetSummary>> {
    backend.list_change_sets(&stack.remote_name).await
}

pub async fn delete(backend: &dyn RemoteBackend, stack: &Stack, name: &str) -> BackendResult<()> {
    info!(stack = %stack.name, change_set = %name, "deleting change set");
    backend.delete_change_set(&stack.remote_name, name).await
}
