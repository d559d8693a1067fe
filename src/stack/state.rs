// src/stack/state.rs

use crate::backend::RemoteBackend;
use crate::errors::BackendResult;
use crate::stack::Stack;
use crate::types::StackState;

/// Live coarse state of a stack.
///
/// A `NotFound` answer means the stack has not been created yet and maps to
/// `Pending`; every other backend error is returned to the caller.
pub async fn stack_state(backend: &dyn RemoteBackend, stack: &Stack) -> BackendResult<StackState> {
    match backend.current_status(&stack.remote_name).await {
        Ok(status) => Ok(StackState::from_status(&status)),
        Err(err) if err.is_not_found() => Ok(StackState::Pending),
        Err(err) => Err(err),
    }
}

/// Whether the backend has any record of the stack, failed ones included.
pub async fn stack_exists(backend: &dyn RemoteBackend, stack: &Stack) -> BackendResult<bool> {
    backend.exists(&stack.remote_name).await
}
