use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use stackctl::backend::{
    BackendFuture, ChangeSetSummary, RemoteBackend, ResourceChange, StackEvent,
};
use stackctl::errors::BackendError;
use stackctl::stack::Stack;

/// Kind of call recorded by [`FakeBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Deploy,
    Terminate,
    ExecuteChangeSet,
}

/// One deploy/terminate/execute call with its start and finish time.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub op: Op,
    pub remote_name: String,
    pub started: Instant,
    pub finished: Option<Instant>,
}

#[derive(Debug, Default)]
struct FakeStack {
    status: String,
    events: Vec<StackEvent>,
}

impl FakeStack {
    fn set_status(&mut self, status: &str, reason: Option<&str>) {
        self.status = status.to_string();
        self.events.push(StackEvent {
            status: status.to_string(),
            resource_type: "Fake::Stack".to_string(),
            logical_id: "stack".to_string(),
            reason: reason.map(str::to_string),
            timestamp: Utc::now(),
        });
    }
}

#[derive(Debug, Default)]
struct State {
    stacks: HashMap<String, FakeStack>,
    change_sets: BTreeMap<(String, String), ChangeSetSummary>,
    calls: Vec<CallRecord>,
    /// `current_status` answers, keyed by (remote name, status returned).
    status_queries: HashMap<(String, String), usize>,
    failing_events: HashSet<String>,
}

/// A scriptable in-memory backend.
///
/// - records every deploy/terminate/execute with timestamps
/// - deploys and terminates take a configurable delay
/// - individual stacks can be made to fail deploy or terminate
/// - existing stacks can be seeded with any status
/// - `latest_event` can be switched to fail and back
#[derive(Debug, Default)]
pub struct FakeBackend {
    state: Mutex<State>,
    deploy_delay: Duration,
    terminate_delay: Duration,
    delays: HashMap<String, Duration>,
    failing_deploys: HashSet<String>,
    failing_terminates: HashSet<String>,
    failing_updates: HashSet<String>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deploy_delay(mut self, delay: Duration) -> Self {
        self.deploy_delay = delay;
        self
    }

    pub fn with_terminate_delay(mut self, delay: Duration) -> Self {
        self.terminate_delay = delay;
        self
    }

    /// Override the deploy and terminate delay of one stack.
    pub fn with_delay_for(mut self, remote_name: &str, delay: Duration) -> Self {
        self.delays.insert(remote_name.to_string(), delay);
        self
    }

    /// Seed a stack that already exists with `status`.
    pub fn with_existing(self, remote_name: &str, status: &str) -> Self {
        self.lock()
            .stacks
            .entry(remote_name.to_string())
            .or_default()
            .set_status(status, None);
        self
    }

    pub fn failing_deploy(mut self, remote_name: &str) -> Self {
        self.failing_deploys.insert(remote_name.to_string());
        self
    }

    /// Terminate of `remote_name` ends in `DELETE_FAILED` and the stack stays.
    pub fn failing_terminate(mut self, remote_name: &str) -> Self {
        self.failing_terminates.insert(remote_name.to_string());
        self
    }

    pub fn failing_update(mut self, remote_name: &str) -> Self {
        self.failing_updates.insert(remote_name.to_string());
        self
    }

    /// `latest_event` of `remote_name` errors until switched back.
    pub fn failing_events(self, remote_name: &str) -> Self {
        self.set_events_failing(remote_name, true);
        self
    }

    pub fn set_events_failing(&self, remote_name: &str, failing: bool) {
        let mut state = self.lock();
        if failing {
            state.failing_events.insert(remote_name.to_string());
        } else {
            state.failing_events.remove(remote_name);
        }
    }

    /// Move an existing (or new) stack to `status`, as an outside actor would.
    pub fn set_status(&self, remote_name: &str, status: &str) {
        self.lock()
            .stacks
            .entry(remote_name.to_string())
            .or_default()
            .set_status(status, None);
    }

    /// How many `current_status` calls for `remote_name` answered `status`.
    pub fn status_queries(&self, remote_name: &str, status: &str) -> usize {
        self.lock()
            .status_queries
            .get(&(remote_name.to_string(), status.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Append an event without changing the status.
    pub fn push_event(&self, remote_name: &str, status: &str, reason: Option<&str>) {
        let mut state = self.lock();
        let stack = state.stacks.entry(remote_name.to_string()).or_default();
        stack.events.push(StackEvent {
            status: status.to_string(),
            resource_type: "Fake::Resource".to_string(),
            logical_id: "resource".to_string(),
            reason: reason.map(str::to_string),
            timestamp: Utc::now(),
        });
    }

    pub fn status_of(&self, remote_name: &str) -> Option<String> {
        self.lock().stacks.get(remote_name).map(|s| s.status.clone())
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.lock().calls.clone()
    }

    pub fn calls_for(&self, op: Op) -> Vec<CallRecord> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    /// Remote names in the order their `op` calls started.
    pub fn order_of(&self, op: Op) -> Vec<String> {
        self.calls_for(op).into_iter().map(|c| c.remote_name).collect()
    }

    pub fn call(&self, op: Op, remote_name: &str) -> Option<CallRecord> {
        self.calls_for(op)
            .into_iter()
            .find(|c| c.remote_name == remote_name)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn delay_for(&self, remote_name: &str, default: Duration) -> Duration {
        self.delays.get(remote_name).copied().unwrap_or(default)
    }

    fn start_call(&self, op: Op, remote_name: &str) -> usize {
        let mut state = self.lock();
        state.calls.push(CallRecord {
            op,
            remote_name: remote_name.to_string(),
            started: Instant::now(),
            finished: None,
        });
        state.calls.len() - 1
    }

    fn finish_call(&self, index: usize) {
        self.lock().calls[index].finished = Some(Instant::now());
    }
}

fn not_found(remote_name: &str) -> BackendError {
    BackendError::NotFound(remote_name.to_string())
}

impl RemoteBackend for FakeBackend {
    fn exists<'a>(&'a self, remote_name: &'a str) -> BackendFuture<'a, bool> {
        Box::pin(async move {
            Ok(self
                .lock()
                .stacks
                .get(remote_name)
                .is_some_and(|s| !s.status.is_empty()))
        })
    }

    fn current_status<'a>(&'a self, remote_name: &'a str) -> BackendFuture<'a, String> {
        Box::pin(async move {
            let mut state = self.lock();
            let status = state
                .stacks
                .get(remote_name)
                .filter(|s| !s.status.is_empty())
                .map(|s| s.status.clone())
                .ok_or_else(|| not_found(remote_name))?;
            *state
                .status_queries
                .entry((remote_name.to_string(), status.clone()))
                .or_default() += 1;
            Ok(status)
        })
    }

    fn deploy<'a>(&'a self, stack: &'a Stack) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let remote = stack.remote_name.as_str();
            let call = self.start_call(Op::Deploy, remote);
            self.lock()
                .stacks
                .entry(remote.to_string())
                .or_default()
                .set_status("CREATE_IN_PROGRESS", Some("User Initiated"));

            tokio::time::sleep(self.delay_for(remote, self.deploy_delay)).await;

            let failed = self.failing_deploys.contains(remote);
            {
                let mut state = self.lock();
                let record = state.stacks.entry(remote.to_string()).or_default();
                if failed {
                    record.set_status("CREATE_FAILED", Some("scripted failure"));
                } else {
                    record.set_status("CREATE_COMPLETE", None);
                }
            }
            self.finish_call(call);

            if failed {
                return Err(BackendError::OperationFailed {
                    stack: remote.to_string(),
                    status: "CREATE_FAILED".to_string(),
                    reason: "scripted failure".to_string(),
                });
            }
            Ok(())
        })
    }

    fn terminate<'a>(&'a self, remote_name: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            if !self.exists(remote_name).await? {
                return Ok(());
            }
            let call = self.start_call(Op::Terminate, remote_name);
            if let Some(record) = self.lock().stacks.get_mut(remote_name) {
                record.set_status("DELETE_IN_PROGRESS", Some("User Initiated"));
            }

            tokio::time::sleep(self.delay_for(remote_name, self.terminate_delay)).await;

            let failed = self.failing_terminates.contains(remote_name);
            {
                let mut state = self.lock();
                if failed {
                    if let Some(record) = state.stacks.get_mut(remote_name) {
                        record.set_status("DELETE_FAILED", Some("scripted failure"));
                    }
                } else {
                    state.stacks.remove(remote_name);
                    state.change_sets.retain(|(stack, _), _| stack != remote_name);
                }
            }
            self.finish_call(call);

            if failed {
                return Err(BackendError::OperationFailed {
                    stack: remote_name.to_string(),
                    status: "DELETE_FAILED".to_string(),
                    reason: "scripted failure".to_string(),
                });
            }
            Ok(())
        })
    }

    fn latest_event<'a>(&'a self, remote_name: &'a str) -> BackendFuture<'a, Option<StackEvent>> {
        Box::pin(async move {
            let state = self.lock();
            if state.failing_events.contains(remote_name) {
                return Err(BackendError::Storage(format!(
                    "scripted describe failure for {remote_name}"
                )));
            }
            Ok(state
                .stacks
                .get(remote_name)
                .and_then(|s| s.events.last().cloned()))
        })
    }

    fn create_change_set<'a>(
        &'a self,
        stack: &'a Stack,
        change_set: &'a str,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            if !state.stacks.contains_key(&stack.remote_name) {
                return Err(not_found(&stack.remote_name));
            }
            state.change_sets.insert(
                (stack.remote_name.clone(), change_set.to_string()),
                ChangeSetSummary {
                    name: change_set.to_string(),
                    status: "CREATE_COMPLETE".to_string(),
                    reason: None,
                    changes: vec![ResourceChange {
                        action: "Modify".to_string(),
                        logical_id: stack.name.clone(),
                        resource_type: "Fake::Stack".to_string(),
                    }],
                },
            );
            Ok(())
        })
    }

    fn describe_change_set<'a>(
        &'a self,
        remote_name: &'a str,
        change_set: &'a str,
    ) -> BackendFuture<'a, ChangeSetSummary> {
        Box::pin(async move {
            self.lock()
                .change_sets
                .get(&(remote_name.to_string(), change_set.to_string()))
                .cloned()
                .ok_or_else(|| BackendError::ChangeSetNotFound {
                    stack: remote_name.to_string(),
                    change_set: change_set.to_string(),
                })
        })
    }

    fn list_change_sets<'a>(
        &'a self,
        remote_name: &'a str,
    ) -> BackendFuture<'a, Vec<ChangeSetSummary>> {
        Box::pin(async move {
            Ok(self
                .lock()
                .change_sets
                .iter()
                .filter(|((stack, _), _)| stack == remote_name)
                .map(|(_, summary)| summary.clone())
                .collect())
        })
    }

    fn execute_change_set<'a>(
        &'a self,
        remote_name: &'a str,
        change_set: &'a str,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let key = (remote_name.to_string(), change_set.to_string());
            let call = self.start_call(Op::ExecuteChangeSet, remote_name);
            {
                let mut state = self.lock();
                if state.change_sets.remove(&key).is_none() {
                    return Err(BackendError::ChangeSetNotFound {
                        stack: remote_name.to_string(),
                        change_set: change_set.to_string(),
                    });
                }
                state.change_sets.retain(|(stack, _), _| stack != remote_name);
                let record = state
                    .stacks
                    .get_mut(remote_name)
                    .ok_or_else(|| not_found(remote_name))?;
                record.set_status("UPDATE_IN_PROGRESS", Some("User Initiated"));
                if self.failing_updates.contains(remote_name) {
                    record.set_status("UPDATE_ROLLBACK_COMPLETE", Some("scripted failure"));
                } else {
                    record.set_status("UPDATE_COMPLETE", None);
                }
            }
            self.finish_call(call);
            Ok(())
        })
    }

    fn delete_change_set<'a>(
        &'a self,
        remote_name: &'a str,
        change_set: &'a str,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.lock()
                .change_sets
                .remove(&(remote_name.to_string(), change_set.to_string()))
                .map(|_| ())
                .ok_or_else(|| BackendError::ChangeSetNotFound {
                    stack: remote_name.to_string(),
                    change_set: change_set.to_string(),
                })
        })
    }
}
