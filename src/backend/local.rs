// src/backend/local.rs

//! File-backed provisioning backend.
//!
//! Each stack is one JSON record under `<state_dir>/stacks/`. Operations
//! move the record into an `*_IN_PROGRESS` status and schedule a transition
//! to its terminal status `settle_time` later; the transition is applied
//! lazily by whichever call reads the record next. Every status change
//! appends an event, which is what progress tails display.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::{
    BackendFuture, ChangeSetSummary, RemoteBackend, ResourceChange, StackEvent,
};
use crate::engine::poll::{
    is_failure_status, poll_until_terminal, CREATE_TERMINAL, DELETE_TERMINAL,
};
use crate::errors::{BackendError, BackendResult};
use crate::fs::FileSystem;
use crate::stack::Stack;

/// Templates larger than this go through the artifact store.
pub const INLINE_TEMPLATE_LIMIT: usize = 51_200;

const STACK_RESOURCE_TYPE: &str = "Local::Stack";
const DELETE_COMPLETE: &str = "DELETE_COMPLETE";
const NO_CHANGES_REASON: &str = "The submitted information didn't contain changes";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
enum TemplateLocation {
    Inline(String),
    Artifact(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TemplateRef {
    fingerprint: String,
    location: TemplateLocation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Transition {
    status: String,
    #[serde(default)]
    reason: Option<String>,
    due_at: DateTime<Utc>,
    /// Template that becomes current when the transition lands (updates).
    #[serde(default)]
    template: Option<TemplateRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChangeSetRecord {
    name: String,
    template: TemplateRef,
    changes: Vec<ResourceChange>,
    ready_at: DateTime<Utc>,
}

impl ChangeSetRecord {
    fn summary(&self, now: DateTime<Utc>) -> ChangeSetSummary {
        let (status, reason) = if now < self.ready_at {
            ("CREATE_IN_PROGRESS", None)
        } else if self.changes.is_empty() {
            ("FAILED", Some(NO_CHANGES_REASON.to_string()))
        } else {
            ("CREATE_COMPLETE", None)
        };
        ChangeSetSummary {
            name: self.name.clone(),
            status: status.to_string(),
            reason,
            changes: self.changes.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StackRecord {
    remote_name: String,
    status: String,
    template: TemplateRef,
    #[serde(default)]
    transition: Option<Transition>,
    #[serde(default)]
    events: Vec<StackEvent>,
    #[serde(default)]
    change_sets: Vec<ChangeSetRecord>,
}

impl StackRecord {
    fn new(remote_name: &str, template: TemplateRef) -> Self {
        Self {
            remote_name: remote_name.to_string(),
            status: String::new(),
            template,
            transition: None,
            events: Vec::new(),
            change_sets: Vec::new(),
        }
    }

    fn push_event(&mut self, reason: Option<String>, at: DateTime<Utc>) {
        self.events.push(StackEvent {
            status: self.status.clone(),
            resource_type: STACK_RESOURCE_TYPE.to_string(),
            logical_id: self.remote_name.clone(),
            reason,
            timestamp: at,
        });
    }

    /// Enter `in_progress` now and land on `target` at `due_at`.
    fn begin(
        &mut self,
        in_progress: &str,
        target: Transition,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.status = in_progress.to_string();
        self.push_event(reason, now);
        self.transition = Some(target);
    }

    /// Apply the pending transition if it is due. Returns whether it was.
    fn settle(&mut self, now: DateTime<Utc>) -> bool {
        let due = matches!(&self.transition, Some(t) if t.due_at <= now);
        if !due {
            return false;
        }
        if let Some(t) = self.transition.take() {
            self.status = t.status;
            if let Some(template) = t.template {
                self.template = template;
            }
            self.push_event(t.reason, t.due_at);
        }
        true
    }

    fn is_deleted(&self) -> bool {
        self.status == DELETE_COMPLETE
    }
}

/// Local, file-backed [`RemoteBackend`].
#[derive(Debug)]
pub struct LocalBackend {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
    settle_time: Duration,
    poll_interval: Duration,
    /// Serialises read-modify-write cycles on records.
    lock: Mutex<()>,
}

impl LocalBackend {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        root: impl Into<PathBuf>,
        settle_time: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            fs,
            root: root.into(),
            settle_time,
            poll_interval,
            lock: Mutex::new(()),
        }
    }

    fn record_path(&self, remote_name: &str) -> PathBuf {
        self.root.join("stacks").join(format!("{remote_name}.json"))
    }

    fn artifact_dir(&self, remote_name: &str) -> PathBuf {
        self.root.join("artifacts").join(remote_name)
    }

    fn artifact_path(&self, remote_name: &str, fingerprint: &str) -> PathBuf {
        self.artifact_dir(remote_name)
            .join(format!("{fingerprint}.template"))
    }

    fn due_at(&self, now: DateTime<Utc>) -> BackendResult<DateTime<Utc>> {
        let settle = chrono::Duration::from_std(self.settle_time)
            .map_err(|e| BackendError::Other(anyhow!("settle time out of range: {e}")))?;
        Ok(now + settle)
    }

    fn load(&self, remote_name: &str) -> BackendResult<Option<StackRecord>> {
        let path = self.record_path(remote_name);
        if !self.fs.exists(&path) {
            return Ok(None);
        }
        let raw = self.fs.read_to_string(&path).map_err(storage)?;
        let record = serde_json::from_str(&raw).map_err(|e| {
            BackendError::Storage(format!("corrupt record {}: {e}", path.display()))
        })?;
        Ok(Some(record))
    }

    fn persist(&self, remote_name: &str, record: Option<&StackRecord>) -> BackendResult<()> {
        let path = self.record_path(remote_name);
        match record {
            Some(record) => {
                let raw = serde_json::to_vec_pretty(record)
                    .map_err(|e| BackendError::Other(e.into()))?;
                self.fs.write(&path, &raw).map_err(storage)
            }
            None => {
                if self.fs.exists(&path) {
                    self.fs.remove_file(&path).map_err(storage)?;
                }
                // Uploaded templates go with the stack.
                self.fs
                    .remove_dir_all(&self.artifact_dir(remote_name))
                    .map_err(storage)
            }
        }
    }

    /// Load a record and apply any due transition. A record that just
    /// reached `DELETE_COMPLETE` is removed from disk but still returned, so
    /// the caller observes the final status once.
    fn read_record(&self, remote_name: &str) -> BackendResult<Option<StackRecord>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut record = match self.load(remote_name)? {
            Some(r) => r,
            None => return Ok(None),
        };
        if record.settle(Utc::now()) {
            if record.is_deleted() {
                self.persist(remote_name, None)?;
            } else {
                self.persist(remote_name, Some(&record))?;
            }
        }
        Ok(Some(record))
    }

    /// Run `f` on the settled record and write back whatever it leaves.
    fn update_record<T>(
        &self,
        remote_name: &str,
        f: impl FnOnce(&mut Option<StackRecord>, DateTime<Utc>) -> BackendResult<T>,
    ) -> BackendResult<T> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let mut slot = self.load(remote_name)?;
        if let Some(record) = slot.as_mut() {
            record.settle(now);
        }
        if slot.as_ref().is_some_and(StackRecord::is_deleted) {
            self.persist(remote_name, None)?;
            slot = None;
        }
        let out = f(&mut slot, now)?;
        self.persist(remote_name, slot.as_ref())?;
        Ok(out)
    }

    fn store_template(&self, remote_name: &str, body: &str) -> BackendResult<TemplateRef> {
        let fingerprint = blake3::hash(body.as_bytes()).to_hex().to_string();
        let location = if body.len() > INLINE_TEMPLATE_LIMIT {
            let path = self.artifact_path(remote_name, &fingerprint);
            debug!(
                stack = %remote_name,
                bytes = body.len(),
                path = %path.display(),
                "template exceeds inline limit; uploading to artifact store"
            );
            self.fs.write(&path, body.as_bytes()).map_err(storage)?;
            TemplateLocation::Artifact(path.display().to_string())
        } else {
            TemplateLocation::Inline(body.to_string())
        };
        Ok(TemplateRef {
            fingerprint,
            location,
        })
    }

    fn ensure_succeeded(&self, remote_name: &str, status: &str) -> BackendResult<()> {
        if !is_failure_status(status) {
            return Ok(());
        }
        let reason = self
            .read_record(remote_name)?
            .and_then(|r| r.events.last().and_then(|e| e.reason.clone()))
            .unwrap_or_else(|| "no reason reported".to_string());
        Err(BackendError::OperationFailed {
            stack: remote_name.to_string(),
            status: status.to_string(),
            reason,
        })
    }

    fn begin_create(&self, stack: &Stack) -> BackendResult<()> {
        let remote = stack.remote_name.as_str();
        let (status, reason) = if stack.template.trim().is_empty() {
            ("CREATE_FAILED", Some("Template body is empty".to_string()))
        } else {
            ("CREATE_COMPLETE", None)
        };

        self.update_record(remote, |slot, now| {
            if let Some(existing) = slot.as_ref() {
                return Err(BackendError::OperationFailed {
                    stack: remote.to_string(),
                    status: existing.status.clone(),
                    reason: "stack already exists".to_string(),
                });
            }
            let template = self.store_template(remote, &stack.template)?;
            let mut record = StackRecord::new(remote, template);
            let target = Transition {
                status: status.to_string(),
                reason,
                due_at: self.due_at(now)?,
                template: None,
            };
            record.begin("CREATE_IN_PROGRESS", target, Some("User Initiated".to_string()), now);
            *slot = Some(record);
            Ok(())
        })
    }

    fn begin_delete(&self, remote_name: &str) -> BackendResult<bool> {
        self.update_record(remote_name, |slot, now| match slot.as_mut() {
            None => Ok(false),
            Some(record) => {
                let target = Transition {
                    status: DELETE_COMPLETE.to_string(),
                    reason: None,
                    due_at: self.due_at(now)?,
                    template: None,
                };
                record.begin("DELETE_IN_PROGRESS", target, Some("User Initiated".to_string()), now);
                Ok(true)
            }
        })
    }

    fn add_change_set(&self, stack: &Stack, change_set: &str) -> BackendResult<()> {
        let remote = stack.remote_name.as_str();

        self.update_record(remote, |slot, now| {
            let record = slot
                .as_mut()
                .ok_or_else(|| BackendError::NotFound(remote.to_string()))?;
            if record.change_sets.iter().any(|c| c.name == change_set) {
                return Err(BackendError::Other(anyhow!(
                    "change set '{change_set}' already exists for stack {remote}"
                )));
            }
            let template = self.store_template(remote, &stack.template)?;
            let changes = if record.template.fingerprint == template.fingerprint {
                Vec::new()
            } else {
                vec![ResourceChange {
                    action: "Modify".to_string(),
                    logical_id: remote.to_string(),
                    resource_type: STACK_RESOURCE_TYPE.to_string(),
                }]
            };
            record.change_sets.push(ChangeSetRecord {
                name: change_set.to_string(),
                template,
                changes,
                ready_at: self.due_at(now)?,
            });
            Ok(())
        })
    }

    fn change_set_summary(&self, remote_name: &str, change_set: &str) -> BackendResult<ChangeSetSummary> {
        let record = self
            .read_record(remote_name)?
            .filter(|r| !r.is_deleted())
            .ok_or_else(|| BackendError::NotFound(remote_name.to_string()))?;
        let now = Utc::now();
        record
            .change_sets
            .iter()
            .find(|c| c.name == change_set)
            .map(|c| c.summary(now))
            .ok_or_else(|| change_set_not_found(remote_name, change_set))
    }

    fn begin_update(&self, remote_name: &str, change_set: &str) -> BackendResult<()> {
        self.update_record(remote_name, |slot, now| {
            let record = slot
                .as_mut()
                .ok_or_else(|| BackendError::NotFound(remote_name.to_string()))?;
            let cs = record
                .change_sets
                .iter()
                .find(|c| c.name == change_set)
                .cloned()
                .ok_or_else(|| change_set_not_found(remote_name, change_set))?;
            let summary = cs.summary(now);
            if summary.status != "CREATE_COMPLETE" {
                return Err(BackendError::OperationFailed {
                    stack: remote_name.to_string(),
                    status: summary.status,
                    reason: format!("change set '{change_set}' is not executable"),
                });
            }
            let target = Transition {
                status: "UPDATE_COMPLETE".to_string(),
                reason: None,
                due_at: self.due_at(now)?,
                template: Some(cs.template),
            };
            record.begin("UPDATE_IN_PROGRESS", target, Some("User Initiated".to_string()), now);
            record.change_sets.clear();
            Ok(())
        })
    }

    fn remove_change_set(&self, remote_name: &str, change_set: &str) -> BackendResult<()> {
        self.update_record(remote_name, |slot, _now| {
            let record = slot
                .as_mut()
                .ok_or_else(|| BackendError::NotFound(remote_name.to_string()))?;
            let before = record.change_sets.len();
            record.change_sets.retain(|c| c.name != change_set);
            if record.change_sets.len() == before {
                return Err(change_set_not_found(remote_name, change_set));
            }
            Ok(())
        })
    }
}

fn storage(err: anyhow::Error) -> BackendError {
    BackendError::Storage(format!("{err:#}"))
}

fn change_set_not_found(remote_name: &str, change_set: &str) -> BackendError {
    BackendError::ChangeSetNotFound {
        stack: remote_name.to_string(),
        change_set: change_set.to_string(),
    }
}

impl RemoteBackend for LocalBackend {
    fn exists<'a>(&'a self, remote_name: &'a str) -> BackendFuture<'a, bool> {
        Box::pin(async move {
            Ok(self
                .read_record(remote_name)?
                .is_some_and(|r| !r.is_deleted()))
        })
    }

    fn current_status<'a>(&'a self, remote_name: &'a str) -> BackendFuture<'a, String> {
        Box::pin(async move {
            self.read_record(remote_name)?
                .map(|r| r.status)
                .ok_or_else(|| BackendError::NotFound(remote_name.to_string()))
        })
    }

    fn deploy<'a>(&'a self, stack: &'a Stack) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let remote = stack.remote_name.as_str();
            self.begin_create(stack)?;
            info!(stack = %remote, "create started");

            let status = poll_until_terminal(self.poll_interval, &CREATE_TERMINAL, || {
                self.current_status(remote)
            })
            .await?;
            self.ensure_succeeded(remote, &status)
        })
    }

    fn terminate<'a>(&'a self, remote_name: &'a str) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            if !self.begin_delete(remote_name)? {
                debug!(stack = %remote_name, "stack not present; nothing to delete");
                return Ok(());
            }
            info!(stack = %remote_name, "delete started");

            // Another reader may settle and remove the record first.
            let status = poll_until_terminal(self.poll_interval, &DELETE_TERMINAL, || async move {
                match self.current_status(remote_name).await {
                    Err(err) if err.is_not_found() => Ok(DELETE_COMPLETE.to_string()),
                    other => other,
                }
            })
            .await?;
            self.ensure_succeeded(remote_name, &status)
        })
    }

    fn latest_event<'a>(&'a self, remote_name: &'a str) -> BackendFuture<'a, Option<StackEvent>> {
        Box::pin(async move {
            Ok(self
                .read_record(remote_name)?
                .and_then(|mut r| r.events.pop()))
        })
    }

    fn create_change_set<'a>(
        &'a self,
        stack: &'a Stack,
        change_set: &'a str,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move { self.add_change_set(stack, change_set) })
    }

    fn describe_change_set<'a>(
        &'a self,
        remote_name: &'a str,
        change_set: &'a str,
    ) -> BackendFuture<'a, ChangeSetSummary> {
        Box::pin(async move { self.change_set_summary(remote_name, change_set) })
    }

    fn list_change_sets<'a>(
        &'a self,
        remote_name: &'a str,
    ) -> BackendFuture<'a, Vec<ChangeSetSummary>> {
        Box::pin(async move {
            let record = self
                .read_record(remote_name)?
                .filter(|r| !r.is_deleted())
                .ok_or_else(|| BackendError::NotFound(remote_name.to_string()))?;
            let now = Utc::now();
            Ok(record.change_sets.iter().map(|c| c.summary(now)).collect())
        })
    }

    fn execute_change_set<'a>(
        &'a self,
        remote_name: &'a str,
        change_set: &'a str,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move { self.begin_update(remote_name, change_set) })
    }

    fn delete_change_set<'a>(
        &'a self,
        remote_name: &'a str,
        change_set: &'a str,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move { self.remove_change_set(remote_name, change_set) })
    }
}
