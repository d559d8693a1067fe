// src/engine/tail.rs

//! Deduplicated progress output for long-running remote operations.
//!
//! One [`EventTail`] exists per scheduler batch. It owns an unbounded queue
//! and a single consumer task. Each in-flight operation attaches a producer
//! through [`TailHandle::attach`], which pushes a [`TailRequest`] into the
//! queue at a fixed interval until the returned [`TailGuard`] is dropped.
//! The consumer fetches the stack's latest event for every request and
//! prints the resulting line unless that request has already printed it.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use colored::{ColoredString, Colorize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::{RemoteBackend, SharedBackend, StackEvent};
use crate::stack::Stack;
use crate::types::{OperationKind, StackName};

/// How long [`EventTail::shutdown`] lets the consumer drain before aborting it.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// "Show me progress for this stack", as queued by one producer.
#[derive(Debug, Clone)]
pub struct TailRequest {
    pub stack: StackName,
    pub remote_name: String,
    pub kind: OperationKind,
    /// Lines already printed for this producer. Grows monotonically.
    printed: Arc<Mutex<HashSet<String>>>,
}

impl TailRequest {
    pub fn new(stack: &Stack, kind: OperationKind) -> Self {
        Self {
            stack: stack.name.clone(),
            remote_name: stack.remote_name.clone(),
            kind,
            printed: Arc::default(),
        }
    }

    /// Remember `line`; true only the first time it is seen.
    pub fn mark_printed(&self, line: &str) -> bool {
        self.printed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(line.to_string())
    }
}

/// Whether an event with `status` belongs to the operation `kind` follows.
///
/// Rollback events are always shown, whatever the kind.
pub fn should_emit(kind: OperationKind, status: &str) -> bool {
    if kind == OperationKind::Any {
        return true;
    }
    let status = status.to_uppercase();
    if status.contains("ROLLBACK") {
        return true;
    }
    status.split('_').next() == Some(kind.status_prefix())
}

/// Build the progress line for one event.
pub fn format_event_line(stack: &str, event: &StackEvent) -> String {
    let mut line = format!(
        "{} - {} {} {}",
        stack.bold(),
        colorize_status(&event.status),
        event.resource_type,
        event.logical_id
    );
    if let Some(reason) = event.reason.as_deref().filter(|r| !r.is_empty()) {
        line.push_str(" - ");
        line.push_str(reason);
    }
    line
}

fn colorize_status(status: &str) -> ColoredString {
    let upper = status.to_uppercase();
    if upper.contains("FAIL") || upper.contains("ROLLBACK") {
        status.red()
    } else if upper.contains("COMPLETE") {
        status.green()
    } else if upper.contains("IN_PROGRESS") {
        status.yellow()
    } else {
        status.normal()
    }
}

/// Resolve one request to the line it should print, if any.
///
/// Describe errors are transient: they are logged at debug level and the
/// tick is skipped.
pub async fn process_request(backend: &dyn RemoteBackend, request: &TailRequest) -> Option<String> {
    let event = match backend.latest_event(&request.remote_name).await {
        Ok(Some(event)) => event,
        Ok(None) => return None,
        Err(err) => {
            debug!(
                stack = %request.stack,
                error = %err,
                "could not fetch latest stack event; skipping tick"
            );
            return None;
        }
    };

    if !should_emit(request.kind, &event.status) {
        return None;
    }

    let line = format_event_line(&request.stack, &event);
    request.mark_printed(&line).then_some(line)
}

/// Batch-scoped tail service: the queue plus its single consumer.
pub struct EventTail {
    tx: mpsc::UnboundedSender<TailRequest>,
    consumer: JoinHandle<()>,
    interval: Duration,
}

impl EventTail {
    /// Start a tail service that prints lines to stdout.
    pub fn spawn(backend: SharedBackend, interval: Duration) -> Self {
        Self::spawn_with_sink(backend, interval, |line| println!("{line}"))
    }

    /// Start a tail service that hands every emitted line to `sink`.
    pub fn spawn_with_sink<S>(backend: SharedBackend, interval: Duration, mut sink: S) -> Self
    where
        S: FnMut(String) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<TailRequest>();

        let consumer = tokio::spawn(async move {
            debug!("event tail consumer started");
            while let Some(request) = rx.recv().await {
                if let Some(line) = process_request(backend.as_ref(), &request).await {
                    sink(line);
                }
            }
            debug!("event tail consumer finished (queue closed)");
        });

        Self {
            tx,
            consumer,
            interval,
        }
    }

    /// Handle for producers of this batch.
    pub fn handle(&self) -> TailHandle {
        TailHandle {
            tx: self.tx.clone(),
            interval: self.interval,
        }
    }

    /// Close the queue and wait for the consumer to drain it.
    ///
    /// Every [`TailHandle`] and [`TailGuard`] should be dropped first; a
    /// consumer still running after a grace period is aborted.
    pub async fn shutdown(self) {
        let EventTail { tx, mut consumer, .. } = self;
        drop(tx);

        let drained = tokio::time::timeout(DRAIN_TIMEOUT, &mut consumer).await;
        match drained {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "event tail consumer ended abnormally"),
            Err(_) => {
                warn!("event tail consumer did not drain in time; aborting");
                consumer.abort();
            }
        }
    }
}

/// Producer side of an [`EventTail`].
#[derive(Debug, Clone)]
pub struct TailHandle {
    tx: mpsc::UnboundedSender<TailRequest>,
    interval: Duration,
}

impl TailHandle {
    /// Follow `stack` for an operation of `kind` until the guard is dropped.
    ///
    /// One last request is queued after the guard drops so the settled
    /// status is shown.
    pub fn attach(&self, stack: &Stack, kind: OperationKind) -> TailGuard {
        let request = TailRequest::new(stack, kind);
        let (done_tx, mut done_rx) = oneshot::channel::<()>();
        let tx = self.tx.clone();
        let every = self.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut done_rx => {
                        let _ = tx.send(request);
                        break;
                    }
                    _ = ticker.tick() => {
                        if tx.send(request.clone()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        TailGuard {
            done: Some(done_tx),
        }
    }
}

/// Stops its producer when dropped.
#[derive(Debug)]
pub struct TailGuard {
    done: Option<oneshot::Sender<()>>,
}

impl Drop for TailGuard {
    fn drop(&mut self) {
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}
