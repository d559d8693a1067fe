// src/engine/terminate.rs

//! Reverse-dependency termination.
//!
//! A stack may only be deleted once nothing that depends on it exists any
//! more. Each actioned stack waits for all of its dependents (actioned or
//! not) to disappear from the backend, then deletes itself.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::backend::SharedBackend;
use crate::dag::StatusCache;
use crate::engine::tail::{EventTail, TailHandle};
use crate::engine::{with_deadline, BatchReport, SchedulerOptions};
use crate::errors::Result;
use crate::stack::{stack_exists, Stack, StackSet};
use crate::types::{OperationKind, StackState};

struct TerminateContext {
    backend: SharedBackend,
    stacks: Arc<StackSet>,
    cache: StatusCache,
    tail: TailHandle,
    options: SchedulerOptions,
}

/// Terminate every actioned stack in `stacks` in reverse dependency order.
///
/// Returns once every per-stack task has finished.
pub async fn run_termination(
    backend: SharedBackend,
    stacks: Arc<StackSet>,
    options: SchedulerOptions,
) -> Result<BatchReport> {
    stacks.validate_for_run()?;

    let actioned = stacks.actioned_names();
    if actioned.is_empty() {
        info!("no stacks selected for termination");
        return Ok(BatchReport::default());
    }
    info!(stacks = ?actioned, "starting termination batch");

    let cache = StatusCache::new();
    let tail = EventTail::spawn(backend.clone(), options.tail_interval);
    let ctx = Arc::new(TerminateContext {
        backend,
        stacks,
        cache: cache.clone(),
        tail: tail.handle(),
        options,
    });

    let mut tasks = JoinSet::new();
    for name in actioned.iter().cloned() {
        let ctx = Arc::clone(&ctx);
        tasks.spawn(async move { terminate_stack(&ctx, &name).await });
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            error!(error = %err, "termination task aborted");
        }
    }

    drop(ctx);
    tail.shutdown().await;

    let report = BatchReport::from_cache(&cache, &actioned);
    info!(unsettled = ?report.unsettled(), "termination batch finished");
    Ok(report)
}

async fn terminate_stack(ctx: &TerminateContext, name: &str) {
    let Some(stack) = ctx.stacks.get(name) else {
        warn!(stack = %name, "actioned stack missing from stack set; skipping");
        return;
    };

    ctx.cache.record(&stack.name, StackState::Pending);

    let dependents: Vec<&Stack> = ctx.stacks.dependents_of(&stack.name).collect();
    for dependent in dependents {
        if !wait_until_gone(ctx, stack, dependent).await {
            warn!(
                stack = %stack.name,
                dependent = %dependent.name,
                "dependent failed to terminate; abandoning"
            );
            ctx.cache.record(&stack.name, StackState::Failed);
            return;
        }
    }

    match stack_exists(ctx.backend.as_ref(), stack).await {
        Ok(false) => {
            info!(stack = %stack.name, remote = %stack.remote_name, "nothing to terminate");
            ctx.cache.record(&stack.name, StackState::Complete);
            return;
        }
        Ok(true) => {}
        // Let terminate itself decide; a missing stack is not an error there.
        Err(err) => debug!(stack = %stack.name, error = %err, "existence check failed"),
    }

    info!(stack = %stack.name, remote = %stack.remote_name, "terminating stack");
    let outcome = {
        let _tail = ctx.tail.attach(stack, OperationKind::Delete);
        with_deadline(
            ctx.options.operation_timeout,
            "terminate",
            &stack.remote_name,
            ctx.backend.terminate(&stack.remote_name),
        )
        .await
    };

    match outcome {
        Ok(()) => {
            info!(stack = %stack.name, "stack terminated");
            ctx.cache.record(&stack.name, StackState::Complete);
        }
        Err(err) => {
            error!(stack = %stack.name, error = %err, "termination failed");
            ctx.cache.record(&stack.name, StackState::Failed);
        }
    }
}

/// Poll until `dependent` no longer exists.
///
/// Returns `false` when an actioned dependent has recorded `failed` while
/// still present, since it will never go away during this batch.
async fn wait_until_gone(ctx: &TerminateContext, stack: &Stack, dependent: &Stack) -> bool {
    let mut ticker = interval(ctx.options.termination_poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut warned = false;

    loop {
        ticker.tick().await;

        match stack_exists(ctx.backend.as_ref(), dependent).await {
            Ok(false) => return true,
            Ok(true) => {}
            Err(err) => {
                debug!(dependent = %dependent.name, error = %err, "transient error checking dependent");
                continue;
            }
        }

        if dependent.actioned {
            if ctx.cache.get(&dependent.name) == StackState::Failed {
                return false;
            }
        } else if !warned {
            warn!(
                stack = %stack.name,
                dependent = %dependent.name,
                "waiting on a dependent that is not part of this run"
            );
            warned = true;
        }

        debug!(stack = %stack.name, dependent = %dependent.name, "dependent still exists");
    }
}
