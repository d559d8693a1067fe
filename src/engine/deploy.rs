// src/engine/deploy.rs

//! Dependency-aware concurrent deployment.
//!
//! Every actioned stack gets its own task. A task first reconciles a stack
//! that already exists remotely (a failed one is removed, a healthy one is
//! left alone), then waits on a fixed tick until each dependency is
//! `complete` before deploying. A dependency observed as `failed` makes the
//! task give up and record `failed` itself, so the failure propagates down
//! the graph instead of leaving dependents waiting forever.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::backend::SharedBackend;
use crate::dag::StatusCache;
use crate::engine::tail::{EventTail, TailHandle};
use crate::engine::{with_deadline, BatchReport, SchedulerOptions};
use crate::errors::{BackendError, BackendResult, Result};
use crate::stack::{stack_exists, stack_state, Stack, StackSet};
use crate::types::{OperationKind, StackName, StackState};

/// Everything a per-stack task needs, shared across the batch.
struct DeployContext {
    backend: SharedBackend,
    stacks: Arc<StackSet>,
    cache: StatusCache,
    tail: TailHandle,
    options: SchedulerOptions,
}

/// Outcome of one pass over a stack's dependencies.
#[derive(Debug, PartialEq, Eq)]
enum Readiness {
    Ready,
    Blocked(StackName),
    Waiting(Vec<StackName>),
}

/// Deploy every actioned stack in `stacks`, honouring `depends_on`.
///
/// Returns once every per-stack task has finished. Configuration problems
/// (unknown dependencies, cycles) are reported before anything is deployed;
/// per-stack failures are logged and show up in the returned report.
pub async fn run_deployment(
    backend: SharedBackend,
    stacks: Arc<StackSet>,
    options: SchedulerOptions,
) -> Result<BatchReport> {
    stacks.validate_for_run()?;

    let actioned = stacks.actioned_names();
    if actioned.is_empty() {
        info!("no stacks selected for deployment");
        return Ok(BatchReport::default());
    }
    info!(stacks = ?actioned, "starting deployment batch");

    let cache = StatusCache::new();
    let tail = EventTail::spawn(backend.clone(), options.tail_interval);
    let ctx = Arc::new(DeployContext {
        backend,
        stacks,
        cache: cache.clone(),
        tail: tail.handle(),
        options,
    });

    let mut tasks = JoinSet::new();
    for name in actioned.iter().cloned() {
        let ctx = Arc::clone(&ctx);
        tasks.spawn(async move { deploy_stack(&ctx, &name).await });
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            error!(error = %err, "deployment task aborted");
        }
    }

    drop(ctx);
    tail.shutdown().await;

    let report = BatchReport::from_cache(&cache, &actioned);
    info!(unsettled = ?report.unsettled(), "deployment batch finished");
    Ok(report)
}

async fn deploy_stack(ctx: &DeployContext, name: &str) {
    let Some(stack) = ctx.stacks.get(name) else {
        warn!(stack = %name, "actioned stack missing from stack set; skipping");
        return;
    };

    match reconcile_existing(ctx, stack).await {
        Ok(false) => {}
        Ok(true) => {
            info!(stack = %stack.name, remote = %stack.remote_name, "stack already deployed; skipping");
            ctx.cache.record(&stack.name, StackState::Complete);
            return;
        }
        Err(err) => {
            error!(stack = %stack.name, error = %err, "could not inspect existing stack");
            ctx.cache.record(&stack.name, StackState::Failed);
            return;
        }
    }

    ctx.cache.record(&stack.name, StackState::Pending);

    if stack.depends_on.is_empty() {
        deploy_now(ctx, stack).await;
        return;
    }

    let mut ticker = interval(ctx.options.dependency_poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match evaluate_dependencies(ctx, stack).await {
            Readiness::Ready => {
                deploy_now(ctx, stack).await;
                return;
            }
            Readiness::Blocked(dependency) => {
                warn!(
                    stack = %stack.name,
                    dependency = %dependency,
                    "dependency failed; abandoning deployment"
                );
                ctx.cache.record(&stack.name, StackState::Failed);
                return;
            }
            Readiness::Waiting(pending) => {
                debug!(stack = %stack.name, waiting_on = ?pending, "dependencies not complete yet");
            }
        }
    }
}

/// Handle a stack that already exists remotely.
///
/// Returns `true` when the stack should be treated as deployed. A stack in a
/// failed state is terminated first so it can be created again; if it
/// survives the cleanup it is reported as an error rather than as deployed.
async fn reconcile_existing(ctx: &DeployContext, stack: &Stack) -> BackendResult<bool> {
    if !stack_exists(ctx.backend.as_ref(), stack).await? {
        return Ok(false);
    }
    if stack_state(ctx.backend.as_ref(), stack).await? != StackState::Failed {
        return Ok(true);
    }

    warn!(stack = %stack.name, remote = %stack.remote_name, "stack exists in a failed state; terminating before redeploy");
    {
        let _tail = ctx.tail.attach(stack, OperationKind::Delete);
        let removed = with_deadline(
            ctx.options.operation_timeout,
            "terminate",
            &stack.remote_name,
            ctx.backend.terminate(&stack.remote_name),
        )
        .await;
        if let Err(err) = removed {
            error!(stack = %stack.name, error = %err, "cleanup of failed stack did not succeed");
        }
    }

    if stack_exists(ctx.backend.as_ref(), stack).await? {
        return Err(BackendError::OperationFailed {
            stack: stack.remote_name.clone(),
            status: "FAILED".to_string(),
            reason: "failed stack could not be removed before redeploy".to_string(),
        });
    }
    Ok(false)
}

/// Re-derive the state of every dependency and decide what to do next.
async fn evaluate_dependencies(ctx: &DeployContext, stack: &Stack) -> Readiness {
    let mut pending = Vec::new();
    let mut failed = None;

    for dep in &stack.depends_on {
        match dependency_state(ctx, dep).await {
            StackState::Complete => {}
            StackState::Failed => {
                failed.get_or_insert_with(|| dep.clone());
            }
            StackState::Pending => pending.push(dep.clone()),
        }
    }

    match failed {
        Some(dep) => Readiness::Blocked(dep),
        None if pending.is_empty() => Readiness::Ready,
        None => Readiness::Waiting(pending),
    }
}

/// Latest known state of a dependency.
///
/// Terminal cache entries are reused. An actioned dependency is owned by its
/// own task, which always records a terminal state, so the cache is
/// authoritative for it. Anything else is queried live and memoised.
async fn dependency_state(ctx: &DeployContext, dep: &str) -> StackState {
    let cached = ctx.cache.get(dep);
    if cached.is_terminal() {
        return cached;
    }

    let Some(dependency) = ctx.stacks.get(dep) else {
        return cached;
    };
    if dependency.actioned {
        return cached;
    }

    match stack_state(ctx.backend.as_ref(), dependency).await {
        Ok(state) => {
            ctx.cache.record(dep, state);
            state
        }
        Err(err) => {
            debug!(dependency = %dep, error = %err, "transient error querying dependency; will retry");
            cached
        }
    }
}

async fn deploy_now(ctx: &DeployContext, stack: &Stack) {
    info!(stack = %stack.name, remote = %stack.remote_name, "deploying stack");

    let outcome = {
        let _tail = ctx.tail.attach(stack, OperationKind::Create);
        with_deadline(
            ctx.options.operation_timeout,
            "deploy",
            &stack.remote_name,
            ctx.backend.deploy(stack),
        )
        .await
    };

    match outcome {
        Ok(()) => {
            info!(stack = %stack.name, "stack deployed");
            ctx.cache.record(&stack.name, StackState::Complete);
        }
        Err(err) => {
            error!(stack = %stack.name, error = %err, "deployment failed");
            ctx.cache.record(&stack.name, StackState::Failed);
        }
    }
}
