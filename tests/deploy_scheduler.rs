// tests/deploy_scheduler.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use stackctl::backend::SharedBackend;
use stackctl::engine::{run_deployment, BatchReport, SchedulerOptions};
use stackctl::errors::StackctlError;
use stackctl::stack::{Stack, StackSet};
use stackctl::types::StackState;
use stackctl_test_utils::builders::StackSetBuilder;
use stackctl_test_utils::fake_backend::{FakeBackend, Op};
use stackctl_test_utils::{fast_options, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// net <- db <- app
fn chain() -> StackSetBuilder {
    StackSetBuilder::new("demo")
        .stack("net", &[])
        .stack("db", &["net"])
        .stack("app", &["db"])
}

async fn deploy(
    fake: &Arc<FakeBackend>,
    stacks: StackSet,
    options: SchedulerOptions,
) -> stackctl::errors::Result<BatchReport> {
    let backend: SharedBackend = fake.clone();
    with_timeout(run_deployment(backend, Arc::new(stacks), options)).await
}

#[tokio::test]
async fn test_chain_deploys_in_dependency_order() -> TestResult {
    init_tracing();
    let fake = Arc::new(FakeBackend::new().with_deploy_delay(Duration::from_millis(20)));

    let report = deploy(&fake, chain().action_all().build(), fast_options()).await?;

    assert!(report.all_complete(), "unsettled: {:?}", report.unsettled());
    assert_eq!(
        fake.order_of(Op::Deploy),
        vec!["demo-net", "demo-db", "demo-app"]
    );

    let net = fake.call(Op::Deploy, "demo-net").unwrap();
    let db = fake.call(Op::Deploy, "demo-db").unwrap();
    let app = fake.call(Op::Deploy, "demo-app").unwrap();
    assert!(net.started < db.started && db.started < app.started);
    assert!(db.started >= net.finished.unwrap());
    assert!(app.started >= db.finished.unwrap());
    Ok(())
}

#[tokio::test]
async fn test_independent_stacks_deploy_concurrently() -> TestResult {
    init_tracing();
    let fake = Arc::new(FakeBackend::new().with_deploy_delay(Duration::from_millis(150)));
    let stacks = StackSetBuilder::new("demo")
        .stack("alpha", &[])
        .stack("beta", &[])
        .action_all()
        .build();

    let report = deploy(&fake, stacks, fast_options()).await?;
    assert!(report.all_complete());

    let alpha = fake.call(Op::Deploy, "demo-alpha").unwrap();
    let beta = fake.call(Op::Deploy, "demo-beta").unwrap();
    assert!(alpha.started < beta.finished.unwrap());
    assert!(beta.started < alpha.finished.unwrap());
    Ok(())
}

#[tokio::test]
async fn test_existing_healthy_stack_is_not_redeployed() -> TestResult {
    init_tracing();
    let fake = Arc::new(FakeBackend::new().with_existing("demo-net", "UPDATE_COMPLETE"));

    let report = deploy(
        &fake,
        StackSetBuilder::new("demo")
            .stack("net", &[])
            .stack("db", &["net"])
            .action_all()
            .build(),
        fast_options(),
    )
    .await?;

    assert!(report.all_complete());
    assert_eq!(fake.order_of(Op::Deploy), vec!["demo-db"]);
    assert!(fake.calls_for(Op::Terminate).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_existing_failed_stack_is_terminated_before_deploy() -> TestResult {
    init_tracing();
    let fake = Arc::new(
        FakeBackend::new()
            .with_existing("demo-net", "CREATE_FAILED")
            .with_terminate_delay(Duration::from_millis(20)),
    );

    let stacks = StackSetBuilder::new("demo").stack("net", &[]).action_all().build();
    let report = deploy(&fake, stacks, fast_options()).await?;

    assert_eq!(report.state_of("net"), Some(StackState::Complete));
    let removed = fake.call(Op::Terminate, "demo-net").expect("failed stack terminated");
    let created = fake.call(Op::Deploy, "demo-net").expect("stack redeployed");
    assert!(created.started >= removed.finished.unwrap());
    assert_eq!(fake.status_of("demo-net").as_deref(), Some("CREATE_COMPLETE"));
    Ok(())
}

#[tokio::test]
async fn test_failed_stack_that_cannot_be_removed_is_reported_failed() -> TestResult {
    init_tracing();
    let fake = Arc::new(
        FakeBackend::new()
            .with_existing("demo-net", "CREATE_FAILED")
            .failing_terminate("demo-net"),
    );

    let stacks = StackSetBuilder::new("demo")
        .stack("net", &[])
        .stack("db", &["net"])
        .action_all()
        .build();
    let report = deploy(&fake, stacks, fast_options()).await?;

    assert_eq!(report.state_of("net"), Some(StackState::Failed));
    assert_eq!(report.state_of("db"), Some(StackState::Failed));
    assert!(fake.calls_for(Op::Deploy).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_dependency_blocks_every_dependent() -> TestResult {
    init_tracing();
    let fake = Arc::new(FakeBackend::new().failing_deploy("demo-net"));

    let report = deploy(&fake, chain().action_all().build(), fast_options()).await?;

    assert_eq!(fake.order_of(Op::Deploy), vec!["demo-net"]);
    assert_eq!(report.state_of("net"), Some(StackState::Failed));
    assert_eq!(report.state_of("db"), Some(StackState::Failed));
    assert_eq!(report.state_of("app"), Some(StackState::Failed));
    assert_eq!(report.unsettled(), vec!["app", "db", "net"]);
    Ok(())
}

#[tokio::test]
async fn test_independent_branch_survives_sibling_failure() -> TestResult {
    init_tracing();
    let fake = Arc::new(FakeBackend::new().failing_deploy("demo-cache"));
    let stacks = StackSetBuilder::new("demo")
        .stack("net", &[])
        .stack("cache", &["net"])
        .stack("db", &["net"])
        .action_all()
        .build();

    let report = deploy(&fake, stacks, fast_options()).await?;

    assert_eq!(report.state_of("net"), Some(StackState::Complete));
    assert_eq!(report.state_of("db"), Some(StackState::Complete));
    assert_eq!(report.state_of("cache"), Some(StackState::Failed));
    Ok(())
}

#[tokio::test]
async fn test_operation_timeout_records_failure() -> TestResult {
    init_tracing();
    let fake = Arc::new(FakeBackend::new().with_delay_for("demo-net", Duration::from_secs(5)));
    let options = SchedulerOptions {
        operation_timeout: Some(Duration::from_millis(50)),
        ..fast_options()
    };

    let report = deploy(&fake, chain().action_all().build(), options).await?;

    assert_eq!(report.state_of("net"), Some(StackState::Failed));
    assert_eq!(report.state_of("app"), Some(StackState::Failed));
    assert_eq!(fake.order_of(Op::Deploy), vec!["demo-net"]);
    Ok(())
}

#[tokio::test]
async fn test_unactioned_dependency_is_queried_live() -> TestResult {
    init_tracing();
    let fake = Arc::new(FakeBackend::new().with_existing("demo-net", "CREATE_COMPLETE"));

    let report = deploy(&fake, chain().action(&["db"]).build(), fast_options()).await?;

    assert_eq!(report.states.len(), 1);
    assert_eq!(report.state_of("db"), Some(StackState::Complete));
    assert_eq!(fake.order_of(Op::Deploy), vec!["demo-db"]);
    Ok(())
}

#[tokio::test]
async fn test_live_dependency_state_is_shared_between_waiters() -> TestResult {
    init_tracing();
    let fake = Arc::new(
        FakeBackend::new()
            .with_existing("demo-net", "CREATE_IN_PROGRESS")
            .with_delay_for("demo-db", Duration::from_millis(120)),
    );
    // db and app both wait on net; app also waits on db, so it keeps ticking
    // on net long after net has settled.
    let stacks = StackSetBuilder::new("demo")
        .stack("net", &[])
        .stack("db", &["net"])
        .stack("app", &["net", "db"])
        .action(&["db", "app"])
        .build();

    let settle_net = async {
        tokio::time::sleep(Duration::from_millis(60)).await;
        fake.set_status("demo-net", "CREATE_COMPLETE");
    };
    let (report, ()) = tokio::join!(deploy(&fake, stacks, fast_options()), settle_net);
    let report = report?;

    assert!(report.all_complete(), "unsettled: {:?}", report.unsettled());
    assert_eq!(fake.order_of(Op::Deploy), vec!["demo-db", "demo-app"]);
    assert!(fake.status_queries("demo-net", "CREATE_IN_PROGRESS") >= 1);
    // Once one waiter has seen net complete, nobody asks the backend again.
    let settled_reads = fake.status_queries("demo-net", "CREATE_COMPLETE");
    assert!((1..=2).contains(&settled_reads), "net read {settled_reads} times after settling");
    Ok(())
}

#[tokio::test]
async fn test_unactioned_failed_dependency_blocks() -> TestResult {
    init_tracing();
    let fake = Arc::new(FakeBackend::new().with_existing("demo-net", "UPDATE_FAILED"));

    let report = deploy(&fake, chain().action(&["db"]).build(), fast_options()).await?;

    assert_eq!(report.state_of("db"), Some(StackState::Failed));
    assert!(fake.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cycle_is_rejected_before_scheduling() {
    init_tracing();
    let fake = Arc::new(FakeBackend::new());
    let mut stacks = StackSet::new("demo");
    stacks.insert(Stack::new("demo", "a").with_dependencies(["b"]).with_template("{}"));
    stacks.insert(Stack::new("demo", "b").with_dependencies(["a"]).with_template("{}"));
    stacks.select_all();

    let result = deploy(&fake, stacks, fast_options()).await;

    match result {
        Err(StackctlError::DependencyCycle(msg)) => assert!(msg.contains("cycle detected")),
        other => panic!("expected DependencyCycle, got {other:?}"),
    }
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_dependency_is_rejected_before_scheduling() {
    init_tracing();
    let fake = Arc::new(FakeBackend::new());
    let stacks = StackSetBuilder::new("demo")
        .stack("app", &["ghost"])
        .action_all()
        .build();

    let result = deploy(&fake, stacks, fast_options()).await;

    match result {
        Err(StackctlError::ConfigError(msg)) => assert!(msg.contains("ghost")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn test_nothing_actioned_is_a_no_op() -> TestResult {
    init_tracing();
    let fake = Arc::new(FakeBackend::new());

    let report = deploy(&fake, chain().build(), fast_options()).await?;

    assert!(report.states.is_empty());
    assert!(report.all_complete());
    assert!(fake.calls().is_empty());
    Ok(())
}
