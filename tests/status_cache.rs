// tests/status_cache.rs

use std::error::Error;
use std::time::Duration;

use stackctl::dag::StatusCache;
use stackctl::stack::{remote_name, stack_exists, stack_state, Stack};
use stackctl::types::{parse_duration, OperationKind, StackState};
use stackctl_test_utils::fake_backend::FakeBackend;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn test_absent_entry_reads_as_pending() {
    let cache = StatusCache::new();
    assert_eq!(cache.get("net"), StackState::Pending);
    assert_eq!(cache.lookup("net"), None);
}

#[test]
fn test_clones_share_entries() {
    let cache = StatusCache::new();
    let other = cache.clone();

    other.record("net", StackState::Complete);
    cache.record("db", StackState::Failed);

    assert_eq!(cache.get("net"), StackState::Complete);
    assert_eq!(other.lookup("db"), Some(StackState::Failed));
}

#[test]
fn test_state_from_status() {
    assert_eq!(StackState::from_status("CREATE_COMPLETE"), StackState::Complete);
    assert_eq!(StackState::from_status("create_failed"), StackState::Failed);
    assert_eq!(StackState::from_status("UPDATE_IN_PROGRESS"), StackState::Pending);
    // "complete" is checked first.
    assert_eq!(StackState::from_status("DELETE_COMPLETE"), StackState::Complete);
    assert_eq!(
        StackState::from_status("UPDATE_ROLLBACK_COMPLETE"),
        StackState::Complete
    );
    assert_eq!(StackState::from_status("ROLLBACK_FAILED"), StackState::Failed);

    assert!(StackState::Complete.is_terminal());
    assert!(StackState::Failed.is_terminal());
    assert!(!StackState::Pending.is_terminal());
    assert_eq!(StackState::Failed.to_string(), "failed");
}

#[tokio::test]
async fn test_live_state_derivation() -> TestResult {
    let fake = FakeBackend::new()
        .with_existing("demo-db", "CREATE_FAILED")
        .with_existing("demo-app", "CREATE_IN_PROGRESS");
    let net = Stack::new("demo", "net");
    let db = Stack::new("demo", "db");
    let app = Stack::new("demo", "app");

    assert_eq!(stack_state(&fake, &net).await?, StackState::Pending);
    assert_eq!(stack_state(&fake, &db).await?, StackState::Failed);
    assert_eq!(stack_state(&fake, &app).await?, StackState::Pending);

    assert!(!stack_exists(&fake, &net).await?);
    assert!(stack_exists(&fake, &db).await?);
    Ok(())
}

#[test]
fn test_remote_name_is_derived_from_project_and_name() {
    assert_eq!(remote_name("demo", "net"), "demo-net");
    let stack = Stack::new("demo", "net");
    assert_eq!(stack.remote_name, "demo-net");
    assert!(!stack.actioned);
}

#[test]
fn test_parse_duration() {
    assert_eq!(parse_duration("1500ms"), Ok(Duration::from_millis(1500)));
    assert_eq!(parse_duration(" 2s "), Ok(Duration::from_secs(2)));
    assert_eq!(parse_duration("30m"), Ok(Duration::from_secs(1800)));
    assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
    assert!(parse_duration("").is_err());
    assert!(parse_duration("15").is_err());
    assert!(parse_duration("2d").is_err());
    assert!(parse_duration("fast").is_err());
}

#[test]
fn test_parse_duration_rejects_overflow() {
    let err = parse_duration("999999999999999999h").unwrap_err();
    assert!(err.contains("out of range"), "unexpected message: {err}");
    assert!(parse_duration("999999999999999999m").is_err());
    assert_eq!(
        parse_duration("999999999999999999s"),
        Ok(Duration::from_secs(999_999_999_999_999_999))
    );
}

#[test]
fn test_operation_kind_status_prefix() {
    assert_eq!(OperationKind::Create.status_prefix(), "CREATE");
    assert_eq!(OperationKind::Update.status_prefix(), "UPDATE");
    assert_eq!(OperationKind::Delete.status_prefix(), "DELETE");
    assert_eq!(OperationKind::Any.status_prefix(), "");
}
