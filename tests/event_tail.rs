// tests/event_tail.rs

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use stackctl::backend::{SharedBackend, StackEvent};
use stackctl::engine::tail::{format_event_line, process_request, should_emit};
use stackctl::engine::{EventTail, TailRequest};
use stackctl::stack::Stack;
use stackctl::types::OperationKind;
use stackctl_test_utils::fake_backend::FakeBackend;
use stackctl_test_utils::{init_tracing, with_timeout};

fn net() -> Stack {
    Stack::new("demo", "net").with_template("{}")
}

#[test]
fn test_should_emit_matches_status_prefix() {
    assert!(should_emit(OperationKind::Create, "CREATE_IN_PROGRESS"));
    assert!(should_emit(OperationKind::Delete, "DELETE_COMPLETE"));
    assert!(!should_emit(OperationKind::Delete, "CREATE_COMPLETE"));
    assert!(!should_emit(OperationKind::Create, "UPDATE_IN_PROGRESS"));
}

#[test]
fn test_should_emit_always_shows_rollbacks_and_any() {
    assert!(should_emit(OperationKind::Create, "ROLLBACK_IN_PROGRESS"));
    assert!(should_emit(OperationKind::Delete, "UPDATE_ROLLBACK_COMPLETE"));
    assert!(should_emit(OperationKind::Any, "UPDATE_COMPLETE"));
    assert!(should_emit(OperationKind::Any, "REVIEW_IN_PROGRESS"));
}

#[test]
fn test_format_event_line() {
    colored::control::set_override(false);
    let event = StackEvent {
        status: "CREATE_FAILED".to_string(),
        resource_type: "Local::Stack".to_string(),
        logical_id: "demo-net".to_string(),
        reason: Some("Template body is empty".to_string()),
        timestamp: Utc::now(),
    };

    assert_eq!(
        format_event_line("net", &event),
        "net - CREATE_FAILED Local::Stack demo-net - Template body is empty"
    );

    let quiet = StackEvent {
        reason: None,
        ..event
    };
    assert_eq!(
        format_event_line("net", &quiet),
        "net - CREATE_FAILED Local::Stack demo-net"
    );
}

#[tokio::test]
async fn test_same_line_is_printed_once_per_request() {
    init_tracing();
    let fake = FakeBackend::new();
    fake.push_event("demo-net", "CREATE_IN_PROGRESS", Some("User Initiated"));
    let request = TailRequest::new(&net(), OperationKind::Create);

    let first = process_request(&fake, &request).await;
    assert!(first.as_deref().is_some_and(|l| l.contains("CREATE_IN_PROGRESS")));
    assert_eq!(process_request(&fake, &request).await, None);

    fake.push_event("demo-net", "CREATE_COMPLETE", None);
    let next = process_request(&fake, &request).await;
    assert!(next.as_deref().is_some_and(|l| l.contains("CREATE_COMPLETE")));
    assert_eq!(process_request(&fake, &request).await, None);
}

#[tokio::test]
async fn test_dedup_sets_are_not_shared_between_requests() {
    init_tracing();
    let fake = FakeBackend::new();
    fake.push_event("demo-net", "CREATE_IN_PROGRESS", None);

    let first = TailRequest::new(&net(), OperationKind::Create);
    let second = TailRequest::new(&net(), OperationKind::Create);

    assert!(process_request(&fake, &first).await.is_some());
    assert!(process_request(&fake, &second).await.is_some());
    assert!(process_request(&fake, &first.clone()).await.is_none());
}

#[tokio::test]
async fn test_filtered_and_missing_events_print_nothing() {
    init_tracing();
    let fake = FakeBackend::new();
    let request = TailRequest::new(&net(), OperationKind::Delete);

    assert_eq!(process_request(&fake, &request).await, None);

    fake.push_event("demo-net", "CREATE_COMPLETE", None);
    assert_eq!(process_request(&fake, &request).await, None);
}

#[tokio::test]
async fn test_tail_service_emits_progress_until_guard_drops() {
    init_tracing();
    let fake = Arc::new(FakeBackend::new());
    fake.push_event("demo-net", "CREATE_IN_PROGRESS", None);
    let backend: SharedBackend = fake.clone();

    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&lines);
    let tail = EventTail::spawn_with_sink(backend, Duration::from_millis(10), move |line| {
        sink.lock().unwrap().push(line)
    });

    let guard = tail.handle().attach(&net(), OperationKind::Create);
    tokio::time::sleep(Duration::from_millis(60)).await;
    fake.push_event("demo-net", "CREATE_COMPLETE", None);
    drop(guard);

    with_timeout(tail.shutdown()).await;

    let lines = lines.lock().unwrap();
    assert_eq!(lines.len(), 2, "lines: {lines:?}");
    assert!(lines[0].contains("CREATE_IN_PROGRESS"));
    assert!(lines[1].contains("CREATE_COMPLETE"));
}

#[tokio::test]
async fn test_describe_error_skips_the_tick_only() {
    init_tracing();
    let fake = FakeBackend::new().failing_events("demo-net");
    fake.push_event("demo-net", "CREATE_IN_PROGRESS", None);
    let request = TailRequest::new(&net(), OperationKind::Create);

    assert_eq!(process_request(&fake, &request).await, None);

    fake.set_events_failing("demo-net", false);
    let recovered = process_request(&fake, &request).await;
    assert!(recovered.as_deref().is_some_and(|l| l.contains("CREATE_IN_PROGRESS")));
}

#[tokio::test]
async fn test_tail_service_survives_describe_errors() {
    init_tracing();
    let fake = Arc::new(FakeBackend::new().failing_events("demo-net"));
    fake.push_event("demo-net", "CREATE_IN_PROGRESS", None);
    let backend: SharedBackend = fake.clone();

    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&lines);
    let tail = EventTail::spawn_with_sink(backend, Duration::from_millis(10), move |line| {
        sink.lock().unwrap().push(line)
    });

    let guard = tail.handle().attach(&net(), OperationKind::Create);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(lines.lock().unwrap().is_empty());

    fake.set_events_failing("demo-net", false);
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(guard);
    with_timeout(tail.shutdown()).await;

    let lines = lines.lock().unwrap();
    assert_eq!(lines.len(), 1, "lines: {lines:?}");
    assert!(lines[0].contains("CREATE_IN_PROGRESS"));
}
