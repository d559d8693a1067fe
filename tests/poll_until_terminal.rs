// tests/poll_until_terminal.rs

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use stackctl::engine::poll::{
    is_failure_status, CHANGE_SET_TERMINAL, CREATE_TERMINAL, DELETE_TERMINAL, UPDATE_TERMINAL,
};
use stackctl::engine::{poll_until_terminal, TerminalStatuses};
use stackctl_test_utils::with_timeout;

/// Status source that replays `script` and records when it was called.
fn scripted(
    script: Vec<Result<&'static str, &'static str>>,
) -> (
    impl FnMut() -> std::future::Ready<Result<String, String>>,
    Arc<Mutex<Vec<Instant>>>,
) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&calls);
    let mut script = script.into_iter();
    let last = Err("script exhausted");
    let source = move || {
        seen.lock().unwrap().push(Instant::now());
        let next = script.next().unwrap_or(last);
        std::future::ready(next.map(str::to_string).map_err(str::to_string))
    };
    (source, calls)
}

#[tokio::test]
async fn test_returns_first_terminal_status() {
    let (source, calls) = scripted(vec![
        Ok("CREATE_IN_PROGRESS"),
        Ok("CREATE_IN_PROGRESS"),
        Ok("CREATE_COMPLETE"),
        Ok("UPDATE_IN_PROGRESS"),
    ]);

    let status = with_timeout(poll_until_terminal(
        Duration::from_millis(10),
        &CREATE_TERMINAL,
        source,
    ))
    .await;

    assert_eq!(status, Ok("CREATE_COMPLETE".to_string()));
    assert_eq!(calls.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_first_call_is_immediate_and_later_calls_are_spaced() {
    let every = Duration::from_millis(40);
    let (source, calls) = scripted(vec![
        Ok("DELETE_IN_PROGRESS"),
        Ok("DELETE_IN_PROGRESS"),
        Ok("DELETE_IN_PROGRESS"),
        Ok("DELETE_COMPLETE"),
    ]);

    let started = Instant::now();
    let status = with_timeout(poll_until_terminal(every, &DELETE_TERMINAL, source)).await;
    assert_eq!(status.as_deref(), Ok("DELETE_COMPLETE"));

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 4);
    assert!(calls[0].duration_since(started) < every);
    for pair in calls.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(gap >= every.mul_f64(0.9), "polled after only {gap:?}");
    }
}

#[tokio::test]
async fn test_error_stops_polling() {
    let (source, calls) = scripted(vec![Ok("UPDATE_IN_PROGRESS"), Err("throttled")]);

    let status = with_timeout(poll_until_terminal(
        Duration::from_millis(5),
        &UPDATE_TERMINAL,
        source,
    ))
    .await;

    assert_eq!(status, Err("throttled".to_string()));
    assert_eq!(calls.lock().unwrap().len(), 2);
}

#[test]
fn test_wildcard_entries_match_by_suffix() {
    assert!(CREATE_TERMINAL.contains("UPDATE_ROLLBACK_COMPLETE"));
    assert!(CREATE_TERMINAL.contains("ROLLBACK_COMPLETE"));
    assert!(UPDATE_TERMINAL.contains("UPDATE_ROLLBACK_FAILED"));
    assert!(!UPDATE_TERMINAL.contains("UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS"));
    assert!(!UPDATE_TERMINAL.contains("UPDATE_COMPLETE_CLEANUP_IN_PROGRESS"));

    const CUSTOM: TerminalStatuses = TerminalStatuses::new(&["DONE", "*_GONE"]);
    assert!(CUSTOM.contains("DONE"));
    assert!(CUSTOM.contains("ALL_GONE"));
    assert!(!CUSTOM.contains("NOT_DONE"));
}

#[test]
fn test_change_set_terminal_statuses() {
    assert!(CHANGE_SET_TERMINAL.contains("CREATE_COMPLETE"));
    assert!(CHANGE_SET_TERMINAL.contains("FAILED"));
    assert!(!CHANGE_SET_TERMINAL.contains("CREATE_PENDING"));
    assert!(!CHANGE_SET_TERMINAL.contains("CREATE_IN_PROGRESS"));
}

#[test]
fn test_failure_statuses() {
    assert!(is_failure_status("CREATE_FAILED"));
    assert!(is_failure_status("ROLLBACK_COMPLETE"));
    assert!(is_failure_status("update_rollback_complete"));
    assert!(!is_failure_status("UPDATE_COMPLETE"));
    assert!(!is_failure_status("DELETE_COMPLETE"));
}
