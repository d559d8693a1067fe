// src/types.rs

//! Small shared value types: coarse stack state, operation kinds and the
//! duration syntax used in the config file.

use std::fmt;
use std::time::Duration;

/// Canonical logical stack name used throughout the engine.
pub type StackName = String;

/// Coarse state of a stack as seen by the schedulers.
///
/// An in-progress remote status maps to `Pending`: callers keep waiting in
/// both cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackState {
    Pending,
    Complete,
    Failed,
}

impl StackState {
    /// Derive a coarse state from a raw backend status string.
    ///
    /// "complete" wins over "fail" so that e.g. `DELETE_COMPLETE` is never
    /// read as a failure; matching is case-insensitive.
    pub fn from_status(status: &str) -> Self {
        let status = status.to_lowercase();
        if status.contains("complete") {
            StackState::Complete
        } else if status.contains("fail") {
            StackState::Failed
        } else {
            StackState::Pending
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, StackState::Pending)
    }
}

impl fmt::Display for StackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StackState::Pending => "pending",
            StackState::Complete => "complete",
            StackState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Kind of long-running remote operation a progress tail follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    Update,
    Delete,
    /// No filter: every event is shown.
    Any,
}

impl OperationKind {
    /// Status prefix (the token before the first `_`) this kind matches.
    pub fn status_prefix(self) -> &'static str {
        match self {
            OperationKind::Create => "CREATE",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
            OperationKind::Any => "",
        }
    }
}

/// Parse durations such as `"1500ms"`, `"2s"`, `"30m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

    let secs_per_unit = match unit_part.trim().to_lowercase().as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        unit => {
            return Err(format!(
                "unsupported duration unit '{unit}'; expected ms, s, m, or h"
            ))
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is out of range"))
}
