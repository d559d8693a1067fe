// src/logging.rs

//! Logging setup for `stackctl` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `STACKCTL_LOG` environment variable, either a bare level ("debug") or a
//!    full filter directive ("stackctl::engine=debug,info")
//! 3. default to `info`
//!
//! Logs go to STDERR; stdout carries stack progress lines and command output.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

const LOG_ENV: &str = "STACKCTL_LOG";

/// Initialise the global logging subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => EnvFilter::new(level_directive(lvl)),
        None => match std::env::var(LOG_ENV) {
            Ok(directive) if !directive.trim().is_empty() => EnvFilter::try_new(directive.trim())
                .with_context(|| format!("invalid {LOG_ENV} filter '{directive}'"))?,
            _ => EnvFilter::new("info"),
        },
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}

fn level_directive(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
