// src/logging.rs

//! Logging setup for `parabuild` using `tracing` + `tracing-subscriber`.
//!
//! The base level comes from, in order:
//! 1. `--log-level` CLI flag (if provided)
//! 2. a bare level in `PARABUILD_LOG` (e.g. "info", "debug")
//! 3. default to `info`
//!
//! `PARABUILD_LOG` may also carry per-module directives, which apply on top
//! of the base level whatever its source. `PARABUILD_LOG=parabuild::pool=trace`
//! shows every slot hand-off and batch in the worker pool while the rest of
//! the build stays at `info`.
//!
//! Logs are sent to STDERR so that command stdout can be used purely for
//! task output. Thread names are included, which shows the pool worker
//! (`parabuild-worker-<pool>-<n>`) a task ran on.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

/// Environment variable consulted for the level and module directives.
pub const LOG_ENV_VAR: &str = "PARABUILD_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV_VAR).ok();
    let spec = filter_spec(cli_level, env.as_deref());
    let filter = EnvFilter::try_new(&spec)
        .with_context(|| format!("invalid {LOG_ENV_VAR} filter '{spec}'"))?;

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}

/// Combine the CLI level and `PARABUILD_LOG` into one `EnvFilter` spec.
fn filter_spec(cli_level: Option<LogLevel>, env: Option<&str>) -> String {
    let mut env_level = None;
    let mut directives = Vec::new();

    for part in env.unwrap_or_default().split(',').map(str::trim) {
        if part.is_empty() {
            continue;
        }
        match parse_level_str(part) {
            Some(level) if env_level.is_none() => env_level = Some(level),
            Some(_) => {}
            None => directives.push(part),
        }
    }

    let level = cli_level.map(level_name).or(env_level).unwrap_or("info");
    std::iter::once(level)
        .chain(directives)
        .collect::<Vec<_>>()
        .join(",")
}

fn level_name(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

fn parse_level_str(s: &str) -> Option<&'static str> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some("error"),
        "warn" | "warning" => Some("warn"),
        "info" => Some("info"),
        "debug" => Some("debug"),
        "trace" => Some("trace"),
        _ => None,
    }
}
