// src/logging.rs

//! Logging setup for `taskdispatch` using `tracing` + `tracing-subscriber`.
//!
//! The filter comes from, in order:
//! 1. `--log-level` CLI flag (if provided), applied to every target
//! 2. `TASKDISPATCH_LOG`, read as an `EnvFilter` directive such as
//!    `debug` or `info,taskdispatch::exec=trace`
//! 3. `info`
//!
//! An unparsable `TASKDISPATCH_LOG` falls back to `info` with a warning
//! on stderr. Logs are sent to STDERR so that stdout stays free for
//! dry-run and `logs` output.

use anyhow::{Result, anyhow};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_LEVEL_VAR: &str = "TASKDISPATCH_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_directive = std::env::var(LOG_LEVEL_VAR).ok();
    let filter = build_filter(cli_level, env_directive.as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))?;

    Ok(())
}

fn build_filter(cli_level: Option<LogLevel>, env_directive: Option<&str>) -> EnvFilter {
    if let Some(lvl) = cli_level {
        return EnvFilter::default().add_directive(level_filter(lvl).into());
    }

    match env_directive.map(str::trim).filter(|s| !s.is_empty()) {
        Some(directive) => EnvFilter::try_new(directive).unwrap_or_else(|e| {
            eprintln!("taskdispatch: ignoring {LOG_LEVEL_VAR}={directive:?}: {e}");
            default_filter()
        }),
        None => default_filter(),
    }
}

fn default_filter() -> EnvFilter {
    EnvFilter::default().add_directive(LevelFilter::INFO.into())
}

fn level_filter(lvl: LogLevel) -> LevelFilter {
    match lvl {
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    }
}
