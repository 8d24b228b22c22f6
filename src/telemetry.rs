//! Tracing setup.
//!
//! Human-readable logs go to stderr. Reasoning-engine calls are emitted on
//! the `llm_calls` target and written as JSON lines to
//! `<logs_dir>/llm_calls.jsonl` instead.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const LLM_CALLS_TARGET: &str = "llm_calls";
pub const LLM_CALLS_FILE: &str = "llm_calls.jsonl";

/// Install the global subscriber. Keep the guard alive until shutdown or
/// buffered call records are lost.
pub fn init_tracing(verbose: bool, logs_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("Failed to create logs directory: {}", logs_dir.display()))?;

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},hyper=warn,reqwest=warn", default_level)))
        .add_directive(
            format!("{}=off", LLM_CALLS_TARGET)
                .parse()
                .context("Invalid log directive")?,
        );

    let console = fmt::layer()
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(logs_dir, LLM_CALLS_FILE));
    let calls = fmt::layer()
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(writer)
        .with_filter(Targets::new().with_target(LLM_CALLS_TARGET, Level::INFO));

    tracing_subscriber::registry()
        .with(console)
        .with(calls)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
