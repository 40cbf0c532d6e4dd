//! Tracing subscriber setup.
//!
//! Grounded in `infrastructure/logging/logger.rs`: a daily-rotating file
//! appender plus an `EnvFilter` gated on `RUST_LOG`. Scaled down to the one
//! shape kasmos needs: file-only, because every terminal the core manages is
//! a `tmux` pane the agent owns, so stdout is not kasmos's to write to once
//! an attached interactive UI has taken the screen.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber, writing newline-delimited JSON
/// to `<log_dir>/kasmos.log`, rotated daily. The returned guard must be held
/// for the process lifetime; dropping it stops the background flush task.
pub fn init(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir).context("creating log directory")?;
    let appender = tracing_appender::rolling::daily(log_dir, "kasmos.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let env_filter = EnvFilter::builder().with_default_directive(tracing::Level::INFO.into()).from_env_lossy();

    tracing_subscriber::fmt()
        .json()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_env_filter(env_filter)
        .finish()
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(guard)
}
