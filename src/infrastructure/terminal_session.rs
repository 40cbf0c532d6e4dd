//! `TerminalSession` (C4): one `tmux`-compatible multiplexer session per
//! instance.
//!
//! Grounded in `application/mcp_process_manager.rs`'s process-lifecycle
//! idiom (`tokio::process::Command` + `Stdio::piped()`), generalized from
//! owning a long-lived child directly to shelling individual `tmux`
//! subcommands. The fixed session-name prefix is `kasmos`.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{instrument, warn};

use crate::domain::errors::{KasmosError, KasmosResult};
use crate::domain::ports::terminal::{CaptureOptions, ReleaseHandle, TerminalSession as TerminalSessionPort, TerminalSessionFactory as TerminalSessionFactoryPort};

/// Fixed session-name prefix for every `kasmos`-owned multiplexer session.
pub const SESSION_PREFIX: &str = "kasmos";

/// Timeout budget for a single multiplexer command.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

fn session_name(title: &str) -> String {
    format!("{SESSION_PREFIX}_{title}")
}

async fn run_tmux(args: &[String]) -> KasmosResult<std::process::Output> {
    let fut = Command::new("tmux")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output();

    match timeout(COMMAND_TIMEOUT, fut).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => Err(KasmosError::BackendMissing("tmux binary not found".to_string())),
        Ok(Err(err)) => Err(KasmosError::internal(err)),
        Err(_) => Err(KasmosError::Internal(format!("tmux {args:?} timed out after {COMMAND_TIMEOUT:?}"))),
    }
}

fn args_of(strs: &[&str]) -> Vec<String> {
    strs.iter().map(|s| (*s).to_string()).collect()
}

struct TmuxReleaseHandle;

impl ReleaseHandle for TmuxReleaseHandle {
    fn release(self: Box<Self>) -> KasmosResult<()> {
        // Detaching the current TTY from a tmux session is a property of the
        // terminal this process is attached to, not of the session itself;
        // nothing further to shell out for once the caller drops the handle.
        Ok(())
    }
}

/// One `tmux` session wrapping an instance's agent process.
pub struct TmuxSession {
    name: String,
}

impl TmuxSession {
    fn new(title: &str) -> Self {
        Self { name: session_name(title) }
    }
}

#[async_trait]
impl TerminalSessionPort for TmuxSession {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self))]
    async fn attach(&self) -> KasmosResult<Box<dyn ReleaseHandle>> {
        if !self.exists().await {
            return Err(KasmosError::NotFound(self.name.clone()));
        }
        Ok(Box::new(TmuxReleaseHandle))
    }

    #[instrument(skip(self, text))]
    async fn send_keys(&self, text: &str) -> KasmosResult<()> {
        let literal = run_tmux(&["send-keys".to_string(), "-t".to_string(), self.name.clone(), "-l".to_string(), text.to_string()]).await?;
        if !literal.status.success() {
            return Err(KasmosError::Internal(format!("tmux send-keys failed: {}", String::from_utf8_lossy(&literal.stderr))));
        }
        let enter = run_tmux(&["send-keys".to_string(), "-t".to_string(), self.name.clone(), "Enter".to_string()]).await?;
        if !enter.status.success() {
            return Err(KasmosError::Internal(format!("tmux send-keys Enter failed: {}", String::from_utf8_lossy(&enter.stderr))));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn capture_pane(&self, opts: CaptureOptions) -> KasmosResult<String> {
        let mut args = vec!["capture-pane".to_string(), "-t".to_string(), self.name.clone(), "-p".to_string()];
        if let Some(lines) = opts.scrollback_lines {
            args.push("-S".to_string());
            args.push(format!("-{lines}"));
        }
        let output = run_tmux(&args).await?;
        if !output.status.success() {
            // Session-not-found on capture is benign, not an error.
            return Ok(String::new());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    #[instrument(skip(self))]
    async fn resize(&self, cols: u16, rows: u16) -> KasmosResult<()> {
        let output = run_tmux(&[
            "resize-window".to_string(),
            "-t".to_string(),
            self.name.clone(),
            "-x".to_string(),
            cols.to_string(),
            "-y".to_string(),
            rows.to_string(),
        ])
        .await?;
        if !output.status.success() {
            warn!(session = %self.name, "tmux resize-window failed: {}", String::from_utf8_lossy(&output.stderr));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn kill(&self) -> KasmosResult<()> {
        let output = run_tmux(&["kill-session".to_string(), "-t".to_string(), self.name.clone()]).await?;
        if output.status.success() || String::from_utf8_lossy(&output.stderr).contains("session not found") {
            return Ok(());
        }
        Err(KasmosError::Internal(format!("tmux kill-session failed: {}", String::from_utf8_lossy(&output.stderr))))
    }

    #[instrument(skip(self))]
    async fn exists(&self) -> bool {
        run_tmux(&["has-session".to_string(), "-t".to_string(), self.name.clone()])
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }
}

/// Creates `TmuxSession`s, tracking nothing itself: `tmux` is the source of
/// truth for which sessions are live.
#[derive(Debug, Clone, Copy, Default)]
pub struct TmuxSessionFactory;

impl TmuxSessionFactory {
    /// Construct the factory.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TerminalSessionFactoryPort for TmuxSessionFactory {
    #[instrument(skip(self, env))]
    async fn start(&self, title: &str, program: &str, args: &[String], cwd: &str, env: &HashMap<String, String>) -> KasmosResult<Box<dyn TerminalSessionPort>> {
        let session = TmuxSession::new(title);
        if session.exists().await {
            return Err(KasmosError::AlreadyExists(session.name.clone()));
        }

        let mut tmux_args = args_of(&["new-session", "-d", "-s"]);
        tmux_args.push(session.name.clone());
        tmux_args.push("-c".to_string());
        tmux_args.push(cwd.to_string());
        tmux_args.push(program.to_string());
        tmux_args.extend(args.iter().cloned());

        let output = run_tmux(&tmux_args).await?;
        if !output.status.success() {
            return Err(KasmosError::Internal(format!("tmux new-session failed: {}", String::from_utf8_lossy(&output.stderr))));
        }

        // set-environment must run after new-session: it targets the session
        // by name, which doesn't exist until new-session creates it.
        for (key, value) in env {
            match run_tmux(&["set-environment".to_string(), "-t".to_string(), session.name.clone(), key.clone(), value.clone()]).await {
                Ok(output) if !output.status.success() => {
                    warn!(session = %session.name, key = %key, "tmux set-environment failed: {}", String::from_utf8_lossy(&output.stderr));
                }
                Err(err) => {
                    warn!(session = %session.name, key = %key, error = %err, "tmux set-environment failed");
                }
                Ok(_) => {}
            }
        }

        Ok(Box::new(session))
    }

    #[instrument(skip(self))]
    async fn attach_existing(&self, title: &str) -> KasmosResult<Box<dyn TerminalSessionPort>> {
        let session = TmuxSession::new(title);
        if !session.exists().await {
            return Err(KasmosError::NotFound(session.name.clone()));
        }
        Ok(Box::new(session))
    }
}
