//! `TerminalSession` port (C4): one multiplexer session per instance.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::errors::KasmosResult;

/// Options controlling `TerminalSession::capture_pane`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureOptions {
    /// Number of scrollback lines to include in addition to the visible
    /// pane. `None` captures only the visible region.
    pub scrollback_lines: Option<u32>,
}

/// A handle returned by `attach`; dropping it detaches the current TTY from
/// the session and returns control to the caller.
pub trait ReleaseHandle: Send {
    /// Explicitly detach. Equivalent to dropping the handle, but lets callers
    /// observe detach errors instead of silently ignoring them.
    fn release(self: Box<Self>) -> KasmosResult<()>;
}

/// One multiplexer session backing one instance.
///
/// Invariant: exactly one `start` call succeeds per session name; `kill` is
/// idempotent; a session-not-found on `capture_pane` is benign (empty
/// string), not an error.
#[async_trait]
pub trait TerminalSession: Send + Sync {
    /// The session's stable name, `<appPrefix>_<title>`.
    fn name(&self) -> &str;

    /// Bind the current TTY to this session. Returns a handle that detaches
    /// on drop/`release`.
    async fn attach(&self) -> KasmosResult<Box<dyn ReleaseHandle>>;

    /// Inject `text` into the session as keystrokes.
    async fn send_keys(&self, text: &str) -> KasmosResult<()>;

    /// Capture the pane's current visible content (and, if requested,
    /// scrollback). Returns an empty string if the session no longer exists.
    async fn capture_pane(&self, opts: CaptureOptions) -> KasmosResult<String>;

    /// Notify the multiplexer of a new viewport size.
    async fn resize(&self, cols: u16, rows: u16) -> KasmosResult<()>;

    /// Terminate the session and release all kernel resources. Idempotent.
    async fn kill(&self) -> KasmosResult<()>;

    /// Probe existence without side effects.
    async fn exists(&self) -> bool;
}

/// Creates `TerminalSession`s. Separated from the trait object itself because
/// `Start` is a one-shot constructor, not a method a live session exposes.
#[async_trait]
pub trait TerminalSessionFactory: Send + Sync {
    /// Create and start a new session running `program` with `args` in `cwd`,
    /// with the given extra environment variables. Errors with
    /// `AlreadyExists`-shaped `Internal` if a session of this name is already
    /// live; errors with `BackendMissing` if the multiplexer binary itself
    /// cannot be found.
    async fn start(
        &self,
        title: &str,
        program: &str,
        args: &[String],
        cwd: &str,
        env: &HashMap<String, String>,
    ) -> KasmosResult<Box<dyn TerminalSession>>;

    /// Attach to an already-running session by title without starting a new
    /// one program (used to reattach to an orphan session after a restart).
    async fn attach_existing(&self, title: &str) -> KasmosResult<Box<dyn TerminalSession>>;
}
