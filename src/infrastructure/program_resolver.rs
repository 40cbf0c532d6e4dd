//! `ProgramResolver`: discovers the default agent program binary.
//!
//! Shells the operator's `$SHELL` with profile sourced: (1) `which <program>`
//! through an interactive shell so aliases/functions defined in the user's
//! profile are visible, (2) parses known alias output forms, (3) falls back
//! to a direct `PATH` scan. Process-spawn idiom grounded in
//! `application/mcp_process_manager.rs`.

use std::env;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::instrument;

use crate::domain::errors::{KasmosError, KasmosResult};
use crate::domain::ports::program_resolver::ProgramResolver as ProgramResolverPort;

/// Resolves programs via `$SHELL -ic "which <prog>"`, falling back to a
/// direct `PATH` scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellProgramResolver;

impl ShellProgramResolver {
    /// Construct the resolver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    async fn resolve_one(&self, candidate: &str) -> Option<String> {
        if let Some(path) = self.resolve_via_shell(candidate).await {
            return Some(path);
        }
        resolve_via_path(candidate)
    }

    async fn resolve_via_shell(&self, candidate: &str) -> Option<String> {
        let shell = env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        let output = Command::new(&shell)
            .arg("-ic")
            .arg(format!("which {candidate}"))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            return None;
        }
        let raw = String::from_utf8_lossy(&output.stdout);
        parse_which_output(raw.trim())
    }
}

/// Parse `which`/shell-alias output forms into a bare path.
///
/// Handles a closed set of forms: `aliased to <path>`, `-> <path>`,
/// `= <path>`, and a bare path line.
fn parse_which_output(line: &str) -> Option<String> {
    if line.is_empty() {
        return None;
    }
    for marker in ["aliased to ", "-> ", "= "] {
        if let Some(idx) = line.find(marker) {
            let rest = line[idx + marker.len()..].trim();
            if !rest.is_empty() {
                return Some(rest.to_string());
            }
        }
    }
    Some(line.to_string())
}

fn resolve_via_path(candidate: &str) -> Option<String> {
    let path_var = env::var_os("PATH")?;
    for dir in env::split_paths(&path_var) {
        let full = dir.join(candidate);
        if is_executable(&full) {
            return Some(full.display().to_string());
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &PathBuf) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &PathBuf) -> bool {
    path.is_file()
}

#[async_trait]
impl ProgramResolverPort for ShellProgramResolver {
    #[instrument(skip(self))]
    async fn resolve(&self, candidates: &[String]) -> KasmosResult<String> {
        for candidate in candidates {
            if let Some(path) = self.resolve_one(candidate).await {
                return Ok(path);
            }
        }
        Err(KasmosError::BackendMissing(format!("none of {candidates:?} were found on PATH or via shell alias")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliased_to_form() {
        assert_eq!(parse_which_output("claude: aliased to /usr/local/bin/claude"), Some("/usr/local/bin/claude".to_string()));
    }

    #[test]
    fn parses_arrow_form() {
        assert_eq!(parse_which_output("claude -> /opt/bin/claude"), Some("/opt/bin/claude".to_string()));
    }

    #[test]
    fn parses_equals_form() {
        assert_eq!(parse_which_output("claude = /opt/bin/claude"), Some("/opt/bin/claude".to_string()));
    }

    #[test]
    fn parses_bare_path() {
        assert_eq!(parse_which_output("/usr/bin/claude"), Some("/usr/bin/claude".to_string()));
    }

    #[test]
    fn empty_line_is_not_resolved() {
        assert_eq!(parse_which_output(""), None);
    }
}
