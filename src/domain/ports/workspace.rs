//! `WorkspaceManager` and `PermissionStore` ports (C3).

use async_trait::async_trait;

use crate::domain::errors::KasmosResult;

/// Allocates and removes isolated working copies of the host repository, one
/// per instance, branch-scoped.
#[async_trait]
pub trait WorkspaceManager: Send + Sync {
    /// Allocate (or, if already allocated for this branch, return) an isolated
    /// working copy checked out at `branch`, branched from `base_commit`.
    ///
    /// Idempotent: re-allocating the same branch returns the same path.
    async fn allocate(&self, branch: &str, base_commit: &str) -> KasmosResult<String>;

    /// Remove the working copy at `workspace_path` and detach its checkout.
    async fn release(&self, workspace_path: &str) -> KasmosResult<()>;
}

/// Records per-project operator-approved "always-allow" patterns.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Record a pattern as pre-approved for `project`.
    async fn remember(&self, project: &str, pattern: &str) -> KasmosResult<()>;

    /// Remove a previously-remembered pattern.
    async fn forget(&self, project: &str, pattern: &str) -> KasmosResult<()>;

    /// True if `pattern` has been pre-approved for `project`.
    async fn is_allowed_always(&self, project: &str, pattern: &str) -> KasmosResult<bool>;

    /// List all patterns approved for `project`.
    async fn list_patterns(&self, project: &str) -> KasmosResult<Vec<String>>;
}
