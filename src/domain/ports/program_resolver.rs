//! `ProgramResolver` port: resolves the default agent program.

use async_trait::async_trait;

use crate::domain::errors::KasmosResult;

/// Resolves the default agent program from a configured preference list.
///
/// Kept as an explicit capability (rather than an ambient shell-out inside
/// `InstanceSupervisor`) so tests can stub it.
#[async_trait]
pub trait ProgramResolver: Send + Sync {
    /// Resolve the first preference in `candidates` that the shell can find,
    /// returning its absolute path. Fails with `BackendMissing` if none resolve.
    async fn resolve(&self, candidates: &[String]) -> KasmosResult<String>;
}
