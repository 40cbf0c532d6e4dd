//! `PermissionStore` (C3 sub-interface): embedded SQLite-backed pattern store.
//!
//! Single table `(project_id, pattern)`, one transaction per write for
//! atomicity, following the `infrastructure/database/*_repo.rs` sqlx
//! convention.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::instrument;

use crate::domain::errors::KasmosResult;
use crate::domain::ports::workspace::PermissionStore as PermissionStorePort;

/// sqlx-SQLite-backed `PermissionStore`.
pub struct SqlitePermissionStore {
    pool: SqlitePool,
}

impl SqlitePermissionStore {
    /// Wrap an already-connected pool. Callers construct the pool (typically
    /// via `SqlitePoolOptions::connect` against a `sqlite://<path>?mode=rwc`
    /// URL) so connection lifecycle stays explicit at the call site.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the backing table if it does not already exist.
    pub async fn ensure_schema(&self) -> KasmosResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS permission_entries (
                project_id TEXT NOT NULL,
                pattern TEXT NOT NULL,
                PRIMARY KEY (project_id, pattern)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PermissionStorePort for SqlitePermissionStore {
    #[instrument(skip(self))]
    async fn remember(&self, project: &str, pattern: &str) -> KasmosResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT OR IGNORE INTO permission_entries (project_id, pattern) VALUES (?, ?)")
            .bind(project)
            .bind(pattern)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn forget(&self, project: &str, pattern: &str) -> KasmosResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM permission_entries WHERE project_id = ? AND pattern = ?")
            .bind(project)
            .bind(pattern)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn is_allowed_always(&self, project: &str, pattern: &str) -> KasmosResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM permission_entries WHERE project_id = ? AND pattern = ?")
            .bind(project)
            .bind(pattern)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    #[instrument(skip(self))]
    async fn list_patterns(&self, project: &str) -> KasmosResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT pattern FROM permission_entries WHERE project_id = ? ORDER BY pattern")
            .bind(project)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(pattern,)| pattern).collect())
    }
}
