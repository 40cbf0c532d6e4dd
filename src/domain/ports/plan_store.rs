//! `PlanStore` port (C1): durable project→plans/topics mapping.

use async_trait::async_trait;

use crate::domain::errors::KasmosResult;
use crate::domain::models::{Plan, PlanPatch, Topic};

/// Durable, single-writer-per-project store of plans and topics.
///
/// The file-backed JSON implementation (`infrastructure::plan_store`) is the
/// reference implementation; any other backend must behave identically under
/// the same property tests.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Insert a plan. Fails with `AlreadyExists` if `(project, filename)` collides.
    async fn create(&self, project: &str, plan: Plan) -> KasmosResult<()>;

    /// Fetch a single plan by filename. Fails with `NotFound` if absent.
    async fn get(&self, project: &str, filename: &str) -> KasmosResult<Plan>;

    /// List all plans for a project, in no particular guaranteed order.
    async fn list(&self, project: &str) -> KasmosResult<Vec<Plan>>;

    /// Apply a partial update. Fails with `NotFound` if absent.
    async fn update(&self, project: &str, filename: &str, patch: PlanPatch) -> KasmosResult<Plan>;

    /// Atomically rekey a plan entry and move its on-disk content.
    /// Returns the (possibly unchanged) new filename.
    async fn rename(&self, project: &str, old_filename: &str, new_slug: &str) -> KasmosResult<String>;

    /// Create a topic. Idempotent: creating an existing (project, name) is a no-op.
    async fn create_topic(&self, project: &str, name: &str) -> KasmosResult<Topic>;

    /// List all topics for a project.
    async fn list_topics(&self, project: &str) -> KasmosResult<Vec<Topic>>;

    /// Delete a topic only if no plan in the project still references it.
    /// Returns true if deleted, false if it was still referenced (or absent).
    async fn delete_topic_if_unused(&self, project: &str, name: &str) -> KasmosResult<bool>;

    /// Fetch the markdown body for a plan.
    async fn get_content(&self, project: &str, filename: &str) -> KasmosResult<String>;

    /// Replace the markdown body for a plan.
    async fn put_content(&self, project: &str, filename: &str, content: &str) -> KasmosResult<()>;
}
