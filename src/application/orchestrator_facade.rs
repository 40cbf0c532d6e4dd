//! `OrchestratorFacade` (C9): the single object a UI talks to.
//!
//! Grounded in `application/task_coordinator.rs`'s shape: one coordinating
//! service wrapping narrower sub-services behind `Arc`, exposing a small
//! set of high-level operations and returning owned snapshots/DTOs, never a
//! live handle into its internals.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::domain::errors::KasmosResult;
use crate::domain::models::{AuditEvent, Instance, InstanceId, Plan, Role, Topic};
use crate::domain::ports::{PermissionStore, PlanStore, TerminalSessionFactory, WorkspaceManager};
use crate::services::audit_log::AuditFilter;
use crate::services::config::Config;
use crate::services::event_bus::EventBus;
use crate::services::plan_fsm::PlanEvent;

use super::instance_supervisor::{InstanceSupervisor, SpawnOpts};

/// Everything needed to spawn a new instance, at the facade's boundary
/// (reviewer/planner auto-spawns on a plan transition use this same shape).
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Title, unique within the project.
    pub title: String,
    /// Agent program to run; falls back to `Config::default_program` if empty.
    pub program: Option<String>,
    /// Extra CLI flags.
    pub args: Vec<String>,
    /// Extra environment variables for the session.
    pub env: HashMap<String, String>,
    /// Branch to allocate the workspace against.
    pub branch: String,
    /// Base commit/ref to branch from if the branch doesn't exist yet.
    pub base_commit: String,
    /// Plan this instance is bound to, if any.
    pub plan_filename: Option<String>,
    /// Role this instance plays.
    pub role: Role,
    /// Whether confirmation prompts should be auto-approved for this instance.
    pub skip_permissions: bool,
    /// Lets the caller cancel this launch while it's in flight. `None`
    /// launches with a fresh, never-cancelled token.
    pub cancellation: Option<CancellationToken>,
}

/// The orchestrator's single entry point: wraps the plan store, workspace
/// manager, permission store, instance supervisor and event bus, and is the
/// only object a caller (CLI or future TUI) constructs directly.
pub struct OrchestratorFacade {
    project: String,
    config: Config,
    plan_store: Arc<dyn PlanStore>,
    permission_store: Arc<dyn PermissionStore>,
    supervisor: Arc<InstanceSupervisor>,
    event_bus: Arc<EventBus>,
}

impl OrchestratorFacade {
    /// Construct the facade for `project`, wiring its C1/C3/C6/C7 collaborators.
    #[must_use]
    pub fn new(
        project: impl Into<String>,
        config: Config,
        plan_store: Arc<dyn PlanStore>,
        permission_store: Arc<dyn PermissionStore>,
        workspace_manager: Arc<dyn WorkspaceManager>,
        terminal_factory: Arc<dyn TerminalSessionFactory>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let supervisor = Arc::new(InstanceSupervisor::new(workspace_manager, terminal_factory, Arc::clone(&plan_store), Arc::clone(&event_bus)));
        Self {
            project: project.into(),
            config,
            plan_store,
            permission_store,
            supervisor,
            event_bus,
        }
    }

    /// Shared handle to the instance supervisor, for the polling loop to wrap.
    #[must_use]
    pub fn supervisor(&self) -> &Arc<InstanceSupervisor> {
        &self.supervisor
    }

    // ---- Plans -----------------------------------------------------------

    /// Create a new plan, optionally under a topic (creating it implicitly).
    #[instrument(skip(self, description, content))]
    pub async fn create_plan(&self, filename: &str, description: &str, branch: &str, topic: Option<&str>, content: &str) -> KasmosResult<Plan> {
        let mut plan = Plan::new(filename, description, branch);
        if let Some(topic) = topic {
            plan = plan.with_topic(topic);
            self.plan_store.create_topic(&self.project, topic).await?;
        }
        plan.content = content.to_string();
        self.plan_store.create(&self.project, plan.clone()).await?;
        Ok(plan)
    }

    /// List every plan in the project.
    pub async fn list_plans(&self) -> KasmosResult<Vec<Plan>> {
        self.plan_store.list(&self.project).await
    }

    /// List every topic in the project.
    pub async fn list_topics(&self) -> KasmosResult<Vec<Topic>> {
        self.plan_store.list_topics(&self.project).await
    }

    /// Drive a plan through the `PlanFSM`, enforcing the topic concurrency
    /// guard, and, if the transition lands on `reviewing` and
    /// `reviewer_launch` is supplied, launch a reviewer instance.
    #[instrument(skip(self, reviewer_launch))]
    pub async fn transition_plan(&self, plan_filename: &str, event: PlanEvent, reviewer_launch: Option<LaunchRequest>) -> KasmosResult<Plan> {
        let updated = self.supervisor.transition_plan(&self.project, plan_filename, event).await?;

        if updated.status == crate::domain::models::PlanStatus::Reviewing {
            if let Some(request) = reviewer_launch {
                self.launch(request).await?;
            }
        }

        Ok(updated)
    }

    // ---- Instances ---------------------------------------------------------

    /// Snapshot every live instance in the project.
    pub async fn list_instances(&self) -> Vec<Instance> {
        self.supervisor.list().await
    }

    /// Spawn a new instance.
    #[instrument(skip(self, request))]
    pub async fn launch(&self, request: LaunchRequest) -> KasmosResult<Instance> {
        let program = request.program.unwrap_or_else(|| self.config.default_program.clone());
        self.supervisor
            .spawn(SpawnOpts {
                title: request.title,
                program,
                args: request.args,
                env: request.env,
                branch: request.branch,
                base_commit: request.base_commit,
                plan_filename: request.plan_filename,
                role: request.role,
                wave_task: None,
                skip_permissions: request.skip_permissions,
                cancellation: request.cancellation.unwrap_or_default(),
            })
            .await
    }

    /// Kill an instance.
    pub async fn kill(&self, id: InstanceId) -> KasmosResult<()> {
        self.supervisor.kill(id).await
    }

    /// Pause an instance.
    pub async fn pause(&self, id: InstanceId) -> KasmosResult<Instance> {
        self.supervisor.pause(id).await
    }

    /// Resume a paused instance with the given program/args/env.
    pub async fn resume(&self, id: InstanceId, program: &str, args: &[String], env: &HashMap<String, String>) -> KasmosResult<Instance> {
        self.supervisor.resume(id, program, args, env).await
    }

    /// Inject text into an instance's session.
    pub async fn send_prompt(&self, id: InstanceId, text: &str) -> KasmosResult<()> {
        self.supervisor.send_prompt(id, text).await
    }

    /// Approve a pending confirmation prompt, remembering the pattern for
    /// future auto-approval if `remember` is set.
    pub async fn send_yes(&self, id: InstanceId, pattern: Option<&str>, remember: bool) -> KasmosResult<()> {
        self.supervisor.send_yes(id).await?;
        if remember {
            if let Some(pattern) = pattern {
                self.permission_store.remember(&self.project, pattern).await?;
            }
        }
        Ok(())
    }

    /// True if `pattern` has been pre-approved for this project.
    pub async fn is_allowed_always(&self, pattern: &str) -> KasmosResult<bool> {
        self.permission_store.is_allowed_always(&self.project, pattern).await
    }

    // ---- Audit -------------------------------------------------------------

    /// The most recent `k` audit events.
    pub async fn recent_events(&self, k: usize) -> Vec<AuditEvent> {
        self.event_bus.audit_log().recent(k).await
    }

    /// Query the audit log with a filter.
    pub async fn query_events(&self, filter: &AuditFilter) -> Vec<AuditEvent> {
        self.event_bus.audit_log().query(filter).await
    }

    /// Subscribe to the live event stream.
    #[must_use]
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<AuditEvent> {
        self.event_bus.subscribe()
    }
}
