//! Integration tests for the plan lifecycle end to end: facade -> supervisor
//! -> FSM -> file-backed plan store, with real `JsonPlanStore` against a
//! temp directory and in-memory stand-ins for the workspace/terminal
//! adapters (no real `git`/`tmux` subprocess is exercised here).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::tempdir;
use tokio::sync::Mutex as AsyncMutex;

use kasmos::application::{LaunchRequest, OrchestratorFacade};
use kasmos::domain::errors::{KasmosError, KasmosResult};
use kasmos::domain::models::{InstanceStatus, PlanStatus, Role};
use kasmos::domain::ports::terminal::{CaptureOptions, ReleaseHandle, TerminalSession, TerminalSessionFactory};
use kasmos::domain::ports::{PermissionStore, WorkspaceManager};
use kasmos::infrastructure::JsonPlanStore;
use kasmos::services::audit_log::AuditLog;
use kasmos::services::config::Config;
use kasmos::services::event_bus::EventBus;
use kasmos::services::plan_fsm::PlanEvent;

struct TempWorkspace;

#[async_trait]
impl WorkspaceManager for TempWorkspace {
    async fn allocate(&self, branch: &str, _base_commit: &str) -> KasmosResult<String> {
        Ok(format!("/tmp/kasmos-test-ws/{branch}"))
    }
    async fn release(&self, _workspace_path: &str) -> KasmosResult<()> {
        Ok(())
    }
}

struct FakeSession(String);

#[async_trait]
impl TerminalSession for FakeSession {
    fn name(&self) -> &str {
        &self.0
    }
    async fn attach(&self) -> KasmosResult<Box<dyn ReleaseHandle>> {
        Err(KasmosError::NotFound(self.0.clone()))
    }
    async fn send_keys(&self, _text: &str) -> KasmosResult<()> {
        Ok(())
    }
    async fn capture_pane(&self, _opts: CaptureOptions) -> KasmosResult<String> {
        Ok(String::new())
    }
    async fn resize(&self, _cols: u16, _rows: u16) -> KasmosResult<()> {
        Ok(())
    }
    async fn kill(&self) -> KasmosResult<()> {
        Ok(())
    }
    async fn exists(&self) -> bool {
        true
    }
}

struct FakeTerminalFactory;

#[async_trait]
impl TerminalSessionFactory for FakeTerminalFactory {
    async fn start(&self, title: &str, _program: &str, _args: &[String], _cwd: &str, _env: &HashMap<String, String>) -> KasmosResult<Box<dyn TerminalSession>> {
        Ok(Box::new(FakeSession(title.to_string())))
    }
    async fn attach_existing(&self, title: &str) -> KasmosResult<Box<dyn TerminalSession>> {
        Ok(Box::new(FakeSession(title.to_string())))
    }
}

struct NoopPermissions {
    remembered: AsyncMutex<Vec<String>>,
}

#[async_trait]
impl PermissionStore for NoopPermissions {
    async fn remember(&self, _project: &str, pattern: &str) -> KasmosResult<()> {
        self.remembered.lock().await.push(pattern.to_string());
        Ok(())
    }
    async fn forget(&self, _project: &str, pattern: &str) -> KasmosResult<()> {
        self.remembered.lock().await.retain(|p| p != pattern);
        Ok(())
    }
    async fn is_allowed_always(&self, _project: &str, pattern: &str) -> KasmosResult<bool> {
        Ok(self.remembered.lock().await.iter().any(|p| p == pattern))
    }
    async fn list_patterns(&self, _project: &str) -> KasmosResult<Vec<String>> {
        Ok(self.remembered.lock().await.clone())
    }
}

fn facade(plan_dir: &std::path::Path) -> OrchestratorFacade {
    let plan_store = Arc::new(JsonPlanStore::new(plan_dir));
    let permission_store = Arc::new(NoopPermissions { remembered: AsyncMutex::new(Vec::new()) });
    let workspace = Arc::new(TempWorkspace);
    let terminals = Arc::new(FakeTerminalFactory);
    let event_bus = Arc::new(EventBus::new(Arc::new(AuditLog::new(64))));
    OrchestratorFacade::new("proj", Config::default(), plan_store, permission_store, workspace, terminals, event_bus)
}

fn launch(title: &str, branch: &str, plan_filename: &str, role: Role) -> LaunchRequest {
    LaunchRequest {
        title: title.to_string(),
        program: Some("claude".to_string()),
        args: Vec::new(),
        env: HashMap::new(),
        branch: branch.to_string(),
        base_commit: "main".to_string(),
        plan_filename: Some(plan_filename.to_string()),
        role,
        skip_permissions: false,
        cancellation: None,
    }
}

/// §8 scenario 1: create -> planning -> implementing -> reviewing -> done,
/// then a second `ReviewApproved` on the now-terminal plan is rejected.
#[tokio::test]
async fn happy_path_plan_and_instance_lifecycle() {
    let dir = tempdir().unwrap();
    let facade = facade(dir.path());

    let plan = facade
        .create_plan("2026-02-21-alpha.md", "ship the thing", "main", Some("ui"), "# Alpha\n")
        .await
        .unwrap();
    assert_eq!(plan.status, PlanStatus::Ready);

    let planning = facade.transition_plan(&plan.filename, PlanEvent::Start, None).await.unwrap();
    assert_eq!(planning.status, PlanStatus::Planning);

    let implementing = facade.transition_plan(&plan.filename, PlanEvent::ImplementStart, None).await.unwrap();
    assert_eq!(implementing.status, PlanStatus::Implementing);

    let coder = facade.launch(launch("alpha-coder", "ada/alpha", &plan.filename, Role::Coder)).await.unwrap();
    assert_eq!(coder.status, InstanceStatus::Loading);

    let reviewing = facade.transition_plan(&plan.filename, PlanEvent::ImplementDone, None).await.unwrap();
    assert_eq!(reviewing.status, PlanStatus::Reviewing);

    let done = facade.transition_plan(&plan.filename, PlanEvent::ReviewApproved, None).await.unwrap();
    assert_eq!(done.status, PlanStatus::Done);

    let rejected = facade.transition_plan(&plan.filename, PlanEvent::ReviewApproved, None).await.unwrap_err();
    assert!(matches!(rejected, KasmosError::IllegalTransition { .. }));

    let reloaded = JsonPlanStore::new(dir.path());
    let reloaded_plan = kasmos::domain::ports::PlanStore::get(&reloaded, "proj", &plan.filename).await.unwrap();
    assert_eq!(reloaded_plan.status, PlanStatus::Done);
}

/// §8 scenario 2: a second plan in the same topic cannot enter
/// `implementing` while another plan's coder instance is still active there.
#[tokio::test]
async fn topic_busy_blocks_second_concurrent_coder() {
    let dir = tempdir().unwrap();
    let facade = facade(dir.path());

    let alpha = facade.create_plan("2026-02-21-alpha.md", "alpha work", "main", Some("ui"), "").await.unwrap();
    let beta = facade.create_plan("2026-02-21-beta.md", "beta work", "main", Some("ui"), "").await.unwrap();

    facade.transition_plan(&alpha.filename, PlanEvent::ImplementStart, None).await.unwrap();
    facade.launch(launch("alpha-coder", "ada/alpha", &alpha.filename, Role::Coder)).await.unwrap();

    let err = facade.transition_plan(&beta.filename, PlanEvent::ImplementStart, None).await.unwrap_err();
    assert!(matches!(err, KasmosError::TopicBusy(ref name) if name == &beta.filename));

    let beta_unchanged = facade.list_plans().await.unwrap().into_iter().find(|p| p.filename == beta.filename).unwrap();
    assert_eq!(beta_unchanged.status, PlanStatus::Ready);
}

/// §8 scenario 6: a plan left `implementing` on disk survives a process
/// restart as data even though no in-memory `Instance` exists to back it.
#[tokio::test]
async fn crash_resilience_plan_status_is_data_not_runtime_state() {
    let dir = tempdir().unwrap();

    {
        let facade = facade(dir.path());
        let plan = facade.create_plan("2026-02-21-alpha.md", "alpha work", "main", None, "").await.unwrap();
        facade.transition_plan(&plan.filename, PlanEvent::ImplementStart, None).await.unwrap();
        facade.launch(launch("alpha-coder", "ada/alpha", &plan.filename, Role::Coder)).await.unwrap();
        // Facade (and its in-memory InstanceSupervisor) is dropped here,
        // simulating a process crash with no clean shutdown.
    }

    let restarted = facade(dir.path());
    let plans = restarted.list_plans().await.unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].status, PlanStatus::Implementing);
    assert!(restarted.list_instances().await.is_empty(), "a fresh supervisor starts with no instances in memory");
}

/// §8 scenario 3/4 (store-level): legacy migration and filename
/// reconciliation observed through the facade rather than the store
/// directly, confirming the public surface sees normalized data.
#[tokio::test]
async fn legacy_plan_file_is_normalized_on_first_load_through_the_facade() {
    let dir = tempdir().unwrap();
    let project_dir = dir.path().join("proj");
    tokio::fs::create_dir_all(&project_dir).await.unwrap();
    tokio::fs::write(
        project_dir.join("plan-state.json"),
        r#"{"2026-02-20-x.md":{"description":"d","branch":"b","status":"in_progress","created_at":"2026-02-20T00:00:00Z"}}"#,
    )
    .await
    .unwrap();

    let facade = facade(dir.path());
    let plans = facade.list_plans().await.unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].status, PlanStatus::Implementing);
}
