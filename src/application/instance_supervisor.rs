//! `InstanceSupervisor` (C6): owns the instance set and its lifecycle.
//!
//! Grounded in `application/swarm_orchestrator.rs`'s worker-supervision
//! shape: a `tokio::sync::RwLock<HashMap<_, _>>` membership set with
//! per-entity interior mutability for fine-grained updates (here, one
//! `tokio::sync::Mutex<Instance>` per instance, generalized from a single
//! global `RwLock<System>`). `InstanceId` is a monotonic `u64`, an explicit
//! integer identity rather than relying on pointer identity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::domain::errors::{KasmosError, KasmosResult};
use crate::domain::models::{AuditKind, AuditLevel, Instance, InstanceId, InstanceStatus, ResourceSample, Role, WaveTask};
use crate::domain::ports::{CaptureOptions, PlanStore, TerminalSession, TerminalSessionFactory, WorkspaceManager};
use crate::services::activity_detector::Classification;
use crate::services::event_bus::EventBus;
use crate::services::plan_fsm::{PlanEvent, PlanFsm};

/// Parameters for `InstanceSupervisor::spawn`.
#[derive(Debug, Clone)]
pub struct SpawnOpts {
    /// Title, must be unique within the project.
    pub title: String,
    /// Agent program to run.
    pub program: String,
    /// Extra CLI arguments.
    pub args: Vec<String>,
    /// Extra environment variables for the session.
    pub env: HashMap<String, String>,
    /// Branch to allocate the workspace against.
    pub branch: String,
    /// Base commit/ref the branch is created from if it doesn't yet exist.
    pub base_commit: String,
    /// Plan this instance implements/reviews/plans, if any.
    pub plan_filename: Option<String>,
    /// Role this instance plays.
    pub role: Role,
    /// Wave/task coordinates, opaque metadata.
    pub wave_task: Option<WaveTask>,
    /// Whether confirmation prompts should be auto-approved for this
    /// instance without operator interaction. Carried on `Instance`
    /// indirectly via the supervisor's auto-yes wiring in the polling loop;
    /// kept here so `Spawn` can record the operator's intent in the audit
    /// event.
    pub skip_permissions: bool,
    /// Cancellation scope for this spawn, letting a caller cancel a spawn in
    /// progress. A fresh, never-cancelled token if the caller doesn't need
    /// to cancel.
    pub cancellation: CancellationToken,
}

/// Supervises the set of `Instance`s: spawn, pause, resume, kill, prompt
/// injection, and plan-transition side effects.
pub struct InstanceSupervisor {
    workspace: Arc<dyn WorkspaceManager>,
    terminals: Arc<dyn TerminalSessionFactory>,
    plan_store: Arc<dyn PlanStore>,
    plan_fsm: PlanFsm,
    event_bus: Arc<EventBus>,
    instances: RwLock<HashMap<InstanceId, Arc<Mutex<Instance>>>>,
    sessions: RwLock<HashMap<InstanceId, Arc<dyn TerminalSession>>>,
    next_id: AtomicU64,
}

impl InstanceSupervisor {
    /// Construct a supervisor wrapping its C3/C4/C1/C7 collaborators.
    #[must_use]
    pub fn new(workspace: Arc<dyn WorkspaceManager>, terminals: Arc<dyn TerminalSessionFactory>, plan_store: Arc<dyn PlanStore>, event_bus: Arc<EventBus>) -> Self {
        Self {
            workspace,
            terminals,
            plan_store,
            plan_fsm: PlanFsm::new(),
            event_bus,
            instances: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    async fn emit(&self, kind: AuditKind, level: AuditLevel, message: impl Into<String>, subjects: impl IntoIterator<Item = impl Into<String>>) {
        self.event_bus.publish(crate::domain::models::AuditEvent::new(kind, level, message).with_subjects(subjects)).await;
    }

    /// Snapshot every live instance. Never returns a live handle.
    pub async fn list(&self) -> Vec<Instance> {
        let guard = self.instances.read().await;
        let mut out = Vec::with_capacity(guard.len());
        for entry in guard.values() {
            out.push(entry.lock().await.clone());
        }
        out
    }

    /// Snapshot one instance by ID.
    pub async fn get(&self, id: InstanceId) -> KasmosResult<Instance> {
        let guard = self.instances.read().await;
        let entry = guard.get(&id).ok_or_else(|| KasmosError::NotFound(id.to_string()))?;
        Ok(entry.lock().await.clone())
    }

    async fn title_in_use(&self, title: &str) -> bool {
        let guard = self.instances.read().await;
        for entry in guard.values() {
            if entry.lock().await.title == title {
                return true;
            }
        }
        false
    }

    /// Allocate a workspace and start a terminal session for a new instance.
    /// Unwinds on partial failure: if workspace allocation succeeds but the
    /// terminal session fails to start, the workspace is released before the
    /// error is returned. Each of the two external-process suspension points
    /// races `opts.cancellation`; a cancellation mid-spawn unwinds exactly
    /// like any other failure, returning `KasmosError::Cancelled`.
    #[instrument(skip(self, opts), fields(title = %opts.title))]
    pub async fn spawn(&self, opts: SpawnOpts) -> KasmosResult<Instance> {
        if self.title_in_use(&opts.title).await {
            return Err(KasmosError::AlreadyExists(opts.title));
        }

        let workspace_path = tokio::select! {
            biased;
            () = opts.cancellation.cancelled() => return Err(KasmosError::Cancelled),
            result = self.workspace.allocate(&opts.branch, &opts.base_commit) => result?,
        };

        let start = self.terminals.start(&opts.title, &opts.program, &opts.args, &workspace_path, &opts.env);
        let started = tokio::select! {
            biased;
            () = opts.cancellation.cancelled() => Err(KasmosError::Cancelled),
            result = start => result,
        };

        let session = match started {
            Ok(session) => session,
            Err(err) => {
                if let Err(release_err) = self.workspace.release(&workspace_path).await {
                    warn!(error = %release_err, "failed to release workspace after spawn failure");
                }
                if !err.is_benign() {
                    self.emit(AuditKind::FsmError, AuditLevel::Error, format!("spawn failed for {}: {err}", opts.title), [opts.title.clone()]).await;
                }
                return Err(err);
            }
        };

        let id = InstanceId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut instance = Instance::new(id, &opts.title, &workspace_path, &opts.branch, opts.role);
        instance.wave_task = opts.wave_task;
        if let Some(plan_filename) = opts.plan_filename {
            instance = instance.with_plan(plan_filename);
        }

        let session: Arc<dyn TerminalSession> = Arc::from(session);
        self.instances.write().await.insert(id, Arc::new(Mutex::new(instance.clone())));
        self.sessions.write().await.insert(id, session);

        self.emit(AuditKind::AgentSpawned, AuditLevel::Info, format!("spawned {} ({})", opts.title, instance.role), [opts.title.clone(), id.to_string()]).await;

        Ok(instance)
    }

    /// `Kill`: best-effort session termination and workspace release, always
    /// removes the instance from the set.
    #[instrument(skip(self))]
    pub async fn kill(&self, id: InstanceId) -> KasmosResult<()> {
        let instance = {
            let guard = self.instances.read().await;
            let entry = guard.get(&id).ok_or_else(|| KasmosError::NotFound(id.to_string()))?;
            entry.lock().await.clone()
        };

        if let Some(session) = self.sessions.write().await.remove(&id) {
            if let Err(err) = session.kill().await {
                warn!(error = %err, instance = %id, "session kill failed during instance kill, continuing cleanup");
            }
        }

        if let Err(err) = self.workspace.release(&instance.workspace_path).await {
            warn!(error = %err, instance = %id, "workspace release failed during instance kill, continuing cleanup");
        }

        self.instances.write().await.remove(&id);
        self.emit(AuditKind::AgentKilled, AuditLevel::Info, format!("killed {}", instance.title), [instance.title.clone(), id.to_string()]).await;
        Ok(())
    }

    /// `Pause`: kills the backing session but retains workspace and
    /// metadata. On session-kill failure, the session is left intact (no
    /// silent leaks) and the error is returned.
    #[instrument(skip(self))]
    pub async fn pause(&self, id: InstanceId) -> KasmosResult<Instance> {
        let entry = {
            let guard = self.instances.read().await;
            Arc::clone(guard.get(&id).ok_or_else(|| KasmosError::NotFound(id.to_string()))?)
        };

        let session = self.sessions.read().await.get(&id).cloned();
        if let Some(session) = session {
            session.kill().await?;
            self.sessions.write().await.remove(&id);
        }

        let mut instance = entry.lock().await;
        instance.status = InstanceStatus::Paused;
        instance.updated_at = chrono::Utc::now();
        let snapshot = instance.clone();
        drop(instance);

        self.emit(AuditKind::AgentPaused, AuditLevel::Info, format!("paused {}", snapshot.title), [snapshot.title.clone(), id.to_string()]).await;
        Ok(snapshot)
    }

    /// `Resume`: re-allocates a session at the existing workspace path and
    /// re-enters `Loading`.
    #[instrument(skip(self))]
    pub async fn resume(&self, id: InstanceId, program: &str, args: &[String], env: &HashMap<String, String>) -> KasmosResult<Instance> {
        let entry = {
            let guard = self.instances.read().await;
            Arc::clone(guard.get(&id).ok_or_else(|| KasmosError::NotFound(id.to_string()))?)
        };

        let (title, workspace_path) = {
            let instance = entry.lock().await;
            (instance.title.clone(), instance.workspace_path.clone())
        };

        let session = self.terminals.start(&title, program, args, &workspace_path, env).await?;
        self.sessions.write().await.insert(id, Arc::from(session));

        let mut instance = entry.lock().await;
        instance.status = InstanceStatus::Loading;
        instance.updated_at = chrono::Utc::now();
        let snapshot = instance.clone();
        drop(instance);

        self.emit(AuditKind::AgentResumed, AuditLevel::Info, format!("resumed {title}"), [title, id.to_string()]).await;
        Ok(snapshot)
    }

    /// Inject arbitrary text into an instance's session.
    #[instrument(skip(self, text))]
    pub async fn send_prompt(&self, id: InstanceId, text: &str) -> KasmosResult<()> {
        let session = self.sessions.read().await.get(&id).cloned().ok_or_else(|| KasmosError::NotFound(id.to_string()))?;
        session.send_keys(text).await?;
        self.emit(AuditKind::PromptSent, AuditLevel::Info, "prompt sent", [id.to_string()]).await;
        Ok(())
    }

    /// Approve a pending confirmation prompt.
    #[instrument(skip(self))]
    pub async fn send_yes(&self, id: InstanceId) -> KasmosResult<()> {
        let session = self.sessions.read().await.get(&id).cloned().ok_or_else(|| KasmosError::NotFound(id.to_string()))?;
        session.send_keys("y").await?;

        if let Some(entry) = self.instances.read().await.get(&id) {
            let mut instance = entry.lock().await;
            instance.prompt_detected = false;
        }

        self.emit(AuditKind::PermissionAnswered, AuditLevel::Info, "auto-answered confirmation prompt", [id.to_string()]).await;
        Ok(())
    }

    /// Capture the current pane content for a session, if it has one.
    /// Returns `NotFound` for a paused (sessionless) instance; callers should
    /// skip those rather than poll them.
    pub async fn capture(&self, id: InstanceId, opts: CaptureOptions) -> KasmosResult<String> {
        let session = self.sessions.read().await.get(&id).cloned().ok_or_else(|| KasmosError::NotFound(id.to_string()))?;
        session.capture_pane(opts).await
    }

    /// Apply one polling tick's classification (and optional resource
    /// sample) to an instance. Returns the updated snapshot and whether a
    /// confirmation prompt newly appeared this tick (was not visible last
    /// tick), which the polling loop uses to drive auto-yes and the
    /// `permission_detected` audit event.
    pub async fn apply_tick(&self, id: InstanceId, classification: Classification, resource_sample: Option<ResourceSample>) -> KasmosResult<(Instance, bool)> {
        let entry = {
            let guard = self.instances.read().await;
            Arc::clone(guard.get(&id).ok_or_else(|| KasmosError::NotFound(id.to_string()))?)
        };

        let (snapshot, newly_detected) = {
            let mut instance = entry.lock().await;
            let was_prompt_detected = instance.prompt_detected;
            instance.status = classification.status;
            instance.prompt_detected = classification.prompt_detected;
            instance.last_activity = classification.last_activity;
            if resource_sample.is_some() {
                instance.resource_sample = resource_sample;
            }
            instance.updated_at = chrono::Utc::now();
            (instance.clone(), classification.prompt_detected && !was_prompt_detected)
        };

        if newly_detected {
            self.emit(AuditKind::PermissionDetected, AuditLevel::Info, format!("confirmation prompt detected on {}", snapshot.title), [snapshot.title.clone(), id.to_string()]).await;
        }

        Ok((snapshot, newly_detected))
    }

    /// True iff another plan in `topic` (other than `excluded_plan`) has an
    /// active coder instance bound to it. Guards against two concurrent
    /// coder agents working the same topic.
    pub async fn has_running_coder_in_topic(&self, project: &str, topic: &str, excluded_plan: &str) -> KasmosResult<bool> {
        let guard = self.instances.read().await;
        for entry in guard.values() {
            let instance = entry.lock().await;
            if !instance.is_active_coder() {
                continue;
            }
            let Some(plan_filename) = &instance.plan_filename else { continue };
            if plan_filename == excluded_plan {
                continue;
            }
            let plan = self.plan_store.get(project, plan_filename).await;
            if let Ok(plan) = plan {
                if plan.topic.as_deref() == Some(topic) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// `TransitionPlan`: consults `PlanFSM`, persists via `PlanStore`, then
    /// applies the topic-busy guard on entry into `implementing`.
    #[instrument(skip(self))]
    pub async fn transition_plan(&self, project: &str, plan_filename: &str, event: PlanEvent) -> KasmosResult<crate::domain::models::Plan> {
        let plan = self.plan_store.get(project, plan_filename).await?;
        let new_status = self.plan_fsm.apply(plan.status, event)?;

        if new_status == crate::domain::models::PlanStatus::Implementing {
            if let Some(topic) = &plan.topic {
                if self.has_running_coder_in_topic(project, topic, plan_filename).await? {
                    return Err(KasmosError::TopicBusy(plan_filename.to_string()));
                }
            }
        }

        let patch = crate::domain::models::PlanPatch { status: Some(new_status), ..Default::default() };
        let updated = self.plan_store.update(project, plan_filename, patch).await?;

        self.emit(
            AuditKind::PlanTransition,
            AuditLevel::Info,
            format!("{plan_filename}: {} -> {new_status}", plan.status),
            [plan_filename.to_string()],
        )
        .await;

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Plan, PlanPatch, PlanStatus, Topic};
    use crate::domain::ports::terminal::{CaptureOptions, ReleaseHandle};
    use crate::services::audit_log::AuditLog;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Mutex as AsyncMutex;

    struct MockWorkspace {
        allocated: StdMutex<Vec<String>>,
        fail_allocate: bool,
    }

    #[async_trait]
    impl WorkspaceManager for MockWorkspace {
        async fn allocate(&self, branch: &str, _base_commit: &str) -> KasmosResult<String> {
            if self.fail_allocate {
                return Err(KasmosError::Internal("boom".to_string()));
            }
            let path = format!("/tmp/ws/{branch}");
            self.allocated.lock().unwrap().push(path.clone());
            Ok(path)
        }

        async fn release(&self, workspace_path: &str) -> KasmosResult<()> {
            self.allocated.lock().unwrap().retain(|p| p != workspace_path);
            Ok(())
        }
    }

    struct MockSession {
        name: String,
        fail_kill: bool,
    }

    #[async_trait]
    impl TerminalSession for MockSession {
        fn name(&self) -> &str {
            &self.name
        }
        async fn attach(&self) -> KasmosResult<Box<dyn ReleaseHandle>> {
            unimplemented!()
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
            if self.fail_kill {
                return Err(KasmosError::Internal("kill failed".to_string()));
            }
            Ok(())
        }
        async fn exists(&self) -> bool {
            true
        }
    }

    struct MockFactory {
        fail_start: bool,
    }

    #[async_trait]
    impl TerminalSessionFactory for MockFactory {
        async fn start(&self, title: &str, _program: &str, _args: &[String], _cwd: &str, _env: &HashMap<String, String>) -> KasmosResult<Box<dyn TerminalSession>> {
            if self.fail_start {
                return Err(KasmosError::BackendMissing("tmux".to_string()));
            }
            Ok(Box::new(MockSession { name: title.to_string(), fail_kill: false }))
        }
        async fn attach_existing(&self, title: &str) -> KasmosResult<Box<dyn TerminalSession>> {
            Ok(Box::new(MockSession { name: title.to_string(), fail_kill: false }))
        }
    }

    struct MockPlanStore {
        plans: AsyncMutex<HashMap<String, Plan>>,
    }

    impl MockPlanStore {
        fn with_plan(plan: Plan) -> Self {
            let mut plans = HashMap::new();
            plans.insert(plan.filename.clone(), plan);
            Self { plans: AsyncMutex::new(plans) }
        }
    }

    #[async_trait]
    impl PlanStore for MockPlanStore {
        async fn create(&self, _project: &str, plan: Plan) -> KasmosResult<()> {
            self.plans.lock().await.insert(plan.filename.clone(), plan);
            Ok(())
        }
        async fn get(&self, _project: &str, filename: &str) -> KasmosResult<Plan> {
            self.plans.lock().await.get(filename).cloned().ok_or_else(|| KasmosError::NotFound(filename.to_string()))
        }
        async fn list(&self, _project: &str) -> KasmosResult<Vec<Plan>> {
            Ok(self.plans.lock().await.values().cloned().collect())
        }
        async fn update(&self, _project: &str, filename: &str, patch: PlanPatch) -> KasmosResult<Plan> {
            let mut guard = self.plans.lock().await;
            let plan = guard.get_mut(filename).ok_or_else(|| KasmosError::NotFound(filename.to_string()))?;
            if let Some(status) = patch.status {
                plan.status = status;
            }
            Ok(plan.clone())
        }
        async fn rename(&self, _project: &str, _old: &str, _new_slug: &str) -> KasmosResult<String> {
            unimplemented!()
        }
        async fn create_topic(&self, project: &str, name: &str) -> KasmosResult<Topic> {
            Ok(Topic::new(project, name))
        }
        async fn list_topics(&self, _project: &str) -> KasmosResult<Vec<Topic>> {
            Ok(Vec::new())
        }
        async fn delete_topic_if_unused(&self, _project: &str, _name: &str) -> KasmosResult<bool> {
            Ok(true)
        }
        async fn get_content(&self, _project: &str, _filename: &str) -> KasmosResult<String> {
            Ok(String::new())
        }
        async fn put_content(&self, _project: &str, _filename: &str, _content: &str) -> KasmosResult<()> {
            Ok(())
        }
    }

    fn spawn_opts(title: &str) -> SpawnOpts {
        SpawnOpts {
            title: title.to_string(),
            program: "claude".to_string(),
            args: Vec::new(),
            env: HashMap::new(),
            branch: format!("ada/{title}"),
            base_commit: "main".to_string(),
            plan_filename: None,
            role: Role::Coder,
            wave_task: None,
            skip_permissions: false,
            cancellation: CancellationToken::new(),
        }
    }

    fn supervisor(fail_allocate: bool, fail_start: bool) -> (InstanceSupervisor, Arc<MockWorkspace>) {
        let workspace = Arc::new(MockWorkspace { allocated: StdMutex::new(Vec::new()), fail_allocate });
        let terminals = Arc::new(MockFactory { fail_start });
        let plan_store = Arc::new(MockPlanStore::with_plan(Plan::new("2026-02-21-alpha.md", "d", "main").with_topic("ui")));
        let event_bus = Arc::new(EventBus::new(Arc::new(AuditLog::new(64))));
        (InstanceSupervisor::new(workspace.clone(), terminals, plan_store, event_bus), workspace)
    }

    #[tokio::test]
    async fn spawn_then_kill_round_trips() {
        let (sup, workspace) = supervisor(false, false);
        let instance = sup.spawn(spawn_opts("alpha")).await.unwrap();
        assert_eq!(instance.status, InstanceStatus::Loading);
        assert_eq!(workspace.allocated.lock().unwrap().len(), 1);

        sup.kill(instance.id).await.unwrap();
        assert!(sup.get(instance.id).await.is_err());
        assert_eq!(workspace.allocated.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn spawn_rejects_duplicate_title() {
        let (sup, _workspace) = supervisor(false, false);
        sup.spawn(spawn_opts("alpha")).await.unwrap();
        let err = sup.spawn(spawn_opts("alpha")).await.unwrap_err();
        assert!(matches!(err, KasmosError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn spawn_atomicity_on_session_start_failure() {
        let (sup, workspace) = supervisor(false, true);
        let err = sup.spawn(spawn_opts("alpha")).await.unwrap_err();
        assert!(matches!(err, KasmosError::BackendMissing(_)));
        assert_eq!(workspace.allocated.lock().unwrap().len(), 0, "workspace must be released on spawn failure");
    }

    #[tokio::test]
    async fn spawn_honors_pre_cancelled_token() {
        let (sup, workspace) = supervisor(false, false);
        let mut opts = spawn_opts("alpha");
        opts.cancellation.cancel();

        let err = sup.spawn(opts).await.unwrap_err();
        assert!(matches!(err, KasmosError::Cancelled));
        assert_eq!(workspace.allocated.lock().unwrap().len(), 0, "a cancelled spawn must not leak a workspace");
    }

    #[tokio::test]
    async fn pause_then_resume() {
        let (sup, _workspace) = supervisor(false, false);
        let instance = sup.spawn(spawn_opts("alpha")).await.unwrap();

        let paused = sup.pause(instance.id).await.unwrap();
        assert_eq!(paused.status, InstanceStatus::Paused);

        let resumed = sup.resume(instance.id, "claude", &[], &HashMap::new()).await.unwrap();
        assert_eq!(resumed.status, InstanceStatus::Loading);
    }

    #[tokio::test]
    async fn transition_plan_rejects_illegal_event() {
        let (sup, _workspace) = supervisor(false, false);
        let err = sup.transition_plan("default", "2026-02-21-alpha.md", PlanEvent::ReviewApproved).await.unwrap_err();
        assert!(matches!(err, KasmosError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn transition_plan_happy_path() {
        let (sup, _workspace) = supervisor(false, false);
        let updated = sup.transition_plan("default", "2026-02-21-alpha.md", PlanEvent::Start).await.unwrap();
        assert_eq!(updated.status, PlanStatus::Planning);
    }

    #[tokio::test]
    async fn topic_busy_rejects_second_coder_in_same_topic() {
        let (sup, _workspace) = supervisor(false, false);

        let mut opts = spawn_opts("alpha-coder");
        opts.plan_filename = Some("2026-02-21-alpha.md".to_string());
        let alpha_instance = sup.spawn(opts).await.unwrap();
        assert_eq!(alpha_instance.status, InstanceStatus::Loading);

        let busy = sup.has_running_coder_in_topic("default", "ui", "2026-02-21-beta.md").await.unwrap();
        assert!(busy);
    }
}
