//! kasmos binary entry point.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;

use kasmos::application::OrchestratorFacade;
use kasmos::application::PollingLoop;
use kasmos::cli::Cli;
use kasmos::domain::ports::{PermissionStore, PlanStore, ProgramResolver, TerminalSessionFactory, WorkspaceManager};
use kasmos::infrastructure::{logging, ConfigLoader, GitWorkspaceManager, JsonPlanStore, SetupPaths, ShellProgramResolver, SqlitePermissionStore, TmuxSessionFactory};
use kasmos::services::audit_log::{AuditLog, DEFAULT_CAPACITY};
use kasmos::services::event_bus::{EventBus, DEFAULT_CHANNEL_CAPACITY};
use tracing::warn;

/// Preference list consulted when `Config::default_program` is left unset.
const DEFAULT_PROGRAM_CANDIDATES: &[&str] = &["claude", "aider", "codex"];

/// How long to let the polling loop wind down after a shutdown signal before
/// giving up on it and exiting anyway.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let repo_root = match cli.repo_root {
        Some(path) => path,
        None => std::env::current_dir().context("resolving current directory as repo root")?,
    };
    let project = cli.project.unwrap_or_else(|| {
        repo_root
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("default")
            .to_string()
    });

    let paths = match cli.config_dir {
        Some(config_dir) => SetupPaths::at(config_dir),
        None => SetupPaths::resolve().context("resolving config directory")?,
    };
    paths.ensure_dirs().await.context("creating config directory")?;

    let _log_guard = logging::init(&paths.config_dir.join("logs")).context("initializing logging")?;

    let config = ConfigLoader::load(&paths.config_dir).context("loading configuration")?;
    let username = std::env::var("USER").unwrap_or_else(|_| "kasmos".to_string());
    let mut config = config.with_username_fallback(&username);

    if config.default_program.is_empty() {
        let candidates: Vec<String> = DEFAULT_PROGRAM_CANDIDATES.iter().map(|s| (*s).to_string()).collect();
        match ShellProgramResolver::new().resolve(&candidates).await {
            Ok(resolved) => config.default_program = resolved,
            Err(err) => warn!(error = %err, "could not resolve a default agent program; launches must specify one explicitly"),
        }
    }

    let plan_store: Arc<dyn PlanStore> = Arc::new(JsonPlanStore::new(repo_root.join(".kasmos").join("plans")));

    let db_url = format!("sqlite://{}?mode=rwc", paths.permissions_db_file.display());
    let pool = SqlitePoolOptions::new().connect(&db_url).await.context("connecting to permissions database")?;
    let permission_store = SqlitePermissionStore::new(pool);
    permission_store.ensure_schema().await.context("creating permissions schema")?;
    let permission_store: Arc<dyn PermissionStore> = Arc::new(permission_store);

    let workspace_manager: Arc<dyn WorkspaceManager> = Arc::new(GitWorkspaceManager::new(repo_root.clone()));
    let terminal_factory: Arc<dyn TerminalSessionFactory> = Arc::new(TmuxSessionFactory::new());
    let event_bus = Arc::new(EventBus::with_capacity(Arc::new(AuditLog::new(DEFAULT_CAPACITY)), DEFAULT_CHANNEL_CAPACITY));

    let facade = OrchestratorFacade::new(project, config.clone(), plan_store, permission_store, workspace_manager, terminal_factory, event_bus);

    let polling_loop = PollingLoop::new(Arc::clone(facade.supervisor()), Duration::from_millis(config.daemon_poll_interval), config.auto_yes);
    let handle = polling_loop.start();

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    polling_loop.shutdown();
    if tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, handle).await.is_err() {
        warn!("polling loop did not stop within the shutdown grace period; exiting anyway");
    }

    Ok(())
}
