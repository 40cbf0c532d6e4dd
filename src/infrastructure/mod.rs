//! Concrete adapters implementing `domain::ports` against the filesystem,
//! SQLite, `git`, and `tmux`.

pub mod config_loader;
pub mod logging;
pub mod permission_store;
pub mod plan_store;
pub mod program_resolver;
pub mod setup;
pub mod terminal_session;
pub mod workspace_manager;

pub use config_loader::ConfigLoader;
pub use permission_store::SqlitePermissionStore;
pub use plan_store::JsonPlanStore;
pub use program_resolver::ShellProgramResolver;
pub use setup::SetupPaths;
pub use terminal_session::{TmuxSession, TmuxSessionFactory};
pub use workspace_manager::GitWorkspaceManager;
