//! Port traits (hexagonal seams) for the kasmos orchestrator core.

pub mod plan_store;
pub mod program_resolver;
pub mod terminal;
pub mod workspace;

pub use plan_store::PlanStore;
pub use program_resolver::ProgramResolver;
pub use terminal::{CaptureOptions, ReleaseHandle, TerminalSession, TerminalSessionFactory};
pub use workspace::{PermissionStore, WorkspaceManager};
