//! Instance domain model: one attached agent run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic per-project instance identifier.
///
/// The source this specification was distilled from keyed its instance set
/// by pointer identity; §9 calls that out as a redesign target, so `kasmos`
/// keys every set by this explicit integer ID instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance-{}", self.0)
    }
}

/// Role an instance plays, controlling spawn side-effects and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Implements a plan.
    Coder,
    /// Reviews an implemented plan.
    Reviewer,
    /// Refines plan content.
    Planner,
    /// Unbound to any plan; freeform session.
    Solo,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Coder => "coder",
            Self::Reviewer => "reviewer",
            Self::Planner => "planner",
            Self::Solo => "solo",
        };
        f.write_str(s)
    }
}

/// Lifecycle status of an `Instance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Workspace prepared, terminal session starting.
    Loading,
    /// Session output changed since the previous poll tick.
    Running,
    /// Session output has been stable for the detector's threshold.
    Ready,
    /// Session killed, workspace retained, metadata retained.
    Paused,
}

/// Wave/task coordinates attached by the caller; opaque to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveTask {
    /// Wave number.
    pub wave: u32,
    /// Task number within the wave.
    pub task: u32,
}

/// A lightweight resource sample attached to an instance by the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    /// CPU usage percentage (0.0-100.0, may exceed 100 on multi-core processes).
    pub cpu_percent: f32,
    /// Resident memory usage in megabytes.
    pub memory_mb: u64,
}

/// An attached agent run: one terminal session over one isolated workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    /// Stable identifier.
    pub id: InstanceId,
    /// Title, unique within the project.
    pub title: String,
    /// Working-copy path (from `WorkspaceManager::Allocate`).
    pub workspace_path: String,
    /// Branch checked out in the workspace.
    pub branch: String,
    /// Lifecycle status.
    pub status: InstanceStatus,
    /// Role this instance plays.
    pub role: Role,
    /// Plan this instance is bound to, if any.
    pub plan_filename: Option<String>,
    /// Wave/task coordinates, opaque metadata.
    pub wave_task: Option<WaveTask>,
    /// Whether a confirmation prompt is currently visible in the pane.
    pub prompt_detected: bool,
    /// Whether the operator has been notified of a `Running -> Ready` edge.
    pub notified: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-modified timestamp.
    pub updated_at: DateTime<Utc>,
    /// Short descriptor extracted from the most recent non-blank output line.
    pub last_activity: Option<String>,
    /// Most recent resource sample, if any has been taken yet.
    pub resource_sample: Option<ResourceSample>,
}

impl Instance {
    /// Construct a freshly spawned instance in `Loading` status.
    #[must_use]
    pub fn new(id: InstanceId, title: impl Into<String>, workspace_path: impl Into<String>, branch: impl Into<String>, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            workspace_path: workspace_path.into(),
            branch: branch.into(),
            status: InstanceStatus::Loading,
            role,
            plan_filename: None,
            wave_task: None,
            prompt_detected: false,
            notified: false,
            created_at: now,
            updated_at: now,
            last_activity: None,
            resource_sample: None,
        }
    }

    /// Bind this instance to a plan.
    #[must_use]
    pub fn with_plan(mut self, plan_filename: impl Into<String>) -> Self {
        self.plan_filename = Some(plan_filename.into());
        self
    }

    /// True if this instance currently owns a live terminal session.
    #[must_use]
    pub const fn has_session(&self) -> bool {
        !matches!(self.status, InstanceStatus::Paused)
    }

    /// True if this instance is an active coder currently implementing.
    #[must_use]
    pub const fn is_active_coder(&self) -> bool {
        matches!(self.role, Role::Coder) && matches!(self.status, InstanceStatus::Loading | InstanceStatus::Running | InstanceStatus::Ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_instance_has_no_session_only_when_paused() {
        let inst = Instance::new(InstanceId(1), "t", "/tmp/x", "main", Role::Coder);
        assert!(inst.has_session());
        assert_eq!(inst.status, InstanceStatus::Loading);
    }

    #[test]
    fn active_coder_detection() {
        let mut inst = Instance::new(InstanceId(1), "t", "/tmp/x", "main", Role::Coder);
        assert!(inst.is_active_coder());
        inst.status = InstanceStatus::Paused;
        assert!(!inst.is_active_coder());
        inst.status = InstanceStatus::Running;
        inst.role = Role::Reviewer;
        assert!(!inst.is_active_coder());
    }

    #[test]
    fn instance_id_display() {
        assert_eq!(InstanceId(42).to_string(), "instance-42");
    }
}
