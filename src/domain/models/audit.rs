//! Audit event model: the closed enumeration of kinds the core emits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of an `AuditEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    /// Routine state change.
    Info,
    /// Recoverable but noteworthy condition.
    Warn,
    /// A failure that bubbled out of a command.
    Error,
}

impl std::fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// The closed enumeration of audit event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// An instance was spawned.
    AgentSpawned,
    /// An instance's backing process exited on its own.
    AgentFinished,
    /// An instance was killed by the operator/supervisor.
    AgentKilled,
    /// An instance was paused.
    AgentPaused,
    /// An instance was resumed.
    AgentResumed,
    /// A plan transitioned from one status to another.
    PlanTransition,
    /// A plan was created.
    PlanCreated,
    /// A plan was cancelled.
    PlanCancelled,
    /// A plan's branch was merged.
    PlanMerged,
    /// A wave of instances started.
    WaveStarted,
    /// A wave of instances completed.
    WaveCompleted,
    /// A wave of instances failed.
    WaveFailed,
    /// Text was injected into an instance's session.
    PromptSent,
    /// A confirmation prompt was detected in an instance's pane.
    PermissionDetected,
    /// A confirmation prompt was answered (by the operator or auto-yes).
    PermissionAnswered,
    /// A `PlanFSM`/`InstanceSupervisor` operation failed unexpectedly.
    FsmError,
}

impl AuditKind {
    /// The stable `snake_case` string form, as persisted/filtered on.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AgentSpawned => "agent_spawned",
            Self::AgentFinished => "agent_finished",
            Self::AgentKilled => "agent_killed",
            Self::AgentPaused => "agent_paused",
            Self::AgentResumed => "agent_resumed",
            Self::PlanTransition => "plan_transition",
            Self::PlanCreated => "plan_created",
            Self::PlanCancelled => "plan_cancelled",
            Self::PlanMerged => "plan_merged",
            Self::WaveStarted => "wave_started",
            Self::WaveCompleted => "wave_completed",
            Self::WaveFailed => "wave_failed",
            Self::PromptSent => "prompt_sent",
            Self::PermissionDetected => "permission_detected",
            Self::PermissionAnswered => "permission_answered",
            Self::FsmError => "fsm_error",
        }
    }
}

impl std::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record in the audit/event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Monotonically increasing sequence number, assigned by the `EventBus`.
    pub sequence: u64,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Event kind.
    pub kind: AuditKind,
    /// Severity.
    pub level: AuditLevel,
    /// Subject references, e.g. `["alpha.md", "instance-3"]`. Free-form but
    /// conventionally the plan filename and/or instance title/id involved.
    pub subjects: Vec<String>,
    /// Free-text message.
    pub message: String,
}

impl AuditEvent {
    /// Construct an event; `sequence` is filled in by the `EventBus` on publish.
    #[must_use]
    pub fn new(kind: AuditKind, level: AuditLevel, message: impl Into<String>) -> Self {
        Self {
            sequence: 0,
            timestamp: Utc::now(),
            kind,
            level,
            subjects: Vec::new(),
            message: message.into(),
        }
    }

    /// Attach subject references.
    #[must_use]
    pub fn with_subjects(mut self, subjects: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.subjects = subjects.into_iter().map(Into::into).collect();
        self
    }
}
