//! Plan and Topic domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a `Plan`.
///
/// `Done` and `Cancelled` are terminal: the `PlanFSM` accepts no further
/// transitions out of either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Created, not yet planned or implemented.
    Ready,
    /// A planning agent is refining the plan content.
    Planning,
    /// A coder agent is implementing the plan.
    Implementing,
    /// A reviewer agent is reviewing the implementation.
    Reviewing,
    /// Terminal: the plan has been merged/accepted.
    Done,
    /// Terminal: the plan was abandoned.
    Cancelled,
}

impl PlanStatus {
    /// Returns true for the two terminal statuses.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }

    /// Parse a legacy status token persisted by an older version of the
    /// store. Returns `None` for anything that isn't a recognized legacy or
    /// current token.
    #[must_use]
    pub fn parse_legacy(token: &str) -> Option<Self> {
        match token {
            "ready" => Some(Self::Ready),
            "planning" => Some(Self::Planning),
            "implementing" | "in_progress" => Some(Self::Implementing),
            "reviewing" => Some(Self::Reviewing),
            "done" | "completed" | "finished" => Some(Self::Done),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// The canonical (non-legacy) string form, used when persisting.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Planning => "planning",
            Self::Implementing => "implementing",
            Self::Reviewing => "reviewing",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work: a markdown document describing what an agent should do.
///
/// Identity is the filename slug (`YYYY-MM-DD-<kebab>.md`); the date prefix
/// is ordering only, the slug is what fuzzy re-keying treats as stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Stable identity: `YYYY-MM-DD-<kebab>.md`.
    pub filename: String,
    /// One-line human description.
    pub description: String,
    /// Target branch name this plan will be implemented against.
    pub branch: String,
    /// Optional topic grouping, used for the concurrency guard (§4.6).
    pub topic: Option<String>,
    /// The markdown body. Stored separately from metadata by `PlanStore`,
    /// but carried here for convenience in the in-memory model.
    pub content: String,
    /// Current lifecycle status.
    pub status: PlanStatus,
    /// Creation timestamp (always normalized to UTC on persist).
    pub created_at: DateTime<Utc>,
}

impl Plan {
    /// Construct a new plan in the initial `Ready` status.
    #[must_use]
    pub fn new(filename: impl Into<String>, description: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            description: description.into(),
            branch: branch.into(),
            topic: None,
            content: String::new(),
            status: PlanStatus::Ready,
            created_at: Utc::now(),
        }
    }

    /// Attach a topic to this plan.
    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Slugify a description into the kebab-case portion of a filename, used
    /// by callers constructing a fresh `YYYY-MM-DD-<kebab>.md` filename.
    #[must_use]
    pub fn slugify(description: &str) -> String {
        let mut slug = String::with_capacity(description.len());
        let mut last_was_dash = true; // suppress leading dash
        for ch in description.chars() {
            if ch.is_ascii_alphanumeric() {
                slug.push(ch.to_ascii_lowercase());
                last_was_dash = false;
            } else if !last_was_dash {
                slug.push('-');
                last_was_dash = true;
            }
        }
        while slug.ends_with('-') {
            slug.pop();
        }
        if slug.is_empty() {
            slug.push_str("plan");
        }
        slug
    }
}

/// A partial update applied to a `Plan` via `PlanStore::update`.
#[derive(Debug, Clone, Default)]
pub struct PlanPatch {
    /// New status, if changing.
    pub status: Option<PlanStatus>,
    /// New description, if changing.
    pub description: Option<String>,
    /// New target branch, if changing.
    pub branch: Option<String>,
    /// New topic, if changing. `Some(None)` clears the topic.
    pub topic: Option<Option<String>>,
    /// New markdown content, if changing.
    pub content: Option<String>,
}

/// An optional grouping label over plans, used to enforce mutual exclusion
/// of concurrent coder agents (§4.6 topic concurrency guard).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    /// Project this topic belongs to.
    pub project: String,
    /// Topic name, unique within the project.
    pub name: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Topic {
    /// Construct a new topic, created implicitly the moment a plan first
    /// references it.
    #[must_use]
    pub fn new(project: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_status_tokens_rewrite() {
        assert_eq!(PlanStatus::parse_legacy("in_progress"), Some(PlanStatus::Implementing));
        assert_eq!(PlanStatus::parse_legacy("completed"), Some(PlanStatus::Done));
        assert_eq!(PlanStatus::parse_legacy("finished"), Some(PlanStatus::Done));
        assert_eq!(PlanStatus::parse_legacy("bogus"), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(PlanStatus::Done.is_terminal());
        assert!(PlanStatus::Cancelled.is_terminal());
        assert!(!PlanStatus::Implementing.is_terminal());
    }

    #[test]
    fn slugify_strips_punctuation_and_case() {
        assert_eq!(Plan::slugify("Fix the Login Bug!!"), "fix-the-login-bug");
        assert_eq!(Plan::slugify("   "), "plan");
        assert_eq!(Plan::slugify("already-kebab"), "already-kebab");
    }
}
