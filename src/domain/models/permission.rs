//! Operator-approved "always-allow" permission patterns.

use serde::{Deserialize, Serialize};

/// A shell/path pattern the operator has pre-approved for a project, driving
/// "auto-yes" behaviour when that pattern appears in a confirmation prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    /// Project this pattern applies to.
    pub project_id: String,
    /// The approved pattern, e.g. a glob over shell commands or paths.
    pub pattern: String,
}

impl PermissionEntry {
    /// Construct a new entry.
    #[must_use]
    pub fn new(project_id: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            pattern: pattern.into(),
        }
    }
}
