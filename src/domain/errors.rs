//! Domain error types for the kasmos orchestrator core.
//!
//! This module defines the closed error enum shared by every component in
//! `domain`, `services`, `application` and `infrastructure`. Each variant maps
//! directly to one failure mode the core needs to surface to its callers.

use thiserror::Error;

/// Errors produced by the orchestrator core.
///
/// This is a closed set: no component is expected to introduce new variants,
/// only to wrap causes into `Internal` when nothing more specific applies.
#[derive(Error, Debug)]
pub enum KasmosError {
    /// A (project, filename) pair already exists in the `PlanStore`.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The requested plan, topic, or instance does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A `PlanFSM` transition was attempted that the transition table forbids.
    #[error("illegal transition from {from} via {event}")]
    IllegalTransition {
        /// The plan status the transition was attempted from.
        from: String,
        /// The event that was rejected.
        event: String,
    },

    /// A coder instance is already `implementing` in the same topic.
    #[error("topic busy: {0}")]
    TopicBusy(String),

    /// The terminal multiplexer binary, or the agent program, is unavailable.
    #[error("backend missing: {0}")]
    BackendMissing(String),

    /// The durable store could not be read or written.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A persisted record could not be parsed; the caller must not guess.
    #[error("parse error: {0}")]
    ParseError(String),

    /// The operation was cancelled by the caller; never logged as an error.
    #[error("cancelled")]
    Cancelled,

    /// An unexpected failure, always paired with an `fsm_error` audit event.
    #[error("internal error: {0}")]
    Internal(String),
}

impl KasmosError {
    /// Returns true if this error should never be surfaced as a logged error
    /// (e.g. user-initiated cancellation).
    #[must_use]
    pub const fn is_benign(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Wrap an arbitrary error as `Internal`, preserving its message as context.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<std::io::Error> for KasmosError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for KasmosError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

impl From<sqlx::Error> for KasmosError {
    fn from(err: sqlx::Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

/// Convenience alias used throughout the core's domain and service layers.
pub type KasmosResult<T> = Result<T, KasmosError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn illegal_transition_display() {
        let err = KasmosError::IllegalTransition {
            from: "done".to_string(),
            event: "ReviewApproved".to_string(),
        };
        assert_eq!(err.to_string(), "illegal transition from done via ReviewApproved");
    }

    #[test]
    fn cancelled_is_benign() {
        assert!(KasmosError::Cancelled.is_benign());
        assert!(!KasmosError::NotFound("x".into()).is_benign());
    }

    #[test]
    fn io_error_becomes_storage_unavailable() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: KasmosError = io_err.into();
        assert!(matches!(err, KasmosError::StorageUnavailable(_)));
    }
}
