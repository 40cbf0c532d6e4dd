//! `AuditLog` (C7, ring-buffer half): a capped, queryable history of events.
//!
//! Grounded in `services/audit_log.rs`: a `VecDeque`-backed ring buffer
//! behind a `tokio::sync::RwLock`, trimmed to capacity on push, with a small
//! filter DSL for operator-facing queries.

use std::collections::VecDeque;

use tokio::sync::RwLock;

use crate::domain::models::{AuditEvent, AuditKind};

/// Default ring-buffer capacity.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Filter applied by `AuditLog::query`. All populated fields must match
/// (conjunctive); an unset field imposes no constraint.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Restrict to one event kind.
    pub kind: Option<AuditKind>,
    /// Restrict to events whose `subjects` contains this exact string.
    pub subject: Option<String>,
    /// Restrict to events whose `message` contains this substring.
    pub contains: Option<String>,
}

impl AuditFilter {
    fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(kind) = self.kind {
            if event.kind != kind {
                return false;
            }
        }
        if let Some(subject) = &self.subject {
            if !event.subjects.iter().any(|s| s == subject) {
                return false;
            }
        }
        if let Some(needle) = &self.contains {
            if !event.message.contains(needle.as_str()) {
                return false;
            }
        }
        true
    }
}

/// A capped, append-only ring buffer of `AuditEvent`s.
pub struct AuditLog {
    capacity: usize,
    events: RwLock<VecDeque<AuditEvent>>,
}

impl AuditLog {
    /// Construct an empty log with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: RwLock::new(VecDeque::with_capacity(capacity.min(4096))),
        }
    }

    /// Append an event, evicting the oldest entry if at capacity.
    pub async fn push(&self, event: AuditEvent) {
        let mut guard = self.events.write().await;
        if guard.len() >= self.capacity {
            guard.pop_front();
        }
        guard.push_back(event);
    }

    /// Return the most recent `k` events, oldest-first.
    pub async fn recent(&self, k: usize) -> Vec<AuditEvent> {
        let guard = self.events.read().await;
        let skip = guard.len().saturating_sub(k);
        guard.iter().skip(skip).cloned().collect()
    }

    /// Return all events matching `filter`, oldest-first.
    pub async fn query(&self, filter: &AuditFilter) -> Vec<AuditEvent> {
        let guard = self.events.read().await;
        guard.iter().filter(|e| filter.matches(e)).cloned().collect()
    }

    /// Current number of retained events.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// True if the log currently holds no events.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
