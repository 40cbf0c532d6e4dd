//! `EventBus` (C7, pub/sub half): in-process, non-blocking publish/subscribe.
//!
//! Grounded in `services/event_bus.rs`: a `tokio::broadcast` channel plus a
//! monotonic sequence counter, with every publish mirrored into the
//! `AuditLog` so the two act as one subsystem from a caller's perspective,
//! while remaining separate services.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::warn;

use crate::domain::models::AuditEvent;
use crate::services::audit_log::AuditLog;

/// Default broadcast channel depth. Slow subscribers that fall behind this
/// many unconsumed events receive a `Lagged` error from their receiver and
/// resume from the next publish rather than blocking the core.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// In-process event bus: assigns sequence numbers, broadcasts to
/// subscribers, and mirrors every event into an `AuditLog`.
pub struct EventBus {
    sender: broadcast::Sender<AuditEvent>,
    sequence: AtomicU64,
    audit_log: Arc<AuditLog>,
}

impl EventBus {
    /// Construct a bus backed by `audit_log`, with the default channel depth.
    #[must_use]
    pub fn new(audit_log: Arc<AuditLog>) -> Self {
        Self::with_capacity(audit_log, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Construct a bus with an explicit broadcast channel depth.
    #[must_use]
    pub fn with_capacity(audit_log: Arc<AuditLog>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: AtomicU64::new(0),
            audit_log,
        }
    }

    /// Publish an event: assigns the next sequence number, appends to the
    /// audit log, and broadcasts to any live subscribers. Non-blocking: if
    /// there are no subscribers, or all have disconnected, this still
    /// succeeds (the audit log always receives the event).
    pub async fn publish(&self, mut event: AuditEvent) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        event.sequence = seq;

        self.audit_log.push(event.clone()).await;

        if let Err(err) = self.sender.send(event) {
            warn!(error = %err, "event published with no active subscribers");
        }
    }

    /// Subscribe to the live event stream. A subscriber that falls more than
    /// `capacity` events behind will observe `RecvError::Lagged` and should
    /// treat it as "some events were missed" rather than a fatal error.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.sender.subscribe()
    }

    /// Shared handle to the backing audit log, for queries that don't need
    /// the live stream.
    #[must_use]
    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit_log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AuditKind, AuditLevel};

    #[tokio::test]
    async fn publish_assigns_monotonic_sequence() {
        let bus = EventBus::new(Arc::new(AuditLog::new(16)));
        bus.publish(AuditEvent::new(AuditKind::AgentSpawned, AuditLevel::Info, "a")).await;
        bus.publish(AuditEvent::new(AuditKind::AgentSpawned, AuditLevel::Info, "b")).await;

        let recent = bus.audit_log().recent(2).await;
        assert_eq!(recent[0].sequence, 1);
        assert_eq!(recent[1].sequence, 2);
    }

    #[tokio::test]
    async fn subscriber_receives_published_events_in_order() {
        let bus = EventBus::new(Arc::new(AuditLog::new(16)));
        let mut rx = bus.subscribe();

        bus.publish(AuditEvent::new(AuditKind::PlanCreated, AuditLevel::Info, "first")).await;
        bus.publish(AuditEvent::new(AuditKind::PlanCreated, AuditLevel::Info, "second")).await;

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.message, "first");
        assert_eq!(second.message, "second");
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_still_reaches_audit_log() {
        let bus = EventBus::new(Arc::new(AuditLog::new(16)));
        bus.publish(AuditEvent::new(AuditKind::FsmError, AuditLevel::Error, "oops")).await;
        assert_eq!(bus.audit_log().len().await, 1);
    }
}
