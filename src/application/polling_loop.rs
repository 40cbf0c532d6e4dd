//! `PollingLoop` (C8): the single background task that keeps instance status
//! current.
//!
//! Grounded in `application/resource_monitor.rs::start()`'s shape: a
//! `tokio::select!` over an `interval.tick()` and a `broadcast::Receiver`
//! shutdown signal, spawned once and returning a `JoinHandle`. Because the
//! tick body is awaited to completion before the next `tick()` resolves, two
//! ticks never run concurrently.
//!
//! Resource sampling sits one layer less precise than its model: the
//! `TerminalSession` port has no notion of a backing OS pid (it only
//! abstracts multiplexer pane operations), so this loop samples whole-system
//! CPU/memory once per tick via `sysinfo` and attaches that same sample to
//! every active instance, treating the whole process tree as a single unit.

use std::collections::HashMap;
use std::time::Duration;

use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::domain::models::{InstanceId, InstanceStatus, ResourceSample};
use crate::domain::ports::CaptureOptions;
use crate::services::activity_detector::ActivityDetector;
use std::sync::Arc;

use super::instance_supervisor::InstanceSupervisor;

/// Per-instance tick state the loop carries between ticks: the previously
/// captured pane content and the consecutive-stable-tick counter.
#[derive(Debug, Clone, Default)]
struct TickState {
    previous_content: String,
    stable_ticks: u32,
}

fn content_changed(previous: &str, new: &str) -> bool {
    let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>();
    normalize(previous) != normalize(new)
}

/// Owns the single recurring poll over every live instance's session.
pub struct PollingLoop {
    supervisor: Arc<InstanceSupervisor>,
    detector: ActivityDetector,
    interval: Duration,
    auto_yes: bool,
    shutdown_tx: broadcast::Sender<()>,
}

impl PollingLoop {
    /// Construct a loop polling `supervisor` every `interval`. `auto_yes`
    /// mirrors the operator's `Config::auto_yes` flag: when set, a
    /// newly-detected confirmation prompt on a `Ready` instance is
    /// auto-approved instead of surfaced for manual review.
    #[must_use]
    pub fn new(supervisor: Arc<InstanceSupervisor>, interval: Duration, auto_yes: bool) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            supervisor,
            detector: ActivityDetector::new(),
            interval,
            auto_yes,
            shutdown_tx,
        }
    }

    /// Spawn the background polling task.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let supervisor = Arc::clone(&self.supervisor);
        let detector = self.detector;
        let auto_yes = self.auto_yes;
        let interval_duration = self.interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut tick = interval(interval_duration);
            let mut state: HashMap<InstanceId, TickState> = HashMap::new();
            let refresh_kind = RefreshKind::new().with_cpu(CpuRefreshKind::everything()).with_memory(MemoryRefreshKind::everything());
            let mut system = System::new_with_specifics(refresh_kind);

            info!(interval_ms = interval_duration.as_millis(), "polling loop started");

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        run_tick(&supervisor, detector, auto_yes, &mut state, &mut system).await;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("polling loop shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Request a graceful stop. The running tick, if any, finishes first.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn run_tick(supervisor: &Arc<InstanceSupervisor>, detector: ActivityDetector, auto_yes: bool, state: &mut HashMap<InstanceId, TickState>, system: &mut System) {
    system.refresh_cpu_all();
    system.refresh_memory();
    let resource_sample = Some(ResourceSample {
        cpu_percent: system.global_cpu_usage(),
        memory_mb: system.used_memory() / 1024 / 1024,
    });

    let instances = supervisor.list().await;
    state.retain(|id, _| instances.iter().any(|i| i.id == *id));

    for instance in instances {
        if instance.status == InstanceStatus::Paused {
            continue;
        }

        let captured = match supervisor.capture(instance.id, CaptureOptions::default()).await {
            Ok(content) => content,
            Err(err) => {
                warn!(instance = %instance.id, error = %err, "pane capture failed, skipping this tick");
                continue;
            }
        };

        let entry = state.entry(instance.id).or_default();
        let previous_content = std::mem::replace(&mut entry.previous_content, captured.clone());
        let changed = content_changed(&previous_content, &captured);
        entry.stable_ticks = if changed { 0 } else { entry.stable_ticks + 1 };
        let stable_ticks = entry.stable_ticks;

        let classification = detector.classify(&previous_content, &captured, instance.status, stable_ticks);

        let (updated, _newly_detected) = match supervisor.apply_tick(instance.id, classification, resource_sample).await {
            Ok(result) => result,
            Err(err) => {
                warn!(instance = %instance.id, error = %err, "failed to apply tick classification");
                continue;
            }
        };

        // §4.8 step 3 gates on the instance *having* a detected prompt, not
        // on this tick being the one that newly detected it — the tick a
        // prompt appears on is always `Running` (any content change forces
        // that classification), so gating on the edge rather than the level
        // meant auto-yes could never fire. `send_yes` clears `prompt_detected`,
        // which is what gives "exactly once" its teeth here.
        if auto_yes && updated.status == InstanceStatus::Ready && updated.prompt_detected {
            if let Err(err) = supervisor.send_yes(instance.id).await {
                warn!(instance = %instance.id, error = %err, "auto-yes failed");
            }
        }

        debug!(instance = %instance.id, status = ?updated.status, stable_ticks, "tick applied");
    }
}
