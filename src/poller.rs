//! Fixed-interval poller driving triage cycles
//!
//! By default a tick that arrives while the previous cycle is still running is skipped, so
//! at most one cycle is in flight. With `allow_overlap` every tick starts a cycle. Ticks
//! missed while the runtime was busy are dropped rather than replayed in a burst.

use async_trait::async_trait;
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::triage::{CycleReport, TriageOrchestrator};

/// Something that can run one triage cycle
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self) -> CycleReport;
}

#[async_trait]
impl CycleRunner for TriageOrchestrator {
    async fn run_cycle(&self) -> CycleReport {
        TriageOrchestrator::run_cycle(self).await
    }
}

/// Shortest accepted interval; `tokio::time::interval` rejects zero
const MIN_INTERVAL: Duration = Duration::from_millis(1);

pub struct Poller {
    runner: Arc<dyn CycleRunner>,
    interval: Duration,
    allow_overlap: bool,
}

/// Handle to a running poller
pub struct PollerHandle {
    handle: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl PollerHandle {
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Stop scheduling cycles and wait for in-flight ones to finish
    pub async fn shutdown(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.wake.notify_one();
        if let Err(e) = self.handle.await {
            error!("Poller task ended abnormally: {}", e);
        }
    }
}

/// Clears the running flag when a cycle ends, including by panic
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Poller {
    pub fn new(runner: Arc<dyn CycleRunner>, interval: Duration) -> Self {
        if interval < MIN_INTERVAL {
            warn!("Poll interval {:?} too short, using {:?}", interval, MIN_INTERVAL);
        }
        Self {
            runner,
            interval: interval.max(MIN_INTERVAL),
            allow_overlap: false,
        }
    }

    pub fn allow_overlap(mut self, allow: bool) -> Self {
        self.allow_overlap = allow;
        self
    }

    /// Start polling in a background task; the first cycle runs immediately
    pub fn spawn(self) -> PollerHandle {
        let shutdown = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());

        let handle = tokio::spawn(self.run(Arc::clone(&shutdown), Arc::clone(&wake)));

        PollerHandle {
            handle,
            shutdown,
            wake,
        }
    }

    async fn run(self, shutdown: Arc<AtomicBool>, wake: Arc<Notify>) {
        info!(
            "Poller started, polling every {}ms (overlap {})",
            self.interval.as_millis(),
            if self.allow_overlap { "allowed" } else { "skipped" }
        );

        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let running = Arc::new(AtomicBool::new(false));
        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = wake.notified() => {}
            }

            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            reap_finished(&mut in_flight);

            let guard = if self.allow_overlap {
                None
            } else if running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                Some(RunningGuard(Arc::clone(&running)))
            } else {
                debug!("Previous cycle still running, skipping tick");
                continue;
            };

            let runner = Arc::clone(&self.runner);
            in_flight.push(tokio::spawn(async move {
                let _guard = guard;
                let report = runner.run_cycle().await;
                log_report(&report);
            }));
        }

        if !in_flight.is_empty() {
            info!("Waiting for {} in-flight cycle(s)", in_flight.len());
        }
        for handle in in_flight {
            if let Err(e) = handle.await {
                error!("Cycle task panicked: {}", e);
            }
        }
        info!("Poller shutting down");
    }
}

fn reap_finished(in_flight: &mut Vec<JoinHandle<()>>) {
    let (finished, pending): (Vec<_>, Vec<_>) =
        in_flight.drain(..).partition(|h| h.is_finished());
    *in_flight = pending;

    for handle in finished {
        if let Some(Err(e)) = handle.now_or_never() {
            error!("Cycle task panicked: {}", e);
        }
    }
}

fn log_report(report: &CycleReport) {
    for (message, category) in report.classified() {
        info!(
            message_id = %message.id,
            "{} | {} -> {}",
            message.from,
            message.subject,
            category
        );
    }
}
