//! Scheduler Trigger: recurring `run_all` on a fixed cadence.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use opspilot_agents::Orchestrator;

/// Config for the recurring trigger.
#[derive(Debug, Clone)]
pub struct Scheduler {
    pub interval: Duration,
    /// Run one pass right after start instead of waiting a full interval.
    pub run_on_start: bool,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            run_on_start: false,
        }
    }
}

/// What happened to a manual trigger request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerRequest {
    Queued,
    /// An earlier request has not been picked up yet; this one was folded into it.
    AlreadyPending,
    /// The scheduler task has exited.
    Stopped,
}

/// Cloneable hook that asks a running scheduler for an immediate pass.
#[derive(Debug, Clone)]
pub struct SchedulerTrigger {
    tx: mpsc::Sender<()>,
}

impl SchedulerTrigger {
    /// Requests are coalesced: at most one is pending at a time.
    pub fn request(&self) -> TriggerRequest {
        match self.tx.try_send(()) {
            Ok(()) => TriggerRequest::Queued,
            Err(TrySendError::Full(())) => TriggerRequest::AlreadyPending,
            Err(TrySendError::Closed(())) => TriggerRequest::Stopped,
        }
    }
}

/// Handle for the running trigger (shutdown + manual trigger hook).
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: Arc<Notify>,
    trigger: SchedulerTrigger,
    passes: Arc<AtomicU64>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Request an immediate pass.
    pub fn trigger(&self) -> TriggerRequest {
        self.trigger.request()
    }

    /// Trigger hook that outlives borrows of the handle (e.g. for HTTP handlers).
    pub fn trigger_handle(&self) -> SchedulerTrigger {
        self.trigger.clone()
    }

    /// Number of completed passes (including aborted ones).
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }

    /// Stop the trigger. An in-flight pass runs to completion first.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.join.await {
            warn!(error = %e, "scheduler task ended abnormally");
        }
    }
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn with_run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }

    /// Spawn the trigger on the current Tokio runtime.
    ///
    /// Passes never overlap: the loop awaits each `run_all` before polling the
    /// next tick, and ticks missed while a pass was running are skipped.
    pub fn spawn(&self, orchestrator: Arc<Orchestrator>) -> SchedulerHandle {
        let shutdown = Arc::new(Notify::new());
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
        let passes = Arc::new(AtomicU64::new(0));

        let cfg = self.clone();
        let task_shutdown = Arc::clone(&shutdown);
        let task_passes = Arc::clone(&passes);

        let join = tokio::spawn(async move {
            info!(interval_secs = cfg.interval.as_secs(), "scheduler started");

            let start = if cfg.run_on_start {
                Instant::now()
            } else {
                Instant::now() + cfg.interval
            };
            let mut ticker = tokio::time::interval_at(start, cfg.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = task_shutdown.notified() => {
                        info!("scheduler received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        run_pass(&orchestrator, "interval").await;
                        task_passes.fetch_add(1, Ordering::SeqCst);
                    }
                    Some(()) = trigger_rx.recv() => {
                        run_pass(&orchestrator, "manual").await;
                        task_passes.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }

            info!("scheduler stopped");
        });

        SchedulerHandle {
            shutdown,
            trigger: SchedulerTrigger { tx: trigger_tx },
            passes,
            join,
        }
    }
}

/// One `run_all` pass. Structural errors are logged so the timer survives.
async fn run_pass(orchestrator: &Orchestrator, reason: &'static str) {
    match orchestrator.run_all().await {
        Ok(batch) => info!(
            reason,
            units = batch.len(),
            succeeded = batch.succeeded(),
            failed = batch.failed(),
            "scheduled pass complete"
        ),
        Err(e) => error!(reason, error = %e, "scheduled pass aborted"),
    }
}
