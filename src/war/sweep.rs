//! Periodic phase sweep
//!
//! Wakes every `sweep_interval_ms`, runs `WarManager::tick` on the blocking
//! pool and, once an hour, applies archive retention.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::core::error::{Result, WarError};
use crate::core::types::Millis;
use crate::war::manager::WarManager;

const CLEANUP_EVERY_MS: Millis = 3600 * 1000;

pub struct WarSweeper {
    manager: Arc<WarManager>,
    interval: Duration,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl WarSweeper {
    pub fn new(manager: Arc<WarManager>) -> Self {
        let interval = Duration::from_millis(manager.config().timing.sweep_interval_ms);
        Self::with_interval(manager, interval)
    }

    pub fn with_interval(manager: Arc<WarManager>, interval: Duration) -> Self {
        Self {
            manager,
            interval,
            shutdown: None,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Spawn the sweep loop on the current tokio runtime
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(WarError::InvalidStateTransition("sweeper already running".into()));
        }
        let (tx, rx) = watch::channel(false);
        let manager = Arc::clone(&self.manager);
        let interval = self.interval;
        self.task = Some(tokio::spawn(sweep_loop(manager, interval, rx)));
        self.shutdown = Some(tx);
        tracing::info!(interval_ms = interval.as_millis() as u64, "war sweeper started");
        Ok(())
    }

    /// Signal the loop and wait for the pass in progress to finish
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "war sweeper task ended abnormally");
            }
        }
        tracing::info!("war sweeper stopped");
    }
}

async fn sweep_loop(manager: Arc<WarManager>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_cleanup: Option<Millis> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let now = manager.clock().now_ms();
        let cleanup_due = last_cleanup.map_or(true, |at| now.saturating_sub(at) >= CLEANUP_EVERY_MS);
        if cleanup_due {
            last_cleanup = Some(now);
        }

        let pass = Arc::clone(&manager);
        let outcome = tokio::task::spawn_blocking(move || {
            let report = pass.tick(now);
            let cleaned = if cleanup_due { Some(pass.cleanup_archives()) } else { None };
            (report, cleaned)
        })
        .await;

        match outcome {
            Ok((report, cleaned)) => {
                if !report.is_idle() {
                    tracing::info!(
                        activated = report.activated.len(),
                        concluded = report.concluded.len(),
                        archived = report.archived.len(),
                        holding_events = report.holding_events,
                        failures = report.failures.len(),
                        "sweep pass"
                    );
                }
                if let Some(Err(e)) = cleaned {
                    tracing::warn!(error = %e, "archive retention cleanup failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "sweep pass panicked"),
        }
    }
}
