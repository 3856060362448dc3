// src/manager/schedule.rs
//! Periodic key rotation on the tokio runtime

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use super::state::Shared;

/// Handle to a running rotation loop
pub(crate) struct RotationTask {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl RotationTask {
    /// First tick fires one full period after start
    pub(crate) fn spawn(shared: &Arc<Shared>) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let period = shared.config.rotation_period;
        let handle = tokio::spawn(run(Arc::downgrade(shared), period, shutdown_rx));
        info!(period_secs = period.as_secs(), "Key rotation task started");
        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signal the loop and wait for it; an in-flight rotation completes first
    pub(crate) async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Key rotation task ended abnormally");
        }
    }

    pub(crate) fn abort(self) {
        self.handle.abort();
    }
}

async fn run(shared: Weak<Shared>, period: Duration, mut shutdown_rx: mpsc::Receiver<()>) {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                info!("Key rotation task received shutdown signal");
                break;
            }
            _ = timer.tick() => {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                // Failures are retried at the next tick
                if let Err(e) = shared.rotate().await {
                    error!(error = %e, "Scheduled key rotation failed");
                }
            }
        }
    }

    info!("Key rotation task stopped");
}
