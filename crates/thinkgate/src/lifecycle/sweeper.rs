//! Background sweep loop
//!
//! One task per manager ticks at the sweep interval and stops on request,
//! letting a running sweep finish first.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::manager::ModelLifecycleManager;

/// Handle to the background sweep loop.
///
/// Dropping the handle also stops the loop, after any sweep in progress,
/// but nothing waits for it; use [`shutdown`](Self::shutdown) to join.
pub struct SweeperHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the loop to stop and wait for it.
    ///
    /// A sweep that is already running completes first.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Sweep loop ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl ModelLifecycleManager {
    /// Start the periodic sweep on the current runtime
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let (stop, mut stopped) = watch::channel(false);
        let manager = Arc::clone(self);
        let period = manager.sweep_interval();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                sweep_interval_secs = period.as_secs(),
                inactivity_timeout_secs = manager.inactivity_timeout().as_secs(),
                "Model sweep started"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => {
                        match manager.sweep().await {
                            Ok(report) if report.is_quiet() => {}
                            Ok(report) => info!(
                                tracked = report.newly_tracked.len(),
                                dropped = report.dropped.len(),
                                evicted = report.evicted.len(),
                                failed = report.failed.len(),
                                "Sweep finished"
                            ),
                            Err(e) => warn!(error = %e, "Skipping sweep, loaded models unavailable"),
                        }
                    }
                }
            }

            debug!("Model sweep stopped");
        });

        SweeperHandle { stop, task }
    }
}
