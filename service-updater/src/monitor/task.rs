//! Periodic sweep task.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use super::{apply_sweep, StuckMonitor};
use crate::events::EventSink;
use crate::pipeline::BatchState;
use crate::utils::now_utc;

/// Handle to a running sweep task. Dropping it stops the task.
#[derive(Debug)]
pub struct MonitorHandle {
    stop: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    /// Starts sweeping every `period` while `state` reports a running batch.
    ///
    /// The first sweep happens one full period after the start. A zero period
    /// is raised to one millisecond.
    #[must_use]
    pub fn spawn(
        monitor: Arc<StuckMonitor>,
        state: Arc<BatchState>,
        events: Arc<dyn EventSink>,
        period: Duration,
    ) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let join = tokio::spawn(async move {
            let mut ticker = interval(period.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        if !state.is_running() {
                            break;
                        }
                        let report = monitor.sweep(state.tracker(), now_utc());
                        apply_sweep(&report, &state, events.as_ref());
                    }
                }
            }
            debug!("Stuck-state monitor stopped");
        });

        Self {
            stop: Some(stop_tx),
            join,
        }
    }

    /// Stops the task and waits for it to exit.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = (&mut self.join).await;
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}
