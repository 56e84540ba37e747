use std::time::Duration;
use tokio::time::interval;
use tracing::info;

use crate::state::SharedState;

/// Spawn the duration watchdog background task.
///
/// Each tick stops runs whose duration has elapsed and, in poll mode,
/// fetches worker stats for every running run. The task exits when the
/// shutdown channel fires.
pub fn spawn_watchdog(state: SharedState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let tick =
            Duration::from_secs(state.config.orchestrator.metrics_poll_interval_seconds.max(1));
        let mut ticker = interval(tick);
        let mut shutdown_rx = state.shutdown_tx.subscribe();

        info!(interval_secs = tick.as_secs(), "watchdog task started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    state.orchestrator.tick().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("watchdog task stopping");
                    break;
                }
            }
        }
    })
}
