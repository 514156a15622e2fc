//! Timer-driven sync runs.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::SyncError;
use crate::sync::{SyncEngine, Trigger};

/// Run a sync every `period`, starting immediately.
///
/// A tick that finds a run already in flight is skipped. Failures are
/// logged by the engine and do not stop the loop.
pub fn spawn_interval(engine: SyncEngine, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match engine.run(Trigger::Timer).await {
                Ok(report) => {
                    tracing::debug!(run_id = %report.run_id, "Timer sync finished");
                }
                Err(SyncError::AlreadyInProgress) => {
                    tracing::debug!("Sync already running, skipping tick");
                }
                Err(_) => {}
            }
        }
    })
}
