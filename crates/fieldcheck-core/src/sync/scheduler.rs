//! Periodic sync trigger.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::gateway::GatewayClient;

use super::SyncService;

/// Background task that runs a sync cycle on a fixed interval while
/// entries are pending. Overlap is already prevented inside
/// [`SyncService::sync_cycle`], so a slow cycle only means skipped ticks.
pub struct SyncScheduler {
    handle: JoinHandle<()>,
}

impl SyncScheduler {
    /// Spawn the periodic trigger on the current runtime.
    #[must_use]
    pub fn spawn(service: SyncService<GatewayClient>, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match service.pending_count().await {
                    Ok(0) => {}
                    Ok(pending) => {
                        tracing::debug!(pending, "Periodic sync triggered");
                        if let Err(error) = service.sync_cycle().await {
                            tracing::warn!("Periodic sync cycle failed: {error}");
                        }
                    }
                    Err(error) => {
                        tracing::warn!("Could not read pending count: {error}");
                    }
                }
            }
        });
        Self { handle }
    }

    /// Stop the periodic trigger.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
