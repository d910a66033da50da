//! Reservation expiry sweeper
//!
//! Releases Pending reservations whose TTL elapsed so an abandoned checkout
//! returns its units to available. Expiry is idempotent: a concurrent confirm
//! or release wins through the status predicate in the UPDATE.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::inventory::InventoryService;

pub struct ExpirySweeper {
    service: Arc<InventoryService>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(service: Arc<InventoryService>, interval_seconds: u64) -> Self {
        Self {
            service,
            interval: Duration::from_secs(interval_seconds),
        }
    }

    /// Sweep until shutdown is signalled
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Reservation expiry sweeper started");
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("Reservation expiry sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.service.expire_due().await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!("Expired {} stale reservations", n),
                        Err(e) => tracing::error!("Expiry sweep failed: {}", e),
                    }
                }
            }
        }
    }
}
