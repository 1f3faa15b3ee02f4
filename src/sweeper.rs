//! Periodic expiry of past events and stale reservations.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::clock::Clock;
use crate::services::bounded;
use crate::store::Store;
use crate::utils::error::AppResult;

#[derive(Debug, Clone, Copy)]
pub struct SweeperConfig {
    /// Pause between sweeps; the first sweep runs on start.
    pub interval: Duration,
    /// How long a reservation may stay unpaid.
    pub reservation_window: chrono::Duration,
    pub operation_timeout: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10 * 60),
            reservation_window: chrono::Duration::minutes(15),
            operation_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub events_finished: u64,
    pub tickets_expired: u64,
}

pub struct ExpirySweeper {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    config: SweeperConfig,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: SweeperConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Runs both expiry passes once. A failing pass does not stop the other;
    /// the first error is returned after both have been attempted.
    pub async fn sweep_once(&self) -> AppResult<SweepReport> {
        let now = self.clock.now();
        let limit = self.config.operation_timeout;

        let events = bounded(limit, self.store.finish_past_events(now)).await;
        match &events {
            Ok(count) => info!(count, "Finished past events"),
            Err(e) => error!(error = %e, "Failed to finish past events"),
        }

        let cutoff = now - self.config.reservation_window;
        let tickets = bounded(limit, self.store.expire_stale_tickets(cutoff, now)).await;
        match &tickets {
            Ok(count) => info!(count, "Expired stale reservations"),
            Err(e) => error!(error = %e, "Failed to expire stale reservations"),
        }

        Ok(SweepReport {
            events_finished: events?,
            tickets_expired: tickets?,
        })
    }

    /// Sweeps on every tick until `shutdown` turns true or its sender is
    /// dropped. A sweep already running is allowed to finish.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?self.config.interval, "Expiry sweeper started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Errors are already logged; the next tick retries
                    let _ = self.sweep_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Expiry sweeper stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
