use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::store::Store;
use crate::utils::error::{AppError, AppResult};

pub mod events;
pub mod tickets;

pub use events::EventService;
pub use tickets::TicketService;

/// Business rules applied by the services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub max_tickets_per_purchase: u32,
    /// Upper bound on a single storage operation; on expiry the open
    /// transaction is dropped and rolled back.
    pub operation_timeout: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_tickets_per_purchase: 5,
            operation_timeout: Duration::from_secs(5),
        }
    }
}

/// Runs a storage operation under `limit`.
pub(crate) async fn bounded<T, F>(limit: Duration, operation: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| AppError::Timeout(limit))?
}

/// Shared handle to every service, used as router state.
#[derive(Clone)]
pub struct Services {
    pub events: Arc<EventService>,
    pub tickets: Arc<TicketService>,
}

impl Services {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, policy: Policy) -> Self {
        Self {
            events: Arc::new(EventService::new(store.clone(), clock.clone(), policy)),
            tickets: Arc::new(TicketService::new(store, clock, policy)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out_slow_operations() {
        let limit = Duration::from_millis(50);
        let result: AppResult<()> = bounded(limit, async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(AppError::Timeout(d)) if d == limit));
    }

    #[tokio::test]
    async fn test_bounded_passes_through_results() {
        let ok: AppResult<u32> = bounded(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: AppResult<u32> = bounded(Duration::from_secs(1), async {
            Err(AppError::NotFound("gone".into()))
        })
        .await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
    }
}
