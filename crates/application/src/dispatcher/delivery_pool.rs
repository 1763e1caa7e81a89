use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{info, warn};

/// Outcome of draining the pool at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Sends that finished inside the grace period.
    pub completed: usize,
    /// Sends aborted once the grace period ran out.
    pub abandoned: usize,
}

/// Bounded group of fire-and-forget delivery tasks.
///
/// Spawning never waits for a permit; each task acquires one before running,
/// so at most `max_in_flight` sends touch the network at once.
pub struct DeliveryPool {
    tasks: Mutex<JoinSet<()>>,
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    closed: AtomicBool,
}

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl DeliveryPool {
    /// Creates a pool allowing `max_in_flight` concurrent sends.
    #[must_use]
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            tasks: Mutex::new(JoinSet::new()),
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            in_flight: Arc::new(AtomicUsize::new(0)),
            closed: AtomicBool::new(false),
        }
    }

    /// Queues one delivery. Returns `false` once the pool has been drained.
    pub async fn spawn<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        let permits = self.permits.clone();
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = InFlightGuard(self.in_flight.clone());

        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.try_join_next() {
            log_join_failure(result);
        }
        tasks.spawn(async move {
            let _guard = guard;
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            task.await;
        });

        true
    }

    /// Returns queued plus running deliveries.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Refuses new work, waits up to `grace` for outstanding deliveries and
    /// aborts whatever is left.
    pub async fn drain(&self, grace: Duration) -> DrainReport {
        self.closed.store(true, Ordering::Release);
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        let mut report = DrainReport::default();

        let waited = tokio::time::timeout(grace, async {
            while let Some(result) = tasks.join_next().await {
                log_join_failure(result);
                report.completed += 1;
            }
        })
        .await;

        if waited.is_err() {
            report.abandoned = tasks.len();
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        if report.abandoned > 0 {
            warn!(
                completed = report.completed,
                abandoned = report.abandoned,
                "delivery pool drained with abandoned sends"
            );
        } else {
            info!(completed = report.completed, "delivery pool drained");
        }

        report
    }
}

fn log_join_failure(result: Result<(), JoinError>) {
    if let Err(error) = result
        && error.is_panic()
    {
        warn!(error = %error, "delivery task panicked");
    }
}
