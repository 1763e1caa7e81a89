//! Sliding-window failure counter backing the error-spike breaker.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use pixelrelay_domain::IntegrationType;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::rules_engine::to_time_delta;
use crate::shutdown::{ShutdownListener, spawn_periodic};

/// Tracks failed sends per integration type.
///
/// Suspension is self-healing: once old failures age out of the window,
/// [`ErrorTracker::should_disable`] turns false again.
pub struct ErrorTracker {
    window: TimeDelta,
    threshold: usize,
    failures: RwLock<HashMap<IntegrationType, VecDeque<DateTime<Utc>>>>,
}

impl ErrorTracker {
    /// Creates a tracker that trips at `threshold` failures within `window`.
    #[must_use]
    pub fn new(window: Duration, threshold: usize) -> Self {
        Self {
            window: to_time_delta(window),
            threshold: threshold.max(1),
            failures: RwLock::new(HashMap::new()),
        }
    }

    /// Records one failure now.
    pub async fn record_error(&self, integration_type: IntegrationType) {
        self.record_error_at(integration_type, Utc::now()).await;
    }

    /// Records one failure at `at`.
    pub async fn record_error_at(&self, integration_type: IntegrationType, at: DateTime<Utc>) {
        let mut failures = self.failures.write().await;
        let timestamps = failures.entry(integration_type).or_default();
        timestamps.push_back(at);

        let recent = timestamps
            .iter()
            .filter(|failed_at| at - **failed_at < self.window)
            .count();
        if recent == self.threshold {
            warn!(
                integration_type = %integration_type,
                failures = recent,
                window_seconds = self.window.num_seconds(),
                "error spike detected; suspending sends"
            );
        }
    }

    /// Returns whether sends should be suspended now.
    pub async fn should_disable(&self, integration_type: IntegrationType) -> bool {
        self.should_disable_at(integration_type, Utc::now()).await
    }

    /// Returns whether sends should be suspended at `now`.
    pub async fn should_disable_at(
        &self,
        integration_type: IntegrationType,
        now: DateTime<Utc>,
    ) -> bool {
        self.recent_failures_at(integration_type, now).await >= self.threshold
    }

    /// Counts failures inside the trailing window ending at `now`.
    pub async fn recent_failures_at(
        &self,
        integration_type: IntegrationType,
        now: DateTime<Utc>,
    ) -> usize {
        self.failures
            .read()
            .await
            .get(&integration_type)
            .map_or(0, |timestamps| {
                timestamps
                    .iter()
                    .filter(|failed_at| now - **failed_at < self.window)
                    .count()
            })
    }

    /// Prunes failures older than the window.
    pub async fn sweep(&self, now: DateTime<Utc>) {
        let mut failures = self.failures.write().await;
        for timestamps in failures.values_mut() {
            while timestamps
                .front()
                .is_some_and(|failed_at| now - *failed_at >= self.window)
            {
                timestamps.pop_front();
            }
        }
        failures.retain(|_, timestamps| !timestamps.is_empty());
    }

    /// Spawns the periodic prune.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        period: Duration,
        shutdown: ShutdownListener,
    ) -> JoinHandle<()> {
        spawn_periodic("error_tracker_sweep", period, shutdown, move || {
            let tracker = self.clone();
            async move { tracker.sweep(Utc::now()).await }
        })
    }
}
