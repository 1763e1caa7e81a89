use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use pixelrelay_core::IntegrationId;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started_at: DateTime<Utc>,
    remaining: u32,
}

/// Fixed-window token counter keyed by integration.
pub struct FixedWindowRateLimiter {
    max_per_window: u32,
    window: TimeDelta,
    windows: RwLock<HashMap<IntegrationId, RateWindow>>,
}

impl FixedWindowRateLimiter {
    /// Creates a limiter allowing `max_per_window` sends per `window`.
    #[must_use]
    pub fn new(max_per_window: u32, window: TimeDelta) -> Self {
        Self {
            max_per_window,
            window,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Consumes one token for `integration_id`; returns `false` when exhausted.
    pub async fn try_acquire(&self, integration_id: IntegrationId, now: DateTime<Utc>) -> bool {
        let mut windows = self.windows.write().await;
        let window = windows.entry(integration_id).or_insert(RateWindow {
            started_at: now,
            remaining: self.max_per_window,
        });

        if now - window.started_at >= self.window {
            *window = RateWindow {
                started_at: now,
                remaining: self.max_per_window,
            };
        }

        if window.remaining == 0 {
            return false;
        }

        window.remaining -= 1;
        true
    }

    /// Returns tokens left in the current window without consuming one.
    pub async fn remaining(&self, integration_id: IntegrationId, now: DateTime<Utc>) -> u32 {
        match self.windows.read().await.get(&integration_id) {
            Some(window) if now - window.started_at < self.window => window.remaining,
            _ => self.max_per_window,
        }
    }

    /// Drops windows that have rolled over.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, window| now - window.started_at < self.window);
        before - windows.len()
    }
}
