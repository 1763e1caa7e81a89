//! Stateful policy evaluation for one (event, integration) pair.
//!
//! Checks run in a fixed order and the first failing check decides:
//! dedup, rate limit, enablement, then sanitization. Rate limiting runs
//! before enablement, so a disabled integration still spends tokens.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use pixelrelay_domain::{
    DispatchDecision, Integration, PayloadMap, RelayEvent, SkipReason, sanitize_payload,
};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::integration_registry::IntegrationRegistry;
use crate::shutdown::{ShutdownListener, spawn_periodic};

mod dedup_cache;
mod rate_limiter;

pub use dedup_cache::{DedupCache, DedupKey};
pub use rate_limiter::FixedWindowRateLimiter;

/// Tunables for the rules engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RulesConfig {
    /// How long a dedup key suppresses repeats.
    pub dedup_ttl: Duration,
    /// Tokens per integration per window.
    pub rate_limit_max: u32,
    /// Length of one rate-limit window.
    pub rate_limit_window: Duration,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            dedup_ttl: Duration::from_secs(60),
            rate_limit_max: 30,
            rate_limit_window: Duration::from_secs(60),
        }
    }
}

/// Result of evaluating one pair.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEvaluation {
    /// Allow or skip.
    pub decision: DispatchDecision,
    /// Why the pair was skipped.
    pub reason: Option<SkipReason>,
    /// Whitelisted payload; empty for every skip.
    pub sanitized_payload: PayloadMap,
}

impl RuleEvaluation {
    fn allow(sanitized_payload: PayloadMap) -> Self {
        Self {
            decision: DispatchDecision::Allow,
            reason: None,
            sanitized_payload,
        }
    }

    fn skip(reason: SkipReason) -> Self {
        Self {
            decision: DispatchDecision::Skip,
            reason: Some(reason),
            sanitized_payload: PayloadMap::new(),
        }
    }

    /// Returns whether the pair may be dispatched.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.decision == DispatchDecision::Allow
    }
}

/// Dedup cache, rate limiter, enablement checker and sanitizer.
pub struct RulesEngine {
    registry: Arc<IntegrationRegistry>,
    dedup_cache: DedupCache,
    rate_limiter: FixedWindowRateLimiter,
}

impl RulesEngine {
    /// Creates an engine with empty dedup and rate-limit state.
    #[must_use]
    pub fn new(registry: Arc<IntegrationRegistry>, config: RulesConfig) -> Self {
        Self {
            registry,
            dedup_cache: DedupCache::new(to_time_delta(config.dedup_ttl)),
            rate_limiter: FixedWindowRateLimiter::new(
                config.rate_limit_max,
                to_time_delta(config.rate_limit_window),
            ),
        }
    }

    /// Evaluates `event` for `integration` at the current time.
    pub async fn evaluate(
        &self,
        event: &RelayEvent,
        payload: &PayloadMap,
        integration: &Integration,
    ) -> RuleEvaluation {
        self.evaluate_at(event, payload, integration, Utc::now())
            .await
    }

    /// Evaluates `event` for `integration` as of `now`.
    pub async fn evaluate_at(
        &self,
        event: &RelayEvent,
        payload: &PayloadMap,
        integration: &Integration,
        now: DateTime<Utc>,
    ) -> RuleEvaluation {
        let integration_id = integration.id();

        if self
            .dedup_cache
            .check_and_record(DedupKey::for_event(event, integration_id), now)
            .await
        {
            return RuleEvaluation::skip(SkipReason::DedupWindow);
        }

        if !self.rate_limiter.try_acquire(integration_id, now).await {
            return RuleEvaluation::skip(SkipReason::RateLimit);
        }

        if !integration.is_active() {
            return RuleEvaluation::skip(SkipReason::IntegrationDisabled);
        }

        if !self
            .registry
            .is_event_enabled(integration_id, event.kind.as_str())
            .await
        {
            return RuleEvaluation::skip(SkipReason::EventDisabled);
        }

        RuleEvaluation::allow(sanitize_payload(event.kind.as_str(), payload))
    }

    /// Returns remaining rate-limit tokens for one integration.
    pub async fn remaining_tokens(&self, integration: &Integration, now: DateTime<Utc>) -> u32 {
        self.rate_limiter.remaining(integration.id(), now).await
    }

    /// Evicts expired dedup keys and rolled-over rate windows.
    pub async fn sweep(&self, now: DateTime<Utc>) {
        let dedup_evicted = self.dedup_cache.sweep(now).await;
        let windows_evicted = self.rate_limiter.sweep(now).await;
        if dedup_evicted > 0 || windows_evicted > 0 {
            debug!(dedup_evicted, windows_evicted, "rules engine state swept");
        }
    }

    /// Spawns the periodic sweep.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        period: Duration,
        shutdown: ShutdownListener,
    ) -> JoinHandle<()> {
        spawn_periodic("rules_sweep", period, shutdown, move || {
            let engine = self.clone();
            async move { engine.sweep(Utc::now()).await }
        })
    }

    /// Returns the number of live dedup keys.
    pub async fn dedup_entries(&self) -> usize {
        self.dedup_cache.len().await
    }
}

pub(crate) fn to_time_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
mod tests;
