//! Poll, evaluate, audit and hand off allowed pairs to the adapters.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pixelrelay_core::{AppError, AppResult};
use pixelrelay_domain::{
    AdapterEvent, DispatchDecision, EventCursor, Integration, PayloadMap, RelayEvent, SkipReason,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::adapter_manager::AdapterManager;
use crate::audit_logger::AuditLogger;
use crate::integration_registry::IntegrationRegistry;
use crate::relay_ports::EventSource;
use crate::rules_engine::RulesEngine;
use crate::shutdown::{ShutdownListener, ShutdownSignal};

mod delivery_pool;

pub use delivery_pool::{DeliveryPool, DrainReport};

/// How the read watermark advances after a non-empty poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkMode {
    /// Advance to the time the poll started.
    #[default]
    PollTime,
    /// Advance to just after the last fetched event in `(created_at, id)`
    /// order.
    LastEvent,
}

impl WatermarkMode {
    /// Returns a stable configuration value for this mode.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PollTime => "poll_time",
            Self::LastEvent => "last_event",
        }
    }
}

impl FromStr for WatermarkMode {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "poll_time" => Ok(Self::PollTime),
            "last_event" => Ok(Self::LastEvent),
            other => Err(AppError::Validation(format!(
                "unknown watermark mode '{other}'"
            ))),
        }
    }
}

/// Dispatcher tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatcherConfig {
    /// Delay between ticks.
    pub poll_interval: Duration,
    /// Maximum events fetched per tick.
    pub batch_size: usize,
    /// Watermark advance policy.
    pub watermark_mode: WatermarkMode,
    /// Maximum concurrent adapter sends.
    pub max_in_flight: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 50,
            watermark_mode: WatermarkMode::PollTime,
            max_in_flight: 16,
        }
    }
}

/// Counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Events returned by the event source.
    pub fetched: usize,
    /// (event, integration) pairs evaluated.
    pub evaluated: usize,
    /// Pairs audited as ALLOW.
    pub allowed: usize,
    /// Pairs audited as SKIP.
    pub skipped: usize,
    /// Events dropped because their payload was not an object.
    pub malformed: usize,
    /// Deliveries handed to the pool.
    pub dispatched: usize,
}

/// Periodic coordinator for the relay.
pub struct Dispatcher {
    event_source: Arc<dyn EventSource>,
    registry: Arc<IntegrationRegistry>,
    rules_engine: Arc<RulesEngine>,
    audit_logger: Arc<AuditLogger>,
    adapter_manager: Arc<AdapterManager>,
    delivery_pool: DeliveryPool,
    config: DispatcherConfig,
    // Held for a whole tick so ticks never overlap.
    watermark: Mutex<EventCursor>,
}

impl Dispatcher {
    /// Creates a dispatcher whose watermark starts at the current time.
    #[must_use]
    pub fn new(
        event_source: Arc<dyn EventSource>,
        registry: Arc<IntegrationRegistry>,
        rules_engine: Arc<RulesEngine>,
        audit_logger: Arc<AuditLogger>,
        adapter_manager: Arc<AdapterManager>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            event_source,
            registry,
            rules_engine,
            audit_logger,
            adapter_manager,
            delivery_pool: DeliveryPool::new(config.max_in_flight),
            config,
            watermark: Mutex::new(EventCursor::at(Utc::now())),
        }
    }

    /// Replaces the initial watermark.
    #[must_use]
    pub fn with_watermark(self, watermark: DateTime<Utc>) -> Self {
        Self {
            watermark: Mutex::new(EventCursor::at(watermark)),
            ..self
        }
    }

    /// Returns the timestamp of the current watermark.
    pub async fn watermark(&self) -> DateTime<Utc> {
        self.watermark.lock().await.created_at
    }

    /// Returns the full read cursor.
    pub async fn cursor(&self) -> EventCursor {
        *self.watermark.lock().await
    }

    /// Returns deliveries queued or running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.delivery_pool.in_flight()
    }

    /// Runs one poll and evaluation cycle.
    ///
    /// Adapter sends are queued on the delivery pool and not awaited.
    pub async fn tick(&self) -> AppResult<TickReport> {
        let mut watermark = self.watermark.lock().await;
        let mut report = TickReport::default();

        let integrations = self.registry.active_integrations().await;
        if integrations.is_empty() {
            return Ok(report);
        }

        let poll_started_at = Utc::now();
        let events = self
            .event_source
            .fetch_events_after(*watermark, self.config.batch_size)
            .await?;
        if events.is_empty() {
            return Ok(report);
        }

        report.fetched = events.len();
        let previous = *watermark;
        *watermark = match self.config.watermark_mode {
            WatermarkMode::PollTime => EventCursor::at(poll_started_at),
            WatermarkMode::LastEvent => events
                .iter()
                .max_by_key(|event| (event.created_at, event.id))
                .filter(|last| previous.precedes(last))
                .map_or(previous, EventCursor::after_event),
        };

        for event in &events {
            let payload = match event.payload_object() {
                Ok(payload) => payload,
                Err(error) => {
                    warn!(
                        event_id = %event.id,
                        kind = %event.kind,
                        error = %error,
                        "skipping malformed event"
                    );
                    report.malformed += 1;
                    continue;
                }
            };

            for integration in &integrations {
                report.evaluated += 1;
                self.process_pair(event, payload, integration, &mut report)
                    .await;
            }
        }

        info!(
            fetched = report.fetched,
            evaluated = report.evaluated,
            allowed = report.allowed,
            skipped = report.skipped,
            malformed = report.malformed,
            dispatched = report.dispatched,
            watermark = %watermark.created_at,
            "dispatcher tick finished"
        );

        Ok(report)
    }

    async fn process_pair(
        &self,
        event: &RelayEvent,
        payload: &PayloadMap,
        integration: &Integration,
        report: &mut TickReport,
    ) {
        let evaluation = self.rules_engine.evaluate(event, payload, integration).await;
        if !evaluation.is_allowed() {
            self.record_skip(event, integration, evaluation.reason, report)
                .await;
            return;
        }

        // The registry may have refreshed since the rules engine looked.
        let Some(event_map) = self
            .registry
            .event_map(integration.id(), event.kind.as_str())
            .await
            .filter(|event_map| event_map.is_enabled())
        else {
            self.record_skip(event, integration, Some(SkipReason::NoEventMapping), report)
                .await;
            return;
        };

        let _ = self
            .audit_logger
            .log_dispatch(
                event.id,
                integration.id(),
                integration.integration_type(),
                DispatchDecision::Allow,
                None,
            )
            .await;
        report.allowed += 1;

        let adapter_event = AdapterEvent {
            event_id: event.id,
            event_kind: event.kind.clone(),
            external_name: event_map.external_name().to_owned(),
            entity_type: event.entity_type.clone(),
            entity_id: event.entity_id.clone(),
            payload: evaluation.sanitized_payload,
            session_id: event.session_id.clone(),
            user_id: event.user_id.clone(),
            integration_id: integration.id(),
            integration_type: integration.integration_type(),
            occurred_at: event.created_at,
        };

        let adapter_manager = self.adapter_manager.clone();
        let queued = self
            .delivery_pool
            .spawn(async move {
                let _ = adapter_manager.dispatch(adapter_event).await;
            })
            .await;

        if queued {
            report.dispatched += 1;
        } else {
            warn!(
                event_id = %event.id,
                integration_id = %integration.id(),
                "delivery pool closed; allowed event not sent"
            );
        }
    }

    async fn record_skip(
        &self,
        event: &RelayEvent,
        integration: &Integration,
        reason: Option<SkipReason>,
        report: &mut TickReport,
    ) {
        debug!(
            event_id = %event.id,
            integration_id = %integration.id(),
            reason = reason.map(|value| value.as_str()),
            "pair skipped"
        );
        let _ = self
            .audit_logger
            .log_dispatch(
                event.id,
                integration.id(),
                integration.integration_type(),
                DispatchDecision::Skip,
                reason,
            )
            .await;
        report.skipped += 1;
    }

    /// Starts ticking every `poll_interval` until stopped or `shutdown` fires.
    #[must_use]
    pub fn start(self: &Arc<Self>, mut shutdown: ShutdownListener) -> DispatcherHandle {
        let stop = ShutdownSignal::new();
        let mut stop_listener = stop.listener();
        let dispatcher = self.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(dispatcher.config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                poll_interval_ms = dispatcher.config.poll_interval.as_millis(),
                batch_size = dispatcher.config.batch_size,
                watermark_mode = dispatcher.config.watermark_mode.as_str(),
                max_in_flight = dispatcher.config.max_in_flight,
                "dispatcher started"
            );

            loop {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    () = stop_listener.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(error) = dispatcher.tick().await {
                            warn!(error = %error, "dispatcher tick failed");
                        }
                    }
                }
            }

            info!("dispatcher timer stopped");
        });

        DispatcherHandle {
            dispatcher: self.clone(),
            stop,
            task,
        }
    }
}

/// Running dispatcher timer.
pub struct DispatcherHandle {
    dispatcher: Arc<Dispatcher>,
    stop: ShutdownSignal,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Stops future ticks, lets a running tick finish, then drains
    /// in-flight deliveries for at most `grace`.
    pub async fn stop(self, grace: Duration) -> DrainReport {
        self.stop.trigger();
        if let Err(error) = self.task.await {
            warn!(error = %error, "dispatcher task ended abnormally");
        }

        self.dispatcher.delivery_pool.drain(grace).await
    }
}

#[cfg(test)]
mod tests;
