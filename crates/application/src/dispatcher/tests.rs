use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use pixelrelay_domain::{
    AdapterEvent, AdapterResult, DispatchAuditLogEntry, DispatchDecision, EventCursor, EventMap,
    Integration, IntegrationType, SkipReason,
};
use serde_json::{Value, json};
use tokio::sync::{Mutex, Notify};

use super::{Dispatcher, DispatcherConfig, WatermarkMode};
use crate::adapter_manager::AdapterManager;
use crate::audit_logger::AuditLogger;
use crate::relay_ports::PlatformAdapter;
use crate::rules_engine::{RulesConfig, RulesEngine};
use crate::shutdown::ShutdownSignal;
use crate::test_support::{
    RecordingAuditSink, VecEventSource, disabled_event_map, event_map, integration,
    purchase_event, registry_with, relay_event,
};

#[derive(Default)]
struct RecordingAdapter {
    sent: Mutex<Vec<AdapterEvent>>,
    gate: Option<Arc<Notify>>,
}

#[async_trait]
impl PlatformAdapter for RecordingAdapter {
    fn name(&self) -> &str {
        "recording"
    }

    fn integration_type(&self) -> IntegrationType {
        IntegrationType::Meta
    }

    async fn is_enabled(&self) -> bool {
        true
    }

    async fn send(&self, event: &AdapterEvent) -> AdapterResult {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.sent.lock().await.push(event.clone());
        AdapterResult::sent(json!({}), true)
    }
}

struct Harness {
    dispatcher: Arc<Dispatcher>,
    source: Arc<VecEventSource>,
    sink: Arc<RecordingAuditSink>,
    audit_logger: Arc<AuditLogger>,
    adapter: Arc<RecordingAdapter>,
}

impl Harness {
    async fn audited(&self) -> Vec<DispatchAuditLogEntry> {
        self.audit_logger.flush().await;
        self.sink.entries.lock().await.clone()
    }
}

async fn harness(
    integrations: Vec<Integration>,
    event_maps: Vec<EventMap>,
    config: DispatcherConfig,
    adapter: RecordingAdapter,
    watermark: DateTime<Utc>,
) -> Harness {
    let (_, registry) = registry_with(integrations, event_maps).await;
    let source = Arc::new(VecEventSource::default());
    let sink = Arc::new(RecordingAuditSink::default());
    let adapter = Arc::new(adapter);
    let audit_logger = Arc::new(AuditLogger::new(sink.clone(), 100));
    let dispatcher = Dispatcher::new(
        source.clone(),
        registry.clone(),
        Arc::new(RulesEngine::new(registry, RulesConfig::default())),
        audit_logger.clone(),
        Arc::new(AdapterManager::new().with_adapter(adapter.clone())),
        config,
    )
    .with_watermark(watermark);

    Harness {
        dispatcher: Arc::new(dispatcher),
        source,
        sink,
        audit_logger,
        adapter,
    }
}

async fn meta_harness(config: DispatcherConfig, adapter: RecordingAdapter) -> (Harness, DateTime<Utc>) {
    let meta = integration(IntegrationType::Meta, true);
    let start = Utc::now() - TimeDelta::minutes(5);
    let harness = harness(
        vec![meta.clone()],
        vec![
            event_map(&meta, "purchase", "Purchase"),
            event_map(&meta, "page_view", "PageView"),
        ],
        config,
        adapter,
        start,
    )
    .await;
    (harness, start)
}

fn decisions(sink_entries: &[DispatchAuditLogEntry]) -> Vec<(DispatchDecision, Option<SkipReason>)> {
    sink_entries
        .iter()
        .map(|entry| (entry.decision(), entry.reason()))
        .collect()
}

#[tokio::test]
async fn purchase_is_audited_and_sent_with_sanitized_payload() {
    let (harness, start) = meta_harness(DispatcherConfig::default(), RecordingAdapter::default()).await;
    harness
        .source
        .events
        .lock()
        .await
        .push(purchase_event(start + TimeDelta::seconds(1)));

    let report = harness.dispatcher.tick().await;
    assert!(report.is_ok());
    let report = report.unwrap_or_default();
    let drained = harness.dispatcher.delivery_pool.drain(Duration::from_secs(1)).await;

    assert_eq!(report.fetched, 1);
    assert_eq!(report.allowed, 1);
    assert_eq!(report.dispatched, 1);
    assert_eq!(drained.completed, 1);
    assert_eq!(
        decisions(&harness.audited().await),
        vec![(DispatchDecision::Allow, None)]
    );

    let sent = harness.adapter.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].external_name, "Purchase");
    assert_eq!(
        Value::Object(sent[0].payload.clone()),
        json!({"orderId": "o-1", "total": 150000, "currency": "IDR"})
    );
}

#[tokio::test]
async fn repeated_event_in_same_batch_is_deduplicated() {
    let (harness, start) = meta_harness(DispatcherConfig::default(), RecordingAdapter::default()).await;
    {
        let mut events = harness.source.events.lock().await;
        events.push(purchase_event(start + TimeDelta::seconds(1)));
        events.push(purchase_event(start + TimeDelta::seconds(2)));
    }

    let report = harness.dispatcher.tick().await.unwrap_or_default();
    let _ = harness.dispatcher.delivery_pool.drain(Duration::from_secs(1)).await;

    assert_eq!(report.allowed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(
        decisions(&harness.audited().await),
        vec![
            (DispatchDecision::Allow, None),
            (DispatchDecision::Skip, Some(SkipReason::DedupWindow)),
        ]
    );
    assert_eq!(harness.adapter.sent.lock().await.len(), 1);
}

#[tokio::test]
async fn disabled_event_map_is_audited_as_skip_and_not_sent() {
    let meta = integration(IntegrationType::Meta, true);
    let start = Utc::now() - TimeDelta::minutes(5);
    let harness = harness(
        vec![meta.clone()],
        vec![disabled_event_map(&meta, "purchase")],
        DispatcherConfig::default(),
        RecordingAdapter::default(),
        start,
    )
    .await;
    harness
        .source
        .events
        .lock()
        .await
        .push(purchase_event(start + TimeDelta::seconds(1)));

    let report = harness.dispatcher.tick().await.unwrap_or_default();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.dispatched, 0);
    assert_eq!(
        decisions(&harness.audited().await),
        vec![(DispatchDecision::Skip, Some(SkipReason::EventDisabled))]
    );
    assert_eq!(harness.dispatcher.in_flight(), 0);
}

#[tokio::test]
async fn no_active_integrations_is_a_no_op() {
    let paused = integration(IntegrationType::Meta, false);
    let start = Utc::now() - TimeDelta::minutes(5);
    let harness = harness(
        vec![paused.clone()],
        vec![event_map(&paused, "purchase", "Purchase")],
        DispatcherConfig::default(),
        RecordingAdapter::default(),
        start,
    )
    .await;
    harness
        .source
        .events
        .lock()
        .await
        .push(purchase_event(start + TimeDelta::seconds(1)));

    let report = harness.dispatcher.tick().await.unwrap_or_default();

    assert_eq!(report, super::TickReport::default());
    assert!(harness.source.fetches.lock().await.is_empty());
    assert!(harness.audited().await.is_empty());
    assert_eq!(harness.dispatcher.watermark().await, start);
}

#[tokio::test]
async fn malformed_payload_does_not_stop_the_batch() {
    let (harness, start) = meta_harness(DispatcherConfig::default(), RecordingAdapter::default()).await;
    {
        let mut events = harness.source.events.lock().await;
        events.push(relay_event(
            "page_view",
            "page",
            None,
            json!("not an object"),
            start + TimeDelta::seconds(1),
        ));
        events.push(purchase_event(start + TimeDelta::seconds(2)));
    }

    let report = harness.dispatcher.tick().await.unwrap_or_default();

    assert_eq!(report.fetched, 2);
    assert_eq!(report.malformed, 1);
    assert_eq!(report.allowed, 1);
    assert_eq!(harness.audited().await.len(), 1);
}

#[tokio::test]
async fn poll_time_watermark_advances_only_after_a_fetch() {
    let (harness, start) = meta_harness(DispatcherConfig::default(), RecordingAdapter::default()).await;

    let _ = harness.dispatcher.tick().await;
    assert_eq!(harness.dispatcher.watermark().await, start);

    harness
        .source
        .events
        .lock()
        .await
        .push(purchase_event(start + TimeDelta::seconds(1)));
    let before_poll = Utc::now();
    let _ = harness.dispatcher.tick().await;

    assert!(harness.dispatcher.watermark().await >= before_poll);
    assert_eq!(
        harness.source.fetches.lock().await.as_slice(),
        &[EventCursor::at(start), EventCursor::at(start)]
    );
}

#[tokio::test]
async fn last_event_watermark_keeps_batch_tail() {
    let config = DispatcherConfig {
        batch_size: 1,
        watermark_mode: WatermarkMode::LastEvent,
        ..DispatcherConfig::default()
    };
    let (harness, start) = meta_harness(config, RecordingAdapter::default()).await;
    let first_at = start + TimeDelta::seconds(1);
    let second_at = start + TimeDelta::seconds(2);
    {
        let mut events = harness.source.events.lock().await;
        events.push(purchase_event(first_at));
        events.push(relay_event(
            "page_view",
            "page",
            Some("/"),
            json!({"path": "/"}),
            second_at,
        ));
    }

    let first = harness.dispatcher.tick().await.unwrap_or_default();
    assert_eq!(harness.dispatcher.watermark().await, first_at);
    let second = harness.dispatcher.tick().await.unwrap_or_default();

    assert_eq!(first.fetched, 1);
    assert_eq!(second.fetched, 1);
    assert_eq!(harness.dispatcher.watermark().await, second_at);
    assert_eq!(harness.audited().await.len(), 2);
}

#[tokio::test]
async fn last_event_watermark_keeps_events_sharing_a_timestamp() {
    let config = DispatcherConfig {
        batch_size: 2,
        watermark_mode: WatermarkMode::LastEvent,
        ..DispatcherConfig::default()
    };
    let (harness, start) = meta_harness(config, RecordingAdapter::default()).await;
    let tied_at = start + TimeDelta::seconds(1);
    {
        let mut events = harness.source.events.lock().await;
        for path in ["/a", "/b", "/c"] {
            events.push(relay_event(
                "page_view",
                "page",
                Some(path),
                json!({"path": path}),
                tied_at,
            ));
        }
    }

    let first = harness.dispatcher.tick().await.unwrap_or_default();
    let second = harness.dispatcher.tick().await.unwrap_or_default();
    let third = harness.dispatcher.tick().await.unwrap_or_default();

    assert_eq!(first.fetched, 2);
    assert_eq!(second.fetched, 1);
    assert_eq!(third.fetched, 0);
    assert_eq!(harness.dispatcher.watermark().await, tied_at);

    let mut audited: Vec<_> = harness
        .audited()
        .await
        .iter()
        .map(DispatchAuditLogEntry::event_id)
        .collect();
    let mut expected: Vec<_> = harness
        .source
        .events
        .lock()
        .await
        .iter()
        .map(|event| event.id)
        .collect();
    audited.sort();
    expected.sort();
    assert_eq!(audited, expected);
}

#[tokio::test]
async fn slow_adapter_does_not_block_the_tick() {
    let gate = Arc::new(Notify::new());
    let adapter = RecordingAdapter {
        gate: Some(gate.clone()),
        ..RecordingAdapter::default()
    };
    let (harness, start) = meta_harness(DispatcherConfig::default(), adapter).await;
    harness
        .source
        .events
        .lock()
        .await
        .push(purchase_event(start + TimeDelta::seconds(1)));

    let report = tokio::time::timeout(Duration::from_secs(1), harness.dispatcher.tick()).await;

    assert!(report.is_ok());
    assert_eq!(harness.dispatcher.in_flight(), 1);

    let drained = harness.dispatcher.delivery_pool.drain(Duration::from_millis(20)).await;
    assert_eq!(drained.abandoned, 1);
    assert!(harness.adapter.sent.lock().await.is_empty());
}

#[tokio::test]
async fn started_dispatcher_delivers_and_stops_cleanly() {
    let config = DispatcherConfig {
        poll_interval: Duration::from_millis(10),
        ..DispatcherConfig::default()
    };
    let (harness, start) = meta_harness(config, RecordingAdapter::default()).await;
    harness
        .source
        .events
        .lock()
        .await
        .push(purchase_event(start + TimeDelta::seconds(1)));
    let shutdown = ShutdownSignal::new();

    let handle = harness.dispatcher.start(shutdown.listener());
    let delivered = tokio::time::timeout(Duration::from_secs(2), async {
        while harness.adapter.sent.lock().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    let drained = handle.stop(Duration::from_secs(1)).await;

    assert!(delivered.is_ok());
    assert_eq!(drained.abandoned, 0);
    assert_eq!(harness.audited().await.len(), 1);
}

#[test]
fn watermark_mode_parses_configuration_values() {
    assert_eq!("poll_time".parse::<WatermarkMode>().ok(), Some(WatermarkMode::PollTime));
    assert_eq!("last_event".parse::<WatermarkMode>().ok(), Some(WatermarkMode::LastEvent));
    assert!("newest".parse::<WatermarkMode>().is_err());
}
