//! Fakes shared by service tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pixelrelay_core::{AppResult, EventId, IntegrationId};
use pixelrelay_domain::{
    CredentialBag, DispatchAuditLogEntry, EventCursor, EventMap, Integration, IntegrationType,
    RelayEvent,
};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::integration_registry::IntegrationRegistry;
use crate::relay_ports::{AuditSink, EventSource, IntegrationConfigRepository};

#[derive(Default)]
pub(crate) struct StaticConfigRepository {
    pub(crate) integrations: Mutex<Vec<Integration>>,
    pub(crate) event_maps: Mutex<Vec<EventMap>>,
}

#[async_trait]
impl IntegrationConfigRepository for StaticConfigRepository {
    async fn list_integrations(&self) -> AppResult<Vec<Integration>> {
        Ok(self.integrations.lock().await.clone())
    }

    async fn list_event_maps(&self) -> AppResult<Vec<EventMap>> {
        Ok(self.event_maps.lock().await.clone())
    }
}

#[derive(Default)]
pub(crate) struct RecordingAuditSink {
    pub(crate) entries: Mutex<Vec<DispatchAuditLogEntry>>,
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn append(&self, entry: &DispatchAuditLogEntry) -> AppResult<()> {
        self.entries.lock().await.push(entry.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct VecEventSource {
    pub(crate) events: Mutex<Vec<RelayEvent>>,
    pub(crate) fetches: Mutex<Vec<EventCursor>>,
}

#[async_trait]
impl EventSource for VecEventSource {
    async fn fetch_events_after(
        &self,
        cursor: EventCursor,
        limit: usize,
    ) -> AppResult<Vec<RelayEvent>> {
        self.fetches.lock().await.push(cursor);
        let mut events: Vec<RelayEvent> = self
            .events
            .lock()
            .await
            .iter()
            .filter(|event| cursor.precedes(event))
            .cloned()
            .collect();
        events.sort_by_key(|event| (event.created_at, event.id));
        events.truncate(limit);
        Ok(events)
    }
}

pub(crate) fn integration(
    integration_type: IntegrationType,
    is_active: bool,
) -> Integration {
    Integration::new(
        IntegrationId::new(),
        integration_type,
        format!("{integration_type} pixel"),
        is_active,
        CredentialBag::default(),
    )
    .unwrap_or_else(|_| unreachable!())
}

pub(crate) fn event_map(integration: &Integration, kind: &str, external_name: &str) -> EventMap {
    EventMap::new(integration.id(), kind, external_name, true).unwrap_or_else(|_| unreachable!())
}

pub(crate) fn disabled_event_map(integration: &Integration, kind: &str) -> EventMap {
    EventMap::new(integration.id(), kind, kind, false).unwrap_or_else(|_| unreachable!())
}

pub(crate) fn purchase_event(created_at: DateTime<Utc>) -> RelayEvent {
    relay_event(
        "purchase",
        "order",
        Some("o-1"),
        json!({"orderId": "o-1", "total": 150000, "currency": "IDR", "email": "buyer@example.com"}),
        created_at,
    )
}

pub(crate) fn relay_event(
    kind: &str,
    entity_type: &str,
    entity_id: Option<&str>,
    payload: Value,
    created_at: DateTime<Utc>,
) -> RelayEvent {
    RelayEvent {
        id: EventId::new(),
        kind: kind.to_owned(),
        entity_type: entity_type.to_owned(),
        entity_id: entity_id.map(str::to_owned),
        payload,
        source: "storefront".to_owned(),
        session_id: Some("sess-1".to_owned()),
        user_id: None,
        created_at,
    }
}

pub(crate) async fn registry_with(
    integrations: Vec<Integration>,
    event_maps: Vec<EventMap>,
) -> (Arc<StaticConfigRepository>, Arc<IntegrationRegistry>) {
    let repository = Arc::new(StaticConfigRepository::default());
    *repository.integrations.lock().await = integrations;
    *repository.event_maps.lock().await = event_maps;

    let registry = Arc::new(IntegrationRegistry::new(repository.clone()));
    assert!(registry.refresh().await.is_ok());

    (repository, registry)
}
