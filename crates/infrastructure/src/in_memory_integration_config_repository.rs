use std::collections::HashMap;

use async_trait::async_trait;
use pixelrelay_application::IntegrationConfigRepository;
use pixelrelay_core::{AppResult, IntegrationId};
use pixelrelay_domain::{EventMap, Integration};
use tokio::sync::RwLock;

/// In-memory integration configuration store.
#[derive(Debug, Default)]
pub struct InMemoryIntegrationConfigRepository {
    integrations: RwLock<HashMap<IntegrationId, Integration>>,
    event_maps: RwLock<HashMap<(IntegrationId, String), EventMap>>,
}

impl InMemoryIntegrationConfigRepository {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces one integration.
    pub async fn save_integration(&self, integration: Integration) {
        self.integrations
            .write()
            .await
            .insert(integration.id(), integration);
    }

    /// Inserts or replaces the event map for one (integration, event kind).
    pub async fn save_event_map(&self, event_map: EventMap) {
        let key = (
            event_map.integration_id(),
            event_map.event_kind().to_owned(),
        );
        self.event_maps.write().await.insert(key, event_map);
    }

    /// Removes one event map.
    pub async fn remove_event_map(&self, integration_id: IntegrationId, event_kind: &str) {
        self.event_maps
            .write()
            .await
            .remove(&(integration_id, event_kind.to_owned()));
    }
}

#[async_trait]
impl IntegrationConfigRepository for InMemoryIntegrationConfigRepository {
    async fn list_integrations(&self) -> AppResult<Vec<Integration>> {
        let mut values: Vec<Integration> =
            self.integrations.read().await.values().cloned().collect();
        values.sort_by_key(Integration::id);
        Ok(values)
    }

    async fn list_event_maps(&self) -> AppResult<Vec<EventMap>> {
        Ok(self.event_maps.read().await.values().cloned().collect())
    }
}
