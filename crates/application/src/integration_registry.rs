//! In-memory, periodically refreshed view of integration configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pixelrelay_core::{AppResult, IntegrationId};
use pixelrelay_domain::{EventMap, Integration};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::relay_ports::IntegrationConfigRepository;
use crate::shutdown::{ShutdownListener, spawn_periodic};

#[derive(Debug, Default)]
struct RegistrySnapshot {
    integrations: HashMap<IntegrationId, Integration>,
    event_maps: HashMap<(IntegrationId, String), EventMap>,
    loaded_at: Option<DateTime<Utc>>,
}

impl RegistrySnapshot {
    fn build(integrations: Vec<Integration>, event_maps: Vec<EventMap>) -> Self {
        let integrations = integrations
            .into_iter()
            .map(|integration| (integration.id(), integration))
            .collect();

        let mut indexed_maps: HashMap<(IntegrationId, String), EventMap> = HashMap::new();
        for event_map in event_maps {
            let key = (
                event_map.integration_id(),
                event_map.event_kind().to_owned(),
            );
            // An enabled duplicate always wins over a disabled one.
            if indexed_maps
                .get(&key)
                .is_some_and(|existing| existing.is_enabled() && !event_map.is_enabled())
            {
                continue;
            }
            indexed_maps.insert(key, event_map);
        }

        Self {
            integrations,
            event_maps: indexed_maps,
            loaded_at: Some(Utc::now()),
        }
    }
}

/// Read-mostly cache of integrations and their event maps.
///
/// Each refresh replaces the whole snapshot; readers only hold the lock long
/// enough to clone an `Arc`.
pub struct IntegrationRegistry {
    repository: Arc<dyn IntegrationConfigRepository>,
    snapshot: RwLock<Arc<RegistrySnapshot>>,
}

impl IntegrationRegistry {
    /// Creates an empty registry. Call [`Self::refresh`] before use.
    #[must_use]
    pub fn new(repository: Arc<dyn IntegrationConfigRepository>) -> Self {
        Self {
            repository,
            snapshot: RwLock::new(Arc::new(RegistrySnapshot::default())),
        }
    }

    /// Reloads integrations and event maps and swaps them in atomically.
    ///
    /// On error the previous snapshot stays in place.
    pub async fn refresh(&self) -> AppResult<()> {
        let integrations = self.repository.list_integrations().await?;
        let event_maps = self.repository.list_event_maps().await?;
        let next = Arc::new(RegistrySnapshot::build(integrations, event_maps));

        let integration_count = next.integrations.len();
        let event_map_count = next.event_maps.len();
        *self.snapshot.write().await = next;

        info!(
            integrations = integration_count,
            event_maps = event_map_count,
            "integration registry refreshed"
        );

        Ok(())
    }

    /// Refreshes and logs failures instead of returning them.
    pub async fn refresh_or_keep_previous(&self) {
        if let Err(error) = self.refresh().await {
            let loaded_at = self.loaded_at().await;
            warn!(
                error = %error,
                loaded_at = ?loaded_at,
                "integration registry refresh failed; serving previous snapshot"
            );
        }
    }

    /// Spawns the periodic refresh loop.
    pub fn spawn_refresh_loop(
        self: Arc<Self>,
        period: Duration,
        shutdown: ShutdownListener,
    ) -> JoinHandle<()> {
        spawn_periodic("registry_refresh", period, shutdown, move || {
            let registry = self.clone();
            async move { registry.refresh_or_keep_previous().await }
        })
    }

    async fn current(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Returns every integration whose active flag is set.
    pub async fn active_integrations(&self) -> Vec<Integration> {
        self.current()
            .await
            .integrations
            .values()
            .filter(|integration| integration.is_active())
            .cloned()
            .collect()
    }

    /// Returns one integration by id, active or not.
    pub async fn integration(&self, integration_id: IntegrationId) -> Option<Integration> {
        self.current()
            .await
            .integrations
            .get(&integration_id)
            .cloned()
    }

    /// Returns the event map for one integration and event kind.
    pub async fn event_map(
        &self,
        integration_id: IntegrationId,
        event_kind: &str,
    ) -> Option<EventMap> {
        self.current()
            .await
            .event_maps
            .get(&(integration_id, event_kind.to_owned()))
            .cloned()
    }

    /// Returns whether an enabled event map exists.
    pub async fn is_event_enabled(&self, integration_id: IntegrationId, event_kind: &str) -> bool {
        self.event_map(integration_id, event_kind)
            .await
            .is_some_and(|event_map| event_map.is_enabled())
    }

    /// Returns when the current snapshot was loaded.
    pub async fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.current().await.loaded_at
    }
}

#[cfg(test)]
mod tests;
