//! Lookup table of platform adapters keyed by integration type.

use std::collections::HashMap;
use std::sync::Arc;

use pixelrelay_domain::{AdapterEvent, AdapterResult, DeliveryStatus, IntegrationType};
use tracing::{info, warn};

use crate::relay_ports::PlatformAdapter;

/// Registry of adapters built once at startup.
#[derive(Default)]
pub struct AdapterManager {
    adapters: HashMap<IntegrationType, Arc<dyn PlatformAdapter>>,
}

impl AdapterManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter, replacing any previous one for the same type.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.adapters.insert(adapter.integration_type(), adapter);
        self
    }

    /// Returns the adapter for one integration type.
    #[must_use]
    pub fn get(&self, integration_type: IntegrationType) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&integration_type).cloned()
    }

    /// Returns registered integration types in stable order.
    #[must_use]
    pub fn registered_types(&self) -> Vec<IntegrationType> {
        let mut types: Vec<IntegrationType> = self.adapters.keys().copied().collect();
        types.sort();
        types
    }

    /// Sends one event through the matching adapter and logs the outcome.
    pub async fn dispatch(&self, event: AdapterEvent) -> AdapterResult {
        let Some(adapter) = self.get(event.integration_type) else {
            warn!(
                event_id = %event.event_id,
                integration_type = %event.integration_type,
                "no adapter registered for integration type"
            );
            return AdapterResult::failed(
                format!("no adapter registered for '{}'", event.integration_type),
                None,
            );
        };

        let result = adapter.send(&event).await;
        match result.status {
            DeliveryStatus::Sent | DeliveryStatus::Skipped => info!(
                adapter = adapter.name(),
                event_id = %event.event_id,
                integration_id = %event.integration_id,
                external_name = %event.external_name,
                status = %result.status,
                dry_run = result.dry_run,
                reason = result.skip_reason.map(|reason| reason.as_str()),
                "adapter send finished"
            ),
            DeliveryStatus::Failed => warn!(
                adapter = adapter.name(),
                event_id = %event.event_id,
                integration_id = %event.integration_id,
                external_name = %event.external_name,
                error = result.error.as_deref().unwrap_or("unknown"),
                "adapter send failed"
            ),
        }

        result
    }
}
