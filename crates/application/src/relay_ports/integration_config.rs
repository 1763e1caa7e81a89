use async_trait::async_trait;
use pixelrelay_core::AppResult;
use pixelrelay_domain::{EventMap, Integration};

/// Read-only port over persisted integration configuration.
#[async_trait]
pub trait IntegrationConfigRepository: Send + Sync {
    /// Lists every integration, active or not.
    async fn list_integrations(&self) -> AppResult<Vec<Integration>>;

    /// Lists every event map across all integrations.
    async fn list_event_maps(&self) -> AppResult<Vec<EventMap>>;
}
