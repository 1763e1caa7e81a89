use async_trait::async_trait;
use pixelrelay_domain::{AdapterEvent, AdapterResult, IntegrationType};

/// Port implemented once per external platform type.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Returns the adapter name used in logs.
    fn name(&self) -> &str;

    /// Returns the platform type this adapter serves.
    fn integration_type(&self) -> IntegrationType;

    /// Returns whether the adapter's feature flag is on.
    async fn is_enabled(&self) -> bool;

    /// Sends one sanitized event. Never returns an error; failures are
    /// reported through [`AdapterResult`].
    async fn send(&self, event: &AdapterEvent) -> AdapterResult;
}
