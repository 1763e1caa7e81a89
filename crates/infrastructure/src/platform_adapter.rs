//! Conversion-API adapters for the supported ad platforms.
//!
//! Every platform shares one send pipeline ([`ConversionAdapter`]); a
//! [`PlatformProtocol`] only describes the wire shape and endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use pixelrelay_application::{
    AdapterManager, ErrorTracker, IntegrationRegistry, LiveControls, OutboundHttpClient,
    OutboundRequest, PlatformAdapter,
};
use pixelrelay_core::AppResult;
use pixelrelay_domain::{
    AdapterEvent, AdapterResult, CredentialBag, IntegrationType, PayloadMap, SkipReason,
};
use serde_json::{Map, Value};
use tracing::{info, warn};

mod ga4;
mod meta;
mod tiktok;

pub use ga4::Ga4Protocol;
pub use meta::MetaProtocol;
pub use tiktok::TikTokProtocol;

const MAX_ERROR_BODY_CHARS: usize = 512;

/// Wire format and endpoint of one platform.
pub trait PlatformProtocol: Send + Sync + 'static {
    /// Adapter name used in logs.
    fn name(&self) -> &'static str;

    /// Platform served by this protocol.
    fn integration_type(&self) -> IntegrationType;

    /// Credential keys that must be present before a live call.
    fn required_credentials(&self) -> &'static [&'static str];

    /// Maps a sanitized event to the platform's request body.
    fn map_event(&self, event: &AdapterEvent) -> AppResult<Value>;

    /// Builds the outbound request for an already mapped body.
    fn build_request(
        &self,
        base_url: &str,
        credentials: &CredentialBag,
        body: Value,
    ) -> AppResult<OutboundRequest>;
}

/// Shared collaborators every adapter reads on each send.
#[derive(Clone)]
pub struct AdapterContext {
    /// Source of per-integration credentials.
    pub registry: Arc<IntegrationRegistry>,
    /// Operator kill-switches.
    pub live_controls: Arc<LiveControls>,
    /// Error-spike breaker.
    pub error_tracker: Arc<ErrorTracker>,
    /// Outbound transport.
    pub http_client: Arc<dyn OutboundHttpClient>,
}

/// Base URLs for each platform API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformEndpoints {
    /// Meta Graph API origin.
    pub meta: String,
    /// GA4 Measurement Protocol origin.
    pub ga4: String,
    /// TikTok Business API origin.
    pub tiktok: String,
}

impl Default for PlatformEndpoints {
    fn default() -> Self {
        Self {
            meta: "https://graph.facebook.com".to_owned(),
            ga4: "https://www.google-analytics.com".to_owned(),
            tiktok: "https://business-api.tiktok.com".to_owned(),
        }
    }
}

/// Builds the manager with one adapter per supported platform.
#[must_use]
pub fn build_adapter_manager(
    context: &AdapterContext,
    endpoints: &PlatformEndpoints,
) -> AdapterManager {
    AdapterManager::new()
        .with_adapter(Arc::new(ConversionAdapter::new(
            MetaProtocol,
            endpoints.meta.as_str(),
            context.clone(),
        )))
        .with_adapter(Arc::new(ConversionAdapter::new(
            Ga4Protocol,
            endpoints.ga4.as_str(),
            context.clone(),
        )))
        .with_adapter(Arc::new(ConversionAdapter::new(
            TikTokProtocol,
            endpoints.tiktok.as_str(),
            context.clone(),
        )))
}

/// Platform adapter applying kill-switches, dry-run and the error breaker
/// before any network call.
pub struct ConversionAdapter<P> {
    protocol: P,
    base_url: String,
    context: AdapterContext,
}

impl<P: PlatformProtocol> ConversionAdapter<P> {
    /// Creates an adapter for one platform.
    #[must_use]
    pub fn new(protocol: P, base_url: impl Into<String>, context: AdapterContext) -> Self {
        Self {
            protocol,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            context,
        }
    }

    async fn send_live(&self, event: &AdapterEvent, body: Value) -> AdapterResult {
        let integration_type = self.protocol.integration_type();
        let Some(integration) = self.context.registry.integration(event.integration_id).await
        else {
            return AdapterResult::failed(
                format!("integration '{}' is no longer configured", event.integration_id),
                Some(body),
            );
        };

        let missing = integration
            .credentials()
            .missing(self.protocol.required_credentials());
        if !missing.is_empty() {
            return AdapterResult::failed(
                format!("missing credentials: {}", missing.join(", ")),
                Some(body),
            );
        }

        let request = match self.protocol.build_request(
            self.base_url.as_str(),
            integration.credentials(),
            body.clone(),
        ) {
            Ok(request) => request,
            Err(error) => return AdapterResult::failed(error.to_string(), Some(body)),
        };

        match self.context.http_client.post_json(request).await {
            Ok(response) if response.is_success() => AdapterResult::sent(body, false),
            Ok(response) => {
                self.context.error_tracker.record_error(integration_type).await;
                AdapterResult::failed(
                    format!(
                        "platform responded with status {}: {}",
                        response.status,
                        truncate(response.body.as_str())
                    ),
                    Some(body),
                )
            }
            Err(error) => {
                self.context.error_tracker.record_error(integration_type).await;
                AdapterResult::failed(error.to_string(), Some(body))
            }
        }
    }
}

#[async_trait]
impl<P: PlatformProtocol> PlatformAdapter for ConversionAdapter<P> {
    fn name(&self) -> &str {
        self.protocol.name()
    }

    fn integration_type(&self) -> IntegrationType {
        self.protocol.integration_type()
    }

    async fn is_enabled(&self) -> bool {
        self.context
            .live_controls
            .snapshot()
            .await
            .is_adapter_enabled(self.protocol.integration_type())
    }

    async fn send(&self, event: &AdapterEvent) -> AdapterResult {
        let integration_type = self.protocol.integration_type();
        let controls = self.context.live_controls.snapshot().await;
        let dry_run = controls.is_dry_run(integration_type);

        if !controls.is_adapter_enabled(integration_type) {
            return AdapterResult::skipped(SkipReason::AdapterFeatureDisabled, dry_run);
        }

        if self.context.error_tracker.should_disable(integration_type).await {
            return AdapterResult::skipped(SkipReason::ErrorSpikeBreaker, dry_run);
        }

        if !dry_run && !controls.allows_live_event(event.event_kind.as_str()) {
            return AdapterResult::skipped(SkipReason::NotInLiveAllowlist, dry_run);
        }

        let body = match self.protocol.map_event(event) {
            Ok(body) => body,
            Err(error) => return AdapterResult::failed(error.to_string(), None),
        };

        if dry_run {
            info!(
                adapter = self.protocol.name(),
                event_id = %event.event_id,
                integration_id = %event.integration_id,
                payload = %body,
                "dry-run: platform call simulated"
            );
            return AdapterResult::sent(body, true);
        }

        let result = self.send_live(event, body).await;
        if let Some(error) = &result.error {
            warn!(
                adapter = self.protocol.name(),
                event_id = %event.event_id,
                integration_id = %event.integration_id,
                error = %error,
                "live platform call failed"
            );
        }
        result
    }
}

/// Copies `payload`, renaming keys found in `renames` and keeping the rest.
pub(crate) fn rename_fields(payload: &PayloadMap, renames: &[(&str, &str)]) -> Map<String, Value> {
    payload
        .iter()
        .map(|(key, value)| {
            let renamed = renames
                .iter()
                .find(|(from, _)| *from == key.as_str())
                .map_or(key.as_str(), |(_, to)| *to);
            (renamed.to_owned(), value.clone())
        })
        .collect()
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
