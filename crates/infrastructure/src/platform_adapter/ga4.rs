use pixelrelay_application::OutboundRequest;
use pixelrelay_core::{AppError, AppResult};
use pixelrelay_domain::{AdapterEvent, CredentialBag, IntegrationType};
use serde::Serialize;
use serde_json::{Map, Value, json};

use super::{PlatformProtocol, rename_fields};

const RENAMES: &[(&str, &str)] = &[
    ("total", "value"),
    ("orderId", "transaction_id"),
    ("productId", "item_id"),
    ("productName", "item_name"),
    ("category", "item_category"),
    ("cartId", "cart_id"),
    ("itemCount", "items_count"),
    ("path", "page_location"),
    ("title", "page_title"),
    ("referrer", "page_referrer"),
];

/// GA4 Measurement Protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ga4Protocol;

#[derive(Debug, Serialize)]
struct Ga4CollectBody {
    client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    timestamp_micros: i64,
    events: Vec<Ga4Event>,
}

#[derive(Debug, Serialize)]
struct Ga4Event {
    name: String,
    params: Map<String, Value>,
}

impl PlatformProtocol for Ga4Protocol {
    fn name(&self) -> &'static str {
        "ga4_measurement_protocol"
    }

    fn integration_type(&self) -> IntegrationType {
        IntegrationType::Ga4
    }

    fn required_credentials(&self) -> &'static [&'static str] {
        &["measurement_id", "api_secret"]
    }

    fn map_event(&self, event: &AdapterEvent) -> AppResult<Value> {
        let mut params = rename_fields(&event.payload, RENAMES);
        if let Some(session_id) = &event.session_id {
            params.insert("session_id".to_owned(), json!(session_id));
        }

        let body = Ga4CollectBody {
            client_id: event
                .session_id
                .clone()
                .unwrap_or_else(|| event.event_id.to_string()),
            user_id: event.user_id.clone(),
            timestamp_micros: event.occurred_at.timestamp_micros(),
            events: vec![Ga4Event {
                name: event.external_name.clone(),
                params,
            }],
        };

        serde_json::to_value(body)
            .map_err(|error| AppError::Internal(format!("failed to encode GA4 event: {error}")))
    }

    fn build_request(
        &self,
        base_url: &str,
        credentials: &CredentialBag,
        body: Value,
    ) -> AppResult<OutboundRequest> {
        let measurement_id = credentials.get_str("measurement_id").ok_or_else(|| {
            AppError::Validation("missing credential 'measurement_id'".to_owned())
        })?;
        let api_secret = credentials
            .get_str("api_secret")
            .ok_or_else(|| AppError::Validation("missing credential 'api_secret'".to_owned()))?;

        let url = reqwest::Url::parse_with_params(
            format!("{base_url}/mp/collect").as_str(),
            &[("measurement_id", measurement_id), ("api_secret", api_secret)],
        )
        .map_err(|error| AppError::Validation(format!("invalid GA4 endpoint: {error}")))?;

        Ok(OutboundRequest::new(url.to_string(), body))
    }
}
