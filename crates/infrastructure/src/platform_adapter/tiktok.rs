use pixelrelay_application::OutboundRequest;
use pixelrelay_core::{AppError, AppResult};
use pixelrelay_domain::{AdapterEvent, CredentialBag, IntegrationType};
use serde::Serialize;
use serde_json::{Map, Value, json};

use super::{PlatformProtocol, rename_fields};

const RENAMES: &[(&str, &str)] = &[
    ("total", "value"),
    ("orderId", "order_id"),
    ("productId", "content_id"),
    ("productName", "content_name"),
    ("category", "content_category"),
    ("cartId", "cart_id"),
    ("itemCount", "num_items"),
];

/// TikTok Events API.
#[derive(Debug, Clone, Copy, Default)]
pub struct TikTokProtocol;

#[derive(Debug, Serialize)]
struct TikTokTrackBody {
    event_source: &'static str,
    event_source_id: String,
    data: Vec<TikTokEvent>,
}

#[derive(Debug, Serialize)]
struct TikTokEvent {
    event: String,
    event_time: i64,
    event_id: String,
    user: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<Map<String, Value>>,
    properties: Map<String, Value>,
}

impl PlatformProtocol for TikTokProtocol {
    fn name(&self) -> &'static str {
        "tiktok_events_api"
    }

    fn integration_type(&self) -> IntegrationType {
        IntegrationType::TikTok
    }

    fn required_credentials(&self) -> &'static [&'static str] {
        &["pixel_code", "access_token"]
    }

    fn map_event(&self, event: &AdapterEvent) -> AppResult<Value> {
        let mut properties = rename_fields(&event.payload, RENAMES);

        let mut page = Map::new();
        for (field, target) in [("path", "url"), ("referrer", "referrer")] {
            if let Some(value) = properties.remove(field) {
                page.insert(target.to_owned(), value);
            }
        }

        let mut user = Map::new();
        if let Some(user_id) = &event.user_id {
            user.insert("external_id".to_owned(), json!(user_id));
        }

        // The pixel code is only known at send time.
        let body = TikTokTrackBody {
            event_source: "web",
            event_source_id: String::new(),
            data: vec![TikTokEvent {
                event: event.external_name.clone(),
                event_time: event.occurred_at.timestamp(),
                event_id: event.event_id.to_string(),
                user,
                page: (!page.is_empty()).then_some(page),
                properties,
            }],
        };

        serde_json::to_value(body)
            .map_err(|error| AppError::Internal(format!("failed to encode TikTok event: {error}")))
    }

    fn build_request(
        &self,
        base_url: &str,
        credentials: &CredentialBag,
        mut body: Value,
    ) -> AppResult<OutboundRequest> {
        let pixel_code = credentials
            .get_str("pixel_code")
            .ok_or_else(|| AppError::Validation("missing credential 'pixel_code'".to_owned()))?;
        let access_token = credentials
            .get_str("access_token")
            .ok_or_else(|| AppError::Validation("missing credential 'access_token'".to_owned()))?;

        if let Some(object) = body.as_object_mut() {
            object.insert("event_source_id".to_owned(), json!(pixel_code));
        }

        Ok(OutboundRequest::new(
            format!("{base_url}/open_api/v1.3/event/track/"),
            body,
        )
        .with_header("Access-Token", access_token))
    }
}
