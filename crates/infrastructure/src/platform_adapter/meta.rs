use pixelrelay_application::OutboundRequest;
use pixelrelay_core::{AppError, AppResult};
use pixelrelay_domain::{AdapterEvent, CredentialBag, IntegrationType};
use serde::Serialize;
use serde_json::{Map, Value, json};

use super::{PlatformProtocol, rename_fields};

const GRAPH_API_VERSION: &str = "v18.0";

const RENAMES: &[(&str, &str)] = &[
    ("total", "value"),
    ("price", "value"),
    ("orderId", "order_id"),
    ("productName", "content_name"),
    ("category", "content_category"),
    ("quantity", "num_items"),
    ("itemCount", "num_items"),
    ("cartId", "cart_id"),
    ("path", "page_path"),
    ("title", "page_title"),
    ("referrer", "referrer_url"),
];

/// Meta Conversions API.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetaProtocol;

#[derive(Debug, Serialize)]
struct MetaEventsBody {
    data: Vec<MetaServerEvent>,
}

#[derive(Debug, Serialize)]
struct MetaServerEvent {
    event_name: String,
    event_time: i64,
    event_id: String,
    action_source: &'static str,
    user_data: Map<String, Value>,
    custom_data: Map<String, Value>,
}

impl PlatformProtocol for MetaProtocol {
    fn name(&self) -> &'static str {
        "meta_conversions_api"
    }

    fn integration_type(&self) -> IntegrationType {
        IntegrationType::Meta
    }

    fn required_credentials(&self) -> &'static [&'static str] {
        &["pixel_id", "access_token"]
    }

    fn map_event(&self, event: &AdapterEvent) -> AppResult<Value> {
        let mut custom_data = rename_fields(&event.payload, RENAMES);
        if let Some(product_id) = custom_data.remove("productId") {
            custom_data.insert("content_ids".to_owned(), json!([product_id]));
            custom_data.insert("content_type".to_owned(), json!("product"));
        }

        let mut user_data = Map::new();
        if let Some(user_id) = &event.user_id {
            user_data.insert("external_id".to_owned(), json!(user_id));
        }

        let body = MetaEventsBody {
            data: vec![MetaServerEvent {
                event_name: event.external_name.clone(),
                event_time: event.occurred_at.timestamp(),
                event_id: event.event_id.to_string(),
                action_source: "website",
                user_data,
                custom_data,
            }],
        };

        serde_json::to_value(body)
            .map_err(|error| AppError::Internal(format!("failed to encode Meta event: {error}")))
    }

    fn build_request(
        &self,
        base_url: &str,
        credentials: &CredentialBag,
        body: Value,
    ) -> AppResult<OutboundRequest> {
        let pixel_id = required(credentials, "pixel_id")?;
        let access_token = required(credentials, "access_token")?;

        Ok(OutboundRequest::new(
            format!("{base_url}/{GRAPH_API_VERSION}/{pixel_id}/events"),
            body,
        )
        .with_header("Authorization", format!("Bearer {access_token}")))
    }
}

fn required<'a>(credentials: &'a CredentialBag, key: &str) -> AppResult<&'a str> {
    credentials
        .get_str(key)
        .ok_or_else(|| AppError::Validation(format!("missing credential '{key}'")))
}
