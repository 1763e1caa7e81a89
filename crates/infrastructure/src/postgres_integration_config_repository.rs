use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::warn;

use pixelrelay_application::IntegrationConfigRepository;
use pixelrelay_core::{AppError, AppResult, IntegrationId};
use pixelrelay_domain::{CredentialBag, EventMap, Integration, IntegrationType};

/// PostgreSQL-backed reader for integration and event-map configuration.
#[derive(Clone)]
pub struct PostgresIntegrationConfigRepository {
    pool: PgPool,
}

impl PostgresIntegrationConfigRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct IntegrationRow {
    id: uuid::Uuid,
    integration_type: String,
    name: String,
    is_active: bool,
    credentials: Json<Value>,
}

impl TryFrom<IntegrationRow> for Integration {
    type Error = AppError;

    fn try_from(row: IntegrationRow) -> Result<Self, Self::Error> {
        Integration::new(
            IntegrationId::from_uuid(row.id),
            IntegrationType::from_str(row.integration_type.as_str())?,
            row.name,
            row.is_active,
            CredentialBag::from_value(row.credentials.0)?,
        )
    }
}

#[derive(Debug, FromRow)]
struct EventMapRow {
    integration_id: uuid::Uuid,
    event_kind: String,
    external_name: String,
    is_enabled: bool,
}

impl TryFrom<EventMapRow> for EventMap {
    type Error = AppError;

    fn try_from(row: EventMapRow) -> Result<Self, Self::Error> {
        EventMap::new(
            IntegrationId::from_uuid(row.integration_id),
            row.event_kind,
            row.external_name,
            row.is_enabled,
        )
    }
}

#[async_trait]
impl IntegrationConfigRepository for PostgresIntegrationConfigRepository {
    async fn list_integrations(&self) -> AppResult<Vec<Integration>> {
        let rows = sqlx::query_as::<_, IntegrationRow>(
            r#"
            SELECT id, integration_type, name, is_active, credentials
            FROM relay_integrations
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!("failed to list relay integrations: {error}"))
        })?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                Integration::try_from(row)
                    .inspect_err(|error| {
                        warn!(integration_id = %id, error = %error, "ignoring invalid integration row");
                    })
                    .ok()
            })
            .collect())
    }

    async fn list_event_maps(&self) -> AppResult<Vec<EventMap>> {
        let rows = sqlx::query_as::<_, EventMapRow>(
            r#"
            SELECT integration_id, event_kind, external_name, is_enabled
            FROM relay_event_maps
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!("failed to list relay event maps: {error}"))
        })?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let integration_id = row.integration_id;
                EventMap::try_from(row)
                    .inspect_err(|error| {
                        warn!(integration_id = %integration_id, error = %error, "ignoring invalid event map row");
                    })
                    .ok()
            })
            .collect())
    }
}
