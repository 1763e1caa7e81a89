use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use pixelrelay_application::EventSource;
use pixelrelay_core::{AppError, AppResult, EventId};
use pixelrelay_domain::{EventCursor, RelayEvent};

/// PostgreSQL-backed reader over the upstream event log.
#[derive(Clone)]
pub struct PostgresEventSource {
    pool: PgPool,
}

impl PostgresEventSource {
    /// Creates a source with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RelayEventRow {
    id: uuid::Uuid,
    kind: String,
    entity_type: String,
    entity_id: Option<String>,
    payload: Json<Value>,
    source: String,
    session_id: Option<String>,
    user_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<RelayEventRow> for RelayEvent {
    fn from(row: RelayEventRow) -> Self {
        Self {
            id: EventId::from_uuid(row.id),
            kind: row.kind,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            payload: row.payload.0,
            source: row.source,
            session_id: row.session_id,
            user_id: row.user_id,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl EventSource for PostgresEventSource {
    async fn fetch_events_after(
        &self,
        cursor: EventCursor,
        limit: usize,
    ) -> AppResult<Vec<RelayEvent>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, RelayEventRow>(
            r#"
            SELECT
                id,
                kind,
                entity_type,
                entity_id,
                payload,
                source,
                session_id,
                user_id,
                created_at
            FROM relay_events
            WHERE created_at > $1
                OR (created_at = $1 AND id > $2)
            ORDER BY created_at ASC, id ASC
            LIMIT $3
            "#,
        )
        .bind(cursor.created_at)
        .bind(cursor.last_event_id.map(|event_id| event_id.as_uuid()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Unavailable(format!("failed to fetch relay events: {error}")))?;

        Ok(rows.into_iter().map(RelayEvent::from).collect())
    }
}
