use async_trait::async_trait;
use sqlx::PgPool;

use pixelrelay_application::AuditSink;
use pixelrelay_core::{AppError, AppResult};
use pixelrelay_domain::DispatchAuditLogEntry;

/// Append-only PostgreSQL mirror of dispatch decisions.
#[derive(Clone)]
pub struct PostgresAuditSink {
    pool: PgPool,
}

impl PostgresAuditSink {
    /// Creates a sink with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PostgresAuditSink {
    async fn append(&self, entry: &DispatchAuditLogEntry) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO relay_dispatch_audit_log (
                event_id,
                integration_id,
                integration_type,
                decision,
                reason,
                decided_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.event_id().as_uuid())
        .bind(entry.integration_id().as_uuid())
        .bind(entry.integration_type().as_str())
        .bind(entry.decision().as_str())
        .bind(entry.reason().map(|reason| reason.as_str()))
        .bind(entry.decided_at())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Unavailable(format!("failed to append dispatch audit entry: {error}"))
        })?;

        Ok(())
    }
}
