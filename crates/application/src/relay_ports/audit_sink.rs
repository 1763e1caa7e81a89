use async_trait::async_trait;
use pixelrelay_core::AppResult;
use pixelrelay_domain::DispatchAuditLogEntry;

/// Append-only external mirror of dispatch decisions.
///
/// Implementations must never update or delete previously appended entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends one decision record.
    async fn append(&self, entry: &DispatchAuditLogEntry) -> AppResult<()>;
}
