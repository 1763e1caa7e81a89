use async_trait::async_trait;
use pixelrelay_application::AuditSink;
use pixelrelay_core::AppResult;
use pixelrelay_domain::DispatchAuditLogEntry;
use tokio::sync::RwLock;

/// Unbounded in-memory audit sink.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    entries: RwLock<Vec<DispatchAuditLogEntry>>,
}

impl InMemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every appended entry in write order.
    pub async fn entries(&self) -> Vec<DispatchAuditLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, entry: &DispatchAuditLogEntry) -> AppResult<()> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }
}
