use async_trait::async_trait;
use pixelrelay_core::AppResult;
use pixelrelay_domain::{EventCursor, RelayEvent};

/// Read-only port over the upstream event log.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Returns events strictly after `cursor` in `(created_at, id)` order,
    /// capped at `limit`.
    async fn fetch_events_after(
        &self,
        cursor: EventCursor,
        limit: usize,
    ) -> AppResult<Vec<RelayEvent>>;
}
