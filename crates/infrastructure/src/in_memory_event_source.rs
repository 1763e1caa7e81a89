use async_trait::async_trait;
use pixelrelay_application::EventSource;
use pixelrelay_core::AppResult;
use pixelrelay_domain::{EventCursor, RelayEvent};
use tokio::sync::RwLock;

/// In-memory event log for development and tests.
#[derive(Debug, Default)]
pub struct InMemoryEventSource {
    events: RwLock<Vec<RelayEvent>>,
}

impl InMemoryEventSource {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one event.
    pub async fn append(&self, event: RelayEvent) {
        self.events.write().await.push(event);
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    async fn fetch_events_after(
        &self,
        cursor: EventCursor,
        limit: usize,
    ) -> AppResult<Vec<RelayEvent>> {
        let events = self.events.read().await;
        let mut values: Vec<RelayEvent> = events
            .iter()
            .filter(|event| cursor.precedes(event))
            .cloned()
            .collect();
        values.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        values.truncate(limit);

        Ok(values)
    }
}
