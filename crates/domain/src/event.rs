use chrono::{DateTime, Utc};
use pixelrelay_core::{AppError, AppResult, EventId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Structured event payload keyed by field name.
pub type PayloadMap = Map<String, Value>;

/// One business event read from the upstream event log.
///
/// Events are never mutated by the relay; the dispatcher only advances its
/// read watermark past them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEvent {
    /// Event identifier.
    pub id: EventId,
    /// Internal event kind, e.g. `purchase`.
    pub kind: String,
    /// Subject entity type, e.g. `order`.
    pub entity_type: String,
    /// Subject entity identifier when the event has one.
    pub entity_id: Option<String>,
    /// Free-form payload as stored upstream.
    pub payload: Value,
    /// Originating product surface.
    pub source: String,
    /// Browser or app session identifier.
    pub session_id: Option<String>,
    /// Authenticated user identifier.
    pub user_id: Option<String>,
    /// Creation timestamp; the dispatcher watermark is compared against it.
    pub created_at: DateTime<Utc>,
}

impl RelayEvent {
    /// Returns the payload as an object, rejecting any other JSON shape.
    pub fn payload_object(&self) -> AppResult<&PayloadMap> {
        self.payload.as_object().ok_or_else(|| {
            AppError::Validation(format!(
                "event '{}' payload must be a JSON object",
                self.id
            ))
        })
    }
}

/// Read position in the event log.
///
/// Without an event id the cursor sits after every event created at
/// `created_at`; with one it sits right after that event in
/// `(created_at, id)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCursor {
    /// Creation timestamp the cursor points at.
    pub created_at: DateTime<Utc>,
    /// Last event consumed at `created_at`, if the cursor tracks one.
    pub last_event_id: Option<EventId>,
}

impl EventCursor {
    /// Cursor past everything created at or before `created_at`.
    #[must_use]
    pub fn at(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            last_event_id: None,
        }
    }

    /// Cursor right after `event`.
    #[must_use]
    pub fn after_event(event: &RelayEvent) -> Self {
        Self {
            created_at: event.created_at,
            last_event_id: Some(event.id),
        }
    }

    /// Returns whether `event` has not been consumed yet.
    #[must_use]
    pub fn precedes(&self, event: &RelayEvent) -> bool {
        match self.last_event_id {
            None => event.created_at > self.created_at,
            Some(last_event_id) => (event.created_at, event.id) > (self.created_at, last_event_id),
        }
    }
}
