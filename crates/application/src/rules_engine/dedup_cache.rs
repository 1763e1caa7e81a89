use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use pixelrelay_core::IntegrationId;
use pixelrelay_domain::RelayEvent;
use tokio::sync::RwLock;

/// Identity of one logical event for one integration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    event_kind: String,
    entity_type: String,
    integration_id: IntegrationId,
    entity_id: Option<String>,
    session_id: Option<String>,
}

impl DedupKey {
    /// Builds the key for `event` sent to `integration_id`.
    #[must_use]
    pub fn for_event(event: &RelayEvent, integration_id: IntegrationId) -> Self {
        Self {
            event_kind: event.kind.clone(),
            entity_type: event.entity_type.clone(),
            integration_id,
            entity_id: event.entity_id.clone(),
            session_id: event.session_id.clone(),
        }
    }
}

/// TTL cache of first-seen times.
///
/// The window is anchored to the first occurrence; repeats inside the
/// window do not extend it.
pub struct DedupCache {
    ttl: TimeDelta,
    first_seen: RwLock<HashMap<DedupKey, DateTime<Utc>>>,
}

impl DedupCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(ttl: TimeDelta) -> Self {
        Self {
            ttl,
            first_seen: RwLock::new(HashMap::new()),
        }
    }

    /// Records `key` and returns whether it was already seen inside the window.
    pub async fn check_and_record(&self, key: DedupKey, now: DateTime<Utc>) -> bool {
        let mut first_seen = self.first_seen.write().await;
        match first_seen.get(&key) {
            Some(seen_at) if now - *seen_at < self.ttl => true,
            _ => {
                first_seen.insert(key, now);
                false
            }
        }
    }

    /// Drops expired keys and returns how many were removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let mut first_seen = self.first_seen.write().await;
        let before = first_seen.len();
        first_seen.retain(|_, seen_at| now - *seen_at < self.ttl);
        before - first_seen.len()
    }

    /// Returns the number of tracked keys.
    pub async fn len(&self) -> usize {
        self.first_seen.read().await.len()
    }

    /// Returns whether no keys are tracked.
    pub async fn is_empty(&self) -> bool {
        self.first_seen.read().await.is_empty()
    }
}
