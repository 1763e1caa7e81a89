use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use pixelrelay_core::{EventId, IntegrationId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::PayloadMap;
use crate::integration::IntegrationType;

/// Outcome of evaluating one (event, integration) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchDecision {
    /// The event may be handed to the platform adapter.
    Allow,
    /// The event is not forwarded; a [`SkipReason`] says why.
    Skip,
}

impl DispatchDecision {
    /// Returns a stable storage value for this decision.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Skip => "SKIP",
        }
    }
}

impl Display for DispatchDecision {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Policy reasons for not forwarding an event. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    /// Same logical event was already seen inside the dedup window.
    DedupWindow,
    /// The integration exhausted its rate-limit window.
    RateLimit,
    /// The integration is not active.
    IntegrationDisabled,
    /// No enabled event map exists for the event kind.
    EventDisabled,
    /// The platform adapter's feature flag is off.
    AdapterFeatureDisabled,
    /// Sends are suspended after an error spike.
    ErrorSpikeBreaker,
    /// Live traffic is restricted to an allowlist that excludes this kind.
    NotInLiveAllowlist,
    /// The event map vanished between evaluation and dispatch.
    NoEventMapping,
}

impl SkipReason {
    /// Returns a stable storage value for this reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DedupWindow => "DEDUP_WINDOW",
            Self::RateLimit => "RATE_LIMIT",
            Self::IntegrationDisabled => "INTEGRATION_DISABLED",
            Self::EventDisabled => "EVENT_DISABLED",
            Self::AdapterFeatureDisabled => "ADAPTER_FEATURE_DISABLED",
            Self::ErrorSpikeBreaker => "ERROR_SPIKE_BREAKER",
            Self::NotInLiveAllowlist => "NOT_IN_LIVE_ALLOWLIST",
            Self::NoEventMapping => "NO_EVENT_MAPPING",
        }
    }
}

impl Display for SkipReason {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Sanitized event prepared for one platform adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterEvent {
    /// Source event identifier.
    pub event_id: EventId,
    /// Internal event kind.
    pub event_kind: String,
    /// Event name resolved from the integration's event map.
    pub external_name: String,
    /// Subject entity type.
    pub entity_type: String,
    /// Subject entity identifier.
    pub entity_id: Option<String>,
    /// Whitelisted payload fields only.
    pub payload: PayloadMap,
    /// Session identifier.
    pub session_id: Option<String>,
    /// User identifier.
    pub user_id: Option<String>,
    /// Target integration.
    pub integration_id: IntegrationId,
    /// Target platform type.
    pub integration_type: IntegrationType,
    /// When the source event happened.
    pub occurred_at: DateTime<Utc>,
}

/// Delivery status reported by a platform adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    /// Delivered, or simulated in dry-run.
    Sent,
    /// Attempted and rejected, or not attempted because of a configuration fault.
    Failed,
    /// Not attempted because of an adapter-level policy.
    Skipped,
}

impl DeliveryStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
        }
    }
}

impl Display for DeliveryStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Result of one adapter send. Used for logging only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterResult {
    /// Delivery status.
    pub status: DeliveryStatus,
    /// Failure detail for [`DeliveryStatus::Failed`].
    pub error: Option<String>,
    /// Policy reason for [`DeliveryStatus::Skipped`].
    pub skip_reason: Option<SkipReason>,
    /// Whether the send was simulated.
    pub dry_run: bool,
    /// Platform payload that was sent or would have been sent.
    pub payload: Option<Value>,
    /// When the adapter finished.
    pub completed_at: DateTime<Utc>,
}

impl AdapterResult {
    /// Creates a sent result.
    #[must_use]
    pub fn sent(payload: Value, dry_run: bool) -> Self {
        Self {
            status: DeliveryStatus::Sent,
            error: None,
            skip_reason: None,
            dry_run,
            payload: Some(payload),
            completed_at: Utc::now(),
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failed(error: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            status: DeliveryStatus::Failed,
            error: Some(error.into()),
            skip_reason: None,
            dry_run: false,
            payload,
            completed_at: Utc::now(),
        }
    }

    /// Creates a skipped result.
    #[must_use]
    pub fn skipped(reason: SkipReason, dry_run: bool) -> Self {
        Self {
            status: DeliveryStatus::Skipped,
            error: None,
            skip_reason: Some(reason),
            dry_run,
            payload: None,
            completed_at: Utc::now(),
        }
    }
}

/// Immutable record of one dispatch decision.
///
/// Fields are private and there are no setters; entries are only ever
/// appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchAuditLogEntry {
    event_id: EventId,
    integration_id: IntegrationId,
    integration_type: IntegrationType,
    decision: DispatchDecision,
    reason: Option<SkipReason>,
    decided_at: DateTime<Utc>,
}

impl DispatchAuditLogEntry {
    /// Creates an entry stamped with `decided_at`.
    #[must_use]
    pub fn new(
        event_id: EventId,
        integration_id: IntegrationId,
        integration_type: IntegrationType,
        decision: DispatchDecision,
        reason: Option<SkipReason>,
        decided_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            integration_id,
            integration_type,
            decision,
            reason,
            decided_at,
        }
    }

    /// Returns the evaluated event.
    #[must_use]
    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Returns the evaluated integration.
    #[must_use]
    pub fn integration_id(&self) -> IntegrationId {
        self.integration_id
    }

    /// Returns the evaluated integration type.
    #[must_use]
    pub fn integration_type(&self) -> IntegrationType {
        self.integration_type
    }

    /// Returns the decision.
    #[must_use]
    pub fn decision(&self) -> DispatchDecision {
        self.decision
    }

    /// Returns the skip reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<SkipReason> {
        self.reason
    }

    /// Returns when the decision was made.
    #[must_use]
    pub fn decided_at(&self) -> DateTime<Utc> {
        self.decided_at
    }
}
