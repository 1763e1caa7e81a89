use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dispatch::{DispatchAuditLogEntry, DispatchDecision, SkipReason};

/// Operator-facing explanation of one audit entry.
///
/// Derived on demand and never written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionSnapshot {
    /// Stable name of the rule that decided the outcome.
    pub rule_name: String,
    /// One-sentence human-readable explanation.
    pub explanation: String,
    /// Flat context useful when reading the explanation.
    pub metadata: BTreeMap<String, String>,
}

impl DecisionSnapshot {
    /// Builds a snapshot for `entry`. Pure: performs no I/O.
    #[must_use]
    pub fn build(
        entry: &DispatchAuditLogEntry,
        event_kind: &str,
        entity_type: &str,
        entity_id: Option<&str>,
    ) -> Self {
        let (rule_name, explanation) = match (entry.decision(), entry.reason()) {
            (DispatchDecision::Allow, _) => (
                "all_rules_passed",
                format!(
                    "'{event_kind}' passed dedup, rate limit and enablement checks and was handed to the {} adapter with a sanitized payload",
                    entry.integration_type()
                ),
            ),
            (DispatchDecision::Skip, Some(reason)) => skip_explanation(reason, entry, event_kind),
            (DispatchDecision::Skip, None) => (
                "unknown",
                format!("'{event_kind}' was skipped without a recorded reason"),
            ),
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("event_id".to_owned(), entry.event_id().to_string());
        metadata.insert("event_kind".to_owned(), event_kind.to_owned());
        metadata.insert("entity_type".to_owned(), entity_type.to_owned());
        if let Some(entity_id) = entity_id {
            metadata.insert("entity_id".to_owned(), entity_id.to_owned());
        }
        metadata.insert(
            "integration_id".to_owned(),
            entry.integration_id().to_string(),
        );
        metadata.insert(
            "integration_type".to_owned(),
            entry.integration_type().to_string(),
        );
        metadata.insert("decision".to_owned(), entry.decision().to_string());
        if let Some(reason) = entry.reason() {
            metadata.insert("reason".to_owned(), reason.to_string());
        }
        metadata.insert("decided_at".to_owned(), entry.decided_at().to_rfc3339());

        Self {
            rule_name: rule_name.to_owned(),
            explanation,
            metadata,
        }
    }
}

fn skip_explanation(
    reason: SkipReason,
    entry: &DispatchAuditLogEntry,
    event_kind: &str,
) -> (&'static str, String) {
    let integration_type = entry.integration_type();
    match reason {
        SkipReason::DedupWindow => (
            "dedup_window",
            format!(
                "the same '{event_kind}' for this entity and session was already evaluated for the {integration_type} integration inside the dedup window"
            ),
        ),
        SkipReason::RateLimit => (
            "rate_limit",
            format!(
                "the {integration_type} integration used up its send budget for the current rate-limit window"
            ),
        ),
        SkipReason::IntegrationDisabled => (
            "integration_enabled",
            format!("the {integration_type} integration is marked inactive"),
        ),
        SkipReason::EventDisabled => (
            "event_enabled",
            format!(
                "the {integration_type} integration has no enabled mapping for '{event_kind}'"
            ),
        ),
        SkipReason::NoEventMapping => (
            "event_mapping",
            format!(
                "the mapping for '{event_kind}' disappeared from the {integration_type} integration before dispatch"
            ),
        ),
        SkipReason::AdapterFeatureDisabled => (
            "adapter_feature_flag",
            format!("the {integration_type} adapter is switched off"),
        ),
        SkipReason::ErrorSpikeBreaker => (
            "error_spike_breaker",
            format!(
                "sends to {integration_type} are suspended after too many recent failures"
            ),
        ),
        SkipReason::NotInLiveAllowlist => (
            "live_allowlist",
            format!("'{event_kind}' is not on the live-traffic allowlist"),
        ),
    }
}
