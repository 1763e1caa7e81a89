use std::fmt::{Display, Formatter};
use std::str::FromStr;

use pixelrelay_core::{AppError, AppResult, IntegrationId, NonEmptyString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// External marketing platform an integration talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationType {
    /// Meta Conversions API.
    Meta,
    /// Google Analytics 4 Measurement Protocol.
    Ga4,
    /// TikTok Events API.
    TikTok,
}

impl IntegrationType {
    /// Returns a stable storage value for this integration type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meta => "meta",
            Self::Ga4 => "ga4",
            Self::TikTok => "tiktok",
        }
    }

    /// Returns all known integration types.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[IntegrationType] = &[
            IntegrationType::Meta,
            IntegrationType::Ga4,
            IntegrationType::TikTok,
        ];

        ALL
    }
}

impl Display for IntegrationType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for IntegrationType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "meta" => Ok(Self::Meta),
            "ga4" => Ok(Self::Ga4),
            "tiktok" => Ok(Self::TikTok),
            _ => Err(AppError::Validation(format!(
                "unknown integration type '{value}'"
            ))),
        }
    }
}

/// Opaque per-integration credentials as stored by the admin process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialBag(Map<String, Value>);

impl CredentialBag {
    /// Creates a credential bag from a JSON object.
    #[must_use]
    pub fn new(values: Map<String, Value>) -> Self {
        Self(values)
    }

    /// Creates a credential bag from a stored JSON value.
    ///
    /// Anything other than an object is rejected.
    pub fn from_value(value: Value) -> AppResult<Self> {
        match value {
            Value::Object(values) => Ok(Self(values)),
            Value::Null => Ok(Self::default()),
            other => Err(AppError::Validation(format!(
                "credentials must be a JSON object, got {other}"
            ))),
        }
    }

    /// Returns a non-blank string credential.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    /// Returns the keys from `required` that are missing or blank.
    #[must_use]
    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|key| self.get_str(key).is_none())
            .collect()
    }
}

/// A configured connection to one external platform.
#[derive(Debug, Clone, PartialEq)]
pub struct Integration {
    id: IntegrationId,
    integration_type: IntegrationType,
    name: NonEmptyString,
    is_active: bool,
    credentials: CredentialBag,
}

impl Integration {
    /// Creates a validated integration.
    pub fn new(
        id: IntegrationId,
        integration_type: IntegrationType,
        name: impl Into<String>,
        is_active: bool,
        credentials: CredentialBag,
    ) -> AppResult<Self> {
        Ok(Self {
            id,
            integration_type,
            name: NonEmptyString::new(name)?,
            is_active,
            credentials,
        })
    }

    /// Returns the integration identifier.
    #[must_use]
    pub fn id(&self) -> IntegrationId {
        self.id
    }

    /// Returns the platform type.
    #[must_use]
    pub fn integration_type(&self) -> IntegrationType {
        self.integration_type
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &NonEmptyString {
        &self.name
    }

    /// Returns whether the integration is switched on.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns the credential bag.
    #[must_use]
    pub fn credentials(&self) -> &CredentialBag {
        &self.credentials
    }
}

/// Binding of one internal event kind to one external event name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMap {
    integration_id: IntegrationId,
    event_kind: NonEmptyString,
    external_name: NonEmptyString,
    is_enabled: bool,
}

impl EventMap {
    /// Creates a validated event map.
    pub fn new(
        integration_id: IntegrationId,
        event_kind: impl Into<String>,
        external_name: impl Into<String>,
        is_enabled: bool,
    ) -> AppResult<Self> {
        Ok(Self {
            integration_id,
            event_kind: NonEmptyString::new(event_kind)?,
            external_name: NonEmptyString::new(external_name)?,
            is_enabled,
        })
    }

    /// Returns the owning integration.
    #[must_use]
    pub fn integration_id(&self) -> IntegrationId {
        self.integration_id
    }

    /// Returns the internal event kind.
    #[must_use]
    pub fn event_kind(&self) -> &str {
        self.event_kind.as_str()
    }

    /// Returns the event name sent to the platform.
    #[must_use]
    pub fn external_name(&self) -> &str {
        self.external_name.as_str()
    }

    /// Returns whether forwarding is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }
}
