//! Operator kill-switches read by adapters on every send.

use std::collections::{BTreeSet, HashMap};

use pixelrelay_domain::IntegrationType;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

/// Point-in-time copy of every live-traffic control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveControlState {
    /// Global switch; when off every adapter runs in dry-run.
    pub live_enabled: bool,
    /// Dry-run setting for integration types without an override.
    pub dry_run_default: bool,
    /// Per integration type dry-run overrides.
    pub dry_run_overrides: HashMap<IntegrationType, bool>,
    /// Event kinds allowed to go live; empty allows every kind.
    pub live_event_allowlist: BTreeSet<String>,
    /// Adapter feature flags; types not listed are enabled.
    pub adapter_enabled: HashMap<IntegrationType, bool>,
}

impl Default for LiveControlState {
    fn default() -> Self {
        Self {
            live_enabled: false,
            dry_run_default: true,
            dry_run_overrides: HashMap::new(),
            live_event_allowlist: BTreeSet::new(),
            adapter_enabled: HashMap::new(),
        }
    }
}

impl LiveControlState {
    /// Returns whether sends for `integration_type` must be simulated.
    #[must_use]
    pub fn is_dry_run(&self, integration_type: IntegrationType) -> bool {
        if !self.live_enabled {
            return true;
        }

        self.dry_run_overrides
            .get(&integration_type)
            .copied()
            .unwrap_or(self.dry_run_default)
    }

    /// Returns whether `event_kind` may be sent live.
    #[must_use]
    pub fn allows_live_event(&self, event_kind: &str) -> bool {
        self.live_event_allowlist.is_empty() || self.live_event_allowlist.contains(event_kind)
    }

    /// Returns the adapter feature flag for `integration_type`.
    #[must_use]
    pub fn is_adapter_enabled(&self, integration_type: IntegrationType) -> bool {
        self.adapter_enabled
            .get(&integration_type)
            .copied()
            .unwrap_or(true)
    }
}

/// Mutable holder for [`LiveControlState`].
#[derive(Debug, Default)]
pub struct LiveControls {
    state: RwLock<LiveControlState>,
}

impl LiveControls {
    /// Creates controls with an initial state.
    #[must_use]
    pub fn new(state: LiveControlState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Returns a fresh copy of every control.
    pub async fn snapshot(&self) -> LiveControlState {
        self.state.read().await.clone()
    }

    /// Flips the global live switch.
    pub async fn set_live_enabled(&self, live_enabled: bool) {
        self.state.write().await.live_enabled = live_enabled;
        info!(live_enabled, "live switch changed");
    }

    /// Sets the fallback dry-run mode.
    pub async fn set_dry_run_default(&self, dry_run: bool) {
        self.state.write().await.dry_run_default = dry_run;
        info!(dry_run, "dry-run default changed");
    }

    /// Sets or clears the dry-run override for one integration type.
    pub async fn set_dry_run_override(&self, integration_type: IntegrationType, dry_run: Option<bool>) {
        let mut state = self.state.write().await;
        match dry_run {
            Some(value) => {
                state.dry_run_overrides.insert(integration_type, value);
            }
            None => {
                state.dry_run_overrides.remove(&integration_type);
            }
        }
        info!(integration_type = %integration_type, dry_run = ?dry_run, "dry-run override changed");
    }

    /// Replaces the live allowlist.
    pub async fn set_live_event_allowlist<I, S>(&self, event_kinds: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowlist: BTreeSet<String> = event_kinds.into_iter().map(Into::into).collect();
        info!(allowlist = ?allowlist, "live allowlist changed");
        self.state.write().await.live_event_allowlist = allowlist;
    }

    /// Sets one adapter feature flag.
    pub async fn set_adapter_enabled(&self, integration_type: IntegrationType, enabled: bool) {
        self.state
            .write()
            .await
            .adapter_enabled
            .insert(integration_type, enabled);
        info!(integration_type = %integration_type, enabled, "adapter feature flag changed");
    }
}
