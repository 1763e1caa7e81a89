//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod decision_snapshot;
mod dispatch;
mod event;
mod event_kind;
mod integration;

pub use decision_snapshot::DecisionSnapshot;
pub use dispatch::{
    AdapterEvent, AdapterResult, DeliveryStatus, DispatchAuditLogEntry, DispatchDecision,
    SkipReason,
};
pub use event::{EventCursor, PayloadMap, RelayEvent};
pub use event_kind::{EventKind, sanitize_payload};
pub use integration::{CredentialBag, EventMap, Integration, IntegrationType};
