//! Application services and ports.

#![forbid(unsafe_code)]

mod adapter_manager;
mod audit_logger;
mod dispatcher;
mod error_tracker;
mod integration_registry;
mod live_controls;
mod relay_ports;
mod rules_engine;
mod shutdown;

#[cfg(test)]
mod test_support;

pub use adapter_manager::AdapterManager;
pub use audit_logger::{AuditLogger, build_decision_snapshot};
pub use dispatcher::{
    DeliveryPool, Dispatcher, DispatcherConfig, DispatcherHandle, DrainReport, TickReport,
    WatermarkMode,
};
pub use error_tracker::ErrorTracker;
pub use integration_registry::IntegrationRegistry;
pub use live_controls::{LiveControlState, LiveControls};
pub use relay_ports::{
    AuditSink, EventSource, IntegrationConfigRepository, OutboundHttpClient, OutboundRequest,
    OutboundResponse, PlatformAdapter,
};
pub use rules_engine::{
    DedupCache, DedupKey, FixedWindowRateLimiter, RuleEvaluation, RulesConfig, RulesEngine,
};
pub use shutdown::{ShutdownListener, ShutdownSignal, spawn_periodic};
