mod audit_sink;
mod event_source;
mod integration_config;
mod outbound_http;
mod platform_adapter;

pub use audit_sink::AuditSink;
pub use event_source::EventSource;
pub use integration_config::IntegrationConfigRepository;
pub use outbound_http::{OutboundHttpClient, OutboundRequest, OutboundResponse};
pub use platform_adapter::PlatformAdapter;
