//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_audit_sink;
mod in_memory_event_source;
mod in_memory_integration_config_repository;
mod platform_adapter;
mod postgres_audit_sink;
mod postgres_event_source;
mod postgres_integration_config_repository;
mod reqwest_outbound_http_client;

pub use in_memory_audit_sink::InMemoryAuditSink;
pub use in_memory_event_source::InMemoryEventSource;
pub use in_memory_integration_config_repository::InMemoryIntegrationConfigRepository;
pub use platform_adapter::{
    AdapterContext, ConversionAdapter, Ga4Protocol, MetaProtocol, PlatformEndpoints,
    PlatformProtocol, TikTokProtocol, build_adapter_manager,
};
pub use postgres_audit_sink::PostgresAuditSink;
pub use postgres_event_source::PostgresEventSource;
pub use postgres_integration_config_repository::PostgresIntegrationConfigRepository;
pub use reqwest_outbound_http_client::ReqwestOutboundHttpClient;
