//! Pixelrelay event relay worker.

#![forbid(unsafe_code)]

mod worker_config;

use std::sync::Arc;
use std::time::Duration;

use pixelrelay_application::{
    AuditLogger, Dispatcher, ErrorTracker, IntegrationRegistry, LiveControls, RulesEngine,
    ShutdownSignal,
};
use pixelrelay_core::{AppError, AppResult};
use pixelrelay_infrastructure::{
    AdapterContext, PostgresAuditSink, PostgresEventSource, PostgresIntegrationConfigRepository,
    ReqwestOutboundHttpClient, build_adapter_manager,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::worker_config::WorkerConfig;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    let shutdown = ShutdownSignal::new();

    let registry = Arc::new(IntegrationRegistry::new(Arc::new(
        PostgresIntegrationConfigRepository::new(pool.clone()),
    )));
    registry.refresh_or_keep_previous().await;

    let rules_engine = Arc::new(RulesEngine::new(registry.clone(), config.rules_config()));
    let audit_logger = Arc::new(AuditLogger::new(
        Arc::new(PostgresAuditSink::new(pool.clone())),
        config.audit_max_entries,
    ));
    let live_controls = Arc::new(LiveControls::new(config.live_controls.clone()));
    let error_tracker = Arc::new(ErrorTracker::new(
        Duration::from_secs(config.error_window_seconds),
        config.error_threshold,
    ));
    let http_client = Arc::new(ReqwestOutboundHttpClient::new(
        Duration::from_millis(config.http_timeout_ms),
        Duration::from_millis(config.http_retry_delay_ms),
    )?);

    let adapter_manager = Arc::new(build_adapter_manager(
        &AdapterContext {
            registry: registry.clone(),
            live_controls: live_controls.clone(),
            error_tracker: error_tracker.clone(),
            http_client,
        },
        &config.endpoints,
    ));
    let registered: Vec<&str> = adapter_manager
        .registered_types()
        .into_iter()
        .map(|integration_type| integration_type.as_str())
        .collect();

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(PostgresEventSource::new(pool)),
        registry.clone(),
        rules_engine.clone(),
        audit_logger.clone(),
        adapter_manager,
        config.dispatcher_config(),
    ));

    let sweep_period = Duration::from_secs(config.sweep_seconds);
    let maintenance = vec![
        registry.spawn_refresh_loop(
            Duration::from_secs(config.registry_refresh_seconds),
            shutdown.listener(),
        ),
        rules_engine.spawn_sweeper(sweep_period, shutdown.listener()),
        error_tracker.spawn_sweeper(sweep_period, shutdown.listener()),
    ];
    let handle = dispatcher.start(shutdown.listener());

    let controls = live_controls.snapshot().await;
    info!(
        adapters = ?registered,
        live_enabled = controls.live_enabled,
        dry_run_default = controls.dry_run_default,
        poll_interval_ms = config.poll_interval_ms,
        batch_size = config.batch_size,
        "pixelrelay-worker started"
    );

    wait_for_shutdown_signal().await;

    let drained = handle
        .stop(Duration::from_secs(config.shutdown_grace_seconds))
        .await;
    audit_logger.flush().await;
    shutdown.trigger();
    for task in maintenance {
        if let Err(error) = task.await {
            warn!(error = %error, "maintenance task ended abnormally");
        }
    }

    info!(
        completed = drained.completed,
        abandoned = drained.abandoned,
        "pixelrelay-worker stopped"
    );
    Ok(())
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(error = %error, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(error = %error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
