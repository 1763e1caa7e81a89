use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pixelrelay_core::{AppError, AppResult, IntegrationId};
use pixelrelay_domain::{CredentialBag, EventMap, Integration, IntegrationType};
use tokio::sync::Mutex;

use super::IntegrationRegistry;
use crate::relay_ports::IntegrationConfigRepository;
use crate::shutdown::ShutdownSignal;

#[derive(Default)]
struct FakeConfigRepository {
    integrations: Mutex<Vec<Integration>>,
    event_maps: Mutex<Vec<EventMap>>,
    unavailable: AtomicBool,
}

#[async_trait]
impl IntegrationConfigRepository for FakeConfigRepository {
    async fn list_integrations(&self) -> AppResult<Vec<Integration>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable("config store offline".to_owned()));
        }
        Ok(self.integrations.lock().await.clone())
    }

    async fn list_event_maps(&self) -> AppResult<Vec<EventMap>> {
        Ok(self.event_maps.lock().await.clone())
    }
}

fn integration(id: IntegrationId, is_active: bool) -> Integration {
    Integration::new(
        id,
        IntegrationType::Meta,
        "Storefront pixel",
        is_active,
        CredentialBag::default(),
    )
    .unwrap_or_else(|_| unreachable!())
}

fn event_map(id: IntegrationId, kind: &str, is_enabled: bool) -> EventMap {
    EventMap::new(id, kind, "Purchase", is_enabled).unwrap_or_else(|_| unreachable!())
}

#[tokio::test]
async fn refresh_loads_active_integrations_and_event_maps() {
    let active_id = IntegrationId::new();
    let inactive_id = IntegrationId::new();
    let repository = Arc::new(FakeConfigRepository::default());
    *repository.integrations.lock().await =
        vec![integration(active_id, true), integration(inactive_id, false)];
    *repository.event_maps.lock().await = vec![
        event_map(active_id, "purchase", true),
        event_map(active_id, "page_view", false),
    ];

    let registry = IntegrationRegistry::new(repository);
    assert!(registry.refresh().await.is_ok());

    let active = registry.active_integrations().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id(), active_id);
    assert!(registry.integration(inactive_id).await.is_some());
    assert!(registry.is_event_enabled(active_id, "purchase").await);
    assert!(!registry.is_event_enabled(active_id, "page_view").await);
    assert!(!registry.is_event_enabled(active_id, "sign_up").await);
    assert!(registry.event_map(active_id, "page_view").await.is_some());
    assert!(registry.loaded_at().await.is_some());
}

#[tokio::test]
async fn failed_refresh_keeps_previous_snapshot() {
    let integration_id = IntegrationId::new();
    let repository = Arc::new(FakeConfigRepository::default());
    *repository.integrations.lock().await = vec![integration(integration_id, true)];

    let registry = IntegrationRegistry::new(repository.clone());
    assert!(registry.refresh().await.is_ok());

    repository.unavailable.store(true, Ordering::SeqCst);
    *repository.integrations.lock().await = Vec::new();
    assert!(registry.refresh().await.is_err());
    registry.refresh_or_keep_previous().await;

    assert_eq!(registry.active_integrations().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn refresh_loop_survives_failures_and_picks_up_recovery() {
    let first_id = IntegrationId::new();
    let repository = Arc::new(FakeConfigRepository::default());
    *repository.integrations.lock().await = vec![integration(first_id, true)];

    let registry = Arc::new(IntegrationRegistry::new(repository.clone()));
    assert!(registry.refresh().await.is_ok());

    repository.unavailable.store(true, Ordering::SeqCst);
    let shutdown = ShutdownSignal::new();
    let refresh_loop = registry
        .clone()
        .spawn_refresh_loop(Duration::from_millis(10), shutdown.listener());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(registry.active_integrations().await.len(), 1);

    repository
        .integrations
        .lock()
        .await
        .push(integration(IntegrationId::new(), true));
    repository.unavailable.store(false, Ordering::SeqCst);

    let recovered = tokio::time::timeout(Duration::from_secs(2), async {
        while registry.active_integrations().await.len() != 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    shutdown.trigger();
    assert!(refresh_loop.await.is_ok());
    assert!(recovered.is_ok());
}

#[tokio::test]
async fn refresh_replaces_event_maps_wholesale() {
    let integration_id = IntegrationId::new();
    let repository = Arc::new(FakeConfigRepository::default());
    *repository.integrations.lock().await = vec![integration(integration_id, true)];
    *repository.event_maps.lock().await = vec![event_map(integration_id, "purchase", true)];

    let registry = IntegrationRegistry::new(repository.clone());
    assert!(registry.refresh().await.is_ok());
    assert!(registry.is_event_enabled(integration_id, "purchase").await);

    *repository.event_maps.lock().await = vec![event_map(integration_id, "add_to_cart", true)];
    assert!(registry.refresh().await.is_ok());

    assert!(registry.event_map(integration_id, "purchase").await.is_none());
    assert!(registry.is_event_enabled(integration_id, "add_to_cart").await);
}

#[tokio::test]
async fn enabled_duplicate_event_map_wins() {
    let integration_id = IntegrationId::new();
    let repository = Arc::new(FakeConfigRepository::default());
    *repository.integrations.lock().await = vec![integration(integration_id, true)];
    *repository.event_maps.lock().await = vec![
        event_map(integration_id, "purchase", true),
        event_map(integration_id, "purchase", false),
    ];

    let registry = IntegrationRegistry::new(repository);
    assert!(registry.refresh().await.is_ok());

    assert!(registry.is_event_enabled(integration_id, "purchase").await);
}
