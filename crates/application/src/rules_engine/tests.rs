use chrono::{TimeDelta, Utc};
use pixelrelay_domain::{DispatchDecision, IntegrationType, PayloadMap, SkipReason};
use serde_json::{Value, json};

use super::{RulesConfig, RulesEngine};
use crate::test_support::{
    disabled_event_map, event_map, integration, purchase_event, registry_with, relay_event,
};

fn payload_of(event: &pixelrelay_domain::RelayEvent) -> PayloadMap {
    event.payload.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn purchase_is_allowed_with_whitelisted_payload() {
    let meta = integration(IntegrationType::Meta, true);
    let (_, registry) = registry_with(
        vec![meta.clone()],
        vec![event_map(&meta, "purchase", "Purchase")],
    )
    .await;
    let engine = RulesEngine::new(registry, RulesConfig::default());
    let event = purchase_event(Utc::now());

    let evaluation = engine.evaluate(&event, &payload_of(&event), &meta).await;

    assert_eq!(evaluation.decision, DispatchDecision::Allow);
    assert_eq!(evaluation.reason, None);
    assert_eq!(
        Value::Object(evaluation.sanitized_payload),
        json!({"orderId": "o-1", "total": 150000, "currency": "IDR"})
    );
}

#[tokio::test]
async fn repeat_inside_ttl_is_deduplicated_and_allowed_after_expiry() {
    let meta = integration(IntegrationType::Meta, true);
    let (_, registry) = registry_with(
        vec![meta.clone()],
        vec![event_map(&meta, "purchase", "Purchase")],
    )
    .await;
    let engine = RulesEngine::new(registry, RulesConfig::default());
    let event = purchase_event(Utc::now());
    let payload = payload_of(&event);
    let start = Utc::now();

    let first = engine.evaluate_at(&event, &payload, &meta, start).await;
    let second = engine
        .evaluate_at(&event, &payload, &meta, start + TimeDelta::seconds(1))
        .await;
    let after_ttl = engine
        .evaluate_at(&event, &payload, &meta, start + TimeDelta::seconds(61))
        .await;

    assert!(first.is_allowed());
    assert_eq!(second.reason, Some(SkipReason::DedupWindow));
    assert!(after_ttl.is_allowed());
}

#[tokio::test]
async fn dedup_window_is_anchored_to_first_occurrence() {
    let meta = integration(IntegrationType::Meta, true);
    let (_, registry) = registry_with(
        vec![meta.clone()],
        vec![event_map(&meta, "purchase", "Purchase")],
    )
    .await;
    let engine = RulesEngine::new(registry, RulesConfig::default());
    let event = purchase_event(Utc::now());
    let payload = payload_of(&event);
    let start = Utc::now();

    assert!(engine.evaluate_at(&event, &payload, &meta, start).await.is_allowed());
    let repeated = engine
        .evaluate_at(&event, &payload, &meta, start + TimeDelta::seconds(50))
        .await;
    let past_first_window = engine
        .evaluate_at(&event, &payload, &meta, start + TimeDelta::seconds(65))
        .await;

    assert_eq!(repeated.reason, Some(SkipReason::DedupWindow));
    assert!(past_first_window.is_allowed());
}

#[tokio::test]
async fn dedup_key_distinguishes_entities_and_integrations() {
    let meta = integration(IntegrationType::Meta, true);
    let ga4 = integration(IntegrationType::Ga4, true);
    let (_, registry) = registry_with(
        vec![meta.clone(), ga4.clone()],
        vec![
            event_map(&meta, "purchase", "Purchase"),
            event_map(&ga4, "purchase", "purchase"),
        ],
    )
    .await;
    let engine = RulesEngine::new(registry, RulesConfig::default());
    let now = Utc::now();
    let first = purchase_event(now);
    let other_order = relay_event(
        "purchase",
        "order",
        Some("o-2"),
        json!({"orderId": "o-2"}),
        now,
    );

    assert!(engine.evaluate_at(&first, &payload_of(&first), &meta, now).await.is_allowed());
    assert!(engine.evaluate_at(&first, &payload_of(&first), &ga4, now).await.is_allowed());
    assert!(
        engine
            .evaluate_at(&other_order, &payload_of(&other_order), &meta, now)
            .await
            .is_allowed()
    );
}

#[tokio::test]
async fn rate_limit_skips_past_budget_and_resets_next_window() {
    let meta = integration(IntegrationType::Meta, true);
    let (_, registry) = registry_with(
        vec![meta.clone()],
        vec![event_map(&meta, "page_view", "PageView")],
    )
    .await;
    let engine = RulesEngine::new(
        registry,
        RulesConfig {
            rate_limit_max: 3,
            ..RulesConfig::default()
        },
    );
    let start = Utc::now();

    let mut decisions = Vec::new();
    for index in 0..5 {
        let event = relay_event(
            "page_view",
            "page",
            Some(format!("p-{index}").as_str()),
            json!({"path": "/"}),
            start,
        );
        decisions.push(
            engine
                .evaluate_at(&event, &payload_of(&event), &meta, start)
                .await
                .reason,
        );
    }

    assert_eq!(
        decisions,
        vec![
            None,
            None,
            None,
            Some(SkipReason::RateLimit),
            Some(SkipReason::RateLimit)
        ]
    );

    let next_window = start + TimeDelta::seconds(60);
    assert_eq!(engine.remaining_tokens(&meta, next_window).await, 3);
    let event = relay_event("page_view", "page", Some("p-9"), json!({}), next_window);
    assert!(
        engine
            .evaluate_at(&event, &payload_of(&event), &meta, next_window)
            .await
            .is_allowed()
    );
}

#[tokio::test]
async fn inactive_integration_is_skipped_with_empty_payload() {
    let meta = integration(IntegrationType::Meta, false);
    let (_, registry) = registry_with(
        vec![meta.clone()],
        vec![event_map(&meta, "purchase", "Purchase")],
    )
    .await;
    let engine = RulesEngine::new(registry, RulesConfig::default());
    let event = purchase_event(Utc::now());

    let evaluation = engine.evaluate(&event, &payload_of(&event), &meta).await;

    assert_eq!(evaluation.decision, DispatchDecision::Skip);
    assert_eq!(evaluation.reason, Some(SkipReason::IntegrationDisabled));
    assert!(evaluation.sanitized_payload.is_empty());
}

#[tokio::test]
async fn disabled_or_missing_event_map_is_skipped() {
    let meta = integration(IntegrationType::Meta, true);
    let (_, registry) = registry_with(
        vec![meta.clone()],
        vec![disabled_event_map(&meta, "purchase")],
    )
    .await;
    let engine = RulesEngine::new(registry, RulesConfig::default());
    let now = Utc::now();
    let purchase = purchase_event(now);
    let sign_up = relay_event("sign_up", "user", Some("u-1"), json!({"method": "email"}), now);

    let disabled = engine.evaluate(&purchase, &payload_of(&purchase), &meta).await;
    let unmapped = engine.evaluate(&sign_up, &payload_of(&sign_up), &meta).await;

    assert_eq!(disabled.reason, Some(SkipReason::EventDisabled));
    assert!(disabled.sanitized_payload.is_empty());
    assert_eq!(unmapped.reason, Some(SkipReason::EventDisabled));
}

#[tokio::test]
async fn disabled_integration_still_consumes_rate_tokens() {
    let meta = integration(IntegrationType::Meta, false);
    let (_, registry) = registry_with(vec![meta.clone()], Vec::new()).await;
    let engine = RulesEngine::new(
        registry,
        RulesConfig {
            rate_limit_max: 2,
            ..RulesConfig::default()
        },
    );
    let now = Utc::now();

    for index in 0..2 {
        let event = relay_event("purchase", "order", Some(format!("o-{index}").as_str()), json!({}), now);
        let evaluation = engine.evaluate_at(&event, &payload_of(&event), &meta, now).await;
        assert_eq!(evaluation.reason, Some(SkipReason::IntegrationDisabled));
    }

    let event = relay_event("purchase", "order", Some("o-3"), json!({}), now);
    let evaluation = engine.evaluate_at(&event, &payload_of(&event), &meta, now).await;
    assert_eq!(evaluation.reason, Some(SkipReason::RateLimit));
}

#[tokio::test]
async fn sweep_evicts_expired_dedup_keys() {
    let meta = integration(IntegrationType::Meta, true);
    let (_, registry) = registry_with(
        vec![meta.clone()],
        vec![event_map(&meta, "purchase", "Purchase")],
    )
    .await;
    let engine = RulesEngine::new(registry, RulesConfig::default());
    let start = Utc::now();
    let event = purchase_event(start);

    let _ = engine.evaluate_at(&event, &payload_of(&event), &meta, start).await;
    assert_eq!(engine.dedup_entries().await, 1);

    engine.sweep(start + TimeDelta::seconds(30)).await;
    assert_eq!(engine.dedup_entries().await, 1);

    engine.sweep(start + TimeDelta::seconds(61)).await;
    assert_eq!(engine.dedup_entries().await, 0);
}
