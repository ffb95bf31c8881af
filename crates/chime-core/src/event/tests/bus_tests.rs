// crates/chime-core/src/event/tests/bus_tests.rs
#![cfg(test)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::event::bus::{sync_event_callback, CommunicationBus};
use crate::event::error::EventSystemError;
use crate::event::types::{CommunicationEvent, EventType};
use crate::kernel::component::ManagerComponent;
use crate::messaging::bus::{sync_message_handler, MessageBus};
use crate::services::interface::{method_callable, ServiceInterface, ServiceMethod, ServiceType};
use crate::services::provider::ServiceProvider;
use crate::services::registry::ServiceRegistry;

fn counting_callback(counter: Arc<AtomicUsize>) -> crate::event::bus::EventCallback {
    sync_event_callback(move |_event| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

#[tokio::test]
async fn test_subscribe_publish_unsubscribe() {
    let bus = CommunicationBus::new();
    let hits = Arc::new(AtomicUsize::new(0));

    let sub_id = bus
        .subscribe("widget", EventType::ScheduleUpdated, counting_callback(hits.clone()), None)
        .await;

    let delivered = bus
        .publish_event(CommunicationEvent::new(
            EventType::ScheduleUpdated,
            "core",
            json!({"week": 32}),
        ))
        .await;
    assert_eq!(delivered, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // Unrelated event types do not reach the subscription.
    bus.publish_event(CommunicationEvent::new(EventType::ThemeChanged, "theme", json!({})))
        .await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    assert!(bus.unsubscribe(&sub_id).await);
    assert!(!bus.unsubscribe(&sub_id).await);
    bus.publish_event(CommunicationEvent::new(
        EventType::ScheduleUpdated,
        "core",
        json!({}),
    ))
    .await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_predicate_filter_narrows_delivery() {
    let bus = CommunicationBus::new();
    let hits = Arc::new(AtomicUsize::new(0));

    bus.subscribe(
        "widget",
        EventType::NotificationSent,
        counting_callback(hits.clone()),
        Some(Arc::new(|event: &CommunicationEvent| {
            event.payload["urgent"] == json!(true)
        })),
    )
    .await;

    bus.publish_event(CommunicationEvent::new(
        EventType::NotificationSent,
        "notify",
        json!({"urgent": false}),
    ))
    .await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    bus.publish_event(CommunicationEvent::new(
        EventType::NotificationSent,
        "notify",
        json!({"urgent": true}),
    ))
    .await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_target_allowlist_restricts_subscribers() {
    let bus = CommunicationBus::new();
    let widget_hits = Arc::new(AtomicUsize::new(0));
    let tray_hits = Arc::new(AtomicUsize::new(0));

    bus.subscribe("widget", EventType::ThemeChanged, counting_callback(widget_hits.clone()), None)
        .await;
    bus.subscribe("tray", EventType::ThemeChanged, counting_callback(tray_hits.clone()), None)
        .await;

    let delivered = bus
        .publish_event(
            CommunicationEvent::new(EventType::ThemeChanged, "theme", json!({}))
                .with_targets(vec!["widget".to_string()]),
        )
        .await;
    assert_eq!(delivered, 1);
    assert_eq!(widget_hits.load(Ordering::SeqCst), 1);
    assert_eq!(tray_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failing_callback_does_not_block_others() {
    let bus = CommunicationBus::new();
    let hits = Arc::new(AtomicUsize::new(0));

    bus.subscribe(
        "flaky",
        EventType::UserAction,
        sync_event_callback(|event| {
            Err(EventSystemError::CallbackFailed {
                event: event.event_type.name().to_string(),
                reason: "boom".to_string(),
            })
        }),
        None,
    )
    .await;
    bus.subscribe("steady", EventType::UserAction, counting_callback(hits.clone()), None)
        .await;

    let delivered = bus
        .publish_event(CommunicationEvent::new(EventType::UserAction, "ui", json!({})))
        .await;
    assert_eq!(delivered, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(bus.stats().snapshot().errors, 1);
}

#[tokio::test]
async fn test_unsubscribe_plugin_bulk_removal() {
    let bus = CommunicationBus::new();
    let hits = Arc::new(AtomicUsize::new(0));

    bus.subscribe("widget", EventType::ScheduleUpdated, counting_callback(hits.clone()), None)
        .await;
    bus.subscribe("widget", EventType::ThemeChanged, counting_callback(hits.clone()), None)
        .await;
    bus.subscribe("tray", EventType::ThemeChanged, counting_callback(hits.clone()), None)
        .await;

    assert_eq!(bus.unsubscribe_plugin("widget").await, 2);
    assert_eq!(bus.subscription_count().await, 1);
}

#[tokio::test]
async fn test_custom_events_reach_wildcard_subscribers() {
    let bus = CommunicationBus::new();
    let named_hits = Arc::new(AtomicUsize::new(0));
    let wildcard_hits = Arc::new(AtomicUsize::new(0));

    bus.subscribe(
        "a",
        EventType::Custom("lunch.menu".to_string()),
        counting_callback(named_hits.clone()),
        None,
    )
    .await;
    bus.subscribe("b", EventType::any_custom(), counting_callback(wildcard_hits.clone()), None)
        .await;

    bus.publish_event(CommunicationEvent::new(
        EventType::Custom("lunch.menu".to_string()),
        "cafeteria",
        json!({"soup": "pea"}),
    ))
    .await;
    assert_eq!(named_hits.load(Ordering::SeqCst), 1);
    assert_eq!(wildcard_hits.load(Ordering::SeqCst), 1);

    bus.publish_event(CommunicationEvent::new(
        EventType::Custom("dinner.menu".to_string()),
        "cafeteria",
        json!({}),
    ))
    .await;
    assert_eq!(named_hits.load(Ordering::SeqCst), 1);
    assert_eq!(wildcard_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_history_is_bounded() {
    let bus = CommunicationBus::new().with_max_history(3);
    for i in 0..5 {
        bus.publish_system_event(EventType::ScheduleUpdated, json!({ "i": i }), Vec::new())
            .await;
    }
    let recent = bus.recent_events(10).await;
    assert_eq!(recent.len(), 3);
    // Oldest entries were dropped; the newest survives at the back.
    assert_eq!(recent.last().unwrap().payload["i"], json!(4));
    assert_eq!(recent.first().unwrap().payload["i"], json!(2));
}

#[tokio::test]
async fn test_events_mirror_onto_message_bus() {
    let messages = Arc::new(MessageBus::new());
    messages.start().await.unwrap();
    let received = Arc::new(AtomicUsize::new(0));
    let received_cb = received.clone();
    messages
        .register_handler(
            "legacy_consumer",
            "event.*",
            sync_message_handler(move |message| {
                assert_eq!(message.topic, "event.theme.changed");
                assert_eq!(message.headers.get("origin").map(String::as_str), Some("settings"));
                received_cb.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            None,
            None,
        )
        .await;

    let bus = CommunicationBus::with_message_bus(Some(messages.clone()));
    bus.publish_event(
        CommunicationEvent::new(EventType::ThemeChanged, "theme", json!({"accent": "#336699"}))
            .with_metadata("origin", "settings"),
    )
    .await;

    for _ in 0..200 {
        if received.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(received.load(Ordering::SeqCst), 1);
    messages.stop().await.unwrap();
}

#[tokio::test]
async fn test_service_registry_notices_become_events() {
    let registry = ServiceRegistry::new();
    let bus = Arc::new(CommunicationBus::new());
    bus.bind_service_registry(&registry).await;

    let registered_hits = Arc::new(AtomicUsize::new(0));
    let unregistered_hits = Arc::new(AtomicUsize::new(0));
    bus.subscribe(
        "watcher",
        EventType::ServiceRegistered,
        counting_callback(registered_hits.clone()),
        None,
    )
    .await;
    bus.subscribe(
        "watcher",
        EventType::ServiceUnregistered,
        counting_callback(unregistered_hits.clone()),
        None,
    )
    .await;

    struct EchoProvider;
    #[async_trait::async_trait]
    impl ServiceProvider for EchoProvider {
        fn service_interface(&self) -> ServiceInterface {
            ServiceInterface::new("echo", "1.0.0", "echo_plugin", ServiceType::Utility).method(
                ServiceMethod::new("say", method_callable(|_args| async { Ok(json!("hi")) })),
            )
        }
    }

    registry.register_service(Arc::new(EchoProvider)).await.unwrap();
    registry.unregister_service("echo").await.unwrap();

    // Forwarding hops through a spawned task; give it a moment.
    for _ in 0..200 {
        if registered_hits.load(Ordering::SeqCst) == 1
            && unregistered_hits.load(Ordering::SeqCst) == 1
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(registered_hits.load(Ordering::SeqCst), 1);
    assert_eq!(unregistered_hits.load(Ordering::SeqCst), 1);
}
