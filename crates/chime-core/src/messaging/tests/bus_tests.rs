// crates/chime-core/src/messaging/tests/bus_tests.rs
#![cfg(test)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use serde_json::json;

use crate::kernel::component::ManagerComponent;
use crate::messaging::bus::{sync_message_handler, MessageBus};
use crate::messaging::error::MessagingError;
use crate::messaging::message::{DeliveryMode, Message, MessagePriority, MessageType};

async fn started_bus() -> MessageBus {
    let bus = MessageBus::new();
    bus.start().await.unwrap();
    bus
}

/// Poll until the check passes; delivery happens on the background worker.
async fn eventually(check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within one second");
}

fn counting_handler(counter: Arc<AtomicUsize>) -> crate::messaging::bus::MessageHandlerFn {
    sync_message_handler(move |_message| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

#[tokio::test]
async fn test_wildcard_and_exact_topic_delivery() {
    let bus = started_bus().await;
    let wildcard_hits = Arc::new(AtomicUsize::new(0));
    let exact_hits = Arc::new(AtomicUsize::new(0));

    bus.register_handler("w", "orders.*", counting_handler(wildcard_hits.clone()), None, None)
        .await;
    bus.register_handler("e", "orders.created", counting_handler(exact_hits.clone()), None, None)
        .await;

    bus.send_message(Message::event("orders.created", "shop", json!({})))
        .await
        .unwrap();
    bus.send_message(Message::event("orders.updated", "shop", json!({})))
        .await
        .unwrap();
    bus.send_message(Message::event("billing.created", "shop", json!({})))
        .await
        .unwrap();

    eventually(|| wildcard_hits.load(Ordering::SeqCst) == 2).await;
    // The exact handler saw only orders.created.
    assert_eq!(exact_hits.load(Ordering::SeqCst), 1);

    bus.stop().await.unwrap();
}

#[tokio::test]
async fn test_priority_filter_gates_delivery() {
    let bus = started_bus().await;
    let hits = Arc::new(AtomicUsize::new(0));
    bus.register_handler(
        "alerts",
        "sys.*",
        counting_handler(hits.clone()),
        None,
        Some(MessagePriority::High),
    )
    .await;

    bus.send_message(
        Message::event("sys.alert", "kernel", json!({})).with_priority(MessagePriority::Critical),
    )
    .await
    .unwrap();
    eventually(|| hits.load(Ordering::SeqCst) == 1).await;

    // Low priority does not reach a High-filtered handler.
    bus.send_message(
        Message::event("sys.alert", "kernel", json!({})).with_priority(MessagePriority::Low),
    )
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    bus.stop().await.unwrap();
}

#[tokio::test]
async fn test_message_type_filter() {
    let bus = started_bus().await;
    let hits = Arc::new(AtomicUsize::new(0));
    bus.register_handler(
        "q",
        "*",
        counting_handler(hits.clone()),
        Some(MessageType::Query),
        None,
    )
    .await;

    bus.send_message(Message::new(MessageType::Query, "lookup", "a", json!({})))
        .await
        .unwrap();
    bus.send_message(Message::event("lookup", "a", json!({})))
        .await
        .unwrap();

    eventually(|| hits.load(Ordering::SeqCst) == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    bus.stop().await.unwrap();
}

#[tokio::test]
async fn test_invalid_messages_are_rejected_at_send() {
    let bus = started_bus().await;

    let no_topic = Message::event("", "sender", json!({}));
    assert!(matches!(
        bus.send_message(no_topic).await,
        Err(MessagingError::MissingTopic(_))
    ));

    let no_sender = Message::event("topic", "", json!({}));
    assert!(matches!(
        bus.send_message(no_sender).await,
        Err(MessagingError::MissingSender(_))
    ));

    bus.stop().await.unwrap();
}

#[tokio::test]
async fn test_expired_message_is_never_delivered() {
    let bus = started_bus().await;
    let hits = Arc::new(AtomicUsize::new(0));
    bus.register_handler("h", "*", counting_handler(hits.clone()), None, None)
        .await;

    let stale = Message::event("news", "feed", json!({}))
        .expires_at(SystemTime::now() - Duration::from_secs(5));
    assert!(matches!(
        bus.send_message(stale).await,
        Err(MessagingError::Expired(_))
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    bus.stop().await.unwrap();
}

#[tokio::test]
async fn test_bus_filter_vetoes_messages() {
    let bus = started_bus().await;
    let hits = Arc::new(AtomicUsize::new(0));
    bus.register_handler("h", "*", counting_handler(hits.clone()), None, None)
        .await;

    let filter_id = bus
        .add_filter(Arc::new(|message: &Message| message.sender != "blocked"))
        .await;

    assert!(matches!(
        bus.send_message(Message::event("t", "blocked", json!({}))).await,
        Err(MessagingError::Vetoed(_))
    ));
    bus.send_message(Message::event("t", "allowed", json!({})))
        .await
        .unwrap();
    eventually(|| hits.load(Ordering::SeqCst) == 1).await;

    assert!(bus.remove_filter(filter_id).await);
    bus.send_message(Message::event("t", "blocked", json!({})))
        .await
        .unwrap();
    eventually(|| hits.load(Ordering::SeqCst) == 2).await;

    bus.stop().await.unwrap();
}

#[tokio::test]
async fn test_handler_failure_does_not_block_others() {
    let bus = started_bus().await;
    let survivor_hits = Arc::new(AtomicUsize::new(0));

    // The failing handler sorts first thanks to its priority filter.
    bus.register_handler(
        "flaky",
        "jobs.*",
        sync_message_handler(|message| {
            Err(MessagingError::HandlerFailed {
                topic: message.topic.clone(),
                message: "boom".to_string(),
            })
        }),
        None,
        Some(MessagePriority::High),
    )
    .await;
    bus.register_handler("steady", "jobs.*", counting_handler(survivor_hits.clone()), None, None)
        .await;

    let message = Message::event("jobs.run", "cron", json!({}))
        .with_priority(MessagePriority::Critical)
        .with_delivery_mode(DeliveryMode::AtLeastOnce);
    let message_id = message.id;
    bus.send_message(message).await.unwrap();

    eventually(|| survivor_hits.load(Ordering::SeqCst) == 1).await;

    let snapshot = bus.tracker().snapshot(message_id).await.unwrap();
    assert!(!snapshot.is_fully_delivered());
    assert_eq!(snapshot.failed_recipients(), vec!["flaky"]);

    bus.stop().await.unwrap();
}

#[tokio::test]
async fn test_tracked_message_fully_delivered() {
    let bus = started_bus().await;
    let hits = Arc::new(AtomicUsize::new(0));
    bus.register_handler("a", "sync.*", counting_handler(hits.clone()), None, None)
        .await;
    bus.register_handler("b", "sync.*", counting_handler(hits.clone()), None, None)
        .await;

    let message = Message::event("sync.push", "core", json!({}))
        .with_delivery_mode(DeliveryMode::AtLeastOnce);
    let message_id = message.id;
    bus.send_message(message).await.unwrap();

    eventually(|| hits.load(Ordering::SeqCst) == 2).await;
    assert_eq!(bus.tracker().is_fully_delivered(message_id).await, Some(true));

    bus.stop().await.unwrap();
}

#[tokio::test]
async fn test_priority_sorted_handler_invocation() {
    let bus = started_bus().await;
    let order = Arc::new(Mutex::new(Vec::new()));

    for (name, filter) in [
        ("unfiltered", None),
        ("high", Some(MessagePriority::High)),
        ("normal", Some(MessagePriority::Normal)),
    ] {
        let order = order.clone();
        bus.register_handler(
            name,
            "tick",
            sync_message_handler(move |_| {
                order.lock().unwrap().push(name);
                Ok(())
            }),
            None,
            filter,
        )
        .await;
    }

    bus.send_message(
        Message::event("tick", "clock", json!({})).with_priority(MessagePriority::Critical),
    )
    .await
    .unwrap();

    eventually(|| order.lock().unwrap().len() == 3).await;
    // Highest priority filter first; handlers without one run last.
    assert_eq!(*order.lock().unwrap(), vec!["high", "normal", "unfiltered"]);

    bus.stop().await.unwrap();
}

#[tokio::test]
async fn test_targeted_message_reaches_only_recipient() {
    let bus = started_bus().await;
    let widget_hits = Arc::new(AtomicUsize::new(0));
    let tray_hits = Arc::new(AtomicUsize::new(0));
    bus.register_handler("widget", "*", counting_handler(widget_hits.clone()), None, None)
        .await;
    bus.register_handler("tray", "*", counting_handler(tray_hits.clone()), None, None)
        .await;

    bus.send_message(
        Message::event("ui.refresh", "core", json!({})).with_recipient("widget"),
    )
    .await
    .unwrap();

    eventually(|| widget_hits.load(Ordering::SeqCst) == 1).await;
    assert_eq!(tray_hits.load(Ordering::SeqCst), 0);

    bus.stop().await.unwrap();
}

#[tokio::test]
async fn test_unregister_plugin_removes_all_handlers() {
    let bus = started_bus().await;
    let hits = Arc::new(AtomicUsize::new(0));
    bus.register_handler("widget", "a.*", counting_handler(hits.clone()), None, None)
        .await;
    bus.register_handler("widget", "b.*", counting_handler(hits.clone()), None, None)
        .await;
    bus.register_handler("tray", "a.*", counting_handler(hits.clone()), None, None)
        .await;

    assert_eq!(bus.unregister_plugin("widget").await, 2);
    assert_eq!(bus.handler_count().await, 1);

    bus.send_message(Message::event("a.x", "core", json!({})))
        .await
        .unwrap();
    eventually(|| hits.load(Ordering::SeqCst) == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    // Only the surviving tray handler fired.
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    bus.stop().await.unwrap();
}

#[tokio::test]
async fn test_send_request_round_trip() {
    let bus = Arc::new(started_bus().await);

    // Responder echoes the payload back on the request's reply-to topic.
    let responder_bus = bus.clone();
    bus.register_handler(
        "ping_service",
        "ping",
        Box::new(move |message| {
            let bus = responder_bus.clone();
            let request = message.clone();
            Box::pin(async move {
                let reply = Message::response_to(
                    &request,
                    "ping_service",
                    json!({"echo": request.payload}),
                );
                bus.send_message(reply)
                    .await
                    .map_err(|e| MessagingError::InternalError(e.to_string()))
            })
        }),
        Some(MessageType::Request),
        None,
    )
    .await;

    let response = bus
        .send_request("ping", json!({"n": 7}), "caller", Duration::from_secs(2))
        .await
        .unwrap()
        .expect("expected a correlated response");
    assert_eq!(response.payload["echo"]["n"], json!(7));
    assert_eq!(response.message_type, MessageType::Response);

    // The temporary response handler is gone.
    assert_eq!(bus.handler_count().await, 1);

    bus.stop().await.unwrap();
}

#[tokio::test]
async fn test_send_request_times_out_without_responder() {
    let bus = started_bus().await;
    let timeout = Duration::from_millis(300);

    let started = Instant::now();
    let response = bus
        .send_request("ping", json!({}), "caller", timeout)
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(response.is_none());
    // Neither instant nor hanging: the wait is bounded by the timeout.
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout * 4);
    assert_eq!(bus.handler_count().await, 0);

    bus.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_drains_queue_before_shutdown() {
    let bus = started_bus().await;
    let hits = Arc::new(AtomicUsize::new(0));
    bus.register_handler("h", "*", counting_handler(hits.clone()), None, None)
        .await;

    for i in 0..10 {
        bus.send_message(Message::event("burst", "test", json!({ "i": i })))
            .await
            .unwrap();
    }
    bus.stop().await.unwrap();
    // stop() waits for the worker, which drains what was enqueued.
    assert_eq!(hits.load(Ordering::SeqCst), 10);

    // Sending after stop fails cleanly.
    assert!(matches!(
        bus.send_message(Message::event("late", "test", json!({}))).await,
        Err(MessagingError::BusNotRunning)
    ));
}
