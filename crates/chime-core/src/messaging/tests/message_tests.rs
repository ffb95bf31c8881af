// crates/chime-core/src/messaging/tests/message_tests.rs
#![cfg(test)]

use std::time::{Duration, SystemTime};

use serde_json::json;

use crate::messaging::bus::topic_matches;
use crate::messaging::message::{DeliveryMode, Message, MessagePriority, MessageType};

#[test]
fn test_message_ids_are_unique() {
    let a = Message::event("schedule.updated", "core", json!({}));
    let b = Message::event("schedule.updated", "core", json!({}));
    assert_ne!(a.id, b.id);
}

#[test]
fn test_builder_style_setters() {
    let msg = Message::new(MessageType::Command, "widget.refresh", "tray", json!({"force": true}))
        .with_priority(MessagePriority::High)
        .with_delivery_mode(DeliveryMode::AtLeastOnce)
        .with_recipient("floating_widget")
        .with_header("origin", "tray-menu");

    assert_eq!(msg.priority, MessagePriority::High);
    assert_eq!(msg.delivery_mode, DeliveryMode::AtLeastOnce);
    assert!(!msg.is_broadcast());
    assert_eq!(msg.headers.get("origin").map(String::as_str), Some("tray-menu"));
}

#[test]
fn test_expiry() {
    let fresh = Message::event("t", "s", json!({})).expires_in(Duration::from_secs(60));
    assert!(!fresh.is_expired());

    let stale = Message::event("t", "s", json!({}))
        .expires_at(SystemTime::now() - Duration::from_secs(1));
    assert!(stale.is_expired());

    let eternal = Message::event("t", "s", json!({}));
    assert!(!eternal.is_expired());
}

#[test]
fn test_priority_ordering() {
    assert!(MessagePriority::Critical > MessagePriority::High);
    assert!(MessagePriority::High > MessagePriority::Normal);
    assert!(MessagePriority::Normal > MessagePriority::Low);
}

#[test]
fn test_delivery_mode_tracking_flag() {
    assert!(!DeliveryMode::FireAndForget.is_tracked());
    assert!(DeliveryMode::AtLeastOnce.is_tracked());
    assert!(DeliveryMode::ExactlyOnce.is_tracked());
    assert!(DeliveryMode::RequestResponse.is_tracked());
}

#[test]
fn test_response_to_inherits_correlation() {
    let request = Message::new(MessageType::Request, "ping", "caller", json!({}))
        .with_correlation_id("corr-9")
        .with_reply_to("response.corr-9");
    let response = Message::response_to(&request, "responder", json!({"pong": true}));

    assert_eq!(response.message_type, MessageType::Response);
    assert_eq!(response.topic, "response.corr-9");
    assert_eq!(response.correlation_id.as_deref(), Some("corr-9"));
    assert_eq!(response.recipient.as_deref(), Some("caller"));
}

#[test]
fn test_topic_matching() {
    // Exact match.
    assert!(topic_matches("orders.created", "orders.created"));
    assert!(!topic_matches("orders.created", "orders.updated"));

    // Trailing wildcard.
    assert!(topic_matches("orders.*", "orders.created"));
    assert!(topic_matches("orders.*", "orders.updated"));
    assert!(!topic_matches("orders.*", "billing.created"));

    // Bare wildcard matches everything.
    assert!(topic_matches("*", "anything.at.all"));
}
