// crates/chime-core/src/event/tests/types_tests.rs
#![cfg(test)]

use serde_json::json;

use crate::event::types::{CommunicationEvent, EventType};

#[test]
fn test_event_type_names_are_dotted() {
    assert_eq!(EventType::PluginLoaded.name(), "plugin.loaded");
    assert_eq!(EventType::ServiceRegistered.name(), "service.registered");
    assert_eq!(EventType::ScheduleUpdated.name(), "schedule.updated");
    assert_eq!(EventType::Custom("lunch.menu".to_string()).name(), "lunch.menu");
}

#[test]
fn test_subscription_matching() {
    let loaded = EventType::PluginLoaded;
    assert!(loaded.matches_subscription(&EventType::PluginLoaded));
    assert!(!loaded.matches_subscription(&EventType::PluginUnloaded));

    // A named custom event matches its own name and the custom wildcard.
    let custom = EventType::Custom("lunch.menu".to_string());
    assert!(custom.matches_subscription(&EventType::Custom("lunch.menu".to_string())));
    assert!(custom.matches_subscription(&EventType::any_custom()));
    assert!(!custom.matches_subscription(&EventType::Custom("dinner.menu".to_string())));

    // The wildcard does not leak onto non-custom events.
    assert!(!loaded.matches_subscription(&EventType::any_custom()));
}

#[test]
fn test_target_allowlist() {
    let broadcast = CommunicationEvent::new(EventType::ThemeChanged, "theme", json!({}));
    assert!(broadcast.is_addressed_to("anyone"));

    let targeted = CommunicationEvent::new(EventType::ThemeChanged, "theme", json!({}))
        .with_targets(vec!["widget".to_string()]);
    assert!(targeted.is_addressed_to("widget"));
    assert!(!targeted.is_addressed_to("tray"));
}
