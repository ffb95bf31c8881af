use std::collections::HashMap;
use std::time::SystemTime;

use serde_json::Value;

/// Typed events the communication bus carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A plugin finished loading
    PluginLoaded,
    /// A plugin was unloaded
    PluginUnloaded,
    /// A service became discoverable
    ServiceRegistered,
    /// A service was withdrawn
    ServiceUnregistered,
    /// A configuration section changed
    ConfigChanged,
    /// The class schedule was updated
    ScheduleUpdated,
    /// A notification was delivered to the user
    NotificationSent,
    /// The UI theme changed
    ThemeChanged,
    /// A user-initiated action
    UserAction,
    /// Host-level occurrence not covered above
    SystemEvent,
    /// Plugin-defined event, labeled
    Custom(String),
}

impl EventType {
    /// Dotted name used for message-bus mirroring and logging.
    pub fn name(&self) -> &str {
        match self {
            EventType::PluginLoaded => "plugin.loaded",
            EventType::PluginUnloaded => "plugin.unloaded",
            EventType::ServiceRegistered => "service.registered",
            EventType::ServiceUnregistered => "service.unregistered",
            EventType::ConfigChanged => "config.changed",
            EventType::ScheduleUpdated => "schedule.updated",
            EventType::NotificationSent => "notification.sent",
            EventType::ThemeChanged => "theme.changed",
            EventType::UserAction => "user.action",
            EventType::SystemEvent => "system.event",
            EventType::Custom(label) => label,
        }
    }

    /// Subscription wildcard receiving every custom-typed event.
    pub fn any_custom() -> Self {
        EventType::Custom("*".to_string())
    }

    /// Whether an event of this type reaches a subscription of `other`.
    ///
    /// Types match exactly, except that a `Custom("*")` subscription matches
    /// every custom-typed event.
    pub fn matches_subscription(&self, other: &EventType) -> bool {
        if self == other {
            return true;
        }
        matches!(
            (self, other),
            (EventType::Custom(_), EventType::Custom(wildcard)) if wildcard == "*"
        )
    }
}

/// A typed event published through the communication bus.
#[derive(Debug, Clone)]
pub struct CommunicationEvent {
    pub event_type: EventType,
    /// Id of the publishing plugin, or `"system"`
    pub source: String,
    pub payload: Value,
    /// Explicit recipient allowlist; absent means broadcast
    pub targets: Option<Vec<String>>,
    pub metadata: HashMap<String, String>,
    pub created_at: SystemTime,
}

impl CommunicationEvent {
    pub fn new(event_type: EventType, source: &str, payload: Value) -> Self {
        Self {
            event_type,
            source: source.to_string(),
            payload,
            targets: None,
            metadata: HashMap::new(),
            created_at: SystemTime::now(),
        }
    }

    /// Restrict delivery to the named plugins.
    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.targets = Some(targets);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Whether the allowlist (if any) admits a plugin.
    pub fn is_addressed_to(&self, plugin_id: &str) -> bool {
        match &self.targets {
            None => true,
            Some(targets) => targets.iter().any(|t| t == plugin_id),
        }
    }
}
