use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use serde_json::Value;

/// Type for message identifiers
pub type MessageId = u64;

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

fn next_message_id() -> MessageId {
    NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed)
}

/// What a message represents on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Request,
    Response,
    Event,
    Notification,
    Command,
    Query,
}

/// Message priority level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessagePriority {
    /// Lowest priority, processed last
    Low = 0,
    /// Normal priority, processed in the middle
    Normal = 1,
    /// High priority, processed first
    High = 2,
    /// Critical priority, processed immediately
    Critical = 3,
}

impl Default for MessagePriority {
    fn default() -> Self {
        MessagePriority::Normal
    }
}

/// How strongly delivery is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// No delivery bookkeeping
    FireAndForget,
    /// Per-recipient outcomes tracked until cleanup
    AtLeastOnce,
    /// Tracked like at-least-once; the in-process bus never redelivers
    ExactlyOnce,
    /// Tracked, and the sender awaits a correlated response
    RequestResponse,
}

impl DeliveryMode {
    /// Whether per-recipient outcomes are recorded for this mode.
    pub fn is_tracked(&self) -> bool {
        !matches!(self, DeliveryMode::FireAndForget)
    }
}

/// A unit of bus traffic.
#[derive(Debug, Clone)]
pub struct Message {
    /// Generated unique id
    pub id: MessageId,
    pub message_type: MessageType,
    pub topic: String,
    pub sender: String,
    /// Absent means broadcast
    pub recipient: Option<String>,
    pub payload: Value,
    pub priority: MessagePriority,
    pub delivery_mode: DeliveryMode,
    pub created_at: SystemTime,
    /// Undeliverable once current time passes this
    pub expires_at: Option<SystemTime>,
    /// Matches responses to their request
    pub correlation_id: Option<String>,
    /// Topic a response should be published on
    pub reply_to: Option<String>,
    pub headers: HashMap<String, String>,
}

impl Message {
    pub fn new(message_type: MessageType, topic: &str, sender: &str, payload: Value) -> Self {
        Self {
            id: next_message_id(),
            message_type,
            topic: topic.to_string(),
            sender: sender.to_string(),
            recipient: None,
            payload,
            priority: MessagePriority::Normal,
            delivery_mode: DeliveryMode::FireAndForget,
            created_at: SystemTime::now(),
            expires_at: None,
            correlation_id: None,
            reply_to: None,
            headers: HashMap::new(),
        }
    }

    /// Shorthand for a broadcast event message.
    pub fn event(topic: &str, sender: &str, payload: Value) -> Self {
        Self::new(MessageType::Event, topic, sender, payload)
    }

    /// Build the response to a request, inheriting its correlation id and
    /// publishing on its reply-to topic (or `response.<correlation>` when
    /// the request named none).
    pub fn response_to(request: &Message, sender: &str, payload: Value) -> Self {
        let topic = request
            .reply_to
            .clone()
            .or_else(|| {
                request
                    .correlation_id
                    .as_ref()
                    .map(|corr| format!("response.{}", corr))
            })
            .unwrap_or_else(|| format!("response.{}", request.id));
        let mut response = Self::new(MessageType::Response, &topic, sender, payload);
        response.correlation_id = request.correlation_id.clone();
        response.recipient = Some(request.sender.clone());
        response
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery_mode = mode;
        self
    }

    pub fn with_recipient(mut self, recipient: &str) -> Self {
        self.recipient = Some(recipient.to_string());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: &str) -> Self {
        self.correlation_id = Some(correlation_id.to_string());
        self
    }

    pub fn with_reply_to(mut self, reply_to: &str) -> Self {
        self.reply_to = Some(reply_to.to_string());
        self
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    /// Expire this message a duration from now.
    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expires_at = Some(SystemTime::now() + ttl);
        self
    }

    /// Expire at an absolute instant.
    pub fn expires_at(mut self, deadline: SystemTime) -> Self {
        self.expires_at = Some(deadline);
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.recipient.is_none()
    }

    /// Whether current time has passed the expiry timestamp.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(deadline) => SystemTime::now() > deadline,
            None => false,
        }
    }
}
