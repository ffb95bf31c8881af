use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::messaging::message::MessageId;

/// Per-recipient outcome of a tracked delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Pending,
    Delivered,
    Failed(String),
}

#[derive(Debug, Clone)]
struct TrackingEntry {
    topic: String,
    started: Instant,
    recipients: HashMap<String, DeliveryOutcome>,
}

/// Point-in-time view of one tracked message.
#[derive(Debug, Clone)]
pub struct DeliverySnapshot {
    pub topic: String,
    pub recipients: HashMap<String, DeliveryOutcome>,
}

impl DeliverySnapshot {
    /// Fully delivered means every originally-targeted recipient succeeded.
    pub fn is_fully_delivered(&self) -> bool {
        !self.recipients.is_empty()
            && self
                .recipients
                .values()
                .all(|outcome| *outcome == DeliveryOutcome::Delivered)
    }

    pub fn failed_recipients(&self) -> Vec<&str> {
        self.recipients
            .iter()
            .filter(|(_, outcome)| matches!(outcome, DeliveryOutcome::Failed(_)))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Records per-recipient outcomes for messages whose delivery mode demands
/// tracking. Entries older than the TTL are purged by the bus's periodic
/// sweep.
#[derive(Debug, Default)]
pub struct DeliveryTracker {
    entries: Mutex<HashMap<MessageId, TrackingEntry>>,
}

impl DeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a tracking entry naming every targeted recipient.
    pub async fn begin(&self, message_id: MessageId, topic: &str, recipients: &[String]) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            message_id,
            TrackingEntry {
                topic: topic.to_string(),
                started: Instant::now(),
                recipients: recipients
                    .iter()
                    .map(|name| (name.clone(), DeliveryOutcome::Pending))
                    .collect(),
            },
        );
    }

    pub async fn mark_delivered(&self, message_id: MessageId, recipient: &str) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(&message_id) {
            entry
                .recipients
                .insert(recipient.to_string(), DeliveryOutcome::Delivered);
        }
    }

    /// Failures are recorded separately and never block other recipients.
    pub async fn mark_failed(&self, message_id: MessageId, recipient: &str, reason: &str) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(&message_id) {
            entry.recipients.insert(
                recipient.to_string(),
                DeliveryOutcome::Failed(reason.to_string()),
            );
        }
    }

    pub async fn snapshot(&self, message_id: MessageId) -> Option<DeliverySnapshot> {
        let entries = self.entries.lock().await;
        entries.get(&message_id).map(|entry| DeliverySnapshot {
            topic: entry.topic.clone(),
            recipients: entry.recipients.clone(),
        })
    }

    pub async fn is_fully_delivered(&self, message_id: MessageId) -> Option<bool> {
        self.snapshot(message_id)
            .await
            .map(|snapshot| snapshot.is_fully_delivered())
    }

    /// Drop entries older than `ttl`; returns how many were removed.
    pub async fn purge_older_than(&self, ttl: Duration) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.started.elapsed() < ttl);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
