use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, warn};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::kernel::component::{ComponentStats, ManagerComponent};
use crate::kernel::constants;
use crate::kernel::error::Result;
use crate::event::error::EventSystemError;
use crate::event::types::{CommunicationEvent, EventType};
use crate::messaging::bus::{BoxFuture, MessageBus};
use crate::messaging::message::{Message, MessageType};
use crate::services::registry::{ServiceNotice, ServiceRegistry};

/// Type for subscription identifiers
pub type SubscriptionId = String;

/// Outcome of one subscription callback
pub type EventResult = std::result::Result<(), EventSystemError>;

/// Asynchronous subscription callback
pub type EventCallback =
    Arc<dyn for<'a> Fn(&'a CommunicationEvent) -> BoxFuture<'a, EventResult> + Send + Sync>;

/// Predicate narrowing which events reach a subscription.
pub type EventFilter = Arc<dyn Fn(&CommunicationEvent) -> bool + Send + Sync>;

/// Helper to adapt synchronous callbacks to the async shape.
pub fn sync_event_callback<F>(f: F) -> EventCallback
where
    F: Fn(&CommunicationEvent) -> EventResult + Send + Sync + 'static,
{
    Arc::new(move |event| {
        let result = f(event);
        Box::pin(async move { result })
    })
}

struct EventSubscription {
    id: SubscriptionId,
    plugin_id: String,
    event_type: EventType,
    callback: EventCallback,
    filter: Option<EventFilter>,
}

impl EventSubscription {
    fn matches(&self, event: &CommunicationEvent) -> bool {
        if !event.event_type.matches_subscription(&self.event_type) {
            return false;
        }
        if !event.is_addressed_to(&self.plugin_id) {
            return false;
        }
        match &self.filter {
            Some(filter) => filter(event),
            None => true,
        }
    }
}

#[derive(Default)]
struct CommState {
    subscriptions: Vec<Arc<EventSubscription>>,
    history: VecDeque<CommunicationEvent>,
    next_seq: u64,
}

/// The typed-event layer: subscriptions with optional predicate filters,
/// bounded event history, and mirroring onto the message bus.
pub struct CommunicationBus {
    state: Mutex<CommState>,
    message_bus: Option<Arc<MessageBus>>,
    max_history: usize,
    stats: Arc<ComponentStats>,
    initialized: AtomicBool,
}

impl CommunicationBus {
    pub fn new() -> Self {
        Self::with_message_bus(None)
    }

    /// Attach a message bus so each event is mirrored as a
    /// `event.<type>` message.
    pub fn with_message_bus(message_bus: Option<Arc<MessageBus>>) -> Self {
        Self {
            state: Mutex::new(CommState::default()),
            message_bus,
            max_history: constants::DEFAULT_MAX_HISTORY,
            stats: Arc::new(ComponentStats::new()),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history.max(1);
        self
    }

    pub fn stats(&self) -> &Arc<ComponentStats> {
        &self.stats
    }

    /// Subscribe a plugin to an event type.
    ///
    /// The subscription id is derived from the plugin, the event type, and a
    /// per-bus sequence number, and is the removal handle.
    pub async fn subscribe(
        &self,
        plugin_id: &str,
        event_type: EventType,
        callback: EventCallback,
        filter: Option<EventFilter>,
    ) -> SubscriptionId {
        let mut state = self.state.lock().await;
        state.next_seq += 1;
        let id = format!("{}:{}:{}", plugin_id, event_type.name(), state.next_seq);
        state.subscriptions.push(Arc::new(EventSubscription {
            id: id.clone(),
            plugin_id: plugin_id.to_string(),
            event_type,
            callback,
            filter,
        }));
        id
    }

    pub async fn unsubscribe(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let before = state.subscriptions.len();
        state.subscriptions.retain(|sub| sub.id != id);
        state.subscriptions.len() < before
    }

    /// Remove every subscription a plugin holds; returns how many.
    pub async fn unsubscribe_plugin(&self, plugin_id: &str) -> usize {
        let mut state = self.state.lock().await;
        let before = state.subscriptions.len();
        state.subscriptions.retain(|sub| sub.plugin_id != plugin_id);
        before - state.subscriptions.len()
    }

    pub async fn subscription_count(&self) -> usize {
        let state = self.state.lock().await;
        state.subscriptions.len()
    }

    /// Publish an event to every matching subscription.
    ///
    /// Returns the number of callbacks that received it. A failing callback
    /// is logged and counted without blocking the rest. Matching order is
    /// subscription insertion order.
    pub async fn publish_event(&self, event: CommunicationEvent) -> usize {
        self.stats.record_operation();

        let matched: Vec<Arc<EventSubscription>> = {
            let mut state = self.state.lock().await;
            state.history.push_back(event.clone());
            while state.history.len() > self.max_history {
                state.history.pop_front();
            }
            state
                .subscriptions
                .iter()
                .filter(|sub| sub.matches(&event))
                .cloned()
                .collect()
        };

        let mut delivered = 0;
        for subscription in matched {
            match (subscription.callback)(&event).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    error!(
                        "event callback {} failed for '{}': {}",
                        subscription.id,
                        event.event_type.name(),
                        e
                    );
                    self.stats.record_error();
                }
            }
        }

        self.mirror_to_message_bus(&event).await;
        delivered
    }

    /// Publish with sender id `"system"`.
    pub async fn publish_system_event(
        &self,
        event_type: EventType,
        payload: Value,
        metadata: Vec<(String, String)>,
    ) -> usize {
        let mut event = CommunicationEvent::new(event_type, "system", payload);
        for (key, value) in metadata {
            event.metadata.insert(key, value);
        }
        self.publish_event(event).await
    }

    /// Most recent events, newest last, capped at `limit`.
    pub async fn recent_events(&self, limit: usize) -> Vec<CommunicationEvent> {
        let state = self.state.lock().await;
        let skip = state.history.len().saturating_sub(limit);
        state.history.iter().skip(skip).cloned().collect()
    }

    /// Re-publish service registry notices as typed events, so plugins only
    /// need one subscription mechanism for service lifecycle changes.
    pub async fn bind_service_registry(self: &Arc<Self>, registry: &ServiceRegistry) {
        let bus = Arc::downgrade(self);
        registry
            .subscribe(Arc::new(move |notice| {
                let Some(bus) = bus.upgrade() else {
                    return;
                };
                let event = match notice {
                    ServiceNotice::Registered { name, provider } => CommunicationEvent::new(
                        EventType::ServiceRegistered,
                        provider,
                        serde_json::json!({ "service": name }),
                    ),
                    ServiceNotice::Unregistered { name, provider } => CommunicationEvent::new(
                        EventType::ServiceUnregistered,
                        provider,
                        serde_json::json!({ "service": name }),
                    ),
                    // Per-call notices stay on the registry's observer list.
                    ServiceNotice::Called { .. } => return,
                };
                tokio::spawn(async move {
                    bus.publish_event(event).await;
                });
            }))
            .await;
    }

    async fn mirror_to_message_bus(&self, event: &CommunicationEvent) {
        let Some(bus) = &self.message_bus else {
            return;
        };
        let mut message = Message::new(
            MessageType::Event,
            &format!("event.{}", event.event_type.name()),
            &event.source,
            event.payload.clone(),
        );
        message.headers = event.metadata.clone();
        if let Err(e) = bus.send_message(message).await {
            debug!(
                "event '{}' not mirrored to message bus: {}",
                event.event_type.name(),
                e
            );
        }
    }
}

impl Default for CommunicationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CommunicationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommunicationBus")
            .field("max_history", &self.max_history)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ManagerComponent for CommunicationBus {
    fn name(&self) -> &'static str {
        "CommunicationBus"
    }

    async fn initialize(&self) -> Result<()> {
        self.initialized.swap(true, Ordering::SeqCst);
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        if !self.initialized.load(Ordering::SeqCst) {
            self.initialize().await?;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let dropped = state.subscriptions.len();
        if dropped > 0 {
            warn!("dropping {} live event subscriptions on stop", dropped);
        }
        state.subscriptions.clear();
        state.history.clear();
        Ok(())
    }
}
