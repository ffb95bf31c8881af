use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, warn};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::kernel::component::{ComponentStats, ManagerComponent};
use crate::kernel::constants;
use crate::kernel::error::Result;
use crate::messaging::error::MessagingError;
use crate::messaging::message::{DeliveryMode, Message, MessagePriority, MessageType};
use crate::messaging::tracker::DeliveryTracker;

/// Type for handler identifiers
pub type HandlerId = u64;

/// Type for bus-filter identifiers
pub type FilterId = u64;

// This type represents an owned future that returns a handler outcome
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of one handler invocation
pub type HandlerResult = std::result::Result<(), MessagingError>;

/// Asynchronous handler callback
pub type MessageHandlerFn =
    Box<dyn for<'a> Fn(&'a Message) -> BoxFuture<'a, HandlerResult> + Send + Sync>;

/// Bus-level filter; returning false vetoes the message at enqueue time.
pub type MessageFilter = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

/// Helper to adapt synchronous handlers to the async callback shape.
pub fn sync_message_handler<F>(f: F) -> MessageHandlerFn
where
    F: Fn(&Message) -> HandlerResult + Send + Sync + 'static,
{
    Box::new(move |message| {
        let result = f(message);
        Box::pin(async move { result })
    })
}

/// Exact match, or trailing-wildcard: `"orders.*"` matches any topic starting
/// with `"orders."`, and `"*"` matches everything.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix('*') {
        Some(prefix) => topic.starts_with(prefix),
        None => pattern == topic,
    }
}

/// A subscriber registration: owner, topic pattern, optional type and
/// minimum-priority filters, and the callback itself.
pub struct MessageHandler {
    pub id: HandlerId,
    pub plugin_id: String,
    pub pattern: String,
    pub message_type: Option<MessageType>,
    pub priority_filter: Option<MessagePriority>,
    callback: MessageHandlerFn,
}

impl MessageHandler {
    fn matches(&self, message: &Message) -> bool {
        if !topic_matches(&self.pattern, &message.topic) {
            return false;
        }
        if let Some(wanted) = self.message_type {
            if wanted != message.message_type {
                return false;
            }
        }
        if let Some(minimum) = self.priority_filter {
            if message.priority < minimum {
                return false;
            }
        }
        if let Some(recipient) = &message.recipient {
            if recipient != &self.plugin_id {
                return false;
            }
        }
        true
    }
}

impl fmt::Debug for MessageHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageHandler")
            .field("id", &self.id)
            .field("plugin_id", &self.plugin_id)
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct BusState {
    handlers: HashMap<HandlerId, Arc<MessageHandler>>,
    next_handler: HandlerId,
    filters: Vec<(FilterId, MessageFilter)>,
    next_filter: FilterId,
    sender: Option<mpsc::UnboundedSender<Message>>,
}

struct BusInner {
    state: Mutex<BusState>,
    tracker: DeliveryTracker,
    stats: Arc<ComponentStats>,
}

impl BusInner {
    /// Deliver one dequeued message to every matching handler.
    ///
    /// The expiry check runs before any handler sees the message; a handler
    /// failure is logged and recorded without blocking the rest.
    async fn deliver(&self, message: Message) {
        if message.is_expired() {
            warn!(
                "dropping expired message {} on topic '{}'",
                message.id, message.topic
            );
            self.stats.record_error();
            return;
        }

        let mut matched: Vec<Arc<MessageHandler>> = {
            let state = self.state.lock().await;
            state
                .handlers
                .values()
                .filter(|handler| handler.matches(&message))
                .cloned()
                .collect()
        };
        // Handlers with a priority filter run first, highest filter first.
        matched.sort_by_key(|handler| {
            std::cmp::Reverse(handler.priority_filter.map(|p| p as i64).unwrap_or(-1))
        });

        let tracked = message.delivery_mode.is_tracked();
        if tracked {
            let recipients: Vec<String> =
                matched.iter().map(|h| h.plugin_id.clone()).collect();
            self.tracker
                .begin(message.id, &message.topic, &recipients)
                .await;
        }

        self.stats.record_operation();
        for handler in matched {
            match (handler.callback)(&message).await {
                Ok(()) => {
                    if tracked {
                        self.tracker
                            .mark_delivered(message.id, &handler.plugin_id)
                            .await;
                    }
                }
                Err(e) => {
                    error!(
                        "handler {} (plugin '{}') failed for message {} on '{}': {}",
                        handler.id, handler.plugin_id, message.id, message.topic, e
                    );
                    self.stats.record_error();
                    if tracked {
                        self.tracker
                            .mark_failed(message.id, &handler.plugin_id, &e.to_string())
                            .await;
                    }
                }
            }
        }
    }
}

/// How often the worker sweeps the delivery tracker.
const SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Topic-based pub/sub and request/response transport.
///
/// `send_message` validates and enqueues without blocking; a background
/// worker owns delivery. One worker task exists per bus instance.
pub struct MessageBus {
    inner: Arc<BusInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
    tracking_ttl: Duration,
    initialized: AtomicBool,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self::with_tracking_ttl(Duration::from_secs(constants::DEFAULT_TRACKING_TTL_SECS))
    }

    pub fn with_tracking_ttl(tracking_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(BusInner {
                state: Mutex::new(BusState::default()),
                tracker: DeliveryTracker::new(),
                stats: Arc::new(ComponentStats::new()),
            }),
            worker: Mutex::new(None),
            tracking_ttl,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn stats(&self) -> &Arc<ComponentStats> {
        &self.inner.stats
    }

    pub fn tracker(&self) -> &DeliveryTracker {
        &self.inner.tracker
    }

    /// Register a handler for a topic pattern.
    pub async fn register_handler(
        &self,
        plugin_id: &str,
        topic: &str,
        callback: MessageHandlerFn,
        message_type: Option<MessageType>,
        priority_filter: Option<MessagePriority>,
    ) -> HandlerId {
        let mut state = self.inner.state.lock().await;
        state.next_handler += 1;
        let id = state.next_handler;
        state.handlers.insert(
            id,
            Arc::new(MessageHandler {
                id,
                plugin_id: plugin_id.to_string(),
                pattern: topic.to_string(),
                message_type,
                priority_filter,
                callback,
            }),
        );
        id
    }

    pub async fn unregister_handler(&self, id: HandlerId) -> bool {
        let mut state = self.inner.state.lock().await;
        state.handlers.remove(&id).is_some()
    }

    /// Remove every handler a plugin registered; returns how many.
    pub async fn unregister_plugin(&self, plugin_id: &str) -> usize {
        let mut state = self.inner.state.lock().await;
        let before = state.handlers.len();
        state.handlers.retain(|_, handler| handler.plugin_id != plugin_id);
        before - state.handlers.len()
    }

    pub async fn handler_count(&self) -> usize {
        let state = self.inner.state.lock().await;
        state.handlers.len()
    }

    /// Add a bus-level filter; any filter returning false vetoes a send.
    pub async fn add_filter(&self, filter: MessageFilter) -> FilterId {
        let mut state = self.inner.state.lock().await;
        state.next_filter += 1;
        let id = state.next_filter;
        state.filters.push((id, filter));
        id
    }

    pub async fn remove_filter(&self, id: FilterId) -> bool {
        let mut state = self.inner.state.lock().await;
        let before = state.filters.len();
        state.filters.retain(|(filter_id, _)| *filter_id != id);
        state.filters.len() < before
    }

    /// Validate and enqueue a message for asynchronous delivery.
    ///
    /// Returns as soon as the message is queued; delivery happens on the
    /// background worker.
    pub async fn send_message(&self, message: Message) -> std::result::Result<(), MessagingError> {
        if message.topic.trim().is_empty() {
            return Err(MessagingError::MissingTopic(message.id));
        }
        if message.sender.trim().is_empty() {
            return Err(MessagingError::MissingSender(message.id));
        }
        if message.is_expired() {
            return Err(MessagingError::Expired(message.id));
        }

        let sender = {
            let state = self.inner.state.lock().await;
            for (_, filter) in &state.filters {
                if !filter(&message) {
                    debug!("message {} vetoed by bus filter", message.id);
                    return Err(MessagingError::Vetoed(message.id));
                }
            }
            state
                .sender
                .clone()
                .ok_or(MessagingError::BusNotRunning)?
        };

        self.inner.stats.record_operation();
        sender
            .send(message)
            .map_err(|_| MessagingError::BusNotRunning)
    }

    /// Send a request and await its correlated response.
    ///
    /// Registers a temporary one-shot handler on `response.<correlation-id>`,
    /// sends the request with delivery mode request-response, and waits up to
    /// `timeout`. Returns `Ok(None)` when no response arrives in time; the
    /// temporary handler is removed either way.
    pub async fn send_request(
        &self,
        topic: &str,
        payload: Value,
        sender_id: &str,
        timeout: Duration,
    ) -> std::result::Result<Option<Message>, MessagingError> {
        let mut request = Message::new(MessageType::Request, topic, sender_id, payload)
            .with_delivery_mode(DeliveryMode::RequestResponse);
        let correlation = format!("corr-{}", request.id);
        let response_topic = format!("response.{}", correlation);
        request.correlation_id = Some(correlation.clone());
        request.reply_to = Some(response_topic.clone());

        let (tx, rx) = oneshot::channel::<Message>();
        let slot = Arc::new(StdMutex::new(Some(tx)));
        let callback: MessageHandlerFn = Box::new(move |message| {
            let slot = slot.clone();
            let correlation = correlation.clone();
            let message = message.clone();
            Box::pin(async move {
                if message.correlation_id.as_deref() == Some(correlation.as_str()) {
                    let taken = slot.lock().unwrap_or_else(|e| e.into_inner()).take();
                    if let Some(tx) = taken {
                        let _ = tx.send(message);
                    }
                }
                Ok(())
            })
        });

        let handler_id = self
            .register_handler(
                sender_id,
                &response_topic,
                callback,
                Some(MessageType::Response),
                None,
            )
            .await;

        if let Err(e) = self.send_message(request).await {
            self.unregister_handler(handler_id).await;
            return Err(e);
        }

        let outcome = tokio::time::timeout(timeout, rx).await;
        self.unregister_handler(handler_id).await;
        match outcome {
            Ok(Ok(response)) => Ok(Some(response)),
            // Timeout, or the handler was dropped without responding.
            _ => Ok(None),
        }
    }

    async fn start_worker(&self) -> Result<()> {
        let mut worker = self.worker.lock().await;
        if worker.is_some() {
            return Ok(());
        }
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = self.inner.state.lock().await;
            state.sender = Some(tx);
        }
        let inner = self.inner.clone();
        let ttl = self.tracking_ttl;
        *worker = Some(tokio::spawn(delivery_worker(inner, rx, ttl)));
        Ok(())
    }

    async fn stop_worker(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().await;
            // Dropping the sender lets the worker drain what is queued.
            state.sender = None;
        }
        let handle = {
            let mut worker = self.worker.lock().await;
            worker.take()
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("message bus worker ended abnormally: {}", e);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("tracking_ttl", &self.tracking_ttl)
            .finish_non_exhaustive()
    }
}

/// Drains the queue in FIFO order and runs the periodic tracker sweep.
async fn delivery_worker(
    inner: Arc<BusInner>,
    mut rx: mpsc::UnboundedReceiver<Message>,
    tracking_ttl: Duration,
) {
    let mut sweep = tokio::time::interval(SWEEP_PERIOD);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(message) => inner.deliver(message).await,
                None => break,
            },
            _ = sweep.tick() => {
                let purged = inner.tracker.purge_older_than(tracking_ttl).await;
                if purged > 0 {
                    debug!("purged {} stale delivery-tracking entries", purged);
                }
            }
        }
    }
}

#[async_trait]
impl ManagerComponent for MessageBus {
    fn name(&self) -> &'static str {
        "MessageBus"
    }

    async fn initialize(&self) -> Result<()> {
        self.initialized.swap(true, Ordering::SeqCst);
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        if !self.initialized.load(Ordering::SeqCst) {
            self.initialize().await?;
        }
        self.start_worker().await
    }

    async fn stop(&self) -> Result<()> {
        self.stop_worker().await
    }
}
