//! In-process publish/subscribe hub for chat message events.
//!
//! Every open `messages-stream` request holds one [`Subscription`]. Producers call
//! [`ChatStreamManager::publish`], which never blocks: a listener whose queue is full
//! is flagged for disconnection instead of slowing everyone else down.

use std::{
    collections::HashMap,
    fmt,
    pin::Pin,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use futures_util::Stream;
use metrics::{counter, gauge};
use shared::{config::server::SseConfig, models::StreamEvent};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

pub type SharedStreams = Arc<ChatStreamManager>;

/// Heartbeat stream handed to one connection.
pub type HeartbeatStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub heartbeat_interval: Duration,
    pub queue_capacity: usize,
    pub max_heartbeats: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self::from(&SseConfig::default())
    }
}

impl From<&SseConfig> for StreamSettings {
    fn from(config: &SseConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            queue_capacity: config.queue_capacity,
            max_heartbeats: config.max_heartbeats,
        }
    }
}

/// Item carried by a subscriber queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Event(StreamEvent),
    /// Sentinel telling the consumer to stop. Never produced by serializing an event.
    Close,
}

#[derive(Debug)]
struct Subscriber {
    id: u64,
    sender: mpsc::Sender<Delivery>,
    should_disconnect: AtomicBool,
}

impl Subscriber {
    /// Flags the subscriber. Returns `true` only for the call that flipped the flag.
    fn mark_disconnect(&self) -> bool {
        !self.should_disconnect.swap(true, Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct Registry {
    chats: HashMap<Uuid, Vec<Arc<Subscriber>>>,
    total_connections: usize,
}

pub struct ChatStreamManager {
    settings: StreamSettings,
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

impl fmt::Debug for ChatStreamManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatStreamManager")
            .field("settings", &self.settings)
            .field("total_connections", &self.total_connections())
            .finish()
    }
}

impl Default for ChatStreamManager {
    fn default() -> Self {
        Self::new(StreamSettings::default())
    }
}

impl ChatStreamManager {
    pub fn new(settings: StreamSettings) -> Self {
        Self {
            settings,
            registry: Mutex::new(Registry::default()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn settings(&self) -> StreamSettings {
        self.settings
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new listener for `chat_id`. The listener is removed when the
    /// returned handle is dropped.
    pub fn subscribe(self: &Arc<Self>, chat_id: Uuid) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.settings.queue_capacity.max(1));
        let subscriber = Arc::new(Subscriber {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            sender,
            should_disconnect: AtomicBool::new(false),
        });

        let (chat_count, total) = {
            let mut registry = self.registry();
            let list = registry.chats.entry(chat_id).or_default();
            list.push(Arc::clone(&subscriber));
            let chat_count = list.len();
            registry.total_connections += 1;
            (chat_count, registry.total_connections)
        };

        gauge!("docchat_sse_connections").set(total as f64);
        debug!(
            %chat_id,
            subscriber = subscriber.id,
            chat_subscribers = chat_count,
            total_connections = total,
            "chat stream subscribed"
        );

        Subscription {
            manager: Arc::clone(self),
            chat_id,
            subscriber,
            receiver,
            heartbeat_count: 0,
            max_heartbeats: self.settings.max_heartbeats,
        }
    }

    fn unsubscribe(&self, chat_id: Uuid, subscriber_id: u64) {
        let (removed, total) = {
            let mut registry = self.registry();
            let mut removed = false;
            let mut now_empty = false;
            if let Some(list) = registry.chats.get_mut(&chat_id) {
                let before = list.len();
                list.retain(|subscriber| subscriber.id != subscriber_id);
                removed = list.len() != before;
                now_empty = list.is_empty();
            }
            if now_empty {
                registry.chats.remove(&chat_id);
            }
            if removed {
                registry.total_connections = registry.total_connections.saturating_sub(1);
            }
            (removed, registry.total_connections)
        };

        if removed {
            gauge!("docchat_sse_connections").set(total as f64);
            debug!(
                %chat_id,
                subscriber = subscriber_id,
                total_connections = total,
                "chat stream unsubscribed"
            );
        }
    }

    /// Fans `event` out to every listener of `chat_id` without waiting.
    ///
    /// A listener whose queue is full gets flagged and sent a [`Delivery::Close`]
    /// when room allows; the event itself is dropped for that listener only.
    pub fn publish(&self, chat_id: Uuid, event: StreamEvent) {
        let subscribers = {
            let registry = self.registry();
            match registry.chats.get(&chat_id) {
                Some(list) => list.clone(),
                None => return,
            }
        };

        counter!("docchat_sse_events_published_total", "kind" => event.kind()).increment(1);

        for subscriber in subscribers {
            match subscriber.sender.try_send(Delivery::Event(event.clone())) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    if subscriber.mark_disconnect() {
                        counter!("docchat_sse_evictions_total").increment(1);
                        warn!(
                            %chat_id,
                            subscriber = subscriber.id,
                            "disconnecting stalled chat stream subscriber (queue full)"
                        );
                    }
                    let _ = subscriber.sender.try_send(Delivery::Close);
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }

    /// Fresh heartbeat stream yielding one event per configured interval until dropped.
    pub fn heartbeat(&self) -> HeartbeatStream {
        let interval = self.settings.heartbeat_interval;
        Box::pin(async_stream::stream! {
            loop {
                if interval.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    tokio::time::sleep(interval).await;
                }
                yield StreamEvent::heartbeat_now();
            }
        })
    }

    pub fn total_connections(&self) -> usize {
        self.registry().total_connections
    }

    pub fn subscriber_count(&self, chat_id: Uuid) -> usize {
        self.registry().chats.get(&chat_id).map_or(0, Vec::len)
    }

    pub fn has_chat(&self, chat_id: Uuid) -> bool {
        self.registry().chats.contains_key(&chat_id)
    }
}

/// One live listener. Dropping it unregisters the listener from the hub.
pub struct Subscription {
    manager: Arc<ChatStreamManager>,
    chat_id: Uuid,
    subscriber: Arc<Subscriber>,
    receiver: mpsc::Receiver<Delivery>,
    heartbeat_count: u32,
    max_heartbeats: u32,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("chat_id", &self.chat_id)
            .field("subscriber", &self.subscriber.id)
            .field("heartbeat_count", &self.heartbeat_count)
            .field("should_disconnect", &self.should_disconnect())
            .finish()
    }
}

impl Subscription {
    pub fn chat_id(&self) -> Uuid {
        self.chat_id
    }

    /// Next queued delivery. Cancel safe.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Delivery> {
        match self.receiver.try_recv() {
            Ok(delivery) => Some(delivery),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn should_disconnect(&self) -> bool {
        self.subscriber.should_disconnect.load(Ordering::SeqCst)
    }

    /// Counts one heartbeat. Returns `true` once the recycle budget is spent.
    pub fn record_heartbeat(&mut self) -> bool {
        self.heartbeat_count = self.heartbeat_count.saturating_add(1);
        self.heartbeat_count >= self.max_heartbeats
    }

    pub fn heartbeat_count(&self) -> u32 {
        self.heartbeat_count
    }

    /// Deliveries currently buffered for this listener.
    pub fn queued(&self) -> usize {
        self.receiver.len()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.manager.unsubscribe(self.chat_id, self.subscriber.id);
    }
}
