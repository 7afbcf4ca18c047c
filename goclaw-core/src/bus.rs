//! In-process message bus: bounded per-subscriber fan-out with a
//! non-blocking publisher and drop-newest overflow.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Default bounded capacity of a subscriber's delivery buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

/// Bus topics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    Inbound,
    Outbound,
    AgentEvent,
}

/// A normalized record flowing from a transport into the system.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub channel: String,
    pub account_id: String,
    pub sender_id: String,
    pub chat_id: String,
    pub content: String,
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    /// `SessionKey = channel + ":" + chatId`, used as a fallback
    /// correlation key before the full `session::session_key` derivation runs.
    pub fn session_key_prefix(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }
}

/// A normalized record flowing from the system back to a transport.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: String,
    pub channel: String,
    /// Which registered account on `channel` should deliver this message; `None`
    /// routes to that channel's sole/default adapter; the dispatcher's routing
    /// key is `(channel, accountId)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub chat_id: String,
    pub content: String,
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub is_stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_state: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Agent-turn telemetry published on the `agent-event` topic as tagged
/// variants. `stream` picks out which phase of a turn this is.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "stream", rename_all = "snake_case")]
pub enum AgentEvent {
    Lifecycle {
        session_key: String,
        phase: String,
    },
    Tool {
        session_key: String,
        name: String,
        arguments: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    Assistant {
        session_key: String,
        delta: String,
        done: bool,
    },
    Error {
        session_key: String,
        reason: String,
        message: String,
    },
    Compaction {
        session_key: String,
        removed: usize,
    },
}

/// A tagged bus payload; the JSON wire shape discriminates on `type`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusEvent {
    Inbound(InboundMessage),
    Outbound(OutboundMessage),
    Agent(AgentEvent),
}

struct Subscriber {
    id: u64,
    sender: mpsc::Sender<BusEvent>,
    dropped: Arc<AtomicU64>,
}

/// A live subscription: a receiver plus its drop counter. Dropping it cancels only
/// this subscription.
pub struct Subscription {
    id: u64,
    topic: Topic,
    receiver: mpsc::Receiver<BusEvent>,
    dropped: Arc<AtomicU64>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<BusEvent> {
        self.receiver.recv().await
    }

    /// Events dropped for this subscriber due to a full buffer.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}

/// Bounded in-process pub/sub fabric. `publish` is fully synchronous: it locks
/// a short-lived registry, never awaits, and never blocks on a slow subscriber.
pub struct MessageBus {
    subscribers: Mutex<HashMap<Topic, Vec<Subscriber>>>,
    capacity: usize,
    next_id: AtomicU64,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a new subscriber for `topic`, returning its receiving half.
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(self.capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        self.subscribers.lock().expect("subscriber registry poisoned").entry(topic).or_default().push(Subscriber {
            id,
            sender: tx,
            dropped: dropped.clone(),
        });
        Subscription {
            id,
            topic,
            receiver: rx,
            dropped,
        }
    }

    /// Publishes `event` to every live subscriber of `topic`. A subscriber whose
    /// buffer is full has the newest event dropped for it and its counter bumped;
    /// the publish otherwise proceeds for every other subscriber. Closed
    /// subscriptions are pruned lazily.
    pub fn publish(&self, topic: Topic, event: BusEvent) {
        let mut subscribers = self.subscribers.lock().expect("subscriber registry poisoned");
        if let Some(list) = subscribers.get_mut(&topic) {
            list.retain_mut(|subscriber| match subscriber.sender.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    subscriber.dropped.fetch_add(1, Ordering::SeqCst);
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
        }
    }

    /// Drops every subscriber of every topic, closing their receivers.
    pub fn close(&self) {
        self.subscribers.lock().expect("subscriber registry poisoned").clear();
    }

    /// Explicit cancellation of a single subscription by id, independent of the
    /// others.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        if let Some(list) = self
            .subscribers
            .lock()
            .expect("subscriber registry poisoned")
            .get_mut(&subscription.topic)
        {
            list.retain(|s| s.id != subscription.id);
        }
    }
}
