//! In-process event bus for lifecycle and streaming notifications.
//!
//! Synchronous dispatch: `publish` calls every matching subscriber in
//! registration order before returning. A handler returning `Err` is logged
//! and counted as an observability fault; it never stops dispatch and never
//! reaches the publisher. The subscriber list is read-mostly behind an
//! `RwLock`, so node tasks can publish concurrently.
//!
//! Per-node ordering (start, chunks, tool calls, finish) holds because each
//! node publishes from its own task in program order; cross-node ordering is
//! interleaved by completion time.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::warn;
use uuid::Uuid;

/// Discriminant of an [`Event`], used for subscription filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum EventKind {
    NodeStart,
    NodeFinish,
    ToolCallStart,
    ToolCallFinish,
    TextChunk,
    ToolChunk,
}

/// A lifecycle or streaming notification from a graph run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Event {
    /// A node began executing.
    NodeStart { node_id: String },
    /// A node finished: `Ok` carries an output preview, `Err` the error text.
    NodeFinish {
        node_id: String,
        result: Result<String, String>,
    },
    /// A tool invocation was dispatched.
    ToolCallStart {
        node_id: String,
        tool_name: String,
        call_id: Option<String>,
        arguments: Value,
        at: DateTime<Utc>,
    },
    /// A tool invocation returned: `Ok` carries a result preview, `Err` the
    /// error text.
    ToolCallFinish {
        node_id: String,
        tool_name: String,
        call_id: Option<String>,
        result: Result<String, String>,
        at: DateTime<Utc>,
        elapsed_ms: u64,
    },
    /// Partial assistant text from a streaming generation, in order.
    TextChunk { node_id: String, content: String },
    /// Partial tool-call arguments from a streaming generation, in order.
    ToolChunk {
        node_id: String,
        tool_name: Option<String>,
        content: String,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::NodeStart { .. } => EventKind::NodeStart,
            Self::NodeFinish { .. } => EventKind::NodeFinish,
            Self::ToolCallStart { .. } => EventKind::ToolCallStart,
            Self::ToolCallFinish { .. } => EventKind::ToolCallFinish,
            Self::TextChunk { .. } => EventKind::TextChunk,
            Self::ToolChunk { .. } => EventKind::ToolChunk,
        }
    }

    /// Id of the node this event belongs to.
    pub fn node_id(&self) -> &str {
        match self {
            Self::NodeStart { node_id }
            | Self::NodeFinish { node_id, .. }
            | Self::ToolCallStart { node_id, .. }
            | Self::ToolCallFinish { node_id, .. }
            | Self::TextChunk { node_id, .. }
            | Self::ToolChunk { node_id, .. } => node_id,
        }
    }
}

/// What a subscriber wants to see.
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Every event.
    All,
    /// Only the listed kinds.
    Kinds(HashSet<EventKind>),
}

impl EventFilter {
    /// Convenience constructor from a kind list.
    pub fn kinds(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self::Kinds(kinds.into_iter().collect())
    }

    fn matches(&self, event: &Event) -> bool {
        match self {
            Self::All => true,
            Self::Kinds(kinds) => kinds.contains(&event.kind()),
        }
    }
}

/// Handle for removing a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Subscriber {
    id: SubscriptionId,
    filter: EventFilter,
    handler: Box<dyn Fn(&Event) -> Result<(), String> + Send + Sync>,
}

/// Single-process publish/subscribe channel.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Subscriber>>,
    faults: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for events matching `filter`.
    ///
    /// Handlers run synchronously on the publishing task; they should be
    /// quick and must not block on the bus itself.
    pub fn subscribe(
        &self,
        filter: EventFilter,
        handler: impl Fn(&Event) -> Result<(), String> + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subscribers.push(Subscriber {
            id,
            filter,
            handler: Box::new(handler),
        });
        id
    }

    /// Bridges matching events into an async stream.
    ///
    /// The returned stream yields owned copies of every matching event;
    /// sends to a dropped consumer are silently discarded, so callers
    /// should `unsubscribe` with the returned id when done.
    pub fn stream(&self, filter: EventFilter) -> (SubscriptionId, UnboundedReceiverStream<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(filter, move |event| {
            let _ = tx.send(event.clone());
            Ok(())
        });
        (id, UnboundedReceiverStream::new(rx))
    }

    /// Removes a subscription. Returns false when the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Delivers an event to every matching subscriber, in registration
    /// order. Handler failures are logged and counted, never re-raised.
    pub fn publish(&self, event: &Event) {
        let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        for subscriber in subscribers.iter() {
            if !subscriber.filter.matches(event) {
                continue;
            }
            if let Err(fault) = (subscriber.handler)(event) {
                self.faults.fetch_add(1, Ordering::Relaxed);
                warn!(subscription = %subscriber.id, error = %fault, "event handler fault");
            }
        }
    }

    /// Number of handler failures observed so far.
    pub fn fault_count(&self) -> usize {
        self.faults.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("faults", &self.fault_count())
            .finish()
    }
}
