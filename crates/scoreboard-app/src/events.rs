// Typed publish/subscribe for canonical output events.
//
// Subscribers register for a set of topics and receive every event published
// on them, in publish order. Delivery is synchronous and never blocks: sinks
// that forward elsewhere must not wait.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use scoreboard_core::protocol::{BridgeMessage, OutputEvent, Topic};
use tokio::sync::mpsc;
use tracing::warn;

/// Capability to receive output events.
pub trait EventSink: Send + Sync {
    fn deliver(&self, event: &OutputEvent);
}

struct Subscription {
    topics: HashSet<Topic>,
    sink: Arc<dyn EventSink>,
}

#[derive(Default)]
pub struct EventBus {
    subscriptions: Vec<Subscription>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, topics: &[Topic], sink: Arc<dyn EventSink>) {
        self.subscriptions.push(Subscription {
            topics: topics.iter().copied().collect(),
            sink,
        });
    }

    pub fn publish(&self, event: OutputEvent) {
        let topic = event.topic();
        for sub in &self.subscriptions {
            if sub.topics.contains(&topic) {
                sub.sink.deliver(&event);
            }
        }
    }
}

/// Forwards events to the shim's outbound queue.
pub struct ChannelSink {
    tx: mpsc::Sender<BridgeMessage>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<BridgeMessage>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn deliver(&self, event: &OutputEvent) {
        if let Err(e) = self.tx.try_send(BridgeMessage::Output(event.clone())) {
            warn!("Dropping {:?} event: {}", event.topic(), e);
        }
    }
}

/// Keeps every delivered event in memory.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<OutputEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OutputEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, topic: Topic) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.topic() == topic)
            .count()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl EventSink for MemorySink {
    fn deliver(&self, event: &OutputEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
