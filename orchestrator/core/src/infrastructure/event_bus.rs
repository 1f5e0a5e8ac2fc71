// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Task Events
//
// Two delivery paths share one emit call:
// - Registered subscribers are called synchronously, each in isolation.
// - Streaming receivers (CLI follow mode, tests) read from a tokio broadcast
//   channel and may lag without affecting the emitter.

use crate::domain::events::TaskEvent;
use crate::domain::field::FieldNodeId;
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Synchronous event callback.
///
/// Implementations should be quick; anything slow belongs on a background
/// task fed from `on_event`. A returned error or a panic is logged by the bus
/// and never reaches the emitter or other subscribers.
pub trait EventSubscriber: Send + Sync {
    /// Stable name, used to keep a subscriber from being wired twice.
    fn name(&self) -> &str;

    fn on_event(&self, event: &TaskEvent) -> Result<(), SubscriberError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("subscriber is shut down")]
    ShutDown,

    #[error("{0}")]
    Failed(String),
}

/// Event bus for publishing and subscribing to task events
pub struct EventBus {
    sender: broadcast::Sender<TaskEvent>,
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered for streaming
    /// receivers before the oldest are dropped
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Register a callback subscriber. Returns `false` if one with the same
    /// name is already registered.
    pub fn register(&self, subscriber: Arc<dyn EventSubscriber>) -> bool {
        let mut subscribers = self.subscribers.write();
        if subscribers.iter().any(|s| s.name() == subscriber.name()) {
            debug!(subscriber = subscriber.name(), "Subscriber already registered");
            return false;
        }
        info!(subscriber = subscriber.name(), "Registered event subscriber");
        subscribers.push(subscriber);
        true
    }

    /// Remove every callback subscriber.
    pub fn unregister_all(&self) -> usize {
        let mut subscribers = self.subscribers.write();
        let removed = subscribers.len();
        subscribers.clear();
        removed
    }

    pub fn registered_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver an event to every subscriber and streaming receiver.
    ///
    /// Never fails and never panics on behalf of a subscriber.
    pub fn emit(&self, event: TaskEvent) {
        debug!(
            event_type = %event.event_type,
            node_id = %event.node_id,
            "Publishing task event"
        );

        // Snapshot so a subscriber may emit or register without deadlocking.
        let subscribers: Vec<Arc<dyn EventSubscriber>> = self.subscribers.read().clone();
        for subscriber in subscribers {
            match catch_unwind(AssertUnwindSafe(|| subscriber.on_event(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    subscriber = subscriber.name(),
                    event_type = %event.event_type,
                    node_id = %event.node_id,
                    error = %e,
                    "Event subscriber failed"
                ),
                Err(_) => warn!(
                    subscriber = subscriber.name(),
                    event_type = %event.event_type,
                    node_id = %event.node_id,
                    "Event subscriber panicked"
                ),
            }
        }

        // send() only errors when nobody is streaming
        if self.sender.send(event).is_err() {
            debug!("No streaming receivers listening to event");
        }
    }

    /// Subscribe to all task events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to events for a single node
    pub fn subscribe_node(&self, node_id: FieldNodeId) -> NodeEventReceiver {
        NodeEventReceiver {
            receiver: self.sender.subscribe(),
            node_id,
        }
    }

    /// Number of active streaming receivers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all task events
pub struct EventReceiver {
    receiver: broadcast::Receiver<TaskEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<TaskEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<TaskEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to one node
pub struct NodeEventReceiver {
    receiver: broadcast::Receiver<TaskEvent>,
    node_id: FieldNodeId,
}

impl NodeEventReceiver {
    /// Receive the next event for the node, skipping everything else
    pub async fn recv(&mut self) -> Result<TaskEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if event.node_id == self.node_id {
                return Ok(event);
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

/// Process-scope wiring of the standard subscribers.
///
/// Lifecycle: call [`SubscriberRegistry::init`] once at startup; repeated
/// calls are no-ops. [`SubscriberRegistry::reset`] unregisters everything and
/// re-arms `init`; it exists for test harnesses.
pub struct SubscriberRegistry {
    bus: Arc<EventBus>,
    initialized: AtomicBool,
}

impl SubscriberRegistry {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Register the subscribers built by `build`, unless already done.
    /// `build` only runs on the first call. Returns whether wiring happened.
    pub fn init<F>(&self, build: F) -> bool
    where
        F: FnOnce() -> Vec<Arc<dyn EventSubscriber>>,
    {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Event subscribers already initialized");
            return false;
        }
        let subscribers = build();
        let count = subscribers.len();
        for subscriber in subscribers {
            self.bus.register(subscriber);
        }
        info!(subscribers = count, "Event subscribers initialized");
        true
    }

    pub fn reset(&self) {
        let removed = self.bus.unregister_all();
        self.initialized.store(false, Ordering::Release);
        info!(removed, "Event subscribers reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::TaskEventType;
    use crate::domain::field::{FieldNode, NodeContent, NodeType};
    use parking_lot::Mutex;

    struct Recorder {
        name: String,
        seen: Mutex<Vec<TaskEventType>>,
    }

    impl Recorder {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl EventSubscriber for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        fn on_event(&self, event: &TaskEvent) -> Result<(), SubscriberError> {
            self.seen.lock().push(event.event_type);
            Ok(())
        }
    }

    struct Panicker;

    impl EventSubscriber for Panicker {
        fn name(&self) -> &str {
            "panicker"
        }

        fn on_event(&self, _event: &TaskEvent) -> Result<(), SubscriberError> {
            panic!("subscriber blew up");
        }
    }

    struct Failing;

    impl EventSubscriber for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn on_event(&self, _event: &TaskEvent) -> Result<(), SubscriberError> {
            Err(SubscriberError::Failed("sink unavailable".into()))
        }
    }

    fn event(event_type: TaskEventType) -> TaskEvent {
        let node = FieldNode::new(NodeType::Goal, "goal", NodeContent::default(), 0.9, vec![], None);
        TaskEvent::for_node(event_type, &node, None)
    }

    #[tokio::test]
    async fn test_emit_reaches_subscribers_and_receivers() {
        let bus = EventBus::new(10);
        let recorder = Recorder::new("recorder");
        bus.register(recorder.clone());
        let mut receiver = bus.subscribe();

        bus.emit(event(TaskEventType::Deposited));

        assert_eq!(*recorder.seen.lock(), vec![TaskEventType::Deposited]);
        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type, TaskEventType::Deposited);
    }

    #[test]
    fn test_failing_subscribers_are_isolated() {
        let bus = EventBus::new(10);
        bus.register(Arc::new(Panicker));
        bus.register(Arc::new(Failing));
        let recorder = Recorder::new("recorder");
        bus.register(recorder.clone());

        bus.emit(event(TaskEventType::Claimed));
        bus.emit(event(TaskEventType::Resolved));

        assert_eq!(
            *recorder.seen.lock(),
            vec![TaskEventType::Claimed, TaskEventType::Resolved]
        );
    }

    #[test]
    fn test_register_is_unique_by_name() {
        let bus = EventBus::new(10);
        assert!(bus.register(Recorder::new("audit")));
        assert!(!bus.register(Recorder::new("audit")));
        assert_eq!(bus.registered_count(), 1);
    }

    #[test]
    fn test_registry_init_is_idempotent_until_reset() {
        let bus = Arc::new(EventBus::new(10));
        let registry = SubscriberRegistry::new(bus.clone());
        let mut builds = 0;

        assert!(registry.init(|| {
            builds += 1;
            vec![Recorder::new("a") as Arc<dyn EventSubscriber>]
        }));
        assert!(!registry.init(|| {
            builds += 1;
            vec![Recorder::new("b") as Arc<dyn EventSubscriber>]
        }));
        assert_eq!(builds, 1);
        assert_eq!(bus.registered_count(), 1);

        registry.reset();
        assert!(!registry.is_initialized());
        assert_eq!(bus.registered_count(), 0);
        assert!(registry.init(|| vec![Recorder::new("c") as Arc<dyn EventSubscriber>]));
        assert_eq!(bus.registered_count(), 1);
    }

    #[tokio::test]
    async fn test_node_filtering() {
        let bus = EventBus::new(10);
        let wanted = event(TaskEventType::Claimed);
        let mut receiver = bus.subscribe_node(wanted.node_id);

        bus.emit(event(TaskEventType::Claimed));
        bus.emit(wanted.clone());

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.id, wanted.id);
    }
}
