//! In-process topic bus with per-event completion.
//!
//! [`EventBus`] fans each published event out to every subscriber queue of
//! its topic and then waits until every subscriber has acknowledged it. The
//! bus is a cheap cloneable handle; construct one per process and pass it
//! to whoever produces or consumes events.
//!
//! Queues hold a single message, so a slow consumer back-pressures the
//! dispatch for its topic instead of buffering without bound.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use casari_core::{DispatchMode, PubSubConfig};
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

use crate::barrier::{CompletionBarrier, CompletionToken};
use crate::event::{Event, Topic};

/// Capacity of every subscriber queue.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 1;

// ---------------------------------------------------------------------------
// Message / Subscription
// ---------------------------------------------------------------------------

/// An event in flight to one subscriber, with the acknowledgement it owes.
#[derive(Debug)]
pub struct Message {
    topic: Topic,
    event: Arc<Event>,
    token: CompletionToken,
}

impl Message {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Acknowledge without inspecting further.
    pub fn ack(self) {
        self.token.ack();
    }

    /// Split into the event and its token. Consumers should do this on
    /// receipt and hold the token until processing is finished.
    pub fn into_parts(self) -> (Topic, Arc<Event>, CompletionToken) {
        (self.topic, self.event, self.token)
    }
}

/// Receiving end of one subscriber queue.
///
/// `recv` yields `None` once the bus is closed and the queue is drained.
#[derive(Debug)]
pub struct Subscription {
    topic: Topic,
    receiver: mpsc::Receiver<Message>,
}

impl Subscription {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }
}

// ---------------------------------------------------------------------------
// PendingEvent
// ---------------------------------------------------------------------------

/// An event ready to publish once the transaction that produced it commits.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    topic: Topic,
    event: Event,
}

impl PendingEvent {
    pub fn new(topic: impl Into<Topic>, event: Event) -> Self {
        Self {
            topic: topic.into(),
            event,
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn event(&self) -> &Event {
        &self.event
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

#[derive(Default)]
struct BusState {
    topics: HashMap<Topic, Vec<mpsc::Sender<Message>>>,
    closed: bool,
}

struct Inner {
    state: Mutex<BusState>,
    config: PubSubConfig,
    tracker: TaskTracker,
}

/// Publish/subscribe hub for [`Event`]s.
///
/// # Usage
///
/// ```rust,no_run
/// # async fn demo(event: casari_events::Event) {
/// use casari_core::PubSubConfig;
/// use casari_events::{EventBus, PendingEvent, Topic};
///
/// let bus = EventBus::new(PubSubConfig::default());
/// let mut sub = bus.subscribe(Topic::TABLE_V1).expect("bus is open");
///
/// tokio::spawn(async move {
///     while let Some(message) = sub.recv().await {
///         message.ack();
///     }
/// });
///
/// bus.publish(PendingEvent::new(Topic::TABLE_V1, event)).await;
/// # }
/// ```
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new(config: PubSubConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BusState::default()),
                config,
                tracker: TaskTracker::new(),
            }),
        }
    }

    pub fn config(&self) -> &PubSubConfig {
        &self.inner.config
    }

    /// Register a new subscriber queue for `topic`.
    ///
    /// Returns `None` once the bus has been closed.
    pub fn subscribe(&self, topic: impl Into<Topic>) -> Option<Subscription> {
        let topic = topic.into();
        let mut state = self.state();
        if state.closed {
            return None;
        }

        let (sender, receiver) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let queues = state.topics.entry(topic.clone()).or_default();
        queues.push(sender);
        tracing::debug!(topic = %topic, subscribers = queues.len(), "Subscriber registered");

        Some(Subscription { topic, receiver })
    }

    /// Publish a committed event.
    ///
    /// In synchronous mode this returns once every subscriber of the topic
    /// acknowledged the event; in asynchronous mode the same dispatch runs
    /// on a background task and this returns immediately. A closed bus, or
    /// a topic nobody subscribed to, makes this a no-op.
    pub async fn publish(&self, pending: PendingEvent) {
        let PendingEvent { topic, event } = pending;
        let event = Arc::new(event);

        match self.inner.config.dispatch_mode {
            DispatchMode::Sync => self.dispatch(&topic, event).await,
            DispatchMode::Async => {
                let bus = self.clone();
                self.inner.tracker.spawn(async move {
                    bus.dispatch(&topic, event).await;
                });
            }
        }
    }

    /// Publish several committed events, in order.
    pub async fn publish_bulk(&self, pending: Vec<PendingEvent>) {
        for event in pending {
            self.publish(event).await;
        }
    }

    /// Stop accepting subscribers and publications.
    ///
    /// Every subscriber queue is released so consumers see their queue end
    /// once it drains. Calling this more than once has no further effect.
    pub fn close(&self) {
        let mut state = self.state();
        if state.closed {
            return;
        }
        state.closed = true;
        let topics = std::mem::take(&mut state.topics);
        drop(state);

        tracing::info!(topics = topics.len(), "Event bus closed");
    }

    /// Close the bus and wait for background dispatches to finish.
    pub async fn shutdown(&self) {
        self.close();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        tracing::info!("Event bus shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// Number of live subscriber queues for `topic`.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.state().topics.get(topic).map_or(0, Vec::len)
    }

    /// Deliver `event` to every current subscriber of `topic` and wait for
    /// all of them to acknowledge it.
    ///
    /// The queue list is snapshotted under the state lock; the lock is not
    /// held while sending or waiting.
    pub(crate) async fn dispatch(&self, topic: &Topic, event: Arc<Event>) {
        let queues = {
            let state = self.state();
            if state.closed {
                tracing::debug!(topic = %topic, "Bus closed, event not dispatched");
                return;
            }
            match state.topics.get(topic) {
                Some(queues) if !queues.is_empty() => queues.clone(),
                _ => return,
            }
        };

        let barrier = CompletionBarrier::new(queues.len());
        for queue in &queues {
            let message = Message {
                topic: topic.clone(),
                event: Arc::clone(&event),
                token: barrier.token(),
            };
            // A failed send hands the message back and drops it, which
            // releases its token.
            if queue.send(message).await.is_err() {
                tracing::debug!(topic = %topic, "Subscriber queue gone, message dropped");
            }
        }
        drop(queues);

        barrier.wait().await;
        tracing::debug!(
            topic = %topic,
            event_id = %event.id(),
            event_type = %event.event_type(),
            "Event dispatched"
        );
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
