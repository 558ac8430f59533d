//! In-memory broker for testing and single-process scenarios.
//!
//! This module provides a thread-safe broker that implements [`Broker`]
//! with peek-lock competing-consumer semantics, useful for:
//! - Unit and integration testing without a real service bus
//! - Single-process applications
//! - Development and prototyping

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{Broker, BrokerError, Message, ReceiveError, Receiver};
use crate::naming;
use crate::EventType;

/// Deliveries after which an abandoned message is dead-lettered.
pub const DEFAULT_MAX_DELIVERY_COUNT: u32 = 10;

/// In-memory broker with durable topic subscriptions.
///
/// Features:
/// - Thread-safe (can be shared across threads via `Clone`)
/// - `publish` copies a message into every subscription of its topic (fan-out)
/// - Receivers created for the same subscription compete for its messages
/// - Abandoned messages are redelivered until `max_delivery_count`, then
///   dead-lettered
/// - `delete_subscription` simulates out-of-band deletion; receivers fault
///
/// ## Example
///
/// ```
/// use competing_pumps::bus::{Broker, InMemoryBroker, Message};
/// use competing_pumps::EventType;
/// use std::time::Duration;
///
/// let broker = InMemoryBroker::new();
/// let order_placed = EventType::from_static("OrderPlaced");
/// broker.ensure_subscription_exists(&order_placed, "billing").unwrap();
///
/// let topic = broker.topic_path_for(&order_placed);
/// let receiver = broker.create_receiver(&topic, "billing").unwrap();
///
/// broker.publish(Message::new("msg-1", "OrderPlaced", b"{}".to_vec())).unwrap();
///
/// let msg = receiver.receive(Duration::from_millis(100)).unwrap().unwrap();
/// assert_eq!(msg.id, "msg-1");
/// receiver.complete(&msg).unwrap();
/// ```
#[derive(Clone)]
pub struct InMemoryBroker {
    topics: Arc<RwLock<BTreeMap<String, Topic>>>,
    next_receiver_id: Arc<AtomicU64>,
    max_delivery_count: u32,
}

#[derive(Default)]
struct Topic {
    subscriptions: BTreeMap<String, Arc<SubscriptionQueue>>,
}

struct SubscriptionQueue {
    topic_path: String,
    name: String,
    state: Mutex<QueueState>,
    available: Condvar,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Message>,
    /// Message id -> (owning receiver id, message)
    locked: HashMap<String, (u64, Message)>,
    completed: Vec<String>,
    abandoned: Vec<String>,
    dead_letters: Vec<Message>,
    deleted: bool,
}

/// Point-in-time counters for one subscription.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubscriptionStats {
    pub pending: usize,
    pub locked: usize,
    pub completed: usize,
    pub abandoned: usize,
    pub dead_lettered: usize,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    /// Create a new in-memory broker.
    pub fn new() -> Self {
        Self::with_max_delivery_count(DEFAULT_MAX_DELIVERY_COUNT)
    }

    /// Create a broker that dead-letters messages after `max_delivery_count`
    /// deliveries.
    pub fn with_max_delivery_count(max_delivery_count: u32) -> Self {
        Self {
            topics: Arc::new(RwLock::new(BTreeMap::new())),
            next_receiver_id: Arc::new(AtomicU64::new(1)),
            max_delivery_count: max_delivery_count.max(1),
        }
    }

    /// Publish a message to its event type's topic.
    ///
    /// Every subscription on the topic gets its own copy. Returns the number
    /// of subscriptions the message was delivered to.
    pub fn publish(&self, message: Message) -> Result<usize, BrokerError> {
        let topic_path = naming::topic_path_for(&EventType::new(message.event_type.clone()));
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        let topic = topics
            .get(&topic_path)
            .ok_or_else(|| BrokerError::TopicNotFound(topic_path.clone()))?;

        for queue in topic.subscriptions.values() {
            let mut state = queue.lock();
            state.pending.push_back(message.clone());
            queue.available.notify_one();
        }
        Ok(topic.subscriptions.len())
    }

    /// All `(topic path, subscription name)` pairs, in sorted order.
    pub fn subscriptions(&self) -> Vec<(String, String)> {
        self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .flat_map(|(path, topic)| {
                topic
                    .subscriptions
                    .keys()
                    .map(move |name| (path.clone(), name.clone()))
            })
            .collect()
    }

    /// Delete a subscription out-of-band. Receivers bound to it fault on
    /// their next receive.
    pub fn delete_subscription(&self, topic_path: &str, subscription_name: &str) -> bool {
        let removed = self
            .topics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(topic_path)
            .and_then(|topic| topic.subscriptions.remove(subscription_name));

        match removed {
            Some(queue) => {
                queue.lock().deleted = true;
                queue.available.notify_all();
                debug!(topic_path, subscription = subscription_name, "subscription deleted");
                true
            }
            None => false,
        }
    }

    /// Counters for one subscription.
    pub fn stats(&self, topic_path: &str, subscription_name: &str) -> Option<SubscriptionStats> {
        self.queue(topic_path, subscription_name).map(|queue| {
            let state = queue.lock();
            SubscriptionStats {
                pending: state.pending.len(),
                locked: state.locked.len(),
                completed: state.completed.len(),
                abandoned: state.abandoned.len(),
                dead_lettered: state.dead_letters.len(),
            }
        })
    }

    /// IDs of completed messages, in completion order.
    pub fn completed(&self, topic_path: &str, subscription_name: &str) -> Vec<String> {
        self.queue(topic_path, subscription_name)
            .map(|queue| queue.lock().completed.clone())
            .unwrap_or_default()
    }

    /// IDs of abandoned messages, one entry per abandon.
    pub fn abandoned(&self, topic_path: &str, subscription_name: &str) -> Vec<String> {
        self.queue(topic_path, subscription_name)
            .map(|queue| queue.lock().abandoned.clone())
            .unwrap_or_default()
    }

    /// Messages that exceeded the maximum delivery count.
    pub fn dead_letters(&self, topic_path: &str, subscription_name: &str) -> Vec<Message> {
        self.queue(topic_path, subscription_name)
            .map(|queue| queue.lock().dead_letters.clone())
            .unwrap_or_default()
    }

    fn queue(&self, topic_path: &str, subscription_name: &str) -> Option<Arc<SubscriptionQueue>> {
        self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(topic_path)?
            .subscriptions
            .get(subscription_name)
            .cloned()
    }
}

impl Broker for InMemoryBroker {
    fn ensure_subscription_exists(
        &self,
        event_type: &EventType,
        subscription_name: &str,
    ) -> Result<(), BrokerError> {
        if subscription_name.is_empty() {
            return Err(BrokerError::Rejected("empty subscription name".into()));
        }
        let topic_path = self.topic_path_for(event_type);
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        let topic = topics.entry(topic_path.clone()).or_default();

        if !topic.subscriptions.contains_key(subscription_name) {
            debug!(%event_type, %topic_path, subscription = subscription_name, "creating subscription");
            topic.subscriptions.insert(
                subscription_name.to_string(),
                Arc::new(SubscriptionQueue {
                    topic_path,
                    name: subscription_name.to_string(),
                    state: Mutex::new(QueueState::default()),
                    available: Condvar::new(),
                }),
            );
        }
        Ok(())
    }

    fn create_receiver(
        &self,
        topic_path: &str,
        subscription_name: &str,
    ) -> Result<Box<dyn Receiver>, BrokerError> {
        let queue = self.queue(topic_path, subscription_name).ok_or_else(|| {
            BrokerError::SubscriptionNotFound {
                topic_path: topic_path.to_string(),
                subscription: subscription_name.to_string(),
            }
        })?;

        Ok(Box::new(InMemoryReceiver {
            id: self.next_receiver_id.fetch_add(1, Ordering::Relaxed),
            queue,
            closed: AtomicBool::new(false),
            max_delivery_count: self.max_delivery_count,
        }))
    }
}

impl SubscriptionQueue {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Receiver bound to one in-memory subscription.
pub struct InMemoryReceiver {
    id: u64,
    queue: Arc<SubscriptionQueue>,
    closed: AtomicBool,
    max_delivery_count: u32,
}

impl InMemoryReceiver {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn unlock(&self, state: &mut QueueState, message: &Message) -> Result<Message, BrokerError> {
        match state.locked.get(&message.id) {
            Some((owner, _)) if *owner == self.id => state
                .locked
                .remove(&message.id)
                .map(|(_, locked)| locked)
                .ok_or_else(|| BrokerError::LockLost(message.id.clone())),
            _ => Err(BrokerError::LockLost(message.id.clone())),
        }
    }
}

impl Receiver for InMemoryReceiver {
    fn receive(&self, timeout: Duration) -> Result<Option<Message>, ReceiveError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.queue.lock();

        loop {
            if state.deleted {
                return Err(ReceiveError::SubscriptionDeleted {
                    topic_path: self.queue.topic_path.clone(),
                    subscription: self.queue.name.clone(),
                });
            }
            if self.is_closed() {
                return Err(ReceiveError::Closed);
            }

            if let Some(mut message) = state.pending.pop_front() {
                message.delivery_count += 1;
                state
                    .locked
                    .insert(message.id.clone(), (self.id, message.clone()));
                return Ok(Some(message));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            state = self
                .queue
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn complete(&self, message: &Message) -> Result<(), BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::ReceiverClosed);
        }
        let mut state = self.queue.lock();
        let settled = self.unlock(&mut state, message)?;
        state.completed.push(settled.id);
        Ok(())
    }

    fn abandon(&self, message: &Message, reason: &str) -> Result<(), BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::ReceiverClosed);
        }
        let mut state = self.queue.lock();
        let released = self.unlock(&mut state, message)?;
        state.abandoned.push(released.id.clone());

        if released.delivery_count >= self.max_delivery_count {
            warn!(
                message_id = %released.id,
                subscription = %self.queue.name,
                deliveries = released.delivery_count,
                reason,
                "max delivery count reached, dead-lettering message"
            );
            state.dead_letters.push(released);
        } else {
            state.pending.push_back(released);
            self.queue.available.notify_one();
        }
        Ok(())
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut state = self.queue.lock();
        let held: Vec<String> = state
            .locked
            .iter()
            .filter(|(_, (owner, _))| *owner == self.id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in held {
            if let Some((_, message)) = state.locked.remove(&id) {
                state.pending.push_front(message);
            }
        }
        self.queue.available.notify_all();
    }
}

impl Drop for InMemoryReceiver {
    fn drop(&mut self) {
        self.close();
    }
}
