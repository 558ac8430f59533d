//! Shared fixtures for the pump integration tests.
//!
//! - `OrderPlaced` / `OrderShipped` events
//! - `ReserveStock` and `SendReceipt` (both on `OrderPlaced`) and
//!   `NotifyCourier` (on `OrderShipped`) handler doubles that record calls
//! - `FlakyBroker`, an `InMemoryBroker` wrapper that refuses to provision
//!   chosen event types

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use competing_pumps::bus::{Broker, BrokerError, InMemoryBroker, Message, Receiver};
use competing_pumps::{
    CompetingEvent, CompetingEventHandler, CompetingEventPumpsFactory, Components, EventType,
    HandleCompetingEvent, HandlerError, HandlerRegistry, Interests, PumpConfig,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: String,
}

impl CompetingEvent for OrderPlaced {
    const EVENT_TYPE: &'static str = "OrderPlaced";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderShipped {
    pub order_id: String,
    pub carrier: String,
}

impl CompetingEvent for OrderShipped {
    const EVENT_TYPE: &'static str = "OrderShipped";
}

pub fn order_placed(message_id: &str, order_id: &str) -> Message {
    Message::encode(
        message_id,
        OrderPlaced::EVENT_TYPE,
        &OrderPlaced {
            order_id: order_id.into(),
        },
    )
    .unwrap()
}

pub fn order_shipped(message_id: &str, order_id: &str) -> Message {
    Message::encode(
        message_id,
        OrderShipped::EVENT_TYPE,
        &OrderShipped {
            order_id: order_id.into(),
            carrier: "ups".into(),
        },
    )
    .unwrap()
}

// ============================================================================
// Handler doubles
// ============================================================================

/// Call journal shared by the handler doubles.
#[derive(Default)]
pub struct Calls {
    order_ids: Mutex<Vec<String>>,
    entered: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Calls {
    fn enter(&self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self, order_id: &str) {
        self.order_ids.lock().unwrap().push(order_id.to_string());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Order ids of finished calls, in finishing order.
    pub fn order_ids(&self) -> Vec<String> {
        self.order_ids.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.order_ids.lock().unwrap().len()
    }

    /// Calls that have started, finished or not.
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous calls seen.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Handler A: reserves stock for placed orders.
#[derive(Default)]
pub struct ReserveStock {
    pub calls: Calls,
    /// Orders rejected as out of stock.
    pub out_of_stock: Vec<String>,
    /// Simulated work per call.
    pub delay: Option<Duration>,
}

impl HandleCompetingEvent<OrderPlaced> for ReserveStock {
    fn handle(&self, event: &OrderPlaced) -> Result<(), HandlerError> {
        self.calls.enter();
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.calls.leave(&event.order_id);

        if self.out_of_stock.contains(&event.order_id) {
            return Err(HandlerError::Rejected(format!(
                "order {} is out of stock",
                event.order_id
            )));
        }
        Ok(())
    }
}

impl CompetingEventHandler for ReserveStock {
    fn declare(interests: &mut Interests<Self>) {
        interests.handles::<OrderPlaced>();
    }

    fn handler_type() -> &'static str {
        "ReserveStock"
    }
}

/// Handler B: e-mails a receipt for placed orders.
#[derive(Default)]
pub struct SendReceipt {
    pub calls: Calls,
}

impl HandleCompetingEvent<OrderPlaced> for SendReceipt {
    fn handle(&self, event: &OrderPlaced) -> Result<(), HandlerError> {
        self.calls.enter();
        self.calls.leave(&event.order_id);
        Ok(())
    }
}

impl CompetingEventHandler for SendReceipt {
    fn declare(interests: &mut Interests<Self>) {
        interests.handles::<OrderPlaced>();
    }

    fn handler_type() -> &'static str {
        "SendReceipt"
    }
}

/// Handler C: tells the courier about shipped orders.
#[derive(Default)]
pub struct NotifyCourier {
    pub calls: Calls,
}

impl HandleCompetingEvent<OrderShipped> for NotifyCourier {
    fn handle(&self, event: &OrderShipped) -> Result<(), HandlerError> {
        self.calls.enter();
        self.calls.leave(&event.order_id);
        Ok(())
    }
}

impl CompetingEventHandler for NotifyCourier {
    fn declare(interests: &mut Interests<Self>) {
        interests.handles::<OrderShipped>();
    }

    fn handler_type() -> &'static str {
        "NotifyCourier"
    }
}

/// Handler instances of one application instance, kept by the test so it
/// can inspect them after the pumps ran.
#[derive(Clone)]
pub struct Handlers {
    pub reserve_stock: Arc<ReserveStock>,
    pub send_receipt: Arc<SendReceipt>,
    pub notify_courier: Arc<NotifyCourier>,
}

impl Default for Handlers {
    fn default() -> Self {
        Self::with_reserve_stock(ReserveStock::default())
    }
}

impl Handlers {
    pub fn with_reserve_stock(reserve_stock: ReserveStock) -> Self {
        Self {
            reserve_stock: Arc::new(reserve_stock),
            send_receipt: Arc::new(SendReceipt::default()),
            notify_courier: Arc::new(NotifyCourier::default()),
        }
    }

    pub fn components(&self) -> Components {
        Components::new()
            .with_shared(Arc::clone(&self.reserve_stock))
            .with_shared(Arc::clone(&self.send_receipt))
            .with_shared(Arc::clone(&self.notify_courier))
    }
}

/// A, B and C registered.
pub fn registry() -> HandlerRegistry {
    HandlerRegistry::new()
        .register::<ReserveStock>()
        .register::<SendReceipt>()
        .register::<NotifyCourier>()
}

/// Test config with a short receive timeout so stops are quick.
pub fn config(application_name: &str) -> PumpConfig {
    PumpConfig::new(application_name).with_receive_timeout(Duration::from_millis(20))
}

pub fn factory(
    broker: Arc<dyn Broker>,
    handlers: &Handlers,
    config: PumpConfig,
) -> CompetingEventPumpsFactory {
    CompetingEventPumpsFactory::new(broker, registry(), Arc::new(handlers.components()), config)
        .unwrap()
}

// ============================================================================
// Broker doubles
// ============================================================================

/// In-memory broker that refuses to provision the configured event types and
/// records every `ensure_subscription_exists` call.
pub struct FlakyBroker {
    inner: InMemoryBroker,
    failing: Vec<EventType>,
    ensure_calls: Mutex<Vec<(EventType, String)>>,
}

impl FlakyBroker {
    pub fn new(inner: InMemoryBroker) -> Self {
        Self {
            inner,
            failing: Vec::new(),
            ensure_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_for(mut self, event_type: &'static str) -> Self {
        self.failing.push(EventType::from_static(event_type));
        self
    }

    pub fn ensure_calls(&self) -> Vec<(EventType, String)> {
        self.ensure_calls.lock().unwrap().clone()
    }
}

impl Broker for FlakyBroker {
    fn ensure_subscription_exists(
        &self,
        event_type: &EventType,
        subscription_name: &str,
    ) -> Result<(), BrokerError> {
        self.ensure_calls
            .lock()
            .unwrap()
            .push((event_type.clone(), subscription_name.to_string()));

        if self.failing.contains(event_type) {
            return Err(BrokerError::ConnectionFailed(format!(
                "namespace unreachable while provisioning {}",
                event_type
            )));
        }
        self.inner
            .ensure_subscription_exists(event_type, subscription_name)
    }

    fn create_receiver(
        &self,
        topic_path: &str,
        subscription_name: &str,
    ) -> Result<Box<dyn Receiver>, BrokerError> {
        self.inner.create_receiver(topic_path, subscription_name)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Install a test-friendly tracing subscriber (`RUST_LOG` controls output).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
