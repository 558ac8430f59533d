//! Pump loop tests - settling messages, stopping, faulting, concurrency.

use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::{Duration, Instant};

use competing_pumps::bus::{InMemoryBroker, Message, JSON_CONTENT_TYPE, CONTENT_TYPE};
use competing_pumps::{ChannelObserver, PumpError, PumpSet, PumpStatus};

use crate::support::{
    config, factory, init_tracing, order_placed, order_shipped, wait_until, Handlers,
    ReserveStock,
};

const PLACED: &str = "t.orderplaced";
const SHIPPED: &str = "t.ordershipped";
const WAIT: Duration = Duration::from_secs(2);

// ============================================================================
// Test 1: Successful dispatch completes exactly once
// ============================================================================

#[test]
fn successful_dispatch_completes_once() {
    init_tracing();
    let broker = InMemoryBroker::new();
    let handlers = Handlers::default();
    let factory = factory(Arc::new(broker.clone()), &handlers, config("billing"));
    let (mut pumps, failures) = PumpSet::from_factory(&factory);
    assert!(failures.is_empty());
    assert!(pumps.start_all().is_empty());

    broker.publish(order_placed("msg-1", "o-1")).unwrap();
    broker.publish(order_shipped("msg-2", "o-1")).unwrap();

    assert!(wait_until(WAIT, || {
        broker.completed(PLACED, "billing").len() == 1
            && broker.completed(SHIPPED, "billing").len() == 1
    }));
    pumps.stop_all();

    assert_eq!(broker.completed(PLACED, "billing"), vec!["msg-1"]);
    assert!(broker.abandoned(PLACED, "billing").is_empty());
    assert_eq!(handlers.reserve_stock.calls.order_ids(), vec!["o-1"]);
    assert_eq!(handlers.send_receipt.calls.order_ids(), vec!["o-1"]);
    assert_eq!(handlers.notify_courier.calls.order_ids(), vec!["o-1"]);
}

// ============================================================================
// Test 2: Failed dispatch abandons exactly once, other handlers still run
// ============================================================================

#[test]
fn failed_dispatch_abandons_once() {
    // one delivery only, so the abandoned message is dead-lettered
    let broker = InMemoryBroker::with_max_delivery_count(1);
    let handlers = Handlers::with_reserve_stock(ReserveStock {
        out_of_stock: vec!["o-2".into()],
        ..Default::default()
    });
    let factory = factory(Arc::new(broker.clone()), &handlers, config("billing"));
    let mut pump = factory.create_all().next().unwrap().unwrap();
    pump.start().unwrap();

    broker.publish(order_placed("msg-1", "o-2")).unwrap();

    assert!(wait_until(WAIT, || broker.abandoned(PLACED, "billing").len() == 1));
    let stats = pump.stop();

    assert_eq!(broker.abandoned(PLACED, "billing"), vec!["msg-1"]);
    assert!(broker.completed(PLACED, "billing").is_empty());
    assert_eq!(broker.dead_letters(PLACED, "billing").len(), 1);
    assert_eq!(stats.messages_abandoned, 1);
    assert_eq!(stats.messages_completed, 0);

    // the failing handler did not keep the receipt from being sent
    assert_eq!(handlers.send_receipt.calls.order_ids(), vec!["o-2"]);
}

// ============================================================================
// Test 3: Abandoned messages are redelivered and can then succeed
// ============================================================================

#[test]
fn abandoned_message_is_redelivered_until_dead_lettered() {
    let broker = InMemoryBroker::with_max_delivery_count(3);
    let handlers = Handlers::with_reserve_stock(ReserveStock {
        out_of_stock: vec!["o-9".into()],
        ..Default::default()
    });
    let factory = factory(Arc::new(broker.clone()), &handlers, config("billing"));
    let mut pump = factory.create_all().next().unwrap().unwrap();
    pump.start().unwrap();

    broker.publish(order_placed("msg-1", "o-9")).unwrap();
    broker.publish(order_placed("msg-2", "o-1")).unwrap();

    assert!(wait_until(WAIT, || {
        broker.dead_letters(PLACED, "billing").len() == 1
            && broker.completed(PLACED, "billing").len() == 1
    }));
    pump.stop();

    assert_eq!(broker.abandoned(PLACED, "billing").len(), 3);
    let dead = broker.dead_letters(PLACED, "billing");
    assert_eq!(dead[0].id, "msg-1");
    assert_eq!(dead[0].delivery_count, 3);
}

// ============================================================================
// Test 4: Undecodable payloads are abandoned without invoking handlers
// ============================================================================

#[test]
fn undecodable_payload_is_abandoned() {
    let broker = InMemoryBroker::with_max_delivery_count(1);
    let handlers = Handlers::default();
    let factory = factory(Arc::new(broker.clone()), &handlers, config("billing"));
    let mut pump = factory.create_all().next().unwrap().unwrap();
    pump.start().unwrap();

    broker
        .publish(
            Message::new("msg-1", "OrderPlaced", b"not json".to_vec())
                .with_metadata(CONTENT_TYPE, JSON_CONTENT_TYPE),
        )
        .unwrap();

    assert!(wait_until(WAIT, || broker.abandoned(PLACED, "billing").len() == 1));
    pump.stop();

    assert_eq!(handlers.reserve_stock.calls.entered(), 0);
    assert_eq!(handlers.send_receipt.calls.entered(), 0);
}

// ============================================================================
// Test 5: Stop waits for the in-flight dispatch and settles it once
// ============================================================================

#[test]
fn stop_waits_for_in_flight_dispatch() {
    let broker = InMemoryBroker::new();
    let handlers = Handlers::with_reserve_stock(ReserveStock {
        delay: Some(Duration::from_millis(300)),
        ..Default::default()
    });
    let factory = factory(Arc::new(broker.clone()), &handlers, config("billing"));
    let mut pump = factory.create_all().next().unwrap().unwrap();
    pump.start().unwrap();

    broker.publish(order_placed("msg-1", "o-1")).unwrap();
    assert!(wait_until(WAIT, || handlers.reserve_stock.calls.entered() == 1));

    let stopping = Instant::now();
    let stats = pump.stop();

    // stop returned only after the slow handler finished
    assert!(stopping.elapsed() >= Duration::from_millis(100));
    assert_eq!(pump.status(), PumpStatus::Stopped);
    assert_eq!(stats.messages_completed, 1);
    assert_eq!(broker.completed(PLACED, "billing"), vec!["msg-1"]);
    assert!(broker.abandoned(PLACED, "billing").is_empty());

    // nothing is left locked or pending
    let subscription = broker.stats(PLACED, "billing").unwrap();
    assert_eq!(subscription.locked, 0);
    assert_eq!(subscription.pending, 0);
}

// ============================================================================
// Test 6: A deleted subscription faults only its own pump
// ============================================================================

#[test]
fn deleted_subscription_faults_only_its_pump() {
    init_tracing();
    let broker = InMemoryBroker::new();
    let handlers = Handlers::default();
    let (tx, rx) = channel();
    let factory = factory(Arc::new(broker.clone()), &handlers, config("billing"))
        .with_observer(Arc::new(ChannelObserver::new(tx)));
    let (mut pumps, _) = PumpSet::from_factory(&factory);
    pumps.start_all();

    assert!(broker.delete_subscription(SHIPPED, "billing"));
    assert!(wait_until(WAIT, || pumps.faulted().len() == 1));

    let faulted = pumps.faulted();
    assert_eq!(faulted[0].event_type(), "OrderShipped");
    assert_eq!(
        faulted[0].status().fault().unwrap().as_label(),
        "receive_subscription_deleted"
    );

    // the other pump keeps going
    broker.publish(order_placed("msg-1", "o-1")).unwrap();
    assert!(wait_until(WAIT, || broker.completed(PLACED, "billing").len() == 1));

    let statuses = pumps.statuses();
    assert_eq!(statuses[0].1, PumpStatus::Running);
    pumps.stop_all();

    let events: Vec<_> = rx.try_iter().collect();
    assert!(events
        .iter()
        .any(|e| e.event_type == "OrderShipped" && e.status.is_faulted()));
    assert!(events
        .iter()
        .any(|e| e.event_type == "OrderPlaced" && e.status == PumpStatus::Stopped));
    assert!(!events
        .iter()
        .any(|e| e.event_type == "OrderShipped" && e.status == PumpStatus::Stopped));
}

// ============================================================================
// Test 7: A faulted pump can be replaced by a fresh one
// ============================================================================

#[test]
fn faulted_pump_can_be_recreated() {
    let broker = InMemoryBroker::new();
    let handlers = Handlers::default();
    let factory = factory(Arc::new(broker.clone()), &handlers, config("billing"));
    let (mut pumps, _) = PumpSet::from_factory(&factory);
    pumps.start_all();

    broker.delete_subscription(SHIPPED, "billing");
    assert!(wait_until(WAIT, || pumps.faulted().len() == 1));
    let event_type = pumps.faulted()[0].event_type().clone();

    let replacement = factory.create(&event_type).unwrap();
    assert!(pumps.insert(replacement).is_some());
    assert!(pumps.start_all().is_empty());

    broker.publish(order_shipped("msg-1", "o-1")).unwrap();
    assert!(wait_until(WAIT, || handlers.notify_courier.calls.count() == 1));
    pumps.stop_all();
    assert!(pumps.faulted().is_empty());
}

// ============================================================================
// Test 8: Several workers dispatch concurrently from one receiver
// ============================================================================

#[test]
fn concurrent_dispatches_share_one_subscription() {
    let broker = InMemoryBroker::new();
    let handlers = Handlers::with_reserve_stock(ReserveStock {
        delay: Some(Duration::from_millis(50)),
        ..Default::default()
    });
    let factory = factory(
        Arc::new(broker.clone()),
        &handlers,
        config("billing").with_max_concurrent_dispatches(4),
    );
    let mut pump = factory.create_all().next().unwrap().unwrap();
    pump.start().unwrap();

    for i in 0..8 {
        broker
            .publish(order_placed(&format!("msg-{i}"), &format!("o-{i}")))
            .unwrap();
    }

    assert!(wait_until(WAIT, || broker.completed(PLACED, "billing").len() == 8));
    let stats = pump.stop();

    assert_eq!(stats.messages_completed, 8);
    assert!(handlers.reserve_stock.calls.peak() > 1);
    assert!(handlers.reserve_stock.calls.peak() <= 4);

    let mut order_ids = handlers.reserve_stock.calls.order_ids();
    order_ids.sort();
    order_ids.dedup();
    assert_eq!(order_ids.len(), 8);
}

// ============================================================================
// Test 9: Grace period bounds how long stop waits
// ============================================================================

#[test]
fn grace_exceeded_still_stops_the_pump() {
    let broker = InMemoryBroker::new();
    let handlers = Handlers::with_reserve_stock(ReserveStock {
        delay: Some(Duration::from_millis(500)),
        ..Default::default()
    });
    let factory = factory(Arc::new(broker.clone()), &handlers, config("billing"));
    let mut pump = factory.create_all().next().unwrap().unwrap();
    pump.start().unwrap();

    broker.publish(order_placed("msg-1", "o-1")).unwrap();
    assert!(wait_until(WAIT, || handlers.reserve_stock.calls.entered() == 1));

    let stopping = Instant::now();
    let result = pump.stop_with_grace(Duration::from_millis(20));

    assert!(stopping.elapsed() < Duration::from_millis(400));
    match result {
        Err(PumpError::GraceExceeded { stuck, .. }) => assert_eq!(stuck, 1),
        other => panic!("expected grace exceeded, got {other:?}"),
    }
    assert_eq!(pump.status(), PumpStatus::Stopped);

    // the released receiver put the unsettled message back
    assert!(wait_until(WAIT, || {
        broker.stats(PLACED, "billing").unwrap().pending == 1
    }));
    assert!(broker.completed(PLACED, "billing").is_empty());
}

// ============================================================================
// Test 10: Idle pumps notice a stop within the receive timeout
// ============================================================================

#[test]
fn idle_pump_stops_promptly() {
    let broker = InMemoryBroker::new();
    let handlers = Handlers::default();
    let factory = factory(Arc::new(broker.clone()), &handlers, config("billing"));
    let mut pump = factory.create_all().next().unwrap().unwrap();
    pump.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let stopping = Instant::now();
    let stats = pump.stop();

    assert!(stopping.elapsed() < Duration::from_millis(500));
    assert!(stats.polls >= 1);
    assert_eq!(pump.status(), PumpStatus::Stopped);
}
