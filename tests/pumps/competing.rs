//! Competing instances - one subscription per application, shared by its
//! instances.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use competing_pumps::bus::InMemoryBroker;
use competing_pumps::PumpSet;

use crate::support::{config, factory, init_tracing, order_placed, wait_until, Handlers};

const PLACED: &str = "t.orderplaced";

// ============================================================================
// Test 1: Instances of one application split the messages between them
// ============================================================================

#[test]
fn instances_of_one_application_compete() {
    init_tracing();
    let broker = InMemoryBroker::new();

    let first = Handlers::default();
    let second = Handlers::default();
    let first_factory = factory(Arc::new(broker.clone()), &first, config("billing"));
    let second_factory = factory(Arc::new(broker.clone()), &second, config("billing"));

    let (mut first_pumps, _) = PumpSet::from_factory(&first_factory);
    let (mut second_pumps, _) = PumpSet::from_factory(&second_factory);
    first_pumps.start_all();
    second_pumps.start_all();

    // both instances share the one subscription
    assert_eq!(broker.subscriptions().len(), 2);

    for i in 0..20 {
        broker
            .publish(order_placed(&format!("msg-{i}"), &format!("o-{i}")))
            .unwrap();
    }

    assert!(wait_until(Duration::from_secs(3), || {
        broker.completed(PLACED, "billing").len() == 20
    }));
    first_pumps.stop_all();
    second_pumps.stop_all();

    let seen_first: HashSet<String> = first.reserve_stock.calls.order_ids().into_iter().collect();
    let seen_second: HashSet<String> =
        second.reserve_stock.calls.order_ids().into_iter().collect();

    // every order handled exactly once across the instances
    assert!(seen_first.is_disjoint(&seen_second));
    assert_eq!(seen_first.len() + seen_second.len(), 20);
    assert_eq!(
        first.send_receipt.calls.count() + second.send_receipt.calls.count(),
        20
    );
}

// ============================================================================
// Test 2: Different applications each receive every message
// ============================================================================

#[test]
fn different_applications_each_get_every_message() {
    let broker = InMemoryBroker::new();

    let billing = Handlers::default();
    let warehouse = Handlers::default();
    let billing_factory = factory(Arc::new(broker.clone()), &billing, config("billing"));
    let warehouse_factory = factory(Arc::new(broker.clone()), &warehouse, config("warehouse"));

    let (mut billing_pumps, _) = PumpSet::from_factory(&billing_factory);
    let (mut warehouse_pumps, _) = PumpSet::from_factory(&warehouse_factory);
    billing_pumps.start_all();
    warehouse_pumps.start_all();

    for i in 0..5 {
        let delivered = broker
            .publish(order_placed(&format!("msg-{i}"), &format!("o-{i}")))
            .unwrap();
        assert_eq!(delivered, 2);
    }

    assert!(wait_until(Duration::from_secs(2), || {
        billing.reserve_stock.calls.count() == 5 && warehouse.reserve_stock.calls.count() == 5
    }));
    billing_pumps.stop_all();
    warehouse_pumps.stop_all();

    assert_eq!(broker.completed(PLACED, "billing").len(), 5);
    assert_eq!(broker.completed(PLACED, "warehouse").len(), 5);
}
