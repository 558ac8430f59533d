//! Broker abstractions - subscriptions, receivers and messages.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Broker (one per application)                 │
//! │  ensure_subscription_exists() / topic_path_for()            │
//! │  create_receiver(topic, subscription)                        │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Receiver (one per message pump)                │
//! │  receive(timeout) / complete(msg) / abandon(msg) / close()   │
//! └─────────────────────────────────────────────────────────────┘
//!          │                  │                     │
//!          ▼                  ▼                     ▼
//! ┌──────────────┐    ┌──────────────┐    ┌─────────────────────┐
//! │InMemoryBroker│    │ Service Bus  │    │  JetStream / SQS    │
//! │  (included)  │    │  (external)  │    │    (external)       │
//! └──────────────┘    └──────────────┘    └─────────────────────┘
//! ```
//!
//! Receivers are peek-lock: a received message stays locked to the receiver
//! until it is completed (removed) or abandoned (made available for
//! redelivery). Receivers bound to the same subscription compete, so each
//! message goes to exactly one of them.

mod broker;
mod error;
mod in_memory_broker;
mod message;

pub use broker::{Broker, Receiver};
pub use error::{BrokerError, ReceiveError};
pub use in_memory_broker::{
    InMemoryBroker, InMemoryReceiver, SubscriptionStats, DEFAULT_MAX_DELIVERY_COUNT,
};
pub use message::{Message, BITCODE_CONTENT_TYPE, CONTENT_TYPE, JSON_CONTENT_TYPE};
