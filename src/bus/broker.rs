//! Broker and receiver traits.

use std::time::Duration;

use super::error::{BrokerError, ReceiveError};
use super::message::Message;
use crate::naming;
use crate::EventType;

/// Provisions subscriptions and hands out receivers bound to them.
///
/// Implementations might include:
/// - `InMemoryBroker` - For testing and single-process scenarios
/// - an Azure Service Bus / SNS+SQS / NATS JetStream adapter
pub trait Broker: Send + Sync {
    /// Make sure the subscription exists on the event type's topic, creating
    /// topic and subscription if needed.
    ///
    /// Must be idempotent: calling it for an existing subscription is a no-op.
    fn ensure_subscription_exists(
        &self,
        event_type: &EventType,
        subscription_name: &str,
    ) -> Result<(), BrokerError>;

    /// Topic path the event type is published to.
    fn topic_path_for(&self, event_type: &EventType) -> String {
        naming::topic_path_for(event_type)
    }

    /// Create a receiver pulling from `topic_path/subscription_name`.
    fn create_receiver(
        &self,
        topic_path: &str,
        subscription_name: &str,
    ) -> Result<Box<dyn Receiver>, BrokerError>;
}

/// Pull-based, peek-lock receiver bound to one subscription.
///
/// Receivers are shared between the workers of one pump, so every method
/// takes `&self`.
pub trait Receiver: Send + Sync {
    /// Wait for the next message, up to `timeout`.
    ///
    /// Returns `Ok(None)` when the timeout elapses with nothing to deliver.
    /// The returned message is locked to this receiver until completed or
    /// abandoned.
    fn receive(&self, timeout: Duration) -> Result<Option<Message>, ReceiveError>;

    /// Settle the message as successfully processed.
    fn complete(&self, message: &Message) -> Result<(), BrokerError>;

    /// Release the lock so the broker may redeliver the message.
    fn abandon(&self, message: &Message, reason: &str) -> Result<(), BrokerError>;

    /// Release the underlying resources. Subsequent receives fail with
    /// [`ReceiveError::Closed`].
    fn close(&self);
}

impl<B: Broker + ?Sized> Broker for std::sync::Arc<B> {
    fn ensure_subscription_exists(
        &self,
        event_type: &EventType,
        subscription_name: &str,
    ) -> Result<(), BrokerError> {
        (**self).ensure_subscription_exists(event_type, subscription_name)
    }

    fn topic_path_for(&self, event_type: &EventType) -> String {
        (**self).topic_path_for(event_type)
    }

    fn create_receiver(
        &self,
        topic_path: &str,
        subscription_name: &str,
    ) -> Result<Box<dyn Receiver>, BrokerError> {
        (**self).create_receiver(topic_path, subscription_name)
    }
}
