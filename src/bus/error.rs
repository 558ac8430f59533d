//! Error types for broker and receiver operations.

use std::error::Error;

use thiserror::Error;

/// Failure reported by a broker while provisioning or settling messages.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Connection to the broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// The topic does not exist and could not be created.
    #[error("topic not found: {0}")]
    TopicNotFound(String),
    /// The subscription does not exist.
    #[error("subscription not found: {topic_path}/{subscription}")]
    SubscriptionNotFound {
        topic_path: String,
        subscription: String,
    },
    /// The message lock was lost or the message was already settled.
    #[error("message {0} is not locked by this receiver")]
    LockLost(String),
    /// The receiver was closed before the operation.
    #[error("receiver closed")]
    ReceiverClosed,
    /// The broker rejected the request.
    #[error("rejected: {0}")]
    Rejected(String),
    /// Other error.
    #[error("broker error: {0}")]
    Other(Box<dyn Error + Send + Sync>),
}

impl BrokerError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            BrokerError::ConnectionFailed(_) => "broker_connection_failed",
            BrokerError::TopicNotFound(_) => "broker_topic_not_found",
            BrokerError::SubscriptionNotFound { .. } => "broker_subscription_not_found",
            BrokerError::LockLost(_) => "broker_lock_lost",
            BrokerError::ReceiverClosed => "broker_receiver_closed",
            BrokerError::Rejected(_) => "broker_rejected",
            BrokerError::Other(_) => "broker_other",
        }
    }
}

/// Transport-level failure while waiting for the next message.
///
/// Any of these makes the receiving pump fault; none is retried by the pump.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ReceiveError {
    /// The subscription was deleted out-of-band.
    #[error("subscription {topic_path}/{subscription} no longer exists")]
    SubscriptionDeleted {
        topic_path: String,
        subscription: String,
    },
    /// The receiver was closed.
    #[error("receiver closed")]
    Closed,
    /// Connection to the broker was lost.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
    /// The receiver, or a worker using it, panicked.
    #[error("receiver panicked: {0}")]
    Panicked(String),
    /// Other error.
    #[error("receive failed: {0}")]
    Other(Box<dyn Error + Send + Sync>),
}

impl ReceiveError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ReceiveError::SubscriptionDeleted { .. } => "receive_subscription_deleted",
            ReceiveError::Closed => "receive_closed",
            ReceiveError::ConnectionLost(_) => "receive_connection_lost",
            ReceiveError::Panicked(_) => "receive_panicked",
            ReceiveError::Other(_) => "receive_other",
        }
    }
}
