//! Error types for building and running pumps.

use std::time::Duration;

use thiserror::Error;

use crate::bus::BrokerError;
use crate::handler::ResolutionError;
use crate::EventType;

/// Setting up the pump for one event type failed.
///
/// Reported per event type; the other event types are still attempted.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProvisioningError {
    /// The broker could not create or verify the subscription.
    #[error("could not ensure subscription {subscription} for {event_type}: {source}")]
    Subscription {
        event_type: EventType,
        subscription: String,
        #[source]
        source: BrokerError,
    },
    /// The broker could not create a receiver.
    #[error("could not create receiver on {topic_path}/{subscription} for {event_type}: {source}")]
    Receiver {
        event_type: EventType,
        topic_path: String,
        subscription: String,
        #[source]
        source: BrokerError,
    },
    /// A handler instance could not be resolved.
    #[error("could not resolve handler {handler_type} for {event_type}: {source}")]
    Resolution {
        event_type: EventType,
        handler_type: &'static str,
        #[source]
        source: ResolutionError,
    },
    /// Different Rust types were declared under the same canonical name.
    #[error("{event_type} is declared by different types: {}", .rust_types.join(", "))]
    ConflictingEventTypes {
        event_type: EventType,
        rust_types: Vec<&'static str>,
    },
    /// Another registered event type maps to the same topic path.
    #[error("{event_type} shares topic {topic_path} with {}", .colliding.iter().map(|t| t.name()).collect::<Vec<_>>().join(", "))]
    TopicCollision {
        event_type: EventType,
        topic_path: String,
        colliding: Vec<EventType>,
    },
    /// No registered handler declares the event type.
    #[error("no handler is registered for {event_type}")]
    NoHandlers { event_type: EventType },
}

impl ProvisioningError {
    /// The event type whose pump could not be built.
    pub fn event_type(&self) -> &EventType {
        match self {
            ProvisioningError::Subscription { event_type, .. }
            | ProvisioningError::Receiver { event_type, .. }
            | ProvisioningError::Resolution { event_type, .. }
            | ProvisioningError::ConflictingEventTypes { event_type, .. }
            | ProvisioningError::TopicCollision { event_type, .. }
            | ProvisioningError::NoHandlers { event_type } => event_type,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProvisioningError::Subscription { .. } => "provisioning_subscription",
            ProvisioningError::Receiver { .. } => "provisioning_receiver",
            ProvisioningError::Resolution { .. } => "provisioning_resolution",
            ProvisioningError::ConflictingEventTypes { .. } => "provisioning_conflicting_types",
            ProvisioningError::TopicCollision { .. } => "provisioning_topic_collision",
            ProvisioningError::NoHandlers { .. } => "provisioning_no_handlers",
        }
    }
}

/// Misuse of, or shutdown trouble with, a running pump.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PumpError {
    /// `start` was called on a pump that is not in the `Created` state.
    #[error("pump for {event_type} cannot start from state {status}")]
    NotStartable {
        event_type: EventType,
        status: &'static str,
    },
    /// A worker thread could not be spawned.
    #[error("could not spawn pump worker for {event_type}: {source}")]
    Spawn {
        event_type: EventType,
        #[source]
        source: std::io::Error,
    },
    /// In-flight dispatches did not finish within the grace period. The pump
    /// was stopped anyway and the stuck workers were detached.
    #[error("pump for {event_type}: {stuck} worker(s) still busy after {grace:?}")]
    GraceExceeded {
        event_type: EventType,
        grace: Duration,
        stuck: usize,
    },
}

impl PumpError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            PumpError::NotStartable { .. } => "pump_not_startable",
            PumpError::Spawn { .. } => "pump_spawn_failed",
            PumpError::GraceExceeded { .. } => "pump_grace_exceeded",
        }
    }
}
