//! Error types for dispatching a message to its handlers.

use thiserror::Error;

use crate::handler::HandlerError;
use crate::EventType;

/// One handler's failure while processing a message.
#[derive(Error, Debug)]
#[error("{handler_type}: {error}")]
pub struct HandlerFailure {
    pub handler_type: String,
    #[source]
    pub error: HandlerError,
}

/// A message could not be fully processed. The pump abandons it so the broker
/// can redeliver it.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The message does not carry the dispatcher's event type.
    #[error("message {message_id} carries {actual}, dispatcher handles {expected}")]
    UnexpectedEventType {
        message_id: String,
        expected: EventType,
        actual: String,
    },
    /// The payload could not be decoded into the event.
    #[error("could not decode message {message_id} as {event_type}: {reason}")]
    Decode {
        event_type: EventType,
        message_id: String,
        reason: String,
    },
    /// One or more handlers failed; the others were still invoked.
    #[error(
        "{} of {attempted} handlers failed for message {message_id} ({event_type})",
        .failures.len()
    )]
    HandlersFailed {
        event_type: EventType,
        message_id: String,
        attempted: usize,
        failures: Vec<HandlerFailure>,
    },
    /// The dispatcher itself panicked.
    #[error("dispatcher for {event_type} panicked on message {message_id}: {reason}")]
    Panicked {
        event_type: EventType,
        message_id: String,
        reason: String,
    },
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::UnexpectedEventType { .. } => "dispatch_unexpected_event_type",
            DispatchError::Decode { .. } => "dispatch_decode_failed",
            DispatchError::HandlersFailed { .. } => "dispatch_handlers_failed",
            DispatchError::Panicked { .. } => "dispatch_panicked",
        }
    }

    /// Handler failures, empty unless handlers ran.
    pub fn failures(&self) -> &[HandlerFailure] {
        match self {
            DispatchError::HandlersFailed { failures, .. } => failures,
            _ => &[],
        }
    }
}
