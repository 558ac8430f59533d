//! Routes a received message to the handlers of its event type.
//!
//! A `CompetingEventDispatcher` holds the handler instances for one event
//! type. They are resolved once, when the dispatcher is built, and shared
//! read-only with every dispatch afterwards.
//!
//! ## Example
//!
//! ```ignore
//! use competing_pumps::dispatch::{CompetingEventDispatcher, Dispatcher};
//!
//! let dispatcher = CompetingEventDispatcher::for_event::<OrderPlaced>()
//!     .handler::<OrderPlaced, _>(Arc::new(SendReceipt::default()))
//!     .handler::<OrderPlaced, _>(Arc::new(ReserveStock::default()));
//!
//! let msg = Message::encode("msg-1", "OrderPlaced", &OrderPlaced { order_id: "o-1".into() })?;
//! dispatcher.dispatch(&msg)?;
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

use super::error::{DispatchError, HandlerFailure};
use crate::bus::Message;
use crate::handler::{
    bind, decode_event, CompetingEvent, Decoder, DynHandler, HandleCompetingEvent, HandlerError,
};
use crate::EventType;

/// Hands a message to the handlers interested in one event type.
pub trait Dispatcher: Send + Sync {
    /// The event type this dispatcher routes.
    fn event_type(&self) -> &EventType;

    /// Invoke every interested handler with the message.
    ///
    /// Succeeds only if every handler succeeded. Never retries.
    fn dispatch(&self, message: &Message) -> Result<(), DispatchError>;

    /// Names of the handlers, in invocation order.
    fn handler_types(&self) -> Vec<&str> {
        Vec::new()
    }
}

/// Dispatcher for one competing event type.
pub struct CompetingEventDispatcher {
    event_type: EventType,
    decode: Decoder,
    handlers: Vec<Arc<dyn DynHandler>>,
}

impl CompetingEventDispatcher {
    /// Start a dispatcher for `E` with no handlers.
    pub fn for_event<E: CompetingEvent>() -> Self {
        Self {
            event_type: E::event_type(),
            decode: decode_event::<E>,
            handlers: Vec::new(),
        }
    }

    /// Dispatcher from already bound handlers.
    pub fn from_parts(
        event_type: EventType,
        decode: Decoder,
        handlers: Vec<Arc<dyn DynHandler>>,
    ) -> Self {
        Self {
            event_type,
            decode,
            handlers,
        }
    }

    /// Add a handler instance.
    ///
    /// Uses builder pattern - returns `self` for chaining.
    pub fn handler<E, H>(mut self, handler: Arc<H>) -> Self
    where
        E: CompetingEvent,
        H: HandleCompetingEvent<E> + 'static,
    {
        self.handlers.push(bind::<H, E>(handler));
        self
    }

    fn invoke(handler: &dyn DynHandler, event: &dyn Any) -> Result<(), HandlerError> {
        panic::catch_unwind(AssertUnwindSafe(|| handler.handle_event(event)))
            .unwrap_or_else(|payload| Err(HandlerError::Panicked(panic_reason(payload.as_ref()))))
    }
}

/// Message carried by a caught panic.
pub(crate) fn panic_reason(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

impl Dispatcher for CompetingEventDispatcher {
    fn event_type(&self) -> &EventType {
        &self.event_type
    }

    fn dispatch(&self, message: &Message) -> Result<(), DispatchError> {
        if self.event_type != message.event_type.as_str() {
            return Err(DispatchError::UnexpectedEventType {
                message_id: message.id.clone(),
                expected: self.event_type.clone(),
                actual: message.event_type.clone(),
            });
        }

        let event = (self.decode)(message).map_err(|reason| DispatchError::Decode {
            event_type: self.event_type.clone(),
            message_id: message.id.clone(),
            reason,
        })?;

        let mut failures = Vec::new();
        for handler in &self.handlers {
            if let Err(error) = Self::invoke(handler.as_ref(), event.as_ref()) {
                warn!(
                    event_type = %self.event_type,
                    message_id = %message.id,
                    handler = handler.handler_type(),
                    error = %error,
                    "handler failed"
                );
                failures.push(HandlerFailure {
                    handler_type: handler.handler_type().to_string(),
                    error,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DispatchError::HandlersFailed {
                event_type: self.event_type.clone(),
                message_id: message.id.clone(),
                attempted: self.handlers.len(),
                failures,
            })
        }
    }

    fn handler_types(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.handler_type()).collect()
    }
}
