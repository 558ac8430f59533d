//! Handler traits and the type-erased handler the dispatcher invokes.

use std::any::{type_name, Any};
use std::marker::PhantomData;
use std::sync::Arc;

use super::error::HandlerError;
use super::event::CompetingEvent;
use super::registry::HandlerDescriptor;

/// Handles one competing event type.
///
/// A handler type may implement this for several event types; each one it
/// wants pumped must also be declared in [`CompetingEventHandler::declare`].
pub trait HandleCompetingEvent<E: CompetingEvent>: Send + Sync {
    fn handle(&self, event: &E) -> Result<(), HandlerError>;
}

/// A handler type that can be registered with a
/// [`HandlerRegistry`](super::HandlerRegistry).
///
/// `declare` lists the event types the handler is interested in. Each
/// `handles::<E>()` call only compiles if the handler implements
/// `HandleCompetingEvent<E>`.
///
/// ## Example
///
/// ```
/// use competing_pumps::{
///     CompetingEvent, CompetingEventHandler, HandleCompetingEvent, HandlerError, Interests,
/// };
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct OrderPlaced { order_id: String }
/// impl CompetingEvent for OrderPlaced {
///     const EVENT_TYPE: &'static str = "OrderPlaced";
/// }
///
/// struct SendReceipt;
///
/// impl HandleCompetingEvent<OrderPlaced> for SendReceipt {
///     fn handle(&self, event: &OrderPlaced) -> Result<(), HandlerError> {
///         println!("receipt for {}", event.order_id);
///         Ok(())
///     }
/// }
///
/// impl CompetingEventHandler for SendReceipt {
///     fn declare(interests: &mut Interests<Self>) {
///         interests.handles::<OrderPlaced>();
///     }
/// }
/// ```
pub trait CompetingEventHandler: Send + Sync + Sized + 'static {
    /// Declare every event type this handler consumes.
    fn declare(interests: &mut Interests<Self>);

    /// Name used in logs and dispatch failures.
    fn handler_type() -> &'static str {
        type_name::<Self>()
    }
}

/// Collects the event types a handler type declares.
pub struct Interests<H> {
    descriptors: Vec<HandlerDescriptor>,
    _handler: PhantomData<fn() -> H>,
}

impl<H: CompetingEventHandler> Interests<H> {
    pub(crate) fn new() -> Self {
        Self {
            descriptors: Vec::new(),
            _handler: PhantomData,
        }
    }

    /// Declare that `H` consumes `E`.
    pub fn handles<E>(&mut self) -> &mut Self
    where
        E: CompetingEvent,
        H: HandleCompetingEvent<E>,
    {
        self.descriptors.push(HandlerDescriptor::of::<H, E>());
        self
    }

    pub(crate) fn into_descriptors(self) -> Vec<HandlerDescriptor> {
        self.descriptors
    }
}

/// A handler instance bound to one event type, with the event type erased.
///
/// Produced from registered handlers, or with [`bind`] for hand-built
/// dispatchers.
pub trait DynHandler: Send + Sync {
    /// Name used in logs and dispatch failures.
    fn handler_type(&self) -> &str;

    /// Invoke the handler with an already decoded event.
    fn handle_event(&self, event: &dyn Any) -> Result<(), HandlerError>;
}

struct Bound<H, E> {
    handler: Arc<H>,
    handler_type: &'static str,
    _event: PhantomData<fn(&E)>,
}

impl<H, E> DynHandler for Bound<H, E>
where
    E: CompetingEvent,
    H: HandleCompetingEvent<E>,
{
    fn handler_type(&self) -> &str {
        self.handler_type
    }

    fn handle_event(&self, event: &dyn Any) -> Result<(), HandlerError> {
        let event = event
            .downcast_ref::<E>()
            .ok_or(HandlerError::EventTypeMismatch {
                expected: type_name::<E>(),
            })?;
        self.handler.handle(event)
    }
}

/// Bind a handler instance to the event type `E`.
pub fn bind<H, E>(handler: Arc<H>) -> Arc<dyn DynHandler>
where
    E: CompetingEvent,
    H: HandleCompetingEvent<E> + 'static,
{
    bind_as::<H, E>(handler, type_name::<H>())
}

pub(crate) fn bind_as<H, E>(handler: Arc<H>, handler_type: &'static str) -> Arc<dyn DynHandler>
where
    E: CompetingEvent,
    H: HandleCompetingEvent<E> + 'static,
{
    Arc::new(Bound::<H, E> {
        handler,
        handler_type,
        _event: PhantomData,
    })
}
