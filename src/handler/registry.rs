//! Explicit registry of competing event handler types.

use std::any::{type_name, Any, TypeId};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::components::Resolver;
use super::error::ResolutionError;
use super::event::CompetingEvent;
use super::handler::{bind_as, CompetingEventHandler, DynHandler, HandleCompetingEvent, Interests};
use crate::bus::Message;
use crate::EventType;

/// Decodes a message payload into the declared event's Rust type.
pub type Decoder = fn(&Message) -> Result<Box<dyn Any + Send>, String>;

type Binder = fn(&dyn Resolver) -> Result<Arc<dyn DynHandler>, ResolutionError>;

/// One (handler type, event type) interest declaration.
#[derive(Clone)]
pub struct HandlerDescriptor {
    handler_type: &'static str,
    handler_type_id: TypeId,
    event_type: EventType,
    event_type_id: TypeId,
    event_rust_type: &'static str,
    decode: Decoder,
    bind: Binder,
}

impl HandlerDescriptor {
    pub(crate) fn of<H, E>() -> Self
    where
        E: CompetingEvent,
        H: CompetingEventHandler + HandleCompetingEvent<E>,
    {
        Self {
            handler_type: H::handler_type(),
            handler_type_id: TypeId::of::<H>(),
            event_type: E::event_type(),
            event_type_id: TypeId::of::<E>(),
            event_rust_type: type_name::<E>(),
            decode: decode_event::<E>,
            bind: resolve_and_bind::<H, E>,
        }
    }

    /// Name of the handler type.
    pub fn handler_type(&self) -> &'static str {
        self.handler_type
    }

    /// Event type the handler declared.
    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    /// Rust type name of the declared event.
    pub fn event_rust_type(&self) -> &'static str {
        self.event_rust_type
    }

    /// Whether two descriptors declare the same Rust event type.
    pub fn same_event_as(&self, other: &HandlerDescriptor) -> bool {
        self.event_type_id == other.event_type_id
    }

    /// Payload decoder for the declared event.
    pub fn decoder(&self) -> Decoder {
        self.decode
    }

    /// Resolve the handler instance and bind it to the declared event.
    pub fn bind(&self, resolver: &dyn Resolver) -> Result<Arc<dyn DynHandler>, ResolutionError> {
        (self.bind)(resolver)
    }

    fn same_declaration(&self, other: &HandlerDescriptor) -> bool {
        self.handler_type_id == other.handler_type_id && self.event_type_id == other.event_type_id
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("handler_type", &self.handler_type)
            .field("event_type", &self.event_type)
            .field("event_rust_type", &self.event_rust_type)
            .finish()
    }
}

pub(crate) fn decode_event<E: CompetingEvent>(
    message: &Message,
) -> Result<Box<dyn Any + Send>, String> {
    message
        .decode_payload::<E>()
        .map(|event| Box::new(event) as Box<dyn Any + Send>)
}

fn resolve_and_bind<H, E>(resolver: &dyn Resolver) -> Result<Arc<dyn DynHandler>, ResolutionError>
where
    E: CompetingEvent,
    H: CompetingEventHandler + HandleCompetingEvent<E>,
{
    let handler = resolver.resolve::<H>()?;
    Ok(bind_as::<H, E>(handler, H::handler_type()))
}

/// The handler types an application consumes competing events with.
///
/// Built once at startup; the pump factory reads it every time it runs.
///
/// ## Example
///
/// ```ignore
/// let registry = HandlerRegistry::new()
///     .register::<SendReceipt>()
///     .register::<ReserveStock>()
///     .register::<NotifyCourier>();
///
/// assert_eq!(registry.event_types(), vec![EventType::from("OrderPlaced"), EventType::from("OrderShipped")]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct HandlerRegistry {
    descriptors: Vec<HandlerDescriptor>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler type and every event type it declares.
    ///
    /// Registering the same handler type twice has no further effect.
    pub fn register<H: CompetingEventHandler>(mut self) -> Self {
        let mut interests = Interests::<H>::new();
        H::declare(&mut interests);

        for descriptor in interests.into_descriptors() {
            if !self
                .descriptors
                .iter()
                .any(|known| known.same_declaration(&descriptor))
            {
                self.descriptors.push(descriptor);
            }
        }
        self
    }

    /// All declarations, in registration order.
    pub fn descriptors(&self) -> &[HandlerDescriptor] {
        &self.descriptors
    }

    /// Distinct declared event types, ascending by canonical name.
    pub fn event_types(&self) -> Vec<EventType> {
        self.descriptors
            .iter()
            .map(|d| d.event_type.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Declarations for one event type, in registration order.
    pub fn handlers_for(&self, event_type: &EventType) -> Vec<&HandlerDescriptor> {
        self.descriptors
            .iter()
            .filter(|d| &d.event_type == event_type)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
