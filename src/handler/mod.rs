//! Competing event handlers - declaration, registration and resolution.
//!
//! Handler types declare the events they consume through
//! [`CompetingEventHandler::declare`]; the application lists its handler
//! types in a [`HandlerRegistry`] and registers the instances (or factories
//! for them) in a [`Components`] composition root.
//!
//! ## Quick Start
//!
//! ```ignore
//! let registry = HandlerRegistry::new()
//!     .register::<SendReceipt>()
//!     .register::<ReserveStock>();
//!
//! let components = Components::new()
//!     .with_instance(Mailer::from_env()?)
//!     .with_factory(|c: &Components| Ok(SendReceipt::new(c.resolve::<Mailer>()?)))
//!     .with_instance(ReserveStock::default());
//! ```

mod components;
mod error;
mod event;
mod handler;
mod registry;

pub use components::{Components, Resolver};
pub use error::{HandlerError, ResolutionError};
pub use event::CompetingEvent;
pub use handler::{bind, CompetingEventHandler, DynHandler, HandleCompetingEvent, Interests};
pub use registry::{Decoder, HandlerDescriptor, HandlerRegistry};
pub(crate) use registry::decode_event;
