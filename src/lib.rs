//! Competing-consumer message pumps.
//!
//! Every instance of an application shares one durable subscription per event
//! type, so each published event is processed by exactly one instance. Inside
//! that instance a pump receives the message and hands it to every handler
//! registered for the event type.
//!
//! ## Quick Start
//!
//! ```ignore
//! let registry = HandlerRegistry::new()
//!     .register::<SendReceipt>()
//!     .register::<NotifyCourier>();
//! let components = Components::new()
//!     .with_instance(SendReceipt::default())
//!     .with_instance(NotifyCourier::default());
//!
//! let factory = CompetingEventPumpsFactory::new(
//!     Arc::new(broker),
//!     registry,
//!     Arc::new(components),
//!     PumpConfig::new("billing"),
//! )?;
//!
//! let (mut pumps, failures) = PumpSet::from_factory(&factory);
//! pumps.start_all();
//! ```

pub mod bus;
mod config;
pub mod dispatch;
mod event_type;
pub mod handler;
pub mod naming;
pub mod pump;

pub use config::{
    ConfigError, PumpConfig, MAX_APPLICATION_NAME_LEN, MAX_CONCURRENT_DISPATCHES,
    MAX_RECEIVE_TIMEOUT_MS,
};
pub use event_type::EventType;
pub use handler::{
    CompetingEvent, CompetingEventHandler, Components, HandleCompetingEvent, HandlerError,
    HandlerRegistry, Interests, ResolutionError, Resolver,
};
pub use pump::{
    ChannelObserver, CompetingEventPumpsFactory, MessagePump, ProvisioningError, PumpError,
    PumpObserver, PumpSet, PumpStats, PumpStatus,
};

#[cfg(feature = "emitter")]
pub use pump::EmitterObserver;

// Re-export the EventEmitter from the event_emitter_rs crate
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
