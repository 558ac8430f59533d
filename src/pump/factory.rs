//! Builds one message pump per competing event type.
//!
//! The factory reads the handler registry every time `create_all()` runs:
//! distinct event types, ascending by canonical name, each provisioned on the
//! broker and wrapped in a pump that is returned unstarted.
//!
//! ## Example
//!
//! ```ignore
//! let factory = CompetingEventPumpsFactory::new(
//!     broker,
//!     HandlerRegistry::new().register::<SendReceipt>().register::<NotifyCourier>(),
//!     Arc::new(components),
//!     PumpConfig::new("billing"),
//! )?;
//!
//! for pump in factory.create_all() {
//!     match pump {
//!         Ok(mut pump) => pump.start()?,
//!         Err(error) => eprintln!("{} not consumed: {}", error.event_type(), error),
//!     }
//! }
//! ```

use std::sync::Arc;

use tracing::{debug, warn};

use super::error::ProvisioningError;
use super::observer::PumpObserver;
use super::pump::{MessagePump, PumpSettings};
use crate::bus::Broker;
use crate::config::ConfigError;
use crate::dispatch::CompetingEventDispatcher;
use crate::handler::{HandlerDescriptor, HandlerRegistry, Resolver};
use crate::naming::Subscription;
use crate::{EventType, PumpConfig};

/// Creates competing event message pumps for the registered handlers.
pub struct CompetingEventPumpsFactory {
    broker: Arc<dyn Broker>,
    registry: HandlerRegistry,
    resolver: Arc<dyn Resolver>,
    config: PumpConfig,
    observer: Arc<dyn PumpObserver>,
}

impl CompetingEventPumpsFactory {
    /// Create a factory. Fails if the configuration does not validate.
    pub fn new(
        broker: Arc<dyn Broker>,
        registry: HandlerRegistry,
        resolver: Arc<dyn Resolver>,
        config: PumpConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            broker,
            registry,
            resolver,
            config,
            observer: Arc::new(()),
        })
    }

    /// Report status changes and dispatch failures of every created pump to
    /// `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn PumpObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &PumpConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// One pump per distinct event type, in ascending canonical-name order.
    ///
    /// Provisioning happens as the iterator advances. A failure for one event
    /// type is yielded as `Err` and the next event type is still attempted.
    /// Every call starts over from the registry.
    pub fn create_all(&self) -> Pumps<'_> {
        let event_types = self.registry.event_types();
        debug!(
            application = %self.config.application_name,
            event_types = event_types.len(),
            "creating competing event message pumps"
        );
        Pumps {
            factory: self,
            event_types: event_types.into_iter(),
        }
    }

    /// Provision the pump for a single event type, e.g. to replace one that
    /// faulted.
    pub fn create(&self, event_type: &EventType) -> Result<MessagePump, ProvisioningError> {
        let created = self.provision(event_type);
        if let Err(error) = &created {
            warn!(
                event_type = %event_type,
                kind = error.as_label(),
                error = %error,
                "could not create message pump"
            );
        }
        created
    }

    fn provision(&self, event_type: &EventType) -> Result<MessagePump, ProvisioningError> {
        let descriptors = self.registry.handlers_for(event_type);
        let first = match descriptors.first() {
            Some(first) => *first,
            None => {
                return Err(ProvisioningError::NoHandlers {
                    event_type: event_type.clone(),
                })
            }
        };
        check_single_rust_type(event_type, &descriptors)?;
        self.check_unique_topic(event_type)?;

        let subscription = Subscription::for_event(event_type, &self.config.application_name);

        self.broker
            .ensure_subscription_exists(event_type, &subscription.name)
            .map_err(|source| ProvisioningError::Subscription {
                event_type: event_type.clone(),
                subscription: subscription.name.clone(),
                source,
            })?;

        let topic_path = self.broker.topic_path_for(event_type);
        let receiver = self
            .broker
            .create_receiver(&topic_path, &subscription.name)
            .map_err(|source| ProvisioningError::Receiver {
                event_type: event_type.clone(),
                topic_path: topic_path.clone(),
                subscription: subscription.name.clone(),
                source,
            })?;

        let mut handlers = Vec::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            match descriptor.bind(self.resolver.as_ref()) {
                Ok(handler) => handlers.push(handler),
                Err(source) => {
                    receiver.close();
                    return Err(ProvisioningError::Resolution {
                        event_type: event_type.clone(),
                        handler_type: descriptor.handler_type(),
                        source,
                    });
                }
            }
        }

        let dispatcher =
            CompetingEventDispatcher::from_parts(event_type.clone(), first.decoder(), handlers);

        debug!(
            event_type = %event_type,
            topic_path = %topic_path,
            subscription = %subscription.name,
            handlers = descriptors.len(),
            "registering competing event message pump"
        );

        Ok(MessagePump::observed(
            Subscription {
                topic_path,
                name: subscription.name,
            },
            receiver,
            Box::new(dispatcher),
            PumpSettings::from(&self.config),
            Arc::clone(&self.observer),
        ))
    }

    fn check_unique_topic(&self, event_type: &EventType) -> Result<(), ProvisioningError> {
        let topic_path = self.broker.topic_path_for(event_type);
        let colliding: Vec<EventType> = self
            .registry
            .event_types()
            .into_iter()
            .filter(|other| other != event_type)
            .filter(|other| self.broker.topic_path_for(other) == topic_path)
            .collect();

        if colliding.is_empty() {
            return Ok(());
        }
        Err(ProvisioningError::TopicCollision {
            event_type: event_type.clone(),
            topic_path,
            colliding,
        })
    }
}

fn check_single_rust_type(
    event_type: &EventType,
    descriptors: &[&HandlerDescriptor],
) -> Result<(), ProvisioningError> {
    let mut rust_types: Vec<&'static str> = Vec::new();
    let mut seen: Vec<&HandlerDescriptor> = Vec::new();
    for descriptor in descriptors {
        if !seen.iter().any(|known| known.same_event_as(descriptor)) {
            seen.push(descriptor);
            rust_types.push(descriptor.event_rust_type());
        }
    }

    if rust_types.len() > 1 {
        return Err(ProvisioningError::ConflictingEventTypes {
            event_type: event_type.clone(),
            rust_types,
        });
    }
    Ok(())
}

/// Lazily provisioned pumps returned by
/// [`CompetingEventPumpsFactory::create_all`].
pub struct Pumps<'a> {
    factory: &'a CompetingEventPumpsFactory,
    event_types: std::vec::IntoIter<EventType>,
}

impl Iterator for Pumps<'_> {
    type Item = Result<MessagePump, ProvisioningError>;

    fn next(&mut self) -> Option<Self::Item> {
        let event_type = self.event_types.next()?;
        Some(self.factory.create(&event_type))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.event_types.size_hint()
    }
}

impl ExactSizeIterator for Pumps<'_> {}
