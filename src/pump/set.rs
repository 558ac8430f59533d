//! Owning collection of pumps with aggregate start/stop.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::error::{ProvisioningError, PumpError};
use super::factory::CompetingEventPumpsFactory;
use super::pump::MessagePump;
use super::status::{PumpStats, PumpStatus};
use crate::EventType;

/// The pumps an application runs, at most one per event type.
///
/// ## Example
///
/// ```ignore
/// let (mut pumps, failures) = PumpSet::from_factory(&factory);
/// for failure in &failures {
///     eprintln!("not consuming {}: {}", failure.event_type(), failure);
/// }
///
/// pumps.start_all();
/// // ...
/// for (event_type, stopped) in pumps.stop_all() {
///     println!("{}: {:?}", event_type, stopped);
/// }
/// ```
pub struct PumpSet {
    pumps: Vec<MessagePump>,
    grace: Duration,
}

impl Default for PumpSet {
    fn default() -> Self {
        Self {
            pumps: Vec::new(),
            grace: Duration::from_secs(30),
        }
    }
}

impl PumpSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every pump the factory can create, plus the provisioning failures.
    ///
    /// Uses the factory's configured shutdown grace for [`stop_all`](Self::stop_all).
    pub fn from_factory(factory: &CompetingEventPumpsFactory) -> (Self, Vec<ProvisioningError>) {
        let mut set = Self::new().with_grace(factory.config().shutdown_grace());
        let mut failures = Vec::new();
        for created in factory.create_all() {
            match created {
                Ok(pump) => {
                    set.insert(pump);
                }
                Err(error) => failures.push(error),
            }
        }
        (set, failures)
    }

    /// Total time `stop_all` waits for in-flight dispatches.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Add a pump, returning the one it replaces for the same event type.
    pub fn insert(&mut self, pump: MessagePump) -> Option<MessagePump> {
        match self
            .pumps
            .iter()
            .position(|known| known.event_type() == pump.event_type())
        {
            Some(index) => Some(std::mem::replace(&mut self.pumps[index], pump)),
            None => {
                self.pumps.push(pump);
                None
            }
        }
    }

    pub fn get(&self, event_type: &EventType) -> Option<&MessagePump> {
        self.pumps.iter().find(|p| p.event_type() == event_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessagePump> {
        self.pumps.iter()
    }

    pub fn len(&self) -> usize {
        self.pumps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pumps.is_empty()
    }

    /// Start every pump that has not been started yet.
    ///
    /// A pump that fails to start does not keep the others from starting.
    pub fn start_all(&mut self) -> Vec<PumpError> {
        let mut errors = Vec::new();
        for pump in &mut self.pumps {
            if !matches!(pump.status(), PumpStatus::Created) {
                continue;
            }
            if let Err(error) = pump.start() {
                warn!(
                    event_type = %pump.event_type(),
                    kind = error.as_label(),
                    error = %error,
                    "could not start message pump"
                );
                errors.push(error);
            }
        }
        info!(pumps = self.pumps.len(), failed = errors.len(), "message pumps started");
        errors
    }

    /// Stop every pump, sharing one grace period between them.
    pub fn stop_all(&mut self) -> Vec<(EventType, Result<PumpStats, PumpError>)> {
        for pump in &self.pumps {
            pump.signal_stop();
        }

        let deadline = Instant::now() + self.grace;
        self.pumps
            .iter_mut()
            .map(|pump| {
                let remaining = deadline.saturating_duration_since(Instant::now());
                (pump.event_type().clone(), pump.stop_with_grace(remaining))
            })
            .collect()
    }

    /// Status of every pump, in insertion order.
    pub fn statuses(&self) -> Vec<(EventType, PumpStatus)> {
        self.pumps
            .iter()
            .map(|p| (p.event_type().clone(), p.status()))
            .collect()
    }

    /// Pumps that gave up after a receive error.
    pub fn faulted(&self) -> Vec<&MessagePump> {
        self.pumps.iter().filter(|p| p.status().is_faulted()).collect()
    }
}
