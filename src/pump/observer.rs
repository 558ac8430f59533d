//! Observing pumps from the owning process.
//!
//! Pumps log through `tracing` on their own. An observer is for code that has
//! to react, e.g. recreating a pump after it faulted.

use std::sync::mpsc::Sender;
use std::sync::{Mutex, PoisonError};

use super::status::PumpStatus;
use crate::bus::Message;
use crate::dispatch::DispatchError;
use crate::EventType;

/// Callbacks invoked by pump worker threads.
///
/// Implementations must be cheap and must not block; they run on the pump's
/// receive loop.
pub trait PumpObserver: Send + Sync {
    /// The pump for `event_type` entered `status`.
    fn status_changed(&self, event_type: &EventType, status: &PumpStatus) {
        let _ = (event_type, status);
    }

    /// A dispatch failed and the message is about to be abandoned.
    fn dispatch_failed(&self, event_type: &EventType, message: &Message, error: &DispatchError) {
        let _ = (event_type, message, error);
    }
}

/// Observer that ignores everything.
impl PumpObserver for () {}

/// A status change reported by [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq)]
pub struct PumpEvent {
    pub event_type: EventType,
    pub status: PumpStatus,
}

/// Forwards status changes over a channel.
///
/// ## Example
///
/// ```ignore
/// let (tx, rx) = std::sync::mpsc::channel();
/// let factory = factory.with_observer(Arc::new(ChannelObserver::new(tx)));
///
/// for event in rx {
///     if event.status.is_faulted() {
///         // recreate the pump for event.event_type
///     }
/// }
/// ```
pub struct ChannelObserver {
    tx: Mutex<Sender<PumpEvent>>,
}

impl ChannelObserver {
    pub fn new(tx: Sender<PumpEvent>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl PumpObserver for ChannelObserver {
    fn status_changed(&self, event_type: &EventType, status: &PumpStatus) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        // a dropped receiver just means nobody is listening any more
        let _ = tx.send(PumpEvent {
            event_type: event_type.clone(),
            status: status.clone(),
        });
    }
}

/// Emits status changes to in-process listeners via an `EventEmitter`.
///
/// Each status change is emitted under `pump.<status>` (for example
/// `pump.faulted`) with the event type's canonical name as data.
#[cfg(feature = "emitter")]
pub struct EmitterObserver {
    emitter: Mutex<event_emitter_rs::EventEmitter>,
}

#[cfg(feature = "emitter")]
impl EmitterObserver {
    pub fn new(emitter: event_emitter_rs::EventEmitter) -> Self {
        Self {
            emitter: Mutex::new(emitter),
        }
    }

    /// Register a listener for one status label (`running`, `stopped`,
    /// `faulted`).
    pub fn on<F>(&self, status: &str, listener: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.emitter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on(&format!("pump.{}", status), listener);
    }
}

#[cfg(feature = "emitter")]
impl Default for EmitterObserver {
    fn default() -> Self {
        Self::new(event_emitter_rs::EventEmitter::new())
    }
}

#[cfg(feature = "emitter")]
impl PumpObserver for EmitterObserver {
    fn status_changed(&self, event_type: &EventType, status: &PumpStatus) {
        self.emitter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .emit(
                &format!("pump.{}", status.as_label()),
                event_type.name().to_string(),
            );
    }
}
