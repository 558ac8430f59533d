//! Message pumps: the per-subscription receive loops.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ CompetingEventPumpsFactory   │  registry → distinct event types (sorted)
//! └──────────────┬───────────────┘
//!                │ per event type: ensure subscription, create receiver,
//!                │ resolve handlers, build dispatcher
//!                ▼
//! ┌──────────────────────────────┐        ┌──────────────┐
//! │ MessagePump (Created)        │──────► │ PumpObserver │
//! │  N workers share 1 receiver  │ status └──────────────┘
//! │  receive → dispatch →        │
//! │  complete | abandon          │
//! └──────────────────────────────┘
//! ```
//!
//! Pumps are returned unstarted; the application starts them, usually through
//! a [`PumpSet`], and decides what to do with pumps that fault.

mod error;
mod factory;
mod observer;
mod pump;
mod set;
mod status;

#[cfg(feature = "emitter")]
pub use observer::EmitterObserver;

pub use error::{ProvisioningError, PumpError};
pub use factory::{CompetingEventPumpsFactory, Pumps};
pub use observer::{ChannelObserver, PumpEvent, PumpObserver};
pub use pump::{MessagePump, PumpSettings};
pub use set::PumpSet;
pub use status::{PumpStats, PumpStatus};
