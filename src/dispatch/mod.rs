//! Dispatch - routing a received message to the handlers of its event type.
//!
//! One physical message reaches exactly one pump process-wide (the broker
//! enforces that between competing instances). Inside that process the
//! dispatcher decodes the message once and invokes every locally registered
//! handler for the event type, collecting failures instead of stopping at
//! the first one.

mod dispatcher;
mod error;

pub use dispatcher::{CompetingEventDispatcher, Dispatcher};
pub(crate) use dispatcher::panic_reason;
pub use error::{DispatchError, HandlerFailure};
