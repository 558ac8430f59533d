use serde::de::DeserializeOwned;

use crate::EventType;

/// An event delivered to competing consumers: exactly one instance of each
/// subscribed application receives any given message.
///
/// `EVENT_TYPE` is the canonical name; it must match [`Message::event_type`]
/// of published messages and is unique per Rust type within one registry.
///
/// The topic path is the lowercased name with anything outside
/// `[a-z0-9._-]` replaced by `.`, so `"Order Placed"`, `"order.placed"` and
/// `"ORDER.PLACED"` share a topic. The pump factory reports such names as
/// [`ProvisioningError::TopicCollision`](crate::ProvisioningError::TopicCollision).
///
/// [`Message::event_type`]: crate::bus::Message::event_type
///
/// ## Example
///
/// ```
/// use competing_pumps::CompetingEvent;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct OrderPlaced {
///     order_id: String,
/// }
///
/// impl CompetingEvent for OrderPlaced {
///     const EVENT_TYPE: &'static str = "orders.OrderPlaced";
/// }
///
/// assert_eq!(OrderPlaced::event_type().name(), "orders.OrderPlaced");
/// ```
pub trait CompetingEvent: DeserializeOwned + Send + 'static {
    /// Canonical name of the event type.
    const EVENT_TYPE: &'static str;

    /// The event type as a routing key.
    fn event_type() -> EventType {
        EventType::from_static(Self::EVENT_TYPE)
    }
}
