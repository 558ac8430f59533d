//! Topic and subscription naming.
//!
//! Every competing instance of an application derives the same
//! [`Subscription`] for a given event type, so they all pull from one
//! shared queue instead of each provisioning its own.

use crate::EventType;

/// Prefix for topic paths.
pub const TOPIC_PREFIX: &str = "t.";

/// Where a pump pulls its messages from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Subscription {
    /// Topic the event type is published to.
    pub topic_path: String,
    /// Durable subscription on that topic shared by all competing instances.
    pub name: String,
}

impl Subscription {
    /// Derive the subscription for `event_type` owned by `application_name`.
    pub fn for_event(event_type: &EventType, application_name: &str) -> Self {
        Self {
            topic_path: topic_path_for(event_type),
            name: subscription_name(application_name),
        }
    }
}

/// Topic path for an event type: `t.` followed by the lowercased canonical
/// name with anything outside `[a-z0-9._-]` replaced by `.`.
pub fn topic_path_for(event_type: &EventType) -> String {
    let sanitized: String = event_type
        .name()
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '.',
        })
        .collect();
    format!("{}{}", TOPIC_PREFIX, sanitized)
}

/// Subscription name for an application; the application name verbatim.
pub fn subscription_name(application_name: &str) -> String {
    application_name.to_string()
}
