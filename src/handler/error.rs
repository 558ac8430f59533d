//! Error types for handlers and handler resolution.

use std::error::Error;

use thiserror::Error;

/// Error returned by a competing event handler.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Business logic rejected the event (validation, invariant violation).
    #[error("rejected: {0}")]
    Rejected(String),
    /// Something the event refers to does not exist (yet).
    #[error("not found: {0}")]
    NotFound(String),
    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
    /// The handler was given an event of a different Rust type than it
    /// declared.
    #[error("handler expected {expected}")]
    EventTypeMismatch { expected: &'static str },
    /// Other error.
    #[error("handler error: {0}")]
    Other(Box<dyn Error + Send + Sync>),
}

impl HandlerError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Rejected(_) => "handler_rejected",
            HandlerError::NotFound(_) => "handler_not_found",
            HandlerError::Panicked(_) => "handler_panicked",
            HandlerError::EventTypeMismatch { .. } => "handler_event_type_mismatch",
            HandlerError::Other(_) => "handler_other",
        }
    }

    /// Wrap any error.
    pub fn other(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        HandlerError::Other(err.into())
    }
}

/// Failure to produce a component from a [`Resolver`](super::Resolver).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// Nothing was registered for the requested type.
    #[error("no component registered for {type_name}")]
    NotRegistered { type_name: &'static str },
    /// Resolving the type required resolving itself.
    #[error("dependency cycle while resolving {type_name}: {}", .path.join(" -> "))]
    Cycle {
        type_name: &'static str,
        path: Vec<&'static str>,
    },
    /// The registered factory returned an error.
    #[error("factory for {type_name} failed: {reason}")]
    FactoryFailed {
        type_name: &'static str,
        reason: String,
    },
    /// The stored component is not of the requested type.
    #[error("component stored for {type_name} has a different concrete type")]
    TypeMismatch { type_name: &'static str },
}

impl ResolutionError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ResolutionError::NotRegistered { .. } => "resolution_not_registered",
            ResolutionError::Cycle { .. } => "resolution_cycle",
            ResolutionError::FactoryFailed { .. } => "resolution_factory_failed",
            ResolutionError::TypeMismatch { .. } => "resolution_type_mismatch",
        }
    }
}
