use std::fmt;
use std::sync::Arc;

use crate::bus::ReceiveError;

/// Lifecycle state of a message pump.
///
/// ```text
/// Created ──start()──► Running ──stop()──────► Stopped
///    │                    │
///    │                    └──receive error──► Faulted
///    └──stop()──► Stopped
/// ```
///
/// `Stopped` and `Faulted` are terminal.
#[derive(Debug, Clone)]
pub enum PumpStatus {
    /// Built but not started.
    Created,
    /// Receiving and dispatching.
    Running,
    /// Stopped on request; the receiver has been released.
    Stopped,
    /// Receiving failed and the pump gave up; the receiver has been released.
    Faulted(Arc<ReceiveError>),
}

impl PumpStatus {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            PumpStatus::Created => "created",
            PumpStatus::Running => "running",
            PumpStatus::Stopped => "stopped",
            PumpStatus::Faulted(_) => "faulted",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, PumpStatus::Running)
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, PumpStatus::Faulted(_))
    }

    /// Whether the pump can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PumpStatus::Stopped | PumpStatus::Faulted(_))
    }

    /// The receive error that faulted the pump.
    pub fn fault(&self) -> Option<&ReceiveError> {
        match self {
            PumpStatus::Faulted(error) => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for PumpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PumpStatus::Faulted(error) => write!(f, "faulted: {}", error),
            other => f.write_str(other.as_label()),
        }
    }
}

impl PartialEq for PumpStatus {
    /// Faulted statuses compare equal regardless of the error.
    fn eq(&self, other: &Self) -> bool {
        self.as_label() == other.as_label()
    }
}

/// Counters collected by a pump over its lifetime.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PumpStats {
    /// Messages dispatched successfully and completed.
    pub messages_completed: usize,
    /// Messages whose dispatch failed and that were abandoned.
    pub messages_abandoned: usize,
    /// Complete or abandon calls the broker refused.
    pub settle_failures: usize,
    /// Receive calls made.
    pub polls: usize,
}
