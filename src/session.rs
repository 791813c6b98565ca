//! Session state, events and introspection types.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::DecodedValue;

/// Scan session lifecycle.
///
/// `Idle → Starting → Scanning → Completed`, with `Failed` as the error
/// terminal. Terminal states return to `Idle` only through `reset()`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Scanning,
    Completed,
    Failed,
}

impl SessionState {
    /// `Starting` or `Scanning`.
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Scanning)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

/// Events delivered to the result sink. None repeats within a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    Started,
    Scanned(DecodedValue),
    Stopped,
    Error { code: String, message: String },
}

impl SessionEvent {
    pub(crate) fn error(err: &crate::ControllerError) -> Self {
        SessionEvent::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    /// Error code, if this is an `Error` event.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            SessionEvent::Error { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Per-session frame and decode counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Frames handed to `on_frame` while scanning.
    pub frames_received: u64,
    /// Frames released because a decode was in flight.
    pub frames_dropped: u64,
    /// Frames released because the session was not scanning or was stale.
    pub frames_discarded: u64,
    pub decode_attempts: u64,
    pub decode_failures: u64,
    pub empty_results: u64,
    /// Decode outcomes that arrived after the session left `Scanning`.
    pub late_results: u64,
}

/// Point-in-time copy of the controller's session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub generation: u64,
    pub state: SessionState,
    pub started_at: Option<SystemTime>,
    pub result: Option<DecodedValue>,
    pub decode_in_flight: bool,
    pub device_id: Option<String>,
    pub stats: SessionStats,
}
