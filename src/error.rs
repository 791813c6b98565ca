use thiserror::Error;

use crate::session::SessionState;

/// Errors surfaced by the scan controller.
///
/// `AlreadyRunning` and `PermissionDenied` are returned synchronously from
/// `start`. `BindingFailed` is fatal to the session and is also reported
/// through the `Error` event. `DecodeFailed` is logged per attempt and never
/// reaches the sink.
#[non_exhaustive]
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("a scan session is already running")]
    AlreadyRunning,
    #[error("camera permission has not been confirmed")]
    PermissionDenied,
    #[error("frame source binding failed: {0}")]
    BindingFailed(String),
    #[error("frame source failed: {0}")]
    SourceFailed(String),
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    #[error("no scan session is running (state {0:?})")]
    NotRunning(SessionState),
    #[error("session cannot be reset from state {0:?}")]
    NotResettable(SessionState),
    #[error("session was stopped before binding completed")]
    Cancelled,
}

impl ControllerError {
    /// Stable identifier used as the `code` of `Error` events.
    pub fn code(&self) -> &'static str {
        match self {
            ControllerError::AlreadyRunning => "AlreadyRunning",
            ControllerError::PermissionDenied => "PermissionDenied",
            ControllerError::BindingFailed(_) => "BindingFailed",
            ControllerError::SourceFailed(_) => "SourceFailed",
            ControllerError::DecodeFailed(_) => "DecodeFailed",
            ControllerError::NotRunning(_) => "NotRunning",
            ControllerError::NotResettable(_) => "NotResettable",
            ControllerError::Cancelled => "Cancelled",
        }
    }

    /// Fatal errors end the session in `Failed`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ControllerError::BindingFailed(_) | ControllerError::SourceFailed(_)
        )
    }
}
