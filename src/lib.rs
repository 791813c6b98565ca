//! Scan Session Controller
//!
//! This crate implements a single-shot barcode scan session: it binds a
//! camera frame source, forwards frames to an external decoder one at a
//! time, and stops as soon as the first value is decoded.
//!
//! # Architecture
//!
//! The controller enforces four rules by construction:
//!
//! 1. **One decode in flight**: frames arriving while a decode runs are released and dropped.
//! 2. **One result per session**: the first decoded value completes the session; later values are ignored.
//! 3. **Paired binding**: the frame source is bound once per session and unbound on every exit.
//! 4. **Every frame released**: frames are released exactly once, whichever path they take.
//!
//! # Module Structure
//!
//! - `frame`: Opaque frames, read-only views, release hooks
//! - `ingest`: Frame sources (synthetic camera, host-driven source), device claims
//! - `decode`: Decoder traits, decode jobs, worker adapters, backends
//! - `sink`: Result sinks (logging, scan log, recorders)
//! - `controller`: The session state machine
//! - `config`: Layered configuration for the `scand` host

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod config;
pub mod controller;
pub mod decode;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod session;
pub mod sink;

pub use controller::{CameraPermission, ScanController};
pub use decode::{
    BackendRegistry, DecodeError, DecodeJob, DecodeOutcome, DecodeWorker, Decoder,
    DecoderBackend, InlineDecoder, ScriptedBackend, StubBackend, Symbol, Symbology,
};
pub use error::ControllerError;
pub use frame::{Frame, FrameView, Rotation};
pub use ingest::{
    DeviceClaim, DeviceClaims, FrameSink, FrameSource, ManualSource, ManualSourceHandle,
    SyntheticCamera, SyntheticConfig,
};
pub use session::{SessionEvent, SessionSnapshot, SessionState, SessionStats};
pub use sink::{ChannelSink, EventRecorder, LoggingSink, ResultSink, ScanLog};

// -------------------- Decoded Values --------------------

/// A decoded barcode value. Never empty.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DecodedValue(String);

impl DecodedValue {
    /// Returns `None` for empty input.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DecodedValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DecodedValue {
    type Error = &'static str;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value).ok_or("decoded value must not be empty")
    }
}

impl From<DecodedValue> for String {
    fn from(value: DecodedValue) -> Self {
        value.0
    }
}

impl PartialEq<&str> for DecodedValue {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoded_value_rejects_empty_strings() {
        assert!(DecodedValue::new("").is_none());
        let value = DecodedValue::new("ABC123").unwrap();
        assert_eq!(value.as_str(), "ABC123");
        assert_eq!(value, "ABC123");
    }

    #[test]
    fn decoded_value_deserialization_enforces_non_empty() {
        let ok: DecodedValue = serde_json::from_str("\"PAT-1\"").unwrap();
        assert_eq!(ok.as_str(), "PAT-1");
        assert!(serde_json::from_str::<DecodedValue>("\"\"").is_err());
    }
}
