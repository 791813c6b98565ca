mod backend;
pub mod backends;
mod job;
mod outcome;
mod registry;
mod worker;

pub use backend::{DecoderBackend, Symbol, Symbology};
pub use backends::{ScriptedBackend, StubBackend};
pub use job::{DecodeJob, Decoder};
pub use outcome::{DecodeError, DecodeOutcome};
pub use registry::BackendRegistry;
pub use worker::{share, DecodeWorker, InlineDecoder, SharedBackend};
