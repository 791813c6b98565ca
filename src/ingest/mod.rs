//! Frame sources.
//!
//! This module provides the sources that push frames into a scan session:
//! - Synthetic camera (`stub://` URLs, testing and demos)
//! - Manual source (frames pushed by the host application)
//!
//! A source is bound to exactly one session at a time. While bound it pushes
//! frames through the `FrameSink` it was given, from a single delivery thread.
//! Sources are responsible for:
//! - Tagging frames with rotation metadata and a sequence number
//! - Making `bind`/`unbind` idempotent
//! - Reporting fatal runtime failures through `FrameSink::fail`
//!
//! Sources MUST NOT:
//! - Block inside `unbind` waiting for their delivery thread
//! - Call back into the controller from `bind` or `unbind`

mod claims;
pub mod manual;
pub mod synthetic;

use anyhow::Result;
use std::sync::Weak;

use crate::frame::Frame;

pub use claims::{DeviceClaim, DeviceClaims};
pub use manual::{ManualSource, ManualSourceHandle};
pub use synthetic::{SyntheticCamera, SyntheticConfig};

/// Camera-like frame producer.
pub trait FrameSource: Send {
    /// Identifier of the underlying device. Used for exclusive claims.
    fn device_id(&self) -> &str;

    /// Start pushing frames into `sink`. Binding twice is a no-op.
    fn bind(&mut self, sink: FrameSink) -> Result<()>;

    /// Stop pushing frames. Unbinding an unbound source is a no-op.
    fn unbind(&mut self);

    fn is_bound(&self) -> bool;
}

/// Receiver side of a `FrameSink`. Implemented by the controller.
pub(crate) trait FrameConsumer: Send + Sync {
    fn consume_frame(&self, generation: u64, frame: Frame);
    fn source_failed(&self, generation: u64, reason: String);
}

/// Handle a bound source uses to deliver frames.
///
/// The sink refers weakly to its controller and remembers the session it was
/// created for. Frames pushed after the controller is gone, or after the
/// session ended, are released immediately.
#[derive(Clone)]
pub struct FrameSink {
    consumer: Weak<dyn FrameConsumer>,
    generation: u64,
}

impl FrameSink {
    pub(crate) fn new(consumer: Weak<dyn FrameConsumer>, generation: u64) -> Self {
        Self {
            consumer,
            generation,
        }
    }

    /// A sink not attached to any controller. Every pushed frame is released.
    pub fn detached() -> Self {
        let consumer: Weak<dyn FrameConsumer> = Weak::<Detached>::new();
        Self {
            consumer,
            generation: 0,
        }
    }

    /// Deliver a frame. The sink takes ownership; the frame is always released.
    pub fn push(&self, frame: Frame) {
        match self.consumer.upgrade() {
            Some(consumer) => consumer.consume_frame(self.generation, frame),
            None => frame.release(),
        }
    }

    /// Report a fatal source failure (device lost, stream ended).
    pub fn fail(&self, reason: impl Into<String>) {
        if let Some(consumer) = self.consumer.upgrade() {
            consumer.source_failed(self.generation, reason.into());
        }
    }

    /// False once the controller has been dropped.
    pub fn is_attached(&self) -> bool {
        self.consumer.strong_count() > 0
    }
}

struct Detached;

impl FrameConsumer for Detached {
    fn consume_frame(&self, _generation: u64, frame: Frame) {
        frame.release();
    }

    fn source_failed(&self, _generation: u64, _reason: String) {}
}
