//! Camera frame container.
//!
//! - `Frame`: Opaque container for one camera image. Bytes are private.
//! - `FrameView`: Read-only view handed to decoder backends.
//!
//! A frame is released exactly once: either explicitly through
//! `Frame::release()` or implicitly when it is dropped. Release runs the
//! source's release hook (if any) and zeroizes the pixel buffer.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use zeroize::Zeroize;

// ----------------------------------------------------------------------------
// Rotation
// ----------------------------------------------------------------------------

/// Clockwise rotation needed to bring the image upright.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: u16) -> Result<Self> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(anyhow!(
                "rotation must be one of 0, 90, 180, 270 (got {})",
                other
            )),
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// True when width and height swap once the frame is upright.
    pub fn is_transposed(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

impl TryFrom<u16> for Rotation {
    type Error = anyhow::Error;

    fn try_from(degrees: u16) -> Result<Self> {
        Self::from_degrees(degrees)
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

type ReleaseHook = Box<dyn FnOnce() + Send + 'static>;

/// Opaque camera frame. No `Clone`, no `AsRef<[u8]>`: a frame has exactly one owner
/// and is released exactly once.
pub struct Frame {
    /// Private pixel data. Readable only through `FrameView`.
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,

    /// Per-source sequence number, assigned at capture.
    pub sequence: u64,

    capture_instant: Instant,
    release_hook: Option<ReleaseHook>,
    released: bool,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, rotation: Rotation, sequence: u64) -> Self {
        Self {
            data,
            width,
            height,
            rotation,
            sequence,
            capture_instant: Instant::now(),
            release_hook: None,
            released: false,
        }
    }

    /// Register a callback that runs when the frame is released.
    ///
    /// Sources use this to recycle buffers or to count outstanding frames.
    pub fn with_release_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.release_hook = Some(Box::new(hook));
        self
    }

    /// Read-only view for decoder backends.
    pub fn view(&self) -> FrameView<'_> {
        FrameView { frame: self }
    }

    /// Milliseconds since capture.
    pub fn age_ms(&self) -> u128 {
        self.capture_instant.elapsed().as_millis()
    }

    /// Release the frame back to its source.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.data.zeroize();
        if let Some(hook) = self.release_hook.take() {
            hook();
        }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Pixel content is never printed.
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("rotation", &self.rotation)
            .field("bytes", &self.data.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// FrameView: read-only interface for decoders
// ----------------------------------------------------------------------------

/// Read-only view of a frame.
///
/// Backends can read pixels for the duration of one decode call. The borrow
/// prevents them from keeping the buffer or the frame alive past that call.
#[derive(Clone, Copy)]
pub struct FrameView<'a> {
    frame: &'a Frame,
}

impl<'a> FrameView<'a> {
    pub fn width(&self) -> u32 {
        self.frame.width
    }

    pub fn height(&self) -> u32 {
        self.frame.height
    }

    pub fn rotation(&self) -> Rotation {
        self.frame.rotation
    }

    pub fn sequence(&self) -> u64 {
        self.frame.sequence
    }

    pub fn pixels(&self) -> &'a [u8] {
        &self.frame.data
    }

    /// Dimensions after applying the rotation.
    pub fn upright_dimensions(&self) -> (u32, u32) {
        if self.frame.rotation.is_transposed() {
            (self.frame.height, self.frame.width)
        } else {
            (self.frame.width, self.frame.height)
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
