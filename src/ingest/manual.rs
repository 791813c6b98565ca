//! Host-driven frame source.
//!
//! `ManualSource` is the source to use when the host already owns a camera
//! pipeline and only needs to hand frames over, one at a time. The paired
//! `ManualSourceHandle` pushes frames from the host's delivery thread and
//! exposes bind/unbind/release counters.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{FrameSink, FrameSource};
use crate::frame::{Frame, Rotation};

#[derive(Default)]
struct ManualState {
    sink: Option<FrameSink>,
    bind_count: u64,
    unbind_count: u64,
    fail_next_bind: Option<String>,
}

struct Shared {
    device_id: String,
    state: Mutex<ManualState>,
    next_sequence: AtomicU64,
    frames_created: AtomicU64,
    frames_released: Arc<AtomicU64>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Frame source fed by the host.
pub struct ManualSource {
    shared: Arc<Shared>,
}

impl ManualSource {
    /// Create a source and the handle used to feed it.
    pub fn new(device_id: impl Into<String>) -> (Self, ManualSourceHandle) {
        let shared = Arc::new(Shared {
            device_id: device_id.into(),
            state: Mutex::new(ManualState::default()),
            next_sequence: AtomicU64::new(1),
            frames_created: AtomicU64::new(0),
            frames_released: Arc::new(AtomicU64::new(0)),
        });
        (
            Self {
                shared: shared.clone(),
            },
            ManualSourceHandle { shared },
        )
    }
}

impl FrameSource for ManualSource {
    fn device_id(&self) -> &str {
        &self.shared.device_id
    }

    fn bind(&mut self, sink: FrameSink) -> Result<()> {
        let mut state = self.shared.lock();
        if let Some(reason) = state.fail_next_bind.take() {
            return Err(anyhow!(reason));
        }
        if state.sink.is_some() {
            return Ok(());
        }
        state.sink = Some(sink);
        state.bind_count += 1;
        log::info!("ManualSource: bound {}", self.shared.device_id);
        Ok(())
    }

    fn unbind(&mut self) {
        let mut state = self.shared.lock();
        if state.sink.take().is_some() {
            state.unbind_count += 1;
            log::info!("ManualSource: unbound {}", self.shared.device_id);
        }
    }

    fn is_bound(&self) -> bool {
        self.shared.lock().sink.is_some()
    }
}

/// Host side of a `ManualSource`.
#[derive(Clone)]
pub struct ManualSourceHandle {
    shared: Arc<Shared>,
}

impl ManualSourceHandle {
    /// Build a frame owned by this source. Its release is counted.
    pub fn frame(&self, pixels: Vec<u8>, width: u32, height: u32, rotation: Rotation) -> Frame {
        let sequence = self.shared.next_sequence.fetch_add(1, Ordering::SeqCst);
        self.shared.frames_created.fetch_add(1, Ordering::SeqCst);
        let released = self.shared.frames_released.clone();
        Frame::new(pixels, width, height, rotation, sequence).with_release_hook(move || {
            released.fetch_add(1, Ordering::SeqCst);
        })
    }

    /// Push a frame to the bound session.
    ///
    /// Returns false when the source is not bound; the frame is released either way.
    pub fn push(&self, frame: Frame) -> bool {
        // Deliver without holding the source lock: the controller may unbind
        // this source while handling the frame.
        let sink = self.shared.lock().sink.clone();
        match sink {
            Some(sink) => {
                sink.push(frame);
                true
            }
            None => {
                frame.release();
                false
            }
        }
    }

    /// Build and push a frame in one step.
    pub fn push_pixels(&self, pixels: Vec<u8>, width: u32, height: u32, rotation: Rotation) -> bool {
        let frame = self.frame(pixels, width, height, rotation);
        self.push(frame)
    }

    /// Report a fatal failure to the bound session.
    pub fn fail(&self, reason: impl Into<String>) {
        let sink = self.shared.lock().sink.clone();
        if let Some(sink) = sink {
            sink.fail(reason);
        }
    }

    /// Make the next `bind` fail with `reason`.
    pub fn fail_next_bind(&self, reason: impl Into<String>) {
        self.shared.lock().fail_next_bind = Some(reason.into());
    }

    pub fn is_bound(&self) -> bool {
        self.shared.lock().sink.is_some()
    }

    pub fn bind_count(&self) -> u64 {
        self.shared.lock().bind_count
    }

    pub fn unbind_count(&self) -> u64 {
        self.shared.lock().unbind_count
    }

    pub fn frames_created(&self) -> u64 {
        self.shared.frames_created.load(Ordering::SeqCst)
    }

    pub fn frames_released(&self) -> u64 {
        self.shared.frames_released.load(Ordering::SeqCst)
    }

    pub fn device_id(&self) -> &str {
        &self.shared.device_id
    }
}
