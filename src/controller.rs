//! Scan session controller.
//!
//! All transitions happen under one mutex. Whoever takes the lock first wins
//! a race; the loser sees the new state and becomes a no-op. A late decode
//! result, a frame from an old session, or a `stop()` after completion all
//! end up discarded this way.
//!
//! Events are queued while the lock is held, so the sink sees them in
//! transition order. They are delivered on a dedicated event thread, which
//! lets sinks call back into the controller.

use anyhow::Context;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::SystemTime;

use crate::decode::{DecodeJob, DecodeOutcome, Decoder};
use crate::error::ControllerError;
use crate::frame::Frame;
use crate::ingest::{DeviceClaim, DeviceClaims, FrameConsumer, FrameSink, FrameSource};
use crate::session::{SessionEvent, SessionSnapshot, SessionState, SessionStats};
use crate::sink::ResultSink;
use crate::DecodedValue;

/// Camera permission as confirmed by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraPermission {
    Granted,
    Denied,
}

impl CameraPermission {
    pub fn is_granted(self) -> bool {
        matches!(self, CameraPermission::Granted)
    }
}

type SharedDecoder = Arc<Mutex<Box<dyn Decoder>>>;

/// A bound source together with its device claim.
///
/// Dropping the binding unbinds the source, then releases the claim.
struct Binding {
    source: Box<dyn FrameSource>,
    _claim: DeviceClaim,
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.source.unbind();
    }
}

struct Session {
    generation: u64,
    state: SessionState,
    started_at: Option<SystemTime>,
    result: Option<DecodedValue>,
    decode_in_flight: bool,
    device_id: Option<String>,
    stats: SessionStats,
    binding: Option<Binding>,
    decoder: Option<SharedDecoder>,
    events: Sender<SessionEvent>,
}

impl Session {
    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            log::debug!("event thread gone; dropping session event");
        }
    }

    /// Leave the active states. Returns the binding so the caller decides
    /// when it is dropped.
    fn finish(&mut self, state: SessionState) -> Option<Binding> {
        self.state = state;
        self.decode_in_flight = false;
        self.decoder = None;
        self.binding.take()
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            generation: self.generation,
            state: self.state,
            started_at: self.started_at,
            result: self.result.clone(),
            decode_in_flight: self.decode_in_flight,
            device_id: self.device_id.clone(),
            stats: self.stats,
        }
    }
}

struct Shared {
    /// Handed to frame sinks and decode completions.
    me: Weak<Shared>,
    session: Mutex<Session>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Session> {
        // Every transition leaves the session consistent before it can panic.
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn on_decode_result(&self, generation: u64, outcome: DecodeOutcome) {
        let mut session = self.lock();
        if session.generation != generation {
            log::debug!(
                "discarding decode result from session {} (current {})",
                generation,
                session.generation
            );
            return;
        }
        session.decode_in_flight = false;
        if session.state != SessionState::Scanning {
            session.stats.late_results += 1;
            log::debug!(
                "discarding decode result in state {:?} for session {}",
                session.state,
                generation
            );
            return;
        }

        match outcome {
            DecodeOutcome::Values(values) => {
                let extra = values.len().saturating_sub(1);
                let Some(value) = values.into_iter().next() else {
                    session.stats.empty_results += 1;
                    return;
                };
                if extra > 0 {
                    log::debug!("ignoring {} additional values in the same frame", extra);
                }
                session.result = Some(value.clone());
                let binding = session.finish(SessionState::Completed);
                log::info!("session {} scanned {}", generation, value);
                session.emit(SessionEvent::Scanned(value));
                drop(binding);
            }
            DecodeOutcome::Empty => {
                session.stats.empty_results += 1;
            }
            DecodeOutcome::Failed(e) => {
                session.stats.decode_failures += 1;
                let err = ControllerError::DecodeFailed(e.to_string());
                log::warn!("session {} {}; waiting for the next frame", generation, err);
            }
        }
    }
}

impl FrameConsumer for Shared {
    fn consume_frame(&self, generation: u64, frame: Frame) {
        let decoder = {
            let mut session = self.lock();
            if session.generation != generation || session.state != SessionState::Scanning {
                session.stats.frames_discarded += 1;
                None
            } else {
                session.stats.frames_received += 1;
                if session.decode_in_flight {
                    session.stats.frames_dropped += 1;
                    log::debug!("decode in flight; dropping frame {}", frame.sequence);
                    None
                } else {
                    match session.decoder.clone() {
                        Some(decoder) => {
                            session.decode_in_flight = true;
                            session.stats.decode_attempts += 1;
                            Some(decoder)
                        }
                        None => None,
                    }
                }
            }
        };

        let Some(decoder) = decoder else {
            frame.release();
            return;
        };

        log::debug!("decoding frame {} ({} ms old)", frame.sequence, frame.age_ms());
        let shared = self.me.clone();
        let job = DecodeJob::new(frame, move |outcome| {
            if let Some(shared) = shared.upgrade() {
                shared.on_decode_result(generation, outcome);
            }
        });
        let guard = decoder.lock();
        match guard {
            Ok(mut decoder) => decoder.decode(job),
            Err(_) => {
                log::error!("decoder lock poisoned; abandoning decode job");
                drop(job);
            }
        }
    }

    fn source_failed(&self, generation: u64, reason: String) {
        let mut session = self.lock();
        if session.generation != generation || session.state != SessionState::Scanning {
            log::debug!("ignoring source failure outside scanning: {}", reason);
            return;
        }
        let err = ControllerError::SourceFailed(reason);
        log::error!("session {} failed: {}", generation, err);
        let binding = session.finish(SessionState::Failed);
        session.emit(SessionEvent::error(&err));
        drop(binding);
    }
}

/// Single-shot scan session controller.
///
/// Cloning yields another handle to the same controller. The source binding
/// is released when the last handle is dropped. A sink that holds a handle
/// keeps the controller alive for as long as the sink lives.
#[derive(Clone)]
pub struct ScanController {
    shared: Arc<Shared>,
}

impl ScanController {
    /// Create a controller delivering events to `sink` on a dedicated thread.
    pub fn new<S: ResultSink>(sink: S) -> anyhow::Result<Self> {
        let (events, rx) = mpsc::channel::<SessionEvent>();
        thread::Builder::new()
            .name("scan-events".to_string())
            .spawn(move || {
                for event in rx {
                    sink.on_event(&event);
                }
            })
            .context("failed to spawn scan event thread")?;

        Ok(Self {
            shared: Arc::new_cyclic(|me| Shared {
                me: me.clone(),
                session: Mutex::new(Session {
                    generation: 0,
                    state: SessionState::Idle,
                    started_at: None,
                    result: None,
                    decode_in_flight: false,
                    device_id: None,
                    stats: SessionStats::default(),
                    binding: None,
                    decoder: None,
                    events,
                }),
            }),
        })
    }

    /// Start a session.
    ///
    /// Binds `source` and emits `Started`. Fails with `AlreadyRunning` when a
    /// session is active here or the device is held elsewhere, and with
    /// `PermissionDenied` unless permission is granted. A bind failure moves
    /// the session to `Failed`, emits `Error` and is returned as `BindingFailed`.
    pub fn start(
        &self,
        source: Box<dyn FrameSource>,
        decoder: Box<dyn Decoder>,
        permission: CameraPermission,
    ) -> Result<(), ControllerError> {
        let device_id = source.device_id().to_string();
        let (generation, claim) = {
            let mut session = self.shared.lock();
            if session.state != SessionState::Idle {
                return Err(ControllerError::AlreadyRunning);
            }
            if !permission.is_granted() {
                log::warn!("camera permission not granted; refusing to start");
                return Err(ControllerError::PermissionDenied);
            }
            // Claimed before any session field changes, so a refused start
            // leaves the previous snapshot intact.
            let Some(claim) = DeviceClaims::try_claim(&device_id) else {
                log::warn!("device {} is held by another session", device_id);
                return Err(ControllerError::AlreadyRunning);
            };
            session.generation += 1;
            session.state = SessionState::Starting;
            session.started_at = Some(SystemTime::now());
            session.result = None;
            session.decode_in_flight = false;
            session.device_id = Some(device_id.clone());
            session.stats = SessionStats::default();
            session.decoder = Some(Arc::new(Mutex::new(decoder)));
            (session.generation, claim)
        };

        let mut binding = Binding {
            source,
            _claim: claim,
        };
        let consumer: Weak<dyn FrameConsumer> = self.shared.me.clone();
        let bound = binding.source.bind(FrameSink::new(consumer, generation));

        let mut session = self.shared.lock();
        let current = session.generation == generation && session.state == SessionState::Starting;
        match bound {
            Ok(()) if current => {
                session.state = SessionState::Scanning;
                session.binding = Some(binding);
                log::info!("session {} scanning on {}", generation, device_id);
                session.emit(SessionEvent::Started);
                Ok(())
            }
            Ok(()) => {
                log::info!("session {} stopped while binding {}", generation, device_id);
                drop(binding);
                Err(ControllerError::Cancelled)
            }
            Err(e) => {
                let err = ControllerError::BindingFailed(format!("{:#}", e));
                log::error!("session {} binding {} failed: {:#}", generation, device_id, e);
                if current {
                    session.finish(SessionState::Failed);
                    session.emit(SessionEvent::error(&err));
                }
                drop(binding);
                Err(err)
            }
        }
    }

    /// Cancel a starting or scanning session. Emits `Stopped`.
    pub fn stop(&self) -> Result<(), ControllerError> {
        let mut session = self.shared.lock();
        match session.state {
            SessionState::Starting | SessionState::Scanning => {
                session.result = None;
                let binding = session.finish(SessionState::Idle);
                log::info!("session {} stopped", session.generation);
                session.emit(SessionEvent::Stopped);
                drop(binding);
                Ok(())
            }
            other => Err(ControllerError::NotRunning(other)),
        }
    }

    /// Return a completed or failed session to `Idle`.
    pub fn reset(&self) -> Result<(), ControllerError> {
        let mut session = self.shared.lock();
        match session.state {
            SessionState::Completed | SessionState::Failed => {
                session.state = SessionState::Idle;
                session.result = None;
                session.started_at = None;
                log::debug!("session {} reset", session.generation);
                Ok(())
            }
            other => Err(ControllerError::NotResettable(other)),
        }
    }

    /// Deliver a frame to the current session.
    ///
    /// Bound sources use their `FrameSink`; this entry point serves hosts that
    /// deliver frames themselves. The frame is always released.
    pub fn on_frame(&self, frame: Frame) {
        let generation = self.shared.lock().generation;
        self.shared.consume_frame(generation, frame);
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    /// Result of the current session, once completed.
    pub fn result(&self) -> Option<DecodedValue> {
        self.shared.lock().result.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.lock().snapshot()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
