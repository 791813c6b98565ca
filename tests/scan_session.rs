use anyhow::anyhow;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use scan_session::decode::share;
use scan_session::{
    CameraPermission, ControllerError, DecodeJob, DecodeOutcome, DecodeWorker, DecodedValue,
    Decoder, DeviceClaims, EventRecorder, InlineDecoder, ManualSource, ManualSourceHandle,
    Rotation, ScanController, ScriptedBackend, SessionEvent, SessionState, StubBackend, Symbol,
    Symbology, SyntheticCamera, SyntheticConfig,
};

const WAIT: Duration = Duration::from_secs(5);

fn scripted(script: Vec<anyhow::Result<Vec<Symbol>>>) -> Box<dyn Decoder> {
    Box::new(InlineDecoder::new(share(ScriptedBackend::new(script))).unwrap())
}

fn push(handle: &ManualSourceHandle) -> bool {
    handle.push_pixels(vec![0u8; 64], 8, 8, Rotation::Deg90)
}

fn value(v: &str) -> DecodedValue {
    DecodedValue::new(v).unwrap()
}

/// Keeps decode jobs pending until the test completes them.
#[derive(Clone, Default)]
struct HeldJobs(Arc<Mutex<Vec<DecodeJob>>>);

impl HeldJobs {
    fn take(&self) -> DecodeJob {
        self.0.lock().unwrap().remove(0)
    }
}

impl Decoder for HeldJobs {
    fn name(&self) -> &str {
        "held"
    }

    fn decode(&mut self, job: DecodeJob) {
        self.0.lock().unwrap().push(job);
    }
}

#[test]
fn empty_frame_then_value_completes_the_session() {
    let recorder = EventRecorder::new();
    let controller = ScanController::new(recorder.clone()).unwrap();
    let (source, handle) = ManualSource::new("manual://session/complete");

    controller
        .start(
            Box::new(source),
            Box::new(
                InlineDecoder::new(share(ScriptedBackend::value_after(
                    1,
                    Symbology::Code128,
                    "ABC123",
                )))
                .unwrap(),
            ),
            CameraPermission::Granted,
        )
        .unwrap();
    assert_eq!(controller.state(), SessionState::Scanning);

    assert!(push(&handle));
    assert_eq!(controller.state(), SessionState::Scanning);
    assert!(push(&handle));

    assert_eq!(controller.state(), SessionState::Completed);
    assert_eq!(controller.result(), Some(value("ABC123")));
    assert!(!handle.is_bound());
    assert_eq!(handle.bind_count(), 1);
    assert_eq!(handle.unbind_count(), 1);

    // Source is unbound; further frames go nowhere but are still released.
    assert!(!push(&handle));
    assert_eq!(handle.frames_created(), handle.frames_released());

    let events = recorder.wait_for(2, WAIT);
    assert_eq!(
        events,
        vec![SessionEvent::Started, SessionEvent::Scanned(value("ABC123"))]
    );
}

#[test]
fn decode_errors_keep_scanning_until_stopped() {
    let recorder = EventRecorder::new();
    let controller = ScanController::new(recorder.clone()).unwrap();
    let (source, handle) = ManualSource::new("manual://session/errors");
    let script = (0..5).map(|i| Err(anyhow!("blurry frame {}", i))).collect();

    controller
        .start(Box::new(source), scripted(script), CameraPermission::Granted)
        .unwrap();
    for _ in 0..5 {
        assert!(push(&handle));
    }
    assert_eq!(controller.state(), SessionState::Scanning);
    assert_eq!(controller.snapshot().stats.decode_failures, 5);

    controller.stop().unwrap();

    assert_eq!(controller.state(), SessionState::Idle);
    assert_eq!(controller.result(), None);
    assert!(!handle.is_bound());
    assert_eq!(handle.frames_created(), handle.frames_released());
    let events = recorder.wait_for(2, WAIT);
    assert_eq!(events, vec![SessionEvent::Started, SessionEvent::Stopped]);
}

#[test]
fn binding_failure_fails_the_session_until_reset() {
    let recorder = EventRecorder::new();
    let controller = ScanController::new(recorder.clone()).unwrap();
    let (source, handle) = ManualSource::new("manual://session/bind-failure");
    handle.fail_next_bind("camera in use by another app");

    let err = controller
        .start(Box::new(source), scripted(vec![]), CameraPermission::Granted)
        .unwrap_err();

    assert!(matches!(err, ControllerError::BindingFailed(_)));
    assert_eq!(controller.state(), SessionState::Failed);
    assert!(!DeviceClaims::is_claimed("manual://session/bind-failure"));
    let events = recorder.wait_for(1, WAIT);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].error_code(), Some("BindingFailed"));

    let (retry, _retry_handle) = ManualSource::new("manual://session/bind-failure");
    assert_eq!(
        controller
            .start(Box::new(retry), scripted(vec![]), CameraPermission::Granted)
            .unwrap_err(),
        ControllerError::AlreadyRunning
    );

    controller.reset().unwrap();
    assert_eq!(controller.state(), SessionState::Idle);

    let (retry, retry_handle) = ManualSource::new("manual://session/bind-failure");
    controller
        .start(Box::new(retry), scripted(vec![]), CameraPermission::Granted)
        .unwrap();
    assert!(retry_handle.is_bound());
}

#[test]
fn late_result_after_stop_is_discarded() {
    let recorder = EventRecorder::new();
    let controller = ScanController::new(recorder.clone()).unwrap();
    let (source, handle) = ManualSource::new("manual://session/late");
    let held = HeldJobs::default();

    controller
        .start(Box::new(source), Box::new(held.clone()), CameraPermission::Granted)
        .unwrap();
    assert!(push(&handle));
    let job = held.take();

    controller.stop().unwrap();
    job.complete(DecodeOutcome::Values(vec![value("TOO-LATE")]));

    assert_eq!(controller.state(), SessionState::Idle);
    assert_eq!(controller.result(), None);
    assert_eq!(controller.snapshot().stats.late_results, 1);
    assert_eq!(handle.frames_created(), handle.frames_released());
    let events = recorder.wait_for(3, Duration::from_millis(200));
    assert_eq!(events, vec![SessionEvent::Started, SessionEvent::Stopped]);
}

#[test]
fn abandoned_decode_job_counts_as_failure_and_frees_the_slot() {
    let controller = ScanController::new(EventRecorder::new()).unwrap();
    let (source, handle) = ManualSource::new("manual://session/abandoned");
    let held = HeldJobs::default();

    controller
        .start(Box::new(source), Box::new(held.clone()), CameraPermission::Granted)
        .unwrap();
    assert!(push(&handle));
    assert!(controller.snapshot().decode_in_flight);

    drop(held.take());

    let snapshot = controller.snapshot();
    assert!(!snapshot.decode_in_flight);
    assert_eq!(snapshot.stats.decode_failures, 1);
    assert_eq!(handle.frames_created(), handle.frames_released());
}

#[test]
fn second_start_is_rejected_while_scanning() {
    let controller = ScanController::new(EventRecorder::new()).unwrap();
    let (first, _first_handle) = ManualSource::new("manual://session/double-a");
    let (second, second_handle) = ManualSource::new("manual://session/double-b");

    controller
        .start(Box::new(first), scripted(vec![]), CameraPermission::Granted)
        .unwrap();
    let err = controller
        .start(Box::new(second), scripted(vec![]), CameraPermission::Granted)
        .unwrap_err();

    assert_eq!(err, ControllerError::AlreadyRunning);
    assert_eq!(controller.state(), SessionState::Scanning);
    assert_eq!(second_handle.bind_count(), 0);
}

#[test]
fn a_device_binds_to_one_controller_at_a_time() {
    let first = ScanController::new(EventRecorder::new()).unwrap();
    let second = ScanController::new(EventRecorder::new()).unwrap();
    let (source_a, handle_a) = ManualSource::new("manual://session/shared-camera");
    let (source_b, handle_b) = ManualSource::new("manual://session/shared-camera");

    first
        .start(Box::new(source_a), scripted(vec![]), CameraPermission::Granted)
        .unwrap();
    let err = second
        .start(Box::new(source_b), scripted(vec![]), CameraPermission::Granted)
        .unwrap_err();

    assert_eq!(err, ControllerError::AlreadyRunning);
    assert_eq!(second.state(), SessionState::Idle);
    assert_eq!(handle_b.bind_count(), 0);

    first.stop().unwrap();
    assert!(!handle_a.is_bound());

    let (source_b, handle_b) = ManualSource::new("manual://session/shared-camera");
    second
        .start(Box::new(source_b), scripted(vec![]), CameraPermission::Granted)
        .unwrap();
    assert!(handle_b.is_bound());
}

#[test]
fn frames_outside_a_session_are_released() {
    let controller = ScanController::new(EventRecorder::new()).unwrap();
    let (_source, handle) = ManualSource::new("manual://session/idle-frames");

    controller.on_frame(handle.frame(vec![1u8; 16], 4, 4, Rotation::Deg0));
    controller.on_frame(handle.frame(vec![2u8; 16], 4, 4, Rotation::Deg0));

    assert_eq!(handle.frames_released(), 2);
    assert_eq!(controller.snapshot().stats.frames_discarded, 2);
    assert_eq!(controller.snapshot().stats.frames_received, 0);
}

#[test]
fn sink_can_reset_the_controller_from_an_event() {
    let slot: Arc<Mutex<Option<ScanController>>> = Arc::new(Mutex::new(None));
    let recorder = EventRecorder::new();
    let callback_slot = slot.clone();
    let reset_on_scan = move |event: &SessionEvent| {
        if let SessionEvent::Scanned(_) = event {
            if let Some(controller) = callback_slot.lock().unwrap().as_ref() {
                controller.reset().unwrap();
            }
        }
    };
    let controller = ScanController::new((reset_on_scan, recorder.clone())).unwrap();
    *slot.lock().unwrap() = Some(controller.clone());

    let (source, handle) = ManualSource::new("manual://session/sink-reset");
    controller
        .start(
            Box::new(source),
            scripted(vec![Ok(vec![Symbol::new(Symbology::Ean13, "4006381333931")])]),
            CameraPermission::Granted,
        )
        .unwrap();
    assert!(push(&handle));

    recorder.wait_for(2, WAIT);
    let deadline = Instant::now() + WAIT;
    while controller.state() != SessionState::Idle && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(controller.state(), SessionState::Idle);

    // Break the controller <-> sink cycle.
    slot.lock().unwrap().take();
}

#[test]
fn synthetic_camera_scans_through_a_decode_worker() {
    let recorder = EventRecorder::new();
    let controller = ScanController::new(recorder.clone()).unwrap();
    let camera = SyntheticCamera::new(SyntheticConfig {
        url: "stub://session_e2e".to_string(),
        target_fps: 200,
        width: 64,
        height: 48,
        codes: vec!["PAT-E2E".to_string(), "PAT-IGNORED".to_string()],
        blank_frames: 3,
        seed: Some(11),
        ..SyntheticConfig::default()
    })
    .unwrap();
    let worker = DecodeWorker::spawn(share(StubBackend::new())).unwrap();

    controller
        .start(Box::new(camera), Box::new(worker), CameraPermission::Granted)
        .unwrap();

    let events = recorder.wait_for(2, WAIT);
    assert_eq!(
        events,
        vec![SessionEvent::Started, SessionEvent::Scanned(value("PAT-E2E"))]
    );
    assert_eq!(controller.state(), SessionState::Completed);
    assert!(!DeviceClaims::is_claimed("stub://session_e2e"));
}

#[test]
fn synthetic_stream_end_fails_the_session() {
    let recorder = EventRecorder::new();
    let controller = ScanController::new(recorder.clone()).unwrap();
    let camera = SyntheticCamera::new(SyntheticConfig {
        url: "stub://session_stream_end".to_string(),
        target_fps: 200,
        width: 32,
        height: 32,
        codes: vec![],
        max_frames: Some(3),
        ..SyntheticConfig::default()
    })
    .unwrap();
    let worker = DecodeWorker::spawn(share(StubBackend::new())).unwrap();

    controller
        .start(Box::new(camera), Box::new(worker), CameraPermission::Granted)
        .unwrap();

    let events = recorder.wait_for(2, WAIT);
    assert_eq!(events[0], SessionEvent::Started);
    assert_eq!(events[1].error_code(), Some("SourceFailed"));
    assert_eq!(controller.state(), SessionState::Failed);
}

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while !done() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    true
}

#[test]
fn stop_racing_a_worker_decode_yields_exactly_one_outcome() {
    let device = "manual://session/stop-race";
    for round in 0..200 {
        let recorder = EventRecorder::new();
        let controller = ScanController::new(recorder.clone()).unwrap();
        let (source, handle) = ManualSource::new(device);
        let worker = DecodeWorker::spawn(share(ScriptedBackend::new(vec![Ok(vec![
            Symbol::new(Symbology::Code128, "RACE-1"),
        ])])))
        .unwrap();

        controller
            .start(Box::new(source), Box::new(worker), CameraPermission::Granted)
            .unwrap();
        assert!(push(&handle));
        let stopped = controller.stop().is_ok();

        let events = recorder.wait_for(2, WAIT);
        let scanned = events
            .iter()
            .any(|event| matches!(event, SessionEvent::Scanned(_)));
        let stop_emitted = events.contains(&SessionEvent::Stopped);
        assert!(scanned != stop_emitted, "round {}: {:?}", round, events);
        assert_eq!(stopped, stop_emitted, "round {}", round);

        if stopped {
            // The queued job still runs; its result must land as late.
            assert!(
                wait_until(|| controller.snapshot().stats.late_results == 1),
                "round {}: decode result never arrived",
                round
            );
            assert_eq!(controller.state(), SessionState::Idle);
            assert_eq!(controller.result(), None);
        } else {
            assert_eq!(controller.state(), SessionState::Completed);
            assert_eq!(controller.result(), Some(value("RACE-1")));
        }
        assert!(wait_until(|| handle.frames_created() == handle.frames_released()));
        assert_eq!(recorder.events().len(), 2, "round {}", round);
        assert_eq!(handle.bind_count(), 1);
        assert_eq!(handle.unbind_count(), 1);
        assert!(!DeviceClaims::is_claimed(device));
    }
}
