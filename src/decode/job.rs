use super::outcome::{DecodeError, DecodeOutcome};
use crate::frame::{Frame, FrameView};

type Completion = Box<dyn FnOnce(DecodeOutcome) + Send + 'static>;

/// One frame handed to a decoder, together with its completion.
///
/// Completing the job releases the frame first, then delivers the outcome.
/// A job dropped without completion does the same with a `Failed` outcome,
/// so the session never waits on a decoder that lost a job.
pub struct DecodeJob {
    // Field order matters: the frame is released before the guard fires.
    frame: Frame,
    completion: CompletionGuard,
}

impl DecodeJob {
    pub fn new(frame: Frame, completion: impl FnOnce(DecodeOutcome) + Send + 'static) -> Self {
        Self {
            frame,
            completion: CompletionGuard(Some(Box::new(completion))),
        }
    }

    pub fn view(&self) -> FrameView<'_> {
        self.frame.view()
    }

    /// Release the frame and deliver `outcome`.
    pub fn complete(self, outcome: DecodeOutcome) {
        let DecodeJob {
            frame,
            mut completion,
        } = self;
        frame.release();
        completion.fire(outcome);
    }
}

struct CompletionGuard(Option<Completion>);

impl CompletionGuard {
    fn fire(&mut self, outcome: DecodeOutcome) {
        if let Some(completion) = self.0.take() {
            completion(outcome);
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.fire(DecodeOutcome::Failed(DecodeError::abandoned()));
    }
}

/// Asynchronous decoder.
///
/// `decode` must return promptly. The job may be completed before `decode`
/// returns or later from any thread. Jobs arrive one at a time per session.
pub trait Decoder: Send {
    fn name(&self) -> &str;

    fn decode(&mut self, job: DecodeJob);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Rotation;
    use crate::DecodedValue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn tracked_job() -> (DecodeJob, Arc<AtomicUsize>, Arc<Mutex<Vec<String>>>) {
        let releases = Arc::new(AtomicUsize::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));

        let release_counter = releases.clone();
        let release_log = log.clone();
        let frame = Frame::new(vec![0u8; 4], 2, 2, Rotation::Deg0, 1).with_release_hook(move || {
            release_counter.fetch_add(1, Ordering::SeqCst);
            release_log.lock().unwrap().push("released".to_string());
        });

        let outcome_log = log.clone();
        let job = DecodeJob::new(frame, move |outcome| {
            outcome_log.lock().unwrap().push(format!("{:?}", outcome));
        });
        (job, releases, log)
    }

    #[test]
    fn complete_releases_frame_before_delivering_outcome() {
        let (job, releases, log) = tracked_job();
        let value = DecodedValue::new("ABC123").unwrap();

        job.complete(DecodeOutcome::Values(vec![value]));

        assert_eq!(releases.load(Ordering::SeqCst), 1);
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], "released");
        assert!(log[1].contains("ABC123"));
    }

    #[test]
    fn dropped_job_reports_abandoned_failure() {
        let (job, releases, log) = tracked_job();

        drop(job);

        assert_eq!(releases.load(Ordering::SeqCst), 1);
        let log = log.lock().unwrap();
        assert_eq!(log[0], "released");
        assert!(log[1].contains("abandoned"));
    }
}
