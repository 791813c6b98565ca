use anyhow::{anyhow, Context, Result};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::backend::DecoderBackend;
use super::job::{DecodeJob, Decoder};
use super::outcome::{DecodeError, DecodeOutcome};

/// Backend shared between a registry and the decoders built from it.
///
/// Backends are wrapped in `Mutex` because `DecoderBackend::decode` takes `&mut self`.
pub type SharedBackend = Arc<Mutex<dyn DecoderBackend>>;

pub fn share<B: DecoderBackend + 'static>(backend: B) -> SharedBackend {
    Arc::new(Mutex::new(backend))
}

fn backend_name(backend: &SharedBackend) -> Result<String> {
    let guard = backend
        .lock()
        .map_err(|_| anyhow!("decoder backend lock poisoned"))?;
    Ok(guard.name().to_string())
}

fn run_backend(name: &str, backend: &SharedBackend, job: &DecodeJob) -> DecodeOutcome {
    let mut guard = match backend.lock() {
        Ok(guard) => guard,
        Err(_) => {
            return DecodeOutcome::Failed(DecodeError::new(name, "decoder backend lock poisoned"))
        }
    };
    let result = guard.decode(&job.view());
    DecodeOutcome::from_backend_result(name, result)
}

/// Runs a blocking backend on a dedicated thread.
///
/// Jobs are processed in arrival order, one at a time. Dropping the worker
/// closes its queue; the thread exits after the job it is running.
pub struct DecodeWorker {
    name: String,
    jobs: Sender<DecodeJob>,
    handle: Option<JoinHandle<()>>,
}

impl DecodeWorker {
    pub fn spawn(backend: SharedBackend) -> Result<Self> {
        let name = backend_name(&backend)?;
        let (jobs, rx) = mpsc::channel::<DecodeJob>();
        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(format!("decode-{}", name))
            .spawn(move || {
                for job in rx {
                    let outcome = run_backend(&thread_name, &backend, &job);
                    job.complete(outcome);
                }
                log::debug!("decode worker {} stopped", thread_name);
            })
            .with_context(|| format!("failed to spawn decode worker for {}", name))?;
        log::info!("decode worker started for backend {}", name);
        Ok(Self {
            name,
            jobs,
            handle: Some(handle),
        })
    }

    /// Close the queue and wait for the worker thread to finish.
    pub fn shutdown(mut self) -> Result<()> {
        let handle = self.handle.take();
        drop(self);
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| anyhow!("decode worker thread panicked"))?;
        }
        Ok(())
    }
}

impl Decoder for DecodeWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn decode(&mut self, job: DecodeJob) {
        if let Err(mpsc::SendError(job)) = self.jobs.send(job) {
            log::warn!("decode worker {} is gone; abandoning job", self.name);
            drop(job);
        }
    }
}

/// Runs a blocking backend inside `decode`, on the caller's thread.
///
/// Suitable when frames already arrive on a dedicated worker thread.
pub struct InlineDecoder {
    name: String,
    backend: SharedBackend,
}

impl InlineDecoder {
    pub fn new(backend: SharedBackend) -> Result<Self> {
        let name = backend_name(&backend)?;
        Ok(Self { name, backend })
    }
}

impl Decoder for InlineDecoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn decode(&mut self, job: DecodeJob) {
        let outcome = run_backend(&self.name, &self.backend, &job);
        job.complete(outcome);
    }
}
