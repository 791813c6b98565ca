use std::collections::HashMap;

use anyhow::{anyhow, Result};

use super::backend::{DecoderBackend, Symbology};
use super::worker::{share, DecodeWorker, InlineDecoder, SharedBackend};

/// Thread-safe registry of decoder backends.
pub struct BackendRegistry {
    backends: HashMap<String, SharedBackend>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DecoderBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, share(backend));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("decoder backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<SharedBackend> {
        self.backends.get(name).cloned()
    }

    pub fn default_backend(&self) -> Option<SharedBackend> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Registered backend names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Select a backend that supports every requested format.
    ///
    /// Prefers the default backend when it qualifies.
    pub fn backend_for_formats(&self, formats: &[Symbology]) -> Result<SharedBackend> {
        if let Some(default_backend) = self.default_backend() {
            if supports_all(&default_backend, formats)? {
                return Ok(default_backend);
            }
        }

        for name in self.list() {
            if let Some(backend) = self.get(&name) {
                if supports_all(&backend, formats)? {
                    return Ok(backend);
                }
            }
        }

        Err(anyhow!(
            "no registered decoder backend supports formats {:?}",
            formats
        ))
    }

    /// Run warm-up hooks on every backend.
    pub fn warm_up_all(&self) -> Result<()> {
        for name in self.list() {
            if let Some(backend) = self.get(&name) {
                let mut guard = backend
                    .lock()
                    .map_err(|_| anyhow!("decoder backend '{}' lock poisoned", name))?;
                guard.warm_up()?;
            }
        }
        Ok(())
    }

    /// Spawn a decode worker for a named backend.
    pub fn worker(&self, name: &str) -> Result<DecodeWorker> {
        let backend = self
            .get(name)
            .ok_or_else(|| anyhow!("decoder backend '{}' not registered", name))?;
        DecodeWorker::spawn(backend)
    }

    /// Build an inline decoder for a named backend.
    pub fn inline(&self, name: &str) -> Result<InlineDecoder> {
        let backend = self
            .get(name)
            .ok_or_else(|| anyhow!("decoder backend '{}' not registered", name))?;
        InlineDecoder::new(backend)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn supports_all(backend: &SharedBackend, formats: &[Symbology]) -> Result<bool> {
    let guard = backend
        .lock()
        .map_err(|_| anyhow!("decoder backend lock poisoned"))?;
    Ok(formats.iter().all(|format| guard.supports(*format)))
}
