//! Synthetic camera source.
//!
//! `SyntheticCamera` stands in for a device camera on `stub://` URLs. While
//! bound it runs one capture thread that pushes frames at `target_fps`:
//! - The first `blank_frames` frames show an empty scene
//! - Later frames carry the configured codes as a stub marker
//! - Pixels get light random noise so consecutive frames differ
//!
//! Unbinding only signals the capture thread; it never joins it, so unbind
//! is safe from the capture thread itself.

use anyhow::{anyhow, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::{FrameSink, FrameSource};
use crate::decode::backends::stub::write_marker;
use crate::decode::Symbology;
use crate::frame::{Frame, Rotation};

/// Configuration for a synthetic camera.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Must use the `stub://` scheme (e.g., "stub://back_camera").
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    /// Codes visible once the scene settles. Empty means nothing to scan.
    pub codes: Vec<String>,
    pub symbology: Symbology,
    /// Frames delivered before the codes appear.
    pub blank_frames: u64,
    /// End the stream (reported as a source failure) after this many frames.
    pub max_frames: Option<u64>,
    /// Seed for pixel noise; random when unset.
    pub seed: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://back_camera".to_string(),
            target_fps: 15,
            width: 320,
            height: 240,
            rotation: Rotation::Deg90,
            codes: vec!["PAT-000001".to_string()],
            symbology: Symbology::Code128,
            blank_frames: 10,
            max_frames: None,
            seed: None,
        }
    }
}

/// Synthetic camera source.
pub struct SyntheticCamera {
    config: SyntheticConfig,
    running: Option<Arc<AtomicBool>>,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            return Err(anyhow!(
                "synthetic camera only supports stub:// URLs (got {})",
                config.url
            ));
        }
        if config.target_fps == 0 {
            return Err(anyhow!("synthetic camera target_fps must be > 0"));
        }
        pixel_count(config.width, config.height)?;
        Ok(Self {
            config,
            running: None,
        })
    }
}

/// Luma bytes per frame. Rejects empty and overflowing dimensions.
pub(crate) fn pixel_count(width: u32, height: u32) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(anyhow!("frame dimensions must be non-zero"));
    }
    width
        .checked_mul(height)
        .and_then(|count| usize::try_from(count).ok())
        .ok_or_else(|| anyhow!("frame dimensions {}x{} are too large", width, height))
}

impl FrameSource for SyntheticCamera {
    fn device_id(&self) -> &str {
        &self.config.url
    }

    fn bind(&mut self, sink: FrameSink) -> Result<()> {
        if self.running.is_some() {
            return Ok(());
        }
        let running = Arc::new(AtomicBool::new(true));
        let mut capture = Capture {
            config: self.config.clone(),
            running: running.clone(),
            rng: match self.config.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            },
            sequence: 0,
        };
        thread::Builder::new()
            .name(format!("camera-{}", self.config.url.trim_start_matches("stub://")))
            .spawn(move || capture.run(sink))
            .with_context(|| format!("failed to start capture thread for {}", self.config.url))?;
        self.running = Some(running);
        log::info!(
            "SyntheticCamera: bound {} ({}x{} @ {} fps, rotation {})",
            self.config.url,
            self.config.width,
            self.config.height,
            self.config.target_fps,
            self.config.rotation.degrees()
        );
        Ok(())
    }

    fn unbind(&mut self) {
        if let Some(running) = self.running.take() {
            running.store(false, Ordering::SeqCst);
            log::info!("SyntheticCamera: unbound {}", self.config.url);
        }
    }

    fn is_bound(&self) -> bool {
        self.running.is_some()
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.unbind();
    }
}

// ----------------------------------------------------------------------------
// Capture thread
// ----------------------------------------------------------------------------

struct Capture {
    config: SyntheticConfig,
    running: Arc<AtomicBool>,
    rng: StdRng,
    sequence: u64,
}

impl Capture {
    fn run(&mut self, sink: FrameSink) {
        let interval = Duration::from_secs_f64(1.0 / self.config.target_fps as f64);
        while self.running.load(Ordering::SeqCst) && sink.is_attached() {
            thread::sleep(interval);
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            if let Some(max) = self.config.max_frames {
                if self.sequence >= max {
                    sink.fail(format!("synthetic stream ended after {} frames", max));
                    break;
                }
            }
            match self.next_frame() {
                Ok(frame) => sink.push(frame),
                Err(e) => {
                    sink.fail(format!("{:#}", e));
                    break;
                }
            }
        }
        log::debug!("SyntheticCamera: capture thread for {} exited", self.config.url);
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.sequence += 1;
        let pixels = self.generate_pixels()?;
        Ok(Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            self.config.rotation,
            self.sequence,
        ))
    }

    /// Grey background with light noise, plus the marker once the scene settles.
    fn generate_pixels(&mut self) -> Result<Vec<u8>> {
        let mut pixels = vec![0u8; pixel_count(self.config.width, self.config.height)?];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            let base = ((i as u64 + self.sequence) % 64) as u8 + 96;
            *pixel = base.wrapping_add(self.rng.gen_range(0..8));
        }

        if self.sequence > self.config.blank_frames && !self.config.codes.is_empty() {
            let symbols: Vec<(Symbology, &str)> = self
                .config
                .codes
                .iter()
                .map(|code| (self.config.symbology, code.as_str()))
                .collect();
            write_marker(&mut pixels, &symbols)?;
        }
        Ok(pixels)
    }
}
