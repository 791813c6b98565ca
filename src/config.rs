use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

use crate::decode::Symbology;
use crate::frame::Rotation;
use crate::ingest::synthetic::pixel_count;
use crate::ingest::SyntheticConfig;

const DEFAULT_CAMERA_URL: &str = "stub://back_camera";
const DEFAULT_CAMERA_FPS: u32 = 15;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_ROTATION: u16 = 90;
const DEFAULT_DECODER_BACKEND: &str = "stub";
const DEFAULT_SYNTHETIC_CODE: &str = "PAT-000123";
const DEFAULT_BLANK_FRAMES: u64 = 10;

#[derive(Debug, Deserialize, Default)]
struct ScanConfigFile {
    camera: Option<CameraConfigFile>,
    decoder: Option<DecoderConfigFile>,
    synthetic: Option<SyntheticConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    rotation_degrees: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
struct DecoderConfigFile {
    backend: Option<String>,
    formats: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct SyntheticConfigFile {
    codes: Option<Vec<String>>,
    symbology: Option<String>,
    blank_frames: Option<u64>,
    max_frames: Option<u64>,
    seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub camera: CameraSettings,
    pub decoder: DecoderSettings,
    pub synthetic: SyntheticSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    pub rotation_degrees: u16,
}

#[derive(Debug, Clone)]
pub struct DecoderSettings {
    pub backend: String,
    /// Empty means every format the backend knows.
    pub formats: Vec<Symbology>,
}

#[derive(Debug, Clone)]
pub struct SyntheticSettings {
    pub codes: Vec<String>,
    pub symbology: Symbology,
    pub blank_frames: u64,
    pub max_frames: Option<u64>,
    pub seed: Option<u64>,
}

impl ScanConfig {
    /// Load from `SCAN_CONFIG` (if set), then apply env overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SCAN_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit path, then apply env overrides and validate.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ScanConfigFile) -> Result<Self> {
        let camera = file.camera.unwrap_or_default();
        let decoder = file.decoder.unwrap_or_default();
        let synthetic = file.synthetic.unwrap_or_default();

        let formats = decoder
            .formats
            .unwrap_or_default()
            .iter()
            .map(|name| name.parse::<Symbology>())
            .collect::<Result<Vec<_>>>()?;
        let symbology = match synthetic.symbology {
            Some(name) => name.parse::<Symbology>()?,
            None => Symbology::Code128,
        };

        Ok(Self {
            camera: CameraSettings {
                url: camera.url.unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                rotation_degrees: camera.rotation_degrees.unwrap_or(DEFAULT_CAMERA_ROTATION),
            },
            decoder: DecoderSettings {
                backend: decoder
                    .backend
                    .unwrap_or_else(|| DEFAULT_DECODER_BACKEND.to_string()),
                formats,
            },
            synthetic: SyntheticSettings {
                codes: synthetic
                    .codes
                    .unwrap_or_else(|| vec![DEFAULT_SYNTHETIC_CODE.to_string()]),
                symbology,
                blank_frames: synthetic.blank_frames.unwrap_or(DEFAULT_BLANK_FRAMES),
                max_frames: synthetic.max_frames,
                seed: synthetic.seed,
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SCAN_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera.url = url;
            }
        }
        if let Ok(fps) = std::env::var("SCAN_CAMERA_FPS") {
            self.camera.target_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("SCAN_CAMERA_FPS must be a positive integer"))?;
        }
        if let Ok(rotation) = std::env::var("SCAN_CAMERA_ROTATION") {
            self.camera.rotation_degrees = rotation
                .trim()
                .parse()
                .map_err(|_| anyhow!("SCAN_CAMERA_ROTATION must be 0, 90, 180 or 270"))?;
        }
        if let Ok(backend) = std::env::var("SCAN_DECODER") {
            if !backend.trim().is_empty() {
                self.decoder.backend = backend.trim().to_string();
            }
        }
        if let Ok(codes) = std::env::var("SCAN_SYNTHETIC_CODES") {
            let parsed = split_csv(&codes);
            if !parsed.is_empty() {
                self.synthetic.codes = parsed;
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.camera.url.trim().is_empty() {
            return Err(anyhow!("camera url must not be empty"));
        }
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be greater than zero"));
        }
        pixel_count(self.camera.width, self.camera.height)
            .map_err(|e| anyhow!("camera {}", e))?;
        Rotation::from_degrees(self.camera.rotation_degrees)?;
        if self.synthetic.codes.iter().any(|code| code.is_empty()) {
            return Err(anyhow!("synthetic codes must not be empty strings"));
        }
        self.decoder.formats.sort_by_key(|format| format.as_str());
        self.decoder.formats.dedup();
        Ok(())
    }

    pub fn rotation(&self) -> Rotation {
        // Checked in `validate`.
        Rotation::from_degrees(self.camera.rotation_degrees).unwrap_or_default()
    }

    /// Synthetic camera settings for `stub://` camera URLs.
    pub fn synthetic_camera(&self) -> SyntheticConfig {
        SyntheticConfig {
            url: self.camera.url.clone(),
            target_fps: self.camera.target_fps,
            width: self.camera.width,
            height: self.camera.height,
            rotation: self.rotation(),
            codes: self.synthetic.codes.clone(),
            symbology: self.synthetic.symbology,
            blank_frames: self.synthetic.blank_frames,
            max_frames: self.synthetic.max_frames,
            seed: self.synthetic.seed,
        }
    }
}

fn read_config_file(path: &Path) -> Result<ScanConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
