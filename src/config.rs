use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::frame::{FrameDimensions, DEFAULT_FRAME_HEIGHT, DEFAULT_FRAME_WIDTH};
use crate::pipeline::PipelineConfig;
use crate::source::{CameraConfig, RetryPolicy};

#[cfg(feature = "camera-gphoto2")]
const DEFAULT_CAMERA_URI: &str = "gphoto2://";
#[cfg(not(feature = "camera-gphoto2"))]
const DEFAULT_CAMERA_URI: &str = "stub://preview";
#[cfg(feature = "sink-v4l2")]
const DEFAULT_SINK_DEVICE: &str = "/dev/video0";
#[cfg(not(feature = "sink-v4l2"))]
const DEFAULT_SINK_DEVICE: &str = "stub://sink";
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 200;
const DEFAULT_STATS_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Deserialize, Default)]
struct BridgeConfigFile {
    camera: Option<CameraConfigFile>,
    sink: Option<SinkConfigFile>,
    frame: Option<FrameConfigFile>,
    retry: Option<RetryConfigFile>,
    stats_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    uri: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SinkConfigFile {
    device: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct FrameConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct RetryConfigFile {
    max_attempts: Option<u32>,
    backoff_ms: Option<u64>,
}

/// Settings for the camera-to-sink bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub camera_uri: String,
    pub sink_device: String,
    pub width: u32,
    pub height: u32,
    pub retry: RetryPolicy,
    pub stats_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            camera_uri: DEFAULT_CAMERA_URI.to_string(),
            sink_device: DEFAULT_SINK_DEVICE.to_string(),
            width: DEFAULT_FRAME_WIDTH,
            height: DEFAULT_FRAME_HEIGHT,
            retry: RetryPolicy {
                max_attempts: DEFAULT_RETRY_ATTEMPTS,
                backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            },
            stats_interval: Duration::from_secs(DEFAULT_STATS_INTERVAL_SECS),
        }
    }
}

impl BridgeConfig {
    /// Defaults, then the file named by `DSLR_WEBCAM_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DSLR_WEBCAM_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like `load`, with an explicit config file instead of `DSLR_WEBCAM_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => BridgeConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: BridgeConfigFile) -> Self {
        let defaults = Self::default();
        let camera_uri = file
            .camera
            .and_then(|camera| camera.uri)
            .unwrap_or(defaults.camera_uri);
        let sink_device = file
            .sink
            .and_then(|sink| sink.device)
            .unwrap_or(defaults.sink_device);
        let width = file
            .frame
            .as_ref()
            .and_then(|frame| frame.width)
            .unwrap_or(defaults.width);
        let height = file
            .frame
            .as_ref()
            .and_then(|frame| frame.height)
            .unwrap_or(defaults.height);
        let retry = RetryPolicy {
            max_attempts: file
                .retry
                .as_ref()
                .and_then(|retry| retry.max_attempts)
                .unwrap_or(defaults.retry.max_attempts),
            backoff: file
                .retry
                .as_ref()
                .and_then(|retry| retry.backoff_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry.backoff),
        };
        let stats_interval = file
            .stats_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.stats_interval);
        Self {
            camera_uri,
            sink_device,
            width,
            height,
            retry,
            stats_interval,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(uri) = std::env::var("DSLR_WEBCAM_CAMERA") {
            if !uri.trim().is_empty() {
                self.camera_uri = uri;
            }
        }
        if let Ok(device) = std::env::var("DSLR_WEBCAM_DEVICE") {
            if !device.trim().is_empty() {
                self.sink_device = device;
            }
        }
        if let Ok(attempts) = std::env::var("DSLR_WEBCAM_RETRY_ATTEMPTS") {
            self.retry.max_attempts = attempts.trim().parse().map_err(|_| {
                anyhow!("DSLR_WEBCAM_RETRY_ATTEMPTS must be a positive integer")
            })?;
        }
        if let Ok(backoff) = std::env::var("DSLR_WEBCAM_RETRY_BACKOFF_MS") {
            let millis: u64 = backoff.trim().parse().map_err(|_| {
                anyhow!("DSLR_WEBCAM_RETRY_BACKOFF_MS must be an integer number of milliseconds")
            })?;
            self.retry.backoff = Duration::from_millis(millis);
        }
        Ok(())
    }

    /// Check the settings. Call again after changing fields by hand.
    pub fn validate(&self) -> Result<()> {
        FrameDimensions::new(self.width, self.height)?;
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry max_attempts must be at least 1"));
        }
        if self.camera_uri.trim().is_empty() {
            return Err(anyhow!("camera uri must not be empty"));
        }
        if self.sink_device.trim().is_empty() {
            return Err(anyhow!("sink device must not be empty"));
        }
        Ok(())
    }

    pub fn dims(&self) -> Result<FrameDimensions> {
        FrameDimensions::new(self.width, self.height)
    }

    pub fn camera_config(&self) -> Result<CameraConfig> {
        Ok(CameraConfig {
            uri: self.camera_uri.clone(),
            dims: self.dims()?,
        })
    }

    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        Ok(PipelineConfig {
            dims: self.dims()?,
            retry: self.retry,
            stats_interval: self.stats_interval,
        })
    }
}

fn read_config_file(path: &Path) -> Result<BridgeConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
