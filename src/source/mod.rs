//! Camera preview sources.
//!
//! This module provides `CameraSource` for fetching compressed live-preview images:
//! - libgphoto2 tethered cameras (feature: camera-gphoto2)
//! - Synthetic source for `stub://` URIs (testing without hardware)
//!
//! A source owns the buffer its last preview lives in. `capture_with_retry` hands out a
//! borrowed `CompressedFrame` that stays valid until the source is asked for the next one.
//!
//! SDK failures are classified by `status`. Busy and cancelled calls are retried within
//! the `RetryPolicy` budget; every other failure is returned to the caller as fatal.

#[cfg(feature = "camera-gphoto2")]
pub mod gphoto2;
pub mod status;
pub mod synthetic;

use anyhow::{anyhow, Result};
use std::time::Duration;

use crate::frame::{CompressedFrame, FrameDimensions};

#[cfg(feature = "camera-gphoto2")]
pub use gphoto2::Gphoto2Source;
pub use status::{CallSite, SdkError, SdkStatus};
pub use synthetic::SyntheticSource;

/// A camera that yields one compressed preview per fetch.
pub trait PreviewSource {
    /// Initialise the SDK context and camera handle.
    fn connect(&mut self) -> Result<()>;

    /// Ask the camera for a fresh preview, replacing the previous one.
    ///
    /// SDK failures are reported as `SdkError` so the retry policy can inspect them.
    fn fetch_preview(&mut self) -> Result<()>;

    /// The most recently fetched preview. Empty before the first fetch.
    fn preview(&self) -> CompressedFrame<'_>;

    /// Release the camera. Calling this more than once is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Human readable name for log lines.
    fn describe(&self) -> String;
}

/// How many times a transient SDK failure is retried before it becomes fatal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per capture, including the first. `1` disables retries.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Every failure is fatal on first occurrence.
    pub fn fail_fast() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    /// Whether a failure on attempt `attempt` (1-based) should be retried.
    pub fn should_retry(&self, status: SdkStatus, attempt: u32) -> bool {
        status.is_transient() && attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// One successful capture.
#[derive(Debug)]
pub struct Captured<'a> {
    pub frame: CompressedFrame<'a>,
    /// Transient failures absorbed before the frame arrived.
    pub retries: u32,
}

/// Fetch a preview, retrying transient SDK failures as `policy` allows.
pub fn capture_with_retry<'s, S>(source: &'s mut S, policy: &RetryPolicy) -> Result<Captured<'s>>
where
    S: PreviewSource + ?Sized,
{
    let mut attempt = 1;
    loop {
        let err = match source.fetch_preview() {
            Ok(()) => break,
            Err(err) => err,
        };
        let retry = err
            .downcast_ref::<SdkError>()
            .map(|sdk| policy.should_retry(sdk.status, attempt))
            .unwrap_or(false);
        if !retry {
            return Err(err);
        }
        log::warn!(
            "{}: attempt {}/{} failed ({}), retrying",
            source.describe(),
            attempt,
            policy.max_attempts,
            err
        );
        if !policy.backoff.is_zero() {
            std::thread::sleep(policy.backoff);
        }
        attempt += 1;
    }
    Ok(Captured {
        frame: source.preview(),
        retries: attempt - 1,
    })
}

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Camera URI: `gphoto2://` for the first detected camera, `stub://<name>` for synthetic.
    pub uri: String,
    /// Preview geometry the camera is pinned to.
    pub dims: FrameDimensions,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            uri: "stub://preview".to_string(),
            dims: FrameDimensions::default(),
        }
    }
}

/// Camera preview source.
///
/// Uses libgphoto2 for real cameras, with a synthetic fallback for `stub://` URIs.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "camera-gphoto2")]
    Gphoto2(Gphoto2Source),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.uri.starts_with("stub://") {
            return Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticSource::new(config)),
            });
        }
        if config.uri.starts_with("gphoto2://") {
            #[cfg(feature = "camera-gphoto2")]
            {
                return Ok(Self {
                    backend: CameraBackend::Gphoto2(Gphoto2Source::new(config)),
                });
            }
            #[cfg(not(feature = "camera-gphoto2"))]
            {
                anyhow::bail!("gphoto2 cameras require the camera-gphoto2 feature")
            }
        }
        Err(anyhow!(
            "unsupported camera uri '{}'; expected gphoto2:// or stub://",
            config.uri
        ))
    }
}

impl PreviewSource for CameraSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "camera-gphoto2")]
            CameraBackend::Gphoto2(source) => source.connect(),
        }
    }

    fn fetch_preview(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.fetch_preview(),
            #[cfg(feature = "camera-gphoto2")]
            CameraBackend::Gphoto2(source) => source.fetch_preview(),
        }
    }

    fn preview(&self) -> CompressedFrame<'_> {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.preview(),
            #[cfg(feature = "camera-gphoto2")]
            CameraBackend::Gphoto2(source) => source.preview(),
        }
    }

    fn close(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.close(),
            #[cfg(feature = "camera-gphoto2")]
            CameraBackend::Gphoto2(source) => source.close(),
        }
    }

    fn describe(&self) -> String {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.describe(),
            #[cfg(feature = "camera-gphoto2")]
            CameraBackend::Gphoto2(source) => source.describe(),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
