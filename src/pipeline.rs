//! Pipeline controller: camera preview -> JPEG decode -> YUYV conversion -> sink.
//!
//! The controller owns every stage and both frame buffers. It runs single-threaded and
//! blocking, one frame per iteration with no pacing, until the shutdown flag is observed
//! at the loop head. Resources are released decoder first, then sink, then camera.

use anyhow::{anyhow, Context, Result};
use std::time::{Duration, Instant};

use crate::convert::convert;
use crate::decode::JpegFrameDecoder;
use crate::frame::{FrameDimensions, RgbRaster, YuyvFrame};
use crate::shutdown::ShutdownFlag;
use crate::sink::{FrameSink, SinkClosed, SinkFormat};
use crate::source::{capture_with_retry, PreviewSource, RetryPolicy};

const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Ready,
    Running,
    Draining,
    Terminated,
}

/// Counters reported at shutdown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_delivered: u64,
    pub bytes_written: u64,
    /// Transient SDK failures absorbed by the retry policy.
    pub retries: u64,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} frames, {} bytes, {} retries",
            self.frames_delivered, self.bytes_written, self.retries
        )
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    pub dims: FrameDimensions,
    pub retry: RetryPolicy,
    pub stats_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dims: FrameDimensions::default(),
            retry: RetryPolicy::default(),
            stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }
}

pub struct PipelineController<S: PreviewSource, K: FrameSink> {
    config: PipelineConfig,
    state: PipelineState,
    source: S,
    sink: K,
    decoder: Option<JpegFrameDecoder>,
    rgb: RgbRaster,
    yuyv: YuyvFrame,
    stats: PipelineStats,
    last_stats_log: Instant,
}

impl<S: PreviewSource, K: FrameSink> PipelineController<S, K> {
    /// Build a controller. Both frame buffers are allocated here, once.
    pub fn new(config: PipelineConfig, source: S, sink: K) -> Self {
        Self {
            rgb: RgbRaster::new(config.dims),
            yuyv: YuyvFrame::new(config.dims),
            config,
            state: PipelineState::Uninitialized,
            source,
            sink,
            decoder: None,
            stats: PipelineStats::default(),
            last_stats_log: Instant::now(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Configure the sink, connect the camera and set up the decoder.
    pub fn start(&mut self) -> Result<()> {
        if self.state != PipelineState::Uninitialized {
            return Err(anyhow!("pipeline already started ({:?})", self.state));
        }

        let format = SinkFormat::yuyv(self.config.dims)?;
        self.sink
            .configure(&format)
            .with_context(|| format!("configure sink {}", self.sink.describe()))?;
        self.source
            .connect()
            .with_context(|| format!("connect camera {}", self.source.describe()))?;
        self.decoder = Some(JpegFrameDecoder::new(self.config.dims));

        self.state = PipelineState::Ready;
        log::info!(
            "ready: {} -> {} ({})",
            self.source.describe(),
            self.sink.describe(),
            format
        );
        Ok(())
    }

    /// Run until `shutdown` is requested, then release everything.
    ///
    /// A fatal stage error stops the loop immediately; resources are still released
    /// before the error is returned.
    pub fn run(&mut self, shutdown: &ShutdownFlag) -> Result<PipelineStats> {
        if self.state != PipelineState::Ready {
            return Err(anyhow!("pipeline not ready ({:?})", self.state));
        }
        self.state = PipelineState::Running;
        self.last_stats_log = Instant::now();

        let mut outcome = Ok(());
        while !shutdown.is_requested() {
            if let Err(err) = self.step(shutdown) {
                outcome = Err(err);
                break;
            }
            self.maybe_log_stats();
        }

        self.state = PipelineState::Draining;
        let released = self.release();
        self.state = PipelineState::Terminated;

        match (outcome, released) {
            (Err(err), released) => {
                if let Err(release_err) = released {
                    log::warn!("release after failure: {:#}", release_err);
                }
                Err(err)
            }
            (Ok(()), Err(release_err)) => Err(release_err),
            (Ok(()), Ok(())) => {
                log::info!("finished: {}", self.stats);
                Ok(self.stats)
            }
        }
    }

    /// One capture -> decode -> convert -> write iteration.
    pub fn step(&mut self, shutdown: &ShutdownFlag) -> Result<()> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| anyhow!("decoder not initialised; call start() first"))?;

        let captured =
            capture_with_retry(&mut self.source, &self.config.retry).context("capture preview")?;
        self.stats.retries += u64::from(captured.retries);
        decoder
            .decode(captured.frame, &mut self.rgb)
            .context("decode preview")?;
        convert(&self.rgb, &mut self.yuyv).context("convert frame")?;

        match self.sink.write_frame(self.yuyv.as_bytes()) {
            Ok(written) => {
                self.stats.frames_delivered += 1;
                self.stats.bytes_written += written as u64;
                log::trace!("frame #{} delivered", self.stats.frames_delivered);
                Ok(())
            }
            Err(err) if err.is::<SinkClosed>() => {
                log::info!("{}; draining", err);
                shutdown.request();
                Ok(())
            }
            Err(err) => Err(err.context("deliver frame")),
        }
    }

    fn maybe_log_stats(&mut self) {
        if self.last_stats_log.elapsed() >= self.config.stats_interval {
            log::debug!("pipeline: {}", self.stats);
            self.last_stats_log = Instant::now();
        }
    }

    /// Decoder, then sink, then camera. Each is released once; the first error wins.
    fn release(&mut self) -> Result<()> {
        if let Some(decoder) = self.decoder.take() {
            log::debug!("decoder released after {} frames", decoder.frames_decoded());
        }
        let sink = self
            .sink
            .close()
            .with_context(|| format!("close sink {}", self.sink.describe()));
        let source = self
            .source
            .close()
            .with_context(|| format!("close camera {}", self.source.describe()));
        sink.and(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::OutputSink;
    use crate::source::{CameraConfig, CameraSource};

    fn small_config() -> Result<PipelineConfig> {
        Ok(PipelineConfig {
            dims: FrameDimensions::new(16, 8)?,
            retry: RetryPolicy::fail_fast(),
            stats_interval: Duration::ZERO,
        })
    }

    fn stub_pipeline() -> Result<PipelineController<CameraSource, OutputSink>> {
        let config = small_config()?;
        let source = CameraSource::new(CameraConfig {
            uri: "stub://unit".to_string(),
            dims: config.dims,
        })?;
        Ok(PipelineController::new(config, source, OutputSink::open("stub://unit")?))
    }

    #[test]
    fn start_moves_to_ready() -> Result<()> {
        let mut pipeline = stub_pipeline()?;
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);
        pipeline.start()?;
        assert_eq!(pipeline.state(), PipelineState::Ready);
        assert!(pipeline.start().is_err());
        Ok(())
    }

    #[test]
    fn run_requires_start() -> Result<()> {
        let mut pipeline = stub_pipeline()?;
        assert!(pipeline.run(&ShutdownFlag::new()).is_err());
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);
        Ok(())
    }

    #[test]
    fn steps_deliver_whole_frames() -> Result<()> {
        let mut pipeline = stub_pipeline()?;
        pipeline.start()?;
        let shutdown = ShutdownFlag::new();
        for _ in 0..3 {
            pipeline.step(&shutdown)?;
        }
        assert_eq!(pipeline.stats().frames_delivered, 3);
        assert_eq!(pipeline.stats().bytes_written, 3 * 16 * 8 * 2);
        Ok(())
    }

    #[test]
    fn pre_requested_shutdown_terminates_without_frames() -> Result<()> {
        let mut pipeline = stub_pipeline()?;
        pipeline.start()?;
        let shutdown = ShutdownFlag::new();
        shutdown.request();
        let stats = pipeline.run(&shutdown)?;
        assert_eq!(stats, PipelineStats::default());
        assert_eq!(pipeline.state(), PipelineState::Terminated);
        assert!(pipeline.run(&shutdown).is_err());
        Ok(())
    }
}
