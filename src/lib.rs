//! DSLR webcam bridge
//!
//! Turns a tethered camera's live-preview stream into a virtual webcam. Every iteration
//! fetches one compressed preview, decodes it to RGB, repacks it as YUYV 4:2:2 and writes
//! it to a video output device that other applications open as a camera.
//!
//! # Pipeline
//!
//! 1. **Capture**: `source` yields a borrowed JPEG preview; busy cameras are retried.
//! 2. **Decode**: `decode` fills a pre-allocated RGB raster of fixed geometry.
//! 3. **Convert**: `convert` packs pixel pairs as Y0 U Y1 V with full-range BT.601 maths.
//! 4. **Deliver**: `sink` writes exactly one frame per iteration.
//!
//! `pipeline` owns the stages and buffers and drains cleanly when `shutdown` is requested.
//!
//! # Module Structure
//!
//! - `frame`: geometry and frame buffers (CompressedFrame, RgbRaster, YuyvFrame)
//! - `source`: camera preview sources and SDK status classification
//! - `sink`: video output sinks (v4l2, stdout, files)
//! - `config`: layered settings for the `dslr_webcam` binary

pub mod config;
pub mod convert;
pub mod decode;
pub mod frame;
pub mod pipeline;
pub mod shutdown;
pub mod sink;
pub mod source;

pub use config::BridgeConfig;
pub use convert::{convert, rgb_to_yuyv};
pub use decode::JpegFrameDecoder;
pub use frame::{
    CompressedFrame, FrameDimensions, RgbRaster, YuyvFrame, DEFAULT_FRAME_HEIGHT,
    DEFAULT_FRAME_WIDTH,
};
pub use pipeline::{PipelineConfig, PipelineController, PipelineState, PipelineStats};
pub use shutdown::{install_signal_handlers, ShutdownFlag};
pub use sink::{FrameSink, OutputSink, SinkClosed, SinkFormat};
pub use source::{
    capture_with_retry, CameraConfig, CameraSource, PreviewSource, RetryPolicy, SdkError,
    SdkStatus,
};
