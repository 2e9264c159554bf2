//! Video sinks for packed YUYV frames.
//!
//! This module provides `OutputSink` for delivering converted frames:
//! - v4l2 output nodes such as v4l2loopback (feature: sink-v4l2)
//! - stdout (`-`) and plain files or FIFOs
//! - Discarding sink for `stub://` devices (testing)
//!
//! A sink negotiates its format once. Re-negotiating the identical format is a no-op;
//! any other format is refused, since resolution and pixel format are fixed for the
//! lifetime of the stream. Each write delivers one whole frame: short writes are
//! continued and a zero-length write is an error.

#[cfg(feature = "sink-v4l2")]
pub mod v4l2;
pub mod writer;

use anyhow::{anyhow, Result};

use crate::frame::{FrameDimensions, YUYV_BYTES_PER_PIXEL};

#[cfg(feature = "sink-v4l2")]
pub use v4l2::V4l2Sink;
pub use writer::WriterSink;

/// Packed 4:2:2, Y0 U Y1 V byte order.
pub const FOURCC_YUYV: [u8; 4] = *b"YUYV";

/// Colour tag a sink advertises for its frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SinkColorspace {
    /// Full-range BT.601, as produced from JPEG sources.
    Jpeg,
}

/// Streaming format negotiated with the output device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkFormat {
    pub width: u32,
    pub height: u32,
    pub fourcc: [u8; 4],
    pub colorspace: SinkColorspace,
    pub bytes_per_line: u32,
    pub size_image: u32,
}

impl SinkFormat {
    /// The fixed YUYV format for frames of `dims`.
    pub fn yuyv(dims: FrameDimensions) -> Result<Self> {
        let bytes_per_line = dims
            .width
            .checked_mul(YUYV_BYTES_PER_PIXEL as u32)
            .ok_or_else(|| anyhow!("{} line length does not fit a sink format", dims))?;
        let size_image = u32::try_from(dims.yuyv_len())
            .map_err(|_| anyhow!("{} frame size does not fit a sink format", dims))?;
        Ok(Self {
            width: dims.width,
            height: dims.height,
            fourcc: FOURCC_YUYV,
            colorspace: SinkColorspace::Jpeg,
            bytes_per_line,
            size_image,
        })
    }

    pub fn frame_len(&self) -> usize {
        self.size_image as usize
    }
}

impl std::fmt::Display for SinkFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{} {} ({} bytes/line, {} bytes/frame)",
            self.width,
            self.height,
            String::from_utf8_lossy(&self.fourcc),
            self.bytes_per_line,
            self.size_image
        )
    }
}

/// The reader on the other end of the sink went away.
///
/// Writes that hit a broken pipe surface as this error so the pipeline can drain
/// instead of treating the condition as fatal.
#[derive(Debug)]
pub struct SinkClosed {
    pub sink: String,
}

impl std::fmt::Display for SinkClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "reader of {} closed the stream", self.sink)
    }
}

impl std::error::Error for SinkClosed {}

/// Destination for converted frames.
pub trait FrameSink {
    /// Negotiate the streaming format. Repeating the same format is a no-op.
    fn configure(&mut self, format: &SinkFormat) -> Result<()>;

    /// Deliver exactly one frame, returning the number of bytes written.
    fn write_frame(&mut self, frame: &[u8]) -> Result<usize>;

    /// Release the device. Calling this more than once is a no-op.
    fn close(&mut self) -> Result<()>;

    fn describe(&self) -> String;
}

/// Check a requested format against the one already negotiated.
///
/// Returns `Ok(true)` when the sink is already configured with `requested`.
pub(crate) fn check_renegotiation(
    current: Option<&SinkFormat>,
    requested: &SinkFormat,
    sink: &str,
) -> Result<bool> {
    match current {
        None => Ok(false),
        Some(current) if current == requested => Ok(true),
        Some(current) => Err(anyhow!(
            "{} already streaming {}; refusing to switch to {}",
            sink,
            current,
            requested
        )),
    }
}

/// Check that `frame` is exactly one frame of the negotiated format.
pub(crate) fn check_frame_len(
    format: Option<&SinkFormat>,
    frame: &[u8],
    sink: &str,
) -> Result<()> {
    let format =
        format.ok_or_else(|| anyhow!("{} not configured; call configure() first", sink))?;
    if frame.len() != format.frame_len() {
        return Err(anyhow!(
            "frame is {} bytes, {} expects {}",
            frame.len(),
            sink,
            format.frame_len()
        ));
    }
    Ok(())
}

/// Output sink selected from a device string.
pub struct OutputSink {
    backend: SinkBackend,
}

enum SinkBackend {
    Discard(WriterSink<std::io::Sink>),
    Stdout(WriterSink<std::io::Stdout>),
    File(WriterSink<std::fs::File>),
    #[cfg(feature = "sink-v4l2")]
    V4l2(V4l2Sink),
}

impl OutputSink {
    /// Open the sink named by `device`.
    ///
    /// `stub://...` discards frames, `-` writes to stdout, `/dev/video*` opens a v4l2
    /// output node and anything else is treated as a file or FIFO path.
    pub fn open(device: &str) -> Result<Self> {
        let backend = if device.starts_with("stub://") {
            SinkBackend::Discard(WriterSink::new(std::io::sink(), device))
        } else if device == "-" {
            SinkBackend::Stdout(WriterSink::new(std::io::stdout(), "stdout"))
        } else if device.starts_with("/dev/video") {
            open_v4l2(device)?
        } else {
            SinkBackend::File(WriterSink::create(device)?)
        };
        Ok(Self { backend })
    }
}

#[cfg(feature = "sink-v4l2")]
fn open_v4l2(device: &str) -> Result<SinkBackend> {
    Ok(SinkBackend::V4l2(V4l2Sink::new(device)))
}

#[cfg(not(feature = "sink-v4l2"))]
fn open_v4l2(_device: &str) -> Result<SinkBackend> {
    Err(anyhow!("v4l2 output devices require the sink-v4l2 feature"))
}

impl FrameSink for OutputSink {
    fn configure(&mut self, format: &SinkFormat) -> Result<()> {
        match &mut self.backend {
            SinkBackend::Discard(sink) => sink.configure(format),
            SinkBackend::Stdout(sink) => sink.configure(format),
            SinkBackend::File(sink) => sink.configure(format),
            #[cfg(feature = "sink-v4l2")]
            SinkBackend::V4l2(sink) => sink.configure(format),
        }
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<usize> {
        match &mut self.backend {
            SinkBackend::Discard(sink) => sink.write_frame(frame),
            SinkBackend::Stdout(sink) => sink.write_frame(frame),
            SinkBackend::File(sink) => sink.write_frame(frame),
            #[cfg(feature = "sink-v4l2")]
            SinkBackend::V4l2(sink) => sink.write_frame(frame),
        }
    }

    fn close(&mut self) -> Result<()> {
        match &mut self.backend {
            SinkBackend::Discard(sink) => sink.close(),
            SinkBackend::Stdout(sink) => sink.close(),
            SinkBackend::File(sink) => sink.close(),
            #[cfg(feature = "sink-v4l2")]
            SinkBackend::V4l2(sink) => sink.close(),
        }
    }

    fn describe(&self) -> String {
        match &self.backend {
            SinkBackend::Discard(sink) => sink.describe(),
            SinkBackend::Stdout(sink) => sink.describe(),
            SinkBackend::File(sink) => sink.describe(),
            #[cfg(feature = "sink-v4l2")]
            SinkBackend::V4l2(sink) => sink.describe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_format_matches_loopback_geometry() -> Result<()> {
        let format = SinkFormat::yuyv(FrameDimensions::default())?;
        assert_eq!(format.width, 640);
        assert_eq!(format.height, 426);
        assert_eq!(&format.fourcc, b"YUYV");
        assert_eq!(format.colorspace, SinkColorspace::Jpeg);
        assert_eq!(format.bytes_per_line, 1280);
        assert_eq!(format.size_image, 545_120);
        assert_eq!(format.frame_len(), 545_120);
        Ok(())
    }

    #[test]
    fn frame_len_matches_geometry_at_the_u32_limit() -> Result<()> {
        let dims = FrameDimensions::new(65534, 32768)?;
        let format = SinkFormat::yuyv(dims)?;
        assert_eq!(format.frame_len(), dims.yuyv_len());
        assert_eq!(format.bytes_per_line, 131_068);
        Ok(())
    }

    #[test]
    fn oversized_geometry_never_yields_a_truncated_format() {
        let dims = FrameDimensions {
            width: 65536,
            height: 32768,
        };
        assert!(SinkFormat::yuyv(dims).is_err());
    }

    #[test]
    fn renegotiation_rules() -> Result<()> {
        let format = SinkFormat::yuyv(FrameDimensions::default())?;
        let other = SinkFormat::yuyv(FrameDimensions::new(320, 240)?)?;
        assert!(!check_renegotiation(None, &format, "test")?);
        assert!(check_renegotiation(Some(&format), &format, "test")?);
        assert!(check_renegotiation(Some(&format), &other, "test").is_err());
        Ok(())
    }

    #[test]
    fn stub_device_opens_discarding_sink() -> Result<()> {
        let mut sink = OutputSink::open("stub://sink")?;
        let format = SinkFormat::yuyv(FrameDimensions::new(4, 2)?)?;
        sink.configure(&format)?;
        assert_eq!(sink.write_frame(&[0u8; 16])?, 16);
        sink.close()?;
        Ok(())
    }

    #[cfg(not(feature = "sink-v4l2"))]
    #[test]
    fn v4l2_device_requires_feature() {
        assert!(OutputSink::open("/dev/video0").is_err());
    }
}
