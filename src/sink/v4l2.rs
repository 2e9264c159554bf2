//! v4l2 output sink (v4l2loopback and similar output nodes).
//!
//! Negotiation queries the device capabilities, then sets the fixed output format.
//! Frames are written through a read/write descriptor opened after negotiation; the
//! negotiating handle stays open for the sink's lifetime so the format is held.

use anyhow::{anyhow, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use v4l::format::{Colorspace, FieldOrder};
use v4l::video::Output;
use v4l::FourCC;

use super::{
    check_frame_len, check_renegotiation, FrameSink, SinkClosed, SinkColorspace, SinkFormat,
};

pub struct V4l2Sink {
    path: PathBuf,
    device: Option<v4l::Device>,
    output: Option<File>,
    format: Option<SinkFormat>,
    frames_written: u64,
}

impl V4l2Sink {
    /// Create a handle. Nothing is opened until `configure`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            device: None,
            output: None,
            format: None,
            frames_written: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn label(&self) -> String {
        self.path.display().to_string()
    }
}

fn to_v4l2_format(format: &SinkFormat) -> v4l::Format {
    let mut fmt = v4l::Format::new(format.width, format.height, FourCC::new(&format.fourcc));
    fmt.field_order = FieldOrder::Progressive;
    fmt.colorspace = match format.colorspace {
        SinkColorspace::Jpeg => Colorspace::JPEG,
    };
    fmt.stride = format.bytes_per_line;
    fmt.size = format.size_image;
    fmt
}

impl FrameSink for V4l2Sink {
    fn configure(&mut self, format: &SinkFormat) -> Result<()> {
        let label = self.label();
        if check_renegotiation(self.format.as_ref(), format, &label)? {
            log::debug!("V4l2Sink: {} already configured", label);
            return Ok(());
        }

        let device = v4l::Device::with_path(&self.path)
            .with_context(|| format!("open v4l2 device {}", label))?;
        let caps = device
            .query_caps()
            .with_context(|| format!("query v4l2 capabilities of {}", label))?;
        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_OUTPUT)
        {
            log::warn!(
                "V4l2Sink: {} ({}) does not advertise video output",
                label,
                caps.card
            );
        }

        let requested = to_v4l2_format(format);
        let applied = Output::set_format(&device, &requested)
            .with_context(|| format!("set v4l2 output format on {}", label))?;
        if applied.width != format.width
            || applied.height != format.height
            || applied.fourcc != requested.fourcc
        {
            return Err(anyhow!(
                "{} adjusted the output format to {}x{} {}; requested {}",
                label,
                applied.width,
                applied.height,
                applied.fourcc,
                format
            ));
        }

        let output = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .with_context(|| format!("open {} for writing", label))?;

        self.device = Some(device);
        self.output = Some(output);
        self.format = Some(*format);
        log::info!("V4l2Sink: {} ({}) streaming {}", label, caps.card, format);
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<usize> {
        let label = self.label();
        check_frame_len(self.format.as_ref(), frame, &label)?;
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| anyhow!("{} is closed", label))?;

        if let Err(err) = output.write_all(frame) {
            if err.kind() == ErrorKind::BrokenPipe {
                return Err(SinkClosed { sink: label }.into());
            }
            return Err(anyhow::Error::new(err).context(format!("write frame to {}", label)));
        }

        self.frames_written += 1;
        Ok(frame.len())
    }

    fn close(&mut self) -> Result<()> {
        if self.output.take().is_some() {
            log::info!(
                "V4l2Sink: closing {} (wrote {} frames)",
                self.label(),
                self.frames_written
            );
        }
        self.device = None;
        Ok(())
    }

    fn describe(&self) -> String {
        self.label()
    }
}

impl Drop for V4l2Sink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameDimensions;

    #[test]
    fn v4l2_sink_new_is_unopened() {
        let sink = V4l2Sink::new("/dev/video10");
        assert_eq!(sink.frames_written(), 0);
        assert_eq!(sink.describe(), "/dev/video10");
    }

    #[test]
    fn format_translation_matches_loopback_settings() -> Result<()> {
        let fmt = to_v4l2_format(&SinkFormat::yuyv(FrameDimensions::default())?);
        assert_eq!(fmt.width, 640);
        assert_eq!(fmt.height, 426);
        assert_eq!(fmt.fourcc, FourCC::new(b"YUYV"));
        assert_eq!(fmt.stride, 1280);
        assert_eq!(fmt.size, 545_120);
        assert!(matches!(fmt.field_order, FieldOrder::Progressive));
        assert!(matches!(fmt.colorspace, Colorspace::JPEG));
        Ok(())
    }

    #[test]
    fn write_before_configure_fails() {
        let mut sink = V4l2Sink::new("/dev/video10");
        assert!(sink.write_frame(&[0u8; 4]).is_err());
    }
}
