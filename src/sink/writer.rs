//! Frame sink over any `std::io::Write`.
//!
//! Backs stdout, file/FIFO and discard sinks. There is no device to negotiate with, so
//! `configure` only records the format and enforces the one-format rule.

use anyhow::{anyhow, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};

use super::{check_frame_len, check_renegotiation, FrameSink, SinkClosed, SinkFormat};

pub struct WriterSink<W: Write> {
    writer: Option<W>,
    label: String,
    format: Option<SinkFormat>,
    frames_written: u64,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W, label: impl Into<String>) -> Self {
        Self {
            writer: Some(writer),
            label: label.into(),
            format: None,
            frames_written: 0,
        }
    }

    pub fn format(&self) -> Option<&SinkFormat> {
        self.format.as_ref()
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// The underlying writer, unless the sink has been closed.
    pub fn get_ref(&self) -> Option<&W> {
        self.writer.as_ref()
    }
}

impl WriterSink<File> {
    /// Open a file or FIFO for writing, creating regular files as needed.
    pub fn create(path: &str) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("open output {}", path))?;
        Ok(Self::new(file, path))
    }
}

impl<W: Write> FrameSink for WriterSink<W> {
    fn configure(&mut self, format: &SinkFormat) -> Result<()> {
        if check_renegotiation(self.format.as_ref(), format, &self.label)? {
            log::debug!("{}: format already negotiated", self.label);
            return Ok(());
        }
        self.format = Some(*format);
        log::info!("{}: streaming {}", self.label, format);
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<usize> {
        check_frame_len(self.format.as_ref(), frame, &self.label)?;
        let label = &self.label;
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("{} is closed", label))?;

        // write_all continues short writes and fails with WriteZero on a zero-length one.
        if let Err(err) = writer.write_all(frame).and_then(|()| writer.flush()) {
            if err.kind() == ErrorKind::BrokenPipe {
                return Err(SinkClosed {
                    sink: label.clone(),
                }
                .into());
            }
            return Err(anyhow::Error::new(err).context(format!("write frame to {}", label)));
        }

        self.frames_written += 1;
        Ok(frame.len())
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        log::debug!(
            "{}: closing after {} frames",
            self.label,
            self.frames_written
        );
        match writer.flush() {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
            Err(err) => Err(anyhow::Error::new(err).context(format!("flush {}", self.label))),
        }
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
