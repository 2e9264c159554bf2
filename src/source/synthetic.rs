//! Synthetic preview source for `stub://` URIs.
//!
//! Encodes a short palette of solid-colour JPEG previews at the configured geometry
//! once on connect, then hands them out in rotation. Lets the whole pipeline run
//! without a tethered camera.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

use super::{CameraConfig, PreviewSource};
use crate::frame::{CompressedFrame, RgbRaster};

/// Colours the synthetic camera cycles through.
pub const SYNTHETIC_PALETTE: [[u8; 3]; 4] = [
    [128, 128, 128],
    [200, 60, 30],
    [40, 160, 70],
    [30, 70, 190],
];

const SYNTHETIC_QUALITY: u8 = 90;

/// Encode an RGB raster as a baseline JPEG.
pub fn encode_jpeg(raster: &RgbRaster, quality: u8) -> Result<Vec<u8>> {
    let dims = raster.dims();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .write_image(
            raster.as_bytes(),
            dims.width,
            dims.height,
            ExtendedColorType::Rgb8,
        )
        .context("encode jpeg")?;
    Ok(buf)
}

pub struct SyntheticSource {
    config: CameraConfig,
    frames: Vec<Vec<u8>>,
    current: Option<usize>,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frames: Vec::new(),
            current: None,
            frame_count: 0,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl PreviewSource for SyntheticSource {
    /// Synthetic cameras are always "connected" once the palette is encoded.
    fn connect(&mut self) -> Result<()> {
        if !self.frames.is_empty() {
            return Ok(());
        }
        let mut raster = RgbRaster::new(self.config.dims);
        for colour in SYNTHETIC_PALETTE {
            raster.fill(colour);
            self.frames.push(encode_jpeg(&raster, SYNTHETIC_QUALITY)?);
        }
        log::info!(
            "SyntheticSource: connected to {} ({})",
            self.config.uri,
            self.config.dims
        );
        Ok(())
    }

    fn fetch_preview(&mut self) -> Result<()> {
        if self.frames.is_empty() {
            return Err(anyhow!(
                "synthetic camera {} not connected; call connect() first",
                self.config.uri
            ));
        }
        let next = self.frame_count as usize % self.frames.len();
        self.current = Some(next);
        self.frame_count += 1;
        Ok(())
    }

    fn preview(&self) -> CompressedFrame<'_> {
        match self.current {
            Some(index) => CompressedFrame::new(&self.frames[index]),
            None => CompressedFrame::new(&[]),
        }
    }

    fn close(&mut self) -> Result<()> {
        if !self.frames.is_empty() {
            log::debug!(
                "SyntheticSource: closed {} after {} previews",
                self.config.uri,
                self.frame_count
            );
        }
        self.frames.clear();
        self.current = None;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{} (synthetic)", self.config.uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameDimensions;

    fn small_config() -> Result<CameraConfig> {
        Ok(CameraConfig {
            uri: "stub://test".to_string(),
            dims: FrameDimensions::new(16, 8)?,
        })
    }

    #[test]
    fn cycles_through_palette() -> Result<()> {
        let mut source = SyntheticSource::new(small_config()?);
        source.connect()?;

        let mut seen = Vec::new();
        for _ in 0..SYNTHETIC_PALETTE.len() + 1 {
            source.fetch_preview()?;
            seen.push(source.preview().as_bytes().to_vec());
        }

        assert_ne!(seen[0], seen[1]);
        assert_eq!(seen[0], seen[SYNTHETIC_PALETTE.len()]);
        assert!(seen.iter().all(|jpeg| jpeg.starts_with(&[0xFF, 0xD8])));
        assert_eq!(source.frame_count(), 5);
        Ok(())
    }

    #[test]
    fn fetch_before_connect_fails() -> Result<()> {
        let mut source = SyntheticSource::new(small_config()?);
        assert!(source.fetch_preview().is_err());
        assert!(source.preview().is_empty());
        Ok(())
    }

    #[test]
    fn close_is_idempotent() -> Result<()> {
        let mut source = SyntheticSource::new(small_config()?);
        source.connect()?;
        source.fetch_preview()?;
        source.close()?;
        source.close()?;
        assert!(source.preview().is_empty());
        Ok(())
    }
}
