//! Baseline JPEG decoding into the pipeline's fixed RGB raster.
//!
//! The decoder follows the usual protocol: read the header, check the geometry against
//! the raster, decode every scanline straight into the raster, finish. The geometry check
//! replaces the unchecked precondition a C decoder loop would rely on; a preview whose
//! size differs from the pipeline's is a fatal error, never an out-of-bounds write.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegDecoder;
use image::{ColorType, ImageDecoder};
use std::io::Cursor;

use crate::frame::{CompressedFrame, FrameDimensions, RgbRaster};

/// Decoder context. Constructed once at startup and reused for every frame.
pub struct JpegFrameDecoder {
    dims: FrameDimensions,
    frames_decoded: u64,
    /// Luma plane for grayscale previews.
    gray: Box<[u8]>,
}

impl JpegFrameDecoder {
    pub fn new(dims: FrameDimensions) -> Self {
        Self {
            dims,
            frames_decoded: 0,
            gray: vec![0u8; dims.pixel_count()].into_boxed_slice(),
        }
    }

    pub fn dims(&self) -> FrameDimensions {
        self.dims
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Decode `frame` over the contents of `raster`.
    pub fn decode(&mut self, frame: CompressedFrame<'_>, raster: &mut RgbRaster) -> Result<()> {
        if raster.dims() != self.dims {
            return Err(anyhow!(
                "raster is {}, decoder configured for {}",
                raster.dims(),
                self.dims
            ));
        }
        if frame.is_empty() {
            return Err(anyhow!("preview buffer is empty"));
        }

        let decoder =
            JpegDecoder::new(Cursor::new(frame.as_bytes())).context("read jpeg header")?;
        let (width, height) = decoder.dimensions();
        if width != self.dims.width || height != self.dims.height {
            return Err(anyhow!(
                "preview is {}x{}, pipeline expects {}; pin the camera preview size",
                width,
                height,
                self.dims
            ));
        }

        match decoder.color_type() {
            ColorType::Rgb8 => {
                decoder
                    .read_image(raster.as_bytes_mut())
                    .context("decode jpeg scanlines")?;
            }
            ColorType::L8 => {
                decoder
                    .read_image(&mut self.gray)
                    .context("decode grayscale jpeg scanlines")?;
                for (px, &luma) in raster
                    .as_bytes_mut()
                    .chunks_exact_mut(3)
                    .zip(self.gray.iter())
                {
                    px.fill(luma);
                }
            }
            other => {
                return Err(anyhow!("unsupported jpeg colour type {:?}", other));
            }
        }

        self.frames_decoded += 1;
        log::trace!(
            "decoded preview #{} ({} bytes)",
            self.frames_decoded,
            frame.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::synthetic::encode_jpeg;

    fn solid_jpeg(dims: FrameDimensions, rgb: [u8; 3]) -> Result<Vec<u8>> {
        let mut raster = RgbRaster::new(dims);
        raster.fill(rgb);
        encode_jpeg(&raster, 95)
    }

    #[test]
    fn decodes_gray_preview_exactly() -> Result<()> {
        let dims = FrameDimensions::new(32, 16)?;
        let jpeg = solid_jpeg(dims, [128, 128, 128])?;
        let mut decoder = JpegFrameDecoder::new(dims);
        let mut raster = RgbRaster::new(dims);
        raster.fill([1, 2, 3]);

        decoder.decode(CompressedFrame::new(&jpeg), &mut raster)?;

        assert!(raster.as_bytes().iter().all(|&b| b == 128));
        assert_eq!(decoder.frames_decoded(), 1);
        Ok(())
    }

    #[test]
    fn grayscale_previews_expand_into_preallocated_plane() -> Result<()> {
        use image::codecs::jpeg::JpegEncoder;
        use image::{ExtendedColorType, ImageEncoder};

        let dims = FrameDimensions::new(16, 8)?;
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 95).write_image(
            &vec![100u8; dims.pixel_count()],
            dims.width,
            dims.height,
            ExtendedColorType::L8,
        )?;

        let mut decoder = JpegFrameDecoder::new(dims);
        assert_eq!(decoder.gray.len(), dims.pixel_count());
        let mut raster = RgbRaster::new(dims);
        for _ in 0..2 {
            decoder.decode(CompressedFrame::new(&jpeg), &mut raster)?;
            assert_eq!(decoder.gray.len(), dims.pixel_count());
        }

        for px in raster.as_bytes().chunks_exact(3) {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
            assert!((98..=102).contains(&px[0]), "luma {}", px[0]);
        }
        assert_eq!(decoder.frames_decoded(), 2);
        Ok(())
    }

    #[test]
    fn rejects_preview_with_wrong_geometry() -> Result<()> {
        let jpeg = solid_jpeg(FrameDimensions::new(16, 16)?, [10, 20, 30])?;
        let dims = FrameDimensions::new(32, 16)?;
        let mut decoder = JpegFrameDecoder::new(dims);
        let mut raster = RgbRaster::new(dims);

        let err = decoder
            .decode(CompressedFrame::new(&jpeg), &mut raster)
            .unwrap_err();
        assert!(err.to_string().contains("16x16"));
        assert_eq!(decoder.frames_decoded(), 0);
        Ok(())
    }

    #[test]
    fn rejects_garbage_and_empty_buffers() -> Result<()> {
        let dims = FrameDimensions::new(8, 8)?;
        let mut decoder = JpegFrameDecoder::new(dims);
        let mut raster = RgbRaster::new(dims);
        assert!(decoder
            .decode(CompressedFrame::new(&[]), &mut raster)
            .is_err());
        assert!(decoder
            .decode(CompressedFrame::new(&[0xFF, 0xD8, 0x00, 0x01]), &mut raster)
            .is_err());
        Ok(())
    }

    #[test]
    fn rejects_raster_of_other_size() -> Result<()> {
        let dims = FrameDimensions::new(8, 8)?;
        let jpeg = solid_jpeg(dims, [0, 0, 0])?;
        let mut decoder = JpegFrameDecoder::new(dims);
        let mut raster = RgbRaster::new(FrameDimensions::new(16, 8)?);
        assert!(decoder
            .decode(CompressedFrame::new(&jpeg), &mut raster)
            .is_err());
        Ok(())
    }
}
