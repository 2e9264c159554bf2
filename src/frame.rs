//! Frame buffers shared between pipeline stages.
//!
//! - `FrameDimensions`: fixed output geometry, validated once at startup.
//! - `CompressedFrame`: borrowed JPEG bytes, valid until the next capture call.
//! - `RgbRaster`: decoded RGB24 pixels, owned by the pipeline and reused every iteration.
//! - `YuyvFrame`: packed 4:2:2 output, owned by the pipeline and reused every iteration.
//!
//! Rasters are allocated once with their final size. Nothing in the steady-state loop
//! resizes them, so a frame is always written over the previous one in place.

use anyhow::{anyhow, Result};

/// Preview width the camera is pinned to.
pub const DEFAULT_FRAME_WIDTH: u32 = 640;

/// Preview height the camera is pinned to.
pub const DEFAULT_FRAME_HEIGHT: u32 = 426;

pub const RGB_BYTES_PER_PIXEL: usize = 3;
pub const YUYV_BYTES_PER_PIXEL: usize = 2;

// ----------------------------------------------------------------------------
// FrameDimensions
// ----------------------------------------------------------------------------

/// Output geometry. Width is always even so pixels can be consumed in pairs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameDimensions {
    pub width: u32,
    pub height: u32,
}

impl FrameDimensions {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!(
                "frame dimensions must be non-zero (got {}x{})",
                width,
                height
            ));
        }
        if width % 2 != 0 {
            return Err(anyhow!(
                "frame width must be even for 4:2:2 packing (got {})",
                width
            ));
        }
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(RGB_BYTES_PER_PIXEL))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        // Sinks advertise the packed frame size as a u32.
        u64::from(width)
            .checked_mul(u64::from(height))
            .and_then(|v| v.checked_mul(YUYV_BYTES_PER_PIXEL as u64))
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| {
                anyhow!(
                    "frame {}x{} is too large for a YUYV sink (over {} bytes)",
                    width,
                    height,
                    u32::MAX
                )
            })?;
        Ok(Self { width, height })
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Byte length of an RGB24 raster with these dimensions.
    pub fn rgb_len(&self) -> usize {
        self.pixel_count() * RGB_BYTES_PER_PIXEL
    }

    /// Byte length of a packed YUYV frame with these dimensions.
    pub fn yuyv_len(&self) -> usize {
        self.pixel_count() * YUYV_BYTES_PER_PIXEL
    }

    pub fn yuyv_bytes_per_line(&self) -> u32 {
        self.width * YUYV_BYTES_PER_PIXEL as u32
    }
}

impl Default for FrameDimensions {
    fn default() -> Self {
        Self {
            width: DEFAULT_FRAME_WIDTH,
            height: DEFAULT_FRAME_HEIGHT,
        }
    }
}

impl std::fmt::Display for FrameDimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ----------------------------------------------------------------------------
// CompressedFrame: JPEG bytes borrowed from the preview source
// ----------------------------------------------------------------------------

/// One compressed preview image.
///
/// The bytes belong to the preview source. Borrowing them from the source means the
/// borrow checker rejects any attempt to hold a frame across the next capture.
#[derive(Clone, Copy, Debug)]
pub struct CompressedFrame<'a> {
    data: &'a [u8],
}

impl<'a> CompressedFrame<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ----------------------------------------------------------------------------
// RgbRaster
// ----------------------------------------------------------------------------

/// Decoded RGB24 pixels, row-major, `width * height * 3` bytes.
pub struct RgbRaster {
    data: Box<[u8]>,
    dims: FrameDimensions,
}

impl RgbRaster {
    pub fn new(dims: FrameDimensions) -> Self {
        Self {
            data: vec![0u8; dims.rgb_len()].into_boxed_slice(),
            dims,
        }
    }

    /// Wrap existing pixels. The length must match the dimensions exactly.
    pub fn from_pixels(dims: FrameDimensions, pixels: Vec<u8>) -> Result<Self> {
        if pixels.len() != dims.rgb_len() {
            return Err(anyhow!(
                "RGB raster length mismatch: expected {}, got {}",
                dims.rgb_len(),
                pixels.len()
            ));
        }
        Ok(Self {
            data: pixels.into_boxed_slice(),
            dims,
        })
    }

    pub fn dims(&self) -> FrameDimensions {
        self.dims
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Paint every pixel with one colour.
    pub fn fill(&mut self, rgb: [u8; 3]) {
        for px in self.data.chunks_exact_mut(RGB_BYTES_PER_PIXEL) {
            px.copy_from_slice(&rgb);
        }
    }
}

// ----------------------------------------------------------------------------
// YuyvFrame
// ----------------------------------------------------------------------------

/// Packed 4:2:2 pixels, `[Y0 U Y1 V]` per horizontal pair, `width * height * 2` bytes.
pub struct YuyvFrame {
    data: Box<[u8]>,
    dims: FrameDimensions,
}

impl YuyvFrame {
    pub fn new(dims: FrameDimensions) -> Self {
        Self {
            data: vec![0u8; dims.yuyv_len()].into_boxed_slice(),
            dims,
        }
    }

    pub fn dims(&self) -> FrameDimensions {
        self.dims
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
