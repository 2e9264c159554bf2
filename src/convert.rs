//! RGB24 to packed 4:2:2 (YUYV) colour conversion.
//!
//! BT.601-style coefficients applied to channels centred on 128. Luma is computed per
//! pixel, chroma once per horizontal pair as the mean of both pixels' chroma values.

use anyhow::{anyhow, Result};

use crate::frame::{RgbRaster, YuyvFrame, RGB_BYTES_PER_PIXEL, YUYV_BYTES_PER_PIXEL};

/// Convert a decoded raster into the packed output frame.
pub fn convert(rgb: &RgbRaster, yuyv: &mut YuyvFrame) -> Result<()> {
    if rgb.dims() != yuyv.dims() {
        return Err(anyhow!(
            "raster {} and output frame {} differ in size",
            rgb.dims(),
            yuyv.dims()
        ));
    }
    let dims = rgb.dims();
    rgb_to_yuyv(rgb.as_bytes(), yuyv.as_bytes_mut(), dims.width, dims.height)
}

/// Convert `width * height` RGB24 pixels in `rgb` into YUYV in `yuyv`.
///
/// Reads exactly `width * height * 3` bytes and writes exactly `width * height * 2`.
pub fn rgb_to_yuyv(rgb: &[u8], yuyv: &mut [u8], width: u32, height: u32) -> Result<()> {
    if width % 2 != 0 {
        return Err(anyhow!("YUYV conversion requires an even width (got {})", width));
    }
    let pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("YUYV frame dimensions overflow"))?;
    let rgb_len = pixels
        .checked_mul(RGB_BYTES_PER_PIXEL)
        .ok_or_else(|| anyhow!("RGB frame length overflows"))?;
    let yuyv_len = pixels
        .checked_mul(YUYV_BYTES_PER_PIXEL)
        .ok_or_else(|| anyhow!("YUYV frame length overflows"))?;
    if rgb.len() != rgb_len {
        return Err(anyhow!(
            "RGB frame length mismatch: expected {}, got {}",
            rgb_len,
            rgb.len()
        ));
    }
    if yuyv.len() != yuyv_len {
        return Err(anyhow!(
            "YUYV frame length mismatch: expected {}, got {}",
            yuyv_len,
            yuyv.len()
        ));
    }

    for (pair, out) in rgb.chunks_exact(6).zip(yuyv.chunks_exact_mut(4)) {
        out.copy_from_slice(&pack_pair(
            [pair[0], pair[1], pair[2]],
            [pair[3], pair[4], pair[5]],
        ));
    }
    Ok(())
}

/// Pack two horizontally adjacent RGB pixels into `[Y0, U, Y1, V]`.
pub fn pack_pair(left: [u8; 3], right: [u8; 3]) -> [u8; 4] {
    let u = (chroma_u(left) + chroma_u(right)) / 2.0;
    let v = (chroma_v(left) + chroma_v(right)) / 2.0;
    [clip(luma(left)), clip(u), clip(luma(right)), clip(v)]
}

fn centred(px: [u8; 3]) -> (f64, f64, f64) {
    (
        f64::from(px[0]) - 128.0,
        f64::from(px[1]) - 128.0,
        f64::from(px[2]) - 128.0,
    )
}

fn luma(px: [u8; 3]) -> f64 {
    let (r, g, b) = centred(px);
    0.299 * r + 0.587 * g + 0.114 * b + 128.0
}

fn chroma_u(px: [u8; 3]) -> f64 {
    let (r, g, b) = centred(px);
    -0.147 * r - 0.289 * g + 0.436 * b + 128.0
}

fn chroma_v(px: [u8; 3]) -> f64 {
    let (r, g, b) = centred(px);
    0.615 * r - 0.515 * g - 0.100 * b + 128.0
}

/// Clip into the byte range, truncating toward zero inside it.
fn clip(value: f64) -> u8 {
    if value > 255.0 {
        255
    } else if value < 0.0 {
        0
    } else {
        value as u8
    }
}
