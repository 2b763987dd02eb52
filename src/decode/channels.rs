//! Channel-count conversion between decoder output and the caller's request.

use crate::color::{luma, ColorType};
use crate::error::{try_zeroed, Error, Result};

/// Convert interleaved pixels from one channel layout to another.
///
/// Gray expands by replication, color collapses to gray via
/// [`luma`](crate::color::luma), dropped alpha is discarded and added alpha
/// is opaque.
pub fn convert_channels(pixels: &[u8], from: ColorType, to: ColorType) -> Result<Vec<u8>> {
    let src_bpp = from.bytes_per_pixel();
    let dst_bpp = to.bytes_per_pixel();
    if pixels.len() % src_bpp != 0 {
        return Err(Error::InvalidDataLength {
            expected: pixels.len() / src_bpp * src_bpp,
            actual: pixels.len(),
        });
    }
    let count = pixels.len() / src_bpp;
    let len = count.checked_mul(dst_bpp).ok_or(Error::OutOfMemory {
        requested: usize::MAX,
    })?;
    let mut out = try_zeroed(len)?;

    let src = pixels.chunks_exact(src_bpp);
    let dst = out.chunks_exact_mut(dst_bpp);

    use ColorType::*;
    match (from, to) {
        (Gray, GrayAlpha) => src.zip(dst).for_each(|(s, d)| {
            d[0] = s[0];
            d[1] = 255;
        }),
        (Gray, Rgb) => src.zip(dst).for_each(|(s, d)| d.fill(s[0])),
        (Gray, Rgba) => src.zip(dst).for_each(|(s, d)| {
            d[..3].fill(s[0]);
            d[3] = 255;
        }),
        (GrayAlpha, Gray) => src.zip(dst).for_each(|(s, d)| d[0] = s[0]),
        (GrayAlpha, Rgb) => src.zip(dst).for_each(|(s, d)| d.fill(s[0])),
        (GrayAlpha, Rgba) => src.zip(dst).for_each(|(s, d)| {
            d[..3].fill(s[0]);
            d[3] = s[1];
        }),
        (Rgb, Gray) => src.zip(dst).for_each(|(s, d)| d[0] = luma(s[0], s[1], s[2])),
        (Rgb, GrayAlpha) => src.zip(dst).for_each(|(s, d)| {
            d[0] = luma(s[0], s[1], s[2]);
            d[1] = 255;
        }),
        (Rgb, Rgba) => src.zip(dst).for_each(|(s, d)| {
            d[..3].copy_from_slice(s);
            d[3] = 255;
        }),
        (Rgba, Gray) => src.zip(dst).for_each(|(s, d)| d[0] = luma(s[0], s[1], s[2])),
        (Rgba, GrayAlpha) => src.zip(dst).for_each(|(s, d)| {
            d[0] = luma(s[0], s[1], s[2]);
            d[1] = s[3];
        }),
        (Rgba, Rgb) => src.zip(dst).for_each(|(s, d)| d.copy_from_slice(&s[..3])),
        (Gray, Gray) | (GrayAlpha, GrayAlpha) | (Rgb, Rgb) | (Rgba, Rgba) => {
            src.zip(dst).for_each(|(s, d)| d.copy_from_slice(s))
        }
    }
    Ok(out)
}
