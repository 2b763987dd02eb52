//! Uniform scaling.
//!
//! Enlarging uses bilinear interpolation around `(x / factor, y / factor)`
//! with coordinates clamped to the source edge. Shrinking averages the
//! source footprint of every output pixel, weighting partially covered
//! source pixels by their coverage.

use super::for_each_row;
use crate::decode::DEFAULT_MAX_DIMENSION;
use crate::error::{Error, Result};
use crate::image::Image;

/// Source pixels contributing to one output coordinate, with weights that
/// sum to 1.
type Taps = Vec<(usize, f32)>;

/// Scale `image` by `factor`.
///
/// The output is `floor(dimension * factor)` pixels along each axis, but at
/// least 1 for a non-empty source. The result always carries alpha; a
/// source without alpha yields opaque pixels.
///
/// # Errors
///
/// [`Error::InvalidScaleFactor`] unless `factor` is finite and positive,
/// [`Error::ImageTooLarge`] if the output would exceed the dimension limit.
///
/// # Example
///
/// ```rust
/// use rasterkit::raster::{fill, scale};
/// use rasterkit::Image;
///
/// # fn main() -> rasterkit::Result<()> {
/// let mut img = Image::new(4, 2)?;
/// fill(&mut img, [10, 20, 30, 255]);
/// let half = scale(&img, 0.5)?;
/// assert_eq!(half.dimensions(), (2, 1));
/// assert_eq!(half.pixel(1, 0), Some([10, 20, 30, 255]));
/// # Ok(())
/// # }
/// ```
pub fn scale(image: &Image, factor: f64) -> Result<Image> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err(Error::InvalidScaleFactor(factor));
    }
    let (src_w, src_h) = image.dimensions();
    let dst_w = scaled_len(src_w, factor);
    let dst_h = scaled_len(src_h, factor);
    if dst_w > u64::from(DEFAULT_MAX_DIMENSION) || dst_h > u64::from(DEFAULT_MAX_DIMENSION) {
        return Err(Error::ImageTooLarge {
            width: dst_w.min(u64::from(u32::MAX)) as u32,
            height: dst_h.min(u64::from(u32::MAX)) as u32,
            max: DEFAULT_MAX_DIMENSION,
        });
    }
    let (dst_w, dst_h) = (dst_w as u32, dst_h as u32);
    let opaque = !image.has_alpha();

    let mut out = if factor == 1.0 {
        Image::from_rgba(src_w, src_h, image.pixels().to_vec())?
    } else {
        let xs = axis_taps(src_w as usize, dst_w as usize, factor);
        let ys = axis_taps(src_h as usize, dst_h as usize, factor);
        let mut out = Image::new(dst_w, dst_h)?;
        let stride = out.stride();
        for_each_row(out.pixels_mut(), stride, |y, row| {
            resample_row(image, &xs, &ys[y], row);
        });
        out
    };

    if opaque {
        for px in out.pixels_mut().chunks_exact_mut(4) {
            px[3] = 255;
        }
    }
    out.set_has_alpha(true);
    out.set_opacity_threshold(image.opacity_threshold());
    tracing::trace!(src_w, src_h, dst_w, dst_h, factor, "scaled image");
    Ok(out)
}

fn scaled_len(len: u32, factor: f64) -> u64 {
    if len == 0 {
        return 0;
    }
    // `as` saturates for huge products.
    ((f64::from(len) * factor).floor() as u64).max(1)
}

fn axis_taps(src_len: usize, dst_len: usize, factor: f64) -> Vec<Taps> {
    (0..dst_len)
        .map(|d| {
            if factor > 1.0 {
                bilinear_taps(src_len, d, factor)
            } else {
                box_taps(src_len, d, factor)
            }
        })
        .collect()
}

fn bilinear_taps(src_len: usize, d: usize, factor: f64) -> Taps {
    let s = d as f64 / factor;
    let last = src_len - 1;
    let i0 = (s.floor() as usize).min(last);
    let i1 = (i0 + 1).min(last);
    let frac = (s - i0 as f64).clamp(0.0, 1.0) as f32;
    vec![(i0, 1.0 - frac), (i1, frac)]
}

fn box_taps(src_len: usize, d: usize, factor: f64) -> Taps {
    let lo = d as f64 / factor;
    let hi = ((d + 1) as f64 / factor).min(src_len as f64);
    let first = (lo.floor() as usize).min(src_len - 1);
    let end = (hi.ceil() as usize).clamp(first + 1, src_len);

    let mut taps: Taps = (first..end)
        .filter_map(|i| {
            let w = hi.min((i + 1) as f64) - lo.max(i as f64);
            (w > 0.0).then_some((i, w as f32))
        })
        .collect();
    let total: f32 = taps.iter().map(|&(_, w)| w).sum();
    if total > 0.0 {
        for tap in &mut taps {
            tap.1 /= total;
        }
    } else {
        taps = vec![(first, 1.0)];
    }
    taps
}

fn resample_row(image: &Image, xs: &[Taps], ys: &Taps, row: &mut [u8]) {
    for (px, x_taps) in row.chunks_exact_mut(4).zip(xs) {
        let mut acc = [0f32; 4];
        for &(sy, wy) in ys {
            let src_row = image.row(sy as u32);
            for &(sx, wx) in x_taps {
                let w = wy * wx;
                let p = &src_row[sx * 4..sx * 4 + 4];
                for c in 0..4 {
                    acc[c] += p[c] as f32 * w;
                }
            }
        }
        for c in 0..4 {
            px[c] = acc[c].round().clamp(0.0, 255.0) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_row(values: &[u8]) -> Image {
        let pixels = values.iter().flat_map(|&v| [v, v, v, 255]).collect();
        Image::from_rgba(values.len() as u32, 1, pixels).unwrap()
    }

    fn reds(img: &Image) -> Vec<u8> {
        img.pixels().chunks(4).map(|p| p[0]).collect()
    }

    #[test]
    fn rejects_bad_factors() {
        let img = gray_row(&[1, 2]);
        for f in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(scale(&img, f), Err(Error::InvalidScaleFactor(_))));
        }
    }

    #[test]
    fn unit_factor_copies_and_forces_alpha() {
        let mut img = Image::from_rgba(2, 1, vec![1, 2, 3, 0, 4, 5, 6, 7]).unwrap();
        img.set_has_alpha(false);
        let out = scale(&img, 1.0).unwrap();
        assert_eq!(out.pixels(), &[1, 2, 3, 255, 4, 5, 6, 255]);
        assert!(out.has_alpha());
    }

    #[test]
    fn bilinear_upscale_clamps_at_edge() {
        let out = scale(&gray_row(&[0, 100]), 2.0).unwrap();
        assert_eq!(out.dimensions(), (4, 2));
        assert_eq!(reds(&out), vec![0, 50, 100, 100, 0, 50, 100, 100]);
    }

    #[test]
    fn single_pixel_upscale_is_flat() {
        let out = scale(&gray_row(&[77]), 3.0).unwrap();
        assert_eq!(out.dimensions(), (3, 3));
        assert!(reds(&out).iter().all(|&v| v == 77));
    }

    #[test]
    fn box_downscale_averages_footprint() {
        let out = scale(&gray_row(&[0, 200, 100, 100]), 0.5).unwrap();
        assert_eq!(out.dimensions(), (2, 1));
        assert_eq!(reds(&out), vec![100, 100]);
    }

    #[test]
    fn box_downscale_weights_partial_coverage() {
        // Factor 3/4: each output pixel covers 4/3 source pixels.
        let out = scale(&gray_row(&[120, 240, 0, 40]), 0.75).unwrap();
        assert_eq!(out.dimensions(), (3, 1));
        assert_eq!(reds(&out), vec![150, 120, 30]);
    }

    #[test]
    fn tiny_factor_keeps_one_pixel() {
        let out = scale(&gray_row(&[10, 20, 30]), 0.01).unwrap();
        assert_eq!(out.dimensions(), (1, 1));
        assert_eq!(reds(&out), vec![20]);
    }

    #[test]
    fn empty_image_stays_empty() {
        let out = scale(&Image::new(0, 0).unwrap(), 2.0).unwrap();
        assert_eq!(out.dimensions(), (0, 0));
    }

    #[test]
    fn oversized_output_is_rejected() {
        let img = gray_row(&[1]);
        assert!(matches!(
            scale(&img, 1e12),
            Err(Error::ImageTooLarge { .. })
        ));
    }
}
