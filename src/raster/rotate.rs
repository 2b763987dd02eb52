//! Rotation by an arbitrary angle.
//!
//! Angles are in degrees; positive values turn clockwise on a y-down raster.
//! The output canvas is the bounding box of the rotated source corners and
//! areas not covered by the source are transparent black.

use super::for_each_row;
use crate::decode::DEFAULT_MAX_DIMENSION;
use crate::error::{Error, Result};
use crate::image::Image;

/// Slack applied before rounding the canvas size outward, so that exact
/// quarter turns do not gain a pixel from `cos(90deg) != 0`.
const SIZE_EPSILON: f64 = 1e-9;

/// Sampling used by [`rotate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sampling {
    /// Nearest source pixel. Fastest.
    Nearest,
    /// Weighted average of the four surrounding source pixels.
    #[default]
    Bilinear,
}

/// Point mapping between a source image and its rotated canvas.
///
/// Both spaces use continuous pixel coordinates with the rotation centered
/// on the middle of each canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationMap {
    cos: f64,
    sin: f64,
    src_center: (f64, f64),
    dst_center: (f64, f64),
    dst_size: (u64, u64),
}

impl RotationMap {
    pub fn new(width: u32, height: u32, degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let (hw, hh) = (f64::from(width) / 2.0, f64::from(height) / 2.0);

        // Half extents of the rotated corner box.
        let ex = (hw * cos).abs() + (hh * sin).abs();
        let ey = (hw * sin).abs() + (hh * cos).abs();
        let out_w = ((2.0 * ex - SIZE_EPSILON).ceil().max(0.0)) as u64;
        let out_h = ((2.0 * ey - SIZE_EPSILON).ceil().max(0.0)) as u64;

        Self {
            cos,
            sin,
            src_center: (hw, hh),
            dst_center: (out_w as f64 / 2.0, out_h as f64 / 2.0),
            dst_size: (out_w, out_h),
        }
    }

    /// Size of the rotated canvas.
    pub fn output_size(&self) -> (u64, u64) {
        self.dst_size
    }

    /// Map a source point into the rotated canvas.
    pub fn forward(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.src_center.0;
        let dy = y - self.src_center.1;
        (
            dx * self.cos - dy * self.sin + self.dst_center.0,
            dx * self.sin + dy * self.cos + self.dst_center.1,
        )
    }

    /// Map a rotated-canvas point back into the source.
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.dst_center.0;
        let dy = y - self.dst_center.1;
        (
            dx * self.cos + dy * self.sin + self.src_center.0,
            -dx * self.sin + dy * self.cos + self.src_center.1,
        )
    }
}

/// Rotate `image` by `degrees`.
///
/// # Errors
///
/// [`Error::ImageTooLarge`] if the rotated canvas exceeds the dimension
/// limit, [`Error::OutOfMemory`] if it cannot be allocated.
///
/// # Example
///
/// ```rust
/// use rasterkit::raster::{fill, rotate, Sampling};
/// use rasterkit::Image;
///
/// # fn main() -> rasterkit::Result<()> {
/// let mut img = Image::new(4, 2)?;
/// fill(&mut img, [0, 255, 0, 255]);
/// let turned = rotate(&img, 90.0, Sampling::Nearest)?;
/// assert_eq!(turned.dimensions(), (2, 4));
/// # Ok(())
/// # }
/// ```
pub fn rotate(image: &Image, degrees: f64, sampling: Sampling) -> Result<Image> {
    let map = RotationMap::new(image.width(), image.height(), degrees);
    let (w, h) = map.output_size();
    let max = u64::from(DEFAULT_MAX_DIMENSION);
    if w > max || h > max {
        return Err(Error::ImageTooLarge {
            width: w.min(u64::from(u32::MAX)) as u32,
            height: h.min(u64::from(u32::MAX)) as u32,
            max: DEFAULT_MAX_DIMENSION,
        });
    }

    let mut out = Image::new(w as u32, h as u32)?;
    out.set_opacity_threshold(image.opacity_threshold());
    let opaque = !image.has_alpha();
    let stride = out.stride();
    tracing::trace!(degrees, ?sampling, w, h, "rotating image");

    for_each_row(out.pixels_mut(), stride, |y, row| {
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let (sx, sy) = map.inverse(x as f64 + 0.5, y as f64 + 0.5);
            let value = match sampling {
                Sampling::Nearest => texel(image, sx.floor(), sy.floor(), opaque),
                Sampling::Bilinear => bilinear(image, sx - 0.5, sy - 0.5, opaque),
            };
            px.copy_from_slice(&value);
        }
    });
    Ok(out)
}

/// Source pixel at integer coordinates, transparent black outside.
#[inline]
fn texel(image: &Image, x: f64, y: f64, opaque: bool) -> [u8; 4] {
    if x < 0.0 || y < 0.0 || x >= f64::from(image.width()) || y >= f64::from(image.height()) {
        return [0; 4];
    }
    let mut p = image.pixel(x as u32, y as u32).unwrap_or([0; 4]);
    if opaque {
        p[3] = 255;
    }
    p
}

fn bilinear(image: &Image, x: f64, y: f64, opaque: bool) -> [u8; 4] {
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let corners = [
        (texel(image, x0, y0, opaque), (1.0 - fx) * (1.0 - fy)),
        (texel(image, x0 + 1.0, y0, opaque), fx * (1.0 - fy)),
        (texel(image, x0, y0 + 1.0, opaque), (1.0 - fx) * fy),
        (texel(image, x0 + 1.0, y0 + 1.0, opaque), fx * fy),
    ];
    let mut out = [0u8; 4];
    for (c, slot) in out.iter_mut().enumerate() {
        let v: f64 = corners.iter().map(|(p, w)| f64::from(p[c]) * w).sum();
        *slot = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}
