//! Compositing operations on canonical RGBA images.
//!
//! Region arguments are clamped to the buffers involved. A negative origin
//! shrinks the extent by the same amount, an extent past the far edge is
//! truncated, and an empty intersection makes the operation a no-op.
//!
//! # Example
//!
//! ```rust
//! use rasterkit::raster::{blend, extract, fill};
//! use rasterkit::Image;
//!
//! # fn main() -> rasterkit::Result<()> {
//! let mut dst = Image::new(4, 4)?;
//! fill(&mut dst, [0, 0, 255, 255]);
//!
//! let mut src = Image::new(2, 2)?;
//! fill(&mut src, [255, 0, 0, 255]);
//! blend(&mut dst, &src, 3, 3);
//!
//! assert_eq!(dst.pixel(3, 3), Some([255, 0, 0, 255]));
//! assert_eq!(dst.pixel(2, 2), Some([0, 0, 255, 255]));
//!
//! let corner = extract(&dst, 2, 2, 10, 10)?;
//! assert_eq!(corner.dimensions(), (2, 2));
//! # Ok(())
//! # }
//! ```

mod rotate;
mod scale;

pub use rotate::{rotate, RotationMap, Sampling};
pub use scale::scale;

use crate::error::Result;
use crate::image::Image;

/// A clamped, non-empty rectangle inside some buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// The whole of a `width` x `height` buffer.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

/// Clamp the rectangle `(x, y, width, height)` to a `bound_w` x `bound_h`
/// buffer. Returns `None` for an empty intersection.
pub fn clip(x: i32, y: i32, width: u32, height: u32, bound_w: u32, bound_h: u32) -> Option<Rect> {
    let (x, w) = clip_span(i64::from(x), i64::from(width), i64::from(bound_w))?;
    let (y, h) = clip_span(i64::from(y), i64::from(height), i64::from(bound_h))?;
    Some(Rect {
        x,
        y,
        width: w,
        height: h,
    })
}

fn clip_span(mut start: i64, mut len: i64, bound: i64) -> Option<(u32, u32)> {
    if start < 0 {
        len += start;
        start = 0;
    }
    len = len.min(bound - start);
    (len > 0).then_some((start as u32, len as u32))
}

/// Overwrite every pixel with `rgba`.
pub fn fill(image: &mut Image, rgba: [u8; 4]) {
    for px in image.pixels_mut().chunks_exact_mut(4) {
        px.copy_from_slice(&rgba);
    }
}

/// Copy a clamped sub-rectangle into a new image. An empty intersection
/// yields a 0x0 image.
pub fn extract(image: &Image, x: i32, y: i32, width: u32, height: u32) -> Result<Image> {
    let Some(rect) = clip(x, y, width, height, image.width(), image.height()) else {
        return Ok(Image::new(0, 0)?.with_metadata_of(image));
    };
    let mut out = Image::new(rect.width, rect.height)?.with_metadata_of(image);
    let len = rect.width as usize * 4;
    let src_x = rect.x as usize * 4;
    let out_stride = out.stride();
    for (row, dst) in out.pixels_mut().chunks_exact_mut(out_stride).enumerate() {
        let src = image.row(rect.y + row as u32);
        dst.copy_from_slice(&src[src_x..src_x + len]);
    }
    Ok(out)
}

/// Reverse the column order of every row (left-right mirror).
pub fn mirror_vertical(image: &Image) -> Result<Image> {
    let mut out = Image::new(image.width(), image.height())?.with_metadata_of(image);
    let stride = image.stride();
    if stride == 0 {
        return Ok(out);
    }
    for (y, dst) in out.pixels_mut().chunks_exact_mut(stride).enumerate() {
        let src = image.row(y as u32);
        for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4).rev()) {
            d.copy_from_slice(s);
        }
    }
    Ok(out)
}

/// Reverse the row order (top-bottom mirror).
pub fn mirror_horizontal(image: &Image) -> Result<Image> {
    let mut out = Image::new(image.width(), image.height())?.with_metadata_of(image);
    let stride = image.stride();
    if stride == 0 {
        return Ok(out);
    }
    for (dst, src) in out
        .pixels_mut()
        .chunks_exact_mut(stride)
        .zip(image.pixels().chunks_exact(stride).rev())
    {
        dst.copy_from_slice(src);
    }
    Ok(out)
}

/// Copy `src` onto `dst` at `(x, y)`, replacing the overlap outright.
pub fn over(dst: &mut Image, src: &Image, x: i32, y: i32) {
    if let Some(overlap) = Overlap::new(dst, src, x, y, 0, 0, src.width(), src.height()) {
        overlap.for_each_row(dst, src, |d, s| d.copy_from_slice(s));
    }
}

/// Composite all of `src` onto `dst` at `(x, y)`. See [`blend_region`].
pub fn blend(dst: &mut Image, src: &Image, x: i32, y: i32) {
    blend_region(dst, src, x, y, 0, 0, src.width(), src.height());
}

/// Composite the `width` x `height` region of `src` at `(src_x, src_y)`
/// onto `dst` at `(dst_x, dst_y)`.
///
/// When `src` carries alpha the Porter-Duff "over" operator is applied per
/// pixel; otherwise the overlap is replaced as in [`over`].
#[allow(clippy::too_many_arguments)]
pub fn blend_region(
    dst: &mut Image,
    src: &Image,
    dst_x: i32,
    dst_y: i32,
    src_x: i32,
    src_y: i32,
    width: u32,
    height: u32,
) {
    let Some(overlap) = Overlap::new(dst, src, dst_x, dst_y, src_x, src_y, width, height) else {
        return;
    };
    if !src.has_alpha() {
        overlap.for_each_row(dst, src, |d, s| d.copy_from_slice(s));
        return;
    }
    overlap.for_each_row(dst, src, |d, s| {
        for (dp, sp) in d.chunks_exact_mut(4).zip(s.chunks_exact(4)) {
            blend_pixel(dp, sp);
        }
    });
}

/// Porter-Duff "over" on straight-alpha RGBA8.
#[inline]
fn blend_pixel(dst: &mut [u8], src: &[u8]) {
    let sa = src[3] as u32;
    match sa {
        0 => {}
        255 => dst.copy_from_slice(src),
        _ => {
            let da = dst[3] as u32 * (255 - sa) / 255;
            let ra = sa + da;
            if ra == 0 {
                dst.fill(0);
                return;
            }
            for c in 0..3 {
                dst[c] = ((src[c] as u32 * sa + dst[c] as u32 * da) / ra) as u8;
            }
            dst[3] = ra as u8;
        }
    }
}

/// The matching rectangles of a source/destination pair after clamping
/// against both.
#[derive(Debug, Clone, Copy)]
struct Overlap {
    dst_x: usize,
    dst_y: usize,
    src_x: usize,
    src_y: usize,
    width: usize,
    height: usize,
}

impl Overlap {
    #[allow(clippy::too_many_arguments)]
    fn new(
        dst: &Image,
        src: &Image,
        dst_x: i32,
        dst_y: i32,
        src_x: i32,
        src_y: i32,
        width: u32,
        height: u32,
    ) -> Option<Self> {
        let (dx, sx, w) = overlap_span(dst_x, src_x, width, dst.width(), src.width())?;
        let (dy, sy, h) = overlap_span(dst_y, src_y, height, dst.height(), src.height())?;
        Some(Self {
            dst_x: dx,
            dst_y: dy,
            src_x: sx,
            src_y: sy,
            width: w,
            height: h,
        })
    }

    fn for_each_row(&self, dst: &mut Image, src: &Image, mut f: impl FnMut(&mut [u8], &[u8])) {
        let (ds, ss) = (dst.stride(), src.stride());
        let len = self.width * 4;
        for row in 0..self.height {
            let d = (self.dst_y + row) * ds + self.dst_x * 4;
            let s = (self.src_y + row) * ss + self.src_x * 4;
            f(&mut dst.pixels_mut()[d..d + len], &src.pixels()[s..s + len]);
        }
    }
}

fn overlap_span(dst: i32, src: i32, len: u32, dst_bound: u32, src_bound: u32) -> Option<(usize, usize, usize)> {
    let (mut d, mut s, mut n) = (i64::from(dst), i64::from(src), i64::from(len));
    if s < 0 {
        d -= s;
        n += s;
        s = 0;
    }
    if d < 0 {
        s -= d;
        n += d;
        d = 0;
    }
    n = n.min(i64::from(dst_bound) - d).min(i64::from(src_bound) - s);
    (n > 0).then_some((d as usize, s as usize, n as usize))
}

/// Run `f(y, row)` over every `stride`-byte row of `out`, in parallel when
/// the `parallel` feature is enabled.
pub(crate) fn for_each_row<F>(out: &mut [u8], stride: usize, f: F)
where
    F: Fn(usize, &mut [u8]) + Send + Sync,
{
    if stride == 0 {
        return;
    }

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        out.par_chunks_mut(stride)
            .enumerate()
            .for_each(|(y, row)| f(y, row));
    }

    #[cfg(not(feature = "parallel"))]
    {
        out.chunks_mut(stride)
            .enumerate()
            .for_each(|(y, row)| f(y, row));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> Image {
        let mut img = Image::new(w, h).unwrap();
        fill(&mut img, rgba);
        img
    }

    fn numbered(w: u32, h: u32) -> Image {
        let pixels = (0..w * h).flat_map(|i| [i as u8, 0, 0, 255]).collect();
        Image::from_rgba(w, h, pixels).unwrap()
    }

    #[test]
    fn clip_handles_negative_origin_and_overhang() {
        assert_eq!(
            clip(-2, 1, 5, 10, 4, 4),
            Some(Rect {
                x: 0,
                y: 1,
                width: 3,
                height: 3
            })
        );
        assert_eq!(clip(-5, 0, 5, 1, 4, 4), None);
        assert_eq!(clip(4, 0, 1, 1, 4, 4), None);
        assert_eq!(clip(0, 0, 0, 1, 4, 4), None);
    }

    #[test]
    fn extract_clamps_and_copies_rows() {
        let img = numbered(3, 3);
        let out = extract(&img, 1, -1, 5, 3).unwrap();
        assert_eq!(out.dimensions(), (2, 2));
        assert_eq!(out.pixel(0, 0), Some([1, 0, 0, 255]));
        assert_eq!(out.pixel(1, 1), Some([5, 0, 0, 255]));

        let empty = extract(&img, 10, 10, 2, 2).unwrap();
        assert_eq!(empty.dimensions(), (0, 0));
    }

    #[test]
    fn mirrors_reverse_columns_and_rows() {
        let img = numbered(3, 2);
        let v = mirror_vertical(&img).unwrap();
        assert_eq!(v.pixel(0, 0), Some([2, 0, 0, 255]));
        assert_eq!(v.pixel(2, 1), Some([3, 0, 0, 255]));

        let h = mirror_horizontal(&img).unwrap();
        assert_eq!(h.pixel(0, 0), Some([3, 0, 0, 255]));
        assert_eq!(h.pixel(2, 1), Some([2, 0, 0, 255]));
    }

    #[test]
    fn opaque_red_replaces_blue() {
        let mut dst = solid(1, 1, [0, 0, 255, 255]);
        let src = solid(1, 1, [255, 0, 0, 255]);
        blend(&mut dst, &src, 0, 0);
        assert_eq!(dst.pixel(0, 0), Some([255, 0, 0, 255]));
    }

    #[test]
    fn half_alpha_blend() {
        let mut dst = solid(1, 1, [0, 0, 200, 255]);
        let src = solid(1, 1, [200, 0, 0, 128]);
        blend(&mut dst, &src, 0, 0);
        // da = 255 * 127 / 255 = 127, ra = 255.
        assert_eq!(dst.pixel(0, 0), Some([100, 0, 99, 255]));
    }

    #[test]
    fn blend_onto_transparent_keeps_source_color() {
        let mut dst = Image::new(1, 1).unwrap();
        let src = solid(1, 1, [10, 20, 30, 40]);
        blend(&mut dst, &src, 0, 0);
        assert_eq!(dst.pixel(0, 0), Some([10, 20, 30, 40]));
    }

    #[test]
    fn source_without_alpha_overwrites() {
        let mut dst = solid(2, 1, [1, 1, 1, 255]);
        let mut src = solid(1, 1, [9, 9, 9, 0]);
        src.set_has_alpha(false);
        blend(&mut dst, &src, 1, 0);
        assert_eq!(dst.pixel(0, 0), Some([1, 1, 1, 255]));
        assert_eq!(dst.pixel(1, 0), Some([9, 9, 9, 0]));
    }

    #[test]
    fn blend_region_clamps_both_sides() {
        let mut dst = solid(3, 3, [0, 0, 0, 255]);
        let src = numbered(3, 3);
        // Source origin (-1, 0) shifts the destination by one as well.
        blend_region(&mut dst, &src, 0, 0, -1, 0, 3, 1);
        assert_eq!(dst.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(dst.pixel(1, 0), Some([0, 0, 0, 255]));
        assert_eq!(dst.pixel(2, 0), Some([1, 0, 0, 255]));

        let mut dst = solid(2, 2, [0, 0, 0, 255]);
        over(&mut dst, &src, -2, -2);
        assert_eq!(dst.pixel(0, 0), Some([8, 0, 0, 255]));
        assert_eq!(dst.pixel(1, 1), Some([0, 0, 0, 255]));
    }

    #[test]
    fn disjoint_composite_is_noop() {
        let mut dst = solid(2, 2, [5, 5, 5, 255]);
        let before = dst.clone();
        over(&mut dst, &solid(2, 2, [1, 2, 3, 255]), 2, 0);
        blend(&mut dst, &solid(2, 2, [1, 2, 3, 255]), -2, 0);
        assert_eq!(dst, before);
    }

    #[test]
    fn row_helper_visits_every_row() {
        let mut buf = vec![0u8; 12];
        for_each_row(&mut buf, 4, |y, row| row.fill(y as u8 + 1));
        assert_eq!(buf, [1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3]);
        for_each_row(&mut [], 0, |_, _| unreachable!());
    }
}
