//! The canonical RGBA image every decoder produces and every compositing
//! operation consumes.

use std::io;

use crate::error::{buffer_len, try_zeroed, Error, Result};
use crate::raster::{clip, RotationMap};

/// Alpha cutoff used when an image is displayed with a binary mask.
pub const DEFAULT_OPACITY_THRESHOLD: u8 = 128;

/// Owned RGBA8 pixel buffer plus its display metadata.
///
/// `pixels().len()` is always `width * height * 4`, in R, G, B, A order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    has_alpha: bool,
    opacity_threshold: u8,
}

impl Image {
    /// A transparent black image. Zero-sized images are allowed.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let pixels = try_zeroed(buffer_len(width, height, 4)?)?;
        Ok(Self {
            width,
            height,
            pixels,
            has_alpha: true,
            opacity_threshold: DEFAULT_OPACITY_THRESHOLD,
        })
    }

    /// Wrap an existing RGBA buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDataLength`] if `pixels` is not exactly
    /// `width * height * 4` bytes.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = buffer_len(width, height, 4)?;
        if pixels.len() != expected {
            return Err(Error::InvalidDataLength {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
            has_alpha: true,
            opacity_threshold: DEFAULT_OPACITY_THRESHOLD,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Bytes per row.
    #[inline]
    pub fn stride(&self) -> usize {
        self.width as usize * 4
    }

    /// One row of RGBA bytes.
    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.stride();
        &self.pixels[y as usize * stride..(y as usize + 1) * stride]
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height)
            .then(|| (y as usize * self.width as usize + x as usize) * 4)
    }

    /// The pixel at `(x, y)`, or `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let i = self.index(x, y)?;
        let p = &self.pixels[i..i + 4];
        Some([p[0], p[1], p[2], p[3]])
    }

    /// Overwrite one pixel. Coordinates outside the image are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if let Some(i) = self.index(x, y) {
            self.pixels[i..i + 4].copy_from_slice(&rgba);
        }
    }

    /// Whether alpha should be honored when compositing or displaying.
    #[inline]
    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    pub fn set_has_alpha(&mut self, has_alpha: bool) {
        self.has_alpha = has_alpha;
    }

    /// Alpha value at or above which a pixel counts as opaque in mask mode.
    #[inline]
    pub fn opacity_threshold(&self) -> u8 {
        self.opacity_threshold
    }

    pub fn set_opacity_threshold(&mut self, threshold: u8) {
        self.opacity_threshold = threshold;
    }

    /// Copy metadata (alpha flag and threshold) from another image.
    pub(crate) fn with_metadata_of(mut self, other: &Image) -> Self {
        self.has_alpha = other.has_alpha;
        self.opacity_threshold = other.opacity_threshold;
        self
    }

    /// Write the RGBA values of a region as text, one row per line.
    ///
    /// The region is clamped to the image; an empty intersection writes
    /// nothing.
    pub fn write_region<W: io::Write>(
        &self,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        out: &mut W,
    ) -> io::Result<()> {
        let Some(rect) = clip(x, y, width, height, self.width, self.height) else {
            return Ok(());
        };
        for row in rect.y..rect.y + rect.height {
            let mut first = true;
            for col in rect.x..rect.x + rect.width {
                let i = (row as usize * self.width as usize + col as usize) * 4;
                let p = &self.pixels[i..i + 4];
                if !first {
                    write!(out, " ")?;
                }
                first = false;
                write!(out, "{:02x}{:02x}{:02x}{:02x}", p[0], p[1], p[2], p[3])?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Where the source point `(x, y)` lands in the output of
    /// [`rotate`](crate::raster::rotate) by `degrees`.
    pub fn rotate_point(&self, degrees: f64, x: f64, y: f64) -> (f64, f64) {
        RotationMap::new(self.width, self.height, degrees).forward(x, y)
    }
}
