//! Display-side helpers: surface pixel formats, the cached surface-native
//! form of an image, and the calls that drive a host [`Surface`].
//!
//! The host owns the surface. This module converts canonical RGBA into the
//! surface's packed layout once, optionally with a one-bit cutting mask,
//! and then asks the surface to copy it.

use crate::color::ChannelMask;
use crate::error::{buffer_len, try_zeroed, Error, Result};
use crate::image::Image;
use crate::raster::{clip, Rect};

/// Byte order of packed pixel words in surface memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

/// Packed pixel layout of a display surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceFormat {
    bits_per_pixel: u8,
    red: ChannelMask,
    green: ChannelMask,
    blue: ChannelMask,
    alpha: ChannelMask,
    byte_order: ByteOrder,
}

impl SurfaceFormat {
    /// Describe a 16, 24 or 32 bits-per-pixel layout. Pass 0 for `alpha`
    /// when the surface has no alpha channel.
    pub fn new(
        bits_per_pixel: u8,
        red: u32,
        green: u32,
        blue: u32,
        alpha: u32,
        byte_order: ByteOrder,
    ) -> Result<Self> {
        if !matches!(bits_per_pixel, 16 | 24 | 32) {
            return Err(Error::unsupported(format!(
                "{bits_per_pixel}-bit surfaces"
            )));
        }
        let limit = if bits_per_pixel == 32 {
            u32::MAX
        } else {
            (1u32 << bits_per_pixel) - 1
        };
        if [red, green, blue, alpha].iter().any(|&m| m & !limit != 0) {
            return Err(Error::unsupported("surface mask wider than the pixel"));
        }
        Ok(Self::from_masks(bits_per_pixel, red, green, blue, alpha, byte_order))
    }

    const fn from_masks(
        bits_per_pixel: u8,
        red: u32,
        green: u32,
        blue: u32,
        alpha: u32,
        byte_order: ByteOrder,
    ) -> Self {
        Self {
            bits_per_pixel,
            red: ChannelMask::new(red),
            green: ChannelMask::new(green),
            blue: ChannelMask::new(blue),
            alpha: ChannelMask::new(alpha),
            byte_order,
        }
    }

    /// 16-bit 5-6-5, little-endian words.
    pub const fn rgb565() -> Self {
        Self::from_masks(16, 0xF800, 0x07E0, 0x001F, 0, ByteOrder::LittleEndian)
    }

    /// Bytes R, G, B.
    pub const fn rgb24() -> Self {
        Self::from_masks(24, 0x0000FF, 0x00FF00, 0xFF0000, 0, ByteOrder::LittleEndian)
    }

    /// Bytes B, G, R.
    pub const fn bgr24() -> Self {
        Self::from_masks(24, 0xFF0000, 0x00FF00, 0x0000FF, 0, ByteOrder::LittleEndian)
    }

    /// Bytes R, G, B, A.
    pub const fn rgba32() -> Self {
        Self::from_masks(
            32,
            0x0000_00FF,
            0x0000_FF00,
            0x00FF_0000,
            0xFF00_0000,
            ByteOrder::LittleEndian,
        )
    }

    /// Bytes B, G, R, A.
    pub const fn bgra32() -> Self {
        Self::from_masks(
            32,
            0x00FF_0000,
            0x0000_FF00,
            0x0000_00FF,
            0xFF00_0000,
            ByteOrder::LittleEndian,
        )
    }

    /// Native `0x00RRGGBB` words, little-endian, unused top byte.
    pub const fn xrgb32() -> Self {
        Self::from_masks(
            32,
            0x00FF_0000,
            0x0000_FF00,
            0x0000_00FF,
            0,
            ByteOrder::LittleEndian,
        )
    }

    pub fn bits_per_pixel(&self) -> u8 {
        self.bits_per_pixel
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.bits_per_pixel as usize / 8
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Pack an RGBA pixel into a surface word.
    #[inline]
    pub fn pack(&self, rgba: [u8; 4]) -> u32 {
        self.red.pack(rgba[0])
            | self.green.pack(rgba[1])
            | self.blue.pack(rgba[2])
            | self.alpha.pack(rgba[3])
    }

    /// Unpack a surface word back to RGBA. Alpha reads as 255 for formats
    /// without an alpha channel.
    #[inline]
    pub fn unpack(&self, word: u32) -> [u8; 4] {
        let alpha = if self.alpha.is_empty() {
            255
        } else {
            self.alpha.extract(word)
        };
        [
            self.red.extract(word),
            self.green.extract(word),
            self.blue.extract(word),
            alpha,
        ]
    }

    /// Write `word` as `bytes_per_pixel` bytes in the surface byte order.
    #[inline]
    pub fn store(&self, word: u32, out: &mut [u8]) {
        let n = self.bytes_per_pixel();
        match self.byte_order {
            ByteOrder::LittleEndian => out[..n].copy_from_slice(&word.to_le_bytes()[..n]),
            ByteOrder::BigEndian => out[..n].copy_from_slice(&word.to_be_bytes()[4 - n..]),
        }
    }

    /// Read a word stored by [`store`](Self::store).
    #[inline]
    pub fn load(&self, bytes: &[u8]) -> u32 {
        let n = self.bytes_per_pixel();
        let mut word = [0u8; 4];
        match self.byte_order {
            ByteOrder::LittleEndian => {
                word[..n].copy_from_slice(&bytes[..n]);
                u32::from_le_bytes(word)
            }
            ByteOrder::BigEndian => {
                word[4 - n..].copy_from_slice(&bytes[..n]);
                u32::from_be_bytes(word)
            }
        }
    }
}

/// One bit per pixel, most significant bit first, rows padded to a byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    stride: usize,
    bits: Vec<u8>,
}

impl Mask {
    fn from_alpha(image: &Image) -> Result<Self> {
        let (width, height) = image.dimensions();
        let stride = (width as usize).div_ceil(8);
        let mut bits = try_zeroed(stride * height as usize)?;
        let threshold = image.opacity_threshold();
        for y in 0..height {
            let row = image.row(y);
            let out = &mut bits[y as usize * stride..(y as usize + 1) * stride];
            for (x, px) in row.chunks_exact(4).enumerate() {
                if px[3] >= threshold {
                    out[x / 8] |= 0x80 >> (x % 8);
                }
            }
        }
        Ok(Self {
            width,
            height,
            stride,
            bits,
        })
    }

    /// Whether the pixel at `(x, y)` is drawn. False outside the mask.
    #[inline]
    pub fn is_set(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        let byte = self.bits[y as usize * self.stride + x as usize / 8];
        byte & (0x80 >> (x % 8)) != 0
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn bits(&self) -> &[u8] {
        &self.bits
    }

    fn count(&self) -> usize {
        (0..self.height)
            .map(|y| (0..self.width).filter(|&x| self.is_set(x, y)).count())
            .sum()
    }
}

/// How a cache covers its rectangle.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Coverage {
    /// Every pixel is drawn.
    Opaque,
    /// Only pixels set in the mask are drawn.
    Masked(Mask),
    /// Nothing is drawn.
    Invisible,
}

/// An image converted once into a surface's native layout.
///
/// The cache owns its data; dropping the source image afterwards does not
/// affect it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayCache {
    width: u32,
    height: u32,
    format: SurfaceFormat,
    stride: usize,
    data: Vec<u8>,
    coverage: Coverage,
}

impl DisplayCache {
    /// Convert `image` to `format`.
    ///
    /// A mask is derived only when the image has alpha, from pixels whose
    /// alpha reaches the image's opacity threshold. A mask that would cover
    /// every pixel is dropped, and an image with no visible pixel builds an
    /// invisible cache with no mask.
    pub fn build(image: &Image, format: SurfaceFormat) -> Result<Self> {
        let (width, height) = image.dimensions();
        let bpp = format.bytes_per_pixel();
        let mut data = try_zeroed(buffer_len(width, height, bpp)?)?;
        let stride = width as usize * bpp;

        if stride > 0 {
            for (y, out) in data.chunks_exact_mut(stride).enumerate() {
                for (px, dst) in image.row(y as u32).chunks_exact(4).zip(out.chunks_exact_mut(bpp)) {
                    format.store(format.pack([px[0], px[1], px[2], px[3]]), dst);
                }
            }
        }

        let coverage = if !image.has_alpha() {
            Coverage::Opaque
        } else {
            let mask = Mask::from_alpha(image)?;
            match mask.count() {
                0 => Coverage::Invisible,
                n if n == width as usize * height as usize => Coverage::Opaque,
                _ => Coverage::Masked(mask),
            }
        };
        tracing::debug!(
            width,
            height,
            bits_per_pixel = format.bits_per_pixel(),
            masked = matches!(coverage, Coverage::Masked(_)),
            visible = !matches!(coverage, Coverage::Invisible),
            "built display cache"
        );

        Ok(Self {
            width,
            height,
            format,
            stride,
            data,
            coverage,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> SurfaceFormat {
        self.format
    }

    /// Bytes per row of [`data`](Self::data).
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Packed pixels in the surface layout.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The cutting mask, if the cache is partially transparent.
    pub fn mask(&self) -> Option<&Mask> {
        match &self.coverage {
            Coverage::Masked(mask) => Some(mask),
            _ => None,
        }
    }

    pub fn has_mask(&self) -> bool {
        self.mask().is_some()
    }

    /// False when no pixel of the source image was visible.
    pub fn is_visible(&self) -> bool {
        !matches!(self.coverage, Coverage::Invisible)
    }

    /// Whether the cached pixel at `(x, y)` should be drawn.
    pub fn is_drawn(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        match &self.coverage {
            Coverage::Opaque => true,
            Coverage::Masked(mask) => mask.is_set(x, y),
            Coverage::Invisible => false,
        }
    }

    /// Packed bytes of one cached pixel.
    pub fn pixel_bytes(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.format.bytes_per_pixel();
        let at = y as usize * self.stride + x as usize * bpp;
        &self.data[at..at + bpp]
    }

    /// Draw the whole cache at `(x, y)`.
    pub fn paint<S: Surface + ?Sized>(&self, surface: &mut S, x: i32, y: i32) {
        if self.is_visible() {
            surface.blit_cache(x, y, self);
        }
    }

    /// Repeat the cache over the `width` x `height` rectangle at `(x, y)`.
    pub fn tile<S: Surface + ?Sized>(&self, surface: &mut S, x: i32, y: i32, width: u32, height: u32) {
        if self.is_visible() {
            surface.tile_cache(x, y, width, height, self);
        }
    }
}

/// A host drawing surface.
///
/// Implementations copy pixels; clamping against the surface's own extent
/// is theirs to do. Regions passed in are already clamped to the image or
/// cache.
pub trait Surface {
    /// The surface's native pixel layout.
    fn format(&self) -> SurfaceFormat;

    /// Copy `region` of `image` so that its top-left lands at `(x, y)`.
    fn blit(&mut self, x: i32, y: i32, image: &Image, region: Rect);

    /// Copy `region` of `cache`, honoring its mask, with the region's
    /// top-left at `(x, y)`.
    fn blit_cache_region(&mut self, x: i32, y: i32, cache: &DisplayCache, region: Rect);

    /// Copy the whole cache.
    fn blit_cache(&mut self, x: i32, y: i32, cache: &DisplayCache) {
        if cache.width() > 0 && cache.height() > 0 {
            self.blit_cache_region(x, y, cache, Rect::full(cache.width(), cache.height()));
        }
    }

    /// Fill the `width` x `height` rectangle at `(x, y)` with copies of the
    /// cache, clipping the tiles on the right and bottom edges.
    fn tile_cache(&mut self, x: i32, y: i32, width: u32, height: u32, cache: &DisplayCache) {
        let (cw, ch) = (cache.width(), cache.height());
        if cw == 0 || ch == 0 {
            return;
        }
        for ty in (0..height).step_by(ch as usize) {
            for tx in (0..width).step_by(cw as usize) {
                let region = Rect {
                    x: 0,
                    y: 0,
                    width: cw.min(width - tx),
                    height: ch.min(height - ty),
                };
                let dx = i64::from(x) + i64::from(tx);
                let dy = i64::from(y) + i64::from(ty);
                // Tiles starting past the coordinate range cannot be visible.
                let (Ok(dx), Ok(dy)) = (i32::try_from(dx), i32::try_from(dy)) else {
                    continue;
                };
                self.blit_cache_region(dx, dy, cache, region);
            }
        }
    }
}

/// Copy all of `image` to `surface` at `(x, y)`.
pub fn paint<S: Surface + ?Sized>(surface: &mut S, image: &Image, x: i32, y: i32) {
    paint_region(surface, image, x, y, 0, 0, image.width(), image.height());
}

/// Copy the `width` x `height` region of `image` at `(src_x, src_y)` to
/// `surface` at `(x, y)`. The region is clamped to the image first.
#[allow(clippy::too_many_arguments)]
pub fn paint_region<S: Surface + ?Sized>(
    surface: &mut S,
    image: &Image,
    x: i32,
    y: i32,
    src_x: i32,
    src_y: i32,
    width: u32,
    height: u32,
) {
    let Some(region) = clip(src_x, src_y, width, height, image.width(), image.height()) else {
        return;
    };
    // Keep the region anchored where the unclamped origin would have put it.
    let dx = i64::from(x) + i64::from(region.x) - i64::from(src_x);
    let dy = i64::from(y) + i64::from(region.y) - i64::from(src_y);
    let (Ok(dx), Ok(dy)) = (i32::try_from(dx), i32::try_from(dy)) else {
        return;
    };
    surface.blit(dx, dy, image, region);
}
