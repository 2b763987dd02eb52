//! Channel layouts and the small pieces of pixel math shared between the
//! decoders and the display cache.

use crate::error::{Error, Result};

/// Interleaved 8-bit channel layout of a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorType {
    /// Single luminance channel.
    Gray,
    /// Luminance followed by alpha.
    GrayAlpha,
    /// Red, green, blue.
    Rgb,
    /// Red, green, blue, alpha.
    Rgba,
}

impl ColorType {
    /// Bytes (equivalently channels) per pixel.
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            ColorType::Gray => 1,
            ColorType::GrayAlpha => 2,
            ColorType::Rgb => 3,
            ColorType::Rgba => 4,
        }
    }

    /// Layout for a channel count in `1..=4`.
    pub fn from_channels(channels: u8) -> Result<Self> {
        match channels {
            1 => Ok(ColorType::Gray),
            2 => Ok(ColorType::GrayAlpha),
            3 => Ok(ColorType::Rgb),
            4 => Ok(ColorType::Rgba),
            n => Err(Error::InvalidChannelCount(n)),
        }
    }

    /// Whether the layout carries an alpha channel.
    #[inline]
    pub const fn has_alpha(self) -> bool {
        matches!(self, ColorType::GrayAlpha | ColorType::Rgba)
    }
}

/// ITU-R BT.601 luma with 8-bit fixed-point weights.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

// Y'CbCr -> RGB coefficients in 20-bit fixed point (value * 4096, rounded, << 8).
const CR_TO_R: i32 = 5743 << 8; // 1.40200
const CR_TO_G: i32 = 2925 << 8; // 0.71414
const CB_TO_G: i32 = 1410 << 8; // 0.34414
const CB_TO_B: i32 = 7258 << 8; // 1.77200

/// Convert one Y'CbCr sample triple to RGB using fixed-point arithmetic.
#[inline]
pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let y_fixed = ((y as i32) << 20) + (1 << 19);
    let cr = cr as i32 - 128;
    let cb = cb as i32 - 128;

    let r = y_fixed + cr * CR_TO_R;
    let g = y_fixed - cr * CR_TO_G + ((-cb * CB_TO_G) & !0xFFFF);
    let b = y_fixed + cb * CB_TO_B;

    [clamp_u8(r >> 20), clamp_u8(g >> 20), clamp_u8(b >> 20)]
}

#[inline]
pub(crate) fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// One color channel described by a bit mask inside a packed pixel word,
/// as used by BMP bitfields and by display surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMask {
    mask: u32,
    high_bit: u32,
    bits: u32,
}

impl ChannelMask {
    /// Describe the channel selected by `mask`. A zero mask yields a channel
    /// that always reads as 0 and packs to nothing.
    pub const fn new(mask: u32) -> Self {
        if mask == 0 {
            return Self {
                mask: 0,
                high_bit: 0,
                bits: 0,
            };
        }
        Self {
            mask,
            high_bit: 31 - mask.leading_zeros(),
            bits: mask.count_ones(),
        }
    }

    /// The raw mask.
    #[inline]
    pub const fn mask(&self) -> u32 {
        self.mask
    }

    /// Number of set bits in the mask.
    #[inline]
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.mask == 0
    }

    /// Extract the channel from a packed word and widen it to 8 bits by
    /// replicating the extracted value across the byte.
    #[inline]
    pub fn extract(&self, word: u32) -> u8 {
        if self.bits == 0 {
            return 0;
        }
        let v = word & self.mask;
        // Align the mask's top bit with bit 7.
        let aligned = if self.high_bit >= 7 {
            v >> (self.high_bit - 7)
        } else {
            v << (7 - self.high_bit)
        };
        let n = self.bits.min(8);
        replicate(aligned >> (8 - n), n)
    }

    /// Place an 8-bit channel value into the mask's bit positions, keeping the
    /// most significant bits when the mask is narrower than 8 bits.
    #[inline]
    pub fn pack(&self, value: u8) -> u32 {
        if self.bits == 0 {
            return 0;
        }
        let n = self.bits.min(8);
        let raw = (value as u32) >> (8 - n);
        let low = self.high_bit + 1 - n;
        (raw << low) & self.mask
    }
}

/// Repeat an `n`-bit value across 8 bits (`0b101` -> `0b1011_0110`).
#[inline]
fn replicate(value: u32, n: u32) -> u8 {
    if n >= 8 {
        return value as u8;
    }
    let mut out = 0u32;
    let mut filled = 0;
    while filled < 8 {
        out = (out << n) | value;
        filled += n;
    }
    (out >> (filled - 8)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_type_channel_counts() {
        for n in 1..=4u8 {
            let ct = ColorType::from_channels(n).unwrap();
            assert_eq!(ct.bytes_per_pixel(), n as usize);
        }
        assert!(matches!(
            ColorType::from_channels(5),
            Err(Error::InvalidChannelCount(5))
        ));
        assert!(ColorType::Rgba.has_alpha());
        assert!(!ColorType::Rgb.has_alpha());
    }

    #[test]
    fn luma_of_primaries() {
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 0, 0), 76);
    }

    #[test]
    fn ycbcr_neutral_chroma_is_gray() {
        for y in [0u8, 1, 64, 128, 200, 255] {
            assert_eq!(ycbcr_to_rgb(y, 128, 128), [y, y, y]);
        }
    }

    #[test]
    fn ycbcr_pure_red() {
        // JFIF encoding of (255, 0, 0) is roughly Y=76, Cb=85, Cr=255.
        let [r, g, b] = ycbcr_to_rgb(76, 85, 255);
        assert!(r >= 250, "r={r}");
        assert!(g <= 3, "g={g}");
        assert!(b <= 3, "b={b}");
    }

    #[test]
    fn mask_extract_replicates_bits() {
        let red565 = ChannelMask::new(0xF800);
        assert_eq!(red565.bits(), 5);
        assert_eq!(red565.extract(0xF800), 255);
        assert_eq!(red565.extract(0x0000), 0);
        assert_eq!(red565.extract(0x8000), 0b1000_0100);

        let green8 = ChannelMask::new(0x0000_FF00);
        assert_eq!(green8.extract(0x0012_3456), 0x34);
    }

    #[test]
    fn mask_pack_roundtrips_high_bits() {
        let blue555 = ChannelMask::new(0x001F);
        assert_eq!(blue555.pack(255), 0x1F);
        assert_eq!(blue555.pack(0), 0);
        assert_eq!(blue555.extract(blue555.pack(255)), 255);

        let alpha = ChannelMask::new(0xFF00_0000);
        assert_eq!(alpha.pack(0x80), 0x8000_0000);
    }

    #[test]
    fn empty_mask_is_inert() {
        let m = ChannelMask::new(0);
        assert!(m.is_empty());
        assert_eq!(m.extract(u32::MAX), 0);
        assert_eq!(m.pack(255), 0);
    }
}
