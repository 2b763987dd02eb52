//! Image decoders for JPEG, PNG, BMP and GIF.
//!
//! Decoding starts by sniffing the stream signature ([`ImageFormat::sniff`]),
//! runs exactly one format decoder, and finally normalizes the decoder's
//! native channel layout to the requested one.
//!
//! # Supported subsets
//!
//! ## JPEG
//! - Baseline and extended sequential Huffman DCT (SOF0/SOF1), 8-bit samples
//! - Grayscale, YCbCr and Adobe RGB three-component images
//! - Any sampling factors in `1..=4`, restart intervals
//! - Progressive (SOF2) and arithmetic coding are rejected
//!
//! ## PNG
//! - 8-bit depth in every color type (gray, RGB, palette, gray+alpha, RGBA)
//! - All five filter types and Adam7 interlacing
//! - `tRNS` color keys and palette alpha
//!
//! ## BMP
//! - 12, 40, 56 and 108 byte info headers
//! - 4/8-bit palettes, 16/24/32-bit direct color with bitfield masks
//! - RLE compression and 1-bit images are rejected
//!
//! ## GIF
//! - GIF87a / GIF89a, first frame only, interlaced or progressive rows
//!
//! # Example
//!
//! ```rust
//! use rasterkit::decode::{decode_raw, DecodeOptions};
//! use rasterkit::ByteSource;
//!
//! # fn main() -> rasterkit::Result<()> {
//! // 1x1 GIF, global palette entry 0 = red.
//! let gif = [
//!     b'G', b'I', b'F', b'8', b'9', b'a', 1, 0, 1, 0, 0x80, 0, 0,
//!     255, 0, 0, 0, 0, 0,
//!     0x2C, 0, 0, 0, 0, 1, 0, 1, 0, 0,
//!     2, 2, 0x44, 0x01, 0, 0x3B,
//! ];
//! let options = DecodeOptions::builder().channels(3).build();
//! let decoded = decode_raw(&mut ByteSource::from_memory(&gif), &options)?;
//! assert_eq!(decoded.pixels, vec![255, 0, 0]);
//! # Ok(())
//! # }
//! ```

mod bmp;
mod channels;
mod format;
mod gif;
mod idct;
mod jpeg;
mod lzw;
mod png;
mod upsample;

pub use channels::convert_channels;
pub use format::ImageFormat;

use crate::color::ColorType;
use crate::error::{Error, Result};
use crate::image::Image;
use crate::source::ByteSource;

/// Default per-side dimension limit.
pub const DEFAULT_MAX_DIMENSION: u32 = 1 << 24;

/// Decoding options.
///
/// Use [`DecodeOptions::builder()`] to configure options fluently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Requested channel count (1..=4), or 0 for the decoder's native layout.
    pub channels: u8,
    /// Verify PNG chunk CRCs and the zlib Adler-32 trailer.
    pub verify_checksums: bool,
    /// Images wider or taller than this are rejected.
    pub max_dimension: u32,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            channels: 4,
            verify_checksums: false,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

impl DecodeOptions {
    /// Create a builder for [`DecodeOptions`]. Defaults to RGBA output,
    /// unverified checksums and a 2^24 pixel side limit.
    pub fn builder() -> DecodeOptionsBuilder {
        DecodeOptionsBuilder::default()
    }

    fn requested_color_type(&self, native: ColorType) -> Result<ColorType> {
        match self.channels {
            0 => Ok(native),
            n => ColorType::from_channels(n),
        }
    }
}

/// Builder for [`DecodeOptions`].
#[derive(Debug, Clone, Default)]
pub struct DecodeOptionsBuilder {
    options: DecodeOptions,
}

impl DecodeOptionsBuilder {
    /// 0 keeps the native layout.
    pub fn channels(mut self, channels: u8) -> Self {
        self.options.channels = channels;
        self
    }

    pub fn verify_checksums(mut self, value: bool) -> Self {
        self.options.verify_checksums = value;
        self
    }

    pub fn max_dimension(mut self, max: u32) -> Self {
        self.options.max_dimension = max;
        self
    }

    #[must_use]
    pub fn build(self) -> DecodeOptions {
        self.options
    }
}

/// Decoded pixels in an arbitrary channel layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// Layout of `pixels`.
    pub color_type: ColorType,
    /// Layout the decoder produced before normalization.
    pub native_color_type: ColorType,
    pub format: ImageFormat,
    pub pixels: Vec<u8>,
}

/// Header information returned by [`probe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    /// Native channel layout.
    pub color_type: ColorType,
    pub format: ImageFormat,
}

/// What a format decoder hands back: pixels in its native layout.
#[derive(Debug)]
pub(crate) struct Frame {
    pub width: u32,
    pub height: u32,
    pub color_type: ColorType,
    pub pixels: Vec<u8>,
}

/// Header fields gathered while probing.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Header {
    pub width: u32,
    pub height: u32,
    pub color_type: ColorType,
}

/// Reject zero-sized and oversized images.
pub(crate) fn check_dimensions(width: u32, height: u32, max: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::corrupt(format!(
            "zero image dimension {width}x{height}"
        )));
    }
    if width > max || height > max {
        return Err(Error::ImageTooLarge { width, height, max });
    }
    Ok(())
}

/// Decode into a canonical RGBA [`Image`].
///
/// `options.channels` is ignored; the canonical buffer is always RGBA. The
/// image's `has_alpha` flag is set when the native layout carries alpha.
#[must_use = "this `Result` may indicate a decoding error"]
pub fn decode(source: &mut ByteSource<'_>, options: &DecodeOptions) -> Result<Image> {
    let options = DecodeOptions {
        channels: 4,
        ..*options
    };
    let decoded = decode_raw(source, &options)?;
    let mut image = Image::from_rgba(decoded.width, decoded.height, decoded.pixels)?;
    image.set_has_alpha(decoded.native_color_type.has_alpha());
    Ok(image)
}

/// Decode an in-memory file with default options.
pub fn decode_memory(data: &[u8]) -> Result<Image> {
    decode(&mut ByteSource::from_memory(data), &DecodeOptions::default())
}

/// Decode keeping the native layout or converting to `options.channels`.
#[must_use = "this `Result` may indicate a decoding error"]
pub fn decode_raw(source: &mut ByteSource<'_>, options: &DecodeOptions) -> Result<DecodedImage> {
    if options.channels > 4 {
        return Err(Error::InvalidChannelCount(options.channels));
    }
    let format = ImageFormat::sniff(source)?;
    let frame = format.decode(source, options)?;
    tracing::debug!(
        ?format,
        width = frame.width,
        height = frame.height,
        color_type = ?frame.color_type,
        "decoded frame"
    );

    let target = options.requested_color_type(frame.color_type)?;
    let pixels = if target == frame.color_type {
        frame.pixels
    } else {
        convert_channels(&frame.pixels, frame.color_type, target)?
    };

    Ok(DecodedImage {
        width: frame.width,
        height: frame.height,
        color_type: target,
        native_color_type: frame.color_type,
        format,
        pixels,
    })
}

/// Read dimensions and native layout without decoding pixel data.
pub fn probe(source: &mut ByteSource<'_>) -> Result<ImageInfo> {
    let format = ImageFormat::sniff(source)?;
    let header = format.probe(source)?;
    tracing::debug!(?format, ?header, "probed image");
    Ok(ImageInfo {
        width: header.width,
        height: header.height,
        color_type: header.color_type,
        format,
    })
}

/// [`probe`] over an in-memory file.
pub fn probe_memory(data: &[u8]) -> Result<ImageInfo> {
    probe(&mut ByteSource::from_memory(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1x1 24-bit BMP, pixel = (255, 0, 0).
    fn red_bmp() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"BM");
        out.extend_from_slice(&58u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&54u32.to_le_bytes());
        out.extend_from_slice(&40u32.to_le_bytes());
        out.extend_from_slice(&1i32.to_le_bytes());
        out.extend_from_slice(&1i32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&24u16.to_le_bytes());
        out.extend_from_slice(&[0u8; 24]);
        out.extend_from_slice(&[0, 0, 255, 0]);
        out
    }

    #[test]
    fn builder_defaults() {
        let opts = DecodeOptions::builder().build();
        assert_eq!(opts, DecodeOptions::default());
        assert_eq!(opts.channels, 4);
        assert!(!opts.verify_checksums);
        assert_eq!(opts.max_dimension, DEFAULT_MAX_DIMENSION);
    }

    #[test]
    fn decode_memory_bmp_is_canonical() {
        let img = decode_memory(&red_bmp()).unwrap();
        assert_eq!((img.width(), img.height()), (1, 1));
        assert_eq!(img.pixels(), &[255, 0, 0, 255]);
        assert!(!img.has_alpha());
    }

    #[test]
    fn native_channels_are_kept_with_zero() {
        let opts = DecodeOptions::builder().channels(0).build();
        let out = decode_raw(&mut ByteSource::from_memory(&red_bmp()), &opts).unwrap();
        assert_eq!(out.color_type, ColorType::Rgb);
        assert_eq!(out.pixels, vec![255, 0, 0]);
    }

    #[test]
    fn requested_gray_uses_luma() {
        let opts = DecodeOptions::builder().channels(1).build();
        let out = decode_raw(&mut ByteSource::from_memory(&red_bmp()), &opts).unwrap();
        assert_eq!(out.color_type, ColorType::Gray);
        assert_eq!(out.native_color_type, ColorType::Rgb);
        assert_eq!(out.pixels, vec![76]);
    }

    #[test]
    fn rejects_bad_channel_count() {
        let opts = DecodeOptions::builder().channels(5).build();
        let err = decode_raw(&mut ByteSource::from_memory(&red_bmp()), &opts).unwrap_err();
        assert!(matches!(err, Error::InvalidChannelCount(5)));
    }

    #[test]
    fn enforces_dimension_limit() {
        let opts = DecodeOptions::builder().max_dimension(0).build();
        let err = decode(&mut ByteSource::from_memory(&red_bmp()), &opts).unwrap_err();
        assert!(matches!(err, Error::ImageTooLarge { .. }));
    }

    #[test]
    fn probe_reports_header() {
        let info = probe_memory(&red_bmp()).unwrap();
        assert_eq!(
            info,
            ImageInfo {
                width: 1,
                height: 1,
                color_type: ColorType::Rgb,
                format: ImageFormat::Bmp,
            }
        );
    }

    #[test]
    fn unknown_bytes_are_unrecognized() {
        assert!(matches!(
            decode_memory(b"not an image at all"),
            Err(Error::UnrecognizedFormat)
        ));
        assert!(matches!(decode_memory(&[]), Err(Error::UnrecognizedFormat)));
    }
}
