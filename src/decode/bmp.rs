//! Windows BMP decoder.
//!
//! Handles the 12-byte core header and the 40/56/108-byte info headers,
//! 4/8-bit palettes and 16/24/32-bit direct color. RLE compression and
//! 1-bit images are rejected.

use super::{check_dimensions, DecodeOptions, Frame, Header};
use crate::color::{ChannelMask, ColorType};
use crate::error::{buffer_len, try_zeroed, Error, Result};
use crate::source::ByteSource;

const FILE_HEADER_LEN: u32 = 14;
const BI_RGB: u32 = 0;
const BI_RLE8: u32 = 1;
const BI_RLE4: u32 = 2;
const BI_BITFIELDS: u32 = 3;

/// Canonical 32-bit BGRA layout.
const MASKS_BGRA: [u32; 4] = [0x00FF_0000, 0x0000_FF00, 0x0000_00FF, 0xFF00_0000];
/// Default 16-bit layout (5-5-5).
const MASKS_555: [u32; 4] = [0x7C00, 0x03E0, 0x001F, 0];

pub(super) fn test(src: &mut ByteSource<'_>) -> bool {
    if src.get8() != b'B' || src.get8() != b'M' {
        return false;
    }
    src.skip(12);
    matches!(src.get32le(), 12 | 40 | 56 | 108)
}

pub(super) fn probe(src: &mut ByteSource<'_>) -> Result<Header> {
    let info = read_info(src)?;
    Ok(Header {
        width: info.width,
        height: info.height,
        color_type: info.color_type(),
    })
}

pub(super) fn decode(src: &mut ByteSource<'_>, options: &DecodeOptions) -> Result<Frame> {
    let info = read_info(src)?;
    check_dimensions(info.width, info.height, options.max_dimension)?;

    let palette = if info.bpp <= 8 {
        read_palette(src, &info)?
    } else {
        Vec::new()
    };

    let pos = src.offset();
    if pos > u64::from(info.offset) {
        return Err(Error::corrupt("BMP pixel data offset inside the headers"));
    }
    src.skip((u64::from(info.offset) - pos) as usize);

    let color_type = info.color_type();
    let channels = color_type.bytes_per_pixel();
    let mut out = try_zeroed(buffer_len(info.width, info.height, channels)?)?;
    let (width, height) = (info.width as usize, info.height as usize);
    let stride = width * channels;

    let row_bytes = match info.bpp {
        4 => width.div_ceil(2),
        8 => width,
        16 => width * 2,
        24 => width * 3,
        _ => width * 4,
    };
    let pad = (4 - row_bytes % 4) % 4;

    let masks = info.masks.map(|m| m.map(ChannelMask::new));
    let fast32 = info.bpp == 32 && info.masks == Some(MASKS_BGRA);
    let mut alpha_seen = 0u8;

    for y in 0..height {
        let dst_y = if info.bottom_up { height - 1 - y } else { y };
        let row = &mut out[dst_y * stride..(dst_y + 1) * stride];

        match info.bpp {
            4 => {
                let mut x = 0;
                while x < width {
                    let byte = src.get8();
                    for idx in [byte >> 4, byte & 15] {
                        if x < width {
                            put_palette(&mut row[x * 3..x * 3 + 3], &palette, idx)?;
                            x += 1;
                        }
                    }
                }
            }
            8 => {
                for px in row.chunks_exact_mut(3) {
                    put_palette(px, &palette, src.get8())?;
                }
            }
            24 => {
                for px in row.chunks_exact_mut(3) {
                    let b = src.get8();
                    let g = src.get8();
                    let r = src.get8();
                    px.copy_from_slice(&[r, g, b]);
                }
            }
            32 if fast32 => {
                for px in row.chunks_exact_mut(4) {
                    let b = src.get8();
                    let g = src.get8();
                    let r = src.get8();
                    let a = src.get8();
                    alpha_seen |= a;
                    px.copy_from_slice(&[r, g, b, a]);
                }
            }
            _ => {
                let Some([mr, mg, mb, ma]) = masks else {
                    return Err(Error::corrupt("missing BMP color masks"));
                };
                for px in row.chunks_exact_mut(channels) {
                    let word = if info.bpp == 16 {
                        u32::from(src.get16le())
                    } else {
                        src.get32le()
                    };
                    px[0] = mr.extract(word);
                    px[1] = mg.extract(word);
                    px[2] = mb.extract(word);
                    if channels == 4 {
                        let a = ma.extract(word);
                        alpha_seen |= a;
                        px[3] = a;
                    }
                }
            }
        }

        if src.overran() {
            return Err(Error::corrupt("truncated BMP pixel data"));
        }
        if y + 1 < height {
            src.skip(pad);
        }
    }

    if channels == 4 && alpha_seen == 0 {
        // An all-zero alpha channel means the writer left it unused.
        tracing::debug!("BMP alpha channel is all zero, treating as opaque");
        for px in out.chunks_exact_mut(4) {
            px[3] = 255;
        }
    }

    Ok(Frame {
        width: info.width,
        height: info.height,
        color_type,
        pixels: out,
    })
}

#[derive(Debug)]
struct BmpInfo {
    offset: u32,
    header_size: u32,
    width: u32,
    height: u32,
    bottom_up: bool,
    bpp: u16,
    /// R, G, B, A masks for 16/32-bit images.
    masks: Option<[u32; 4]>,
}

impl BmpInfo {
    fn color_type(&self) -> ColorType {
        match self.masks {
            Some([_, _, _, alpha]) if alpha != 0 => ColorType::Rgba,
            _ => ColorType::Rgb,
        }
    }
}

fn read_info(src: &mut ByteSource<'_>) -> Result<BmpInfo> {
    if src.get8() != b'B' || src.get8() != b'M' {
        return Err(Error::corrupt("not a BMP file"));
    }
    let _file_size = src.get32le();
    src.skip(4);
    let offset = src.get32le();
    let header_size = src.get32le();
    if !matches!(header_size, 12 | 40 | 56 | 108) {
        return Err(Error::unsupported(format!(
            "unsupported BMP subtype (header size {header_size})"
        )));
    }

    let (width, height, bottom_up) = if header_size == 12 {
        (u32::from(src.get16le()), u32::from(src.get16le()), true)
    } else {
        let w = src.get32le() as i32;
        let h = src.get32le() as i32;
        if w < 0 {
            return Err(Error::corrupt("negative BMP width"));
        }
        if h == i32::MIN {
            return Err(Error::corrupt("BMP height out of range"));
        }
        (w as u32, h.unsigned_abs(), h > 0)
    };

    if src.get16le() != 1 {
        return Err(Error::corrupt("BMP plane count is not 1"));
    }
    let bpp = src.get16le();
    match bpp {
        1 => return Err(Error::unsupported("1-bit BMP")),
        4 | 8 | 16 | 24 | 32 => {}
        _ => return Err(Error::corrupt(format!("invalid BMP bit depth {bpp}"))),
    }

    let mut masks = None;
    if header_size != 12 {
        let compression = src.get32le();
        match compression {
            BI_RLE8 | BI_RLE4 => return Err(Error::unsupported("RLE-compressed BMP")),
            BI_RGB | BI_BITFIELDS => {}
            c => return Err(Error::unsupported(format!("BMP compression {c}"))),
        }
        // Image size, resolution, colors used, colors important.
        src.skip(20);

        let inline = if header_size >= 56 {
            let m = [src.get32le(), src.get32le(), src.get32le(), src.get32le()];
            // Color space type, endpoints and gamma.
            src.skip(header_size as usize - 56);
            Some(m)
        } else {
            None
        };

        if compression == BI_BITFIELDS {
            if bpp != 16 && bpp != 32 {
                return Err(Error::corrupt("BMP bitfields require 16 or 32 bits"));
            }
            let m = match inline {
                Some(m) => m,
                None => [src.get32le(), src.get32le(), src.get32le(), 0],
            };
            validate_masks(&m)?;
            masks = Some(m);
        } else if bpp == 32 {
            masks = Some(MASKS_BGRA);
        } else if bpp == 16 {
            masks = Some(MASKS_555);
        }
    } else if bpp == 16 || bpp == 32 {
        masks = Some(if bpp == 32 { MASKS_BGRA } else { MASKS_555 });
    }

    if src.overran() {
        return Err(Error::corrupt("truncated BMP header"));
    }
    tracing::debug!(width, height, bpp, header_size, bottom_up, "BMP header");
    Ok(BmpInfo {
        offset,
        header_size,
        width,
        height,
        bottom_up,
        bpp,
        masks,
    })
}

fn validate_masks(masks: &[u32; 4]) -> Result<()> {
    let [r, g, b, _] = *masks;
    if r == g && g == b {
        return Err(Error::corrupt("BMP color masks are identical"));
    }
    for &m in masks {
        if m != 0 && !((m >> m.trailing_zeros()) + 1).is_power_of_two() {
            return Err(Error::corrupt(format!("BMP color mask {m:#010x} is not contiguous")));
        }
    }
    Ok(())
}

fn read_palette(src: &mut ByteSource<'_>, info: &BmpInfo) -> Result<Vec<[u8; 3]>> {
    let entry_size = if info.header_size == 12 { 3 } else { 4 };
    let avail = info
        .offset
        .checked_sub(FILE_HEADER_LEN + info.header_size)
        .ok_or_else(|| Error::corrupt("BMP data offset inside the headers"))?;
    let entries = (avail / entry_size).min(256) as usize;
    if entries == 0 {
        return Err(Error::corrupt("BMP palette is empty"));
    }
    let mut palette = Vec::with_capacity(entries);
    for _ in 0..entries {
        let b = src.get8();
        let g = src.get8();
        let r = src.get8();
        if entry_size == 4 {
            src.get8();
        }
        palette.push([r, g, b]);
    }
    Ok(palette)
}

#[inline]
fn put_palette(px: &mut [u8], palette: &[[u8; 3]], idx: u8) -> Result<()> {
    let entry = palette
        .get(idx as usize)
        .ok_or_else(|| Error::corrupt(format!("BMP palette index {idx} out of range")))?;
    px.copy_from_slice(entry);
    Ok(())
}
