//! PNG decoder (8-bit samples).
//!
//! Chunks are walked in order until `IEND`. All `IDAT` payloads are
//! concatenated and inflated in one pass, then each scanline is
//! reconstructed from its filter byte. Interlaced images are decoded as the
//! seven Adam7 sub-images and scattered into the full-resolution buffer.
//! Palette expansion and color-key transparency run last.

use super::{check_dimensions, DecodeOptions, Frame, Header};
use crate::color::ColorType;
use crate::compress::crc32::Crc32;
use crate::compress::inflate::inflate_zlib;
use crate::error::{try_zeroed, Error, Result};
use crate::source::ByteSource;

/// Chunk payloads are streamed in pieces of this size, so memory only grows
/// with bytes actually present in the stream.
const READ_PIECE: usize = 64 * 1024;

const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Adam7 passes as `(x origin, y origin, x step, y step)`.
const ADAM7: [(usize, usize, usize, usize); 7] = [
    (0, 0, 8, 8),
    (4, 0, 8, 8),
    (0, 4, 4, 8),
    (2, 0, 4, 4),
    (0, 2, 2, 4),
    (1, 0, 2, 2),
    (0, 1, 1, 2),
];

pub(super) fn test(src: &mut ByteSource<'_>) -> bool {
    SIGNATURE.iter().all(|&b| src.get8() == b)
}

pub(super) fn probe(src: &mut ByteSource<'_>) -> Result<Header> {
    let mut reader = ChunkReader::new(false);
    reader.read(src, Stop::FirstIdat)?;
    let ihdr = reader.ihdr()?;
    Ok(Header {
        width: ihdr.width,
        height: ihdr.height,
        color_type: reader.native_color_type(),
    })
}

pub(super) fn decode(src: &mut ByteSource<'_>, options: &DecodeOptions) -> Result<Frame> {
    let mut reader = ChunkReader::new(options.verify_checksums);
    reader.read(src, Stop::End)?;
    let ihdr = reader.ihdr()?;
    check_dimensions(ihdr.width, ihdr.height, options.max_dimension)?;

    let (width, height) = (ihdr.width as usize, ihdr.height as usize);
    let bpp = ihdr.color.channels();
    let raw_len = if ihdr.interlaced {
        ADAM7
            .iter()
            .map(|&pass| {
                let (pw, ph) = pass_size(width, height, pass);
                filtered_len(pw, ph, bpp)
            })
            .try_fold(0usize, |acc, len| acc.checked_add(len?))
            .ok_or(Error::OutOfMemory {
                requested: usize::MAX,
            })?
    } else {
        filtered_len(width, height, bpp).ok_or(Error::OutOfMemory {
            requested: usize::MAX,
        })?
    };

    let raw = inflate_zlib(&reader.idat, Some(raw_len), options.verify_checksums)?;
    if raw.len() < raw_len {
        return Err(Error::corrupt(format!(
            "not enough pixel data: expected {raw_len} bytes, got {}",
            raw.len()
        )));
    }
    if raw.len() > raw_len {
        tracing::warn!(extra = raw.len() - raw_len, "ignoring extra inflated PNG data");
    }

    let samples = if ihdr.interlaced {
        deinterlace(&raw, width, height, bpp)?
    } else {
        unfilter(&raw[..raw_len], width, height, bpp)?
    };

    let color_type = reader.native_color_type();
    let pixels = match ihdr.color {
        PngColor::Indexed => expand_palette(&samples, &reader.palette, reader.palette_alpha)?,
        _ => match reader.color_key {
            Some(key) => apply_color_key(&samples, bpp, key)?,
            None => samples,
        },
    };

    Ok(Frame {
        width: ihdr.width,
        height: ihdr.height,
        color_type,
        pixels,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PngColor {
    Gray,
    Rgb,
    Indexed,
    GrayAlpha,
    Rgba,
}

impl PngColor {
    fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(PngColor::Gray),
            2 => Ok(PngColor::Rgb),
            3 => Ok(PngColor::Indexed),
            4 => Ok(PngColor::GrayAlpha),
            6 => Ok(PngColor::Rgba),
            _ => Err(Error::corrupt(format!("invalid PNG color type {code}"))),
        }
    }

    /// Samples per pixel in the filtered data.
    fn channels(self) -> usize {
        match self {
            PngColor::Gray | PngColor::Indexed => 1,
            PngColor::GrayAlpha => 2,
            PngColor::Rgb => 3,
            PngColor::Rgba => 4,
        }
    }

    fn valid_depth(self, depth: u8) -> bool {
        match self {
            PngColor::Gray => matches!(depth, 1 | 2 | 4 | 8 | 16),
            PngColor::Indexed => matches!(depth, 1 | 2 | 4 | 8),
            PngColor::Rgb | PngColor::GrayAlpha | PngColor::Rgba => matches!(depth, 8 | 16),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Ihdr {
    width: u32,
    height: u32,
    color: PngColor,
    interlaced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    /// Stop before the first IDAT payload (probing).
    FirstIdat,
    /// Read through IEND.
    End,
}

/// Chunk-level state gathered before pixel reconstruction.
struct ChunkReader {
    verify_crc: bool,
    ihdr: Option<Ihdr>,
    palette: Vec<[u8; 4]>,
    palette_alpha: bool,
    color_key: Option<[u8; 3]>,
    idat: Vec<u8>,
    seen_idat: bool,
}

impl ChunkReader {
    fn new(verify_crc: bool) -> Self {
        Self {
            verify_crc,
            ihdr: None,
            palette: Vec::new(),
            palette_alpha: false,
            color_key: None,
            idat: Vec::new(),
            seen_idat: false,
        }
    }

    fn ihdr(&self) -> Result<Ihdr> {
        self.ihdr.ok_or_else(|| Error::corrupt("missing IHDR"))
    }

    fn native_color_type(&self) -> ColorType {
        match self.ihdr.map(|h| h.color) {
            Some(PngColor::Gray) | None if self.color_key.is_some() => ColorType::GrayAlpha,
            Some(PngColor::Gray) | None => ColorType::Gray,
            Some(PngColor::GrayAlpha) => ColorType::GrayAlpha,
            Some(PngColor::Rgb) if self.color_key.is_some() => ColorType::Rgba,
            Some(PngColor::Rgb) => ColorType::Rgb,
            Some(PngColor::Indexed) if self.palette_alpha => ColorType::Rgba,
            Some(PngColor::Indexed) => ColorType::Rgb,
            Some(PngColor::Rgba) => ColorType::Rgba,
        }
    }

    fn read(&mut self, src: &mut ByteSource<'_>, stop: Stop) -> Result<()> {
        if !test(src) {
            return Err(Error::corrupt("bad PNG signature"));
        }

        let mut first = true;
        loop {
            let length = src.get32be();
            let mut kind = [0u8; 4];
            src.read_exact(&mut kind);
            if src.overran() {
                return Err(Error::corrupt("truncated PNG chunk header"));
            }
            if length > i32::MAX as u32 {
                return Err(Error::corrupt("PNG chunk length out of range"));
            }
            let length = length as usize;
            tracing::trace!(
                chunk = %String::from_utf8_lossy(&kind),
                length,
                "PNG chunk"
            );

            if first && &kind != b"IHDR" {
                return Err(Error::corrupt("first chunk is not IHDR"));
            }
            let mut crc = Crc32::new();
            crc.update(&kind);

            match &kind {
                b"IHDR" => {
                    if !first {
                        return Err(Error::corrupt("multiple IHDR chunks"));
                    }
                    if length != 13 {
                        return Err(Error::corrupt("bad IHDR length"));
                    }
                    let payload = read_payload(src, length, &mut crc)?;
                    self.ihdr = Some(parse_ihdr(&payload)?);
                }
                b"PLTE" => {
                    let color = self.ihdr()?.color;
                    if self.seen_idat {
                        return Err(Error::corrupt("PLTE after IDAT"));
                    }
                    if matches!(color, PngColor::Gray | PngColor::GrayAlpha) {
                        return Err(Error::corrupt("PLTE in a grayscale PNG"));
                    }
                    if length > 256 * 3 || length % 3 != 0 {
                        return Err(Error::corrupt("invalid PLTE length"));
                    }
                    let payload = read_payload(src, length, &mut crc)?;
                    self.palette = payload
                        .chunks_exact(3)
                        .map(|c| [c[0], c[1], c[2], 255])
                        .collect();
                }
                b"tRNS" => {
                    let color = self.ihdr()?.color;
                    if self.seen_idat {
                        return Err(Error::corrupt("tRNS after IDAT"));
                    }
                    if length > 256 {
                        return Err(Error::corrupt("invalid tRNS length"));
                    }
                    let payload = read_payload(src, length, &mut crc)?;
                    match color {
                        PngColor::Indexed => {
                            if self.palette.is_empty() {
                                return Err(Error::corrupt("tRNS before PLTE"));
                            }
                            if length > self.palette.len() {
                                return Err(Error::corrupt("tRNS longer than palette"));
                            }
                            for (entry, &alpha) in self.palette.iter_mut().zip(&payload) {
                                entry[3] = alpha;
                            }
                            self.palette_alpha = true;
                        }
                        PngColor::Gray => {
                            if length != 2 {
                                return Err(Error::corrupt("bad grayscale tRNS length"));
                            }
                            let v = payload[1];
                            self.color_key = Some([v, v, v]);
                        }
                        PngColor::Rgb => {
                            if length != 6 {
                                return Err(Error::corrupt("bad RGB tRNS length"));
                            }
                            self.color_key = Some([payload[1], payload[3], payload[5]]);
                        }
                        PngColor::GrayAlpha | PngColor::Rgba => {
                            return Err(Error::corrupt("tRNS in a PNG with an alpha channel"));
                        }
                    }
                }
                b"IDAT" => {
                    let color = self.ihdr()?.color;
                    if color == PngColor::Indexed && self.palette.is_empty() {
                        return Err(Error::corrupt("IDAT before PLTE"));
                    }
                    self.seen_idat = true;
                    if stop == Stop::FirstIdat {
                        return Ok(());
                    }
                    self.append_idat(src, length, &mut crc)?;
                }
                b"IEND" => {
                    if !self.seen_idat {
                        return Err(Error::corrupt("no IDAT before IEND"));
                    }
                    self.check_crc(src, crc)?;
                    return Ok(());
                }
                _ => {
                    if kind[0] & 0x20 == 0 {
                        return Err(Error::unsupported(format!(
                            "unknown critical PNG chunk {}",
                            String::from_utf8_lossy(&kind)
                        )));
                    }
                    if self.verify_crc {
                        stream_payload(src, length, &mut crc, |_| Ok(()))?;
                    } else {
                        src.skip(length);
                    }
                }
            }

            self.check_crc(src, crc)?;
            if src.overran() {
                return Err(Error::corrupt("truncated PNG chunk"));
            }
            first = false;
        }
    }

    fn append_idat(&mut self, src: &mut ByteSource<'_>, length: usize, crc: &mut Crc32) -> Result<()> {
        let idat = &mut self.idat;
        stream_payload(src, length, crc, |piece| {
            idat.try_reserve(piece.len())
                .map_err(|_| Error::OutOfMemory {
                    requested: idat.len().saturating_add(piece.len()),
                })?;
            idat.extend_from_slice(piece);
            Ok(())
        })
    }

    fn check_crc(&self, src: &mut ByteSource<'_>, crc: Crc32) -> Result<()> {
        let stored = src.get32be();
        if self.verify_crc {
            let actual = crc.finalize();
            if stored != actual {
                return Err(Error::corrupt(format!(
                    "PNG chunk CRC mismatch: stored {stored:#010x}, computed {actual:#010x}"
                )));
            }
        }
        Ok(())
    }
}

/// Read a chunk payload of `length` bytes in bounded pieces, feeding each
/// piece to the CRC and then to `sink`.
fn stream_payload<F>(src: &mut ByteSource<'_>, length: usize, crc: &mut Crc32, mut sink: F) -> Result<()>
where
    F: FnMut(&[u8]) -> Result<()>,
{
    let mut piece = vec![0u8; length.min(READ_PIECE)];
    let mut left = length;
    while left > 0 {
        let n = left.min(piece.len());
        if !src.read_exact(&mut piece[..n]) {
            return Err(Error::corrupt("truncated PNG chunk"));
        }
        crc.update(&piece[..n]);
        sink(&piece[..n])?;
        left -= n;
    }
    Ok(())
}

/// Read a small chunk whose length has already been bounded.
fn read_payload(src: &mut ByteSource<'_>, length: usize, crc: &mut Crc32) -> Result<Vec<u8>> {
    let mut payload = try_zeroed(length)?;
    if !src.read_exact(&mut payload) {
        return Err(Error::corrupt("truncated PNG chunk"));
    }
    crc.update(&payload);
    Ok(payload)
}

fn parse_ihdr(p: &[u8]) -> Result<Ihdr> {
    let width = u32::from_be_bytes([p[0], p[1], p[2], p[3]]);
    let height = u32::from_be_bytes([p[4], p[5], p[6], p[7]]);
    let depth = p[8];
    let color = PngColor::from_code(p[9])?;
    if width == 0 || height == 0 {
        return Err(Error::corrupt("zero PNG dimension"));
    }
    if width > i32::MAX as u32 || height > i32::MAX as u32 {
        return Err(Error::corrupt("PNG dimension out of range"));
    }
    if !color.valid_depth(depth) {
        return Err(Error::corrupt(format!(
            "bit depth {depth} is invalid for {color:?}"
        )));
    }
    if depth != 8 {
        return Err(Error::unsupported(format!("{depth}-bit PNG")));
    }
    if p[10] != 0 {
        return Err(Error::corrupt("bad PNG compression method"));
    }
    if p[11] != 0 {
        return Err(Error::corrupt("bad PNG filter method"));
    }
    let interlaced = match p[12] {
        0 => false,
        1 => true,
        _ => return Err(Error::corrupt("bad PNG interlace method")),
    };
    tracing::debug!(width, height, ?color, interlaced, "PNG header");
    Ok(Ihdr {
        width,
        height,
        color,
        interlaced,
    })
}

/// Width and height of one Adam7 pass.
fn pass_size(width: usize, height: usize, (x0, y0, dx, dy): (usize, usize, usize, usize)) -> (usize, usize) {
    let pw = if width > x0 { (width - x0).div_ceil(dx) } else { 0 };
    let ph = if height > y0 { (height - y0).div_ceil(dy) } else { 0 };
    (pw, ph)
}

/// Bytes of filtered data (one filter byte per row) for a sub-image.
fn filtered_len(width: usize, height: usize, bpp: usize) -> Option<usize> {
    if width == 0 || height == 0 {
        return Some(0);
    }
    width.checked_mul(bpp)?.checked_add(1)?.checked_mul(height)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filter {
    None,
    Sub,
    Up,
    Average,
    Paeth,
    /// Average with no row above.
    AverageFirst,
    /// Paeth with no row above; reduces to Sub.
    PaethFirst,
}

impl Filter {
    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(Filter::None),
            1 => Ok(Filter::Sub),
            2 => Ok(Filter::Up),
            3 => Ok(Filter::Average),
            4 => Ok(Filter::Paeth),
            _ => Err(Error::corrupt(format!("invalid PNG filter type {b}"))),
        }
    }

    /// Variant used on the first row, where the row above is all zero.
    fn for_first_row(self) -> Self {
        match self {
            Filter::Up => Filter::None,
            Filter::Average => Filter::AverageFirst,
            Filter::Paeth => Filter::PaethFirst,
            f => f,
        }
    }
}

/// Paeth predictor; ties go to left, then above, then upper-left.
#[inline]
fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
    let a = a as i16;
    let b = b as i16;
    let c = c as i16;

    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        a as u8
    } else if pb <= pc {
        b as u8
    } else {
        c as u8
    }
}

fn unfilter_row(filter: Filter, cur: &mut [u8], raw: &[u8], prior: &[u8], bpp: usize) {
    let len = cur.len();
    match filter {
        Filter::None => cur.copy_from_slice(raw),
        Filter::Sub | Filter::PaethFirst => {
            cur[..bpp].copy_from_slice(&raw[..bpp]);
            for i in bpp..len {
                cur[i] = raw[i].wrapping_add(cur[i - bpp]);
            }
        }
        Filter::Up => {
            for i in 0..len {
                cur[i] = raw[i].wrapping_add(prior[i]);
            }
        }
        Filter::Average => {
            for i in 0..bpp {
                cur[i] = raw[i].wrapping_add(prior[i] >> 1);
            }
            for i in bpp..len {
                let avg = ((cur[i - bpp] as u16 + prior[i] as u16) >> 1) as u8;
                cur[i] = raw[i].wrapping_add(avg);
            }
        }
        Filter::AverageFirst => {
            cur[..bpp].copy_from_slice(&raw[..bpp]);
            for i in bpp..len {
                cur[i] = raw[i].wrapping_add(cur[i - bpp] >> 1);
            }
        }
        Filter::Paeth => {
            for i in 0..bpp {
                cur[i] = raw[i].wrapping_add(prior[i]);
            }
            for i in bpp..len {
                let pred = paeth_predictor(cur[i - bpp], prior[i], prior[i - bpp]);
                cur[i] = raw[i].wrapping_add(pred);
            }
        }
    }
}

/// Reverse scanline filtering of a `width x height` sub-image.
fn unfilter(raw: &[u8], width: usize, height: usize, bpp: usize) -> Result<Vec<u8>> {
    let stride = width * bpp;
    let mut out = try_zeroed(stride * height)?;
    for y in 0..height {
        let line = &raw[y * (stride + 1)..(y + 1) * (stride + 1)];
        let mut filter = Filter::from_byte(line[0])?;
        let (done, rest) = out.split_at_mut(y * stride);
        let cur = &mut rest[..stride];
        let prior: &[u8] = if y == 0 {
            filter = filter.for_first_row();
            &[]
        } else {
            &done[(y - 1) * stride..]
        };
        unfilter_row(filter, cur, &line[1..], prior, bpp);
    }
    Ok(out)
}

fn deinterlace(raw: &[u8], width: usize, height: usize, bpp: usize) -> Result<Vec<u8>> {
    let stride = width * bpp;
    let mut out = try_zeroed(stride * height)?;
    let mut offset = 0;
    for (p, &pass) in ADAM7.iter().enumerate() {
        let (pw, ph) = pass_size(width, height, pass);
        if pw == 0 || ph == 0 {
            continue;
        }
        let len = (pw * bpp + 1) * ph;
        let sub = unfilter(&raw[offset..offset + len], pw, ph, bpp)?;
        let (x0, y0, dx, dy) = pass;
        for j in 0..ph {
            for i in 0..pw {
                let dst = (y0 + j * dy) * stride + (x0 + i * dx) * bpp;
                let src = (j * pw + i) * bpp;
                out[dst..dst + bpp].copy_from_slice(&sub[src..src + bpp]);
            }
        }
        tracing::trace!(pass = p + 1, pw, ph, "Adam7 pass");
        offset += len;
    }
    Ok(out)
}

fn expand_palette(indices: &[u8], palette: &[[u8; 4]], with_alpha: bool) -> Result<Vec<u8>> {
    let bpp = if with_alpha { 4 } else { 3 };
    let len = indices.len().checked_mul(bpp).ok_or(Error::OutOfMemory {
        requested: usize::MAX,
    })?;
    let mut out = try_zeroed(len)?;
    for (&idx, px) in indices.iter().zip(out.chunks_exact_mut(bpp)) {
        let entry = palette
            .get(idx as usize)
            .ok_or_else(|| Error::corrupt(format!("palette index {idx} out of range")))?;
        px.copy_from_slice(&entry[..bpp]);
    }
    Ok(out)
}

/// Append an alpha channel that is 0 where the color matches `key`.
fn apply_color_key(samples: &[u8], bpp: usize, key: [u8; 3]) -> Result<Vec<u8>> {
    let len = (samples.len() / bpp)
        .checked_mul(bpp + 1)
        .ok_or(Error::OutOfMemory {
            requested: usize::MAX,
        })?;
    let mut out = try_zeroed(len)?;
    for (src, dst) in samples.chunks_exact(bpp).zip(out.chunks_exact_mut(bpp + 1)) {
        dst[..bpp].copy_from_slice(src);
        dst[bpp] = if src == &key[..bpp] { 0 } else { 255 };
    }
    Ok(out)
}
