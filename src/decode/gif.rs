//! GIF87a / GIF89a decoder (first frame).
//!
//! The frame is composited onto a transparent logical-screen canvas.
//! Animation and disposal are not applied.

use super::{check_dimensions, lzw, DecodeOptions, Frame, Header};
use crate::color::ColorType;
use crate::error::{buffer_len, try_zeroed, Error, Result};
use crate::source::ByteSource;

const IMAGE_DESCRIPTOR: u8 = 0x2C;
const EXTENSION: u8 = 0x21;
const TRAILER: u8 = 0x3B;
const GRAPHIC_CONTROL: u8 = 0xF9;

/// Interlaced row passes as (first row, step).
const PASSES: [(usize, usize); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];

pub(super) fn test(src: &mut ByteSource<'_>) -> bool {
    let mut sig = [0u8; 6];
    src.read_exact(&mut sig) && matches!(&sig, b"GIF87a" | b"GIF89a")
}

pub(super) fn probe(src: &mut ByteSource<'_>) -> Result<Header> {
    let screen = read_screen(src)?;
    Ok(Header {
        width: screen.width,
        height: screen.height,
        color_type: ColorType::Rgba,
    })
}

pub(super) fn decode(src: &mut ByteSource<'_>, options: &DecodeOptions) -> Result<Frame> {
    let screen = read_screen(src)?;
    check_dimensions(screen.width, screen.height, options.max_dimension)?;
    let global = if screen.flags & 0x80 != 0 {
        Some(read_color_table(src, screen.flags)?)
    } else {
        None
    };

    let mut canvas = try_zeroed(buffer_len(screen.width, screen.height, 4)?)?;
    let mut transparent: Option<u8> = None;

    loop {
        let tag = src.get8();
        if src.overran() {
            return Err(Error::corrupt("GIF ended before an image descriptor"));
        }
        match tag {
            IMAGE_DESCRIPTOR => {
                read_image(src, &screen, global.as_deref(), transparent, &mut canvas)?;
                return Ok(Frame {
                    width: screen.width,
                    height: screen.height,
                    color_type: ColorType::Rgba,
                    pixels: canvas,
                });
            }
            EXTENSION => {
                let label = src.get8();
                if label == GRAPHIC_CONTROL {
                    let len = src.get8() as usize;
                    if len == 4 {
                        let flags = src.get8();
                        let _delay = src.get16le();
                        let index = src.get8();
                        transparent = (flags & 1 != 0).then_some(index);
                        tracing::debug!(disposal = (flags >> 2) & 7, ?transparent, "GIF graphic control");
                    } else {
                        src.skip(len);
                    }
                }
                skip_sub_blocks(src);
            }
            TRAILER => return Err(Error::corrupt("GIF contains no image")),
            other => {
                return Err(Error::corrupt(format!("unknown GIF block {other:#04x}")));
            }
        }
    }
}

#[derive(Debug)]
struct Screen {
    width: u32,
    height: u32,
    flags: u8,
}

fn read_screen(src: &mut ByteSource<'_>) -> Result<Screen> {
    let mut sig = [0u8; 6];
    src.read_exact(&mut sig);
    if !matches!(&sig, b"GIF87a" | b"GIF89a") {
        return Err(Error::corrupt("not a GIF file"));
    }
    let width = u32::from(src.get16le());
    let height = u32::from(src.get16le());
    let flags = src.get8();
    let _background = src.get8();
    let _aspect = src.get8();
    if src.overran() {
        return Err(Error::corrupt("truncated GIF header"));
    }
    tracing::debug!(width, height, flags, "GIF logical screen");
    Ok(Screen {
        width,
        height,
        flags,
    })
}

fn read_color_table(src: &mut ByteSource<'_>, flags: u8) -> Result<Vec<[u8; 3]>> {
    let entries = 2usize << (flags & 7);
    let mut table = Vec::with_capacity(entries);
    for _ in 0..entries {
        table.push([src.get8(), src.get8(), src.get8()]);
    }
    if src.overran() {
        return Err(Error::corrupt("truncated GIF color table"));
    }
    Ok(table)
}

fn skip_sub_blocks(src: &mut ByteSource<'_>) {
    loop {
        let len = src.get8() as usize;
        if len == 0 || src.overran() {
            return;
        }
        src.skip(len);
    }
}

fn read_image(
    src: &mut ByteSource<'_>,
    screen: &Screen,
    global: Option<&[[u8; 3]]>,
    transparent: Option<u8>,
    canvas: &mut [u8],
) -> Result<()> {
    let left = u32::from(src.get16le());
    let top = u32::from(src.get16le());
    let width = u32::from(src.get16le());
    let height = u32::from(src.get16le());
    let flags = src.get8();
    if left + width > screen.width || top + height > screen.height {
        return Err(Error::corrupt(format!(
            "GIF image {width}x{height}+{left}+{top} exceeds the logical screen"
        )));
    }

    let local = if flags & 0x80 != 0 {
        Some(read_color_table(src, flags)?)
    } else {
        None
    };
    let palette = local
        .as_deref()
        .or(global)
        .ok_or_else(|| Error::corrupt("GIF image has no color table"))?;

    let min_code_size = src.get8();
    if src.overran() {
        return Err(Error::corrupt("truncated GIF image descriptor"));
    }

    let mut raster = Raster {
        left: left as usize,
        top: top as usize,
        width: width as usize,
        height: height as usize,
        stride: screen.width as usize * 4,
        x: 0,
        y: 0,
        pass: 0,
        interlaced: flags & 0x40 != 0,
        done: width == 0 || height == 0,
    };

    let mut blocks = SubBlocks::new(src);
    lzw::decode(&mut blocks, min_code_size, |index| {
        if raster.done {
            return Ok(());
        }
        let rgb = palette
            .get(index as usize)
            .ok_or_else(|| Error::corrupt(format!("GIF color index {index} out of range")))?;
        if transparent != Some(index) {
            let at = raster.offset();
            canvas[at..at + 3].copy_from_slice(rgb);
            canvas[at + 3] = 255;
        }
        raster.advance();
        Ok(())
    })?;

    blocks.drain();
    if src.overran() {
        return Err(Error::corrupt("truncated GIF image data"));
    }
    if !raster.done {
        tracing::debug!(row = raster.y, "GIF image data ended early");
    }
    Ok(())
}

/// Byte iterator over a chain of length-prefixed data sub-blocks, ending at
/// the zero-length terminator.
struct SubBlocks<'s, 'a> {
    src: &'s mut ByteSource<'a>,
    remaining: usize,
    finished: bool,
}

impl<'s, 'a> SubBlocks<'s, 'a> {
    fn new(src: &'s mut ByteSource<'a>) -> Self {
        Self {
            src,
            remaining: 0,
            finished: false,
        }
    }

    /// Consume the rest of the chain, including the terminator.
    fn drain(self) {
        if !self.finished {
            self.src.skip(self.remaining);
            skip_sub_blocks(self.src);
        }
    }
}

impl Iterator for SubBlocks<'_, '_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        if self.finished {
            return None;
        }
        if self.remaining == 0 {
            self.remaining = self.src.get8() as usize;
            if self.remaining == 0 || self.src.overran() {
                self.finished = true;
                return None;
            }
        }
        self.remaining -= 1;
        let b = self.src.get8();
        if self.src.overran() {
            self.finished = true;
            return None;
        }
        Some(b)
    }
}

/// Write cursor inside the image descriptor's rectangle.
#[derive(Debug)]
struct Raster {
    left: usize,
    top: usize,
    width: usize,
    height: usize,
    stride: usize,
    x: usize,
    y: usize,
    pass: usize,
    interlaced: bool,
    done: bool,
}

impl Raster {
    #[inline]
    fn offset(&self) -> usize {
        (self.top + self.y) * self.stride + (self.left + self.x) * 4
    }

    fn advance(&mut self) {
        self.x += 1;
        if self.x < self.width {
            return;
        }
        self.x = 0;
        if !self.interlaced {
            self.y += 1;
            self.done = self.y >= self.height;
            return;
        }
        self.y += PASSES[self.pass].1;
        while self.y >= self.height {
            self.pass += 1;
            if self.pass == PASSES.len() {
                self.done = true;
                return;
            }
            self.y = PASSES[self.pass].0;
        }
    }
}
