//! Baseline JPEG decoder (ITU-T T.81, sequential Huffman DCT).
//!
//! Markers are processed in stream order. Each scan decodes 8x8 blocks into
//! per-component sample planes padded to whole MCUs; once `EOI` is reached
//! the planes are upsampled to full resolution and converted to RGB.

use super::idct::idct_block;
use super::upsample::Resampler;
use super::{check_dimensions, DecodeOptions, Frame, Header};
use crate::color::{ycbcr_to_rgb, ColorType};
use crate::error::{buffer_len, try_zeroed, Error, Result};
use crate::source::ByteSource;

const SOF0: u8 = 0xC0;
const SOF1: u8 = 0xC1;
const SOF2: u8 = 0xC2;
const DHT: u8 = 0xC4;
const RST0: u8 = 0xD0;
const RST7: u8 = 0xD7;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const DQT: u8 = 0xDB;
const DNL: u8 = 0xDC;
const DRI: u8 = 0xDD;
const APP0: u8 = 0xE0;
const APP14: u8 = 0xEE;
const APP15: u8 = 0xEF;
const COM: u8 = 0xFE;

/// Zig-zag position -> natural (row-major) coefficient index.
const ZIGZAG: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27,
    20, 13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58,
    59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

const FAST_BITS: u32 = 9;
const NO_FAST: u8 = 255;

pub(super) fn test(src: &mut ByteSource<'_>) -> bool {
    src.get8() == 0xFF && src.get8() == SOI
}

pub(super) fn probe(src: &mut ByteSource<'_>) -> Result<Header> {
    let mut decoder = JpegDecoder::new(src);
    decoder.read_header(None)?;
    Ok(Header {
        width: decoder.width,
        height: decoder.height,
        color_type: decoder.color_type(),
    })
}

pub(super) fn decode(src: &mut ByteSource<'_>, options: &DecodeOptions) -> Result<Frame> {
    let mut decoder = JpegDecoder::new(src);
    decoder.read_header(Some(options.max_dimension))?;

    let mut marker = decoder.reader.next_marker();
    loop {
        match marker {
            Some(EOI) => break,
            Some(SOS) => {
                let order = decoder.read_scan_header()?;
                decoder.decode_scan(&order)?;
                if decoder.reader.src.overran() {
                    return Err(Error::corrupt("truncated JPEG scan data"));
                }
                decoder.scans += 1;
                if decoder.reader.marker.is_none() {
                    decoder.reader.marker = decoder.reader.skip_to_marker();
                }
            }
            Some(DNL) => {
                let len = decoder.get16();
                let lines = decoder.get16();
                if len != 4 {
                    return Err(Error::corrupt("bad DNL length"));
                }
                if u32::from(lines) != decoder.height {
                    return Err(Error::corrupt("DNL height disagrees with frame header"));
                }
            }
            other => decoder.process_marker(other)?,
        }
        marker = decoder.reader.next_marker();
    }

    if decoder.scans == 0 {
        return Err(Error::corrupt("no scan data before EOI"));
    }
    decoder.finish()
}

/// Canonical Huffman table in the JPEG (MSB-first) bit order.
struct Huffman {
    /// Symbol index for each 9-bit prefix, or `NO_FAST`.
    fast: [u8; 1 << FAST_BITS],
    code: [u16; 256],
    values: [u8; 256],
    size: [u8; 257],
    /// Left-aligned 16-bit bound of codes of each length.
    maxcode: [u32; 18],
    /// Offset from code value to symbol index, per length.
    delta: [i32; 17],
    count: usize,
}

impl Huffman {
    fn build(counts: &[u8; 16], values: &[u8]) -> Result<Box<Huffman>> {
        let mut h = Box::new(Huffman {
            fast: [NO_FAST; 1 << FAST_BITS],
            code: [0; 256],
            values: [0; 256],
            size: [0; 257],
            maxcode: [0; 18],
            delta: [0; 17],
            count: 0,
        });

        let mut k = 0usize;
        for (i, &n) in counts.iter().enumerate() {
            for _ in 0..n {
                if k >= 256 {
                    return Err(Error::corrupt("too many Huffman codes"));
                }
                h.size[k] = (i + 1) as u8;
                k += 1;
            }
        }
        h.size[k] = 0;
        h.count = k;
        h.values[..k].copy_from_slice(&values[..k]);

        let mut code = 0u32;
        let mut k = 0usize;
        for j in 1..=16usize {
            h.delta[j] = k as i32 - code as i32;
            if h.size[k] as usize == j {
                while h.size[k] as usize == j {
                    h.code[k] = code as u16;
                    code += 1;
                    k += 1;
                }
                if code - 1 >= 1 << j {
                    return Err(Error::corrupt("bad Huffman code lengths"));
                }
            }
            h.maxcode[j] = code << (16 - j);
            code <<= 1;
        }
        h.maxcode[17] = u32::MAX;

        for i in 0..h.count {
            let s = h.size[i] as u32;
            if s <= FAST_BITS {
                let c = (h.code[i] as usize) << (FAST_BITS - s);
                let m = 1usize << (FAST_BITS - s);
                h.fast[c..c + m].fill(i as u8);
            }
        }
        Ok(h)
    }
}

/// Marker-aware MSB-first bit reader over entropy-coded segments.
struct EntropyReader<'s, 'a> {
    src: &'s mut ByteSource<'a>,
    code_buffer: u32,
    code_bits: u32,
    /// Set once a marker interrupts the segment; further bits read as 0.
    nomore: bool,
    /// A marker consumed by the bit reader or marker scan, not yet handled.
    marker: Option<u8>,
}

impl<'s, 'a> EntropyReader<'s, 'a> {
    fn grow(&mut self) {
        loop {
            let b = if self.nomore { 0 } else { self.src.get8() };
            if b == 0xFF {
                let mut c = self.src.get8();
                while c == 0xFF {
                    c = self.src.get8();
                }
                if c != 0 {
                    self.marker = Some(c);
                    self.nomore = true;
                    return;
                }
            }
            self.code_buffer |= (b as u32) << (24 - self.code_bits);
            self.code_bits += 8;
            if self.code_bits > 24 {
                break;
            }
        }
    }

    fn reset(&mut self) {
        self.code_buffer = 0;
        self.code_bits = 0;
        self.nomore = false;
        self.marker = None;
    }

    fn decode(&mut self, h: &Huffman) -> Result<u8> {
        if self.code_bits < 16 {
            self.grow();
        }

        let c = (self.code_buffer >> (32 - FAST_BITS)) as usize;
        let k = h.fast[c];
        if k != NO_FAST {
            let s = h.size[k as usize] as u32;
            if s > self.code_bits {
                return Err(Error::corrupt("bad Huffman code"));
            }
            self.code_buffer <<= s;
            self.code_bits -= s;
            return Ok(h.values[k as usize]);
        }

        let temp = self.code_buffer >> 16;
        let mut len = FAST_BITS as usize + 1;
        while temp >= h.maxcode[len] {
            len += 1;
        }
        if len == 17 || len as u32 > self.code_bits {
            self.code_bits = 0;
            return Err(Error::corrupt("bad Huffman code"));
        }
        let idx = (self.code_buffer >> (32 - len)) as i32 + h.delta[len];
        if idx < 0 || idx as usize >= h.count {
            return Err(Error::corrupt("bad Huffman code"));
        }
        self.code_buffer <<= len;
        self.code_bits -= len as u32;
        Ok(h.values[idx as usize])
    }

    /// Read `n` magnitude bits and sign-extend them per T.81 F.2.2.1.
    fn extend_receive(&mut self, n: u32) -> Result<i32> {
        if self.code_bits < n {
            self.grow();
        }
        if self.code_bits < n {
            return Err(Error::corrupt("entropy-coded segment ended mid-coefficient"));
        }
        let v = (self.code_buffer >> (32 - n)) as i32;
        self.code_buffer = self.code_buffer.checked_shl(n).unwrap_or(0);
        self.code_bits -= n;
        Ok(if v < 1 << (n - 1) { v - (1 << n) + 1 } else { v })
    }

    fn next_marker(&mut self) -> Option<u8> {
        if let Some(m) = self.marker.take() {
            return Some(m);
        }
        let mut x = self.src.get8();
        if x != 0xFF {
            return None;
        }
        while x == 0xFF {
            x = self.src.get8();
        }
        Some(x)
    }

    /// Skip junk between the end of a scan and the next marker.
    fn skip_to_marker(&mut self) -> Option<u8> {
        while !self.src.at_eof() {
            let mut x = self.src.get8();
            while x == 0xFF {
                if self.src.at_eof() {
                    return None;
                }
                x = self.src.get8();
                if x != 0x00 && x != 0xFF {
                    return Some(x);
                }
            }
        }
        None
    }
}

#[derive(Debug)]
struct Component {
    id: u8,
    h: usize,
    v: usize,
    tq: usize,
    hd: usize,
    ha: usize,
    dc_pred: i32,
    /// Sample extent of this component.
    x: usize,
    y: usize,
    /// Plane stride (whole MCUs).
    w2: usize,
    plane: Vec<u8>,
}

struct JpegDecoder<'s, 'a> {
    reader: EntropyReader<'s, 'a>,
    dc_tables: [Option<Box<Huffman>>; 4],
    ac_tables: [Option<Box<Huffman>>; 4],
    /// Dequantization tables in natural order.
    quant: [Option<[u16; 64]>; 4],
    components: Vec<Component>,
    width: u32,
    height: u32,
    h_max: usize,
    v_max: usize,
    mcus_x: usize,
    mcus_y: usize,
    restart_interval: u32,
    todo: u32,
    jfif: bool,
    adobe_transform: Option<u8>,
    rgb_ids: bool,
    scans: usize,
}

impl<'s, 'a> JpegDecoder<'s, 'a> {
    fn new(src: &'s mut ByteSource<'a>) -> Self {
        Self {
            reader: EntropyReader {
                src,
                code_buffer: 0,
                code_bits: 0,
                nomore: false,
                marker: None,
            },
            dc_tables: Default::default(),
            ac_tables: Default::default(),
            quant: [None; 4],
            components: Vec::new(),
            width: 0,
            height: 0,
            h_max: 1,
            v_max: 1,
            mcus_x: 0,
            mcus_y: 0,
            restart_interval: 0,
            todo: u32::MAX,
            jfif: false,
            adobe_transform: None,
            rgb_ids: false,
            scans: 0,
        }
    }

    fn get8(&mut self) -> u8 {
        self.reader.src.get8()
    }

    fn get16(&mut self) -> u16 {
        self.reader.src.get16be()
    }

    fn color_type(&self) -> ColorType {
        if self.components.len() == 1 {
            ColorType::Gray
        } else {
            ColorType::Rgb
        }
    }

    /// Parse up to and including the frame header. With `max_dimension`
    /// set, validate it and allocate the sample planes.
    fn read_header(&mut self, max_dimension: Option<u32>) -> Result<()> {
        if self.reader.next_marker() != Some(SOI) {
            return Err(Error::corrupt("missing SOI marker"));
        }
        let mut marker = self.reader.next_marker();
        loop {
            match marker {
                Some(SOF0 | SOF1) => break,
                Some(SOF2) => return Err(Error::unsupported("progressive JPEG")),
                Some(m @ (0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF)) => {
                    return Err(Error::unsupported(format!(
                        "JPEG frame type SOF{}",
                        m - SOF0
                    )))
                }
                _ => {}
            }
            self.process_marker(marker)?;
            marker = self.reader.next_marker();
            while marker.is_none() {
                if self.reader.src.at_eof() {
                    return Err(Error::corrupt("no SOF marker"));
                }
                marker = self.reader.next_marker();
            }
        }
        self.read_frame_header(max_dimension)
    }

    fn process_marker(&mut self, marker: Option<u8>) -> Result<()> {
        let Some(marker) = marker else {
            return Err(Error::corrupt("expected marker"));
        };
        tracing::trace!(marker = format_args!("{marker:#04x}"), "JPEG marker");
        match marker {
            DRI => {
                if self.get16() != 4 {
                    return Err(Error::corrupt("bad DRI length"));
                }
                self.restart_interval = u32::from(self.get16());
            }
            DQT => {
                let mut left = i32::from(self.get16()) - 2;
                while left > 0 {
                    let q = self.get8();
                    let precision = q >> 4;
                    let t = (q & 15) as usize;
                    if precision > 1 {
                        return Err(Error::corrupt("bad DQT precision"));
                    }
                    if t > 3 {
                        return Err(Error::corrupt("bad DQT table id"));
                    }
                    let mut table = [0u16; 64];
                    for &pos in &ZIGZAG {
                        table[pos] = if precision == 1 {
                            self.get16()
                        } else {
                            u16::from(self.get8())
                        };
                    }
                    self.quant[t] = Some(table);
                    left -= if precision == 1 { 129 } else { 65 };
                }
                if left != 0 {
                    return Err(Error::corrupt("bad DQT length"));
                }
            }
            DHT => {
                let mut left = i32::from(self.get16()) - 2;
                while left > 0 {
                    let q = self.get8();
                    let class = q >> 4;
                    let id = (q & 15) as usize;
                    if class > 1 || id > 3 {
                        return Err(Error::corrupt("bad DHT header"));
                    }
                    let mut counts = [0u8; 16];
                    self.reader.src.read_exact(&mut counts);
                    let n: usize = counts.iter().map(|&c| c as usize).sum();
                    if n > 256 {
                        return Err(Error::corrupt("bad DHT symbol count"));
                    }
                    let mut values = [0u8; 256];
                    self.reader.src.read_exact(&mut values[..n]);
                    let table = Huffman::build(&counts, &values[..n])?;
                    if class == 0 {
                        self.dc_tables[id] = Some(table);
                    } else {
                        self.ac_tables[id] = Some(table);
                    }
                    left -= 17 + n as i32;
                }
                if left != 0 {
                    return Err(Error::corrupt("bad DHT length"));
                }
            }
            m if (APP0..=APP15).contains(&m) || m == COM => {
                let len = self.get16() as usize;
                if len < 2 {
                    return Err(Error::corrupt("bad segment length"));
                }
                let mut left = len - 2;
                if m == APP0 && left >= 5 {
                    let mut tag = [0u8; 5];
                    self.reader.src.read_exact(&mut tag);
                    self.jfif |= &tag == b"JFIF\0";
                    left -= 5;
                } else if m == APP14 && left >= 12 {
                    let mut tag = [0u8; 6];
                    self.reader.src.read_exact(&mut tag);
                    left -= 6;
                    if &tag == b"Adobe\0" {
                        self.reader.src.skip(5);
                        self.adobe_transform = Some(self.get8());
                        left -= 6;
                    }
                }
                self.reader.src.skip(left);
            }
            m => {
                return Err(Error::corrupt(format!("unknown JPEG marker {m:#04x}")));
            }
        }
        Ok(())
    }

    fn read_frame_header(&mut self, max_dimension: Option<u32>) -> Result<()> {
        let len = self.get16() as usize;
        if len < 11 {
            return Err(Error::corrupt("bad SOF length"));
        }
        let precision = self.get8();
        if precision != 8 {
            return Err(Error::unsupported(format!("{precision}-bit JPEG samples")));
        }
        self.height = u32::from(self.get16());
        self.width = u32::from(self.get16());
        if self.height == 0 {
            return Err(Error::corrupt("JPEG height not given in frame header"));
        }
        if self.width == 0 {
            return Err(Error::corrupt("zero JPEG width"));
        }
        let n = self.get8() as usize;
        match n {
            1 | 3 => {}
            4 => return Err(Error::unsupported("four-component JPEG")),
            _ => return Err(Error::corrupt(format!("bad JPEG component count {n}"))),
        }
        if len != 8 + 3 * n {
            return Err(Error::corrupt("bad SOF length"));
        }

        let mut rgb = 0;
        self.components.clear();
        for i in 0..n {
            let id = self.get8();
            if n == 3 && id == b"RGB"[i] {
                rgb += 1;
            }
            let hv = self.get8();
            let h = (hv >> 4) as usize;
            let v = (hv & 15) as usize;
            if !(1..=4).contains(&h) || !(1..=4).contains(&v) {
                return Err(Error::corrupt("bad JPEG sampling factor"));
            }
            let tq = self.get8() as usize;
            if tq > 3 {
                return Err(Error::corrupt("bad JPEG quantization table id"));
            }
            self.components.push(Component {
                id,
                h,
                v,
                tq,
                hd: 0,
                ha: 0,
                dc_pred: 0,
                x: 0,
                y: 0,
                w2: 0,
                plane: Vec::new(),
            });
        }
        self.rgb_ids = rgb == 3;
        if self.reader.src.overran() {
            return Err(Error::corrupt("truncated JPEG frame header"));
        }
        tracing::debug!(
            width = self.width,
            height = self.height,
            components = n,
            "JPEG frame header"
        );

        let Some(max) = max_dimension else {
            return Ok(());
        };
        check_dimensions(self.width, self.height, max)?;

        self.h_max = self.components.iter().map(|c| c.h).max().unwrap_or(1);
        self.v_max = self.components.iter().map(|c| c.v).max().unwrap_or(1);
        let (h_max, v_max) = (self.h_max, self.v_max);
        if self
            .components
            .iter()
            .any(|c| h_max % c.h != 0 || v_max % c.v != 0)
        {
            return Err(Error::corrupt("non-integral JPEG sampling ratio"));
        }

        let (w, h) = (self.width as usize, self.height as usize);
        self.mcus_x = w.div_ceil(h_max * 8);
        self.mcus_y = h.div_ceil(v_max * 8);
        for c in &mut self.components {
            c.x = (w * c.h).div_ceil(h_max);
            c.y = (h * c.v).div_ceil(v_max);
            c.w2 = self.mcus_x * c.h * 8;
            let h2 = self.mcus_y * c.v * 8;
            let len = c.w2.checked_mul(h2).ok_or(Error::OutOfMemory {
                requested: usize::MAX,
            })?;
            c.plane = try_zeroed(len)?;
        }
        Ok(())
    }

    fn read_scan_header(&mut self) -> Result<Vec<usize>> {
        let len = self.get16() as usize;
        let ns = self.get8() as usize;
        if ns == 0 || ns > 4 || ns > self.components.len() {
            return Err(Error::corrupt("bad SOS component count"));
        }
        if len != 6 + 2 * ns {
            return Err(Error::corrupt("bad SOS length"));
        }

        let mut order = Vec::with_capacity(ns);
        for _ in 0..ns {
            let id = self.get8();
            let tables = self.get8();
            let idx = self
                .components
                .iter()
                .position(|c| c.id == id)
                .ok_or_else(|| Error::corrupt("SOS references unknown component"))?;
            let (hd, ha) = ((tables >> 4) as usize, (tables & 15) as usize);
            if hd > 3 || ha > 3 {
                return Err(Error::corrupt("bad SOS table selector"));
            }
            let comp = &mut self.components[idx];
            comp.hd = hd;
            comp.ha = ha;
            order.push(idx);
        }

        let spec_start = self.get8();
        let _spec_end = self.get8();
        let approx = self.get8();
        if spec_start != 0 || approx != 0 {
            return Err(Error::corrupt("bad spectral selection for a sequential scan"));
        }

        for &idx in &order {
            let c = &self.components[idx];
            if self.dc_tables[c.hd].is_none() || self.ac_tables[c.ha].is_none() {
                return Err(Error::corrupt("scan uses an undefined Huffman table"));
            }
            if self.quant[c.tq].is_none() {
                return Err(Error::corrupt("scan uses an undefined quantization table"));
            }
        }
        tracing::trace!(components = ns, "JPEG scan");
        Ok(order)
    }

    fn reset(&mut self) {
        self.reader.reset();
        for c in &mut self.components {
            c.dc_pred = 0;
        }
        self.todo = if self.restart_interval > 0 {
            self.restart_interval
        } else {
            u32::MAX
        };
    }

    /// Count down the restart interval. Returns `false` when the interval
    /// ran out and the next marker is not a restart, which ends the scan.
    fn after_mcu(&mut self) -> bool {
        self.todo = self.todo.saturating_sub(1);
        if self.todo > 0 {
            return true;
        }
        if self.reader.code_bits < 24 {
            self.reader.grow();
        }
        match self.reader.marker {
            Some(m) if (RST0..=RST7).contains(&m) => {
                self.reset();
                true
            }
            _ => false,
        }
    }

    fn decode_scan(&mut self, order: &[usize]) -> Result<()> {
        self.reset();
        let mut block = [0i16; 64];

        if let [ci] = *order {
            // Non-interleaved: blocks cover only the component's own extent.
            let (bw, bh) = {
                let c = &self.components[ci];
                (c.x.div_ceil(8), c.y.div_ceil(8))
            };
            for by in 0..bh {
                for bx in 0..bw {
                    self.decode_block(&mut block, ci)?;
                    let c = &mut self.components[ci];
                    let stride = c.w2;
                    idct_block(&block, &mut c.plane[by * 8 * stride + bx * 8..], stride);
                    if !self.after_mcu() {
                        return Ok(());
                    }
                }
            }
            return Ok(());
        }

        for my in 0..self.mcus_y {
            for mx in 0..self.mcus_x {
                for &ci in order {
                    let (h, v) = (self.components[ci].h, self.components[ci].v);
                    for y in 0..v {
                        for x in 0..h {
                            self.decode_block(&mut block, ci)?;
                            let c = &mut self.components[ci];
                            let stride = c.w2;
                            let x2 = (mx * h + x) * 8;
                            let y2 = (my * v + y) * 8;
                            idct_block(&block, &mut c.plane[y2 * stride + x2..], stride);
                        }
                    }
                }
                if !self.after_mcu() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn decode_block(&mut self, data: &mut [i16; 64], ci: usize) -> Result<()> {
        let comp = &self.components[ci];
        let (Some(dc), Some(ac), Some(quant)) = (
            self.dc_tables[comp.hd].as_deref(),
            self.ac_tables[comp.ha].as_deref(),
            self.quant[comp.tq].as_ref(),
        ) else {
            return Err(Error::corrupt("missing JPEG table"));
        };

        let t = self.reader.decode(dc)?;
        if t > 15 {
            return Err(Error::corrupt("bad DC magnitude category"));
        }
        data.fill(0);
        let diff = if t == 0 {
            0
        } else {
            self.reader.extend_receive(u32::from(t))?
        };
        let pred = &mut self.components[ci].dc_pred;
        *pred = pred.wrapping_add(diff);
        data[0] = pred.wrapping_mul(i32::from(quant[0])) as i16;

        let mut k = 1usize;
        while k < 64 {
            let rs = self.reader.decode(ac)?;
            let s = u32::from(rs & 15);
            let r = (rs >> 4) as usize;
            if s == 0 {
                if rs != 0xF0 {
                    break; // end of block
                }
                k += 16;
                continue;
            }
            k += r;
            if k > 63 {
                return Err(Error::corrupt("AC coefficient run past end of block"));
            }
            let zig = ZIGZAG[k];
            k += 1;
            let coeff = self.reader.extend_receive(s)?;
            data[zig] = coeff.wrapping_mul(i32::from(quant[zig])) as i16;
        }
        Ok(())
    }

    fn finish(self) -> Result<Frame> {
        struct RowState {
            resampler: Resampler,
            vs: usize,
            ystep: usize,
            ypos: usize,
            line0: usize,
            line1: usize,
            w_lores: usize,
            buf: Vec<u8>,
        }

        let w = self.width as usize;
        let n = self.components.len();
        let color_type = self.color_type();
        let mut out = try_zeroed(buffer_len(self.width, self.height, n)?)?;

        let mut states = Vec::with_capacity(n);
        for c in &self.components {
            let hs = self.h_max / c.h;
            let vs = self.v_max / c.v;
            let w_lores = w.div_ceil(hs);
            states.push(RowState {
                resampler: Resampler::for_factors(hs, vs),
                vs,
                ystep: vs >> 1,
                ypos: 0,
                line0: 0,
                line1: 0,
                w_lores,
                buf: try_zeroed(w_lores * hs + 3)?,
            });
        }

        let is_rgb = n == 3 && (self.rgb_ids || (self.adobe_transform == Some(0) && !self.jfif));
        tracing::debug!(is_rgb, "JPEG color conversion");

        for row in out.chunks_exact_mut(w * n) {
            for (c, r) in self.components.iter().zip(states.iter_mut()) {
                let y_bot = r.ystep >= (r.vs >> 1);
                let (near, far) = if y_bot {
                    (r.line1, r.line0)
                } else {
                    (r.line0, r.line1)
                };
                r.resampler
                    .row(&mut r.buf, &c.plane[near..], &c.plane[far..], r.w_lores);
                r.ystep += 1;
                if r.ystep >= r.vs {
                    r.ystep = 0;
                    r.line0 = r.line1;
                    r.ypos += 1;
                    if r.ypos < c.y {
                        r.line1 += c.w2;
                    }
                }
            }

            if n == 1 {
                row.copy_from_slice(&states[0].buf[..w]);
                continue;
            }
            let (y, cb, cr) = (&states[0].buf, &states[1].buf, &states[2].buf);
            for (i, px) in row.chunks_exact_mut(3).enumerate() {
                if is_rgb {
                    px.copy_from_slice(&[y[i], cb[i], cr[i]]);
                } else {
                    px.copy_from_slice(&ycbcr_to_rgb(y[i], cb[i], cr[i]));
                }
            }
        }

        Ok(Frame {
            width: self.width,
            height: self.height,
            color_type,
            pixels: out,
        })
    }
}
