//! DEFLATE (RFC 1951) + zlib (RFC 1950) decoder.
//!
//! - Handles stored, fixed Huffman, and dynamic Huffman blocks.
//! - Huffman tables decode codes of up to 9 bits with one table lookup and
//!   fall back to a canonical-range search on bit-reversed input for longer
//!   codes.
//! - Output grows by capacity doubling and allocation failure surfaces as
//!   [`Error::OutOfMemory`].
//! - The zlib Adler-32 trailer is only checked when asked for.

use std::sync::OnceLock;

use crate::compress::adler32::adler32;
use crate::error::{Error, Result};

const MAX_CODE_BITS: usize = 15;
const FAST_BITS: usize = 9;
const FAST_MASK: u64 = (1 << FAST_BITS) - 1;
const MAX_DISTANCE: usize = 32 * 1024;
const INITIAL_CAPACITY: usize = 16 * 1024;

// Length and distance tables from RFC 1951.
const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

// Order for code-length codes in dynamic Huffman blocks.
const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Inflate a zlib-wrapped DEFLATE stream.
///
/// The 2-byte header is validated (method 8, FCHECK, no preset dictionary).
/// `size_hint` pre-sizes the output buffer. When `verify_adler` is set the
/// trailing Adler-32 must be present and match the output.
pub fn inflate_zlib(data: &[u8], size_hint: Option<usize>, verify_adler: bool) -> Result<Vec<u8>> {
    if data.len() < 2 {
        return Err(Error::corrupt("zlib stream too short"));
    }

    let cmf = data[0];
    let flg = data[1];
    if (u16::from(cmf) * 256 + u16::from(flg)) % 31 != 0 {
        return Err(Error::corrupt("zlib FCHECK failed"));
    }
    if (cmf & 0x0F) != 8 {
        return Err(Error::corrupt(
            "unsupported compression method (expect DEFLATE)",
        ));
    }
    if (flg & 0b0010_0000) != 0 {
        return Err(Error::unsupported("zlib preset dictionary"));
    }

    let mut out = Vec::new();
    reserve_doubling(&mut out, size_hint.unwrap_or(0))?;
    let consumed = inflate_into(&data[2..], &mut out)?;

    if verify_adler {
        let trailer = &data[2 + consumed..];
        if trailer.len() < 4 {
            return Err(Error::corrupt("zlib stream missing Adler-32 trailer"));
        }
        let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let actual = adler32(&out);
        if actual != expected {
            return Err(Error::corrupt(format!(
                "Adler-32 mismatch: expected {expected:#010x}, got {actual:#010x}"
            )));
        }
    }

    Ok(out)
}

/// Inflate a raw DEFLATE stream (no zlib wrapper).
pub fn inflate_raw(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    inflate_into(data, &mut out)?;
    Ok(out)
}

/// Decode blocks until the final one, returning the number of input bytes
/// consumed (rounded up to a whole byte).
fn inflate_into(input: &[u8], out: &mut Vec<u8>) -> Result<usize> {
    let mut br = BitReader::new(input);
    loop {
        let bfinal = br.read_bits(1)? != 0;
        let btype = br.read_bits(2)?;
        tracing::trace!(btype, bfinal, "deflate block");
        match btype {
            0 => inflate_stored(&mut br, out)?,
            1 => inflate_compressed(&mut br, out, fixed_tables())?,
            2 => {
                let tables = Tables::dynamic(&mut br)?;
                inflate_compressed(&mut br, out, &tables)?;
            }
            _ => return Err(Error::corrupt("reserved BTYPE encountered")),
        }
        if bfinal {
            break;
        }
    }
    Ok(br.consumed.div_ceil(8))
}

/// Grow `out` so `extra` more bytes fit, doubling capacity rather than
/// growing to the exact size.
fn reserve_doubling(out: &mut Vec<u8>, extra: usize) -> Result<()> {
    let needed = out
        .len()
        .checked_add(extra)
        .ok_or(Error::OutOfMemory {
            requested: usize::MAX,
        })?;
    if needed <= out.capacity() {
        return Ok(());
    }
    let mut cap = out.capacity().max(INITIAL_CAPACITY);
    while cap < needed {
        cap = cap.checked_mul(2).ok_or(Error::OutOfMemory { requested: needed })?;
    }
    out.try_reserve_exact(cap - out.len())
        .map_err(|_| Error::OutOfMemory { requested: cap })
}

fn inflate_stored(br: &mut BitReader<'_>, out: &mut Vec<u8>) -> Result<()> {
    br.align_byte()?;
    let len = br.read_bits(16)? as u16;
    let nlen = br.read_bits(16)? as u16;
    if len != !nlen {
        return Err(Error::corrupt("stored block LEN/NLEN mismatch"));
    }
    let start = br.byte_position();
    let end = start + len as usize;
    if end > br.data.len() {
        return Err(Error::corrupt("stored block overruns input"));
    }
    reserve_doubling(out, len as usize)?;
    out.extend_from_slice(&br.data[start..end]);
    br.seek_byte(end);
    Ok(())
}

fn inflate_compressed(br: &mut BitReader<'_>, out: &mut Vec<u8>, tables: &Tables) -> Result<()> {
    loop {
        let sym = tables.litlen.decode(br)?;
        match sym {
            0..=255 => {
                reserve_doubling(out, 1)?;
                out.push(sym as u8);
            }
            256 => break,
            257..=285 => {
                let len_idx = (sym - 257) as usize;
                let length =
                    LENGTH_BASE[len_idx] as usize + br.read_bits(LENGTH_EXTRA[len_idx])? as usize;

                let dist_sym = tables.dist.decode(br)? as usize;
                if dist_sym >= 30 {
                    return Err(Error::corrupt("distance symbol out of range"));
                }
                let distance =
                    DIST_BASE[dist_sym] as usize + br.read_bits(DIST_EXTRA[dist_sym])? as usize;

                if distance > out.len() {
                    return Err(Error::corrupt(format!(
                        "back-reference distance {distance} exceeds output length {}",
                        out.len()
                    )));
                }
                if distance > MAX_DISTANCE {
                    return Err(Error::corrupt("distance exceeds 32 KiB window"));
                }

                reserve_doubling(out, length)?;
                let start = out.len() - distance;
                if distance >= length {
                    out.extend_from_within(start..start + length);
                } else {
                    // Overlapping copy repeats the most recent `distance` bytes.
                    for i in 0..length {
                        let b = out[start + i];
                        out.push(b);
                    }
                }
            }
            _ => return Err(Error::corrupt("invalid literal/length symbol")),
        }
    }
    Ok(())
}

/// LSB-first bit reader. Peeks past the end of input see zero bits, but
/// consuming them is an error.
struct BitReader<'a> {
    data: &'a [u8],
    bit_buf: u64,
    bits_in_buf: u32,
    byte_pos: usize,
    consumed: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_buf: 0,
            bits_in_buf: 0,
            byte_pos: 0,
            consumed: 0,
        }
    }

    #[inline]
    fn fill(&mut self) {
        while self.bits_in_buf <= 56 {
            let byte = self.data.get(self.byte_pos).copied().unwrap_or(0);
            self.byte_pos += 1;
            self.bit_buf |= (byte as u64) << self.bits_in_buf;
            self.bits_in_buf += 8;
        }
    }

    #[inline]
    fn peek(&mut self, bits: u32) -> u64 {
        if self.bits_in_buf < bits {
            self.fill();
        }
        self.bit_buf
    }

    #[inline]
    fn consume(&mut self, bits: u32) -> Result<()> {
        self.bit_buf >>= bits;
        self.bits_in_buf -= bits;
        self.consumed += bits as usize;
        if self.consumed > self.data.len() * 8 {
            return Err(Error::corrupt("unexpected end of deflate stream"));
        }
        Ok(())
    }

    fn read_bits(&mut self, bits: u8) -> Result<u32> {
        if bits == 0 {
            return Ok(0);
        }
        let bits = bits as u32;
        let val = (self.peek(bits) & ((1u64 << bits) - 1)) as u32;
        self.consume(bits)?;
        Ok(val)
    }

    fn align_byte(&mut self) -> Result<()> {
        let drop_bits = (8 - (self.consumed % 8) as u32) % 8;
        if drop_bits > 0 {
            self.peek(drop_bits);
            self.consume(drop_bits)?;
        }
        Ok(())
    }

    fn byte_position(&self) -> usize {
        self.consumed / 8
    }

    fn seek_byte(&mut self, pos: usize) {
        self.bit_buf = 0;
        self.bits_in_buf = 0;
        self.byte_pos = pos;
        self.consumed = pos * 8;
    }
}

struct Tables {
    litlen: Huffman,
    dist: Huffman,
}

fn fixed_tables() -> &'static Tables {
    static FIXED: OnceLock<Tables> = OnceLock::new();
    FIXED.get_or_init(|| {
        let mut lengths = [0u8; 288];
        lengths[..144].fill(8);
        lengths[144..256].fill(9);
        lengths[256..280].fill(7);
        lengths[280..].fill(8);
        Tables {
            litlen: Huffman::from_lengths(&lengths).unwrap_or_else(|_| Huffman::empty()),
            dist: Huffman::from_lengths(&[5u8; 30]).unwrap_or_else(|_| Huffman::empty()),
        }
    })
}

impl Tables {
    fn dynamic(br: &mut BitReader<'_>) -> Result<Tables> {
        let hlit = br.read_bits(5)? as usize + 257;
        let hdist = br.read_bits(5)? as usize + 1;
        let hclen = br.read_bits(4)? as usize + 4;
        if hlit > 286 {
            return Err(Error::corrupt("too many literal/length codes"));
        }

        let mut code_len_lengths = [0u8; 19];
        for &idx in CODE_LENGTH_ORDER.iter().take(hclen) {
            code_len_lengths[idx] = br.read_bits(3)? as u8;
        }
        let code_len_huff = Huffman::from_lengths(&code_len_lengths)?;

        let total = hlit + hdist;
        let mut lengths: Vec<u8> = Vec::with_capacity(total + 138);
        while lengths.len() < total {
            let sym = code_len_huff.decode(br)?;
            match sym {
                0..=15 => lengths.push(sym as u8),
                16 => {
                    let Some(&last) = lengths.last() else {
                        return Err(Error::corrupt("repeat with no previous length"));
                    };
                    let repeat = 3 + br.read_bits(2)? as usize;
                    lengths.extend(std::iter::repeat(last).take(repeat));
                }
                17 => {
                    let repeat = 3 + br.read_bits(3)? as usize;
                    lengths.extend(std::iter::repeat(0u8).take(repeat));
                }
                18 => {
                    let repeat = 11 + br.read_bits(7)? as usize;
                    lengths.extend(std::iter::repeat(0u8).take(repeat));
                }
                _ => return Err(Error::corrupt("invalid code length symbol")),
            }
        }
        if lengths.len() != total {
            return Err(Error::corrupt("code lengths overrun"));
        }

        let (litlen_lengths, dist_lengths) = lengths.split_at(hlit);
        if litlen_lengths[256] == 0 {
            return Err(Error::corrupt("missing end-of-block code"));
        }

        Ok(Tables {
            litlen: Huffman::from_lengths(litlen_lengths)?,
            dist: Huffman::from_lengths(dist_lengths)?,
        })
    }
}

/// Canonical Huffman decoding table.
struct Huffman {
    /// Indexed by the next `FAST_BITS` input bits; `(len << 9) | symbol`, 0 = slow path.
    fast: [u16; 1 << FAST_BITS],
    counts: [u16; MAX_CODE_BITS + 1],
    first_code: [u16; MAX_CODE_BITS + 1],
    first_symbol: [u16; MAX_CODE_BITS + 1],
    /// First 16-bit left-aligned code that is *not* of each length.
    max_code: [u32; MAX_CODE_BITS + 2],
    symbols: Vec<u16>,
}

impl Huffman {
    fn empty() -> Self {
        Self {
            fast: [0; 1 << FAST_BITS],
            counts: [0; MAX_CODE_BITS + 1],
            first_code: [0; MAX_CODE_BITS + 1],
            first_symbol: [0; MAX_CODE_BITS + 1],
            max_code: [0; MAX_CODE_BITS + 2],
            symbols: Vec::new(),
        }
    }

    fn from_lengths(lengths: &[u8]) -> Result<Self> {
        let mut table = Self::empty();
        for &len in lengths {
            if len as usize > MAX_CODE_BITS {
                return Err(Error::corrupt("code length exceeds 15"));
            }
            if len > 0 {
                table.counts[len as usize] += 1;
            }
        }

        // Canonical codes: lengths in increasing order, consecutive values.
        let mut next_code = [0u16; MAX_CODE_BITS + 1];
        let mut code = 0u32;
        let mut symbol_base = 0u16;
        for bits in 1..=MAX_CODE_BITS {
            code = (code + table.counts[bits - 1] as u32) << 1;
            if table.counts[bits] > 0 && code + table.counts[bits] as u32 > (1 << bits) {
                return Err(Error::corrupt("over-subscribed Huffman code lengths"));
            }
            table.first_code[bits] = code as u16;
            next_code[bits] = code as u16;
            table.first_symbol[bits] = symbol_base;
            symbol_base += table.counts[bits];
            table.max_code[bits] = (code + table.counts[bits] as u32) << (16 - bits);
        }
        table.max_code[MAX_CODE_BITS + 1] = u32::MAX;

        table.symbols = vec![0u16; symbol_base as usize];
        for (symbol, &len) in lengths.iter().enumerate() {
            let len = len as usize;
            if len == 0 {
                continue;
            }
            let code = next_code[len];
            next_code[len] += 1;
            let idx = table.first_symbol[len] + (code - table.first_code[len]);
            table.symbols[idx as usize] = symbol as u16;

            if len <= FAST_BITS {
                let entry = ((len as u16) << 9) | symbol as u16;
                let mut j = reverse_bits(code, len as u32) as usize;
                while j < (1 << FAST_BITS) {
                    table.fast[j] = entry;
                    j += 1 << len;
                }
            }
        }

        Ok(table)
    }

    #[inline]
    fn decode(&self, br: &mut BitReader<'_>) -> Result<u16> {
        let peek = br.peek(16);
        let entry = self.fast[(peek & FAST_MASK) as usize];
        if entry != 0 {
            br.consume(u32::from(entry >> 9))?;
            return Ok(entry & 0x1FF);
        }
        self.decode_slow(br, peek)
    }

    fn decode_slow(&self, br: &mut BitReader<'_>, peek: u64) -> Result<u16> {
        let k = reverse_bits((peek & 0xFFFF) as u16, 16) as u32;
        let mut len = FAST_BITS + 1;
        while k >= self.max_code[len] {
            len += 1;
        }
        if len > MAX_CODE_BITS {
            return Err(Error::corrupt("invalid Huffman code"));
        }
        let code = k >> (16 - len);
        let first = self.first_code[len] as u32;
        if code < first || code - first >= self.counts[len] as u32 {
            return Err(Error::corrupt("invalid Huffman code"));
        }
        let idx = self.first_symbol[len] as usize + (code - first) as usize;
        br.consume(len as u32)?;
        Ok(self.symbols[idx])
    }
}

#[inline]
fn reverse_bits(code: u16, len: u32) -> u16 {
    code.reverse_bits() >> (16 - len)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimal stored-block zlib stream for the given payload (< 64 KiB).
    fn stored_zlib(payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0x78, 0x01, 0x01];
        let len = payload.len() as u16;
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&(!len).to_le_bytes());
        out.extend_from_slice(payload);
        out.extend_from_slice(&adler32(payload).to_be_bytes());
        out
    }

    #[test]
    fn stored_block_roundtrip() {
        let data = b"hello world, hello PNG";
        let decoded = inflate_zlib(&stored_zlib(data), None, true).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn fixed_huffman_literal_stream() {
        // zlib.compress(b"a") at level 9
        let stream = [0x78, 0xDA, 0x4B, 0x04, 0x00, 0x00, 0x62, 0x00, 0x62];
        assert_eq!(inflate_zlib(&stream, None, true).unwrap(), b"a");
    }

    fn flate2_zlib(data: &[u8], level: u32) -> Vec<u8> {
        use std::io::Write;
        let mut enc =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::new(level));
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn back_references_and_overlap() {
        let data = b"abcabcabcabcabcabcaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".repeat(20);
        let stream = flate2_zlib(&data, 6);
        assert_eq!(inflate_zlib(&stream, None, true).unwrap(), data);
    }

    #[test]
    fn dynamic_blocks_match_flate2() {
        use rand::{rngs::StdRng, Rng, SeedableRng};
        let mut rng = StdRng::seed_from_u64(7);
        // Skewed alphabet so the encoder picks dynamic tables with long codes.
        let data: Vec<u8> = (0..200_000)
            .map(|i| {
                if rng.gen_ratio(1, 50) {
                    rng.gen()
                } else {
                    (i % 7) as u8 + b'a'
                }
            })
            .collect();
        for level in [1, 6, 9] {
            let stream = flate2_zlib(&data, level);
            let out = inflate_zlib(&stream, Some(data.len()), true).unwrap();
            assert_eq!(out, data, "level {level}");
        }
    }

    #[test]
    fn stored_level_zero_matches() {
        let data: Vec<u8> = (0..100_000u32).map(|i| (i * 31 % 251) as u8).collect();
        let stream = flate2_zlib(&data, 0);
        assert_eq!(inflate_zlib(&stream, None, true).unwrap(), data);
    }

    #[test]
    fn detects_bad_adler_only_when_verifying() {
        let mut stream = stored_zlib(b"hello");
        let len = stream.len();
        stream[len - 1] ^= 0xFF;
        assert!(matches!(
            inflate_zlib(&stream, None, true),
            Err(Error::CorruptStream(_))
        ));
        assert_eq!(inflate_zlib(&stream, None, false).unwrap(), b"hello");
    }

    #[test]
    fn rejects_bad_header_check() {
        let err = inflate_zlib(&[0x78, 0x9D, 0x03, 0x00], None, false).unwrap_err();
        assert!(matches!(err, Error::CorruptStream(_)));
    }

    #[test]
    fn rejects_preset_dictionary() {
        // CMF=0x78, FLG with FDICT set and a valid FCHECK.
        let flg = (0..=255u8)
            .find(|f| f & 0x20 != 0 && (0x78u16 * 256 + *f as u16) % 31 == 0)
            .unwrap();
        let err = inflate_zlib(&[0x78, flg, 0, 0, 0, 0], None, false).unwrap_err();
        assert!(matches!(err, Error::UnsupportedVariant(_)));
    }

    #[test]
    fn rejects_reserved_block_type() {
        // BFINAL=1, BTYPE=11
        let err = inflate_raw(&[0b0000_0111]).unwrap_err();
        assert!(matches!(err, Error::CorruptStream(_)));
    }

    #[test]
    fn rejects_distance_before_start() {
        // Fixed block: length symbol 257 (len 3) first, with nothing emitted yet.
        // BFINAL=1, BTYPE=01, then 7-bit code 0000001 for symbol 257, then
        // 5-bit distance code 00000 (distance 1).
        let mut bits: Vec<u8> = vec![1, 1, 0];
        bits.extend_from_slice(&[0, 0, 0, 0, 0, 0, 1]);
        bits.extend_from_slice(&[0, 0, 0, 0, 0]);
        let mut bytes = vec![0u8; bits.len().div_ceil(8)];
        for (i, b) in bits.iter().enumerate() {
            bytes[i / 8] |= b << (i % 8);
        }
        let err = inflate_raw(&bytes).unwrap_err();
        assert!(matches!(err, Error::CorruptStream(_)));
    }

    #[test]
    fn truncated_stream_is_corrupt() {
        let stream = flate2_zlib(&b"truncate me please, truncate me".repeat(40), 9);
        let err = inflate_zlib(&stream[..stream.len() / 2], None, false).unwrap_err();
        assert!(matches!(err, Error::CorruptStream(_)));
    }

    #[test]
    fn huffman_rejects_oversubscribed_lengths() {
        assert!(Huffman::from_lengths(&[1, 1, 1]).is_err());
    }

    #[test]
    fn huffman_long_codes_use_slow_path() {
        // One code per length 1..=14 plus two of length 15: a complete code
        // where the longest entries exceed the fast table.
        let mut lengths: Vec<u8> = (1..=15).collect();
        lengths.push(15);
        let table = Huffman::from_lengths(&lengths).unwrap();
        // Symbol 15 (second length-15 code) is the all-ones code.
        let data = [0xFF, 0xFF];
        let mut br = BitReader::new(&data);
        assert_eq!(table.decode(&mut br).unwrap(), 15);
        assert_eq!(br.consumed, 15);
    }

    #[test]
    fn reserve_doubles_capacity() {
        let mut out = Vec::new();
        reserve_doubling(&mut out, 1).unwrap();
        assert!(out.capacity() >= INITIAL_CAPACITY);
        out.resize(INITIAL_CAPACITY, 0);
        reserve_doubling(&mut out, 1).unwrap();
        assert!(out.capacity() >= INITIAL_CAPACITY * 2);
    }
}
