//! Buffered byte input shared by every decoder.
//!
//! A [`ByteSource`] reads either from an in-memory slice or from a
//! caller-supplied [`PullSource`] through a small refill buffer. Reads past
//! the end of the data never fail: they yield `0` bytes and set a sticky
//! overrun flag that decoders consult in their own consistency checks.

use std::io::{self, Read, Seek, SeekFrom};

/// Size of the refill buffer used for pull sources. Format signature tests
/// read far less than this, so rewinding to the first buffered region is
/// always possible during sniffing.
const REFILL_SIZE: usize = 128;

/// A pull-style data source.
pub trait PullSource {
    /// Fill as much of `buf` as possible and return the number of bytes
    /// written. Returning 0 signals end of data.
    fn fill(&mut self, buf: &mut [u8]) -> usize;

    /// Skip `n` bytes without returning them.
    fn skip(&mut self, n: u64);

    /// Whether the source has no more data.
    fn at_end(&mut self) -> bool;
}

/// [`PullSource`] adaptor over any seekable reader (files, cursors).
///
/// I/O errors are reported through `tracing` and treated as end of data.
#[derive(Debug)]
pub struct ReaderSource<R> {
    inner: R,
    eof: bool,
}

impl<R: Read + Seek> ReaderSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, eof: false }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> PullSource for ReaderSource<R> {
    fn fill(&mut self, buf: &mut [u8]) -> usize {
        if self.eof {
            return 0;
        }
        loop {
            match self.inner.read(buf) {
                Ok(0) => {
                    self.eof = true;
                    return 0;
                }
                Ok(n) => return n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "read failed, treating as end of data");
                    self.eof = true;
                    return 0;
                }
            }
        }
    }

    fn skip(&mut self, n: u64) {
        let Ok(offset) = i64::try_from(n) else {
            self.eof = true;
            return;
        };
        if let Err(e) = self.inner.seek(SeekFrom::Current(offset)) {
            tracing::warn!(error = %e, "seek failed, treating as end of data");
            self.eof = true;
        }
    }

    fn at_end(&mut self) -> bool {
        self.eof
    }
}

enum Backing<'a> {
    Memory(&'a [u8]),
    Pull {
        source: &'a mut dyn PullSource,
        buffer: Box<[u8; REFILL_SIZE]>,
        // Bytes of the stream preceding `buffer[0]`.
        base: u64,
        exhausted: bool,
        // Whether `buffer` still holds the first region of the stream.
        pristine: bool,
        initial_end: usize,
    },
}

/// Buffered reader over memory or a [`PullSource`].
pub struct ByteSource<'a> {
    backing: Backing<'a>,
    pos: usize,
    end: usize,
    overrun: bool,
}

impl<'a> ByteSource<'a> {
    /// Read from an in-memory slice.
    pub fn from_memory(data: &'a [u8]) -> Self {
        Self {
            backing: Backing::Memory(data),
            pos: 0,
            end: data.len(),
            overrun: false,
        }
    }

    /// Read by pulling from `source`.
    pub fn from_pull(source: &'a mut dyn PullSource) -> Self {
        let mut src = Self {
            backing: Backing::Pull {
                source,
                buffer: Box::new([0u8; REFILL_SIZE]),
                base: 0,
                exhausted: false,
                pristine: true,
                initial_end: 0,
            },
            pos: 0,
            end: 0,
            overrun: false,
        };
        src.prime();
        src
    }

    // Fill the first buffer completely (or up to end of data) so that every
    // signature test can be rewound.
    fn prime(&mut self) {
        if let Backing::Pull {
            source,
            buffer,
            exhausted,
            initial_end,
            ..
        } = &mut self.backing
        {
            let mut filled = 0;
            while filled < REFILL_SIZE {
                let n = source.fill(&mut buffer[filled..]);
                if n == 0 {
                    *exhausted = true;
                    break;
                }
                filled += n;
            }
            *initial_end = filled;
            self.end = filled;
        }
    }

    fn refill(&mut self) -> bool {
        match &mut self.backing {
            Backing::Memory(_) => false,
            Backing::Pull {
                source,
                buffer,
                base,
                exhausted,
                pristine,
                ..
            } => {
                if *exhausted {
                    return false;
                }
                *base += self.end as u64;
                *pristine = false;
                let n = source.fill(&mut buffer[..]);
                self.pos = 0;
                self.end = n;
                if n == 0 {
                    *exhausted = true;
                    return false;
                }
                true
            }
        }
    }

    /// Reset the cursor to the start of the stream.
    ///
    /// For pull sources this is only valid while the first buffered region
    /// has not been replaced, which holds for format sniffing.
    pub fn rewind(&mut self) {
        match &mut self.backing {
            Backing::Memory(data) => {
                self.end = data.len();
            }
            Backing::Pull {
                pristine,
                initial_end,
                ..
            } => {
                debug_assert!(*pristine, "rewind after the first refill");
                self.end = *initial_end;
            }
        }
        self.pos = 0;
        self.overrun = false;
    }

    /// Read one byte, or `0` past the end of data.
    #[inline]
    pub fn get8(&mut self) -> u8 {
        if self.pos < self.end {
            let b = self.byte_at(self.pos);
            self.pos += 1;
            return b;
        }
        if self.refill() {
            let b = self.byte_at(0);
            self.pos = 1;
            return b;
        }
        self.overrun = true;
        0
    }

    #[inline]
    fn byte_at(&self, idx: usize) -> u8 {
        match &self.backing {
            Backing::Memory(data) => data[idx],
            Backing::Pull { buffer, .. } => buffer[idx],
        }
    }

    pub fn get16be(&mut self) -> u16 {
        let hi = self.get8() as u16;
        (hi << 8) | self.get8() as u16
    }

    pub fn get32be(&mut self) -> u32 {
        let hi = self.get16be() as u32;
        (hi << 16) | self.get16be() as u32
    }

    pub fn get16le(&mut self) -> u16 {
        let lo = self.get8() as u16;
        lo | ((self.get8() as u16) << 8)
    }

    pub fn get32le(&mut self) -> u32 {
        let lo = self.get16le() as u32;
        lo | ((self.get16le() as u32) << 16)
    }

    /// Fill `out` from the stream. Returns `false` (and sets the overrun
    /// flag) when the data ends first; the unread tail of `out` is zeroed.
    pub fn read_exact(&mut self, out: &mut [u8]) -> bool {
        let mut written = 0;
        while written < out.len() {
            if self.pos == self.end && !self.refill() {
                out[written..].fill(0);
                self.overrun = true;
                return false;
            }
            let take = (self.end - self.pos).min(out.len() - written);
            match &self.backing {
                Backing::Memory(data) => {
                    out[written..written + take].copy_from_slice(&data[self.pos..self.pos + take])
                }
                Backing::Pull { buffer, .. } => {
                    out[written..written + take].copy_from_slice(&buffer[self.pos..self.pos + take])
                }
            }
            self.pos += take;
            written += take;
        }
        true
    }

    /// Skip `n` bytes. Pull sources seek past whatever is not buffered.
    pub fn skip(&mut self, n: usize) {
        let buffered = self.end - self.pos;
        if n <= buffered {
            self.pos += n;
            return;
        }
        let rest = n - buffered;
        self.pos = self.end;
        match &mut self.backing {
            Backing::Memory(_) => self.overrun = true,
            Backing::Pull {
                source,
                base,
                exhausted,
                pristine,
                ..
            } => {
                if *exhausted {
                    self.overrun = true;
                    return;
                }
                *base += self.end as u64 + rest as u64;
                *pristine = false;
                self.pos = 0;
                self.end = 0;
                source.skip(rest as u64);
            }
        }
    }

    /// Whether no more bytes are available.
    pub fn at_eof(&mut self) -> bool {
        if self.pos < self.end {
            return false;
        }
        match &mut self.backing {
            Backing::Memory(_) => true,
            Backing::Pull {
                source, exhausted, ..
            } => {
                if *exhausted || source.at_end() {
                    return true;
                }
                !self.refill()
            }
        }
    }

    /// Whether a read has gone past the end of the data.
    #[inline]
    pub fn overran(&self) -> bool {
        self.overrun
    }

    /// Number of bytes consumed since the start of the stream.
    pub fn offset(&self) -> u64 {
        match &self.backing {
            Backing::Memory(_) => self.pos as u64,
            Backing::Pull { base, .. } => base + self.pos as u64,
        }
    }
}

impl std::fmt::Debug for ByteSource<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.backing {
            Backing::Memory(_) => "memory",
            Backing::Pull { .. } => "pull",
        };
        f.debug_struct("ByteSource")
            .field("kind", &kind)
            .field("offset", &self.offset())
            .field("overrun", &self.overrun)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Pull source that hands out at most `chunk` bytes per fill.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
        skips: usize,
    }

    impl PullSource for Trickle {
        fn fill(&mut self, buf: &mut [u8]) -> usize {
            let n = buf.len().min(self.chunk).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            n
        }

        fn skip(&mut self, n: u64) {
            self.skips += 1;
            self.pos = (self.pos + n as usize).min(self.data.len());
        }

        fn at_end(&mut self) -> bool {
            self.pos >= self.data.len()
        }
    }

    #[test]
    fn memory_reads_integers_in_both_orders() {
        let data = [0x12, 0x34, 0x56, 0x78];
        let mut src = ByteSource::from_memory(&data);
        assert_eq!(src.get16be(), 0x1234);
        assert_eq!(src.get16le(), 0x7856);
        src.rewind();
        assert_eq!(src.get32be(), 0x1234_5678);
        src.rewind();
        assert_eq!(src.get32le(), 0x7856_3412);
        assert!(!src.overran());
    }

    #[test]
    fn reads_past_end_yield_zero_forever() {
        let mut src = ByteSource::from_memory(&[7]);
        assert_eq!(src.get8(), 7);
        assert!(src.at_eof());
        for _ in 0..10 {
            assert_eq!(src.get8(), 0);
        }
        assert!(src.overran());
    }

    #[test]
    fn read_exact_reports_short_data() {
        let mut src = ByteSource::from_memory(&[1, 2, 3]);
        let mut out = [9u8; 5];
        assert!(!src.read_exact(&mut out));
        assert_eq!(out, [1, 2, 3, 0, 0]);
        assert!(src.overran());
    }

    #[test]
    fn pull_source_refills_across_buffer_boundary() {
        let data: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
        let mut trickle = Trickle {
            data: data.clone(),
            pos: 0,
            chunk: 7,
            skips: 0,
        };
        let mut src = ByteSource::from_pull(&mut trickle);
        let mut out = vec![0u8; 300];
        assert!(src.read_exact(&mut out));
        assert_eq!(out, data);
        assert_eq!(src.offset(), 300);
        assert!(src.at_eof());
    }

    #[test]
    fn pull_source_rewinds_within_initial_region() {
        let data: Vec<u8> = (0..200u32).map(|i| i as u8).collect();
        let mut trickle = Trickle {
            data,
            pos: 0,
            chunk: 3,
            skips: 0,
        };
        let mut src = ByteSource::from_pull(&mut trickle);
        for i in 0..32u8 {
            assert_eq!(src.get8(), i);
        }
        src.rewind();
        assert_eq!(src.get8(), 0);
        assert_eq!(src.offset(), 1);
    }

    #[test]
    fn pull_skip_seeks_instead_of_reading() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let mut trickle = Trickle {
            data: data.clone(),
            pos: 0,
            chunk: 1000,
            skips: 0,
        };
        {
            let mut src = ByteSource::from_pull(&mut trickle);
            src.skip(500);
            assert_eq!(src.offset(), 500);
            assert_eq!(src.get8(), data[500]);
            assert_eq!(src.offset(), 501);
        }
        assert_eq!(trickle.skips, 1);
    }

    #[test]
    fn skip_past_end_sets_overrun() {
        let mut src = ByteSource::from_memory(&[1, 2]);
        src.skip(5);
        assert!(src.overran());
        assert_eq!(src.get8(), 0);
    }

    #[test]
    fn reader_source_over_cursor() {
        let mut reader = ReaderSource::new(Cursor::new(vec![0xAB, 0xCD, 0xEF]));
        let mut src = ByteSource::from_pull(&mut reader);
        assert_eq!(src.get16be(), 0xABCD);
        assert_eq!(src.get8(), 0xEF);
        assert!(src.at_eof());
        assert_eq!(src.get8(), 0);
        assert!(src.overran());
    }
}
