//! Variable-width LZW decompression as used by GIF.
//!
//! Codes are packed LSB-first. The dictionary holds at most 4096 entries;
//! once full it stops growing until the next clear code.

use crate::error::{Error, Result};

const MAX_CODES: usize = 4096;
const MAX_CODE_SIZE: u32 = 12;
const NO_PREFIX: u16 = u16::MAX;

#[derive(Debug, Clone, Copy)]
struct Entry {
    prefix: u16,
    first: u8,
    suffix: u8,
}

/// Decode one LZW stream from `bytes`, calling `emit` for every output
/// symbol. Returns when the end-of-information code is read or `bytes`
/// runs dry.
pub(crate) fn decode<I, F>(bytes: I, min_code_size: u8, mut emit: F) -> Result<()>
where
    I: IntoIterator<Item = u8>,
    F: FnMut(u8) -> Result<()>,
{
    let min_code_size = u32::from(min_code_size);
    if !(1..MAX_CODE_SIZE).contains(&min_code_size) {
        return Err(Error::corrupt(format!(
            "invalid LZW minimum code size {min_code_size}"
        )));
    }

    let clear = 1usize << min_code_size;
    let end = clear + 1;

    let mut table = vec![
        Entry {
            prefix: NO_PREFIX,
            first: 0,
            suffix: 0,
        };
        MAX_CODES
    ];
    for (code, entry) in table.iter_mut().enumerate().take(clear) {
        entry.first = code as u8;
        entry.suffix = code as u8;
    }

    let mut code_size = min_code_size + 1;
    let mut avail = clear + 2;
    let mut old: Option<usize> = None;
    let mut stack: Vec<u8> = Vec::with_capacity(MAX_CODES);

    let mut bits = 0u32;
    let mut valid = 0u32;
    let mut bytes = bytes.into_iter();

    loop {
        while valid < code_size {
            let Some(b) = bytes.next() else {
                tracing::trace!("LZW data ended without an end code");
                return Ok(());
            };
            bits |= u32::from(b) << valid;
            valid += 8;
        }
        let code = (bits & ((1 << code_size) - 1)) as usize;
        bits >>= code_size;
        valid -= code_size;

        if code == clear {
            code_size = min_code_size + 1;
            avail = clear + 2;
            old = None;
            continue;
        }
        if code == end {
            return Ok(());
        }
        if code > avail {
            return Err(Error::corrupt(format!("LZW code {code} beyond dictionary size {avail}")));
        }

        match old {
            Some(prev) if avail < MAX_CODES => {
                let first = table[prev].first;
                // `code == avail` refers to the entry being defined right now.
                let suffix = if code == avail { first } else { table[code].first };
                table[avail] = Entry {
                    prefix: prev as u16,
                    first,
                    suffix,
                };
                avail += 1;
                if avail == 1 << code_size && code_size < MAX_CODE_SIZE {
                    code_size += 1;
                }
            }
            None if code == avail => {
                return Err(Error::corrupt("LZW code references an undefined entry"));
            }
            Some(_) if code == avail => {
                return Err(Error::corrupt("LZW code past a full dictionary"));
            }
            _ => {}
        }

        // Walk the prefix chain back to its root, then emit forwards.
        stack.clear();
        let mut c = code;
        loop {
            let entry = table[c];
            stack.push(entry.suffix);
            if entry.prefix == NO_PREFIX {
                break;
            }
            c = entry.prefix as usize;
        }
        for &b in stack.iter().rev() {
            emit(b)?;
        }

        old = Some(code);
    }
}
