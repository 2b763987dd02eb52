//! Adler-32 checksum (zlib stream trailer, RFC 1950).

const MOD_ADLER: u32 = 65521;
/// Largest block for which the 32-bit sums cannot overflow before reduction.
const NMAX: usize = 5552;

/// Compute the Adler-32 checksum of `data`.
pub fn adler32(data: &[u8]) -> u32 {
    let mut a: u32 = 1;
    let mut b: u32 = 0;
    for block in data.chunks(NMAX) {
        for &byte in block {
            a += byte as u32;
            b += a;
        }
        a %= MOD_ADLER;
        b %= MOD_ADLER;
    }
    (b << 16) | a
}
