//! Separable 8x8 inverse DCT in 12-bit fixed point (the jpeg-6b "islow"
//! factorization).
//!
//! Columns are transformed first and kept at 2 extra bits of precision; the
//! row pass removes the remaining scale, adds the +128 level shift and
//! clamps to `0..=255`.

// Rotation constants, `(x * 4096 + 0.5)` truncated toward zero.
const C0_541: i64 = 2217;
const C1_847_NEG: i64 = -7567;
const C0_765: i64 = 3135;
const C1_175: i64 = 4816;
const C0_298: i64 = 1223;
const C2_053: i64 = 8410;
const C3_072: i64 = 12586;
const C1_501: i64 = 6149;
const C0_899_NEG: i64 = -3685;
const C2_562_NEG: i64 = -10497;
const C1_961_NEG: i64 = -8034;
const C0_390_NEG: i64 = -1597;

/// One 1-D pass. Returns the even-part sums `x0..x3` and odd-part terms
/// `t0..t3`; output `i` is `x[i] + t[3-i]` and output `7-i` is
/// `x[i] - t[3-i]`.
#[inline]
fn idct_1d(s: [i64; 8]) -> ([i64; 4], [i64; 4]) {
    let p1 = (s[2] + s[6]) * C0_541;
    let t2 = p1 + s[6] * C1_847_NEG;
    let t3 = p1 + s[2] * C0_765;
    let t0 = (s[0] + s[4]) << 12;
    let t1 = (s[0] - s[4]) << 12;
    let x = [t0 + t3, t1 + t2, t1 - t2, t0 - t3];

    let (mut t0, mut t1, mut t2, mut t3) = (s[7], s[5], s[3], s[1]);
    let p3 = t0 + t2;
    let p4 = t1 + t3;
    let p1 = t0 + t3;
    let p2 = t1 + t2;
    let p5 = (p3 + p4) * C1_175;
    t0 *= C0_298;
    t1 *= C2_053;
    t2 *= C3_072;
    t3 *= C1_501;
    let p1 = p5 + p1 * C0_899_NEG;
    let p2 = p5 + p2 * C2_562_NEG;
    let p3 = p3 * C1_961_NEG;
    let p4 = p4 * C0_390_NEG;
    t3 += p1 + p4;
    t2 += p2 + p3;
    t1 += p2 + p4;
    t0 += p1 + p3;

    (x, [t0, t1, t2, t3])
}

/// Transform dequantized natural-order coefficients and write the 8x8
/// samples to `out`, whose rows are `stride` bytes apart.
pub(crate) fn idct_block(coeffs: &[i16; 64], out: &mut [u8], stride: usize) {
    let mut v = [0i64; 64];

    for col in 0..8 {
        let c = |row: usize| coeffs[row * 8 + col] as i64;
        if (1..8).all(|row| coeffs[row * 8 + col] == 0) {
            // DC-only column; the row pass expects 2 extra bits of scale.
            let dc = c(0) << 2;
            for row in 0..8 {
                v[row * 8 + col] = dc;
            }
            continue;
        }
        let (mut x, t) = idct_1d([c(0), c(1), c(2), c(3), c(4), c(5), c(6), c(7)]);
        for xi in &mut x {
            *xi += 512;
        }
        for i in 0..4 {
            v[i * 8 + col] = (x[i] + t[3 - i]) >> 10;
            v[(7 - i) * 8 + col] = (x[i] - t[3 - i]) >> 10;
        }
    }

    for row in 0..8 {
        let r = &v[row * 8..row * 8 + 8];
        let (mut x, t) = idct_1d([r[0], r[1], r[2], r[3], r[4], r[5], r[6], r[7]]);
        // Rounding plus the +128 level shift, both at the final scale.
        for xi in &mut x {
            *xi += 65536 + (128 << 17);
        }
        let dst = &mut out[row * stride..row * stride + 8];
        for i in 0..4 {
            dst[i] = clamp_sample((x[i] + t[3 - i]) >> 17);
            dst[7 - i] = clamp_sample((x[i] - t[3 - i]) >> 17);
        }
    }
}

#[inline]
fn clamp_sample(v: i64) -> u8 {
    v.clamp(0, 255) as u8
}
