//! Chroma upsampling for subsampled JPEG components.
//!
//! Each output row is produced from the nearest low-resolution row
//! (`near`) and its vertical neighbour on the other side of the output
//! sample (`far`). The 2x filters use 3:1 triangle weights.

/// Resampling kernel chosen from a component's horizontal and vertical
/// expansion factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resampler {
    /// 1:1, copy.
    Copy,
    /// 2x vertical only.
    Vertical2,
    /// 2x horizontal only.
    Horizontal2,
    /// 2x in both directions.
    Both2,
    /// Any other ratio: nearest neighbour, replicating `hs` times across.
    Nearest { hs: usize },
}

impl Resampler {
    pub(crate) fn for_factors(hs: usize, vs: usize) -> Self {
        match (hs, vs) {
            (1, 1) => Resampler::Copy,
            (1, 2) => Resampler::Vertical2,
            (2, 1) => Resampler::Horizontal2,
            (2, 2) => Resampler::Both2,
            _ => Resampler::Nearest { hs },
        }
    }

    /// Produce one output row of `w * hs` samples from `w` low-resolution
    /// input samples.
    pub(crate) fn row(self, out: &mut [u8], near: &[u8], far: &[u8], w: usize) {
        match self {
            Resampler::Copy => out[..w].copy_from_slice(&near[..w]),
            Resampler::Vertical2 => {
                for i in 0..w {
                    out[i] = div4(3 * near[i] as u32 + far[i] as u32 + 2);
                }
            }
            Resampler::Horizontal2 => horizontal2(out, near, w),
            Resampler::Both2 => both2(out, near, far, w),
            Resampler::Nearest { hs } => {
                for i in 0..w {
                    out[i * hs..(i + 1) * hs].fill(near[i]);
                }
            }
        }
    }
}

#[inline]
fn div4(v: u32) -> u8 {
    (v >> 2) as u8
}

#[inline]
fn div16(v: u32) -> u8 {
    (v >> 4) as u8
}

fn horizontal2(out: &mut [u8], input: &[u8], w: usize) {
    if w == 1 {
        out[0] = input[0];
        out[1] = input[0];
        return;
    }
    let px = |i: usize| input[i] as u32;

    out[0] = input[0];
    out[1] = div4(px(0) * 3 + px(1) + 2);
    for i in 1..w - 1 {
        let n = 3 * px(i) + 2;
        out[i * 2] = div4(n + px(i - 1));
        out[i * 2 + 1] = div4(n + px(i + 1));
    }
    let last = w - 1;
    out[last * 2] = div4(px(w - 2) + 3 * px(last) + 2);
    out[last * 2 + 1] = input[last];
}

fn both2(out: &mut [u8], near: &[u8], far: &[u8], w: usize) {
    // Vertical blend first, kept at 4x scale.
    let col = |i: usize| 3 * near[i] as u32 + far[i] as u32;
    if w == 1 {
        let v = div4(col(0) + 2);
        out[0] = v;
        out[1] = v;
        return;
    }

    let mut t1 = col(0);
    out[0] = div4(t1 + 2);
    for i in 1..w {
        let t0 = t1;
        t1 = col(i);
        out[i * 2 - 1] = div16(3 * t0 + t1 + 8);
        out[i * 2] = div16(3 * t1 + t0 + 8);
    }
    out[w * 2 - 1] = div4(t1 + 2);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_kernel_by_factor() {
        assert_eq!(Resampler::for_factors(1, 1), Resampler::Copy);
        assert_eq!(Resampler::for_factors(1, 2), Resampler::Vertical2);
        assert_eq!(Resampler::for_factors(2, 1), Resampler::Horizontal2);
        assert_eq!(Resampler::for_factors(2, 2), Resampler::Both2);
        assert_eq!(Resampler::for_factors(4, 1), Resampler::Nearest { hs: 4 });
    }

    #[test]
    fn flat_input_stays_flat() {
        let near = [90u8; 5];
        let far = [90u8; 5];
        for r in [
            Resampler::Copy,
            Resampler::Vertical2,
            Resampler::Horizontal2,
            Resampler::Both2,
            Resampler::Nearest { hs: 3 },
        ] {
            let mut out = [0u8; 15];
            r.row(&mut out, &near, &far, 5);
            let produced = match r {
                Resampler::Copy | Resampler::Vertical2 => 5,
                Resampler::Nearest { hs } => 5 * hs,
                _ => 10,
            };
            assert!(out[..produced].iter().all(|&p| p == 90), "{r:?}: {out:?}");
        }
    }

    #[test]
    fn horizontal_uses_triangle_weights() {
        let mut out = [0u8; 4];
        Resampler::Horizontal2.row(&mut out, &[0, 100], &[0, 100], 2);
        assert_eq!(out, [0, 25, 75, 100]);
    }

    #[test]
    fn vertical_weights_near_row_three_to_one() {
        let mut out = [0u8; 1];
        Resampler::Vertical2.row(&mut out, &[100], &[0], 1);
        assert_eq!(out, [75]);
    }

    #[test]
    fn single_column_inputs() {
        let mut out = [0u8; 2];
        Resampler::Horizontal2.row(&mut out, &[42], &[0], 1);
        assert_eq!(out, [42, 42]);
        Resampler::Both2.row(&mut out, &[100], &[0], 1);
        assert_eq!(out, [75, 75]);
    }
}
