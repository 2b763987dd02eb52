//! Synthetic pixel data and reference encoders.
//!
//! Files are produced with the `image` crate's encoders so the decoders
//! under test never read their own output, and `reference_rgba` decodes the
//! same bytes with `image` for cross-checking.

use image::codecs::bmp::BmpEncoder;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Smooth RGB gradient, friendly to lossy codecs.
pub fn gradient_rgb(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let r = ((x * 255) / width.max(1)) as u8;
            let g = ((y * 255) / height.max(1)) as u8;
            let b = (((x + y) * 127) / (width + height).max(1)) as u8;
            pixels.extend_from_slice(&[r, g, b]);
        }
    }
    pixels
}

/// Smooth single-channel gradient.
pub fn gradient_gray(width: u32, height: u32) -> Vec<u8> {
    (0..height)
        .flat_map(|y| (0..width).map(move |x| (((x + y) * 255) / (width + height).max(1)) as u8))
        .collect()
}

/// Deterministic noise with `channels` bytes per pixel.
pub fn noise(width: u32, height: u32, channels: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pixels = vec![0u8; width as usize * height as usize * channels];
    rng.fill(pixels.as_mut_slice());
    pixels
}

/// RGBA noise drawn from a small palette so GIF quantization is exact.
/// Every fifth palette slot is fully transparent.
pub fn palette_rgba(width: u32, height: u32, colors: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let palette: Vec<[u8; 4]> = (0..colors)
        .map(|i| {
            if i % 5 == 4 {
                [0, 0, 0, 0]
            } else {
                [rng.gen(), rng.gen(), rng.gen(), 255]
            }
        })
        .collect();
    (0..width as usize * height as usize)
        .flat_map(|_| palette[rng.gen_range(0..colors)])
        .collect()
}

pub fn encode_png(pixels: &[u8], width: u32, height: u32, color: ExtendedColorType) -> Vec<u8> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(pixels, width, height, color)
        .expect("png encode");
    out
}

/// PNG with a fixed filter strategy, to exercise each reconstruction path.
pub fn encode_png_filtered(
    pixels: &[u8],
    width: u32,
    height: u32,
    color: ExtendedColorType,
    filter: FilterType,
) -> Vec<u8> {
    let mut out = Vec::new();
    PngEncoder::new_with_quality(&mut out, CompressionType::Best, filter)
        .write_image(pixels, width, height, color)
        .expect("png encode");
    out
}

pub fn encode_jpeg(pixels: &[u8], width: u32, height: u32, color: ExtendedColorType) -> Vec<u8> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 90)
        .encode(pixels, width, height, color)
        .expect("jpeg encode");
    out
}

pub fn encode_bmp(pixels: &[u8], width: u32, height: u32, color: ExtendedColorType) -> Vec<u8> {
    let mut out = Vec::new();
    BmpEncoder::new(&mut out)
        .encode(pixels, width, height, color)
        .expect("bmp encode");
    out
}

pub fn encode_gif(rgba: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut out);
        encoder
            .encode(rgba, width, height, ExtendedColorType::Rgba8)
            .expect("gif encode");
    }
    out
}

/// Decode with the `image` crate into RGBA8.
pub fn reference_rgba(data: &[u8]) -> Vec<u8> {
    image::load_from_memory(data)
        .expect("reference decode")
        .to_rgba8()
        .into_raw()
}

/// Compare RGBA buffers, treating any two fully transparent pixels as
/// equal regardless of their color bytes.
pub fn assert_rgba_eq(actual: &[u8], expected: &[u8]) {
    assert_eq!(actual.len(), expected.len(), "buffer length");
    for (i, (a, e)) in actual.chunks(4).zip(expected.chunks(4)).enumerate() {
        if a[3] == 0 && e[3] == 0 {
            continue;
        }
        assert_eq!(a, e, "pixel {i}");
    }
}

/// Maximum and mean absolute channel difference.
pub fn channel_error(a: &[u8], b: &[u8]) -> (u8, f64) {
    assert_eq!(a.len(), b.len(), "buffer length");
    let mut max = 0u8;
    let mut total = 0u64;
    for (&x, &y) in a.iter().zip(b) {
        let d = x.abs_diff(y);
        max = max.max(d);
        total += u64::from(d);
    }
    (max, total as f64 / a.len().max(1) as f64)
}
