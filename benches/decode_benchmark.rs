//! Decode and compositing benchmarks.
//!
//! Run with:
//! ```bash
//! cargo bench --bench decode_benchmark
//! ```

use std::io::Cursor;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use image::{ExtendedColorType, ImageFormat as RefFormat};

use rasterkit::raster::{blend, rotate, scale, Sampling};
use rasterkit::{decode_memory, Image};

fn gradient(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let r = ((x * 255) / width) as u8;
            let g = ((y * 255) / height) as u8;
            let b = (((x + y) * 127) / (width + height)) as u8;
            pixels.extend_from_slice(&[r, g, b]);
        }
    }
    pixels
}

fn encode(pixels: &[u8], size: u32, format: RefFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image::write_buffer_with_format(&mut out, pixels, size, size, ExtendedColorType::Rgb8, format)
        .unwrap();
    out.into_inner()
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for &size in &[128u32, 512] {
        let pixels = gradient(size, size);
        for (name, format) in [
            ("png", RefFormat::Png),
            ("jpeg", RefFormat::Jpeg),
            ("bmp", RefFormat::Bmp),
        ] {
            let encoded = encode(&pixels, size, format);
            group.throughput(Throughput::Bytes(encoded.len() as u64));

            group.bench_with_input(
                BenchmarkId::new(format!("rasterkit_{name}"), format!("{size}x{size}")),
                &encoded,
                |b, data| {
                    b.iter(|| {
                        let img = decode_memory(data).unwrap();
                        criterion::black_box(img.pixels().len());
                    });
                },
            );

            group.bench_with_input(
                BenchmarkId::new(format!("image_crate_{name}"), format!("{size}x{size}")),
                &encoded,
                |b, data| {
                    b.iter(|| {
                        let img = image::load_from_memory(data).unwrap();
                        criterion::black_box(img.to_rgba8().len());
                    });
                },
            );
        }
    }
    group.finish();
}

fn bench_composite(c: &mut Criterion) {
    let size = 256u32;
    let rgb = gradient(size, size);
    let rgba: Vec<u8> = rgb
        .chunks(3)
        .enumerate()
        .flat_map(|(i, p)| [p[0], p[1], p[2], (i % 256) as u8])
        .collect();
    let src = Image::from_rgba(size, size, rgba).unwrap();

    let mut group = c.benchmark_group("composite");
    group.throughput(Throughput::Elements(u64::from(size * size)));

    group.bench_function("blend_256", |b| {
        let mut dst = Image::new(size, size).unwrap();
        b.iter(|| {
            blend(&mut dst, &src, 0, 0);
            criterion::black_box(dst.pixels()[0]);
        });
    });

    for factor in [0.5, 1.5] {
        group.bench_with_input(BenchmarkId::new("scale", factor), &factor, |b, &f| {
            b.iter(|| criterion::black_box(scale(&src, f).unwrap().width()));
        });
    }

    for sampling in [Sampling::Nearest, Sampling::Bilinear] {
        group.bench_with_input(
            BenchmarkId::new("rotate_30", format!("{sampling:?}")),
            &sampling,
            |b, &s| {
                b.iter(|| criterion::black_box(rotate(&src, 30.0, s).unwrap().width()));
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_decode, bench_composite);
criterion_main!(benches);
