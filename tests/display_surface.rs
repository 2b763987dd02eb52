//! Display caches driven through an in-memory framebuffer surface.

use rasterkit::display::{paint, paint_region, ByteOrder};
use rasterkit::raster::{fill, Rect};
use rasterkit::{decode_memory, DisplayCache, Image, Surface, SurfaceFormat};

mod support;
use support::synthetic;

/// Packed framebuffer that clamps every copy to its own extent.
struct Framebuffer {
    width: u32,
    height: u32,
    format: SurfaceFormat,
    data: Vec<u8>,
}

impl Framebuffer {
    fn new(width: u32, height: u32, format: SurfaceFormat) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            data: vec![0; len],
        }
    }

    fn offset(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        Some((y as usize * self.width as usize + x as usize) * bpp)
    }

    fn rgba(&self, x: u32, y: u32) -> [u8; 4] {
        let at = self.offset(i64::from(x), i64::from(y)).unwrap();
        self.format.unpack(self.format.load(&self.data[at..]))
    }
}

impl Surface for Framebuffer {
    fn format(&self) -> SurfaceFormat {
        self.format
    }

    fn blit(&mut self, x: i32, y: i32, image: &Image, region: Rect) {
        for ry in 0..region.height {
            for rx in 0..region.width {
                let dx = i64::from(x) + i64::from(rx);
                let dy = i64::from(y) + i64::from(ry);
                if let Some(at) = self.offset(dx, dy) {
                    let rgba = image.pixel(region.x + rx, region.y + ry).unwrap();
                    let word = self.format.pack(rgba);
                    let format = self.format;
                    format.store(word, &mut self.data[at..]);
                }
            }
        }
    }

    fn blit_cache_region(&mut self, x: i32, y: i32, cache: &DisplayCache, region: Rect) {
        let bpp = cache.format().bytes_per_pixel();
        for ry in 0..region.height {
            for rx in 0..region.width {
                let (cx, cy) = (region.x + rx, region.y + ry);
                if !cache.is_drawn(cx, cy) {
                    continue;
                }
                let dx = i64::from(x) + i64::from(rx);
                let dy = i64::from(y) + i64::from(ry);
                if let Some(at) = self.offset(dx, dy) {
                    self.data[at..at + bpp].copy_from_slice(cache.pixel_bytes(cx, cy));
                }
            }
        }
    }
}

#[test]
fn decoded_gif_paints_through_its_mask() {
    let (w, h) = (12, 10);
    let rgba = synthetic::palette_rgba(w, h, 10, 4);
    let img = decode_memory(&synthetic::encode_gif(&rgba, w, h)).unwrap();
    assert!(img.has_alpha());

    let mut fb = Framebuffer::new(w, h, SurfaceFormat::rgb24());
    fill_surface(&mut fb, [9, 9, 9, 255]);
    let cache = DisplayCache::build(&img, fb.format()).unwrap();
    cache.paint(&mut fb, 0, 0);

    for y in 0..h {
        for x in 0..w {
            let src = img.pixel(x, y).unwrap();
            let expected = if src[3] >= img.opacity_threshold() {
                [src[0], src[1], src[2], 255]
            } else {
                [9, 9, 9, 255]
            };
            assert_eq!(fb.rgba(x, y), expected, "({x}, {y})");
        }
    }
}

#[test]
fn cache_matches_direct_paint_for_opaque_images() {
    let mut img = Image::from_rgba(7, 5, synthetic::noise(7, 5, 4, 3)).unwrap();
    img.set_has_alpha(false);

    for format in [
        SurfaceFormat::rgb24(),
        SurfaceFormat::bgra32(),
        SurfaceFormat::xrgb32(),
        SurfaceFormat::new(32, 0xFF00_0000, 0x00FF_0000, 0x0000_FF00, 0xFF, ByteOrder::BigEndian)
            .unwrap(),
    ] {
        let cache = DisplayCache::build(&img, format).unwrap();
        assert!(!cache.has_mask());

        let mut cached = Framebuffer::new(10, 10, format);
        cache.paint(&mut cached, 2, 3);
        let mut direct = Framebuffer::new(10, 10, format);
        paint(&mut direct, &img, 2, 3);
        assert_eq!(cached.data, direct.data, "{format:?}");
    }
}

#[test]
fn rgb565_round_trip_keeps_high_bits() {
    let mut img = Image::new(1, 1).unwrap();
    fill(&mut img, [0b1010_1111, 0b0110_0111, 0b1111_0001, 255]);
    let mut fb = Framebuffer::new(1, 1, SurfaceFormat::rgb565());
    DisplayCache::build(&img, fb.format()).unwrap().paint(&mut fb, 0, 0);
    let p = fb.rgba(0, 0);
    assert_eq!(p[0] >> 3, 0b10101);
    assert_eq!(p[1] >> 2, 0b011001);
    assert_eq!(p[2] >> 3, 0b11110);
}

#[test]
fn tiling_covers_the_rectangle_and_clips_edges() {
    let mut tile = Image::new(3, 2).unwrap();
    fill(&mut tile, [200, 100, 50, 255]);
    tile.set_pixel(0, 0, [1, 2, 3, 255]);

    let mut fb = Framebuffer::new(12, 8, SurfaceFormat::rgba32());
    let cache = DisplayCache::build(&tile, fb.format()).unwrap();
    cache.tile(&mut fb, 1, 1, 8, 5);

    for y in 0..8 {
        for x in 0..12 {
            let inside = (1..9).contains(&x) && (1..6).contains(&y);
            let p = fb.rgba(x, y);
            if !inside {
                assert_eq!(p, [0, 0, 0, 0], "({x}, {y})");
            } else if (x - 1) % 3 == 0 && (y - 1) % 2 == 0 {
                assert_eq!(p, [1, 2, 3, 255], "({x}, {y})");
            } else {
                assert_eq!(p, [200, 100, 50, 255], "({x}, {y})");
            }
        }
    }
}

#[test]
fn invisible_cache_draws_nothing() {
    let img = Image::new(4, 4).unwrap();
    let mut fb = Framebuffer::new(4, 4, SurfaceFormat::rgba32());
    let cache = DisplayCache::build(&img, fb.format()).unwrap();
    assert!(!cache.is_visible());
    cache.paint(&mut fb, 0, 0);
    cache.tile(&mut fb, 0, 0, 4, 4);
    assert!(fb.data.iter().all(|&b| b == 0));
}

#[test]
fn paint_region_clamps_and_keeps_anchor() {
    let mut img = Image::new(4, 4).unwrap();
    fill(&mut img, [10, 20, 30, 255]);
    img.set_pixel(0, 0, [99, 0, 0, 255]);

    let mut fb = Framebuffer::new(6, 6, SurfaceFormat::rgba32());
    // Region starts one pixel left of and above the image.
    paint_region(&mut fb, &img, 1, 1, -1, -1, 3, 3);
    assert_eq!(fb.rgba(1, 1), [0, 0, 0, 0]);
    assert_eq!(fb.rgba(2, 2), [99, 0, 0, 255]);
    assert_eq!(fb.rgba(3, 3), [10, 20, 30, 255]);
    assert_eq!(fb.rgba(4, 4), [0, 0, 0, 0]);
}

fn fill_surface(fb: &mut Framebuffer, rgba: [u8; 4]) {
    let mut img = Image::new(fb.width, fb.height).unwrap();
    fill(&mut img, rgba);
    paint(fb, &img, 0, 0);
}
