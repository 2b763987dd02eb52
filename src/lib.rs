//! # rasterkit
//!
//! In-memory image decoding plus a small raster compositing engine.
//!
//! - **Decoding**: baseline JPEG, PNG, BMP and GIF (first frame) into one
//!   canonical RGBA [`Image`], or into any 1-4 channel layout with
//!   [`decode::decode_raw`]. The format is sniffed from the stream.
//! - **Compositing**: fill, extract, mirror, alpha blending, scaling and
//!   rotation in [`raster`], all clamping out-of-range regions instead of
//!   failing.
//! - **Display**: [`display::DisplayCache`] converts an image once into a
//!   host surface's packed layout with an optional one-bit mask.
//!
//! ## Quickstart
//!
//! ```rust
//! use rasterkit::raster::{blend, rotate, scale, Sampling};
//! use rasterkit::{decode_memory, Image};
//!
//! # fn main() -> rasterkit::Result<()> {
//! // 1x1 GIF whose only palette entry is red.
//! let gif = [
//!     b'G', b'I', b'F', b'8', b'7', b'a', 1, 0, 1, 0, 0x80, 0, 0,
//!     255, 0, 0, 0, 0, 0,
//!     0x2C, 0, 0, 0, 0, 1, 0, 1, 0, 0,
//!     2, 2, 0x44, 0x01, 0, 0x3B,
//! ];
//! let red = decode_memory(&gif)?;
//! assert_eq!(red.pixels(), &[255, 0, 0, 255]);
//!
//! let mut canvas = Image::new(8, 8)?;
//! let big = scale(&red, 4.0)?;
//! blend(&mut canvas, &big, 2, 2);
//! let turned = rotate(&canvas, 90.0, Sampling::Nearest)?;
//! assert_eq!(turned.dimensions(), (8, 8));
//! # Ok(())
//! # }
//! ```
//!
//! ### Decode options
//!
//! ```rust
//! use rasterkit::decode::{decode_raw, DecodeOptions};
//! use rasterkit::{ByteSource, ColorType};
//!
//! # fn main() -> rasterkit::Result<()> {
//! # let data = [
//! #     b'G', b'I', b'F', b'8', b'9', b'a', 1, 0, 1, 0, 0x80, 0, 0,
//! #     0, 0, 255, 0, 0, 0,
//! #     0x2C, 0, 0, 0, 0, 1, 0, 1, 0, 0,
//! #     2, 2, 0x44, 0x01, 0, 0x3B,
//! # ];
//! let options = DecodeOptions::builder()
//!     .channels(1)
//!     .verify_checksums(true)
//!     .max_dimension(4096)
//!     .build();
//! let gray = decode_raw(&mut ByteSource::from_memory(&data), &options)?;
//! assert_eq!(gray.color_type, ColorType::Gray);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//! - `parallel` (default): row-parallel scale and rotate kernels via rayon.
//!
//! ## Diagnostics
//! Decoders and kernels emit `tracing` events (`debug` for headers and
//! geometry, `trace` for chunks, markers and blocks, `warn` for tolerated
//! anomalies). No subscriber is installed by the crate.

#![forbid(unsafe_code)]

pub mod color;
pub mod compress;
pub mod decode;
pub mod display;
pub mod error;
pub mod image;
pub mod raster;
pub mod source;

pub use color::ColorType;
pub use decode::{decode, decode_memory, probe, probe_memory, DecodeOptions, ImageFormat};
pub use display::{DisplayCache, Surface, SurfaceFormat};
pub use error::{Error, Result};
pub use image::Image;
pub use source::{ByteSource, PullSource, ReaderSource};
