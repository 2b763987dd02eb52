use super::{bmp, gif, jpeg, png, DecodeOptions, Frame, Header};
use crate::error::{Error, Result};
use crate::source::ByteSource;

/// The closed set of supported encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Bmp,
    Gif,
}

impl ImageFormat {
    /// Sniffing order. No signature is a prefix of another, so the order
    /// only matters for cost.
    pub const ALL: [ImageFormat; 4] = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::Bmp,
        ImageFormat::Gif,
    ];

    /// Identify the stream by its signature. The source is left rewound to
    /// the start whether or not a format matched.
    pub fn sniff(source: &mut ByteSource<'_>) -> Result<ImageFormat> {
        for format in Self::ALL {
            let hit = format.matches(source);
            source.rewind();
            if hit {
                tracing::debug!(?format, "format signature matched");
                return Ok(format);
            }
        }
        Err(Error::UnrecognizedFormat)
    }

    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Gif => "gif",
        }
    }

    /// Read just enough of the stream to tell whether it is this format.
    pub fn matches(self, source: &mut ByteSource<'_>) -> bool {
        match self {
            ImageFormat::Jpeg => jpeg::test(source),
            ImageFormat::Png => png::test(source),
            ImageFormat::Bmp => bmp::test(source),
            ImageFormat::Gif => gif::test(source),
        }
    }

    pub(crate) fn decode(self, source: &mut ByteSource<'_>, options: &DecodeOptions) -> Result<Frame> {
        match self {
            ImageFormat::Jpeg => jpeg::decode(source, options),
            ImageFormat::Png => png::decode(source, options),
            ImageFormat::Bmp => bmp::decode(source, options),
            ImageFormat::Gif => gif::decode(source, options),
        }
    }

    pub(crate) fn probe(self, source: &mut ByteSource<'_>) -> Result<Header> {
        match self {
            ImageFormat::Jpeg => jpeg::probe(source),
            ImageFormat::Png => png::probe(source),
            ImageFormat::Bmp => bmp::probe(source),
            ImageFormat::Gif => gif::probe(source),
        }
    }
}
