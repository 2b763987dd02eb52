//! Error types shared by the decoders and the raster engine.

/// Convenience result type used across rasterkit.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for decoding and compositing.
///
/// Decoders fail fast on the first violation they detect. Compositing
/// operations clamp out-of-range coordinates instead of failing, so for them
/// the only runtime failure is [`Error::OutOfMemory`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No decoder recognized the stream signature.
    #[error("unrecognized image format")]
    UnrecognizedFormat,

    /// A valid stream using a feature outside the supported subset
    /// (progressive JPEG, RLE BMP, 16-bit PNG, ...).
    #[error("unsupported variant: {0}")]
    UnsupportedVariant(String),

    /// Structurally invalid headers, bitstreams or checksums.
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    /// A buffer allocation could not be satisfied.
    #[error("out of memory allocating {requested} bytes")]
    OutOfMemory { requested: usize },

    /// Image dimensions exceed the configured limit.
    #[error("image dimensions {width}x{height} exceed the maximum of {max}")]
    ImageTooLarge { width: u32, height: u32, max: u32 },

    /// A caller-provided pixel buffer has the wrong length.
    #[error("invalid data length: expected {expected}, got {actual}")]
    InvalidDataLength { expected: usize, actual: usize },

    /// Scale factors must be finite and strictly positive.
    #[error("invalid scale factor {0}")]
    InvalidScaleFactor(f64),

    /// Channel counts must be in `1..=4` (or 0 for "native" when decoding).
    #[error("invalid channel count {0}")]
    InvalidChannelCount(u8),
}

impl Error {
    /// Build an [`Error::CorruptStream`] value.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptStream(msg.into())
    }

    /// Build an [`Error::UnsupportedVariant`] value.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedVariant(msg.into())
    }
}

/// Allocate a zeroed byte buffer, reporting allocation failure as
/// [`Error::OutOfMemory`] rather than aborting.
pub(crate) fn try_zeroed(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::OutOfMemory { requested: len })?;
    buf.resize(len, 0);
    Ok(buf)
}

/// `width * height * channels` with overflow reported as out-of-memory.
pub(crate) fn buffer_len(width: u32, height: u32, channels: usize) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(channels))
        .ok_or(Error::OutOfMemory {
            requested: usize::MAX,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helper_constructors_pick_variants() {
        assert!(matches!(Error::corrupt("x"), Error::CorruptStream(m) if m == "x"));
        assert!(matches!(
            Error::unsupported("y"),
            Error::UnsupportedVariant(m) if m == "y"
        ));
    }

    #[test]
    fn buffer_len_detects_overflow() {
        assert_eq!(buffer_len(3, 2, 4).unwrap(), 24);
        assert!(matches!(
            buffer_len(u32::MAX, u32::MAX, usize::MAX),
            Err(Error::OutOfMemory { .. })
        ));
    }

    #[test]
    fn display_messages_are_descriptive() {
        let err = Error::ImageTooLarge {
            width: 10,
            height: 20,
            max: 5,
        };
        assert_eq!(
            err.to_string(),
            "image dimensions 10x20 exceed the maximum of 5"
        );
        assert_eq!(
            Error::UnrecognizedFormat.to_string(),
            "unrecognized image format"
        );
    }
}
