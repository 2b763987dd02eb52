//! Checksums and the DEFLATE decoder used by the PNG path.

pub mod adler32;
pub mod crc32;
pub mod inflate;
