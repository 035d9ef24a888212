//! Full-scan TIFF validation
//!
//! Tagged Image File Format (TIFF) files routinely carry damage that a quick
//! header check misses: strips that run past the end of the file, truncated
//! LZW streams, tags of the wrong type. This crate decodes every row (or
//! tile) of an image and returns every error and warning raised along the
//! way, instead of printing them or stopping at the first one.
//!
//! # Features
//!
//! - Files on disk and borrowed in-memory buffers behave identically
//! - Strip and tile organization, chunky and planar samples
//! - Decompression of None, PackBits, LZW, Deflate and baseline JPEG data
//! - Big and little endian support
//! - Diagnostics are call-scoped, so validations can run in parallel
//!
//! # Example
//!
//! ```no_run
//! use checktiff::validate_tiff_from_file;
//!
//! let result = validate_tiff_from_file("scan.tif");
//! for error in &result.errors {
//!     eprintln!("error: {}", error);
//! }
//! assert!(result.is_valid());
//! ```

pub mod compression;
pub mod decoder;
pub mod diagnostics;
pub mod error;
pub mod handler;
pub mod ifd;
pub mod jpeg;
pub mod source;
pub mod tags;
pub mod types;
pub mod validate;

pub use compression::Compression;
pub use decoder::TiffReader;
pub use diagnostics::{DiagnosticRecord, DiagnosticSink, Severity, DEFAULT_MESSAGE_LIMIT};
pub use error::{Result, TiffError};
pub use handler::{DecoderHandler, LogHandler, SinkBridge};
pub use ifd::{Ifd, IfdEntry, IfdValue};
pub use source::{BufferSource, FileSource, Source, VirtualSource, Whence};
pub use types::{Endian, ImageLayout};
pub use validate::{
    export, validate_tiff_from_buffer, validate_tiff_from_file, SourceDescriptor,
    ValidateOptions, ValidationResult, Validator,
};

/// TIFF magic number - little endian "II"
pub const TIFF_MAGIC_LE: [u8; 2] = [0x49, 0x49];

/// TIFF magic number - big endian "MM"
pub const TIFF_MAGIC_BE: [u8; 2] = [0x4D, 0x4D];

/// TIFF version (42)
pub const TIFF_VERSION: u16 = 42;

/// BigTIFF version (43)
pub const BIGTIFF_VERSION: u16 = 43;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_numbers() {
        assert_eq!(TIFF_MAGIC_LE, [b'I', b'I']);
        assert_eq!(TIFF_MAGIC_BE, [b'M', b'M']);
    }

    #[test]
    fn test_version() {
        assert_eq!(TIFF_VERSION, 42);
        assert_eq!(BIGTIFF_VERSION, 43);
    }
}
