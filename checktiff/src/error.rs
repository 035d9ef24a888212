//! TIFF error types

use thiserror::Error;

/// Result type for TIFF operations
pub type Result<T> = std::result::Result<T, TiffError>;

/// TIFF error types
///
/// The decoder reports every error that stops an operation through its
/// [`DecoderHandler`](crate::handler::DecoderHandler) before returning it, so
/// callers that only care about the diagnostics may discard the `Err`.
#[derive(Error, Debug)]
pub enum TiffError {
    /// Source shorter than the 8-byte header
    #[error("Cannot read TIFF header")]
    TruncatedHeader,

    /// Invalid magic number
    #[error("Not a TIFF file, bad magic number {0:#06x}")]
    InvalidMagic(u16),

    /// Invalid version
    #[error("Not a TIFF file, bad version number {version}")]
    UnsupportedVersion { version: u16 },

    /// BigTIFF container
    #[error("BigTIFF files are not supported")]
    BigTiff,

    /// Unsupported compression
    #[error("Compression scheme {0} is not supported for decoding")]
    UnsupportedCompression(u16),

    /// Invalid IFD
    #[error("Invalid TIFF directory: {0}")]
    InvalidIfd(String),

    /// Missing required tag
    #[error("TIFF directory is missing required \"{0}\" field")]
    MissingTag(&'static str),

    /// Invalid tag value
    #[error("Invalid value {value} for \"{tag}\"")]
    InvalidTagValue { tag: &'static str, value: u32 },

    /// Invalid image dimensions
    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// Row outside the image
    #[error("{row}: Row out of range, max {max}")]
    RowOutOfRange { row: u32, max: u32 },

    /// Sample plane outside the image
    #[error("{sample}: Sample out of range, max {max}")]
    SampleOutOfRange { sample: u16, max: u16 },

    /// Strip or tile index outside the offsets table
    #[error("{index}: {kind} out of range, max {max}")]
    ChunkOutOfRange { kind: &'static str, index: u32, max: u32 },

    /// Offsets table shorter than the layout requires
    #[error("{missing} of {expected} {kind}s have no offset")]
    MissingOffsets { kind: &'static str, missing: u32, expected: u32 },

    /// Strip or tile declared with no data
    #[error("Invalid {kind} byte count 0, {kind} {index}")]
    ZeroByteCount { kind: &'static str, index: u32 },

    /// Strip or tile data could not be read in full
    #[error("Read error on {kind} {index}; got {got} bytes, expected {expected}")]
    ShortRead { kind: &'static str, index: u32, got: u64, expected: u64 },

    /// Strip or tile decoded to fewer bytes than the layout requires
    #[error("Not enough data in {kind} {index}; decoded {got} bytes, expected {expected}")]
    NotEnoughData { kind: &'static str, index: u32, got: usize, expected: usize },

    /// JPEG strip or tile whose frame does not fit the directory
    #[error("Improper JPEG {kind} {index}: {detail}")]
    JpegMismatch { kind: &'static str, index: u32, detail: String },

    /// Strip or tile already failed; the fault was reported on first access
    #[error("{kind} {index} is unavailable")]
    ChunkUnavailable { kind: &'static str, index: u32 },

    /// Scanline read on a tiled image, or tile read on a stripped one
    #[error("Can not read {0}")]
    WrongOrganization(&'static str),

    /// Seek to a negative offset
    #[error("Seek to negative offset {0}")]
    NegativeSeek(i64),

    /// Decompression error
    #[error("Decompression error: {0}")]
    DecompressionError(String),

    /// No further directory in the chain
    #[error("No more directories")]
    NoMoreDirectories,

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TiffError::InvalidMagic(0x8950);
        assert_eq!(format!("{}", err), "Not a TIFF file, bad magic number 0x8950");

        let err = TiffError::UnsupportedVersion { version: 44 };
        assert!(format!("{}", err).contains("44"));

        let err = TiffError::MissingTag("ImageLength");
        assert_eq!(
            format!("{}", err),
            "TIFF directory is missing required \"ImageLength\" field"
        );
    }

    #[test]
    fn test_missing_offsets_display() {
        let err = TiffError::MissingOffsets { kind: "strip", missing: 249, expected: 250 };
        assert_eq!(err.to_string(), "249 of 250 strips have no offset");
    }

    #[test]
    fn test_short_read_display() {
        let err = TiffError::ShortRead { kind: "strip", index: 3, got: 10, expected: 16 };
        assert_eq!(
            err.to_string(),
            "Read error on strip 3; got 10 bytes, expected 16"
        );
    }
}
