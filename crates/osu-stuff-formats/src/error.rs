//! Error types for the binary database codecs

use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors raised while decoding or encoding osu! database files
#[derive(Debug, Error)]
pub enum CodecError {
    /// A read needed more bytes than remain in the buffer
    #[error("Truncated input at offset {offset}: needed {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Malformed bytes (bad UTF-8, oversized varint, out-of-range length)
    #[error("Invalid encoding at offset {offset}")]
    InvalidEncoding { offset: usize },

    /// A typed value carried a tag the reader does not know
    #[error("Unknown type tag {tag} at offset {offset}")]
    UnknownTypeTag { tag: u8, offset: usize },

    /// Database version outside the supported range (strict mode only)
    #[error("Unsupported database version: {0}")]
    VersionUnsupported(u32),

    /// A record span was missing, outside the beatmap region or overlapping
    #[error("Invalid record range for {checksum}: {start:?}..{end:?}")]
    InvalidRecordRange {
        checksum: String,
        start: Option<usize>,
        end: Option<usize>,
    },

    /// Unrecognised Collection Manager version string
    #[error("Invalid .osdb version string: {0:?}")]
    InvalidOsdbVersion(String),

    /// Collection Manager file did not end with the expected footer
    #[error("Invalid .osdb footer: {0:?}")]
    InvalidFooter(String),

    /// A collection with this name already exists
    #[error("Collection already exists: {0:?}")]
    DuplicateCollection(String),

    /// I/O error while writing output or inflating data
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// Build a truncation error for a read of `needed` bytes at `offset`
    pub fn truncated(offset: usize, needed: usize, available: usize) -> Self {
        Self::Truncated {
            offset,
            needed,
            available,
        }
    }

    /// Build an invalid-range error for a record descriptor
    pub fn invalid_range(
        checksum: Option<&str>,
        start: Option<usize>,
        end: Option<usize>,
    ) -> Self {
        Self::InvalidRecordRange {
            checksum: checksum.unwrap_or_default().to_string(),
            start,
            end,
        }
    }

    /// Check if this error means the input bytes are malformed
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. }
                | Self::InvalidEncoding { .. }
                | Self::UnknownTypeTag { .. }
                | Self::InvalidOsdbVersion(_)
                | Self::InvalidFooter(_)
        )
    }

    /// Check if this error came from the surrounding I/O rather than the data
    pub fn is_io_error(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
