//! Store error types.

use thiserror::Error;

/// Store operation errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error during store access
    #[error("I/O error: {0}")]
    Io(String),

    /// Disk full error during a write
    #[error("Disk full: {0}")]
    DiskFull(String),

    /// Transient I/O error that may succeed on retry
    #[error("Transient I/O error: {0}")]
    TransientIo(String),

    /// Store file content is damaged or incomplete
    #[error("Store corruption detected: {0}")]
    Corrupt(String),

    /// Destination store file already exists
    #[error("Store file already exists at '{path}'")]
    AlreadyExists { path: String },

    /// Store file uses a format version this build cannot read
    #[error("Unsupported store format version {found} (expected {expected})")]
    UnsupportedFormat { found: u32, expected: u32 },

    /// Record frame encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}
