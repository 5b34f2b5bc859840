//! I/O utilities for store file operations.

use std::io::ErrorKind;

use crate::error::StoreError;

/// Classifies I/O errors into specific StoreError variants.
pub fn classify_io_error(error: std::io::Error, context: &str) -> StoreError {
    match error.kind() {
        ErrorKind::StorageFull | ErrorKind::OutOfMemory => {
            StoreError::DiskFull(format!("{}: {}", context, error))
        }
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => {
            StoreError::TransientIo(format!("{}: {}", context, error))
        }
        ErrorKind::UnexpectedEof => {
            StoreError::Corrupt(format!("{}: unexpected end of file", context))
        }
        _ => StoreError::Io(format!("{}: {}", context, error)),
    }
}
