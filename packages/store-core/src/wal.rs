//! Write-ahead-log sidecar: append and ordered replay.
//!
//! The sidecar lives next to the store file as `<store>.wal` and holds
//! record frames not yet merged into the main file. It is cleared only by a
//! checkpoint.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::format::{read_wal_frame, read_wal_header, write_frame, write_wal_header, RecordFrame};
use crate::io_utils::classify_io_error;
use crate::types::Record;

/// Path of the write-ahead-log sidecar for a store.
pub fn wal_path(store: &Path) -> PathBuf {
    let mut os: OsString = store.as_os_str().to_os_string();
    os.push(".wal");
    PathBuf::from(os)
}

/// Appender for a store's write-ahead-log sidecar.
pub struct WalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl WalWriter {
    /// Opens the sidecar for the given store, creating it (with a header)
    /// if it does not exist yet.
    pub fn open(store: &Path) -> Result<Self, StoreError> {
        let path = wal_path(store);
        let fresh = !path.exists();
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| {
                classify_io_error(e, &format!("opening write-ahead log at {}", path.display()))
            })?;

        let mut writer = BufWriter::new(file);
        if fresh {
            write_wal_header(&mut writer)?;
        }

        Ok(Self { path, writer })
    }

    /// Appends one pending record write.
    pub fn append(&mut self, entity: &str, record: Record) -> Result<(), StoreError> {
        let frame = RecordFrame {
            entity: entity.to_string(),
            record,
        };
        write_frame(&mut self.writer, None, &frame)
    }

    /// Flushes buffered frames to disk.
    pub fn sync(&mut self) -> Result<(), StoreError> {
        self.writer.flush().map_err(|e| {
            classify_io_error(
                e,
                &format!("flushing write-ahead log at {}", self.path.display()),
            )
        })?;
        self.writer.get_ref().sync_all().map_err(|e| {
            classify_io_error(
                e,
                &format!("syncing write-ahead log at {}", self.path.display()),
            )
        })
    }
}

/// Ordered reader over a store's write-ahead-log sidecar.
pub struct WalReader {
    reader: BufReader<File>,
}

impl WalReader {
    /// Opens the sidecar for the given store, or `None` if there is no
    /// sidecar on disk.
    pub fn open(store: &Path) -> Result<Option<Self>, StoreError> {
        let path = wal_path(store);
        if !path.exists() {
            return Ok(None);
        }

        let file = File::open(&path).map_err(|e| {
            classify_io_error(e, &format!("opening write-ahead log at {}", path.display()))
        })?;
        let mut reader = BufReader::new(file);
        read_wal_header(&mut reader)?;

        Ok(Some(Self { reader }))
    }

    /// Reads the next pending frame in append order, or `None` at the end.
    pub fn next_frame(&mut self) -> Result<Option<RecordFrame>, StoreError> {
        read_wal_frame(&mut self.reader)
    }
}
