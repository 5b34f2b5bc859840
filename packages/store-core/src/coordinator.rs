//! Low-level store lifecycle: metadata inspection, WAL checkpointing,
//! atomic replacement, and destruction.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::format::read_store_header;
use crate::io_utils::classify_io_error;
use crate::metadata::StoreMetadata;
use crate::store::{StoreReader, StoreWriter};
use crate::wal::{wal_path, WalReader};

/// Path of the scratch file a checkpoint rewrites the store through.
fn tmp_path(store: &Path) -> PathBuf {
    let mut os: OsString = store.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Reads store metadata without a full open.
///
/// Returns `Ok(None)` when the store does not exist or its metadata is
/// unreadable; callers treat both as "no store to speak of". Only I/O
/// failures against an otherwise present store are errors.
pub fn read_metadata(store: &Path) -> Result<Option<StoreMetadata>, StoreError> {
    let file = match File::open(store) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(classify_io_error(
                e,
                &format!("opening store at {}", store.display()),
            ))
        }
    };

    let mut reader = BufReader::new(file);
    match read_store_header(&mut reader) {
        Ok(metadata) => Ok(Some(metadata)),
        Err(StoreError::Corrupt(reason)) => {
            tracing::debug!(
                "store at {} has unreadable metadata: {}",
                store.display(),
                reason
            );
            Ok(None)
        }
        Err(StoreError::UnsupportedFormat { found, .. }) => {
            tracing::debug!(
                "store at {} uses unsupported format version {}",
                store.display(),
                found
            );
            Ok(None)
        }
        Err(StoreError::Serialization(reason)) => {
            tracing::debug!(
                "store at {} has undecodable metadata: {}",
                store.display(),
                reason
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Merges any pending write-ahead-log content into the main store file.
///
/// After a checkpoint the main file is a self-consistent snapshot of every
/// committed write and the sidecar is gone. A missing store or a missing or
/// empty sidecar is a no-op, not an error.
pub fn checkpoint(store: &Path) -> Result<(), StoreError> {
    if !store.exists() {
        return Ok(());
    }

    let mut wal = match WalReader::open(store)? {
        Some(wal) => wal,
        None => return Ok(()),
    };

    let first = match wal.next_frame()? {
        Some(frame) => frame,
        None => {
            // Header-only sidecar: nothing pending, just drop it.
            fs::remove_file(wal_path(store)).map_err(|e| {
                classify_io_error(
                    e,
                    &format!("removing empty write-ahead log for {}", store.display()),
                )
            })?;
            return Ok(());
        }
    };

    let mut reader = StoreReader::open(store)?;
    let metadata = reader.metadata().clone();

    let scratch = tmp_path(store);
    if scratch.exists() {
        // Leftover from an interrupted checkpoint; the main file is still
        // authoritative.
        fs::remove_file(&scratch).map_err(|e| {
            classify_io_error(
                e,
                &format!("removing stale checkpoint file {}", scratch.display()),
            )
        })?;
    }

    let mut writer = StoreWriter::create(&scratch, &metadata)?;
    while let Some((entity, record)) = reader.next_record()? {
        writer.append(&entity, record)?;
    }

    let mut appended = 1usize;
    writer.append(&first.entity, first.record)?;
    while let Some(frame) = wal.next_frame()? {
        writer.append(&frame.entity, frame.record)?;
        appended += 1;
    }
    writer.finish()?;

    fs::rename(&scratch, store).map_err(|e| {
        classify_io_error(
            e,
            &format!("installing checkpointed store at {}", store.display()),
        )
    })?;
    fs::remove_file(wal_path(store)).map_err(|e| {
        classify_io_error(
            e,
            &format!("removing write-ahead log for {}", store.display()),
        )
    })?;

    tracing::debug!(
        "checkpointed {} pending frames into store at {}",
        appended,
        store.display()
    );
    Ok(())
}

/// Atomically swaps the store at `target` for the one at `with`.
///
/// `target` subsequently reads as the new content; no observer ever sees it
/// half-written.
pub fn replace(target: &Path, with: &Path) -> Result<(), StoreError> {
    // Any sidecar of the old store was checkpointed before migration began
    // and must not outlive the swap.
    let stale_wal = wal_path(target);
    if stale_wal.exists() {
        fs::remove_file(&stale_wal).map_err(|e| {
            classify_io_error(
                e,
                &format!("removing stale write-ahead log at {}", stale_wal.display()),
            )
        })?;
    }

    fs::rename(with, target).map_err(|e| {
        classify_io_error(
            e,
            &format!(
                "replacing store at {} with {}",
                target.display(),
                with.display()
            ),
        )
    })?;

    tracing::debug!(
        "replaced store at {} with {}",
        target.display(),
        with.display()
    );
    Ok(())
}

/// Permanently removes all files backing a store: the main file and any
/// `.wal` or `.tmp` sidecars. Missing files are not an error.
pub fn destroy(store: &Path) -> Result<(), StoreError> {
    for path in [store.to_path_buf(), wal_path(store), tmp_path(store)] {
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(classify_io_error(
                    e,
                    &format!("destroying store file {}", path.display()),
                ))
            }
        }
    }
    Ok(())
}
