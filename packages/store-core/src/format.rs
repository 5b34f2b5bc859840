//! Store file format: header, record frames, and integrity trailer.
//!
//! A store file is a fixed header (magic, format version, metadata) followed
//! by a stream of length-prefixed record frames and a CRC32 trailer. The
//! write-ahead-log sidecar reuses the frame encoding with its own magic and
//! no trailer.

use std::io::{ErrorKind, Read, Write};

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::io_utils::classify_io_error;
use crate::metadata::StoreMetadata;
use crate::types::Record;

/// Magic number for store files: "RECSTOR" in ASCII
pub const STORE_MAGIC: [u8; 8] = *b"RECSTOR\x00";
/// Magic number for write-ahead-log sidecars: "RECWAL" in ASCII
pub const WAL_MAGIC: [u8; 8] = *b"RECWAL\x00\x00";
/// Current on-disk format version
pub const FORMAT_VERSION: u32 = 1;
/// Frame-length sentinel that marks the integrity trailer
pub const TRAILER_SENTINEL: u32 = u32::MAX;
/// Upper bound on a single frame, guards against corrupt length prefixes
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// One record of one entity as framed on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFrame {
    /// Entity the record belongs to
    pub entity: String,
    /// The record payload
    pub record: Record,
}

/// Item produced when walking a store body.
#[derive(Debug)]
pub enum BodyItem {
    /// A record frame
    Frame(RecordFrame),
    /// The integrity trailer with the stored body checksum
    Trailer { crc: u32 },
}

/// Writes the store header: magic, format version, and checksummed metadata.
pub fn write_store_header<W: Write>(
    writer: &mut W,
    metadata: &StoreMetadata,
) -> Result<(), StoreError> {
    let payload = bincode::serialize(metadata)
        .map_err(|e| StoreError::Serialization(format!("failed to encode store metadata: {}", e)))?;

    let mut hasher = Hasher::new();
    hasher.update(&payload);
    let crc = hasher.finalize();

    writer
        .write_all(&STORE_MAGIC)
        .and_then(|_| writer.write_all(&FORMAT_VERSION.to_le_bytes()))
        .and_then(|_| writer.write_all(&(payload.len() as u32).to_le_bytes()))
        .and_then(|_| writer.write_all(&crc.to_le_bytes()))
        .and_then(|_| writer.write_all(&payload))
        .map_err(|e| classify_io_error(e, "writing store header"))?;

    Ok(())
}

/// Reads and validates the store header, returning the metadata.
pub fn read_store_header<R: Read>(reader: &mut R) -> Result<StoreMetadata, StoreError> {
    let mut magic = [0u8; 8];
    reader
        .read_exact(&mut magic)
        .map_err(|e| classify_io_error(e, "reading store magic"))?;
    if magic != STORE_MAGIC {
        return Err(StoreError::Corrupt("bad store magic".to_string()));
    }

    let version = read_u32(reader, "reading store format version")?;
    if version != FORMAT_VERSION {
        return Err(StoreError::UnsupportedFormat {
            found: version,
            expected: FORMAT_VERSION,
        });
    }

    let len = read_u32(reader, "reading store metadata length")?;
    if len > MAX_FRAME_LEN {
        return Err(StoreError::Corrupt(format!(
            "metadata length {} exceeds limit {}",
            len, MAX_FRAME_LEN
        )));
    }
    let stored_crc = read_u32(reader, "reading store metadata checksum")?;

    let mut payload = vec![0u8; len as usize];
    reader
        .read_exact(&mut payload)
        .map_err(|e| classify_io_error(e, "reading store metadata"))?;

    let mut hasher = Hasher::new();
    hasher.update(&payload);
    let actual_crc = hasher.finalize();
    if actual_crc != stored_crc {
        return Err(StoreError::Corrupt(format!(
            "metadata checksum mismatch: expected {:08x}, got {:08x}",
            stored_crc, actual_crc
        )));
    }

    bincode::deserialize(&payload)
        .map_err(|e| StoreError::Serialization(format!("failed to decode store metadata: {}", e)))
}

/// Writes the write-ahead-log header: magic and format version.
pub fn write_wal_header<W: Write>(writer: &mut W) -> Result<(), StoreError> {
    writer
        .write_all(&WAL_MAGIC)
        .and_then(|_| writer.write_all(&FORMAT_VERSION.to_le_bytes()))
        .map_err(|e| classify_io_error(e, "writing write-ahead log header"))?;
    Ok(())
}

/// Reads and validates the write-ahead-log header.
pub fn read_wal_header<R: Read>(reader: &mut R) -> Result<(), StoreError> {
    let mut magic = [0u8; 8];
    reader
        .read_exact(&mut magic)
        .map_err(|e| classify_io_error(e, "reading write-ahead log magic"))?;
    if magic != WAL_MAGIC {
        return Err(StoreError::Corrupt("bad write-ahead log magic".to_string()));
    }

    let version = read_u32(reader, "reading write-ahead log format version")?;
    if version != FORMAT_VERSION {
        return Err(StoreError::UnsupportedFormat {
            found: version,
            expected: FORMAT_VERSION,
        });
    }

    Ok(())
}

/// Writes a single record frame, feeding the body hasher when present.
///
/// Store bodies hash every frame byte (length prefix included) for the
/// trailer; write-ahead logs carry no trailer and pass `None`.
pub fn write_frame<W: Write>(
    writer: &mut W,
    hasher: Option<&mut Hasher>,
    frame: &RecordFrame,
) -> Result<(), StoreError> {
    let payload = bincode::serialize(frame)
        .map_err(|e| StoreError::Serialization(format!("failed to encode record frame: {}", e)))?;
    if payload.len() as u64 > MAX_FRAME_LEN as u64 {
        return Err(StoreError::Serialization(format!(
            "record frame of {} bytes exceeds limit {}",
            payload.len(),
            MAX_FRAME_LEN
        )));
    }

    let len_bytes = (payload.len() as u32).to_le_bytes();
    writer
        .write_all(&len_bytes)
        .and_then(|_| writer.write_all(&payload))
        .map_err(|e| classify_io_error(e, "writing record frame"))?;

    if let Some(hasher) = hasher {
        hasher.update(&len_bytes);
        hasher.update(&payload);
    }

    Ok(())
}

/// Writes the integrity trailer: the sentinel and the body checksum.
pub fn write_trailer<W: Write>(writer: &mut W, hasher: &Hasher) -> Result<(), StoreError> {
    let crc = hasher.clone().finalize();
    writer
        .write_all(&TRAILER_SENTINEL.to_le_bytes())
        .and_then(|_| writer.write_all(&crc.to_le_bytes()))
        .map_err(|e| classify_io_error(e, "writing store trailer"))?;
    Ok(())
}

/// Reads the next body item: a record frame or the trailer.
///
/// A store body must end with a trailer; running out of bytes before one
/// is corruption, never a clean end.
pub fn read_body_item<R: Read>(reader: &mut R, hasher: &mut Hasher) -> Result<BodyItem, StoreError> {
    let len_bytes = match read_len_prefix(reader)? {
        Some(bytes) => bytes,
        None => {
            return Err(StoreError::Corrupt(
                "store body ends without integrity trailer".to_string(),
            ))
        }
    };

    let len = u32::from_le_bytes(len_bytes);
    if len == TRAILER_SENTINEL {
        let crc = read_u32(reader, "reading store trailer")?;
        return Ok(BodyItem::Trailer { crc });
    }

    let payload = read_payload(reader, len, "reading record frame")?;
    hasher.update(&len_bytes);
    hasher.update(&payload);

    let frame = bincode::deserialize(&payload)
        .map_err(|e| StoreError::Serialization(format!("failed to decode record frame: {}", e)))?;
    Ok(BodyItem::Frame(frame))
}

/// Reads the next write-ahead-log frame, or `None` at a clean end of file.
///
/// A partially written trailing frame is corruption: the log only holds
/// fully flushed writes.
pub fn read_wal_frame<R: Read>(reader: &mut R) -> Result<Option<RecordFrame>, StoreError> {
    let len_bytes = match read_len_prefix(reader)? {
        Some(bytes) => bytes,
        None => return Ok(None),
    };

    let len = u32::from_le_bytes(len_bytes);
    if len == TRAILER_SENTINEL {
        return Err(StoreError::Corrupt(
            "unexpected trailer in write-ahead log".to_string(),
        ));
    }

    let payload = read_payload(reader, len, "reading write-ahead log frame")?;
    let frame = bincode::deserialize(&payload).map_err(|e| {
        StoreError::Serialization(format!("failed to decode write-ahead log frame: {}", e))
    })?;
    Ok(Some(frame))
}

fn read_payload<R: Read>(reader: &mut R, len: u32, context: &str) -> Result<Vec<u8>, StoreError> {
    if len > MAX_FRAME_LEN {
        return Err(StoreError::Corrupt(format!(
            "frame length {} exceeds limit {}",
            len, MAX_FRAME_LEN
        )));
    }
    let mut payload = vec![0u8; len as usize];
    reader
        .read_exact(&mut payload)
        .map_err(|e| classify_io_error(e, context))?;
    Ok(payload)
}

fn read_u32<R: Read>(reader: &mut R, context: &str) -> Result<u32, StoreError> {
    let mut bytes = [0u8; 4];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| classify_io_error(e, context))?;
    Ok(u32::from_le_bytes(bytes))
}

/// Reads a 4-byte length prefix, distinguishing a clean end of file
/// (`None`) from a truncated prefix (corruption).
fn read_len_prefix<R: Read>(reader: &mut R) -> Result<Option<[u8; 4]>, StoreError> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < 4 {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(StoreError::Corrupt(
                    "truncated frame length prefix".to_string(),
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(classify_io_error(e, "reading frame length")),
        }
    }
    Ok(Some(buf))
}
