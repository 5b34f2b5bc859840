//! Streaming store reader and writer.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;

use crate::error::StoreError;
use crate::format::{
    read_body_item, read_store_header, write_frame, write_store_header, write_trailer, BodyItem,
    RecordFrame,
};
use crate::io_utils::classify_io_error;
use crate::metadata::StoreMetadata;
use crate::types::Record;

/// Writer producing a new store file.
///
/// The trailer is only written by [`StoreWriter::finish`]; a writer dropped
/// mid-stream leaves a file without a valid trailer, which readers reject,
/// so a partial store can never be mistaken for a complete one.
pub struct StoreWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    hasher: Hasher,
}

impl StoreWriter {
    /// Creates a new store at `path` with the given metadata.
    ///
    /// The path must not already exist.
    pub fn create(path: &Path, metadata: &StoreMetadata) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| {
                if e.kind() == ErrorKind::AlreadyExists {
                    StoreError::AlreadyExists {
                        path: path.display().to_string(),
                    }
                } else {
                    classify_io_error(e, &format!("creating store at {}", path.display()))
                }
            })?;

        let mut writer = BufWriter::new(file);
        write_store_header(&mut writer, metadata)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            hasher: Hasher::new(),
        })
    }

    /// Appends one record of the given entity.
    pub fn append(&mut self, entity: &str, record: Record) -> Result<(), StoreError> {
        let frame = RecordFrame {
            entity: entity.to_string(),
            record,
        };
        write_frame(&mut self.writer, Some(&mut self.hasher), &frame)
    }

    /// Writes the integrity trailer and flushes the file to disk.
    pub fn finish(mut self) -> Result<PathBuf, StoreError> {
        write_trailer(&mut self.writer, &self.hasher)?;
        self.writer
            .flush()
            .map_err(|e| classify_io_error(e, &format!("flushing store at {}", self.path.display())))?;
        self.writer
            .get_ref()
            .sync_all()
            .map_err(|e| classify_io_error(e, &format!("syncing store at {}", self.path.display())))?;
        Ok(self.path)
    }
}

/// Read-only streaming reader over a store file.
///
/// Holds one frame in memory at a time and verifies the body checksum when
/// the trailer is reached.
pub struct StoreReader {
    path: PathBuf,
    metadata: StoreMetadata,
    reader: BufReader<File>,
    hasher: Hasher,
    done: bool,
}

impl StoreReader {
    /// Opens a store read-only, validating magic, format version, and
    /// metadata checksum.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let file = File::open(path)
            .map_err(|e| classify_io_error(e, &format!("opening store at {}", path.display())))?;
        let mut reader = BufReader::new(file);
        let metadata = read_store_header(&mut reader)?;

        Ok(Self {
            path: path.to_path_buf(),
            metadata,
            reader,
            hasher: Hasher::new(),
            done: false,
        })
    }

    /// The store's metadata as read from the header.
    pub fn metadata(&self) -> &StoreMetadata {
        &self.metadata
    }

    /// Reads the next `(entity, record)` pair, or `None` once the trailer
    /// has been reached and verified.
    pub fn next_record(&mut self) -> Result<Option<(String, Record)>, StoreError> {
        if self.done {
            return Ok(None);
        }

        match read_body_item(&mut self.reader, &mut self.hasher)? {
            BodyItem::Frame(frame) => Ok(Some((frame.entity, frame.record))),
            BodyItem::Trailer { crc } => {
                let actual = self.hasher.clone().finalize();
                if actual != crc {
                    return Err(StoreError::Corrupt(format!(
                        "body checksum mismatch for store at {}: expected {:08x}, got {:08x}",
                        self.path.display(),
                        crc,
                        actual
                    )));
                }
                self.done = true;
                Ok(None)
            }
        }
    }

    /// Iterator over all remaining records.
    pub fn records(&mut self) -> Records<'_> {
        Records { reader: self }
    }
}

/// Streaming iterator returned by [`StoreReader::records`].
pub struct Records<'a> {
    reader: &'a mut StoreReader,
}

impl Iterator for Records<'_> {
    type Item = Result<(String, Record), StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_record().transpose()
    }
}
