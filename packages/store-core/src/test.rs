//! Tests for the store format, WAL sidecar, and lifecycle operations.

use std::fs;
use std::path::Path;

use ntest::timeout;
use tempfile::tempdir;

use crate::coordinator;
use crate::error::StoreError;
use crate::metadata::{AttributeStamp, StoreMetadata};
use crate::store::{StoreReader, StoreWriter};
use crate::types::{AttrType, Record, Value};
use crate::wal::{wal_path, WalWriter};

fn item_metadata() -> StoreMetadata {
    let mut metadata = StoreMetadata {
        format_version: crate::format::FORMAT_VERSION,
        entities: Default::default(),
    };
    metadata.entities.insert(
        "Item".to_string(),
        vec![AttributeStamp {
            name: "timestamp".to_string(),
            ty: AttrType::Timestamp,
            optional: false,
        }],
    );
    metadata
}

fn item_record(id: u64, ts: i64) -> Record {
    Record::new(id).with("timestamp", Value::Timestamp(ts))
}

fn write_items(path: &Path, count: u64) {
    let mut writer = StoreWriter::create(path, &item_metadata()).unwrap();
    for id in 1..=count {
        writer.append("Item", item_record(id, id as i64 * 100)).unwrap();
    }
    writer.finish().unwrap();
}

#[timeout(1000)]
#[test]
fn test_store_write_read_roundtrip() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("items.store");

    write_items(&path, 3);

    let mut reader = StoreReader::open(&path).unwrap();
    assert_eq!(*reader.metadata(), item_metadata());

    let records: Vec<_> = reader.records().collect::<Result<_, _>>().unwrap();
    assert_eq!(records.len(), 3);
    for (i, (entity, record)) in records.iter().enumerate() {
        assert_eq!(entity, "Item");
        assert_eq!(record.id, i as u64 + 1);
        assert_eq!(
            record.values.get("timestamp"),
            Some(&Value::Timestamp((i as i64 + 1) * 100))
        );
    }
}

#[timeout(1000)]
#[test]
fn test_create_refuses_existing_path() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("items.store");
    write_items(&path, 1);

    let result = StoreWriter::create(&path, &item_metadata());
    assert!(matches!(result, Err(StoreError::AlreadyExists { .. })));
}

#[timeout(1000)]
#[test]
fn test_reader_rejects_bad_magic() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("items.store");
    fs::write(&path, b"NOTASTORE-at-all").unwrap();

    let result = StoreReader::open(&path);
    assert!(matches!(result, Err(StoreError::Corrupt(_))));
}

#[timeout(1000)]
#[test]
fn test_reader_rejects_missing_trailer() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("items.store");
    write_items(&path, 2);

    // Drop the trailer (sentinel + crc).
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 8]).unwrap();

    let mut reader = StoreReader::open(&path).unwrap();
    let result: Result<Vec<_>, _> = reader.records().collect();
    assert!(matches!(result, Err(StoreError::Corrupt(_))));
}

#[timeout(1000)]
#[test]
fn test_reader_rejects_flipped_body_byte() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("items.store");
    write_items(&path, 2);

    let mut bytes = fs::read(&path).unwrap();
    let flip = bytes.len() - 12;
    bytes[flip] ^= 0xff;
    fs::write(&path, &bytes).unwrap();

    let mut reader = StoreReader::open(&path).unwrap();
    let result: Result<Vec<_>, _> = reader.records().collect();
    assert!(result.is_err());
}

#[timeout(1000)]
#[test]
fn test_checkpoint_merges_wal_in_order() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("items.store");
    write_items(&path, 2);

    let mut wal = WalWriter::open(&path).unwrap();
    wal.append("Item", item_record(3, 300)).unwrap();
    wal.append("Item", item_record(4, 400)).unwrap();
    wal.sync().unwrap();

    coordinator::checkpoint(&path).unwrap();
    assert!(!wal_path(&path).exists());

    let mut reader = StoreReader::open(&path).unwrap();
    let ids: Vec<u64> = reader
        .records()
        .map(|r| r.unwrap().1.id)
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[timeout(1000)]
#[test]
fn test_checkpoint_without_wal_is_byte_level_noop() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("items.store");
    write_items(&path, 2);

    let before = fs::read(&path).unwrap();
    coordinator::checkpoint(&path).unwrap();
    let after = fs::read(&path).unwrap();
    assert_eq!(before, after);
}

#[timeout(1000)]
#[test]
fn test_checkpoint_of_missing_store_is_noop() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("absent.store");
    coordinator::checkpoint(&path).unwrap();
    assert!(!path.exists());
}

#[timeout(1000)]
#[test]
fn test_read_metadata_of_missing_or_damaged_store() {
    let temp_dir = tempdir().unwrap();

    let missing = temp_dir.path().join("absent.store");
    assert!(coordinator::read_metadata(&missing).unwrap().is_none());

    let damaged = temp_dir.path().join("damaged.store");
    fs::write(&damaged, b"garbage").unwrap();
    assert!(coordinator::read_metadata(&damaged).unwrap().is_none());

    let valid = temp_dir.path().join("items.store");
    write_items(&valid, 1);
    assert_eq!(
        coordinator::read_metadata(&valid).unwrap(),
        Some(item_metadata())
    );
}

#[timeout(1000)]
#[test]
fn test_replace_swaps_content_and_clears_stale_wal() {
    let temp_dir = tempdir().unwrap();
    let target = temp_dir.path().join("live.store");
    let incoming = temp_dir.path().join("migrated.store");
    write_items(&target, 1);
    write_items(&incoming, 3);

    let mut wal = WalWriter::open(&target).unwrap();
    wal.append("Item", item_record(9, 900)).unwrap();
    wal.sync().unwrap();

    coordinator::replace(&target, &incoming).unwrap();
    assert!(!incoming.exists());
    assert!(!wal_path(&target).exists());

    let mut reader = StoreReader::open(&target).unwrap();
    assert_eq!(reader.records().count(), 3);
}

#[timeout(1000)]
#[test]
fn test_destroy_removes_all_backing_files() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("items.store");
    write_items(&path, 1);

    let mut wal = WalWriter::open(&path).unwrap();
    wal.append("Item", item_record(2, 200)).unwrap();
    wal.sync().unwrap();

    coordinator::destroy(&path).unwrap();
    assert!(!path.exists());
    assert!(!wal_path(&path).exists());

    // Destroying an already-absent store is fine.
    coordinator::destroy(&path).unwrap();
}
