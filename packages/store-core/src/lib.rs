//! On-disk record store used by the migration engine.
//!
//! Provides the store file format, streaming record I/O, the
//! write-ahead-log sidecar, and low-level store lifecycle operations
//! (metadata inspection, checkpointing, atomic replacement, destruction).

pub mod coordinator;
pub mod error;
pub mod format;
pub mod io_utils;
pub mod metadata;
pub mod store;
pub mod types;
pub mod wal;

#[cfg(test)]
mod test;

pub use error::StoreError;
pub use metadata::{AttributeStamp, EntityStamp, StoreMetadata};
pub use store::{StoreReader, StoreWriter};
pub use types::{AttrType, Record, Value};
