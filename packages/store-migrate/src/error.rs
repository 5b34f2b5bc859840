//! Migration error types.

use std::path::PathBuf;

use thiserror::Error;

use store_core::StoreError;

use crate::version::SchemaVersion;

/// Migration operation errors.
///
/// Every variant except [`MigrationError::DestroyFailed`] aborts the whole
/// migration; `DestroyFailed` covers cleanup of superseded intermediates
/// and is logged, never surfaced as the outcome.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// No schema artifact exists for the version
    #[error("no schema definition found for version '{version}'")]
    SchemaNotFound { version: SchemaVersion },

    /// A schema or mapping artifact exists but cannot be loaded
    #[error("schema artifact for version '{version}' could not be loaded: {reason}")]
    SchemaCorrupt {
        version: SchemaVersion,
        reason: String,
    },

    /// Neither a custom nor an inferred mapping covers the step
    #[error("no mapping available from '{from_version}' to '{destination}'")]
    NoMappingAvailable {
        from_version: SchemaVersion,
        destination: SchemaVersion,
    },

    /// The version chain does not lead from source to destination
    #[error("no migration path from '{from_version}' to '{destination}'")]
    NoMigrationPath {
        from_version: SchemaVersion,
        destination: SchemaVersion,
    },

    /// The store matches no known schema version
    #[error("store at '{}' does not match any known schema version", .store.display())]
    UnknownStoreVersion { store: PathBuf },

    /// Flushing the write-ahead log before migration failed
    #[error("failed to checkpoint store at '{}': {source}", .store.display())]
    CheckpointFailed {
        store: PathBuf,
        source: StoreError,
    },

    /// A single migration step failed; the whole operation is aborted
    #[error("migration step '{from_version}' -> '{destination}' failed: {cause}")]
    MigrationFailed {
        from_version: SchemaVersion,
        destination: SchemaVersion,
        cause: StepError,
    },

    /// The final atomic swap onto the original location failed
    #[error("failed to replace store at '{}' with migrated store at '{}': {source}", .store.display(), .with.display())]
    ReplaceFailed {
        store: PathBuf,
        with: PathBuf,
        source: StoreError,
    },

    /// Removing the files backing an intermediate store failed (non-fatal)
    #[error("failed to destroy store at '{}': {source}", .store.display())]
    DestroyFailed {
        store: PathBuf,
        source: StoreError,
    },

    /// I/O failure while reading store metadata
    #[error("failed to read metadata of store at '{}': {source}", .store.display())]
    MetadataUnreadable {
        store: PathBuf,
        source: StoreError,
    },
}

/// Failure inside a single migration step.
#[derive(Error, Debug)]
pub enum StepError {
    /// Store I/O or integrity failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Required destination attribute has no value and no default
    #[error("entity '{entity}' record {id}: required attribute '{attribute}' has no value and no default")]
    MissingValue {
        entity: String,
        id: u64,
        attribute: String,
    },

    /// Value does not conform to the destination attribute type
    #[error("entity '{entity}' record {id}: attribute '{attribute}' expected {expected}, got {got}")]
    TypeMismatch {
        entity: String,
        id: u64,
        attribute: String,
        expected: String,
        got: String,
    },

    /// Value cannot be coerced to the destination attribute type
    #[error("entity '{entity}' record {id}: cannot coerce attribute '{attribute}' value {value} to {target}")]
    Uncoercible {
        entity: String,
        id: u64,
        attribute: String,
        value: String,
        target: String,
    },

    /// Reference points at a dropped entity or a record that does not exist
    #[error("entity '{entity}' record {id}: attribute '{attribute}' references {target} record {target_id}, which has no counterpart in the destination")]
    DanglingReference {
        entity: String,
        id: u64,
        attribute: String,
        target: String,
        target_id: u64,
    },

    /// Two source records of one entity share an id
    #[error("entity '{entity}' contains duplicate record id {id}")]
    DuplicateRecord { entity: String, id: u64 },

    /// Mapping refers to an entity or attribute the destination model
    /// does not declare
    #[error("mapping refers to '{name}', which the destination model does not declare")]
    NotInModel { name: String },
}
