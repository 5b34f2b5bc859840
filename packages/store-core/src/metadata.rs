//! Store metadata: the structural fingerprint readable without a full open.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::AttrType;

/// Shape of a single attribute as persisted in store metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeStamp {
    /// Attribute name
    pub name: String,
    /// Attribute type
    pub ty: AttrType,
    /// Whether the attribute may be absent
    pub optional: bool,
}

/// Ordered attribute stamps of one entity.
pub type EntityStamp = Vec<AttributeStamp>;

/// Structural fingerprint of a store, persisted in the file header.
///
/// Two schemas are compatible with the same store exactly when they
/// produce identical metadata, so at most one version in a catalog of
/// distinct schemas can claim a given store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// On-disk format version the store was written with
    pub format_version: u32,
    /// Entity stamps keyed by entity name
    pub entities: BTreeMap<String, EntityStamp>,
}
