//! Logical schema model: entities, attributes, and store fingerprints.

mod registry;

pub use registry::SchemaRegistry;

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use store_core::format::FORMAT_VERSION;
use store_core::{AttrType, AttributeStamp, StoreMetadata, Value};

use crate::version::SchemaVersion;

/// The logical shape of a store at one schema version.
///
/// Loaded from an external JSON artifact keyed by version name; immutable
/// once loaded. Relationships are attributes of type [`AttrType::Ref`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// The version this definition describes
    pub version: SchemaVersion,
    /// Entity definitions keyed by entity name
    pub entities: BTreeMap<String, EntityDef>,
}

/// One entity of a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Attribute definitions in declared order
    pub attributes: Vec<AttributeDef>,
}

/// One attribute of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    /// Attribute name
    pub name: String,
    /// Attribute type
    #[serde(rename = "type")]
    pub ty: AttrType,
    /// Whether the attribute may be absent
    #[serde(default)]
    pub optional: bool,
    /// Value filled in when a record carries none
    #[serde(default)]
    pub default: Option<Value>,
}

impl EntityDef {
    /// Looks up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

impl SchemaDefinition {
    /// Computes the structural fingerprint a store at this version carries
    /// in its metadata header.
    pub fn stamp(&self) -> StoreMetadata {
        let entities = self
            .entities
            .iter()
            .map(|(name, entity)| {
                let stamps = entity
                    .attributes
                    .iter()
                    .map(|a| AttributeStamp {
                        name: a.name.clone(),
                        ty: a.ty.clone(),
                        optional: a.optional,
                    })
                    .collect();
                (name.clone(), stamps)
            })
            .collect();

        StoreMetadata {
            format_version: FORMAT_VERSION,
            entities,
        }
    }

    /// Returns true if a store with the given metadata conforms to this
    /// schema.
    pub fn is_compatible(&self, metadata: &StoreMetadata) -> bool {
        self.stamp() == *metadata
    }

    /// Validates structural integrity of the definition.
    pub fn validate(&self) -> Result<(), String> {
        for (entity_name, entity) in &self.entities {
            let mut seen = HashSet::new();
            for attr in &entity.attributes {
                if !seen.insert(&attr.name) {
                    return Err(format!(
                        "duplicate attribute '{}' in entity '{}'",
                        attr.name, entity_name
                    ));
                }

                if let AttrType::Ref { entity: target } = &attr.ty {
                    if !self.entities.contains_key(target) {
                        return Err(format!(
                            "attribute '{}' of entity '{}' references undeclared entity '{}'",
                            attr.name, entity_name, target
                        ));
                    }
                }

                if let Some(default) = &attr.default {
                    if !default.conforms_to(&attr.ty) {
                        return Err(format!(
                            "default for attribute '{}' of entity '{}' is {}, expected {}",
                            attr.name,
                            entity_name,
                            default.type_name(),
                            attr.ty
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}
