//! Mapping specification: how one schema version's records become the
//! next's.

mod resolver;


pub use resolver::MappingResolver;

use serde::{Deserialize, Serialize};

use store_core::{AttrType, Value};

use crate::schema::SchemaDefinition;
use crate::version::SchemaVersion;

/// Declarative transformation between two consecutive schema versions.
///
/// Origin is either a custom artifact authored for exactly this version
/// pair, or a specification inferred from structural similarity. Custom
/// always wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingSpecification {
    pub source_version: SchemaVersion,
    pub destination_version: SchemaVersion,
    pub entities: Vec<EntityMapping>,
}

/// Mapping for one destination entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMapping {
    /// Source entity feeding this destination entity; `None` for an entity
    /// introduced by the destination schema (starts empty)
    #[serde(default)]
    pub source_entity: Option<String>,
    /// Destination entity name
    pub destination_entity: String,
    /// Attribute mappings for the destination entity
    pub attributes: Vec<AttributeMapping>,
}

/// Mapping for one destination attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeMapping {
    /// Destination attribute name
    pub destination: String,
    /// Where the value comes from
    pub source: AttributeSource,
}

/// Source of a destination attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeSource {
    /// Copy the source attribute unchanged
    Copy { from: String },
    /// Coerce the source attribute to the destination type
    Coerce { from: String },
    /// Fill with a fixed value
    Default { value: Value },
    /// Fill with `Null` (destination attribute must be optional)
    Null,
}

impl MappingSpecification {
    /// The mapping entry fed by the given source entity, if any.
    pub fn entity_for_source(&self, entity: &str) -> Option<&EntityMapping> {
        self.entities
            .iter()
            .find(|em| em.source_entity.as_deref() == Some(entity))
    }

    /// Returns true if the mapping carries records of source entity
    /// `source` into destination entity `destination`.
    pub fn maps_entity(&self, source: &str, destination: &str) -> bool {
        self.entities
            .iter()
            .any(|em| em.source_entity.as_deref() == Some(source) && em.destination_entity == destination)
    }

    /// Validates the specification against both schema definitions.
    ///
    /// A valid mapping is total: every destination attribute is either
    /// mapped here or covered by a default or optionality in the
    /// destination schema.
    pub fn validate(
        &self,
        source: &SchemaDefinition,
        destination: &SchemaDefinition,
    ) -> Result<(), String> {
        if self.source_version != source.version || self.destination_version != destination.version
        {
            return Err(format!(
                "mapping declares versions '{}' -> '{}', models are '{}' -> '{}'",
                self.source_version, self.destination_version, source.version, destination.version
            ));
        }

        let mut seen_sources = Vec::new();
        let mut seen_destinations = Vec::new();

        for em in &self.entities {
            if seen_destinations.contains(&&em.destination_entity) {
                return Err(format!(
                    "destination entity '{}' is mapped twice",
                    em.destination_entity
                ));
            }
            seen_destinations.push(&em.destination_entity);

            let dest_entity = destination
                .entities
                .get(&em.destination_entity)
                .ok_or_else(|| {
                    format!(
                        "destination entity '{}' is not declared by the destination model",
                        em.destination_entity
                    )
                })?;

            let source_entity = match &em.source_entity {
                Some(name) => {
                    if seen_sources.contains(&name) {
                        return Err(format!("source entity '{}' is mapped twice", name));
                    }
                    seen_sources.push(name);
                    Some(source.entities.get(name).ok_or_else(|| {
                        format!("source entity '{}' is not declared by the source model", name)
                    })?)
                }
                None => None,
            };

            let mut mapped = Vec::new();
            for am in &em.attributes {
                if mapped.contains(&&am.destination) {
                    return Err(format!(
                        "attribute '{}' of entity '{}' is mapped twice",
                        am.destination, em.destination_entity
                    ));
                }
                mapped.push(&am.destination);

                let dest_attr = dest_entity.attribute(&am.destination).ok_or_else(|| {
                    format!(
                        "attribute '{}' is not declared by destination entity '{}'",
                        am.destination, em.destination_entity
                    )
                })?;

                match &am.source {
                    AttributeSource::Copy { from } | AttributeSource::Coerce { from } => {
                        let source_entity = source_entity.ok_or_else(|| {
                            format!(
                                "attribute '{}' of new entity '{}' cannot read from a source",
                                am.destination, em.destination_entity
                            )
                        })?;
                        let source_attr = source_entity.attribute(from).ok_or_else(|| {
                            format!(
                                "source attribute '{}' is not declared for entity mapping '{}'",
                                from, em.destination_entity
                            )
                        })?;

                        if matches!(am.source, AttributeSource::Copy { .. }) {
                            if !self.copy_compatible(&source_attr.ty, &dest_attr.ty) {
                                return Err(format!(
                                    "attribute '{}' of entity '{}' copies {} into {}",
                                    am.destination, em.destination_entity, source_attr.ty, dest_attr.ty
                                ));
                            }
                        } else if !coercion_supported(&source_attr.ty, &dest_attr.ty) {
                            return Err(format!(
                                "attribute '{}' of entity '{}' has no coercion from {} to {}",
                                am.destination, em.destination_entity, source_attr.ty, dest_attr.ty
                            ));
                        }
                    }
                    AttributeSource::Default { value } => {
                        if !value.conforms_to(&dest_attr.ty) {
                            return Err(format!(
                                "attribute '{}' of entity '{}' has default of type {}, expected {}",
                                am.destination,
                                em.destination_entity,
                                value.type_name(),
                                dest_attr.ty
                            ));
                        }
                    }
                    AttributeSource::Null => {
                        if !dest_attr.optional {
                            return Err(format!(
                                "attribute '{}' of entity '{}' is required and cannot be null-filled",
                                am.destination, em.destination_entity
                            ));
                        }
                    }
                }
            }

            // Totality over the destination entity.
            for attr in &dest_entity.attributes {
                let covered = em.attributes.iter().any(|am| am.destination == attr.name);
                if !covered && attr.default.is_none() && !attr.optional {
                    return Err(format!(
                        "required attribute '{}' of entity '{}' is not mapped and has no default",
                        attr.name, em.destination_entity
                    ));
                }
            }
        }

        Ok(())
    }

    /// A copy is type-preserving, except references, which are compatible
    /// when this mapping carries the referenced source entity into the
    /// referenced destination entity.
    fn copy_compatible(&self, source: &AttrType, destination: &AttrType) -> bool {
        match (source, destination) {
            (AttrType::Ref { entity: s }, AttrType::Ref { entity: d }) => self.maps_entity(s, d),
            (a, b) => a == b,
        }
    }
}

/// Lossless coercions inference may pick on its own.
pub(crate) fn lossless_coercion(from: &AttrType, to: &AttrType) -> bool {
    matches!(
        (from, to),
        (AttrType::Int, AttrType::Float)
            | (AttrType::Int, AttrType::Text)
            | (AttrType::Float, AttrType::Text)
            | (AttrType::Bool, AttrType::Text)
    )
}

/// Coercions a custom mapping may request explicitly.
pub fn coercion_supported(from: &AttrType, to: &AttrType) -> bool {
    lossless_coercion(from, to)
        || matches!(
            (from, to),
            (AttrType::Text, AttrType::Int)
                | (AttrType::Text, AttrType::Float)
                | (AttrType::Timestamp, AttrType::Int)
                | (AttrType::Int, AttrType::Timestamp)
        )
}

/// Coerces a value to the target type, or `None` if the value does not
/// convert (unsupported pair, or unparsable text).
pub fn coerce(value: &Value, target: &AttrType) -> Option<Value> {
    match (value, target) {
        (Value::Int(v), AttrType::Float) => Some(Value::Float(*v as f64)),
        (Value::Int(v), AttrType::Text) => Some(Value::Text(v.to_string())),
        (Value::Float(v), AttrType::Text) => Some(Value::Text(v.to_string())),
        (Value::Bool(v), AttrType::Text) => Some(Value::Text(v.to_string())),
        (Value::Text(v), AttrType::Int) => v.parse().ok().map(Value::Int),
        (Value::Text(v), AttrType::Float) => v.parse().ok().map(Value::Float),
        (Value::Timestamp(v), AttrType::Int) => Some(Value::Int(*v)),
        (Value::Int(v), AttrType::Timestamp) => Some(Value::Timestamp(*v)),
        _ => None,
    }
}
