//! Migration step construction and execution.
//!
//! A step owns a resolved source model, destination model, and mapping for
//! one consecutive version pair, and is consumed by a single [`apply`]
//! invocation. Execution streams the source store twice: one pass to build
//! the per-entity identity maps, one pass to transform records into a fresh
//! destination store. Records are never materialized in bulk.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use store_core::store::{StoreReader, StoreWriter};
use store_core::{coordinator, Record, Value};

use crate::error::{MigrationError, StepError};
use crate::mapping::{coerce, AttributeSource, EntityMapping, MappingSpecification};
use crate::schema::{EntityDef, SchemaDefinition};

/// One single-version migration step.
#[derive(Debug, Clone)]
pub struct MigrationStep {
    /// Model the source store conforms to
    pub source_model: SchemaDefinition,
    /// Model the destination store will conform to
    pub destination_model: SchemaDefinition,
    /// Transformation between the two
    pub mapping: MappingSpecification,
}

impl MigrationStep {
    pub fn new(
        source_model: SchemaDefinition,
        destination_model: SchemaDefinition,
        mapping: MappingSpecification,
    ) -> Self {
        Self {
            source_model,
            destination_model,
            mapping,
        }
    }
}

/// Applies one migration step to the store at `source_path`, producing a
/// new store at a collision-free temporary location under `temp_dir`.
///
/// The source store is opened read-only and never mutated. On failure the
/// partial destination is removed best-effort and the step reports
/// [`MigrationError::MigrationFailed`]; a destination missing its
/// integrity trailer is rejected by readers anyway, so an interrupted step
/// can never pass for a finished one.
pub fn apply(
    step: &MigrationStep,
    source_path: &Path,
    temp_dir: &Path,
) -> Result<PathBuf, MigrationError> {
    let destination = temp_dir.join(format!("migration-{}.store", Uuid::new_v4()));

    match run(step, source_path, &destination) {
        Ok(records) => {
            tracing::debug!(
                "step '{}' -> '{}' wrote {} records to {}",
                step.mapping.source_version,
                step.mapping.destination_version,
                records,
                destination.display()
            );
            Ok(destination)
        }
        Err(cause) => {
            tracing::error!(
                "migration step '{}' -> '{}' failed: {}",
                step.mapping.source_version,
                step.mapping.destination_version,
                cause
            );
            if let Err(e) = coordinator::destroy(&destination) {
                tracing::warn!(
                    "failed to remove partial step output at {}: {}",
                    destination.display(),
                    e
                );
            }
            Err(MigrationError::MigrationFailed {
                from_version: step.mapping.source_version.clone(),
                destination: step.mapping.destination_version.clone(),
                cause,
            })
        }
    }
}

fn run(step: &MigrationStep, source_path: &Path, destination: &Path) -> Result<usize, StepError> {
    // Identity pass: assign destination ids for every surviving record.
    let mut ids = IdentityMap::new(&step.mapping);
    let mut reader = StoreReader::open(source_path)?;
    while let Some((entity, record)) = reader.next_record()? {
        ids.assign(&entity, record.id)?;
    }

    // Transform pass.
    let mut reader = StoreReader::open(source_path)?;
    let mut writer = StoreWriter::create(destination, &step.destination_model.stamp())?;
    let mut written = 0usize;

    while let Some((entity, record)) = reader.next_record()? {
        let em = match step.mapping.entity_for_source(&entity) {
            Some(em) => em,
            // Entity dropped by the destination schema.
            None => continue,
        };
        let transformed = transform_record(step, em, &entity, &record, &ids)?;
        writer.append(&em.destination_entity, transformed)?;
        written += 1;
    }

    writer.finish()?;
    Ok(written)
}

fn transform_record(
    step: &MigrationStep,
    em: &EntityMapping,
    entity: &str,
    record: &Record,
    ids: &IdentityMap,
) -> Result<Record, StepError> {
    let dest_entity = destination_entity_def(step, em)?;
    let new_id = ids
        .renumbered(entity, record.id)
        .ok_or_else(|| StepError::NotInModel {
            name: entity.to_string(),
        })?;

    let mut values = BTreeMap::new();

    for am in &em.attributes {
        let dest_attr = dest_entity.attribute(&am.destination).ok_or_else(|| {
            StepError::NotInModel {
                name: format!("{}.{}", em.destination_entity, am.destination),
            }
        })?;

        let value = match &am.source {
            AttributeSource::Copy { from } => record.values.get(from).cloned().unwrap_or(Value::Null),
            AttributeSource::Coerce { from } => {
                match record.values.get(from).cloned().unwrap_or(Value::Null) {
                    Value::Null => Value::Null,
                    value => coerce(&value, &dest_attr.ty).ok_or_else(|| StepError::Uncoercible {
                        entity: entity.to_string(),
                        id: record.id,
                        attribute: am.destination.clone(),
                        value: value.to_string(),
                        target: dest_attr.ty.to_string(),
                    })?,
                }
            }
            AttributeSource::Default { value } => value.clone(),
            AttributeSource::Null => Value::Null,
        };

        let value = match value {
            Value::Null => match (&dest_attr.default, dest_attr.optional) {
                (Some(default), _) => default.clone(),
                (None, true) => Value::Null,
                (None, false) => {
                    return Err(StepError::MissingValue {
                        entity: entity.to_string(),
                        id: record.id,
                        attribute: am.destination.clone(),
                    })
                }
            },
            Value::Ref {
                entity: target,
                id: target_id,
            } => {
                let (dest_target, new_target_id) =
                    ids.remap(&target, target_id)
                        .ok_or_else(|| StepError::DanglingReference {
                            entity: entity.to_string(),
                            id: record.id,
                            attribute: am.destination.clone(),
                            target: target.clone(),
                            target_id,
                        })?;
                Value::Ref {
                    entity: dest_target,
                    id: new_target_id,
                }
            }
            value => value,
        };

        if !matches!(value, Value::Null) && !value.conforms_to(&dest_attr.ty) {
            return Err(StepError::TypeMismatch {
                entity: entity.to_string(),
                id: record.id,
                attribute: am.destination.clone(),
                expected: dest_attr.ty.to_string(),
                got: value.type_name(),
            });
        }

        values.insert(am.destination.clone(), value);
    }

    // Destination attributes the mapping does not name.
    for attr in &dest_entity.attributes {
        if values.contains_key(&attr.name) {
            continue;
        }
        if let Some(default) = &attr.default {
            values.insert(attr.name.clone(), default.clone());
        } else if attr.optional {
            values.insert(attr.name.clone(), Value::Null);
        } else {
            return Err(StepError::MissingValue {
                entity: entity.to_string(),
                id: record.id,
                attribute: attr.name.clone(),
            });
        }
    }

    Ok(Record {
        id: new_id,
        values,
    })
}

fn destination_entity_def<'a>(
    step: &'a MigrationStep,
    em: &EntityMapping,
) -> Result<&'a EntityDef, StepError> {
    step.destination_model
        .entities
        .get(&em.destination_entity)
        .ok_or_else(|| StepError::NotInModel {
            name: em.destination_entity.clone(),
        })
}

/// Per-entity `old id -> new id` maps built during the identity pass.
///
/// References are rewritten through these maps, so every surviving record
/// keeps exactly one destination counterpart and no reference can silently
/// dangle or duplicate.
struct IdentityMap {
    entities: HashMap<String, EntityIds>,
}

struct EntityIds {
    destination: String,
    ids: HashMap<u64, u64>,
    next: u64,
}

impl IdentityMap {
    fn new(mapping: &MappingSpecification) -> Self {
        let entities = mapping
            .entities
            .iter()
            .filter_map(|em| {
                em.source_entity.as_ref().map(|source| {
                    (
                        source.clone(),
                        EntityIds {
                            destination: em.destination_entity.clone(),
                            ids: HashMap::new(),
                            next: 1,
                        },
                    )
                })
            })
            .collect();
        Self { entities }
    }

    fn assign(&mut self, entity: &str, old: u64) -> Result<(), StepError> {
        let Some(ids) = self.entities.get_mut(entity) else {
            // Entity dropped by the destination schema; nothing to track.
            return Ok(());
        };
        if ids.ids.contains_key(&old) {
            return Err(StepError::DuplicateRecord {
                entity: entity.to_string(),
                id: old,
            });
        }
        ids.ids.insert(old, ids.next);
        ids.next += 1;
        Ok(())
    }

    fn renumbered(&self, entity: &str, old: u64) -> Option<u64> {
        self.entities.get(entity)?.ids.get(&old).copied()
    }

    fn remap(&self, entity: &str, old: u64) -> Option<(String, u64)> {
        let ids = self.entities.get(entity)?;
        let new = ids.ids.get(&old).copied()?;
        Some((ids.destination.clone(), new))
    }
}
