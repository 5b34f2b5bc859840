//! Mapping resolution: custom artifact first, structural inference second.

use std::fs;
use std::path::PathBuf;

use crate::error::MigrationError;
use crate::schema::SchemaDefinition;

use super::{
    lossless_coercion, AttributeMapping, AttributeSource, EntityMapping, MappingSpecification,
};

/// Produces the transformation specification for one version pair.
///
/// A custom artifact at `<model_dir>/<src>-to-<dst>.mapping.json` always
/// wins over inference: authored intent overrides heuristics.
#[derive(Debug, Clone)]
pub struct MappingResolver {
    model_dir: PathBuf,
}

impl MappingResolver {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
        }
    }

    /// Resolves a mapping from `source` to `destination`.
    ///
    /// Fails with [`MigrationError::NoMappingAvailable`] when no custom
    /// artifact exists and inference cannot produce a total, unambiguous
    /// specification.
    pub fn resolve(
        &self,
        source: &SchemaDefinition,
        destination: &SchemaDefinition,
    ) -> Result<MappingSpecification, MigrationError> {
        if let Some(custom) = self.load_custom(source, destination)? {
            tracing::debug!(
                "using custom mapping '{}' -> '{}'",
                source.version,
                destination.version
            );
            return Ok(custom);
        }

        match infer(source, destination) {
            Some(inferred) => {
                tracing::debug!(
                    "using inferred mapping '{}' -> '{}'",
                    source.version,
                    destination.version
                );
                Ok(inferred)
            }
            None => {
                tracing::error!(
                    "no custom mapping '{}' -> '{}' and inference is not total",
                    source.version,
                    destination.version
                );
                Err(MigrationError::NoMappingAvailable {
                    from_version: source.version.clone(),
                    destination: destination.version.clone(),
                })
            }
        }
    }

    /// Loads and validates the custom mapping artifact, if one exists.
    ///
    /// A present-but-invalid artifact is an error, never silently ignored
    /// in favor of inference.
    fn load_custom(
        &self,
        source: &SchemaDefinition,
        destination: &SchemaDefinition,
    ) -> Result<Option<MappingSpecification>, MigrationError> {
        let path = self.model_dir.join(format!(
            "{}-to-{}.mapping.json",
            source.version, destination.version
        ));
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path).map_err(|e| MigrationError::SchemaCorrupt {
            version: source.version.clone(),
            reason: format!("failed to read mapping {}: {}", path.display(), e),
        })?;

        let mapping: MappingSpecification =
            serde_json::from_str(&contents).map_err(|e| MigrationError::SchemaCorrupt {
                version: source.version.clone(),
                reason: format!("failed to parse mapping {}: {}", path.display(), e),
            })?;

        mapping
            .validate(source, destination)
            .map_err(|reason| MigrationError::SchemaCorrupt {
                version: source.version.clone(),
                reason: format!("invalid mapping {}: {}", path.display(), reason),
            })?;

        Ok(Some(mapping))
    }
}

/// Infers a mapping by aligning entities and attributes strictly by name.
///
/// Returns `None` when the result would not be total: a required
/// destination attribute with no same-name source, no lossless coercion,
/// no default, and no optionality means authored intent is needed.
fn infer(source: &SchemaDefinition, destination: &SchemaDefinition) -> Option<MappingSpecification> {
    let mut entities = Vec::new();

    for (name, dest_entity) in &destination.entities {
        let source_entity = source.entities.get(name);
        let mut attributes = Vec::new();

        for attr in &dest_entity.attributes {
            let source_attr = source_entity.and_then(|se| se.attribute(&attr.name));
            let mapped = match source_attr {
                Some(sa) if sa.ty == attr.ty => AttributeSource::Copy {
                    from: attr.name.clone(),
                },
                Some(sa) if lossless_coercion(&sa.ty, &attr.ty) => AttributeSource::Coerce {
                    from: attr.name.clone(),
                },
                // The attribute exists but its type changed with no rule to
                // bridge it; never guess.
                Some(_) => return None,
                None => {
                    if let Some(default) = &attr.default {
                        AttributeSource::Default {
                            value: default.clone(),
                        }
                    } else if attr.optional {
                        AttributeSource::Null
                    } else {
                        return None;
                    }
                }
            };
            attributes.push(AttributeMapping {
                destination: attr.name.clone(),
                source: mapped,
            });
        }

        entities.push(EntityMapping {
            source_entity: source_entity.map(|_| name.clone()),
            destination_entity: name.clone(),
            attributes,
        });
    }

    Some(MappingSpecification {
        source_version: source.version.clone(),
        destination_version: destination.version.clone(),
        entities,
    })
}
