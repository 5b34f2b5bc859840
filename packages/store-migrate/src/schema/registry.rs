//! Schema artifact loading keyed by version.

use std::fs;
use std::path::PathBuf;

use crate::error::MigrationError;
use crate::version::SchemaVersion;

use super::SchemaDefinition;

/// Resolves version identifiers to fully loaded schema definitions.
///
/// Artifacts live at `<model_dir>/<version>.schema.json`. Loading is
/// read-only and idempotent; every call site goes through this one lookup.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    model_dir: PathBuf,
}

impl SchemaRegistry {
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
        }
    }

    /// Loads the schema definition for `version`.
    pub fn load(&self, version: &SchemaVersion) -> Result<SchemaDefinition, MigrationError> {
        let path = self.model_dir.join(format!("{}.schema.json", version));
        if !path.exists() {
            tracing::error!(
                "no schema artifact for version '{}' at {}",
                version,
                path.display()
            );
            return Err(MigrationError::SchemaNotFound {
                version: version.clone(),
            });
        }

        let contents = fs::read_to_string(&path).map_err(|e| MigrationError::SchemaCorrupt {
            version: version.clone(),
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let definition: SchemaDefinition =
            serde_json::from_str(&contents).map_err(|e| MigrationError::SchemaCorrupt {
                version: version.clone(),
                reason: format!("failed to parse {}: {}", path.display(), e),
            })?;

        if definition.version != *version {
            return Err(MigrationError::SchemaCorrupt {
                version: version.clone(),
                reason: format!(
                    "artifact at {} declares version '{}'",
                    path.display(),
                    definition.version
                ),
            });
        }

        definition
            .validate()
            .map_err(|reason| MigrationError::SchemaCorrupt {
                version: version.clone(),
                reason,
            })?;

        Ok(definition)
    }
}
