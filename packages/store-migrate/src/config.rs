//! Migration engine configuration.

use std::path::PathBuf;

use crate::version::SchemaVersion;

/// Migration engine configuration.
#[derive(Debug, Clone)]
pub struct MigratorConfig {
    /// Ordered schema version chain, oldest first
    pub versions: Vec<SchemaVersion>,
    /// Directory holding schema and mapping artifacts
    pub model_dir: PathBuf,
    /// Directory for intermediate migration stores
    pub temp_dir: PathBuf,
}

impl MigratorConfig {
    /// Creates a configuration with the system temp directory for
    /// intermediates.
    pub fn new<I>(versions: I, model_dir: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator,
        I::Item: Into<SchemaVersion>,
    {
        Self {
            versions: versions.into_iter().map(Into::into).collect(),
            model_dir: model_dir.into(),
            temp_dir: std::env::temp_dir(),
        }
    }
}
