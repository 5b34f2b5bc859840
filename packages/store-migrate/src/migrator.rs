//! Migration orchestration: version checks, the step chain, and the final
//! atomic replacement.

use std::path::{Path, PathBuf};

use store_core::{coordinator, StoreMetadata};

use crate::config::MigratorConfig;
use crate::error::MigrationError;
use crate::mapping::MappingResolver;
use crate::schema::SchemaRegistry;
use crate::step::{self, MigrationStep};
use crate::version::{SchemaVersion, VersionCatalog};

/// Public entry point of the migration engine.
///
/// Callers invoke [`Migrator::requires_migration`] and
/// [`Migrator::migrate_store`] strictly before opening the store for
/// normal use. Migration is synchronous; the engine assumes single-writer
/// access to the store for its whole duration.
pub struct Migrator {
    catalog: VersionCatalog,
    registry: SchemaRegistry,
    resolver: MappingResolver,
    temp_dir: PathBuf,
}

impl Migrator {
    pub fn new(config: MigratorConfig) -> Self {
        Self {
            catalog: VersionCatalog::new(config.versions),
            registry: SchemaRegistry::new(&config.model_dir),
            resolver: MappingResolver::new(&config.model_dir),
            temp_dir: config.temp_dir,
        }
    }

    pub fn catalog(&self) -> &VersionCatalog {
        &self.catalog
    }

    /// Returns true if the store at `store` needs migration to reach
    /// `target`. Never mutates the store.
    ///
    /// A missing store, or one whose metadata cannot be read at all,
    /// reports `false`: there is nothing to migrate. A store whose
    /// metadata is readable but matches no known version reports `true`
    /// (its version certainly is not `target`); attempting the migration
    /// then fails with [`MigrationError::UnknownStoreVersion`], so the
    /// caller decides whether such a store is eligible at all.
    pub fn requires_migration(
        &self,
        store: &Path,
        target: &SchemaVersion,
    ) -> Result<bool, MigrationError> {
        let metadata = match self.read_metadata(store)? {
            Some(metadata) => metadata,
            None => return Ok(false),
        };

        match self.compatible_version(&metadata)? {
            Some(version) => Ok(version != *target),
            None => Ok(true),
        }
    }

    /// Migrates the store at `store` to `target` through consecutive
    /// single-version steps.
    ///
    /// On success the store at the original location conforms to `target`.
    /// On failure the original store is untouched and the specific error
    /// is surfaced; intermediate artifacts are cleaned up best-effort.
    pub fn migrate_store(
        &self,
        store: &Path,
        target: &SchemaVersion,
    ) -> Result<(), MigrationError> {
        coordinator::checkpoint(store).map_err(|source| MigrationError::CheckpointFailed {
            store: store.to_path_buf(),
            source,
        })?;

        let metadata = self
            .read_metadata(store)?
            .ok_or_else(|| MigrationError::UnknownStoreVersion {
                store: store.to_path_buf(),
            })?;
        let source_version =
            self.compatible_version(&metadata)?
                .ok_or_else(|| MigrationError::UnknownStoreVersion {
                    store: store.to_path_buf(),
                })?;

        let steps = self.catalog.steps_between(&source_version, target)?;
        if steps.is_empty() {
            tracing::debug!(
                "store at {} is already at version '{}'",
                store.display(),
                target
            );
            return Ok(());
        }

        tracing::info!(
            "migrating store at {} from '{}' to '{}' in {} steps",
            store.display(),
            source_version,
            target,
            steps.len()
        );

        let final_location = self.run_steps(store, &steps)?;

        coordinator::replace(store, &final_location).map_err(|source| {
            let error = MigrationError::ReplaceFailed {
                store: store.to_path_buf(),
                with: final_location.clone(),
                source,
            };
            tracing::error!("{}", error);
            self.cleanup_intermediate(&final_location);
            error
        })?;

        // The migrated content now lives at the original path; the final
        // temporary is just leftover files.
        self.cleanup_intermediate(&final_location);

        tracing::info!(
            "store at {} migrated to version '{}'",
            store.display(),
            target
        );
        Ok(())
    }

    /// Migrates the store to the latest catalog version if needed, the
    /// way an integrating persistence layer bootstraps.
    pub fn ensure_current(&self, store: &Path) -> Result<(), MigrationError> {
        let target = self.catalog.current().clone();
        if self.requires_migration(store, &target)? {
            self.migrate_store(store, &target)?;
        }
        Ok(())
    }

    /// Runs every step, tracking ownership of the current working
    /// location. The original store is never destroyed here — only
    /// superseded temporaries are.
    fn run_steps(
        &self,
        store: &Path,
        steps: &[(SchemaVersion, SchemaVersion)],
    ) -> Result<PathBuf, MigrationError> {
        let mut working: PathBuf = store.to_path_buf();

        for (source, destination) in steps {
            let output = match self.run_one_step(source, destination, &working) {
                Ok(output) => output,
                Err(error) => {
                    if working != store {
                        self.cleanup_intermediate(&working);
                    }
                    return Err(error);
                }
            };

            if working != store {
                self.cleanup_intermediate(&working);
            }
            working = output;
        }

        Ok(working)
    }

    fn run_one_step(
        &self,
        source: &SchemaVersion,
        destination: &SchemaVersion,
        working: &Path,
    ) -> Result<PathBuf, MigrationError> {
        let source_model = self.registry.load(source)?;
        let destination_model = self.registry.load(destination)?;
        let mapping = self.resolver.resolve(&source_model, &destination_model)?;

        tracing::debug!("applying migration step '{}' -> '{}'", source, destination);
        let step = MigrationStep::new(source_model, destination_model, mapping);
        step::apply(&step, working, &self.temp_dir)
    }

    /// Destroys a superseded intermediate store. Failure is logged and
    /// never escalated: it cannot invalidate a migration that already
    /// moved past the intermediate.
    fn cleanup_intermediate(&self, location: &Path) {
        if let Err(source) = coordinator::destroy(location) {
            let error = MigrationError::DestroyFailed {
                store: location.to_path_buf(),
                source,
            };
            tracing::warn!("{}", error);
        }
    }

    fn read_metadata(&self, store: &Path) -> Result<Option<StoreMetadata>, MigrationError> {
        coordinator::read_metadata(store).map_err(|source| MigrationError::MetadataUnreadable {
            store: store.to_path_buf(),
            source,
        })
    }

    /// The single catalog version whose schema is compatible with the
    /// given store metadata, if any.
    fn compatible_version(
        &self,
        metadata: &StoreMetadata,
    ) -> Result<Option<SchemaVersion>, MigrationError> {
        for version in self.catalog.versions() {
            let model = self.registry.load(version)?;
            if model.is_compatible(metadata) {
                return Ok(Some(version.clone()));
            }
        }
        Ok(None)
    }
}
