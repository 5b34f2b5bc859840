//! Schema version identity and the ordered upgrade chain.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MigrationError;

/// Opaque, totally ordered schema version name.
///
/// Ordering comes from the owning [`VersionCatalog`], not from the name
/// itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaVersion(String);

impl SchemaVersion {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SchemaVersion {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for SchemaVersion {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Ordered catalog of all known schema versions, oldest first.
///
/// Adding a new version is a one-line append to the declared list; the
/// successor relation is derived from the order, so the chain cannot drift
/// out of sync with the version set.
#[derive(Debug, Clone)]
pub struct VersionCatalog {
    versions: Vec<SchemaVersion>,
}

impl VersionCatalog {
    /// Builds a catalog from the declared version order.
    ///
    /// # Panics
    /// Panics on duplicate version names: a catalog with duplicates has no
    /// well-defined successor relation, which is a configuration error, not
    /// a runtime condition.
    pub fn new<I>(versions: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<SchemaVersion>,
    {
        let versions: Vec<SchemaVersion> = versions.into_iter().map(Into::into).collect();
        for (i, version) in versions.iter().enumerate() {
            assert!(
                !versions[..i].contains(version),
                "duplicate schema version '{}' in catalog",
                version
            );
        }
        Self { versions }
    }

    /// The maximal (latest) version.
    ///
    /// # Panics
    /// Panics if the catalog is empty — an empty catalog is a
    /// configuration error and there is nothing sensible to migrate to.
    pub fn current(&self) -> &SchemaVersion {
        self.versions.last().expect("no schema versions declared")
    }

    /// The next version after `version` in declared order, or `None` if
    /// `version` is the latest or not in the catalog.
    pub fn successor(&self, version: &SchemaVersion) -> Option<&SchemaVersion> {
        let index = self.versions.iter().position(|v| v == version)?;
        self.versions.get(index + 1)
    }

    pub fn contains(&self, version: &SchemaVersion) -> bool {
        self.versions.contains(version)
    }

    /// All versions in declared order.
    pub fn versions(&self) -> &[SchemaVersion] {
        &self.versions
    }

    /// The consecutive version pairs to step through from `source` to
    /// `destination`; empty when they are equal.
    ///
    /// Fails with [`MigrationError::NoMigrationPath`] if the successor
    /// chain ends before reaching `destination` — a partial chain is never
    /// returned.
    pub fn steps_between(
        &self,
        source: &SchemaVersion,
        destination: &SchemaVersion,
    ) -> Result<Vec<(SchemaVersion, SchemaVersion)>, MigrationError> {
        let mut steps = Vec::new();
        let mut cursor = source.clone();

        while cursor != *destination {
            let next = match self.successor(&cursor) {
                Some(next) => next.clone(),
                None => {
                    return Err(MigrationError::NoMigrationPath {
                        from_version: source.clone(),
                        destination: destination.clone(),
                    })
                }
            };
            steps.push((cursor, next.clone()));
            cursor = next;
        }

        Ok(steps)
    }
}
