//! Progressive schema migration engine for on-disk record stores.
//!
//! Upgrades a store from its current schema version to a target version in
//! single-version steps, each step streaming records through a declared
//! mapping into a fresh temporary store. The original store is replaced
//! atomically only after every step has succeeded; on any failure it is
//! left untouched.

pub mod config;
pub mod error;
pub mod mapping;
pub mod migrator;
pub mod schema;
pub mod step;
pub mod version;

pub use config::MigratorConfig;
pub use error::{MigrationError, StepError};
pub use mapping::{MappingResolver, MappingSpecification};
pub use migrator::Migrator;
pub use schema::{SchemaDefinition, SchemaRegistry};
pub use step::MigrationStep;
pub use version::{SchemaVersion, VersionCatalog};
