//! End-to-end migration tests: fixture stores at an old schema version are
//! migrated through the engine and the results inspected through the store
//! reader.

use std::fs;
use std::path::{Path, PathBuf};

use ntest::timeout;
use tempfile::{tempdir, TempDir};

use store_core::store::{StoreReader, StoreWriter};
use store_core::wal::WalWriter;
use store_core::{AttrType, Record, Value};

use store_migrate::schema::{AttributeDef, EntityDef, SchemaDefinition};
use store_migrate::{MigrationError, Migrator, MigratorConfig, SchemaVersion};

// ---------------------------------------------------------------------------
// Fixtures

struct Fixture {
    _root: TempDir,
    model_dir: PathBuf,
    temp_dir: PathBuf,
    store: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let root = tempdir().unwrap();
        let model_dir = root.path().join("models");
        let temp_dir = root.path().join("intermediates");
        fs::create_dir_all(&model_dir).unwrap();
        fs::create_dir_all(&temp_dir).unwrap();
        let store = root.path().join("live.store");
        Self {
            _root: root,
            model_dir,
            temp_dir,
            store,
        }
    }

    fn migrator(&self, versions: &[&str]) -> Migrator {
        let mut config = MigratorConfig::new(versions.to_vec(), &self.model_dir);
        config.temp_dir = self.temp_dir.clone();
        Migrator::new(config)
    }

    fn declare(&self, schema: &SchemaDefinition) {
        let path = self
            .model_dir
            .join(format!("{}.schema.json", schema.version));
        fs::write(&path, serde_json::to_string_pretty(schema).unwrap()).unwrap();
    }

    fn declare_mapping_json(&self, source: &str, destination: &str, json: &str) {
        let path = self
            .model_dir
            .join(format!("{}-to-{}.mapping.json", source, destination));
        fs::write(&path, json).unwrap();
    }

    fn intermediates_left(&self) -> usize {
        fs::read_dir(&self.temp_dir).unwrap().count()
    }
}

fn attribute(name: &str, ty: AttrType) -> AttributeDef {
    AttributeDef {
        name: name.to_string(),
        ty,
        optional: false,
        default: None,
    }
}

fn schema(version: &str, entities: Vec<(&str, Vec<AttributeDef>)>) -> SchemaDefinition {
    SchemaDefinition {
        version: SchemaVersion::new(version),
        entities: entities
            .into_iter()
            .map(|(name, attributes)| (name.to_string(), EntityDef { attributes }))
            .collect(),
    }
}

/// V1: Item { timestamp }
fn item_v1() -> SchemaDefinition {
    schema(
        "V1",
        vec![("Item", vec![attribute("timestamp", AttrType::Timestamp)])],
    )
}

/// V2: Item { name = "Unknown", timestamp }
fn item_v2() -> SchemaDefinition {
    let mut name = attribute("name", AttrType::Text);
    name.default = Some(Value::Text("Unknown".to_string()));
    schema(
        "V2",
        vec![(
            "Item",
            vec![name, attribute("timestamp", AttrType::Timestamp)],
        )],
    )
}

/// V3: Item { name = "Unknown", starred = false, timestamp }
fn item_v3() -> SchemaDefinition {
    let mut name = attribute("name", AttrType::Text);
    name.default = Some(Value::Text("Unknown".to_string()));
    let mut starred = attribute("starred", AttrType::Bool);
    starred.default = Some(Value::Bool(false));
    schema(
        "V3",
        vec![(
            "Item",
            vec![name, starred, attribute("timestamp", AttrType::Timestamp)],
        )],
    )
}

fn write_v1_store(path: &Path, count: u64) {
    let mut writer = StoreWriter::create(path, &item_v1().stamp()).unwrap();
    for id in 1..=count {
        writer
            .append(
                "Item",
                Record::new(id).with("timestamp", Value::Timestamp(id as i64 * 100)),
            )
            .unwrap();
    }
    writer.finish().unwrap();
}

fn read_all(path: &Path) -> Vec<(String, Record)> {
    let mut reader = StoreReader::open(path).unwrap();
    reader.records().collect::<Result<_, _>>().unwrap()
}

// ---------------------------------------------------------------------------
// requires_migration

#[timeout(4000)]
#[test]
fn test_requires_migration_is_a_pure_predicate() {
    let fx = Fixture::new();
    fx.declare(&item_v1());
    fx.declare(&item_v2());
    let migrator = fx.migrator(&["V1", "V2"]);

    write_v1_store(&fx.store, 2);
    let before = fs::read(&fx.store).unwrap();

    assert!(migrator
        .requires_migration(&fx.store, &"V2".into())
        .unwrap());
    assert!(!migrator
        .requires_migration(&fx.store, &"V1".into())
        .unwrap());
    assert!(migrator
        .requires_migration(&fx.store, &"V2".into())
        .unwrap());

    assert_eq!(fs::read(&fx.store).unwrap(), before);
}

#[timeout(4000)]
#[test]
fn test_missing_store_requires_no_migration() {
    let fx = Fixture::new();
    fx.declare(&item_v1());
    fx.declare(&item_v2());
    let migrator = fx.migrator(&["V1", "V2"]);

    assert!(!migrator
        .requires_migration(&fx.store, &"V2".into())
        .unwrap());
}

// ---------------------------------------------------------------------------
// Single-step round trip

#[timeout(4000)]
#[test]
fn test_default_fill_round_trip() {
    let fx = Fixture::new();
    fx.declare(&item_v1());
    fx.declare(&item_v2());
    let migrator = fx.migrator(&["V1", "V2"]);

    write_v1_store(&fx.store, 5);
    migrator.migrate_store(&fx.store, &"V2".into()).unwrap();

    let records = read_all(&fx.store);
    assert_eq!(records.len(), 5);
    for (i, (entity, record)) in records.iter().enumerate() {
        assert_eq!(entity, "Item");
        assert_eq!(
            record.values.get("name"),
            Some(&Value::Text("Unknown".to_string()))
        );
        assert_eq!(
            record.values.get("timestamp"),
            Some(&Value::Timestamp((i as i64 + 1) * 100))
        );
    }

    // The store now reads as V2 and nothing else.
    assert!(!migrator
        .requires_migration(&fx.store, &"V2".into())
        .unwrap());
    assert_eq!(fx.intermediates_left(), 0);
}

#[timeout(4000)]
#[test]
fn test_migrating_at_target_version_is_a_noop() {
    let fx = Fixture::new();
    fx.declare(&item_v1());
    fx.declare(&item_v2());
    let migrator = fx.migrator(&["V1", "V2"]);

    write_v1_store(&fx.store, 3);
    let before = fs::read(&fx.store).unwrap();

    migrator.migrate_store(&fx.store, &"V1".into()).unwrap();
    assert_eq!(fs::read(&fx.store).unwrap(), before);
    assert_eq!(fx.intermediates_left(), 0);
}

// ---------------------------------------------------------------------------
// Multi-step chains

#[timeout(4000)]
#[test]
fn test_two_step_chain_reaches_target() {
    let fx = Fixture::new();
    fx.declare(&item_v1());
    fx.declare(&item_v2());
    fx.declare(&item_v3());
    let migrator = fx.migrator(&["V1", "V2", "V3"]);

    write_v1_store(&fx.store, 4);
    migrator.migrate_store(&fx.store, &"V3".into()).unwrap();

    let records = read_all(&fx.store);
    assert_eq!(records.len(), 4);
    for (_, record) in &records {
        assert_eq!(
            record.values.get("name"),
            Some(&Value::Text("Unknown".to_string()))
        );
        assert_eq!(record.values.get("starred"), Some(&Value::Bool(false)));
    }

    assert!(!migrator
        .requires_migration(&fx.store, &"V3".into())
        .unwrap());
    assert_eq!(fx.intermediates_left(), 0);
}

#[timeout(4000)]
#[test]
fn test_failed_step_leaves_original_bit_identical() {
    let fx = Fixture::new();
    fx.declare(&item_v1());
    fx.declare(&item_v2());
    // V3 adds a required attribute with no default: the V2 -> V3 step has
    // no custom mapping and inference cannot be total.
    let v3 = schema(
        "V3",
        vec![(
            "Item",
            vec![
                {
                    let mut name = attribute("name", AttrType::Text);
                    name.default = Some(Value::Text("Unknown".to_string()));
                    name
                },
                attribute("owner", AttrType::Text),
                attribute("timestamp", AttrType::Timestamp),
            ],
        )],
    );
    fx.declare(&v3);
    let migrator = fx.migrator(&["V1", "V2", "V3"]);

    write_v1_store(&fx.store, 3);
    let before = fs::read(&fx.store).unwrap();

    let err = migrator
        .migrate_store(&fx.store, &"V3".into())
        .unwrap_err();
    assert!(matches!(err, MigrationError::NoMappingAvailable { .. }));

    assert_eq!(fs::read(&fx.store).unwrap(), before);
    assert_eq!(fx.intermediates_left(), 0);
}

#[timeout(4000)]
#[test]
fn test_unreachable_target_is_no_migration_path() {
    let fx = Fixture::new();
    fx.declare(&item_v1());
    fx.declare(&item_v2());
    let migrator = fx.migrator(&["V1", "V2"]);

    write_v1_store(&fx.store, 1);
    let err = migrator
        .migrate_store(&fx.store, &"V0".into())
        .unwrap_err();
    assert!(matches!(err, MigrationError::NoMigrationPath { .. }));
}

// ---------------------------------------------------------------------------
// Mapping precedence

#[timeout(4000)]
#[test]
fn test_custom_mapping_overrides_inferred_behavior() {
    let fx = Fixture::new();
    fx.declare(&item_v1());
    fx.declare(&item_v2());
    // Inference would fill "Unknown"; the authored mapping diverges.
    fx.declare_mapping_json(
        "V1",
        "V2",
        r#"{
            "source_version": "V1",
            "destination_version": "V2",
            "entities": [
                {
                    "source_entity": "Item",
                    "destination_entity": "Item",
                    "attributes": [
                        { "destination": "name", "source": { "Default": { "value": { "Text": "Imported" } } } },
                        { "destination": "timestamp", "source": { "Copy": { "from": "timestamp" } } }
                    ]
                }
            ]
        }"#,
    );
    let migrator = fx.migrator(&["V1", "V2"]);

    write_v1_store(&fx.store, 2);
    migrator.migrate_store(&fx.store, &"V2".into()).unwrap();

    for (_, record) in read_all(&fx.store) {
        assert_eq!(
            record.values.get("name"),
            Some(&Value::Text("Imported".to_string()))
        );
    }
}

// ---------------------------------------------------------------------------
// Checkpoint safety

#[timeout(4000)]
#[test]
fn test_pending_wal_content_survives_migration() {
    let fx = Fixture::new();
    fx.declare(&item_v1());
    fx.declare(&item_v2());
    let migrator = fx.migrator(&["V1", "V2"]);

    write_v1_store(&fx.store, 2);
    let mut wal = WalWriter::open(&fx.store).unwrap();
    wal.append(
        "Item",
        Record::new(3).with("timestamp", Value::Timestamp(300)),
    )
    .unwrap();
    wal.sync().unwrap();

    migrator.migrate_store(&fx.store, &"V2".into()).unwrap();

    let records = read_all(&fx.store);
    assert_eq!(records.len(), 3);
    let timestamps: Vec<_> = records
        .iter()
        .map(|(_, r)| r.values.get("timestamp").cloned().unwrap())
        .collect();
    assert!(timestamps.contains(&Value::Timestamp(300)));
}

// ---------------------------------------------------------------------------
// Unknown store version

#[timeout(4000)]
#[test]
fn test_unknown_store_version_is_refused() {
    let fx = Fixture::new();
    fx.declare(&item_v1());
    fx.declare(&item_v2());
    let migrator = fx.migrator(&["V1", "V2"]);

    // A store stamped by a schema the catalog never declared.
    let stranger = schema(
        "V9",
        vec![("Widget", vec![attribute("weight", AttrType::Float)])],
    );
    let mut writer = StoreWriter::create(&fx.store, &stranger.stamp()).unwrap();
    writer
        .append("Widget", Record::new(1).with("weight", Value::Float(1.5)))
        .unwrap();
    writer.finish().unwrap();
    let before = fs::read(&fx.store).unwrap();

    // Conservatively "not at target"...
    assert!(migrator
        .requires_migration(&fx.store, &"V2".into())
        .unwrap());
    // ...but never migrated by guesswork.
    let err = migrator
        .migrate_store(&fx.store, &"V2".into())
        .unwrap_err();
    assert!(matches!(err, MigrationError::UnknownStoreVersion { .. }));
    assert_eq!(fs::read(&fx.store).unwrap(), before);
}

// ---------------------------------------------------------------------------
// Reference integrity across a rename step

#[timeout(4000)]
#[test]
fn test_references_are_remapped_through_an_entity_rename() {
    let fx = Fixture::new();

    let v1 = schema(
        "V1",
        vec![
            ("Item", vec![attribute("timestamp", AttrType::Timestamp)]),
            (
                "Tag",
                vec![
                    attribute("label", AttrType::Text),
                    attribute("item", AttrType::Ref { entity: "Item".to_string() }),
                ],
            ),
        ],
    );
    let v2 = schema(
        "V2",
        vec![
            ("Entry", vec![attribute("timestamp", AttrType::Timestamp)]),
            (
                "Tag",
                vec![
                    attribute("label", AttrType::Text),
                    attribute("item", AttrType::Ref { entity: "Entry".to_string() }),
                ],
            ),
        ],
    );
    fx.declare(&v1);
    fx.declare(&v2);
    // Renames are authored intent; inference never guesses them.
    fx.declare_mapping_json(
        "V1",
        "V2",
        r#"{
            "source_version": "V1",
            "destination_version": "V2",
            "entities": [
                {
                    "source_entity": "Item",
                    "destination_entity": "Entry",
                    "attributes": [
                        { "destination": "timestamp", "source": { "Copy": { "from": "timestamp" } } }
                    ]
                },
                {
                    "source_entity": "Tag",
                    "destination_entity": "Tag",
                    "attributes": [
                        { "destination": "label", "source": { "Copy": { "from": "label" } } },
                        { "destination": "item", "source": { "Copy": { "from": "item" } } }
                    ]
                }
            ]
        }"#,
    );
    let migrator = fx.migrator(&["V1", "V2"]);

    let mut writer = StoreWriter::create(&fx.store, &v1.stamp()).unwrap();
    for id in [7u64, 9, 11] {
        writer
            .append(
                "Item",
                Record::new(id).with("timestamp", Value::Timestamp(id as i64)),
            )
            .unwrap();
    }
    for (id, target) in [(1u64, 9u64), (2, 11), (3, 9)] {
        writer
            .append(
                "Tag",
                Record::new(id)
                    .with("label", Value::Text(format!("tag-{}", id)))
                    .with(
                        "item",
                        Value::Ref {
                            entity: "Item".to_string(),
                            id: target,
                        },
                    ),
            )
            .unwrap();
    }
    writer.finish().unwrap();

    migrator.migrate_store(&fx.store, &"V2".into()).unwrap();

    let records = read_all(&fx.store);
    let entries: Vec<_> = records.iter().filter(|(e, _)| e == "Entry").collect();
    let tags: Vec<_> = records.iter().filter(|(e, _)| e == "Tag").collect();
    assert_eq!(entries.len(), 3);
    assert_eq!(tags.len(), 3);

    // Every reference resolves to exactly one migrated Entry.
    let entry_ids: Vec<u64> = entries.iter().map(|(_, r)| r.id).collect();
    for (_, tag) in &tags {
        match tag.values.get("item") {
            Some(Value::Ref { entity, id }) => {
                assert_eq!(entity, "Entry");
                assert!(entry_ids.contains(id));
            }
            other => panic!("expected a reference, got {:?}", other),
        }
    }

    // Tags 1 and 3 pointed at the same Item and still agree after renumbering.
    let tag_ref = |label: &str| -> u64 {
        tags.iter()
            .find(|(_, r)| r.values.get("label") == Some(&Value::Text(label.to_string())))
            .map(|(_, r)| match r.values.get("item") {
                Some(Value::Ref { id, .. }) => *id,
                _ => panic!("tag '{}' lost its reference", label),
            })
            .unwrap()
    };
    assert_eq!(tag_ref("tag-1"), tag_ref("tag-3"));
    assert_ne!(tag_ref("tag-1"), tag_ref("tag-2"));
}
