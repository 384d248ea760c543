// crates/partial-state-store-sqlite/tests/sqlite_store_unit.rs
// ============================================================================
// Module: SQLite Store Unit Tests
// Description: Durability, promotion and integrity tests for the SQLite store.
// Purpose: Validate persistence across reopen, transactional promotion,
//          expiry, schema drift detection and path safety.
// ============================================================================

//! ## Overview
//! Unit-level tests for `SQLite` store invariants:
//! - Drafts and targets survive a reopen; ids are never reused
//! - Promotion is atomic and serializes across store handles
//! - Expired drafts are invisible and purgeable
//! - Drifted tables or schemas fail closed on open
//! - Path safety checks and bookkeeping version validation

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread;

use partial_state_core::ErrorKind;
use partial_state_core::FieldDef;
use partial_state_core::FieldName;
use partial_state_core::FieldValue;
use partial_state_core::FieldValues;
use partial_state_core::FnValidator;
use partial_state_core::ManualClock;
use partial_state_core::MirrorOptions;
use partial_state_core::PartialObjects;
use partial_state_core::PartialRecordStore;
use partial_state_core::PartialStateId;
use partial_state_core::PromotionEngine;
use partial_state_core::PromotionError;
use partial_state_core::StoreError;
use partial_state_core::TargetLookup;
use partial_state_core::TargetRow;
use partial_state_core::TargetSchema;
use partial_state_core::TargetStore;
use partial_state_core::Timestamp;
use partial_state_core::Violation;
use partial_state_store_sqlite::SqlitePartialStateStore;
use partial_state_store_sqlite::SqliteStoreConfig;
use partial_state_store_sqlite::SqliteStoreError;
use partial_state_store_sqlite::SqliteStoreMode;
use partial_state_store_sqlite::SqliteSyncMode;
use rusqlite::Connection;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn sample_schema() -> TargetSchema {
    sample_schema_with_length(10)
}

fn sample_schema_with_length(max_length: usize) -> TargetSchema {
    TargetSchema::builder("Sample")
        .unwrap()
        .table("sample")
        .field(FieldDef::integer("number_column").unwrap())
        .field(FieldDef::text("text_column").unwrap().max_length(max_length))
        .build()
        .unwrap()
}

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("partial.db")
}

fn open(dir: &TempDir) -> SqlitePartialStateStore {
    SqlitePartialStateStore::open_for_target(
        SqliteStoreConfig::new(db_path(dir)),
        sample_schema(),
        &MirrorOptions::default(),
    )
    .unwrap()
}

fn values(number: Option<i64>, text: Option<&str>) -> FieldValues {
    let mut values = FieldValues::new();
    if let Some(number) = number {
        values.set("number_column", number).unwrap();
    }
    if let Some(text) = text {
        values.set("text_column", text).unwrap();
    }
    values
}

// ============================================================================
// SECTION: Persistence
// ============================================================================

#[test]
fn drafts_survive_a_reopen() {
    let dir = TempDir::new().unwrap();
    let id = {
        let store = open(&dir);
        let id = store.create(&values(None, Some("abcde"))).unwrap();
        store.update(id, &values(Some(5), None)).unwrap();
        id
    };
    assert_eq!(id, PartialStateId::from_raw(1).unwrap());

    let store = open(&dir);
    let record = store.fetch(id).unwrap();
    assert_eq!(record.get("number_column"), Some(&FieldValue::Integer(5)));
    assert_eq!(record.get("text_column"), Some(&FieldValue::from("abcde")));
    assert_eq!(record.expires_at(), None);
}

#[test]
fn every_field_type_round_trips() {
    let dir = TempDir::new().unwrap();
    let target = TargetSchema::builder("Asset")
        .unwrap()
        .field(FieldDef::integer("count").unwrap())
        .field(FieldDef::real("weight").unwrap())
        .field(FieldDef::boolean("active").unwrap())
        .field(FieldDef::text("label").unwrap())
        .field(FieldDef::blob("payload").unwrap())
        .field(FieldDef::reference("owner", "Person").unwrap().nullable())
        .build()
        .unwrap();
    let store = SqlitePartialStateStore::open_for_target(
        SqliteStoreConfig::new(db_path(&dir)),
        target,
        &MirrorOptions::default(),
    )
    .unwrap();

    let mut draft = FieldValues::new();
    draft.set("count", -3_i64).unwrap();
    draft.set("weight", 2.5_f64).unwrap();
    draft.set("active", true).unwrap();
    draft.set("label", "crate").unwrap();
    draft.set("payload", vec![0_u8, 1, 255]).unwrap();
    draft.set("owner", 42_i64).unwrap();
    let id = store.create(&draft).unwrap();

    let record = store.fetch(id).unwrap();
    assert_eq!(record.to_values(), draft);

    let promoted = PromotionEngine::new(store.clone()).unwrap().promote(id).unwrap();
    let stored = store.fetch_target(promoted.id).unwrap();
    assert_eq!(stored, promoted);
    assert_eq!(stored.get("active"), Some(&FieldValue::Boolean(true)));
}

#[test]
fn ids_are_not_reused_after_delete_and_reopen() {
    let dir = TempDir::new().unwrap();
    let first = {
        let store = open(&dir);
        let first = store.create(&FieldValues::new()).unwrap();
        store.delete(first).unwrap();
        first
    };
    let store = open(&dir);
    let second = store.create(&FieldValues::new()).unwrap();
    assert!(second > first);
    assert!(matches!(store.fetch(first), Err(StoreError::NotFound(_))));
}

#[test]
fn delete_journal_mode_is_supported() {
    let dir = TempDir::new().unwrap();
    let mut config = SqliteStoreConfig::new(db_path(&dir));
    config.journal_mode = SqliteStoreMode::Delete;
    config.sync_mode = SqliteSyncMode::Normal;
    config.read_pool_size = 1;
    let store =
        SqlitePartialStateStore::open_for_target(config, sample_schema(), &MirrorOptions::default())
            .unwrap();

    let id = store.create(&values(Some(1), None)).unwrap();
    assert_eq!(store.fetch(id).unwrap().get("number_column"), Some(&FieldValue::Integer(1)));
    assert!(store.readiness().is_ok());
    assert_eq!(store.config().read_pool_size, 1);
}

// ============================================================================
// SECTION: Promotion
// ============================================================================

#[test]
fn end_to_end_draft_lifecycle() {
    let dir = TempDir::new().unwrap();
    let objects = PartialObjects::new(open(&dir)).unwrap();

    let mut draft = objects.instance().with("text_column", "abcde").unwrap();
    let id = objects.attach(&mut draft).unwrap();
    assert_eq!(id.get(), 1);

    let err = objects.finalize(id).unwrap_err();
    let missing: Vec<&str> =
        err.incomplete().unwrap().missing_fields().into_iter().map(FieldName::as_str).collect();
    assert_eq!(missing, vec!["number_column"]);
    assert!(objects.store().fetch(id).is_ok());

    let mut resumed = objects.resolve(id).unwrap();
    resumed.set("number_column", 5_i64).unwrap();
    objects.save(&resumed).unwrap();

    let target = objects.finalize(id).unwrap();
    assert_eq!(target.get("number_column"), Some(&FieldValue::Integer(5)));
    assert_eq!(target.get("text_column"), Some(&FieldValue::from("abcde")));
    assert!(matches!(objects.store().fetch(id), Err(StoreError::NotFound(_))));
    assert!(matches!(objects.finalize(id), Err(PromotionError::NotFound(_))));
    assert_eq!(objects.store().count_targets().unwrap(), 1);
}

#[test]
fn nan_is_rejected_instead_of_stored_as_null() {
    let dir = TempDir::new().unwrap();
    let target = TargetSchema::builder("Reading")
        .unwrap()
        .field(FieldDef::real("score").unwrap().nullable())
        .build()
        .unwrap();
    let store = SqlitePartialStateStore::open_for_target(
        SqliteStoreConfig::new(db_path(&dir)),
        target,
        &MirrorOptions::default(),
    )
    .unwrap();
    let mut nan = FieldValues::new();
    nan.set("score", f64::NAN).unwrap();

    assert!(matches!(store.create(&nan), Err(StoreError::Invalid(_))));

    let mut finite = FieldValues::new();
    finite.set("score", 1.5_f64).unwrap();
    let id = store.create(&finite).unwrap();
    assert!(matches!(store.update(id, &nan), Err(StoreError::Invalid(_))));
    assert_eq!(store.fetch(id).unwrap().get("score"), Some(&FieldValue::Real(1.5)));

    assert!(matches!(store.insert_target(&nan), Err(StoreError::Constraint(_))));
    assert_eq!(store.count_targets().unwrap(), 0);
}

#[test]
fn validators_read_targets_inside_the_write_transaction() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let distinct_text = FnValidator::new(
        "distinct_text",
        |row: &TargetRow, targets: &dyn TargetLookup| -> Result<(), Vec<Violation>> {
            let field = FieldName::new("text_column").unwrap();
            let text = row.get("text_column").cloned().unwrap_or(FieldValue::Null);
            match targets.find_target(&field, &text) {
                Ok(None) => Ok(()),
                Ok(Some(record)) => Err(vec![Violation::rejected(
                    "distinct_text",
                    Some(field),
                    format!("already used by target record {}", record.id),
                )]),
                Err(error) => {
                    Err(vec![Violation::rejected("distinct_text", None, error.to_string())])
                }
            }
        },
    );
    let engine = PromotionEngine::builder(store.clone()).validator(distinct_text).build().unwrap();
    let first = store.create(&values(Some(1), Some("same"))).unwrap();
    let second = store.create(&values(Some(2), Some("same"))).unwrap();
    let other = store.create(&values(Some(3), Some("other"))).unwrap();

    let promoted = engine.promote(first).unwrap();
    let err = engine.promote(second).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IncompleteRecord);
    assert!(store.fetch(second).is_ok());
    assert!(engine.promote(other).is_ok());
    assert_eq!(store.count_targets().unwrap(), 2);
    assert_eq!(store.fetch_target(promoted.id).unwrap(), promoted);
}

#[test]
fn unique_conflicts_roll_back_promotion() {
    let dir = TempDir::new().unwrap();
    let target = TargetSchema::builder("Account")
        .unwrap()
        .field(FieldDef::text("handle").unwrap().unique())
        .build()
        .unwrap();
    let store = SqlitePartialStateStore::open_for_target(
        SqliteStoreConfig::new(db_path(&dir)),
        target,
        &MirrorOptions::default(),
    )
    .unwrap();
    let engine = PromotionEngine::new(store.clone()).unwrap();
    let mut draft = FieldValues::new();
    draft.set("handle", "ada").unwrap();
    let first = store.create(&draft).unwrap();
    let second = store.create(&draft).unwrap();

    engine.promote(first).unwrap();
    let err = engine.promote(second).unwrap_err();

    assert!(matches!(err, PromotionError::Store(StoreError::Constraint(_))));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(store.fetch(second).is_ok());
    assert_eq!(store.count_targets().unwrap(), 1);
}

#[test]
fn concurrent_promotions_across_handles_have_one_winner() {
    let dir = TempDir::new().unwrap();
    let first = PromotionEngine::new(open(&dir)).unwrap();
    let second = PromotionEngine::new(open(&dir)).unwrap();
    let id = first.store().create(&values(Some(7), Some("race"))).unwrap();
    let winners = AtomicUsize::new(0);
    let losers = AtomicUsize::new(0);

    thread::scope(|scope| {
        for index in 0 .. 8 {
            let engine = if index % 2 == 0 { &first } else { &second };
            let winners = &winners;
            let losers = &losers;
            scope.spawn(move || match engine.promote(id) {
                Ok(_) => {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
                Err(PromotionError::NotFound(_)) => {
                    losers.fetch_add(1, Ordering::SeqCst);
                }
                Err(other) => panic!("unexpected promotion error: {other}"),
            });
        }
    });

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert_eq!(losers.load(Ordering::SeqCst), 7);
    assert_eq!(second.store().count_targets().unwrap(), 1);
}

#[test]
fn plain_delete_never_creates_a_target() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let id = store.create(&values(Some(1), Some("done"))).unwrap();
    store.delete(id).unwrap();
    assert!(matches!(store.delete(id), Err(StoreError::NotFound(_))));
    assert_eq!(store.count_targets().unwrap(), 0);
}

// ============================================================================
// SECTION: Lookup and Expiry
// ============================================================================

#[test]
fn list_and_natural_key_lookup() {
    let dir = TempDir::new().unwrap();
    let target = TargetSchema::builder("Profile")
        .unwrap()
        .field(FieldDef::text("handle").unwrap().natural_key())
        .field(FieldDef::integer("age").unwrap())
        .build()
        .unwrap();
    let store = SqlitePartialStateStore::open_for_target(
        SqliteStoreConfig::new(db_path(&dir)),
        target,
        &MirrorOptions::default(),
    )
    .unwrap();
    let mut ada = FieldValues::new();
    ada.set("handle", "ada").unwrap();
    let older = store.create(&ada).unwrap();
    ada.set("age", 36_i64).unwrap();
    let newer = store.create(&ada).unwrap();
    let mut bob = FieldValues::new();
    bob.set("handle", "bob").unwrap();
    let last = store.create(&bob).unwrap();

    let found = store.latest_by_natural_key(&FieldValue::from("ada")).unwrap();
    assert_eq!(found.id(), newer);
    assert_eq!(found.get("age"), Some(&FieldValue::Integer(36)));
    assert!(matches!(
        store.latest_by_natural_key(&FieldValue::from("eve")),
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        store.latest_by_natural_key(&FieldValue::Integer(1)),
        Err(StoreError::NotFound(_))
    ));

    let page = store.list(None, 2).unwrap();
    let listed: Vec<PartialStateId> = page.items.iter().map(|record| record.id()).collect();
    assert_eq!(listed, vec![last, newer]);
    assert_eq!(page.next_cursor, Some(newer));
    let page = store.list(page.next_cursor, 2).unwrap();
    let listed: Vec<PartialStateId> = page.items.iter().map(|record| record.id()).collect();
    assert_eq!(listed, vec![older]);
    assert_eq!(page.next_cursor, None);
    assert!(matches!(store.list(None, 0), Err(StoreError::Invalid(_))));
}

#[test]
fn expired_drafts_are_invisible_and_purgeable() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(Timestamp::from_unix_millis(1_000)));
    let store = SqlitePartialStateStore::open_for_target(
        SqliteStoreConfig::new(db_path(&dir)),
        sample_schema(),
        &MirrorOptions::default().state_lifetime_ms(500),
    )
    .unwrap()
    .with_clock(clock.clone());

    let stale = store.create(&values(Some(1), None)).unwrap();
    clock.advance_millis(400);
    let fresh = store.create(&values(Some(2), None)).unwrap();
    assert_eq!(
        store.fetch(stale).unwrap().expires_at(),
        Some(Timestamp::from_unix_millis(1_500))
    );

    clock.advance_millis(200);
    assert!(matches!(store.fetch(stale), Err(StoreError::NotFound(_))));
    assert!(matches!(store.update(stale, &values(Some(3), None)), Err(StoreError::NotFound(_))));
    assert!(matches!(store.delete(stale), Err(StoreError::NotFound(_))));
    assert_eq!(store.list(None, 10).unwrap().items.len(), 1);

    assert_eq!(store.purge_expired().unwrap(), 1);
    assert_eq!(store.purge_expired().unwrap(), 0);
    assert!(store.fetch(fresh).is_ok());
}

#[test]
fn purge_requires_an_expiring_shadow() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(open(&dir).purge_expired(), Err(StoreError::Invalid(_))));
}

#[test]
fn insert_target_enforces_table_constraints() {
    let dir = TempDir::new().unwrap();
    let target = TargetSchema::builder("Signup")
        .unwrap()
        .field(FieldDef::text("email").unwrap().unique().max_length(20))
        .field(FieldDef::integer("age").unwrap())
        .field(FieldDef::text("bio").unwrap().nullable())
        .build()
        .unwrap();
    let store = SqlitePartialStateStore::open_for_target(
        SqliteStoreConfig::new(db_path(&dir)),
        target,
        &MirrorOptions::default(),
    )
    .unwrap();

    let mut row = FieldValues::new();
    row.set("email", "ada@example.org").unwrap();
    row.set("age", 36_i64).unwrap();
    let record = store.insert_target(&row).unwrap();
    assert_eq!(record.get("bio"), Some(&FieldValue::Null));
    assert_eq!(store.fetch_target(record.id).unwrap(), record);

    let duplicate = store.insert_target(&row).unwrap_err();
    assert!(matches!(duplicate, StoreError::Constraint(_)));

    let mut missing = FieldValues::new();
    missing.set("email", "bob@example.org").unwrap();
    assert!(matches!(store.insert_target(&missing), Err(StoreError::Constraint(_))));

    let mut too_long = row.clone();
    too_long.set("email", "someone@a-very-long-domain.example").unwrap();
    assert!(matches!(store.insert_target(&too_long), Err(StoreError::Constraint(_))));

    let mut unknown = row;
    unknown.set("nickname", "x").unwrap();
    assert!(matches!(store.insert_target(&unknown), Err(StoreError::Invalid(_))));
    assert_eq!(store.count_targets().unwrap(), 1);
}

#[test]
fn shadows_of_one_target_share_a_database() {
    let dir = TempDir::new().unwrap();
    let drafts = open(&dir);
    let wizard = SqlitePartialStateStore::open_for_target(
        SqliteStoreConfig::new(db_path(&dir)),
        sample_schema(),
        &MirrorOptions {
            table_format: "{table}_wizard".to_string(),
            ..MirrorOptions::default()
        },
    )
    .unwrap();

    let draft = drafts.create(&values(Some(1), Some("a"))).unwrap();
    let step = wizard.create(&values(Some(2), Some("b"))).unwrap();
    PromotionEngine::new(drafts.clone()).unwrap().promote(draft).unwrap();
    PromotionEngine::new(wizard.clone()).unwrap().promote(step).unwrap();

    assert_eq!(drafts.count_targets().unwrap(), 2);
    assert_eq!(wizard.count_targets().unwrap(), 2);
}

// ============================================================================
// SECTION: Integrity
// ============================================================================

#[test]
fn changed_schema_is_a_mismatch_on_reopen() {
    let dir = TempDir::new().unwrap();
    drop(open(&dir));

    let err = SqlitePartialStateStore::open_for_target(
        SqliteStoreConfig::new(db_path(&dir)),
        sample_schema_with_length(20),
        &MirrorOptions::default(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, SqliteStoreError::SchemaMismatch(_)));
    assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
}

#[test]
fn altered_shadow_table_is_a_mismatch_on_reopen() {
    let dir = TempDir::new().unwrap();
    drop(open(&dir));
    let connection = Connection::open(db_path(&dir)).unwrap();
    connection.execute_batch("ALTER TABLE sample_partialstate ADD COLUMN rogue TEXT;").unwrap();
    drop(connection);

    let err = SqlitePartialStateStore::open_for_target(
        SqliteStoreConfig::new(db_path(&dir)),
        sample_schema(),
        &MirrorOptions::default(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, SqliteStoreError::SchemaMismatch(_)));
}

#[test]
fn relaxed_target_table_is_a_mismatch_on_open() {
    let dir = TempDir::new().unwrap();
    let connection = Connection::open(db_path(&dir)).unwrap();
    connection
        .execute_batch(
            "CREATE TABLE sample (id INTEGER PRIMARY KEY AUTOINCREMENT, number_column INTEGER, \
             text_column TEXT NOT NULL);",
        )
        .unwrap();
    drop(connection);

    let err = SqlitePartialStateStore::open_for_target(
        SqliteStoreConfig::new(db_path(&dir)),
        sample_schema(),
        &MirrorOptions::default(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, SqliteStoreError::SchemaMismatch(_)));
}

#[test]
fn unknown_store_version_is_rejected() {
    let dir = TempDir::new().unwrap();
    drop(open(&dir));
    let connection = Connection::open(db_path(&dir)).unwrap();
    connection.execute_batch("UPDATE store_meta SET version = 99;").unwrap();
    drop(connection);

    let err = SqlitePartialStateStore::open_for_target(
        SqliteStoreConfig::new(db_path(&dir)),
        sample_schema(),
        &MirrorOptions::default(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, SqliteStoreError::VersionMismatch(_)));
    assert!(matches!(StoreError::from(err), StoreError::SchemaMismatch(_)));
}

#[test]
fn unsafe_paths_and_limits_are_rejected() {
    let dir = TempDir::new().unwrap();
    let open_at = |config: SqliteStoreConfig| {
        SqlitePartialStateStore::open_for_target(config, sample_schema(), &MirrorOptions::default())
            .err()
            .unwrap()
    };

    let directory = open_at(SqliteStoreConfig::new(dir.path()));
    assert!(matches!(directory, SqliteStoreError::Invalid(_)));

    let overlong = open_at(SqliteStoreConfig::new(dir.path().join("a".repeat(300))));
    assert!(matches!(overlong, SqliteStoreError::Invalid(_)));

    let empty = open_at(SqliteStoreConfig::new(""));
    assert!(matches!(empty, SqliteStoreError::Invalid(_)));

    let mut no_readers = SqliteStoreConfig::new(db_path(&dir));
    no_readers.read_pool_size = 0;
    assert!(matches!(open_at(no_readers), SqliteStoreError::Invalid(_)));
}

#[test]
fn busy_errors_are_retryable_store_errors() {
    let busy = StoreError::from(SqliteStoreError::Busy("database is locked".to_string()));
    assert!(busy.is_retryable());
    assert_eq!(busy.kind(), ErrorKind::StoreIo);
    assert!(!StoreError::from(SqliteStoreError::Db("disk".to_string())).is_retryable());
}
