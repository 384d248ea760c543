// crates/partial-state-store-sqlite/tests/proptest_sqlite.rs
// ============================================================================
// Module: SQLite Store Property-Based Tests
// Description: Differential tests against the in-memory store.
// Purpose: Ensure both stores agree on merge semantics for arbitrary writes.
// ============================================================================

//! Property-based tests comparing the `SQLite` and in-memory stores.

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

use partial_state_core::FieldDef;
use partial_state_core::FieldValue;
use partial_state_core::FieldValues;
use partial_state_core::InMemoryPartialStateStore;
use partial_state_core::MirrorOptions;
use partial_state_core::PartialRecordStore;
use partial_state_core::TargetSchema;
use partial_state_store_sqlite::SqlitePartialStateStore;
use partial_state_store_sqlite::SqliteStoreConfig;
use proptest::prelude::*;
use tempfile::TempDir;

fn schema() -> TargetSchema {
    TargetSchema::builder("Mixed")
        .unwrap()
        .field(FieldDef::integer("count").unwrap())
        .field(FieldDef::boolean("flag").unwrap())
        .field(FieldDef::text("note").unwrap().max_length(8))
        .field(FieldDef::real("ratio").unwrap())
        .build()
        .unwrap()
}

fn ratio_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        4 => any::<f64>(),
        1 => Just(f64::NAN),
        1 => Just(f64::INFINITY),
    ]
}

fn write_strategy() -> impl Strategy<Value = FieldValues> {
    (
        prop::option::of(prop::option::of(any::<i64>())),
        prop::option::of(prop::option::of(any::<bool>())),
        prop::option::of(prop::option::of("[a-z]{0,12}")),
        prop::option::of(prop::option::of(ratio_strategy())),
    )
        .prop_map(|(count, flag, note, ratio)| {
            let mut values = FieldValues::new();
            if let Some(count) = count {
                values.set("count", FieldValue::from(count)).unwrap();
            }
            if let Some(flag) = flag {
                values.set("flag", FieldValue::from(flag)).unwrap();
            }
            if let Some(note) = note {
                values.set("note", FieldValue::from(note)).unwrap();
            }
            if let Some(ratio) = ratio {
                values.set("ratio", FieldValue::from(ratio)).unwrap();
            }
            values
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn sqlite_and_memory_stores_agree(
        initial in write_strategy(),
        updates in prop::collection::vec(write_strategy(), 0 .. 6),
    ) {
        let dir = TempDir::new().unwrap();
        let sqlite = SqlitePartialStateStore::open_for_target(
            SqliteStoreConfig::new(dir.path().join("diff.db")),
            schema(),
            &MirrorOptions::default(),
        )
        .unwrap();
        let memory =
            InMemoryPartialStateStore::for_target(schema(), &MirrorOptions::default()).unwrap();

        let durable = sqlite.create(&initial).map_err(|error| error.kind());
        let volatile = memory.create(&initial).map_err(|error| error.kind());
        prop_assert_eq!(durable, volatile);
        let (Ok(durable), Ok(volatile)) = (durable, volatile) else {
            return Ok(());
        };
        for update in &updates {
            let left = sqlite.update(durable, update).map_err(|error| error.kind());
            let right = memory.update(volatile, update).map_err(|error| error.kind());
            prop_assert_eq!(left, right);
        }

        let stored = sqlite.fetch(durable).unwrap().to_values();
        prop_assert_eq!(stored, memory.fetch(volatile).unwrap().to_values());
    }
}
