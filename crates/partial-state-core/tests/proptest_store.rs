// crates/partial-state-core/tests/proptest_store.rs
// ============================================================================
// Module: Partial Record Store Property-Based Tests
// Description: Property tests for create/update merge semantics.
// Purpose: Detect lost or leaked writes across arbitrary update sequences.
// ============================================================================

//! Property-based tests for partial record store invariants.

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

use std::collections::BTreeMap;

use partial_state_core::FieldDef;
use partial_state_core::FieldValue;
use partial_state_core::FieldValues;
use partial_state_core::InMemoryPartialStateStore;
use partial_state_core::MirrorOptions;
use partial_state_core::PartialRecordStore;
use partial_state_core::TargetSchema;
use partial_state_core::mirror;
use proptest::prelude::*;

const COLUMNS: [&str; 4] = ["alpha", "beta", "gamma", "delta"];

fn schema() -> TargetSchema {
    TargetSchema::builder("Wide")
        .unwrap()
        .field(FieldDef::integer("alpha").unwrap())
        .field(FieldDef::integer("beta").unwrap())
        .field(FieldDef::integer("gamma").unwrap().nullable())
        .field(FieldDef::integer("delta").unwrap())
        .build()
        .unwrap()
}

fn write_strategy() -> impl Strategy<Value = BTreeMap<usize, Option<i64>>> {
    prop::collection::btree_map(0 .. COLUMNS.len(), any::<Option<i64>>(), 0 .. COLUMNS.len())
}

fn to_values(write: &BTreeMap<usize, Option<i64>>) -> FieldValues {
    let mut values = FieldValues::new();
    for (index, value) in write {
        values.set(COLUMNS[*index], FieldValue::from(*value)).unwrap();
    }
    values
}

proptest! {
    #[test]
    fn fetch_reflects_the_last_write_per_field(
        initial in write_strategy(),
        updates in prop::collection::vec(write_strategy(), 0 .. 8),
    ) {
        let store =
            InMemoryPartialStateStore::for_target(schema(), &MirrorOptions::default()).unwrap();
        let id = store.create(&to_values(&initial)).unwrap();

        let mut expected = initial;
        for update in &updates {
            store.update(id, &to_values(update)).unwrap();
            expected.extend(update.iter().map(|(index, value)| (*index, *value)));
        }

        let record = store.fetch(id).unwrap();
        for (index, name) in COLUMNS.iter().enumerate() {
            let want = expected
                .get(&index)
                .copied()
                .flatten()
                .map_or(FieldValue::Null, FieldValue::Integer);
            prop_assert_eq!(record.get(name), Some(&want));
        }
    }

    #[test]
    fn mirror_is_deterministic_for_any_lifetime(lifetime in 1_u64 .. 1_000_000_000_000) {
        let options = MirrorOptions::default().state_lifetime_ms(lifetime);
        let first = mirror(&schema(), &options).unwrap();
        let second = mirror(&schema(), &options).unwrap();
        prop_assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
        prop_assert_eq!(first, second);
    }
}
