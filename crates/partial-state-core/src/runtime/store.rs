// crates/partial-state-core/src/runtime/store.rs
// ============================================================================
// Module: In-Memory Partial State Store
// Description: Mutex-guarded partial and target record maps.
// Purpose: Provide a deterministic store for tests and embedded use.
// Dependencies: log, crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`InMemoryPartialStateStore`] keeps partial and target rows in one shared
//! map pair behind a single mutex, so every operation (and every unit of
//! work) is atomic with respect to every other. Units of work stage their
//! writes and apply them only when the work closure succeeds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use log::debug;
use log::info;

use crate::core::FieldName;
use crate::core::FieldValue;
use crate::core::FieldValues;
use crate::core::MirrorOptions;
use crate::core::PartialRecord;
use crate::core::PartialRecordPage;
use crate::core::PartialStateId;
use crate::core::ShadowSchema;
use crate::core::TargetRecord;
use crate::core::TargetRecordId;
use crate::core::TargetRow;
use crate::core::TargetSchema;
use crate::core::Timestamp;
use crate::core::mirror;
use crate::core::validate_target;
use crate::interfaces::Clock;
use crate::interfaces::PartialRecordStore;
use crate::interfaces::SchemaBound;
use crate::interfaces::StoreError;
use crate::interfaces::TargetLookup;
use crate::interfaces::TargetStore;
use crate::interfaces::TransactionalStore;
use crate::interfaces::UnitOfWork;
use crate::runtime::clock::SystemClock;

// ============================================================================
// SECTION: Stored Rows
// ============================================================================

/// Stored partial row.
#[derive(Debug, Clone)]
struct StoredPartial {
    /// Positional shadow values.
    values: Vec<FieldValue>,
    /// Expiry timestamp when the shadow expires.
    expires_at: Option<Timestamp>,
}

impl StoredPartial {
    /// Returns true when the row is visible at `now`.
    fn is_live_at(&self, now: Timestamp) -> bool {
        self.expires_at.is_none_or(|expires_at| !expires_at.is_expired_at(now))
    }
}

/// Mutable store state guarded by one mutex.
#[derive(Debug, Default)]
struct MemoryState {
    /// Partial rows keyed by id.
    partials: BTreeMap<PartialStateId, StoredPartial>,
    /// Target rows keyed by id.
    targets: BTreeMap<TargetRecordId, Vec<FieldValue>>,
    /// Last partial id handed out.
    last_partial_id: u64,
    /// Last target id handed out.
    last_target_id: u64,
}

impl MemoryState {
    /// Returns the live partial row for `id`.
    fn live_partial(&self, id: PartialStateId, now: Timestamp) -> Option<&StoredPartial> {
        self.partials.get(&id).filter(|row| row.is_live_at(now))
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// In-memory store for partial and target records.
///
/// # Invariants
/// - One mutex guards both maps; no operation observes a half-applied write.
/// - Identifiers are never reused, even after deletion or promotion.
#[derive(Clone)]
pub struct InMemoryPartialStateStore {
    /// Target schema.
    target: Arc<TargetSchema>,
    /// Shadow schema.
    shadow: Arc<ShadowSchema>,
    /// Time source for expiry.
    clock: Arc<dyn Clock>,
    /// Shared mutable state.
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryPartialStateStore {
    /// Creates a store for a verified schema pair.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SchemaMismatch`] when the shadow has drifted from the target.
    pub fn new(
        target: impl Into<Arc<TargetSchema>>,
        shadow: impl Into<Arc<ShadowSchema>>,
    ) -> Result<Self, StoreError> {
        let target = target.into();
        let shadow = shadow.into();
        shadow.verify_against(&target)?;
        Ok(Self {
            target,
            shadow,
            clock: Arc::new(SystemClock),
            state: Arc::new(Mutex::new(MemoryState::default())),
        })
    }

    /// Mirrors `target` with `options` and creates a store for the pair.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when mirroring fails.
    pub fn for_target(target: TargetSchema, options: &MirrorOptions) -> Result<Self, StoreError> {
        let shadow = mirror(&target, options)?;
        Self::new(target, shadow)
    }

    /// Replaces the clock used for expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Locks the shared state.
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Store("in-memory store mutex poisoned".to_string()))
    }

    /// Builds a public record from a stored row.
    fn to_record(&self, id: PartialStateId, row: &StoredPartial) -> PartialRecord {
        PartialRecord::from_parts(id, Arc::clone(&self.shadow), row.values.clone(), row.expires_at)
    }
}

impl SchemaBound for InMemoryPartialStateStore {
    fn target_schema(&self) -> &Arc<TargetSchema> {
        &self.target
    }

    fn shadow_schema(&self) -> &Arc<ShadowSchema> {
        &self.shadow
    }
}

impl PartialRecordStore for InMemoryPartialStateStore {
    fn create(&self, values: &FieldValues) -> Result<PartialStateId, StoreError> {
        let resolved = values.resolve_columns(&self.shadow)?;
        let mut row = vec![FieldValue::Null; self.shadow.column_count()];
        for (index, value) in resolved {
            row[index] = value.clone();
        }
        let expires_at =
            self.shadow.state_lifetime_ms().map(|ms| self.clock.now().saturating_add_millis(ms));
        let mut state = self.lock()?;
        let id = next_id(&mut state.last_partial_id)
            .and_then(PartialStateId::from_raw)
            .ok_or_else(|| StoreError::Store("partial record id space exhausted".to_string()))?;
        state.partials.insert(
            id,
            StoredPartial {
                values: row,
                expires_at,
            },
        );
        drop(state);
        debug!("created partial record {id} in {}", self.shadow.table());
        Ok(id)
    }

    fn fetch(&self, id: PartialStateId) -> Result<PartialRecord, StoreError> {
        let now = self.clock.now();
        let state = self.lock()?;
        let row = state.live_partial(id, now).ok_or_else(|| StoreError::missing(id))?;
        Ok(self.to_record(id, row))
    }

    fn update(&self, id: PartialStateId, values: &FieldValues) -> Result<(), StoreError> {
        let resolved = values.resolve_columns(&self.shadow)?;
        let now = self.clock.now();
        let mut state = self.lock()?;
        let row = state
            .partials
            .get_mut(&id)
            .filter(|row| row.is_live_at(now))
            .ok_or_else(|| StoreError::missing(id))?;
        for (index, value) in resolved {
            row.values[index] = value.clone();
        }
        drop(state);
        debug!("updated {} column(s) of partial record {id}", values.len());
        Ok(())
    }

    fn delete(&self, id: PartialStateId) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        if state.live_partial(id, now).is_none() {
            return Err(StoreError::missing(id));
        }
        state.partials.remove(&id);
        drop(state);
        debug!("deleted partial record {id}");
        Ok(())
    }

    fn latest_by_natural_key(&self, key: &FieldValue) -> Result<PartialRecord, StoreError> {
        let name = self.shadow.natural_key().ok_or_else(|| {
            StoreError::Invalid(format!("{} declares no natural key", self.target.entity()))
        })?;
        let index = self.shadow.index_of(name.as_str()).ok_or_else(|| {
            StoreError::SchemaMismatch(format!("natural key column {name} is missing"))
        })?;
        let now = self.clock.now();
        let state = self.lock()?;
        let found = state
            .partials
            .iter()
            .rev()
            .filter(|(_, row)| row.is_live_at(now))
            .find(|(_, row)| !key.is_null() && row.values.get(index) == Some(key));
        found
            .map(|(id, row)| self.to_record(*id, row))
            .ok_or_else(|| StoreError::NotFound(format!("natural key {name}")))
    }

    fn list(
        &self,
        cursor: Option<PartialStateId>,
        limit: usize,
    ) -> Result<PartialRecordPage, StoreError> {
        if limit == 0 {
            return Err(StoreError::Invalid("list limit must be greater than zero".to_string()));
        }
        let now = self.clock.now();
        let state = self.lock()?;
        let items: Vec<PartialRecord> = state
            .partials
            .iter()
            .rev()
            .filter(|(id, _)| cursor.is_none_or(|cursor| **id < cursor))
            .filter(|(_, row)| row.is_live_at(now))
            .take(limit)
            .map(|(id, row)| self.to_record(*id, row))
            .collect();
        let next_cursor =
            if items.len() == limit { items.last().map(PartialRecord::id) } else { None };
        Ok(PartialRecordPage {
            items,
            next_cursor,
        })
    }

    fn purge_expired(&self) -> Result<usize, StoreError> {
        if !self.shadow.expires() {
            return Err(StoreError::Invalid(format!(
                "{} does not use expiry timestamps",
                self.shadow.entity()
            )));
        }
        let now = self.clock.now();
        let mut state = self.lock()?;
        let before = state.partials.len();
        state.partials.retain(|_, row| row.is_live_at(now));
        let purged = before - state.partials.len();
        drop(state);
        info!("purged {purged} expired partial record(s) from {}", self.shadow.table());
        Ok(purged)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

impl TargetStore for InMemoryPartialStateStore {
    fn insert_target(&self, values: &FieldValues) -> Result<TargetRecord, StoreError> {
        let row = TargetRow::from_values(Arc::clone(&self.target), values).map_err(|unknown| {
            StoreError::Invalid(format!(
                "{} has no field(s) {}",
                self.target.entity(),
                join_names(&unknown)
            ))
        })?;
        let mut state = self.lock()?;
        let record = stage_target(&state, &[], &row)?;
        state.targets.insert(record.id, row.values().to_vec());
        state.last_target_id = record.id.get();
        drop(state);
        debug!("inserted target record {} into {}", record.id, self.target.table());
        Ok(record)
    }

    fn fetch_target(&self, id: TargetRecordId) -> Result<TargetRecord, StoreError> {
        let state = self.lock()?;
        let values = state.targets.get(&id).ok_or(StoreError::TargetNotFound(id))?;
        Ok(TargetRecord {
            id,
            row: TargetRow::from_parts(Arc::clone(&self.target), values.clone()),
        })
    }

    fn count_targets(&self) -> Result<u64, StoreError> {
        let state = self.lock()?;
        u64::try_from(state.targets.len())
            .map_err(|_| StoreError::Store("target count overflow".to_string()))
    }
}

// ============================================================================
// SECTION: Units of Work
// ============================================================================

/// Unit of work staging writes against a locked state snapshot.
struct MemoryUnit<'a> {
    /// Locked state, read-only until commit.
    state: &'a MemoryState,
    /// Shadow schema for returned records.
    shadow: &'a Arc<ShadowSchema>,
    /// Target schema for returned records.
    target: &'a Arc<TargetSchema>,
    /// Time the unit started.
    now: Timestamp,
    /// Partial ids staged for deletion.
    deleted: BTreeSet<PartialStateId>,
    /// Target rows staged for insertion.
    inserted: Vec<TargetRecord>,
}

impl TargetLookup for MemoryUnit<'_> {
    fn fetch_target(&self, id: TargetRecordId) -> Result<TargetRecord, StoreError> {
        if let Some(record) = self.inserted.iter().find(|record| record.id == id) {
            return Ok(record.clone());
        }
        let values = self.state.targets.get(&id).ok_or(StoreError::TargetNotFound(id))?;
        Ok(TargetRecord {
            id,
            row: TargetRow::from_parts(Arc::clone(self.target), values.clone()),
        })
    }

    fn count_targets(&self) -> Result<u64, StoreError> {
        u64::try_from(self.state.targets.len() + self.inserted.len())
            .map_err(|_| StoreError::Store("target count overflow".to_string()))
    }

    fn find_target(
        &self,
        field: &FieldName,
        value: &FieldValue,
    ) -> Result<Option<TargetRecord>, StoreError> {
        let index = self.target.index_of(field.as_str()).ok_or_else(|| {
            StoreError::Invalid(format!("{} has no field {field}", self.target.entity()))
        })?;
        let committed = self
            .state
            .targets
            .iter()
            .find(|(_, values)| values.get(index) == Some(value))
            .map(|(id, values)| TargetRecord {
                id: *id,
                row: TargetRow::from_parts(Arc::clone(self.target), values.clone()),
            });
        let staged = || {
            self.inserted
                .iter()
                .find(|record| record.row.values().get(index) == Some(value))
                .cloned()
        };
        Ok(committed.or_else(staged))
    }
}

impl UnitOfWork for MemoryUnit<'_> {
    fn targets(&self) -> &dyn TargetLookup {
        self
    }

    fn fetch_partial_for_update(
        &mut self,
        id: PartialStateId,
    ) -> Result<PartialRecord, StoreError> {
        if self.deleted.contains(&id) {
            return Err(StoreError::missing(id));
        }
        let row = self.state.live_partial(id, self.now).ok_or_else(|| StoreError::missing(id))?;
        Ok(PartialRecord::from_parts(
            id,
            Arc::clone(self.shadow),
            row.values.clone(),
            row.expires_at,
        ))
    }

    fn insert_target(&mut self, row: &TargetRow) -> Result<TargetRecord, StoreError> {
        let record = stage_target(self.state, &self.inserted, row)?;
        self.inserted.push(record.clone());
        Ok(record)
    }

    fn delete_partial(&mut self, id: PartialStateId) -> Result<(), StoreError> {
        if self.state.live_partial(id, self.now).is_none() || !self.deleted.insert(id) {
            return Err(StoreError::missing(id));
        }
        Ok(())
    }
}

impl TransactionalStore for InMemoryPartialStateStore {
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut state = self.lock()?;
        let mut unit = MemoryUnit {
            state: &state,
            shadow: &self.shadow,
            target: &self.target,
            now: self.clock.now(),
            deleted: BTreeSet::new(),
            inserted: Vec::new(),
        };
        debug!("unit of work started on {}", self.shadow.table());
        let outcome = work(&mut unit);
        let MemoryUnit {
            deleted,
            inserted,
            ..
        } = unit;
        match outcome {
            Ok(value) => {
                for id in &deleted {
                    state.partials.remove(id);
                }
                for record in inserted {
                    state.last_target_id = state.last_target_id.max(record.id.get());
                    state.targets.insert(record.id, record.row.values().to_vec());
                }
                debug!("unit of work committed on {}", self.shadow.table());
                Ok(value)
            }
            Err(error) => {
                debug!("unit of work rolled back on {}", self.shadow.table());
                Err(error)
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Advances an id counter, returning the new value.
fn next_id(counter: &mut u64) -> Option<u64> {
    *counter = counter.checked_add(1)?;
    Some(*counter)
}

/// Validates a target row against constraints and assigns the next target id.
fn stage_target(
    state: &MemoryState,
    staged: &[TargetRecord],
    row: &TargetRow,
) -> Result<TargetRecord, StoreError> {
    let violations = validate_target(row);
    if let Some(violation) = violations.first() {
        return Err(StoreError::Constraint(violation.to_string()));
    }
    let schema = row.schema();
    for (index, field) in schema.fields().iter().enumerate() {
        if !(field.unique || field.natural_key) {
            continue;
        }
        let Some(candidate) = row.values().get(index).filter(|value| !value.is_null()) else {
            continue;
        };
        let committed = state.targets.values().filter_map(|values| values.get(index));
        let pending = staged.iter().filter_map(|record| record.row.values().get(index));
        if committed.chain(pending).any(|existing| existing == candidate) {
            return Err(StoreError::Constraint(format!("{}: duplicate value", field.name)));
        }
    }
    let mut last = state.last_target_id.max(staged.last().map_or(0, |record| record.id.get()));
    let id = next_id(&mut last)
        .and_then(TargetRecordId::from_raw)
        .ok_or_else(|| StoreError::Store("target record id space exhausted".to_string()))?;
    Ok(TargetRecord {
        id,
        row: row.clone(),
    })
}

/// Joins field names for error messages.
fn join_names(names: &[FieldName]) -> String {
    names.iter().map(FieldName::as_str).collect::<Vec<_>>().join(", ")
}
