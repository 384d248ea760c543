// crates/partial-state-core/src/runtime/promotion.rs
// ============================================================================
// Module: Promotion Engine
// Description: Atomic validate-insert-delete of a partial record into target storage.
// Purpose: Enforce every target invariant at the single point a draft becomes real.
// Dependencies: log, thiserror, crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`PromotionEngine::promote`] reads a partial record under a write lock,
//! projects it through a precomputed [`FieldMap`], validates the projected
//! row, inserts it as a target record and deletes the partial record, all in
//! one unit of work. Either both writes land or neither does, so a draft
//! never coexists with its promoted copy.
//!
//! Hooks registered with [`PromotionEngineBuilder::after_promote`] run inside
//! the same unit of work once both writes are staged; a failing hook rolls
//! the whole promotion back.
//!
//! Invariants:
//! - Concurrent promotions of one id: exactly one succeeds, the rest see `NotFound`.
//! - A rejected promotion leaves the partial record untouched.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use log::info;
use log::warn;
use thiserror::Error;

use crate::core::FieldMap;
use crate::core::FieldName;
use crate::core::FieldMapping;
use crate::core::IncompleteRecord;
use crate::core::PartialRecord;
use crate::core::PartialStateId;
use crate::core::RecordValidator;
use crate::core::SchemaError;
use crate::core::TargetRecord;
use crate::core::TargetRow;
use crate::core::Violation;
use crate::core::validate_target;
use crate::interfaces::ErrorKind;
use crate::interfaces::SchemaBound;
use crate::interfaces::StoreError;
use crate::interfaces::TargetLookup;
use crate::interfaces::TransactionalStore;
use crate::interfaces::UnitOfWork;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Promotion failures.
///
/// # Invariants
/// - `NotFound` and `Incomplete` are terminal for the call; `Store` may be retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromotionError {
    /// Partial record is absent: already promoted, deleted or expired.
    #[error("partial record not found: {0}")]
    NotFound(PartialStateId),
    /// Partial record fails target validation.
    #[error(transparent)]
    Incomplete(IncompleteRecord),
    /// Shadow and target schemas disagree.
    #[error("promotion schema mismatch: {0}")]
    SchemaMismatch(String),
    /// Underlying store failed; both writes were rolled back.
    #[error("promotion store error: {0}")]
    Store(StoreError),
}

impl PromotionError {
    /// Returns the error category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Incomplete(_) => ErrorKind::IncompleteRecord,
            Self::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            Self::Store(error) => error.kind(),
        }
    }

    /// Returns true when retrying the whole promotion may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Store(error) => error.is_retryable(),
            _ => false,
        }
    }

    /// Returns the incompleteness report, if validation failed.
    #[must_use]
    pub const fn incomplete(&self) -> Option<&IncompleteRecord> {
        match self {
            Self::Incomplete(report) => Some(report),
            _ => None,
        }
    }
}

impl From<StoreError> for PromotionError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::SchemaMismatch(message) => Self::SchemaMismatch(message),
            other => Self::Store(other),
        }
    }
}

impl From<SchemaError> for PromotionError {
    fn from(error: SchemaError) -> Self {
        Self::SchemaMismatch(error.to_string())
    }
}

// ============================================================================
// SECTION: Hooks
// ============================================================================

/// Cleanup run inside a promotion's unit of work after the target row is
/// inserted and the partial record deleted.
pub type AfterPromoteHook = Arc<
    dyn Fn(&PartialRecord, &TargetRecord, &mut dyn UnitOfWork) -> Result<(), StoreError>
        + Send
        + Sync,
>;

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Promotes partial records into target records.
pub struct PromotionEngine<S> {
    /// Backing store.
    store: S,
    /// Precomputed shadow-to-target projection.
    field_map: FieldMap,
    /// Injected validators, run in order after the built-in checks.
    validators: Vec<Arc<dyn RecordValidator>>,
    /// Hooks run in order before the unit commits.
    hooks: Vec<AfterPromoteHook>,
}

impl<S> PromotionEngine<S>
where
    S: SchemaBound + TransactionalStore,
{
    /// Starts a builder over `store`.
    #[must_use]
    pub fn builder(store: S) -> PromotionEngineBuilder<S> {
        PromotionEngineBuilder {
            store,
            validators: Vec::new(),
            overrides: Vec::new(),
            hooks: Vec::new(),
        }
    }

    /// Creates an engine with no validators and default field mapping.
    ///
    /// # Errors
    ///
    /// Returns [`PromotionError::SchemaMismatch`] when the store's schemas disagree.
    pub fn new(store: S) -> Result<Self, PromotionError> {
        Self::builder(store).build()
    }

    /// Returns the backing store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns the shadow-to-target projection.
    #[must_use]
    pub const fn field_map(&self) -> &FieldMap {
        &self.field_map
    }

    /// Runs the built-in checks and every injected validator over `row`.
    fn collect_violations(&self, row: &TargetRow, targets: &dyn TargetLookup) -> Vec<Violation> {
        let mut violations = validate_target(row);
        for validator in &self.validators {
            match validator.validate(row, targets) {
                Ok(()) => {}
                Err(found) if found.is_empty() => violations.push(Violation::rejected(
                    validator.name(),
                    None,
                    "rejected without detail",
                )),
                Err(found) => violations.extend(found),
            }
        }
        violations
    }

    /// Promotes partial record `id` into a new target record.
    ///
    /// # Errors
    ///
    /// Returns [`PromotionError::NotFound`] when the record is gone,
    /// [`PromotionError::Incomplete`] when it fails validation (the record is
    /// left untouched) and [`PromotionError::Store`] when storage fails (both
    /// writes are rolled back, as they are when a hook fails).
    pub fn promote(&self, id: PartialStateId) -> Result<TargetRecord, PromotionError> {
        let outcome: Result<TargetRecord, PromotionError> = self.store.atomically(|unit| {
            let record =
                unit.fetch_partial_for_update(id).map_err(|error| missing_as_not_found(id, error))?;
            let row = self.field_map.project(&record);
            let violations = self.collect_violations(&row, unit.targets());
            if !violations.is_empty() {
                return Err(PromotionError::Incomplete(IncompleteRecord {
                    id,
                    violations,
                }));
            }
            let target = unit.insert_target(&row)?;
            unit.delete_partial(id).map_err(|error| missing_as_not_found(id, error))?;
            for hook in &self.hooks {
                hook(&record, &target, &mut *unit)?;
            }
            Ok(target)
        });
        match &outcome {
            Ok(target) => {
                info!("promoted partial record {id} to target record {}", target.id);
            }
            Err(PromotionError::Incomplete(report)) => {
                let fields: Vec<&str> =
                    report.failing_fields().into_iter().map(FieldName::as_str).collect();
                warn!(
                    "promotion of partial record {id} rejected: {} violation(s) on [{}]",
                    report.violations.len(),
                    fields.join(", ")
                );
            }
            Err(error) => {
                warn!("promotion of partial record {id} failed: {error}");
            }
        }
        outcome
    }
}

/// Builder for [`PromotionEngine`].
pub struct PromotionEngineBuilder<S> {
    /// Backing store.
    store: S,
    /// Injected validators.
    validators: Vec<Arc<dyn RecordValidator>>,
    /// Field mapping overrides.
    overrides: Vec<FieldMapping>,
    /// Post-promotion hooks.
    hooks: Vec<AfterPromoteHook>,
}

impl<S> PromotionEngineBuilder<S>
where
    S: SchemaBound + TransactionalStore,
{
    /// Adds a validator run after the built-in checks.
    #[must_use]
    pub fn validator(mut self, validator: impl RecordValidator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Adds a shared validator.
    #[must_use]
    pub fn shared_validator(mut self, validator: Arc<dyn RecordValidator>) -> Self {
        self.validators.push(validator);
        self
    }

    /// Maps a shadow column onto a target field.
    #[must_use]
    pub fn map_field(mut self, mapping: FieldMapping) -> Self {
        self.overrides.push(mapping);
        self
    }

    /// Adds a hook run inside the unit of work after each successful promotion.
    ///
    /// A hook error aborts the promotion and surfaces as [`PromotionError::Store`].
    #[must_use]
    pub fn after_promote<H>(mut self, hook: H) -> Self
    where
        H: Fn(&PartialRecord, &TargetRecord, &mut dyn UnitOfWork) -> Result<(), StoreError>
            + Send
            + Sync
            + 'static,
    {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Verifies the store's schemas and builds the engine.
    ///
    /// # Errors
    ///
    /// Returns [`PromotionError::SchemaMismatch`] when the shadow has drifted
    /// from the target or an override is unusable.
    pub fn build(self) -> Result<PromotionEngine<S>, PromotionError> {
        let target = Arc::clone(self.store.target_schema());
        let shadow = Arc::clone(self.store.shadow_schema());
        if let Err(error) = shadow.verify_against(&target) {
            warn!("schema drift between {} and {}: {error}", shadow.entity(), target.entity());
            return Err(error.into());
        }
        let field_map = FieldMap::new(target, &shadow, &self.overrides)?;
        Ok(PromotionEngine {
            store: self.store,
            field_map,
            validators: self.validators,
            hooks: self.hooks,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps a store not-found error onto the promoted id.
fn missing_as_not_found(id: PartialStateId, error: StoreError) -> PromotionError {
    match error {
        StoreError::NotFound(_) => PromotionError::NotFound(id),
        other => other.into(),
    }
}
