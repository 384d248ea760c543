// crates/partial-state-core/src/runtime/objects.rs
// ============================================================================
// Module: Partial Objects Façade
// Description: Target-shaped instances and the lookup/accessor surface over a store.
// Purpose: Let callers work with draft entities by id without touching shadow rows.
// Dependencies: thiserror, crate::{core, interfaces, runtime::promotion}
// ============================================================================

//! ## Overview
//! An [`Instance`] is an in-memory, target-shaped value: one slot per target
//! field, initialised from field defaults. [`PartialObjects`] moves instances
//! in and out of the partial record store and delegates finalization to the
//! [`PromotionEngine`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;

use crate::core::FieldMap;
use crate::core::FieldName;
use crate::core::FieldValue;
use crate::core::FieldValues;
use crate::core::PartialRecord;
use crate::core::PartialStateId;
use crate::core::SchemaError;
use crate::core::TargetRecord;
use crate::core::TargetSchema;
use crate::interfaces::ErrorKind;
use crate::interfaces::PartialRecordStore;
use crate::interfaces::StoreError;
use crate::interfaces::TransactionalStore;
use crate::runtime::promotion::PromotionEngine;
use crate::runtime::promotion::PromotionError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Façade errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// Partial record is absent or expired.
    #[error("partial record not found: {0}")]
    NotFound(String),
    /// Instance is already bound to a partial record.
    #[error("instance is already attached to partial record {0}")]
    AlreadyAttached(PartialStateId),
    /// Instance is not bound to a partial record.
    #[error("instance is not attached to a partial record")]
    Detached,
    /// Instance schema differs from the store's target schema.
    #[error("partial objects schema mismatch: {0}")]
    SchemaMismatch(String),
    /// Field access violates the target schema.
    #[error(transparent)]
    Schema(SchemaError),
    /// Underlying store failed.
    #[error("partial objects store error: {0}")]
    Store(StoreError),
}

impl AccessError {
    /// Returns the error category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyAttached(_) | Self::Detached | Self::Schema(_) => ErrorKind::InvalidInput,
            Self::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            Self::Store(error) => error.kind(),
        }
    }
}

impl From<StoreError> for AccessError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(message) => Self::NotFound(message),
            StoreError::SchemaMismatch(message) => Self::SchemaMismatch(message),
            other => Self::Store(other),
        }
    }
}

impl From<SchemaError> for AccessError {
    fn from(error: SchemaError) -> Self {
        Self::Schema(error)
    }
}

// ============================================================================
// SECTION: Instances
// ============================================================================

/// In-memory target-shaped value.
///
/// # Invariants
/// - `values` has one slot per target field, in target field order.
/// - Every non-null slot conforms to its field type.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    /// Target schema.
    schema: Arc<TargetSchema>,
    /// Positional values.
    values: Vec<FieldValue>,
    /// Bound partial record, if attached.
    partial_state_id: Option<PartialStateId>,
}

impl Instance {
    /// Creates a fresh instance with every field at its default (else null).
    #[must_use]
    pub fn new(schema: Arc<TargetSchema>) -> Self {
        let values =
            schema.fields().iter().map(|field| field.default.clone().unwrap_or_default()).collect();
        Self {
            schema,
            values,
            partial_state_id: None,
        }
    }

    /// Returns the target schema.
    #[must_use]
    pub const fn schema(&self) -> &Arc<TargetSchema> {
        &self.schema
    }

    /// Returns the bound partial record id, if attached.
    #[must_use]
    pub const fn partial_state_id(&self) -> Option<PartialStateId> {
        self.partial_state_id
    }

    /// Sets field `name`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Schema`] when the field is unknown or the value
    /// does not conform to its type.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<(), AccessError> {
        let value = value.into();
        let index = self.schema.index_of(name).ok_or_else(|| {
            SchemaError::Invalid(format!("{} has no field {name}", self.schema.entity()))
        })?;
        let field = &self.schema.fields()[index];
        if !value.conforms_to(&field.field_type) {
            return Err(AccessError::Schema(SchemaError::Invalid(format!(
                "field {name} is {} but value is {}",
                field.field_type,
                value.kind_label()
            ))));
        }
        self.values[index] = value;
        Ok(())
    }

    /// Builder-style [`Self::set`].
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Schema`] when the assignment is invalid.
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Result<Self, AccessError> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Returns the value of field `name`, if the field exists.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.schema.index_of(name).and_then(|index| self.values.get(index))
    }

    /// Returns mandatory fields that are still null.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&FieldName> {
        self.schema
            .fields()
            .iter()
            .zip(&self.values)
            .filter(|(field, value)| !field.nullable && value.is_null())
            .map(|(field, _)| &field.name)
            .collect()
    }

    /// Returns a name-keyed copy of every field, including nulls.
    #[must_use]
    pub fn to_values(&self) -> FieldValues {
        self.schema
            .fields()
            .iter()
            .zip(&self.values)
            .map(|(field, value)| (field.name.clone(), value.clone()))
            .collect()
    }

    /// Rebuilds an instance from a partial record as promotion would project it.
    fn from_record(field_map: &FieldMap, record: &PartialRecord) -> Self {
        let row = field_map.project(record);
        Self {
            schema: Arc::clone(row.schema()),
            values: row.values().to_vec(),
            partial_state_id: Some(record.id()),
        }
    }
}

// ============================================================================
// SECTION: Façade
// ============================================================================

/// Lookup and accessor surface for draft entities.
pub struct PartialObjects<S> {
    /// Promotion engine owning the store.
    engine: PromotionEngine<S>,
}

impl<S> PartialObjects<S>
where
    S: PartialRecordStore + TransactionalStore,
{
    /// Creates a façade with a default promotion engine over `store`.
    ///
    /// # Errors
    ///
    /// Returns [`PromotionError::SchemaMismatch`] when the store's schemas disagree.
    pub fn new(store: S) -> Result<Self, PromotionError> {
        PromotionEngine::new(store).map(Self::from_engine)
    }

    /// Creates a façade over a configured engine.
    #[must_use]
    pub const fn from_engine(engine: PromotionEngine<S>) -> Self {
        Self {
            engine,
        }
    }

    /// Returns the backing store.
    #[must_use]
    pub fn store(&self) -> &S {
        self.engine.store()
    }

    /// Returns the promotion engine.
    #[must_use]
    pub const fn engine(&self) -> &PromotionEngine<S> {
        &self.engine
    }

    /// Returns a fresh, detached instance of the target entity.
    #[must_use]
    pub fn instance(&self) -> Instance {
        Instance::new(Arc::clone(self.store().target_schema()))
    }

    /// Persists a fresh instance as a new partial record and binds it.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::AlreadyAttached`] when the instance is bound and
    /// [`AccessError::SchemaMismatch`] when it belongs to another schema.
    pub fn attach(&self, instance: &mut Instance) -> Result<PartialStateId, AccessError> {
        if let Some(id) = instance.partial_state_id {
            return Err(AccessError::AlreadyAttached(id));
        }
        self.ensure_schema(instance)?;
        let id = self.store().create(&self.shadow_values(instance))?;
        instance.partial_state_id = Some(id);
        Ok(id)
    }

    /// Reconstructs the instance stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::NotFound`] when the record is gone.
    pub fn resolve(&self, id: PartialStateId) -> Result<Instance, AccessError> {
        let record = self.store().fetch(id)?;
        Ok(Instance::from_record(self.engine.field_map(), &record))
    }

    /// Writes every field of a bound instance, explicit nulls included.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Detached`] when the instance is not bound and
    /// [`AccessError::NotFound`] when its record is gone.
    pub fn save(&self, instance: &Instance) -> Result<(), AccessError> {
        let id = instance.partial_state_id.ok_or(AccessError::Detached)?;
        self.ensure_schema(instance)?;
        self.store().update(id, &self.shadow_values(instance))?;
        Ok(())
    }

    /// Promotes the record stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`PromotionError::Incomplete`] when the record is not ready and
    /// [`PromotionError::NotFound`] when it is gone.
    pub fn finalize(&self, id: PartialStateId) -> Result<TargetRecord, PromotionError> {
        self.engine.promote(id)
    }

    /// Abandons the record stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::NotFound`] when the record is already gone.
    pub fn discard(&self, id: PartialStateId) -> Result<(), AccessError> {
        self.store().delete(id)?;
        Ok(())
    }

    /// Reconstructs the newest draft for a would-be natural key.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::NotFound`] when no draft carries `key`.
    pub fn by_natural_key(&self, key: impl Into<FieldValue>) -> Result<Instance, AccessError> {
        let record = self.store().latest_by_natural_key(&key.into())?;
        Ok(Instance::from_record(self.engine.field_map(), &record))
    }

    /// Deletes expired drafts.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Store`] when the shadow does not expire records.
    pub fn purge_expired(&self) -> Result<usize, AccessError> {
        Ok(self.store().purge_expired()?)
    }

    /// Keys an instance's values by the shadow columns promotion reads them from.
    fn shadow_values(&self, instance: &Instance) -> FieldValues {
        self.engine.field_map().shadow_values(&instance.values)
    }

    /// Rejects instances built for a different target schema.
    fn ensure_schema(&self, instance: &Instance) -> Result<(), AccessError> {
        let target = self.store().target_schema();
        if Arc::ptr_eq(&instance.schema, target) || *instance.schema == **target {
            Ok(())
        } else {
            Err(AccessError::SchemaMismatch(format!(
                "instance of {} does not match store target {}",
                instance.schema.entity(),
                target.entity()
            )))
        }
    }
}
