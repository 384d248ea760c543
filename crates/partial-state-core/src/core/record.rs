// crates/partial-state-core/src/core/record.rs
// ============================================================================
// Module: Partial State Records
// Description: Field value mappings, shadow rows, and promoted target rows.
// Purpose: Carry record values between callers, stores, and the promotion engine.
// Dependencies: serde, crate::core::{identifiers, schema, time, value}
// ============================================================================

//! ## Overview
//! [`FieldValues`] is the caller-facing partial mapping used for writes.
//! [`PartialRecord`] and [`TargetRow`] hold positional values aligned with
//! their schema's column order, so projection between them is a table lookup
//! rather than a per-call name search.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::FieldName;
use crate::core::identifiers::PartialStateId;
use crate::core::identifiers::TargetRecordId;
use crate::core::schema::SchemaError;
use crate::core::schema::ShadowSchema;
use crate::core::schema::TargetSchema;
use crate::core::time::Timestamp;
use crate::core::value::FieldValue;

// ============================================================================
// SECTION: Field Value Mappings
// ============================================================================

/// Partial mapping from field name to value.
///
/// # Invariants
/// - Names are unique; inserting an existing name replaces its value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldValues(BTreeMap<FieldName, FieldValue>);

impl FieldValues {
    /// Creates an empty mapping.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts or replaces a value.
    pub fn insert(&mut self, name: FieldName, value: impl Into<FieldValue>) {
        self.0.insert(name, value.into());
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: FieldName, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Validates `name` and inserts or replaces its value.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] when the name is malformed.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<(), SchemaError> {
        self.insert(FieldName::new(name)?, value);
        Ok(())
    }

    /// Returns the value for `name`, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.iter().find_map(|(key, value)| (key.as_str() == name).then_some(value))
    }

    /// Returns the number of mapped fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when no field is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over mapped fields in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, FieldName, FieldValue> {
        self.0.iter()
    }

    /// Resolves every mapped field to its shadow column position.
    ///
    /// Target constraints are not checked; only column existence and type
    /// conformance are.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] when a name is not a shadow column or
    /// a value does not conform to the column type.
    pub fn resolve_columns<'a>(
        &'a self,
        shadow: &ShadowSchema,
    ) -> Result<Vec<(usize, &'a FieldValue)>, SchemaError> {
        let mut resolved = Vec::with_capacity(self.0.len());
        for (name, value) in &self.0 {
            let index = shadow.index_of(name.as_str()).ok_or_else(|| {
                SchemaError::Invalid(format!("{} has no column {name}", shadow.entity()))
            })?;
            let column = shadow.column(name.as_str()).ok_or_else(|| {
                SchemaError::Invalid(format!("{} has no column {name}", shadow.entity()))
            })?;
            if !value.conforms_to(&column.field_type) {
                return Err(SchemaError::Invalid(format!(
                    "column {name} is {} but value is {}",
                    column.field_type,
                    value.kind_label()
                )));
            }
            resolved.push((index, value));
        }
        Ok(resolved)
    }
}

impl<'a> IntoIterator for &'a FieldValues {
    type Item = (&'a FieldName, &'a FieldValue);
    type IntoIter = btree_map::Iter<'a, FieldName, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<(FieldName, FieldValue)> for FieldValues {
    fn from_iter<I: IntoIterator<Item = (FieldName, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============================================================================
// SECTION: Partial Records
// ============================================================================

/// A shadow row.
///
/// # Invariants
/// - `values` has exactly one entry per shadow column, in shadow column order.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialRecord {
    /// Store-generated identifier.
    id: PartialStateId,
    /// Shadow schema the values are aligned with.
    schema: Arc<ShadowSchema>,
    /// Positional values.
    values: Vec<FieldValue>,
    /// Expiry timestamp when the shadow expires.
    expires_at: Option<Timestamp>,
}

impl PartialRecord {
    /// Assembles a record from positional values.
    ///
    /// Stores call this after decoding a row; `values` must follow
    /// [`ShadowSchema::columns`] order.
    #[must_use]
    pub const fn from_parts(
        id: PartialStateId,
        schema: Arc<ShadowSchema>,
        values: Vec<FieldValue>,
        expires_at: Option<Timestamp>,
    ) -> Self {
        Self {
            id,
            schema,
            values,
            expires_at,
        }
    }

    /// Returns the record identifier.
    #[must_use]
    pub const fn id(&self) -> PartialStateId {
        self.id
    }

    /// Returns the shadow schema.
    #[must_use]
    pub const fn schema(&self) -> &Arc<ShadowSchema> {
        &self.schema
    }

    /// Returns the positional values.
    #[must_use]
    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    /// Returns the expiry timestamp, if the shadow expires.
    #[must_use]
    pub const fn expires_at(&self) -> Option<Timestamp> {
        self.expires_at
    }

    /// Returns the value of column `name`, if the column exists.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.schema.index_of(name).and_then(|index| self.values.get(index))
    }

    /// Returns a detached name-keyed copy of every column.
    #[must_use]
    pub fn to_values(&self) -> FieldValues {
        self.schema
            .columns()
            .zip(self.values.iter())
            .map(|(field, value)| (field.name.clone(), value.clone()))
            .collect()
    }
}

/// Page of partial records, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialRecordPage {
    /// Records in descending id order.
    pub items: Vec<PartialRecord>,
    /// Cursor for the next page, when more records may exist.
    pub next_cursor: Option<PartialStateId>,
}

// ============================================================================
// SECTION: Target Rows
// ============================================================================

/// Values projected onto a target schema.
///
/// # Invariants
/// - `values` has exactly one entry per target field, in target field order.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRow {
    /// Target schema the values are aligned with.
    schema: Arc<TargetSchema>,
    /// Positional values.
    values: Vec<FieldValue>,
}

impl TargetRow {
    /// Assembles a row from positional values.
    #[must_use]
    pub const fn from_parts(schema: Arc<TargetSchema>, values: Vec<FieldValue>) -> Self {
        Self {
            schema,
            values,
        }
    }

    /// Builds a row from a name-keyed mapping; unmapped fields take their
    /// declared default (else null) and unknown names are returned as an error list.
    ///
    /// # Errors
    ///
    /// Returns the names that are not target fields.
    pub fn from_values(
        schema: Arc<TargetSchema>,
        values: &FieldValues,
    ) -> Result<Self, Vec<FieldName>> {
        let mut row: Vec<FieldValue> = schema
            .fields()
            .iter()
            .map(|field| field.default.clone().unwrap_or(FieldValue::Null))
            .collect();
        let mut unknown = Vec::new();
        for (name, value) in values {
            match schema.index_of(name.as_str()) {
                Some(index) => row[index] = value.clone(),
                None => unknown.push(name.clone()),
            }
        }
        if unknown.is_empty() {
            Ok(Self::from_parts(schema, row))
        } else {
            Err(unknown)
        }
    }

    /// Returns the target schema.
    #[must_use]
    pub const fn schema(&self) -> &Arc<TargetSchema> {
        &self.schema
    }

    /// Returns the positional values.
    #[must_use]
    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    /// Returns the value of field `name`, if the field exists.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.schema.index_of(name).and_then(|index| self.values.get(index))
    }

    /// Returns a detached name-keyed copy of every field.
    #[must_use]
    pub fn to_values(&self) -> FieldValues {
        self.schema
            .fields()
            .iter()
            .zip(self.values.iter())
            .map(|(field, value)| (field.name.clone(), value.clone()))
            .collect()
    }
}

/// A promoted (or directly created) target row with its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRecord {
    /// Store-generated identifier.
    pub id: TargetRecordId,
    /// Row values.
    pub row: TargetRow,
}

impl TargetRecord {
    /// Returns the value of field `name`, if the field exists.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.row.get(name)
    }
}
