// crates/partial-state-core/src/core/mapping.rs
// ============================================================================
// Module: Shadow-To-Target Field Mapping
// Description: Precomputed projection from shadow columns onto target fields.
// Purpose: Resolve name matching once per schema pair instead of per promotion.
// Dependencies: serde, crate::core::{identifiers, record, schema, value}
// ============================================================================

//! ## Overview
//! A [`FieldMap`] holds, for every target field, the position of the shadow
//! column that feeds it. By default a target field is fed by the mirrored
//! column with the same name; a [`FieldMapping`] override redirects it to any
//! other column of the same type, typically a shadow-only field. Shadow-only
//! fields that no override names are dropped during projection.
//!
//! The map also runs in reverse: [`FieldMap::shadow_values`] writes a
//! target-shaped value set into the columns that feed each field, so a draft
//! edited field by field promotes exactly as it reads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::FieldName;
use crate::core::record::FieldValues;
use crate::core::record::PartialRecord;
use crate::core::record::TargetRow;
use crate::core::schema::SchemaError;
use crate::core::schema::ShadowSchema;
use crate::core::schema::TargetSchema;
use crate::core::value::FieldValue;

// ============================================================================
// SECTION: Overrides
// ============================================================================

/// Explicit mapping of a shadow column onto a target field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Shadow column supplying the value.
    pub from: FieldName,
    /// Target field receiving the value.
    pub to: FieldName,
}

impl FieldMapping {
    /// Creates a mapping from shadow column `from` to target field `to`.
    #[must_use]
    pub const fn new(from: FieldName, to: FieldName) -> Self {
        Self {
            from,
            to,
        }
    }
}

// ============================================================================
// SECTION: Field Map
// ============================================================================

/// Projection table from shadow column positions to target field positions.
///
/// # Invariants
/// - `sources.len()` equals the target field count.
/// - Every source index is a valid shadow column whose type equals the target field's type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMap {
    /// Target schema rows are projected onto.
    target: Arc<TargetSchema>,
    /// Shadow column position for each target field, in target order.
    sources: Vec<usize>,
    /// Shadow column name for each target field, in target order.
    columns: Vec<FieldName>,
}

impl FieldMap {
    /// Builds the projection for a schema pair.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] when an override names an unknown
    /// column or field, or redirects the same field twice, and
    /// [`SchemaError::Mismatch`] when a source column's type differs from its
    /// target field's type.
    pub fn new(
        target: Arc<TargetSchema>,
        shadow: &ShadowSchema,
        overrides: &[FieldMapping],
    ) -> Result<Self, SchemaError> {
        let mut redirected = BTreeSet::new();
        let mut sources = Vec::with_capacity(target.fields().len());
        let mut columns = Vec::with_capacity(target.fields().len());
        for field in target.fields() {
            let source_name = overrides
                .iter()
                .find(|mapping| mapping.to == field.name)
                .map_or(&field.name, |mapping| &mapping.from);
            let index = shadow.index_of(source_name.as_str()).ok_or_else(|| {
                SchemaError::Mismatch(format!(
                    "no shadow column {source_name} feeds target field {}",
                    field.name
                ))
            })?;
            let source = shadow.column(source_name.as_str()).ok_or_else(|| {
                SchemaError::Mismatch(format!("shadow column {source_name} vanished"))
            })?;
            if source.field_type != field.field_type {
                return Err(SchemaError::Mismatch(format!(
                    "shadow column {source_name} is {} but target field {} is {}",
                    source.field_type, field.name, field.field_type
                )));
            }
            sources.push(index);
            columns.push(source_name.clone());
        }
        for mapping in overrides {
            if target.field(mapping.to.as_str()).is_none() {
                return Err(SchemaError::Invalid(format!(
                    "override targets unknown field {}",
                    mapping.to
                )));
            }
            if !redirected.insert(mapping.to.as_str()) {
                return Err(SchemaError::Invalid(format!(
                    "target field {} is overridden more than once",
                    mapping.to
                )));
            }
        }
        Ok(Self {
            target,
            sources,
            columns,
        })
    }

    /// Returns the target schema.
    #[must_use]
    pub const fn target(&self) -> &Arc<TargetSchema> {
        &self.target
    }

    /// Projects a partial record onto the target schema.
    #[must_use]
    pub fn project(&self, record: &PartialRecord) -> TargetRow {
        let values = self
            .sources
            .iter()
            .map(|index| record.values().get(*index).cloned().unwrap_or(FieldValue::Null))
            .collect();
        TargetRow::from_parts(Arc::clone(&self.target), values)
    }

    /// Returns the shadow column feeding target field `name`.
    #[must_use]
    pub fn source_of(&self, name: &str) -> Option<&FieldName> {
        self.target.index_of(name).and_then(|index| self.columns.get(index))
    }

    /// Keys target-ordered `values` by the shadow column feeding each field.
    #[must_use]
    pub fn shadow_values(&self, values: &[FieldValue]) -> FieldValues {
        self.columns.iter().cloned().zip(values.iter().cloned()).collect()
    }
}
