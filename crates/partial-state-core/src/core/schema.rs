// crates/partial-state-core/src/core/schema.rs
// ============================================================================
// Module: Partial State Schemas
// Description: Target schema declarations and their relaxed shadow counterparts.
// Purpose: Describe the entity shape that promotion enforces and that shadow stores relax.
// Dependencies: serde, thiserror, crate::core::{hashing, identifiers, value}
// ============================================================================

//! ## Overview
//! A [`TargetSchema`] is the caller-declared entity shape: an ordered list of
//! fields with types, nullability, defaults and constraints. A
//! [`ShadowSchema`] is derived from it by [`crate::mirror()`] and relaxes every
//! mirrored field to nullable. Both are explicit values handed to stores and
//! engines at construction time; nothing is discovered through global state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::hashing::HashDigest;
use crate::core::hashing::hash_canonical_json;
use crate::core::identifiers::EntityName;
use crate::core::identifiers::FieldName;
use crate::core::identifiers::validate_name;
use crate::core::value::FieldType;
use crate::core::value::FieldValue;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Schema declaration and mirroring errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Declaration is malformed.
    #[error("invalid schema: {0}")]
    Invalid(String),
    /// Declaration uses a feature mirroring does not support.
    #[error("unsupported schema feature: {0}")]
    Unsupported(String),
    /// Shadow and target schemas have drifted apart.
    #[error("schema mismatch: {0}")]
    Mismatch(String),
}

// ============================================================================
// SECTION: Field Definitions
// ============================================================================

/// Declaration of a single field.
///
/// # Invariants
/// - `max_length` is only meaningful for [`FieldType::Text`].
/// - `natural_key` fields are never nullable on a target schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name.
    pub name: FieldName,
    /// Semantic type.
    pub field_type: FieldType,
    /// Whether the field accepts null.
    #[serde(default)]
    pub nullable: bool,
    /// Value assigned to fresh instances.
    #[serde(default)]
    pub default: Option<FieldValue>,
    /// Maximum text length in characters.
    #[serde(default)]
    pub max_length: Option<usize>,
    /// Marks the entity's would-be primary key when it is not store-generated.
    #[serde(default)]
    pub natural_key: bool,
    /// Values must be unique across target rows.
    #[serde(default)]
    pub unique: bool,
    /// Storage should index the field.
    #[serde(default)]
    pub indexed: bool,
}

impl FieldDef {
    /// Creates a mandatory (non-nullable) field of the given type.
    #[must_use]
    pub const fn new(name: FieldName, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            nullable: false,
            default: None,
            max_length: None,
            natural_key: false,
            unique: false,
            indexed: false,
        }
    }

    /// Creates a mandatory integer field.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] when the name is malformed.
    pub fn integer(name: &str) -> Result<Self, SchemaError> {
        Ok(Self::new(FieldName::new(name)?, FieldType::Integer))
    }

    /// Creates a mandatory real field.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] when the name is malformed.
    pub fn real(name: &str) -> Result<Self, SchemaError> {
        Ok(Self::new(FieldName::new(name)?, FieldType::Real))
    }

    /// Creates a mandatory boolean field.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] when the name is malformed.
    pub fn boolean(name: &str) -> Result<Self, SchemaError> {
        Ok(Self::new(FieldName::new(name)?, FieldType::Boolean))
    }

    /// Creates a mandatory text field.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] when the name is malformed.
    pub fn text(name: &str) -> Result<Self, SchemaError> {
        Ok(Self::new(FieldName::new(name)?, FieldType::Text))
    }

    /// Creates a mandatory blob field.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] when the name is malformed.
    pub fn blob(name: &str) -> Result<Self, SchemaError> {
        Ok(Self::new(FieldName::new(name)?, FieldType::Blob))
    }

    /// Creates a mandatory reference to another entity.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] when either name is malformed.
    pub fn reference(name: &str, entity: &str) -> Result<Self, SchemaError> {
        Ok(Self::new(
            FieldName::new(name)?,
            FieldType::Reference {
                entity: EntityName::new(entity)?,
            },
        ))
    }

    /// Marks the field nullable.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Sets the value assigned to fresh instances.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets the maximum text length.
    #[must_use]
    pub const fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Marks the field as the entity's natural key.
    #[must_use]
    pub const fn natural_key(mut self) -> Self {
        self.natural_key = true;
        self
    }

    /// Marks the field unique.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks the field indexed.
    #[must_use]
    pub const fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Validates the declaration in isolation.
    fn validate(&self) -> Result<(), SchemaError> {
        if self.name.is_reserved() {
            return Err(SchemaError::Invalid(format!("field name is reserved: {}", self.name)));
        }
        if self.max_length.is_some() && self.field_type != FieldType::Text {
            return Err(SchemaError::Invalid(format!(
                "max_length is only valid on text fields: {}",
                self.name
            )));
        }
        if self.max_length == Some(0) {
            return Err(SchemaError::Invalid(format!(
                "max_length must be greater than zero: {}",
                self.name
            )));
        }
        if let Some(default) = &self.default
            && !default.conforms_to(&self.field_type)
        {
            return Err(SchemaError::Invalid(format!(
                "default for {} is {} but field is {}",
                self.name,
                default.kind_label(),
                self.field_type
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Target Schema
// ============================================================================

/// Caller-declared entity shape enforced at promotion time.
///
/// # Invariants
/// - Field names are unique and not reserved.
/// - At most one field is the natural key, and it is not nullable.
/// - Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSchema {
    /// Entity name.
    entity: EntityName,
    /// Storage table name.
    table: String,
    /// Ordered field declarations.
    fields: Vec<FieldDef>,
}

impl TargetSchema {
    /// Starts a builder for the given entity; the table defaults to the entity name.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] when the entity name is malformed.
    pub fn builder(entity: &str) -> Result<TargetSchemaBuilder, SchemaError> {
        let entity = EntityName::new(entity)?;
        Ok(TargetSchemaBuilder {
            table: entity.as_str().to_string(),
            entity,
            fields: Vec::new(),
        })
    }

    /// Returns the entity name.
    #[must_use]
    pub const fn entity(&self) -> &EntityName {
        &self.entity
    }

    /// Returns the storage table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the ordered field declarations.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Returns the declaration for `name`, if present.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name.as_str() == name)
    }

    /// Returns the position of `name` in field order, if present.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name.as_str() == name)
    }

    /// Returns the natural key declaration, if any.
    #[must_use]
    pub fn natural_key(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.natural_key)
    }
}

/// Builder for [`TargetSchema`].
#[derive(Debug, Clone)]
pub struct TargetSchemaBuilder {
    /// Entity name.
    entity: EntityName,
    /// Storage table name.
    table: String,
    /// Fields declared so far.
    fields: Vec<FieldDef>,
}

impl TargetSchemaBuilder {
    /// Overrides the storage table name.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Appends a field declaration.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Validates and builds the schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] when the declaration is malformed.
    pub fn build(self) -> Result<TargetSchema, SchemaError> {
        validate_name("table", &self.table)?;
        let mut seen = BTreeSet::new();
        let mut natural_keys = 0_usize;
        for field in &self.fields {
            field.validate()?;
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::Invalid(format!("duplicate field: {}", field.name)));
            }
            if field.natural_key {
                natural_keys += 1;
                if field.nullable {
                    return Err(SchemaError::Invalid(format!(
                        "natural key must not be nullable: {}",
                        field.name
                    )));
                }
            }
        }
        if natural_keys > 1 {
            return Err(SchemaError::Invalid("at most one natural key is allowed".to_string()));
        }
        Ok(TargetSchema {
            entity: self.entity,
            table: self.table,
            fields: self.fields,
        })
    }
}

// ============================================================================
// SECTION: Shadow Schema
// ============================================================================

/// Relaxed storage schema mirroring a [`TargetSchema`].
///
/// # Invariants
/// - `fields` mirror the target's fields 1:1 in order, with `nullable = true`.
/// - `extra_fields` are nullable and never collide with mirrored or reserved names.
/// - Produced by [`crate::mirror()`]; hand-built values must pass [`Self::verify_against`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowSchema {
    /// Entity name of the shadow model.
    pub(crate) entity: EntityName,
    /// Entity name of the mirrored target.
    pub(crate) target_entity: EntityName,
    /// Storage table name.
    pub(crate) table: String,
    /// Mirrored target fields.
    pub(crate) fields: Vec<FieldDef>,
    /// Shadow-only fields.
    pub(crate) extra_fields: Vec<FieldDef>,
    /// Name of the mirrored natural key, if the target declares one.
    pub(crate) natural_key: Option<FieldName>,
    /// Lifetime of a partial record in milliseconds, when records expire.
    pub(crate) state_lifetime_ms: Option<u64>,
}

impl ShadowSchema {
    /// Returns the shadow entity name.
    #[must_use]
    pub const fn entity(&self) -> &EntityName {
        &self.entity
    }

    /// Returns the mirrored target entity name.
    #[must_use]
    pub const fn target_entity(&self) -> &EntityName {
        &self.target_entity
    }

    /// Returns the storage table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the mirrored fields.
    #[must_use]
    pub fn mirrored_fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Returns the shadow-only fields.
    #[must_use]
    pub fn extra_fields(&self) -> &[FieldDef] {
        &self.extra_fields
    }

    /// Returns every stored column in shadow order (mirrored, then extras).
    pub fn columns(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().chain(self.extra_fields.iter())
    }

    /// Returns the number of stored columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.fields.len() + self.extra_fields.len()
    }

    /// Returns the column declaration for `name`, if present.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&FieldDef> {
        self.columns().find(|field| field.name.as_str() == name)
    }

    /// Returns the position of `name` in shadow column order, if present.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns().position(|field| field.name.as_str() == name)
    }

    /// Returns the mirrored natural key name, if any.
    #[must_use]
    pub const fn natural_key(&self) -> Option<&FieldName> {
        self.natural_key.as_ref()
    }

    /// Returns the record lifetime in milliseconds when records expire.
    #[must_use]
    pub const fn state_lifetime_ms(&self) -> Option<u64> {
        self.state_lifetime_ms
    }

    /// Returns true when partial records carry an expiry timestamp.
    #[must_use]
    pub const fn expires(&self) -> bool {
        self.state_lifetime_ms.is_some()
    }

    /// Returns a deterministic structural fingerprint of the schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] when the schema cannot be canonicalized
    /// (for example a non-finite real default).
    pub fn fingerprint(&self) -> Result<HashDigest, SchemaError> {
        hash_canonical_json(self).map_err(|err| SchemaError::Invalid(err.to_string()))
    }

    /// Verifies the shadow is structurally in sync with `target`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Mismatch`] describing the first drift found.
    pub fn verify_against(&self, target: &TargetSchema) -> Result<(), SchemaError> {
        if self.target_entity != *target.entity() {
            return Err(SchemaError::Mismatch(format!(
                "shadow {} mirrors {} but target is {}",
                self.entity,
                self.target_entity,
                target.entity()
            )));
        }
        if self.fields.len() != target.fields().len() {
            return Err(SchemaError::Mismatch(format!(
                "shadow {} has {} mirrored fields but target has {}",
                self.entity,
                self.fields.len(),
                target.fields().len()
            )));
        }
        for (shadow, expected) in self.fields.iter().zip(target.fields()) {
            if shadow.name != expected.name {
                return Err(SchemaError::Mismatch(format!(
                    "shadow field {} does not match target field {}",
                    shadow.name, expected.name
                )));
            }
            if shadow.field_type != expected.field_type {
                return Err(SchemaError::Mismatch(format!(
                    "field {} is {} on shadow but {} on target",
                    shadow.name, shadow.field_type, expected.field_type
                )));
            }
            if shadow.max_length != expected.max_length {
                return Err(SchemaError::Mismatch(format!(
                    "field {} max_length differs between shadow and target",
                    shadow.name
                )));
            }
            if !shadow.nullable {
                return Err(SchemaError::Mismatch(format!(
                    "shadow field {} must be nullable",
                    shadow.name
                )));
            }
        }
        let expected_key = target.natural_key().map(|field| &field.name);
        if self.natural_key.as_ref() != expected_key {
            return Err(SchemaError::Mismatch(format!(
                "natural key differs between shadow {} and target",
                self.entity
            )));
        }
        for extra in &self.extra_fields {
            if !extra.nullable {
                return Err(SchemaError::Mismatch(format!(
                    "shadow-only field {} must be nullable",
                    extra.name
                )));
            }
            if extra.name.is_reserved() || target.field(extra.name.as_str()).is_some() {
                return Err(SchemaError::Mismatch(format!(
                    "shadow-only field {} collides with a target or reserved name",
                    extra.name
                )));
            }
        }
        Ok(())
    }
}
