// crates/partial-state-core/src/core/identifiers.rs
// ============================================================================
// Module: Partial State Identifiers
// Description: Canonical identifiers for partial records, target rows, and schema names.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module defines the identifiers used throughout Partial State. Record
//! identifiers are store-generated, non-zero and 1-based. Schema names are
//! validated at construction so they can be embedded in storage layouts
//! without further escaping concerns.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU64;

use serde::Deserialize;
use serde::Serialize;

use crate::core::schema::SchemaError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a field or entity name in bytes.
pub const MAX_NAME_LENGTH: usize = 63;

/// Column name of the shadow primary key.
pub const PARTIAL_STATE_ID_COLUMN: &str = "partial_state_id";

/// Column name of the shadow expiry timestamp.
pub const PARTIAL_STATE_EXPIRY_COLUMN: &str = "partial_state_expiry";

/// Column name of the store-generated target primary key.
pub const TARGET_ID_COLUMN: &str = "id";

/// Names that may never be declared as fields.
pub const RESERVED_NAMES: [&str; 3] =
    [TARGET_ID_COLUMN, PARTIAL_STATE_ID_COLUMN, PARTIAL_STATE_EXPIRY_COLUMN];

// ============================================================================
// SECTION: Record Identifiers
// ============================================================================

/// Identifier of a partial (shadow) record.
///
/// # Invariants
/// - Always >= 1 (non-zero, 1-based).
/// - Generated by the store and never reused, so a promoted or deleted id stays gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartialStateId(NonZeroU64);

impl PartialStateId {
    /// Creates a new partial state identifier from a non-zero value.
    #[must_use]
    pub const fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    /// Creates a partial state identifier from a raw value (returns `None` if zero).
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Returns the raw identifier value (always >= 1).
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for PartialStateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.get().fmt(f)
    }
}

/// Identifier of a promoted (target) record.
///
/// # Invariants
/// - Always >= 1 (non-zero, 1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetRecordId(NonZeroU64);

impl TargetRecordId {
    /// Creates a new target record identifier from a non-zero value.
    #[must_use]
    pub const fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    /// Creates a target record identifier from a raw value (returns `None` if zero).
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Returns the raw identifier value (always >= 1).
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for TargetRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.get().fmt(f)
    }
}

// ============================================================================
// SECTION: Schema Names
// ============================================================================

/// Field name within a target or shadow schema.
///
/// # Invariants
/// - Matches `[A-Za-z_][A-Za-z0-9_]*` and is at most [`MAX_NAME_LENGTH`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldName(String);

impl FieldName {
    /// Creates a validated field name.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] when the name is empty, too long, or
    /// contains characters outside `[A-Za-z0-9_]`.
    pub fn new(name: impl Into<String>) -> Result<Self, SchemaError> {
        let name = name.into();
        validate_name("field", &name)?;
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true when the name is reserved for store-managed columns.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        RESERVED_NAMES.contains(&self.0.as_str())
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FieldName {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FieldName> for String {
    fn from(value: FieldName) -> Self {
        value.0
    }
}

/// Entity (model) name for a target or shadow schema.
///
/// # Invariants
/// - Matches `[A-Za-z_][A-Za-z0-9_]*` and is at most [`MAX_NAME_LENGTH`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityName(String);

impl EntityName {
    /// Creates a validated entity name.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] when the name is malformed.
    pub fn new(name: impl Into<String>) -> Result<Self, SchemaError> {
        let name = name.into();
        validate_name("entity", &name)?;
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EntityName {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntityName> for String {
    fn from(value: EntityName) -> Self {
        value.0
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Validates an identifier used as a field, entity, or table name.
pub(crate) fn validate_name(kind: &str, name: &str) -> Result<(), SchemaError> {
    if name.is_empty() {
        return Err(SchemaError::Invalid(format!("{kind} name must be non-empty")));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(SchemaError::Invalid(format!(
            "{kind} name exceeds {MAX_NAME_LENGTH} bytes: {name}"
        )));
    }
    let mut chars = name.chars();
    let leading_ok = chars.next().is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_');
    if !leading_ok || !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return Err(SchemaError::Invalid(format!("{kind} name is not a valid identifier: {name}")));
    }
    Ok(())
}
