// crates/partial-state-core/src/core/value.rs
// ============================================================================
// Module: Partial State Field Values
// Description: Semantic field types and the values stored in shadow and target rows.
// Purpose: Provide a small, storage-neutral value model shared by every store.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Field types describe what a column holds; field values are what a row
//! actually holds. Nullability is a property of the schema, not the type, so
//! [`FieldValue::Null`] conforms to every type.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::EntityName;

// ============================================================================
// SECTION: Field Types
// ============================================================================

/// Semantic type of a schema field.
///
/// # Invariants
/// - Variants are stable for serialization and schema fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldType {
    /// Signed 64-bit integer.
    Integer,
    /// 64-bit floating point number.
    Real,
    /// Boolean flag.
    Boolean,
    /// UTF-8 text.
    Text,
    /// Raw bytes.
    Blob,
    /// Best-effort reference to another entity, holding its integer key.
    Reference {
        /// Referenced entity.
        entity: EntityName,
    },
    /// Many-to-many relation. Declarable on targets, never mirrored.
    ManyToMany {
        /// Related entity.
        entity: EntityName,
    },
}

impl FieldType {
    /// Returns a stable label for the type.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Boolean => "boolean",
            Self::Text => "text",
            Self::Blob => "blob",
            Self::Reference {
                ..
            } => "reference",
            Self::ManyToMany {
                ..
            } => "many_to_many",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference {
                entity,
            }
            | Self::ManyToMany {
                entity,
            } => write!(f, "{}({entity})", self.label()),
            _ => f.write_str(self.label()),
        }
    }
}

// ============================================================================
// SECTION: Field Values
// ============================================================================

/// A single stored value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Absent value.
    #[default]
    Null,
    /// Integer value (also used for references).
    Integer(i64),
    /// Floating point value.
    Real(f64),
    /// Boolean value.
    Boolean(bool),
    /// Text value.
    Text(String),
    /// Byte value.
    Blob(Vec<u8>),
}

impl FieldValue {
    /// Returns true when the value is [`FieldValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true when the value may be stored in a field of `field_type`.
    ///
    /// NaN conforms to no type: `SQLite` binds it as `NULL`.
    #[must_use]
    pub const fn conforms_to(&self, field_type: &FieldType) -> bool {
        match (self, field_type) {
            (Self::Null, _)
            | (
                Self::Integer(_),
                FieldType::Integer
                | FieldType::Reference {
                    ..
                },
            )
            | (Self::Boolean(_), FieldType::Boolean)
            | (Self::Text(_), FieldType::Text)
            | (Self::Blob(_), FieldType::Blob) => true,
            (Self::Real(value), FieldType::Real) => !value.is_nan(),
            _ => false,
        }
    }

    /// Returns a stable label for the value's kind.
    #[must_use]
    pub const fn kind_label(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(value) if value.is_nan() => "nan",
            Self::Real(_) => "real",
            Self::Boolean(_) => "boolean",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }

    /// Returns the integer payload, if any.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the text payload, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the length used for `max_length` checks (characters for text).
    #[must_use]
    pub fn text_length(&self) -> Option<usize> {
        self.as_text().map(|value| value.chars().count())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
