// crates/partial-state-core/src/core/validation.rs
// ============================================================================
// Module: Target Row Validation
// Description: Built-in target constraint checks and injected record validators.
// Purpose: Decide whether a projected row may become a target record.
// Dependencies: serde, thiserror, crate::core::{identifiers, record}, crate::interfaces
// ============================================================================

//! ## Overview
//! Validation is all-or-nothing and exhaustive: every violation is collected
//! so callers can report every missing field at once. Built-in checks cover
//! nullability, type conformance and text length; anything beyond that is an
//! injected [`RecordValidator`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::FieldName;
use crate::core::identifiers::PartialStateId;
use crate::core::record::TargetRow;
use crate::interfaces::TargetLookup;

// ============================================================================
// SECTION: Violations
// ============================================================================

/// Reason a field or row failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    /// Mandatory field is null.
    Missing,
    /// Value does not conform to the field type.
    TypeMismatch {
        /// Expected type label.
        expected: String,
    },
    /// Text exceeds `max_length`.
    TooLong {
        /// Declared maximum length.
        max_length: usize,
        /// Actual length.
        actual: usize,
    },
    /// An injected validator rejected the row.
    Rejected {
        /// Validator name.
        validator: String,
        /// Validator message.
        message: String,
    },
}

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Offending field, or `None` for row-level failures.
    pub field: Option<FieldName>,
    /// Failure reason.
    pub kind: ViolationKind,
}

impl Violation {
    /// Creates a missing-field violation.
    #[must_use]
    pub const fn missing(field: FieldName) -> Self {
        Self {
            field: Some(field),
            kind: ViolationKind::Missing,
        }
    }

    /// Creates a validator rejection, optionally tied to a field.
    #[must_use]
    pub fn rejected(
        validator: impl Into<String>,
        field: Option<FieldName>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field,
            kind: ViolationKind::Rejected {
                validator: validator.into(),
                message: message.into(),
            },
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = self.field.as_ref().map_or("<record>", FieldName::as_str);
        match &self.kind {
            ViolationKind::Missing => write!(f, "{field}: missing"),
            ViolationKind::TypeMismatch {
                expected,
            } => write!(f, "{field}: expected {expected}"),
            ViolationKind::TooLong {
                max_length,
                actual,
            } => write!(f, "{field}: length {actual} exceeds {max_length}"),
            ViolationKind::Rejected {
                validator,
                message,
            } => write!(f, "{field}: rejected by {validator}: {message}"),
        }
    }
}

/// A partial record that cannot be promoted yet.
///
/// # Invariants
/// - `violations` is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("partial record {id} is incomplete: {} violation(s)", .violations.len())]
pub struct IncompleteRecord {
    /// Partial record that failed validation.
    pub id: PartialStateId,
    /// Every violation found.
    pub violations: Vec<Violation>,
}

impl IncompleteRecord {
    /// Returns the names of mandatory fields that are null.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&FieldName> {
        self.violations
            .iter()
            .filter(|violation| violation.kind == ViolationKind::Missing)
            .filter_map(|violation| violation.field.as_ref())
            .collect()
    }

    /// Returns every field named by a violation, without duplicates.
    #[must_use]
    pub fn failing_fields(&self) -> Vec<&FieldName> {
        let mut fields: Vec<&FieldName> =
            self.violations.iter().filter_map(|violation| violation.field.as_ref()).collect();
        fields.sort();
        fields.dedup();
        fields
    }
}

// ============================================================================
// SECTION: Validators
// ============================================================================

/// Caller-supplied check run after the built-in constraints.
///
/// Validators run inside the promotion's unit of work. Cross-record checks
/// such as uniqueness must read through `targets`; calling back into the
/// store itself blocks on the lock the unit holds.
pub trait RecordValidator: Send + Sync {
    /// Stable name reported in rejections.
    fn name(&self) -> &str;

    /// Validates a projected row against the target records visible to the unit.
    ///
    /// # Errors
    ///
    /// Returns every violation found.
    fn validate(&self, row: &TargetRow, targets: &dyn TargetLookup) -> Result<(), Vec<Violation>>;
}

/// Adapter turning a named closure into a [`RecordValidator`].
pub struct FnValidator<F> {
    /// Validator name.
    name: String,
    /// Check body.
    check: F,
}

impl<F> FnValidator<F>
where
    F: Fn(&TargetRow, &dyn TargetLookup) -> Result<(), Vec<Violation>> + Send + Sync,
{
    /// Wraps `check` under `name`.
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

impl<F> RecordValidator for FnValidator<F>
where
    F: Fn(&TargetRow, &dyn TargetLookup) -> Result<(), Vec<Violation>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, row: &TargetRow, targets: &dyn TargetLookup) -> Result<(), Vec<Violation>> {
        (self.check)(row, targets)
    }
}

// ============================================================================
// SECTION: Built-In Checks
// ============================================================================

/// Checks nullability, type conformance and text length of every field.
#[must_use]
pub fn validate_target(row: &TargetRow) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (field, value) in row.schema().fields().iter().zip(row.values()) {
        if value.is_null() {
            if !field.nullable {
                violations.push(Violation::missing(field.name.clone()));
            }
            continue;
        }
        if !value.conforms_to(&field.field_type) {
            violations.push(Violation {
                field: Some(field.name.clone()),
                kind: ViolationKind::TypeMismatch {
                    expected: field.field_type.label().to_string(),
                },
            });
            continue;
        }
        if let (Some(max_length), Some(actual)) = (field.max_length, value.text_length())
            && actual > max_length
        {
            violations.push(Violation {
                field: Some(field.name.clone()),
                kind: ViolationKind::TooLong {
                    max_length,
                    actual,
                },
            });
        }
    }
    violations
}
