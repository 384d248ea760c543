// crates/partial-state-core/src/core/mirror.rs
// ============================================================================
// Module: Shadow Schema Mirror
// Description: Pure transform from a target schema to its relaxed shadow schema.
// Purpose: Derive partial-record storage layouts without hand-maintained copies.
// Dependencies: serde, crate::core::{identifiers, schema, value}
// ============================================================================

//! ## Overview
//! [`mirror`] copies every target field into the shadow, forcing nullability
//! and trading uniqueness for a plain index so that several in-flight drafts
//! may share a value. It is deterministic: mirroring an unchanged target with
//! unchanged options always yields an equal shadow with an equal fingerprint.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::EntityName;
use crate::core::identifiers::validate_name;
use crate::core::schema::FieldDef;
use crate::core::schema::SchemaError;
use crate::core::schema::ShadowSchema;
use crate::core::schema::TargetSchema;
use crate::core::value::FieldType;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Placeholder replaced by the target table name.
pub const TABLE_PLACEHOLDER: &str = "{table}";

/// Placeholder replaced by the target entity name.
pub const ENTITY_PLACEHOLDER: &str = "{entity}";

/// Default shadow table name format.
pub const DEFAULT_TABLE_FORMAT: &str = "{table}_partialstate";

/// Default shadow entity name format.
pub const DEFAULT_ENTITY_FORMAT: &str = "{entity}PartialState";

// ============================================================================
// SECTION: Options
// ============================================================================

/// Options controlling how a shadow schema is derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorOptions {
    /// Shadow table name format containing [`TABLE_PLACEHOLDER`].
    pub table_format: String,
    /// Shadow entity name format containing [`ENTITY_PLACEHOLDER`].
    pub entity_format: String,
    /// Shadow-only fields such as workflow metadata.
    pub extra_fields: Vec<FieldDef>,
    /// Partial record lifetime in milliseconds; `None` disables expiry.
    pub state_lifetime_ms: Option<u64>,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            table_format: DEFAULT_TABLE_FORMAT.to_string(),
            entity_format: DEFAULT_ENTITY_FORMAT.to_string(),
            extra_fields: Vec::new(),
            state_lifetime_ms: None,
        }
    }
}

impl MirrorOptions {
    /// Adds a shadow-only field.
    #[must_use]
    pub fn extra_field(mut self, field: FieldDef) -> Self {
        self.extra_fields.push(field);
        self
    }

    /// Enables expiry with the given lifetime in milliseconds.
    #[must_use]
    pub const fn state_lifetime_ms(mut self, lifetime_ms: u64) -> Self {
        self.state_lifetime_ms = Some(lifetime_ms);
        self
    }
}

// ============================================================================
// SECTION: Mirror
// ============================================================================

/// Derives the shadow schema for `target`.
///
/// # Errors
///
/// Returns [`SchemaError::Unsupported`] for many-to-many fields and
/// [`SchemaError::Invalid`] for malformed options or colliding extra fields.
pub fn mirror(target: &TargetSchema, options: &MirrorOptions) -> Result<ShadowSchema, SchemaError> {
    let table = render_format(&options.table_format, TABLE_PLACEHOLDER, target.table())?;
    validate_name("table", &table)?;
    if table == target.table() {
        return Err(SchemaError::Invalid(format!(
            "shadow table must differ from target table: {table}"
        )));
    }
    let entity = EntityName::new(render_format(
        &options.entity_format,
        ENTITY_PLACEHOLDER,
        target.entity().as_str(),
    )?)?;
    if options.state_lifetime_ms == Some(0) {
        return Err(SchemaError::Invalid("state lifetime must be greater than zero".to_string()));
    }

    let mut fields = Vec::with_capacity(target.fields().len());
    for field in target.fields() {
        fields.push(mirror_field(field)?);
    }

    let mut seen: BTreeSet<&str> = target.fields().iter().map(|f| f.name.as_str()).collect();
    let mut extra_fields = Vec::with_capacity(options.extra_fields.len());
    for extra in &options.extra_fields {
        if extra.name.is_reserved() || !seen.insert(extra.name.as_str()) {
            return Err(SchemaError::Invalid(format!(
                "shadow-only field collides with an existing name: {}",
                extra.name
            )));
        }
        if matches!(extra.field_type, FieldType::ManyToMany { .. }) {
            return Err(SchemaError::Unsupported(format!(
                "many-to-many shadow-only field: {}",
                extra.name
            )));
        }
        let mut extra = extra.clone();
        extra.nullable = true;
        extra.natural_key = false;
        extra.unique = false;
        extra_fields.push(extra);
    }

    Ok(ShadowSchema {
        entity,
        target_entity: target.entity().clone(),
        table,
        fields,
        extra_fields,
        natural_key: target.natural_key().map(|field| field.name.clone()),
        state_lifetime_ms: options.state_lifetime_ms,
    })
}

/// Mirrors one target field into its relaxed shadow form.
fn mirror_field(field: &FieldDef) -> Result<FieldDef, SchemaError> {
    if let FieldType::ManyToMany {
        entity,
    } = &field.field_type
    {
        return Err(SchemaError::Unsupported(format!(
            "many-to-many field {} (to {entity}) cannot be mirrored",
            field.name
        )));
    }
    let mut mirrored = field.clone();
    mirrored.nullable = true;
    if mirrored.unique || mirrored.natural_key {
        mirrored.indexed = true;
    }
    mirrored.unique = false;
    mirrored.natural_key = false;
    Ok(mirrored)
}

/// Substitutes `value` for `placeholder` in `format`.
fn render_format(format: &str, placeholder: &str, value: &str) -> Result<String, SchemaError> {
    if !format.contains(placeholder) {
        return Err(SchemaError::Invalid(format!(
            "name format '{format}' must contain {placeholder}"
        )));
    }
    Ok(format.replace(placeholder, value))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use super::TABLE_PLACEHOLDER;
    use super::render_format;

    #[test]
    fn render_format_substitutes_every_placeholder() {
        let rendered = render_format("{table}_{table}", TABLE_PLACEHOLDER, "t").unwrap();
        assert_eq!(rendered, "t_t");
    }

    #[test]
    fn render_format_requires_the_placeholder() {
        assert!(render_format("static", TABLE_PLACEHOLDER, "t").is_err());
    }
}
