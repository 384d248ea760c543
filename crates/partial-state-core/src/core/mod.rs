// crates/partial-state-core/src/core/mod.rs
// ============================================================================
// Module: Partial State Core Types
// Description: Schema, value, record and validation model for staged records.
// Purpose: Group the backend-agnostic data model shared by stores and engines.
// Dependencies: serde, serde_jcs, sha2, thiserror
// ============================================================================

//! ## Overview
//! The core model is pure data: schemas, values, records, the mirror
//! transform and validation. Nothing here performs I/O.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod hashing;
pub mod identifiers;
pub mod mapping;
pub mod mirror;
pub mod record;
pub mod schema;
pub mod time;
pub mod validation;
pub mod value;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use hashing::hash_canonical_json;
pub use identifiers::EntityName;
pub use identifiers::FieldName;
pub use identifiers::PartialStateId;
pub use identifiers::TargetRecordId;
pub use mapping::FieldMap;
pub use mapping::FieldMapping;
pub use mirror::MirrorOptions;
pub use mirror::mirror;
pub use record::FieldValues;
pub use record::PartialRecord;
pub use record::PartialRecordPage;
pub use record::TargetRecord;
pub use record::TargetRow;
pub use schema::FieldDef;
pub use schema::SchemaError;
pub use schema::ShadowSchema;
pub use schema::TargetSchema;
pub use schema::TargetSchemaBuilder;
pub use time::Timestamp;
pub use validation::FnValidator;
pub use validation::IncompleteRecord;
pub use validation::RecordValidator;
pub use validation::Violation;
pub use validation::ViolationKind;
pub use validation::validate_target;
pub use value::FieldType;
pub use value::FieldValue;
