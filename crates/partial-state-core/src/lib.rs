// crates/partial-state-core/src/lib.rs
// ============================================================================
// Module: Partial State Core Library
// Description: Staged record construction with atomic promotion.
// Purpose: Persist incomplete entities in relaxed shadow storage and promote them once complete.
// Dependencies: log, serde, serde_jcs, sha2, thiserror
// ============================================================================

//! ## Overview
//! Partial State lets a caller persist an entity whose mandatory fields are
//! not all known yet, resume it later by a stable [`PartialStateId`], and
//! finally promote it into target storage. Promotion enforces every target
//! constraint at one point and removes the draft in the same unit of work.
//!
//! Invariants:
//! - A shadow schema is derived from its target by [`mirror()`]; only
//!   nullability and uniqueness differ.
//! - A draft and its promoted copy never coexist.
//! - Stores never hold a target record that fails target validation.
//!
//! ## Index
//! - Model: [`TargetSchema`], [`ShadowSchema`], [`FieldValues`], [`PartialRecord`]
//! - Interfaces: [`PartialRecordStore`], [`TargetStore`], [`TransactionalStore`]
//! - Runtime: [`PromotionEngine`], [`PartialObjects`], [`InMemoryPartialStateStore`]

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::EntityName;
pub use crate::core::FieldDef;
pub use crate::core::FieldMap;
pub use crate::core::FieldMapping;
pub use crate::core::FieldName;
pub use crate::core::FieldType;
pub use crate::core::FieldValue;
pub use crate::core::FieldValues;
pub use crate::core::FnValidator;
pub use crate::core::HashDigest;
pub use crate::core::IncompleteRecord;
pub use crate::core::MirrorOptions;
pub use crate::core::PartialRecord;
pub use crate::core::PartialRecordPage;
pub use crate::core::PartialStateId;
pub use crate::core::RecordValidator;
pub use crate::core::SchemaError;
pub use crate::core::ShadowSchema;
pub use crate::core::TargetRecord;
pub use crate::core::TargetRecordId;
pub use crate::core::TargetRow;
pub use crate::core::TargetSchema;
pub use crate::core::TargetSchemaBuilder;
pub use crate::core::Timestamp;
pub use crate::core::Violation;
pub use crate::core::ViolationKind;
pub use crate::core::mirror;
pub use crate::core::validate_target;
pub use crate::interfaces::Clock;
pub use crate::interfaces::ErrorKind;
pub use crate::interfaces::PartialRecordStore;
pub use crate::interfaces::SchemaBound;
pub use crate::interfaces::StoreError;
pub use crate::interfaces::TargetLookup;
pub use crate::interfaces::TargetStore;
pub use crate::interfaces::TransactionalStore;
pub use crate::interfaces::UnitOfWork;
pub use crate::runtime::AccessError;
pub use crate::runtime::AfterPromoteHook;
pub use crate::runtime::InMemoryPartialStateStore;
pub use crate::runtime::Instance;
pub use crate::runtime::ManualClock;
pub use crate::runtime::PartialObjects;
pub use crate::runtime::PromotionEngine;
pub use crate::runtime::PromotionEngineBuilder;
pub use crate::runtime::PromotionError;
pub use crate::runtime::SystemClock;
