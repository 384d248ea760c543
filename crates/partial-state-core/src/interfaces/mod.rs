// crates/partial-state-core/src/interfaces/mod.rs
// ============================================================================
// Module: Partial State Interfaces
// Description: Backend-agnostic store contracts, clocks, and error categories.
// Purpose: Define the persistence surfaces used by the promotion engine and façade.
// Dependencies: serde, thiserror, crate::core
// ============================================================================

//! ## Overview
//! Stores implement [`PartialRecordStore`] for drafts, [`TargetStore`] for
//! promoted rows and [`TransactionalStore`] for the single atomic boundary
//! promotion needs. Implementations must fail closed: a failed call leaves no
//! partial writes behind.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::FieldName;
use crate::core::FieldValue;
use crate::core::FieldValues;
use crate::core::PartialRecord;
use crate::core::PartialRecordPage;
use crate::core::PartialStateId;
use crate::core::SchemaError;
use crate::core::ShadowSchema;
use crate::core::TargetRecord;
use crate::core::TargetRecordId;
use crate::core::TargetRow;
use crate::core::TargetSchema;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Error Categories
// ============================================================================

/// Coarse error category shared by every Partial State error type.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The record is gone: never existed, promoted, deleted or expired.
    NotFound,
    /// The record exists but cannot be promoted yet.
    IncompleteRecord,
    /// Shadow and target schemas (or stored layouts) disagree.
    SchemaMismatch,
    /// The underlying persistence failed; the call may be retried.
    StoreIo,
    /// The caller supplied malformed input.
    InvalidInput,
}

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Partial state store errors.
///
/// # Invariants
/// - Messages carry identifiers and field names only, never record values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Partial record is absent or expired.
    #[error("partial record not found: {0}")]
    NotFound(String),
    /// Target record is absent.
    #[error("target record not found: {0}")]
    TargetNotFound(TargetRecordId),
    /// Caller input is malformed.
    #[error("partial state store invalid input: {0}")]
    Invalid(String),
    /// Target constraint violated.
    #[error("partial state store constraint violation: {0}")]
    Constraint(String),
    /// Stored layout disagrees with the declared schemas.
    #[error("partial state store schema mismatch: {0}")]
    SchemaMismatch(String),
    /// Store is locked by another writer.
    #[error("partial state store busy: {message}")]
    Busy {
        /// Error message.
        message: String,
        /// Optional retry delay hint in milliseconds.
        retry_after_ms: Option<u64>,
    },
    /// Store I/O error.
    #[error("partial state store io error: {0}")]
    Io(String),
    /// Store reported an error.
    #[error("partial state store error: {0}")]
    Store(String),
}

impl StoreError {
    /// Builds a not-found error for a partial record id.
    #[must_use]
    pub fn missing(id: PartialStateId) -> Self {
        Self::NotFound(format!("id {id}"))
    }

    /// Returns the error category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::TargetNotFound(_) => ErrorKind::NotFound,
            Self::Invalid(_) | Self::Constraint(_) => ErrorKind::InvalidInput,
            Self::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            Self::Busy {
                ..
            }
            | Self::Io(_)
            | Self::Store(_) => ErrorKind::StoreIo,
        }
    }

    /// Returns true when retrying the whole call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Busy {
                ..
            }
        )
    }
}

impl From<SchemaError> for StoreError {
    fn from(error: SchemaError) -> Self {
        match error {
            SchemaError::Mismatch(message) => Self::SchemaMismatch(message),
            SchemaError::Invalid(message) | SchemaError::Unsupported(message) => {
                Self::Invalid(message)
            }
        }
    }
}

// ============================================================================
// SECTION: Schema Binding
// ============================================================================

/// A store bound to one target/shadow schema pair.
pub trait SchemaBound {
    /// Returns the target schema.
    fn target_schema(&self) -> &Arc<TargetSchema>;

    /// Returns the shadow schema.
    fn shadow_schema(&self) -> &Arc<ShadowSchema>;
}

// ============================================================================
// SECTION: Partial Record Store
// ============================================================================

/// Durable storage of partial records.
pub trait PartialRecordStore: SchemaBound {
    /// Creates a record from any subset of shadow columns; the rest are null.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] for unknown columns or nonconforming values.
    fn create(&self, values: &FieldValues) -> Result<PartialStateId, StoreError>;

    /// Fetches a live record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the record is absent or expired.
    fn fetch(&self, id: PartialStateId) -> Result<PartialRecord, StoreError>;

    /// Merges `values` into a live record; other columns keep their values.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the record is absent or expired.
    fn update(&self, id: PartialStateId, values: &FieldValues) -> Result<(), StoreError>;

    /// Deletes a record without promoting it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the record is already absent.
    fn delete(&self, id: PartialStateId) -> Result<(), StoreError>;

    /// Returns the newest live record whose natural key equals `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the target has no natural key and
    /// [`StoreError::NotFound`] when nothing matches.
    fn latest_by_natural_key(&self, key: &FieldValue) -> Result<PartialRecord, StoreError>;

    /// Lists live records newest first, starting below `cursor`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when `limit` is zero.
    fn list(
        &self,
        cursor: Option<PartialStateId>,
        limit: usize,
    ) -> Result<PartialRecordPage, StoreError>;

    /// Deletes every expired record and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the shadow does not expire records.
    fn purge_expired(&self) -> Result<usize, StoreError>;

    /// Checks whether the store is ready to serve requests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is unavailable.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Target Store
// ============================================================================

/// Storage of promoted (target) records.
pub trait TargetStore: SchemaBound {
    /// Inserts a target record directly, outside the staged workflow.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Constraint`] when the row violates a target constraint.
    fn insert_target(&self, values: &FieldValues) -> Result<TargetRecord, StoreError>;

    /// Fetches a target record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TargetNotFound`] when the record is absent.
    fn fetch_target(&self, id: TargetRecordId) -> Result<TargetRecord, StoreError>;

    /// Returns the number of target records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when counting fails.
    fn count_targets(&self) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: Transactions
// ============================================================================

/// Read-only view of target records, including rows staged by an open unit.
pub trait TargetLookup {
    /// Fetches a target record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TargetNotFound`] when the record is absent.
    fn fetch_target(&self, id: TargetRecordId) -> Result<TargetRecord, StoreError>;

    /// Returns the number of target records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when counting fails.
    fn count_targets(&self) -> Result<u64, StoreError>;

    /// Returns the first target record whose `field` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when `field` is not a target field.
    fn find_target(
        &self,
        field: &FieldName,
        value: &FieldValue,
    ) -> Result<Option<TargetRecord>, StoreError>;
}

/// Operations available inside one atomic unit of work.
pub trait UnitOfWork {
    /// Returns a read-only view of target records as this unit sees them.
    fn targets(&self) -> &dyn TargetLookup;

    /// Reads a live partial record and excludes concurrent writers to it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the record is absent or expired.
    fn fetch_partial_for_update(&mut self, id: PartialStateId)
    -> Result<PartialRecord, StoreError>;

    /// Inserts a validated target row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Constraint`] when the store rejects the row.
    fn insert_target(&mut self, row: &TargetRow) -> Result<TargetRecord, StoreError>;

    /// Deletes a partial record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the record is absent.
    fn delete_partial(&mut self, id: PartialStateId) -> Result<(), StoreError>;
}

/// Store able to run several writes as one atomic unit.
pub trait TransactionalStore {
    /// Runs `work` atomically: its writes commit on `Ok` and roll back on `Err`.
    ///
    /// The store may hold its write lock while `work` runs, so `work` must
    /// read and write through the unit only, never through the store itself.
    ///
    /// # Errors
    ///
    /// Returns the error produced by `work`, or a [`StoreError`] converted
    /// into `E` when the unit cannot begin or commit.
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<StoreError>;
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Time source used for expiry.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}
