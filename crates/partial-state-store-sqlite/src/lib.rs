// crates/partial-state-store-sqlite/src/lib.rs
// ============================================================================
// Module: Partial State SQLite Store Library
// Description: SQLite-backed partial record and target record storage.
// Purpose: Persist drafts and promoted rows durably with transactional promotion.
// Dependencies: partial-state-core, rusqlite, serde, serde_json, thiserror, log
// ============================================================================

//! ## Overview
//! [`SqlitePartialStateStore`] implements the Partial State store traits over
//! one `SQLite` database file. Tables are created from the declared schemas on
//! first open; later opens fail closed when the stored layout has drifted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqlitePartialStateStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
