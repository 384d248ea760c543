// crates/partial-state-config/src/lib.rs
// ============================================================================
// Module: Partial State Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for partial-state.toml semantics.
// Dependencies: partial-state-core, partial-state-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `partial-state-config` defines the configuration model for Partial State
//! stores and shadow mirroring. Loading is strict and fail-closed; a valid
//! config converts into [`partial_state_core::MirrorOptions`] and, for durable
//! stores, [`partial_state_store_sqlite::SqliteStoreConfig`].
//!
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ConfigError;
pub use config::PartialStateConfig;
pub use config::ShadowConfig;
pub use config::StoreConfig;
pub use config::StoreType;
