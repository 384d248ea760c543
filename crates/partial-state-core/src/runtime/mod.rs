// crates/partial-state-core/src/runtime/mod.rs
// ============================================================================
// Module: Partial State Runtime
// Description: Clocks, the in-memory store, the promotion engine and the façade.
// Purpose: Execute staged-record workflows against any store implementation.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime components are generic over the store traits in
//! [`crate::interfaces`]; [`InMemoryPartialStateStore`] is the reference
//! implementation used by tests and embedded callers.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod clock;
pub mod objects;
pub mod promotion;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use clock::ManualClock;
pub use clock::SystemClock;
pub use objects::AccessError;
pub use objects::Instance;
pub use objects::PartialObjects;
pub use promotion::AfterPromoteHook;
pub use promotion::PromotionEngine;
pub use promotion::PromotionEngineBuilder;
pub use promotion::PromotionError;
pub use store::InMemoryPartialStateStore;
