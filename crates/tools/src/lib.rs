//! Developer tooling: read-only inspection of patch logs.
//!
//! # Invariants
//! - Tools never write to a log.

pub mod inspector;

pub use inspector::{LogSummary, PatchInfo, PatchLogInspector};
