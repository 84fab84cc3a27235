//! Shared types for the revlog versioning engine.
//!
//! # Invariants
//! - Owner references and patch ids are stable for the lifetime of a record.
//! - Documents are plain JSON objects; the engine never owns their lifetime.

pub mod types;

pub use types::{Document, IdError, OwnerRef, PatchId, Timestamp};
