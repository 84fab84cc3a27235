//! Versioning of document-store entities through lifecycle hooks.
//!
//! [`HookOrchestrator`] exposes the named extension points a store
//! integration calls around create, update, bulk update and delete.
//! [`Versioned`] wraps a [`revlog_persist::DocumentStore`] and drives those
//! hooks for every write, and adds history, point-in-time reads and rollback.
//!
//! # Invariants
//! - At most one patch per entity per write, never one with empty ops.
//! - Only content fields are diffed; identity, version and timestamps are not.
//! - Rollback never rewrites the log; it produces a new forward patch.

pub mod config;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod rollback;
pub mod versioned;

pub use config::{FieldOrigin, IncludeField, LogNaming, NameTransform, VersioningConfig};
pub use context::MutationContext;
pub use error::{ConfigError, RollbackError, VersionError};
pub use orchestrator::{
    BulkReport, HookOrchestrator, OwnerGuard, PendingBulkUpdate, PendingCreate, PendingUpdate,
};
pub use rollback::{replay, state_at};
pub use versioned::{Versioned, Written};
