//! Persistence: immutable patch records, append-only per-owner patch logs,
//! and the contract of the document store being versioned.
//!
//! # Invariants
//! - Patch logs are append-only; a stored patch is never modified.
//! - A stored patch always carries at least one op.
//! - `createdAt` strictly increases within one owner's log.

pub mod documents;
pub mod log;
pub mod patch;
pub mod store;

pub use documents::{
    DocumentLayout, DocumentStore, Filter, MemoryDocumentStore, Update, UpdateResult, get_path,
};
pub use log::{MemoryPatchLog, PatchLogStore, StoreError};
pub use patch::{NewPatch, Patch, PatchError, RESERVED_FIELDS};
pub use store::{FilePatchLog, LogMeta, ManifestEntry, OwnerManifest};
