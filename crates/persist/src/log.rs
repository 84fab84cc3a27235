//! The patch log contract and its in-memory implementation.

use crate::patch::{NewPatch, Patch};
use async_trait::async_trait;
use revlog_common::{OwnerRef, PatchId, Timestamp};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Errors from patch logs and document stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("patch {0} already exists")]
    DuplicatePatch(PatchId),
    #[error("createdAt {got} for owner {owner} is not after the latest patch at {latest}")]
    NonMonotonic {
        owner: OwnerRef,
        latest: Timestamp,
        got: Timestamp,
    },
    #[error("document {0} already exists")]
    DuplicateDocument(OwnerRef),
    #[error("document has no usable identity: {0}")]
    MissingIdentity(String),
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Append-only, per-owner ordered patch storage.
///
/// `list_by_owner` returns patches in ascending `createdAt` order. Appending
/// never changes a previously stored record.
#[async_trait]
pub trait PatchLogStore: Send + Sync {
    /// Store a patch, assigning `id` and `createdAt` when absent.
    async fn append(&self, patch: NewPatch) -> Result<Patch, StoreError>;

    /// All patches for `owner`, oldest first.
    async fn list_by_owner(&self, owner: &OwnerRef) -> Result<Vec<Patch>, StoreError>;

    /// Remove every patch for `owner`, returning how many were removed.
    async fn delete_by_owner(&self, owner: &OwnerRef) -> Result<usize, StoreError>;
}

#[async_trait]
impl<T: PatchLogStore + ?Sized> PatchLogStore for Arc<T> {
    async fn append(&self, patch: NewPatch) -> Result<Patch, StoreError> {
        (**self).append(patch).await
    }

    async fn list_by_owner(&self, owner: &OwnerRef) -> Result<Vec<Patch>, StoreError> {
        (**self).list_by_owner(owner).await
    }

    async fn delete_by_owner(&self, owner: &OwnerRef) -> Result<usize, StoreError> {
        (**self).delete_by_owner(owner).await
    }
}

/// Pick the `createdAt` of the next patch for an owner whose latest patch was
/// stamped `latest`.
///
/// An absent timestamp becomes `max(now, latest + 1)`; an explicit one must
/// be strictly after `latest`.
pub(crate) fn next_created_at(
    owner: &OwnerRef,
    latest: Option<Timestamp>,
    requested: Option<Timestamp>,
) -> Result<Timestamp, StoreError> {
    match (latest, requested) {
        (Some(latest), Some(got)) if got <= latest => Err(StoreError::NonMonotonic {
            owner: owner.clone(),
            latest,
            got,
        }),
        (_, Some(got)) => Ok(got),
        (Some(latest), None) => Ok(Timestamp::now().max(latest.next())),
        (None, None) => Ok(Timestamp::now()),
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    by_owner: HashMap<OwnerRef, Vec<Patch>>,
    owner_of: HashMap<PatchId, OwnerRef>,
}

/// In-memory patch log.
///
/// Workaround for deployments without a durable backend; everything is lost
/// on drop. Use [`crate::FilePatchLog`] for persistence.
#[derive(Debug, Default)]
pub struct MemoryPatchLog {
    inner: Mutex<MemoryInner>,
}

impl MemoryPatchLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored patches across all owners.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.owner_of.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl PatchLogStore for MemoryPatchLog {
    async fn append(&self, patch: NewPatch) -> Result<Patch, StoreError> {
        let mut inner = self.inner.lock().await;
        let id = patch.id.clone().unwrap_or_else(PatchId::generate);
        if inner.owner_of.contains_key(&id) {
            return Err(StoreError::DuplicatePatch(id));
        }
        let latest = inner
            .by_owner
            .get(&patch.owner)
            .and_then(|log| log.last())
            .map(Patch::created_at);
        let created_at = next_created_at(&patch.owner, latest, patch.created_at)?;

        let stored = patch.into_stored(id.clone(), created_at);
        inner.owner_of.insert(id, stored.owner().clone());
        inner
            .by_owner
            .entry(stored.owner().clone())
            .or_default()
            .push(stored.clone());
        tracing::trace!(owner = %stored.owner(), patch = %stored.id(), "patch stored");
        Ok(stored)
    }

    async fn list_by_owner(&self, owner: &OwnerRef) -> Result<Vec<Patch>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.by_owner.get(owner).cloned().unwrap_or_default())
    }

    async fn delete_by_owner(&self, owner: &OwnerRef) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().await;
        let removed = inner.by_owner.remove(owner).unwrap_or_default();
        for patch in &removed {
            inner.owner_of.remove(patch.id());
        }
        Ok(removed.len())
    }
}
