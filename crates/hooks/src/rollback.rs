//! Reconstruction of past states from an owner's patch log.
//!
//! Nothing here writes. [`rollback`] validates the target and returns the
//! state to persist; the caller hands it to the normal write path, which
//! records its own forward patch.

use crate::error::{RollbackError, VersionError};
use revlog_common::{Document, OwnerRef, PatchId};
use revlog_kernel::{Snapshot, apply};
use revlog_persist::{Patch, PatchLogStore};

/// Replay `patches` in order onto the empty aggregate.
pub fn replay(patches: &[Patch]) -> Result<Snapshot, VersionError> {
    patches.iter().try_fold(Snapshot::empty(), |state, patch| {
        apply(&state, patch.ops()).map_err(|source| VersionError::Replay {
            patch: patch.id().clone(),
            source,
        })
    })
}

/// Patches of `owner` up to and including `target`, plus whether `target`
/// is the latest one.
async fn prefix<L: PatchLogStore + ?Sized>(
    log: &L,
    owner: &OwnerRef,
    target: &PatchId,
) -> Result<(Vec<Patch>, bool), VersionError> {
    let mut patches = log.list_by_owner(owner).await?;
    let Some(pos) = patches.iter().position(|p| p.id() == target) else {
        return Err(RollbackError::NotFound {
            owner: owner.clone(),
            patch: target.clone(),
        }
        .into());
    };
    let latest = pos + 1 == patches.len();
    patches.truncate(pos + 1);
    Ok((patches, latest))
}

/// The state of `owner` right after `target` was applied. The latest patch
/// is allowed.
pub async fn state_at<L: PatchLogStore + ?Sized>(
    log: &L,
    owner: &OwnerRef,
    target: &PatchId,
) -> Result<Snapshot, VersionError> {
    let (patches, _) = prefix(log, owner, target).await?;
    replay(&patches)
}

/// The state to write back to restore `owner` to `target`, with `overrides`
/// merged on top.
///
/// Fails with `not-found` when `target` is not in the owner's log and with
/// `already-latest` when it is the most recent patch.
pub async fn rollback<L: PatchLogStore + ?Sized>(
    log: &L,
    owner: &OwnerRef,
    target: &PatchId,
    overrides: &Document,
) -> Result<Snapshot, VersionError> {
    let (patches, latest) = prefix(log, owner, target).await?;
    if latest {
        return Err(RollbackError::AlreadyLatest {
            owner: owner.clone(),
            patch: target.clone(),
        }
        .into());
    }
    tracing::debug!(%owner, %target, replayed = patches.len(), "rollback state reconstructed");
    Ok(replay(&patches)?.merge(overrides))
}
