use crate::config::VersioningConfig;
use crate::context::MutationContext;
use crate::error::{ConfigError, VersionError};
use crate::orchestrator::{BulkReport, HookOrchestrator};
use crate::rollback;
use revlog_common::{Document, OwnerRef, PatchId};
use revlog_kernel::Snapshot;
use revlog_persist::{DocumentStore, Filter, Patch, PatchLogStore, Update};
use std::sync::Arc;

/// A document as stored after a versioned write, and the patch recorded for
/// it (`None` when the write had no net effect).
#[derive(Debug, Clone, PartialEq)]
pub struct Written {
    pub document: Document,
    pub patch: Option<Patch>,
}

/// A document store whose writes are versioned.
///
/// Every write goes through the matching hook pair on the orchestrator. A
/// failure after the store write returns the error without undoing the write.
pub struct Versioned<S, L> {
    store: S,
    hooks: HookOrchestrator<L>,
}

impl<S: DocumentStore, L: PatchLogStore> Versioned<S, L> {
    pub fn new(
        store: S,
        config: impl Into<Arc<VersioningConfig>>,
        log: L,
    ) -> Result<Self, ConfigError> {
        let hooks = HookOrchestrator::new(config, log)?;
        let configured = &hooks.config().id_field;
        if store.id_field() != configured {
            return Err(ConfigError::IdFieldMismatch {
                store: store.id_field().to_owned(),
                config: configured.clone(),
            });
        }
        Ok(Self { store, hooks })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn hooks(&self) -> &HookOrchestrator<L> {
        &self.hooks
    }

    pub fn log(&self) -> &L {
        self.hooks.log()
    }

    fn by_id(&self, id: &OwnerRef) -> Filter {
        Filter::by_id(self.store.id_field(), id)
    }

    pub async fn find(&self, id: &OwnerRef) -> Result<Option<Document>, VersionError> {
        Ok(self.store.find_by_id(id).await?)
    }

    /// The current content of `id`: its canonical snapshot, without identity,
    /// version or timestamps.
    pub async fn data(&self, id: &OwnerRef) -> Result<Option<Snapshot>, VersionError> {
        let doc = self.store.find_by_id(id).await?;
        Ok(doc.map(|d| self.hooks.canonicalize(&d)))
    }

    /// Insert a new entity and record its initial patch.
    pub async fn create(
        &self,
        fields: Document,
        ctx: &MutationContext,
    ) -> Result<Written, VersionError> {
        let pending = self.hooks.before_create();
        let document = self.store.insert(fields).await?;
        let patch = self.hooks.after_create(pending, &document, ctx).await?;
        Ok(Written { document, patch })
    }

    /// Replace the content of entity `id` with `fields`. `None` if it does not
    /// exist.
    pub async fn save(
        &self,
        id: &OwnerRef,
        fields: Document,
        ctx: &MutationContext,
    ) -> Result<Option<Written>, VersionError> {
        let pending = self.hooks.before_update(&self.store, &self.by_id(id)).await?;
        if pending.owner().is_none() {
            return Ok(None);
        }
        let saved = self.store.replace(id, fields).await?;
        let patch = self.hooks.after_update(pending, saved.as_ref(), None, ctx).await?;
        Ok(saved.map(|document| Written { document, patch }))
    }

    pub async fn update_by_id(
        &self,
        id: &OwnerRef,
        update: &Update,
        ctx: &MutationContext,
    ) -> Result<Option<Written>, VersionError> {
        self.update_one(&self.by_id(id), update, ctx).await
    }

    /// Apply `update` to the first entity matching `filter`.
    ///
    /// The write is narrowed to the identity read in `before_update`, so the
    /// patch always describes the document that was actually changed.
    pub async fn update_one(
        &self,
        filter: &Filter,
        update: &Update,
        ctx: &MutationContext,
    ) -> Result<Option<Written>, VersionError> {
        let pending = self.hooks.before_update(&self.store, filter).await?;
        let Some(owner) = pending.owner() else {
            return Ok(None);
        };
        let narrowed = filter.clone().with(self.store.id_field(), owner.to_value());
        let updated = self.store.update_one(&narrowed, update).await?;
        let patch = self
            .hooks
            .after_update(pending, updated.as_ref(), Some(update), ctx)
            .await?;
        Ok(updated.map(|document| Written { document, patch }))
    }

    /// Apply `update` to every entity matching `filter`, one patch per
    /// changed entity.
    ///
    /// Append failures are reported per owner in the returned report; use
    /// [`BulkReport::into_result`] to treat them as an error.
    pub async fn update_many(
        &self,
        filter: &Filter,
        update: &Update,
        ctx: &MutationContext,
    ) -> Result<BulkReport, VersionError> {
        let pending = self.hooks.before_bulk_update(&self.store, filter).await?;
        let result = self.store.update_many(filter, update).await?;
        self.hooks
            .after_bulk_update(&self.store, pending, &result, update, ctx)
            .await
    }

    /// Remove entity `id`, cascading its patches first when configured.
    pub async fn remove(&self, id: &OwnerRef) -> Result<bool, VersionError> {
        let _guard = self.hooks.lock_owner(id).await;
        self.hooks.before_delete(id).await?;
        Ok(self.store.remove(id).await?)
    }

    /// The patches recorded for `id`, oldest first.
    pub async fn history(&self, id: &OwnerRef) -> Result<Vec<Patch>, VersionError> {
        Ok(self.log().list_by_owner(id).await?)
    }

    /// Content of `id` right after `patch`. Read-only.
    pub async fn state_at(&self, id: &OwnerRef, patch: &PatchId) -> Result<Snapshot, VersionError> {
        rollback::state_at(self.log(), id, patch).await
    }

    /// Restore `id` to its state right after `target`, with `overrides` on
    /// top, and write it back as a new forward state.
    ///
    /// An entity that no longer exists is recreated with the same identity.
    pub async fn rollback(
        &self,
        id: &OwnerRef,
        target: &PatchId,
        overrides: &Document,
        ctx: &MutationContext,
    ) -> Result<Written, VersionError> {
        let state = rollback::rollback(self.log(), id, target, overrides).await?;
        if let Some(written) = self.save(id, state.fields().clone(), ctx).await? {
            return Ok(written);
        }
        tracing::info!(owner = %id, %target, "recreating removed entity from its log");
        let mut fields = state.into_document();
        fields.insert(self.store.id_field().to_owned(), id.to_value());
        self.create(fields, ctx).await
    }
}
