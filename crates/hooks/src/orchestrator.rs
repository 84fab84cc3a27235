//! Lifecycle hook orchestration.
//!
//! The store-integration layer calls the named extension points around each
//! transition: `before_*` captures the original snapshot, the store runs the
//! mutation, `after_*` diffs and appends.
//!
//! Writes issued through one orchestrator are serialized per owner: `before_*`
//! takes the owner's gate and re-reads the document under it, and the gate is
//! released when `after_*` returns. A writer that bypasses the orchestrator can
//! still land between the read and the mutation; that race is accepted. A
//! failure in an `after_*` hook does not undo the mutation the store already
//! committed.

use crate::config::VersioningConfig;
use crate::context::{MutationContext, resolve_extra};
use crate::error::{ConfigError, VersionError};
use futures_util::future::join_all;
use revlog_common::{Document, OwnerRef};
use revlog_kernel::{Snapshot, SnapshotCodec, diff};
use revlog_persist::{
    DocumentStore, Filter, NewPatch, Patch, PatchLogStore, StoreError, Update, UpdateResult,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::Instrument;

/// Exclusive hold on one owner's writes. Released on drop.
pub type OwnerGuard = OwnedMutexGuard<()>;

/// State carried from `before_create` to `after_create`.
#[derive(Debug, Clone)]
pub struct PendingCreate {
    original: Snapshot,
}

/// State carried from `before_update` to `after_update`: the transient
/// original snapshot of the targeted entity, if one matched, and the gate on
/// its owner.
#[derive(Debug, Default)]
pub struct PendingUpdate {
    target: Option<(OwnerRef, Snapshot)>,
    guard: Option<OwnerGuard>,
}

impl PendingUpdate {
    /// Identity of the entity that matched before the update.
    pub fn owner(&self) -> Option<&OwnerRef> {
        self.target.as_ref().map(|(owner, _)| owner)
    }

    pub fn original(&self) -> Option<&Snapshot> {
        self.target.as_ref().map(|(_, snap)| snap)
    }
}

/// State carried from `before_bulk_update` to `after_bulk_update`.
#[derive(Debug)]
pub struct PendingBulkUpdate {
    filter: Filter,
    originals: Vec<(OwnerRef, Snapshot)>,
    guards: Vec<OwnerGuard>,
}

impl PendingBulkUpdate {
    /// Originals ordered by owner.
    pub fn originals(&self) -> &[(OwnerRef, Snapshot)] {
        &self.originals
    }
}

/// Per-document outcome of a bulk update.
#[derive(Debug, Default)]
pub struct BulkReport {
    pub patched: Vec<Patch>,
    /// Matched documents whose content did not change.
    pub unchanged: Vec<OwnerRef>,
    pub failed: Vec<(OwnerRef, StoreError)>,
}

impl BulkReport {
    pub fn succeeded(&self) -> Vec<OwnerRef> {
        self.patched.iter().map(|p| p.owner().clone()).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Turn append failures into [`VersionError::PartialBulkFailure`].
    pub fn into_result(self) -> Result<Vec<Patch>, VersionError> {
        if self.failed.is_empty() {
            return Ok(self.patched);
        }
        Err(VersionError::PartialBulkFailure {
            succeeded: self.succeeded(),
            failed: self.failed,
        })
    }
}

/// Wires snapshots, diffs and the patch log into entity lifecycle
/// transitions for one tracked entity type.
pub struct HookOrchestrator<L> {
    config: Arc<VersioningConfig>,
    codec: SnapshotCodec,
    log: L,
    gates: Mutex<HashMap<OwnerRef, Arc<tokio::sync::Mutex<()>>>>,
}

impl<L: PatchLogStore> HookOrchestrator<L> {
    /// Validate `config` and build an orchestrator appending to `log`.
    pub fn new(config: impl Into<Arc<VersioningConfig>>, log: L) -> Result<Self, ConfigError> {
        let config = config.into();
        config.validate()?;
        tracing::info!(
            owner_type = %config.owner_type,
            log = %config.log_collection(),
            record = %config.log_record_type(),
            "versioning enabled"
        );
        Ok(Self {
            codec: config.codec(),
            config,
            log,
            gates: Mutex::default(),
        })
    }

    pub fn config(&self) -> &VersioningConfig {
        &self.config
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn canonicalize(&self, entity: &Document) -> Snapshot {
        self.codec.canonicalize(entity)
    }

    /// Wait for exclusive hold on `owner`'s writes.
    ///
    /// Every `before_*` hook takes this for the owners it targets. Callers that
    /// mutate outside the hook pairs (a delete, say) take it themselves.
    pub async fn lock_owner(&self, owner: &OwnerRef) -> OwnerGuard {
        let gate = {
            let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
            gates.retain(|_, gate| Arc::strong_count(gate) > 1);
            gates.entry(owner.clone()).or_default().clone()
        };
        gate.lock_owned().await
    }

    fn owner_of(&self, entity: &Document) -> Result<OwnerRef, VersionError> {
        let id = entity
            .get(&self.config.id_field)
            .ok_or_else(|| VersionError::MissingIdentity(self.config.id_field.clone()))?;
        Ok(OwnerRef::from_value(id)?)
    }

    /// Diff `original` against the stored entity and append a patch if
    /// anything changed.
    async fn record(
        &self,
        owner: OwnerRef,
        original: &Snapshot,
        entity: &Document,
        update: Option<&Update>,
        ctx: &MutationContext,
    ) -> Result<Option<Patch>, VersionError> {
        let current = self.codec.canonicalize(entity);
        let ops = diff(original, &current, self.config.record_original_value_per_op);
        if ops.is_empty() {
            tracing::debug!(%owner, "no net change, no patch");
            return Ok(None);
        }
        let extra = resolve_extra(&self.config, entity, update, ctx);
        let patch = NewPatch::new(owner, ops)?.with_extra(extra)?;
        let stored = self.log.append(patch).await?;
        tracing::debug!(
            owner = %stored.owner(),
            patch = %stored.id(),
            ops = stored.ops().len(),
            "patch appended"
        );
        Ok(Some(stored))
    }

    /// Extension point before an insert. The original is the empty object.
    pub fn before_create(&self) -> PendingCreate {
        PendingCreate {
            original: Snapshot::empty(),
        }
    }

    /// Extension point after an insert: record the initial field set.
    pub async fn after_create(
        &self,
        pending: PendingCreate,
        saved: &Document,
        ctx: &MutationContext,
    ) -> Result<Option<Patch>, VersionError> {
        let owner = self.owner_of(saved)?;
        self.record(owner, &pending.original, saved, None, ctx).await
    }

    /// Extension point before a single-document update: find the document
    /// `filter` selects, take its owner's gate and keep its snapshot as read
    /// under the gate.
    ///
    /// When several documents match, the first one the store returns is the
    /// target; callers should narrow the mutation to its identity.
    pub async fn before_update<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        filter: &Filter,
    ) -> Result<PendingUpdate, VersionError> {
        let Some(first) = store.find(filter).await?.into_iter().next() else {
            return Ok(PendingUpdate::default());
        };
        let owner = self.owner_of(&first)?;
        let guard = self.lock_owner(&owner).await;
        let target = store
            .find_by_id(&owner)
            .await?
            .map(|doc| (owner, self.codec.canonicalize(&doc)));
        Ok(PendingUpdate {
            target,
            guard: Some(guard),
        })
    }

    /// Extension point after a single-document update.
    ///
    /// `updated` is the document as stored after the mutation, or `None` when
    /// nothing was updated.
    pub async fn after_update(
        &self,
        pending: PendingUpdate,
        updated: Option<&Document>,
        update: Option<&Update>,
        ctx: &MutationContext,
    ) -> Result<Option<Patch>, VersionError> {
        let PendingUpdate { target, guard: _guard } = pending;
        let (Some((owner, original)), Some(updated)) = (target, updated) else {
            return Ok(None);
        };
        let actual = self.owner_of(updated)?;
        if actual != owner {
            return Err(VersionError::IdentityMismatch {
                expected: owner,
                actual,
            });
        }
        self.record(owner, &original, updated, update, ctx).await
    }

    /// Extension point before a multi-document update: take the gate of every
    /// owner `filter` currently matches, then snapshot the ones still matching.
    ///
    /// Gates are taken in owner order so concurrent bulk updates cannot
    /// deadlock each other.
    pub async fn before_bulk_update<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        filter: &Filter,
    ) -> Result<PendingBulkUpdate, VersionError> {
        let mut owners = store
            .find(filter)
            .await?
            .iter()
            .map(|doc| self.owner_of(doc))
            .collect::<Result<Vec<_>, VersionError>>()?;
        owners.sort();
        owners.dedup();

        let mut guards = Vec::with_capacity(owners.len());
        let mut originals = Vec::with_capacity(owners.len());
        for owner in owners {
            guards.push(self.lock_owner(&owner).await);
            match store.find_by_id(&owner).await? {
                Some(doc) if filter.matches(&doc) => {
                    originals.push((owner, self.codec.canonicalize(&doc)));
                }
                _ => tracing::trace!(%owner, "left the match set before its gate was taken"),
            }
        }
        tracing::debug!(matched = originals.len(), "bulk originals captured");
        Ok(PendingBulkUpdate {
            filter: filter.clone(),
            originals,
            guards,
        })
    }

    /// Extension point after a multi-document update.
    ///
    /// Re-reads the documents matching the post-update criteria, pairs each
    /// with its original by identity, and appends one patch per changed
    /// document concurrently. Originals that dropped out of the match set are
    /// re-read by identity. Append failures are collected in the report;
    /// read failures abort.
    pub async fn after_bulk_update<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        pending: PendingBulkUpdate,
        result: &UpdateResult,
        update: &Update,
        ctx: &MutationContext,
    ) -> Result<BulkReport, VersionError> {
        let span = tracing::info_span!("bulk_update", matched = result.matched);
        self.record_bulk(store, pending, result, update, ctx)
            .instrument(span)
            .await
    }

    async fn record_bulk<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        pending: PendingBulkUpdate,
        result: &UpdateResult,
        update: &Update,
        ctx: &MutationContext,
    ) -> Result<BulkReport, VersionError> {
        let PendingBulkUpdate {
            filter,
            originals,
            guards: _guards,
        } = pending;
        let mut report = BulkReport::default();
        if result.modified == 0 {
            tracing::debug!("bulk update changed nothing");
            return Ok(report);
        }

        let mut originals: HashMap<OwnerRef, Snapshot> = originals.into_iter().collect();
        let mut current = Vec::with_capacity(originals.len());
        for doc in store.find(&filter.after(update)).await? {
            let owner = self.owner_of(&doc)?;
            match originals.remove(&owner) {
                Some(original) => current.push((owner, original, doc)),
                None => tracing::trace!(%owner, "entered match set, not part of this update"),
            }
        }
        for (owner, original) in originals {
            match store.find_by_id(&owner).await? {
                Some(doc) => current.push((owner, original, doc)),
                None => tracing::debug!(%owner, "removed before bulk patches were recorded"),
            }
        }

        let outcomes = join_all(current.iter().map(|(owner, original, doc)| async move {
            let outcome = self
                .record(owner.clone(), original, doc, Some(update), ctx)
                .await;
            (owner, outcome)
        }))
        .await;

        for (owner, outcome) in outcomes {
            match outcome {
                Ok(Some(patch)) => report.patched.push(patch),
                Ok(None) => report.unchanged.push(owner.clone()),
                Err(VersionError::Store(e)) => {
                    tracing::warn!(%owner, error = %e, "bulk patch append failed");
                    report.failed.push((owner.clone(), e));
                }
                Err(e) => return Err(e),
            }
        }
        tracing::info!(
            patched = report.patched.len(),
            unchanged = report.unchanged.len(),
            failed = report.failed.len(),
            "bulk update recorded"
        );
        Ok(report)
    }

    /// Extension point before a delete: cascade the owner's patches when
    /// enabled. Returns how many patches were removed.
    pub async fn before_delete(&self, owner: &OwnerRef) -> Result<usize, VersionError> {
        if !self.config.cascade_delete_on_remove {
            return Ok(0);
        }
        let removed = self.log.delete_by_owner(owner).await?;
        tracing::debug!(%owner, removed, "patches cascaded");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldOrigin;
    use async_trait::async_trait;
    use futures_util::FutureExt;
    use revlog_common::PatchId;
    use revlog_kernel::{Op, Pointer};
    use revlog_persist::{MemoryDocumentStore, MemoryPatchLog};
    use serde_json::{Value, json};
    use std::collections::HashSet;

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    fn p(s: &str) -> Pointer {
        Pointer::parse(s).unwrap()
    }

    fn hooks(config: VersioningConfig) -> HookOrchestrator<MemoryPatchLog> {
        HookOrchestrator::new(config, MemoryPatchLog::new()).unwrap()
    }

    /// Patch log that refuses appends for selected owners.
    struct RefusingLog {
        inner: MemoryPatchLog,
        refuse: HashSet<OwnerRef>,
    }

    #[async_trait]
    impl PatchLogStore for RefusingLog {
        async fn append(&self, patch: NewPatch) -> Result<Patch, StoreError> {
            if self.refuse.contains(patch.owner()) {
                return Err(StoreError::Backend("append refused".into()));
            }
            self.inner.append(patch).await
        }

        async fn list_by_owner(&self, owner: &OwnerRef) -> Result<Vec<Patch>, StoreError> {
            self.inner.list_by_owner(owner).await
        }

        async fn delete_by_owner(&self, owner: &OwnerRef) -> Result<usize, StoreError> {
            self.inner.delete_by_owner(owner).await
        }
    }

    #[test]
    fn invalid_config_is_rejected_at_setup() {
        let result = HookOrchestrator::new(VersioningConfig::default(), MemoryPatchLog::new());
        assert!(matches!(result, Err(ConfigError::MissingOwnerType)));
    }

    #[tokio::test]
    async fn create_records_all_initial_fields() {
        let hooks = hooks(VersioningConfig::new("tasks"));
        let store = MemoryDocumentStore::new();
        let pending = hooks.before_create();
        let saved = store.insert(doc(json!({"title": "a"}))).await.unwrap();
        let patch = hooks
            .after_create(pending, &saved, &MutationContext::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(patch.ops(), &[Op::add(p("/title"), json!("a"))]);
        assert_eq!(patch.owner(), &OwnerRef::from_value(&saved["id"]).unwrap());
    }

    #[tokio::test]
    async fn create_without_content_records_nothing() {
        let hooks = hooks(VersioningConfig::new("tasks"));
        let saved = doc(json!({"id": "t1", "version": 0}));
        let patch = hooks
            .after_create(hooks.before_create(), &saved, &MutationContext::new())
            .await
            .unwrap();
        assert!(patch.is_none());
        assert!(hooks.log().is_empty().await);
    }

    #[tokio::test]
    async fn single_update_diffs_against_pre_read() {
        let hooks = hooks(
            VersioningConfig::new("tasks")
                .record_original_values(true)
                .include("actor", "user", FieldOrigin::Context),
        );
        let store = MemoryDocumentStore::new();
        store
            .insert(doc(json!({"id": "t1", "title": "a", "done": false})))
            .await
            .unwrap();
        let owner = OwnerRef::new("t1").unwrap();
        let filter = Filter::by_id("id", &owner);
        let update = Update::set("title", json!("b"));

        let pending = hooks.before_update(&store, &filter).await.unwrap();
        assert_eq!(pending.owner(), Some(&owner));
        let updated = store.update_one(&filter, &update).await.unwrap();
        let ctx = MutationContext::new().with("user", json!("kim"));
        let patch = hooks
            .after_update(pending, updated.as_ref(), Some(&update), &ctx)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            patch.ops(),
            &[Op::Replace {
                path: p("/title"),
                value: json!("b"),
                original_value: Some(json!("a")),
            }]
        );
        assert_eq!(patch.extra_field("actor"), Some(&json!("kim")));
    }

    #[tokio::test]
    async fn no_op_update_appends_nothing() {
        let hooks = hooks(VersioningConfig::new("tasks"));
        let store = MemoryDocumentStore::new();
        store.insert(doc(json!({"id": "t1", "title": "a"}))).await.unwrap();
        let filter = Filter::all().with("id", json!("t1"));
        let update = Update::set("title", json!("a"));

        let pending = hooks.before_update(&store, &filter).await.unwrap();
        let updated = store.update_one(&filter, &update).await.unwrap();
        let patch = hooks
            .after_update(pending, updated.as_ref(), Some(&update), &MutationContext::new())
            .await
            .unwrap();
        assert!(patch.is_none());
    }

    #[tokio::test]
    async fn update_matching_nothing_appends_nothing() {
        let hooks = hooks(VersioningConfig::new("tasks"));
        let store = MemoryDocumentStore::new();
        let filter = Filter::all().with("id", json!("missing"));
        let pending = hooks.before_update(&store, &filter).await.unwrap();
        assert!(pending.owner().is_none());
        let patch = hooks
            .after_update(pending, None, None, &MutationContext::new())
            .await
            .unwrap();
        assert!(patch.is_none());
    }

    #[tokio::test]
    async fn mismatched_update_target_is_an_error() {
        let hooks = hooks(VersioningConfig::new("tasks"));
        let store = MemoryDocumentStore::new();
        store.insert(doc(json!({"id": "t1", "title": "a"}))).await.unwrap();
        let pending = hooks
            .before_update(&store, &Filter::all().with("id", json!("t1")))
            .await
            .unwrap();
        let other = doc(json!({"id": "t2", "title": "b"}));
        let result = hooks
            .after_update(pending, Some(&other), None, &MutationContext::new())
            .await;
        assert!(matches!(result, Err(VersionError::IdentityMismatch { .. })));
    }

    async fn seed_tasks(store: &MemoryDocumentStore) {
        for (id, done) in [("a", false), ("b", true), ("c", false), ("d", false)] {
            store
                .insert(doc(json!({"id": id, "list": "home", "done": done})))
                .await
                .unwrap();
        }
        store
            .insert(doc(json!({"id": "w", "list": "work", "done": false})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn bulk_update_patches_only_changed_documents() {
        let hooks = hooks(VersioningConfig::new("tasks"));
        let store = MemoryDocumentStore::new();
        seed_tasks(&store).await;

        let filter = Filter::all().with("list", json!("home"));
        let update = Update::set("done", json!(true));
        let pending = hooks.before_bulk_update(&store, &filter).await.unwrap();
        assert_eq!(pending.originals().len(), 4);
        let result = store.update_many(&filter, &update).await.unwrap();
        let report = hooks
            .after_bulk_update(&store, pending, &result, &update, &MutationContext::new())
            .await
            .unwrap();

        // N = 4 matched, K = 1 already done.
        assert_eq!(report.patched.len(), 3);
        assert_eq!(report.unchanged, vec![OwnerRef::new("b").unwrap()]);
        assert!(report.is_complete());
        let mut owners: Vec<_> = report.succeeded().iter().map(|o| o.to_string()).collect();
        owners.sort();
        assert_eq!(owners, vec!["a", "c", "d"]);
        for patch in &report.patched {
            assert_eq!(patch.ops(), &[Op::replace(p("/done"), json!(true))]);
        }
    }

    #[tokio::test]
    async fn bulk_update_ignores_documents_entering_the_match_set() {
        let hooks = hooks(VersioningConfig::new("tasks"));
        let store = MemoryDocumentStore::new();
        seed_tasks(&store).await;

        // "b" already matches the post-update criteria but was never targeted.
        let filter = Filter::all().with("done", json!(false)).with("list", json!("home"));
        let update = Update::set("done", json!(true));
        let pending = hooks.before_bulk_update(&store, &filter).await.unwrap();
        let result = store.update_many(&filter, &update).await.unwrap();
        let report = hooks
            .after_bulk_update(&store, pending, &result, &update, &MutationContext::new())
            .await
            .unwrap();
        assert_eq!(report.patched.len(), 3);
        assert!(report.unchanged.is_empty());
        for id in ["b", "w"] {
            let owner = OwnerRef::new(id).unwrap();
            assert!(hooks.log().list_by_owner(&owner).await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn bulk_update_without_modifications_is_skipped() {
        let hooks = hooks(VersioningConfig::new("tasks"));
        let store = MemoryDocumentStore::new();
        seed_tasks(&store).await;
        let filter = Filter::all().with("id", json!("b"));
        let update = Update::set("done", json!(true));
        let pending = hooks.before_bulk_update(&store, &filter).await.unwrap();
        let result = store.update_many(&filter, &update).await.unwrap();
        assert_eq!(result.modified, 0);
        let report = hooks
            .after_bulk_update(&store, pending, &result, &update, &MutationContext::new())
            .await
            .unwrap();
        assert!(report.patched.is_empty() && report.unchanged.is_empty());
    }

    #[tokio::test]
    async fn bulk_append_failures_are_reported_per_owner() {
        let refuse = HashSet::from([OwnerRef::new("c").unwrap()]);
        let log = RefusingLog {
            inner: MemoryPatchLog::new(),
            refuse,
        };
        let hooks = HookOrchestrator::new(VersioningConfig::new("tasks"), log).unwrap();
        let store = MemoryDocumentStore::new();
        seed_tasks(&store).await;

        let filter = Filter::all().with("list", json!("home"));
        let update = Update::set("done", json!(true));
        let pending = hooks.before_bulk_update(&store, &filter).await.unwrap();
        let result = store.update_many(&filter, &update).await.unwrap();
        let report = hooks
            .after_bulk_update(&store, pending, &result, &update, &MutationContext::new())
            .await
            .unwrap();

        assert_eq!(report.patched.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0.as_str(), "c");

        // The store keeps the committed mutation regardless.
        let c = store.find_by_id(&OwnerRef::new("c").unwrap()).await.unwrap().unwrap();
        assert_eq!(c["done"], json!(true));

        match report.into_result() {
            Err(VersionError::PartialBulkFailure { succeeded, failed }) => {
                assert_eq!(succeeded.len(), 2);
                assert_eq!(failed.len(), 1);
            }
            other => panic!("expected PartialBulkFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_cascades_only_when_enabled() {
        let owner = OwnerRef::new("t1").unwrap();
        let op = Op::add(p("/title"), json!("a"));

        let cascading = hooks(VersioningConfig::new("tasks"));
        cascading
            .log()
            .append(NewPatch::new(owner.clone(), vec![op.clone()]).unwrap())
            .await
            .unwrap();
        assert_eq!(cascading.before_delete(&owner).await.unwrap(), 1);
        assert!(cascading.log().list_by_owner(&owner).await.unwrap().is_empty());

        let keeping = hooks(VersioningConfig::new("tasks").cascade_delete(false));
        let kept = keeping
            .log()
            .append(
                NewPatch::new(owner.clone(), vec![op])
                    .unwrap()
                    .with_id(PatchId::from("p1")),
            )
            .await
            .unwrap();
        assert_eq!(keeping.before_delete(&owner).await.unwrap(), 0);
        assert_eq!(keeping.log().list_by_owner(&owner).await.unwrap(), vec![kept]);
    }

    #[tokio::test]
    async fn pending_update_holds_the_owner_gate() {
        let hooks = hooks(VersioningConfig::new("tasks"));
        let store = MemoryDocumentStore::new();
        store.insert(doc(json!({"id": "t1", "title": "a"}))).await.unwrap();
        store.insert(doc(json!({"id": "t2", "title": "a"}))).await.unwrap();
        let t1 = OwnerRef::new("t1").unwrap();
        let t2 = OwnerRef::new("t2").unwrap();

        let pending = hooks
            .before_update(&store, &Filter::by_id("id", &t1))
            .await
            .unwrap();
        assert!(hooks.lock_owner(&t1).now_or_never().is_none());
        assert!(hooks.lock_owner(&t2).now_or_never().is_some());

        hooks
            .after_update(pending, None, None, &MutationContext::new())
            .await
            .unwrap();
        assert!(hooks.lock_owner(&t1).now_or_never().is_some());
    }

    #[tokio::test]
    async fn pending_bulk_update_holds_every_matched_gate() {
        let hooks = hooks(VersioningConfig::new("tasks"));
        let store = MemoryDocumentStore::new();
        seed_tasks(&store).await;

        let filter = Filter::all().with("list", json!("home"));
        let update = Update::set("done", json!(true));
        let pending = hooks.before_bulk_update(&store, &filter).await.unwrap();
        for id in ["a", "b", "c", "d"] {
            let owner = OwnerRef::new(id).unwrap();
            assert!(hooks.lock_owner(&owner).now_or_never().is_none(), "{id}");
        }
        let w = OwnerRef::new("w").unwrap();
        assert!(hooks.lock_owner(&w).now_or_never().is_some());

        let result = store.update_many(&filter, &update).await.unwrap();
        hooks
            .after_bulk_update(&store, pending, &result, &update, &MutationContext::new())
            .await
            .unwrap();
        let a = OwnerRef::new("a").unwrap();
        assert!(hooks.lock_owner(&a).now_or_never().is_some());
    }
}
