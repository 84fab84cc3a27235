//! Contract of the document store whose entities are versioned, plus an
//! in-memory implementation.
//!
//! Queries are equality filters over dotted field paths (`completed.status`).
//! Updates are `$set`/`$unset` style partial payloads.

use crate::log::StoreError;
use async_trait::async_trait;
use revlog_common::{Document, OwnerRef, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Conjunction of `field == value` conditions. A missing field matches `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(BTreeMap<String, Value>);

impl Filter {
    /// The filter matching every document.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.0.insert(field.into(), value);
        self
    }

    /// Match a single document by identity.
    pub fn by_id(id_field: &str, id: &OwnerRef) -> Self {
        Self::all().with(id_field, id.to_value())
    }

    pub fn conditions(&self) -> &BTreeMap<String, Value> {
        &self.0
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.0
            .iter()
            .all(|(field, want)| get_path(doc, field).unwrap_or(&Value::Null) == want)
    }

    /// The criteria that documents matched by `self` satisfy after `update`
    /// has been applied to them.
    pub fn after(&self, update: &Update) -> Self {
        let mut next = self.clone();
        for (field, want) in next.0.iter_mut() {
            if let Some(v) = update.set.get(field) {
                *want = v.clone();
            } else if update.unset.iter().any(|u| u == field) {
                *want = Value::Null;
            }
        }
        next
    }
}

/// A partial update: fields to set and fields to remove.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    #[serde(rename = "$set", default)]
    pub set: Document,
    #[serde(rename = "$unset", default)]
    pub unset: Vec<String>,
}

impl Update {
    pub fn set(field: impl Into<String>, value: Value) -> Self {
        Self::default().and_set(field, value)
    }

    pub fn and_set(mut self, field: impl Into<String>, value: Value) -> Self {
        self.set.insert(field.into(), value);
        self
    }

    pub fn and_unset(mut self, field: impl Into<String>) -> Self {
        self.unset.push(field.into());
        self
    }

    /// Apply to a document in place.
    pub fn apply_to(&self, doc: &mut Document) {
        for (field, value) in &self.set {
            set_path(doc, field, value.clone());
        }
        for field in &self.unset {
            unset_path(doc, field);
        }
    }
}

/// Outcome of a multi-document update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched: usize,
    pub modified: usize,
}

/// The persistent store holding the versioned entities.
///
/// Each call is atomic per document; nothing spans documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Name of the identity field in stored documents.
    fn id_field(&self) -> &str;

    async fn find_by_id(&self, id: &OwnerRef) -> Result<Option<Document>, StoreError>;

    async fn find(&self, filter: &Filter) -> Result<Vec<Document>, StoreError>;

    /// Insert a new document, assigning an identity when absent.
    async fn insert(&self, doc: Document) -> Result<Document, StoreError>;

    /// Replace the content fields of an existing document. Returns the stored
    /// document, or `None` if it does not exist.
    async fn replace(&self, id: &OwnerRef, fields: Document)
    -> Result<Option<Document>, StoreError>;

    /// Update the first document matching `filter`, returning it as stored
    /// after the update.
    async fn update_one(
        &self,
        filter: &Filter,
        update: &Update,
    ) -> Result<Option<Document>, StoreError>;

    async fn update_many(&self, filter: &Filter, update: &Update)
    -> Result<UpdateResult, StoreError>;

    /// Remove a document. Returns whether it existed.
    async fn remove(&self, id: &OwnerRef) -> Result<bool, StoreError>;
}

/// Names of the bookkeeping fields [`MemoryDocumentStore`] maintains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLayout {
    pub id_field: String,
    pub version_field: String,
    pub created_at_field: String,
    pub updated_at_field: String,
}

impl Default for DocumentLayout {
    fn default() -> Self {
        Self {
            id_field: "id".into(),
            version_field: "version".into(),
            created_at_field: "createdAt".into(),
            updated_at_field: "updatedAt".into(),
        }
    }
}

/// In-memory document store.
///
/// Assigns uuid identities, bumps a version counter on every effective
/// change and stamps creation/update times, like a typical ODM would.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    layout: DocumentLayout,
    docs: Mutex<BTreeMap<OwnerRef, Document>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layout(layout: DocumentLayout) -> Self {
        Self {
            layout,
            docs: Mutex::default(),
        }
    }

    pub fn layout(&self) -> &DocumentLayout {
        &self.layout
    }

    pub async fn len(&self) -> usize {
        self.docs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn is_bookkeeping(&self, field: &str) -> bool {
        let l = &self.layout;
        field == l.id_field
            || field == l.version_field
            || field == l.created_at_field
            || field == l.updated_at_field
    }

    /// `update` without the paths that would touch a bookkeeping field.
    fn content_only(&self, update: &Update) -> Update {
        let touches = |path: &str| self.is_bookkeeping(path.split('.').next().unwrap_or(path));
        let dropped = update.set.keys().chain(&update.unset).filter(|p| touches(p.as_str()));
        for path in dropped {
            tracing::debug!(%path, "ignoring update of a bookkeeping field");
        }
        Update {
            set: update
                .set
                .iter()
                .filter(|(p, _)| !touches(p.as_str()))
                .map(|(p, v)| (p.clone(), v.clone()))
                .collect(),
            unset: update.unset.iter().filter(|p| !touches(p.as_str())).cloned().collect(),
        }
    }

    /// Bump version and update time if `after` differs from `before`.
    fn touch_if_changed(&self, before: &Document, after: &mut Document) -> bool {
        if before == after {
            return false;
        }
        let version = after
            .get(&self.layout.version_field)
            .and_then(Value::as_u64)
            .unwrap_or(0);
        after.insert(self.layout.version_field.clone(), Value::from(version + 1));
        after.insert(
            self.layout.updated_at_field.clone(),
            Value::from(Timestamp::now().0),
        );
        true
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn id_field(&self) -> &str {
        &self.layout.id_field
    }

    async fn find_by_id(&self, id: &OwnerRef) -> Result<Option<Document>, StoreError> {
        Ok(self.docs.lock().await.get(id).cloned())
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let docs = self.docs.lock().await;
        Ok(docs.values().filter(|d| filter.matches(d)).cloned().collect())
    }

    async fn insert(&self, mut doc: Document) -> Result<Document, StoreError> {
        let id = match doc.get(&self.layout.id_field) {
            Some(v) => OwnerRef::from_value(v)
                .map_err(|e| StoreError::MissingIdentity(e.to_string()))?,
            None => OwnerRef::generate(),
        };
        let mut docs = self.docs.lock().await;
        if docs.contains_key(&id) {
            return Err(StoreError::DuplicateDocument(id));
        }
        let now = Value::from(Timestamp::now().0);
        doc.insert(self.layout.id_field.clone(), id.to_value());
        doc.insert(self.layout.version_field.clone(), Value::from(0u64));
        doc.insert(self.layout.created_at_field.clone(), now.clone());
        doc.insert(self.layout.updated_at_field.clone(), now);
        docs.insert(id, doc.clone());
        Ok(doc)
    }

    async fn replace(
        &self,
        id: &OwnerRef,
        fields: Document,
    ) -> Result<Option<Document>, StoreError> {
        let mut docs = self.docs.lock().await;
        let Some(current) = docs.get_mut(id) else {
            return Ok(None);
        };
        let before = current.clone();
        let mut next: Document = before
            .iter()
            .filter(|(k, _)| self.is_bookkeeping(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        next.extend(fields.into_iter().filter(|(k, _)| !self.is_bookkeeping(k)));
        self.touch_if_changed(&before, &mut next);
        *current = next.clone();
        Ok(Some(next))
    }

    async fn update_one(
        &self,
        filter: &Filter,
        update: &Update,
    ) -> Result<Option<Document>, StoreError> {
        let update = self.content_only(update);
        let mut docs = self.docs.lock().await;
        let Some(doc) = docs.values_mut().find(|d| filter.matches(d)) else {
            return Ok(None);
        };
        let before = doc.clone();
        update.apply_to(doc);
        self.touch_if_changed(&before, doc);
        Ok(Some(doc.clone()))
    }

    async fn update_many(
        &self,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult, StoreError> {
        let update = self.content_only(update);
        let mut docs = self.docs.lock().await;
        let mut result = UpdateResult::default();
        for doc in docs.values_mut().filter(|d| filter.matches(d)) {
            result.matched += 1;
            let before = doc.clone();
            update.apply_to(doc);
            if self.touch_if_changed(&before, doc) {
                result.modified += 1;
            }
        }
        Ok(result)
    }

    async fn remove(&self, id: &OwnerRef) -> Result<bool, StoreError> {
        Ok(self.docs.lock().await.remove(id).is_some())
    }
}

/// Read a dotted path (`a.b.c`) out of a document.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn set_path(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_owned(), value);
        }
        Some((head, rest)) => {
            let child = doc
                .entry(head.to_owned())
                .or_insert_with(|| Value::Object(Document::new()));
            if !child.is_object() {
                *child = Value::Object(Document::new());
            }
            if let Value::Object(map) = child {
                set_path(map, rest, value);
            }
        }
    }
}

fn unset_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(map)) = doc.get_mut(head) {
                unset_path(map, rest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn filter_matches_dotted_paths_and_missing_as_null() {
        let d = doc(json!({"list": "home", "completed": {"status": "pending"}}));
        assert!(Filter::all().matches(&d));
        assert!(Filter::all().with("completed.status", json!("pending")).matches(&d));
        assert!(!Filter::all().with("list", json!("work")).matches(&d));
        assert!(Filter::all().with("owner", Value::Null).matches(&d));
    }

    #[test]
    fn filter_after_update_follows_set_fields() {
        let f = Filter::all()
            .with("completed.status", json!("pending"))
            .with("list", json!("home"))
            .with("tag", json!("x"));
        let u = Update::set("completed.status", json!("done")).and_unset("tag");
        let next = f.after(&u);
        assert_eq!(next.conditions()["completed.status"], json!("done"));
        assert_eq!(next.conditions()["list"], json!("home"));
        assert_eq!(next.conditions()["tag"], Value::Null);
    }

    #[test]
    fn update_sets_and_unsets_nested() {
        let mut d = doc(json!({"a": 1, "n": {"x": 1, "y": 2}}));
        Update::set("n.x", json!(5))
            .and_set("m.k", json!(true))
            .and_unset("n.y")
            .and_unset("a")
            .apply_to(&mut d);
        assert_eq!(Value::Object(d), json!({"n": {"x": 5}, "m": {"k": true}}));
    }

    #[test]
    fn update_wire_form() {
        let u: Update = serde_json::from_value(json!({"$set": {"title": "b"}})).unwrap();
        assert_eq!(u, Update::set("title", json!("b")));
    }

    #[tokio::test]
    async fn insert_assigns_bookkeeping() {
        let store = MemoryDocumentStore::new();
        let saved = store.insert(doc(json!({"title": "a"}))).await.unwrap();
        let id = OwnerRef::from_value(&saved["id"]).unwrap();
        assert_eq!(saved["version"], json!(0));
        assert!(saved.contains_key("createdAt"));
        assert_eq!(store.find_by_id(&id).await.unwrap(), Some(saved.clone()));

        let dup = store.insert(saved).await;
        assert!(matches!(dup, Err(StoreError::DuplicateDocument(_))));
    }

    #[tokio::test]
    async fn replace_keeps_bookkeeping_and_bumps_version() {
        let store = MemoryDocumentStore::new();
        let saved = store
            .insert(doc(json!({"id": "t1", "title": "a", "done": false})))
            .await
            .unwrap();
        let id = OwnerRef::new("t1").unwrap();

        let next = store
            .replace(&id, doc(json!({"title": "b", "version": 99})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next["id"], json!("t1"));
        assert_eq!(next["version"], json!(1));
        assert_eq!(next["createdAt"], saved["createdAt"]);
        assert_eq!(next.get("done"), None);

        let missing = OwnerRef::new("nope").unwrap();
        assert_eq!(store.replace(&missing, Document::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn update_many_counts_only_real_changes() {
        let store = MemoryDocumentStore::new();
        store.insert(doc(json!({"list": "home", "done": false}))).await.unwrap();
        store.insert(doc(json!({"list": "home", "done": true}))).await.unwrap();
        store.insert(doc(json!({"list": "work", "done": false}))).await.unwrap();

        let result = store
            .update_many(
                &Filter::all().with("list", json!("home")),
                &Update::set("done", json!(true)),
            )
            .await
            .unwrap();
        assert_eq!(result, UpdateResult { matched: 2, modified: 1 });
    }

    #[tokio::test]
    async fn update_one_returns_updated_document() {
        let store = MemoryDocumentStore::new();
        store.insert(doc(json!({"id": "t1", "title": "a"}))).await.unwrap();
        let id = OwnerRef::new("t1").unwrap();
        let updated = store
            .update_one(&Filter::by_id("id", &id), &Update::set("title", json!("b")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["title"], json!("b"));
        assert_eq!(updated["version"], json!(1));

        let none = store
            .update_one(&Filter::all().with("title", json!("zzz")), &Update::default())
            .await
            .unwrap();
        assert!(none.is_none());
        assert!(store.remove(&id).await.unwrap());
        assert!(!store.remove(&id).await.unwrap());
    }

    #[tokio::test]
    async fn updates_cannot_touch_bookkeeping_fields() {
        let store = MemoryDocumentStore::new();
        let saved = store.insert(doc(json!({"id": "t1", "title": "a"}))).await.unwrap();
        let id = OwnerRef::new("t1").unwrap();

        let update = Update::set("id", json!("x"))
            .and_set("createdAt", json!(0))
            .and_set("title", json!("b"))
            .and_unset("version");
        let updated = store
            .update_one(&Filter::by_id("id", &id), &update)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["id"], json!("t1"));
        assert_eq!(updated["title"], json!("b"));
        assert_eq!(updated["version"], json!(1));
        assert_eq!(updated["createdAt"], saved["createdAt"]);
        assert_eq!(store.find_by_id(&id).await.unwrap(), Some(updated));
        assert!(store.find_by_id(&OwnerRef::new("x").unwrap()).await.unwrap().is_none());

        let result = store
            .update_many(&Filter::all(), &Update::set("id", json!("y")).and_unset("updatedAt"))
            .await
            .unwrap();
        assert_eq!(result, UpdateResult { matched: 1, modified: 0 });
        assert!(store.find_by_id(&id).await.unwrap().unwrap().contains_key("updatedAt"));
    }
}
