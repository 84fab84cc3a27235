use revlog_common::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical, comparable form of an entity's persisted fields.
///
/// Identity, version and timestamp fields are stripped; map keys are kept in
/// sorted order so the same state always serializes to the same bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(Document);

impl Snapshot {
    /// The empty aggregate: the "before" state of a create, and the starting
    /// point of replay.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_document(doc: Document) -> Self {
        Self(doc)
    }

    pub fn fields(&self) -> &Document {
        &self.0
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_document(self) -> Document {
        self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Deep merge: objects present on both sides are merged key by key, and
    /// everything else in `overrides` (scalars, arrays, null) replaces the
    /// current value.
    pub fn merge(mut self, overrides: &Document) -> Self {
        merge_into(&mut self.0, overrides);
        self
    }
}

fn merge_into(target: &mut Document, overrides: &Document) {
    for (k, v) in overrides {
        if let (Some(Value::Object(current)), Value::Object(nested)) = (target.get_mut(k), v) {
            merge_into(current, nested);
            continue;
        }
        target.insert(k.clone(), v.clone());
    }
}

/// Strips the non-content fields of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotCodec {
    id_field: String,
    version_field: String,
    timestamp_fields: Vec<String>,
}

impl SnapshotCodec {
    pub fn new(
        id_field: impl Into<String>,
        version_field: impl Into<String>,
        timestamp_fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id_field: id_field.into(),
            version_field: version_field.into(),
            timestamp_fields: timestamp_fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Whether a top-level field is excluded from snapshots.
    pub fn is_stripped(&self, field: &str) -> bool {
        field == self.id_field
            || field == self.version_field
            || self.timestamp_fields.iter().any(|f| f == field)
    }

    /// Produce the canonical snapshot of an entity.
    pub fn canonicalize(&self, entity: &Document) -> Snapshot {
        let fields = entity
            .iter()
            .filter(|(k, _)| !self.is_stripped(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Snapshot(fields)
    }
}

impl Default for SnapshotCodec {
    fn default() -> Self {
        Self::new("id", "version", ["createdAt", "updatedAt"])
    }
}
