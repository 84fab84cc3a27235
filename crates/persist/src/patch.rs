use revlog_common::{OwnerRef, PatchId, Timestamp};
use revlog_kernel::Op;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Field names every patch record reserves for itself.
pub const RESERVED_FIELDS: [&str; 4] = ["id", "createdAt", "ref", "ops"];

/// Errors from building a patch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("a patch must carry at least one op")]
    EmptyOps,
    #[error("extra field {0:?} collides with a reserved patch field")]
    ReservedField(String),
}

/// A patch that has not been stored yet.
///
/// The log assigns `id` and `createdAt` when they are absent.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPatch {
    pub(crate) id: Option<PatchId>,
    pub(crate) created_at: Option<Timestamp>,
    pub(crate) owner: OwnerRef,
    pub(crate) ops: Vec<Op>,
    pub(crate) extra: BTreeMap<String, Value>,
}

impl NewPatch {
    /// Build a patch for `owner`. Fails if `ops` is empty.
    pub fn new(owner: OwnerRef, ops: Vec<Op>) -> Result<Self, PatchError> {
        if ops.is_empty() {
            return Err(PatchError::EmptyOps);
        }
        Ok(Self {
            id: None,
            created_at: None,
            owner,
            ops,
            extra: BTreeMap::new(),
        })
    }

    /// Attach configured extra fields (actor, reason, ...).
    pub fn with_extra(mut self, extra: BTreeMap<String, Value>) -> Result<Self, PatchError> {
        if let Some(name) = extra.keys().find(|k| RESERVED_FIELDS.contains(&k.as_str())) {
            return Err(PatchError::ReservedField(name.clone()));
        }
        self.extra = extra;
        Ok(self)
    }

    pub fn with_id(mut self, id: PatchId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_created_at(mut self, at: Timestamp) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn owner(&self) -> &OwnerRef {
        &self.owner
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn id(&self) -> Option<&PatchId> {
        self.id.as_ref()
    }

    pub fn created_at(&self) -> Option<Timestamp> {
        self.created_at
    }

    /// Finalize into a stored record. Only log stores call this.
    pub(crate) fn into_stored(self, id: PatchId, created_at: Timestamp) -> Patch {
        Patch {
            id,
            created_at,
            owner: self.owner,
            ops: self.ops,
            extra: self.extra,
        }
    }
}

/// An immutable, stored patch record.
///
/// Wire form: `{ id, createdAt, ref, ops: [...], <extra fields> }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    id: PatchId,
    #[serde(rename = "createdAt")]
    created_at: Timestamp,
    #[serde(rename = "ref")]
    owner: OwnerRef,
    ops: Vec<Op>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

impl Patch {
    pub fn id(&self) -> &PatchId {
        &self.id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn owner(&self) -> &OwnerRef {
        &self.owner
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn extra(&self) -> &BTreeMap<String, Value> {
        &self.extra
    }

    pub fn extra_field(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }
}
