use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// A persisted document: a JSON object keyed by field name.
///
/// `serde_json::Map` is ordered by key, so iteration is deterministic.
pub type Document = serde_json::Map<String, Value>;

/// Errors from identity conversions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("identity value must be a string or integer, got {0}")]
    UnsupportedIdentity(String),
    #[error("identity must not be empty")]
    Empty,
}

/// Stable identity of a tracked entity; every patch carries one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerRef(String);

impl OwnerRef {
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdError::Empty);
        }
        Ok(Self(id))
    }

    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Read an identity out of a document field value.
    ///
    /// Strings are taken verbatim, integers are rendered in decimal.
    pub fn from_value(value: &Value) -> Result<Self, IdError> {
        match value {
            Value::String(s) => Self::new(s.clone()),
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Self(n.to_string())),
            other => Err(IdError::UnsupportedIdentity(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identity as it is written back into a document.
    pub fn to_value(&self) -> Value {
        Value::String(self.0.clone())
    }
}

impl std::fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a stored patch, assigned by the patch log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchId(String);

impl PatchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PatchId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(millis)
    }

    /// The smallest timestamp strictly after `self`.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn owner_ref_uniqueness() {
        let a = OwnerRef::generate();
        let b = OwnerRef::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn owner_ref_from_string_and_integer() {
        assert_eq!(OwnerRef::from_value(&json!("abc")).unwrap().as_str(), "abc");
        assert_eq!(OwnerRef::from_value(&json!(42)).unwrap().as_str(), "42");
    }

    #[test]
    fn owner_ref_rejects_other_shapes() {
        assert!(matches!(
            OwnerRef::from_value(&json!({"a": 1})),
            Err(IdError::UnsupportedIdentity(_))
        ));
        assert_eq!(OwnerRef::from_value(&json!("")), Err(IdError::Empty));
        assert!(OwnerRef::from_value(&json!(1.5)).is_err());
    }

    #[test]
    fn ids_serialize_transparently() {
        let owner = OwnerRef::new("o-1").unwrap();
        assert_eq!(serde_json::to_value(&owner).unwrap(), json!("o-1"));
        let patch = PatchId::from("p-1");
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!("p-1"));
    }

    #[test]
    fn timestamp_next_is_strictly_greater() {
        let t = Timestamp(10);
        assert!(t.next() > t);
        assert_eq!(Timestamp(u64::MAX).next(), Timestamp(u64::MAX));
    }
}
