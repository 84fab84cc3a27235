use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Errors from constructing a [`Pointer`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PointerError {
    #[error("path {0:?} must be empty or start with '/'")]
    MissingLeadingSlash(String),
    #[error("path {0:?} contains an invalid '~' escape")]
    BadEscape(String),
}

/// A JSON-pointer style path (`/title`, `/tags/0`, `""` for the root).
///
/// Tokens are escaped with `~0` for `~` and `~1` for `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pointer(String);

impl Pointer {
    /// The pointer addressing the whole document.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Parse and validate a pointer string.
    pub fn parse(raw: impl Into<String>) -> Result<Self, PointerError> {
        let raw = raw.into();
        if !raw.is_empty() && !raw.starts_with('/') {
            return Err(PointerError::MissingLeadingSlash(raw));
        }
        let mut chars = raw.chars();
        while let Some(c) = chars.next() {
            if c == '~' && !matches!(chars.next(), Some('0') | Some('1')) {
                return Err(PointerError::BadEscape(raw));
            }
        }
        Ok(Self(raw))
    }

    /// Extend the pointer by one unescaped token.
    pub fn child(&self, token: &str) -> Self {
        let escaped = token.replace('~', "~0").replace('/', "~1");
        Self(format!("{}/{}", self.0, escaped))
    }

    pub fn index(&self, index: usize) -> Self {
        Self(format!("{}/{}", self.0, index))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The unescaped reference tokens, outermost first.
    pub fn tokens(&self) -> Vec<String> {
        if self.0.is_empty() {
            return Vec::new();
        }
        self.0[1..]
            .split('/')
            .map(|t| t.replace("~1", "/").replace("~0", "~"))
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Pointer {
    type Error = PointerError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(raw)
    }
}

impl From<Pointer> for String {
    fn from(p: Pointer) -> Self {
        p.0
    }
}

impl std::fmt::Display for Pointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind tag of an [`Op`], for counting and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OpKind {
    Add,
    Remove,
    Replace,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Replace => "replace",
        })
    }
}

/// A single structural operation inside a patch.
///
/// Wire form: `{"kind": "add"|"remove"|"replace", "path", "value"?, "originalValue"?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Op {
    /// Insert a value at a path that did not exist before.
    Add { path: Pointer, value: Value },
    /// Delete the value at an existing path.
    Remove {
        path: Pointer,
        #[serde(
            rename = "originalValue",
            default,
            deserialize_with = "present_value",
            skip_serializing_if = "Option::is_none"
        )]
        original_value: Option<Value>,
    },
    /// Overwrite the value at an existing path.
    Replace {
        path: Pointer,
        value: Value,
        #[serde(
            rename = "originalValue",
            default,
            deserialize_with = "present_value",
            skip_serializing_if = "Option::is_none"
        )]
        original_value: Option<Value>,
    },
}

/// A present `originalValue` is kept even when it is `null`.
fn present_value<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(d).map(Some)
}

impl Op {
    pub fn add(path: Pointer, value: Value) -> Self {
        Self::Add { path, value }
    }

    pub fn remove(path: Pointer) -> Self {
        Self::Remove {
            path,
            original_value: None,
        }
    }

    pub fn replace(path: Pointer, value: Value) -> Self {
        Self::Replace {
            path,
            value,
            original_value: None,
        }
    }

    pub fn kind(&self) -> OpKind {
        match self {
            Self::Add { .. } => OpKind::Add,
            Self::Remove { .. } => OpKind::Remove,
            Self::Replace { .. } => OpKind::Replace,
        }
    }

    pub fn path(&self) -> &Pointer {
        match self {
            Self::Add { path, .. } | Self::Remove { path, .. } | Self::Replace { path, .. } => path,
        }
    }

    /// The value written by this op, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Add { value, .. } | Self::Replace { value, .. } => Some(value),
            Self::Remove { .. } => None,
        }
    }

    pub fn original_value(&self) -> Option<&Value> {
        match self {
            Self::Remove { original_value, .. } | Self::Replace { original_value, .. } => {
                original_value.as_ref()
            }
            Self::Add { .. } => None,
        }
    }
}
