use revlog_common::{IdError, OwnerRef, PatchId};
use revlog_kernel::ApplyError;
use revlog_persist::{PatchError, StoreError};

/// Setup-time configuration problems. Raised once, never at runtime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("owner type name is required")]
    MissingOwnerType,
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("field name {0:?} conflicts with another configured or reserved field")]
    ConflictingField(String),
    #[error("include field {0:?} has an empty source")]
    EmptyIncludeSource(String),
    #[error("log naming produced an empty name")]
    EmptyLogName,
    #[error("log collection {0:?} would share its name with the owner type")]
    ConflictingLogName(String),
    #[error("document store identifies documents by {store:?}, config says {config:?}")]
    IdFieldMismatch { store: String, config: String },
}

/// An invalid rollback request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RollbackError {
    #[error("patch {patch} not found in the log of {owner}")]
    NotFound { owner: OwnerRef, patch: PatchId },
    #[error("patch {patch} is already the latest state of {owner}")]
    AlreadyLatest { owner: OwnerRef, patch: PatchId },
}

impl RollbackError {
    /// Stable reason code: `not-found` or `already-latest`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not-found",
            Self::AlreadyLatest { .. } => "already-latest",
        }
    }
}

/// Everything a versioned operation can fail with.
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Rollback(#[from] RollbackError),
    /// Store failures pass through unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error("document identity: {0}")]
    Identity(#[from] IdError),
    #[error("document has no {0:?} field")]
    MissingIdentity(String),
    #[error("update targeted {expected} but the store returned {actual}")]
    IdentityMismatch { expected: OwnerRef, actual: OwnerRef },
    #[error("cannot replay patch {patch}: {source}")]
    Replay {
        patch: PatchId,
        #[source]
        source: ApplyError,
    },
    #[error("{} of {} bulk patches failed to append", .failed.len(), .failed.len() + .succeeded.len())]
    PartialBulkFailure {
        succeeded: Vec<OwnerRef>,
        failed: Vec<(OwnerRef, StoreError)>,
    },
}

impl VersionError {
    /// The rollback reason code, if this is a rollback rejection.
    pub fn rollback_code(&self) -> Option<&'static str> {
        match self {
            Self::Rollback(e) => Some(e.code()),
            _ => None,
        }
    }
}
