use revlog_common::{OwnerRef, PatchId, Timestamp};
use revlog_kernel::{Op, OpKind};
use revlog_persist::{Patch, PatchLogStore, StoreError};

/// Patch log inspector for developer tooling.
///
/// Read-only queries over one owner's patches for debugging and the CLI.
pub struct PatchLogInspector;

impl PatchLogInspector {
    /// Summarize an owner's log as currently stored.
    pub async fn inspect<L: PatchLogStore + ?Sized>(
        log: &L,
        owner: &OwnerRef,
    ) -> Result<LogSummary, StoreError> {
        let patches = log.list_by_owner(owner).await?;
        Ok(Self::summary(owner, &patches))
    }

    /// Produce a summary of already-listed patches.
    pub fn summary(owner: &OwnerRef, patches: &[Patch]) -> LogSummary {
        let mut summary = LogSummary {
            owner: owner.clone(),
            patch_count: patches.len(),
            adds: 0,
            removes: 0,
            replaces: 0,
            first_at: patches.first().map(Patch::created_at),
            last_at: patches.last().map(Patch::created_at),
        };
        for op in patches.iter().flat_map(Patch::ops) {
            match op.kind() {
                OpKind::Add => summary.adds += 1,
                OpKind::Remove => summary.removes += 1,
                OpKind::Replace => summary.replaces += 1,
            }
        }
        summary
    }

    /// One line of detail per patch, oldest first.
    pub fn describe(patches: &[Patch]) -> Vec<PatchInfo> {
        patches.iter().map(PatchInfo::from).collect()
    }

    /// Look up a single patch by id.
    pub fn find<'a>(patches: &'a [Patch], id: &PatchId) -> Option<&'a Patch> {
        patches.iter().find(|p| p.id() == id)
    }
}

/// Summary of an owner's patch log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSummary {
    pub owner: OwnerRef,
    pub patch_count: usize,
    pub adds: usize,
    pub removes: usize,
    pub replaces: usize,
    pub first_at: Option<Timestamp>,
    pub last_at: Option<Timestamp>,
}

impl LogSummary {
    pub fn op_count(&self) -> usize {
        self.adds + self.removes + self.replaces
    }
}

impl std::fmt::Display for LogSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Log [{}]: patches={} ops={} (add={} remove={} replace={})",
            self.owner,
            self.patch_count,
            self.op_count(),
            self.adds,
            self.removes,
            self.replaces
        )?;
        if let (Some(first), Some(last)) = (self.first_at, self.last_at) {
            write!(f, " span={first}..{last}")?;
        }
        Ok(())
    }
}

/// Detailed info about a single patch.
#[derive(Debug, Clone)]
pub struct PatchInfo {
    pub id: PatchId,
    pub created_at: Timestamp,
    pub ops: Vec<String>,
    pub extra_fields: Vec<String>,
}

impl From<&Patch> for PatchInfo {
    fn from(patch: &Patch) -> Self {
        Self {
            id: patch.id().clone(),
            created_at: patch.created_at(),
            ops: patch.ops().iter().map(op_line).collect(),
            extra_fields: patch.extra().keys().cloned().collect(),
        }
    }
}

fn op_line(op: &Op) -> String {
    match op.value() {
        Some(value) => format!("{} {} = {}", op.kind(), op.path().as_str(), value),
        None => format!("{} {}", op.kind(), op.path().as_str()),
    }
}

impl std::fmt::Display for PatchInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Patch [{}] at={} ops=[{}]", self.id, self.created_at, self.ops.join("; "))?;
        if !self.extra_fields.is_empty() {
            write!(f, " extra=[{}]", self.extra_fields.join(", "))?;
        }
        Ok(())
    }
}
