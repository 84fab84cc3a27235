//! Versioning kernel: canonical snapshots, structural diff, patch application.
//!
//! # Invariants
//! - `diff(a, a)` is empty for every snapshot `a`.
//! - `apply(a, diff(a, b)) == b` for every pair of snapshots.
//! - Nothing in this crate performs I/O.

pub mod diff;
pub mod op;
pub mod snapshot;

pub use diff::{ApplyError, apply, apply_value, diff, diff_values};
pub use op::{Op, OpKind, Pointer, PointerError};
pub use snapshot::{Snapshot, SnapshotCodec};
