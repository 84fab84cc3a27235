//! Structural diff and patch application over JSON values.
//!
//! Objects are walked in sorted key order. Arrays are compared position by
//! position: shared indices recurse, a longer `after` appends with ascending
//! `add`s, a shorter `after` truncates with descending `remove`s. Applying the
//! ops in emitted order therefore always reproduces `after`.

use crate::op::{Op, Pointer};
use crate::snapshot::Snapshot;
use serde_json::Value;
use std::collections::BTreeSet;

/// Structural errors raised while applying ops.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error("no value at {0}")]
    MissingTarget(Pointer),
    #[error("value at {0} is not an object or array")]
    NotAContainer(Pointer),
    #[error("invalid array index {token:?} at {path}")]
    InvalidIndex { path: Pointer, token: String },
    #[error("array index {index} out of bounds at {path} (len {len})")]
    IndexOutOfBounds {
        path: Pointer,
        index: usize,
        len: usize,
    },
    #[error("cannot remove the document root")]
    RemoveRoot,
    #[error("patched document root is not an object")]
    NotAnObject,
}

/// Compute the ops turning `before` into `after`.
pub fn diff(before: &Snapshot, after: &Snapshot, record_original: bool) -> Vec<Op> {
    diff_values(&before.to_value(), &after.to_value(), record_original)
}

/// Value-level diff; see the module docs for ordering.
pub fn diff_values(before: &Value, after: &Value, record_original: bool) -> Vec<Op> {
    let mut ops = Vec::new();
    diff_into(&Pointer::root(), before, after, record_original, &mut ops);
    ops
}

fn diff_into(path: &Pointer, before: &Value, after: &Value, record: bool, ops: &mut Vec<Op>) {
    if before == after {
        return;
    }
    match (before, after) {
        (Value::Object(a), Value::Object(b)) => {
            let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            for key in keys {
                let child = path.child(key);
                match (a.get(key), b.get(key)) {
                    (Some(x), Some(y)) => diff_into(&child, x, y, record, ops),
                    (Some(x), None) => ops.push(Op::Remove {
                        path: child,
                        original_value: record.then(|| x.clone()),
                    }),
                    (None, Some(y)) => ops.push(Op::add(child, y.clone())),
                    (None, None) => {}
                }
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            let shared = a.len().min(b.len());
            for i in 0..shared {
                diff_into(&path.index(i), &a[i], &b[i], record, ops);
            }
            for (i, y) in b.iter().enumerate().skip(shared) {
                ops.push(Op::add(path.index(i), y.clone()));
            }
            for i in (shared..a.len()).rev() {
                ops.push(Op::Remove {
                    path: path.index(i),
                    original_value: record.then(|| a[i].clone()),
                });
            }
        }
        _ => ops.push(Op::Replace {
            path: path.clone(),
            value: after.clone(),
            original_value: record.then(|| before.clone()),
        }),
    }
}

/// Apply ops in order to a snapshot, producing a new snapshot.
pub fn apply(snapshot: &Snapshot, ops: &[Op]) -> Result<Snapshot, ApplyError> {
    match apply_value(snapshot.to_value(), ops)? {
        Value::Object(fields) => Ok(Snapshot::from_document(fields)),
        _ => Err(ApplyError::NotAnObject),
    }
}

/// Apply ops in order to an arbitrary JSON value.
pub fn apply_value(mut target: Value, ops: &[Op]) -> Result<Value, ApplyError> {
    for op in ops {
        apply_one(&mut target, op)?;
    }
    Ok(target)
}

fn apply_one(target: &mut Value, op: &Op) -> Result<(), ApplyError> {
    let path = op.path();
    let mut tokens = path.tokens();
    let Some(last) = tokens.pop() else {
        return match op {
            Op::Add { value, .. } | Op::Replace { value, .. } => {
                *target = value.clone();
                Ok(())
            }
            Op::Remove { .. } => Err(ApplyError::RemoveRoot),
        };
    };

    let parent_path = tokens.iter().fold(Pointer::root(), |p, t| p.child(t));
    let parent = target
        .pointer_mut(parent_path.as_str())
        .ok_or_else(|| ApplyError::MissingTarget(path.clone()))?;

    match parent {
        Value::Object(map) => match op {
            Op::Add { value, .. } => {
                map.insert(last, value.clone());
            }
            Op::Remove { .. } => {
                map.remove(&last)
                    .ok_or_else(|| ApplyError::MissingTarget(path.clone()))?;
            }
            Op::Replace { value, .. } => {
                let slot = map
                    .get_mut(&last)
                    .ok_or_else(|| ApplyError::MissingTarget(path.clone()))?;
                *slot = value.clone();
            }
        },
        Value::Array(items) => {
            let len = items.len();
            match op {
                Op::Add { value, .. } => {
                    let index = if last == "-" {
                        len
                    } else {
                        parse_index(path, &last)?
                    };
                    if index > len {
                        return Err(ApplyError::IndexOutOfBounds {
                            path: path.clone(),
                            index,
                            len,
                        });
                    }
                    items.insert(index, value.clone());
                }
                Op::Remove { .. } => {
                    let index = parse_index(path, &last)?;
                    if index >= len {
                        return Err(ApplyError::IndexOutOfBounds {
                            path: path.clone(),
                            index,
                            len,
                        });
                    }
                    items.remove(index);
                }
                Op::Replace { value, .. } => {
                    let index = parse_index(path, &last)?;
                    let slot = items.get_mut(index).ok_or(ApplyError::IndexOutOfBounds {
                        path: path.clone(),
                        index,
                        len,
                    })?;
                    *slot = value.clone();
                }
            }
        }
        _ => return Err(ApplyError::NotAContainer(path.clone())),
    }
    Ok(())
}

fn parse_index(path: &Pointer, token: &str) -> Result<usize, ApplyError> {
    let well_formed = !token.is_empty()
        && token.bytes().all(|b| b.is_ascii_digit())
        && (token == "0" || !token.starts_with('0'));
    if !well_formed {
        return Err(ApplyError::InvalidIndex {
            path: path.clone(),
            token: token.to_owned(),
        });
    }
    token.parse().map_err(|_| ApplyError::InvalidIndex {
        path: path.clone(),
        token: token.to_owned(),
    })
}
