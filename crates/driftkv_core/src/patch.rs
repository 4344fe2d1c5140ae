//! JSON patch application over the keyspace.

use crate::kvmap::ChecksummedMap;
use driftkv_codec::Value;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One operation of a keyspace patch, as received from the diff server.
///
/// Paths address top-level keys only: `"/" + key`. The bare path `"/"` with
/// op `"remove"` clears the whole keyspace and is only legal as the first
/// operation of a patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    /// One of `"add"`, `"replace"`, `"remove"`.
    pub op: String,
    /// `"/" + key`, or `"/"` for a full clear.
    pub path: String,
    /// The value for `"add"`/`"replace"` operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// A patch failed to apply; the keyspace is unchanged.
#[derive(Debug, Error)]
#[error("patch operation {index} ({op} {path}): {message}")]
pub struct PatchError {
    /// Index of the offending operation within the patch.
    pub index: usize,
    /// The operation's `op` field.
    pub op: String,
    /// The operation's `path` field.
    pub path: String,
    /// What went wrong.
    pub message: String,
}

impl PatchError {
    fn new(index: usize, operation: &PatchOperation, message: impl Into<String>) -> Self {
        Self {
            index,
            op: operation.op.clone(),
            path: operation.path.clone(),
            message: message.into(),
        }
    }
}

/// Applies a patch to a copy of `base`, returning the patched map.
///
/// The input map is never modified, so a failed patch leaves the caller's
/// state untouched.
pub fn apply_patch(
    base: &ChecksummedMap,
    patch: &[PatchOperation],
) -> Result<ChecksummedMap, PatchError> {
    let mut map = base.clone();

    for (index, operation) in patch.iter().enumerate() {
        let Some(rest) = operation.path.strip_prefix('/') else {
            return Err(PatchError::new(index, operation, "invalid path"));
        };

        match operation.op.as_str() {
            "add" | "replace" => {
                if rest.is_empty() {
                    return Err(PatchError::new(index, operation, "invalid path"));
                }
                let Some(raw) = &operation.value else {
                    return Err(PatchError::new(index, operation, "missing value"));
                };
                map.set(rest.to_string(), Value::from(raw.clone()));
            }
            "remove" => {
                if rest.is_empty() {
                    // Full clear; only legal as the leading operation.
                    if index != 0 {
                        return Err(PatchError::new(
                            index,
                            operation,
                            "remove of root must be the first operation",
                        ));
                    }
                    map.clear();
                } else if !map.remove(rest) {
                    return Err(PatchError::new(index, operation, "no such key"));
                }
            }
            _ => {
                return Err(PatchError::new(index, operation, "invalid op"));
            }
        }
    }

    Ok(map)
}
