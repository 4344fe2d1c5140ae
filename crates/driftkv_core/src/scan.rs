//! Range scans over the keyspace.

use crate::kvmap::ChecksummedMap;
use serde::{Deserialize, Serialize};

const DEFAULT_SCAN_LIMIT: u32 = 50;

/// A key-based scan cursor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanId {
    /// Start at the first key >= this value.
    #[serde(default)]
    pub value: String,
    /// Skip the key equal to `value` itself.
    #[serde(default)]
    pub exclusive: bool,
}

/// Where a scan starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanBound {
    /// Key-based cursor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ScanId>,
    /// Positional cursor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
}

/// Options controlling a scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Only yield keys with this prefix; also acts as a lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Starting cursor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<ScanBound>,
    /// Maximum number of items to yield; defaults to 50.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// One scanned entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanItem {
    /// The entry's key.
    pub key: String,
    /// The entry's value.
    pub value: serde_json::Value,
}

/// Scans the map per `opts`.
///
/// The iteration base is whichever of the prefix bound, the key cursor and
/// the positional cursor advances furthest into the ordered key sequence;
/// iteration then stops at end-of-map, after `limit` items, or at the first
/// key that no longer carries the prefix.
#[must_use]
pub fn scan(map: &ChecksummedMap, opts: &ScanOptions) -> Vec<ScanItem> {
    let entries: Vec<_> = map.iter().collect();
    let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();

    let mut start = 0usize;

    if let Some(prefix) = &opts.prefix {
        start = start.max(keys.partition_point(|k| *k < prefix.as_str()));
    }

    if let Some(bound) = &opts.start {
        if let Some(id) = &bound.id {
            if !id.value.is_empty() {
                let mut pos = keys.partition_point(|k| *k < id.value.as_str());
                if id.exclusive && keys.get(pos) == Some(&id.value.as_str()) {
                    pos += 1;
                }
                start = start.max(pos);
            }
        }
        if let Some(index) = bound.index {
            start = start.max(usize::try_from(index).unwrap_or(usize::MAX));
        }
    }

    let limit = opts.limit.unwrap_or(DEFAULT_SCAN_LIMIT) as usize;
    let mut items = Vec::new();

    for (key, value) in entries.into_iter().skip(start) {
        if let Some(prefix) = &opts.prefix {
            if !key.starts_with(prefix.as_str()) {
                break;
            }
        }
        items.push(ScanItem {
            key: key.clone(),
            value: serde_json::Value::from(value),
        });
        if items.len() == limit {
            break;
        }
    }

    items
}
