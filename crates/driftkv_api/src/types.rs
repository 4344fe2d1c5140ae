//! Request and response shapes of the dispatch API.

use driftkv_core::ScanOptions;
use driftkv_sync::{ReplayMutation, SyncInfo};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;

/// Captures a present field as raw JSON, so that an explicit `null` is not
/// collapsed into "absent" the way a plain `Option` would.
fn present_raw_value<'de, D>(deserializer: D) -> Result<Option<Box<RawValue>>, D::Error>
where
    D: Deserializer<'de>,
{
    Box::<RawValue>::deserialize(deserializer).map(Some)
}

/// `getRoot` response.
#[derive(Debug, Serialize)]
pub struct GetRootResponse {
    /// Hash of the current head commit.
    pub root: String,
}

/// Replay coordinates for `openTransaction`.
#[derive(Debug, Default, Deserialize)]
pub struct RebaseOpts {
    /// Hash of the sync-head commit to use as the basis.
    #[serde(default)]
    pub basis: String,
    /// Hash of the local commit being replayed.
    #[serde(default)]
    pub original: String,
}

/// `openTransaction` request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenTransactionRequest {
    /// Mutator name; empty for plain read/write transactions.
    #[serde(default)]
    pub name: String,
    /// Mutator arguments.
    #[serde(default)]
    pub args: Option<serde_json::Value>,
    /// Present when opening a replay transaction.
    #[serde(default)]
    pub rebase_opts: Option<RebaseOpts>,
}

/// `openTransaction` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenTransactionResponse {
    /// Handle for subsequent operations on this transaction.
    pub transaction_id: u64,
}

/// Request carrying only a transaction ID (`closeTransaction`,
/// `commitTransaction`).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    /// The transaction handle; 0 or absent means missing.
    #[serde(default)]
    pub transaction_id: u64,
}

/// `commitTransaction` response.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitTransactionResponse {
    /// Hash of the new commit; absent for read-only transactions.
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub commit_ref: Option<String>,
    /// Set when the head moved and the host should retry the writes.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retry_commit: bool,
}

/// `has` / `get` / `del` request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRequest {
    /// The transaction handle.
    #[serde(default)]
    pub transaction_id: u64,
    /// The key.
    #[serde(default)]
    pub key: String,
}

/// `has` response.
#[derive(Debug, Serialize)]
pub struct HasResponse {
    /// Whether the key is present.
    pub has: bool,
}

/// `get` response.
#[derive(Debug, Default, Serialize)]
pub struct GetResponse {
    /// Whether the key is present.
    pub has: bool,
    /// The raw JSON value, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Box<RawValue>>,
}

/// `put` request. `value` is raw JSON so that an absent field can be told
/// apart from an explicit `null`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutRequest {
    /// The transaction handle.
    #[serde(default)]
    pub transaction_id: u64,
    /// The key.
    #[serde(default)]
    pub key: String,
    /// The value; required.
    #[serde(default, deserialize_with = "present_raw_value")]
    pub value: Option<Box<RawValue>>,
}

/// `del` response.
#[derive(Debug, Serialize)]
pub struct DelResponse {
    /// Whether the key existed.
    pub ok: bool,
}

/// `scan` request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    /// The transaction handle.
    #[serde(default)]
    pub transaction_id: u64,
    /// Scan options.
    #[serde(flatten)]
    pub opts: ScanOptions,
}

/// `beginSync` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginSyncResponse {
    /// The dangling sync head; absent when the server had nothing new.
    #[serde(rename = "syncHead", skip_serializing_if = "Option::is_none")]
    pub sync_head: Option<String>,
    /// Correlation ID and per-phase diagnostics.
    pub sync_info: SyncInfo,
}

/// `maybeEndSync` request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaybeEndSyncRequest {
    /// The sync head to finalize (possibly advanced past replays).
    #[serde(rename = "syncHead", default)]
    pub sync_head: String,
    /// The sync's correlation ID.
    #[serde(rename = "syncID", default)]
    pub sync_id: String,
}

/// `maybeEndSync` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaybeEndSyncResponse {
    /// Mutations the host must replay; empty means the sync finalized.
    pub replay_mutations: Vec<ReplayMutation>,
}

/// One database known to the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    /// The database's name.
    pub name: String,
}

/// `list` response.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    /// Databases found under the storage directory.
    pub databases: Vec<DatabaseInfo>,
}
