//! Wire protocol types for push and pull.

use driftkv_core::PatchOperation;
use serde::{Deserialize, Serialize};

/// Body POSTed to `<diffServerURL>/pull`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// Data-layer credential, forwarded by the diff server to the client view.
    pub client_view_auth: String,
    /// This database's client ID.
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// State ID of the snapshot the patch should be computed against.
    #[serde(rename = "baseStateID")]
    pub base_state_id: String,
    /// Checksum of that snapshot's keyspace.
    pub checksum: String,
}

/// Body of a 200 pull response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// State ID of the new server state.
    #[serde(rename = "stateID")]
    pub state_id: String,
    /// Last mutation the server had applied when producing this state.
    #[serde(rename = "lastMutationID")]
    pub last_mutation_id: u64,
    /// Patch to apply over the base snapshot's keyspace.
    #[serde(default)]
    pub patch: Vec<PatchOperation>,
    /// Expected checksum of the patched keyspace.
    pub checksum: String,
    /// How the diff server's fetch of the client view went.
    #[serde(default)]
    pub client_view_info: ClientViewInfo,
}

/// Outcome of the diff server's request to the data layer's client view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientViewInfo {
    /// HTTP status the client view returned to the diff server.
    pub http_status_code: u16,
    /// Error message, if any.
    #[serde(default)]
    pub error_message: String,
}

/// Body POSTed to the batch push endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPushRequest {
    /// This database's client ID.
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// Pending mutations, in ascending mutation-ID order.
    pub mutations: Vec<Mutation>,
}

/// One mutation, as pushed and as handed back for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    /// The mutation ID.
    pub id: u64,
    /// Mutator name.
    pub name: String,
    /// Mutator arguments.
    pub args: serde_json::Value,
}

/// Body of a 200 batch push response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPushResponse {
    /// Per-mutation outcomes reported by the data layer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mutation_infos: Vec<MutationInfo>,
}

/// Outcome of one pushed mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationInfo {
    /// The mutation ID.
    pub id: u64,
    /// Error message, if the data layer rejected it.
    #[serde(default)]
    pub error: String,
}

/// Everything observed during the push phase.
///
/// Push failures never abort a sync: a transport failure is recorded with
/// status code 0 and a message, a non-200 with its status and body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchPushInfo {
    /// HTTP status code, or 0 if the request never completed.
    pub http_status_code: u16,
    /// Error message, if anything went wrong.
    #[serde(default)]
    pub error_message: String,
    /// The parsed response, when the push returned 200.
    #[serde(default)]
    pub batch_push_response: BatchPushResponse,
}

/// Correlation and diagnostics for one sync, returned from BeginSync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfo {
    /// Random ID correlating this sync's requests and log lines.
    #[serde(rename = "syncID")]
    pub sync_id: String,
    /// Push-phase outcome; absent when nothing was pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_push_info: Option<BatchPushInfo>,
    /// Pull-phase client view outcome.
    pub client_view_info: ClientViewInfo,
}

/// An instruction to re-execute one local mutation against the sync head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayMutation {
    /// The mutation ID.
    pub id: u64,
    /// Mutator name.
    pub name: String,
    /// Mutator arguments.
    pub args: serde_json::Value,
    /// Hash of the local commit being replayed.
    pub original: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_request_wire_shape() {
        let req = PullRequest {
            client_view_auth: "dl-auth".into(),
            client_id: "c1".into(),
            base_state_id: "s1".into(),
            checksum: "00000000".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "clientViewAuth": "dl-auth",
                "clientID": "c1",
                "baseStateID": "s1",
                "checksum": "00000000",
            })
        );
    }

    #[test]
    fn pull_response_parses_wire_json() {
        let resp: PullResponse = serde_json::from_str(
            r#"{
                "stateID": "s2",
                "lastMutationID": 3,
                "patch": [{"op": "add", "path": "/k", "value": 1}],
                "checksum": "c4e7090d",
                "clientViewInfo": {"httpStatusCode": 200, "errorMessage": ""}
            }"#,
        )
        .unwrap();
        assert_eq!(resp.state_id, "s2");
        assert_eq!(resp.last_mutation_id, 3);
        assert_eq!(resp.patch.len(), 1);
        assert_eq!(resp.client_view_info.http_status_code, 200);
    }

    #[test]
    fn push_request_wire_shape() {
        let req = BatchPushRequest {
            client_id: "c1".into(),
            mutations: vec![Mutation {
                id: 1,
                name: "setValue".into(),
                args: serde_json::json!(["k", 1]),
            }],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "clientID": "c1",
                "mutations": [{"id": 1, "name": "setValue", "args": ["k", 1]}],
            })
        );
    }

    #[test]
    fn sync_info_omits_absent_push_info() {
        let info = SyncInfo {
            sync_id: "abc".into(),
            batch_push_info: None,
            client_view_info: ClientViewInfo::default(),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("batchPushInfo").is_none());
        assert_eq!(json["syncID"], "abc");
    }

    #[test]
    fn batch_push_response_defaults() {
        let resp: BatchPushResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.mutation_infos.is_empty());
    }
}
