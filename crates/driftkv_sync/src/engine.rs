//! BeginSync / MaybeEndSync orchestration.

use crate::error::{SyncError, SyncResult};
use crate::http::ReqwestClient;
use crate::protocol::{Mutation, PullRequest, ReplayMutation, SyncInfo};
use crate::pull::{HttpPuller, Puller};
use crate::push::{HttpPusher, Pusher};
use driftkv_core::{
    base_snapshot, pending_commits, read_commit, write_commit, Checksum, Commit, Database,
};
use driftkv_storage::Hash;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Inputs to [`SyncEngine::begin_sync`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginSyncRequest {
    /// Batch push endpoint of the data layer.
    #[serde(rename = "batchPushURL")]
    pub batch_push_url: String,
    /// Base URL of the diff server; `/pull` is appended.
    #[serde(rename = "diffServerURL")]
    pub diff_server_url: String,
    /// Credential sent to the diff server.
    pub diff_server_auth: String,
    /// Credential sent to the data layer (directly on push, forwarded on pull).
    pub data_layer_auth: String,
}

/// Outcome of [`SyncEngine::begin_sync`].
#[derive(Debug, Clone)]
pub struct BeginSyncResult {
    /// The dangling snapshot to finalize with MaybeEndSync, or `None` when
    /// the server had nothing new.
    pub sync_head: Option<Hash>,
    /// Correlation ID and per-phase diagnostics.
    pub sync_info: SyncInfo,
}

/// Drives the two-phase sync protocol for one database.
pub struct SyncEngine {
    db: Arc<Database>,
    pusher: Box<dyn Pusher>,
    puller: Box<dyn Puller>,
    syncing: AtomicBool,
}

/// Releases the sync-in-progress flag when a sync leaves scope.
struct SyncFlagGuard<'a>(&'a AtomicBool);

impl Drop for SyncFlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncEngine {
    /// Creates an engine with the default HTTP pusher and puller.
    pub fn new(db: Arc<Database>) -> SyncResult<Self> {
        let push_client = ReqwestClient::new()?;
        let pull_client = ReqwestClient::new()?;
        Ok(Self::with_remotes(
            db,
            Box::new(HttpPusher::new(push_client)),
            Box::new(HttpPuller::new(pull_client)),
        ))
    }

    /// Creates an engine with caller-supplied remotes. Tests use this with
    /// [`crate::FakePusher`] and [`crate::FakePuller`].
    #[must_use]
    pub fn with_remotes(
        db: Arc<Database>,
        pusher: Box<dyn Pusher>,
        puller: Box<dyn Puller>,
    ) -> Self {
        Self {
            db,
            pusher,
            puller,
            syncing: AtomicBool::new(false),
        }
    }

    /// Pushes pending mutations, pulls a new snapshot, and returns the
    /// dangling sync head.
    ///
    /// Push failures are recorded in the returned [`SyncInfo`] and never
    /// abort the sync. A pull that reports the base snapshot's own state ID
    /// means "no new data" and yields `sync_head: None`.
    pub fn begin_sync(&self, request: &BeginSyncRequest) -> SyncResult<BeginSyncResult> {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::SyncInProgress);
        }
        let _flag = SyncFlagGuard(&self.syncing);

        let sync_id: String = rand::thread_rng()
            .sample_iter(Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();
        info!(sync_id = %sync_id, "begin sync");

        let store = self.db.store().clone();
        let head = self.db.head();

        // Push phase.
        let pending = pending_commits(store.as_ref(), &head)?;
        let batch_push_info = if pending.is_empty() {
            None
        } else {
            let mut mutations = Vec::with_capacity(pending.len());
            for commit in &pending {
                if let Some((name, args)) = commit.mutation() {
                    mutations.push(Mutation {
                        id: commit.mutation_id(),
                        name: name.to_string(),
                        args: serde_json::Value::from(args),
                    });
                }
            }
            let push_info = self.pusher.push(
                &mutations,
                &request.batch_push_url,
                &request.data_layer_auth,
                self.db.client_id(),
            );
            if !push_info.error_message.is_empty() {
                warn!(sync_id = %sync_id, error = %push_info.error_message,
                    "batch push failed; continuing with sync");
            }
            Some(push_info)
        };

        // Pull phase.
        let base = base_snapshot(store.as_ref(), &head)?;
        let base_state_id = base.server_state_id().unwrap_or_default().to_string();
        let pull_request = PullRequest {
            client_view_auth: request.data_layer_auth.clone(),
            client_id: self.db.client_id().to_string(),
            base_state_id: base_state_id.clone(),
            checksum: base.checksum().to_string(),
        };
        let pull_url = format!("{}/pull", request.diff_server_url);
        let response = self
            .puller
            .pull(&pull_request, &pull_url, &request.diff_server_auth)?;

        let sync_info = SyncInfo {
            sync_id: sync_id.clone(),
            batch_push_info,
            client_view_info: response.client_view_info.clone(),
        };

        if response.last_mutation_id < base.mutation_id() {
            return Err(SyncError::MutationIdRegression {
                got: response.last_mutation_id,
                expected: base.mutation_id(),
            });
        }

        if response.state_id == base_state_id {
            // Nothing new on the server; not an error.
            debug!(sync_id = %sync_id, state_id = %base_state_id, "server state unchanged");
            return Ok(BeginSyncResult {
                sync_head: None,
                sync_info,
            });
        }

        let base_map = base.data(store.as_ref())?;
        let patched = driftkv_core::apply_patch(&base_map, &response.patch)?;

        let expected = Checksum::parse(&response.checksum).map_err(|_| {
            SyncError::invalid_response(format!(
                "response checksum malformed: {}",
                response.checksum
            ))
        })?;
        if patched.checksum() != expected {
            return Err(SyncError::ChecksumMismatch {
                expected: response.checksum.clone(),
                got: patched.checksum().to_string(),
            });
        }

        let data_ref = store.put(&patched.to_chunk()).map_err(driftkv_core::CoreError::from)?;
        let snapshot = Commit::new_snapshot(
            Some(base.hash()),
            response.state_id.clone(),
            data_ref,
            patched.checksum(),
            response.last_mutation_id,
        );
        write_commit(store.as_ref(), &snapshot)?;

        info!(sync_id = %sync_id, sync_head = %snapshot.hash(), state_id = %response.state_id,
            "pulled new snapshot");

        Ok(BeginSyncResult {
            sync_head: Some(snapshot.hash()),
            sync_info,
        })
    }

    /// Finalizes a sync, or returns the mutations the host must replay
    /// against `sync_head` first.
    ///
    /// Earlier protocol versions disagreed on whether the engine or the
    /// caller tracks the tip across replay rounds; here the caller advances
    /// `sync_head` to the newest replay commit and invokes this again.
    pub fn maybe_end_sync(
        &self,
        sync_head: Hash,
        sync_id: &str,
    ) -> SyncResult<Vec<ReplayMutation>> {
        let store = self.db.store().clone();
        let sync_head_commit = read_commit(store.as_ref(), sync_head)?;

        let mut head_guard = self.db.lock_head();
        let head = head_guard.commit().clone();

        // Stop if someone landed a sync since this one started: the sync
        // snapshot's basis must still be the base snapshot of master.
        let sync_snapshot = base_snapshot(store.as_ref(), &sync_head_commit)?;
        let sync_snapshot_basis = sync_snapshot.basis_hash();
        let head_snapshot = base_snapshot(store.as_ref(), &head)?;
        if sync_snapshot_basis != Some(head_snapshot.hash()) {
            return Err(SyncError::NewerSnapshot {
                head_snapshot: head_snapshot.hash(),
            });
        }

        let pending = pending_commits(store.as_ref(), &head)?;
        let mut replay = Vec::new();
        for commit in pending
            .iter()
            .filter(|c| c.mutation_id() > sync_head_commit.mutation_id())
        {
            if let Some((name, args)) = commit.mutation() {
                replay.push(ReplayMutation {
                    id: commit.mutation_id(),
                    name: name.to_string(),
                    args: serde_json::Value::from(args),
                    original: commit.hash().to_string(),
                });
            }
        }
        if !replay.is_empty() {
            debug!(sync_id = %sync_id, count = replay.len(), "mutations to replay");
            return Ok(replay);
        }

        // Sync is complete. The sync head dangles from master, so this is a
        // plain head move under the lock, not a fast-forward.
        head_guard.set(sync_head_commit)?;
        info!(sync_id = %sync_id, head = %sync_head, "sync finalized");
        Ok(Vec::new())
    }
}

/// A puller that blocks until released, for exercising the sync lock.
#[cfg(test)]
pub(crate) struct BlockingPuller {
    pub(crate) entered: std::sync::mpsc::SyncSender<()>,
    pub(crate) release: parking_lot::Mutex<std::sync::mpsc::Receiver<()>>,
}

#[cfg(test)]
impl Puller for BlockingPuller {
    fn pull(
        &self,
        _request: &PullRequest,
        _url: &str,
        _diff_server_auth: &str,
    ) -> SyncResult<crate::protocol::PullResponse> {
        let _ = self.entered.send(());
        let _ = self.release.lock().recv();
        Ok(crate::protocol::PullResponse::default())
    }
}
