//! Per-database connection state and request routing.

use crate::error::{ApiError, ApiResult};
use crate::types::{
    BeginSyncResponse, CommitTransactionResponse, DelResponse, GetResponse, GetRootResponse,
    HasResponse, KeyRequest, MaybeEndSyncRequest, MaybeEndSyncResponse, OpenTransactionRequest,
    OpenTransactionResponse, PutRequest, ScanRequest, TransactionRequest,
};
use driftkv_codec::Value;
use driftkv_core::{read_commit, CoreError, Database, Transaction};
use driftkv_storage::Hash;
use driftkv_sync::{BeginSyncRequest, SyncEngine};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One open database: its engine handles, the table of open transactions,
/// and the per-connection request router.
pub struct Connection {
    dir: PathBuf,
    db: Arc<Database>,
    sync: SyncEngine,
    transactions: RwLock<HashMap<u64, Arc<Transaction>>>,
    transaction_counter: AtomicU64,
}

impl Connection {
    /// Creates a connection over an opened database.
    #[must_use]
    pub fn new(db: Arc<Database>, sync: SyncEngine, dir: PathBuf) -> Self {
        Self {
            dir,
            db,
            sync,
            transactions: RwLock::new(HashMap::new()),
            transaction_counter: AtomicU64::new(1),
        }
    }

    /// The directory this connection's store lives in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The underlying database handle.
    #[must_use]
    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Routes one named request to its handler.
    pub fn dispatch(&self, rpc: &str, data: &[u8]) -> ApiResult<Vec<u8>> {
        match rpc {
            "getRoot" => self.dispatch_get_root(data),
            "openTransaction" => self.dispatch_open_transaction(data),
            "closeTransaction" => self.dispatch_close_transaction(data),
            "commitTransaction" => self.dispatch_commit_transaction(data),
            "has" => self.dispatch_has(data),
            "get" => self.dispatch_get(data),
            "scan" => self.dispatch_scan(data),
            "put" => self.dispatch_put(data),
            "del" => self.dispatch_del(data),
            "beginSync" => self.dispatch_begin_sync(data),
            "maybeEndSync" => self.dispatch_maybe_end_sync(data),
            _ => Err(ApiError::UnsupportedRpc(rpc.to_string())),
        }
    }

    fn find_transaction(&self, id: u64) -> ApiResult<Arc<Transaction>> {
        if id == 0 {
            return Err(ApiError::MissingTransactionId);
        }
        self.transactions
            .read()
            .get(&id)
            .cloned()
            .ok_or(ApiError::UnknownTransactionId(id))
    }

    fn remove_transaction(&self, id: u64) {
        self.transactions.write().remove(&id);
    }

    fn dispatch_get_root(&self, data: &[u8]) -> ApiResult<Vec<u8>> {
        let _req: serde_json::Value = parse_request(data)?;
        respond(&GetRootResponse {
            root: self.db.root_hash().to_string(),
        })
    }

    fn dispatch_open_transaction(&self, data: &[u8]) -> ApiResult<Vec<u8>> {
        let req: OpenTransactionRequest = parse_request(data)?;
        let args = req.args.clone().map(Value::from).unwrap_or(Value::Null);

        let tx = match req.rebase_opts {
            Some(opts) if !opts.basis.is_empty() => {
                let store = self.db.store().as_ref();
                let basis = read_commit(store, Hash::parse(&opts.basis)?)?;
                let original = read_commit(store, Hash::parse(&opts.original)?)?;
                Transaction::replay(self.db.clone(), req.name, args, basis, original)?
            }
            _ => {
                if req.name.is_empty() && req.args.is_none() {
                    Transaction::new(self.db.clone())?
                } else {
                    Transaction::with_mutation(self.db.clone(), req.name, args)?
                }
            }
        };

        let transaction_id = self.transaction_counter.fetch_add(1, Ordering::SeqCst);
        self.transactions.write().insert(transaction_id, Arc::new(tx));
        respond(&OpenTransactionResponse { transaction_id })
    }

    fn dispatch_close_transaction(&self, data: &[u8]) -> ApiResult<Vec<u8>> {
        let req: TransactionRequest = parse_request(data)?;
        let tx = self.find_transaction(req.transaction_id)?;
        self.remove_transaction(req.transaction_id);
        tx.close()?;
        respond(&serde_json::json!({}))
    }

    fn dispatch_commit_transaction(&self, data: &[u8]) -> ApiResult<Vec<u8>> {
        let req: TransactionRequest = parse_request(data)?;
        let tx = self.find_transaction(req.transaction_id)?;
        self.remove_transaction(req.transaction_id);

        match tx.commit() {
            Ok(hash) => respond(&CommitTransactionResponse {
                commit_ref: (!hash.is_zero()).then(|| hash.to_string()),
                retry_commit: false,
            }),
            Err(CoreError::MergeNeeded) => respond(&CommitTransactionResponse {
                commit_ref: None,
                retry_commit: true,
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn dispatch_has(&self, data: &[u8]) -> ApiResult<Vec<u8>> {
        let req: KeyRequest = parse_request(data)?;
        let tx = self.find_transaction(req.transaction_id)?;
        respond(&HasResponse {
            has: tx.has(&req.key)?,
        })
    }

    fn dispatch_get(&self, data: &[u8]) -> ApiResult<Vec<u8>> {
        let req: KeyRequest = parse_request(data)?;
        let tx = self.find_transaction(req.transaction_id)?;
        let mut res = GetResponse::default();
        if let Some(bytes) = tx.get(&req.key)? {
            let text = String::from_utf8(bytes)
                .map_err(|e| ApiError::invalid_argument(e.to_string()))?;
            res.has = true;
            res.value = Some(RawValue::from_string(text)?);
        }
        respond(&res)
    }

    fn dispatch_scan(&self, data: &[u8]) -> ApiResult<Vec<u8>> {
        let req: ScanRequest = parse_request(data)?;
        let tx = self.find_transaction(req.transaction_id)?;
        let items = tx.scan(&req.opts)?;
        respond(&items)
    }

    fn dispatch_put(&self, data: &[u8]) -> ApiResult<Vec<u8>> {
        let req: PutRequest = parse_request(data)?;
        let Some(value) = req.value else {
            return Err(ApiError::invalid_argument("value field is required"));
        };
        let tx = self.find_transaction(req.transaction_id)?;
        tx.put(&req.key, value.get().as_bytes())?;
        respond(&serde_json::json!({}))
    }

    fn dispatch_del(&self, data: &[u8]) -> ApiResult<Vec<u8>> {
        let req: KeyRequest = parse_request(data)?;
        let tx = self.find_transaction(req.transaction_id)?;
        respond(&DelResponse {
            ok: tx.del(&req.key)?,
        })
    }

    fn dispatch_begin_sync(&self, data: &[u8]) -> ApiResult<Vec<u8>> {
        let req: BeginSyncRequest = parse_request(data)?;
        let result = self.sync.begin_sync(&req)?;
        respond(&BeginSyncResponse {
            sync_head: result.sync_head.map(|h| h.to_string()),
            sync_info: result.sync_info,
        })
    }

    fn dispatch_maybe_end_sync(&self, data: &[u8]) -> ApiResult<Vec<u8>> {
        let req: MaybeEndSyncRequest = parse_request(data)?;
        let sync_head = Hash::parse(&req.sync_head)?;
        let replay_mutations = self.sync.maybe_end_sync(sync_head, &req.sync_id)?;
        respond(&MaybeEndSyncResponse { replay_mutations })
    }
}

/// Parses a request body; an empty body reads as an empty object.
fn parse_request<T: Default + DeserializeOwned>(data: &[u8]) -> ApiResult<T> {
    if data.is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_slice(data)?)
}

fn respond<T: serde::Serialize>(response: &T) -> ApiResult<Vec<u8>> {
    Ok(serde_json::to_vec(response)?)
}
