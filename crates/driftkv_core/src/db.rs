//! Database facade and head management.

use crate::commit::{is_ancestor, read_commit, write_commit, Commit};
use crate::error::{CoreError, CoreResult};
use driftkv_codec::{parse, to_canonical_vec, Value};
use driftkv_storage::{ChunkStore, Hash};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tracing::{debug, info};

/// Name of the master head reference.
pub const MASTER_HEAD: &str = "master";

/// Name of the head holding client-local configuration.
const CONFIG_HEAD: &str = "config";

/// A per-database handle over a chunk store.
///
/// `Database` owns the master head: a mutable pointer to the commit whose
/// subgraph is fully materialized in the store. The head only ever moves by
/// fast-forward for local commits; the sync engine moves it directly (under
/// the same lock) when finalizing a sync, because a sync head is not a
/// descendant of master.
///
/// On first open the database writes a genesis commit: a parentless
/// snapshot over the empty keyspace, and generates a client ID persisted in
/// a dedicated `config` head.
pub struct Database {
    store: Arc<dyn ChunkStore>,
    head: Mutex<Commit>,
    client_id: String,
}

/// Exclusive access to the master head.
///
/// Holding the guard pins the head: no commit or sync finalization can move
/// it until the guard drops. Keep critical sections short and never hold a
/// guard across network I/O.
pub struct HeadGuard<'a> {
    guard: MutexGuard<'a, Commit>,
    store: &'a dyn ChunkStore,
}

impl HeadGuard<'_> {
    /// Returns the pinned head commit.
    #[must_use]
    pub fn commit(&self) -> &Commit {
        &self.guard
    }

    /// Moves the head to `new`, persisting the ref before updating the
    /// cached commit.
    pub fn set(&mut self, new: Commit) -> CoreResult<()> {
        self.store.set_head(MASTER_HEAD, Some(&new.hash()))?;
        debug!(head = %new.hash(), "head advanced");
        *self.guard = new;
        Ok(())
    }
}

impl Database {
    /// Opens a database over the given store, creating the genesis commit
    /// and client ID on first open.
    pub fn open(store: Arc<dyn ChunkStore>) -> CoreResult<Self> {
        let client_id = init_client_id(store.as_ref())?;

        let head = match store.get_head(MASTER_HEAD)? {
            Some(hash) => read_commit(store.as_ref(), hash)?,
            None => {
                let genesis = Commit::genesis(store.as_ref())?;
                write_commit(store.as_ref(), &genesis)?;
                store.set_head(MASTER_HEAD, Some(&genesis.hash()))?;
                genesis
            }
        };

        info!(client_id = %client_id, head = %head.hash(), "database opened");

        Ok(Self {
            store,
            head: Mutex::new(head),
            client_id,
        })
    }

    /// Returns the backing chunk store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    /// Returns this database's persisted client ID.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns a snapshot of the current head commit.
    #[must_use]
    pub fn head(&self) -> Commit {
        self.head.lock().clone()
    }

    /// Returns the hash of the current head commit.
    #[must_use]
    pub fn root_hash(&self) -> Hash {
        self.head.lock().hash()
    }

    /// Pins the head for a read-check-move critical section.
    #[must_use]
    pub fn lock_head(&self) -> HeadGuard<'_> {
        HeadGuard {
            guard: self.head.lock(),
            store: self.store.as_ref(),
        }
    }

    /// Moves the head to `new` iff the current head is an ancestor of
    /// `new`. This is the sole concurrency control for local commits.
    pub fn set_head_fast_forward(&self, new: &Commit) -> CoreResult<()> {
        let mut guard = self.lock_head();
        if !is_ancestor(self.store.as_ref(), guard.commit().hash(), new.hash())? {
            return Err(CoreError::MergeNeeded);
        }
        guard.set(new.clone())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("client_id", &self.client_id)
            .field("head", &self.head.lock().hash())
            .finish_non_exhaustive()
    }
}

/// Loads the persisted client ID, generating and storing one on first open.
fn init_client_id(store: &dyn ChunkStore) -> CoreResult<String> {
    if let Some(hash) = store.get_head(CONFIG_HEAD)? {
        let bytes = store.get(&hash)?.ok_or_else(|| {
            driftkv_storage::StorageError::corrupt(format!("config chunk {hash} not found"))
        })?;
        let config = parse(&bytes)?;
        if let Some(client_id) = config.get("clientID").and_then(Value::as_str) {
            return Ok(client_id.to_string());
        }
    }

    let client_id = uuid::Uuid::new_v4().simple().to_string();
    let config = Value::object(vec![("clientID".into(), Value::from(client_id.clone()))]);
    let hash = store.put(&to_canonical_vec(&config))?;
    store.set_head(CONFIG_HEAD, Some(&hash))?;
    Ok(client_id)
}
