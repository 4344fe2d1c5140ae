//! Read/write transactions over a basis commit.

use crate::commit::{write_commit, Commit};
use crate::db::Database;
use crate::error::{CoreError, CoreResult};
use crate::kvmap::ChecksummedMap;
use crate::scan::{scan, ScanItem, ScanOptions};
use driftkv_codec::{parse, to_canonical_vec, Value};
use driftkv_storage::Hash;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A read and write transaction.
///
/// A transaction captures its basis commit at construction and edits a
/// private copy of the keyspace, so readers opened before a concurrent
/// commit keep seeing the old state. Changes only reach the database at
/// [`commit`], which writes a new local commit and fast-forwards the head;
/// if the head moved underneath, commit fails with
/// [`CoreError::MergeNeeded`] and the caller retries.
///
/// Transactions are thread safe: reads take the state read lock, writes and
/// close/commit take the write lock. After `commit` or `close`, every
/// operation fails with [`CoreError::TransactionClosed`].
///
/// [`commit`]: Transaction::commit
#[derive(Debug)]
pub struct Transaction {
    db: Arc<Database>,
    basis: Commit,
    name: String,
    args: Value,
    /// The local commit being replayed; `None` for ordinary transactions.
    original: Option<Commit>,
    state: RwLock<TxState>,
}

#[derive(Debug)]
struct TxState {
    map: ChecksummedMap,
    wrote: bool,
    closed: bool,
}

impl Transaction {
    /// Opens an ordinary transaction against the current head.
    pub fn new(db: Arc<Database>) -> CoreResult<Self> {
        let basis = db.head();
        Self::build(db, basis, String::new(), Value::Null, None)
    }

    /// Opens an ordinary transaction recording a mutator name and args.
    pub fn with_mutation(
        db: Arc<Database>,
        name: impl Into<String>,
        args: Value,
    ) -> CoreResult<Self> {
        let basis = db.head();
        Self::build(db, basis, name.into(), args, None)
    }

    /// Opens a replay transaction: the supplied sync-head commit is the
    /// basis and `original` is the local commit being re-executed.
    pub fn replay(
        db: Arc<Database>,
        name: impl Into<String>,
        args: Value,
        basis: Commit,
        original: Commit,
    ) -> CoreResult<Self> {
        let name = name.into();
        validate_replay(&original, &name, &args, basis.next_mutation_id())?;
        Self::build(db, basis, name, args, Some(original))
    }

    fn build(
        db: Arc<Database>,
        basis: Commit,
        name: String,
        args: Value,
        original: Option<Commit>,
    ) -> CoreResult<Self> {
        let map = basis.data(db.store().as_ref())?;
        Ok(Self {
            db,
            basis,
            name,
            args,
            original,
            state: RwLock::new(TxState {
                map,
                wrote: false,
                closed: false,
            }),
        })
    }

    /// Checks whether this is a replay transaction.
    #[must_use]
    pub fn is_replay(&self) -> bool {
        self.original.is_some()
    }

    /// Returns the basis commit.
    #[must_use]
    pub fn basis(&self) -> &Commit {
        &self.basis
    }

    /// Returns true once the transaction has been committed or closed.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.state.read().closed
    }

    /// Checks whether the key is present.
    pub fn has(&self, key: &str) -> CoreResult<bool> {
        let state = self.state.read();
        if state.closed {
            return Err(CoreError::TransactionClosed);
        }
        Ok(state.map.has(key))
    }

    /// Returns the canonical JSON bytes of the value at `key`.
    pub fn get(&self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        let state = self.state.read();
        if state.closed {
            return Err(CoreError::TransactionClosed);
        }
        Ok(state.map.get(key).map(to_canonical_vec))
    }

    /// Scans the transaction's view of the keyspace.
    pub fn scan(&self, opts: &ScanOptions) -> CoreResult<Vec<ScanItem>> {
        let state = self.state.read();
        if state.closed {
            return Err(CoreError::TransactionClosed);
        }
        Ok(scan(&state.map, opts))
    }

    /// Parses `json` and stores it at `key`.
    pub fn put(&self, key: &str, json: &[u8]) -> CoreResult<()> {
        if json.is_empty() {
            return Err(CoreError::invalid_argument("value field is required"));
        }
        // Historically the empty key behaved differently from version to
        // version; it is rejected outright here.
        if key.is_empty() {
            return Err(CoreError::invalid_argument("key must be non-empty"));
        }
        let value = parse(json)?;

        let mut state = self.state.write();
        if state.closed {
            return Err(CoreError::TransactionClosed);
        }
        state.map.set(key.to_string(), value);
        state.wrote = true;
        Ok(())
    }

    /// Removes `key`, returning whether it existed.
    pub fn del(&self, key: &str) -> CoreResult<bool> {
        let mut state = self.state.write();
        if state.closed {
            return Err(CoreError::TransactionClosed);
        }
        let existed = state.map.remove(key);
        if existed {
            state.wrote = true;
        }
        Ok(existed)
    }

    /// Closes the transaction, discarding any edits.
    pub fn close(&self) -> CoreResult<()> {
        let mut state = self.state.write();
        if state.closed {
            return Err(CoreError::TransactionClosed);
        }
        state.closed = true;
        Ok(())
    }

    /// Commits the transaction.
    ///
    /// Returns the new commit's hash, or the zero hash if nothing was
    /// written. Ordinary commits fast-forward the head; replay commits are
    /// written dangling and the sync engine decides when the replayed
    /// branch becomes head.
    pub fn commit(&self) -> CoreResult<Hash> {
        let mut state = self.state.write();
        if state.closed {
            return Err(CoreError::TransactionClosed);
        }
        state.closed = true;

        if !state.wrote {
            return Ok(Hash::ZERO);
        }

        let store = self.db.store().as_ref();
        let data_ref = store.put(&state.map.to_chunk())?;
        let checksum = state.map.checksum();
        let date = unix_seconds();

        if let Some(original) = &self.original {
            // The open-time check already ran, but the commit is the last
            // line of defense against a caller that mutated its inputs.
            validate_replay(original, &self.name, &self.args, self.basis.next_mutation_id())?;
            let commit = Commit::new_local(
                self.basis.hash(),
                self.basis.next_mutation_id(),
                date,
                self.name.clone(),
                self.args.clone(),
                data_ref,
                checksum,
                Some(original.hash()),
            );
            write_commit(store, &commit)?;
            return Ok(commit.hash());
        }

        let commit = Commit::new_local(
            self.basis.hash(),
            self.basis.next_mutation_id(),
            date,
            self.name.clone(),
            self.args.clone(),
            data_ref,
            checksum,
            None,
        );
        write_commit(store, &commit)?;
        self.db.set_head_fast_forward(&commit)?;
        Ok(commit.hash())
    }
}

/// Validates replay parameters against the original commit.
pub fn validate_replay(
    original: &Commit,
    name: &str,
    args: &Value,
    mutation_id: u64,
) -> CoreResult<()> {
    let Some((original_name, original_args)) = original.mutation() else {
        return Err(CoreError::invalid_replay(format!(
            "only local mutations can be replayed; {} is a snapshot",
            original.hash()
        )));
    };
    if name != original_name {
        return Err(CoreError::invalid_replay(format!(
            "invalid replay: names do not match, got {name:?}, expected {original_name:?}"
        )));
    }
    if args != original_args {
        return Err(CoreError::invalid_replay("invalid replay: args do not match"));
    }
    if mutation_id != original.mutation_id() {
        return Err(CoreError::invalid_replay(
            "invalid replay: mutation IDs do not match",
        ));
    }
    Ok(())
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit::read_commit;
    use driftkv_storage::MemoryStore;

    fn open_db() -> Arc<Database> {
        Arc::new(Database::open(Arc::new(MemoryStore::new())).unwrap())
    }

    #[test]
    fn put_commit_get() {
        let db = open_db();

        let tx = Transaction::new(db.clone()).unwrap();
        tx.put("foo", br#""bar""#).unwrap();
        let hash = tx.commit().unwrap();
        assert!(!hash.is_zero());
        assert_eq!(db.root_hash(), hash);

        let tx = Transaction::new(db.clone()).unwrap();
        assert_eq!(tx.get("foo").unwrap(), Some(br#""bar""#.to_vec()));
        assert!(tx.has("foo").unwrap());
        tx.close().unwrap();
    }

    #[test]
    fn read_only_commit_is_noop() {
        let db = open_db();
        let before = db.root_hash();

        let tx = Transaction::new(db.clone()).unwrap();
        assert!(!tx.has("anything").unwrap());
        let hash = tx.commit().unwrap();

        assert!(hash.is_zero());
        assert_eq!(db.root_hash(), before);
    }

    #[test]
    fn del_returns_existence() {
        let db = open_db();
        let tx = Transaction::new(db.clone()).unwrap();
        tx.put("k", b"1").unwrap();
        tx.commit().unwrap();

        let tx = Transaction::new(db.clone()).unwrap();
        assert!(tx.del("k").unwrap());
        assert!(!tx.del("k").unwrap());
        tx.commit().unwrap();

        let tx = Transaction::new(db).unwrap();
        assert!(!tx.has("k").unwrap());
    }

    #[test]
    fn del_of_missing_key_does_not_commit() {
        let db = open_db();
        let before = db.root_hash();
        let tx = Transaction::new(db.clone()).unwrap();
        assert!(!tx.del("absent").unwrap());
        assert!(tx.commit().unwrap().is_zero());
        assert_eq!(db.root_hash(), before);
    }

    #[test]
    fn snapshot_isolation() {
        let db = open_db();

        let reader = Transaction::new(db.clone()).unwrap();

        let writer = Transaction::new(db.clone()).unwrap();
        writer.put("k", b"1").unwrap();
        writer.commit().unwrap();

        // The reader still sees the pre-commit state.
        assert!(!reader.has("k").unwrap());
        reader.close().unwrap();

        let fresh = Transaction::new(db).unwrap();
        assert!(fresh.has("k").unwrap());
    }

    #[test]
    fn concurrent_commit_conflicts() {
        let db = open_db();

        let tx1 = Transaction::new(db.clone()).unwrap();
        tx1.put("a", b"1").unwrap();
        let tx2 = Transaction::new(db.clone()).unwrap();
        tx2.put("b", b"2").unwrap();

        let h1 = tx1.commit().unwrap();
        assert_eq!(db.root_hash(), h1);

        let err = tx2.commit().unwrap_err();
        assert!(matches!(err, CoreError::MergeNeeded));
        assert_eq!(db.root_hash(), h1);
    }

    #[test]
    fn operations_fail_after_close() {
        let db = open_db();
        let tx = Transaction::new(db).unwrap();
        tx.close().unwrap();

        assert!(matches!(tx.has("k"), Err(CoreError::TransactionClosed)));
        assert!(matches!(tx.get("k"), Err(CoreError::TransactionClosed)));
        assert!(matches!(tx.put("k", b"1"), Err(CoreError::TransactionClosed)));
        assert!(matches!(tx.del("k"), Err(CoreError::TransactionClosed)));
        assert!(matches!(tx.commit(), Err(CoreError::TransactionClosed)));
        assert!(matches!(tx.close(), Err(CoreError::TransactionClosed)));
        assert!(tx.closed());
    }

    #[test]
    fn put_rejects_empty_value_and_key() {
        let db = open_db();
        let tx = Transaction::new(db).unwrap();

        let err = tx.put("k", b"").unwrap_err();
        assert_eq!(err.to_string(), "value field is required");

        assert!(tx.put("", b"1").is_err());
    }

    #[test]
    fn put_rejects_invalid_json() {
        let db = open_db();
        let tx = Transaction::new(db).unwrap();
        assert!(matches!(tx.put("k", b"{oops"), Err(CoreError::Codec(_))));
        // The failed put did not dirty the transaction.
        assert!(tx.commit().unwrap().is_zero());
    }

    #[test]
    fn put_canonicalizes_values() {
        let db = open_db();
        let tx = Transaction::new(db.clone()).unwrap();
        tx.put("k", br#"{"b": 1, "a": 2.0}"#).unwrap();
        tx.commit().unwrap();

        let tx = Transaction::new(db).unwrap();
        assert_eq!(tx.get("k").unwrap(), Some(br#"{"a":2,"b":1}"#.to_vec()));
    }

    #[test]
    fn commit_records_mutation_metadata() {
        let db = open_db();
        let args = parse(br#"["k",1]"#).unwrap();
        let tx = Transaction::with_mutation(db.clone(), "setValue", args.clone()).unwrap();
        tx.put("k", b"1").unwrap();
        let hash = tx.commit().unwrap();

        let commit = read_commit(db.store().as_ref(), hash).unwrap();
        assert_eq!(commit.mutation(), Some(("setValue", &args)));
        assert_eq!(commit.mutation_id(), 1);
        assert_eq!(commit.original(), None);
    }

    #[test]
    fn replay_commit_does_not_move_head() {
        let db = open_db();

        // One ordinary local commit to act as the replay original.
        let args = parse(br#"["k",1]"#).unwrap();
        let tx = Transaction::with_mutation(db.clone(), "setValue", args.clone()).unwrap();
        tx.put("k", b"1").unwrap();
        let original_hash = tx.commit().unwrap();
        let original = read_commit(db.store().as_ref(), original_hash).unwrap();

        // A sync snapshot to replay onto.
        let genesis = crate::base_snapshot(db.store().as_ref(), &db.head()).unwrap();
        let sync_snapshot = Commit::new_snapshot(
            Some(genesis.hash()),
            "s1",
            genesis.data_ref(),
            genesis.checksum(),
            0,
        );
        write_commit(db.store().as_ref(), &sync_snapshot).unwrap();

        let head_before = db.root_hash();
        let tx = Transaction::replay(
            db.clone(),
            "setValue",
            args,
            sync_snapshot.clone(),
            original.clone(),
        )
        .unwrap();
        tx.put("k", b"1").unwrap();
        let replay_hash = tx.commit().unwrap();

        assert!(!replay_hash.is_zero());
        assert_eq!(db.root_hash(), head_before);

        let replayed = read_commit(db.store().as_ref(), replay_hash).unwrap();
        assert_eq!(replayed.original(), Some(original.hash()));
        assert_eq!(replayed.basis_hash(), Some(sync_snapshot.hash()));
        assert_eq!(replayed.mutation_id(), 1);
    }

    #[test]
    fn replay_validation_rejects_mismatches() {
        let db = open_db();
        let args = parse(br#"["k",1]"#).unwrap();
        let tx = Transaction::with_mutation(db.clone(), "setValue", args.clone()).unwrap();
        tx.put("k", b"1").unwrap();
        let original = read_commit(db.store().as_ref(), tx.commit().unwrap()).unwrap();
        let basis = db.head();

        // Snapshot originals are not replayable.
        let genesis = crate::base_snapshot(db.store().as_ref(), &basis).unwrap();
        let err =
            Transaction::replay(db.clone(), "setValue", args.clone(), basis.clone(), genesis)
                .unwrap_err();
        assert!(err
            .to_string()
            .contains("only local mutations can be replayed"));

        // Name mismatch.
        let err = Transaction::replay(
            db.clone(),
            "otherName",
            args.clone(),
            original.clone(),
            original.clone(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("names do not match"));

        // Args mismatch.
        let err = Transaction::replay(
            db.clone(),
            "setValue",
            Value::Null,
            original.clone(),
            original.clone(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("args do not match"));

        // Mutation ID mismatch: basis `original` makes next ID 2, not 1.
        let err = Transaction::replay(db, "setValue", args, original.clone(), original)
            .unwrap_err();
        assert!(err.to_string().contains("mutation IDs do not match"));
    }
}
