//! The content-addressed commit graph.

use crate::checksum::Checksum;
use crate::error::{CoreError, CoreResult};
use crate::kvmap::ChecksummedMap;
use driftkv_codec::{parse, to_canonical_vec, Value};
use driftkv_storage::{ChunkStore, Hash};

/// What a commit records: a snapshot received from the remote, or one local
/// mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitMeta {
    /// A base state from the remote.
    Snapshot {
        /// The last mutation the server had applied when producing this state.
        last_mutation_id: u64,
        /// Opaque identifier of the remote state.
        server_state_id: String,
    },
    /// One local mutation.
    Local {
        /// This mutation's ID, strictly monotonic along the local chain.
        mutation_id: u64,
        /// Seconds since the Unix epoch at commit time.
        date: u64,
        /// Mutator name.
        name: String,
        /// Mutator arguments, canonical.
        args: Value,
        /// The commit this one replays, if any.
        original: Option<Hash>,
    },
}

/// An immutable commit.
///
/// A commit's identity is the content hash of its canonical serialization;
/// it is computed once at construction (or load) and never changes.
#[derive(Debug, Clone)]
pub struct Commit {
    parents: Vec<Hash>,
    meta: CommitMeta,
    data_ref: Hash,
    checksum: Checksum,
    hash: Hash,
}

impl PartialEq for Commit {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Commit {}

impl Commit {
    /// Creates a snapshot commit.
    #[must_use]
    pub fn new_snapshot(
        basis: Option<Hash>,
        server_state_id: impl Into<String>,
        data_ref: Hash,
        checksum: Checksum,
        last_mutation_id: u64,
    ) -> Self {
        Self::seal(
            basis.into_iter().collect(),
            CommitMeta::Snapshot {
                last_mutation_id,
                server_state_id: server_state_id.into(),
            },
            data_ref,
            checksum,
        )
    }

    /// Creates a local mutation commit.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new_local(
        basis: Hash,
        mutation_id: u64,
        date: u64,
        name: impl Into<String>,
        args: Value,
        data_ref: Hash,
        checksum: Checksum,
        original: Option<Hash>,
    ) -> Self {
        Self::seal(
            vec![basis],
            CommitMeta::Local {
                mutation_id,
                date,
                name: name.into(),
                args,
                original,
            },
            data_ref,
            checksum,
        )
    }

    /// Creates the genesis commit over an empty keyspace chunk.
    pub fn genesis(store: &dyn ChunkStore) -> CoreResult<Self> {
        let empty = ChecksummedMap::new();
        let data_ref = store.put(&empty.to_chunk())?;
        Ok(Self::new_snapshot(None, "", data_ref, empty.checksum(), 0))
    }

    fn seal(parents: Vec<Hash>, meta: CommitMeta, data_ref: Hash, checksum: Checksum) -> Self {
        let mut commit = Self {
            parents,
            meta,
            data_ref,
            checksum,
            hash: Hash::ZERO,
        };
        commit.hash = Hash::of(&commit.to_chunk());
        commit
    }

    /// Returns the commit's content hash.
    #[must_use]
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// Returns the commit's meta.
    #[must_use]
    pub fn meta(&self) -> &CommitMeta {
        &self.meta
    }

    /// Returns the parent hash, if any.
    #[must_use]
    pub fn basis_hash(&self) -> Option<Hash> {
        self.parents.first().copied()
    }

    /// Checks whether this is a snapshot commit.
    #[must_use]
    pub fn is_snapshot(&self) -> bool {
        matches!(self.meta, CommitMeta::Snapshot { .. })
    }

    /// Checks whether this is a local mutation commit.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self.meta, CommitMeta::Local { .. })
    }

    /// Returns the commit's mutation ID: the mutation it records for local
    /// commits, or the last server-applied mutation for snapshots.
    #[must_use]
    pub fn mutation_id(&self) -> u64 {
        match &self.meta {
            CommitMeta::Snapshot {
                last_mutation_id, ..
            } => *last_mutation_id,
            CommitMeta::Local { mutation_id, .. } => *mutation_id,
        }
    }

    /// Returns the mutation ID a child local commit must carry.
    #[must_use]
    pub fn next_mutation_id(&self) -> u64 {
        self.mutation_id() + 1
    }

    /// Returns the server state ID for snapshot commits.
    #[must_use]
    pub fn server_state_id(&self) -> Option<&str> {
        match &self.meta {
            CommitMeta::Snapshot {
                server_state_id, ..
            } => Some(server_state_id),
            CommitMeta::Local { .. } => None,
        }
    }

    /// Returns the mutator name and args for local commits.
    #[must_use]
    pub fn mutation(&self) -> Option<(&str, &Value)> {
        match &self.meta {
            CommitMeta::Local { name, args, .. } => Some((name, args)),
            CommitMeta::Snapshot { .. } => None,
        }
    }

    /// Returns the replayed original's hash for replay commits.
    #[must_use]
    pub fn original(&self) -> Option<Hash> {
        match &self.meta {
            CommitMeta::Local { original, .. } => *original,
            CommitMeta::Snapshot { .. } => None,
        }
    }

    /// Returns the hash of the serialized keyspace chunk.
    #[must_use]
    pub fn data_ref(&self) -> Hash {
        self.data_ref
    }

    /// Returns the keyspace checksum recorded in the commit.
    #[must_use]
    pub fn checksum(&self) -> Checksum {
        self.checksum
    }

    /// Materializes the commit's keyspace, verifying its checksum.
    pub fn data(&self, store: &dyn ChunkStore) -> CoreResult<ChecksummedMap> {
        let bytes = store
            .get(&self.data_ref)?
            .ok_or_else(|| CoreError::corrupt_commit(format!(
                "data chunk {} of commit {} not found",
                self.data_ref, self.hash
            )))?;
        let map = ChecksummedMap::from_chunk(&bytes)?;
        if map.checksum() != self.checksum {
            return Err(CoreError::corrupt_commit(format!(
                "commit {} records checksum {} but its data hashes to {}",
                self.hash,
                self.checksum,
                map.checksum()
            )));
        }
        Ok(map)
    }

    /// Serializes the commit to its canonical chunk form.
    #[must_use]
    pub fn to_chunk(&self) -> Vec<u8> {
        let meta = match &self.meta {
            CommitMeta::Snapshot {
                last_mutation_id,
                server_state_id,
            } => Value::object(vec![
                ("type".into(), Value::from("snapshot")),
                ("lastMutationID".into(), Value::from(*last_mutation_id)),
                ("serverStateID".into(), Value::from(server_state_id.clone())),
            ]),
            CommitMeta::Local {
                mutation_id,
                date,
                name,
                args,
                original,
            } => {
                let mut fields = vec![
                    ("type".into(), Value::from("local")),
                    ("mutationID".into(), Value::from(*mutation_id)),
                    ("date".into(), Value::from(*date)),
                    ("name".into(), Value::from(name.clone())),
                    ("args".into(), args.clone()),
                ];
                if let Some(original) = original {
                    fields.push(("original".into(), Value::from(original.to_string())));
                }
                Value::object(fields)
            }
        };

        let commit = Value::object(vec![
            ("meta".into(), meta),
            (
                "parents".into(),
                Value::Array(
                    self.parents
                        .iter()
                        .map(|p| Value::from(p.to_string()))
                        .collect(),
                ),
            ),
            (
                "value".into(),
                Value::object(vec![
                    ("checksum".into(), Value::from(self.checksum.to_string())),
                    ("data".into(), Value::from(self.data_ref.to_string())),
                ]),
            ),
        ]);

        to_canonical_vec(&commit)
    }

    /// Parses a commit chunk, validating the structural invariants.
    fn from_chunk(bytes: &[u8], hash: Hash) -> CoreResult<Self> {
        let root = parse(bytes).map_err(|e| {
            CoreError::corrupt_commit(format!("commit {hash} is not valid JSON: {e}"))
        })?;

        let corrupt = |message: &str| CoreError::corrupt_commit(format!("commit {hash}: {message}"));

        let parents_value = root.get("parents").ok_or_else(|| corrupt("missing parents"))?;
        let mut parents = Vec::new();
        for entry in parents_value
            .as_array()
            .ok_or_else(|| corrupt("parents is not an array"))?
        {
            let text = entry.as_str().ok_or_else(|| corrupt("parent is not a string"))?;
            parents.push(Hash::parse(text).map_err(|_| corrupt("parent is not a valid hash"))?);
        }
        if parents.len() > 1 {
            return Err(corrupt("more than one parent"));
        }

        let value = root.get("value").ok_or_else(|| corrupt("missing value"))?;
        let checksum_text = value
            .get("checksum")
            .and_then(Value::as_str)
            .ok_or_else(|| corrupt("missing value.checksum"))?;
        let checksum = Checksum::parse(checksum_text)
            .map_err(|_| corrupt("value.checksum is not 8 hex digits"))?;
        let data_text = value
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| corrupt("missing value.data"))?;
        let data_ref = Hash::parse(data_text).map_err(|_| corrupt("value.data is not a valid hash"))?;

        let meta_value = root.get("meta").ok_or_else(|| corrupt("missing meta"))?;
        let meta_type = meta_value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| corrupt("missing meta.type"))?;

        let meta = match meta_type {
            "snapshot" => CommitMeta::Snapshot {
                last_mutation_id: meta_value
                    .get("lastMutationID")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| corrupt("missing meta.lastMutationID"))?,
                server_state_id: meta_value
                    .get("serverStateID")
                    .and_then(Value::as_str)
                    .ok_or_else(|| corrupt("missing meta.serverStateID"))?
                    .to_string(),
            },
            "local" => {
                if parents.is_empty() {
                    return Err(corrupt("local commit has no parent"));
                }
                let original = match meta_value.get("original") {
                    None => None,
                    Some(v) => {
                        let text = v
                            .as_str()
                            .ok_or_else(|| corrupt("meta.original is not a string"))?;
                        Some(Hash::parse(text).map_err(|_| corrupt("meta.original is not a valid hash"))?)
                    }
                };
                CommitMeta::Local {
                    mutation_id: meta_value
                        .get("mutationID")
                        .and_then(Value::as_u64)
                        .ok_or_else(|| corrupt("missing meta.mutationID"))?,
                    date: meta_value
                        .get("date")
                        .and_then(Value::as_u64)
                        .ok_or_else(|| corrupt("missing meta.date"))?,
                    name: meta_value
                        .get("name")
                        .and_then(Value::as_str)
                        .ok_or_else(|| corrupt("missing meta.name"))?
                        .to_string(),
                    args: meta_value
                        .get("args")
                        .cloned()
                        .ok_or_else(|| corrupt("missing meta.args"))?,
                    original,
                }
            }
            other => {
                return Err(corrupt(&format!("unknown meta.type {other:?}")));
            }
        };

        Ok(Self {
            parents,
            meta,
            data_ref,
            checksum,
            hash,
        })
    }
}

/// Writes a commit's chunk to the store. Idempotent by content hash.
pub fn write_commit(store: &dyn ChunkStore, commit: &Commit) -> CoreResult<Hash> {
    let hash = store.put(&commit.to_chunk())?;
    Ok(hash)
}

/// Reads the commit with the given hash.
pub fn read_commit(store: &dyn ChunkStore, hash: Hash) -> CoreResult<Commit> {
    if hash.is_zero() {
        return Err(CoreError::CommitNotFound(hash));
    }
    let bytes = store.get(&hash)?.ok_or(CoreError::CommitNotFound(hash))?;
    Commit::from_chunk(&bytes, hash)
}

/// Walks parents until a snapshot commit is found.
///
/// Every commit reachable from a head has exactly one base snapshot, so
/// this only fails on a corrupt graph.
pub fn base_snapshot(store: &dyn ChunkStore, commit: &Commit) -> CoreResult<Commit> {
    let mut current = commit.clone();
    while !current.is_snapshot() {
        let basis = current
            .basis_hash()
            .ok_or_else(|| CoreError::corrupt_commit(format!(
                "local commit {} has no parent",
                current.hash()
            )))?;
        current = read_commit(store, basis)?;
    }
    Ok(current)
}

/// Returns the local commits between the base snapshot (exclusive) and
/// `head` (inclusive), in ascending mutation-ID order.
pub fn pending_commits(store: &dyn ChunkStore, head: &Commit) -> CoreResult<Vec<Commit>> {
    let mut pending = Vec::new();
    let mut current = head.clone();
    while current.is_local() {
        let basis = current
            .basis_hash()
            .ok_or_else(|| CoreError::corrupt_commit(format!(
                "local commit {} has no parent",
                current.hash()
            )))?;
        let parent = read_commit(store, basis)?;
        pending.push(current);
        current = parent;
    }
    pending.reverse();
    Ok(pending)
}

/// Checks whether `ancestor` lies on the parent chain of `descendant`
/// (inclusive).
pub fn is_ancestor(store: &dyn ChunkStore, ancestor: Hash, descendant: Hash) -> CoreResult<bool> {
    let mut current = descendant;
    loop {
        if current == ancestor {
            return Ok(true);
        }
        match read_commit(store, current)?.basis_hash() {
            Some(parent) => current = parent,
            None => return Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftkv_storage::MemoryStore;

    fn store() -> MemoryStore {
        MemoryStore::new()
    }

    fn put_map(store: &dyn ChunkStore, entries: &[(&str, &str)]) -> (Hash, Checksum) {
        let mut map = ChecksummedMap::new();
        for (k, v) in entries {
            map.set((*k).to_string(), parse(v.as_bytes()).unwrap());
        }
        let data_ref = store.put(&map.to_chunk()).unwrap();
        (data_ref, map.checksum())
    }

    fn local_child(store: &dyn ChunkStore, parent: &Commit, entries: &[(&str, &str)]) -> Commit {
        let (data_ref, checksum) = put_map(store, entries);
        let commit = Commit::new_local(
            parent.hash(),
            parent.next_mutation_id(),
            100,
            "setValue",
            parse(br#"["k","v"]"#).unwrap(),
            data_ref,
            checksum,
            None,
        );
        write_commit(store, &commit).unwrap();
        commit
    }

    #[test]
    fn genesis_shape() {
        let store = store();
        let genesis = Commit::genesis(&store).unwrap();
        assert!(genesis.is_snapshot());
        assert_eq!(genesis.basis_hash(), None);
        assert_eq!(genesis.mutation_id(), 0);
        assert_eq!(genesis.next_mutation_id(), 1);
        assert_eq!(genesis.server_state_id(), Some(""));
        assert_eq!(genesis.checksum().to_string(), "00000000");
    }

    #[test]
    fn hash_is_content_addressed() {
        let store = store();
        let g1 = Commit::genesis(&store).unwrap();
        let g2 = Commit::genesis(&store).unwrap();
        assert_eq!(g1.hash(), g2.hash());

        let (data_ref, checksum) = put_map(&store, &[("k", "1")]);
        let other = Commit::new_snapshot(None, "s1", data_ref, checksum, 7);
        assert_ne!(other.hash(), g1.hash());
    }

    #[test]
    fn write_read_round_trip() {
        let store = store();
        let genesis = Commit::genesis(&store).unwrap();
        let written = write_commit(&store, &genesis).unwrap();
        assert_eq!(written, genesis.hash());

        let loaded = read_commit(&store, written).unwrap();
        assert_eq!(loaded, genesis);
        assert_eq!(loaded.meta(), genesis.meta());
    }

    #[test]
    fn local_round_trip_with_original() {
        let store = store();
        let genesis = Commit::genesis(&store).unwrap();
        write_commit(&store, &genesis).unwrap();
        let first = local_child(&store, &genesis, &[("k", "\"v\"")]);

        let (data_ref, checksum) = put_map(&store, &[("k", "\"v\"")]);
        let replay = Commit::new_local(
            genesis.hash(),
            1,
            200,
            "setValue",
            parse(br#"["k","v"]"#).unwrap(),
            data_ref,
            checksum,
            Some(first.hash()),
        );
        write_commit(&store, &replay).unwrap();

        let loaded = read_commit(&store, replay.hash()).unwrap();
        assert_eq!(loaded.original(), Some(first.hash()));
        assert_eq!(loaded.mutation(), replay.mutation());
    }

    #[test]
    fn read_missing_commit_fails() {
        let store = store();
        let err = read_commit(&store, Hash::of(b"nothing here")).unwrap_err();
        assert!(err.to_string().contains("not found"));

        let err = read_commit(&store, Hash::ZERO).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn read_rejects_corrupt_chunks() {
        let store = store();
        let hash = store.put(b"{\"meta\":{}}").unwrap();
        assert!(matches!(
            read_commit(&store, hash),
            Err(CoreError::CorruptCommit { .. })
        ));

        let hash = store.put(b"[]").unwrap();
        assert!(read_commit(&store, hash).is_err());
    }

    #[test]
    fn mutation_ids_chain() {
        let store = store();
        let genesis = Commit::genesis(&store).unwrap();
        write_commit(&store, &genesis).unwrap();
        let c1 = local_child(&store, &genesis, &[("a", "1")]);
        let c2 = local_child(&store, &c1, &[("a", "1"), ("b", "2")]);

        assert_eq!(c1.mutation_id(), 1);
        assert_eq!(c2.mutation_id(), 2);
    }

    #[test]
    fn base_snapshot_walks_to_snapshot() {
        let store = store();
        let genesis = Commit::genesis(&store).unwrap();
        write_commit(&store, &genesis).unwrap();
        let c1 = local_child(&store, &genesis, &[("a", "1")]);
        let c2 = local_child(&store, &c1, &[("b", "2")]);

        assert_eq!(base_snapshot(&store, &c2).unwrap(), genesis);
        assert_eq!(base_snapshot(&store, &genesis).unwrap(), genesis);
    }

    #[test]
    fn pending_commits_ascending() {
        let store = store();
        let genesis = Commit::genesis(&store).unwrap();
        write_commit(&store, &genesis).unwrap();
        let c1 = local_child(&store, &genesis, &[("a", "1")]);
        let c2 = local_child(&store, &c1, &[("b", "2")]);

        assert!(pending_commits(&store, &genesis).unwrap().is_empty());

        let pending = pending_commits(&store, &c2).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0], c1);
        assert_eq!(pending[1], c2);
    }

    #[test]
    fn ancestry() {
        let store = store();
        let genesis = Commit::genesis(&store).unwrap();
        write_commit(&store, &genesis).unwrap();
        let c1 = local_child(&store, &genesis, &[("a", "1")]);
        let c2 = local_child(&store, &c1, &[("b", "2")]);

        assert!(is_ancestor(&store, genesis.hash(), c2.hash()).unwrap());
        assert!(is_ancestor(&store, c1.hash(), c2.hash()).unwrap());
        assert!(is_ancestor(&store, c2.hash(), c2.hash()).unwrap());
        assert!(!is_ancestor(&store, c2.hash(), c1.hash()).unwrap());
    }

    #[test]
    fn data_verifies_checksum() {
        let store = store();
        let (data_ref, checksum) = put_map(&store, &[("k", "1")]);
        let good = Commit::new_snapshot(None, "s", data_ref, checksum, 0);
        assert_eq!(good.data(&store).unwrap().len(), 1);

        let bad = Commit::new_snapshot(None, "s", data_ref, Checksum::parse("deadbeef").unwrap(), 0);
        assert!(matches!(
            bad.data(&store),
            Err(CoreError::CorruptCommit { .. })
        ));
    }
}
