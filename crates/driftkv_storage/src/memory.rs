//! In-memory chunk store for testing.

use crate::error::StorageResult;
use crate::hash::Hash;
use crate::store::ChunkStore;
use parking_lot::RwLock;
use std::collections::HashMap;

/// An in-memory chunk store.
///
/// Suitable for unit tests, integration tests, and ephemeral databases that
/// don't need persistence. Thread-safe and cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    chunks: RwLock<HashMap<Hash, Vec<u8>>>,
    heads: RwLock<HashMap<String, Hash>>,
}

impl MemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored chunks.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.read().len()
    }
}

impl ChunkStore for MemoryStore {
    fn get(&self, hash: &Hash) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.chunks.read().get(hash).cloned())
    }

    fn put(&self, data: &[u8]) -> StorageResult<Hash> {
        let hash = Hash::of(data);
        self.chunks.write().entry(hash).or_insert_with(|| data.to_vec());
        Ok(hash)
    }

    fn has(&self, hash: &Hash) -> StorageResult<bool> {
        Ok(self.chunks.read().contains_key(hash))
    }

    fn get_head(&self, name: &str) -> StorageResult<Option<Hash>> {
        Ok(self.heads.read().get(name).copied())
    }

    fn set_head(&self, name: &str, hash: Option<&Hash>) -> StorageResult<()> {
        let mut heads = self.heads.write();
        match hash {
            Some(h) => {
                heads.insert(name.to_string(), *h);
            }
            None => {
                heads.remove(name);
            }
        }
        Ok(())
    }
}
