//! Chunk store trait definition.

use crate::error::StorageResult;
use crate::hash::Hash;

/// A content-addressed chunk store with named head references.
///
/// Chunk stores are **opaque byte stores**: chunks are written once, keyed
/// by the SHA-256 hash of their contents, and never mutated. Head refs are
/// the only mutable state, each one a name pointing at a chunk hash. The
/// engine owns all chunk format interpretation.
///
/// # Invariants
///
/// - `put` is idempotent: writing identical bytes twice yields the same hash
///   and stores one chunk
/// - `get` returns exactly the bytes previously written under that hash
/// - head updates are atomic with respect to concurrent readers
/// - stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::MemoryStore`] - for testing
/// - [`super::FileStore`] - for persistent storage
pub trait ChunkStore: Send + Sync {
    /// Reads the chunk with the given hash, or `None` if absent.
    fn get(&self, hash: &Hash) -> StorageResult<Option<Vec<u8>>>;

    /// Writes a chunk and returns its content hash.
    fn put(&self, data: &[u8]) -> StorageResult<Hash>;

    /// Checks whether a chunk with the given hash is stored.
    fn has(&self, hash: &Hash) -> StorageResult<bool>;

    /// Reads the named head reference, or `None` if it has never been set.
    fn get_head(&self, name: &str) -> StorageResult<Option<Hash>>;

    /// Sets or clears the named head reference.
    fn set_head(&self, name: &str, hash: Option<&Hash>) -> StorageResult<()>;
}
