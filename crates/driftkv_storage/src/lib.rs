//! # driftkv storage
//!
//! Content-addressed chunk storage for driftkv.
//!
//! A [`ChunkStore`] is an opaque blob store addressed by the SHA-256 hash of
//! chunk contents, plus a small set of named, mutable head references. The
//! engine owns all chunk format interpretation; stores never inspect the
//! bytes they hold.
//!
//! ## Available stores
//!
//! - [`MemoryStore`] - for tests and ephemeral databases
//! - [`FileStore`] - persistent storage, one directory per database
//!
//! ## Example
//!
//! ```rust
//! use driftkv_storage::{ChunkStore, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let hash = store.put(b"hello world").unwrap();
//! assert_eq!(store.get(&hash).unwrap().as_deref(), Some(&b"hello world"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod hash;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::{FileStore, StoreConfig};
pub use hash::Hash;
pub use memory::MemoryStore;
pub use store::ChunkStore;
