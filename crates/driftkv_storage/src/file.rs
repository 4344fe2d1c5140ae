//! File-backed chunk store.
//!
//! Directory layout, one directory per database:
//!
//! ```text
//! <db_path>/
//! ├─ LOCK              # Advisory lock for single-process access
//! ├─ objects/
//! │  └─ <hex-hash>     # One file per chunk, named by content hash
//! └─ refs/
//!    └─ <name>         # One file per head ref, containing a hex hash
//! ```
//!
//! Chunks are immutable once written; head refs are updated with the
//! write-temp-then-rename pattern so a crash never leaves a torn ref.

use crate::error::{StorageError, StorageResult};
use crate::hash::Hash;
use crate::store::ChunkStore;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const OBJECTS_DIR: &str = "objects";
const REFS_DIR: &str = "refs";

/// Configuration for opening a [`FileStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Create the directory if it doesn't exist.
    pub create_if_missing: bool,
    /// Fsync chunk and ref writes before returning.
    pub sync_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_writes: true,
        }
    }
}

/// A persistent chunk store rooted at a directory.
///
/// Holds an exclusive advisory lock on the directory for its lifetime, so a
/// database directory is only ever served by one process at a time.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    config: StoreConfig,
    /// Lock file handle, held for exclusive access.
    _lock_file: File,
}

impl FileStore {
    /// Opens or creates a file store at the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is missing and `create_if_missing`
    /// is false, if another process holds the lock (`Locked`), or on I/O
    /// failure.
    pub fn open(path: &Path, config: StoreConfig) -> StorageResult<Self> {
        if !path.exists() {
            if config.create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("store directory does not exist: {}", path.display()),
                )));
            }
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        fs::create_dir_all(path.join(OBJECTS_DIR))?;
        fs::create_dir_all(path.join(REFS_DIR))?;

        Ok(Self {
            path: path.to_path_buf(),
            config,
            _lock_file: lock_file,
        })
    }

    /// Returns the store's root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn object_path(&self, hash: &Hash) -> PathBuf {
        self.path.join(OBJECTS_DIR).join(hash.to_string())
    }

    fn ref_path(&self, name: &str) -> PathBuf {
        self.path.join(REFS_DIR).join(name)
    }

    /// Writes `data` to `path` atomically via a temp file sibling.
    fn write_atomic(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        let temp = path.with_extension("tmp");
        let mut file = File::create(&temp)?;
        file.write_all(data)?;
        if self.config.sync_writes {
            file.sync_all()?;
        }
        drop(file);
        fs::rename(&temp, path)?;
        if self.config.sync_writes {
            self.sync_parent(path)?;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn sync_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_parent(&self, _path: &Path) -> StorageResult<()> {
        // NTFS journaling covers metadata durability; directory fsync is
        // not supported on Windows.
        Ok(())
    }
}

impl ChunkStore for FileStore {
    fn get(&self, hash: &Hash) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(self.object_path(hash)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, data: &[u8]) -> StorageResult<Hash> {
        let hash = Hash::of(data);
        let path = self.object_path(&hash);
        // Chunks are immutable, so an existing file is already the content.
        if !path.exists() {
            self.write_atomic(&path, data)?;
        }
        Ok(hash)
    }

    fn has(&self, hash: &Hash) -> StorageResult<bool> {
        Ok(self.object_path(hash).exists())
    }

    fn get_head(&self, name: &str) -> StorageResult<Option<Hash>> {
        match fs::read_to_string(self.ref_path(name)) {
            Ok(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Ok(None);
                }
                let hash = Hash::parse(trimmed).map_err(|_| {
                    StorageError::corrupt(format!("head ref {name} is not a valid hash"))
                })?;
                Ok(Some(hash))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_head(&self, name: &str, hash: Option<&Hash>) -> StorageResult<()> {
        let path = self.ref_path(name);
        match hash {
            Some(h) => self.write_atomic(&path, h.to_string().as_bytes()),
            None => match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_store(path: &Path) -> FileStore {
        FileStore::open(path, StoreConfig::default()).unwrap()
    }

    #[test]
    fn open_creates_layout() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("db");
        let _store = open_store(&db_path);

        assert!(db_path.join("LOCK").exists());
        assert!(db_path.join("objects").is_dir());
        assert!(db_path.join("refs").is_dir());
    }

    #[test]
    fn open_fails_without_create() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("missing");
        let config = StoreConfig {
            create_if_missing: false,
            ..StoreConfig::default()
        };
        assert!(FileStore::open(&db_path, config).is_err());
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("locked");
        let _store = open_store(&db_path);

        let result = FileStore::open(&db_path, StoreConfig::default());
        assert!(matches!(result, Err(StorageError::Locked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("reopen");
        {
            let _store = open_store(&db_path);
        }
        let _store2 = open_store(&db_path);
    }

    #[test]
    fn chunks_persist_across_reopen() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("persist");

        let hash = {
            let store = open_store(&db_path);
            store.put(b"durable bytes").unwrap()
        };

        let store = open_store(&db_path);
        assert_eq!(store.get(&hash).unwrap(), Some(b"durable bytes".to_vec()));
    }

    #[test]
    fn heads_persist_across_reopen() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("heads");

        let hash = {
            let store = open_store(&db_path);
            let hash = store.put(b"head chunk").unwrap();
            store.set_head("main", Some(&hash)).unwrap();
            hash
        };

        let store = open_store(&db_path);
        assert_eq!(store.get_head("main").unwrap(), Some(hash));
    }

    #[test]
    fn clear_head_removes_ref() {
        let temp = tempdir().unwrap();
        let store = open_store(&temp.path().join("clear"));
        let hash = store.put(b"x").unwrap();
        store.set_head("main", Some(&hash)).unwrap();
        store.set_head("main", None).unwrap();
        assert_eq!(store.get_head("main").unwrap(), None);
        // Clearing twice is fine.
        store.set_head("main", None).unwrap();
    }

    #[test]
    fn corrupt_head_surfaces_error() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("corrupt");
        let store = open_store(&db_path);
        fs::write(db_path.join("refs").join("main"), b"not-a-hash").unwrap();
        assert!(matches!(
            store.get_head("main"),
            Err(StorageError::Corrupt { .. })
        ));
    }
}
