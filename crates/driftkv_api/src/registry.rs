//! The process-wide table of open databases.
//!
//! Not thread-safe with respect to `init`/`open`/`close`/`drop`: the host
//! must serialize those lifecycle calls. Lookups from data operations take
//! the registry lock only briefly.

use crate::connection::Connection;
use crate::error::{ApiError, ApiResult};
use crate::types::DatabaseInfo;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use driftkv_core::Database;
use driftkv_storage::{FileStore, StoreConfig};
use driftkv_sync::SyncEngine;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock, OnceLock};
use tracing::{debug, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;

struct Registry {
    storage_dir: Option<PathBuf>,
    connections: HashMap<String, Arc<Connection>>,
}

static REGISTRY: LazyLock<Mutex<Registry>> = LazyLock::new(|| {
    Mutex::new(Registry {
        storage_dir: None,
        connections: HashMap::new(),
    })
});

type LevelHandle = reload::Handle<LevelFilter, tracing_subscriber::Registry>;

static LEVEL_HANDLE: OnceLock<LevelHandle> = OnceLock::new();

/// Initializes the registry: records the storage directory, points the
/// process temp dir at `temp_dir` when non-empty, and installs the tracing
/// subscriber whose level `setLogLevel` adjusts.
pub fn init(storage_dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) {
    init_tracing();

    let storage_dir = storage_dir.into();
    if storage_dir.as_os_str().is_empty() {
        warn!("storageDir must be non-empty");
        return;
    }
    let temp_dir = temp_dir.into();
    if !temp_dir.as_os_str().is_empty() {
        std::env::set_var("TMPDIR", &temp_dir);
    }

    info!(storage_dir = %storage_dir.display(), "initialized");
    REGISTRY.lock().storage_dir = Some(storage_dir);
}

fn init_tracing() {
    let (filter, handle) = reload::Layer::new(LevelFilter::INFO);
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    // A host (or test harness) may already have a subscriber installed.
    if subscriber.try_init().is_ok() {
        let _ = LEVEL_HANDLE.set(handle);
    }
}

/// Adjusts the log level: one of `"debug"`, `"info"`, `"error"`.
pub fn set_log_level(level: &str) -> ApiResult<()> {
    let filter = match level {
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "error" => LevelFilter::ERROR,
        other => {
            return Err(ApiError::invalid_argument(format!(
                "unknown log level: {other}"
            )))
        }
    };
    if let Some(handle) = LEVEL_HANDLE.get() {
        handle
            .reload(filter)
            .map_err(|e| ApiError::invalid_argument(e.to_string()))?;
    }
    Ok(())
}

/// Lists databases found under the storage directory.
///
/// Skips non-directory entries and directories whose names are not valid
/// URL-safe base64.
pub fn list() -> ApiResult<Vec<DatabaseInfo>> {
    let storage_dir = REGISTRY
        .lock()
        .storage_dir
        .clone()
        .ok_or(ApiError::Uninitialized)?;

    let mut databases = Vec::new();
    let entries = match std::fs::read_dir(&storage_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(databases),
        Err(e) => return Err(driftkv_storage::StorageError::from(e).into()),
    };
    for entry in entries {
        let entry = entry.map_err(driftkv_storage::StorageError::from)?;
        if !entry.path().is_dir() {
            continue;
        }
        let encoded = entry.file_name().to_string_lossy().into_owned();
        match URL_SAFE_NO_PAD
            .decode(&encoded)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
        {
            Some(name) => databases.push(DatabaseInfo { name }),
            None => {
                debug!(entry = %encoded, "skipping undecodable directory name");
            }
        }
    }
    Ok(databases)
}

/// Opens the named database, creating its directory on demand. Idempotent.
pub fn open(db_name: &str) -> ApiResult<()> {
    let path = {
        let registry = REGISTRY.lock();
        let storage_dir = registry.storage_dir.clone().ok_or(ApiError::Uninitialized)?;
        if db_name.is_empty() {
            return Err(ApiError::EmptyDbName);
        }
        if registry.connections.contains_key(db_name) {
            return Ok(());
        }
        db_path(&storage_dir, db_name)
    };

    info!(db = db_name, path = %path.display(), "opening database");
    let store = Arc::new(FileStore::open(&path, StoreConfig::default())?);
    let db = Arc::new(Database::open(store)?);
    let sync = SyncEngine::new(db.clone())?;
    let connection = Arc::new(Connection::new(db, sync, path));

    REGISTRY
        .lock()
        .connections
        .insert(db_name.to_string(), connection);
    Ok(())
}

/// Registers an already-built connection under a name.
///
/// This is how tests (and embedders with custom stores or remotes) place a
/// database in the registry without going through the filesystem path.
pub fn insert(db_name: &str, connection: Arc<Connection>) -> ApiResult<()> {
    if db_name.is_empty() {
        return Err(ApiError::EmptyDbName);
    }
    REGISTRY
        .lock()
        .connections
        .insert(db_name.to_string(), connection);
    Ok(())
}

/// Releases the resources held by the named database. Closing a database
/// that is not open is not an error.
pub fn close(db_name: &str) -> ApiResult<()> {
    if db_name.is_empty() {
        return Err(ApiError::EmptyDbName);
    }
    REGISTRY.lock().connections.remove(db_name);
    Ok(())
}

/// Closes and deletes the named local database.
pub fn drop_database(db_name: &str) -> ApiResult<()> {
    let storage_dir = REGISTRY
        .lock()
        .storage_dir
        .clone()
        .ok_or(ApiError::Uninitialized)?;
    if db_name.is_empty() {
        return Err(ApiError::EmptyDbName);
    }

    let path = db_path(&storage_dir, db_name);
    {
        let mut registry = REGISTRY.lock();
        if let Some(connection) = registry.connections.get(db_name) {
            if connection.dir() != path {
                return Err(ApiError::invalid_argument(format!(
                    "open database {} has directory {}, which is different than specified {}",
                    db_name,
                    connection.dir().display(),
                    path.display()
                )));
            }
            registry.connections.remove(db_name);
        }
    }

    match std::fs::remove_dir_all(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(driftkv_storage::StorageError::from(e).into()),
    }
}

/// Looks up the connection for a named database.
pub fn connection(db_name: &str) -> ApiResult<Arc<Connection>> {
    REGISTRY
        .lock()
        .connections
        .get(db_name)
        .cloned()
        .ok_or(ApiError::DatabaseNotOpen)
}

/// The `profile` rpc. The block-profiling endpoint of the reference
/// implementation has no equivalent here; the rpc is accepted and ignored.
pub fn profile() {
    debug!("profile requested; no profiling endpoint in this build");
}

/// Clears the registry. Tests only.
#[doc(hidden)]
pub fn reset_for_tests() {
    let mut registry = REGISTRY.lock();
    registry.storage_dir = None;
    registry.connections.clear();
}

fn db_path(root: &std::path::Path, name: &str) -> PathBuf {
    root.join(URL_SAFE_NO_PAD.encode(name.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_path_is_base64url() {
        let path = db_path(std::path::Path::new("/data"), "my/db");
        assert_eq!(path, PathBuf::from("/data/bXkvZGI"));
    }

    #[test]
    fn set_log_level_validates_input() {
        assert!(set_log_level("debug").is_ok());
        assert!(set_log_level("info").is_ok());
        assert!(set_log_level("error").is_ok());
        assert!(set_log_level("verbose").is_err());
    }
}
