//! # driftkv core
//!
//! The versioned heart of driftkv: a content-addressed commit graph over a
//! checksummed JSON keyspace, with a transactional read/write layer on top.
//!
//! This crate provides:
//! - [`ChecksummedMap`] - ordered key/value map with an incremental checksum
//! - JSON patch application ([`apply_patch`]) and range scans ([`scan`])
//! - [`Commit`] - immutable snapshot/local commits forming a DAG
//! - [`Database`] - per-database facade with a fast-forward-only master head
//! - [`Transaction`] - atomic read-modify-write over a basis commit
//!
//! Synchronization with remotes lives in `driftkv_sync`; host dispatch in
//! `driftkv_api`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod checksum;
mod commit;
mod db;
mod error;
mod kvmap;
mod patch;
mod scan;
mod transaction;

pub use checksum::Checksum;
pub use commit::{
    base_snapshot, is_ancestor, pending_commits, read_commit, write_commit, Commit, CommitMeta,
};
pub use db::{Database, HeadGuard, MASTER_HEAD};
pub use error::{CoreError, CoreResult};
pub use kvmap::ChecksummedMap;
pub use patch::{apply_patch, PatchError, PatchOperation};
pub use scan::{scan, ScanBound, ScanId, ScanItem, ScanOptions};
pub use transaction::{validate_replay, Transaction};
