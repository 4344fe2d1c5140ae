//! # driftkv api
//!
//! The host-facing surface of driftkv: a process-wide registry of open
//! databases and a JSON-in/JSON-out dispatch entry point.
//!
//! Hosts call [`registry::init`] once, then drive everything through
//! [`dispatch`]: database lifecycle (`open`, `close`, `drop`, `list`),
//! transactions (`openTransaction` through `commitTransaction`), reads and
//! writes (`has`, `get`, `scan`, `put`, `del`) and the two-phase sync
//! (`beginSync`, `maybeEndSync`).
//!
//! The registry is not thread-safe with respect to `init`/`open`/`close`/
//! `drop`; the embedding host must serialize those lifecycle calls.
//! Per-database data operations tolerate concurrent callers.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod dispatch;
mod error;
pub mod registry;
mod types;

pub use connection::Connection;
pub use dispatch::dispatch;
pub use error::{ApiError, ApiResult};
pub use types::DatabaseInfo;
