//! # driftkv sync
//!
//! The two-phase synchronization engine.
//!
//! A sync runs in two host-visible steps:
//!
//! 1. [`SyncEngine::begin_sync`] pushes pending local mutations to the data
//!    layer (failures recorded, never fatal), then pulls a new snapshot
//!    from the diff server as a checksum-verified JSON patch over the
//!    previous snapshot, writing a dangling sync head.
//! 2. [`SyncEngine::maybe_end_sync`] either finalizes the sync by moving
//!    the master head to the sync head, or hands the host a list of
//!    [`ReplayMutation`]s to re-execute on top of it first.
//!
//! Push and pull sit behind the [`Pusher`] and [`Puller`] traits; the
//! default implementations POST JSON over HTTP with a 20-second timeout,
//! and tests substitute [`FakePusher`] / [`FakePuller`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod engine;
mod error;
mod http;
mod protocol;
mod pull;
mod push;

pub use engine::{BeginSyncRequest, BeginSyncResult, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use protocol::{
    BatchPushInfo, BatchPushRequest, BatchPushResponse, ClientViewInfo, Mutation, MutationInfo,
    PullRequest, PullResponse, ReplayMutation, SyncInfo,
};
pub use pull::{FakePuller, HttpPuller, Puller};
pub use push::{FakePusher, HttpPusher, Pusher};
