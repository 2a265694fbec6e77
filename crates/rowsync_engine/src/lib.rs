//! # rowsync engine
//!
//! The storage-independent half of rowsync.
//!
//! This crate provides:
//! - The storage adapter contract ([`SyncProvider`], [`ProvisioningProvider`])
//! - The per-item conflict state machine ([`apply_item`], [`apply_change_set`])
//! - The round orchestrator ([`SyncAgent`])
//! - A bulk-transfer client that makes a remote server look like a provider
//!   ([`RemoteSyncProvider`])
//!
//! ## Architecture
//!
//! A round is **push then pull**: local changes go to the remote first so
//! the remote's record of what the local store has seen is current before
//! the local store pulls. Echo suppression in the adapters keeps the pull
//! from returning what was just pushed.
//!
//! ## Key invariants
//!
//! - Anchor versions never decrease
//! - Each provider call is one transaction
//! - Integrity failures and lost conflicts skip an item, never the batch
//! - Retries are bounded (item writes and chunk downloads)

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod agent;
mod cancel;
mod config;
mod conflict;
mod error;
mod http;
mod provider;

pub use agent::{SyncAgent, SyncRoundResult, SyncState, SyncStats};
pub use cancel::CancelToken;
pub use config::{RetryConfig, SyncConfig, DEFAULT_CHUNK_SIZE};
pub use conflict::{
    always_force_write, always_skip, apply_change_set, apply_item, resolve_with, ApplyReport,
    ConflictHandler, ItemOutcome, ItemWriter, MAX_WRITE_ATTEMPTS,
};
pub use error::{SyncError, SyncResult, SyncStep};
pub use http::{HttpClient, HttpError, HttpMethod, LoopbackClient, LoopbackServer, RemoteSyncProvider};
pub use provider::{ProvisioningProvider, SyncProvider, SyncVersion};
