//! # rowsync Sync Server
//!
//! Serves one store to remote peers over the chunked bulk-transfer protocol.
//!
//! This crate provides:
//! - Bulk download and upload sessions with sliding expiry
//! - Text and binary chunk routes
//! - An axum router ([`router`], [`serve`]) and an in-process
//!   [`LoopbackServer`](rowsync_engine::LoopbackServer) for tests
//!
//! # Architecture
//!
//! The server wraps any [`SyncProvider`](rowsync_engine::SyncProvider). A
//! download begin computes the peer's change set once and caches it in a
//! session; the peer then pulls it in chunks by offset. An upload buffers
//! chunks by index and applies them in one provider call when completed,
//! settling conflicts with the configured [`ConflictResolution`](rowsync_protocol::ConflictResolution).
//!
//! # Routes
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | GET | `/store-id` | JSON |
//! | GET | `/changes-bulk/{other}?direction=..&name=value` | JSON |
//! | GET | `/changes-bulk-item[-binary]/{session}/{skip}/{take}` | chunk |
//! | POST | `/changes-bulk-begin` | JSON |
//! | POST | `/changes-bulk-item[-binary]` | chunk |
//! | POST | `/changes-bulk-complete[-binary]/{session}` | anchor |
//! | POST | `/save-version/{other}/{version}` | empty |
//! | POST | `/forget-store/{other}` | empty |
//!
//! Errors carry `{ "error": code, "message": .., "detail": .. }` with codes
//! `invalid_request`, `not_found`, `session_not_found`, `count_mismatch`,
//! `stale_version` and `internal`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod routes;
mod server;
mod session;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{parse_changes_query, HandlerContext, RequestHandler};
pub use routes::{router, serve, spawn_purge_task};
pub use server::{Route, SyncServer};
pub use session::{BulkSession, MemorySessionStore, SessionKey, SessionKind, SessionStore, SharedSession};
