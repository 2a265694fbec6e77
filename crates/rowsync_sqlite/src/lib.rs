//! # rowsync SQLite adapter
//!
//! Trigger-based change tracking for SQLite, implementing
//! [`SyncProvider`](rowsync_engine::SyncProvider) and
//! [`ProvisioningProvider`](rowsync_engine::ProvisioningProvider).
//!
//! ## Persisted state
//!
//! Provisioning adds three tables next to the application's own:
//!
//! - `__rowsync_log`: one row per tracked write (`id`, table, op, primary key,
//!   originating peer). The id is the store's version.
//! - `__rowsync_anchors`: per peer, the local version the peer has seen and
//!   the peer version this store has applied.
//! - `__rowsync_store`: this store's identity.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rowsync_engine::{CancelToken, ProvisioningProvider, SyncProvider};
//! use rowsync_sqlite::{SqliteSyncConfiguration, SqliteSyncProvider};
//!
//! let config = SqliteSyncConfiguration::for_path("app.db").with_table_name("users");
//! let store = SqliteSyncProvider::open(config)?;
//! store.apply_provision(&CancelToken::new())?;
//! println!("store {}", store.store_id(&CancelToken::new())?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod provider;
mod provision;
mod queries;
mod schema;
mod values;
mod writer;

pub use config::{ConnectionTarget, SqliteSyncConfiguration, SyncTable};
pub use error::{SqliteError, SqliteResult};
pub use provider::SqliteSyncProvider;
pub use schema::{kind_for_declared_type, ColumnInfo, TableSchema};
pub use values::{from_sql, to_sql};
