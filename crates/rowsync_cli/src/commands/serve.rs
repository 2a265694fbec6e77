//! Serve command implementation.

use rowsync_protocol::ConflictResolution;
use rowsync_server::{ServerConfig, SyncServer};
use rowsync_sqlite::SqliteSyncProvider;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Serves the store until interrupted.
pub fn run(store: SqliteSyncProvider, bind: SocketAddr, force_write: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !store.is_provisioned()? {
        return Err("Store is not provisioned; run `rowsync provision` first".into());
    }

    let resolution = if force_write {
        ConflictResolution::ForceWrite
    } else {
        ConflictResolution::Skip
    };
    let config = ServerConfig::new(bind).with_conflict_resolution(resolution);
    let server = Arc::new(SyncServer::new(store, config));

    info!("Serving {:?} on {}", server.provider().config().connection, bind);
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(rowsync_server::serve(server))?;
    Ok(())
}
