//! Forget command implementation.

use rowsync_engine::{CancelToken, SyncProvider};
use rowsync_sqlite::SqliteSyncProvider;
use tracing::info;
use uuid::Uuid;

/// Clears the version recorded for `peer`; its next sync starts from a
/// full snapshot.
pub fn run(store: &SqliteSyncProvider, peer: Uuid) -> Result<(), Box<dyn std::error::Error>> {
    info!("Forgetting peer {} on {:?}", peer, store.config().connection);
    store.forget_store(peer, &CancelToken::new())?;
    println!("Peer {} will be sent a full snapshot on its next sync", peer);
    Ok(())
}
