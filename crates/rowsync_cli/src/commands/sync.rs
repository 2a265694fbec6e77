//! Sync command implementation.

use rowsync_engine::{always_force_write, SyncAgent};
use rowsync_protocol::SyncDirection;
use rowsync_sqlite::SqliteSyncProvider;
use tracing::info;

/// Runs one round between two database files.
pub fn run(
    local: SqliteSyncProvider,
    remote: SqliteSyncProvider,
    direction: SyncDirection,
    force_remote: bool,
    resnapshot: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    for (name, store) in [("local", &local), ("remote", &remote)] {
        if !store.is_provisioned()? {
            return Err(format!("The {} store is not provisioned", name).into());
        }
    }

    info!(
        "Syncing {:?} with {:?} ({})",
        local.config().connection,
        remote.config().connection,
        direction
    );
    let mut agent = SyncAgent::new(local, remote).with_resnapshot_on_stale(resnapshot);
    if force_remote {
        agent = agent.with_remote_conflict_handler(always_force_write());
    }

    let result = agent.synchronize_with(direction)?;
    println!("Sync round completed in {:?}", result.duration);
    println!("  Uploaded:   {}", result.uploaded);
    println!("  Downloaded: {}", result.downloaded);
    if agent.stats().resnapshots > 0 {
        println!("  Resnapshot: a stale anchor was reset");
    }
    if let Some(anchor) = result.remote_anchor {
        println!("  Remote:     {}", anchor);
    }
    if let Some(anchor) = result.local_anchor {
        println!("  Local:      {}", anchor);
    }
    Ok(())
}
