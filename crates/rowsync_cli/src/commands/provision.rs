//! Provision and deprovision commands.

use rowsync_engine::{CancelToken, ProvisioningProvider, SyncProvider};
use rowsync_sqlite::SqliteSyncProvider;
use tracing::info;

/// Installs change tracking on every configured table.
pub fn run(store: &SqliteSyncProvider) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = CancelToken::new();
    info!("Provisioning {:?}", store.config().connection);
    store.apply_provision(&cancel)?;
    let tables: Vec<&str> = store.config().tables.iter().map(|t| t.name.as_str()).collect();
    println!("Provisioned store {}", store.store_id(&cancel)?);
    println!("  Tables: {}", tables.join(", "));
    Ok(())
}

/// Removes change tracking.
pub fn remove(store: &SqliteSyncProvider) -> Result<(), Box<dyn std::error::Error>> {
    if !store.is_provisioned()? {
        println!("Store is not provisioned");
        return Ok(());
    }
    info!("Removing change tracking from {:?}", store.config().connection);
    store.remove_provision(&CancelToken::new())?;
    println!("Removed change tracking");
    Ok(())
}
