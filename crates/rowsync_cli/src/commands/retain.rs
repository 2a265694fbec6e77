//! Retain command implementation.

use rowsync_engine::{CancelToken, ProvisioningProvider};
use rowsync_sqlite::SqliteSyncProvider;
use tracing::info;

/// Deletes change log entries older than `min_version`.
pub fn run(store: &SqliteSyncProvider, min_version: u64) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = CancelToken::new();
    info!("Trimming change log of {:?} below version {}", store.config().connection, min_version);
    let before = store.sync_version(&cancel)?;
    let after = store.apply_retention_policy(min_version, &cancel)?;
    println!("Change log trimmed below version {}", min_version);
    println!("  Before: {}..={}", before.minimum, before.current);
    println!("  After:  {}..={}", after.minimum, after.current);
    Ok(())
}
