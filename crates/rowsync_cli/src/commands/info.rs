//! Info command implementation.

use rowsync_engine::{CancelToken, ProvisioningProvider, SyncProvider};
use rowsync_sqlite::SqliteSyncProvider;
use serde::Serialize;

/// Store summary.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResult {
    /// Store identity.
    pub store_id: String,
    /// Whether change tracking is installed.
    pub provisioned: bool,
    /// Highest version allocated.
    pub current_version: u64,
    /// Oldest version still in the log.
    pub minimum_version: u64,
    /// Tracked tables.
    pub tables: Vec<String>,
}

/// Runs the info command.
pub fn run(store: &SqliteSyncProvider, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = CancelToken::new();
    let provisioned = store.is_provisioned()?;
    let window = if provisioned {
        store.sync_version(&cancel)?
    } else {
        Default::default()
    };

    let result = InfoResult {
        store_id: store.store_id(&cancel)?.to_string(),
        provisioned,
        current_version: window.current,
        minimum_version: window.minimum,
        tables: store.config().tables.iter().map(|t| t.name.clone()).collect(),
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InfoResult) {
    println!("Store:       {}", result.store_id);
    println!("Provisioned: {}", if result.provisioned { "yes" } else { "no" });
    println!("Versions:    {}..={}", result.minimum_version, result.current_version);
    println!("Tables:      {}", result.tables.join(", "));
}
