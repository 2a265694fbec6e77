//! Adapter configuration.

use crate::error::{SqliteError, SqliteResult};
use rowsync_protocol::SyncDirection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionTarget {
    /// A private in-memory database.
    #[default]
    Memory,
    /// A database file.
    Path(PathBuf),
}

/// One table taking part in sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTable {
    /// Table name.
    pub name: String,
    /// Which rounds the table takes part in.
    #[serde(default)]
    pub sync_direction: SyncDirection,
    /// Leave the table out of the first round with a new peer.
    #[serde(default)]
    pub skip_initial_snapshot: bool,
    /// Row source used instead of the whole table for the first round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_snapshot_query: Option<String>,
    /// Row source used instead of the whole table for later rounds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_incremental_query: Option<String>,
}

impl SyncTable {
    /// Creates an entry that syncs both ways with a full snapshot.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sync_direction: SyncDirection::UploadAndDownload,
            skip_initial_snapshot: false,
            custom_snapshot_query: None,
            custom_incremental_query: None,
        }
    }

    /// Sets the direction.
    #[must_use]
    pub fn with_direction(mut self, direction: SyncDirection) -> Self {
        self.sync_direction = direction;
        self
    }

    /// Skips the initial snapshot.
    #[must_use]
    pub fn skip_initial_snapshot(mut self) -> Self {
        self.skip_initial_snapshot = true;
        self
    }

    /// Sets the snapshot row source. It may reference filter parameters as
    /// `@name`.
    #[must_use]
    pub fn with_snapshot_query(mut self, sql: impl Into<String>) -> Self {
        self.custom_snapshot_query = Some(sql.into());
        self
    }

    /// Sets the incremental row source. It may reference filter parameters
    /// as `@name`.
    #[must_use]
    pub fn with_incremental_query(mut self, sql: impl Into<String>) -> Self {
        self.custom_incremental_query = Some(sql.into());
        self
    }
}

/// Configuration of a [`SqliteSyncProvider`](crate::SqliteSyncProvider).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqliteSyncConfiguration {
    /// Database location.
    #[serde(default)]
    pub connection: ConnectionTarget,
    /// Tables in sync order.
    #[serde(default)]
    pub tables: Vec<SyncTable>,
}

impl SqliteSyncConfiguration {
    /// Creates an in-memory configuration with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration for a database file.
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self::new().with_path(path)
    }

    /// Sets the database file.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.connection = ConnectionTarget::Path(path.into());
        self
    }

    /// Uses a private in-memory database.
    #[must_use]
    pub fn in_memory(mut self) -> Self {
        self.connection = ConnectionTarget::Memory;
        self
    }

    /// Adds a table with default settings.
    #[must_use]
    pub fn with_table_name(self, name: impl Into<String>) -> Self {
        self.with_table(SyncTable::new(name))
    }

    /// Adds a table.
    #[must_use]
    pub fn with_table(mut self, table: SyncTable) -> Self {
        self.tables.push(table);
        self
    }

    /// Looks a table up by name, ignoring ASCII case.
    pub fn table(&self, name: &str) -> Option<&SyncTable> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Parses a configuration from JSON.
    pub fn from_json(json: &str) -> SqliteResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SqliteError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> SqliteResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| SqliteError::Configuration(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Checks that table names are present and unique.
    pub fn validate(&self) -> SqliteResult<()> {
        for (i, table) in self.tables.iter().enumerate() {
            if table.name.trim().is_empty() {
                return Err(SqliteError::Configuration(format!("table #{} has no name", i)));
            }
            if self.tables[..i]
                .iter()
                .any(|t| t.name.eq_ignore_ascii_case(&table.name))
            {
                return Err(SqliteError::Configuration(format!(
                    "table '{}' is listed twice",
                    table.name
                )));
            }
        }
        Ok(())
    }
}
