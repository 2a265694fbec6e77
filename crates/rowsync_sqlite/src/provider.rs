//! The SQLite sync provider.

use crate::config::{ConnectionTarget, SqliteSyncConfiguration};
use crate::error::{SqliteError, SqliteResult};
use crate::provision::{self, PeerRecord};
use crate::queries;
use crate::schema::TableSchema;
use crate::writer::SqliteItemWriter;
use parking_lot::Mutex;
use rowsync_engine::{
    apply_change_set, ApplyReport, CancelToken, ConflictHandler, ProvisioningProvider, SyncProvider,
    SyncResult, SyncVersion,
};
use rowsync_protocol::{Anchor, ChangeSet, SyncDirection, SyncFilterParameter};
use rusqlite::Connection;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A [`SyncProvider`] backed by one SQLite database.
///
/// The connection is guarded by a mutex; every contract call holds it for
/// the length of one transaction.
pub struct SqliteSyncProvider {
    conn: Mutex<Connection>,
    config: SqliteSyncConfiguration,
}

impl std::fmt::Debug for SqliteSyncProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSyncProvider")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteSyncProvider {
    /// Opens the database named by the configuration.
    pub fn open(config: SqliteSyncConfiguration) -> SqliteResult<Self> {
        let conn = match &config.connection {
            ConnectionTarget::Memory => Connection::open_in_memory()?,
            ConnectionTarget::Path(path) => Connection::open(path)?,
        };
        Self::with_connection(conn, config)
    }

    /// Wraps an already open connection.
    pub fn with_connection(conn: Connection, config: SqliteSyncConfiguration) -> SqliteResult<Self> {
        config.validate()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SqliteSyncConfiguration {
        &self.config
    }

    /// Runs `f` against the connection, outside any sync transaction.
    ///
    /// Writes made here are ordinary application writes and are tracked by
    /// the change log.
    pub fn execute<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> SqliteResult<T> {
        let conn = self.conn.lock();
        Ok(f(&conn)?)
    }

    /// Returns true if change tracking is installed.
    pub fn is_provisioned(&self) -> SqliteResult<bool> {
        provision::is_installed(&self.conn.lock())
    }

    fn load_schemas(&self, conn: &Connection) -> SqliteResult<Vec<TableSchema>> {
        self.config
            .tables
            .iter()
            .map(|table| TableSchema::load(conn, &table.name))
            .collect()
    }

    /// Applies a change set and also returns the per-item outcome counts.
    pub fn apply_changes_with_report(
        &self,
        changes: &ChangeSet,
        on_conflict: Option<&ConflictHandler>,
        cancel: &CancelToken,
    ) -> SyncResult<(Anchor, ApplyReport)> {
        cancel.check()?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(SqliteError::from)?;

        let store_id = provision::ensure_store_id(&tx)?;
        let before = provision::sync_version(&tx)?.current;
        let source = changes.source_anchor.store_id();

        let report = {
            let writer = SqliteItemWriter::new(&tx, self.load_schemas(&tx)?, source, before);
            apply_change_set(&writer, changes, on_conflict, cancel)?
        };
        provision::save_remote_version(&tx, source, changes.source_anchor.version())?;
        tx.commit().map_err(SqliteError::from)?;

        info!(
            peer = %source,
            applied = report.applied,
            recreated = report.recreated,
            skipped = report.skipped,
            rejected = report.rejected,
            "applied change set"
        );
        Ok((Anchor::new(store_id, before)?, report))
    }
}

impl SyncProvider for SqliteSyncProvider {
    fn store_id(&self, cancel: &CancelToken) -> SyncResult<Uuid> {
        cancel.check()?;
        Ok(provision::ensure_store_id(&self.conn.lock())?)
    }

    fn get_changes(
        &self,
        other: Uuid,
        filters: &[SyncFilterParameter],
        direction: SyncDirection,
        cancel: &CancelToken,
    ) -> SyncResult<ChangeSet> {
        cancel.check()?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(SqliteError::from)?;

        let store_id = provision::ensure_store_id(&tx)?;
        let window = provision::sync_version(&tx)?;
        let PeerRecord {
            local_version,
            remote_version,
        } = provision::load_peer(&tx, other)?;
        if let Some(from) = local_version {
            window.check_resumable(from)?;
        }

        let mut items = Vec::new();
        for table in &self.config.tables {
            if !table.sync_direction.includes(direction) {
                continue;
            }
            cancel.check()?;
            let schema = TableSchema::load(&tx, &table.name)?;
            let count = match local_version {
                None if table.skip_initial_snapshot => 0,
                None => queries::snapshot(&tx, table, &schema, filters, &mut items)?,
                Some(from) => {
                    queries::upserts(&tx, table, &schema, filters, from, other, &mut items)?
                        + queries::deletes(&tx, &schema, from, other, &mut items)?
                }
            };
            debug!(table = %table.name, count, snapshot = local_version.is_none(), "collected changes");
        }
        tx.commit().map_err(SqliteError::from)?;

        info!(peer = %other, items = items.len(), version = window.current, "collected change set");
        Ok(ChangeSet::new(
            Anchor::new(store_id, window.current)?,
            Anchor::new(other, remote_version.unwrap_or(0))?,
            items,
        ))
    }

    fn apply_changes(
        &self,
        changes: &ChangeSet,
        on_conflict: Option<&ConflictHandler>,
        cancel: &CancelToken,
    ) -> SyncResult<Anchor> {
        self.apply_changes_with_report(changes, on_conflict, cancel)
            .map(|(anchor, _)| anchor)
    }

    fn save_version_for_store(&self, other: Uuid, version: u64, cancel: &CancelToken) -> SyncResult<()> {
        cancel.check()?;
        provision::save_local_version(&self.conn.lock(), other, version)?;
        debug!(peer = %other, version, "saved version for store");
        Ok(())
    }

    fn forget_store(&self, other: Uuid, cancel: &CancelToken) -> SyncResult<()> {
        cancel.check()?;
        let forgotten = provision::forget_local_version(&self.conn.lock(), other)?;
        info!(peer = %other, forgotten, "forgot version for store; next collection is a snapshot");
        Ok(())
    }
}

impl ProvisioningProvider for SqliteSyncProvider {
    fn apply_provision(&self, cancel: &CancelToken) -> SyncResult<()> {
        cancel.check()?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(SqliteError::from)?;
        provision::install(&tx)?;
        for schema in self.load_schemas(&tx)? {
            provision::install_triggers(&tx, &schema)?;
        }
        tx.commit().map_err(SqliteError::from)?;
        info!(tables = self.config.tables.len(), "provisioned change tracking");
        Ok(())
    }

    fn remove_provision(&self, cancel: &CancelToken) -> SyncResult<()> {
        cancel.check()?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(SqliteError::from)?;
        let names: Vec<String> = self.config.tables.iter().map(|t| t.name.clone()).collect();
        provision::uninstall(&tx, &names)?;
        tx.commit().map_err(SqliteError::from)?;
        info!("removed change tracking");
        Ok(())
    }

    fn sync_version(&self, cancel: &CancelToken) -> SyncResult<SyncVersion> {
        cancel.check()?;
        Ok(provision::sync_version(&self.conn.lock())?)
    }

    fn apply_retention_policy(&self, min_version: u64, cancel: &CancelToken) -> SyncResult<SyncVersion> {
        cancel.check()?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(SqliteError::from)?;
        let removed = provision::trim(&tx, min_version)?;
        let window = provision::sync_version(&tx)?;
        let behind = provision::peers_behind(&tx, window.minimum)?;
        tx.commit().map_err(SqliteError::from)?;

        info!(min_version, removed, current = window.current, minimum = window.minimum, "applied retention policy");
        for (peer, version) in behind {
            warn!(%peer, version, minimum = window.minimum, "peer is behind the retained log and must resnapshot");
        }
        Ok(window)
    }
}
