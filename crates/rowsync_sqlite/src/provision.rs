//! Change tracking tables, triggers and persisted sync state.
//!
//! Every insert, update and delete on a tracked table appends a row to the
//! change log. The log's AUTOINCREMENT id is the store's version counter.
//! Rows written while applying a peer's changes get that peer's id in `src`
//! so they are never sent back to it.

use crate::error::{SqliteError, SqliteResult};
use crate::schema::{quote_ident, quote_literal, TableSchema};
use rowsync_engine::SyncVersion;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

pub(crate) const LOG_TABLE: &str = "__rowsync_log";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS __rowsync_log (
    id  INTEGER PRIMARY KEY AUTOINCREMENT,
    tbl TEXT NOT NULL,
    op  TEXT NOT NULL CHECK (op IN ('I', 'U', 'D')),
    pk  NOT NULL,
    src TEXT
);

CREATE INDEX IF NOT EXISTS __rowsync_log_row ON __rowsync_log (tbl, pk);

CREATE TABLE IF NOT EXISTS __rowsync_anchors (
    store_id       TEXT PRIMARY KEY,
    local_version  INTEGER,
    remote_version INTEGER
);
"#;

const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS __rowsync_store (
    id       INTEGER PRIMARY KEY CHECK (id = 1),
    store_id TEXT NOT NULL
);
"#;

// Dropping an AUTOINCREMENT table also clears its sqlite_sequence row.
const TEARDOWN: &str = r#"
DROP TABLE IF EXISTS __rowsync_log;
DROP TABLE IF EXISTS __rowsync_anchors;
DROP TABLE IF EXISTS __rowsync_store;
"#;

/// What this store remembers about a peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PeerRecord {
    /// Highest local version the peer has incorporated.
    pub local_version: Option<u64>,
    /// Highest peer version this store has applied.
    pub remote_version: Option<u64>,
}

pub(crate) fn to_db_version(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}

fn from_db_version(version: i64) -> SqliteResult<u64> {
    u64::try_from(version).map_err(|_| SqliteError::Corrupted(format!("negative version {}", version)))
}

/// Creates the log, anchor and identity tables.
pub(crate) fn install(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(SCHEMA)?;
    ensure_store_id(conn)?;
    Ok(())
}

/// Drops everything [`install`] and [`install_triggers`] created.
pub(crate) fn uninstall(conn: &Connection, tables: &[String]) -> SqliteResult<()> {
    for table in tables {
        drop_triggers(conn, table)?;
    }
    conn.execute_batch(TEARDOWN)?;
    Ok(())
}

/// Returns the store id, generating one on first use.
pub(crate) fn ensure_store_id(conn: &Connection) -> SqliteResult<Uuid> {
    conn.execute_batch(STORE_SCHEMA)?;
    let existing: Option<String> = conn
        .query_row("SELECT store_id FROM __rowsync_store WHERE id = 1", [], |row| row.get(0))
        .optional()?;
    if let Some(text) = existing {
        return Uuid::parse_str(&text)
            .map_err(|e| SqliteError::Corrupted(format!("store id '{}': {}", text, e)));
    }

    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO __rowsync_store (id, store_id) VALUES (1, ?1)",
        params![id.hyphenated().to_string()],
    )?;
    debug!(store_id = %id, "generated store id");
    Ok(id)
}

fn trigger_name(table: &str, op: &str) -> String {
    quote_ident(&format!("__rowsync_{}_{}", table, op))
}

/// (Re)creates the three change-log triggers of a table.
pub(crate) fn install_triggers(conn: &Connection, schema: &TableSchema) -> SqliteResult<()> {
    drop_triggers(conn, &schema.name)?;

    let table = schema.quoted_name();
    let tbl = quote_literal(&schema.name);
    let pk = schema.quoted_key();
    let sql = format!(
        r#"
CREATE TRIGGER {insert} AFTER INSERT ON {table}
BEGIN
    INSERT INTO __rowsync_log (tbl, op, pk) VALUES ({tbl}, 'I', NEW.{pk});
END;

CREATE TRIGGER {update} AFTER UPDATE ON {table}
BEGIN
    INSERT INTO __rowsync_log (tbl, op, pk)
        SELECT {tbl}, 'D', OLD.{pk} WHERE OLD.{pk} IS NOT NEW.{pk};
    INSERT INTO __rowsync_log (tbl, op, pk)
        VALUES ({tbl}, CASE WHEN OLD.{pk} IS NOT NEW.{pk} THEN 'I' ELSE 'U' END, NEW.{pk});
END;

CREATE TRIGGER {delete} AFTER DELETE ON {table}
BEGIN
    INSERT INTO __rowsync_log (tbl, op, pk) VALUES ({tbl}, 'D', OLD.{pk});
END;
"#,
        insert = trigger_name(&schema.name, "insert"),
        update = trigger_name(&schema.name, "update"),
        delete = trigger_name(&schema.name, "delete"),
    );
    conn.execute_batch(&sql)?;
    Ok(())
}

fn drop_triggers(conn: &Connection, table: &str) -> SqliteResult<()> {
    for op in ["insert", "update", "delete"] {
        conn.execute_batch(&format!("DROP TRIGGER IF EXISTS {};", trigger_name(table, op)))?;
    }
    Ok(())
}

/// Returns true if the change log exists.
pub(crate) fn is_installed(conn: &Connection) -> SqliteResult<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [LOG_TABLE],
        |row| row.get(0),
    )?)
}

/// Reads the version window of the change log.
///
/// `current` comes from the AUTOINCREMENT counter so it never goes back,
/// even when retention has emptied the log.
pub(crate) fn sync_version(conn: &Connection) -> SqliteResult<SyncVersion> {
    let (current, minimum): (i64, Option<i64>) = conn.query_row(
        "SELECT COALESCE((SELECT seq FROM sqlite_sequence WHERE name = ?1), 0),
                (SELECT MIN(id) FROM __rowsync_log)",
        [LOG_TABLE],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let current = from_db_version(current)?;
    let minimum = match minimum {
        Some(min) => from_db_version(min)?,
        None if current > 0 => current + 1,
        None => 0,
    };
    Ok(SyncVersion { current, minimum })
}

/// Deletes log entries below `min_version`.
pub(crate) fn trim(conn: &Connection, min_version: u64) -> SqliteResult<usize> {
    Ok(conn.execute(
        "DELETE FROM __rowsync_log WHERE id < ?1",
        params![to_db_version(min_version)],
    )?)
}

pub(crate) fn load_peer(conn: &Connection, peer: Uuid) -> SqliteResult<PeerRecord> {
    let row: Option<(Option<i64>, Option<i64>)> = conn
        .query_row(
            "SELECT local_version, remote_version FROM __rowsync_anchors WHERE store_id = ?1",
            params![peer.hyphenated().to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((local, remote)) = row else {
        return Ok(PeerRecord::default());
    };
    Ok(PeerRecord {
        local_version: local.map(from_db_version).transpose()?,
        remote_version: remote.map(from_db_version).transpose()?,
    })
}

pub(crate) fn save_local_version(conn: &Connection, peer: Uuid, version: u64) -> SqliteResult<()> {
    conn.execute(
        "INSERT INTO __rowsync_anchors (store_id, local_version) VALUES (?1, ?2)
         ON CONFLICT (store_id) DO UPDATE SET local_version = excluded.local_version",
        params![peer.hyphenated().to_string(), to_db_version(version)],
    )?;
    Ok(())
}

pub(crate) fn save_remote_version(conn: &Connection, peer: Uuid, version: u64) -> SqliteResult<()> {
    conn.execute(
        "INSERT INTO __rowsync_anchors (store_id, remote_version) VALUES (?1, ?2)
         ON CONFLICT (store_id) DO UPDATE SET remote_version = excluded.remote_version",
        params![peer.hyphenated().to_string(), to_db_version(version)],
    )?;
    Ok(())
}

/// Clears the local version recorded for `peer`. Returns false if none was.
pub(crate) fn forget_local_version(conn: &Connection, peer: Uuid) -> SqliteResult<bool> {
    let changed = conn.execute(
        "UPDATE __rowsync_anchors SET local_version = NULL
         WHERE store_id = ?1 AND local_version IS NOT NULL",
        params![peer.hyphenated().to_string()],
    )?;
    Ok(changed > 0)
}

/// Peers whose recorded local version is older than `minimum - 1`.
pub(crate) fn peers_behind(conn: &Connection, minimum: u64) -> SqliteResult<Vec<(Uuid, u64)>> {
    let mut stmt = conn.prepare(
        "SELECT store_id, local_version FROM __rowsync_anchors
         WHERE local_version IS NOT NULL AND local_version < ?1 - 1
         ORDER BY store_id",
    )?;
    let rows = stmt.query_map(params![to_db_version(minimum)], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut peers = Vec::new();
    for row in rows {
        let (id, version) = row?;
        let id = Uuid::parse_str(&id)
            .map_err(|e| SqliteError::Corrupted(format!("peer id '{}': {}", id, e)))?;
        peers.push((id, from_db_version(version)?));
    }
    Ok(peers)
}
