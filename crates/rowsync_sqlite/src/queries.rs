//! Change collection.

use crate::config::SyncTable;
use crate::error::{SqliteError, SqliteResult};
use crate::provision::to_db_version;
use crate::schema::{quote_literal, TableSchema};
use crate::values::{from_sql, to_sql};
use rowsync_protocol::{ChangeType, SyncFilterParameter, SyncItem};
use rusqlite::{Connection, Statement};
use uuid::Uuid;

const OP_COLUMN: &str = "__rowsync_op";

/// Binds the filter parameters the statement references, and leaves the
/// others out.
fn bind_filters(stmt: &mut Statement<'_>, filters: &[SyncFilterParameter]) -> SqliteResult<()> {
    for filter in filters {
        if let Some(index) = stmt.parameter_index(&filter.placeholder())? {
            stmt.raw_bind_parameter(index, to_sql(&filter.value))?;
        }
    }
    Ok(())
}

/// Runs a prepared row query and turns each row into an item.
///
/// A column named `__rowsync_op` supplies the change type; without it every
/// row is an insert.
fn collect_rows(
    mut stmt: Statement<'_>,
    schema: &TableSchema,
    items: &mut Vec<SyncItem>,
) -> SqliteResult<usize> {
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let kinds: Vec<_> = names
        .iter()
        .map(|name| schema.column(name).and_then(|c| c.kind))
        .collect();

    let before = items.len();
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next()? {
        let mut item = SyncItem::new(schema.name.clone(), ChangeType::Insert);
        for (i, name) in names.iter().enumerate() {
            if name == OP_COLUMN {
                let op: String = row.get(i)?;
                item.change_type = ChangeType::from_log_op(&op)
                    .ok_or_else(|| SqliteError::Corrupted(format!("unknown log op '{}'", op)))?;
                continue;
            }
            let typed = from_sql(row.get_ref(i)?, kinds[i]).map_err(|e| SqliteError::value(name.as_str(), e))?;
            item.values.push((name.clone(), typed));
        }
        items.push(item);
    }
    Ok(items.len() - before)
}

fn row_source(schema: &TableSchema, custom: Option<&str>) -> String {
    match custom {
        Some(sql) => format!("({})", sql.trim().trim_end_matches(';')),
        None => schema.quoted_name(),
    }
}

/// Every row of a table, as inserts.
pub(crate) fn snapshot(
    conn: &Connection,
    table: &SyncTable,
    schema: &TableSchema,
    filters: &[SyncFilterParameter],
    items: &mut Vec<SyncItem>,
) -> SqliteResult<usize> {
    let sql = format!(
        "SELECT * FROM {} AS t",
        row_source(schema, table.custom_snapshot_query.as_deref())
    );
    let mut stmt = conn.prepare(&sql)?;
    bind_filters(&mut stmt, filters)?;
    collect_rows(stmt, schema, items)
}

/// Rows written or created after `from` by anyone but `other`.
///
/// Each row appears once, with the change type of its earliest qualifying
/// log entry, ordered by that entry.
pub(crate) fn upserts(
    conn: &Connection,
    table: &SyncTable,
    schema: &TableSchema,
    filters: &[SyncFilterParameter],
    from: u64,
    other: Uuid,
    items: &mut Vec<SyncItem>,
) -> SqliteResult<usize> {
    let sql = format!(
        "SELECT t.*, l.op AS {op}
         FROM {source} AS t
         JOIN (SELECT pk, MIN(id) AS first_id
               FROM __rowsync_log
               WHERE tbl = {tbl} AND id > @__from AND op <> 'D'
                 AND (src IS NULL OR src <> @__other)
               GROUP BY pk) c ON t.{pk} = c.pk
         JOIN __rowsync_log l ON l.id = c.first_id
         ORDER BY c.first_id",
        op = OP_COLUMN,
        source = row_source(schema, table.custom_incremental_query.as_deref()),
        tbl = quote_literal(&schema.name),
        pk = schema.quoted_key(),
    );
    let mut stmt = conn.prepare(&sql)?;
    bind_filters(&mut stmt, filters)?;
    bind_window(&mut stmt, from, other)?;
    collect_rows(stmt, schema, items)
}

/// Primary keys deleted after `from` by anyone but `other` whose row is
/// still gone.
pub(crate) fn deletes(
    conn: &Connection,
    schema: &TableSchema,
    from: u64,
    other: Uuid,
    items: &mut Vec<SyncItem>,
) -> SqliteResult<usize> {
    let sql = format!(
        "SELECT l.pk AS {key}
         FROM __rowsync_log l
         WHERE l.tbl = {tbl} AND l.op = 'D' AND l.id > @__from
           AND (l.src IS NULL OR l.src <> @__other)
           AND l.id = (SELECT MAX(id) FROM __rowsync_log WHERE tbl = l.tbl AND pk = l.pk)
           AND NOT EXISTS (SELECT 1 FROM {table} WHERE {key} = l.pk)
         ORDER BY l.id",
        key = schema.quoted_key(),
        tbl = quote_literal(&schema.name),
        table = schema.quoted_name(),
    );
    let mut stmt = conn.prepare(&sql)?;
    bind_window(&mut stmt, from, other)?;

    let before = items.len();
    let mut rows = stmt.raw_query();
    let key = schema.primary_key();
    while let Some(row) = rows.next()? {
        let value = from_sql(row.get_ref(0)?, key.kind).map_err(|e| SqliteError::value(key.name.as_str(), e))?;
        items.push(SyncItem::new(schema.name.clone(), ChangeType::Delete).with_value(key.name.clone(), value));
    }
    Ok(items.len() - before)
}

fn bind_window(stmt: &mut Statement<'_>, from: u64, other: Uuid) -> SqliteResult<()> {
    if let Some(index) = stmt.parameter_index("@__from")? {
        stmt.raw_bind_parameter(index, to_db_version(from))?;
    }
    if let Some(index) = stmt.parameter_index("@__other")? {
        stmt.raw_bind_parameter(index, other.hyphenated().to_string())?;
    }
    Ok(())
}
