//! Guarded row writes for one apply transaction.

use crate::error::{SqliteError, SqliteResult};
use crate::provision::to_db_version;
use crate::schema::{quote_ident, quote_literal, TableSchema};
use crate::values::to_sql;
use rowsync_engine::{ItemWriter, SyncResult};
use rowsync_protocol::{ChangeType, SyncItem, TypedValue};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use std::collections::HashMap;
use uuid::Uuid;

/// Writes incoming items against the tables of one store.
///
/// Every statement carries the optimistic guard inline: the row is only
/// touched when its newest log entry is not newer than the change set's
/// target version, or when the write is forced. For inserts this catches a
/// row deleted locally after the target version.
pub(crate) struct SqliteItemWriter<'c> {
    conn: &'c Connection,
    tables: HashMap<String, TableSchema>,
    source: Uuid,
    before: u64,
}

impl<'c> SqliteItemWriter<'c> {
    /// `before` is the log version prior to the apply; entries above it
    /// belong to this apply.
    pub(crate) fn new(conn: &'c Connection, schemas: Vec<TableSchema>, source: Uuid, before: u64) -> Self {
        let tables = schemas
            .into_iter()
            .map(|schema| (schema.name.to_ascii_lowercase(), schema))
            .collect();
        Self {
            conn,
            tables,
            source,
            before,
        }
    }

    fn schema(&self, table: &str) -> SqliteResult<&TableSchema> {
        self.tables
            .get(&table.to_ascii_lowercase())
            .ok_or_else(|| SqliteError::TableNotFound(table.to_string()))
    }

    fn key_value(schema: &TableSchema, item: &SyncItem) -> SqliteResult<Value> {
        let column = &schema.primary_key().name;
        item.get(column)
            .filter(|v| !v.is_null())
            .map(to_sql)
            .ok_or_else(|| SqliteError::MissingPrimaryKey {
                table: schema.name.clone(),
                column: column.clone(),
            })
    }

    /// Item columns that exist locally, in item order.
    fn known_columns<'i>(schema: &TableSchema, item: &'i SyncItem) -> Vec<(String, &'i TypedValue)> {
        item.values
            .iter()
            .filter_map(|(name, value)| schema.column(name).map(|c| (c.name.clone(), value)))
            .collect()
    }

    fn guard(schema: &TableSchema) -> String {
        format!(
            "COALESCE((SELECT MAX(l.id) FROM __rowsync_log l WHERE l.tbl = {} AND l.pk = {}.{}), 0)",
            quote_literal(&schema.name),
            schema.quoted_name(),
            schema.quoted_key()
        )
    }

    /// Log version of a row that may no longer exist, keyed by a bound value.
    fn keyed_guard(schema: &TableSchema) -> String {
        format!(
            "COALESCE((SELECT MAX(l.id) FROM __rowsync_log l WHERE l.tbl = {} AND l.pk = ?), 0)",
            quote_literal(&schema.name)
        )
    }

    fn insert(&self, schema: &TableSchema, item: &SyncItem, target: u64, force: bool) -> SqliteResult<usize> {
        let key = Self::key_value(schema, item)?;
        let columns = Self::known_columns(schema, item);
        let names: Vec<String> = columns.iter().map(|(name, _)| quote_ident(name)).collect();
        let marks = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}) SELECT {} WHERE ? OR {} <= ?",
            schema.quoted_name(),
            names.join(", "),
            marks,
            Self::keyed_guard(schema)
        );

        let mut values: Vec<Value> = columns.iter().map(|(_, value)| to_sql(value)).collect();
        values.push(Value::Integer(i64::from(force)));
        values.push(key);
        values.push(Value::Integer(to_db_version(target)));
        Ok(self.conn.execute(&sql, params_from_iter(values))?)
    }

    fn update(&self, schema: &TableSchema, item: &SyncItem, target: u64, force: bool) -> SqliteResult<usize> {
        let key = Self::key_value(schema, item)?;
        let columns: Vec<_> = Self::known_columns(schema, item)
            .into_iter()
            .filter(|(name, _)| !schema.is_primary_key(name))
            .collect();

        let assignments = if columns.is_empty() {
            format!("{0} = {0}", schema.quoted_key())
        } else {
            columns
                .iter()
                .map(|(name, _)| format!("{} = ?", quote_ident(name)))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ? AND (? OR {} <= ?)",
            schema.quoted_name(),
            assignments,
            schema.quoted_key(),
            Self::guard(schema)
        );

        let mut values: Vec<Value> = columns.iter().map(|(_, value)| to_sql(value)).collect();
        values.push(key);
        values.push(Value::Integer(i64::from(force)));
        values.push(Value::Integer(to_db_version(target)));
        Ok(self.conn.execute(&sql, params_from_iter(values))?)
    }

    fn delete(&self, schema: &TableSchema, item: &SyncItem, target: u64, force: bool) -> SqliteResult<usize> {
        let key = Self::key_value(schema, item)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1 AND (?2 OR {} <= ?3)",
            schema.quoted_name(),
            schema.quoted_key(),
            Self::guard(schema)
        );
        Ok(self
            .conn
            .execute(&sql, params![key, force, to_db_version(target)])?)
    }
}

impl ItemWriter for SqliteItemWriter<'_> {
    fn knows_table(&self, table: &str) -> bool {
        self.tables.contains_key(&table.to_ascii_lowercase())
    }

    fn write(
        &self,
        item: &SyncItem,
        change_type: ChangeType,
        target_version: u64,
        force: bool,
    ) -> SyncResult<usize> {
        let schema = self.schema(&item.table_name)?;
        let result = match change_type {
            ChangeType::Insert => self.insert(schema, item, target_version, force),
            ChangeType::Update => self.update(schema, item, target_version, force),
            ChangeType::Delete => self.delete(schema, item, target_version, force),
        };
        match result {
            Err(err) if err.is_constraint_violation() => {
                tracing::debug!(table = %schema.name, error = %err, "write refused by a constraint");
                Ok(0)
            }
            other => Ok(other?),
        }
    }

    fn exists(&self, item: &SyncItem) -> SyncResult<bool> {
        let schema = self.schema(&item.table_name)?;
        let key = Self::key_value(schema, item)?;
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = ?1)",
            schema.quoted_name(),
            schema.quoted_key()
        );
        let found = self
            .conn
            .query_row(&sql, [key], |row| row.get(0))
            .map_err(SqliteError::from)?;
        Ok(found)
    }

    fn local_version(&self, item: &SyncItem) -> SyncResult<u64> {
        let schema = self.schema(&item.table_name)?;
        let key = Self::key_value(schema, item)?;
        let version: i64 = self
            .conn
            .query_row(&format!("SELECT {}", Self::keyed_guard(schema)), [key], |row| row.get(0))
            .map_err(SqliteError::from)?;
        Ok(u64::try_from(version).unwrap_or(0))
    }

    fn stamp_source(&self) -> SyncResult<()> {
        self.conn
            .execute(
                "UPDATE __rowsync_log SET src = ?1 WHERE id > ?2 AND src IS NULL",
                params![self.source.hyphenated().to_string(), to_db_version(self.before)],
            )
            .map_err(SqliteError::from)?;
        Ok(())
    }
}
