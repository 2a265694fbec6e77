//! Table introspection and the declared-type mapping.

use crate::error::{SqliteError, SqliteResult};
use rowsync_codec::ValueKind;
use rusqlite::Connection;

/// Quotes an identifier for use in SQL text.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes a string literal for use in SQL text.
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Maps a declared column type to the kind its values travel as.
///
/// Returns `None` for a column without a declared type; such values take
/// the kind of their storage class.
pub fn kind_for_declared_type(declared: &str) -> Option<ValueKind> {
    let ty = declared.trim().to_ascii_uppercase();
    // Drop a length or precision suffix: VARCHAR(20), DECIMAL(10,2).
    let ty = ty.split('(').next().unwrap_or("").trim();
    if ty.is_empty() {
        return None;
    }

    let kind = if ty.starts_with("BOOL") {
        ValueKind::Boolean
    } else if ty == "UUID" || ty == "GUID" || ty == "UNIQUEIDENTIFIER" {
        ValueKind::Guid
    } else if ty.starts_with("DATE") || ty.starts_with("TIME") {
        ValueKind::DateTime
    } else if ty == "DECIMAL" || ty == "NUMERIC" || ty == "MONEY" {
        ValueKind::Decimal
    } else if matches!(ty, "INT" | "INT32" | "SMALLINT" | "TINYINT" | "MEDIUMINT") {
        ValueKind::Int32
    } else if ty.contains("INT") {
        ValueKind::Int64
    } else if ty == "FLOAT" {
        ValueKind::Float
    } else if ty == "REAL" || ty.starts_with("DOUBLE") {
        ValueKind::Double
    } else if ty.contains("CHAR") || ty.contains("TEXT") || ty == "CLOB" {
        ValueKind::String
    } else if ty == "BLOB" {
        ValueKind::ByteArray
    } else {
        ValueKind::String
    };
    Some(kind)
}

/// One column of a tracked table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Declared type as written in the table definition.
    pub declared_type: String,
    /// Kind values of this column travel as.
    pub kind: Option<ValueKind>,
}

/// The shape of a tracked table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name as stored in the database.
    pub name: String,
    /// Columns in definition order.
    pub columns: Vec<ColumnInfo>,
    primary_key: usize,
}

impl TableSchema {
    /// Reads a table's columns and checks it has a single-column primary key.
    pub fn load(conn: &Connection, table: &str) -> SqliteResult<Self> {
        let mut stmt =
            conn.prepare("SELECT name, type, pk FROM pragma_table_info(?1) ORDER BY cid")?;
        let rows = stmt.query_map([table], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut columns = Vec::new();
        let mut keys = Vec::new();
        for row in rows {
            let (name, declared_type, pk) = row?;
            if pk > 0 {
                keys.push(columns.len());
            }
            columns.push(ColumnInfo {
                kind: kind_for_declared_type(&declared_type),
                name,
                declared_type,
            });
        }

        if columns.is_empty() {
            return Err(SqliteError::TableNotFound(table.to_string()));
        }
        let primary_key = match keys.as_slice() {
            [single] => *single,
            [] => return Err(SqliteError::unsupported(table, "no primary key")),
            _ => return Err(SqliteError::unsupported(table, "composite primary key")),
        };

        Ok(Self {
            name: table.to_string(),
            columns,
            primary_key,
        })
    }

    /// The primary key column.
    pub fn primary_key(&self) -> &ColumnInfo {
        &self.columns[self.primary_key]
    }

    /// Looks a column up by name, ignoring ASCII case.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Returns true if `name` is the primary key column.
    pub fn is_primary_key(&self, name: &str) -> bool {
        self.primary_key().name.eq_ignore_ascii_case(name)
    }

    pub(crate) fn quoted_name(&self) -> String {
        quote_ident(&self.name)
    }

    pub(crate) fn quoted_key(&self) -> String {
        quote_ident(&self.primary_key().name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_type_mapping() {
        let cases = [
            ("BOOLEAN", Some(ValueKind::Boolean)),
            ("uuid", Some(ValueKind::Guid)),
            ("DATETIME", Some(ValueKind::DateTime)),
            ("TIMESTAMP", Some(ValueKind::DateTime)),
            ("DECIMAL(10,2)", Some(ValueKind::Decimal)),
            ("INT", Some(ValueKind::Int32)),
            ("SMALLINT", Some(ValueKind::Int32)),
            ("INTEGER", Some(ValueKind::Int64)),
            ("BIGINT", Some(ValueKind::Int64)),
            ("FLOAT", Some(ValueKind::Float)),
            ("REAL", Some(ValueKind::Double)),
            ("DOUBLE PRECISION", Some(ValueKind::Double)),
            ("VARCHAR(20)", Some(ValueKind::String)),
            ("TEXT", Some(ValueKind::String)),
            ("BLOB", Some(ValueKind::ByteArray)),
            ("", None),
        ];
        for (declared, expected) in cases {
            assert_eq!(kind_for_declared_type(declared), expected, "{}", declared);
        }
    }

    #[test]
    fn load_reads_columns_and_key() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, extra)")
            .unwrap();

        let schema = TableSchema::load(&conn, "users").unwrap();
        assert_eq!(schema.columns.len(), 3);
        assert_eq!(schema.primary_key().name, "id");
        assert_eq!(schema.primary_key().kind, Some(ValueKind::Int64));
        assert_eq!(schema.column("NAME").unwrap().kind, Some(ValueKind::String));
        assert_eq!(schema.column("extra").unwrap().kind, None);
        assert!(schema.is_primary_key("ID"));
    }

    #[test]
    fn load_refuses_untrackable_tables() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE nokey (a TEXT);
             CREATE TABLE pair (a TEXT, b TEXT, PRIMARY KEY (a, b));",
        )
        .unwrap();

        assert!(matches!(TableSchema::load(&conn, "missing"), Err(SqliteError::TableNotFound(_))));
        assert!(matches!(
            TableSchema::load(&conn, "nokey"),
            Err(SqliteError::UnsupportedTable { ref reason, .. }) if reason == "no primary key"
        ));
        assert!(matches!(
            TableSchema::load(&conn, "pair"),
            Err(SqliteError::UnsupportedTable { ref reason, .. }) if reason == "composite primary key"
        ));
    }

    #[test]
    fn quoting() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("o'brien"), "'o''brien'");
    }
}
