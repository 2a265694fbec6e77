//! Error types for the SQLite adapter.

use rowsync_codec::CodecError;
use rowsync_engine::SyncError;
use thiserror::Error;

/// Result type for adapter-internal operations.
pub type SqliteResult<T> = Result<T, SqliteError>;

/// Errors raised inside the SQLite adapter.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// The database reported an error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A configured table does not exist.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// A configured table cannot be tracked.
    #[error("table '{table}' is not supported: {reason}")]
    UnsupportedTable {
        /// Table name.
        table: String,
        /// Why it was refused.
        reason: String,
    },

    /// An item is missing its primary key column.
    #[error("item for table '{table}' has no value for primary key '{column}'")]
    MissingPrimaryKey {
        /// Table name.
        table: String,
        /// Primary key column.
        column: String,
    },

    /// A stored value could not be read as its column's kind.
    #[error("column '{column}': {source}")]
    Value {
        /// Column name.
        column: String,
        /// The conversion failure.
        #[source]
        source: CodecError,
    },

    /// The configuration file could not be read or parsed.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Persisted sync state is malformed.
    #[error("corrupted sync state: {0}")]
    Corrupted(String),
}

impl SqliteError {
    /// Creates an unsupported-table error.
    pub fn unsupported(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedTable {
            table: table.into(),
            reason: reason.into(),
        }
    }

    /// Creates a value conversion error for `column`.
    pub fn value(column: impl Into<String>, source: CodecError) -> Self {
        Self::Value {
            column: column.into(),
            source,
        }
    }

    /// Returns true if the database rejected a write on a constraint.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Database(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

impl From<SqliteError> for SyncError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::TableNotFound(_)
            | SqliteError::UnsupportedTable { .. }
            | SqliteError::Configuration(_) => SyncError::Configuration(err.to_string()),
            SqliteError::MissingPrimaryKey { .. } => SyncError::Protocol(err.to_string()),
            other => SyncError::storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_cross_the_boundary_as_configuration() {
        let err: SyncError = SqliteError::unsupported("t", "composite primary key").into();
        assert!(matches!(err, SyncError::Configuration(ref m) if m.contains("composite")));
    }

    #[test]
    fn database_errors_become_storage() {
        let err: SyncError = SqliteError::Database(rusqlite::Error::QueryReturnedNoRows).into();
        assert!(matches!(err, SyncError::Storage(_)));
        assert!(!err.is_retryable());
    }
}
