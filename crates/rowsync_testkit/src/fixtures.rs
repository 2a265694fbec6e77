//! Test fixtures and store helpers.
//!
//! Every fixture store carries the same small application schema, a `users`
//! table and a `posts` table referencing it, and is provisioned for sync.

use rowsync_engine::{CancelToken, ProvisioningProvider, SyncAgent, SyncProvider};
use rowsync_sqlite::{SqliteSyncConfiguration, SqliteSyncProvider, SyncTable};
use rusqlite::{params, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

/// The application schema used by fixture stores.
pub const APP_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL,
    email TEXT UNIQUE
);

CREATE TABLE IF NOT EXISTS posts (
    id         INTEGER PRIMARY KEY,
    user_id    INTEGER NOT NULL REFERENCES users (id),
    title      TEXT,
    published  BOOLEAN NOT NULL DEFAULT 0,
    created_at DATETIME
);
"#;

/// Sync configuration for [`APP_SCHEMA`], users before posts.
pub fn app_config() -> SqliteSyncConfiguration {
    SqliteSyncConfiguration::new()
        .with_table(SyncTable::new("users"))
        .with_table(SyncTable::new("posts"))
}

/// A provisioned store with automatic cleanup.
pub struct TestStore {
    /// The provider.
    pub store: Arc<SqliteSyncProvider>,
    path: Option<PathBuf>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates an in-memory store.
    pub fn memory() -> Self {
        Self::memory_with(app_config())
    }

    /// Creates an in-memory store with a custom table configuration.
    pub fn memory_with(config: SqliteSyncConfiguration) -> Self {
        Self {
            store: Arc::new(open(config.in_memory())),
            path: None,
            _temp_dir: None,
        }
    }

    /// Creates a store in a fresh temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("store.db");
        let mut store = Self::open_at(&path);
        store._temp_dir = Some(temp_dir);
        store
    }

    /// Opens (or creates) a store at `path`. The caller owns the file.
    pub fn open_at(path: &Path) -> Self {
        Self {
            store: Arc::new(open(app_config().with_path(path))),
            path: Some(path.to_path_buf()),
            _temp_dir: None,
        }
    }

    /// Returns the database path if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns a shared handle to the provider.
    pub fn provider(&self) -> Arc<SqliteSyncProvider> {
        Arc::clone(&self.store)
    }

    /// Returns the store id.
    pub fn id(&self) -> Uuid {
        self.store
            .store_id(&CancelToken::new())
            .expect("Failed to read store id")
    }

    /// Inserts a user.
    pub fn insert_user(&self, id: i64, name: &str) {
        self.exec("INSERT INTO users (id, name) VALUES (?1, ?2)", params![id, name]);
    }

    /// Renames a user.
    pub fn update_user(&self, id: i64, name: &str) {
        self.exec("UPDATE users SET name = ?2 WHERE id = ?1", params![id, name]);
    }

    /// Deletes a user.
    pub fn delete_user(&self, id: i64) {
        self.exec("DELETE FROM users WHERE id = ?1", params![id]);
    }

    /// Inserts a post.
    pub fn insert_post(&self, id: i64, user_id: i64, title: &str) {
        self.exec(
            "INSERT INTO posts (id, user_id, title) VALUES (?1, ?2, ?3)",
            params![id, user_id, title],
        );
    }

    /// Returns a user's name.
    pub fn user_name(&self, id: i64) -> Option<String> {
        self.store
            .execute(|conn| {
                conn.query_row("SELECT name FROM users WHERE id = ?1", [id], |row| row.get(0))
                    .optional()
            })
            .expect("Failed to read user")
    }

    /// Returns all users ordered by id.
    pub fn users(&self) -> Vec<(i64, String)> {
        self.store
            .execute(|conn| {
                let mut stmt = conn.prepare("SELECT id, name FROM users ORDER BY id")?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
                rows.collect()
            })
            .expect("Failed to read users")
    }

    /// Number of rows in `table`.
    pub fn count(&self, table: &str) -> usize {
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", table);
        let count: i64 = self
            .store
            .execute(|conn| conn.query_row(&sql, [], |row| row.get(0)))
            .expect("Failed to count rows");
        count as usize
    }

    /// Number of entries in the change log.
    pub fn log_len(&self) -> usize {
        self.count("__rowsync_log")
    }

    fn exec(&self, sql: &str, params: impl rusqlite::Params) {
        self.store
            .execute(|conn| conn.execute(sql, params))
            .expect("Failed to write");
    }
}

impl std::ops::Deref for TestStore {
    type Target = SqliteSyncProvider;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

fn open(config: SqliteSyncConfiguration) -> SqliteSyncProvider {
    let provider = SqliteSyncProvider::open(config).expect("Failed to open store");
    provider
        .execute(|conn| conn.execute_batch(APP_SCHEMA))
        .expect("Failed to create schema");
    provider
        .apply_provision(&CancelToken::new())
        .expect("Failed to provision store");
    provider
}

/// An agent syncing `local` with `remote`, both in-process.
pub fn agent(local: &TestStore, remote: &TestStore) -> SyncAgent<Arc<SqliteSyncProvider>, Arc<SqliteSyncProvider>> {
    SyncAgent::new(local.provider(), remote.provider())
}

/// Runs a test with two empty in-memory stores.
pub fn with_store_pair<F, R>(f: F) -> R
where
    F: FnOnce(&TestStore, &TestStore) -> R,
{
    let a = TestStore::memory();
    let b = TestStore::memory();
    f(&a, &b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_stores_are_tracked() {
        let store = TestStore::memory();
        store.insert_user(1, "Alice");
        store.update_user(1, "Alicia");
        assert_eq!(store.user_name(1).as_deref(), Some("Alicia"));
        assert_eq!(store.log_len(), 2);
    }

    #[test]
    fn file_store_survives_reopen() {
        let store = TestStore::file();
        let path = store.path().unwrap().to_path_buf();
        let id = store.id();
        store.insert_user(7, "Grace");

        let reopened = TestStore::open_at(&path);
        assert_eq!(reopened.id(), id);
        assert_eq!(reopened.users(), vec![(7, "Grace".to_string())]);
    }
}
