use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use super::SettingsStore;

/// Settings persisted in a single-table `SQLite` database.
///
/// Each operation opens its own connection, so the store is `Send + Sync`
/// without holding a connection across threads.
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory: {}", parent.display())
            })?;
        }

        let store = Self { db_path };
        store.init_db()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn init_db(&self) -> Result<()> {
        let conn = self.connect()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )
        .context("Failed to create settings table")?;

        Ok(())
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.db_path).with_context(|| {
            format!("Failed to open settings database: {}", self.db_path.display())
        })
    }

    fn try_get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.connect()?;
        let value = conn
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
            .context("Failed to read setting")?;
        Ok(value)
    }

    fn try_set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at)
             VALUES (?1, ?2, CURRENT_TIMESTAMP)",
            [key, value],
        )
        .context("Failed to write setting")?;
        Ok(())
    }

    fn try_remove(&self, key: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM settings WHERE key = ?1", [key])
            .context("Failed to delete setting")?;
        Ok(())
    }
}

impl SettingsStore for SqliteStore {
    fn get(&self, key: &str) -> Option<String> {
        self.try_get(key).unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "settings storage unavailable");
            None
        })
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(e) = self.try_set(key, value) {
            tracing::warn!(key, error = %e, "settings storage unavailable");
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.try_remove(key) {
            tracing::warn!(key, error = %e, "settings storage unavailable");
        }
    }
}
