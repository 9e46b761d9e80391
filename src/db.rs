//! Database module for `SQLite` storage (feed cache, app state)

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

use crate::error::Result;
use crate::models::{FeedKind, FeedRecord};
use crate::paths;

const MIGRATION_FLAG: &str = "did_migrate_authentications";

/// Database connection wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create the database at the default location
    pub fn open() -> anyhow::Result<Self> {
        let path = paths::database_path()?;
        Ok(Self::open_path(&path)?)
    }

    /// Open or create the database at a specific path
    pub fn open_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        let db = Self { conn };
        db.init()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r"
            -- Most recent pages of each cached feed, per account
            CREATE TABLE IF NOT EXISTS feed_cache (
                credential_key TEXT NOT NULL,
                kind TEXT NOT NULL,
                position INTEGER NOT NULL,
                record_json TEXT NOT NULL,
                cached_at TEXT NOT NULL,
                PRIMARY KEY (credential_key, kind, position)
            );

            -- Small key/value flags
            CREATE TABLE IF NOT EXISTS app_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_feed_cache_credential ON feed_cache(credential_key);
            ",
        )?;

        Ok(())
    }

    // ==================== Feed Cache ====================

    /// Replace the cached records of one feed for one account
    pub fn store_feed(&self, credential_key: &str, kind: &FeedKind, records: &[FeedRecord]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let kind_name = kind.name();
        let cached_at = Utc::now().to_rfc3339();

        tx.execute(
            "DELETE FROM feed_cache WHERE credential_key = ?1 AND kind = ?2",
            params![credential_key, kind_name],
        )?;

        {
            let mut stmt = tx.prepare(
                r"INSERT INTO feed_cache (credential_key, kind, position, record_json, cached_at)
                   VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (position, record) in records.iter().enumerate() {
                let json = serde_json::to_string(record)?;
                stmt.execute(params![credential_key, kind_name, position as i64, json, cached_at])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Get the cached records of one feed, in their original order
    pub fn load_feed(&self, credential_key: &str, kind: &FeedKind) -> Result<Vec<FeedRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT record_json FROM feed_cache
             WHERE credential_key = ?1 AND kind = ?2 ORDER BY position ASC",
        )?;

        let rows = stmt.query_map(params![credential_key, kind.name()], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for json in rows {
            match serde_json::from_str(&json?) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping unreadable cached {kind} record: {e}"),
            }
        }
        Ok(records)
    }

    /// Delete every cached feed of an account
    pub fn purge_credential(&self, credential_key: &str) -> Result<usize> {
        let count = self.conn.execute(
            "DELETE FROM feed_cache WHERE credential_key = ?1",
            params![credential_key],
        )?;
        Ok(count)
    }

    // ==================== App State ====================

    /// Whether legacy credentials still need to be migrated
    pub fn migration_required(&self) -> Result<bool> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM app_state WHERE key = ?1",
                params![MIGRATION_FLAG],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.as_deref() != Some("true"))
    }

    /// Record whether legacy credentials have been migrated
    pub fn set_migrated(&self, migrated: bool) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO app_state (key, value) VALUES (?1, ?2)",
            params![MIGRATION_FLAG, migrated.to_string()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Status;
    use tempfile::tempdir;

    fn records(kind: &FeedKind, ids: &[&str]) -> Vec<FeedRecord> {
        ids.iter()
            .map(|id| FeedRecord::status(kind.clone(), Status::new(id)))
            .collect()
    }

    #[test]
    fn test_database_init() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sqlite");
        let _db = Database::open_path(&path).unwrap();
    }

    #[test]
    fn test_feed_cache_replace_and_order() {
        let dir = tempdir().unwrap();
        let db = Database::open_path(&dir.path().join("test.sqlite")).unwrap();
        let kind = FeedKind::Home;

        let first = records(&kind, &["3", "2", "1"]);
        db.store_feed("tusk:a:1", &kind, &first).unwrap();
        assert_eq!(db.load_feed("tusk:a:1", &kind).unwrap(), first);

        db.store_feed("tusk:a:1", &kind, &records(&kind, &["5", "4"])).unwrap();
        assert_eq!(db.load_feed("tusk:a:1", &kind).unwrap().len(), 2);

        // Other feeds and accounts are separate
        assert!(db.load_feed("tusk:a:1", &FeedKind::NotificationAll).unwrap().is_empty());
        assert!(db.load_feed("tusk:b:2", &kind).unwrap().is_empty());
    }

    #[test]
    fn test_purge_credential() {
        let dir = tempdir().unwrap();
        let db = Database::open_path(&dir.path().join("test.sqlite")).unwrap();

        db.store_feed("tusk:a:1", &FeedKind::Home, &records(&FeedKind::Home, &["1"])).unwrap();
        db.store_feed("tusk:a:1", &FeedKind::NotificationAll, &records(&FeedKind::NotificationAll, &["2"])).unwrap();
        db.store_feed("tusk:b:2", &FeedKind::Home, &records(&FeedKind::Home, &["3"])).unwrap();

        assert_eq!(db.purge_credential("tusk:a:1").unwrap(), 2);
        assert!(db.load_feed("tusk:a:1", &FeedKind::Home).unwrap().is_empty());
        assert_eq!(db.load_feed("tusk:b:2", &FeedKind::Home).unwrap().len(), 1);
    }

    #[test]
    fn test_migration_flag() {
        let dir = tempdir().unwrap();
        let db = Database::open_path(&dir.path().join("test.sqlite")).unwrap();

        assert!(db.migration_required().unwrap());
        db.set_migrated(true).unwrap();
        assert!(!db.migration_required().unwrap());
        db.set_migrated(false).unwrap();
        assert!(db.migration_required().unwrap());
    }
}
