// SQLite persistence layer for the auction draw state.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::store::StateStore;

/// SQLite-backed key-value store. The auction blob lives under a single key
/// and is always written and read as a whole.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Key under which the auction state blob is stored.
    pub const AUCTION_STATE_KEY: &'static str = "auction_draw_state";

    /// Open (or create) a SQLite database at `path` and ensure the schema
    /// exists. Pass `":memory:"` for an ephemeral database (useful for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS draw_state (
                key      TEXT PRIMARY KEY,
                value    TEXT NOT NULL,
                saved_at TEXT NOT NULL
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn save_state(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO draw_state (key, value, saved_at) VALUES (?1, ?2, ?3)",
            params![key, value, Utc::now().to_rfc3339()],
        )
        .context("failed to save state")?;
        Ok(())
    }

    /// Load the raw value stored under `key`. Returns `None` if the key does
    /// not exist. The value is not parsed here.
    pub fn load_state(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT value FROM draw_state WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .context("failed to load state")
    }

    /// When `key` was last written.
    pub fn saved_at(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn();
        let raw: Option<String> = conn
            .query_row(
                "SELECT saved_at FROM draw_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("failed to load saved_at")?;
        Ok(raw
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    pub fn delete_state(&self, key: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute("DELETE FROM draw_state WHERE key = ?1", params![key])
            .context("failed to delete state")?;
        Ok(())
    }
}

impl StateStore for Database {
    fn load_blob(&self) -> Result<Option<String>> {
        self.load_state(Self::AUCTION_STATE_KEY)
    }

    fn save_blob(&self, json: &str) -> Result<()> {
        self.save_state(Self::AUCTION_STATE_KEY, json)
    }

    fn clear(&self) -> Result<()> {
        self.delete_state(Self::AUCTION_STATE_KEY)
    }

    fn saved_at(&self) -> Result<Option<DateTime<Utc>>> {
        Database::saved_at(self, Self::AUCTION_STATE_KEY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::{AuctionState, CompletedEntry, Identifier, Outcome, Phase};

    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory db should open")
    }

    fn id(n: u32) -> Identifier {
        Identifier::new(n).unwrap()
    }

    #[test]
    fn open_creates_table() {
        let db = test_db();
        let conn = db.conn();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'draw_state'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn load_state_returns_none_for_missing_key() {
        let db = test_db();
        assert!(db.load_state("nope").unwrap().is_none());
        assert!(db.saved_at("nope").unwrap().is_none());
    }

    #[test]
    fn save_state_overwrites_previous_value() {
        let db = test_db();
        db.save_state("k", "one").unwrap();
        db.save_state("k", "two").unwrap();
        assert_eq!(db.load_state("k").unwrap().as_deref(), Some("two"));
        assert!(db.saved_at("k").unwrap().is_some());
    }

    #[test]
    fn auction_state_round_trip() {
        let db = test_db();
        let state = AuctionState {
            phase: Phase::Main,
            main_pool: vec![id(3), id(1)],
            unsold_pool: vec![id(4)],
            completed: vec![CompletedEntry { id: id(2), status: Outcome::Sold }],
            current_id: Some(id(5)),
            pending_animation: true,
        };
        db.save(&state).unwrap();
        assert_eq!(db.load().unwrap(), Some(state));
    }

    #[test]
    fn store_reports_when_auction_was_saved() {
        let db = test_db();
        assert!(StateStore::saved_at(&db).unwrap().is_none());
        db.save(&AuctionState::default()).unwrap();
        let stamp = StateStore::saved_at(&db).unwrap().expect("timestamp after save");
        assert!(stamp <= Utc::now());
        db.clear().unwrap();
        assert!(StateStore::saved_at(&db).unwrap().is_none());
    }

    #[test]
    fn corrupt_blob_is_treated_as_absent() {
        let db = test_db();
        db.save_state(Database::AUCTION_STATE_KEY, "{\"auctionStarted\": tru")
            .unwrap();
        assert!(db.load().unwrap().is_none());
    }

    #[test]
    fn clear_removes_only_the_auction_key() {
        let db = test_db();
        db.save(&AuctionState::default()).unwrap();
        db.save_state("other", "kept").unwrap();
        db.clear().unwrap();
        assert!(db.load_blob().unwrap().is_none());
        assert_eq!(db.load_state("other").unwrap().as_deref(), Some("kept"));
    }

    #[test]
    fn file_backed_state_survives_reopen() {
        let dir = std::env::temp_dir().join("wicket_db_reopen_test");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("wicket.db");
        let path = path.to_str().unwrap();

        let state = AuctionState {
            phase: Phase::Complete,
            completed: vec![CompletedEntry { id: id(1), status: Outcome::Unsold }],
            ..Default::default()
        };
        {
            let db = Database::open(path).unwrap();
            db.save(&state).unwrap();
        }
        let db = Database::open(path).unwrap();
        assert_eq!(db.load().unwrap(), Some(state));

        drop(db);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
