//! SQLite-backed event store: recorded occurrences plus per-entity polling state.
//!
//! The database lives at `~/.capwatch/capwatch.db` unless the config points
//! elsewhere. The poller is the only writer; front-end queries open their own
//! read-only connection and rely on WAL mode to never see a half-applied batch.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags};

pub mod types;
pub use types::*;

pub mod occurrences;
pub mod polling;

pub struct EventDb {
    conn: Connection,
}

impl EventDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(val) => {
                if let Err(e) = self.conn.execute_batch("COMMIT") {
                    let _ = self.conn.execute_batch("ROLLBACK");
                    return Err(e.into());
                }
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Open (or create) the database at `~/.capwatch/capwatch.db` and apply the schema.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::default_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        // WAL lets read-only front-end connections run alongside the poller
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        Ok(Self { conn })
    }

    /// Open an in-memory database with the full schema applied.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;
        Ok(Self { conn })
    }

    /// Open a database at an explicit path in read-only mode. Used by the
    /// query commands so they can run while `capwatch run` owns writes.
    pub fn open_readonly_at(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    /// Whether the file at `path` already carries the current schema.
    ///
    /// Read-only callers use this to decide whether a writable open (which
    /// migrates) is needed first, e.g. for a database left by the legacy bot.
    pub fn schema_is_current_at(path: &Path) -> Result<bool, DbError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(crate::migrations::is_up_to_date(&conn))
    }

    /// Resolve the default database path: `~/.capwatch/capwatch.db`.
    pub fn default_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".capwatch").join("capwatch.db"))
    }

    /// Number of rows in `polling_state` (diagnostics).
    pub fn tracked_entity_count(&self) -> Result<usize, DbError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM polling_state", params![], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
pub mod test_utils {
    use super::EventDb;

    /// Create a temporary file-backed database for testing.
    ///
    /// We leak the `TempDir` so the directory persists for the duration of the test.
    pub fn test_db() -> EventDb {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("test.db");
        std::mem::forget(dir);
        EventDb::open_at(path).expect("Failed to open test database")
    }
}
