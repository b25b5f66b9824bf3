//! SQLite-backed target store

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::store::{StoreError, TargetStore};

/// Target store in a single `addresses` table.
///
/// Each handle owns one connection; worker processes open their own handle
/// on the same file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened target database");
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        // Several worker processes may read while another handle writes
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS addresses (address TEXT PRIMARY KEY)",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))
    }
}

impl TargetStore for SqliteStore {
    fn insert_if_absent(&self, identifier: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO addresses (address) VALUES (?1)",
            params![identifier],
        )?;
        Ok(changed == 1)
    }

    fn exists(&self, identifier: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached("SELECT 1 FROM addresses WHERE address = ?1")?;
        let found = stmt
            .query_row(params![identifier], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn load_all(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT address FROM addresses")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let identifiers = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(identifiers)
    }

    fn len(&self) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM addresses", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn insert_many(&self, identifiers: &[String]) -> Result<Vec<Result<bool, StoreError>>, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let outcomes = {
            let mut stmt = tx.prepare_cached("INSERT OR IGNORE INTO addresses (address) VALUES (?1)")?;
            identifiers
                .iter()
                .map(|identifier| {
                    stmt.execute(params![identifier])
                        .map(|changed| changed == 1)
                        .map_err(StoreError::from)
                })
                .collect::<Vec<_>>()
        };

        tx.commit()?;
        Ok(outcomes)
    }
}
