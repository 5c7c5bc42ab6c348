//! Database connection management with WAL mode support.

use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

use super::migrations::run_migrations;
use crate::error::Result;

/// SQLite-backed storage engine shared by every service. Each service
/// opens its own file under `data/` (spec §6: "sessions DB is isolated
/// from the control-plane DB; checkpoint SQLite file is per-orchestrator-
/// variant").
#[derive(Clone)]
pub struct Storage {
    db_path: String,
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    /// Open or create a database at `db_path`, running migrations.
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Self::create_connection(db_path)?;
        run_migrations(&conn)?;
        Ok(Self {
            db_path: db_path.to_string(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_pragmas(&conn)?;
        run_migrations(&conn)?;
        Ok(Self {
            db_path: ":memory:".to_string(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn create_connection(db_path: &str) -> Result<Connection> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        Self::configure_pragmas(&conn)?;
        Ok(conn)
    }

    fn configure_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=30000;
            PRAGMA foreign_keys=ON;
            "#,
        )?;
        Ok(())
    }

    /// Lock and borrow the connection for single-threaded use.
    pub fn connection(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Execute a closure with the connection.
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a closure inside a transaction.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let storage = Storage::open_in_memory().unwrap();
        assert_eq!(storage.db_path(), ":memory:");
    }
}
