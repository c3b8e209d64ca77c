//! SQLite-backed storage shared by all scraper jobs.
//!
//! One `StorageManager` exists per process. Its internal mutex serializes
//! statement execution, so concurrent scraper jobs can share a single
//! instance through an `Arc` without further locking. Prepared statements go
//! through the connection's statement cache and are reused across binds.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::error::Result;

/// Owns the relational connection used by every scraper.
pub struct StorageManager
{
    conn: Mutex<Connection>,
}

impl StorageManager
{
    /// Open (or create) a database file.
    pub fn open(path: &Path) -> Result<Self>
    {
        Self::configure(Connection::open(path)?)
    }

    /// Open a private in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self>
    {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self>
    {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        // journal_mode returns the resulting mode as a row
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.set_prepared_statement_cache_capacity(32);
        Ok(StorageManager { conn: Mutex::new(conn) })
    }

    /// Fire-and-forget execution of one or more statements (DDL, simple DML).
    pub fn execute_batch(&self, sql: &str) -> Result<()>
    {
        self.conn.lock().unwrap().execute_batch(sql)?;
        Ok(())
    }

    /// Run `f` inside a single transaction with immediate behavior.
    ///
    /// Commits when `f` returns `Ok`; any error rolls the transaction back
    /// (on drop) and is propagated to the caller. Transactions are not
    /// nested.
    pub fn transaction<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T>
    {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run a read-only query, mapping each row through `f`.
    pub fn query<T>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        f: impl FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>>
    {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params, f)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::error::ScrapeError;

    #[test]
    fn test_transaction_commits_on_ok()
    {
        let sm = StorageManager::open_in_memory().unwrap();
        sm.execute_batch("CREATE TABLE t (v INTEGER)").unwrap();
        sm.transaction(|tx| {
            tx.execute("INSERT INTO t (v) VALUES (1)", [])?;
            Ok(())
        })
        .unwrap();

        let rows = sm.query("SELECT v FROM t", [], |row| row.get::<_, i64>(0)).unwrap();
        assert_eq!(rows, vec![1]);
    }

    #[test]
    fn test_transaction_rolls_back_on_err()
    {
        let sm = StorageManager::open_in_memory().unwrap();
        sm.execute_batch("CREATE TABLE t (v INTEGER)").unwrap();
        let result: Result<()> = sm.transaction(|tx| {
            tx.execute("INSERT INTO t (v) VALUES (1)", [])?;
            Err(ScrapeError::InvalidRecord("boom".into()))
        });
        assert!(result.is_err());

        let rows = sm.query("SELECT v FROM t", [], |row| row.get::<_, i64>(0)).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_open_on_disk()
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layouts.db");
        let sm = StorageManager::open(&path).unwrap();
        sm.execute_batch("CREATE TABLE t (v INTEGER)").unwrap();
        assert!(path.exists());
    }
}
