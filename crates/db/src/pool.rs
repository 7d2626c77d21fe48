//! Connection pool management.
//!
//! This module provides the [`Database`] struct which wraps an r2d2
//! connection pool for SQLite. The pool allows the async write path and
//! the reconciliation passes to each take their own connection while
//! sharing one database.
//!
//! # Transactions
//!
//! Every save point in the gateway is a single atomic commit: the planner
//! persists a whole batch change set in one [`transaction`] call, and each
//! mempool reconciliation pass opens its own. Use
//! [`transaction`](Database::transaction) for those;
//! [`with_connection`](Database::with_connection) suffices for reads.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};

use crate::error::DbError;
use crate::migrations;

/// A pooled SQLite connection, returned to the pool when dropped.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Counter giving each in-memory database a distinct shared-cache name.
static IN_MEMORY_DB_SEQ: AtomicU64 = AtomicU64::new(0);

/// Database handle with connection pooling.
///
/// Cheap to clone; clones share the pool. The schema is initialized (or
/// migrated) when the handle is opened.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Opens (creating if needed) the database at `path` and brings the
    /// schema up to the current version.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;",
            )
        });
        Self::from_manager(manager)
    }

    /// Opens a fresh in-memory database.
    ///
    /// The pool holds several connections, so a plain `:memory:` open
    /// would give each its own empty database; instead a uniquely named
    /// shared-cache database is used so all pooled connections see the
    /// same data. Intended for tests.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let seq = IN_MEMORY_DB_SEQ.fetch_add(1, Ordering::Relaxed);
        let uri = format!("file:gateway_mem_{seq}?mode=memory&cache=shared");
        let manager = SqliteConnectionManager::file(uri)
            .with_flags(
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI,
            )
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        Self::from_manager(manager)
    }

    fn from_manager(manager: SqliteConnectionManager) -> Result<Self, DbError> {
        let pool = Pool::builder().build(manager)?;
        let db = Self { pool };
        {
            let mut conn = db.connection()?;
            migrations::initialize(&mut conn)?;
        }
        Ok(db)
    }

    /// Obtains a connection from the pool.
    pub fn connection(&self) -> Result<PooledConnection, DbError> {
        self.pool.get().map_err(DbError::from)
    }

    /// Executes a closure within a database transaction.
    ///
    /// If the closure returns `Ok`, the transaction is committed; if it
    /// returns `Err`, the transaction is rolled back.
    pub fn transaction<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<T, DbError>,
    {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Executes a closure with a pooled connection, for reads and simple
    /// writes that do not need explicit transaction handling.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Connection) -> Result<T, DbError>,
    {
        let conn = self.connection()?;
        f(&conn)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_databases_are_isolated_from_each_other() {
        let a = Database::open_in_memory().unwrap();
        let b = Database::open_in_memory().unwrap();

        a.with_connection(|conn| {
            conn.execute(
                "INSERT INTO storestate (statename, state) VALUES ('probe', 'a')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        let count: i64 = b
            .with_connection(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM storestate WHERE statename = 'probe'",
                    [],
                    |row| row.get(0),
                )
                .map_err(Into::into)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn pooled_connections_share_one_in_memory_database() {
        let db = Database::open_in_memory().unwrap();
        db.transaction(|tx| {
            tx.execute(
                "INSERT INTO storestate (statename, state) VALUES ('probe', 'x')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        // A different pooled connection must see the committed row.
        let state: String = db
            .with_connection(|conn| {
                conn.query_row(
                    "SELECT state FROM storestate WHERE statename = 'probe'",
                    [],
                    |row| row.get(0),
                )
                .map_err(Into::into)
            })
            .unwrap();
        assert_eq!(state, "x");
    }

    #[test]
    fn failed_transactions_roll_back() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<(), DbError> = db.transaction(|tx| {
            tx.execute(
                "INSERT INTO storestate (statename, state) VALUES ('doomed', 'y')",
                [],
            )?;
            Err(DbError::Integrity("forced rollback".into()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .with_connection(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM storestate WHERE statename = 'doomed'",
                    [],
                    |row| row.get(0),
                )
                .map_err(Into::into)
            })
            .unwrap();
        assert_eq!(count, 0);
    }
}
