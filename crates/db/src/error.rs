//! Database error types.
//!
//! All failures in the storage layer are consolidated into the [`DbError`]
//! enum, with automatic conversion from the underlying SQLite, pool and
//! serialization errors.

use thiserror::Error;

/// A type alias for `Result<T, DbError>`.
pub type Result<T> = std::result::Result<T, DbError>;

/// Errors that can occur during database operations.
///
/// Infrastructure variants ([`Sqlite`](DbError::Sqlite),
/// [`Pool`](DbError::Pool), [`Io`](DbError::Io)) are transient from the
/// caller's perspective and are retried at the next scheduled cycle by
/// the driving worker; the storage layer itself never retries.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLite database error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    ///
    /// Occurs when a connection cannot be obtained from the pool,
    /// typically due to pool exhaustion.
    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload serialization/deserialization error.
    ///
    /// Substate payloads and gateway transaction contents are stored as
    /// serialized JSON; this wraps failures reading or writing them.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Data in the database is in an unexpected state: unknown kind or
    /// status codes, unparseable amounts, inconsistent relationships.
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Schema version incompatibility or failed migration.
    #[error("Migration error: {0}")]
    Migration(String),
}
