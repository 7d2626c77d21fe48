//! Database schema migrations.
//!
//! Migrations are applied sequentially, one version at a time, each in
//! its own transaction. The schema version lives in the `storestate`
//! table; a database reporting a version newer than [`CURRENT_VERSION`]
//! is refused outright to avoid corrupting data written by a newer
//! gateway.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::{DbError, Result};
use crate::schema::CREATE_SCHEMA;

/// Current database schema version.
///
/// Increment whenever a new migration is added.
pub const CURRENT_VERSION: i32 = 1;

/// Key of the schema version row in `storestate`.
const SCHEMA_VERSION_KEY: &str = "databaseschema";

/// Represents a single schema migration.
#[allow(dead_code)]
struct Migration {
    /// The schema version this migration upgrades FROM.
    from_version: i32,
    /// The schema version this migration upgrades TO.
    to_version: i32,
    /// SQL to execute; should be idempotent (`IF NOT EXISTS` etc.).
    upgrade_sql: &'static str,
    /// Human-readable description.
    description: &'static str,
}

/// Registry of all available migrations, ordered by version.
///
/// Empty while the schema is at its initial version; the first entry
/// lands with the first post-v1 schema change.
const MIGRATIONS: &[Migration] = &[];

/// Initializes a fresh database or upgrades an existing one.
///
/// Fresh databases get the full [`CREATE_SCHEMA`] and are stamped with
/// [`CURRENT_VERSION`]; existing databases are walked through the
/// migration registry one version at a time.
pub fn initialize(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS storestate (
            statename TEXT PRIMARY KEY,
            state TEXT NOT NULL
        );",
    )?;

    match schema_version(conn)? {
        None => {
            let tx = conn.transaction()?;
            tx.execute_batch(CREATE_SCHEMA)?;
            set_schema_version(&tx, CURRENT_VERSION)?;
            tx.commit()?;
            info!(version = CURRENT_VERSION, "initialized fresh database");
            Ok(())
        }
        Some(version) if version == CURRENT_VERSION => Ok(()),
        Some(version) if version > CURRENT_VERSION => Err(DbError::Migration(format!(
            "database schema version {version} is newer than supported version {CURRENT_VERSION}"
        ))),
        Some(version) => upgrade(conn, version),
    }
}

/// Reads the stored schema version, if any.
pub fn schema_version(conn: &Connection) -> Result<Option<i32>> {
    let version: Option<String> = conn
        .query_row(
            "SELECT state FROM storestate WHERE statename = ?1",
            [SCHEMA_VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;
    version
        .map(|v| {
            v.parse::<i32>()
                .map_err(|_| DbError::Integrity(format!("invalid schema version: {v}")))
        })
        .transpose()
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO storestate (statename, state) VALUES (?1, ?2)",
        rusqlite::params![SCHEMA_VERSION_KEY, version.to_string()],
    )?;
    Ok(())
}

fn upgrade(conn: &mut Connection, mut version: i32) -> Result<()> {
    while version < CURRENT_VERSION {
        let migration = MIGRATIONS
            .iter()
            .find(|m| m.from_version == version)
            .ok_or_else(|| {
                DbError::Migration(format!("no migration path from schema version {version}"))
            })?;

        let tx = conn.transaction()?;
        tx.execute_batch(migration.upgrade_sql)?;
        set_schema_version(&tx, migration.to_version)?;
        tx.commit()?;

        info!(
            from = migration.from_version,
            to = migration.to_version,
            description = migration.description,
            "applied schema migration"
        );
        version = migration.to_version;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_initializes_to_current_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        initialize(&mut conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), Some(CURRENT_VERSION));

        // All tables present
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('resources', 'substates', 'account_resource_balance_history',
                  'resource_supply_history', 'validator_stake_history',
                  'mempool_transactions', 'ledger_transactions')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 7);
    }

    #[test]
    fn initialize_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        initialize(&mut conn).unwrap();
        initialize(&mut conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), Some(CURRENT_VERSION));
    }

    #[test]
    fn newer_schema_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        initialize(&mut conn).unwrap();
        conn.execute(
            "UPDATE storestate SET state = ?1 WHERE statename = ?2",
            rusqlite::params![(CURRENT_VERSION + 1).to_string(), SCHEMA_VERSION_KEY],
        )
        .unwrap();
        assert!(matches!(
            initialize(&mut conn),
            Err(DbError::Migration(_))
        ));
    }
}
