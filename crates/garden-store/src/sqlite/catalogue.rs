//! Schema catalogue for the garden database.
//!
//! Every managed table is registered in `catalogue` with the schema version
//! it was created or last upgraded at. On open each table is either created
//! (unregistered), upgraded (registered behind the code), or left alone.
//! The whole pass runs in one transaction: any failure rolls back every
//! table, including ones already created in the same pass.

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::errors::{Result, StoreError};

/// What [`initialize`] found when it opened the database.
///
/// Ordered by how much work happened, so results for several tables combine
/// with [`Ord::max`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpenResult {
    /// Every table was already at the current version.
    Open,
    /// At least one table was upgraded in place.
    SchemaUpgraded,
    /// At least one table was created from scratch.
    Created,
}

/// A table whose schema the catalogue tracks.
struct ManagedTable {
    name: &'static str,
    version: i64,
    create_sql: &'static str,
    upgrade: fn(&Connection, i64) -> Result<()>,
}

const SESSIONS: ManagedTable = ManagedTable {
    name: "sessions",
    version: 1,
    create_sql: "CREATE TABLE sessions (
           id             INTEGER PRIMARY KEY,
           classification TEXT    NOT NULL,
           is_waste       INTEGER NOT NULL DEFAULT 0,
           title          TEXT,
           model          TEXT,
           topic          TEXT,
           update_time    INTEGER NOT NULL,
           access_time    INTEGER NOT NULL
         );",
    upgrade: upgrade_sessions,
};

const LEAVES: ManagedTable = ManagedTable {
    name: "leaves",
    version: 1,
    create_sql: "CREATE TABLE leaves (
           id        INTEGER PRIMARY KEY,
           parent_id INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
           kind      TEXT    NOT NULL,
           model     TEXT,
           content   TEXT    NOT NULL
         );
         CREATE INDEX idx_leaves_parent ON leaves(parent_id);",
    upgrade: upgrade_leaves,
};

/// Managed tables in dependency order.
const TABLES: &[ManagedTable] = &[SESSIONS, LEAVES];

/// Bring every managed table up to the current schema version.
///
/// # Errors
///
/// Returns [`StoreError::Migration`] if a table is registered at a version
/// newer than this build understands, if an upgrade has no path, or if any
/// DDL fails. Nothing is committed in that case.
pub fn initialize(conn: &Connection) -> Result<OpenResult> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS catalogue (
           table_name TEXT    PRIMARY KEY,
           version    INTEGER NOT NULL,
           meta       TEXT
         );",
    )?;

    let mut result = OpenResult::Open;
    for table in TABLES {
        result = result.max(initialize_table(&tx, table)?);
    }

    tx.commit()?;
    Ok(result)
}

/// Return the registered version of a table, if any.
pub fn table_version(conn: &Connection, table: &str) -> Result<Option<i64>> {
    let version = conn
        .query_row(
            "SELECT version FROM catalogue WHERE table_name = ?1",
            params![table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version)
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal
// ─────────────────────────────────────────────────────────────────────────────

fn initialize_table(conn: &Connection, table: &ManagedTable) -> Result<OpenResult> {
    match table_version(conn, table.name)? {
        None => {
            conn.execute_batch(table.create_sql)
                .map_err(|e| StoreError::Migration {
                    message: format!("failed to create {}: {e}", table.name),
                })?;
            register(conn, table)?;
            info!(table = table.name, version = table.version, "created table");
            Ok(OpenResult::Created)
        }
        Some(stored) if stored < table.version => {
            (table.upgrade)(conn, stored)?;
            register(conn, table)?;
            info!(
                table = table.name,
                from = stored,
                to = table.version,
                "upgraded table"
            );
            Ok(OpenResult::SchemaUpgraded)
        }
        Some(stored) if stored > table.version => Err(StoreError::Migration {
            message: format!(
                "{} is at schema version {stored}, this build supports {}",
                table.name, table.version
            ),
        }),
        Some(_) => {
            debug!(table = table.name, "table current");
            Ok(OpenResult::Open)
        }
    }
}

fn register(conn: &Connection, table: &ManagedTable) -> Result<()> {
    let _ = conn.execute(
        "INSERT INTO catalogue (table_name, version, meta) VALUES (?1, ?2, ?3)
         ON CONFLICT(table_name) DO UPDATE SET version = excluded.version, meta = excluded.meta",
        params![table.name, table.version, env!("CARGO_PKG_VERSION")],
    )?;
    Ok(())
}

fn upgrade_sessions(_conn: &Connection, from: i64) -> Result<()> {
    Err(StoreError::Migration {
        message: format!("no upgrade path for sessions from version {from}"),
    })
}

fn upgrade_leaves(_conn: &Connection, from: i64) -> Result<()> {
    Err(StoreError::Migration {
        message: format!("no upgrade path for leaves from version {from}"),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn open_memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn fresh_database_is_created() {
        let conn = open_memory();
        assert_eq!(initialize(&conn).unwrap(), OpenResult::Created);
        assert_eq!(table_names(&conn), ["catalogue", "leaves", "sessions"]);
        assert_eq!(table_version(&conn, "sessions").unwrap(), Some(1));
        assert_eq!(table_version(&conn, "leaves").unwrap(), Some(1));
    }

    #[test]
    fn second_open_is_plain_open() {
        let conn = open_memory();
        initialize(&conn).unwrap();
        assert_eq!(initialize(&conn).unwrap(), OpenResult::Open);
    }

    #[test]
    fn meta_records_crate_version() {
        let conn = open_memory();
        initialize(&conn).unwrap();
        let meta: String = conn
            .query_row(
                "SELECT meta FROM catalogue WHERE table_name = 'leaves'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(meta, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn newer_stored_version_is_rejected() {
        let conn = open_memory();
        initialize(&conn).unwrap();
        conn.execute(
            "UPDATE catalogue SET version = 99 WHERE table_name = 'sessions'",
            [],
        )
        .unwrap();
        assert_matches!(initialize(&conn), Err(StoreError::Migration { .. }));
    }

    #[test]
    fn older_version_without_path_rolls_back() {
        let conn = open_memory();
        initialize(&conn).unwrap();
        conn.execute(
            "UPDATE catalogue SET version = 0 WHERE table_name = 'leaves'",
            [],
        )
        .unwrap();
        assert_matches!(initialize(&conn), Err(StoreError::Migration { .. }));
        assert_eq!(table_version(&conn, "leaves").unwrap(), Some(0));
    }

    #[test]
    fn failed_create_leaves_nothing_behind() {
        let conn = open_memory();
        // A stray leaves table makes CREATE TABLE leaves fail after sessions
        // was already created inside the same transaction.
        conn.execute_batch("CREATE TABLE leaves (x INTEGER);").unwrap();
        assert_matches!(initialize(&conn), Err(StoreError::Migration { .. }));
        assert_eq!(table_names(&conn), ["leaves"]);
    }

    #[test]
    fn leaves_cascade_with_session() {
        let conn = open_memory();
        initialize(&conn).unwrap();
        conn.execute(
            "INSERT INTO sessions (id, classification, is_waste, update_time, access_time)
             VALUES (1, 'home', 0, 0, 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO leaves (id, parent_id, kind, content) VALUES (2, 1, 'user', 'hi')",
            [],
        )
        .unwrap();
        conn.execute("DELETE FROM sessions WHERE id = 1", []).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM leaves", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn open_results_combine_by_max() {
        assert_eq!(OpenResult::Open.max(OpenResult::Created), OpenResult::Created);
        assert_eq!(
            OpenResult::SchemaUpgraded.max(OpenResult::Open),
            OpenResult::SchemaUpgraded
        );
    }
}
