//! Storage provider seam and its `SQLite` implementation.
//!
//! The garden only ever asks a [`StorageProvider`] for a scoped connection,
//! uses it for one logical operation, and drops it. [`SqliteProvider`] backs
//! this with an `r2d2` pool whose customizer enables foreign keys (needed for
//! cascading leaf deletes) on every new connection.
//!
//! In-memory mode uses a uniquely named shared-cache database and keeps one
//! anchor connection open for the provider's lifetime, so the data survives
//! between pooled connections and disappears with the provider.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use garden_settings::StorageSettings;
use parking_lot::Mutex;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;
use uuid::Uuid;

use crate::errors::Result;

/// A pooled connection handed out by a provider.
pub type Connection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Supplies scoped, disposable connections to the store.
pub trait StorageProvider: Send + Sync {
    /// Acquire a connection. Dropping it returns it to the provider.
    fn connect(&self) -> Result<Connection>;

    /// Human-readable location of the store, for logs and diagnostics.
    fn describe(&self) -> String;
}

/// Pragma customizer that runs on each new pooled connection.
#[derive(Debug)]
struct PragmaCustomizer {
    busy_timeout_ms: u32,
    cache_size_kib: i64,
    wal: bool,
}

impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA busy_timeout = {};\
             PRAGMA foreign_keys = ON;\
             PRAGMA cache_size = -{};",
            self.busy_timeout_ms, self.cache_size_kib
        ))?;
        if self.wal {
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        }
        Ok(())
    }
}

/// `SQLite` storage provider backed by an `r2d2` pool.
pub struct SqliteProvider {
    pool: Pool<SqliteConnectionManager>,
    /// Keeps a shared-cache in-memory database alive.
    anchor: Option<Mutex<rusqlite::Connection>>,
    location: String,
}

impl SqliteProvider {
    /// Open (or create) a file-backed store.
    pub fn file(path: &Path, settings: &StorageSettings) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(settings.pool_size)
            .connection_timeout(Duration::from_secs(5))
            .connection_customizer(Box::new(PragmaCustomizer {
                busy_timeout_ms: settings.busy_timeout_ms,
                cache_size_kib: settings.cache_size_kib,
                wal: true,
            }))
            .build(manager)?;
        let location = path.display().to_string();
        info!(path = %location, "file store ready");
        Ok(Self {
            pool,
            anchor: None,
            location,
        })
    }

    /// Create an ephemeral in-memory store.
    pub fn in_memory(settings: &StorageSettings) -> Result<Self> {
        let uri = format!("file:garden-{}?mode=memory&cache=shared", Uuid::now_v7());
        let anchor = rusqlite::Connection::open(&uri)?;
        let manager = SqliteConnectionManager::file(&uri);
        let pool = Pool::builder()
            .max_size(settings.pool_size)
            .min_idle(Some(0))
            .connection_timeout(Duration::from_secs(5))
            .connection_customizer(Box::new(PragmaCustomizer {
                busy_timeout_ms: settings.busy_timeout_ms,
                cache_size_kib: settings.cache_size_kib,
                wal: false,
            }))
            .build(manager)?;
        Ok(Self {
            pool,
            anchor: Some(Mutex::new(anchor)),
            location: uri,
        })
    }

    /// In-memory store with default settings (tests, scratch use).
    pub fn ephemeral() -> Result<Self> {
        Self::in_memory(&StorageSettings::default())
    }

    /// Pick file or memory mode from settings.
    pub fn from_settings(settings: &StorageSettings) -> Result<Self> {
        if settings.in_memory {
            Self::in_memory(settings)
        } else {
            Self::file(&settings.resolved_path(), settings)
        }
    }

    /// Wrap in the shared, reference-counted handle the garden consumes.
    pub fn shared(self) -> Arc<dyn StorageProvider> {
        Arc::new(self)
    }

    /// Whether this provider holds an in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.anchor.is_some()
    }
}

impl StorageProvider for SqliteProvider {
    fn connect(&self) -> Result<Connection> {
        Ok(self.pool.get()?)
    }

    fn describe(&self) -> String {
        self.location.clone()
    }
}

/// Verify pragmas are set correctly on a connection.
pub fn verify_pragmas(conn: &rusqlite::Connection) -> Result<PragmaState> {
    let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
    Ok(PragmaState {
        journal_mode,
        foreign_keys_enabled: foreign_keys == 1,
    })
}

/// Pragma state for verification.
#[derive(Debug)]
pub struct PragmaState {
    /// Journal mode ("wal" for files, "memory" for in-memory stores).
    pub journal_mode: String,
    /// Whether foreign keys are enabled.
    pub foreign_keys_enabled: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_enables_foreign_keys() {
        let provider = SqliteProvider::ephemeral().unwrap();
        let conn = provider.connect().unwrap();
        let pragmas = verify_pragmas(&conn).unwrap();
        assert_eq!(pragmas.journal_mode, "memory");
        assert!(pragmas.foreign_keys_enabled);
        assert!(provider.is_in_memory());
    }

    #[test]
    fn in_memory_data_outlives_pooled_connections() {
        let provider = SqliteProvider::ephemeral().unwrap();
        {
            let conn = provider.connect().unwrap();
            conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (7);")
                .unwrap();
        }
        let conn = provider.connect().unwrap();
        let x: i64 = conn.query_row("SELECT x FROM t", [], |row| row.get(0)).unwrap();
        assert_eq!(x, 7);
    }

    #[test]
    fn in_memory_stores_are_isolated() {
        let a = SqliteProvider::ephemeral().unwrap();
        let b = SqliteProvider::ephemeral().unwrap();
        a.connect().unwrap().execute_batch("CREATE TABLE only_a (x INTEGER);").unwrap();
        let found: i64 = b
            .connect()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'only_a'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(found, 0);
    }

    #[test]
    fn file_store_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("garden.db");
        let provider = SqliteProvider::file(&path, &StorageSettings::default()).unwrap();
        let conn = provider.connect().unwrap();
        let pragmas = verify_pragmas(&conn).unwrap();
        assert_eq!(pragmas.journal_mode, "wal");
        assert!(pragmas.foreign_keys_enabled);
        assert!(path.exists());
        assert!(!provider.is_in_memory());
    }

    #[test]
    fn shared_handle_counts_references() {
        let shared = SqliteProvider::ephemeral().unwrap().shared();
        let second = Arc::clone(&shared);
        assert_eq!(Arc::strong_count(&shared), 2);
        drop(second);
        assert_eq!(Arc::strong_count(&shared), 1);
        assert!(shared.describe().starts_with("file:garden-"));
    }
}
