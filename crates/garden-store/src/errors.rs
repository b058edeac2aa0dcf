//! Error types for the garden store.
//!
//! Storage failures propagate unmodified; the store never retries. Misuse
//! (mutating a closed garden, inserting a session twice) is reported with
//! dedicated variants rather than panics.

use garden_core::Identifier;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Filesystem error while preparing the database location.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema creation or upgrade failed.
    #[error("migration error: {message}")]
    Migration {
        /// Which table failed and why.
        message: String,
    },

    /// A stored row could not be decoded.
    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        /// Table the row came from.
        table: &'static str,
        /// Offending column.
        column: &'static str,
        /// Decoder message.
        detail: String,
    },

    /// The session is not attached to this garden.
    #[error("session not found: {0}")]
    SessionNotFound(Identifier),

    /// The leaf is not loaded in its session.
    #[error("leaf not found: {0}")]
    LeafNotFound(Identifier),

    /// The garden is closed.
    #[error("garden is closed")]
    Closed,

    /// Operation not permitted in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_error_display() {
        let err = StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows);
        assert!(err.to_string().contains("sqlite error"));
    }

    #[test]
    fn corrupt_row_display() {
        let err = StoreError::CorruptRow {
            table: "leaves",
            column: "kind",
            detail: "unknown variant: robot".into(),
        };
        assert_eq!(err.to_string(), "corrupt row in leaves.kind: unknown variant: robot");
    }

    #[test]
    fn session_not_found_display() {
        let err = StoreError::SessionNotFound(Identifier::from_raw(255));
        assert_eq!(err.to_string(), "session not found: 00000000000000ff");
    }

    #[test]
    fn closed_display() {
        assert_eq!(StoreError::Closed.to_string(), "garden is closed");
    }

    #[test]
    fn from_rusqlite_error() {
        let err: StoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, StoreError::Sqlite(_)));
    }
}
