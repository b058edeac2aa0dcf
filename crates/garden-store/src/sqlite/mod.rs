//! `SQLite` backend for the garden store.
//!
//! - **[`connection`]**: the [`StorageProvider`] seam and its `r2d2` pooled
//!   `SQLite` implementation (file-backed or anchored in-memory).
//! - **[`catalogue`]**: per-table schema versioning, run transactionally on open.
//! - **[`row_types`]**: raw row structs and column decoding helpers.
//! - **[`repositories`]**: stateless repositories; every method takes
//!   `&Connection` and executes parameterized SQL.

pub mod catalogue;
pub mod connection;
pub mod repositories;
pub mod row_types;

pub use catalogue::{OpenResult, initialize};
pub use connection::{Connection, SqliteProvider, StorageProvider, verify_pragmas};
