//! Repository implementations for `SQLite` database operations.
//!
//! Each repository is a stateless struct whose methods take a `&Connection`
//! parameter, so one pooled connection can be shared across a batch of
//! operations.

pub mod leaf;
pub mod session;

pub use leaf::{LeafPatch, LeafRepo, NewLeaf};
pub use session::{SessionPatch, SessionRepo};
