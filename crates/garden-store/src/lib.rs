//! # garden-store
//!
//! Durable store for chat history, organised as a *garden* of three *bins*
//! (Home, Archive, Waste), each holding *sessions* made of *leaves*.
//!
//! - **Persistence**: `rusqlite` behind a [`StorageProvider`]; every mutation
//!   writes through on a short-lived pooled connection
//! - **Working set**: sessions load and unload their leaves lazily
//! - **Pruning**: a timeout- and byte-budget-driven sweep demotes idle
//!   sessions to Waste, deletes expired waste, and unloads memory
//! - **Notifications**: coalesced [`GardenEvent`]s on a broadcast channel
//!
//! # Architecture
//!
//! The [`Garden`] owns every attached [`Session`] in a table keyed by
//! [`Identifier`]; bins hold identifiers only. Attached sessions are read
//! through [`Garden::session`] and mutated through the [`SessionMut`] and
//! [`LeafMut`] handles, which route each change to storage and then to
//! subscribers. A detached [`Session`] is a plain value whose setters never
//! touch storage until [`Garden::insert`] adopts it.

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod model;
pub mod sqlite;

pub use errors::{Result, StoreError};
pub use events::{ChangeBatch, GardenEvent};
pub use garden_core::Identifier;
pub use model::{
    Bin, BinKind, Classification, Garden, GardenStats, Leaf, LeafKind, LeafMut, ParseEnumError,
    Session, SessionMut, SortOrder, TextLimits,
};
pub use sqlite::{Connection, OpenResult, SqliteProvider, StorageProvider};
