//! Database row types and column decoding helpers.
//!
//! These mirror the raw table shape. Conversion to the domain types
//! ([`Session`](crate::model::Session), [`Leaf`](crate::model::Leaf))
//! happens in the model layer, which is where enum text is validated.

use chrono::{DateTime, TimeZone, Utc};
use garden_core::Identifier;

use crate::errors::StoreError;

/// Raw session row from the `sessions` table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRow {
    /// Session ID.
    pub id: Identifier,
    /// `"home"` or `"archive"`.
    pub classification: String,
    /// Whether the session sits in the Waste bin.
    pub is_waste: bool,
    /// Session title.
    pub title: Option<String>,
    /// Default model for assistant leaves.
    pub model: Option<String>,
    /// Topic tag.
    pub topic: Option<String>,
    /// Last update, Unix milliseconds.
    pub update_time: i64,
    /// Last access, Unix milliseconds.
    pub access_time: i64,
}

impl SessionRow {
    /// Map a `SELECT id, classification, is_waste, title, model, topic,
    /// update_time, access_time` row.
    pub(crate) fn map(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            classification: row.get(1)?,
            is_waste: row.get(2)?,
            title: row.get(3)?,
            model: row.get(4)?,
            topic: row.get(5)?,
            update_time: row.get(6)?,
            access_time: row.get(7)?,
        })
    }
}

/// Raw leaf row from the `leaves` table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafRow {
    /// Leaf ID.
    pub id: Identifier,
    /// Owning session ID.
    pub parent_id: Identifier,
    /// Leaf kind text.
    pub kind: String,
    /// Model that produced the leaf, lowercase.
    pub model: Option<String>,
    /// Message content.
    pub content: String,
}

impl LeafRow {
    /// Map a `SELECT id, parent_id, kind, model, content` row.
    pub(crate) fn map(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            parent_id: row.get(1)?,
            kind: row.get(2)?,
            model: row.get(3)?,
            content: row.get(4)?,
        })
    }
}

/// Parse a string column into an enum, returning `CorruptRow` on failure.
pub fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    raw.parse().map_err(|_| StoreError::CorruptRow {
        table,
        column,
        detail: format!("unknown variant: {raw}"),
    })
}

/// Reject the empty identifier as a key.
pub fn require_id(
    id: Identifier,
    table: &'static str,
    column: &'static str,
) -> Result<Identifier, StoreError> {
    if id.is_empty() {
        return Err(StoreError::CorruptRow {
            table,
            column,
            detail: "empty identifier".into(),
        });
    }
    Ok(id)
}

/// Convert stored milliseconds to a UTC timestamp.
pub fn time_from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Convert a UTC timestamp to stored milliseconds.
pub fn time_to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}
