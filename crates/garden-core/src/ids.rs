//! Creation-time-ordered 64-bit identifiers.
//!
//! Every session and leaf is keyed by an [`Identifier`]. The upper 44 bits hold
//! the Unix time in milliseconds at which the identifier was minted and the
//! lower 20 bits a per-process sequence, so identifiers sort in creation order
//! and double as creation timestamps. Zero is reserved as [`Identifier::EMPTY`].

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

const SEQUENCE_BITS: u32 = 20;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// Last identifier handed out by this process.
static LAST: AtomicU64 = AtomicU64::new(0);

/// A comparable, creation-time-ordered unique value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(u64);

impl Identifier {
    /// The "no identifier" sentinel. Never valid as a primary key.
    pub const EMPTY: Self = Self(0);

    /// Mint a new identifier stamped with the current time.
    ///
    /// Strictly increasing within a process, even if the wall clock stalls
    /// or steps backwards.
    #[must_use]
    pub fn new() -> Self {
        let millis = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let floor = millis << SEQUENCE_BITS;
        let mut last = LAST.load(Ordering::Relaxed);
        loop {
            let candidate = if floor > last { floor } else { last + 1 };
            match LAST.compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return Self(candidate),
                Err(actual) => last = actual,
            }
        }
    }

    /// Build an identifier from a millisecond timestamp and sequence number.
    #[must_use]
    pub fn from_parts(millis: u64, sequence: u64) -> Self {
        Self((millis << SEQUENCE_BITS) | (sequence & SEQUENCE_MASK))
    }

    /// Wrap a raw value (e.g. one read back from storage).
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw 64-bit value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Whether this is the [`EMPTY`](Self::EMPTY) sentinel.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Milliseconds since the Unix epoch encoded in the identifier.
    #[must_use]
    pub const fn millis(self) -> u64 {
        self.0 >> SEQUENCE_BITS
    }

    /// Creation time encoded in the identifier.
    #[must_use]
    pub fn created_at(self) -> DateTime<Utc> {
        let millis = i64::try_from(self.millis()).unwrap_or(i64::MAX);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Error returned when parsing an [`Identifier`] from text fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid identifier: {0}")]
pub struct ParseIdentifierError(String);

impl FromStr for Identifier {
    type Err = ParseIdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.len() > 16 {
            return Err(ParseIdentifierError(s.to_string()));
        }
        u64::from_str_radix(trimmed, 16)
            .map(Self)
            .map_err(|_| ParseIdentifierError(s.to_string()))
    }
}

impl ToSql for Identifier {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        // Bit-preserving: SQLite integers are signed.
        #[allow(clippy::cast_possible_wrap)]
        let value = self.0 as i64;
        Ok(ToSqlOutput::from(value))
    }
}

impl FromSql for Identifier {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_i64()?;
        #[allow(clippy::cast_sign_loss)]
        let raw = raw as u64;
        Ok(Self(raw))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
