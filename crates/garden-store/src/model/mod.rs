//! Domain model: leaves, sessions, bins and the garden that owns them.
//!
//! The garden is an arena. It owns every attached [`Session`] in one map,
//! and each [`Bin`] holds only identifiers. A session owns its leaves.
//! Mutation of attached entities goes through [`SessionMut`] and
//! [`LeafMut`], which write through to storage and raise events.

mod bin;
mod garden;
mod leaf;
mod session;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use garden_core::Identifier;
use garden_settings::LimitSettings;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sqlite::row_types::time_from_millis;

pub use bin::Bin;
pub use garden::{Garden, LeafMut, SessionMut};
pub use leaf::{Leaf, LeafKind};
pub use session::Session;

/// Text parsed into one of the model enums was not a known variant.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown {what}: {value:?}")]
pub struct ParseEnumError {
    what: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_owned(),
        }
    }
}

/// Identity of a bin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinKind {
    /// Active sessions.
    Home,
    /// Sessions kept for reference.
    Archive,
    /// Sessions awaiting deletion.
    Waste,
}

impl BinKind {
    /// Every bin, in sweep order.
    pub const ALL: [Self; 3] = [Self::Home, Self::Archive, Self::Waste];

    /// Lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Archive => "archive",
            Self::Waste => "waste",
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Home => 0,
            Self::Archive => 1,
            Self::Waste => 2,
        }
    }
}

impl fmt::Display for BinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for BinKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "home" => Ok(Self::Home),
            "archive" => Ok(Self::Archive),
            "waste" => Ok(Self::Waste),
            other => Err(ParseEnumError::new("bin", other)),
        }
    }
}

/// Whether a session belongs in Home or Archive when it is not waste.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Home bin.
    #[default]
    Home,
    /// Archive bin.
    Archive,
}

impl Classification {
    /// Stored text.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Archive => "archive",
        }
    }

    /// The bin a non-waste session of this classification lives in.
    pub const fn bin_kind(self) -> BinKind {
        match self {
            Self::Home => BinKind::Home,
            Self::Archive => BinKind::Archive,
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "home" => Ok(Self::Home),
            "archive" => Ok(Self::Archive),
            other => Err(ParseEnumError::new("classification", other)),
        }
    }
}

/// Orderings offered by [`Garden::sorted_sessions`].
///
/// Ties are broken by identifier, oldest first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SortOrder {
    /// Creation time ascending.
    CreationOldestFirst,
    /// Creation time descending.
    CreationNewestFirst,
    /// Update time ascending.
    UpdateOldestFirst,
    /// Update time descending.
    #[default]
    UpdateNewestFirst,
    /// Access time ascending.
    AccessOldestFirst,
    /// Access time descending.
    AccessNewestFirst,
    /// Title, case-insensitive. Untitled sessions first.
    Title,
}

impl FromStr for SortOrder {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::CreationOldestFirst),
            "created-desc" => Ok(Self::CreationNewestFirst),
            "updated" => Ok(Self::UpdateOldestFirst),
            "updated-desc" => Ok(Self::UpdateNewestFirst),
            "accessed" => Ok(Self::AccessOldestFirst),
            "accessed-desc" => Ok(Self::AccessNewestFirst),
            "title" => Ok(Self::Title),
            other => Err(ParseEnumError::new("sort order", other)),
        }
    }
}

/// Caps applied when sanitizing free text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextLimits {
    /// Maximum leaf content size in bytes.
    pub content_bytes: usize,
    /// Maximum title length in characters.
    pub title_chars: usize,
    /// Maximum topic length in characters.
    pub topic_chars: usize,
}

impl From<&LimitSettings> for TextLimits {
    fn from(settings: &LimitSettings) -> Self {
        Self {
            content_bytes: settings.max_content_bytes,
            title_chars: settings.max_title_chars,
            topic_chars: settings.max_topic_chars,
        }
    }
}

impl Default for TextLimits {
    fn default() -> Self {
        Self::from(&LimitSettings::default())
    }
}

/// Snapshot of garden occupancy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GardenStats {
    /// Sessions in Home.
    pub home: usize,
    /// Sessions in Archive.
    pub archive: usize,
    /// Sessions in Waste.
    pub waste: usize,
    /// Sessions with leaves loaded.
    pub open_sessions: usize,
    /// Bytes of leaf content loaded.
    pub open_bytes: usize,
    /// Selected session.
    pub selected: Option<Identifier>,
}

/// What changed on a session, as reported to the garden.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Change {
    /// A leaf was written or streamed.
    Leaf,
    /// Title, model or topic changed.
    Metadata,
    /// Classification or waste flag changed; the session may move bins.
    Classification,
    /// The session was opened.
    Access,
}

/// Current time at storage precision.
pub(crate) fn now() -> DateTime<Utc> {
    time_from_millis(Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bin_kind_text_roundtrip() {
        for kind in BinKind::ALL {
            assert_eq!(kind.as_str().parse::<BinKind>().unwrap(), kind);
        }
        assert!("trash".parse::<BinKind>().is_err());
    }

    #[test]
    fn bin_indices_are_distinct() {
        let indices: Vec<usize> = BinKind::ALL.iter().map(|k| k.index()).collect();
        assert_eq!(indices, [0, 1, 2]);
    }

    #[test]
    fn classification_maps_to_bin() {
        assert_eq!(Classification::Home.bin_kind(), BinKind::Home);
        assert_eq!(Classification::Archive.bin_kind(), BinKind::Archive);
        assert_eq!("archive".parse::<Classification>().unwrap(), Classification::Archive);
        assert!("waste".parse::<Classification>().is_err());
    }

    #[test]
    fn sort_order_parses_cli_names() {
        assert_eq!("title".parse::<SortOrder>().unwrap(), SortOrder::Title);
        assert_eq!(
            "accessed-desc".parse::<SortOrder>().unwrap(),
            SortOrder::AccessNewestFirst
        );
        let err = "random".parse::<SortOrder>().unwrap_err();
        assert_eq!(err.to_string(), "unknown sort order: \"random\"");
    }

    #[test]
    fn limits_follow_settings() {
        let settings = LimitSettings {
            max_content_bytes: 10,
            max_title_chars: 5,
            max_topic_chars: 3,
        };
        let limits = TextLimits::from(&settings);
        assert_eq!(limits.content_bytes, 10);
        assert_eq!(limits.title_chars, 5);
        assert_eq!(limits.topic_chars, 3);
    }

    #[test]
    fn now_has_millisecond_precision() {
        let t = now();
        assert_eq!(t.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
