//! A single message within a session.

use std::fmt;
use std::str::FromStr;

use garden_core::Identifier;
use garden_core::sanitize::{sanitize_model, sanitize_text, truncate_bytes};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ParseEnumError;
use crate::errors::{Result, StoreError};
use crate::sqlite::repositories::{LeafPatch, LeafRepo, NewLeaf};
use crate::sqlite::row_types::{LeafRow, parse_enum, require_id};

/// What a leaf represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LeafKind {
    /// Text typed by the user.
    User,
    /// Model output.
    Assistant,
    /// Informational line shown in the transcript only.
    DisplayMessage,
    /// Error line shown in the transcript only.
    DisplayError,
}

impl LeafKind {
    /// Stored text.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::DisplayMessage => "displayMessage",
            Self::DisplayError => "displayError",
        }
    }

    /// Whether leaves of this kind are written to storage.
    pub const fn is_persistable(self) -> bool {
        matches!(self, Self::User | Self::Assistant)
    }

    /// Whether leaves of this kind carry a model name.
    pub const fn uses_model(self) -> bool {
        matches!(self, Self::Assistant)
    }
}

impl fmt::Display for LeafKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for LeafKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "displayMessage" => Ok(Self::DisplayMessage),
            "displayError" => Ok(Self::DisplayError),
            other => Err(ParseEnumError::new("leaf kind", other)),
        }
    }
}

/// Columns touched by an edit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct LeafChanges {
    pub(crate) model: bool,
    pub(crate) content: bool,
}

impl LeafChanges {
    pub(crate) const ALL: Self = Self {
        model: true,
        content: true,
    };

    pub(crate) const fn is_empty(self) -> bool {
        !self.model && !self.content
    }
}

/// One message. Ordered and compared by identifier.
#[derive(Clone, Debug)]
pub struct Leaf {
    id: Identifier,
    kind: LeafKind,
    model: Option<String>,
    content: String,
    is_streaming: bool,
    /// Last stream chunk ended in `\r`; a leading `\n` on the next one
    /// completes that line break.
    split_crlf: bool,
    is_persisted: bool,
    visual_change_counter: u64,
}

impl Leaf {
    /// Insertion path: a committed leaf with fresh identifier.
    pub(crate) fn new(
        kind: LeafKind,
        session_model: Option<&str>,
        content: &str,
        max_bytes: usize,
    ) -> Self {
        Self {
            id: Identifier::new(),
            kind,
            model: kind.uses_model().then(|| sanitize_model(session_model)).flatten(),
            content: sanitize_text(content, max_bytes),
            is_streaming: false,
            split_crlf: false,
            is_persisted: false,
            visual_change_counter: 0,
        }
    }

    /// Insertion path for a leaf that will be filled by stream chunks.
    pub(crate) fn new_stream(kind: LeafKind, session_model: Option<&str>) -> Self {
        Self {
            is_streaming: true,
            ..Self::new(kind, session_model, "", 0)
        }
    }

    /// Read path: rehydrate a stored row.
    pub(crate) fn from_row(row: LeafRow) -> Result<Self> {
        let id = require_id(row.id, "leaves", "id")?;
        let kind: LeafKind = parse_enum(&row.kind, "leaves", "kind")?;
        if !kind.is_persistable() {
            return Err(StoreError::CorruptRow {
                table: "leaves",
                column: "kind",
                detail: format!("{kind} leaves are never stored"),
            });
        }
        Ok(Self {
            id,
            kind,
            model: row.model,
            content: row.content,
            is_streaming: false,
            split_crlf: false,
            is_persisted: true,
            visual_change_counter: 0,
        })
    }

    /// Leaf identifier.
    pub fn id(&self) -> Identifier {
        self.id
    }

    /// Leaf kind.
    pub fn kind(&self) -> LeafKind {
        self.kind
    }

    /// Model name, lowercase.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Message text.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Whether chunks are still being appended.
    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    /// Whether a row exists for this leaf.
    pub fn is_persisted(&self) -> bool {
        self.is_persisted
    }

    /// Bumped on every visible change, for redraw bookkeeping.
    pub fn visual_change_counter(&self) -> u64 {
        self.visual_change_counter
    }

    /// Whether the leaf may be written: a stored kind that is not mid-stream.
    pub fn is_persistable(&self) -> bool {
        self.kind.is_persistable() && !self.is_streaming
    }

    /// Content size in bytes.
    pub fn byte_len(&self) -> usize {
        self.content.len()
    }

    /// Replace the content. Ends streaming.
    pub(crate) fn apply_content(&mut self, text: &str, max_bytes: usize) -> LeafChanges {
        let was_streaming = std::mem::replace(&mut self.is_streaming, false);
        self.split_crlf = false;
        let text = sanitize_text(text, max_bytes);
        let mut changes = LeafChanges::default();
        if text != self.content {
            self.content = text;
            changes.content = true;
        } else if was_streaming && !self.is_persisted {
            changes.content = true;
        }
        self.record(changes)
    }

    /// Replace the model. Ignored for kinds without a model.
    pub(crate) fn apply_model(&mut self, model: Option<&str>) -> LeafChanges {
        let mut changes = LeafChanges::default();
        if self.kind.uses_model() {
            let model = sanitize_model(model);
            if model != self.model {
                self.model = model;
                changes.model = true;
            }
        }
        self.record(changes)
    }

    /// Append a chunk to a streaming leaf. Returns `false` if not streaming
    /// or if nothing survives sanitization.
    pub(crate) fn apply_stream_chunk(&mut self, chunk: &str, max_bytes: usize) -> bool {
        if !self.is_streaming || chunk.is_empty() {
            return false;
        }
        let chunk = if std::mem::take(&mut self.split_crlf) {
            chunk.strip_prefix('\n').unwrap_or(chunk)
        } else {
            chunk
        };
        self.split_crlf = chunk.ends_with('\r');
        let room = max_bytes.saturating_sub(self.content.len());
        let chunk = sanitize_text(chunk, room);
        if chunk.is_empty() {
            return false;
        }
        self.content.push_str(&chunk);
        truncate_bytes(&mut self.content, max_bytes);
        self.visual_change_counter += 1;
        true
    }

    /// Finish streaming. Returns `false` if the leaf was not streaming.
    pub(crate) fn apply_stop_stream(&mut self) -> bool {
        if !self.is_streaming {
            return false;
        }
        self.is_streaming = false;
        self.split_crlf = false;
        let trimmed = self.content.trim_end().len();
        self.content.truncate(trimmed);
        self.visual_change_counter += 1;
        true
    }

    /// Write the leaf: insert on first write, else update the changed
    /// columns. Callers check [`Leaf::is_persistable`] first.
    pub(crate) fn persist(
        &mut self,
        conn: &Connection,
        parent_id: Identifier,
        changes: LeafChanges,
    ) -> Result<()> {
        debug_assert!(self.is_persistable());
        if !self.is_persisted {
            LeafRepo::insert(
                conn,
                &NewLeaf {
                    id: self.id,
                    parent_id,
                    kind: self.kind.as_str(),
                    model: self.model.as_deref(),
                    content: &self.content,
                },
            )?;
            self.is_persisted = true;
            debug!(leaf = %self.id, session = %parent_id, kind = %self.kind, "inserted leaf");
            return Ok(());
        }
        if changes.model {
            let _ = LeafRepo::apply(conn, self.id, &LeafPatch::Model(self.model.as_deref()))?;
        }
        if changes.content {
            let _ = LeafRepo::apply(conn, self.id, &LeafPatch::Content(&self.content))?;
        }
        debug!(leaf = %self.id, ?changes, "updated leaf");
        Ok(())
    }

    fn record(&mut self, changes: LeafChanges) -> LeafChanges {
        if !changes.is_empty() {
            self.visual_change_counter += 1;
        }
        changes
    }
}

impl PartialEq for Leaf {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Leaf {}

impl PartialOrd for Leaf {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Leaf {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const MAX: usize = 64;

    // ─────────────────────────────────────────────────────────────────────
    // Construction
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn model_copied_only_for_assistant() {
        let user = Leaf::new(LeafKind::User, Some("Opus"), "hi", MAX);
        let assistant = Leaf::new(LeafKind::Assistant, Some("Opus"), "hi", MAX);
        assert_eq!(user.model(), None);
        assert_eq!(assistant.model(), Some("opus"));
    }

    #[test]
    fn new_leaf_sanitizes_content() {
        let leaf = Leaf::new(LeafKind::User, None, "a\r\nb\u{7}", MAX);
        assert_eq!(leaf.content(), "a\nb");
        assert!(!leaf.is_persisted());
        assert!(leaf.is_persistable());
    }

    #[test]
    fn display_kinds_are_never_persistable() {
        for kind in [LeafKind::DisplayMessage, LeafKind::DisplayError] {
            assert!(!Leaf::new(kind, None, "x", MAX).is_persistable());
        }
    }

    #[test]
    fn from_row_rejects_display_kind() {
        let row = LeafRow {
            id: Identifier::from_raw(1),
            parent_id: Identifier::from_raw(2),
            kind: "displayError".into(),
            model: None,
            content: String::new(),
        };
        assert_matches!(Leaf::from_row(row), Err(StoreError::CorruptRow { column: "kind", .. }));
    }

    #[test]
    fn from_row_is_persisted() {
        let row = LeafRow {
            id: Identifier::from_raw(1),
            parent_id: Identifier::from_raw(2),
            kind: "assistant".into(),
            model: Some("opus".into()),
            content: "hello".into(),
        };
        let leaf = Leaf::from_row(row).unwrap();
        assert!(leaf.is_persisted());
        assert_eq!(leaf.kind(), LeafKind::Assistant);
        assert_eq!(leaf.content(), "hello");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Edits
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn unchanged_content_is_not_a_change() {
        let mut leaf = Leaf::new(LeafKind::User, None, "same", MAX);
        assert!(leaf.apply_content("same", MAX).is_empty());
        assert_eq!(leaf.visual_change_counter(), 0);
        assert!(leaf.apply_content("different", MAX).content);
        assert_eq!(leaf.visual_change_counter(), 1);
    }

    #[test]
    fn set_content_ends_streaming() {
        let mut leaf = Leaf::new_stream(LeafKind::Assistant, None);
        let changes = leaf.apply_content("done", MAX);
        assert!(changes.content);
        assert!(!leaf.is_streaming());
        assert!(leaf.is_persistable());
    }

    #[test]
    fn model_ignored_for_user_leaves() {
        let mut leaf = Leaf::new(LeafKind::User, None, "x", MAX);
        assert!(leaf.apply_model(Some("opus")).is_empty());
        assert_eq!(leaf.model(), None);
    }

    #[test]
    fn model_is_lowercased() {
        let mut leaf = Leaf::new(LeafKind::Assistant, None, "x", MAX);
        assert!(leaf.apply_model(Some("GPT-5")).model);
        assert_eq!(leaf.model(), Some("gpt-5"));
        assert!(leaf.apply_model(Some("gpt-5")).is_empty());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Streaming
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn stream_chunks_concatenate() {
        let mut leaf = Leaf::new_stream(LeafKind::Assistant, None);
        assert!(leaf.is_streaming());
        assert_eq!(leaf.content(), "");
        assert!(leaf.apply_stream_chunk("This is a ", MAX));
        assert!(leaf.apply_stream_chunk("stream message.", MAX));
        assert_eq!(leaf.content(), "This is a stream message.");
        assert_eq!(leaf.visual_change_counter(), 2);
    }

    #[test]
    fn crlf_split_across_chunks_matches_set_content() {
        let mut streamed = Leaf::new_stream(LeafKind::Assistant, None);
        assert!(streamed.apply_stream_chunk("a\r", MAX));
        assert!(streamed.apply_stream_chunk("\nb", MAX));
        assert!(streamed.apply_stop_stream());

        let mut whole = Leaf::new(LeafKind::Assistant, None, "", MAX);
        let _ = whole.apply_content("a\r\nb", MAX);

        assert_eq!(streamed.content(), "a\nb");
        assert_eq!(streamed.content(), whole.content());
    }

    #[test]
    fn lone_cr_chunk_still_breaks_the_line() {
        let mut leaf = Leaf::new_stream(LeafKind::Assistant, None);
        assert!(leaf.apply_stream_chunk("a\r", MAX));
        assert!(leaf.apply_stream_chunk("b", MAX));
        assert_eq!(leaf.content(), "a\nb");
        assert!(leaf.apply_stream_chunk("\n", MAX));
        assert_eq!(leaf.content(), "a\nb\n");
    }

    #[test]
    fn stream_chunk_rejected_when_not_streaming_or_empty() {
        let mut leaf = Leaf::new_stream(LeafKind::Assistant, None);
        assert!(!leaf.apply_stream_chunk("", MAX));
        let mut done = Leaf::new(LeafKind::Assistant, None, "x", MAX);
        assert!(!done.apply_stream_chunk("more", MAX));
        assert_eq!(done.content(), "x");
    }

    #[test]
    fn stream_is_capped() {
        let mut leaf = Leaf::new_stream(LeafKind::Assistant, None);
        assert!(leaf.apply_stream_chunk("abcdef", 4));
        assert_eq!(leaf.content(), "abcd");
        assert!(!leaf.apply_stream_chunk("gh", 4));
        assert_eq!(leaf.content(), "abcd");
    }

    #[test]
    fn stop_stream_is_one_shot_and_trims() {
        let mut leaf = Leaf::new_stream(LeafKind::Assistant, None);
        let _ = leaf.apply_stream_chunk("answer \n\n", MAX);
        assert!(leaf.apply_stop_stream());
        assert_eq!(leaf.content(), "answer");
        assert!(!leaf.apply_stop_stream());
        assert_eq!(leaf.content(), "answer");
        assert!(leaf.is_persistable());
    }

    #[test]
    fn leaves_order_by_identifier() {
        let first = Leaf::new(LeafKind::User, None, "b", MAX);
        let second = Leaf::new(LeafKind::User, None, "a", MAX);
        assert!(first < second);
        assert_ne!(first, second);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        let _ = crate::sqlite::catalogue::initialize(&conn).unwrap();
        let _ = conn
            .execute(
                "INSERT INTO sessions (id, classification, is_waste, update_time, access_time)
                 VALUES (1, 'home', 0, 0, 0)",
                [],
            )
            .unwrap();
        conn
    }

    #[test]
    fn persist_inserts_then_updates() {
        let conn = setup();
        let parent = Identifier::from_raw(1);
        let mut leaf = Leaf::new(LeafKind::Assistant, Some("opus"), "first", MAX);
        leaf.persist(&conn, parent, LeafChanges::ALL).unwrap();
        assert!(leaf.is_persisted());

        let changes = leaf.apply_content("second", MAX);
        leaf.persist(&conn, parent, changes).unwrap();

        let rows = LeafRepo::list_for_session(&conn, parent).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "second");
        assert_eq!(rows[0].model.as_deref(), Some("opus"));
        assert_eq!(rows[0].kind, "assistant");
    }
}
