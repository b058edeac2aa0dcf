//! A conversation: metadata plus an ordered run of leaves.
//!
//! A `Session` value is either *detached* (owned by the caller, never
//! written anywhere) or *attached* (owned by a [`Garden`](super::Garden)).
//! The public setters here only touch memory; attached sessions are
//! edited through [`SessionMut`](super::SessionMut), which writes through.

use chrono::{DateTime, Utc};
use garden_core::Identifier;
use garden_core::sanitize::{sanitize_model, sanitize_optional_line};

use super::leaf::{Leaf, LeafKind};
use super::{BinKind, Classification, TextLimits, now};
use crate::errors::Result;
use crate::sqlite::repositories::SessionPatch;
use crate::sqlite::row_types::{
    LeafRow, SessionRow, parse_enum, require_id, time_from_millis, time_to_millis,
};

/// Stored columns of a session, captured so a failed write can be undone.
#[derive(Clone, Debug)]
pub(crate) struct SessionHeader {
    classification: Classification,
    is_waste: bool,
    title: Option<String>,
    model: Option<String>,
    topic: Option<String>,
    update_time: DateTime<Utc>,
    access_time: DateTime<Utc>,
}

/// A conversation and its loaded leaves.
#[derive(Clone, Debug)]
pub struct Session {
    id: Identifier,
    classification: Classification,
    is_waste: bool,
    title: Option<String>,
    model: Option<String>,
    topic: Option<String>,
    update_time: DateTime<Utc>,
    access_time: DateTime<Utc>,
    is_open: bool,
    leaves: Vec<Leaf>,
    pub(crate) is_selected: bool,
    visual_scroll_pos: f64,
    limits: TextLimits,
}

impl Session {
    /// A new, empty, open session with a fresh identifier.
    pub fn new(classification: Classification) -> Self {
        let now = now();
        Self {
            id: Identifier::new(),
            classification,
            is_waste: false,
            title: None,
            model: None,
            topic: None,
            update_time: now,
            access_time: now,
            is_open: true,
            leaves: Vec::new(),
            is_selected: false,
            visual_scroll_pos: 0.0,
            limits: TextLimits::default(),
        }
    }

    /// Builder form of [`Session::set_title`].
    #[must_use]
    pub fn with_title(mut self, title: &str) -> Self {
        let _ = self.set_title(Some(title));
        self
    }

    /// Builder form of [`Session::set_topic`].
    #[must_use]
    pub fn with_topic(mut self, topic: &str) -> Self {
        let _ = self.set_topic(Some(topic));
        self
    }

    /// Builder form of [`Session::set_model`].
    #[must_use]
    pub fn with_model(mut self, model: &str) -> Self {
        let _ = self.set_model(Some(model));
        self
    }

    /// Read path: rebuild a session header from storage. Leaves are not loaded.
    pub(crate) fn from_row(row: SessionRow, limits: TextLimits) -> Result<Self> {
        Ok(Self {
            id: require_id(row.id, "sessions", "id")?,
            classification: parse_enum(&row.classification, "sessions", "classification")?,
            is_waste: row.is_waste,
            title: row.title,
            model: row.model,
            topic: row.topic,
            update_time: time_from_millis(row.update_time),
            access_time: time_from_millis(row.access_time),
            is_open: false,
            leaves: Vec::new(),
            is_selected: false,
            visual_scroll_pos: 0.0,
            limits,
        })
    }

    pub(crate) fn to_row(&self) -> SessionRow {
        SessionRow {
            id: self.id,
            classification: self.classification.as_str().to_owned(),
            is_waste: self.is_waste,
            title: self.title.clone(),
            model: self.model.clone(),
            topic: self.topic.clone(),
            update_time: time_to_millis(self.update_time),
            access_time: time_to_millis(self.access_time),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    /// Session identifier. Also encodes the creation time.
    pub fn id(&self) -> Identifier {
        self.id
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.id.created_at()
    }

    /// Home or Archive.
    pub fn classification(&self) -> Classification {
        self.classification
    }

    /// Whether the session sits in Waste.
    pub fn is_waste(&self) -> bool {
        self.is_waste
    }

    /// The bin this session belongs in.
    pub fn bin_kind(&self) -> BinKind {
        if self.is_waste {
            BinKind::Waste
        } else {
            self.classification.bin_kind()
        }
    }

    /// Title.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Default model for new assistant leaves.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Topic tag.
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// Last content or metadata change.
    pub fn update_time(&self) -> DateTime<Utc> {
        self.update_time
    }

    /// Last time the session was opened.
    pub fn access_time(&self) -> DateTime<Utc> {
        self.access_time
    }

    /// Whether leaves are loaded.
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Loaded leaves in creation order. Empty while closed.
    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    /// Look up a loaded leaf.
    pub fn leaf(&self, id: Identifier) -> Option<&Leaf> {
        self.leaves.iter().find(|leaf| leaf.id() == id)
    }

    /// Whether this is the garden's selected session (or, while detached,
    /// whether selection was requested on insert).
    pub fn is_selected(&self) -> bool {
        self.is_selected
    }

    /// Presentation scroll offset.
    pub fn visual_scroll_pos(&self) -> f64 {
        self.visual_scroll_pos
    }

    /// Bytes of loaded leaf content.
    pub fn total_open_length(&self) -> usize {
        self.leaves.iter().map(Leaf::byte_len).sum()
    }

    /// Text caps in effect for this session.
    pub fn limits(&self) -> TextLimits {
        self.limits
    }

    // ─────────────────────────────────────────────────────────────────────
    // Detached setters
    // ─────────────────────────────────────────────────────────────────────

    /// Set the title. Returns whether it changed.
    pub fn set_title(&mut self, title: Option<&str>) -> bool {
        self.apply_title(title).is_some()
    }

    /// Set the default model. Returns whether it changed.
    pub fn set_model(&mut self, model: Option<&str>) -> bool {
        self.apply_model(model).is_some()
    }

    /// Set the topic. Returns whether it changed.
    pub fn set_topic(&mut self, topic: Option<&str>) -> bool {
        self.apply_topic(topic).is_some()
    }

    /// Set Home or Archive. Returns whether it changed.
    pub fn set_classification(&mut self, classification: Classification) -> bool {
        self.apply_classification(classification).is_some()
    }

    /// Move into or out of Waste. Returns whether it changed.
    pub fn set_waste(&mut self, is_waste: bool) -> bool {
        self.apply_waste(is_waste).is_some()
    }

    /// Request selection once the session is inserted.
    pub fn set_selected(&mut self, selected: bool) {
        self.is_selected = selected;
    }

    /// Set the scroll offset.
    pub fn set_visual_scroll_pos(&mut self, pos: f64) {
        self.visual_scroll_pos = pos;
    }

    /// Append a committed leaf. Returns its identifier.
    pub fn append(&mut self, kind: LeafKind, content: &str) -> Identifier {
        let leaf = Leaf::new(kind, self.model.as_deref(), content, self.limits.content_bytes);
        self.push_leaf(leaf)
    }

    /// Append an empty streaming leaf. Returns its identifier.
    pub fn append_stream(&mut self, kind: LeafKind) -> Identifier {
        let leaf = Leaf::new_stream(kind, self.model.as_deref());
        self.push_leaf(leaf)
    }

    /// Replace a leaf's content. Returns whether it changed.
    pub fn set_leaf_content(&mut self, id: Identifier, text: &str) -> bool {
        let max = self.limits.content_bytes;
        self.leaf_mut(id)
            .is_some_and(|leaf| !leaf.apply_content(text, max).is_empty())
    }

    /// Append a chunk to a streaming leaf.
    pub fn append_leaf_stream(&mut self, id: Identifier, chunk: &str) -> bool {
        let max = self.limits.content_bytes;
        self.leaf_mut(id)
            .is_some_and(|leaf| leaf.apply_stream_chunk(chunk, max))
    }

    /// Finish a streaming leaf.
    pub fn stop_leaf_stream(&mut self, id: Identifier) -> bool {
        self.leaf_mut(id).is_some_and(Leaf::apply_stop_stream)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internal edits; each returns the column patch to write, if any
    // ─────────────────────────────────────────────────────────────────────

    pub(crate) fn apply_title(&mut self, title: Option<&str>) -> Option<SessionPatch> {
        let title = sanitize_optional_line(title, self.limits.title_chars);
        (title != self.title).then(|| {
            self.title.clone_from(&title);
            SessionPatch::Title(title)
        })
    }

    pub(crate) fn apply_model(&mut self, model: Option<&str>) -> Option<SessionPatch> {
        let model = sanitize_model(model);
        (model != self.model).then(|| {
            self.model.clone_from(&model);
            SessionPatch::Model(model)
        })
    }

    pub(crate) fn apply_topic(&mut self, topic: Option<&str>) -> Option<SessionPatch> {
        let topic = sanitize_optional_line(topic, self.limits.topic_chars);
        (topic != self.topic).then(|| {
            self.topic.clone_from(&topic);
            SessionPatch::Topic(topic)
        })
    }

    pub(crate) fn apply_classification(
        &mut self,
        classification: Classification,
    ) -> Option<SessionPatch> {
        (classification != self.classification).then(|| {
            self.classification = classification;
            SessionPatch::Classification(classification)
        })
    }

    pub(crate) fn apply_waste(&mut self, is_waste: bool) -> Option<SessionPatch> {
        (is_waste != self.is_waste).then(|| {
            self.is_waste = is_waste;
            SessionPatch::Waste(is_waste)
        })
    }

    pub(crate) fn touch_update(&mut self, at: DateTime<Utc>) -> SessionPatch {
        self.update_time = at;
        SessionPatch::UpdateTime(at)
    }

    pub(crate) fn touch_access(&mut self, at: DateTime<Utc>) -> SessionPatch {
        self.access_time = at;
        SessionPatch::AccessTime(at)
    }

    pub(crate) fn header(&self) -> SessionHeader {
        SessionHeader {
            classification: self.classification,
            is_waste: self.is_waste,
            title: self.title.clone(),
            model: self.model.clone(),
            topic: self.topic.clone(),
            update_time: self.update_time,
            access_time: self.access_time,
        }
    }

    /// Put back columns captured by [`Session::header`].
    pub(crate) fn restore_header(&mut self, header: SessionHeader) {
        self.classification = header.classification;
        self.is_waste = header.is_waste;
        self.title = header.title;
        self.model = header.model;
        self.topic = header.topic;
        self.update_time = header.update_time;
        self.access_time = header.access_time;
    }

    pub(crate) fn set_limits(&mut self, limits: TextLimits) {
        self.limits = limits;
    }

    pub(crate) fn push_leaf(&mut self, leaf: Leaf) -> Identifier {
        let id = leaf.id();
        self.leaves.push(leaf);
        id
    }

    pub(crate) fn leaf_mut(&mut self, id: Identifier) -> Option<&mut Leaf> {
        self.leaves.iter_mut().find(|leaf| leaf.id() == id)
    }

    pub(crate) fn leaves_mut(&mut self) -> &mut [Leaf] {
        &mut self.leaves
    }

    /// Replace the leaves with stored rows and mark the session open.
    pub(crate) fn load(&mut self, rows: Vec<LeafRow>) -> Result<usize> {
        let leaves = rows
            .into_iter()
            .map(Leaf::from_row)
            .collect::<Result<Vec<_>>>()?;
        self.leaves = leaves;
        self.is_open = true;
        Ok(self.leaves.len())
    }

    /// Drop loaded leaves. Returns how many were dropped.
    pub(crate) fn unload(&mut self) -> usize {
        let count = self.leaves.len();
        self.leaves = Vec::new();
        self.is_open = false;
        count
    }
}
