//! Write-through handles to attached sessions and leaves.
//!
//! A handle borrows the whole garden mutably for its lifetime, so the
//! session it names cannot disappear underneath it. Every setter applies
//! the edit in memory, writes it through, then routes the change to bins
//! and subscribers.

use garden_core::Identifier;
use tracing::debug;

use super::{Garden, write_patches};
use crate::errors::{Result, StoreError};
use crate::model::leaf::{Leaf, LeafChanges, LeafKind};
use crate::model::session::Session;
use crate::model::{Change, Classification, now};
use crate::sqlite::repositories::{LeafRepo, SessionPatch, SessionRepo};

/// Mutable access to an attached session.
pub struct SessionMut<'g> {
    garden: &'g mut Garden,
    id: Identifier,
}

impl<'g> SessionMut<'g> {
    pub(super) fn new(garden: &'g mut Garden, id: Identifier) -> Self {
        Self { garden, id }
    }

    /// The session's identifier.
    pub fn id(&self) -> Identifier {
        self.id
    }

    /// Load leaves from storage (if not loaded) and bump the access time.
    ///
    /// Returns the number of loaded leaves.
    pub fn open(&mut self) -> Result<usize> {
        let id = self.id;
        let garden = &mut *self.garden;
        let session = garden
            .sessions
            .get_mut(&id)
            .ok_or(StoreError::SessionNotFound(id))?;
        let conn = garden.provider.connect()?;
        let count = if session.is_open() {
            session.leaves().len()
        } else {
            session.load(LeafRepo::list_for_session(&conn, id)?)?
        };
        let before = session.header();
        let touch = session.touch_access(now());
        write_patches(&conn, session, before, &[touch])?;
        debug!(session = %id, leaves = count, "opened session");
        garden.on_child_changed(id, Change::Access);
        Ok(count)
    }

    /// Drop loaded leaves. Returns how many were dropped.
    pub fn close(&mut self) -> usize {
        self.garden
            .sessions
            .get_mut(&self.id)
            .map_or(0, Session::unload)
    }

    /// Set the title.
    pub fn set_title(&mut self, title: Option<&str>) -> Result<bool> {
        self.update(Change::Metadata, true, |s| s.apply_title(title))
    }

    /// Set the default model for new assistant leaves.
    pub fn set_model(&mut self, model: Option<&str>) -> Result<bool> {
        self.update(Change::Metadata, true, |s| s.apply_model(model))
    }

    /// Set the topic tag.
    pub fn set_topic(&mut self, topic: Option<&str>) -> Result<bool> {
        self.update(Change::Metadata, true, |s| s.apply_topic(topic))
    }

    /// Move between Home and Archive.
    pub fn set_classification(&mut self, classification: Classification) -> Result<bool> {
        self.update(Change::Classification, false, |s| {
            s.apply_classification(classification)
        })
    }

    /// Move into or out of Waste.
    pub fn set_waste(&mut self, is_waste: bool) -> Result<bool> {
        self.update(Change::Classification, false, |s| s.apply_waste(is_waste))
    }

    /// Select or deselect this session.
    pub fn set_selected(&mut self, selected: bool) -> bool {
        if selected {
            self.garden.select(Some(self.id))
        } else if self.garden.selected == Some(self.id) {
            self.garden.select(None)
        } else {
            false
        }
    }

    /// Set the scroll offset. Not persisted.
    pub fn set_visual_scroll_pos(&mut self, pos: f64) {
        if let Some(session) = self.garden.sessions.get_mut(&self.id) {
            session.set_visual_scroll_pos(pos);
        }
    }

    /// Append a committed leaf, opening the session first if needed.
    pub fn append(&mut self, kind: LeafKind, content: &str) -> Result<Identifier> {
        let leaf_id = self.with_loaded(|session| session.append(kind, content))?;
        let _ = self
            .garden
            .write_leaf(self.id, leaf_id, |_, _| LeafChanges::ALL)?;
        Ok(leaf_id)
    }

    /// Append an empty streaming leaf, opening the session first if needed.
    pub fn append_stream(&mut self, kind: LeafKind) -> Result<Identifier> {
        let leaf_id = self.with_loaded(|session| session.append_stream(kind))?;
        self.garden.on_child_changed(self.id, Change::Leaf);
        Ok(leaf_id)
    }

    /// Handle to one of this session's loaded leaves.
    pub fn leaf(&mut self, leaf_id: Identifier) -> Option<LeafMut<'_>> {
        let exists = self
            .garden
            .sessions
            .get(&self.id)
            .and_then(|s| s.leaf(leaf_id))
            .is_some();
        if !exists {
            return None;
        }
        Some(LeafMut {
            garden: &mut *self.garden,
            session: self.id,
            leaf: leaf_id,
        })
    }

    /// Delete the session and its leaves, detaching it from the garden.
    ///
    /// Returns whether a stored row was removed.
    pub fn delete(self) -> Result<bool> {
        let Self { garden, id } = self;
        let conn = garden.connect()?;
        let deleted = SessionRepo::delete(&conn, id)?;
        drop(conn);
        let _ = garden.detach(id);
        debug!(session = %id, deleted, "deleted session");
        Ok(deleted)
    }

    fn with_loaded<T>(&mut self, edit: impl FnOnce(&mut Session) -> T) -> Result<T> {
        let is_open = self
            .garden
            .sessions
            .get(&self.id)
            .ok_or(StoreError::SessionNotFound(self.id))?
            .is_open();
        if !is_open {
            let _ = self.open()?;
        }
        let session = self
            .garden
            .sessions
            .get_mut(&self.id)
            .ok_or(StoreError::SessionNotFound(self.id))?;
        Ok(edit(session))
    }

    fn update(
        &mut self,
        change: Change,
        bump: bool,
        edit: impl FnOnce(&mut Session) -> Option<SessionPatch>,
    ) -> Result<bool> {
        let id = self.id;
        let session = self
            .garden
            .sessions
            .get_mut(&id)
            .ok_or(StoreError::SessionNotFound(id))?;
        let before = session.header();
        let Some(patch) = edit(session) else {
            return Ok(false);
        };
        let mut patches = vec![patch];
        if bump {
            patches.push(session.touch_update(now()));
        }
        self.garden.write_session(id, before, &patches)?;
        self.garden.on_child_changed(id, change);
        Ok(true)
    }
}

/// Mutable access to a loaded leaf of an attached session.
pub struct LeafMut<'g> {
    garden: &'g mut Garden,
    session: Identifier,
    leaf: Identifier,
}

impl LeafMut<'_> {
    /// The leaf's identifier.
    pub fn id(&self) -> Identifier {
        self.leaf
    }

    /// Whether edits are written to storage right now.
    pub fn is_writable(&self) -> bool {
        self.garden.is_open
            && self
                .garden
                .sessions
                .get(&self.session)
                .and_then(|s| s.leaf(self.leaf))
                .is_some_and(Leaf::is_persistable)
    }

    /// Replace the content. Ends streaming.
    pub fn set_content(&mut self, text: &str) -> Result<bool> {
        self.garden.write_leaf(self.session, self.leaf, |leaf, limits| {
            leaf.apply_content(text, limits.content_bytes)
        })
    }

    /// Replace the model. Ignored for kinds without a model.
    pub fn set_model(&mut self, model: Option<&str>) -> Result<bool> {
        self.garden
            .write_leaf(self.session, self.leaf, |leaf, _| leaf.apply_model(model))
    }

    /// Append a chunk while streaming. Nothing is written; subscribers
    /// still hear about the change.
    pub fn append_stream(&mut self, chunk: &str) -> bool {
        let garden = &mut *self.garden;
        let Some(session) = garden.sessions.get_mut(&self.session) else {
            return false;
        };
        let max = session.limits().content_bytes;
        let appended = session
            .leaf_mut(self.leaf)
            .is_some_and(|leaf| leaf.apply_stream_chunk(chunk, max));
        if appended {
            garden.on_child_changed(self.session, Change::Leaf);
        }
        appended
    }

    /// Finish streaming and write the leaf for the first time.
    ///
    /// Returns `false` if the leaf was not streaming.
    pub fn stop_stream(&mut self) -> Result<bool> {
        self.garden.write_leaf(self.session, self.leaf, |leaf, _| {
            if leaf.apply_stop_stream() {
                LeafChanges::ALL
            } else {
                LeafChanges::default()
            }
        })
    }
}
