//! The root aggregate: bins, the session arena, selection and storage.

mod handle;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use garden_core::Identifier;
use garden_core::sanitize::sanitize_optional_line;
use garden_settings::GardenSettings;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::bin::{Bin, topic_matches};
use super::leaf::{Leaf, LeafChanges};
use super::session::{Session, SessionHeader};
use super::{BinKind, Change, GardenStats, SortOrder, TextLimits, now};
use crate::errors::{Result, StoreError};
use crate::events::{ChangeBatch, GardenEvent, Notifier};
use crate::sqlite::repositories::{SessionPatch, SessionRepo};
use crate::sqlite::{Connection, OpenResult, StorageProvider, catalogue, verify_pragmas};

pub use handle::{LeafMut, SessionMut};

/// Every session, sorted into Home, Archive and Waste, backed by storage.
pub struct Garden {
    provider: Arc<dyn StorageProvider>,
    limits: TextLimits,
    open_byte_budget: usize,
    sessions: HashMap<Identifier, Session>,
    home: Bin,
    archive: Bin,
    waste: Bin,
    selected: Option<Identifier>,
    is_open: bool,
    notifier: Notifier,
}

impl Garden {
    /// Create a closed garden over `provider`.
    pub fn new(provider: Arc<dyn StorageProvider>, settings: &GardenSettings) -> Self {
        let retention = &settings.retention;
        Self {
            provider,
            limits: TextLimits::from(&settings.limits),
            open_byte_budget: retention.open_byte_budget,
            sessions: HashMap::new(),
            home: Bin::new(BinKind::Home, timeout_days(retention.home_timeout_days)),
            archive: Bin::new(BinKind::Archive, timeout_days(retention.archive_timeout_days)),
            waste: Bin::new(BinKind::Waste, timeout_days(retention.waste_timeout_days)),
            selected: None,
            is_open: false,
            notifier: Notifier::new(settings.events.channel_capacity),
        }
    }

    /// Subscribe to change events.
    pub fn subscribe(&self) -> broadcast::Receiver<GardenEvent> {
        self.notifier.subscribe()
    }

    /// The storage provider.
    pub fn provider(&self) -> &Arc<dyn StorageProvider> {
        &self.provider
    }

    /// Whether [`Garden::open`] has run.
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Initialize the schema and load every session header.
    ///
    /// Raises one [`GardenEvent::BinChanged`] per bin that received sessions.
    /// Does nothing if already open.
    pub fn open(&mut self) -> Result<OpenResult> {
        if self.is_open {
            return Ok(OpenResult::Open);
        }
        let conn = self.connect()?;
        if !verify_pragmas(&conn)?.foreign_keys_enabled {
            return Err(StoreError::InvalidOperation(
                "storage connections must enforce foreign keys".into(),
            ));
        }
        let result = catalogue::initialize(&conn)?;
        let sessions = SessionRepo::list_all(&conn)?
            .into_iter()
            .map(|row| Session::from_row(row, self.limits))
            .collect::<Result<Vec<_>>>()?;
        drop(conn);

        let count = sessions.len();
        let mut batch = ChangeBatch::new();
        for session in sessions {
            let kind = session.bin_kind();
            let _ = self.bin_mut(kind).add(session.id());
            batch.mark(kind);
            let _ = self.sessions.insert(session.id(), session);
        }
        self.is_open = true;
        info!(provider = %self.provider.describe(), ?result, sessions = count, "garden opened");
        batch.flush(&self.notifier);
        Ok(result)
    }

    /// Drop every session from memory and clear the selection.
    ///
    /// Returns `false` if the garden was not open.
    pub fn close(&mut self) -> bool {
        if !self.is_open {
            return false;
        }
        let _ = self.select(None);
        let mut batch = ChangeBatch::new();
        for kind in BinKind::ALL {
            let members = self.bin_mut(kind).clear();
            if !members.is_empty() {
                batch.mark(kind);
            }
            for id in members {
                let _ = self.sessions.remove(&id);
            }
        }
        if !self.sessions.is_empty() {
            warn!(orphans = self.sessions.len(), "sessions outside any bin at close");
            self.sessions.clear();
        }
        self.is_open = false;
        debug_assert!(self.selected.is_none());
        info!("garden closed");
        batch.flush(&self.notifier);
        true
    }

    /// Close and open again, re-reading everything from storage.
    pub fn reload(&mut self) -> Result<OpenResult> {
        let _ = self.close();
        self.open()
    }

    /// Attach a detached session.
    ///
    /// Writes the session row and any committed leaves it already holds in
    /// one transaction, adds it to its bin, and selects it if selection was
    /// requested.
    ///
    /// # Errors
    ///
    /// [`StoreError::Closed`] if the garden is closed;
    /// [`StoreError::InvalidOperation`] for an empty or duplicate identifier.
    pub fn insert(&mut self, mut session: Session) -> Result<Identifier> {
        self.ensure_open()?;
        let id = session.id();
        if id.is_empty() {
            return Err(StoreError::InvalidOperation(
                "session has an empty identifier".into(),
            ));
        }
        if self.sessions.contains_key(&id) {
            return Err(StoreError::InvalidOperation(format!(
                "session {id} is already in the garden"
            )));
        }

        session.set_limits(self.limits);
        let wants_selection = std::mem::replace(&mut session.is_selected, false);

        let conn = self.connect()?;
        let tx = conn.unchecked_transaction()?;
        SessionRepo::insert(&tx, &session.to_row())?;
        for leaf in session.leaves_mut().iter_mut().filter(|l| l.is_persistable()) {
            leaf.persist(&tx, id, LeafChanges::ALL)?;
        }
        tx.commit()?;
        drop(conn);

        let kind = session.bin_kind();
        let _ = self.sessions.insert(id, session);
        let _ = self.bin_mut(kind).add(id);
        debug!(session = %id, bin = %kind, "inserted session");
        self.notifier.emit(GardenEvent::BinChanged(kind));

        if wants_selection {
            let _ = self.select(Some(id));
        }
        Ok(id)
    }

    /// Delete every session from storage and memory.
    ///
    /// Returns `false` if there was nothing to delete.
    pub fn purge(&mut self) -> Result<bool> {
        self.ensure_open()?;
        if self.sessions.is_empty() {
            return Ok(false);
        }
        let conn = self.connect()?;
        let removed = SessionRepo::delete_all(&conn)?;
        drop(conn);
        let _ = self.close();
        info!(removed, "garden purged");
        let _ = self.open()?;
        Ok(true)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────

    /// Look up an attached session.
    pub fn session(&self, id: Identifier) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Write-through handle to an attached session.
    pub fn session_mut(&mut self, id: Identifier) -> Option<SessionMut<'_>> {
        if self.sessions.contains_key(&id) {
            Some(SessionMut::new(self, id))
        } else {
            None
        }
    }

    /// Number of attached sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are attached.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Move a session out of Waste back into its classification bin.
    pub fn restore(&mut self, id: Identifier) -> Result<bool> {
        self.ensure_open()?;
        self.session_mut(id)
            .ok_or(StoreError::SessionNotFound(id))?
            .set_waste(false)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Selection
    // ─────────────────────────────────────────────────────────────────────

    /// The selected session, if any.
    pub fn selected(&self) -> Option<Identifier> {
        self.selected
    }

    /// Make `id` the single selected session, or clear the selection.
    ///
    /// Returns `false` if nothing changed or `id` is not attached.
    pub fn select(&mut self, id: Option<Identifier>) -> bool {
        if id == self.selected {
            return false;
        }
        if id.is_some_and(|id| !self.sessions.contains_key(&id)) {
            return false;
        }
        let previous = self.selected.take();
        if let Some(session) = previous.and_then(|p| self.sessions.get_mut(&p)) {
            session.is_selected = false;
        }
        if let Some(session) = id.and_then(|s| self.sessions.get_mut(&s)) {
            session.is_selected = true;
        }
        self.selected = id;
        self.notifier.emit(GardenEvent::SelectionChanged {
            selected: id,
            previous,
        });
        true
    }

    // ─────────────────────────────────────────────────────────────────────
    // Bins
    // ─────────────────────────────────────────────────────────────────────

    /// One of the three bins.
    pub fn bin(&self, kind: BinKind) -> &Bin {
        match kind {
            BinKind::Home => &self.home,
            BinKind::Archive => &self.archive,
            BinKind::Waste => &self.waste,
        }
    }

    fn bin_mut(&mut self, kind: BinKind) -> &mut Bin {
        match kind {
            BinKind::Home => &mut self.home,
            BinKind::Archive => &mut self.archive,
            BinKind::Waste => &mut self.waste,
        }
    }

    /// Distinct topics of a bin. A leading `None` means untagged sessions exist.
    pub fn topics(&self, kind: BinKind) -> &[Option<String>] {
        self.bin(kind).topics(&self.sessions)
    }

    /// A bin's sessions in `order`.
    ///
    /// Leaf writes and [`SessionMut::open`] move `update_time` and
    /// `access_time` without raising [`GardenEvent::BinChanged`], so a list
    /// sorted by either time can go stale until the next bin event.
    pub fn sorted_sessions(&self, kind: BinKind, order: SortOrder) -> Vec<&Session> {
        self.bin(kind).sorted(&self.sessions, None, order)
    }

    /// A bin's sessions tagged `topic` (case-insensitive) in `order`.
    /// `None` or an empty topic selects untagged sessions.
    pub fn sorted_sessions_by_topic(
        &self,
        kind: BinKind,
        topic: Option<&str>,
        order: SortOrder,
    ) -> Vec<&Session> {
        self.bin(kind).sorted(&self.sessions, Some(topic), order)
    }

    /// Retag every session in `kind` whose topic matches `from`.
    ///
    /// Raises one [`GardenEvent::BinChanged`] however many rows change.
    pub fn rename_topic(&mut self, kind: BinKind, from: &str, to: &str) -> Result<bool> {
        let to = sanitize_optional_line(Some(to), self.limits.topic_chars);
        self.retag(kind, from, to.as_deref())
    }

    /// Clear the topic of every session in `kind` tagged `topic`.
    pub fn delete_topic(&mut self, kind: BinKind, topic: &str) -> Result<bool> {
        if topic.is_empty() {
            return Ok(false);
        }
        self.retag(kind, topic, None)
    }

    fn retag(&mut self, kind: BinKind, from: &str, to: Option<&str>) -> Result<bool> {
        self.ensure_open()?;
        let targets: Vec<Identifier> = self
            .bin(kind)
            .ids()
            .filter(|id| {
                self.sessions
                    .get(id)
                    .is_some_and(|s| topic_matches(s.topic(), Some(from)))
            })
            .collect();
        if targets.is_empty() {
            return Ok(false);
        }

        let mut changed = Vec::new();
        let outcome = self.retag_rows(&targets, to, &mut changed);

        if !changed.is_empty() {
            self.bin_mut(kind).invalidate();
            self.notifier.emit(GardenEvent::BinChanged(kind));
            if let Some(selected) = self.selected.filter(|s| changed.contains(s)) {
                self.notifier.emit(GardenEvent::SelectionUpdated(selected));
            }
            info!(bin = %kind, from, to, rows = changed.len(), "retagged sessions");
        }
        outcome?;
        Ok(!changed.is_empty())
    }

    fn retag_rows(
        &mut self,
        targets: &[Identifier],
        to: Option<&str>,
        changed: &mut Vec<Identifier>,
    ) -> Result<()> {
        let conn = self.connect()?;
        let at = now();
        for id in targets {
            let Some(session) = self.sessions.get_mut(id) else {
                continue;
            };
            let before = session.header();
            let Some(patch) = session.apply_topic(to) else {
                continue;
            };
            let touch = session.touch_update(at);
            write_patches(&conn, session, before, &[patch, touch])?;
            changed.push(*id);
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Prune
    // ─────────────────────────────────────────────────────────────────────

    /// [`Garden::prune_at`] with the current time.
    pub fn prune(&mut self) -> Result<bool> {
        self.prune_at(Utc::now())
    }

    /// Expire idle sessions and unload sessions over the byte budget.
    ///
    /// Bins are swept Home, Archive, Waste with one shared budget. Expired
    /// Home and Archive sessions are demoted to Waste (their idle clock
    /// restarts); expired Waste sessions are deleted. The selected session
    /// is never touched. Returns whether any session was demoted or deleted.
    pub fn prune_at(&mut self, now: DateTime<Utc>) -> Result<bool> {
        self.ensure_open()?;
        let mut budget = self.open_byte_budget;
        let selected = self.selected;

        let mut demotions = self.home.prune(&mut self.sessions, selected, now, &mut budget);
        demotions.extend(self.archive.prune(&mut self.sessions, selected, now, &mut budget));
        let deletions = self.waste.prune(&mut self.sessions, selected, now, &mut budget);

        let mut batch = ChangeBatch::new();
        let outcome = self.apply_prune(&deletions, &demotions, now, &mut batch);
        batch.flush(&self.notifier);

        let pruned = outcome?;
        if pruned {
            info!(
                deleted = deletions.len(),
                demoted = demotions.len(),
                "garden pruned"
            );
        }
        Ok(pruned)
    }

    fn apply_prune(
        &mut self,
        deletions: &[Identifier],
        demotions: &[Identifier],
        now: DateTime<Utc>,
        batch: &mut ChangeBatch,
    ) -> Result<bool> {
        let mut pruned = false;

        if !deletions.is_empty() {
            let conn = self.connect()?;
            for &id in deletions {
                let _ = SessionRepo::delete(&conn, id)?;
                let _ = self.waste.remove(id);
                let _ = self.sessions.remove(&id);
                batch.mark(BinKind::Waste);
                pruned = true;
            }
        }

        if !demotions.is_empty() {
            let conn = self.connect()?;
            for &id in demotions {
                let Some(session) = self.sessions.get_mut(&id) else {
                    continue;
                };
                let from = session.bin_kind();
                let before = session.header();
                let Some(patch) = session.apply_waste(true) else {
                    continue;
                };
                let touch = session.touch_access(now);
                write_patches(&conn, session, before, &[patch, touch])?;
                let _ = self.bin_mut(from).remove(id);
                let _ = self.waste.add(id);
                batch.mark(from);
                batch.mark(BinKind::Waste);
                pruned = true;
            }
        }

        Ok(pruned)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Stats
    // ─────────────────────────────────────────────────────────────────────

    /// Occupancy snapshot.
    pub fn stats(&self) -> GardenStats {
        let open = self.sessions.values().filter(|s| s.is_open());
        GardenStats {
            home: self.home.len(),
            archive: self.archive.len(),
            waste: self.waste.len(),
            open_sessions: open.clone().count(),
            open_bytes: open.map(Session::total_open_length).sum(),
            selected: self.selected,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internal
    // ─────────────────────────────────────────────────────────────────────

    fn ensure_open(&self) -> Result<()> {
        if self.is_open {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }

    fn connect(&self) -> Result<Connection> {
        self.provider.connect()
    }

    fn bin_of(&self, id: Identifier) -> Option<BinKind> {
        BinKind::ALL.into_iter().find(|kind| self.bin(*kind).contains(id))
    }

    /// Route a change on session `id` to bins and subscribers.
    fn on_child_changed(&mut self, id: Identifier, change: Change) {
        let Some(session) = self.sessions.get(&id) else {
            return;
        };
        let target = session.bin_kind();
        let is_selected = session.is_selected;
        let current = self.bin_of(id);

        match change {
            Change::Leaf | Change::Access => {}
            Change::Metadata => {
                if let Some(kind) = current {
                    self.bin_mut(kind).invalidate();
                    self.notifier.emit(GardenEvent::BinChanged(kind));
                }
            }
            Change::Classification => {
                if current != Some(target) {
                    let mut batch = ChangeBatch::new();
                    if let Some(from) = current {
                        let _ = self.bin_mut(from).remove(id);
                        batch.mark(from);
                    }
                    let _ = self.bin_mut(target).add(id);
                    batch.mark(target);
                    debug!(session = %id, ?current, to = %target, "moved session");
                    batch.flush(&self.notifier);
                }
            }
        }

        if is_selected && change != Change::Access {
            self.notifier.emit(GardenEvent::SelectionUpdated(id));
        }
    }

    /// Remove a session from its bin, the selection and the arena.
    fn detach(&mut self, id: Identifier) -> Option<Session> {
        if self.selected == Some(id) {
            let _ = self.select(None);
        }
        if let Some(kind) = self.bin_of(id) {
            let _ = self.bin_mut(kind).remove(id);
            self.notifier.emit(GardenEvent::BinChanged(kind));
        }
        self.sessions.remove(&id)
    }

    /// Write column changes already applied to session `id` in memory.
    ///
    /// On failure the session's columns are put back to `before`.
    fn write_session(
        &mut self,
        id: Identifier,
        before: SessionHeader,
        patches: &[SessionPatch],
    ) -> Result<()> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(StoreError::SessionNotFound(id))?;
        let conn = match self.provider.connect() {
            Ok(conn) => conn,
            Err(err) => {
                session.restore_header(before);
                return Err(err);
            }
        };
        write_patches(&conn, session, before, patches)?;
        debug!(session = %id, ?patches, "updated session");
        Ok(())
    }

    /// Edit a leaf in place and write it through when it is persistable.
    ///
    /// Returns whether `edit` reported a change.
    fn write_leaf(
        &mut self,
        session_id: Identifier,
        leaf_id: Identifier,
        edit: impl FnOnce(&mut Leaf, &TextLimits) -> LeafChanges,
    ) -> Result<bool> {
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or(StoreError::SessionNotFound(session_id))?;
        let limits = session.limits();
        let leaf = session
            .leaf_mut(leaf_id)
            .ok_or(StoreError::LeafNotFound(leaf_id))?;

        let changes = edit(leaf, &limits);
        if changes.is_empty() {
            return Ok(false);
        }
        if leaf.is_persistable() {
            let conn = self.provider.connect()?;
            leaf.persist(&conn, session_id, changes)?;
            let before = session.header();
            let touch = session.touch_update(now());
            write_patches(&conn, session, before, &[touch])?;
        }
        self.on_child_changed(session_id, Change::Leaf);
        Ok(true)
    }
}

/// Write `patches` for `session` in one transaction, or restore `before`
/// in memory if any statement fails.
fn write_patches(
    conn: &rusqlite::Connection,
    session: &mut Session,
    before: SessionHeader,
    patches: &[SessionPatch],
) -> Result<()> {
    let id = session.id();
    let outcome = apply_patches(conn, id, patches);
    if outcome.is_err() {
        warn!(session = %id, "session write failed; in-memory edit reverted");
        session.restore_header(before);
    }
    outcome
}

fn apply_patches(
    conn: &rusqlite::Connection,
    id: Identifier,
    patches: &[SessionPatch],
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for patch in patches {
        let _ = SessionRepo::apply(&tx, id, patch)?;
    }
    tx.commit()?;
    Ok(())
}

fn timeout_days(days: u32) -> Option<TimeDelta> {
    (days > 0).then(|| TimeDelta::days(i64::from(days)))
}
