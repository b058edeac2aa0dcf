//! A classification bucket of sessions.
//!
//! Members are kept as an ordered set of identifiers, which is also creation
//! order. The sessions themselves live in the garden's arena and are passed
//! in where a bin needs to look at them.

use std::cell::OnceCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, TimeDelta, Utc};
use garden_core::Identifier;
use tracing::debug;

use super::session::Session;
use super::{BinKind, SortOrder};

/// One of the garden's three buckets.
#[derive(Debug)]
pub struct Bin {
    kind: BinKind,
    timeout: Option<TimeDelta>,
    members: BTreeSet<Identifier>,
    topics: OnceCell<Vec<Option<String>>>,
}

impl Bin {
    pub(crate) fn new(kind: BinKind, timeout: Option<TimeDelta>) -> Self {
        Self {
            kind,
            timeout,
            members: BTreeSet::new(),
            topics: OnceCell::new(),
        }
    }

    /// Which bin this is.
    pub fn kind(&self) -> BinKind {
        self.kind
    }

    /// Whether this is the Waste bin.
    pub fn is_waste(&self) -> bool {
        self.kind == BinKind::Waste
    }

    /// Idle time after which a member is demoted or deleted. `None` never expires.
    pub fn timeout(&self) -> Option<TimeDelta> {
        self.timeout
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the bin has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: Identifier) -> bool {
        self.members.contains(&id)
    }

    /// Member identifiers in creation order.
    pub fn ids(&self) -> impl Iterator<Item = Identifier> + '_ {
        self.members.iter().copied()
    }

    pub(crate) fn add(&mut self, id: Identifier) -> bool {
        let added = self.members.insert(id);
        if added {
            self.invalidate();
        }
        added
    }

    pub(crate) fn remove(&mut self, id: Identifier) -> bool {
        let removed = self.members.remove(&id);
        if removed {
            self.invalidate();
        }
        removed
    }

    /// Empty the bin, returning the former members.
    pub(crate) fn clear(&mut self) -> Vec<Identifier> {
        self.invalidate();
        std::mem::take(&mut self.members).into_iter().collect()
    }

    /// Forget the memoized topic list.
    pub(crate) fn invalidate(&mut self) {
        let _ = self.topics.take();
    }

    /// Distinct topics, sorted case-insensitively. A leading `None` means
    /// some members have no topic.
    pub(crate) fn topics(&self, sessions: &HashMap<Identifier, Session>) -> &[Option<String>] {
        self.topics.get_or_init(|| {
            collect_topics(
                self.members
                    .iter()
                    .filter_map(|id| sessions.get(id))
                    .map(Session::topic),
            )
        })
    }

    /// Members matching `topic` (when given), sorted by `order`.
    pub(crate) fn sorted<'s>(
        &self,
        sessions: &'s HashMap<Identifier, Session>,
        topic: Option<Option<&str>>,
        order: SortOrder,
    ) -> Vec<&'s Session> {
        let mut out: Vec<&Session> = self
            .members
            .iter()
            .filter_map(|id| sessions.get(id))
            .filter(|session| topic.is_none_or(|t| topic_matches(session.topic(), t)))
            .collect();
        out.sort_by(|a, b| compare(order, a, b));
        out
    }

    /// Sweep members newest-access-first.
    ///
    /// Expired members are unloaded and returned for the caller to demote
    /// (or delete, in Waste). Live open members are charged against
    /// `budget`; once it reaches zero they are unloaded. The selected
    /// session is never touched.
    pub(crate) fn prune(
        &self,
        sessions: &mut HashMap<Identifier, Session>,
        selected: Option<Identifier>,
        now: DateTime<Utc>,
        budget: &mut usize,
    ) -> Vec<Identifier> {
        let mut visit: Vec<(DateTime<Utc>, Identifier)> = self
            .members
            .iter()
            .filter_map(|id| sessions.get(id).map(|s| (s.access_time(), *id)))
            .collect();
        visit.sort_unstable_by(|a, b| b.cmp(a));

        let mut expired = Vec::new();
        for (access_time, id) in visit {
            if selected == Some(id) {
                continue;
            }
            let Some(session) = sessions.get_mut(&id) else {
                continue;
            };
            if self.timeout.is_some_and(|timeout| now - access_time > timeout) {
                let _ = session.unload();
                expired.push(id);
            } else if session.is_open() {
                if *budget == 0 {
                    let dropped = session.unload();
                    debug!(bin = %self.kind, session = %id, dropped, "closed session over byte budget");
                } else {
                    *budget = budget.saturating_sub(session.total_open_length());
                }
            }
        }
        expired
    }
}

/// Case-insensitive topic filter. An empty or missing filter selects
/// untagged sessions.
pub(crate) fn topic_matches(topic: Option<&str>, filter: Option<&str>) -> bool {
    match (topic, filter.filter(|f| !f.is_empty())) {
        (_, None) => topic.is_none(),
        (None, Some(_)) => false,
        (Some(topic), Some(filter)) => topic.to_lowercase() == filter.to_lowercase(),
    }
}

fn collect_topics<'a>(topics: impl Iterator<Item = Option<&'a str>>) -> Vec<Option<String>> {
    let mut untagged = false;
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    for topic in topics {
        match topic {
            None => untagged = true,
            Some(topic) => {
                let _ = seen
                    .entry(topic.to_lowercase())
                    .or_insert_with(|| topic.to_owned());
            }
        }
    }
    let mut out = Vec::with_capacity(seen.len() + 1);
    if untagged {
        out.push(None);
    }
    out.extend(seen.into_values().map(Some));
    out
}

fn compare(order: SortOrder, a: &Session, b: &Session) -> Ordering {
    let primary = match order {
        SortOrder::CreationOldestFirst => a.id().cmp(&b.id()),
        SortOrder::CreationNewestFirst => b.id().cmp(&a.id()),
        SortOrder::UpdateOldestFirst => a.update_time().cmp(&b.update_time()),
        SortOrder::UpdateNewestFirst => b.update_time().cmp(&a.update_time()),
        SortOrder::AccessOldestFirst => a.access_time().cmp(&b.access_time()),
        SortOrder::AccessNewestFirst => b.access_time().cmp(&a.access_time()),
        SortOrder::Title => title_key(a).cmp(&title_key(b)),
    };
    primary.then_with(|| a.id().cmp(&b.id()))
}

fn title_key(session: &Session) -> Option<String> {
    session.title().map(str::to_lowercase)
}
