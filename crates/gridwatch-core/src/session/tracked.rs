//! The shared, atomically replaced collection of parsed feed data.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use super::{RaceEvent, Session, SessionKey};
use crate::source::{DataKind, ResultTable};

/// Parsed contribution of one feed source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceData {
    Events(Vec<RaceEvent>),
    Table(ResultTable),
}

/// Immutable snapshot of everything the feed currently knows.
///
/// Each [`DataKind`] owns one slice. Writers build a new set with
/// [`with_slices`](Self::with_slices) and publish it through
/// [`SharedSessions::replace`]; a published set is never edited.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackedSessionSet {
    slices: BTreeMap<DataKind, SourceData>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl TrackedSessionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for a single events slice.
    pub fn from_events(kind: DataKind, events: Vec<RaceEvent>) -> Self {
        let mut slices = BTreeMap::new();
        slices.insert(kind, SourceData::Events(events));
        Self {
            slices,
            refreshed_at: None,
        }
    }

    /// Copy of `self` with the given slices replaced.
    pub fn with_slices<I>(&self, replaced: I, at: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = (DataKind, SourceData)>,
    {
        let mut slices = self.slices.clone();
        slices.extend(replaced);
        Self {
            slices,
            refreshed_at: Some(at),
        }
    }

    pub fn slice(&self, kind: DataKind) -> Option<&SourceData> {
        self.slices.get(&kind)
    }

    pub fn table(&self, kind: DataKind) -> Option<&ResultTable> {
        match self.slices.get(&kind)? {
            SourceData::Table(table) => Some(table),
            SourceData::Events(_) => None,
        }
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Events of every event slice, next-event slice first.
    ///
    /// The next-event feed covers a single weekend and is the one that
    /// carries late timetable revisions, so it takes precedence over the
    /// season schedule for that weekend.
    fn all_events(&self) -> impl Iterator<Item = &RaceEvent> {
        let next = self.slices.get(&DataKind::NextEvent);
        let rest = self
            .slices
            .iter()
            .filter(|(kind, _)| **kind != DataKind::NextEvent)
            .map(|(_, data)| data);
        next.into_iter()
            .chain(rest)
            .filter_map(|data| match data {
                SourceData::Events(events) => Some(events.iter()),
                SourceData::Table(_) => None,
            })
            .flatten()
    }

    /// All events across event slices, duplicates by id removed.
    pub fn events(&self) -> Vec<&RaceEvent> {
        let mut seen = HashSet::new();
        self.all_events().filter(|event| seen.insert(event.id())).collect()
    }

    /// Every known session, deduplicated by [`SessionKey`].
    pub fn sessions(&self) -> Vec<&Session> {
        let mut seen: HashSet<SessionKey> = HashSet::new();
        self.all_events()
            .flat_map(|event| event.sessions.iter())
            .filter(|session| seen.insert(session.key()))
            .collect()
    }

    pub fn session_keys(&self) -> HashSet<SessionKey> {
        self.sessions().into_iter().map(Session::key).collect()
    }
}

/// Shared handle through which the refresher publishes and readers snapshot.
///
/// Replacement is a single pointer swap under the lock; readers clone the
/// `Arc` and never observe a half-built set.
#[derive(Debug, Clone, Default)]
pub struct SharedSessions {
    inner: Arc<RwLock<Arc<TrackedSessionSet>>>,
}

impl SharedSessions {
    pub fn new(initial: TrackedSessionSet) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(initial))),
        }
    }

    pub fn snapshot(&self) -> Arc<TrackedSessionSet> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn replace(&self, set: TrackedSessionSet) {
        let next = Arc::new(set);
        match self.inner.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}
