//! Dedup state for notification triggers.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TriggerKind;
use crate::session::SessionKey;

/// Identity of one trigger of one session.
pub type TriggerKey = (SessionKey, TriggerKind);

/// Lifecycle of a trigger. `Fired` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerState {
    Pending,
    Fired,
}

/// Read-only view of a fired trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub key: SessionKey,
    pub trigger: TriggerKind,
    pub fired_at: DateTime<Utc>,
}

/// Which (session, trigger) pairs have fired.
///
/// Entries are created lazily: anything not recorded is `Pending`.
#[derive(Debug, Clone, Default)]
pub struct TriggerLedger {
    fired: HashMap<TriggerKey, DateTime<Utc>>,
}

impl TriggerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, key: &SessionKey, trigger: TriggerKind) -> TriggerState {
        if self.fired.contains_key(&(key.clone(), trigger)) {
            TriggerState::Fired
        } else {
            TriggerState::Pending
        }
    }

    /// Record a firing. Returns `false` if the trigger had already fired, in
    /// which case the original timestamp is kept.
    pub fn mark_fired(&mut self, key: SessionKey, trigger: TriggerKind, at: DateTime<Utc>) -> bool {
        match self.fired.entry((key, trigger)) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(at);
                true
            }
        }
    }

    /// Drop entries for sessions not in `live`. Returns how many were removed.
    pub fn prune(&mut self, live: &HashSet<SessionKey>) -> usize {
        let before = self.fired.len();
        self.fired.retain(|(key, _), _| live.contains(key));
        before - self.fired.len()
    }

    pub fn len(&self) -> usize {
        self.fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }

    /// Fired triggers ordered by session and trigger.
    pub fn snapshot(&self) -> Vec<TriggerRecord> {
        let mut records: Vec<TriggerRecord> = self
            .fired
            .iter()
            .map(|((key, trigger), at)| TriggerRecord {
                key: key.clone(),
                trigger: *trigger,
                fired_at: *at,
            })
            .collect();
        records.sort_by(|a, b| (&a.key, a.trigger).cmp(&(&b.key, b.trigger)));
        records
    }
}
