//! Next-session resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Session, SessionKey};

/// The session a countdown should target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextSession {
    pub key: SessionKey,
    pub start: DateTime<Utc>,
    pub label: String,
}

/// Earliest session starting strictly after `now`.
///
/// Sessions without a start time are skipped. Equal start times are broken by
/// [`SessionKind`](super::SessionKind) order, so the result is deterministic
/// regardless of input order. Returns `None` when nothing is upcoming.
pub fn resolve_next<'a, I>(now: DateTime<Utc>, sessions: I) -> Option<NextSession>
where
    I: IntoIterator<Item = &'a Session>,
{
    sessions
        .into_iter()
        .filter_map(|s| s.start.filter(|start| *start > now).map(|start| (start, s)))
        .min_by(|(a_start, a), (b_start, b)| {
            a_start
                .cmp(b_start)
                .then(a.kind.cmp(&b.kind))
                .then_with(|| a.event_id.cmp(&b.event_id))
        })
        .map(|(start, s)| NextSession {
            key: s.key(),
            start,
            label: s.label(),
        })
}
