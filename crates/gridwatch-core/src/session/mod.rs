//! Normalized race-weekend session model.
//!
//! A [`RaceEvent`] is one weekend as parsed from a single feed response.
//! Events are replaced wholesale on refresh; nothing here is mutated after
//! construction.

mod resolver;
mod tracked;

pub use resolver::{resolve_next, NextSession};
pub use tracked::{SharedSessions, SourceData, TrackedSessionSet};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The on-track activities a weekend can contain.
///
/// Declaration order is the tie-break priority used when two sessions share
/// a start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Practice1,
    Practice2,
    Practice3,
    Sprint,
    Qualifying,
    Race,
}

impl SessionKind {
    pub const ALL: [SessionKind; 6] = [
        SessionKind::Practice1,
        SessionKind::Practice2,
        SessionKind::Practice3,
        SessionKind::Sprint,
        SessionKind::Qualifying,
        SessionKind::Race,
    ];

    /// Human-readable label used in countdowns and notifications.
    pub fn label(self) -> &'static str {
        match self {
            SessionKind::Practice1 => "Practice 1",
            SessionKind::Practice2 => "Practice 2",
            SessionKind::Practice3 => "Practice 3",
            SessionKind::Sprint => "Sprint",
            SessionKind::Qualifying => "Qualifying",
            SessionKind::Race => "Race",
        }
    }

    pub fn is_practice(self) -> bool {
        matches!(
            self,
            SessionKind::Practice1 | SessionKind::Practice2 | SessionKind::Practice3
        )
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Stable identity of a session across refreshes.
///
/// Deliberately excludes the start time so a revised time does not create a
/// new identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub event_id: String,
    pub kind: SessionKind,
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:?}", self.event_id, self.kind)
    }
}

/// One session of one weekend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub kind: SessionKind,
    /// `None` when the session is not scheduled or the feed gave no time.
    pub start: Option<DateTime<Utc>>,
    pub event_id: String,
    pub event_label: String,
}

impl Session {
    pub fn new(
        kind: SessionKind,
        start: Option<DateTime<Utc>>,
        event_id: impl Into<String>,
        event_label: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            start,
            event_id: event_id.into(),
            event_label: event_label.into(),
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey {
            event_id: self.event_id.clone(),
            kind: self.kind,
        }
    }

    /// `"{event} - {kind}"`, e.g. `"Bahrain Grand Prix - Qualifying"`.
    pub fn label(&self) -> String {
        format!("{} - {}", self.event_label, self.kind.label())
    }
}

/// One race weekend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceEvent {
    pub season: String,
    pub round: u32,
    pub name: String,
    #[serde(default)]
    pub circuit: String,
    pub sessions: Vec<Session>,
}

impl RaceEvent {
    pub fn event_id(season: &str, round: u32) -> String {
        format!("{season}-{round}")
    }

    pub fn id(&self) -> String {
        Self::event_id(&self.season, self.round)
    }

    pub fn session(&self, kind: SessionKind) -> Option<&Session> {
        self.sessions.iter().find(|s| s.kind == kind)
    }

    /// Start time of `kind`, if the weekend has it scheduled.
    pub fn start_of(&self, kind: SessionKind) -> Option<DateTime<Utc>> {
        self.session(kind).and_then(|s| s.start)
    }

    /// Whether the weekend uses the sprint format.
    pub fn has_sprint(&self) -> bool {
        self.start_of(SessionKind::Sprint).is_some()
    }

    /// Sessions with a known start time, in chronological order.
    pub fn scheduled(&self) -> Vec<&Session> {
        let mut scheduled: Vec<&Session> = self.sessions.iter().filter(|s| s.start.is_some()).collect();
        scheduled.sort_by_key(|s| (s.start, s.kind));
        scheduled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn weekend() -> RaceEvent {
        let t = |d, h| Utc.with_ymd_and_hms(2025, 3, d, h, 0, 0).single();
        RaceEvent {
            season: "2025".into(),
            round: 1,
            name: "Australian Grand Prix".into(),
            circuit: "Albert Park".into(),
            sessions: vec![
                Session::new(SessionKind::Race, t(16, 4), "2025-1", "Australian Grand Prix"),
                Session::new(SessionKind::Practice1, t(14, 1), "2025-1", "Australian Grand Prix"),
                Session::new(SessionKind::Sprint, None, "2025-1", "Australian Grand Prix"),
                Session::new(SessionKind::Qualifying, t(15, 5), "2025-1", "Australian Grand Prix"),
            ],
        }
    }

    #[test]
    fn kind_order_matches_tie_break_priority() {
        let mut kinds = SessionKind::ALL.to_vec();
        kinds.reverse();
        kinds.sort();
        assert_eq!(kinds, SessionKind::ALL.to_vec());
        assert!(SessionKind::Sprint < SessionKind::Qualifying);
    }

    #[test]
    fn key_ignores_start_time() {
        let a = Session::new(SessionKind::Race, None, "2025-1", "GP");
        let b = Session::new(
            SessionKind::Race,
            Utc.with_ymd_and_hms(2025, 3, 16, 4, 0, 0).single(),
            "2025-1",
            "GP",
        );
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn lookup_helpers() {
        let event = weekend();
        assert_eq!(event.id(), "2025-1");
        assert!(!event.has_sprint());
        assert!(event.start_of(SessionKind::Practice3).is_none());
        let order: Vec<SessionKind> = event.scheduled().iter().map(|s| s.kind).collect();
        assert_eq!(
            order,
            vec![SessionKind::Practice1, SessionKind::Qualifying, SessionKind::Race]
        );
    }

    #[test]
    fn label_joins_event_and_kind() {
        let s = Session::new(SessionKind::Qualifying, None, "2025-1", "Australian Grand Prix");
        assert_eq!(s.label(), "Australian Grand Prix - Qualifying");
    }
}
