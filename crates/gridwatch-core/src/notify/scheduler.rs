//! Trigger evaluation.
//!
//! The scheduler is tick-driven: the caller invokes [`NotificationScheduler::evaluate`]
//! periodically with the current time, the latest session snapshot and
//! freshly loaded preferences, and delivers whatever comes back.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::{
    Notification, Notifier, OverlapPolicy, PreferenceClass, SoundCue, SoundPlayer, TriggerKind,
    TriggerLedger, TriggerRecord, TriggerState,
};
use crate::session::{Session, SessionKey, TrackedSessionSet};
use crate::storage::{ClassPreferences, NotificationPreferences, NotificationsConfig};

/// Event id used for the synthetic sessions of the test path.
const TEST_EVENT_ID: &str = "test";

/// Per-(session, trigger) state machine firing each trigger at most once.
#[derive(Debug)]
pub struct NotificationScheduler {
    ledger: Mutex<TriggerLedger>,
    start_window: Duration,
    policy: OverlapPolicy,
}

impl NotificationScheduler {
    pub fn new(start_window: Duration, policy: OverlapPolicy) -> Self {
        Self {
            ledger: Mutex::new(TriggerLedger::new()),
            start_window,
            policy,
        }
    }

    pub fn from_config(config: &NotificationsConfig) -> Self {
        let window = i64::try_from(config.start_window_secs)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1000);
        Self::new(Duration::seconds(window), config.overlap_policy)
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }

    pub fn start_window(&self) -> Duration {
        self.start_window
    }

    fn ledger(&self) -> MutexGuard<'_, TriggerLedger> {
        // Every mutation is a single insert or retain, so a poisoned ledger
        // is still consistent.
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self, key: &SessionKey, trigger: TriggerKind) -> TriggerState {
        self.ledger().state(key, trigger)
    }

    /// Fired triggers, for diagnostics surfaces.
    pub fn snapshot(&self) -> Vec<TriggerRecord> {
        self.ledger().snapshot()
    }

    /// Forget triggers of sessions no longer in `live`.
    pub fn prune(&self, live: &HashSet<SessionKey>) -> usize {
        let removed = self.ledger().prune(live);
        if removed > 0 {
            debug!(removed, "pruned trigger ledger");
        }
        removed
    }

    /// One scheduler pass over every session with a start time.
    ///
    /// Returned notifications are already recorded as fired; delivering them
    /// is the caller's job.
    pub fn evaluate(
        &self,
        now: DateTime<Utc>,
        set: &TrackedSessionSet,
        prefs: &NotificationPreferences,
    ) -> Vec<Notification> {
        let mut ledger = self.ledger();
        let mut out = Vec::new();

        for session in set.sessions() {
            let Some(start) = session.start else {
                continue;
            };
            let class = PreferenceClass::of(session.kind, prefs);
            let settings = prefs.for_class(class);
            let key = session.key();

            let before_pending = ledger.state(&key, TriggerKind::Before) == TriggerState::Pending;
            let mut before_fired_now = false;
            if settings.notify_before && before_pending && before_due(now, start, settings) {
                ledger.mark_fired(key.clone(), TriggerKind::Before, now);
                info!(session = %key, class = ?class, "before-start notification fired");
                out.push(before_notification(session, settings));
                before_fired_now = true;
            }

            let check_start = match self.policy {
                OverlapPolicy::OnePerTick => !before_fired_now,
                OverlapPolicy::BeforeSupersedesStart => {
                    ledger.state(&key, TriggerKind::Before) == TriggerState::Pending
                }
                OverlapPolicy::Independent => true,
            };
            if !check_start {
                debug!(session = %key, policy = ?self.policy, "at-start check skipped");
                continue;
            }

            if settings.notify_on_start
                && ledger.state(&key, TriggerKind::AtStart) == TriggerState::Pending
                && start_due(now, start, self.start_window)
            {
                ledger.mark_fired(key.clone(), TriggerKind::AtStart, now);
                info!(session = %key, class = ?class, "session-start notification fired");
                out.push(start_notification(session, settings));
            }
        }

        out
    }

    /// Evaluate the trigger conditions for a synthetic session of `class`
    /// starting at `start`, without reading or writing the ledger.
    ///
    /// Repeated calls keep producing notifications.
    pub fn evaluate_at(
        &self,
        now: DateTime<Utc>,
        start: DateTime<Utc>,
        class: PreferenceClass,
        prefs: &NotificationPreferences,
    ) -> Vec<Notification> {
        let settings = prefs.for_class(class);
        let session = Session::new(class.sample_kind(), Some(start), TEST_EVENT_ID, "Test Grand Prix");
        let mut out = Vec::new();

        let mut before_fired_now = false;
        if settings.notify_before && before_due(now, start, settings) {
            out.push(before_notification(&session, settings));
            before_fired_now = true;
        }
        let check_start = match self.policy {
            OverlapPolicy::OnePerTick | OverlapPolicy::BeforeSupersedesStart => !before_fired_now,
            OverlapPolicy::Independent => true,
        };
        if check_start && settings.notify_on_start && start_due(now, start, self.start_window) {
            out.push(start_notification(&session, settings));
        }
        out
    }

    /// Manual test of a preference class.
    ///
    /// Produces the before-start notification for a session exactly one lead
    /// time away and the at-start notification for a session starting now,
    /// each subject to the class's enabled flags.
    pub fn evaluate_test(
        &self,
        now: DateTime<Utc>,
        class: PreferenceClass,
        prefs: &NotificationPreferences,
    ) -> Vec<Notification> {
        let settings = prefs.for_class(class);
        let lead_start = now
            .checked_add_signed(settings.before_lead())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut out = self.evaluate_at(now, lead_start, class, prefs);
        out.extend(
            self.evaluate_at(now, now, class, prefs)
                .into_iter()
                .filter(|n| n.trigger == TriggerKind::AtStart),
        );
        out
    }
}

fn before_due(now: DateTime<Utc>, start: DateTime<Utc>, settings: &ClassPreferences) -> bool {
    let target = start
        .checked_sub_signed(settings.before_lead())
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    target <= now && now < start
}

fn start_due(now: DateTime<Utc>, start: DateTime<Utc>, window: Duration) -> bool {
    let end = start.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC);
    start <= now && now < end
}

fn before_notification(session: &Session, settings: &ClassPreferences) -> Notification {
    Notification {
        key: session.key(),
        trigger: TriggerKind::Before,
        title: session.label(),
        body: format!("Starting in {}", settings.lead_text()),
        sound: settings.sound_before,
    }
}

fn start_notification(session: &Session, settings: &ClassPreferences) -> Notification {
    Notification {
        key: session.key(),
        trigger: TriggerKind::AtStart,
        title: session.label(),
        body: format!("{} is starting now", session.kind.label()),
        sound: settings.sound_on_start,
    }
}

/// Hand notifications to the platform collaborators.
///
/// Failures are logged and skipped; they never affect trigger state.
pub fn deliver(notifications: &[Notification], notifier: &dyn Notifier, sound: &dyn SoundPlayer) {
    for notification in notifications {
        if let Err(e) = notifier.notify(notification) {
            warn!(session = %notification.key, "notification delivery failed: {e}");
        }
        if notification.sound {
            let cue = match notification.trigger {
                TriggerKind::Before => SoundCue::BeforeStart,
                TriggerKind::AtStart => SoundCue::SessionStart,
            };
            if let Err(e) = sound.play(cue) {
                warn!(session = %notification.key, "sound playback failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyError;
    use crate::session::{RaceEvent, SessionKind};
    use crate::source::DataKind;
    use crate::storage::TimeUnit;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 16, 4, 0, 0).unwrap()
    }

    fn set_with(kind: SessionKind, start: Option<DateTime<Utc>>) -> TrackedSessionSet {
        let event = RaceEvent {
            season: "2025".into(),
            round: 1,
            name: "Australian Grand Prix".into(),
            circuit: "Albert Park".into(),
            sessions: vec![Session::new(kind, start, "2025-1", "Australian Grand Prix")],
        };
        TrackedSessionSet::from_events(DataKind::Schedule, vec![event])
    }

    fn scheduler(policy: OverlapPolicy) -> NotificationScheduler {
        NotificationScheduler::new(Duration::seconds(60), policy)
    }

    #[test]
    fn before_fires_once_inside_lead() {
        let s = scheduler(OverlapPolicy::OnePerTick);
        let set = set_with(SessionKind::Race, Some(t0()));
        let prefs = NotificationPreferences::default();

        assert!(s.evaluate(t0() - Duration::minutes(11), &set, &prefs).is_empty());

        let fired = s.evaluate(t0() - Duration::minutes(9), &set, &prefs);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].trigger, TriggerKind::Before);
        assert_eq!(fired[0].title, "Australian Grand Prix - Race");
        assert_eq!(fired[0].body, "Starting in 10 minutes");

        let again = s.evaluate(t0() - Duration::minutes(9) + Duration::seconds(5), &set, &prefs);
        assert!(again.is_empty());
    }

    #[test]
    fn at_start_window_is_half_open() {
        let s = scheduler(OverlapPolicy::Independent);
        let set = set_with(SessionKind::Qualifying, Some(t0()));
        let mut prefs = NotificationPreferences::default();
        prefs.qualifying.notify_before = false;

        assert!(s.evaluate(t0() - Duration::seconds(1), &set, &prefs).is_empty());
        let fired = s.evaluate(t0(), &set, &prefs);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].body, "Qualifying is starting now");

        let late = scheduler(OverlapPolicy::Independent);
        assert!(late.evaluate(t0() + Duration::seconds(60), &set, &prefs).is_empty());
    }

    #[test]
    fn absent_start_is_ignored() {
        let s = scheduler(OverlapPolicy::Independent);
        let set = set_with(SessionKind::Sprint, None);
        assert!(s.evaluate(t0(), &set, &NotificationPreferences::default()).is_empty());
        assert!(s.snapshot().is_empty());
    }

    #[test]
    fn one_per_tick_defers_start_to_next_pass() {
        let s = scheduler(OverlapPolicy::OnePerTick);
        let set = set_with(SessionKind::Race, Some(t0()));
        let prefs = NotificationPreferences::default();

        // Before never fired; at T+5s both windows are considered but Before is
        // already past (now >= start), so AtStart fires.
        let fired = s.evaluate(t0() + Duration::seconds(5), &set, &prefs);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].trigger, TriggerKind::AtStart);
    }

    #[test]
    fn hours_unit_and_sound_flags() {
        let s = scheduler(OverlapPolicy::OnePerTick);
        let set = set_with(SessionKind::Practice2, Some(t0()));
        let mut prefs = NotificationPreferences::default();
        prefs.practice.before_amount = 1;
        prefs.practice.before_unit = TimeUnit::Hours;
        prefs.practice.sound_before = true;

        let fired = s.evaluate(t0() - Duration::minutes(59), &set, &prefs);
        assert_eq!(fired[0].body, "Starting in 1 hour");
        assert!(fired[0].sound);
    }

    #[test]
    fn sprint_follows_race_class_unless_configured() {
        let set = set_with(SessionKind::Sprint, Some(t0()));
        let mut prefs = NotificationPreferences::default();
        prefs.race.notify_before = false;

        let s = scheduler(OverlapPolicy::OnePerTick);
        assert!(s.evaluate(t0() - Duration::minutes(5), &set, &prefs).is_empty());

        prefs.sprint = Some(ClassPreferences::default());
        let s = scheduler(OverlapPolicy::OnePerTick);
        assert_eq!(s.evaluate(t0() - Duration::minutes(5), &set, &prefs).len(), 1);
    }

    #[test]
    fn test_path_does_not_touch_ledger() {
        let s = scheduler(OverlapPolicy::OnePerTick);
        let prefs = NotificationPreferences::default();

        for _ in 0..3 {
            let fired = s.evaluate_test(t0(), PreferenceClass::Race, &prefs);
            let triggers: Vec<_> = fired.iter().map(|n| n.trigger).collect();
            assert_eq!(triggers, vec![TriggerKind::Before, TriggerKind::AtStart]);
        }
        assert!(s.snapshot().is_empty());
    }

    #[test]
    fn test_path_respects_disabled_triggers() {
        let s = scheduler(OverlapPolicy::OnePerTick);
        let mut prefs = NotificationPreferences::default();
        prefs.practice.notify_on_start = false;

        let fired = s.evaluate_test(t0(), PreferenceClass::Practice, &prefs);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].trigger, TriggerKind::Before);
    }

    struct Failing;

    impl Notifier for Failing {
        fn notify(&self, _: &Notification) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("no display".into()))
        }
    }

    impl SoundPlayer for Failing {
        fn play(&self, _: SoundCue) -> Result<(), NotifyError> {
            Err(NotifyError::Sound("no audio device".into()))
        }
    }

    #[test]
    fn delivery_failures_do_not_unfire() {
        let s = scheduler(OverlapPolicy::OnePerTick);
        let set = set_with(SessionKind::Race, Some(t0()));
        let mut prefs = NotificationPreferences::default();
        prefs.race.sound_before = true;

        let fired = s.evaluate(t0() - Duration::minutes(1), &set, &prefs);
        deliver(&fired, &Failing, &Failing);

        let key = fired[0].key.clone();
        assert_eq!(s.state(&key, TriggerKind::Before), TriggerState::Fired);
        assert!(s.evaluate(t0() - Duration::seconds(30), &set, &prefs).is_empty());
    }
}
