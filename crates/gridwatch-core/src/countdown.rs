//! Live countdown to the next session.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::session::{resolve_next, NextSession, SharedSessions, TrackedSessionSet};
use crate::storage::CountdownConfig;

/// Text published when nothing is upcoming.
pub const NO_UPCOMING: &str = "No upcoming sessions";

/// Format a remaining duration as `"1w 2d 3h 4m 5s"`.
///
/// Leading zero units are dropped, inner zeros are kept and seconds are
/// always present. Negative durations render as `"0s"`.
pub fn format_remaining(remaining: Duration) -> String {
    let total = remaining.num_seconds().max(0);
    let units = [
        (total / 604_800, "w"),
        (total % 604_800 / 86_400, "d"),
        (total % 86_400 / 3_600, "h"),
        (total % 3_600 / 60, "m"),
    ];

    let mut out = String::new();
    for (value, suffix) in units.iter().skip_while(|(value, _)| *value == 0) {
        out.push_str(&format!("{value}{suffix} "));
    }
    out.push_str(&format!("{}s", total % 60));
    out
}

/// One published countdown value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    pub target: Option<NextSession>,
    pub text: String,
}

impl Countdown {
    /// The sentinel value.
    pub fn idle() -> Self {
        Self {
            target: None,
            text: NO_UPCOMING.to_string(),
        }
    }

    /// Resolve the next session in `set` and render its countdown.
    pub fn compute(now: DateTime<Utc>, set: &TrackedSessionSet) -> Self {
        match resolve_next(now, set.sessions()) {
            Some(next) => {
                let text = format!("{} in {}", next.label, format_remaining(next.start - now));
                Self {
                    target: Some(next),
                    text,
                }
            }
            None => Self::idle(),
        }
    }

    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Self::idle()
    }
}

/// Republishes the countdown on a fixed cadence.
///
/// Subscribers read the latest value from a `watch` channel; slow readers
/// simply skip intermediate values.
#[derive(Debug)]
pub struct CountdownPublisher {
    sessions: SharedSessions,
    tx: watch::Sender<Countdown>,
    tick: StdDuration,
    idle: StdDuration,
}

impl CountdownPublisher {
    pub fn new(sessions: SharedSessions, tick: StdDuration, idle: StdDuration) -> Self {
        let (tx, _) = watch::channel(Countdown::idle());
        Self {
            sessions,
            tx,
            tick,
            idle,
        }
    }

    pub fn from_config(sessions: SharedSessions, config: &CountdownConfig) -> Self {
        Self::new(
            sessions,
            StdDuration::from_secs(config.tick_secs),
            StdDuration::from_secs(config.idle_secs),
        )
    }

    pub fn subscribe(&self) -> watch::Receiver<Countdown> {
        self.tx.subscribe()
    }

    /// Compute and publish one value.
    pub fn publish(&self, now: DateTime<Utc>) -> Countdown {
        let countdown = Countdown::compute(now, &self.sessions.snapshot());
        self.tx.send_replace(countdown.clone());
        countdown
    }

    /// Publish until `token` is cancelled.
    pub async fn run(self, token: CancellationToken) {
        loop {
            let countdown = self.publish(Utc::now());
            let wait = if countdown.has_target() {
                self.tick
            } else {
                debug!("no upcoming session, idling for {:?}", self.idle);
                self.idle
            };

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        debug!("countdown publisher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_suppresses_leading_zeros_only() {
        assert_eq!(format_remaining(Duration::seconds(0)), "0s");
        assert_eq!(format_remaining(Duration::seconds(59)), "59s");
        assert_eq!(format_remaining(Duration::seconds(65)), "1m 5s");
        assert_eq!(format_remaining(Duration::seconds(3_600)), "1h 0m 0s");
        assert_eq!(format_remaining(Duration::seconds(86_405)), "1d 0h 0m 5s");
        assert_eq!(
            format_remaining(Duration::seconds(604_800 + 2 * 86_400 + 3 * 3_600 + 4 * 60 + 5)),
            "1w 2d 3h 4m 5s"
        );
        assert_eq!(format_remaining(Duration::weeks(3)), "3w 0d 0h 0m 0s");
    }

    #[test]
    fn format_clamps_negative() {
        assert_eq!(format_remaining(Duration::seconds(-30)), "0s");
    }

    #[test]
    fn empty_set_yields_sentinel() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let countdown = Countdown::compute(now, &TrackedSessionSet::new());
        assert_eq!(countdown.target, None);
        assert_eq!(countdown.text, NO_UPCOMING);
    }
}
