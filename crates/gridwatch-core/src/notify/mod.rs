//! Session notifications.
//!
//! [`NotificationScheduler`] is the state machine deciding when a reminder is
//! due; [`Notifier`] and [`SoundPlayer`] are the platform collaborators that
//! deliver it.

mod ledger;
mod scheduler;

pub use ledger::{TriggerKey, TriggerLedger, TriggerRecord, TriggerState};
pub use scheduler::{deliver, NotificationScheduler};

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::NotifyError;
use crate::session::{SessionKey, SessionKind};
use crate::storage::{Config, NotificationPreferences};

/// Which preference settings govern a session kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferenceClass {
    Practice,
    Qualifying,
    Sprint,
    Race,
}

impl PreferenceClass {
    /// Class for `kind`. Sprints use their own class only when the
    /// preferences define one; otherwise they follow the race settings.
    pub fn of(kind: SessionKind, prefs: &NotificationPreferences) -> Self {
        match kind {
            SessionKind::Practice1 | SessionKind::Practice2 | SessionKind::Practice3 => {
                PreferenceClass::Practice
            }
            SessionKind::Qualifying => PreferenceClass::Qualifying,
            SessionKind::Sprint if prefs.has_sprint_class() => PreferenceClass::Sprint,
            SessionKind::Sprint | SessionKind::Race => PreferenceClass::Race,
        }
    }

    /// Representative session kind, used for synthetic test sessions.
    pub fn sample_kind(self) -> SessionKind {
        match self {
            PreferenceClass::Practice => SessionKind::Practice1,
            PreferenceClass::Qualifying => SessionKind::Qualifying,
            PreferenceClass::Sprint => SessionKind::Sprint,
            PreferenceClass::Race => SessionKind::Race,
        }
    }
}

impl std::str::FromStr for PreferenceClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "practice" => Ok(PreferenceClass::Practice),
            "qualifying" => Ok(PreferenceClass::Qualifying),
            "sprint" => Ok(PreferenceClass::Sprint),
            "race" => Ok(PreferenceClass::Race),
            other => Err(format!("unknown preference class: {other}")),
        }
    }
}

/// The two reminder conditions evaluated per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Before,
    AtStart,
}

/// How the before-start trigger interacts with the at-start trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// A pass that fires Before for a session skips its AtStart check; AtStart
    /// may still fire on a later pass while its window is open.
    #[default]
    OnePerTick,
    /// Once Before has fired for a session, AtStart never fires for it.
    BeforeSupersedesStart,
    /// Both triggers are evaluated on every pass.
    Independent,
}

/// Outward notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub key: SessionKey,
    pub trigger: TriggerKind,
    pub title: String,
    pub body: String,
    /// Whether the platform sound should accompany it.
    pub sound: bool,
}

/// Sounds the engine may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundCue {
    BeforeStart,
    SessionStart,
    DataRefreshed,
}

/// Delivers notifications to the user (toast, console, ...).
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Plays platform sounds.
pub trait SoundPlayer: Send + Sync {
    fn play(&self, cue: SoundCue) -> Result<(), NotifyError>;
}

/// Sound player for environments without audio.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl SoundPlayer for Silent {
    fn play(&self, _cue: SoundCue) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Source of the current notification preferences.
///
/// Called once per scheduler pass; implementations must return the latest
/// value rather than a copy cached at startup.
pub trait PreferenceSource: Send + Sync {
    fn current(&self) -> NotificationPreferences;
}

impl PreferenceSource for NotificationPreferences {
    fn current(&self) -> NotificationPreferences {
        self.clone()
    }
}

/// In-process preferences that a settings UI edits while the engine runs.
#[derive(Debug, Clone, Default)]
pub struct SharedPreferences {
    inner: Arc<RwLock<NotificationPreferences>>,
}

impl SharedPreferences {
    pub fn new(prefs: NotificationPreferences) -> Self {
        Self {
            inner: Arc::new(RwLock::new(prefs)),
        }
    }

    pub fn update(&self, prefs: NotificationPreferences) {
        match self.inner.write() {
            Ok(mut guard) => *guard = prefs,
            Err(poisoned) => *poisoned.into_inner() = prefs,
        }
    }
}

impl PreferenceSource for SharedPreferences {
    fn current(&self) -> NotificationPreferences {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Re-reads the preferences from the config file on every call, so edits made
/// by another process take effect on the next pass.
#[derive(Debug, Clone)]
pub struct ConfigFilePreferences {
    path: PathBuf,
}

impl ConfigFilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PreferenceSource for ConfigFilePreferences {
    fn current(&self) -> NotificationPreferences {
        match std::fs::read_to_string(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|content| toml::from_str::<Config>(&content).map_err(|e| e.to_string()))
        {
            Ok(cfg) => cfg.notifications.preferences(),
            Err(e) => {
                warn!(path = %self.path.display(), "using default notification preferences: {e}");
                NotificationPreferences::default()
            }
        }
    }
}
