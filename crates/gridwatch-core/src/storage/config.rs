//! TOML-based application configuration.
//!
//! Stores:
//! - Feed location and which sources to poll
//! - Refresh, countdown and notification cadences
//! - Per-class notification preferences
//!
//! Configuration is stored at `<data dir>/config.toml`.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::notify::{OverlapPolicy, PreferenceClass};
use crate::source::DataKind;

/// Unit for the "notify before" lead time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Minutes,
    Hours,
}

impl TimeUnit {
    pub fn seconds(self) -> i64 {
        match self {
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 3600,
        }
    }

    /// Unit name agreeing with `amount`, e.g. "1 hour", "10 minutes".
    pub fn name(self, amount: u32) -> &'static str {
        match (self, amount) {
            (TimeUnit::Minutes, 1) => "minute",
            (TimeUnit::Minutes, _) => "minutes",
            (TimeUnit::Hours, 1) => "hour",
            (TimeUnit::Hours, _) => "hours",
        }
    }
}

/// Notification settings for one preference class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassPreferences {
    #[serde(default = "default_true")]
    pub notify_before: bool,
    #[serde(default = "default_before_amount")]
    pub before_amount: u32,
    #[serde(default = "default_before_unit")]
    pub before_unit: TimeUnit,
    #[serde(default = "default_true")]
    pub notify_on_start: bool,
    #[serde(default)]
    pub sound_before: bool,
    #[serde(default)]
    pub sound_on_start: bool,
}

impl ClassPreferences {
    /// How long before the start the "before" notification is due.
    pub fn before_lead(&self) -> Duration {
        Duration::seconds(i64::from(self.before_amount) * self.before_unit.seconds())
    }

    /// `"{amount} {unit}"`, e.g. `"10 minutes"`.
    pub fn lead_text(&self) -> String {
        format!("{} {}", self.before_amount, self.before_unit.name(self.before_amount))
    }
}

/// Preferences for every class, as read by the notification scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub practice: ClassPreferences,
    pub qualifying: ClassPreferences,
    pub race: ClassPreferences,
    /// Dedicated sprint settings; sprints follow `race` when unset.
    pub sprint: Option<ClassPreferences>,
}

impl NotificationPreferences {
    pub fn for_class(&self, class: PreferenceClass) -> &ClassPreferences {
        match class {
            PreferenceClass::Practice => &self.practice,
            PreferenceClass::Qualifying => &self.qualifying,
            PreferenceClass::Race => &self.race,
            PreferenceClass::Sprint => self.sprint.as_ref().unwrap_or(&self.race),
        }
    }

    pub fn has_sprint_class(&self) -> bool {
        self.sprint.is_some()
    }
}

/// Feed location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Season path segment, `"current"` or a year.
    #[serde(default = "default_season")]
    pub season: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_sources")]
    pub sources: Vec<DataKind>,
}

/// Refresh cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_refresh_interval")]
    pub interval_secs: u64,
    /// Play the refresh sound when new data arrived.
    #[serde(default)]
    pub sound_on_update: bool,
}

/// Countdown cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountdownConfig {
    #[serde(default = "default_countdown_tick")]
    pub tick_secs: u64,
    /// Re-check interval while no session is upcoming.
    #[serde(default = "default_countdown_idle")]
    pub idle_secs: u64,
}

/// Notification cadence, policy and per-class preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_notify_tick")]
    pub tick_secs: u64,
    /// Catch window after a start; must cover at least one tick.
    #[serde(default = "default_start_window")]
    pub start_window_secs: u64,
    #[serde(default)]
    pub overlap_policy: OverlapPolicy,
    #[serde(default)]
    pub practice: ClassPreferences,
    #[serde(default)]
    pub qualifying: ClassPreferences,
    #[serde(default)]
    pub race: ClassPreferences,
    #[serde(default)]
    pub sprint: Option<ClassPreferences>,
}

impl NotificationsConfig {
    pub fn preferences(&self) -> NotificationPreferences {
        NotificationPreferences {
            practice: self.practice.clone(),
            qualifying: self.qualifying.clone(),
            race: self.race.clone(),
            sprint: self.sprint.clone(),
        }
    }
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data dir>/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub countdown: CountdownConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

// Default functions
fn default_true() -> bool {
    true
}
fn default_before_amount() -> u32 {
    10
}
fn default_before_unit() -> TimeUnit {
    TimeUnit::Minutes
}
fn default_base_url() -> String {
    "https://api.jolpi.ca/ergast/f1".into()
}
fn default_season() -> String {
    "current".into()
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_sources() -> Vec<DataKind> {
    DataKind::ALL.to_vec()
}
fn default_refresh_interval() -> u64 {
    3600
}
fn default_countdown_tick() -> u64 {
    1
}
fn default_countdown_idle() -> u64 {
    10
}
fn default_notify_tick() -> u64 {
    5
}
fn default_start_window() -> u64 {
    60
}

impl Default for ClassPreferences {
    fn default() -> Self {
        Self {
            notify_before: true,
            before_amount: default_before_amount(),
            before_unit: default_before_unit(),
            notify_on_start: true,
            sound_before: false,
            sound_on_start: false,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            season: default_season(),
            timeout_secs: default_timeout_secs(),
            sources: default_sources(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_refresh_interval(),
            sound_on_update: false,
        }
    }
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_countdown_tick(),
            idle_secs: default_countdown_idle(),
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_secs: default_notify_tick(),
            start_window_secs: default_start_window(),
            overlap_policy: OverlapPolicy::default(),
            practice: ClassPreferences::default(),
            qualifying: ClassPreferences::default(),
            race: ClassPreferences::default(),
            sprint: None,
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().map_or(true, |p| p.is_empty()) {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        let n = value
                            .parse::<u64>()
                            .map_err(|_| invalid(format!("cannot parse '{value}' as number")))?;
                        serde_json::Value::Number(n.into())
                    }
                    serde_json::Value::Object(_)
                    | serde_json::Value::Array(_)
                    | serde_json::Value::Null => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    serde_json::Value::String(_) => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default config location.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults there if the file is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key; the result is validated before it is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the resulting config is invalid. `self` is unchanged on error.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |e: serde_json::Error| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        };
        let mut json = serde_json::to_value(&*self).map_err(invalid)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(invalid)?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        url::Url::parse(&self.feed.base_url)
            .map_err(|e| invalid("feed.base_url", &e.to_string()))?;
        if self.feed.timeout_secs == 0 {
            return Err(invalid("feed.timeout_secs", "must be greater than zero"));
        }
        if self.refresh.interval_secs == 0 {
            return Err(invalid("refresh.interval_secs", "must be greater than zero"));
        }
        if self.countdown.tick_secs == 0 || self.countdown.idle_secs == 0 {
            return Err(invalid("countdown", "intervals must be greater than zero"));
        }
        let n = &self.notifications;
        if n.tick_secs == 0 {
            return Err(invalid("notifications.tick_secs", "must be greater than zero"));
        }
        if n.start_window_secs < n.tick_secs {
            return Err(invalid(
                "notifications.start_window_secs",
                "must be at least notifications.tick_secs or session starts can be missed",
            ));
        }
        let classes = [
            ("notifications.practice", Some(&n.practice)),
            ("notifications.qualifying", Some(&n.qualifying)),
            ("notifications.race", Some(&n.race)),
            ("notifications.sprint", n.sprint.as_ref()),
        ];
        for (key, prefs) in classes {
            if let Some(p) = prefs {
                if p.notify_before && p.before_amount == 0 {
                    return Err(invalid(key, "before_amount must be greater than zero"));
                }
            }
        }
        Ok(())
    }
}
