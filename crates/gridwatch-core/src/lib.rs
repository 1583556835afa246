//! # Gridwatch Core Library
//!
//! This library provides the session timing and notification engine behind
//! the Gridwatch motorsport dashboard. Every operation is available through
//! the standalone `gridwatch` CLI; a desktop front end would be a thin layer
//! over the same core.
//!
//! ## Architecture
//!
//! - **Session model**: race weekends and their sessions, plus the resolver
//!   picking the next upcoming one
//! - **Countdown**: republishes the remaining time on a fixed cadence
//! - **Notifications**: a per-(session, trigger) state machine that fires each
//!   reminder at most once
//! - **Refresh**: concurrent polling of the feed, gated by content fingerprints
//! - **Storage**: TOML configuration and a SQLite key-value store
//!
//! ## Key Components
//!
//! - [`NotificationScheduler`]: trigger state machine
//! - [`RefreshOrchestrator`]: fetch, change detection and atomic publication
//! - [`ChangeDetector`]: SHA-256 fingerprint gate
//! - [`Runtime`]: spawns the periodic loops
//! - [`Config`]: application configuration management

pub mod countdown;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod notify;
pub mod refresh;
pub mod runtime;
pub mod session;
pub mod source;
pub mod storage;

pub use countdown::{format_remaining, Countdown, CountdownPublisher, NO_UPCOMING};
pub use error::{ConfigError, CoreError, FetchError, NotifyError, ParseError, StoreError};
pub use events::Event;
pub use fingerprint::{ChangeDetector, Fingerprint, FingerprintStore, MemoryFingerprintStore, SqliteFingerprintStore};
pub use notify::{
    Notification, NotificationScheduler, Notifier, OverlapPolicy, PreferenceClass, PreferenceSource, SoundCue,
    SoundPlayer, TriggerKind,
};
pub use refresh::{RefreshOrchestrator, RefreshReport, SourceOutcome};
pub use runtime::{RefreshRequest, Runtime, RuntimeHandle, RuntimeSettings};
pub use session::{resolve_next, NextSession, RaceEvent, Session, SessionKey, SessionKind, SharedSessions, TrackedSessionSet};
pub use source::{DataKind, Fetcher, HttpFetcher, ResultTable, StaticFetcher, TableRow};
pub use storage::{Config, Database, NotificationPreferences};
