//! The three periodic activities and their wiring.
//!
//! [`Runtime::spawn`] starts the countdown, notification and refresh loops on
//! the current tokio runtime. Each loop exits when the cancellation token is
//! cancelled; [`RuntimeHandle::shutdown`] cancels and waits for them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::countdown::{Countdown, CountdownPublisher};
use crate::events::Event;
use crate::notify::{
    deliver, NotificationScheduler, Notifier, PreferenceSource, SoundCue, SoundPlayer, TriggerRecord,
};
use crate::refresh::{RefreshOrchestrator, RefreshReport, SourceOutcome};
use crate::session::SharedSessions;
use crate::source::Fetcher;
use crate::storage::Config;

const EVENT_CAPACITY: usize = 64;
const REQUEST_CAPACITY: usize = 8;

/// On-demand refresh, e.g. from a "refresh now" button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefreshRequest {
    pub force: bool,
}

/// Cadences of the three loops.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub countdown_tick: Duration,
    pub countdown_idle: Duration,
    pub notify_tick: Duration,
    pub notifications_enabled: bool,
    pub refresh_interval: Duration,
    pub sound_on_update: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RuntimeSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            countdown_tick: Duration::from_secs(config.countdown.tick_secs),
            countdown_idle: Duration::from_secs(config.countdown.idle_secs),
            notify_tick: Duration::from_secs(config.notifications.tick_secs),
            notifications_enabled: config.notifications.enabled,
            refresh_interval: Duration::from_secs(config.refresh.interval_secs),
            sound_on_update: config.refresh.sound_on_update,
        }
    }
}

/// Everything the loops need, assembled before spawning.
pub struct Runtime<F: Fetcher> {
    orchestrator: RefreshOrchestrator<F>,
    scheduler: NotificationScheduler,
    preferences: Arc<dyn PreferenceSource>,
    notifier: Arc<dyn Notifier>,
    sound: Arc<dyn SoundPlayer>,
    settings: RuntimeSettings,
}

impl<F: Fetcher> Runtime<F> {
    pub fn new(
        orchestrator: RefreshOrchestrator<F>,
        scheduler: NotificationScheduler,
        preferences: Arc<dyn PreferenceSource>,
        notifier: Arc<dyn Notifier>,
        sound: Arc<dyn SoundPlayer>,
    ) -> Self {
        Self {
            orchestrator,
            scheduler,
            preferences,
            notifier,
            sound,
            settings: RuntimeSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Start all loops. They stop when `token` is cancelled.
    pub fn spawn(self, token: CancellationToken) -> RuntimeHandle {
        let Runtime {
            orchestrator,
            scheduler,
            preferences,
            notifier,
            sound,
            settings,
        } = self;

        let sessions = orchestrator.sessions().clone();
        let orchestrator = orchestrator.with_cancellation(token.child_token());
        let scheduler = Arc::new(scheduler);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (refresh_tx, refresh_rx) = mpsc::channel(REQUEST_CAPACITY);

        let publisher = CountdownPublisher::new(
            sessions.clone(),
            settings.countdown_tick,
            settings.countdown_idle,
        );
        let countdown = publisher.subscribe();

        let mut tasks = JoinSet::new();
        tasks.spawn(publisher.run(token.clone()));

        if settings.notifications_enabled {
            tasks.spawn(notify_loop(NotifyLoop {
                sessions: sessions.clone(),
                scheduler: Arc::clone(&scheduler),
                preferences,
                notifier,
                sound: Arc::clone(&sound),
                events: events.clone(),
                tick: settings.notify_tick,
                token: token.clone(),
            }));
        } else {
            info!("notifications disabled");
        }

        tasks.spawn(refresh_loop(RefreshLoop {
            orchestrator,
            requests: refresh_rx,
            sound,
            events: events.clone(),
            interval: settings.refresh_interval,
            sound_on_update: settings.sound_on_update,
            token: token.clone(),
        }));

        info!("runtime started");
        RuntimeHandle {
            token,
            tasks,
            countdown,
            events,
            refresh_tx,
            sessions,
            scheduler,
        }
    }
}

/// Handle to a running engine.
pub struct RuntimeHandle {
    token: CancellationToken,
    tasks: JoinSet<()>,
    countdown: watch::Receiver<Countdown>,
    events: broadcast::Sender<Event>,
    refresh_tx: mpsc::Sender<RefreshRequest>,
    sessions: SharedSessions,
    scheduler: Arc<NotificationScheduler>,
}

impl RuntimeHandle {
    pub fn countdown(&self) -> watch::Receiver<Countdown> {
        self.countdown.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn sessions(&self) -> &SharedSessions {
        &self.sessions
    }

    /// Fired notification triggers.
    pub fn triggers(&self) -> Vec<TriggerRecord> {
        self.scheduler.snapshot()
    }

    /// Queue an out-of-schedule refresh. Returns `false` once the refresh
    /// loop has stopped.
    pub async fn request_refresh(&self, force: bool) -> bool {
        self.refresh_tx.send(RefreshRequest { force }).await.is_ok()
    }

    /// Cancel every loop and wait for them to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                warn!("runtime task ended abnormally: {e}");
            }
        }
        info!("runtime stopped");
    }
}

struct NotifyLoop {
    sessions: SharedSessions,
    scheduler: Arc<NotificationScheduler>,
    preferences: Arc<dyn PreferenceSource>,
    notifier: Arc<dyn Notifier>,
    sound: Arc<dyn SoundPlayer>,
    events: broadcast::Sender<Event>,
    tick: Duration,
    token: CancellationToken,
}

async fn notify_loop(ctx: NotifyLoop) {
    let mut interval = tokio::time::interval(ctx.tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut seen_refresh = None;

    loop {
        tokio::select! {
            biased;
            _ = ctx.token.cancelled() => break,
            _ = interval.tick() => {}
        }

        let set = ctx.sessions.snapshot();
        if set.refreshed_at() != seen_refresh {
            seen_refresh = set.refreshed_at();
            if !set.is_empty() {
                ctx.scheduler.prune(&set.session_keys());
            }
        }

        let now = Utc::now();
        let fired = ctx.scheduler.evaluate(now, &set, &ctx.preferences.current());
        if fired.is_empty() {
            continue;
        }

        deliver(&fired, ctx.notifier.as_ref(), ctx.sound.as_ref());
        for notification in fired {
            // No subscribers is fine.
            let _ = ctx.events.send(Event::NotificationFired {
                session: notification.key,
                trigger: notification.trigger,
                title: notification.title,
                body: notification.body,
                at: now,
            });
        }
    }
    debug!("notification loop stopped");
}

struct RefreshLoop<F: Fetcher> {
    orchestrator: RefreshOrchestrator<F>,
    requests: mpsc::Receiver<RefreshRequest>,
    sound: Arc<dyn SoundPlayer>,
    events: broadcast::Sender<Event>,
    interval: Duration,
    sound_on_update: bool,
    token: CancellationToken,
}

async fn refresh_loop<F: Fetcher>(mut ctx: RefreshLoop<F>) {
    // The first tick completes immediately, so data is loaded at startup.
    let mut interval = tokio::time::interval(ctx.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let force = tokio::select! {
            biased;
            _ = ctx.token.cancelled() => break,
            Some(request) = ctx.requests.recv() => request.force,
            _ = interval.tick() => false,
        };

        let report = ctx.orchestrator.refresh_all(force).await;
        if ctx.token.is_cancelled() {
            break;
        }
        publish_report(&ctx, &report);
    }
    debug!("refresh loop stopped");
}

fn publish_report<F: Fetcher>(ctx: &RefreshLoop<F>, report: &RefreshReport) {
    let at = Utc::now();
    for outcome in report.failures() {
        if let SourceOutcome::Failed { source, error } = outcome {
            let _ = ctx.events.send(Event::SourceFailed {
                source: *source,
                message: error.clone(),
                at,
            });
        }
    }

    let _ = ctx.events.send(Event::DataRefreshed {
        updated: report.did_update,
        sources: report.updated(),
        at,
    });

    if report.did_update && ctx.sound_on_update {
        if let Err(e) = ctx.sound.play(SoundCue::DataRefreshed) {
            warn!("refresh sound failed: {e}");
        }
    }
}
