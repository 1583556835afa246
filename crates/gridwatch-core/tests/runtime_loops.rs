mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use gridwatch_core::error::NotifyError;
use gridwatch_core::notify::Silent;
use gridwatch_core::{
    resolve_next, ChangeDetector, Countdown, CountdownPublisher, DataKind, Event, Notification,
    NotificationPreferences, NotificationScheduler, Notifier, OverlapPolicy, RefreshOrchestrator,
    Runtime, RuntimeSettings, SharedSessions, StaticFetcher, TrackedSessionSet, TriggerKind,
    NO_UPCOMING,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use common::{schedule_json, schedule_set, weekend};

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<Notification>>,
}

impl Notifier for Recorder {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.seen.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Wait for the next `DataRefreshed` event, returning `(updated, sources)`.
async fn next_refresh(events: &mut broadcast::Receiver<Event>) -> (bool, Vec<DataKind>) {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(60), events.recv())
            .await
            .expect("refresh within a minute")
            .unwrap();
        if let Event::DataRefreshed { updated, sources, .. } = event {
            return (updated, sources);
        }
    }
}

fn quiet_runtime(orchestrator: RefreshOrchestrator<Arc<StaticFetcher>>) -> Runtime<Arc<StaticFetcher>> {
    Runtime::new(
        orchestrator,
        NotificationScheduler::new(chrono::Duration::seconds(60), OverlapPolicy::default()),
        Arc::new(NotificationPreferences::default()),
        Arc::new(Recorder::default()),
        Arc::new(Silent),
    )
}

#[test]
fn empty_set_resolves_to_sentinel() {
    let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    assert_eq!(resolve_next(now, TrackedSessionSet::new().sessions()), None);
    assert_eq!(Countdown::compute(now, &TrackedSessionSet::new()).text, NO_UPCOMING);
}

#[tokio::test(start_paused = true)]
async fn countdown_idles_until_sessions_appear() {
    let sessions = SharedSessions::default();
    let publisher = CountdownPublisher::new(sessions.clone(), Duration::from_secs(1), Duration::from_secs(10));
    let rx = publisher.subscribe();
    let token = CancellationToken::new();
    let task = tokio::spawn(publisher.run(token.clone()));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(rx.borrow().text, NO_UPCOMING);

    let race = Utc::now() + chrono::Duration::days(2) + chrono::Duration::hours(1);
    sessions.replace(schedule_set(vec![weekend(10, "Canadian Grand Prix", race)]));

    // Still inside the idle wait.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(rx.borrow().target.is_none());

    tokio::time::sleep(Duration::from_secs(6)).await;
    let current = rx.borrow().clone();
    let target = current.target.expect("target after idle wait");
    assert_eq!(target.label, "Canadian Grand Prix - Qualifying");
    assert!(current.text.starts_with("Canadian Grand Prix - Qualifying in 1d "));

    token.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn runtime_refreshes_and_notifies() {
    let race = Utc::now() + chrono::Duration::minutes(5);
    let fetcher = StaticFetcher::new();
    fetcher.set(DataKind::Schedule, schedule_json(&[(11, "Austrian Grand Prix", race)]));

    let orchestrator = RefreshOrchestrator::new(
        fetcher,
        ChangeDetector::in_memory(),
        SharedSessions::default(),
        vec![DataKind::Schedule],
        Duration::from_secs(5),
    );
    let recorder = Arc::new(Recorder::default());
    let runtime = Runtime::new(
        orchestrator,
        NotificationScheduler::new(chrono::Duration::seconds(60), OverlapPolicy::OnePerTick),
        Arc::new(NotificationPreferences::default()),
        recorder.clone(),
        Arc::new(Silent),
    )
    .with_settings(RuntimeSettings {
        notify_tick: Duration::from_secs(5),
        ..RuntimeSettings::default()
    });

    let handle = runtime.spawn(CancellationToken::new());
    let mut events = handle.subscribe();

    let mut refreshed = false;
    let mut fired = None;
    while fired.is_none() {
        let event = tokio::time::timeout(Duration::from_secs(60), events.recv())
            .await
            .expect("event within a minute")
            .unwrap();
        match event {
            Event::DataRefreshed { updated, sources, .. } => {
                assert!(updated);
                assert_eq!(sources, vec![DataKind::Schedule]);
                refreshed = true;
            }
            Event::NotificationFired { trigger, body, .. } => fired = Some((trigger, body)),
            Event::SourceFailed { source, message, .. } => panic!("{source} failed: {message}"),
        }
    }

    assert!(refreshed);
    assert_eq!(fired, Some((TriggerKind::Before, "Starting in 10 minutes".to_string())));
    assert_eq!(recorder.seen.lock().unwrap().len(), 1);
    assert_eq!(handle.triggers().len(), 1);

    assert!(handle.request_refresh(false).await);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_all_loops() {
    let orchestrator = RefreshOrchestrator::new(
        StaticFetcher::new(),
        ChangeDetector::in_memory(),
        SharedSessions::default(),
        vec![DataKind::Schedule],
        Duration::from_secs(5),
    );
    let runtime = Runtime::new(
        orchestrator,
        NotificationScheduler::new(chrono::Duration::seconds(60), OverlapPolicy::default()),
        Arc::new(NotificationPreferences::default()),
        Arc::new(Recorder::default()),
        Arc::new(Silent),
    );

    let token = CancellationToken::new();
    let handle = runtime.spawn(token.clone());
    tokio::time::sleep(Duration::from_secs(1)).await;

    tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .expect("loops exit promptly");
    assert!(token.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn requested_refresh_publishes_new_data() {
    let race = Utc::now() + chrono::Duration::days(3);
    let fetcher = Arc::new(StaticFetcher::new());
    fetcher.set(DataKind::Schedule, schedule_json(&[(11, "Austrian Grand Prix", race)]));

    let orchestrator = RefreshOrchestrator::new(
        fetcher.clone(),
        ChangeDetector::in_memory(),
        SharedSessions::default(),
        vec![DataKind::Schedule],
        Duration::from_secs(5),
    );
    let handle = quiet_runtime(orchestrator).spawn(CancellationToken::new());
    let mut events = handle.subscribe();
    assert_eq!(next_refresh(&mut events).await, (true, vec![DataKind::Schedule]));

    fetcher.set(
        DataKind::Schedule,
        schedule_json(&[(11, "Austrian Grand Prix", race), (12, "British Grand Prix", race + chrono::Duration::days(7))]),
    );
    assert!(handle.request_refresh(false).await);

    // Well before the hourly tick.
    assert_eq!(next_refresh(&mut events).await, (true, vec![DataKind::Schedule]));
    let names: Vec<String> = handle
        .sessions()
        .snapshot()
        .events()
        .into_iter()
        .map(|event| event.name.clone())
        .collect();
    assert_eq!(names, vec!["Austrian Grand Prix", "British Grand Prix"]);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn recovers_when_feed_returns_with_known_fingerprint() {
    let race = Utc::now() + chrono::Duration::days(3);
    let payload = schedule_json(&[(11, "Austrian Grand Prix", race)]);

    // A previous run already accepted this payload.
    let detector = ChangeDetector::in_memory();
    assert!(detector.check_and_update(DataKind::Schedule.source_key(), payload.as_bytes()));

    let fetcher = Arc::new(StaticFetcher::new());
    fetcher.fail(DataKind::Schedule);
    let orchestrator = RefreshOrchestrator::new(
        fetcher.clone(),
        detector,
        SharedSessions::default(),
        vec![DataKind::Schedule],
        Duration::from_secs(5),
    );
    let handle = quiet_runtime(orchestrator).spawn(CancellationToken::new());
    let mut events = handle.subscribe();
    assert_eq!(next_refresh(&mut events).await, (false, Vec::new()));
    assert!(handle.sessions().snapshot().is_empty());

    fetcher.set(DataKind::Schedule, payload);
    assert!(handle.request_refresh(false).await);
    assert_eq!(next_refresh(&mut events).await, (true, vec![DataKind::Schedule]));

    let snapshot = handle.sessions().snapshot();
    let next = resolve_next(Utc::now(), snapshot.sessions()).expect("session after recovery");
    assert_eq!(next.label, "Austrian Grand Prix - Race");

    handle.shutdown().await;
}
