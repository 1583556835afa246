//! Polling of the feed sources.
//!
//! A refresh fetches every configured source concurrently, gates each payload
//! through the [`ChangeDetector`], parses what changed and publishes all
//! replaced slices with a single swap of the tracked set.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::fingerprint::ChangeDetector;
use crate::session::{SharedSessions, SourceData};
use crate::source::{DataKind, Fetcher};

/// Result of one source in one refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    /// New data parsed and published.
    Updated { source: DataKind },
    /// Bytes identical to the last accepted payload.
    Unchanged { source: DataKind },
    /// Fetch, timeout or parse failure; the previous slice is kept.
    Failed { source: DataKind, error: String },
}

impl SourceOutcome {
    pub fn source(&self) -> DataKind {
        match self {
            SourceOutcome::Updated { source }
            | SourceOutcome::Unchanged { source }
            | SourceOutcome::Failed { source, .. } => *source,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SourceOutcome::Failed { .. })
    }
}

/// Summary of a refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// True iff at least one slice was replaced.
    pub did_update: bool,
    /// One entry per configured source, in source order.
    pub outcomes: Vec<SourceOutcome>,
}

impl RefreshReport {
    pub fn updated(&self) -> Vec<DataKind> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, SourceOutcome::Updated { .. }))
            .map(SourceOutcome::source)
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SourceOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }
}

/// Periodic and on-demand refresher of the tracked session set.
pub struct RefreshOrchestrator<F: Fetcher> {
    fetcher: Arc<F>,
    detector: ChangeDetector,
    sessions: SharedSessions,
    sources: Vec<DataKind>,
    timeout: Duration,
    cancel: CancellationToken,
    // Serializes cycles so two copy-then-swap publications cannot race.
    cycle: Mutex<()>,
}

impl<F: Fetcher> RefreshOrchestrator<F> {
    pub fn new(
        fetcher: F,
        detector: ChangeDetector,
        sessions: SharedSessions,
        sources: Vec<DataKind>,
        timeout: Duration,
    ) -> Self {
        let mut sources = sources;
        sources.sort();
        sources.dedup();
        Self {
            fetcher: Arc::new(fetcher),
            detector,
            sessions,
            sources,
            timeout,
            cancel: CancellationToken::new(),
            cycle: Mutex::new(()),
        }
    }

    /// Abort in-flight fetches when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn sessions(&self) -> &SharedSessions {
        &self.sessions
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub fn sources(&self) -> &[DataKind] {
        &self.sources
    }

    /// Run one refresh cycle.
    ///
    /// With `force`, payloads are parsed and published even when their
    /// fingerprint is unchanged. A source whose slice is missing from the
    /// tracked set is always parsed, since its fingerprint may predate this
    /// process.
    pub async fn refresh_all(&self, force: bool) -> RefreshReport {
        let _cycle = self.cycle.lock().await;
        let current = self.sessions.snapshot();

        let mut tasks = JoinSet::new();
        for &kind in &self.sources {
            let fetcher = Arc::clone(&self.fetcher);
            let timeout = self.timeout;
            tasks.spawn(async move {
                let result = match tokio::time::timeout(timeout, fetcher.fetch(kind)).await {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Timeout {
                        kind,
                        timeout_secs: timeout.as_secs(),
                    }),
                };
                (kind, result)
            });
        }

        let mut fetched: Vec<(DataKind, Result<Vec<u8>, FetchError>)> = Vec::with_capacity(self.sources.len());
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tasks.abort_all();
                    debug!("refresh cancelled, in-flight fetches aborted");
                    break;
                }
                joined = tasks.join_next() => match joined {
                    Some(Ok(entry)) => fetched.push(entry),
                    Some(Err(e)) => warn!("fetch task failed: {e}"),
                    None => break,
                },
            }
        }

        let mut outcomes = Vec::with_capacity(self.sources.len());
        let mut replaced: Vec<(DataKind, SourceData)> = Vec::new();

        for &kind in &self.sources {
            let Some(pos) = fetched.iter().position(|(k, _)| *k == kind) else {
                outcomes.push(SourceOutcome::Failed {
                    source: kind,
                    error: "fetch did not complete".to_string(),
                });
                continue;
            };
            let (_, result) = fetched.swap_remove(pos);

            let outcome = match result {
                Err(e) => {
                    warn!(source = %kind, "fetch failed: {e}");
                    SourceOutcome::Failed {
                        source: kind,
                        error: e.to_string(),
                    }
                }
                Ok(bytes) => {
                    let changed = self.detector.check_and_update(kind.source_key(), &bytes);
                    let missing = current.slice(kind).is_none();
                    if !changed && !force && !missing {
                        SourceOutcome::Unchanged { source: kind }
                    } else {
                        match kind.parse(&bytes) {
                            Ok(data) => {
                                replaced.push((kind, data));
                                SourceOutcome::Updated { source: kind }
                            }
                            Err(e) => {
                                warn!(source = %kind, "parse failed: {e}");
                                // Re-arm detection so the same bytes are retried next cycle.
                                self.detector.forget(kind.source_key());
                                SourceOutcome::Failed {
                                    source: kind,
                                    error: e.to_string(),
                                }
                            }
                        }
                    }
                }
            };
            outcomes.push(outcome);
        }

        let did_update = !replaced.is_empty();
        if did_update {
            let next = self.sessions.snapshot().with_slices(replaced, Utc::now());
            self.sessions.replace(next);
        }

        let failed = outcomes.iter().filter(|o| o.is_failure()).count();
        info!(did_update, failed, force, "refresh cycle finished");

        RefreshReport { did_update, outcomes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticFetcher;

    const SCHEDULE: &str = r#"{"MRData":{"RaceTable":{"season":"2025","Races":[
        {"season":"2025","round":"1","raceName":"Australian Grand Prix",
         "Circuit":{"circuitName":"Albert Park Grand Prix Circuit"},
         "date":"2099-03-16","time":"04:00:00Z"}]}}}"#;

    fn orchestrator(fetcher: StaticFetcher, sources: Vec<DataKind>) -> RefreshOrchestrator<StaticFetcher> {
        RefreshOrchestrator::new(
            fetcher,
            ChangeDetector::in_memory(),
            SharedSessions::default(),
            sources,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn unchanged_payload_is_not_republished() {
        let fetcher = StaticFetcher::new();
        fetcher.set(DataKind::Schedule, SCHEDULE);
        let orch = orchestrator(fetcher, vec![DataKind::Schedule]);

        let first = orch.refresh_all(false).await;
        assert!(first.did_update);
        let published = orch.sessions().snapshot();

        let second = orch.refresh_all(false).await;
        assert!(!second.did_update);
        assert_eq!(
            second.outcomes,
            vec![SourceOutcome::Unchanged {
                source: DataKind::Schedule
            }]
        );
        assert!(Arc::ptr_eq(&published, &orch.sessions().snapshot()));
    }

    #[tokio::test]
    async fn force_republishes_identical_bytes() {
        let fetcher = StaticFetcher::new();
        fetcher.set(DataKind::Schedule, SCHEDULE);
        let orch = orchestrator(fetcher, vec![DataKind::Schedule]);

        orch.refresh_all(false).await;
        let forced = orch.refresh_all(true).await;
        assert!(forced.did_update);
        assert_eq!(forced.updated(), vec![DataKind::Schedule]);
    }

    #[tokio::test]
    async fn missing_slice_is_parsed_despite_known_fingerprint() {
        let fetcher = StaticFetcher::new();
        fetcher.set(DataKind::Schedule, SCHEDULE);
        let detector = ChangeDetector::in_memory();
        assert!(detector.check_and_update(DataKind::Schedule.source_key(), SCHEDULE.as_bytes()));
        let orch = RefreshOrchestrator::new(
            fetcher,
            detector,
            SharedSessions::default(),
            vec![DataKind::Schedule],
            Duration::from_secs(5),
        );

        let report = orch.refresh_all(false).await;
        assert!(report.did_update);
        assert_eq!(orch.sessions().snapshot().events().len(), 1);
    }

    #[tokio::test]
    async fn parse_failure_is_retried() {
        let fetcher = StaticFetcher::new();
        fetcher.set(DataKind::Schedule, "not json");
        let orch = orchestrator(fetcher, vec![DataKind::Schedule]);

        let first = orch.refresh_all(false).await;
        assert!(!first.did_update);
        assert!(first.outcomes[0].is_failure());

        let second = orch.refresh_all(false).await;
        assert!(second.outcomes[0].is_failure());
    }

    #[tokio::test]
    async fn cancelled_refresh_reports_every_source() {
        let fetcher = StaticFetcher::new();
        fetcher.set(DataKind::Schedule, SCHEDULE);
        let token = CancellationToken::new();
        token.cancel();
        let orch = orchestrator(fetcher, vec![DataKind::Schedule, DataKind::DriverStandings])
            .with_cancellation(token);

        let report = orch.refresh_all(false).await;
        assert!(!report.did_update);
        assert_eq!(report.failures().count(), 2);
        assert!(orch.sessions().snapshot().is_empty());
    }
}
