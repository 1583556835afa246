pub mod config;
pub mod next;
pub mod refresh;
pub mod watch;

mod console;

use std::sync::Arc;
use std::time::Duration;

use gridwatch_core::{
    ChangeDetector, Config, Database, HttpFetcher, RefreshOrchestrator, SharedSessions, SqliteFingerprintStore,
};

pub use console::{Bell, ConsoleNotifier};

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Load the config and reject invalid files before any work starts.
pub fn load_config() -> CliResult<Config> {
    let config = Config::load()?;
    config.validate()?;
    Ok(config)
}

/// Orchestrator over the configured feed, with fingerprints in the data dir.
pub fn orchestrator(config: &Config) -> CliResult<RefreshOrchestrator<HttpFetcher>> {
    let timeout = Duration::from_secs(config.feed.timeout_secs);
    let fetcher = HttpFetcher::new(&config.feed.base_url, &config.feed.season, timeout)?;
    let db = Database::open()?;
    let detector = ChangeDetector::new(Arc::new(SqliteFingerprintStore::new(db)));
    Ok(RefreshOrchestrator::new(
        fetcher,
        detector,
        SharedSessions::default(),
        config.feed.sources.clone(),
        timeout,
    ))
}

/// Current-thread runtime for one-shot async commands.
pub fn block_on<F: std::future::Future>(future: F) -> CliResult<F::Output> {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    Ok(rt.block_on(future))
}
