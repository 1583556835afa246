//! Raw byte fetching for feed sources.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use super::DataKind;
use crate::error::FetchError;

/// Fetches the raw payload for a data kind.
///
/// Implementations return the exact bytes served; no re-serialization, so
/// fingerprints stay stable for identical content.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, kind: DataKind) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

impl<F: Fetcher> Fetcher for Arc<F> {
    fn fetch(&self, kind: DataKind) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send {
        F::fetch(self, kind)
    }
}

/// HTTP fetcher for an Ergast-compatible API.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    base_url: String,
    season: String,
    timeout: Duration,
}

impl HttpFetcher {
    /// Build a fetcher. The timeout bounds each request end to end.
    pub fn new(
        base_url: impl Into<String>,
        season: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gridwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            season: season.into(),
            timeout,
        })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, kind: DataKind) -> Result<Vec<u8>, FetchError> {
        let url = kind.url(&self.base_url, &self.season)?;
        debug!(%url, "fetching {kind}");

        let resp = self.client.get(url).send().await.map_err(|source| {
            if source.is_timeout() {
                FetchError::Timeout {
                    kind,
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                FetchError::Http { kind, source }
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                kind,
                status: status.as_u16(),
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|source| FetchError::Http { kind, source })?;
        Ok(bytes.to_vec())
    }
}

/// In-memory fetcher serving canned payloads.
///
/// Used for offline runs and tests; kinds without a payload fail with
/// [`FetchError::Unavailable`].
#[derive(Debug, Default)]
pub struct StaticFetcher {
    payloads: Mutex<HashMap<DataKind, Option<Vec<u8>>>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` for `kind` from now on.
    pub fn set(&self, kind: DataKind, bytes: impl Into<Vec<u8>>) {
        if let Ok(mut payloads) = self.payloads.lock() {
            payloads.insert(kind, Some(bytes.into()));
        }
    }

    /// Make `kind` fail from now on.
    pub fn fail(&self, kind: DataKind) {
        if let Ok(mut payloads) = self.payloads.lock() {
            payloads.insert(kind, None);
        }
    }
}

impl Fetcher for StaticFetcher {
    async fn fetch(&self, kind: DataKind) -> Result<Vec<u8>, FetchError> {
        let payload = self
            .payloads
            .lock()
            .ok()
            .and_then(|payloads| payloads.get(&kind).cloned().flatten());
        payload.ok_or(FetchError::Unavailable(kind))
    }
}
