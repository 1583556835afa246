//! Feed sources.
//!
//! Every kind of data the dashboard consumes is a [`DataKind`]. The mapping
//! from a kind to its endpoint and parser is an explicit table
//! ([`DataKind::spec`]); nothing is inferred from a callable's identity.

mod fetch;
mod parse;

pub use fetch::{Fetcher, HttpFetcher, StaticFetcher};
pub use parse::{
    parse_constructor_standings, parse_driver_standings, parse_qualifying_results,
    parse_race_results, parse_schedule, parse_sprint_results,
};

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FetchError, ParseError};
use crate::session::SourceData;

/// Data kinds served by the results API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Schedule,
    NextEvent,
    RaceResults,
    QualifyingResults,
    SprintResults,
    DriverStandings,
    ConstructorStandings,
}

/// Parser turning raw fetched bytes into a tracked-set slice.
pub type Parser = fn(&[u8]) -> Result<SourceData, ParseError>;

/// Endpoint template and parser for one [`DataKind`].
#[derive(Clone, Copy)]
pub struct SourceSpec {
    /// Path relative to the API base; `{season}` is substituted.
    pub endpoint: &'static str,
    pub parser: Parser,
}

impl fmt::Debug for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSpec")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl DataKind {
    pub const ALL: [DataKind; 7] = [
        DataKind::Schedule,
        DataKind::NextEvent,
        DataKind::RaceResults,
        DataKind::QualifyingResults,
        DataKind::SprintResults,
        DataKind::DriverStandings,
        DataKind::ConstructorStandings,
    ];

    pub fn spec(self) -> SourceSpec {
        match self {
            DataKind::Schedule => SourceSpec {
                endpoint: "{season}.json",
                parser: parse_schedule,
            },
            DataKind::NextEvent => SourceSpec {
                endpoint: "{season}/next.json",
                parser: parse_schedule,
            },
            DataKind::RaceResults => SourceSpec {
                endpoint: "{season}/last/results.json",
                parser: parse_race_results,
            },
            DataKind::QualifyingResults => SourceSpec {
                endpoint: "{season}/last/qualifying.json",
                parser: parse_qualifying_results,
            },
            DataKind::SprintResults => SourceSpec {
                endpoint: "{season}/last/sprint.json",
                parser: parse_sprint_results,
            },
            DataKind::DriverStandings => SourceSpec {
                endpoint: "{season}/driverStandings.json",
                parser: parse_driver_standings,
            },
            DataKind::ConstructorStandings => SourceSpec {
                endpoint: "{season}/constructorStandings.json",
                parser: parse_constructor_standings,
            },
        }
    }

    /// Fingerprint key; stable across releases.
    pub fn source_key(self) -> &'static str {
        match self {
            DataKind::Schedule => "schedule",
            DataKind::NextEvent => "next_event",
            DataKind::RaceResults => "race_results",
            DataKind::QualifyingResults => "qualifying_results",
            DataKind::SprintResults => "sprint_results",
            DataKind::DriverStandings => "driver_standings",
            DataKind::ConstructorStandings => "constructor_standings",
        }
    }

    /// Absolute endpoint URL for `season` under `base`.
    pub fn url(self, base: &str, season: &str) -> Result<Url, FetchError> {
        let path = self.spec().endpoint.replace("{season}", season);
        let base = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{base}/")
        };
        Url::parse(&base)
            .and_then(|b| b.join(&path))
            .map_err(|e| FetchError::InvalidUrl {
                kind: self,
                message: e.to_string(),
            })
    }

    pub fn parse(self, bytes: &[u8]) -> Result<SourceData, ParseError> {
        (self.spec().parser)(bytes)
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.source_key())
    }
}

/// One row of a results or standings table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    /// `None` for unclassified entries.
    pub position: Option<u32>,
    pub name: String,
    pub team: String,
    pub points: f64,
    /// Kind-specific column: race time/status, best lap, or wins.
    pub detail: String,
}

/// Display data for a results or standings tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub title: String,
    pub detail_column: String,
    pub rows: Vec<TableRow>,
}
