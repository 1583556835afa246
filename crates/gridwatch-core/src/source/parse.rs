//! Parsers for Ergast-style `MRData` payloads.
//!
//! Parsing works on the exact fetched bytes; change detection has already
//! fingerprinted them by the time these run.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::{ResultTable, TableRow};
use crate::error::ParseError;
use crate::session::{RaceEvent, Session, SessionKind, SourceData};

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(rename = "MRData")]
    mr_data: T,
}

#[derive(Deserialize)]
struct RaceData {
    #[serde(rename = "RaceTable")]
    race_table: RaceTable,
}

#[derive(Deserialize)]
struct RaceTable {
    #[serde(rename = "Races", default)]
    races: Vec<RawRace>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRace {
    season: String,
    round: String,
    race_name: String,
    #[serde(rename = "Circuit")]
    circuit: Option<RawCircuit>,
    date: Option<String>,
    time: Option<String>,
    #[serde(rename = "FirstPractice")]
    first_practice: Option<RawSlot>,
    #[serde(rename = "SecondPractice")]
    second_practice: Option<RawSlot>,
    #[serde(rename = "ThirdPractice")]
    third_practice: Option<RawSlot>,
    #[serde(rename = "Qualifying")]
    qualifying: Option<RawSlot>,
    #[serde(rename = "Sprint")]
    sprint: Option<RawSlot>,
    #[serde(rename = "Results", default)]
    results: Vec<RawResult>,
    #[serde(rename = "SprintResults", default)]
    sprint_results: Vec<RawResult>,
    #[serde(rename = "QualifyingResults", default)]
    qualifying_results: Vec<RawQualifying>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCircuit {
    circuit_name: String,
}

#[derive(Deserialize)]
struct RawSlot {
    date: Option<String>,
    time: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDriver {
    given_name: String,
    family_name: String,
}

impl RawDriver {
    fn full_name(&self) -> String {
        format!("{} {}", self.given_name, self.family_name)
    }
}

#[derive(Deserialize)]
struct RawConstructor {
    name: String,
}

#[derive(Deserialize)]
struct RawTime {
    time: String,
}

#[derive(Deserialize)]
struct RawResult {
    position: Option<String>,
    points: Option<String>,
    status: Option<String>,
    #[serde(rename = "Driver")]
    driver: RawDriver,
    #[serde(rename = "Constructor")]
    constructor: RawConstructor,
    #[serde(rename = "Time")]
    time: Option<RawTime>,
}

#[derive(Deserialize)]
struct RawQualifying {
    position: Option<String>,
    #[serde(rename = "Driver")]
    driver: RawDriver,
    #[serde(rename = "Constructor")]
    constructor: RawConstructor,
    #[serde(rename = "Q1")]
    q1: Option<String>,
    #[serde(rename = "Q2")]
    q2: Option<String>,
    #[serde(rename = "Q3")]
    q3: Option<String>,
}

#[derive(Deserialize)]
struct StandingsData {
    #[serde(rename = "StandingsTable")]
    standings_table: StandingsTable,
}

#[derive(Deserialize)]
struct StandingsTable {
    #[serde(rename = "StandingsLists", default)]
    lists: Vec<StandingsList>,
}

#[derive(Deserialize)]
struct StandingsList {
    #[serde(rename = "DriverStandings", default)]
    drivers: Vec<RawDriverStanding>,
    #[serde(rename = "ConstructorStandings", default)]
    constructors: Vec<RawConstructorStanding>,
}

#[derive(Deserialize)]
struct RawDriverStanding {
    position: Option<String>,
    points: String,
    wins: String,
    #[serde(rename = "Driver")]
    driver: RawDriver,
    #[serde(rename = "Constructors", default)]
    constructors: Vec<RawConstructor>,
}

#[derive(Deserialize)]
struct RawConstructorStanding {
    position: Option<String>,
    points: String,
    wins: String,
    #[serde(rename = "Constructor")]
    constructor: RawConstructor,
}

/// Combine an Ergast `date` and `time` into a UTC instant.
///
/// Missing or malformed values yield `None`: the session is treated as not
/// scheduled rather than as an error.
fn session_start(date: Option<&str>, time: Option<&str>) -> Option<DateTime<Utc>> {
    let (date, time) = (date?, time?);
    let time = time.trim_end_matches('Z');
    match NaiveDateTime::parse_from_str(&format!("{date}T{time}"), "%Y-%m-%dT%H:%M:%S") {
        Ok(naive) => Some(naive.and_utc()),
        Err(e) => {
            debug!("ignoring unparseable session time {date} {time}: {e}");
            None
        }
    }
}

fn parse_position(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|p| p.parse().ok())
}

fn parse_points(raw: Option<&str>) -> Result<f64, ParseError> {
    match raw {
        None => Ok(0.0),
        Some(p) => p.parse().map_err(|_| ParseError::InvalidValue {
            field: "points",
            message: format!("'{p}' is not a number"),
        }),
    }
}

impl RawRace {
    fn into_event(self) -> Result<RaceEvent, ParseError> {
        let round: u32 = self.round.parse().map_err(|_| ParseError::InvalidValue {
            field: "round",
            message: format!("'{}' is not a round number", self.round),
        })?;
        let event_id = RaceEvent::event_id(&self.season, round);
        let slot_start =
            |slot: &Option<RawSlot>| slot.as_ref().and_then(|s| session_start(s.date.as_deref(), s.time.as_deref()));

        let starts = [
            (SessionKind::Practice1, slot_start(&self.first_practice)),
            (SessionKind::Practice2, slot_start(&self.second_practice)),
            (SessionKind::Practice3, slot_start(&self.third_practice)),
            (SessionKind::Sprint, slot_start(&self.sprint)),
            (SessionKind::Qualifying, slot_start(&self.qualifying)),
            (
                SessionKind::Race,
                session_start(self.date.as_deref(), self.time.as_deref()),
            ),
        ];

        let sessions = starts
            .into_iter()
            .map(|(kind, start)| Session::new(kind, start, event_id.clone(), self.race_name.clone()))
            .collect();

        Ok(RaceEvent {
            season: self.season,
            round,
            name: self.race_name,
            circuit: self.circuit.map(|c| c.circuit_name).unwrap_or_default(),
            sessions,
        })
    }
}

fn races(bytes: &[u8]) -> Result<Vec<RawRace>, ParseError> {
    let envelope: Envelope<RaceData> = serde_json::from_slice(bytes)?;
    Ok(envelope.mr_data.race_table.races)
}

fn first_race(bytes: &[u8]) -> Result<Option<RawRace>, ParseError> {
    Ok(races(bytes)?.into_iter().next())
}

/// Season schedule or next-event payload into weekends.
pub fn parse_schedule(bytes: &[u8]) -> Result<SourceData, ParseError> {
    let events = races(bytes)?
        .into_iter()
        .map(RawRace::into_event)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SourceData::Events(events))
}

fn results_table(title: String, results: Vec<RawResult>) -> Result<ResultTable, ParseError> {
    let rows = results
        .into_iter()
        .map(|r| -> Result<TableRow, ParseError> {
            Ok(TableRow {
                position: parse_position(r.position.as_deref()),
                name: r.driver.full_name(),
                team: r.constructor.name,
                points: parse_points(r.points.as_deref())?,
                detail: r
                    .time
                    .map(|t| t.time)
                    .or(r.status)
                    .unwrap_or_default(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ResultTable {
        title,
        detail_column: "Time/Status".into(),
        rows,
    })
}

/// Results of the most recent race.
pub fn parse_race_results(bytes: &[u8]) -> Result<SourceData, ParseError> {
    let table = match first_race(bytes)? {
        Some(race) => results_table(format!("{} - Race", race.race_name), race.results)?,
        None => empty_table("Race", "Time/Status"),
    };
    Ok(SourceData::Table(table))
}

/// Results of the most recent sprint.
pub fn parse_sprint_results(bytes: &[u8]) -> Result<SourceData, ParseError> {
    let table = match first_race(bytes)? {
        Some(race) => results_table(format!("{} - Sprint", race.race_name), race.sprint_results)?,
        None => empty_table("Sprint", "Time/Status"),
    };
    Ok(SourceData::Table(table))
}

/// Qualifying classification; detail is the best segment time reached.
pub fn parse_qualifying_results(bytes: &[u8]) -> Result<SourceData, ParseError> {
    let Some(race) = first_race(bytes)? else {
        return Ok(SourceData::Table(empty_table("Qualifying", "Best")));
    };
    let rows = race
        .qualifying_results
        .into_iter()
        .map(|q| TableRow {
            position: parse_position(q.position.as_deref()),
            name: q.driver.full_name(),
            team: q.constructor.name,
            points: 0.0,
            detail: q
                .q3
                .or(q.q2)
                .or(q.q1)
                .filter(|t| !t.is_empty())
                .unwrap_or_default(),
        })
        .collect();
    Ok(SourceData::Table(ResultTable {
        title: format!("{} - Qualifying", race.race_name),
        detail_column: "Best".into(),
        rows,
    }))
}

fn standings_list(bytes: &[u8]) -> Result<Option<StandingsList>, ParseError> {
    let envelope: Envelope<StandingsData> = serde_json::from_slice(bytes)?;
    Ok(envelope.mr_data.standings_table.lists.into_iter().next())
}

/// Drivers' championship standings.
pub fn parse_driver_standings(bytes: &[u8]) -> Result<SourceData, ParseError> {
    let drivers = standings_list(bytes)?.map(|l| l.drivers).unwrap_or_default();
    let rows = drivers
        .into_iter()
        .map(|d| -> Result<TableRow, ParseError> {
            Ok(TableRow {
                position: parse_position(d.position.as_deref()),
                name: d.driver.full_name(),
                team: d
                    .constructors
                    .last()
                    .map(|c| c.name.clone())
                    .unwrap_or_default(),
                points: parse_points(Some(d.points.as_str()))?,
                detail: d.wins,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SourceData::Table(ResultTable {
        title: "Drivers' Championship".into(),
        detail_column: "Wins".into(),
        rows,
    }))
}

/// Constructors' championship standings.
pub fn parse_constructor_standings(bytes: &[u8]) -> Result<SourceData, ParseError> {
    let constructors = standings_list(bytes)?
        .map(|l| l.constructors)
        .unwrap_or_default();
    let rows = constructors
        .into_iter()
        .map(|c| -> Result<TableRow, ParseError> {
            Ok(TableRow {
                position: parse_position(c.position.as_deref()),
                name: c.constructor.name.clone(),
                team: c.constructor.name,
                points: parse_points(Some(c.points.as_str()))?,
                detail: c.wins,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SourceData::Table(ResultTable {
        title: "Constructors' Championship".into(),
        detail_column: "Wins".into(),
        rows,
    }))
}

fn empty_table(title: &str, detail_column: &str) -> ResultTable {
    ResultTable {
        title: title.into(),
        detail_column: detail_column.into(),
        rows: Vec::new(),
    }
}
