#![allow(dead_code)]

use chrono::{DateTime, Utc};
use gridwatch_core::{DataKind, RaceEvent, Session, SessionKind, TrackedSessionSet};

/// A weekend with a race at `race` and qualifying a day earlier.
pub fn weekend(round: u32, name: &str, race: DateTime<Utc>) -> RaceEvent {
    let id = RaceEvent::event_id("2025", round);
    RaceEvent {
        season: "2025".into(),
        round,
        name: name.into(),
        circuit: String::new(),
        sessions: vec![
            Session::new(SessionKind::Qualifying, Some(race - chrono::Duration::days(1)), id.clone(), name),
            Session::new(SessionKind::Race, Some(race), id, name),
        ],
    }
}

pub fn schedule_set(events: Vec<RaceEvent>) -> TrackedSessionSet {
    TrackedSessionSet::from_events(DataKind::Schedule, events)
}

/// Ergast schedule payload with one race per `(round, name, start)`.
pub fn schedule_json(races: &[(u32, &str, DateTime<Utc>)]) -> String {
    let races: Vec<String> = races
        .iter()
        .map(|(round, name, start)| {
            format!(
                r#"{{"season":"2025","round":"{round}","raceName":"{name}","date":"{}","time":"{}"}}"#,
                start.format("%Y-%m-%d"),
                start.format("%H:%M:%SZ"),
            )
        })
        .collect();
    format!(
        r#"{{"MRData":{{"RaceTable":{{"season":"2025","Races":[{}]}}}}}}"#,
        races.join(",")
    )
}

pub fn driver_standings_json(leader: &str, points: u32) -> String {
    format!(
        r#"{{"MRData":{{"StandingsTable":{{"StandingsLists":[{{"DriverStandings":[
            {{"position":"1","points":"{points}","wins":"2",
              "Driver":{{"givenName":"{leader}","familyName":"Driver"}},
              "Constructors":[{{"name":"Team"}}]}}]}}]}}}}}}"#
    )
}
