use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::notify::TriggerKind;
use crate::session::SessionKey;
use crate::source::DataKind;

/// Every observable state change in the engine produces an Event.
/// UI surfaces subscribe to them through the runtime's broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A refresh cycle finished. `updated` is false when no source changed.
    DataRefreshed {
        updated: bool,
        sources: Vec<DataKind>,
        at: DateTime<Utc>,
    },
    /// One source failed during a refresh; its previous data is kept.
    SourceFailed {
        source: DataKind,
        message: String,
        at: DateTime<Utc>,
    },
    NotificationFired {
        session: SessionKey,
        trigger: TriggerKind,
        title: String,
        body: String,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Event::DataRefreshed { at, .. }
            | Event::SourceFailed { at, .. }
            | Event::NotificationFired { at, .. } => *at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionKind;

    #[test]
    fn serializes_with_type_tag() {
        let event = Event::NotificationFired {
            session: SessionKey {
                event_id: "2025-3".into(),
                kind: SessionKind::Qualifying,
            },
            trigger: TriggerKind::Before,
            title: "Japanese Grand Prix - Qualifying".into(),
            body: "Starting in 10 minutes".into(),
            at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "NotificationFired");
        assert_eq!(json["trigger"], "before");
        assert_eq!(json["session"]["kind"], "qualifying");

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
