use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ProcmineError, Result};

const NAIVE_TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Timestamp as it appears in an upstream export: text or Unix epoch seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Epoch(f64),
    Text(String),
}

/// An event record exactly as exported by the upstream system, before validation.
///
/// Fields the analyses do not use (organizational unit, lifecycle, free-form
/// metadata) are accepted in exports and ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEvent {
    pub event_id: Option<String>,
    pub process_id: Option<String>,
    pub system_id: Option<String>,
    pub case_id: Option<String>,
    pub activity: Option<String>,
    pub timestamp: Option<RawTimestamp>,
    pub user_id: Option<String>,
    pub duration_seconds: Option<f64>,
}

/// A validated occurrence of an activity within a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Option<String>,
    pub process_id: Option<String>,
    pub system_id: Option<String>,
    pub case_id: String,
    pub activity: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub duration_seconds: Option<f64>,
}

impl Event {
    #[cfg(test)]
    pub fn new(case_id: &str, activity: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: None,
            process_id: None,
            system_id: None,
            case_id: case_id.to_string(),
            activity: activity.to_string(),
            timestamp,
            user_id: None,
            duration_seconds: None,
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    /// End of the event's self-reported interval; an instant when no duration is known.
    ///
    /// Durations reaching past the representable range end at `DateTime::<Utc>::MAX_UTC`.
    pub fn end(&self) -> DateTime<Utc> {
        self.duration_seconds.map_or(self.timestamp, |secs| {
            #[allow(clippy::cast_possible_truncation)]
            let millis = (secs * 1000.0).round() as i64;
            TimeDelta::try_milliseconds(millis)
                .and_then(|delta| self.timestamp.checked_add_signed(delta))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        })
    }

    fn from_raw(index: usize, raw: RawEvent) -> Result<Self> {
        let identifier = raw
            .event_id
            .clone()
            .or_else(|| raw.case_id.clone().map(|c| format!("case {c}")))
            .unwrap_or_else(|| "<unidentified>".to_string());
        let reject = |reason: &str| ProcmineError::Validation {
            index,
            identifier: identifier.clone(),
            reason: reason.to_string(),
        };

        let case_id = raw
            .case_id
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| reject("missing case_id"))?;
        let activity = raw
            .activity
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| reject("missing activity"))?;
        let timestamp = raw
            .timestamp
            .as_ref()
            .ok_or_else(|| reject("missing timestamp"))
            .and_then(|ts| parse_timestamp(ts).ok_or_else(|| reject("unparsable timestamp")))?;

        if let Some(duration) = raw.duration_seconds {
            if !duration.is_finite() || duration < 0.0 {
                return Err(reject("duration_seconds must be a non-negative number"));
            }
        }

        Ok(Self {
            event_id: raw.event_id,
            process_id: raw.process_id,
            system_id: raw.system_id,
            case_id,
            activity,
            timestamp,
            user_id: raw.user_id.filter(|u| !u.trim().is_empty()),
            duration_seconds: raw.duration_seconds,
        })
    }
}

pub fn parse_timestamp(raw: &RawTimestamp) -> Option<DateTime<Utc>> {
    match raw {
        RawTimestamp::Epoch(secs) => {
            if !secs.is_finite() {
                return None;
            }
            let whole = secs.floor();
            #[allow(clippy::cast_possible_truncation)]
            let seconds = whole as i64;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let nanos = ((secs - whole) * 1e9).round() as u32;
            DateTime::<Utc>::from_timestamp(seconds, nanos.min(999_999_999))
        }
        RawTimestamp::Text(text) => {
            let text = text.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Some(parsed.with_timezone(&Utc));
            }
            NAIVE_TIMESTAMP_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|naive| naive.and_utc())
        }
    }
}

/// The ordered events of one `case_id`.
#[derive(Debug, Clone)]
pub struct Case<'a> {
    pub case_id: &'a str,
    pub events: Vec<&'a Event>,
}

impl<'a> Case<'a> {
    pub fn activity_sequence(&self) -> Vec<&'a str> {
        self.events.iter().map(|e| e.activity.as_str()).collect()
    }

    /// Elapsed seconds between first and last event; single-event cases have none.
    pub fn duration_seconds(&self) -> Option<f64> {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) if self.events.len() >= 2 => {
                Some(seconds_between(first.timestamp, last.timestamp))
            }
            _ => None,
        }
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.events.first().map(|e| e.timestamp)
    }
}

#[allow(clippy::cast_precision_loss)]
pub fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

/// A validated, immutable collection of events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events }
    }

    /// Validates raw records, rejecting the first malformed one.
    ///
    /// # Errors
    ///
    /// Returns `ProcmineError::Validation` naming the offending record when a
    /// record lacks `case_id`/`activity`, has an unparsable timestamp, or
    /// reports a negative duration.
    pub fn from_raw(raw: Vec<RawEvent>) -> Result<Self> {
        let events = raw
            .into_iter()
            .enumerate()
            .map(|(index, record)| Event::from_raw(index, record))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(events))
    }

    /// Keeps only the events matching `keep`, preserving their order.
    pub fn retain(&mut self, keep: impl FnMut(&Event) -> bool) {
        self.events.retain(keep);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Groups events into cases, each stable-sorted by timestamp.
    ///
    /// Cases come back in first-seen order; events sharing a timestamp keep
    /// their relative input order.
    pub fn cases(&self) -> Vec<Case<'_>> {
        let mut grouped: IndexMap<&str, Vec<&Event>> = IndexMap::new();
        for event in &self.events {
            grouped.entry(event.case_id.as_str()).or_default().push(event);
        }

        grouped
            .into_iter()
            .map(|(case_id, mut events)| {
                events.sort_by_key(|e| e.timestamp);
                Case { case_id, events }
            })
            .filter(|case| !case.events.is_empty())
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::at;
    use super::*;

    fn raw(case_id: Option<&str>, activity: Option<&str>, ts: Option<&str>) -> RawEvent {
        RawEvent {
            case_id: case_id.map(str::to_string),
            activity: activity.map(str::to_string),
            timestamp: ts.map(|t| RawTimestamp::Text(t.to_string())),
            ..RawEvent::default()
        }
    }

    mod from_raw {
        use super::*;

        #[test]
        fn accepts_well_formed_records() {
            let log = EventLog::from_raw(vec![
                raw(Some("C1"), Some("Create PO"), Some("2025-01-15T10:30:00Z")),
                raw(Some("C1"), Some("Approve PO"), Some("2025-01-15 11:00:00")),
            ])
            .unwrap();

            assert_eq!(log.len(), 2);
            assert_eq!(log.events()[0].activity, "Create PO");
            assert_eq!(
                log.events()[1].timestamp,
                DateTime::parse_from_rfc3339("2025-01-15T11:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc)
            );
        }

        #[test]
        fn rejects_missing_case_id() {
            let err = EventLog::from_raw(vec![raw(None, Some("A"), Some("2025-01-15T10:30:00Z"))])
                .unwrap_err();
            assert!(matches!(err, ProcmineError::Validation { index: 0, .. }));
            assert!(err.to_string().contains("missing case_id"));
        }

        #[test]
        fn rejects_blank_activity() {
            let err = EventLog::from_raw(vec![
                raw(Some("C1"), Some("A"), Some("2025-01-15T10:30:00Z")),
                raw(Some("C1"), Some("  "), Some("2025-01-15T10:31:00Z")),
            ])
            .unwrap_err();
            assert!(matches!(err, ProcmineError::Validation { index: 1, .. }));
            assert!(err.to_string().contains("case C1"));
        }

        #[test]
        fn rejects_unparsable_timestamp() {
            let mut record = raw(Some("C1"), Some("A"), Some("yesterday"));
            record.event_id = Some("EVT_7".to_string());
            let err = EventLog::from_raw(vec![record]).unwrap_err();
            assert!(err.to_string().contains("EVT_7"));
            assert!(err.to_string().contains("unparsable timestamp"));
        }

        #[test]
        fn rejects_negative_duration() {
            let mut record = raw(Some("C1"), Some("A"), Some("2025-01-15T10:30:00Z"));
            record.duration_seconds = Some(-1.0);
            assert!(EventLog::from_raw(vec![record]).is_err());
        }

        #[test]
        fn treats_blank_user_as_absent() {
            let mut record = raw(Some("C1"), Some("A"), Some("2025-01-15T10:30:00Z"));
            record.user_id = Some(String::new());
            let log = EventLog::from_raw(vec![record]).unwrap();
            assert_eq!(log.events()[0].user_id, None);
        }
    }

    mod parse_timestamp {
        use super::*;

        #[test]
        fn parses_epoch_seconds() {
            let ts = parse_timestamp(&RawTimestamp::Epoch(1_700_000_000.0)).unwrap();
            assert_eq!(ts, at(0));
        }

        #[test]
        fn parses_offsets_into_utc() {
            let ts =
                parse_timestamp(&RawTimestamp::Text("2025-01-15T12:30:00+02:00".into())).unwrap();
            assert_eq!(ts.to_rfc3339(), "2025-01-15T10:30:00+00:00");
        }

        #[test]
        fn keeps_fraction_of_negative_epoch() {
            let ts = parse_timestamp(&RawTimestamp::Epoch(-1.5)).unwrap();
            assert_eq!(ts.timestamp(), -2);
            assert_eq!(ts.timestamp_subsec_millis(), 500);
        }

        #[test]
        fn rejects_non_finite_epoch() {
            assert!(parse_timestamp(&RawTimestamp::Epoch(f64::NAN)).is_none());
        }

        #[test]
        fn deserializes_numbers_and_strings() {
            let records: Vec<RawEvent> = serde_json::from_str(
                r#"[{"case_id":"C1","activity":"A","timestamp":1700000000},
                    {"case_id":"C1","activity":"B","timestamp":"2023-11-14T22:13:30Z"}]"#,
            )
            .unwrap();
            let log = EventLog::from_raw(records).unwrap();
            assert_eq!(log.events()[0].timestamp, at(0));
            assert_eq!(log.events()[1].timestamp, at(10));
        }
    }

    mod end {
        use super::*;

        #[test]
        fn adds_duration_to_timestamp() {
            let event = Event::new("C1", "A", at(0)).with_duration(90.5);
            assert_eq!(event.end(), at(90) + TimeDelta::milliseconds(500));
        }

        #[test]
        fn saturates_out_of_range_durations() {
            let event = Event::new("C1", "A", at(0)).with_duration(1e15);
            assert_eq!(event.end(), DateTime::<Utc>::MAX_UTC);

            let event = Event::new("C1", "A", at(0)).with_duration(f64::MAX);
            assert_eq!(event.end(), DateTime::<Utc>::MAX_UTC);
        }
    }

    mod cases {
        use super::*;

        #[test]
        fn groups_and_sorts_by_timestamp() {
            let log = EventLog::new(vec![
                Event::new("C2", "X", at(5)),
                Event::new("C1", "B", at(20)),
                Event::new("C1", "A", at(10)),
            ]);
            let cases = log.cases();

            assert_eq!(cases.len(), 2);
            assert_eq!(cases[0].case_id, "C2");
            assert_eq!(cases[1].activity_sequence(), vec!["A", "B"]);
            assert_eq!(cases[1].duration_seconds(), Some(10.0));
            assert_eq!(cases[0].duration_seconds(), None);
        }

        #[test]
        fn keeps_input_order_for_equal_timestamps() {
            let log = EventLog::new(vec![
                Event::new("C1", "First", at(0)),
                Event::new("C1", "Second", at(0)),
                Event::new("C1", "Third", at(0)),
            ]);
            assert_eq!(
                log.cases()[0].activity_sequence(),
                vec!["First", "Second", "Third"]
            );
        }

        #[test]
        fn returns_no_cases_for_empty_log() {
            assert!(EventLog::default().cases().is_empty());
        }
    }

    #[test]
    fn event_end_adds_reported_duration() {
        let event = Event::new("C1", "A", at(0)).with_duration(90.0);
        assert_eq!(event.end(), at(90));
        assert_eq!(Event::new("C1", "A", at(0)).end(), at(0));
    }
}
