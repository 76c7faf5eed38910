use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::event_log::{Event, EventLog, RawEvent};
use crate::error::{ProcmineError, Result};

/// Inclusive calendar range written as `YYYY-MM-DD/YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// # Errors
    ///
    /// Returns `InvalidDateRange` when either side is not a `YYYY-MM-DD` date or
    /// the range ends before it starts.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = || ProcmineError::InvalidDateRange(value.to_string());

        let (start, end) = value.split_once('/').ok_or_else(invalid)?;
        let start = NaiveDate::parse_from_str(start.trim(), "%Y-%m-%d").map_err(|_| invalid())?;
        let end = NaiveDate::parse_from_str(end.trim(), "%Y-%m-%d").map_err(|_| invalid())?;

        if end < start {
            return Err(invalid());
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        let day = timestamp.date_naive();
        self.start <= day && day <= self.end
    }
}

impl FromStr for DateRange {
    type Err = ProcmineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DateRange {
    type Error = ProcmineError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<DateRange> for String {
    fn from(value: DateRange) -> Self {
        value.to_string()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// Which slice of the upstream system's events to extract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractRequest {
    pub process_id: Option<String>,
    pub system_id: Option<String>,
    pub date_range: Option<DateRange>,
}

impl ExtractRequest {
    /// Events without a `process_id` or `system_id` are not excluded by those filters.
    fn admits(&self, event: &Event) -> bool {
        fn matches(wanted: Option<&String>, actual: Option<&String>) -> bool {
            match (wanted, actual) {
                (Some(wanted), Some(actual)) => wanted == actual,
                _ => true,
            }
        }

        matches(self.process_id.as_ref(), event.process_id.as_ref())
            && matches(self.system_id.as_ref(), event.system_id.as_ref())
            && self
                .date_range
                .map_or(true, |range| range.contains(event.timestamp))
    }
}

#[derive(Debug, Clone)]
pub struct ExtractedEvents {
    pub events: EventLog,
    pub total_events: usize,
    pub extraction_timestamp: DateTime<Utc>,
    pub system_id: Option<String>,
}

/// Upstream system that hands out validated event logs.
pub trait EventSource {
    /// # Errors
    ///
    /// Returns an error when the events cannot be read or any record fails
    /// validation.
    fn extract(&self, request: &ExtractRequest) -> Result<ExtractedEvents>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportFormat {
    JsonArray,
    JsonLines,
    Yaml,
}

impl ExportFormat {
    fn detect(path: &Path, contents: &str) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jsonl" | "ndjson") => Self::JsonLines,
            Some("yaml" | "yml") => Self::Yaml,
            _ if contents.trim_start().starts_with('[') => Self::JsonArray,
            _ => Self::JsonLines,
        }
    }
}

/// Reads events from an export file: a JSON array, JSON Lines, or YAML.
#[derive(Debug, Clone)]
pub struct FileEventSource {
    path: PathBuf,
}

impl FileEventSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_raw(&self) -> Result<Vec<RawEvent>> {
        let contents = std::fs::read_to_string(&self.path)?;
        let format = ExportFormat::detect(&self.path, &contents);
        debug!("Reading {} as {format:?}", self.path.display());

        let records = match format {
            ExportFormat::JsonArray => serde_json::from_str(&contents)?,
            ExportFormat::Yaml => serde_yaml::from_str(&contents)?,
            ExportFormat::JsonLines => contents
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(serde_json::from_str)
                .collect::<std::result::Result<Vec<RawEvent>, _>>()?,
        };
        Ok(records)
    }
}

impl EventSource for FileEventSource {
    fn extract(&self, request: &ExtractRequest) -> Result<ExtractedEvents> {
        info!("Extracting events from {}", self.path.display());

        let raw = self.read_raw()?;
        let read = raw.len();
        let mut events = EventLog::from_raw(raw)?;
        events.retain(|event| request.admits(event));

        debug!(
            "Kept {} of {read} events after filtering (process: {:?}, system: {:?}, range: {:?})",
            events.len(),
            request.process_id,
            request.system_id,
            request.date_range.map(|r| r.to_string())
        );

        Ok(ExtractedEvents {
            total_events: events.len(),
            events,
            extraction_timestamp: Utc::now(),
            system_id: request.system_id.clone(),
        })
    }
}
