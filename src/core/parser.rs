use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::model::{EventType, Fields, LogEvent};

/// One capture line as written by the normalizer.
#[derive(Debug, Deserialize)]
struct CaptureRecord {
    /// Absolute RFC 3339 time
    #[serde(default)]
    time: Option<String>,
    /// Seconds since the start of the capture
    #[serde(default)]
    t: Option<f64>,
    #[serde(rename = "type")]
    event_type: EventType,
    #[serde(default)]
    fields: Fields,
    #[serde(default)]
    line: Option<String>,
}

/// Parses JSON-lines captures. Absolute times are measured from the first
/// absolute time seen, so one parser should read one capture.
#[derive(Debug, Default)]
pub struct LineParser {
    origin: Option<DateTime<Utc>>,
}

impl LineParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn origin(&self) -> Option<DateTime<Utc>> {
        self.origin
    }

    /// Parse one line; blank lines, `#` comments and malformed records yield
    /// `None`.
    pub fn parse_line(&mut self, line: &str) -> Option<LogEvent> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }

        let record: CaptureRecord = match serde_json::from_str(trimmed) {
            Ok(record) => record,
            Err(e) => {
                log::debug!("Skipping malformed capture line: {}", e);
                return None;
            }
        };

        let timestamp = match (&record.time, record.t) {
            (Some(time), _) => self.offset_of(time)?,
            (None, Some(seconds)) => match Duration::try_from_secs_f64(seconds) {
                Ok(timestamp) => timestamp,
                Err(e) => {
                    log::debug!("Skipping capture line with bad offset {}: {}", seconds, e);
                    return None;
                }
            },
            (None, None) => {
                log::debug!("Skipping capture line without a usable time: {}", trimmed);
                return None;
            }
        };

        Some(LogEvent {
            timestamp,
            event_type: record.event_type,
            fields: record.fields,
            line: record.line,
        })
    }

    fn offset_of(&mut self, time: &str) -> Option<Duration> {
        let parsed = match DateTime::parse_from_rfc3339(time) {
            Ok(parsed) => parsed.with_timezone(&Utc),
            Err(e) => {
                log::debug!("Skipping capture line with bad time '{}': {}", time, e);
                return None;
            }
        };
        let origin = *self.origin.get_or_insert(parsed);
        Some((parsed - origin).to_std().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_relative_seconds() {
        let mut parser = LineParser::new();
        let event = parser
            .parse_line(r#"{"t": 12.5, "type": "starts_using", "fields": {"source": "Boss", "id": "5EA1"}}"#)
            .unwrap();
        assert_eq!(event.timestamp, Duration::from_millis(12_500));
        assert_eq!(event.event_type, EventType::StartsUsing);
        assert_eq!(event.field("id"), Some("5EA1"));
        assert!(event.line.is_none());
    }

    #[test]
    fn test_absolute_times_measured_from_first() {
        let mut parser = LineParser::new();
        let first = parser
            .parse_line(r#"{"time": "2024-05-01T20:00:00+02:00", "type": "in_combat", "fields": {"inGameCombat": "1"}}"#)
            .unwrap();
        let second = parser
            .parse_line(r#"{"time": "2024-05-01T18:00:07.250Z", "type": "ability", "line": "raw"}"#)
            .unwrap();
        assert_eq!(first.timestamp, Duration::ZERO);
        assert_eq!(second.timestamp, Duration::from_millis(7_250));
        assert_eq!(second.line.as_deref(), Some("raw"));
        assert!(parser.origin().is_some());
    }

    #[test]
    fn test_rejects_junk() {
        let mut parser = LineParser::new();
        assert!(parser.parse_line("").is_none());
        assert!(parser.parse_line("# comment").is_none());
        assert!(parser.parse_line("not json").is_none());
        assert!(parser.parse_line(r#"{"t": 1, "type": "unknown_kind"}"#).is_none());
        assert!(parser.parse_line(r#"{"type": "ability"}"#).is_none());
        assert!(parser.parse_line(r#"{"t": -1, "type": "ability"}"#).is_none());
        assert!(parser.parse_line(r#"{"t": 1e30, "type": "ability"}"#).is_none());
        assert!(parser.parse_line(r#"{"t": 12.5, "type": "ability"}"#).is_some());
        assert!(parser.parse_line(r#"{"time": "yesterday", "type": "ability"}"#).is_none());
    }

    #[test]
    fn test_numeric_field_values_become_strings() {
        let mut parser = LineParser::new();
        let event = parser
            .parse_line(r#"{"t": 0, "type": "actor_control", "fields": {"command": 40000010, "zone": null}}"#)
            .unwrap();
        assert_eq!(event.field("command"), Some("40000010"));
        assert_eq!(event.field("zone"), Some(""));
    }
}
