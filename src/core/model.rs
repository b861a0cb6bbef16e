use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub type ZoneId = u32;
pub type TriggerId = String;

/// Closed set of normalized log event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Ability,
    StartsUsing,
    GainsEffect,
    LosesEffect,
    HeadMarker,
    GameLog,
    AddedCombatant,
    RemovedCombatant,
    InCombat,
    ActorControl,
    ChangeZone,
}

/// Ordered name/value capture fields of a log event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(Vec<(String, String)>);

impl Fields {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Insert a field, replacing the value in place if the name already exists.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

impl Serialize for Fields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct FieldsVisitor;

impl<'de> Visitor<'de> for FieldsVisitor {
    type Value = Fields;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of field names to values")
    }

    // Entries arrive in document order, which is the order we keep.
    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Fields, A::Error> {
        let mut fields = Fields::new();
        while let Some((key, value)) = access.next_entry::<String, serde_json::Value>()? {
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            fields.insert(key, value);
        }
        Ok(fields)
    }
}

impl<'de> Deserialize<'de> for Fields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FieldsVisitor)
    }
}

/// One normalized, typed, timestamped combat log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Time since the capture epoch
    pub timestamp: Duration,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub fields: Fields,
    /// Raw text of the line, when the normalizer kept it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
}

impl LogEvent {
    pub fn new(timestamp: Duration, event_type: EventType) -> Self {
        Self {
            timestamp,
            event_type,
            fields: Fields::new(),
            line: None,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name, value);
        self
    }

    pub fn with_line(mut self, line: impl Into<String>) -> Self {
        self.line = Some(line.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name)
    }

    /// Text that regex matchers run against: the raw line, or the field
    /// values joined with `|` when no line was kept.
    pub fn raw_line(&self) -> Cow<'_, str> {
        match &self.line {
            Some(line) => Cow::Borrowed(line.as_str()),
            None => Cow::Owned(
                self.fields
                    .iter()
                    .map(|(_, v)| v)
                    .collect::<Vec<_>>()
                    .join("|"),
            ),
        }
    }
}

/// Alert class, mapped by the renderer to a color/size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Alert,
    Alarm,
    Mistake,
}

impl Severity {
    pub fn default_sound(self) -> AlertSound {
        match self {
            Self::Info => AlertSound::Default,
            Self::Alert | Self::Mistake => AlertSound::Warning,
            Self::Alarm => AlertSound::Critical,
        }
    }
}

/// Sound options for alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AlertSound {
    #[default]
    Default,
    Warning,
    Critical,
    None,
}

impl AlertSound {
    /// Sound file the renderer plays for this option
    pub fn filename(self) -> Option<&'static str> {
        match self {
            Self::Default => Some("info"),
            Self::Warning => Some("alert"),
            Self::Critical => Some("alarm"),
            Self::None => None,
        }
    }
}

/// Alert handed to the rendering collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub trigger_id: TriggerId,
    pub severity: Severity,
    pub text: String,
    /// Logical time the alert was produced
    pub timestamp: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_player_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown_seconds: Option<f64>,
    pub sound: AlertSound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_keep_insertion_order() {
        let fields: Fields = vec![("source", "Boss"), ("id", "1A2B"), ("target", "Tank")]
            .into_iter()
            .collect();
        let names: Vec<_> = fields.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["source", "id", "target"]);
    }

    #[test]
    fn test_fields_insert_replaces_in_place() {
        let mut fields = Fields::new();
        fields.insert("a", "1");
        fields.insert("b", "2");
        fields.insert("a", "3");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("a"), Some("3"));
        assert_eq!(fields.iter().next(), Some(("a", "3")));
    }

    #[test]
    fn test_fields_deserialize_preserves_document_order() {
        let fields: Fields =
            serde_json::from_str(r#"{"zeta": "1", "alpha": 2, "mid": null}"#).unwrap();
        let pairs: Vec<_> = fields.iter().collect();
        assert_eq!(pairs, vec![("zeta", "1"), ("alpha", "2"), ("mid", "")]);
    }

    #[test]
    fn test_raw_line_falls_back_to_joined_fields() {
        let event = LogEvent::new(Duration::ZERO, EventType::Ability)
            .with_field("source", "Boss")
            .with_field("id", "1A2B");
        assert_eq!(event.raw_line(), "Boss|1A2B");

        let event = event.with_line("21|Boss|1A2B|Cleave");
        assert_eq!(event.raw_line(), "21|Boss|1A2B|Cleave");
    }

    #[test]
    fn test_severity_default_sounds() {
        assert_eq!(Severity::Info.default_sound().filename(), Some("info"));
        assert_eq!(Severity::Alarm.default_sound().filename(), Some("alarm"));
        assert_eq!(AlertSound::None.filename(), None);
    }
}
