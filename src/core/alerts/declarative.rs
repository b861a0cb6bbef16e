// Declarative trigger files: JSON trigger sets without callbacks.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::engine::TriggerEngine;
use super::model::{TextRequest, TriggerDefinition, TriggerSet, ZoneFilter};
use super::registry::LoadError;
use crate::core::model::{AlertSound, EventType, Fields, Severity, ZoneId};
use crate::core::output::{LocaleText, OutputStrings, TextSpec};

#[derive(Debug, thiserror::Error)]
pub enum TriggerFileError {
    #[error("cannot read trigger file: {0}")]
    Io(#[from] io::Error),
    #[error("malformed trigger file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Load(#[from] LoadError),
}

#[derive(Debug, Deserialize)]
struct TriggerSetFile {
    name: String,
    /// Absent means every zone
    #[serde(default)]
    zones: Option<Vec<ZoneId>>,
    #[serde(default = "default_true")]
    reset_when_out_of_combat: bool,
    #[serde(default)]
    init_data: Option<Map<String, Value>>,
    #[serde(default)]
    triggers: Vec<TriggerEntry>,
}

fn default_true() -> bool {
    true
}

/// Literal text or a per-locale map.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextEntry {
    Literal(String),
    Localized(LocaleText),
}

#[derive(Debug, Deserialize)]
struct TriggerEntry {
    id: String,
    #[serde(rename = "type")]
    event_type: EventType,
    #[serde(default)]
    regex: Option<String>,
    #[serde(default)]
    fields: Fields,
    #[serde(default)]
    filters: Fields,
    #[serde(default)]
    delay_seconds: Option<f64>,
    #[serde(default)]
    duration_seconds: Option<f64>,
    #[serde(default)]
    suppress_seconds: Option<f64>,
    #[serde(default)]
    countdown_seconds: Option<f64>,
    #[serde(default)]
    severity: Option<Severity>,
    #[serde(default)]
    text: Option<TextEntry>,
    /// Symbolic key into `output_strings`
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    output_strings: OutputStrings,
    #[serde(default)]
    target_field: Option<String>,
    #[serde(default)]
    sound: Option<AlertSound>,
    #[serde(default)]
    disabled: bool,
}

impl TriggerEntry {
    fn into_definition(self) -> TriggerDefinition {
        let mut def = TriggerDefinition::new(self.id, self.event_type);
        if let Some(pattern) = self.regex {
            def = def.regex(pattern);
        }
        for (name, pattern) in self.fields.iter() {
            def = def.field(name, pattern);
        }
        for (name, literal) in self.filters.iter() {
            def = def.filter(name, literal);
        }
        if let Some(seconds) = self.delay_seconds {
            def = def.delay(seconds);
        }
        if let Some(seconds) = self.duration_seconds {
            def = def.duration(seconds);
        }
        if let Some(seconds) = self.suppress_seconds {
            def = def.suppress(seconds);
        }
        if let Some(seconds) = self.countdown_seconds {
            def = def.countdown(seconds);
        }

        let spec = match (self.key, self.text) {
            (Some(key), _) => Some(TextSpec::Key(key)),
            (None, Some(TextEntry::Literal(text))) => Some(TextSpec::Literal(text)),
            (None, Some(TextEntry::Localized(text))) => Some(TextSpec::Localized(text)),
            (None, None) => None,
        };
        if let Some(spec) = spec {
            def = def.text(self.severity.unwrap_or(Severity::Info), TextRequest::new(spec));
        }

        def.output_strings = self.output_strings;
        if let Some(field) = self.target_field {
            def = def.target_field(field);
        }
        if let Some(sound) = self.sound {
            def = def.sound(sound);
        }
        def.disabled(self.disabled)
    }
}

/// Parse a trigger set from JSON text.
pub fn parse_trigger_set(content: &str) -> Result<TriggerSet, TriggerFileError> {
    let file: TriggerSetFile = serde_json::from_str(content)?;
    let zones = match file.zones {
        Some(zones) => ZoneFilter::Zones(zones),
        None => ZoneFilter::Any,
    };

    let mut set =
        TriggerSet::new(file.name, zones).reset_when_out_of_combat(file.reset_when_out_of_combat);
    if let Some(data) = file.init_data {
        set.init_data = Some(Arc::new(move || data.clone()));
    }
    for entry in file.triggers {
        set = set.trigger(entry.into_definition());
    }
    Ok(set)
}

pub fn load_trigger_file(path: &Path) -> Result<TriggerSet, TriggerFileError> {
    let content = fs::read_to_string(path)?;
    parse_trigger_set(&content)
}

/// Load a trigger file straight into an engine.
pub fn add_trigger_file(engine: &mut TriggerEngine, path: &Path) -> Result<(), TriggerFileError> {
    let set = load_trigger_file(path)?;
    engine.add_trigger_set(set)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::{MatcherSpec, TriggerOutput};
    use crate::core::config::EngineConfig;
    use crate::core::model::LogEvent;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"{
        "name": "Sample Raid",
        "zones": [1003],
        "reset_when_out_of_combat": false,
        "init_data": { "phase": 1 },
        "triggers": [
            {
                "id": "Sample Cleave",
                "type": "starts_using",
                "fields": { "id": "5EA[12]", "source": "Boss" },
                "severity": "alert",
                "key": "cleave",
                "output_strings": { "cleave": { "en": "Cleave on ${target}", "de": "Cleave auf ${target}" } },
                "delay_seconds": 2,
                "target_field": "target"
            },
            {
                "id": "Sample Text",
                "type": "game_log",
                "regex": "(?P<speaker>\\w+): hello",
                "text": { "en": "Hello from ${speaker}" },
                "sound": "None",
                "disabled": true
            }
        ]
    }"#;

    #[test]
    fn test_parse_sample_set() {
        let set = parse_trigger_set(SAMPLE).unwrap();
        assert_eq!(set.name, "Sample Raid");
        assert_eq!(set.zones, ZoneFilter::Zones(vec![1003]));
        assert!(!set.reset_when_out_of_combat);
        let init = set.init_data.as_ref().unwrap()();
        assert_eq!(init.get("phase"), Some(&Value::from(1)));

        let cleave = &set.triggers[0];
        assert_eq!(cleave.event_type, EventType::StartsUsing);
        assert_eq!(
            cleave.matcher,
            MatcherSpec::Fields(vec![
                ("id".to_string(), "5EA[12]".to_string()),
                ("source".to_string(), "Boss".to_string()),
            ])
        );
        assert!(matches!(
            &cleave.output,
            TriggerOutput::Text { severity: Severity::Alert, request } if request.text == TextSpec::key("cleave")
        ));
        assert_eq!(cleave.output_strings["cleave"]["de"], "Cleave auf ${target}");

        let text = &set.triggers[1];
        assert!(text.disabled);
        assert_eq!(text.sound, Some(AlertSound::None));
        assert!(matches!(text.matcher, MatcherSpec::Regex(_)));
    }

    #[test]
    fn test_file_drives_engine() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let mut engine = TriggerEngine::new(EngineConfig {
            locale: "de".to_string(),
            ..EngineConfig::default()
        });
        add_trigger_file(&mut engine, file.path()).unwrap();
        engine.activate_zone(1003);
        assert_eq!(engine.state().get_i64("phase"), Some(1));

        let cast = LogEvent::new(Duration::from_secs(10), EventType::StartsUsing)
            .with_field("source", "Boss")
            .with_field("id", "5EA2")
            .with_field("target", "Tank Player");
        assert!(engine.handle_event(&cast).alerts.is_empty());

        let out = engine.advance_to(Duration::from_secs(12));
        assert_eq!(out.alerts.len(), 1);
        assert_eq!(out.alerts[0].text, "Cleave auf Tank Player");
        assert_eq!(out.alerts[0].target_player_id.as_deref(), Some("Tank Player"));
    }

    #[test]
    fn test_errors_are_typed() {
        assert!(matches!(
            load_trigger_file(Path::new("/nonexistent/triggers.json")),
            Err(TriggerFileError::Io(_))
        ));
        assert!(matches!(parse_trigger_set("{"), Err(TriggerFileError::Parse(_))));

        let dupes = r#"{"name": "D", "triggers": [
            {"id": "A", "type": "ability"}, {"id": "A", "type": "ability"}
        ]}"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(dupes.as_bytes()).unwrap();
        let mut engine = TriggerEngine::new(EngineConfig::default());
        assert!(matches!(
            add_trigger_file(&mut engine, file.path()),
            Err(TriggerFileError::Load(LoadError::DuplicateId { .. }))
        ));
    }
}
