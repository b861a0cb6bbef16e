use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::lifecycle::CombatMarkers;
use super::model::AlertSound;
use super::output::DEFAULT_LOCALE;

/// Per-trigger user options, keyed by trigger id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerOverride {
    #[serde(default)]
    pub disabled: bool,
    /// Replaces the trigger's own suppression window
    #[serde(default)]
    pub suppress_seconds: Option<f64>,
    /// Literal text shown instead of every resolved alert text
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub sound: Option<AlertSound>,
}

/// Explicit engine configuration; there is no process-wide state.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub locale: String,
    pub default_locale: String,
    /// Local player name, exposed to callbacks as "me"
    pub player_name: Option<String>,
    pub overrides: HashMap<String, TriggerOverride>,
    pub markers: CombatMarkers,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            locale: DEFAULT_LOCALE.to_string(),
            default_locale: DEFAULT_LOCALE.to_string(),
            player_name: None,
            overrides: HashMap::new(),
            markers: CombatMarkers::default(),
        }
    }
}

/// Persisted settings - settings.json
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub locale: String,
    #[serde(default = "default_locale")]
    pub default_locale: String,
    #[serde(default)]
    pub player_name: Option<String>,
    /// Declarative trigger set files loaded at startup
    #[serde(default)]
    pub trigger_files: Vec<PathBuf>,
    #[serde(default)]
    pub overrides: HashMap<String, TriggerOverride>,
}

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            default_locale: default_locale(),
            player_name: None,
            trigger_files: Vec::new(),
            overrides: HashMap::new(),
        }
    }
}

impl Settings {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            locale: self.locale.clone(),
            default_locale: self.default_locale.clone(),
            player_name: self.player_name.clone(),
            overrides: self.overrides.clone(),
            markers: CombatMarkers::default(),
        }
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(app_config_dir: PathBuf) -> Self {
        Self {
            config_path: app_config_dir.join("settings.json"),
        }
    }

    pub fn load(&self) -> Settings {
        if self.config_path.exists() {
            match fs::read_to_string(&self.config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(settings) => return settings,
                    Err(e) => log::warn!("Ignoring malformed {:?}: {}", self.config_path, e),
                },
                Err(e) => log::warn!("Cannot read {:?}: {}", self.config_path, e),
            }
        }
        Settings::default()
    }

    pub fn save(&self, settings: &Settings) -> io::Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)
    }
}
