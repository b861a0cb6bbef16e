// Trigger definition types: matchers, callbacks, timing and output forms.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::model::{AlertSound, EventType, Fields, Severity, ZoneId};
use crate::core::output::{OutputStrings, TextSpec};
use crate::core::state::{InitDataFn, StateStore};

/// Error raised by an author-supplied callback.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallbackError {
    #[error("missing match field: {0}")]
    MissingField(String),
    #[error("{0}")]
    Failed(String),
}

pub type CallbackResult<T> = Result<T, CallbackError>;

pub type ConditionFn = Arc<dyn Fn(&StateStore, &Match) -> CallbackResult<bool> + Send + Sync>;
pub type RunFn = Arc<dyn Fn(&mut StateStore, &Match) -> CallbackResult<()> + Send + Sync>;
pub type SecondsFn = Arc<dyn Fn(&StateStore, &Match) -> CallbackResult<f64> + Send + Sync>;
pub type TextFn =
    Arc<dyn Fn(&StateStore, &Match) -> CallbackResult<Option<TextRequest>> + Send + Sync>;
pub type ResponseFn = Arc<dyn Fn(&StateStore, &Match) -> CallbackResult<Response> + Send + Sync>;

/// A matched event: raw fields with named regex captures merged over them.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub timestamp: Duration,
    pub event_type: EventType,
    pub fields: Fields,
}

impl Match {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name)
    }

    /// Like `get`, but a missing field is a callback error.
    pub fn require(&self, name: &str) -> CallbackResult<&str> {
        self.get(name)
            .ok_or_else(|| CallbackError::MissingField(name.to_string()))
    }
}

/// How a trigger selects events of its type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherSpec {
    /// Regex with optional named captures, run against the event's raw line
    Regex(String),
    /// Each named field must fully match its regex fragment
    Fields(Vec<(String, String)>),
}

impl Default for MatcherSpec {
    fn default() -> Self {
        Self::Fields(Vec::new())
    }
}

/// A timing value: constant or computed from the match.
#[derive(Clone)]
pub enum Seconds {
    Const(f64),
    Dynamic(SecondsFn),
}

impl Seconds {
    pub fn from_fn(
        f: impl Fn(&StateStore, &Match) -> CallbackResult<f64> + Send + Sync + 'static,
    ) -> Self {
        Self::Dynamic(Arc::new(f))
    }

    pub fn evaluate(&self, state: &StateStore, matched: &Match) -> CallbackResult<f64> {
        match self {
            Self::Const(value) => Ok(*value),
            Self::Dynamic(f) => f(state, matched),
        }
    }
}

impl From<f64> for Seconds {
    fn from(value: f64) -> Self {
        Self::Const(value)
    }
}

impl From<u32> for Seconds {
    fn from(value: u32) -> Self {
        Self::Const(f64::from(value))
    }
}

impl fmt::Debug for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(value) => write!(f, "Const({value})"),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// A text spec plus the parameters for its placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRequest {
    pub text: TextSpec,
    pub params: HashMap<String, String>,
}

impl TextRequest {
    pub fn new(text: TextSpec) -> Self {
        Self {
            text,
            params: HashMap::new(),
        }
    }

    pub fn key(key: impl Into<String>) -> Self {
        Self::new(TextSpec::key(key))
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// Structured multi-field response: one alert per entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Response {
    pub entries: Vec<(Severity, TextRequest)>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(self, text: TextRequest) -> Self {
        self.with(Severity::Info, text)
    }

    pub fn alert(self, text: TextRequest) -> Self {
        self.with(Severity::Alert, text)
    }

    pub fn alarm(self, text: TextRequest) -> Self {
        self.with(Severity::Alarm, text)
    }

    pub fn with(mut self, severity: Severity, text: TextRequest) -> Self {
        self.entries.push((severity, text));
        self
    }
}

/// The single output form of a trigger.
#[derive(Clone, Default)]
pub enum TriggerOutput {
    #[default]
    None,
    /// Static text; placeholders are filled from the match fields
    Text {
        severity: Severity,
        request: TextRequest,
    },
    /// Built at fire time from the state as it is then
    Deferred { severity: Severity, build: TextFn },
    /// Several alerts of different severities, built at fire time
    Response(ResponseFn),
}

impl fmt::Debug for TriggerOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Text { severity, request } => f
                .debug_struct("Text")
                .field("severity", severity)
                .field("request", request)
                .finish(),
            Self::Deferred { severity, .. } => f
                .debug_struct("Deferred")
                .field("severity", severity)
                .finish_non_exhaustive(),
            Self::Response(_) => f.write_str("Response(..)"),
        }
    }
}

/// Static rule matched against one event type.
#[derive(Clone)]
pub struct TriggerDefinition {
    pub id: String,
    pub event_type: EventType,
    pub matcher: MatcherSpec,
    /// Literal field filters, AND semantics, checked before `condition`
    pub filters: Vec<(String, String)>,
    pub condition: Option<ConditionFn>,
    /// Runs at match time, before the fire is scheduled
    pub run: Option<RunFn>,
    /// Runs when the fire executes, after output; skipped when cancelled
    pub post_run: Option<RunFn>,
    pub delay_seconds: Option<Seconds>,
    pub duration_seconds: Option<Seconds>,
    pub suppress_seconds: Option<Seconds>,
    pub countdown_seconds: Option<Seconds>,
    pub output: TriggerOutput,
    pub output_strings: OutputStrings,
    /// Match field copied into the alert's target player
    pub target_field: Option<String>,
    pub sound: Option<AlertSound>,
    pub disabled: bool,
}

impl fmt::Debug for TriggerDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerDefinition")
            .field("id", &self.id)
            .field("event_type", &self.event_type)
            .field("matcher", &self.matcher)
            .field("filters", &self.filters)
            .field("delay_seconds", &self.delay_seconds)
            .field("suppress_seconds", &self.suppress_seconds)
            .field("output", &self.output)
            .field("disabled", &self.disabled)
            .finish_non_exhaustive()
    }
}

impl TriggerDefinition {
    pub fn new(id: impl Into<String>, event_type: EventType) -> Self {
        Self {
            id: id.into(),
            event_type,
            matcher: MatcherSpec::default(),
            filters: Vec::new(),
            condition: None,
            run: None,
            post_run: None,
            delay_seconds: None,
            duration_seconds: None,
            suppress_seconds: None,
            countdown_seconds: None,
            output: TriggerOutput::None,
            output_strings: OutputStrings::new(),
            target_field: None,
            sound: None,
            disabled: false,
        }
    }

    pub fn regex(mut self, pattern: impl Into<String>) -> Self {
        self.matcher = MatcherSpec::Regex(pattern.into());
        self
    }

    /// Add a field pattern (regex fragment, anchored on both ends).
    pub fn field(mut self, name: impl Into<String>, pattern: impl Into<String>) -> Self {
        let entry = (name.into(), pattern.into());
        match &mut self.matcher {
            MatcherSpec::Fields(fields) => fields.push(entry),
            MatcherSpec::Regex(_) => self.matcher = MatcherSpec::Fields(vec![entry]),
        }
        self
    }

    pub fn filter(mut self, name: impl Into<String>, literal: impl Into<String>) -> Self {
        self.filters.push((name.into(), literal.into()));
        self
    }

    pub fn condition(
        mut self,
        f: impl Fn(&StateStore, &Match) -> CallbackResult<bool> + Send + Sync + 'static,
    ) -> Self {
        self.condition = Some(Arc::new(f));
        self
    }

    pub fn condition_fn(mut self, f: ConditionFn) -> Self {
        self.condition = Some(f);
        self
    }

    pub fn run(
        mut self,
        f: impl Fn(&mut StateStore, &Match) -> CallbackResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.run = Some(Arc::new(f));
        self
    }

    pub fn post_run(
        mut self,
        f: impl Fn(&mut StateStore, &Match) -> CallbackResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.post_run = Some(Arc::new(f));
        self
    }

    pub fn delay(mut self, seconds: impl Into<Seconds>) -> Self {
        self.delay_seconds = Some(seconds.into());
        self
    }

    pub fn duration(mut self, seconds: impl Into<Seconds>) -> Self {
        self.duration_seconds = Some(seconds.into());
        self
    }

    pub fn suppress(mut self, seconds: impl Into<Seconds>) -> Self {
        self.suppress_seconds = Some(seconds.into());
        self
    }

    pub fn countdown(mut self, seconds: impl Into<Seconds>) -> Self {
        self.countdown_seconds = Some(seconds.into());
        self
    }

    pub fn info_text(self, request: TextRequest) -> Self {
        self.text(Severity::Info, request)
    }

    pub fn alert_text(self, request: TextRequest) -> Self {
        self.text(Severity::Alert, request)
    }

    pub fn alarm_text(self, request: TextRequest) -> Self {
        self.text(Severity::Alarm, request)
    }

    pub fn text(mut self, severity: Severity, request: TextRequest) -> Self {
        self.output = TriggerOutput::Text { severity, request };
        self
    }

    pub fn deferred_text(
        mut self,
        severity: Severity,
        f: impl Fn(&StateStore, &Match) -> CallbackResult<Option<TextRequest>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.output = TriggerOutput::Deferred {
            severity,
            build: Arc::new(f),
        };
        self
    }

    pub fn response(mut self, f: ResponseFn) -> Self {
        self.output = TriggerOutput::Response(f);
        self
    }

    /// Declare a symbolic output key with `(locale, template)` pairs.
    pub fn output_string<'a>(
        mut self,
        key: impl Into<String>,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        self.output_strings.insert(
            key.into(),
            pairs
                .into_iter()
                .map(|(locale, text)| (locale.to_string(), text.to_string()))
                .collect(),
        );
        self
    }

    pub fn target_field(mut self, field: impl Into<String>) -> Self {
        self.target_field = Some(field.into());
        self
    }

    pub fn sound(mut self, sound: AlertSound) -> Self {
        self.sound = Some(sound);
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }
}

/// Which zones a trigger set applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ZoneFilter {
    #[default]
    Any,
    Zones(Vec<ZoneId>),
}

impl ZoneFilter {
    pub fn admits(&self, zone: ZoneId) -> bool {
        match self {
            Self::Any => true,
            Self::Zones(zones) => zones.contains(&zone),
        }
    }
}

/// Triggers authored together for one or more zones.
#[derive(Clone)]
pub struct TriggerSet {
    pub name: String,
    pub zones: ZoneFilter,
    pub init_data: Option<InitDataFn>,
    pub reset_when_out_of_combat: bool,
    pub triggers: Vec<TriggerDefinition>,
}

impl TriggerSet {
    pub fn new(name: impl Into<String>, zones: ZoneFilter) -> Self {
        Self {
            name: name.into(),
            zones,
            init_data: None,
            reset_when_out_of_combat: true,
            triggers: Vec::new(),
        }
    }

    pub fn init_data(
        mut self,
        f: impl Fn() -> serde_json::Map<String, serde_json::Value> + Send + Sync + 'static,
    ) -> Self {
        self.init_data = Some(Arc::new(f));
        self
    }

    pub fn reset_when_out_of_combat(mut self, reset: bool) -> Self {
        self.reset_when_out_of_combat = reset;
        self
    }

    pub fn trigger(mut self, trigger: TriggerDefinition) -> Self {
        self.triggers.push(trigger);
        self
    }
}

/// Where in a trigger's evaluation a diagnostic arose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Matcher,
    Condition,
    Run,
    Timing,
    Output,
    PostRun,
}

/// A non-fatal problem surfaced while loading or evaluating a trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub trigger_id: String,
    pub stage: Stage,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trigger '{}' ({:?}): {}", self.trigger_id, self.stage, self.message)
    }
}
