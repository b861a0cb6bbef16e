// Trigger evaluation: matcher compilation and per-trigger qualification.
//
// `qualify` runs one candidate through matcher, literal filters, condition,
// suppression, `run` and timing, and yields a fire intent when it qualifies.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

use super::model::{CallbackResult, Diagnostic, Match, MatcherSpec, Seconds, Stage};
use super::registry::CompiledTrigger;
use super::scheduler::{FireIntent, Scheduler, Timing};
use crate::core::config::TriggerOverride;
use crate::core::model::LogEvent;
use crate::core::state::StateStore;

/// A matcher with its regexes compiled once at load time.
#[derive(Debug, Clone)]
pub enum CompiledMatcher {
    Regex(Regex),
    Fields(Vec<(String, Regex)>),
}

impl CompiledMatcher {
    pub fn compile(spec: &MatcherSpec) -> Result<Self, regex::Error> {
        match spec {
            MatcherSpec::Regex(pattern) => Ok(Self::Regex(Regex::new(pattern)?)),
            MatcherSpec::Fields(fields) => fields
                .iter()
                .map(|(name, pattern)| {
                    Regex::new(&format!("^(?:{pattern})$")).map(|re| (name.clone(), re))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::Fields),
        }
    }

    /// Apply to an event; on success the raw fields are bound with any named
    /// captures merged over them.
    pub fn apply(&self, event: &LogEvent) -> Option<Match> {
        let mut fields = event.fields.clone();
        match self {
            Self::Regex(re) => {
                let line = event.raw_line();
                let caps = re.captures(&line)?;
                for name in re.capture_names().flatten() {
                    if let Some(value) = caps.name(name) {
                        fields.insert(name, value.as_str());
                    }
                }
            }
            Self::Fields(patterns) => {
                let all_match = patterns.iter().all(|(name, re)| {
                    event.field(name).is_some_and(|value| re.is_match(value))
                });
                if !all_match {
                    return None;
                }
            }
        }
        Some(Match {
            timestamp: event.timestamp,
            event_type: event.event_type,
            fields,
        })
    }
}

/// Run an author callback, turning both errors and panics into a diagnostic.
pub fn guarded<T>(
    trigger_id: &str,
    stage: Stage,
    f: impl FnOnce() -> CallbackResult<T>,
) -> Result<T, Diagnostic> {
    let message = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(err)) => err.to_string(),
        Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
    };
    Err(Diagnostic {
        trigger_id: trigger_id.to_string(),
        stage,
        message,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Seconds to a duration; negative or NaN values mean "no time". `None` when
/// the value does not fit a `Duration`.
pub fn seconds_to_duration(seconds: f64) -> Option<Duration> {
    if seconds.is_nan() || seconds <= 0.0 {
        return Some(Duration::ZERO);
    }
    Duration::try_from_secs_f64(seconds).ok()
}

fn timing_duration(id: &str, what: &str, seconds: f64) -> Result<Duration, Diagnostic> {
    seconds_to_duration(seconds).ok_or_else(|| Diagnostic {
        trigger_id: id.to_string(),
        stage: Stage::Timing,
        message: format!("{what} of {seconds}s is out of range"),
    })
}

fn evaluate_seconds(
    id: &str,
    seconds: Option<&Seconds>,
    state: &StateStore,
    matched: &Match,
) -> Result<Option<f64>, Diagnostic> {
    seconds
        .map(|s| guarded(id, Stage::Timing, || s.evaluate(state, matched)))
        .transpose()
}

/// Evaluate one candidate trigger against an event.
///
/// Returns `Ok(None)` when the trigger does not qualify, `Err` when one of
/// its callbacks failed (the trigger is skipped for this event).
pub fn qualify(
    trigger: &Arc<CompiledTrigger>,
    event: &LogEvent,
    state: &mut StateStore,
    scheduler: &Scheduler,
    user: Option<&TriggerOverride>,
    now: Duration,
) -> Result<Option<FireIntent>, Diagnostic> {
    let def = &trigger.def;
    let id = def.id.as_str();

    let Some(matched) = trigger.matcher.apply(event) else {
        return Ok(None);
    };

    let filtered_out = def
        .filters
        .iter()
        .any(|(name, literal)| matched.get(name) != Some(literal.as_str()));
    if filtered_out {
        return Ok(None);
    }

    if let Some(condition) = &def.condition {
        let passed = guarded(id, Stage::Condition, || condition(state, &matched))?;
        if !passed {
            return Ok(None);
        }
    }

    let suppress = match user.and_then(|o| o.suppress_seconds) {
        Some(seconds) => seconds,
        None => evaluate_seconds(id, def.suppress_seconds.as_ref(), state, &matched)?
            .unwrap_or(0.0),
    };
    if scheduler.is_suppressed(id, now, timing_duration(id, "suppress", suppress)?) {
        log::debug!("trigger '{id}' suppressed at {now:?}");
        return Ok(None);
    }

    if let Some(run) = &def.run {
        guarded(id, Stage::Run, || run(state, &matched))?;
    }

    let delay = evaluate_seconds(id, def.delay_seconds.as_ref(), state, &matched)?.unwrap_or(0.0);
    let delay_duration = timing_duration(id, "delay", delay)?;
    if now.checked_add(delay_duration).is_none() {
        return Err(Diagnostic {
            trigger_id: id.to_string(),
            stage: Stage::Timing,
            message: format!("delay of {delay}s overflows the clock"),
        });
    }
    let timing = Timing {
        delay: delay_duration,
        duration_seconds: evaluate_seconds(id, def.duration_seconds.as_ref(), state, &matched)?,
        countdown_seconds: evaluate_seconds(id, def.countdown_seconds.as_ref(), state, &matched)?,
    };

    Ok(Some(FireIntent {
        trigger: Arc::clone(trigger),
        matched,
        timing,
        scheduled_at: now,
    }))
}
