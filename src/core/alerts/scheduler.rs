// Scheduler - turns fire intents into immediate alerts or cancellable
// deferred fires on the logical timeline, and keeps suppression records.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::engine::EngineOutput;
use super::model::{Match, Stage, TextRequest, TriggerOutput};
use super::registry::CompiledTrigger;
use super::triggers::guarded;
use crate::core::config::TriggerOverride;
use crate::core::model::{Alert, Severity};
use crate::core::output::OutputResolver;
use crate::core::state::StateStore;

/// Timing values frozen at match time.
#[derive(Debug, Clone, PartialEq)]
pub struct Timing {
    pub delay: Duration,
    pub duration_seconds: Option<f64>,
    pub countdown_seconds: Option<f64>,
}

/// A qualified match, waiting to be turned into output.
#[derive(Debug, Clone)]
pub struct FireIntent {
    pub trigger: Arc<CompiledTrigger>,
    pub matched: Match,
    pub timing: Timing,
    /// Logical time of the match
    pub scheduled_at: Duration,
}

impl FireIntent {
    pub fn fire_at(&self) -> Duration {
        self.scheduled_at.saturating_add(self.timing.delay)
    }
}

/// Shared flag checked when a deferred fire comes due.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct ScheduledFire {
    intent: FireIntent,
    token: CancellationToken,
}

/// Everything a fire needs from the engine when it executes.
pub struct FireContext<'a> {
    pub state: &'a mut StateStore,
    pub resolver: &'a OutputResolver,
    pub overrides: &'a HashMap<String, TriggerOverride>,
}

#[derive(Default)]
pub struct Scheduler {
    /// Pending fires keyed by (fire time, submission sequence)
    pending: BTreeMap<(Duration, u64), ScheduledFire>,
    /// Suppression records: last time each trigger actually fired
    last_fired: HashMap<String, Duration>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire now when there is no delay, otherwise queue a deferred fire and
    /// return its cancellation token.
    pub fn submit(
        &mut self,
        intent: FireIntent,
        ctx: &mut FireContext<'_>,
        out: &mut EngineOutput,
    ) -> Option<CancellationToken> {
        if intent.timing.delay.is_zero() {
            let now = intent.scheduled_at;
            self.execute(&intent, now, ctx, out);
            return None;
        }

        let token = CancellationToken::default();
        let key = (intent.fire_at(), self.next_seq);
        self.next_seq += 1;
        self.pending.insert(
            key,
            ScheduledFire {
                intent,
                token: token.clone(),
            },
        );
        Some(token)
    }

    /// Execute every pending fire due at or before `now`, in time order.
    pub fn advance_to(&mut self, now: Duration, ctx: &mut FireContext<'_>, out: &mut EngineOutput) {
        while let Some(entry) = self.pending.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let ((fire_at, _), fire) = entry.remove_entry();
            self.run_scheduled(fire, fire_at, ctx, out);
        }
    }

    /// Execute everything still pending, each at its own fire time.
    pub fn drain(&mut self, ctx: &mut FireContext<'_>, out: &mut EngineOutput) {
        while let Some(((fire_at, _), fire)) = self.pending.pop_first() {
            self.run_scheduled(fire, fire_at, ctx, out);
        }
    }

    /// Trip every outstanding token and drop the queue.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.pending.len();
        for fire in self.pending.values() {
            fire.token.cancel();
        }
        self.pending.clear();
        count
    }

    /// Cancel the pending fires of one trigger.
    pub fn cancel(&mut self, trigger_id: &str) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, fire| {
            let matches = fire.intent.trigger.id() == trigger_id;
            if matches {
                fire.token.cancel();
            }
            !matches
        });
        before - self.pending.len()
    }

    /// True when `trigger_id` fired less than `window` before `now`.
    pub fn is_suppressed(&self, trigger_id: &str, now: Duration, window: Duration) -> bool {
        if window.is_zero() {
            return false;
        }
        self.last_fired
            .get(trigger_id)
            .is_some_and(|last| now.saturating_sub(*last) < window)
    }

    pub fn last_fired(&self, trigger_id: &str) -> Option<Duration> {
        self.last_fired.get(trigger_id).copied()
    }

    pub fn clear_suppressions(&mut self) {
        self.last_fired.clear();
    }

    pub fn next_fire_time(&self) -> Option<Duration> {
        self.pending.keys().next().map(|(at, _)| *at)
    }

    pub fn last_pending_time(&self) -> Option<Duration> {
        self.pending.keys().next_back().map(|(at, _)| *at)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn run_scheduled(
        &mut self,
        fire: ScheduledFire,
        fire_at: Duration,
        ctx: &mut FireContext<'_>,
        out: &mut EngineOutput,
    ) {
        if fire.token.is_cancelled() {
            log::debug!("Dropping cancelled fire of '{}'", fire.intent.trigger.id());
            return;
        }
        self.execute(&fire.intent, fire_at, ctx, out);
    }

    fn execute(
        &mut self,
        intent: &FireIntent,
        fire_at: Duration,
        ctx: &mut FireContext<'_>,
        out: &mut EngineOutput,
    ) {
        let def = &intent.trigger.def;
        let id = def.id.as_str();
        let user = ctx.overrides.get(id);

        let entries: Vec<(Severity, TextRequest)> = match &def.output {
            TriggerOutput::None => Vec::new(),
            TriggerOutput::Text { severity, request } => vec![(*severity, request.clone())],
            TriggerOutput::Deferred { severity, build } => {
                match guarded(id, Stage::Output, || build(ctx.state, &intent.matched)) {
                    Ok(request) => request.map(|r| (*severity, r)).into_iter().collect(),
                    Err(diagnostic) => {
                        out.push_diagnostic(diagnostic);
                        return;
                    }
                }
            }
            TriggerOutput::Response(build) => {
                match guarded(id, Stage::Output, || build(ctx.state, &intent.matched)) {
                    Ok(response) => response.entries,
                    Err(diagnostic) => {
                        out.push_diagnostic(diagnostic);
                        return;
                    }
                }
            }
        };

        let target_player_id = def
            .target_field
            .as_deref()
            .and_then(|field| intent.matched.get(field))
            .map(str::to_string);

        for (severity, request) in entries {
            let text = match user.and_then(|o| o.text.as_ref()) {
                Some(text) => text.clone(),
                None => {
                    let mut params: HashMap<String, String> = intent
                        .matched
                        .fields
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect();
                    params.extend(request.params);
                    ctx.resolver.resolve(&request.text, &def.output_strings, &params)
                }
            };
            let sound = user
                .and_then(|o| o.sound)
                .or(def.sound)
                .unwrap_or_else(|| severity.default_sound());

            out.alerts.push(Alert {
                trigger_id: id.to_string(),
                severity,
                text,
                timestamp: fire_at,
                target_player_id: target_player_id.clone(),
                duration_seconds: intent.timing.duration_seconds,
                countdown_seconds: intent.timing.countdown_seconds,
                sound,
            });
        }

        if let Some(post_run) = &def.post_run {
            if let Err(diagnostic) = guarded(id, Stage::PostRun, || post_run(ctx.state, &intent.matched))
            {
                out.push_diagnostic(diagnostic);
            }
        }

        self.last_fired.insert(id.to_string(), fire_at);
    }
}
