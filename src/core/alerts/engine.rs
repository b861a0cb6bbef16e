// Trigger engine - orchestrates lifecycle, matching and scheduling for one
// ordered event stream.

use std::time::Duration;

use super::model::{Diagnostic, TriggerSet, ZoneFilter};
use super::registry::{LoadError, Registry, TriggerLibrary};
use super::scheduler::{FireContext, Scheduler};
use super::triggers::qualify;
use crate::core::config::EngineConfig;
use crate::core::lifecycle::{CombatState, EncounterLifecycle, Transition};
use crate::core::model::{Alert, EventType, LogEvent, ZoneId};
use crate::core::output::OutputResolver;
use crate::core::state::StateStore;

/// Alerts and diagnostics produced by one engine call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutput {
    pub alerts: Vec<Alert>,
    pub diagnostics: Vec<Diagnostic>,
}

impl EngineOutput {
    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        log::warn!("{diagnostic}");
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, other: Self) {
        self.alerts.extend(other.alerts);
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty() && self.diagnostics.is_empty()
    }
}

pub struct TriggerEngine {
    config: EngineConfig,
    library: TriggerLibrary,
    /// Active triggers for the current zone
    registry: Registry,
    zone: Option<ZoneId>,
    state: StateStore,
    scheduler: Scheduler,
    lifecycle: EncounterLifecycle,
    resolver: OutputResolver,
    /// Logical clock, never moves backwards
    now: Duration,
}

impl TriggerEngine {
    pub fn new(config: EngineConfig) -> Self {
        let resolver = OutputResolver::new(config.locale.clone(), config.default_locale.clone());
        Self {
            state: StateStore::new(config.player_name.clone()),
            lifecycle: EncounterLifecycle::new(config.markers.clone()),
            library: TriggerLibrary::new(),
            registry: Registry::default(),
            zone: None,
            scheduler: Scheduler::new(),
            resolver,
            now: Duration::ZERO,
            config,
        }
    }

    /// Validate and add a trigger set. When the set applies to the current
    /// zone the active registry is rebuilt; the State Store is left alone.
    pub fn add_trigger_set(&mut self, set: TriggerSet) -> Result<(), LoadError> {
        let zone = self.zone;
        let loaded = match self.library.add(set) {
            Ok(loaded) => loaded,
            Err(e) => {
                log::warn!("Rejected trigger set: {}", e);
                return Err(e);
            }
        };
        log::info!(
            "Loaded trigger set '{}' ({} triggers, {} excluded)",
            loaded.name,
            loaded.triggers.len(),
            loaded.excluded.len()
        );

        let active = match zone {
            Some(zone) => loaded.zones.admits(zone),
            None => loaded.zones == ZoneFilter::Any,
        };
        if active {
            self.rebuild_registry();
        }
        Ok(())
    }

    /// Switch to a zone: cancels pending fires and starts from a clean
    /// encounter with the zone's triggers.
    pub fn activate_zone(&mut self, zone: ZoneId) {
        let cancelled = self.scheduler.cancel_all();
        self.zone = Some(zone);
        self.rebuild_registry();
        self.lifecycle.reset();
        self.reset_encounter();
        log::info!(
            "Activated zone {} with {} triggers ({} pending fires cancelled)",
            zone,
            self.registry.len(),
            cancelled
        );
    }

    /// Process one log event. Events must arrive in non-decreasing
    /// timestamp order.
    pub fn handle_event(&mut self, event: &LogEvent) -> EngineOutput {
        let mut out = self.advance_to(event.timestamp);

        if event.event_type == EventType::ChangeZone {
            match event.field("id").map(str::parse::<ZoneId>) {
                Some(Ok(zone)) => self.activate_zone(zone),
                _ => log::warn!("ChangeZone event without a usable id: {:?}", event.fields),
            }
        }

        if let Some(transition) = self.lifecycle.observe(event) {
            self.apply_transition(transition);
        }

        // Deferred fires count from the event's own time, even when a live
        // clock has already moved past it.
        let match_time = event.timestamp;
        for trigger in self.registry.lookup(event.event_type) {
            let user = self.config.overrides.get(trigger.id());
            match qualify(trigger, event, &mut self.state, &self.scheduler, user, match_time) {
                Ok(Some(intent)) => {
                    let mut ctx = FireContext {
                        state: &mut self.state,
                        resolver: &self.resolver,
                        overrides: &self.config.overrides,
                    };
                    self.scheduler.submit(intent, &mut ctx, &mut out);
                }
                Ok(None) => {}
                Err(diagnostic) => out.push_diagnostic(diagnostic),
            }
        }

        // A late event may have scheduled fires that are already due.
        if match_time < self.now {
            out.extend(self.advance_to(self.now));
        }
        out
    }

    /// Move the logical clock forward, executing every fire due by `time`.
    pub fn advance_to(&mut self, time: Duration) -> EngineOutput {
        let mut out = EngineOutput::default();
        self.now = self.now.max(time);
        let mut ctx = FireContext {
            state: &mut self.state,
            resolver: &self.resolver,
            overrides: &self.config.overrides,
        };
        self.scheduler.advance_to(self.now, &mut ctx, &mut out);
        out
    }

    /// Execute every pending fire at its own time (end of a replay).
    pub fn flush_pending(&mut self) -> EngineOutput {
        let mut out = EngineOutput::default();
        if let Some(last) = self.scheduler.last_pending_time() {
            self.now = self.now.max(last);
        }
        let mut ctx = FireContext {
            state: &mut self.state,
            resolver: &self.resolver,
            overrides: &self.config.overrides,
        };
        self.scheduler.drain(&mut ctx, &mut out);
        out
    }

    pub fn next_fire_time(&self) -> Option<Duration> {
        self.scheduler.next_fire_time()
    }

    pub fn pending_fires(&self) -> usize {
        self.scheduler.pending_len()
    }

    pub fn combat_state(&self) -> CombatState {
        self.lifecycle.state()
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn zone(&self) -> Option<ZoneId> {
        self.zone
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn apply_transition(&mut self, transition: Transition) {
        match transition {
            Transition::CombatStarted => {
                log::info!("Combat started at {:?}", self.now);
                // Retained state must also survive the next pull's start.
                if self.registry.reset_when_out_of_combat() {
                    self.reset_encounter();
                }
            }
            Transition::CombatEnded(marker) => {
                let cancelled = self.scheduler.cancel_all();
                log::info!(
                    "Combat ended ({:?}) at {:?}, {} pending fires cancelled",
                    marker,
                    self.now,
                    cancelled
                );
                if self.registry.reset_when_out_of_combat() {
                    self.reset_encounter();
                }
            }
        }
    }

    /// Fresh State Store from the active initializers; suppression records
    /// share its lifetime.
    fn reset_encounter(&mut self) {
        self.state.reset(self.registry.init_data());
        self.scheduler.clear_suppressions();
    }

    fn rebuild_registry(&mut self) {
        self.registry = self.library.registry_for(self.zone, &self.config.overrides);
    }
}

impl std::fmt::Debug for TriggerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerEngine")
            .field("zone", &self.zone)
            .field("now", &self.now)
            .field("triggers", &self.registry.len())
            .field("pending", &self.scheduler.pending_len())
            .field("combat", &self.lifecycle.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::{CallbackError, Stage, TextRequest, TriggerDefinition};
    use crate::core::model::Severity;
    use crate::core::output::TextSpec;

    fn ability(at: u64, id: &str) -> LogEvent {
        LogEvent::new(Duration::from_secs(at), EventType::Ability)
            .with_field("source", "Boss")
            .with_field("id", id)
            .with_field("target", "Tank Player")
    }

    fn say(id: &str, text: &str) -> TriggerDefinition {
        TriggerDefinition::new(id, EventType::Ability)
            .info_text(TextRequest::new(TextSpec::literal(text)))
    }

    fn engine_with(set: TriggerSet) -> TriggerEngine {
        let mut engine = TriggerEngine::new(EngineConfig::default());
        engine.add_trigger_set(set).unwrap();
        engine
    }

    #[test]
    fn test_unzoned_sets_active_before_zone_change() {
        let mut engine =
            engine_with(TriggerSet::new("Global", ZoneFilter::Any).trigger(say("Hi", "hello")));
        let out = engine.handle_event(&ability(1, "1"));
        assert_eq!(out.alerts.len(), 1);
        assert_eq!(out.alerts[0].text, "hello");
        assert_eq!(engine.zone(), None);
    }

    #[test]
    fn test_change_zone_event_activates_zone() {
        let mut engine = engine_with(
            TriggerSet::new("Zone 1003", ZoneFilter::Zones(vec![1003]))
                .trigger(say("Zoned", "here")),
        );
        assert!(engine.handle_event(&ability(1, "1")).alerts.is_empty());

        let change =
            LogEvent::new(Duration::from_secs(2), EventType::ChangeZone).with_field("id", "1003");
        engine.handle_event(&change);
        assert_eq!(engine.zone(), Some(1003));

        assert_eq!(engine.handle_event(&ability(3, "1")).alerts.len(), 1);
    }

    #[test]
    fn test_failing_trigger_does_not_block_siblings() {
        let mut engine = engine_with(
            TriggerSet::new("Mixed", ZoneFilter::Any)
                .trigger(say("Before", "one"))
                .trigger(
                    TriggerDefinition::new("Broken", EventType::Ability)
                        .condition(|_, m| m.require("missing").map(|_| true)),
                )
                .trigger(say("After", "two")),
        );

        let out = engine.handle_event(&ability(5, "1"));
        let ids: Vec<_> = out.alerts.iter().map(|a| a.trigger_id.as_str()).collect();
        assert_eq!(ids, vec!["Before", "After"]);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(
            out.diagnostics[0].message,
            CallbackError::MissingField("missing".to_string()).to_string()
        );
    }

    #[test]
    fn test_run_visible_to_later_triggers_on_same_event() {
        let mut engine = engine_with(
            TriggerSet::new("Ordered", ZoneFilter::Any)
                .trigger(TriggerDefinition::new("Count", EventType::Ability).run(|state, _| {
                    state.increment("hits");
                    Ok(())
                }))
                .trigger(
                    TriggerDefinition::new("Report", EventType::Ability)
                        .condition(|state, _| Ok(state.get_i64("hits") == Some(1)))
                        .text(Severity::Alert, TextRequest::new(TextSpec::literal("counted"))),
                ),
        );
        assert_eq!(engine.handle_event(&ability(1, "1")).alerts.len(), 1);
    }

    #[test]
    fn test_advance_to_and_flush() {
        let mut engine = engine_with(
            TriggerSet::new("Delayed", ZoneFilter::Any)
                .trigger(say("Soon", "soon").delay(3u32))
                .trigger(say("Later", "later").delay(30u32)),
        );
        engine.handle_event(&ability(10, "1"));
        assert_eq!(engine.pending_fires(), 2);
        assert_eq!(engine.next_fire_time(), Some(Duration::from_secs(13)));

        let out = engine.advance_to(Duration::from_secs(13));
        assert_eq!(out.alerts.len(), 1);
        assert_eq!(out.alerts[0].timestamp, Duration::from_secs(13));

        let rest = engine.flush_pending();
        assert_eq!(rest.alerts.len(), 1);
        assert_eq!(rest.alerts[0].timestamp, Duration::from_secs(40));
        assert_eq!(engine.now(), Duration::from_secs(40));
        assert_eq!(engine.pending_fires(), 0);
    }

    #[test]
    fn test_out_of_range_delay_is_isolated() {
        let mut engine = engine_with(
            TriggerSet::new("Timing", ZoneFilter::Any)
                .trigger(say("Forever", "never").delay(1e30))
                .trigger(say("Sibling", "still here")),
        );

        let out = engine.handle_event(&ability(5, "1"));
        let ids: Vec<_> = out.alerts.iter().map(|a| a.trigger_id.as_str()).collect();
        assert_eq!(ids, vec!["Sibling"]);
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].trigger_id, "Forever");
        assert_eq!(out.diagnostics[0].stage, Stage::Timing);
        assert_eq!(engine.pending_fires(), 0);
    }

    #[test]
    fn test_late_event_delay_counts_from_event_time() {
        let mut engine = engine_with(
            TriggerSet::new("Late", ZoneFilter::Any).trigger(say("Delayed", "late").delay(5u32)),
        );
        engine.advance_to(Duration::from_secs(112));

        assert!(engine.handle_event(&ability(110, "1")).alerts.is_empty());
        assert_eq!(engine.next_fire_time(), Some(Duration::from_secs(115)));

        // Already overdue when scheduled: released before returning.
        let out = engine.handle_event(&ability(100, "1"));
        assert_eq!(out.alerts.len(), 1);
        assert_eq!(out.alerts[0].timestamp, Duration::from_secs(105));
        assert_eq!(engine.pending_fires(), 1);
    }

    #[test]
    fn test_rejected_set_leaves_engine_unchanged() {
        let mut engine = TriggerEngine::new(EngineConfig::default());
        let result = engine.add_trigger_set(
            TriggerSet::new("Dupes", ZoneFilter::Any)
                .trigger(say("A", "a"))
                .trigger(say("A", "again")),
        );
        assert!(result.is_err());
        assert!(engine.handle_event(&ability(1, "1")).is_empty());
    }
}
