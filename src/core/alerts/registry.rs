// Trigger registry: load-time validation, matcher compilation and the
// per-zone lookup table keyed by event type.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use super::model::{Diagnostic, Stage, TriggerDefinition, TriggerSet, ZoneFilter};
use super::triggers::CompiledMatcher;
use crate::core::config::TriggerOverride;
use crate::core::model::{EventType, ZoneId};
use crate::core::state::InitDataFn;

/// Fatal problems that reject a whole trigger set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("trigger set '{set}' contains duplicate trigger id '{id}'")]
    DuplicateId { set: String, id: String },
    #[error("trigger set '{set}' contains a trigger with an empty id")]
    EmptyId { set: String },
}

/// A trigger definition with its matcher compiled.
#[derive(Debug)]
pub struct CompiledTrigger {
    pub def: TriggerDefinition,
    pub matcher: CompiledMatcher,
    pub set_name: String,
}

impl CompiledTrigger {
    pub fn compile(def: TriggerDefinition, set_name: &str) -> Result<Self, regex::Error> {
        let matcher = CompiledMatcher::compile(&def.matcher)?;
        Ok(Self {
            def,
            matcher,
            set_name: set_name.to_string(),
        })
    }

    pub fn id(&self) -> &str {
        &self.def.id
    }
}

/// A validated trigger set, ready to be activated for its zones.
pub struct LoadedSet {
    pub name: String,
    pub zones: ZoneFilter,
    pub init_data: Option<InitDataFn>,
    pub reset_when_out_of_combat: bool,
    pub triggers: Vec<Arc<CompiledTrigger>>,
    /// Triggers dropped because their matcher failed to compile
    pub excluded: Vec<Diagnostic>,
}

impl LoadedSet {
    /// Validate and compile a set. Any duplicate id rejects the whole set;
    /// a matcher that fails to compile only drops that trigger.
    pub fn load(set: TriggerSet) -> Result<Self, LoadError> {
        let mut seen = HashSet::new();
        for def in &set.triggers {
            if def.id.is_empty() {
                return Err(LoadError::EmptyId {
                    set: set.name.clone(),
                });
            }
            if !seen.insert(def.id.as_str()) {
                return Err(LoadError::DuplicateId {
                    set: set.name.clone(),
                    id: def.id.clone(),
                });
            }
        }

        let mut triggers = Vec::with_capacity(set.triggers.len());
        let mut excluded = Vec::new();
        for def in set.triggers {
            let id = def.id.clone();
            match CompiledTrigger::compile(def, &set.name) {
                Ok(compiled) => triggers.push(Arc::new(compiled)),
                Err(e) => {
                    log::warn!("Excluding trigger '{}' from '{}': {}", id, set.name, e);
                    excluded.push(Diagnostic {
                        trigger_id: id,
                        stage: Stage::Matcher,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            name: set.name,
            zones: set.zones,
            init_data: set.init_data,
            reset_when_out_of_combat: set.reset_when_out_of_combat,
            triggers,
            excluded,
        })
    }
}

/// Every trigger set loaded so far, in insertion order.
#[derive(Default)]
pub struct TriggerLibrary {
    sets: Vec<LoadedSet>,
}

impl TriggerLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, set: TriggerSet) -> Result<&LoadedSet, LoadError> {
        let loaded = LoadedSet::load(set)?;
        self.sets.push(loaded);
        Ok(&self.sets[self.sets.len() - 1])
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Build the active registry for a zone (`None`: only zone-independent
    /// sets). A trigger id seen again in a later set replaces the earlier
    /// definition in place.
    pub fn registry_for(
        &self,
        zone: Option<ZoneId>,
        overrides: &HashMap<String, TriggerOverride>,
    ) -> Registry {
        let mut ordered: Vec<Arc<CompiledTrigger>> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut init_data = Vec::new();
        let mut reset_when_out_of_combat = true;

        let admitted = |set: &&LoadedSet| match zone {
            Some(zone) => set.zones.admits(zone),
            None => set.zones == ZoneFilter::Any,
        };
        for set in self.sets.iter().filter(admitted) {
            if let Some(init) = &set.init_data {
                init_data.push(Arc::clone(init));
            }
            reset_when_out_of_combat &= set.reset_when_out_of_combat;

            for trigger in &set.triggers {
                match positions.get(trigger.id()) {
                    Some(&index) => {
                        log::debug!(
                            "Trigger '{}' from '{}' overrides '{}'",
                            trigger.id(),
                            set.name,
                            ordered[index].set_name
                        );
                        ordered[index] = Arc::clone(trigger);
                    }
                    None => {
                        positions.insert(trigger.id().to_string(), ordered.len());
                        ordered.push(Arc::clone(trigger));
                    }
                }
            }
        }

        let mut by_type: HashMap<EventType, Vec<Arc<CompiledTrigger>>> = HashMap::new();
        let mut count = 0;
        for trigger in ordered {
            let user_disabled = overrides.get(trigger.id()).is_some_and(|o| o.disabled);
            if trigger.def.disabled || user_disabled {
                continue;
            }
            count += 1;
            by_type.entry(trigger.def.event_type).or_default().push(trigger);
        }

        Registry {
            by_type,
            init_data,
            reset_when_out_of_combat,
            count,
        }
    }
}

/// Active triggers for one zone, bucketed by event type.
pub struct Registry {
    by_type: HashMap<EventType, Vec<Arc<CompiledTrigger>>>,
    init_data: Vec<InitDataFn>,
    reset_when_out_of_combat: bool,
    count: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            by_type: HashMap::new(),
            init_data: Vec::new(),
            reset_when_out_of_combat: true,
            count: 0,
        }
    }
}

impl Registry {
    /// Candidates for an event type, in registration order.
    pub fn lookup(&self, event_type: EventType) -> &[Arc<CompiledTrigger>] {
        self.by_type
            .get(&event_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn init_data(&self) -> &[InitDataFn] {
        &self.init_data
    }

    /// False when any active set keeps its state across pulls.
    pub fn reset_when_out_of_combat(&self) -> bool {
        self.reset_when_out_of_combat
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
