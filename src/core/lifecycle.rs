// Encounter lifecycle: detects combat start/end from designated log events.

use serde::{Deserialize, Serialize};

use super::model::{EventType, LogEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CombatState {
    #[default]
    Idle,
    InCombat,
}

/// What a marker event signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    Start,
    Wipe,
    Victory,
    End,
}

/// An actual state change, reported once per boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    CombatStarted,
    CombatEnded(Marker),
}

/// One event pattern that marks a combat boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRule {
    pub event_type: EventType,
    pub field: String,
    /// Any of these values (ASCII case-insensitive) triggers the marker
    pub values: Vec<String>,
    pub marker: Marker,
}

impl MarkerRule {
    pub fn new(event_type: EventType, field: &str, values: &[&str], marker: Marker) -> Self {
        Self {
            event_type,
            field: field.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
            marker,
        }
    }

    fn matches(&self, event: &LogEvent) -> bool {
        event.event_type == self.event_type
            && event
                .field(&self.field)
                .is_some_and(|value| self.values.iter().any(|v| v.eq_ignore_ascii_case(value)))
    }
}

/// The set of rules recognized as combat boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatMarkers {
    pub rules: Vec<MarkerRule>,
}

impl Default for CombatMarkers {
    fn default() -> Self {
        Self {
            rules: vec![
                MarkerRule::new(EventType::InCombat, "inGameCombat", &["1"], Marker::Start),
                MarkerRule::new(EventType::InCombat, "inGameCombat", &["0"], Marker::End),
                MarkerRule::new(
                    EventType::ActorControl,
                    "command",
                    &["40000001", "40000006"],
                    Marker::Start,
                ),
                MarkerRule::new(
                    EventType::ActorControl,
                    "command",
                    &["40000010", "4000000F"],
                    Marker::Wipe,
                ),
                MarkerRule::new(EventType::ActorControl, "command", &["40000003"], Marker::Victory),
            ],
        }
    }
}

/// Idle -> InCombat -> Idle state machine.
#[derive(Debug, Clone, Default)]
pub struct EncounterLifecycle {
    state: CombatState,
    markers: CombatMarkers,
}

impl EncounterLifecycle {
    pub fn new(markers: CombatMarkers) -> Self {
        Self {
            state: CombatState::Idle,
            markers,
        }
    }

    pub fn state(&self) -> CombatState {
        self.state
    }

    /// Feed one event; returns a transition only when the state changes.
    pub fn observe(&mut self, event: &LogEvent) -> Option<Transition> {
        let marker = self
            .markers
            .rules
            .iter()
            .find(|rule| rule.matches(event))?
            .marker;

        match (self.state, marker) {
            (CombatState::Idle, Marker::Start) => {
                self.state = CombatState::InCombat;
                Some(Transition::CombatStarted)
            }
            (CombatState::InCombat, Marker::Wipe | Marker::Victory | Marker::End) => {
                self.state = CombatState::Idle;
                Some(Transition::CombatEnded(marker))
            }
            _ => None,
        }
    }

    /// Return to idle without reporting a transition (zone change).
    pub fn reset(&mut self) {
        self.state = CombatState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn in_combat(flag: &str) -> LogEvent {
        LogEvent::new(Duration::ZERO, EventType::InCombat).with_field("inGameCombat", flag)
    }

    fn actor_control(command: &str) -> LogEvent {
        LogEvent::new(Duration::ZERO, EventType::ActorControl).with_field("command", command)
    }

    #[test]
    fn test_start_and_end_transitions() {
        let mut lifecycle = EncounterLifecycle::default();
        assert_eq!(lifecycle.state(), CombatState::Idle);

        assert_eq!(lifecycle.observe(&in_combat("1")), Some(Transition::CombatStarted));
        assert_eq!(lifecycle.state(), CombatState::InCombat);

        assert_eq!(
            lifecycle.observe(&in_combat("0")),
            Some(Transition::CombatEnded(Marker::End))
        );
        assert_eq!(lifecycle.state(), CombatState::Idle);
    }

    #[test]
    fn test_repeated_markers_are_ignored() {
        let mut lifecycle = EncounterLifecycle::default();
        assert_eq!(lifecycle.observe(&in_combat("0")), None);
        lifecycle.observe(&in_combat("1"));
        assert_eq!(lifecycle.observe(&actor_control("40000001")), None);
    }

    #[test]
    fn test_wipe_and_victory_both_end_combat() {
        let mut lifecycle = EncounterLifecycle::default();
        lifecycle.observe(&actor_control("40000006"));
        assert_eq!(
            lifecycle.observe(&actor_control("4000000f")),
            Some(Transition::CombatEnded(Marker::Wipe))
        );

        lifecycle.observe(&in_combat("1"));
        assert_eq!(
            lifecycle.observe(&actor_control("40000003")),
            Some(Transition::CombatEnded(Marker::Victory))
        );
    }

    #[test]
    fn test_custom_marker_rules_from_json() {
        let markers: CombatMarkers = serde_json::from_str(
            r#"{"rules": [{"event_type": "game_log", "field": "code", "values": ["0839"], "marker": "start"},
                          {"event_type": "game_log", "field": "code", "values": ["0840"], "marker": "victory"}]}"#,
        )
        .unwrap();
        assert_eq!(markers.rules[1].marker, Marker::Victory);

        let mut lifecycle = EncounterLifecycle::new(markers);
        let log = |code: &str| LogEvent::new(Duration::ZERO, EventType::GameLog).with_field("code", code);
        assert_eq!(lifecycle.observe(&log("0839")), Some(Transition::CombatStarted));
        assert_eq!(lifecycle.observe(&in_combat("0")), None);
        assert_eq!(
            lifecycle.observe(&log("0840")),
            Some(Transition::CombatEnded(Marker::Victory))
        );
    }

    #[test]
    fn test_unrelated_events_ignored() {
        let mut lifecycle = EncounterLifecycle::default();
        let event = LogEvent::new(Duration::ZERO, EventType::Ability).with_field("inGameCombat", "1");
        assert_eq!(lifecycle.observe(&event), None);
        assert_eq!(lifecycle.observe(&actor_control("80000000")), None);
    }
}
