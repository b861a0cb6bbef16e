// Reusable trigger conditions comparing match fields with the local player.

use std::sync::Arc;

use super::model::{ConditionFn, Match};
use crate::core::state::StateStore;

fn field_is_me(state: &StateStore, matched: &Match, field: &str) -> bool {
    match (state.me(), matched.get(field)) {
        (Some(me), Some(value)) => me.eq_ignore_ascii_case(value),
        _ => false,
    }
}

/// Passes when the match `target` is the local player.
pub fn target_is_you() -> ConditionFn {
    Arc::new(|state: &StateStore, matched: &Match| Ok(field_is_me(state, matched, "target")))
}

/// Passes when the match `target` is someone else (or unknown).
pub fn target_is_not_you() -> ConditionFn {
    Arc::new(|state: &StateStore, matched: &Match| Ok(!field_is_me(state, matched, "target")))
}

/// Passes when the local player is the `source` of the event.
pub fn caster_is_you() -> ConditionFn {
    Arc::new(|state: &StateStore, matched: &Match| Ok(field_is_me(state, matched, "source")))
}
