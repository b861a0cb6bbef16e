// Canned multi-severity responses shared by trigger sets, with built-in
// translations.

use std::sync::Arc;

use super::model::{Match, Response, ResponseFn, TextRequest};
use crate::core::model::Severity;
use crate::core::output::TextSpec;
use crate::core::state::StateStore;

fn localized(en: &str, de: &str, fr: &str, ja: &str) -> TextRequest {
    TextRequest::new(TextSpec::localized([
        ("en", en),
        ("de", de),
        ("fr", fr),
        ("ja", ja),
    ]))
}

fn targets_me(state: &StateStore, matched: &Match) -> bool {
    matches!(
        (state.me(), matched.get("target")),
        (Some(me), Some(target)) if me.eq_ignore_ascii_case(target)
    )
}

/// Alarm for the targeted player, info for everybody else.
pub fn tank_buster() -> ResponseFn {
    Arc::new(|state: &StateStore, matched: &Match| {
        if targets_me(state, matched) {
            return Ok(Response::new().alarm(localized(
                "Tank Buster on YOU",
                "Tankbuster auf DIR",
                "Tank buster sur VOUS",
                "自分にタンクバスター",
            )));
        }
        if matched.get("target").is_some() {
            return Ok(Response::new().info(localized(
                "Tank Buster on ${target}",
                "Tankbuster auf ${target}",
                "Tank buster sur ${target}",
                "${target}にタンクバスター",
            )));
        }
        Ok(Response::new().info(localized(
            "Tank Buster",
            "Tankbuster",
            "Tank buster",
            "タンクバスター",
        )))
    })
}

fn fixed(severity: Severity, text: TextRequest) -> ResponseFn {
    Arc::new(move |_: &StateStore, _: &Match| Ok(Response::new().with(severity, text.clone())))
}

pub fn aoe() -> ResponseFn {
    fixed(Severity::Info, localized("aoe", "AoE", "AoE", "AoE"))
}

/// Stack on the marked player, or on you.
pub fn stack_marker() -> ResponseFn {
    Arc::new(|state: &StateStore, matched: &Match| {
        if targets_me(state, matched) {
            return Ok(Response::new().alert(localized(
                "Stack on YOU",
                "Sammeln auf DIR",
                "Package sur VOUS",
                "自分に頭割り",
            )));
        }
        Ok(Response::new().alert(localized(
            "Stack on ${target}",
            "Auf ${target} sammeln",
            "Packez-vous sur ${target}",
            "${target}に頭割り",
        )))
    })
}

pub fn spread() -> ResponseFn {
    fixed(Severity::Alert, localized("Spread", "Verteilen", "Dispersez-vous", "散開"))
}

pub fn knockback() -> ResponseFn {
    fixed(Severity::Alert, localized("Knockback", "Rückstoß", "Poussée", "ノックバック"))
}

pub fn get_behind() -> ResponseFn {
    fixed(Severity::Alert, localized("Get Behind", "Hinter ihn", "Passez derrière", "背面へ"))
}

pub fn move_away() -> ResponseFn {
    fixed(Severity::Alert, localized("Move away", "Weg da", "Éloignez-vous", "離れて"))
}
