//! Progression rules and the effects they report.
//!
//! HP and XP changes are applied here and nowhere else. Each mutation
//! returns [`Effect`]s describing what changed so presentation code can
//! react without re-deriving anything from state. Effects are reports only:
//! producing them never alters the values being reported.

use crate::validate::Severity;
use crate::world::Character;
use serde::{Deserialize, Serialize};

/// HP added to `max_hp` (and healed) on each level gained.
pub const HP_PER_LEVEL: i32 = 10;

/// XP granted for a failed check.
pub const FAILED_CHECK_XP: i32 = 5;

/// A state change applied to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    /// HP went down. `amount` is the requested delta's magnitude.
    Damage { amount: i32, hp: i32 },
    /// HP went up. `amount` is the requested delta's magnitude.
    Healing { amount: i32, hp: i32 },
    XpGained { amount: i32, xp: u32 },
    LevelUp { level: u32, max_hp: i32 },
    ItemGained { item: String },
    ItemLost { item: String },
    NpcMet { name: String },
    RelationshipChanged {
        name: String,
        change: i32,
        relationship: i32,
    },
}

/// Apply an HP delta, clamped to `0..=max_hp`.
///
/// Returns a damage or healing effect for a non-zero delta.
pub fn apply_hp(character: &mut Character, delta: i32) -> Option<Effect> {
    character.hp = (character.hp.saturating_add(delta)).clamp(0, character.max_hp);

    match delta {
        d if d < 0 => Some(Effect::Damage {
            amount: d.saturating_neg(),
            hp: character.hp,
        }),
        d if d > 0 => Some(Effect::Healing {
            amount: d,
            hp: character.hp,
        }),
        _ => None,
    }
}

/// Grant XP and level up as many times as the total allows.
///
/// Each level consumes `xp_to_next`, multiplies the threshold by 1.5
/// (floored), adds [`HP_PER_LEVEL`] to `max_hp` and heals the same amount.
/// Negative amounts reduce XP but never below zero.
pub fn apply_xp(character: &mut Character, amount: i32) -> Vec<Effect> {
    let mut effects = Vec::new();
    if amount == 0 {
        return effects;
    }

    character.xp = if amount >= 0 {
        character.xp.saturating_add(amount.unsigned_abs())
    } else {
        character.xp.saturating_sub(amount.unsigned_abs())
    };

    // xp_to_next > 0 and grows every iteration, so this terminates.
    while character.xp_to_next > 0 && character.xp >= character.xp_to_next {
        character.xp -= character.xp_to_next;
        character.level += 1;
        character.xp_to_next = next_threshold(character.xp_to_next);
        character.max_hp += HP_PER_LEVEL;
        character.hp = (character.hp + HP_PER_LEVEL).min(character.max_hp);

        effects.push(Effect::LevelUp {
            level: character.level,
            max_hp: character.max_hp,
        });
    }

    effects.insert(
        0,
        Effect::XpGained {
            amount,
            xp: character.xp,
        },
    );
    effects
}

/// `floor(threshold * 1.5)`, never less than `threshold + 1`.
fn next_threshold(threshold: u32) -> u32 {
    let grown = threshold.saturating_mul(3) / 2;
    grown.max(threshold.saturating_add(1))
}

/// HP change for a resolved check. Only failed important checks hurt.
pub fn check_hp_penalty(severity: Severity, difficulty: u8, passed: bool) -> i32 {
    if passed || severity != Severity::Important {
        return 0;
    }
    -(i32::from(difficulty) / 3 + 2)
}

/// XP for a resolved check. Failure still rewards the attempt.
pub fn check_xp_reward(difficulty: u8, passed: bool) -> i32 {
    if passed {
        5 + (i32::from(difficulty) / 2) * 2
    } else {
        FAILED_CHECK_XP
    }
}
