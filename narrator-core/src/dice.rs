//! d20 check resolution.
//!
//! A check adds the character's stat value (plus the special-ability bonus
//! when it applies) to a d20 draw and compares the total to a difficulty
//! class. The draw comes from a [`D20Source`] so tests can fix the sequence.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bonus granted when the checked stat matches the character's special ability.
pub const SPECIAL_ABILITY_BONUS: i32 = 5;

/// Lowest and highest faces of a d20.
pub const D20_MIN: u8 = 1;
pub const D20_MAX: u8 = 20;

/// Produces uniform d20 draws.
pub trait D20Source: Send {
    /// Return a value in `1..=20`.
    fn roll(&mut self) -> u8;
}

/// A d20 backed by a `rand` generator.
pub struct RngD20<R: Rng + Send = StdRng> {
    rng: R,
}

impl RngD20<StdRng> {
    /// Seed from the operating system.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic sequence for reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng + Send> RngD20<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng + Send> D20Source for RngD20<R> {
    fn roll(&mut self) -> u8 {
        self.rng.gen_range(D20_MIN..=D20_MAX)
    }
}

impl Default for RngD20<StdRng> {
    fn default() -> Self {
        Self::from_entropy()
    }
}

/// Outcome of a resolved check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceResult {
    /// The raw d20 face.
    pub draw: u8,
    /// Stat value plus any special-ability bonus.
    pub bonus: i32,
    pub total: i32,
    pub difficulty: u8,
    pub passed: bool,
}

impl fmt::Display for DiceResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed { "success" } else { "failure" };
        if self.bonus < 0 {
            write!(
                f,
                "[{}] - {} = {} vs DC {} ({verdict})",
                self.draw,
                self.bonus.abs(),
                self.total,
                self.difficulty
            )
        } else {
            write!(
                f,
                "[{}] + {} = {} vs DC {} ({verdict})",
                self.draw, self.bonus, self.total, self.difficulty
            )
        }
    }
}

/// Resolve a check with the standard special-ability bonus.
pub fn resolve(draw: u8, stat_value: i32, difficulty: u8, special_ability_active: bool) -> DiceResult {
    resolve_with_bonus(
        draw,
        stat_value,
        difficulty,
        special_ability_active,
        SPECIAL_ABILITY_BONUS,
    )
}

/// Resolve a check with a configurable special-ability bonus.
pub fn resolve_with_bonus(
    draw: u8,
    stat_value: i32,
    difficulty: u8,
    special_ability_active: bool,
    special_bonus: i32,
) -> DiceResult {
    let bonus = stat_value + if special_ability_active { special_bonus } else { 0 };
    let total = i32::from(draw) + bonus;

    DiceResult {
        draw,
        bonus,
        total,
        difficulty,
        passed: total >= i32::from(difficulty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_pass() {
        let result = resolve(10, 3, 12, false);
        assert_eq!(result.bonus, 3);
        assert_eq!(result.total, 13);
        assert!(result.passed);
    }

    #[test]
    fn test_resolve_special_ability_bonus() {
        let result = resolve(5, 0, 12, true);
        assert_eq!(result.bonus, 5);
        assert_eq!(result.total, 10);
        assert!(!result.passed);
    }

    #[test]
    fn test_total_equal_to_difficulty_passes() {
        assert!(resolve(12, 0, 12, false).passed);
        assert!(!resolve(11, 0, 12, false).passed);
    }

    #[test]
    fn test_negative_stat() {
        let result = resolve(15, -2, 14, false);
        assert_eq!(result.total, 13);
        assert!(!result.passed);
        assert_eq!(result.to_string(), "[15] - 2 = 13 vs DC 14 (failure)");
    }

    #[test]
    fn test_custom_bonus() {
        let result = resolve_with_bonus(5, 1, 10, true, 3);
        assert_eq!(result.bonus, 4);
        assert!(!result.passed);
    }

    #[test]
    fn test_rng_d20_range() {
        let mut d20 = RngD20::from_entropy();
        for _ in 0..200 {
            let draw = d20.roll();
            assert!((D20_MIN..=D20_MAX).contains(&draw));
        }
    }

    #[test]
    fn test_seeded_d20_is_reproducible() {
        let mut a = RngD20::seeded(42);
        let mut b = RngD20::seeded(42);
        let first: Vec<u8> = (0..10).map(|_| a.roll()).collect();
        let second: Vec<u8> = (0..10).map(|_| b.roll()).collect();
        assert_eq!(first, second);
    }
}
