//! Dice notation parsing and rolling.
//!
//! Supports the `NdM+K` family (`d20`, `2d6+3`, `1d8 - 1`, `4`). Every roll
//! goes through a [`DeterministicRng`] so results are reproducible in tests.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::rng::DeterministicRng;

/// Upper bound on dice per expression.
pub const MAX_DICE: u32 = 100;
/// Upper bound on die size.
pub const MAX_SIDES: u32 = 1000;
/// Upper bound on the absolute flat modifier.
pub const MAX_MODIFIER: i32 = 1000;

/// A parsed dice expression: `count` dice with `sides` faces plus a flat modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceExpr {
    /// Number of dice rolled. Zero means a flat value.
    pub count: u32,
    /// Faces per die.
    pub sides: u32,
    /// Flat modifier added to the sum.
    pub modifier: i32,
}

/// Outcome of rolling a [`DiceExpr`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRoll {
    /// Individual die results in roll order.
    pub rolls: Vec<u32>,
    /// Flat modifier applied.
    pub modifier: i32,
    /// Sum of rolls plus modifier.
    pub total: i32,
}

impl DiceExpr {
    /// Same expression with the dice count doubled (critical hits). The flat
    /// modifier is not doubled.
    #[must_use]
    pub fn with_doubled_dice(self) -> Self {
        Self {
            count: self.count.saturating_mul(2),
            ..self
        }
    }

    /// Rolls the expression.
    #[allow(clippy::cast_possible_wrap)]
    pub fn roll(&self, rng: &mut dyn DeterministicRng) -> DiceRoll {
        let rolls: Vec<u32> = (0..self.count)
            .map(|_| rng.next_u32_range(1, self.sides))
            .collect();
        let sum = rolls
            .iter()
            .fold(0_i32, |acc, r| acc.saturating_add(*r as i32));
        DiceRoll {
            total: sum.saturating_add(self.modifier),
            rolls,
            modifier: self.modifier,
        }
    }
}

impl FromStr for DiceExpr {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let compact = compact.to_ascii_lowercase();
        if compact.is_empty() {
            return Err(DomainError::Validation("empty dice notation".to_owned()));
        }
        let invalid = || DomainError::Validation(format!("invalid dice notation: {s}"));

        let Some(d_pos) = compact.find('d') else {
            let modifier = compact.parse::<i32>().map_err(|_| invalid())?;
            check_modifier(modifier, s)?;
            return Ok(Self {
                count: 0,
                sides: 0,
                modifier,
            });
        };

        let count = match &compact[..d_pos] {
            "" => 1,
            n => n.parse::<u32>().map_err(|_| invalid())?,
        };
        let rest = &compact[d_pos + 1..];
        let (sides_str, modifier) = match rest.find(['+', '-']) {
            Some(idx) => {
                let modifier = rest[idx..].parse::<i32>().map_err(|_| invalid())?;
                (&rest[..idx], modifier)
            }
            None => (rest, 0),
        };
        let sides = sides_str.parse::<u32>().map_err(|_| invalid())?;
        check_modifier(modifier, s)?;

        if count == 0 || count > MAX_DICE {
            return Err(DomainError::Validation(format!(
                "dice count must be between 1 and {MAX_DICE}: {s}"
            )));
        }
        if !(2..=MAX_SIDES).contains(&sides) {
            return Err(DomainError::Validation(format!(
                "die size must be between 2 and {MAX_SIDES}: {s}"
            )));
        }
        Ok(Self {
            count,
            sides,
            modifier,
        })
    }
}

fn check_modifier(modifier: i32, notation: &str) -> Result<(), DomainError> {
    if modifier.unsigned_abs() > MAX_MODIFIER.unsigned_abs() {
        return Err(DomainError::Validation(format!(
            "modifier must be within ±{MAX_MODIFIER}: {notation}"
        )));
    }
    Ok(())
}

impl fmt::Display for DiceExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            return write!(f, "{}", self.modifier);
        }
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.modifier {
            0 => Ok(()),
            m if m > 0 => write!(f, "+{m}"),
            m => write!(f, "{m}"),
        }
    }
}

/// Ability modifier for a score: `floor((score - 10) / 2)`.
#[must_use]
pub fn ability_modifier(score: i32) -> i32 {
    score.saturating_sub(10).div_euclid(2)
}

/// Rolls a single d20.
pub fn roll_d20(rng: &mut dyn DeterministicRng) -> u32 {
    rng.next_u32_range(1, 20)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(Vec<u32>, usize);

    impl DeterministicRng for Scripted {
        fn next_u32_range(&mut self, _min: u32, _max: u32) -> u32 {
            let v = self.0[self.1];
            self.1 += 1;
            v
        }

        fn next_f64(&mut self) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_parse_full_notation() {
        let expr: DiceExpr = "2d6+3".parse().unwrap();
        assert_eq!(
            expr,
            DiceExpr {
                count: 2,
                sides: 6,
                modifier: 3
            }
        );
    }

    #[test]
    fn test_parse_implicit_count_and_negative_modifier() {
        let expr: DiceExpr = " D20 - 1 ".parse().unwrap();
        assert_eq!(expr.count, 1);
        assert_eq!(expr.sides, 20);
        assert_eq!(expr.modifier, -1);
    }

    #[test]
    fn test_parse_flat_value() {
        let expr: DiceExpr = "4".parse().unwrap();
        assert_eq!(expr.count, 0);
        assert_eq!(expr.modifier, 4);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("fireball".parse::<DiceExpr>().is_err());
        assert!("0d6".parse::<DiceExpr>().is_err());
        assert!("2d1".parse::<DiceExpr>().is_err());
        assert!("".parse::<DiceExpr>().is_err());
    }

    #[test]
    fn test_roll_sums_dice_and_modifier() {
        let expr: DiceExpr = "3d6+2".parse().unwrap();
        let roll = expr.roll(&mut Scripted(vec![1, 4, 6], 0));
        assert_eq!(roll.rolls, vec![1, 4, 6]);
        assert_eq!(roll.total, 13);
    }

    #[test]
    fn test_parse_rejects_out_of_range_modifier() {
        assert!("1d6+2147483647".parse::<DiceExpr>().is_err());
        assert!("d20-1001".parse::<DiceExpr>().is_err());
        assert!("99999".parse::<DiceExpr>().is_err());
        assert_eq!("1d6+1000".parse::<DiceExpr>().unwrap().modifier, 1000);
    }

    #[test]
    fn test_roll_saturates_instead_of_overflowing() {
        let expr = DiceExpr {
            count: 1,
            sides: 6,
            modifier: i32::MAX,
        };
        let roll = expr.roll(&mut Scripted(vec![6], 0));
        assert_eq!(roll.total, i32::MAX);
    }

    #[test]
    fn test_doubled_dice_keeps_modifier() {
        let expr: DiceExpr = "1d8+3".parse().unwrap();
        let crit = expr.with_doubled_dice();
        assert_eq!(crit.count, 2);
        assert_eq!(crit.modifier, 3);
        assert_eq!(crit.to_string(), "2d8+3");
    }

    #[test]
    fn test_ability_modifier_floors() {
        assert_eq!(ability_modifier(10), 0);
        assert_eq!(ability_modifier(15), 2);
        assert_eq!(ability_modifier(8), -1);
        assert_eq!(ability_modifier(9), -1);
        assert_eq!(ability_modifier(1), -5);
        assert_eq!(ability_modifier(i32::MIN), i32::MIN / 2);
    }
}
