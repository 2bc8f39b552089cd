//! Attack resolution: the d20 roll, criticals, damage and damage-type
//! adjustments.

use serde::{Deserialize, Serialize};
use taleforge_core::combat::{CombatState, Combatant, DamageType};
use taleforge_core::dice::{DiceExpr, roll_d20};
use taleforge_core::rng::DeterministicRng;

use crate::domain::initiative::signed;
use crate::error::CombatError;

/// How the attack d20 is rolled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollMode {
    /// One d20.
    #[default]
    Normal,
    /// Two d20, keep the higher.
    Advantage,
    /// Two d20, keep the lower.
    Disadvantage,
}

/// An attack as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackRequest {
    /// Acting combatant; must hold the current turn.
    pub attacker_id: String,
    /// Target combatant.
    pub target_id: String,
    /// Attack bonus added to the d20.
    #[serde(default)]
    pub attack_bonus: i32,
    /// Armor class to beat; defaults to the target's own AC.
    #[serde(default)]
    pub target_ac: Option<i32>,
    /// Damage notation, e.g. `1d8+3`.
    pub damage_dice: String,
    /// Damage type for resistances, vulnerabilities and immunities.
    #[serde(default)]
    pub damage_type: Option<DamageType>,
    /// Advantage or disadvantage.
    #[serde(default)]
    pub roll_mode: RollMode,
}

/// Which damage-type rule changed the raw damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageAdjustment {
    /// Halved, rounded down.
    Resisted,
    /// Doubled.
    Vulnerable,
    /// Reduced to zero.
    Immune,
}

/// Everything a client needs to render an attack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackOutcome {
    /// Acting combatant.
    pub attacker_id: String,
    /// Target combatant.
    pub target_id: String,
    /// Every d20 rolled (two under advantage/disadvantage).
    pub attack_rolls: Vec<u32>,
    /// The d20 that counted.
    pub natural: u32,
    /// `natural + attack_bonus`.
    pub attack_total: i32,
    /// Armor class the attack was compared to.
    pub target_ac: i32,
    /// Whether the attack hit.
    pub hit: bool,
    /// Natural 20.
    pub critical: bool,
    /// Individual damage dice.
    pub damage_rolls: Vec<u32>,
    /// Damage before damage-type rules.
    pub raw_damage: i32,
    /// Damage actually applied.
    pub damage: i32,
    /// Damage type, if any.
    pub damage_type: Option<DamageType>,
    /// Rule that changed the damage.
    pub adjustment: Option<DamageAdjustment>,
    /// Target hit points after the attack.
    pub target_hp: i32,
    /// Target maximum hit points.
    pub target_max_hp: i32,
}

/// Resolves `request` against `state`, mutating the target's HP.
///
/// A natural 20 always hits as a critical and a natural 1 always misses,
/// whatever the bonus and AC. Critical hits roll the damage dice twice as
/// many times; the flat modifier is added once. Turn ownership is checked by
/// the caller.
///
/// # Errors
///
/// Returns `CombatError::UnknownCombatant` for an attacker or target outside
/// the turn order and `CombatError::InvalidDice` for bad damage notation.
pub fn resolve_attack(
    state: &mut CombatState,
    request: &AttackRequest,
    rng: &mut dyn DeterministicRng,
) -> Result<AttackOutcome, CombatError> {
    if state.combatant(&request.attacker_id).is_none() {
        return Err(CombatError::UnknownCombatant(request.attacker_id.clone()));
    }
    let damage_expr: DiceExpr = request
        .damage_dice
        .parse()
        .map_err(|_| CombatError::InvalidDice(request.damage_dice.clone()))?;
    let target = state
        .combatant_mut(&request.target_id)
        .ok_or_else(|| CombatError::UnknownCombatant(request.target_id.clone()))?;

    let attack_rolls = match request.roll_mode {
        RollMode::Normal => vec![roll_d20(rng)],
        RollMode::Advantage | RollMode::Disadvantage => vec![roll_d20(rng), roll_d20(rng)],
    };
    let natural = match request.roll_mode {
        RollMode::Disadvantage => attack_rolls.iter().copied().min(),
        _ => attack_rolls.iter().copied().max(),
    }
    .unwrap_or(1);

    let target_ac = request.target_ac.unwrap_or(target.ac);
    let attack_total = signed(natural).saturating_add(request.attack_bonus);
    let critical = natural == 20;
    let hit = match natural {
        20 => true,
        1 => false,
        _ => attack_total >= target_ac,
    };

    let (damage_rolls, raw_damage, damage, adjustment) = if hit {
        let expr = if critical {
            damage_expr.with_doubled_dice()
        } else {
            damage_expr
        };
        let roll = expr.roll(rng);
        let raw = roll.total.max(0);
        let (applied, adjustment) = adjust_damage(raw, request.damage_type, target);
        let hp = target.hp;
        target.set_hp(hp.saturating_sub(applied));
        (roll.rolls, raw, applied, adjustment)
    } else {
        (Vec::new(), 0, 0, None)
    };

    Ok(AttackOutcome {
        attacker_id: request.attacker_id.clone(),
        target_id: request.target_id.clone(),
        attack_rolls,
        natural,
        attack_total,
        target_ac,
        hit,
        critical,
        damage_rolls,
        raw_damage,
        damage,
        damage_type: request.damage_type,
        adjustment,
        target_hp: target.hp,
        target_max_hp: target.max_hp,
    })
}

/// Applies immunity, resistance and vulnerability for `damage_type`.
///
/// Immunity wins outright. Resistance and vulnerability together cancel out.
#[must_use]
pub fn adjust_damage(
    raw: i32,
    damage_type: Option<DamageType>,
    target: &Combatant,
) -> (i32, Option<DamageAdjustment>) {
    let Some(kind) = damage_type else {
        return (raw, None);
    };
    if target.immunities.contains(&kind) {
        return (0, Some(DamageAdjustment::Immune));
    }
    match (
        target.resistances.contains(&kind),
        target.vulnerabilities.contains(&kind),
    ) {
        (true, false) => (raw.div_euclid(2), Some(DamageAdjustment::Resisted)),
        (false, true) => (raw.saturating_mul(2), Some(DamageAdjustment::Vulnerable)),
        _ => (raw, None),
    }
}
