//! Initiative rolls and turn ordering.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use taleforge_core::combat::{CombatState, Combatant, DamageType};
use taleforge_core::dice::{ability_modifier, roll_d20};
use taleforge_core::rng::DeterministicRng;
use uuid::Uuid;

use crate::error::CombatError;

/// Largest group a single enemy entry may expand into.
pub const MAX_GROUP_SIZE: u32 = 20;

fn default_dexterity() -> i32 {
    10
}

/// A combatant as described by a client or a tool call, before initiative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatantSpec {
    /// Identifier; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Display name.
    pub name: String,
    /// Starting hit points.
    pub hp: i32,
    /// Maximum hit points; defaults to `hp`.
    #[serde(default)]
    pub max_hp: Option<i32>,
    /// Armor class.
    pub ac: i32,
    /// Dexterity score.
    #[serde(default = "default_dexterity")]
    pub dexterity: i32,
    /// Player-controlled side.
    #[serde(default)]
    pub is_player: bool,
    /// Level or challenge rating.
    #[serde(default)]
    pub level: Option<u32>,
    /// Number of identical copies.
    #[serde(default)]
    pub quantity: Option<u32>,
    /// Pre-rolled initiative, kept as is.
    #[serde(default)]
    pub initiative: Option<i32>,
    /// Starting conditions.
    #[serde(default)]
    pub conditions: BTreeSet<String>,
    /// Damage types taken at half.
    #[serde(default)]
    pub resistances: BTreeSet<DamageType>,
    /// Damage types taken at double.
    #[serde(default)]
    pub vulnerabilities: BTreeSet<DamageType>,
    /// Damage types ignored.
    #[serde(default)]
    pub immunities: BTreeSet<DamageType>,
}

/// Both sides of a new encounter with initiative already rolled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatStart {
    /// Player side.
    pub players: Vec<Combatant>,
    /// Enemy side.
    pub enemies: Vec<Combatant>,
}

impl CombatStart {
    /// Expands groups and rolls initiative for every combatant. Side flags
    /// follow the list each combatant came in, overriding its own flag.
    pub fn roll(
        players: Vec<CombatantSpec>,
        enemies: Vec<CombatantSpec>,
        rng: &mut dyn DeterministicRng,
    ) -> Self {
        let mut side = |specs: Vec<CombatantSpec>, is_player: bool| -> Vec<Combatant> {
            specs
                .into_iter()
                .flat_map(expand_group)
                .map(|spec| {
                    let mut combatant = roll_initiative(spec, rng);
                    combatant.is_player = is_player;
                    combatant
                })
                .collect()
        };
        let players = side(players, true);
        let enemies = side(enemies, false);
        Self { players, enemies }
    }

    /// Orders both sides into a fresh encounter at round 1.
    ///
    /// # Errors
    ///
    /// Returns `CombatError::NoCombatants` if both sides are empty.
    pub fn into_state(self, rng: &mut dyn DeterministicRng) -> Result<CombatState, CombatError> {
        let mut everyone = self.players;
        everyone.extend(self.enemies);
        if everyone.is_empty() {
            return Err(CombatError::NoCombatants);
        }
        Ok(CombatState::begin(order_turns(everyone, rng)))
    }
}

/// Expands `quantity > 1` into numbered copies ("Goblin 1", "Goblin 2").
#[must_use]
pub fn expand_group(spec: CombatantSpec) -> Vec<CombatantSpec> {
    let count = spec.quantity.unwrap_or(1).clamp(1, MAX_GROUP_SIZE);
    if count == 1 {
        return vec![spec];
    }
    (1..=count)
        .map(|n| CombatantSpec {
            id: spec.id.as_ref().map(|id| format!("{id}-{n}")),
            name: format!("{} {n}", spec.name),
            quantity: Some(count),
            ..spec.clone()
        })
        .collect()
}

/// Builds a combatant, rolling d20 + DEX modifier unless the spec carries
/// an initiative already.
pub fn roll_initiative(spec: CombatantSpec, rng: &mut dyn DeterministicRng) -> Combatant {
    let initiative = spec
        .initiative
        .unwrap_or_else(|| signed(roll_d20(rng)) + ability_modifier(spec.dexterity));
    let max_hp = spec.max_hp.unwrap_or(spec.hp).max(0);
    let mut combatant = Combatant {
        id: spec.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        name: spec.name,
        hp: spec.hp,
        max_hp,
        ac: spec.ac,
        initiative,
        dexterity: spec.dexterity,
        conditions: spec.conditions,
        is_player: spec.is_player,
        level: spec.level,
        quantity: spec.quantity,
        resistances: spec.resistances,
        vulnerabilities: spec.vulnerabilities,
        immunities: spec.immunities,
    };
    combatant.set_hp(spec.hp);
    combatant
}

/// Sorts by initiative (descending), then dexterity score (descending), then
/// a random draw per combatant.
pub fn order_turns(combatants: Vec<Combatant>, rng: &mut dyn DeterministicRng) -> Vec<Combatant> {
    let mut keyed: Vec<(f64, Combatant)> = combatants
        .into_iter()
        .map(|c| (rng.next_f64(), c))
        .collect();
    keyed.sort_by(|(key_a, a), (key_b, b)| {
        b.initiative
            .cmp(&a.initiative)
            .then(b.dexterity.cmp(&a.dexterity))
            .then(key_b.total_cmp(key_a))
    });
    keyed.into_iter().map(|(_, c)| c).collect()
}

pub(crate) fn signed(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use taleforge_test_support::{MockRng, SequenceRng};

    use super::*;

    fn spec(name: &str, dexterity: i32, initiative: Option<i32>) -> CombatantSpec {
        CombatantSpec {
            id: Some(name.to_lowercase()),
            name: name.to_owned(),
            hp: 10,
            max_hp: None,
            ac: 12,
            dexterity,
            is_player: false,
            level: None,
            quantity: None,
            initiative,
            conditions: BTreeSet::new(),
            resistances: BTreeSet::new(),
            vulnerabilities: BTreeSet::new(),
            immunities: BTreeSet::new(),
        }
    }

    #[test]
    fn test_roll_initiative_adds_dex_modifier() {
        let mut rng = SequenceRng::new(vec![12]);

        let combatant = roll_initiative(spec("Aria", 14, None), &mut rng);

        assert_eq!(combatant.initiative, 14);
        assert_eq!(combatant.max_hp, 10);
    }

    #[test]
    fn test_pre_rolled_initiative_is_kept() {
        let mut rng = SequenceRng::new(vec![]);

        let combatant = roll_initiative(spec("Aria", 14, Some(3)), &mut rng);

        assert_eq!(combatant.initiative, 3);
    }

    #[test]
    fn test_order_is_initiative_then_dexterity() {
        let mut rng = SequenceRng::new(vec![]);
        let combatants = vec![
            roll_initiative(spec("Slow", 12, Some(10)), &mut rng),
            roll_initiative(spec("Nimble", 16, Some(10)), &mut rng),
            roll_initiative(spec("Fast", 8, Some(15)), &mut rng),
        ];

        let ordered = order_turns(combatants, &mut rng);

        let names: Vec<&str> = ordered.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Fast", "Nimble", "Slow"]);
        assert!(ordered.windows(2).all(|w| w[0].initiative >= w[1].initiative));
    }

    #[test]
    fn test_full_ties_break_on_random_draw() {
        let mut rng = SequenceRng::with_fractions(vec![], vec![0.2, 0.9]);
        let combatants = vec![
            roll_initiative(spec("Left", 10, Some(10)), &mut MockRng),
            roll_initiative(spec("Right", 10, Some(10)), &mut MockRng),
        ];

        let ordered = order_turns(combatants, &mut rng);

        assert_eq!(ordered[0].name, "Right");
    }

    #[test]
    fn test_groups_expand_into_numbered_copies() {
        let mut goblins = spec("Goblin", 14, None);
        goblins.quantity = Some(3);

        let expanded = expand_group(goblins);

        let names: Vec<&str> = expanded.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Goblin 1", "Goblin 2", "Goblin 3"]);
        let ids: BTreeSet<_> = expanded.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_start_forces_side_flags_and_rejects_empty() {
        let mut rng = SequenceRng::new(vec![10, 5]);
        let mut hero = spec("Hero", 10, None);
        hero.is_player = false;
        let mut ghoul = spec("Ghoul", 10, None);
        ghoul.is_player = true;

        let start = CombatStart::roll(vec![hero], vec![ghoul], &mut rng);

        assert!(start.players[0].is_player);
        assert!(!start.enemies[0].is_player);
        let empty = CombatStart {
            players: Vec::new(),
            enemies: Vec::new(),
        };
        assert!(matches!(
            empty.into_state(&mut rng),
            Err(CombatError::NoCombatants)
        ));
    }
}
