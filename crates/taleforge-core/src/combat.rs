//! Combat state shared between the coordinator, the narrator context and the
//! durable mirror in the store.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Damage types that resistances, vulnerabilities and immunities key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    Acid,
    Bludgeoning,
    Cold,
    Fire,
    Force,
    Lightning,
    Necrotic,
    Piercing,
    Poison,
    Psychic,
    Radiant,
    Slashing,
    Thunder,
}

impl DamageType {
    /// Lowercase wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Acid => "acid",
            Self::Bludgeoning => "bludgeoning",
            Self::Cold => "cold",
            Self::Fire => "fire",
            Self::Force => "force",
            Self::Lightning => "lightning",
            Self::Necrotic => "necrotic",
            Self::Piercing => "piercing",
            Self::Poison => "poison",
            Self::Psychic => "psychic",
            Self::Radiant => "radiant",
            Self::Slashing => "slashing",
            Self::Thunder => "thunder",
        }
    }
}

impl fmt::Display for DamageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DamageType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = serde_json::Value::String(s.trim().to_lowercase());
        serde_json::from_value(value)
            .map_err(|_| DomainError::Validation(format!("unknown damage type: {s}")))
    }
}

/// One participant in an encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Combatant {
    /// Stable identifier; the character id for players.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Current hit points, within `[0, max_hp]`.
    pub hp: i32,
    /// Maximum hit points.
    pub max_hp: i32,
    /// Armor class.
    pub ac: i32,
    /// Rolled initiative.
    pub initiative: i32,
    /// Dexterity score (initiative tie-break).
    pub dexterity: i32,
    /// Active conditions ("prone", "poisoned", ...).
    #[serde(default)]
    pub conditions: BTreeSet<String>,
    /// Player-controlled side.
    pub is_player: bool,
    /// Level or challenge rating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    /// Group size this entry was expanded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
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

impl Combatant {
    /// Sets hit points, clamped into `[0, max_hp]`.
    pub fn set_hp(&mut self, hp: i32) -> i32 {
        self.hp = hp.clamp(0, self.max_hp.max(0));
        self.hp
    }

    /// Whether this combatant is down.
    #[must_use]
    pub fn is_down(&self) -> bool {
        self.hp == 0
    }
}

/// Which side of an encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Player characters and allies.
    Players,
    /// Everyone else.
    Enemies,
}

/// Authoritative state of one encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatState {
    /// 1-based round counter.
    pub round: u32,
    /// Combatants in activation order.
    pub turn_order: Vec<Combatant>,
    /// Index into `turn_order`, always in range while non-empty.
    pub current_turn_index: usize,
    /// False once one side has been eliminated or combat was ended.
    pub active: bool,
}

impl CombatState {
    /// Starts an encounter at round 1 with an already sorted turn order.
    #[must_use]
    pub fn begin(turn_order: Vec<Combatant>) -> Self {
        Self {
            round: 1,
            turn_order,
            current_turn_index: 0,
            active: true,
        }
    }

    /// The combatant whose turn it is.
    #[must_use]
    pub fn current(&self) -> Option<&Combatant> {
        self.turn_order.get(self.current_turn_index)
    }

    /// Advances to the next turn; past the last combatant the round increments
    /// and the index wraps to 0. No combatant is skipped.
    pub fn advance(&mut self) {
        if self.turn_order.is_empty() {
            return;
        }
        self.current_turn_index += 1;
        if self.current_turn_index >= self.turn_order.len() {
            self.current_turn_index = 0;
            self.round += 1;
        }
    }

    /// Looks a combatant up by id.
    #[must_use]
    pub fn combatant(&self, id: &str) -> Option<&Combatant> {
        self.turn_order.iter().find(|c| c.id == id)
    }

    /// Mutable lookup by id.
    pub fn combatant_mut(&mut self, id: &str) -> Option<&mut Combatant> {
        self.turn_order.iter_mut().find(|c| c.id == id)
    }

    /// The surviving side if every combatant on the other side is at 0 HP.
    ///
    /// A side with no members never counts as eliminated.
    #[must_use]
    pub fn victor(&self) -> Option<Side> {
        let eliminated = |player: bool| {
            let mut members = self.turn_order.iter().filter(|c| c.is_player == player);
            let mut any = false;
            let all_down = members.all(|c| {
                any = true;
                c.is_down()
            });
            any && all_down
        };
        if eliminated(false) {
            Some(Side::Players)
        } else if eliminated(true) {
            Some(Side::Enemies)
        } else {
            None
        }
    }
}
