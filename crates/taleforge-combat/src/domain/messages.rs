//! Wire messages of the combat protocol.
//!
//! Inbound commands and outbound events are internally tagged by `type`
//! (`combat:start`, `combat:state`, ...) with camelCase fields.

use serde::{Deserialize, Serialize};
use taleforge_core::combat::{CombatState, Side};

use crate::domain::attack::{AttackOutcome, AttackRequest};
use crate::domain::initiative::CombatantSpec;
use crate::error::CombatError;

/// A message consumed by the coordinator's transition function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum CombatCommand {
    /// Start an encounter; initiative is rolled server-side.
    #[serde(rename = "combat:start")]
    Start {
        /// Player side.
        #[serde(default)]
        players: Vec<CombatantSpec>,
        /// Enemy side.
        #[serde(default)]
        enemies: Vec<CombatantSpec>,
    },

    /// Resolve an attack by the current turn holder.
    #[serde(rename = "combat:attack")]
    Attack(AttackRequest),

    /// Advance to the next turn.
    #[serde(rename = "combat:next-turn")]
    NextTurn,

    /// End the encounter manually.
    #[serde(rename = "combat:end")]
    End,
}

/// A message the coordinator emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum CombatEvent {
    /// Full encounter snapshot.
    #[serde(rename = "combat:state")]
    State(CombatState),

    /// Result of an attack.
    #[serde(rename = "combat:attack-result")]
    AttackResult(AttackOutcome),

    /// A combatant's hit points changed.
    #[serde(rename = "combat:hp-updated")]
    HpUpdated {
        /// Affected combatant.
        combatant_id: String,
        /// New hit points.
        hp: i32,
        /// Maximum hit points.
        max_hp: i32,
    },

    /// The encounter is over.
    #[serde(rename = "combat:ended")]
    Ended {
        /// Surviving side; `None` when ended manually.
        victor: Option<Side>,
        /// Round in which combat ended.
        round: u32,
    },

    /// A rejected command; delivered only to the sender.
    #[serde(rename = "combat:error")]
    Error {
        /// Machine-readable code.
        code: String,
        /// Human-readable message.
        message: String,
    },
}

impl CombatEvent {
    /// Whether this event goes to the whole campaign or only the sender.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        !matches!(self, Self::Error { .. })
    }
}

impl From<&CombatError> for CombatEvent {
    fn from(error: &CombatError) -> Self {
        Self::Error {
            code: error.code().to_owned(),
            message: error.to_string(),
        }
    }
}
