//! The narrator's read-only view of a campaign at the start of a turn.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::combat::CombatState;
use crate::model::{Character, ChatTurn, Quest, WorldEntity};

/// Campaign-level slice of the context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignSnapshot {
    /// Campaign identifier.
    pub id: Uuid,
    /// Campaign name.
    pub name: String,
    /// World/tone description.
    pub setting: Option<String>,
    /// In-world clock.
    pub game_time: Option<String>,
    /// Session summaries.
    pub summaries: Vec<String>,
    /// Recent events, oldest first.
    pub recent_events: Vec<String>,
}

/// Snapshot assembled from the store (and the combat coordinator) before a
/// turn. The orchestrator never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DmContext {
    /// Campaign metadata.
    pub campaign: CampaignSnapshot,
    /// The character taking the action.
    pub character: Character,
    /// Everyone else in the party.
    pub party: Vec<Character>,
    /// Current location name.
    pub location: Option<String>,
    /// Active quests.
    pub quests: Vec<Quest>,
    /// Known NPCs.
    pub npcs: Vec<WorldEntity>,
    /// Other known entities (locations, factions, items, creatures).
    pub lore: Vec<WorldEntity>,
    /// Encounter state if combat is running.
    pub combat: Option<CombatState>,
    /// Recent chat turns, oldest first.
    pub recent_turns: Vec<ChatTurn>,
}

impl DmContext {
    /// Whether an encounter is currently active.
    #[must_use]
    pub fn in_combat(&self) -> bool {
        self.combat.as_ref().is_some_and(|c| c.active)
    }
}
