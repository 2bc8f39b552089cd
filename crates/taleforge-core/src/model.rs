//! Persisted game records consumed and produced by the engine.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Capacity of the campaign's recent-event ring buffer.
pub const RECENT_EVENT_CAPACITY: usize = 20;

/// Experience points needed per character level.
pub const XP_PER_LEVEL: u32 = 1000;

/// A campaign and its free-form settings blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    /// Campaign identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Settings stored as a JSON blob.
    pub settings: CampaignSettings,
}

/// JSON settings attached to a campaign.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignSettings {
    /// World/tone description shown to the narrator.
    pub setting: Option<String>,
    /// Where the party currently is.
    pub current_location: Option<String>,
    /// In-world clock, e.g. "Day 3, 14:00".
    pub game_time: Option<String>,
    /// Rolling summaries of earlier sessions.
    pub summaries: Vec<String>,
    /// Most recent notable events, oldest first.
    pub recent_events: VecDeque<String>,
}

impl CampaignSettings {
    /// Pushes an event into the ring buffer, evicting the oldest entries past
    /// [`RECENT_EVENT_CAPACITY`].
    pub fn record_event(&mut self, event: impl Into<String>) {
        self.recent_events.push_back(event.into());
        while self.recent_events.len() > RECENT_EVENT_CAPACITY {
            self.recent_events.pop_front();
        }
    }
}

/// A single inventory line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Item name as first recorded.
    pub name: String,
    /// Stack size, always at least 1.
    pub quantity: u32,
    /// Optional flavour text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A player character record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    /// Character identifier.
    pub id: Uuid,
    /// Owning campaign.
    pub campaign_id: Uuid,
    /// Character name.
    pub name: String,
    /// Class, e.g. "Ranger".
    #[serde(default)]
    pub class: String,
    /// Race/ancestry.
    #[serde(default)]
    pub race: String,
    /// Current level, derived from `xp`.
    pub level: u32,
    /// Accumulated experience points.
    pub xp: u32,
    /// Current hit points, within `[0, max_hp]`.
    pub hp: i32,
    /// Maximum hit points.
    pub max_hp: i32,
    /// Armor class.
    pub ac: i32,
    /// Dexterity score.
    pub dexterity: i32,
    /// Gold pieces.
    pub gold: i64,
    /// Inventory lines, unique by case-insensitive name.
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
}

/// Result of an XP award.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpAward {
    /// XP after the award.
    pub xp: u32,
    /// Level before the award.
    pub previous_level: u32,
    /// Level after the award.
    pub level: u32,
    /// Whether the award crossed a level threshold.
    pub leveled_up: bool,
}

/// Level for a given XP total.
#[must_use]
pub fn level_for_xp(xp: u32) -> u32 {
    xp / XP_PER_LEVEL + 1
}

impl Character {
    /// Sets hit points, clamped into `[0, max_hp]`. Returns the applied value.
    pub fn set_hp(&mut self, hp: i32) -> i32 {
        self.hp = hp.clamp(0, self.max_hp.max(0));
        self.hp
    }

    /// Adds `quantity` of an item, merging with an existing line matched
    /// case-insensitively. Returns the new stack size.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for an empty name or zero quantity.
    pub fn add_item(
        &mut self,
        name: &str,
        quantity: u32,
        description: Option<String>,
    ) -> Result<u32, DomainError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::Validation("item name must not be empty".into()));
        }
        if quantity == 0 {
            return Err(DomainError::Validation("quantity must be at least 1".into()));
        }
        if let Some(line) = self.find_item_mut(name) {
            line.quantity = line.quantity.saturating_add(quantity);
            if line.description.is_none() {
                line.description = description;
            }
            return Ok(line.quantity);
        }
        self.inventory.push(InventoryItem {
            name: name.to_owned(),
            quantity,
            description,
        });
        Ok(quantity)
    }

    /// Removes `quantity` of an item. The line disappears when it reaches zero.
    /// Returns the remaining stack size.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the item is missing or the stack is
    /// smaller than `quantity`.
    pub fn remove_item(&mut self, name: &str, quantity: u32) -> Result<u32, DomainError> {
        let key = name.trim().to_lowercase();
        let idx = self
            .inventory
            .iter()
            .position(|i| i.name.to_lowercase() == key)
            .ok_or_else(|| {
                DomainError::Validation(format!("{} does not carry {}", self.name, name.trim()))
            })?;
        let line = &mut self.inventory[idx];
        if line.quantity < quantity {
            return Err(DomainError::Validation(format!(
                "{} only carries {} {}",
                self.name, line.quantity, line.name
            )));
        }
        line.quantity -= quantity;
        let remaining = line.quantity;
        if remaining == 0 {
            self.inventory.remove(idx);
        }
        Ok(remaining)
    }

    /// Adjusts gold by a signed amount. Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the balance would go negative.
    pub fn adjust_gold(&mut self, amount: i64) -> Result<i64, DomainError> {
        let next = self.gold.saturating_add(amount);
        if next < 0 {
            return Err(DomainError::Validation(format!(
                "{} has only {} gold",
                self.name, self.gold
            )));
        }
        self.gold = next;
        Ok(next)
    }

    /// Awards experience and recomputes the level.
    pub fn award_xp(&mut self, amount: u32) -> XpAward {
        let previous_level = self.level;
        self.xp = self.xp.saturating_add(amount);
        self.level = level_for_xp(self.xp).max(previous_level);
        XpAward {
            xp: self.xp,
            previous_level,
            level: self.level,
            leveled_up: self.level > previous_level,
        }
    }

    fn find_item_mut(&mut self, name: &str) -> Option<&mut InventoryItem> {
        let key = name.to_lowercase();
        self.inventory
            .iter_mut()
            .find(|i| i.name.to_lowercase() == key)
    }
}

/// Net change a turn made to one character.
///
/// Replayed onto the latest stored record at commit time, so writes made by
/// others while the turn was running (combat damage) are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacterDelta {
    /// Character the change belongs to.
    pub character_id: Uuid,
    /// Signed hit point change.
    pub hp: i32,
    /// Signed gold change.
    pub gold: i64,
    /// Experience gained.
    pub xp: u32,
    /// Signed stack changes, keyed case-insensitively by item name.
    pub items: Vec<ItemChange>,
}

/// Signed change to one inventory line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemChange {
    /// Item name as staged.
    pub name: String,
    /// Signed quantity change.
    pub quantity: i64,
    /// Description carried by a newly added line.
    pub description: Option<String>,
}

impl CharacterDelta {
    /// What changed between `before` and `after`.
    #[must_use]
    pub fn between(before: &Character, after: &Character) -> Self {
        let quantity_of = |character: &Character, key: &str| {
            character
                .inventory
                .iter()
                .find(|i| i.name.to_lowercase() == key)
                .map_or(0, |i| i64::from(i.quantity))
        };
        let mut items: Vec<ItemChange> = Vec::new();
        for item in before.inventory.iter().chain(&after.inventory) {
            let key = item.name.to_lowercase();
            if items.iter().any(|c| c.name.to_lowercase() == key) {
                continue;
            }
            let quantity = quantity_of(after, &key) - quantity_of(before, &key);
            if quantity != 0 {
                items.push(ItemChange {
                    name: item.name.clone(),
                    quantity,
                    description: item.description.clone(),
                });
            }
        }
        Self {
            character_id: after.id,
            hp: after.hp.saturating_sub(before.hp),
            gold: after.gold.saturating_sub(before.gold),
            xp: after.xp.saturating_sub(before.xp),
            items,
        }
    }

    /// Whether the delta changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hp == 0 && self.gold == 0 && self.xp == 0 && self.items.is_empty()
    }

    /// Replays the change onto `character`. HP is clamped, gold never drops
    /// below zero and removals stop at an empty stack.
    pub fn apply_to(&self, character: &mut Character) {
        character.set_hp(character.hp.saturating_add(self.hp));
        character.gold = character.gold.saturating_add(self.gold).max(0);
        if self.xp > 0 {
            character.award_xp(self.xp);
        }
        for change in &self.items {
            let key = change.name.to_lowercase();
            let line = character
                .inventory
                .iter()
                .position(|i| i.name.to_lowercase() == key);
            let current = line.map_or(0, |idx| i64::from(character.inventory[idx].quantity));
            let next = u32::try_from(current.saturating_add(change.quantity).max(0))
                .unwrap_or(u32::MAX);
            match line {
                Some(idx) if next == 0 => {
                    character.inventory.remove(idx);
                }
                Some(idx) => character.inventory[idx].quantity = next,
                None if next > 0 => character.inventory.push(InventoryItem {
                    name: change.name.clone(),
                    quantity: next,
                    description: change.description.clone(),
                }),
                None => {}
            }
        }
    }
}

/// Quest lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    /// In progress.
    Active,
    /// Finished successfully.
    Completed,
    /// Abandoned or failed.
    Failed,
}

impl FromStr for QuestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" | "in_progress" | "started" => Ok(Self::Active),
            "completed" | "complete" | "done" => Ok(Self::Completed),
            "failed" | "abandoned" => Ok(Self::Failed),
            other => Err(DomainError::Validation(format!("unknown quest status: {other}"))),
        }
    }
}

/// A quest record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    /// Quest identifier.
    pub id: Uuid,
    /// Owning campaign.
    pub campaign_id: Uuid,
    /// Title, unique per campaign (case-insensitive).
    pub title: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Current status.
    pub status: QuestStatus,
    /// Objectives, in the order they were revealed.
    #[serde(default)]
    pub objectives: Vec<String>,
}

/// Kinds of world entity the narrator can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Non-player character.
    Npc,
    /// Place.
    Location,
    /// Notable object.
    Item,
    /// Organisation.
    Faction,
    /// Monster or beast.
    Creature,
}

impl EntityType {
    /// Lowercase wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Npc => "npc",
            Self::Location => "location",
            Self::Item => "item",
            Self::Faction => "faction",
            Self::Creature => "creature",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "npc" | "character" | "person" => Ok(Self::Npc),
            "location" | "place" => Ok(Self::Location),
            "item" | "object" => Ok(Self::Item),
            "faction" | "organization" | "organisation" => Ok(Self::Faction),
            "creature" | "monster" => Ok(Self::Creature),
            other => Err(DomainError::Validation(format!("unknown entity type: {other}"))),
        }
    }
}

/// A world entity keyed by campaign + canonical name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldEntity {
    /// Entity identifier.
    pub id: Uuid,
    /// Owning campaign.
    pub campaign_id: Uuid,
    /// Deduplication key, see [`crate::canonical`].
    pub canonical_name: String,
    /// Display name as last written.
    pub name: String,
    /// Kind of entity.
    pub entity_type: EntityType,
    /// Accumulated description.
    #[serde(default)]
    pub description: String,
    /// Last write time.
    pub updated_at: DateTime<Utc>,
}

impl WorldEntity {
    /// Appends new information to the description unless it is already
    /// contained in it (case-insensitively). Returns whether anything changed.
    pub fn absorb_description(&mut self, addition: &str) -> bool {
        let addition = addition.trim();
        if addition.is_empty() {
            return false;
        }
        let existing = self.description.trim();
        if existing.is_empty() {
            self.description = addition.to_owned();
        } else if existing.to_lowercase().contains(&addition.to_lowercase()) {
            return false;
        } else {
            self.description = format!("{existing} {addition}");
        }
        true
    }
}

/// A chat session; at most one is active per campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    /// Session identifier.
    pub id: Uuid,
    /// Owning campaign.
    pub campaign_id: Uuid,
    /// Whether new turns are logged here.
    pub active: bool,
    /// Session start.
    pub started_at: DateTime<Utc>,
}

/// Who produced a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    /// A player's action.
    Player,
    /// Narrator output.
    Narrator,
    /// System notices.
    System,
}

impl ChatRole {
    /// Lowercase wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Narrator => "narrator",
            Self::System => "system",
        }
    }
}

/// A logged chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Turn identifier.
    pub id: Uuid,
    /// Owning session.
    pub session_id: Uuid,
    /// Producer.
    pub role: ChatRole,
    /// Text content.
    pub content: String,
    /// Speaker name shown in the transcript.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    /// Reference to generated narration audio, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_ref: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}
