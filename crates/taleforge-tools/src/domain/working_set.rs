//! Staged state that a batch of tool calls mutates.
//!
//! Handlers never write to the store. They change a [`WorkingSet`] loaded at
//! the start of the batch, and the orchestrator commits the resulting
//! [`TurnEffects`] in one `apply_changes` call once the turn has succeeded.
//! The acting character leaves the set as a [`CharacterDelta`] against the
//! snapshot it was loaded from.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use taleforge_combat::domain::initiative::CombatStart;
use taleforge_core::model::{Character, CharacterDelta, Quest, WorldEntity};
use taleforge_core::store::StateChanges;
use uuid::Uuid;

/// Net change to one inventory line over a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryDelta {
    /// Item name as first mentioned this turn.
    pub item: String,
    /// Signed quantity change.
    pub quantity: i64,
}

/// What a batch produced once it is finished.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnEffects {
    /// Writes to commit, apart from the acting character.
    pub changes: StateChanges,
    /// Net change to the acting character.
    pub character: Option<CharacterDelta>,
    /// Inventory changes reported to the client.
    pub inventory_delta: Vec<InventoryDelta>,
    /// Encounter requested by `start_combat`.
    pub combat_start: Option<CombatStart>,
}

/// The acting character, the campaign's quests and world entities, staged.
#[derive(Debug, Clone)]
pub struct WorkingSet {
    campaign_id: Uuid,
    loaded: Character,
    character: Character,
    character_dirty: bool,
    encounter_running: bool,
    quests: Vec<Quest>,
    dirty_quests: BTreeSet<Uuid>,
    entities: HashMap<String, WorldEntity>,
    dirty_entities: BTreeSet<String>,
    inventory_delta: Vec<InventoryDelta>,
    combat_start: Option<CombatStart>,
}

impl WorkingSet {
    /// Stages `character` together with its campaign's quests and entities.
    #[must_use]
    pub fn new(character: Character, quests: Vec<Quest>, entities: Vec<WorldEntity>) -> Self {
        Self {
            campaign_id: character.campaign_id,
            loaded: character.clone(),
            character,
            character_dirty: false,
            encounter_running: false,
            quests,
            dirty_quests: BTreeSet::new(),
            entities: entities
                .into_iter()
                .map(|e| (e.canonical_name.clone(), e))
                .collect(),
            dirty_entities: BTreeSet::new(),
            inventory_delta: Vec::new(),
            combat_start: None,
        }
    }

    /// Marks whether the campaign already has an encounter running.
    #[must_use]
    pub fn with_encounter_running(mut self, running: bool) -> Self {
        self.encounter_running = running;
        self
    }

    /// Whether an encounter was running when the batch was loaded.
    #[must_use]
    pub fn encounter_running(&self) -> bool {
        self.encounter_running
    }

    /// Campaign the batch runs in.
    #[must_use]
    pub fn campaign_id(&self) -> Uuid {
        self.campaign_id
    }

    /// The acting character as currently staged.
    #[must_use]
    pub fn character(&self) -> &Character {
        &self.character
    }

    /// Applies `change` to a copy of the acting character and keeps it only
    /// if `change` succeeds. A failed change leaves the staged record as it
    /// was.
    ///
    /// # Errors
    ///
    /// Returns whatever `change` returns.
    pub fn update_character<T, E>(
        &mut self,
        change: impl FnOnce(&mut Character) -> Result<T, E>,
    ) -> Result<T, E> {
        let mut next = self.character.clone();
        let output = change(&mut next)?;
        if next != self.character {
            self.character = next;
            self.character_dirty = true;
        }
        Ok(output)
    }

    /// Finds a quest by case-insensitive title; marks it for commit.
    pub fn quest_by_title_mut(&mut self, title: &str) -> Option<&mut Quest> {
        let key = title.trim().to_lowercase();
        let quest = self
            .quests
            .iter_mut()
            .find(|q| q.title.trim().to_lowercase() == key)?;
        self.dirty_quests.insert(quest.id);
        Some(quest)
    }

    /// Stages a new quest.
    pub fn insert_quest(&mut self, quest: Quest) {
        self.dirty_quests.insert(quest.id);
        self.quests.push(quest);
    }

    /// Looks a world entity up by canonical key.
    #[must_use]
    pub fn entity(&self, canonical_name: &str) -> Option<&WorldEntity> {
        self.entities.get(canonical_name)
    }

    /// Stages a created or updated world entity.
    pub fn put_entity(&mut self, entity: WorldEntity) {
        self.dirty_entities.insert(entity.canonical_name.clone());
        self.entities.insert(entity.canonical_name.clone(), entity);
    }

    /// Accumulates an inventory change, merging lines case-insensitively.
    pub fn record_inventory(&mut self, item: &str, quantity: i64) {
        let key = item.trim().to_lowercase();
        if let Some(line) = self
            .inventory_delta
            .iter_mut()
            .find(|d| d.item.to_lowercase() == key)
        {
            line.quantity += quantity;
        } else {
            self.inventory_delta.push(InventoryDelta {
                item: item.trim().to_owned(),
                quantity,
            });
        }
    }

    /// Encounter already requested in this batch, if any.
    #[must_use]
    pub fn combat_start(&self) -> Option<&CombatStart> {
        self.combat_start.as_ref()
    }

    /// Records the encounter requested by `start_combat`.
    pub fn set_combat_start(&mut self, start: CombatStart) {
        self.combat_start = Some(start);
    }

    /// Whether anything needs to be committed.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.character_dirty || !self.dirty_quests.is_empty() || !self.dirty_entities.is_empty()
    }

    /// Consumes the batch into the writes to commit and the client-facing
    /// effects. Lines whose net inventory change is zero are dropped.
    #[must_use]
    pub fn into_effects(self) -> TurnEffects {
        let Self {
            loaded,
            character,
            character_dirty,
            quests,
            dirty_quests,
            mut entities,
            dirty_entities,
            mut inventory_delta,
            combat_start,
            ..
        } = self;

        inventory_delta.retain(|d| d.quantity != 0);
        let character = Some(CharacterDelta::between(&loaded, &character))
            .filter(|delta| character_dirty && !delta.is_empty());
        let changes = StateChanges {
            quests: quests
                .into_iter()
                .filter(|q| dirty_quests.contains(&q.id))
                .collect(),
            world_entities: dirty_entities
                .iter()
                .filter_map(|key| entities.remove(key))
                .collect(),
            ..StateChanges::default()
        };
        TurnEffects {
            changes,
            character,
            inventory_delta,
            combat_start,
        }
    }
}
