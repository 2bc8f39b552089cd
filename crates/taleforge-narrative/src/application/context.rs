//! Builds the narrator's view of a campaign.

use std::sync::Arc;

use taleforge_combat::application::coordinator::CombatCoordinator;
use taleforge_core::context::{CampaignSnapshot, DmContext};
use taleforge_core::error::DomainError;
use taleforge_core::model::{EntityType, QuestStatus};
use taleforge_core::store::GameStore;
use uuid::Uuid;

use crate::error::NarrativeError;

/// How many chat turns of the active session are replayed to the model.
pub const RECENT_TURN_LIMIT: usize = 10;

/// Assembles a [`DmContext`] from the store, taking the encounter from the
/// combat coordinator rather than the store's mirror.
pub struct ContextAssembler {
    store: Arc<dyn GameStore>,
    combat: Arc<CombatCoordinator>,
}

impl ContextAssembler {
    /// Creates an assembler.
    pub fn new(store: Arc<dyn GameStore>, combat: Arc<CombatCoordinator>) -> Self {
        Self { store, combat }
    }

    /// Snapshot for `character_id` acting in `campaign_id`.
    ///
    /// # Errors
    ///
    /// Returns `NarrativeError::State` if the campaign or character is
    /// missing, the character belongs to another campaign, or the store
    /// fails.
    pub async fn assemble(
        &self,
        campaign_id: Uuid,
        character_id: Uuid,
    ) -> Result<DmContext, NarrativeError> {
        let campaign = self
            .store
            .load_campaign(campaign_id)
            .await?
            .ok_or_else(|| DomainError::not_found("campaign", campaign_id))?;
        let character = self
            .store
            .load_character(character_id)
            .await?
            .ok_or_else(|| DomainError::not_found("character", character_id))?;
        if character.campaign_id != campaign_id {
            return Err(DomainError::Validation(format!(
                "character {character_id} is not part of campaign {campaign_id}"
            ))
            .into());
        }

        let party = self.store.party(campaign_id).await?;
        let quests = self
            .store
            .quests(campaign_id)
            .await?
            .into_iter()
            .filter(|q| q.status == QuestStatus::Active)
            .collect();
        let (npcs, lore) = self
            .store
            .world_entities(campaign_id)
            .await?
            .into_iter()
            .partition(|e| e.entity_type == EntityType::Npc);
        let recent_turns = match self.store.active_session(campaign_id).await? {
            Some(session) => self.store.recent_turns(session.id, RECENT_TURN_LIMIT).await?,
            None => Vec::new(),
        };
        let combat = self.combat.snapshot(campaign_id).await?;

        let settings = campaign.settings;
        Ok(DmContext {
            campaign: CampaignSnapshot {
                id: campaign.id,
                name: campaign.name,
                setting: settings.setting,
                game_time: settings.game_time,
                summaries: settings.summaries,
                recent_events: settings.recent_events.into_iter().collect(),
            },
            character,
            party,
            location: settings.current_location,
            quests,
            npcs,
            lore,
            combat,
            recent_turns,
        })
    }
}
