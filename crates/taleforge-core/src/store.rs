//! Persistence contract.
//!
//! The engine treats persistence as a keyed store with CRUD operations over
//! campaigns, characters, quests, world entities, chat sessions and the
//! durable combat mirror. Writes produced by a narrative turn are grouped in
//! a [`StateChanges`] and committed atomically.

use async_trait::async_trait;
use uuid::Uuid;

use crate::combat::CombatState;
use crate::error::DomainError;
use crate::model::{Campaign, Character, ChatSession, ChatTurn, Quest, WorldEntity};

/// A write to a campaign's durable combat mirror.
#[derive(Debug, Clone, PartialEq)]
pub enum CombatWrite {
    /// Insert or replace the mirror.
    Save {
        /// Campaign the encounter belongs to.
        campaign_id: Uuid,
        /// Encounter to store.
        state: CombatState,
    },
    /// Remove the mirror.
    Clear {
        /// Campaign the encounter belonged to.
        campaign_id: Uuid,
    },
}

/// A batch of writes that must commit together or not at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateChanges {
    /// Updated campaign (settings blob).
    pub campaign: Option<Campaign>,
    /// Upserted characters.
    pub characters: Vec<Character>,
    /// Upserted quests.
    pub quests: Vec<Quest>,
    /// Upserted world entities, keyed by campaign + canonical name.
    pub world_entities: Vec<WorldEntity>,
    /// Chat turns to append.
    pub chat_turns: Vec<ChatTurn>,
    /// Combat mirror change.
    pub combat: Option<CombatWrite>,
}

impl StateChanges {
    /// Whether the batch contains no writes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.campaign.is_none()
            && self.characters.is_empty()
            && self.quests.is_empty()
            && self.world_entities.is_empty()
            && self.chat_turns.is_empty()
            && self.combat.is_none()
    }
}

/// Keyed store consumed by the engine.
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Loads a campaign.
    async fn load_campaign(&self, id: Uuid) -> Result<Option<Campaign>, DomainError>;

    /// Inserts or replaces a campaign.
    async fn save_campaign(&self, campaign: &Campaign) -> Result<(), DomainError>;

    /// Loads a character.
    async fn load_character(&self, id: Uuid) -> Result<Option<Character>, DomainError>;

    /// All characters in a campaign, ordered by name.
    async fn party(&self, campaign_id: Uuid) -> Result<Vec<Character>, DomainError>;

    /// All quests in a campaign.
    async fn quests(&self, campaign_id: Uuid) -> Result<Vec<Quest>, DomainError>;

    /// Looks a world entity up by canonical name.
    async fn find_world_entity(
        &self,
        campaign_id: Uuid,
        canonical_name: &str,
    ) -> Result<Option<WorldEntity>, DomainError>;

    /// All world entities in a campaign.
    async fn world_entities(&self, campaign_id: Uuid) -> Result<Vec<WorldEntity>, DomainError>;

    /// The campaign's active chat session, if any.
    async fn active_session(&self, campaign_id: Uuid) -> Result<Option<ChatSession>, DomainError>;

    /// Starts a new active session, deactivating any previous one.
    async fn start_session(&self, session: &ChatSession) -> Result<(), DomainError>;

    /// The last `limit` turns of a session, oldest first.
    async fn recent_turns(&self, session_id: Uuid, limit: usize)
    -> Result<Vec<ChatTurn>, DomainError>;

    /// Loads the durable combat mirror.
    async fn load_combat(&self, campaign_id: Uuid) -> Result<Option<CombatState>, DomainError>;

    /// Writes the durable combat mirror.
    async fn save_combat(&self, campaign_id: Uuid, state: &CombatState)
    -> Result<(), DomainError>;

    /// Removes the durable combat mirror.
    async fn clear_combat(&self, campaign_id: Uuid) -> Result<(), DomainError>;

    /// Commits a batch of writes atomically.
    async fn apply_changes(&self, changes: StateChanges) -> Result<(), DomainError>;
}
