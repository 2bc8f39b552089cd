//! Test stores.

use async_trait::async_trait;
use taleforge_core::combat::CombatState;
use taleforge_core::error::DomainError;
use taleforge_core::memory_store::InMemoryGameStore;
use taleforge_core::model::{Campaign, Character, ChatSession, ChatTurn, Quest, WorldEntity};
use taleforge_core::store::{GameStore, StateChanges};
use uuid::Uuid;

/// Reads delegate to an in-memory store; every write fails with
/// `DomainError::Infrastructure`.
#[derive(Debug, Default)]
pub struct FailingGameStore {
    inner: InMemoryGameStore,
}

impl FailingGameStore {
    /// Wrap an already-seeded store.
    #[must_use]
    pub fn new(inner: InMemoryGameStore) -> Self {
        Self { inner }
    }

    /// The wrapped store, for assertions.
    #[must_use]
    pub fn inner(&self) -> &InMemoryGameStore {
        &self.inner
    }
}

fn write_failed() -> DomainError {
    DomainError::Infrastructure("connection refused".into())
}

#[async_trait]
impl GameStore for FailingGameStore {
    async fn load_campaign(&self, id: Uuid) -> Result<Option<Campaign>, DomainError> {
        self.inner.load_campaign(id).await
    }

    async fn save_campaign(&self, _campaign: &Campaign) -> Result<(), DomainError> {
        Err(write_failed())
    }

    async fn load_character(&self, id: Uuid) -> Result<Option<Character>, DomainError> {
        self.inner.load_character(id).await
    }

    async fn party(&self, campaign_id: Uuid) -> Result<Vec<Character>, DomainError> {
        self.inner.party(campaign_id).await
    }

    async fn quests(&self, campaign_id: Uuid) -> Result<Vec<Quest>, DomainError> {
        self.inner.quests(campaign_id).await
    }

    async fn find_world_entity(
        &self,
        campaign_id: Uuid,
        canonical_name: &str,
    ) -> Result<Option<WorldEntity>, DomainError> {
        self.inner.find_world_entity(campaign_id, canonical_name).await
    }

    async fn world_entities(&self, campaign_id: Uuid) -> Result<Vec<WorldEntity>, DomainError> {
        self.inner.world_entities(campaign_id).await
    }

    async fn active_session(&self, campaign_id: Uuid) -> Result<Option<ChatSession>, DomainError> {
        self.inner.active_session(campaign_id).await
    }

    async fn start_session(&self, _session: &ChatSession) -> Result<(), DomainError> {
        Err(write_failed())
    }

    async fn recent_turns(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ChatTurn>, DomainError> {
        self.inner.recent_turns(session_id, limit).await
    }

    async fn load_combat(&self, campaign_id: Uuid) -> Result<Option<CombatState>, DomainError> {
        self.inner.load_combat(campaign_id).await
    }

    async fn save_combat(
        &self,
        _campaign_id: Uuid,
        _state: &CombatState,
    ) -> Result<(), DomainError> {
        Err(write_failed())
    }

    async fn clear_combat(&self, _campaign_id: Uuid) -> Result<(), DomainError> {
        Err(write_failed())
    }

    async fn apply_changes(&self, _changes: StateChanges) -> Result<(), DomainError> {
        Err(write_failed())
    }
}
