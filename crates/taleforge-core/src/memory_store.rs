//! In-process `GameStore` used when no database is configured and in tests.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::combat::CombatState;
use crate::error::DomainError;
use crate::model::{Campaign, Character, ChatSession, ChatTurn, Quest, WorldEntity};
use crate::store::{CombatWrite, GameStore, StateChanges};

#[derive(Debug, Default)]
struct Tables {
    campaigns: HashMap<Uuid, Campaign>,
    characters: HashMap<Uuid, Character>,
    quests: HashMap<Uuid, Quest>,
    world_entities: HashMap<(Uuid, String), WorldEntity>,
    sessions: HashMap<Uuid, ChatSession>,
    turns: Vec<ChatTurn>,
    combat: HashMap<Uuid, CombatState>,
}

/// A `GameStore` backed by hash maps behind a single lock.
///
/// The lock is never held across an await point, so `apply_changes` is
/// atomic with respect to every other call.
#[derive(Debug, Default)]
pub struct InMemoryGameStore {
    tables: RwLock<Tables>,
}

impl InMemoryGameStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, DomainError> {
        self.tables
            .read()
            .map_err(|e| DomainError::Infrastructure(format!("store lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, DomainError> {
        self.tables
            .write()
            .map_err(|e| DomainError::Infrastructure(format!("store lock poisoned: {e}")))
    }

    /// Seeds a character (fixtures, admin tooling).
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the lock is poisoned.
    pub fn insert_character(&self, character: Character) -> Result<(), DomainError> {
        self.write()?.characters.insert(character.id, character);
        Ok(())
    }

    /// Seeds a quest.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the lock is poisoned.
    pub fn insert_quest(&self, quest: Quest) -> Result<(), DomainError> {
        self.write()?.quests.insert(quest.id, quest);
        Ok(())
    }

    /// All turns ever logged for a session, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the lock is poisoned.
    pub fn session_turns(&self, session_id: Uuid) -> Result<Vec<ChatTurn>, DomainError> {
        Ok(self
            .read()?
            .turns
            .iter()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl GameStore for InMemoryGameStore {
    async fn load_campaign(&self, id: Uuid) -> Result<Option<Campaign>, DomainError> {
        Ok(self.read()?.campaigns.get(&id).cloned())
    }

    async fn save_campaign(&self, campaign: &Campaign) -> Result<(), DomainError> {
        self.write()?
            .campaigns
            .insert(campaign.id, campaign.clone());
        Ok(())
    }

    async fn load_character(&self, id: Uuid) -> Result<Option<Character>, DomainError> {
        Ok(self.read()?.characters.get(&id).cloned())
    }

    async fn party(&self, campaign_id: Uuid) -> Result<Vec<Character>, DomainError> {
        let mut party: Vec<Character> = self
            .read()?
            .characters
            .values()
            .filter(|c| c.campaign_id == campaign_id)
            .cloned()
            .collect();
        party.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(party)
    }

    async fn quests(&self, campaign_id: Uuid) -> Result<Vec<Quest>, DomainError> {
        let mut quests: Vec<Quest> = self
            .read()?
            .quests
            .values()
            .filter(|q| q.campaign_id == campaign_id)
            .cloned()
            .collect();
        quests.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(quests)
    }

    async fn find_world_entity(
        &self,
        campaign_id: Uuid,
        canonical_name: &str,
    ) -> Result<Option<WorldEntity>, DomainError> {
        Ok(self
            .read()?
            .world_entities
            .get(&(campaign_id, canonical_name.to_owned()))
            .cloned())
    }

    async fn world_entities(&self, campaign_id: Uuid) -> Result<Vec<WorldEntity>, DomainError> {
        let mut entities: Vec<WorldEntity> = self
            .read()?
            .world_entities
            .values()
            .filter(|e| e.campaign_id == campaign_id)
            .cloned()
            .collect();
        entities.sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));
        Ok(entities)
    }

    async fn active_session(&self, campaign_id: Uuid) -> Result<Option<ChatSession>, DomainError> {
        Ok(self
            .read()?
            .sessions
            .values()
            .find(|s| s.campaign_id == campaign_id && s.active)
            .cloned())
    }

    async fn start_session(&self, session: &ChatSession) -> Result<(), DomainError> {
        let mut tables = self.write()?;
        for existing in tables.sessions.values_mut() {
            if existing.campaign_id == session.campaign_id {
                existing.active = false;
            }
        }
        tables.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn recent_turns(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ChatTurn>, DomainError> {
        let tables = self.read()?;
        let turns: Vec<&ChatTurn> = tables
            .turns
            .iter()
            .filter(|t| t.session_id == session_id)
            .collect();
        let skip = turns.len().saturating_sub(limit);
        Ok(turns.into_iter().skip(skip).cloned().collect())
    }

    async fn load_combat(&self, campaign_id: Uuid) -> Result<Option<CombatState>, DomainError> {
        Ok(self.read()?.combat.get(&campaign_id).cloned())
    }

    async fn save_combat(
        &self,
        campaign_id: Uuid,
        state: &CombatState,
    ) -> Result<(), DomainError> {
        self.write()?.combat.insert(campaign_id, state.clone());
        Ok(())
    }

    async fn clear_combat(&self, campaign_id: Uuid) -> Result<(), DomainError> {
        self.write()?.combat.remove(&campaign_id);
        Ok(())
    }

    async fn apply_changes(&self, changes: StateChanges) -> Result<(), DomainError> {
        let mut tables = self.write()?;
        for turn in &changes.chat_turns {
            if !tables.sessions.contains_key(&turn.session_id) {
                return Err(DomainError::not_found("chat session", turn.session_id));
            }
        }
        if let Some(campaign) = changes.campaign {
            tables.campaigns.insert(campaign.id, campaign);
        }
        for character in changes.characters {
            tables.characters.insert(character.id, character);
        }
        for quest in changes.quests {
            tables.quests.insert(quest.id, quest);
        }
        for entity in changes.world_entities {
            tables
                .world_entities
                .insert((entity.campaign_id, entity.canonical_name.clone()), entity);
        }
        tables.turns.extend(changes.chat_turns);
        match changes.combat {
            Some(CombatWrite::Save { campaign_id, state }) => {
                tables.combat.insert(campaign_id, state);
            }
            Some(CombatWrite::Clear { campaign_id }) => {
                tables.combat.remove(&campaign_id);
            }
            None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::{ChatRole, QuestStatus};

    fn turn(session_id: Uuid, content: &str) -> ChatTurn {
        ChatTurn {
            id: Uuid::new_v4(),
            session_id,
            role: ChatRole::Player,
            content: content.to_owned(),
            speaker: None,
            audio_ref: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_apply_changes_rejects_unknown_session_without_partial_writes() {
        let store = InMemoryGameStore::new();
        let campaign_id = Uuid::new_v4();
        let quest = Quest {
            id: Uuid::new_v4(),
            campaign_id,
            title: "Find the bell".to_owned(),
            description: String::new(),
            status: QuestStatus::Active,
            objectives: Vec::new(),
        };
        let changes = StateChanges {
            quests: vec![quest],
            chat_turns: vec![turn(Uuid::new_v4(), "hello")],
            ..StateChanges::default()
        };

        let result = store.apply_changes(changes).await;

        assert!(result.is_err());
        assert!(store.quests(campaign_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_start_session_deactivates_previous() {
        let store = InMemoryGameStore::new();
        let campaign_id = Uuid::new_v4();
        let first = ChatSession {
            id: Uuid::new_v4(),
            campaign_id,
            active: true,
            started_at: Utc::now(),
        };
        let second = ChatSession {
            id: Uuid::new_v4(),
            ..first.clone()
        };
        store.start_session(&first).await.unwrap();
        store.start_session(&second).await.unwrap();

        let active = store.active_session(campaign_id).await.unwrap().unwrap();
        assert_eq!(active.id, second.id);
    }

    #[tokio::test]
    async fn test_recent_turns_returns_tail_in_order() {
        let store = InMemoryGameStore::new();
        let session = ChatSession {
            id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            active: true,
            started_at: Utc::now(),
        };
        store.start_session(&session).await.unwrap();
        let changes = StateChanges {
            chat_turns: vec![turn(session.id, "one"), turn(session.id, "two"), turn(session.id, "three")],
            ..StateChanges::default()
        };
        store.apply_changes(changes).await.unwrap();

        let tail = store.recent_turns(session.id, 2).await.unwrap();
        let contents: Vec<&str> = tail.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["two", "three"]);
    }

    #[tokio::test]
    async fn test_combat_mirror_commits_with_the_batch() {
        let store = InMemoryGameStore::new();
        let campaign_id = Uuid::new_v4();
        let state = CombatState::begin(Vec::new());

        store
            .apply_changes(StateChanges {
                combat: Some(CombatWrite::Save {
                    campaign_id,
                    state: state.clone(),
                }),
                ..StateChanges::default()
            })
            .await
            .unwrap();
        assert_eq!(store.load_combat(campaign_id).await.unwrap(), Some(state.clone()));

        let rejected = store
            .apply_changes(StateChanges {
                chat_turns: vec![turn(Uuid::new_v4(), "lost")],
                combat: Some(CombatWrite::Clear { campaign_id }),
                ..StateChanges::default()
            })
            .await;
        assert!(rejected.is_err());
        assert_eq!(store.load_combat(campaign_id).await.unwrap(), Some(state));

        store
            .apply_changes(StateChanges {
                combat: Some(CombatWrite::Clear { campaign_id }),
                ..StateChanges::default()
            })
            .await
            .unwrap();
        assert!(store.load_combat(campaign_id).await.unwrap().is_none());
    }
}
