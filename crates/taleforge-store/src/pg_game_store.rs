//! `PostgreSQL` implementation of the `GameStore` trait.

use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool};
use sqlx::types::Json;
use uuid::Uuid;

use taleforge_core::combat::CombatState;
use taleforge_core::error::DomainError;
use taleforge_core::model::{
    Campaign, CampaignSettings, Character, ChatSession, ChatTurn, Quest, WorldEntity,
};
use taleforge_core::store::{CombatWrite, GameStore, StateChanges};

#[allow(clippy::needless_pass_by_value)]
fn db_error(e: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("database error: {e}"))
}

async fn upsert_combat<'e>(
    executor: impl PgExecutor<'e>,
    campaign_id: Uuid,
    state: &CombatState,
) -> Result<(), DomainError> {
    sqlx::query(
        "INSERT INTO combat_states (campaign_id, body) VALUES ($1, $2)
         ON CONFLICT (campaign_id) DO UPDATE SET body = EXCLUDED.body, updated_at = NOW()",
    )
    .bind(campaign_id)
    .bind(Json(state))
    .execute(executor)
    .await
    .map_err(db_error)?;
    Ok(())
}

async fn delete_combat<'e>(
    executor: impl PgExecutor<'e>,
    campaign_id: Uuid,
) -> Result<(), DomainError> {
    sqlx::query("DELETE FROM combat_states WHERE campaign_id = $1")
        .bind(campaign_id)
        .execute(executor)
        .await
        .map_err(db_error)?;
    Ok(())
}

/// PostgreSQL-backed game store.
#[derive(Debug, Clone)]
pub struct PgGameStore {
    pool: PgPool,
}

impl PgGameStore {
    /// Creates a new `PgGameStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GameStore for PgGameStore {
    async fn load_campaign(&self, id: Uuid) -> Result<Option<Campaign>, DomainError> {
        let row = sqlx::query_as::<_, (Uuid, String, Json<CampaignSettings>)>(
            "SELECT id, name, settings FROM campaigns WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(|(id, name, Json(settings))| Campaign { id, name, settings }))
    }

    async fn save_campaign(&self, campaign: &Campaign) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO campaigns (id, name, settings) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE
             SET name = EXCLUDED.name, settings = EXCLUDED.settings, updated_at = NOW()",
        )
        .bind(campaign.id)
        .bind(&campaign.name)
        .bind(Json(&campaign.settings))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn load_character(&self, id: Uuid) -> Result<Option<Character>, DomainError> {
        let row = sqlx::query_as::<_, (Json<Character>,)>("SELECT body FROM characters WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.map(|(Json(character),)| character))
    }

    async fn party(&self, campaign_id: Uuid) -> Result<Vec<Character>, DomainError> {
        let rows = sqlx::query_as::<_, (Json<Character>,)>(
            "SELECT body FROM characters WHERE campaign_id = $1 ORDER BY name",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(|(Json(c),)| c).collect())
    }

    async fn quests(&self, campaign_id: Uuid) -> Result<Vec<Quest>, DomainError> {
        let rows = sqlx::query_as::<_, (Json<Quest>,)>(
            "SELECT body FROM quests WHERE campaign_id = $1 ORDER BY title",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(|(Json(q),)| q).collect())
    }

    async fn find_world_entity(
        &self,
        campaign_id: Uuid,
        canonical_name: &str,
    ) -> Result<Option<WorldEntity>, DomainError> {
        let row = sqlx::query_as::<_, (Json<WorldEntity>,)>(
            "SELECT body FROM world_entities WHERE campaign_id = $1 AND canonical_name = $2",
        )
        .bind(campaign_id)
        .bind(canonical_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(|(Json(e),)| e))
    }

    async fn world_entities(&self, campaign_id: Uuid) -> Result<Vec<WorldEntity>, DomainError> {
        let rows = sqlx::query_as::<_, (Json<WorldEntity>,)>(
            "SELECT body FROM world_entities WHERE campaign_id = $1 ORDER BY canonical_name",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(|(Json(e),)| e).collect())
    }

    async fn active_session(&self, campaign_id: Uuid) -> Result<Option<ChatSession>, DomainError> {
        let row = sqlx::query_as::<_, (Uuid, Uuid, bool, chrono::DateTime<chrono::Utc>)>(
            "SELECT id, campaign_id, active, started_at FROM chat_sessions
             WHERE campaign_id = $1 AND active
             ORDER BY started_at DESC LIMIT 1",
        )
        .bind(campaign_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(|(id, campaign_id, active, started_at)| ChatSession {
            id,
            campaign_id,
            active,
            started_at,
        }))
    }

    async fn start_session(&self, session: &ChatSession) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        sqlx::query("UPDATE chat_sessions SET active = FALSE WHERE campaign_id = $1")
            .bind(session.campaign_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        sqlx::query(
            "INSERT INTO chat_sessions (id, campaign_id, active, started_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(session.id)
        .bind(session.campaign_id)
        .bind(session.active)
        .bind(session.started_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
        tx.commit().await.map_err(db_error)
    }

    async fn recent_turns(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ChatTurn>, DomainError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, (Json<ChatTurn>,)>(
            "SELECT body FROM (
                 SELECT body, seq FROM chat_turns WHERE session_id = $1
                 ORDER BY seq DESC LIMIT $2
             ) tail ORDER BY seq ASC",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(|(Json(t),)| t).collect())
    }

    async fn load_combat(&self, campaign_id: Uuid) -> Result<Option<CombatState>, DomainError> {
        let row = sqlx::query_as::<_, (Json<CombatState>,)>(
            "SELECT body FROM combat_states WHERE campaign_id = $1",
        )
        .bind(campaign_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(|(Json(s),)| s))
    }

    async fn save_combat(
        &self,
        campaign_id: Uuid,
        state: &CombatState,
    ) -> Result<(), DomainError> {
        upsert_combat(&self.pool, campaign_id, state).await
    }

    async fn clear_combat(&self, campaign_id: Uuid) -> Result<(), DomainError> {
        delete_combat(&self.pool, campaign_id).await
    }

    async fn apply_changes(&self, changes: StateChanges) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        if let Some(campaign) = &changes.campaign {
            sqlx::query(
                "INSERT INTO campaigns (id, name, settings) VALUES ($1, $2, $3)
                 ON CONFLICT (id) DO UPDATE
                 SET name = EXCLUDED.name, settings = EXCLUDED.settings, updated_at = NOW()",
            )
            .bind(campaign.id)
            .bind(&campaign.name)
            .bind(Json(&campaign.settings))
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        for character in &changes.characters {
            sqlx::query(
                "INSERT INTO characters (id, campaign_id, name, body) VALUES ($1, $2, $3, $4)
                 ON CONFLICT (id) DO UPDATE
                 SET name = EXCLUDED.name, body = EXCLUDED.body, updated_at = NOW()",
            )
            .bind(character.id)
            .bind(character.campaign_id)
            .bind(&character.name)
            .bind(Json(character))
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        for quest in &changes.quests {
            sqlx::query(
                "INSERT INTO quests (id, campaign_id, title, body) VALUES ($1, $2, $3, $4)
                 ON CONFLICT (id) DO UPDATE
                 SET title = EXCLUDED.title, body = EXCLUDED.body, updated_at = NOW()",
            )
            .bind(quest.id)
            .bind(quest.campaign_id)
            .bind(&quest.title)
            .bind(Json(quest))
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        for entity in &changes.world_entities {
            sqlx::query(
                "INSERT INTO world_entities (campaign_id, canonical_name, body) VALUES ($1, $2, $3)
                 ON CONFLICT (campaign_id, canonical_name) DO UPDATE
                 SET body = EXCLUDED.body, updated_at = NOW()",
            )
            .bind(entity.campaign_id)
            .bind(&entity.canonical_name)
            .bind(Json(entity))
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        for turn in &changes.chat_turns {
            sqlx::query(
                "INSERT INTO chat_turns (id, session_id, body, created_at) VALUES ($1, $2, $3, $4)",
            )
            .bind(turn.id)
            .bind(turn.session_id)
            .bind(Json(turn))
            .bind(turn.created_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        match &changes.combat {
            Some(CombatWrite::Save { campaign_id, state }) => {
                upsert_combat(&mut *tx, *campaign_id, state).await?;
            }
            Some(CombatWrite::Clear { campaign_id }) => {
                delete_combat(&mut *tx, *campaign_id).await?;
            }
            None => {}
        }

        tx.commit().await.map_err(db_error)?;
        tracing::debug!(
            characters = changes.characters.len(),
            quests = changes.quests.len(),
            world_entities = changes.world_entities.len(),
            chat_turns = changes.chat_turns.len(),
            "state changes committed"
        );
        Ok(())
    }
}
