//! Background world-entity extraction.
//!
//! After a turn commits, its narrative is sent to the model once more to
//! list the people, places and things it mentions. The work is spawned and
//! never awaited by the turn; failures are logged and dropped.

use std::collections::HashMap;
use std::sync::Arc;

use taleforge_core::canonical::{canonical_name, qualified_canonical_name};
use taleforge_core::clock::Clock;
use taleforge_core::model::{EntityType, WorldEntity};
use taleforge_core::store::{GameStore, StateChanges};
use taleforge_llm::dispatcher::Dispatcher;
use taleforge_llm::provider::{CompletionOptions, ToolChoice};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::extraction::{ExtractedEntity, ExtractionCache, parse_entities};
use crate::domain::prompt::extraction_prompt;
use crate::error::NarrativeError;

/// Spawns and runs extraction jobs, skipping narratives already seen.
#[derive(Clone)]
pub struct EntityExtractor {
    dispatcher: Arc<Dispatcher>,
    store: Arc<dyn GameStore>,
    clock: Arc<dyn Clock>,
    cache: Arc<ExtractionCache>,
}

impl EntityExtractor {
    /// Creates an extractor sharing `cache` with any clones.
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        store: Arc<dyn GameStore>,
        clock: Arc<dyn Clock>,
        cache: Arc<ExtractionCache>,
    ) -> Self {
        Self {
            dispatcher,
            store,
            clock,
            cache,
        }
    }

    /// Spawns extraction for `narrative` unless identical text was already
    /// scheduled. The hash is recorded before the job runs, so a failed
    /// extraction is not retried for the same text.
    pub fn schedule(&self, campaign_id: Uuid, narrative: String) -> Option<JoinHandle<()>> {
        if narrative.trim().is_empty() || !self.cache.insert(&narrative) {
            debug!(campaign_id = %campaign_id, "Skipping extraction for known narrative");
            return None;
        }
        let extractor = self.clone();
        Some(tokio::spawn(async move {
            match extractor.extract(campaign_id, &narrative).await {
                Ok(count) => debug!(campaign_id = %campaign_id, count, "World entities extracted"),
                Err(error) => warn!(
                    campaign_id = %campaign_id,
                    error = %error,
                    "Entity extraction failed"
                ),
            }
        }))
    }

    /// Asks the model for the entities in `narrative` and upserts them by
    /// canonical name. Returns how many records were written.
    ///
    /// # Errors
    ///
    /// Returns `NarrativeError` if the dispatch fails, the reply is not an
    /// entity array, or the store rejects the write.
    pub async fn extract(&self, campaign_id: Uuid, narrative: &str) -> Result<usize, NarrativeError> {
        let prompt = extraction_prompt(narrative);
        let options = CompletionOptions {
            temperature: Some(0.0),
            system_prompt: Some(prompt.system),
            tool_choice: ToolChoice::None,
            ..CompletionOptions::default()
        };
        let completion = self.dispatcher.execute(&prompt.user, &options, None).await?;
        let extracted = parse_entities(&completion.content)
            .map_err(|e| NarrativeError::Extraction(format!("unreadable reply: {e}")))?;

        let mut pending: HashMap<String, WorldEntity> = HashMap::new();
        for entity in extracted {
            self.merge(campaign_id, entity, &mut pending).await?;
        }

        let count = pending.len();
        if count > 0 {
            self.store
                .apply_changes(StateChanges {
                    world_entities: pending.into_values().collect(),
                    ..StateChanges::default()
                })
                .await?;
        }
        Ok(count)
    }

    async fn merge(
        &self,
        campaign_id: Uuid,
        extracted: ExtractedEntity,
        pending: &mut HashMap<String, WorldEntity>,
    ) -> Result<(), NarrativeError> {
        let Ok(entity_type) = extracted.entity_type.parse::<EntityType>() else {
            debug!(entity_type = %extracted.entity_type, "Ignoring extracted entity of unknown type");
            return Ok(());
        };
        let name = extracted.name.trim();
        if name.is_empty() {
            return Ok(());
        }

        let mut key = canonical_name(name);
        let mut existing = self.lookup(campaign_id, &key, pending).await?;
        if existing
            .as_ref()
            .is_some_and(|e| e.entity_type != entity_type)
        {
            key = qualified_canonical_name(entity_type, name);
            existing = self.lookup(campaign_id, &key, pending).await?;
        }

        let now = self.clock.now();
        let (mut entity, created) = match existing {
            Some(entity) => (entity, false),
            None => (
                WorldEntity {
                    id: Uuid::new_v4(),
                    campaign_id,
                    canonical_name: key.clone(),
                    name: name.to_owned(),
                    entity_type,
                    description: String::new(),
                    updated_at: now,
                },
                true,
            ),
        };
        if entity.absorb_description(&extracted.description) || created {
            entity.updated_at = now;
            pending.insert(key, entity);
        }
        Ok(())
    }

    async fn lookup(
        &self,
        campaign_id: Uuid,
        key: &str,
        pending: &HashMap<String, WorldEntity>,
    ) -> Result<Option<WorldEntity>, NarrativeError> {
        if let Some(entity) = pending.get(key) {
            return Ok(Some(entity.clone()));
        }
        Ok(self.store.find_world_entity(campaign_id, key).await?)
    }
}
