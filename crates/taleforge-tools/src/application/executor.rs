//! Runs model-issued tool calls against a staged working set.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use taleforge_core::clock::Clock;
use taleforge_core::error::DomainError;
use taleforge_core::rng::DeterministicRng;
use taleforge_core::store::GameStore;
use taleforge_llm::provider::ToolCall;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::application::handlers::{self, Handled};
use crate::domain::arguments::parse;
use crate::domain::catalog::{ToolCatalog, ToolName};
use crate::domain::working_set::WorkingSet;
use crate::error::ToolError;

/// Who is acting, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolContext {
    /// Campaign of the turn.
    pub campaign_id: Uuid,
    /// Acting character; inventory, HP, gold and XP tools target it.
    pub character_id: Uuid,
    /// Whether the campaign already has an encounter running.
    pub encounter_running: bool,
}

/// The answer to exactly one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Echo of the call id.
    pub call_id: String,
    /// Function name as called.
    pub tool: String,
    /// Structured outcome on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Value>,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// One-line description of what happened.
    pub summary: String,
}

impl ToolResult {
    /// Whether the call succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn from_outcome(call: &ToolCall, outcome: Result<Handled, ToolError>) -> Self {
        match outcome {
            Ok(handled) => Self {
                call_id: call.id.clone(),
                tool: call.name.clone(),
                outcome: Some(handled.outcome),
                error: None,
                summary: handled.summary,
            },
            Err(error) => Self {
                call_id: call.id.clone(),
                tool: call.name.clone(),
                outcome: None,
                summary: format!("{} failed", call.name),
                error: Some(error.to_string()),
            },
        }
    }
}

/// Validates and applies tool calls. Never aborts a batch: every call yields
/// one [`ToolResult`].
pub struct ToolExecutor {
    store: Arc<dyn GameStore>,
    rng: Arc<Mutex<dyn DeterministicRng + Send>>,
    clock: Arc<dyn Clock>,
    catalog: ToolCatalog,
}

impl ToolExecutor {
    /// Creates an executor with the standard catalog.
    pub fn new(
        store: Arc<dyn GameStore>,
        rng: Arc<Mutex<dyn DeterministicRng + Send>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            rng,
            clock,
            catalog: ToolCatalog::standard(),
        }
    }

    /// The catalog attached to narrator dispatches.
    #[must_use]
    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Loads the acting character, quests and world entities fresh from the
    /// store.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::Store` if the character is missing, belongs to
    /// another campaign, or the store fails.
    pub async fn load_working_set(&self, context: ToolContext) -> Result<WorkingSet, ToolError> {
        let character = self
            .store
            .load_character(context.character_id)
            .await?
            .ok_or_else(|| DomainError::not_found("character", context.character_id))?;
        if character.campaign_id != context.campaign_id {
            return Err(DomainError::Validation(format!(
                "character {} is not part of campaign {}",
                character.id, context.campaign_id
            ))
            .into());
        }
        let quests = self.store.quests(context.campaign_id).await?;
        let entities = self.store.world_entities(context.campaign_id).await?;
        Ok(WorkingSet::new(character, quests, entities)
            .with_encounter_running(context.encounter_running))
    }

    /// Executes `calls` in order. A later call sees the effects of earlier
    /// ones.
    pub fn execute_batch(&self, set: &mut WorkingSet, calls: &[ToolCall]) -> Vec<ToolResult> {
        calls.iter().map(|call| self.execute(set, call)).collect()
    }

    /// Executes one call, turning any failure into an error result.
    #[instrument(skip_all, fields(tool = %call.name, call_id = %call.id))]
    pub fn execute(&self, set: &mut WorkingSet, call: &ToolCall) -> ToolResult {
        let outcome = self.run(set, call);
        match &outcome {
            Ok(handled) => debug!(summary = %handled.summary, "Tool call applied"),
            Err(error) => warn!(
                campaign_id = %set.campaign_id(),
                error = %error,
                "Tool call failed"
            ),
        }
        ToolResult::from_outcome(call, outcome)
    }

    fn run(&self, set: &mut WorkingSet, call: &ToolCall) -> Result<Handled, ToolError> {
        let tool: ToolName = call.name.parse()?;
        let raw = call.arguments.as_str();
        match tool {
            ToolName::RollDice => {
                let args = parse(tool, raw)?;
                self.with_rng(|rng| handlers::roll_dice(&args, rng))
            }
            ToolName::AddItem => handlers::add_item(set, parse(tool, raw)?),
            ToolName::RemoveItem => handlers::remove_item(set, &parse(tool, raw)?),
            ToolName::UpdateHp => handlers::update_hp(set, &parse(tool, raw)?),
            ToolName::UpdateGold => handlers::update_gold(set, &parse(tool, raw)?),
            ToolName::AwardXp => handlers::award_xp(set, &parse(tool, raw)?),
            ToolName::StartCombat => {
                let args = parse(tool, raw)?;
                self.with_rng(|rng| handlers::start_combat(set, args, rng))
            }
            ToolName::UpsertWorldEntity => {
                handlers::upsert_world_entity(set, &parse(tool, raw)?, self.clock.as_ref())
            }
            ToolName::UpdateQuest => handlers::update_quest(set, parse(tool, raw)?),
        }
    }

    fn with_rng<T>(&self, roll: impl FnOnce(&mut dyn DeterministicRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        roll(&mut *rng)
    }
}
