//! The narrative turn loop.
//!
//! A turn is all-or-nothing with respect to game state: tool handlers mutate
//! a staged working set, and the character, quests, entities, campaign event
//! log and chat turns are committed together at the end. A dispatch or store
//! failure anywhere before that commit leaves the store untouched.
//!
//! The commit goes through the combat coordinator. The character's net change
//! is replayed onto its latest record there, so damage dealt by combat while
//! the turn was running is kept, and a fighting character's combatant follows
//! the new hit points.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use taleforge_combat::application::coordinator::CombatCoordinator;
use taleforge_combat::domain::initiative::CombatStart;
use taleforge_combat::domain::messages::CombatEvent;
use taleforge_combat::error::CombatError;
use taleforge_core::clock::Clock;
use taleforge_core::combat::CombatState;
use taleforge_core::context::DmContext;
use taleforge_core::error::DomainError;
use taleforge_core::model::{ChatRole, ChatTurn};
use taleforge_core::store::GameStore;
use taleforge_llm::dispatcher::Dispatcher;
use taleforge_llm::provider::{CompletionOptions, ProviderKind, ToolChoice};
use taleforge_tools::application::executor::{ToolContext, ToolExecutor, ToolResult};
use taleforge_tools::domain::working_set::{InventoryDelta, TurnEffects};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::application::context::ContextAssembler;
use crate::application::extractor::EntityExtractor;
use crate::domain::prompt::{reconciliation_prompt, turn_prompt};
use crate::error::NarrativeError;

const NARRATION_TEMPERATURE: f32 = 0.8;
const RECONCILIATION_TEMPERATURE: f32 = 0.4;

/// A player's free-text action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerAction {
    /// Campaign the action happens in.
    pub campaign_id: Uuid,
    /// Acting character.
    pub character_id: Uuid,
    /// What the player typed.
    pub text: String,
    /// Name shown in the transcript; defaults to the character's name.
    #[serde(default)]
    pub speaker: Option<String>,
}

/// What a turn produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    /// Final narration.
    pub narrative: String,
    /// Net inventory changes of the acting character.
    pub inventory_delta: Vec<InventoryDelta>,
    /// Encounter opened by the turn, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combat_start: Option<CombatState>,
    /// Changes the turn made to a running encounter.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub combat_events: Vec<CombatEvent>,
    /// One result per tool call, in call order.
    pub tool_results: Vec<ToolResult>,
    /// Provider that wrote the narration.
    pub provider: ProviderKind,
}

/// Collaborators of the orchestrator, constructed once at startup.
pub struct OrchestratorDeps {
    /// Persistence.
    pub store: Arc<dyn GameStore>,
    /// Provider dispatch.
    pub dispatcher: Arc<Dispatcher>,
    /// Tool execution.
    pub executor: Arc<ToolExecutor>,
    /// Encounter owner.
    pub combat: Arc<CombatCoordinator>,
    /// Background extraction.
    pub extractor: EntityExtractor,
    /// Chat turn timestamps.
    pub clock: Arc<dyn Clock>,
}

/// Runs narrative turns, at most one at a time per campaign.
pub struct NarrativeOrchestrator {
    store: Arc<dyn GameStore>,
    dispatcher: Arc<Dispatcher>,
    executor: Arc<ToolExecutor>,
    combat: Arc<CombatCoordinator>,
    assembler: ContextAssembler,
    extractor: EntityExtractor,
    clock: Arc<dyn Clock>,
    turns_in_progress: Mutex<HashSet<Uuid>>,
}

struct TurnGuard<'a> {
    active: &'a Mutex<HashSet<Uuid>>,
    campaign_id: Uuid,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.campaign_id);
    }
}

impl NarrativeOrchestrator {
    /// Wires the orchestrator.
    #[must_use]
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            assembler: ContextAssembler::new(Arc::clone(&deps.store), Arc::clone(&deps.combat)),
            store: deps.store,
            dispatcher: deps.dispatcher,
            executor: deps.executor,
            combat: deps.combat,
            extractor: deps.extractor,
            clock: deps.clock,
            turns_in_progress: Mutex::new(HashSet::new()),
        }
    }

    /// Runs one turn: context, first dispatch with tools, tool execution,
    /// reconciliation, commit, combat start and extraction scheduling.
    ///
    /// # Errors
    ///
    /// Returns `NarrativeError::TurnInProgress` if the campaign already has a
    /// running turn, `NarrativeError::Dispatch` once every provider tier has
    /// failed, and `NarrativeError::State` if loading or committing state
    /// fails. Nothing is committed in any of these cases.
    #[instrument(
        skip_all,
        fields(campaign_id = %action.campaign_id, character_id = %action.character_id)
    )]
    pub async fn take_turn(&self, action: PlayerAction) -> Result<TurnOutcome, NarrativeError> {
        let _guard = self.begin_turn(action.campaign_id)?;

        let context = self
            .assembler
            .assemble(action.campaign_id, action.character_id)
            .await?;
        let speaker = action
            .speaker
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| context.character.name.clone());

        let prompt = turn_prompt(&context, &speaker, &action.text);
        let options = CompletionOptions {
            temperature: Some(NARRATION_TEMPERATURE),
            system_prompt: Some(prompt.system),
            tools: self.executor.catalog().definitions().to_vec(),
            tool_choice: ToolChoice::Auto,
            ..CompletionOptions::default()
        };
        let draft = self.dispatcher.execute(&prompt.user, &options, None).await?;

        let (narrative, provider, tool_results, effects) = if draft.tool_calls.is_empty() {
            (draft.content.trim().to_owned(), draft.provider, Vec::new(), TurnEffects::default())
        } else {
            let mut set = self
                .executor
                .load_working_set(ToolContext {
                    campaign_id: action.campaign_id,
                    character_id: action.character_id,
                    encounter_running: context.in_combat(),
                })
                .await?;
            let results = self.executor.execute_batch(&mut set, &draft.tool_calls);
            let (narrative, provider) = self
                .reconcile(&context, &speaker, &action.text, &draft.content, &results, draft.provider)
                .await?;
            (narrative, provider, results, set.into_effects())
        };

        let combat_events = self
            .commit(&context, &speaker, &action.text, &narrative, &tool_results, &effects)
            .await?;
        info!(
            campaign_id = %action.campaign_id,
            provider = %provider,
            tool_calls = tool_results.len(),
            "Turn committed"
        );

        let combat_start = match effects.combat_start {
            Some(start) => self.open_encounter(action.campaign_id, start).await,
            None => None,
        };
        self.extractor.schedule(action.campaign_id, narrative.clone());

        Ok(TurnOutcome {
            narrative,
            inventory_delta: effects.inventory_delta,
            combat_start,
            combat_events,
            tool_results,
            provider,
        })
    }

    fn begin_turn(&self, campaign_id: Uuid) -> Result<TurnGuard<'_>, NarrativeError> {
        let mut active = self
            .turns_in_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !active.insert(campaign_id) {
            info!(campaign_id = %campaign_id, "Rejected concurrent turn");
            return Err(NarrativeError::TurnInProgress(campaign_id));
        }
        Ok(TurnGuard {
            active: &self.turns_in_progress,
            campaign_id,
        })
    }

    // The second pass runs on the provider that wrote the draft, without
    // tools, so the rewrite cannot trigger more state changes.
    async fn reconcile(
        &self,
        context: &DmContext,
        speaker: &str,
        action: &str,
        draft: &str,
        results: &[ToolResult],
        provider: ProviderKind,
    ) -> Result<(String, ProviderKind), NarrativeError> {
        let prompt = reconciliation_prompt(context, speaker, action, draft, results);
        let options = CompletionOptions {
            temperature: Some(RECONCILIATION_TEMPERATURE),
            system_prompt: Some(prompt.system),
            tool_choice: ToolChoice::None,
            ..CompletionOptions::default()
        };
        let completion = self
            .dispatcher
            .execute(&prompt.user, &options, Some(provider))
            .await?;
        let text = completion.content.trim();
        let narrative = if text.is_empty() {
            warn!(provider = %completion.provider, "Empty reconciliation, keeping draft");
            draft.trim().to_owned()
        } else {
            text.to_owned()
        };
        Ok((narrative, completion.provider))
    }

    async fn commit(
        &self,
        context: &DmContext,
        speaker: &str,
        action: &str,
        narrative: &str,
        results: &[ToolResult],
        effects: &TurnEffects,
    ) -> Result<Vec<CombatEvent>, NarrativeError> {
        let campaign_id = context.campaign.id;
        let mut campaign = self
            .store
            .load_campaign(campaign_id)
            .await?
            .ok_or_else(|| DomainError::not_found("campaign", campaign_id))?;
        campaign
            .settings
            .record_event(format!("{speaker}: {}", action.trim()));
        for result in results.iter().filter(|r| r.is_success()) {
            campaign.settings.record_event(result.summary.clone());
        }

        let mut changes = effects.changes.clone();
        changes.campaign = Some(campaign);
        if let Some(session) = self.store.active_session(campaign_id).await? {
            let now = self.clock.now();
            let turn = |role: ChatRole, content: &str, speaker: Option<String>| ChatTurn {
                id: Uuid::new_v4(),
                session_id: session.id,
                role,
                content: content.to_owned(),
                speaker,
                audio_ref: None,
                created_at: now,
            };
            changes.chat_turns = vec![
                turn(ChatRole::Player, action.trim(), Some(speaker.to_owned())),
                turn(ChatRole::Narrator, narrative, None),
            ];
        }

        self.combat
            .commit_turn(campaign_id, changes, effects.character.as_ref())
            .await
            .map_err(|error| match error {
                CombatError::Store(inner) => NarrativeError::State(inner),
                other => NarrativeError::Combat(other),
            })
    }

    async fn open_encounter(
        &self,
        campaign_id: Uuid,
        start: CombatStart,
    ) -> Option<CombatState> {
        match self.combat.begin(campaign_id, start).await {
            Ok(events) => events.into_iter().find_map(|event| match event {
                CombatEvent::State(state) => Some(state),
                _ => None,
            }),
            Err(CombatError::AlreadyActive) => {
                warn!(campaign_id = %campaign_id, "start_combat ignored, encounter already running");
                None
            }
            Err(error) => {
                warn!(campaign_id = %campaign_id, error = %error, "Could not open encounter");
                None
            }
        }
    }
}
