//! The combat coordinator: sole owner of encounter state.
//!
//! Encounters are keyed by campaign. Each campaign has its own async mutex,
//! so transitions for one campaign are strictly ordered while different
//! campaigns proceed independently. After every transition the durable
//! mirror in the store is updated before the in-memory copy, so the two never
//! diverge; a campaign missing from memory is rehydrated from the mirror.
//!
//! Player hit points live both on the combatant and on the character record.
//! Every write to either goes through this coordinator under the campaign's
//! lock, and both land in the same `apply_changes` batch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use taleforge_core::combat::CombatState;
use taleforge_core::error::DomainError;
use taleforge_core::rng::DeterministicRng;
use taleforge_core::model::{Character, CharacterDelta};
use taleforge_core::store::{CombatWrite, GameStore, StateChanges};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::attack::{AttackRequest, resolve_attack};
use crate::domain::initiative::CombatStart;
use crate::domain::messages::{CombatCommand, CombatEvent};
use crate::error::CombatError;

#[derive(Debug, Default)]
struct Encounter {
    loaded: bool,
    state: Option<CombatState>,
}

/// Authoritative turn-order state machine for every campaign.
pub struct CombatCoordinator {
    store: Arc<dyn GameStore>,
    rng: Arc<Mutex<dyn DeterministicRng + Send>>,
    encounters: Mutex<HashMap<Uuid, Arc<AsyncMutex<Encounter>>>>,
}

impl CombatCoordinator {
    /// Creates a coordinator over `store`, rolling with `rng`.
    pub fn new(store: Arc<dyn GameStore>, rng: Arc<Mutex<dyn DeterministicRng + Send>>) -> Self {
        Self {
            store,
            rng,
            encounters: Mutex::new(HashMap::new()),
        }
    }

    /// Applies one protocol message and returns the events to deliver, in
    /// order.
    ///
    /// # Errors
    ///
    /// Returns `CombatError` when the command is rejected; state is left
    /// untouched in that case.
    #[instrument(skip_all, fields(campaign_id = %campaign_id))]
    pub async fn handle(
        &self,
        campaign_id: Uuid,
        command: CombatCommand,
    ) -> Result<Vec<CombatEvent>, CombatError> {
        match command {
            CombatCommand::Start { players, enemies } => {
                let start = self.with_rng(|rng| CombatStart::roll(players, enemies, rng));
                self.begin(campaign_id, start).await
            }
            CombatCommand::Attack(request) => self.attack(campaign_id, &request).await,
            CombatCommand::NextTurn => self.next_turn(campaign_id).await,
            CombatCommand::End => self.end(campaign_id).await,
        }
    }

    /// Starts an encounter from combatants whose initiative is already
    /// rolled (the `start_combat` tool path).
    ///
    /// # Errors
    ///
    /// Returns `CombatError::AlreadyActive` if an encounter is running and
    /// `CombatError::NoCombatants` if both sides are empty.
    pub async fn begin(
        &self,
        campaign_id: Uuid,
        start: CombatStart,
    ) -> Result<Vec<CombatEvent>, CombatError> {
        let mut encounter = self.lock_loaded(campaign_id).await?;
        if encounter.state.is_some() {
            return Err(CombatError::AlreadyActive);
        }

        let state = self.with_rng(|rng| start.into_state(rng))?;
        self.store.save_combat(campaign_id, &state).await?;

        info!(
            campaign_id = %campaign_id,
            combatants = state.turn_order.len(),
            "Combat started"
        );
        encounter.state = Some(state.clone());
        Ok(vec![CombatEvent::State(state)])
    }

    /// Current encounter, rehydrated from the store if needed.
    ///
    /// # Errors
    ///
    /// Returns `CombatError::Store` if the mirror cannot be read.
    pub async fn snapshot(&self, campaign_id: Uuid) -> Result<Option<CombatState>, CombatError> {
        Ok(self.lock_loaded(campaign_id).await?.state.clone())
    }

    async fn attack(
        &self,
        campaign_id: Uuid,
        request: &AttackRequest,
    ) -> Result<Vec<CombatEvent>, CombatError> {
        let mut encounter = self.lock_loaded(campaign_id).await?;
        let mut next = encounter.state.clone().ok_or(CombatError::NotActive)?;

        let holder = next
            .current()
            .map(|c| c.id.clone())
            .ok_or(CombatError::NotActive)?;
        if holder != request.attacker_id {
            info!(
                campaign_id = %campaign_id,
                expected = %holder,
                actual = %request.attacker_id,
                "Rejected out-of-turn attack"
            );
            return Err(CombatError::TurnOrderViolation {
                expected: holder,
                actual: request.attacker_id.clone(),
            });
        }

        let outcome = self.with_rng(|rng| resolve_attack(&mut next, request, rng))?;
        let mut events = vec![
            CombatEvent::AttackResult(outcome.clone()),
            CombatEvent::HpUpdated {
                combatant_id: outcome.target_id.clone(),
                hp: outcome.target_hp,
                max_hp: outcome.target_max_hp,
            },
        ];

        let victor = next.victor();
        let mut changes = StateChanges::default();
        if let Some(victor) = victor {
            next.active = false;
            changes.combat = Some(CombatWrite::Clear { campaign_id });
            events.push(CombatEvent::Ended {
                victor: Some(victor),
                round: next.round,
            });
        } else {
            changes.combat = Some(CombatWrite::Save {
                campaign_id,
                state: next.clone(),
            });
        }

        let target_is_player = next
            .combatant(&outcome.target_id)
            .is_some_and(|c| c.is_player);
        if outcome.hit
            && target_is_player
            && let Some(character) = self
                .character_with_hp(&outcome.target_id, outcome.target_hp)
                .await?
        {
            changes.characters.push(character);
        }
        self.store.apply_changes(changes).await?;

        if let Some(victor) = victor {
            info!(campaign_id = %campaign_id, victor = ?victor, round = next.round, "Combat ended");
            encounter.state = None;
        } else {
            encounter.state = Some(next);
        }
        Ok(events)
    }

    async fn next_turn(&self, campaign_id: Uuid) -> Result<Vec<CombatEvent>, CombatError> {
        let mut encounter = self.lock_loaded(campaign_id).await?;
        let mut next = encounter.state.clone().ok_or(CombatError::NotActive)?;

        next.advance();
        self.store.save_combat(campaign_id, &next).await?;

        encounter.state = Some(next.clone());
        Ok(vec![CombatEvent::State(next)])
    }

    async fn end(&self, campaign_id: Uuid) -> Result<Vec<CombatEvent>, CombatError> {
        let mut encounter = self.lock_loaded(campaign_id).await?;
        let state = encounter.state.as_ref().ok_or(CombatError::NotActive)?;
        let round = state.round;

        self.store.clear_combat(campaign_id).await?;

        info!(campaign_id = %campaign_id, round, "Combat ended manually");
        encounter.state = None;
        Ok(vec![CombatEvent::Ended {
            victor: None,
            round,
        }])
    }

    /// Commits a narrative turn's writes under the campaign's encounter lock.
    ///
    /// `character` is replayed onto the latest stored record, so HP written
    /// through by attacks while the turn was running is kept. If that
    /// character fights in the running encounter its combatant takes the new
    /// HP and the mirror is written in the same batch. Returns the combat
    /// events this caused.
    ///
    /// # Errors
    ///
    /// Returns `CombatError::Store` if the character is missing or the batch
    /// cannot be committed; neither memory nor the store changes then.
    #[instrument(skip_all, fields(campaign_id = %campaign_id))]
    pub async fn commit_turn(
        &self,
        campaign_id: Uuid,
        mut changes: StateChanges,
        character: Option<&CharacterDelta>,
    ) -> Result<Vec<CombatEvent>, CombatError> {
        let mut encounter = self.lock_loaded(campaign_id).await?;
        let mut events = Vec::new();
        let mut next = None;

        if let Some(delta) = character {
            let mut record = self
                .store
                .load_character(delta.character_id)
                .await?
                .ok_or_else(|| DomainError::not_found("character", delta.character_id))?;
            delta.apply_to(&mut record);

            if let Some(mut state) = encounter.state.clone() {
                let combatant_id = record.id.to_string();
                if let Some(combatant) = state.combatant_mut(&combatant_id)
                    && combatant.hp != record.hp
                {
                    let hp = combatant.set_hp(record.hp);
                    record.set_hp(hp);
                    events.push(CombatEvent::HpUpdated {
                        combatant_id,
                        hp,
                        max_hp: combatant.max_hp,
                    });
                    if let Some(victor) = state.victor() {
                        state.active = false;
                        changes.combat = Some(CombatWrite::Clear { campaign_id });
                        events.push(CombatEvent::Ended {
                            victor: Some(victor),
                            round: state.round,
                        });
                    } else {
                        changes.combat = Some(CombatWrite::Save {
                            campaign_id,
                            state: state.clone(),
                        });
                    }
                    next = Some(state);
                }
            }
            changes.characters.push(record);
        }

        self.store.apply_changes(changes).await?;

        if let Some(state) = next {
            debug!(campaign_id = %campaign_id, "Turn HP change mirrored onto combatant");
            encounter.state = state.active.then_some(state);
        }
        Ok(events)
    }

    async fn character_with_hp(
        &self,
        combatant_id: &str,
        hp: i32,
    ) -> Result<Option<Character>, CombatError> {
        let Ok(character_id) = Uuid::parse_str(combatant_id) else {
            return Ok(None);
        };
        let Some(mut character) = self.store.load_character(character_id).await? else {
            debug!(%character_id, "Player combatant has no character record");
            return Ok(None);
        };
        if character.hp == hp {
            return Ok(None);
        }
        character.set_hp(hp);
        Ok(Some(character))
    }

    async fn lock_loaded(
        &self,
        campaign_id: Uuid,
    ) -> Result<OwnedMutexGuard<Encounter>, CombatError> {
        let slot = {
            let mut encounters = self
                .encounters
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(encounters.entry(campaign_id).or_default())
        };
        let mut encounter = slot.lock_owned().await;
        if !encounter.loaded {
            encounter.state = self
                .store
                .load_combat(campaign_id)
                .await?
                .filter(|s| s.active);
            encounter.loaded = true;
        }
        Ok(encounter)
    }

    // The RNG lock is taken only around synchronous rolls, never across an
    // await point.
    fn with_rng<T>(&self, roll: impl FnOnce(&mut dyn DeterministicRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        roll(&mut *rng)
    }
}
