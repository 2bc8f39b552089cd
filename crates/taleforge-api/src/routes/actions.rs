//! Player actions: one request runs one narrative turn.

use axum::extract::{Path, State};
use axum::{Json, Router, routing::post};
use serde::Deserialize;
use taleforge_combat::domain::messages::CombatEvent;
use taleforge_core::error::DomainError;
use taleforge_narrative::application::orchestrator::{PlayerAction, TurnOutcome};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /{campaign_id}/actions.
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    /// Acting character.
    pub character_id: Uuid,
    /// What the player does or says.
    pub text: String,
    /// Transcript name, if not the character's.
    #[serde(default)]
    pub speaker: Option<String>,
}

/// POST /{campaign_id}/actions
#[instrument(
    skip(state, request),
    fields(campaign_id = %campaign_id, character_id = %request.character_id)
)]
async fn take_action(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<TurnOutcome>, ApiError> {
    if request.text.trim().is_empty() {
        return Err(DomainError::Validation("action text must not be empty".into()).into());
    }

    let outcome = state
        .orchestrator
        .take_turn(PlayerAction {
            campaign_id,
            character_id: request.character_id,
            text: request.text,
            speaker: request.speaker,
        })
        .await?;

    if let Some(combat) = &outcome.combat_start {
        let delivered = state
            .hub
            .publish(campaign_id, CombatEvent::State(combat.clone()));
        debug!(delivered, "Broadcast combat start");
    }
    for event in &outcome.combat_events {
        let delivered = state.hub.publish(campaign_id, event.clone());
        debug!(delivered, "Broadcast combat change from turn");
    }

    Ok(Json(outcome))
}

/// Returns the router for player actions.
pub fn router() -> Router<AppState> {
    Router::new().route("/{campaign_id}/actions", post(take_action))
}
