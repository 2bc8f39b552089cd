//! Combat snapshot and the combat WebSocket.
//!
//! Every inbound message goes through the coordinator; state changes are
//! broadcast to the campaign, errors go back to the sender only.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::{Json, Router, routing::get};
use futures_util::{SinkExt, StreamExt};
use taleforge_combat::domain::messages::{CombatCommand, CombatEvent};
use taleforge_core::combat::CombatState;
use taleforge_core::error::DomainError;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Buffer for replies addressed to a single socket.
const DIRECT_BUFFER: usize = 32;

/// GET /{campaign_id}/combat
#[instrument(skip(state), fields(campaign_id = %campaign_id))]
async fn combat_snapshot(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CombatState>, ApiError> {
    state
        .combat
        .snapshot(campaign_id)
        .await?
        .map(Json)
        .ok_or_else(|| DomainError::not_found("combat", campaign_id).into())
}

/// GET /{campaign_id}/combat/ws
async fn combat_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| run_socket(socket, state, campaign_id))
}

async fn run_socket(socket: WebSocket, state: AppState, campaign_id: Uuid) {
    let connection_id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (direct_tx, mut direct_rx) = mpsc::channel::<CombatEvent>(DIRECT_BUFFER);
    let mut campaign_rx = state.hub.subscribe(campaign_id);
    info!(campaign_id = %campaign_id, connection_id = %connection_id, "Combat socket connected");

    let send_task = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                direct = direct_rx.recv() => match direct {
                    Some(event) => event,
                    None => break,
                },
                shared = campaign_rx.recv() => match shared {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(connection_id = %connection_id, skipped, "Combat socket lagging");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };
            let Ok(json) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                for event in respond(&state, campaign_id, text.as_str()).await {
                    if event.is_broadcast() {
                        state.hub.publish(campaign_id, event);
                    } else if direct_tx.try_send(event).is_err() {
                        warn!(connection_id = %connection_id, "Reply dropped, socket buffer full");
                    }
                }
            }
            Ok(Message::Close(_)) => break,
            Err(error) => {
                warn!(connection_id = %connection_id, error = %error, "Combat socket error");
                break;
            }
            Ok(_) => {}
        }
    }

    send_task.abort();
    info!(campaign_id = %campaign_id, connection_id = %connection_id, "Combat socket closed");
}

/// Runs one inbound protocol message through the coordinator. Rejections
/// and unreadable messages come back as a single `combat:error`.
pub async fn respond(state: &AppState, campaign_id: Uuid, text: &str) -> Vec<CombatEvent> {
    let command = match serde_json::from_str::<CombatCommand>(text) {
        Ok(command) => command,
        Err(error) => {
            return vec![CombatEvent::Error {
                code: "invalid_message".to_owned(),
                message: error.to_string(),
            }];
        }
    };
    match state.combat.handle(campaign_id, command).await {
        Ok(events) => events,
        Err(error) => vec![CombatEvent::from(&error)],
    }
}

/// Returns the router for combat.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{campaign_id}/combat", get(combat_snapshot))
        .route("/{campaign_id}/combat/ws", get(combat_socket))
}
