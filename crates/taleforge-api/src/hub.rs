//! Per-campaign fan-out of combat events to connected sockets.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use taleforge_combat::domain::messages::CombatEvent;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events buffered per campaign before slow sockets start lagging.
const CHANNEL_CAPACITY: usize = 64;

/// One broadcast channel per campaign, created by the first subscriber and
/// dropped once a publish finds nobody listening.
#[derive(Debug, Default)]
pub struct CombatHub {
    channels: Mutex<HashMap<Uuid, broadcast::Sender<CombatEvent>>>,
}

impl CombatHub {
    /// Subscribes to the events of `campaign_id`.
    pub fn subscribe(&self, campaign_id: Uuid) -> broadcast::Receiver<CombatEvent> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(campaign_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Sends `event` to every subscriber of `campaign_id` and returns how
    /// many received it.
    pub fn publish(&self, campaign_id: Uuid, event: CombatEvent) -> usize {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = channels.get(&campaign_id) else {
            return 0;
        };
        if let Ok(delivered) = sender.send(event) {
            delivered
        } else {
            channels.remove(&campaign_id);
            0
        }
    }
}
