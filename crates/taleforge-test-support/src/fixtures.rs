//! Record fixtures.

use taleforge_core::error::DomainError;
use taleforge_core::memory_store::InMemoryGameStore;
use taleforge_core::model::{Campaign, CampaignSettings, Character};
use taleforge_core::store::GameStore;
use uuid::Uuid;

/// A campaign set in a harbour town.
#[must_use]
pub fn sample_campaign() -> Campaign {
    Campaign {
        id: Uuid::new_v4(),
        name: "Saltmarsh Nights".to_owned(),
        settings: CampaignSettings {
            setting: Some("A fog-bound smugglers' harbour".to_owned()),
            current_location: Some("The Rusty Anchor".to_owned()),
            game_time: Some("Day 1, 20:00".to_owned()),
            ..CampaignSettings::default()
        },
    }
}

/// A level 1 ranger with 20/20 HP, DEX 14 and 15 gold.
#[must_use]
pub fn sample_character(campaign_id: Uuid) -> Character {
    Character {
        id: Uuid::new_v4(),
        campaign_id,
        name: "Aria".to_owned(),
        class: "Ranger".to_owned(),
        race: "Elf".to_owned(),
        level: 1,
        xp: 0,
        hp: 20,
        max_hp: 20,
        ac: 14,
        dexterity: 14,
        gold: 15,
        inventory: Vec::new(),
    }
}

/// An in-memory store holding [`sample_campaign`] and one
/// [`sample_character`].
///
/// # Errors
///
/// Returns `DomainError` if seeding fails.
pub async fn seeded_store() -> Result<(InMemoryGameStore, Campaign, Character), DomainError> {
    let store = InMemoryGameStore::new();
    let campaign = sample_campaign();
    let character = sample_character(campaign.id);
    store.save_campaign(&campaign).await?;
    store.insert_character(character.clone())?;
    Ok((store, campaign, character))
}
