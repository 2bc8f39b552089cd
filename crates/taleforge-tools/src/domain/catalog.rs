//! The functions the narrator model may call, with their JSON schemas.

use std::fmt;
use std::str::FromStr;

use serde_json::{Value, json};
use taleforge_llm::provider::ToolDefinition;

use crate::error::ToolError;

/// Every tool the executor knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    /// Pure dice roll with optional DC comparison.
    RollDice,
    /// Add to the acting character's inventory.
    AddItem,
    /// Remove from the acting character's inventory.
    RemoveItem,
    /// Heal or damage the acting character.
    UpdateHp,
    /// Give or take gold.
    UpdateGold,
    /// Award experience.
    AwardXp,
    /// Roll initiative and open an encounter.
    StartCombat,
    /// Create or enrich an NPC, place, item, faction or creature.
    UpsertWorldEntity,
    /// Create or update a quest.
    UpdateQuest,
}

impl ToolName {
    /// All tools, in catalog order.
    pub const ALL: [Self; 9] = [
        Self::RollDice,
        Self::AddItem,
        Self::RemoveItem,
        Self::UpdateHp,
        Self::UpdateGold,
        Self::AwardXp,
        Self::StartCombat,
        Self::UpsertWorldEntity,
        Self::UpdateQuest,
    ];

    /// Function name as exposed to the model.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RollDice => "roll_dice",
            Self::AddItem => "add_item",
            Self::RemoveItem => "remove_item",
            Self::UpdateHp => "update_hp",
            Self::UpdateGold => "update_gold",
            Self::AwardXp => "award_xp",
            Self::StartCombat => "start_combat",
            Self::UpsertWorldEntity => "upsert_world_entity",
            Self::UpdateQuest => "update_quest",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::RollDice => {
                "Roll dice for a check, save or random outcome. Use this instead of inventing a result."
            }
            Self::AddItem => "Give the acting character an item. Existing stacks are merged.",
            Self::RemoveItem => "Take an item from the acting character (used, sold, lost).",
            Self::UpdateHp => {
                "Change the acting character's hit points. Negative for damage, positive for healing."
            }
            Self::UpdateGold => "Change the acting character's gold. Negative when spending.",
            Self::AwardXp => "Award experience points to the acting character.",
            Self::StartCombat => {
                "Start a combat encounter against the listed enemies. Initiative is rolled for you."
            }
            Self::UpsertWorldEntity => {
                "Record a new or updated NPC, location, item, faction or creature in the world."
            }
            Self::UpdateQuest => "Create a quest or update its status, description or objectives.",
        }
    }

    fn parameters(self) -> Value {
        match self {
            Self::RollDice => object(
                &json!({
                    "notation": {"type": "string", "description": "Dice notation such as 1d20+3 or 2d6"},
                    "reason": {"type": "string", "description": "What the roll is for"},
                    "dc": {"type": "integer", "description": "Difficulty class to beat, if any"}
                }),
                &["notation"],
            ),
            Self::AddItem => object(
                &json!({
                    "item_name": {"type": "string"},
                    "quantity": {"type": "integer", "minimum": 1, "default": 1},
                    "description": {"type": "string"}
                }),
                &["item_name"],
            ),
            Self::RemoveItem => object(
                &json!({
                    "item_name": {"type": "string"},
                    "quantity": {"type": "integer", "minimum": 1, "default": 1}
                }),
                &["item_name"],
            ),
            Self::UpdateHp => object(
                &json!({
                    "amount": {"type": "integer", "description": "Signed change in hit points"},
                    "reason": {"type": "string"}
                }),
                &["amount"],
            ),
            Self::UpdateGold => object(
                &json!({
                    "amount": {"type": "integer", "description": "Signed change in gold pieces"}
                }),
                &["amount"],
            ),
            Self::AwardXp => object(
                &json!({
                    "amount": {"type": "integer", "minimum": 0}
                }),
                &["amount"],
            ),
            Self::StartCombat => object(
                &json!({
                    "enemies": {
                        "type": "array",
                        "minItems": 1,
                        "items": object(
                            &json!({
                                "name": {"type": "string"},
                                "hp": {"type": "integer", "minimum": 1},
                                "ac": {"type": "integer"},
                                "dexterity": {"type": "integer", "default": 10},
                                "level": {"type": "integer"},
                                "quantity": {"type": "integer", "minimum": 1, "default": 1}
                            }),
                            &["name", "hp", "ac"],
                        )
                    }
                }),
                &["enemies"],
            ),
            Self::UpsertWorldEntity => object(
                &json!({
                    "entity_type": {
                        "type": "string",
                        "enum": ["npc", "location", "item", "faction", "creature"]
                    },
                    "name": {"type": "string"},
                    "description": {"type": "string"}
                }),
                &["entity_type", "name"],
            ),
            Self::UpdateQuest => object(
                &json!({
                    "title": {"type": "string"},
                    "status": {"type": "string", "enum": ["active", "completed", "failed"]},
                    "description": {"type": "string"},
                    "objective": {"type": "string", "description": "A newly revealed objective"}
                }),
                &["title"],
            ),
        }
    }
}

fn object(properties: &Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s.trim())
            .ok_or_else(|| ToolError::UnknownTool(s.to_owned()))
    }
}

/// The declarative tool surface attached to every narrator dispatch.
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    definitions: Vec<ToolDefinition>,
}

impl ToolCatalog {
    /// The full game catalog.
    #[must_use]
    pub fn standard() -> Self {
        let definitions = ToolName::ALL
            .into_iter()
            .map(|tool| ToolDefinition {
                name: tool.as_str().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.parameters(),
            })
            .collect();
        Self { definitions }
    }

    /// Definitions in catalog order.
    #[must_use]
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Looks a definition up by function name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_tool_declares_an_object_schema_with_required_fields() {
        let catalog = ToolCatalog::standard();

        assert_eq!(catalog.definitions().len(), ToolName::ALL.len());
        for definition in catalog.definitions() {
            assert_eq!(definition.parameters["type"], "object", "{}", definition.name);
            let required = definition.parameters["required"].as_array().unwrap();
            assert!(!required.is_empty(), "{} has no required fields", definition.name);
            for field in required {
                let field = field.as_str().unwrap();
                assert!(
                    definition.parameters["properties"].get(field).is_some(),
                    "{} requires undeclared {field}",
                    definition.name
                );
            }
        }
    }

    #[test]
    fn test_start_combat_schema_requires_enemy_stats() {
        let catalog = ToolCatalog::standard();

        let start = catalog.get("start_combat").unwrap();

        assert_eq!(
            start.parameters["properties"]["enemies"]["items"]["required"],
            json!(["name", "hp", "ac"])
        );
    }

    #[test]
    fn test_tool_names_parse_and_reject_unknown() {
        assert_eq!("award_xp".parse::<ToolName>().unwrap(), ToolName::AwardXp);
        assert!(matches!(
            "cast_fireball".parse::<ToolName>(),
            Err(ToolError::UnknownTool(name)) if name == "cast_fireball"
        ));
    }
}
