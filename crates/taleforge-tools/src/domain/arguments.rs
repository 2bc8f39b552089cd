//! Typed argument payloads for each tool.
//!
//! Models occasionally send numbers as strings (`"quantity": "2"`) or floats
//! (`"amount": -3.0`); numeric fields accept both. Anything else that does
//! not match the shape is rejected before a handler runs.

use serde::{Deserialize, Deserializer, de};
use serde_json::Value;

use crate::domain::catalog::ToolName;
use crate::error::ToolError;

/// Arguments of `roll_dice`.
#[derive(Debug, Clone, Deserialize)]
pub struct RollDiceArgs {
    /// Dice notation.
    pub notation: String,
    /// Why the dice are rolled.
    #[serde(default)]
    pub reason: Option<String>,
    /// Difficulty class.
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub dc: Option<i64>,
}

/// Arguments of `add_item`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddItemArgs {
    /// Item name.
    pub item_name: String,
    /// How many; defaults to 1.
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub quantity: Option<i64>,
    /// Flavour text.
    #[serde(default)]
    pub description: Option<String>,
}

/// Arguments of `remove_item`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoveItemArgs {
    /// Item name.
    pub item_name: String,
    /// How many; defaults to 1.
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub quantity: Option<i64>,
}

/// Arguments of `update_hp`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateHpArgs {
    /// Signed change.
    #[serde(deserialize_with = "lenient_i64")]
    pub amount: i64,
    /// Cause of the change.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Arguments of `update_gold` and `award_xp`.
#[derive(Debug, Clone, Deserialize)]
pub struct AmountArgs {
    /// Signed amount.
    #[serde(deserialize_with = "lenient_i64")]
    pub amount: i64,
}

/// One enemy entry of `start_combat`.
#[derive(Debug, Clone, Deserialize)]
pub struct EnemyArgs {
    /// Name; numbered when `quantity > 1`.
    pub name: String,
    /// Hit points.
    #[serde(deserialize_with = "lenient_i64")]
    pub hp: i64,
    /// Armor class.
    #[serde(deserialize_with = "lenient_i64")]
    pub ac: i64,
    /// Dexterity score.
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub dexterity: Option<i64>,
    /// Level or challenge rating.
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub level: Option<i64>,
    /// Group size.
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub quantity: Option<i64>,
}

/// Arguments of `start_combat`.
#[derive(Debug, Clone, Deserialize)]
pub struct StartCombatArgs {
    /// Opposing side.
    pub enemies: Vec<EnemyArgs>,
}

/// Arguments of `upsert_world_entity`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertWorldEntityArgs {
    /// `npc`, `location`, `item`, `faction` or `creature`.
    pub entity_type: String,
    /// Display name.
    pub name: String,
    /// New information about the entity.
    #[serde(default)]
    pub description: Option<String>,
}

/// Arguments of `update_quest`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateQuestArgs {
    /// Quest title, matched case-insensitively.
    pub title: String,
    /// `active`, `completed` or `failed`.
    #[serde(default)]
    pub status: Option<String>,
    /// Replacement description.
    #[serde(default)]
    pub description: Option<String>,
    /// Newly revealed objective.
    #[serde(default)]
    pub objective: Option<String>,
}

/// Parses a raw argument payload into `T`.
///
/// An empty payload is treated as `{}` so tools whose arguments are all
/// optional still run.
///
/// # Errors
///
/// Returns `ToolError::Argument` if the payload is not a JSON object or does
/// not match `T`.
pub fn parse<T: de::DeserializeOwned>(tool: ToolName, raw: &str) -> Result<T, ToolError> {
    let argument_error = |message: String| ToolError::Argument {
        tool: tool.as_str(),
        message,
    };
    let raw = raw.trim();
    let value: Value = if raw.is_empty() {
        Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_str(raw).map_err(|e| argument_error(format!("not valid JSON: {e}")))?
    };
    if !value.is_object() {
        return Err(argument_error("expected a JSON object".to_owned()));
    }
    serde_json::from_value(value).map_err(|e| argument_error(e.to_string()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Numeric {
    #[allow(clippy::cast_possible_truncation)]
    fn into_i64<E: de::Error>(self) -> Result<i64, E> {
        match self {
            Self::Int(n) => Ok(n),
            Self::Float(f) if f.is_finite() && f.fract().abs() < f64::EPSILON => Ok(f as i64),
            Self::Float(f) => Err(E::custom(format!("expected a whole number, got {f}"))),
            Self::Text(s) => s
                .trim()
                .trim_start_matches('+')
                .parse()
                .map_err(|_| E::custom(format!("expected a number, got {s:?}"))),
        }
    }
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Numeric::deserialize(deserializer)?.into_i64()
}

fn lenient_opt_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Option::<Numeric>::deserialize(deserializer)?
        .map(Numeric::into_i64)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_accept_strings_and_whole_floats() {
        let args: AddItemArgs =
            parse(ToolName::AddItem, r#"{"item_name": "Torch", "quantity": "3"}"#).unwrap();
        assert_eq!(args.quantity, Some(3));

        let args: UpdateHpArgs = parse(ToolName::UpdateHp, r#"{"amount": -4.0}"#).unwrap();
        assert_eq!(args.amount, -4);

        let args: AmountArgs = parse(ToolName::UpdateGold, r#"{"amount": "+12"}"#).unwrap();
        assert_eq!(args.amount, 12);
    }

    #[test]
    fn test_fractional_and_textual_numbers_are_rejected() {
        assert!(parse::<UpdateHpArgs>(ToolName::UpdateHp, r#"{"amount": 2.5}"#).is_err());
        assert!(parse::<UpdateHpArgs>(ToolName::UpdateHp, r#"{"amount": "lots"}"#).is_err());
    }

    #[test]
    fn test_malformed_payloads_name_the_tool() {
        let error = parse::<AddItemArgs>(ToolName::AddItem, "{item_name: Torch").unwrap_err();

        assert!(matches!(error, ToolError::Argument { tool: "add_item", .. }));
        assert!(parse::<AmountArgs>(ToolName::AwardXp, "[50]").is_err());
        assert!(parse::<AddItemArgs>(ToolName::AddItem, "").is_err());
    }

    #[test]
    fn test_null_optional_fields_are_none() {
        let args: RollDiceArgs =
            parse(ToolName::RollDice, r#"{"notation": "1d20", "dc": null}"#).unwrap();

        assert_eq!(args.dc, None);
        assert_eq!(args.reason, None);
    }
}
