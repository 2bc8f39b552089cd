//! One handler per tool.
//!
//! Handlers receive already-typed arguments and mutate only the
//! [`WorkingSet`]. Each either applies its whole effect or leaves the set as
//! it found it.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Value, json};
use taleforge_combat::domain::initiative::{CombatStart, CombatantSpec};
use taleforge_core::canonical::{canonical_name, qualified_canonical_name};
use taleforge_core::clock::Clock;
use taleforge_core::dice::DiceExpr;
use taleforge_core::error::DomainError;
use taleforge_core::model::{EntityType, Quest, QuestStatus, WorldEntity};
use taleforge_core::rng::DeterministicRng;
use uuid::Uuid;

use crate::domain::arguments::{
    AddItemArgs, AmountArgs, EnemyArgs, RemoveItemArgs, RollDiceArgs, StartCombatArgs,
    UpdateHpArgs, UpdateQuestArgs, UpsertWorldEntityArgs,
};
use crate::domain::catalog::ToolName;
use crate::domain::working_set::WorkingSet;
use crate::error::ToolError;

/// A successful tool run.
#[derive(Debug, Clone, PartialEq)]
pub struct Handled {
    /// Structured outcome returned to the model.
    pub outcome: Value,
    /// One line for the recent-event log.
    pub summary: String,
}

fn argument(tool: ToolName, message: impl Into<String>) -> ToolError {
    ToolError::Argument {
        tool: tool.as_str(),
        message: message.into(),
    }
}

fn rejected(tool: ToolName, error: DomainError) -> ToolError {
    match error {
        DomainError::Validation(message) => ToolError::Execution {
            tool: tool.as_str(),
            message,
        },
        other => ToolError::Store(other),
    }
}

fn required_text(tool: ToolName, field: &str, value: &str) -> Result<String, ToolError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(argument(tool, format!("{field} must not be empty")));
    }
    Ok(trimmed.to_owned())
}

fn quantity(tool: ToolName, raw: Option<i64>) -> Result<u32, ToolError> {
    let raw = raw.unwrap_or(1);
    u32::try_from(raw)
        .ok()
        .filter(|q| *q >= 1)
        .ok_or_else(|| argument(tool, format!("quantity must be a positive whole number, got {raw}")))
}

fn saturating_i32(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

fn to_outcome(tool: ToolName, value: &impl Serialize) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::Execution {
        tool: tool.as_str(),
        message: format!("outcome serialization failed: {e}"),
    })
}

/// Rolls dice. Pure: the working set is not touched.
///
/// # Errors
///
/// Returns `ToolError::Argument` for unparsable notation.
pub fn roll_dice(args: &RollDiceArgs, rng: &mut dyn DeterministicRng) -> Result<Handled, ToolError> {
    let tool = ToolName::RollDice;
    let expr: DiceExpr = args
        .notation
        .parse()
        .map_err(|e: DomainError| argument(tool, e.to_string()))?;
    let roll = expr.roll(rng);
    let success = args.dc.map(|dc| i64::from(roll.total) >= dc);

    let reason = args
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());
    let mut summary = match reason {
        Some(reason) => format!("Rolled {expr} for {reason}: {}", roll.total),
        None => format!("Rolled {expr}: {}", roll.total),
    };
    if let (Some(dc), Some(success)) = (args.dc, success) {
        let verdict = if success { "success" } else { "failure" };
        summary.push_str(&format!(" vs DC {dc} ({verdict})"));
    }

    Ok(Handled {
        outcome: json!({
            "notation": expr.to_string(),
            "rolls": roll.rolls,
            "modifier": roll.modifier,
            "total": roll.total,
            "dc": args.dc,
            "success": success,
        }),
        summary,
    })
}

/// Adds items, merging into an existing line case-insensitively.
///
/// # Errors
///
/// Returns `ToolError::Argument` for an empty name or non-positive quantity.
pub fn add_item(set: &mut WorkingSet, args: AddItemArgs) -> Result<Handled, ToolError> {
    let tool = ToolName::AddItem;
    let name = required_text(tool, "item_name", &args.item_name)?;
    let quantity = quantity(tool, args.quantity)?;
    let description = args
        .description
        .map(|d| d.trim().to_owned())
        .filter(|d| !d.is_empty());

    let total = set
        .update_character(|c| c.add_item(&name, quantity, description))
        .map_err(|e| rejected(tool, e))?;
    set.record_inventory(&name, i64::from(quantity));

    Ok(Handled {
        outcome: json!({
            "item": name,
            "quantity_added": quantity,
            "total_quantity": total,
        }),
        summary: format!(
            "{} gained {quantity} {name} ({total} carried)",
            set.character().name
        ),
    })
}

/// Removes items; the line disappears at zero.
///
/// # Errors
///
/// Returns `ToolError::Execution` if the item is not carried in that
/// quantity.
pub fn remove_item(set: &mut WorkingSet, args: &RemoveItemArgs) -> Result<Handled, ToolError> {
    let tool = ToolName::RemoveItem;
    let name = required_text(tool, "item_name", &args.item_name)?;
    let quantity = quantity(tool, args.quantity)?;

    let remaining = set
        .update_character(|c| c.remove_item(&name, quantity))
        .map_err(|e| rejected(tool, e))?;
    set.record_inventory(&name, -i64::from(quantity));

    Ok(Handled {
        outcome: json!({
            "item": name,
            "quantity_removed": quantity,
            "remaining": remaining,
        }),
        summary: format!(
            "{} lost {quantity} {name} ({remaining} left)",
            set.character().name
        ),
    })
}

/// Applies a signed HP change, clamped to `[0, max_hp]`.
///
/// # Errors
///
/// Never fails once the arguments parsed.
pub fn update_hp(set: &mut WorkingSet, args: &UpdateHpArgs) -> Result<Handled, ToolError> {
    let delta = saturating_i32(args.amount);
    let previous = set.character().hp;
    let hp = set.update_character(|c| Ok::<_, ToolError>(c.set_hp(previous.saturating_add(delta))))?;
    let character = set.character();

    let change = hp - previous;
    let mut summary = match change {
        0 => format!("{} HP unchanged", character.name),
        c if c < 0 => format!("{} took {} damage", character.name, -c),
        c => format!("{} healed {c}", character.name),
    };
    summary.push_str(&format!(" ({hp}/{} HP)", character.max_hp));
    if let Some(reason) = args.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        summary.push_str(&format!(": {reason}"));
    }

    Ok(Handled {
        outcome: json!({
            "previous_hp": previous,
            "hp": hp,
            "max_hp": character.max_hp,
            "change": change,
            "down": hp == 0,
        }),
        summary,
    })
}

/// Applies a signed gold change.
///
/// # Errors
///
/// Returns `ToolError::Execution` if the balance would go negative.
pub fn update_gold(set: &mut WorkingSet, args: &AmountArgs) -> Result<Handled, ToolError> {
    let tool = ToolName::UpdateGold;
    let previous = set.character().gold;
    let gold = set
        .update_character(|c| c.adjust_gold(args.amount))
        .map_err(|e| rejected(tool, e))?;

    let name = &set.character().name;
    let summary = if args.amount >= 0 {
        format!("{name} gained {} gold ({gold} total)", args.amount)
    } else {
        format!("{name} spent {} gold ({gold} left)", -args.amount)
    };
    Ok(Handled {
        outcome: json!({ "previous_gold": previous, "gold": gold }),
        summary,
    })
}

/// Awards experience and recomputes the level.
///
/// # Errors
///
/// Returns `ToolError::Argument` for a negative amount.
pub fn award_xp(set: &mut WorkingSet, args: &AmountArgs) -> Result<Handled, ToolError> {
    let tool = ToolName::AwardXp;
    if args.amount < 0 {
        return Err(argument(tool, "amount must not be negative"));
    }
    let amount = u32::try_from(args.amount).unwrap_or(u32::MAX);
    let award = set.update_character(|c| Ok::<_, ToolError>(c.award_xp(amount)))?;

    let name = &set.character().name;
    let mut summary = format!("{name} earned {amount} XP");
    if award.leveled_up {
        summary.push_str(&format!(" and reached level {}", award.level));
    }
    Ok(Handled {
        outcome: to_outcome(tool, &award)?,
        summary,
    })
}

fn enemy_spec(tool: ToolName, enemy: EnemyArgs) -> Result<CombatantSpec, ToolError> {
    let name = required_text(tool, "enemy name", &enemy.name)?;
    if enemy.hp < 1 {
        return Err(argument(tool, format!("{name} needs at least 1 hp")));
    }
    Ok(CombatantSpec {
        id: None,
        name,
        hp: saturating_i32(enemy.hp),
        max_hp: None,
        ac: saturating_i32(enemy.ac),
        dexterity: enemy.dexterity.map_or(10, saturating_i32),
        is_player: false,
        level: enemy.level.and_then(|l| u32::try_from(l).ok()),
        quantity: enemy.quantity.and_then(|q| u32::try_from(q).ok()),
        initiative: None,
        conditions: BTreeSet::new(),
        resistances: BTreeSet::new(),
        vulnerabilities: BTreeSet::new(),
        immunities: BTreeSet::new(),
    })
}

/// Rolls initiative for the acting character and every enemy. The
/// encounter itself is opened by the orchestrator after the turn commits.
///
/// # Errors
///
/// Returns `ToolError::Argument` for an empty or invalid enemy list and
/// `ToolError::Execution` if an encounter is already running or combat was
/// already started in this batch.
pub fn start_combat(
    set: &mut WorkingSet,
    args: StartCombatArgs,
    rng: &mut dyn DeterministicRng,
) -> Result<Handled, ToolError> {
    let tool = ToolName::StartCombat;
    if set.encounter_running() {
        return Err(ToolError::Execution {
            tool: tool.as_str(),
            message: "an encounter is already running".to_owned(),
        });
    }
    if set.combat_start().is_some() {
        return Err(ToolError::Execution {
            tool: tool.as_str(),
            message: "combat was already started this turn".to_owned(),
        });
    }
    if args.enemies.is_empty() {
        return Err(argument(tool, "at least one enemy is required"));
    }
    let enemies = args
        .enemies
        .into_iter()
        .map(|enemy| enemy_spec(tool, enemy))
        .collect::<Result<Vec<_>, _>>()?;

    let character = set.character();
    let player = CombatantSpec {
        id: Some(character.id.to_string()),
        name: character.name.clone(),
        hp: character.hp,
        max_hp: Some(character.max_hp),
        ac: character.ac,
        dexterity: character.dexterity,
        is_player: true,
        level: Some(character.level),
        quantity: None,
        initiative: None,
        conditions: BTreeSet::new(),
        resistances: BTreeSet::new(),
        vulnerabilities: BTreeSet::new(),
        immunities: BTreeSet::new(),
    };

    let start = CombatStart::roll(vec![player], enemies, rng);
    let names: Vec<&str> = start.enemies.iter().map(|e| e.name.as_str()).collect();
    let summary = format!("Combat started against {}", names.join(", "));
    let outcome = to_outcome(tool, &start)?;
    set.set_combat_start(start);

    Ok(Handled { outcome, summary })
}

/// Creates or enriches a world entity keyed by canonical name.
///
/// The plain canonical name is tried first. If it already belongs to an
/// entity of another type, the type-qualified key is used instead, so a
/// tavern and its owner can share a name.
///
/// # Errors
///
/// Returns `ToolError::Argument` for an unknown type or empty name.
pub fn upsert_world_entity(
    set: &mut WorkingSet,
    args: &UpsertWorldEntityArgs,
    clock: &dyn Clock,
) -> Result<Handled, ToolError> {
    let tool = ToolName::UpsertWorldEntity;
    let entity_type: EntityType = args
        .entity_type
        .parse()
        .map_err(|e: DomainError| argument(tool, e.to_string()))?;
    let name = required_text(tool, "name", &args.name)?;

    let plain = canonical_name(&name);
    let key = match set.entity(&plain) {
        Some(existing) if existing.entity_type != entity_type => {
            qualified_canonical_name(entity_type, &name)
        }
        _ => plain,
    };

    let (entity, created) = match set.entity(&key) {
        Some(existing) => {
            let mut entity = existing.clone();
            entity.name.clone_from(&name);
            entity.absorb_description(args.description.as_deref().unwrap_or_default());
            entity.updated_at = clock.now();
            (entity, false)
        }
        None => {
            let mut entity = WorldEntity {
                id: Uuid::new_v4(),
                campaign_id: set.campaign_id(),
                canonical_name: key,
                name: name.clone(),
                entity_type,
                description: String::new(),
                updated_at: clock.now(),
            };
            entity.absorb_description(args.description.as_deref().unwrap_or_default());
            (entity, true)
        }
    };

    let verb = if created { "Discovered" } else { "Updated" };
    let summary = format!("{verb} {entity_type} {name}");
    let outcome = json!({
        "id": entity.id,
        "canonical_name": entity.canonical_name,
        "name": entity.name,
        "entity_type": entity_type,
        "created": created,
    });
    set.put_entity(entity);

    Ok(Handled { outcome, summary })
}

/// Creates a quest or updates one matched by case-insensitive title.
///
/// # Errors
///
/// Returns `ToolError::Argument` for an empty title or unknown status.
pub fn update_quest(set: &mut WorkingSet, args: UpdateQuestArgs) -> Result<Handled, ToolError> {
    let tool = ToolName::UpdateQuest;
    let title = required_text(tool, "title", &args.title)?;
    let status = args
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<QuestStatus>)
        .transpose()
        .map_err(|e| argument(tool, e.to_string()))?;
    let description = args
        .description
        .map(|d| d.trim().to_owned())
        .filter(|d| !d.is_empty());
    let objective = args
        .objective
        .map(|o| o.trim().to_owned())
        .filter(|o| !o.is_empty());

    let (quest, created) = if let Some(quest) = set.quest_by_title_mut(&title) {
        if let Some(status) = status {
            quest.status = status;
        }
        if let Some(description) = description {
            quest.description = description;
        }
        if let Some(objective) = objective {
            let known = quest
                .objectives
                .iter()
                .any(|o| o.eq_ignore_ascii_case(&objective));
            if !known {
                quest.objectives.push(objective);
            }
        }
        (quest.clone(), false)
    } else {
        let quest = Quest {
            id: Uuid::new_v4(),
            campaign_id: set.campaign_id(),
            title,
            description: description.unwrap_or_default(),
            status: status.unwrap_or(QuestStatus::Active),
            objectives: objective.into_iter().collect(),
        };
        set.insert_quest(quest.clone());
        (quest, true)
    };

    let summary = if created {
        format!("New quest: {}", quest.title)
    } else {
        format!("Quest updated: {} ({})", quest.title, status_label(quest.status))
    };
    Ok(Handled {
        outcome: json!({
            "id": quest.id,
            "title": quest.title,
            "status": quest.status,
            "objectives": quest.objectives,
            "created": created,
        }),
        summary,
    })
}

fn status_label(status: QuestStatus) -> &'static str {
    match status {
        QuestStatus::Active => "active",
        QuestStatus::Completed => "completed",
        QuestStatus::Failed => "failed",
    }
}
