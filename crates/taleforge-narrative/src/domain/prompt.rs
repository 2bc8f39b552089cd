//! Prompt rendering.
//!
//! Exploration and combat use different system instructions and different
//! context: combat drops lore and NPC detail and lists the turn order with
//! hit points and armor class; exploration drops combat statistics and
//! carries the world instead.

use taleforge_core::context::DmContext;
use taleforge_core::model::{Character, ChatRole, QuestStatus, WorldEntity};
use taleforge_tools::application::executor::ToolResult;

/// How many world entities of each kind are shown during exploration.
pub const MAX_ENTITIES_PER_SECTION: usize = 12;

/// A prompt split into its system and user segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Instructions and game state.
    pub system: String,
    /// The request itself.
    pub user: String,
}

/// Which set of instructions a turn is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    /// Free roaming, dialogue and investigation.
    Exploration,
    /// An encounter is running.
    Combat,
}

impl PromptMode {
    /// Mode for a context.
    #[must_use]
    pub fn for_context(context: &DmContext) -> Self {
        if context.in_combat() {
            Self::Combat
        } else {
            Self::Exploration
        }
    }
}

const EXPLORATION_RULES: &str = "\
You are the Dungeon Master of a tabletop role-playing campaign. Narrate the consequences of \
the player's action in vivid second person, in at most three short paragraphs, and end on a \
prompt for what they do next.
Every mechanical change goes through a tool call: items gained or lost, hit points, gold, \
experience, quests, new people and places, and the start of a fight. Use roll_dice whenever \
an outcome is uncertain. Never state a number, roll or item change you did not get from a tool.";

const COMBAT_RULES: &str = "\
You are the Dungeon Master running a combat encounter. Narrate the exchange tersely and \
cinematically in at most two short paragraphs. Attacks between combatants are resolved by the \
combat system, not by you; describe only what the player attempts and what the tools report. \
Use roll_dice for checks and update_hp only for damage or healing outside attacks. Never \
invent rolls or damage.";

const RECONCILE_RULES: &str = "\
You are revising a Dungeon Master's narration. The tool results are ground truth: every roll, \
hit point total, item, gold amount, level and quest state in your text must match them exactly. \
Failed tool calls did not happen; do not narrate their effects. Do not invent any number or \
outcome the results do not contain, and do not call tools. Reply with the final narration only.";

const EXTRACTION_RULES: &str = "\
You extract world entities from role-playing narration. Reply with a JSON array only, no prose. \
Each element is an object with \"type\" (one of npc, location, item, faction, creature), \"name\" \
and a one-sentence \"description\" of what the narration reveals. Include only named entities. \
Reply [] when there are none.";

fn character_line(character: &Character, mode: PromptMode) -> String {
    let mut line = format!(
        "{}, level {} {} {}. HP {}/{}",
        character.name,
        character.level,
        character.race,
        character.class,
        character.hp,
        character.max_hp
    );
    if mode == PromptMode::Combat {
        line.push_str(&format!(", AC {}, DEX {}", character.ac, character.dexterity));
    }
    line.push_str(&format!(", {} gold, {} XP.", character.gold, character.xp));
    line
}

fn inventory_line(character: &Character) -> String {
    if character.inventory.is_empty() {
        return "Inventory: empty.".to_owned();
    }
    let items: Vec<String> = character
        .inventory
        .iter()
        .map(|item| match item.quantity {
            1 => item.name.clone(),
            n => format!("{} x{n}", item.name),
        })
        .collect();
    format!("Inventory: {}.", items.join(", "))
}

fn entity_lines(entities: &[WorldEntity], tagged: bool) -> Vec<String> {
    entities
        .iter()
        .take(MAX_ENTITIES_PER_SECTION)
        .map(|e| {
            let tag = if tagged {
                format!("[{}] ", e.entity_type)
            } else {
                String::new()
            };
            if e.description.is_empty() {
                format!("- {tag}{}", e.name)
            } else {
                format!("- {tag}{}: {}", e.name, e.description)
            }
        })
        .collect()
}

fn exploration_context(context: &DmContext, lines: &mut Vec<String>) {
    let quests: Vec<String> = context
        .quests
        .iter()
        .filter(|q| q.status == QuestStatus::Active)
        .map(|q| {
            let mut line = format!("- {}", q.title);
            if !q.description.is_empty() {
                line.push_str(&format!(": {}", q.description));
            }
            if !q.objectives.is_empty() {
                line.push_str(&format!(" (objectives: {})", q.objectives.join("; ")));
            }
            line
        })
        .collect();
    if !quests.is_empty() {
        lines.push("\n## Active quests".to_owned());
        lines.extend(quests);
    }
    if !context.npcs.is_empty() {
        lines.push("\n## Known people".to_owned());
        lines.extend(entity_lines(&context.npcs, false));
    }
    if !context.lore.is_empty() {
        lines.push("\n## Known places and things".to_owned());
        lines.extend(entity_lines(&context.lore, true));
    }
    if !context.campaign.summaries.is_empty() {
        lines.push("\n## Story so far".to_owned());
        lines.extend(context.campaign.summaries.iter().map(|s| format!("- {s}")));
    }
}

fn combat_context(context: &DmContext, lines: &mut Vec<String>) {
    let Some(combat) = context.combat.as_ref() else {
        return;
    };
    lines.push(format!("\n## Combat, round {}", combat.round));
    let current = combat.current().map(|c| c.id.as_str());
    for combatant in &combat.turn_order {
        let marker = if Some(combatant.id.as_str()) == current {
            "> "
        } else {
            "- "
        };
        let side = if combatant.is_player { "ally" } else { "enemy" };
        let mut line = format!(
            "{marker}{} ({side}) HP {}/{} AC {} init {}",
            combatant.name, combatant.hp, combatant.max_hp, combatant.ac, combatant.initiative
        );
        if combatant.is_down() {
            line.push_str(" DOWN");
        }
        if !combatant.conditions.is_empty() {
            let conditions: Vec<&str> = combatant.conditions.iter().map(String::as_str).collect();
            line.push_str(&format!(" [{}]", conditions.join(", ")));
        }
        lines.push(line);
    }
}

/// System and user segments for the first dispatch of a turn.
#[must_use]
pub fn turn_prompt(context: &DmContext, speaker: &str, action: &str) -> Prompt {
    let mode = PromptMode::for_context(context);
    let rules = match mode {
        PromptMode::Exploration => EXPLORATION_RULES,
        PromptMode::Combat => COMBAT_RULES,
    };

    let mut lines = vec![rules.to_owned(), format!("\n# Campaign: {}", context.campaign.name)];
    if let Some(setting) = &context.campaign.setting {
        lines.push(format!("Setting: {setting}"));
    }
    if let Some(location) = &context.location {
        lines.push(format!("Location: {location}"));
    }
    if let Some(time) = &context.campaign.game_time {
        lines.push(format!("Time: {time}"));
    }

    lines.push("\n## Acting character".to_owned());
    lines.push(character_line(&context.character, mode));
    lines.push(inventory_line(&context.character));

    let companions: Vec<String> = context
        .party
        .iter()
        .filter(|c| c.id != context.character.id)
        .map(|c| format!("- {}", character_line(c, mode)))
        .collect();
    if !companions.is_empty() {
        lines.push("\n## Party".to_owned());
        lines.extend(companions);
    }

    match mode {
        PromptMode::Exploration => exploration_context(context, &mut lines),
        PromptMode::Combat => combat_context(context, &mut lines),
    }

    if !context.campaign.recent_events.is_empty() {
        lines.push("\n## Recent events".to_owned());
        lines.extend(context.campaign.recent_events.iter().map(|e| format!("- {e}")));
    }

    Prompt {
        system: lines.join("\n"),
        user: user_segment(context, speaker, action),
    }
}

fn user_segment(context: &DmContext, speaker: &str, action: &str) -> String {
    let mut lines: Vec<String> = context
        .recent_turns
        .iter()
        .map(|turn| {
            let who = match (turn.role, turn.speaker.as_deref()) {
                (_, Some(name)) => name,
                (ChatRole::Narrator, None) => "DM",
                (role, None) => role.as_str(),
            };
            format!("{who}: {}", turn.content)
        })
        .collect();
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!("{speaker}: {}", action.trim()));
    lines.join("\n")
}

fn result_line(result: &ToolResult) -> String {
    match (&result.error, &result.outcome) {
        (Some(error), _) => format!("- {} FAILED: {error}", result.tool),
        (None, Some(outcome)) => format!("- {}: {} {outcome}", result.tool, result.summary),
        (None, None) => format!("- {}: {}", result.tool, result.summary),
    }
}

/// Prompt for the reconciliation dispatch that rewrites `draft` around the
/// executed tool results.
#[must_use]
pub fn reconciliation_prompt(
    context: &DmContext,
    speaker: &str,
    action: &str,
    draft: &str,
    results: &[ToolResult],
) -> Prompt {
    let mode_line = match PromptMode::for_context(context) {
        PromptMode::Exploration => "Keep the exploration tone: at most three short paragraphs.",
        PromptMode::Combat => "Keep the combat tone: terse, at most two short paragraphs.",
    };
    let draft = draft.trim();
    let draft = if draft.is_empty() {
        "(empty; write the narration from the tool results)"
    } else {
        draft
    };
    let results: Vec<String> = results.iter().map(result_line).collect();

    Prompt {
        system: format!("{RECONCILE_RULES}\n{mode_line}"),
        user: format!(
            "Player action ({speaker}): {}\n\nDraft narration:\n{draft}\n\nTool results:\n{}\n\nWrite the final narration.",
            action.trim(),
            results.join("\n")
        ),
    }
}

/// Prompt asking the model to list the entities a narration mentions.
#[must_use]
pub fn extraction_prompt(narrative: &str) -> Prompt {
    Prompt {
        system: EXTRACTION_RULES.to_owned(),
        user: narrative.trim().to_owned(),
    }
}
