use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use serde_json::json;
use taleforge_combat::application::coordinator::CombatCoordinator;
use taleforge_combat::domain::initiative::CombatantSpec;
use taleforge_combat::domain::attack::{AttackRequest, RollMode};
use taleforge_combat::domain::messages::{CombatCommand, CombatEvent};
use taleforge_core::memory_store::InMemoryGameStore;
use taleforge_core::model::{Campaign, Character, ChatRole, ChatSession};
use taleforge_core::rng::DeterministicRng;
use taleforge_core::store::GameStore;
use taleforge_llm::error::LlmError;
use taleforge_llm::provider::{ProviderKind, ToolChoice};
use taleforge_narrative::application::extractor::EntityExtractor;
use taleforge_narrative::application::orchestrator::{
    NarrativeOrchestrator, OrchestratorDeps, PlayerAction,
};
use taleforge_narrative::domain::extraction::ExtractionCache;
use taleforge_narrative::error::NarrativeError;
use taleforge_test_support::{
    FailingGameStore, FixedClock, ScriptedProvider, SequenceRng, seeded_store,
    single_provider_dispatcher, tool_call,
};
use uuid::Uuid;

struct Harness {
    orchestrator: NarrativeOrchestrator,
    provider: Arc<ScriptedProvider>,
    combat: Arc<CombatCoordinator>,
}

fn harness(store: Arc<dyn GameStore>, provider: ScriptedProvider, rolls: Vec<u32>) -> Harness {
    let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 3, 1, 21, 0, 0).unwrap()));
    let rng: Arc<Mutex<dyn DeterministicRng + Send>> =
        Arc::new(Mutex::new(SequenceRng::new(rolls)));
    let provider = Arc::new(provider);
    let dispatcher = Arc::new(single_provider_dispatcher(provider.clone()));
    let combat = Arc::new(CombatCoordinator::new(store.clone(), rng.clone()));
    let executor = Arc::new(taleforge_tools::application::executor::ToolExecutor::new(
        store.clone(),
        rng,
        clock.clone(),
    ));
    let extractor = EntityExtractor::new(
        dispatcher.clone(),
        store.clone(),
        clock.clone(),
        Arc::new(ExtractionCache::default()),
    );
    let orchestrator = NarrativeOrchestrator::new(OrchestratorDeps {
        store,
        dispatcher,
        executor,
        combat: combat.clone(),
        extractor,
        clock,
    });
    Harness {
        orchestrator,
        provider,
        combat,
    }
}

async fn with_session(store: &InMemoryGameStore, campaign: &Campaign) -> ChatSession {
    let session = ChatSession {
        id: Uuid::new_v4(),
        campaign_id: campaign.id,
        active: true,
        started_at: Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap(),
    };
    store.start_session(&session).await.unwrap();
    session
}

fn action(campaign: &Campaign, character: &Character, text: &str) -> PlayerAction {
    PlayerAction {
        campaign_id: campaign.id,
        character_id: character.id,
        text: text.to_owned(),
        speaker: None,
    }
}

fn creature(id: Option<String>, name: &str, hp: i32, initiative: Option<i32>) -> CombatantSpec {
    CombatantSpec {
        id,
        name: name.to_owned(),
        hp,
        max_hp: None,
        ac: 13,
        dexterity: 10,
        is_player: false,
        level: None,
        quantity: None,
        initiative,
        conditions: BTreeSet::new(),
        resistances: BTreeSet::new(),
        vulnerabilities: BTreeSet::new(),
        immunities: BTreeSet::new(),
    }
}

fn is_reconciliation(call: &taleforge_test_support::RecordedCall) -> bool {
    call.options
        .system_prompt
        .as_deref()
        .is_some_and(|s| s.contains("revising"))
}

#[tokio::test]
async fn test_plain_narration_skips_reconciliation() {
    let (store, campaign, character) = seeded_store().await.unwrap();
    let store = Arc::new(store);
    let provider = ScriptedProvider::new(ProviderKind::Mock).then_text("  The fog rolls in.  ");
    let h = harness(store.clone(), provider, vec![]);

    let outcome = h
        .orchestrator
        .take_turn(action(&campaign, &character, "I look around"))
        .await
        .unwrap();

    assert_eq!(outcome.narrative, "The fog rolls in.");
    assert!(outcome.tool_results.is_empty());
    assert!(outcome.inventory_delta.is_empty());
    assert_eq!(outcome.provider, ProviderKind::Mock);

    let calls = h.provider.calls();
    assert_eq!(calls[0].options.tool_choice, ToolChoice::Auto);
    assert!(!calls[0].options.tools.is_empty());
    assert!(calls[0].prompt.ends_with("Aria: I look around"));
    assert!(!calls.iter().any(is_reconciliation));

    let saved = store.load_campaign(campaign.id).await.unwrap().unwrap();
    assert_eq!(
        saved.settings.recent_events.back().map(String::as_str),
        Some("Aria: I look around")
    );
}

#[tokio::test]
async fn test_tool_calls_are_executed_then_reconciled() {
    let (store, campaign, character) = seeded_store().await.unwrap();
    let session = with_session(&store, &campaign).await;
    let store = Arc::new(store);
    let provider = ScriptedProvider::new(ProviderKind::Mock)
        .then_tool_calls(
            "You find something in the crate.",
            vec![
                tool_call("c1", "add_item", &json!({"item_name": "Torch", "quantity": 2})),
                tool_call("c2", "update_gold", &json!({"amount": 5})),
            ],
        )
        .then_text("You pull two torches and a few coins from the crate.");
    let h = harness(store.clone(), provider, vec![]);

    let outcome = h
        .orchestrator
        .take_turn(action(&campaign, &character, "I search the crate"))
        .await
        .unwrap();

    assert_eq!(
        outcome.narrative,
        "You pull two torches and a few coins from the crate."
    );
    assert_eq!(outcome.tool_results.len(), 2);
    assert!(outcome.tool_results.iter().all(|r| r.is_success()));
    assert_eq!(outcome.inventory_delta.len(), 1);
    assert_eq!(outcome.inventory_delta[0].item, "Torch");
    assert_eq!(outcome.inventory_delta[0].quantity, 2);

    let calls = h.provider.calls();
    let reconcile = &calls[1];
    assert!(is_reconciliation(reconcile));
    assert!(reconcile.options.tools.is_empty());
    assert_eq!(reconcile.options.tool_choice, ToolChoice::None);
    assert!(reconcile.prompt.contains("You find something in the crate."));
    assert!(reconcile.prompt.contains("Aria gained 2 Torch (2 carried)"));

    let saved = store.load_character(character.id).await.unwrap().unwrap();
    assert_eq!(saved.gold, 20);
    assert_eq!(saved.inventory[0].name, "Torch");
    assert_eq!(saved.inventory[0].quantity, 2);

    let events: Vec<String> = store
        .load_campaign(campaign.id)
        .await
        .unwrap()
        .unwrap()
        .settings
        .recent_events
        .into_iter()
        .collect();
    assert!(events.contains(&"Aria: I search the crate".to_owned()));
    assert!(events.contains(&"Aria gained 2 Torch (2 carried)".to_owned()));

    let turns = store.session_turns(session.id).unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].role, ChatRole::Player);
    assert_eq!(turns[0].speaker.as_deref(), Some("Aria"));
    assert_eq!(turns[1].role, ChatRole::Narrator);
    assert_eq!(turns[1].content, outcome.narrative);
}

#[tokio::test]
async fn test_failed_tool_is_reported_without_failing_the_turn() {
    let (store, campaign, character) = seeded_store().await.unwrap();
    let store = Arc::new(store);
    let provider = ScriptedProvider::new(ProviderKind::Mock)
        .then_tool_calls(
            "You hand over the coins.",
            vec![tool_call("c1", "update_gold", &json!({"amount": -50}))],
        )
        .then_text("Your purse is too light for that.");
    let h = harness(store.clone(), provider, vec![]);

    let outcome = h
        .orchestrator
        .take_turn(action(&campaign, &character, "I buy the boat"))
        .await
        .unwrap();

    assert!(!outcome.tool_results[0].is_success());
    assert!(h.provider.calls()[1].prompt.contains("update_gold FAILED"));
    let saved = store.load_character(character.id).await.unwrap().unwrap();
    assert_eq!(saved.gold, 15);
}

#[tokio::test]
async fn test_empty_reconciliation_keeps_the_draft() {
    let (store, campaign, character) = seeded_store().await.unwrap();
    let store = Arc::new(store);
    let provider = ScriptedProvider::new(ProviderKind::Mock)
        .then_tool_calls(
            "The merchant pays you.",
            vec![tool_call("c1", "update_gold", &json!({"amount": 3}))],
        )
        .then_text("   ");
    let h = harness(store, provider, vec![]);

    let outcome = h
        .orchestrator
        .take_turn(action(&campaign, &character, "I sell the pelt"))
        .await
        .unwrap();

    assert_eq!(outcome.narrative, "The merchant pays you.");
}

#[tokio::test]
async fn test_dispatch_failure_commits_nothing() {
    let (store, campaign, character) = seeded_store().await.unwrap();
    let session = with_session(&store, &campaign).await;
    let store = Arc::new(store);
    let provider = ScriptedProvider::new(ProviderKind::Mock)
        .then_tool_calls(
            "A chest of gold!",
            vec![tool_call("c1", "update_gold", &json!({"amount": 100}))],
        )
        .then_error(LlmError::Provider {
            provider: ProviderKind::Mock,
            message: "backend unavailable".to_owned(),
        });
    let h = harness(store.clone(), provider, vec![]);

    let result = h
        .orchestrator
        .take_turn(action(&campaign, &character, "I open the chest"))
        .await;

    assert!(matches!(result, Err(NarrativeError::Dispatch(_))));
    let saved = store.load_character(character.id).await.unwrap().unwrap();
    assert_eq!(saved.gold, 15);
    assert!(store.session_turns(session.id).unwrap().is_empty());
    let saved_campaign = store.load_campaign(campaign.id).await.unwrap().unwrap();
    assert!(saved_campaign.settings.recent_events.is_empty());
}

#[tokio::test]
async fn test_store_failure_fails_the_turn() {
    let (store, campaign, character) = seeded_store().await.unwrap();
    let store = Arc::new(FailingGameStore::new(store));
    let provider = ScriptedProvider::new(ProviderKind::Mock).then_text("The door creaks open.");
    let h = harness(store.clone(), provider, vec![]);

    let result = h
        .orchestrator
        .take_turn(action(&campaign, &character, "I push the door"))
        .await;

    assert!(matches!(result, Err(NarrativeError::State(_))));
    let saved = store.inner().load_campaign(campaign.id).await.unwrap().unwrap();
    assert!(saved.settings.recent_events.is_empty());
}

#[tokio::test]
async fn test_character_from_another_campaign_is_rejected() {
    let (store, campaign, _) = seeded_store().await.unwrap();
    let stranger = taleforge_test_support::sample_character(Uuid::new_v4());
    store.insert_character(stranger.clone()).unwrap();
    let store = Arc::new(store);
    let provider = ScriptedProvider::new(ProviderKind::Mock).then_text("unused");
    let h = harness(store, provider, vec![]);

    let result = h
        .orchestrator
        .take_turn(action(&campaign, &stranger, "I wave"))
        .await;

    assert!(matches!(result, Err(NarrativeError::State(_))));
    assert!(h.provider.calls().is_empty());
}

#[tokio::test]
async fn test_start_combat_opens_the_encounter() {
    let (store, campaign, character) = seeded_store().await.unwrap();
    let store = Arc::new(store);
    let provider = ScriptedProvider::new(ProviderKind::Mock)
        .then_tool_calls(
            "",
            vec![tool_call(
                "c1",
                "start_combat",
                &json!({"enemies": [{"name": "Goblin", "hp": 7, "ac": 13}]}),
            )],
        )
        .then_text("A goblin leaps from the shadows!");
    let h = harness(store.clone(), provider, vec![12, 5]);

    let outcome = h
        .orchestrator
        .take_turn(action(&campaign, &character, "I step into the alley"))
        .await
        .unwrap();

    let state = outcome.combat_start.expect("encounter opened");
    assert_eq!(state.round, 1);
    assert_eq!(state.turn_order.len(), 2);
    assert_eq!(state.turn_order[0].name, "Aria");
    assert_eq!(state.turn_order[0].initiative, 14);
    assert_eq!(state.turn_order[1].name, "Goblin");

    assert_eq!(
        h.combat.snapshot(campaign.id).await.unwrap(),
        Some(state.clone())
    );
    assert_eq!(store.load_combat(campaign.id).await.unwrap(), Some(state));
}

#[tokio::test]
async fn test_running_encounter_shapes_the_prompt() {
    let (store, campaign, character) = seeded_store().await.unwrap();
    let store = Arc::new(store);
    let provider = ScriptedProvider::new(ProviderKind::Mock).then_text("The goblin snarls.");
    let h = harness(store, provider, vec![15]);
    h.combat
        .handle(
            campaign.id,
            CombatCommand::Start {
                players: vec![],
                enemies: vec![creature(None, "Goblin", 7, None)],
            },
        )
        .await
        .unwrap();

    h.orchestrator
        .take_turn(action(&campaign, &character, "I raise my bow"))
        .await
        .unwrap();

    let system = h.provider.calls()[0].options.system_prompt.clone().unwrap();
    assert!(system.contains("Combat, round 1"));
    assert!(system.contains("Goblin"));
}

#[tokio::test]
async fn test_explicit_speaker_is_used_in_the_transcript() {
    let (store, campaign, character) = seeded_store().await.unwrap();
    let store = Arc::new(store);
    let provider = ScriptedProvider::new(ProviderKind::Mock).then_text("Heads turn.");
    let h = harness(store.clone(), provider, vec![]);

    let mut request = action(&campaign, &character, "I call for silence");
    request.speaker = Some("Captain Aria".to_owned());
    h.orchestrator.take_turn(request).await.unwrap();

    assert!(h.provider.calls()[0].prompt.ends_with("Captain Aria: I call for silence"));
}

#[tokio::test]
async fn test_start_combat_fails_while_an_encounter_is_running() {
    let (store, campaign, character) = seeded_store().await.unwrap();
    let store = Arc::new(store);
    let provider = ScriptedProvider::new(ProviderKind::Mock)
        .then_tool_calls(
            "A wolf joins the fight!",
            vec![tool_call(
                "c1",
                "start_combat",
                &json!({"enemies": [{"name": "Wolf", "hp": 11, "ac": 13}]}),
            )],
        )
        .then_text("The goblin is still your problem.");
    let h = harness(store, provider, vec![]);
    h.combat
        .handle(
            campaign.id,
            CombatCommand::Start {
                players: vec![],
                enemies: vec![creature(None, "Goblin", 7, Some(15))],
            },
        )
        .await
        .unwrap();

    let outcome = h
        .orchestrator
        .take_turn(action(&campaign, &character, "I howl at the moon"))
        .await
        .unwrap();

    let error = outcome.tool_results[0].error.as_deref().unwrap();
    assert!(error.contains("already running"));
    assert!(outcome.combat_start.is_none());
    assert!(h.provider.calls()[1].prompt.contains("start_combat FAILED"));
    let state = h.combat.snapshot(campaign.id).await.unwrap().unwrap();
    assert_eq!(state.turn_order.len(), 1);
    assert_eq!(state.turn_order[0].name, "Goblin");
}

#[tokio::test]
async fn test_healing_during_combat_survives_the_next_hit() {
    let (store, campaign, character) = seeded_store().await.unwrap();
    let mut wounded = character.clone();
    wounded.set_hp(10);
    store.insert_character(wounded).unwrap();
    let store = Arc::new(store);
    let provider = ScriptedProvider::new(ProviderKind::Mock)
        .then_tool_calls(
            "",
            vec![tool_call("c1", "update_hp", &json!({"amount": 6, "reason": "potion"}))],
        )
        .then_text("Warmth spreads through your chest.");
    let h = harness(store.clone(), provider, vec![18, 4]);
    let aria_id = character.id.to_string();
    let mut aria = creature(Some(aria_id.clone()), "Aria", 10, Some(12));
    aria.max_hp = Some(character.max_hp);
    aria.ac = character.ac;
    h.combat
        .handle(
            campaign.id,
            CombatCommand::Start {
                players: vec![aria],
                enemies: vec![creature(Some("goblin".to_owned()), "Goblin", 7, Some(5))],
            },
        )
        .await
        .unwrap();

    let outcome = h
        .orchestrator
        .take_turn(action(&campaign, &character, "I drink the potion"))
        .await
        .unwrap();

    assert_eq!(
        outcome.combat_events,
        vec![CombatEvent::HpUpdated {
            combatant_id: aria_id.clone(),
            hp: 16,
            max_hp: character.max_hp,
        }]
    );
    let state = h.combat.snapshot(campaign.id).await.unwrap().unwrap();
    assert_eq!(state.combatant(&aria_id).unwrap().hp, 16);
    assert_eq!(store.load_combat(campaign.id).await.unwrap(), Some(state));

    h.combat
        .handle(campaign.id, CombatCommand::NextTurn)
        .await
        .unwrap();
    h.combat
        .handle(
            campaign.id,
            CombatCommand::Attack(AttackRequest {
                attacker_id: "goblin".to_owned(),
                target_id: aria_id.clone(),
                attack_bonus: 4,
                target_ac: None,
                damage_dice: "1d6".to_owned(),
                damage_type: None,
                roll_mode: RollMode::Normal,
            }),
        )
        .await
        .unwrap();

    let saved = store.load_character(character.id).await.unwrap().unwrap();
    assert_eq!(saved.hp, 12);
    let state = h.combat.snapshot(campaign.id).await.unwrap().unwrap();
    assert_eq!(state.combatant(&aria_id).unwrap().hp, 12);
}
