//! QA tests for the turn flow using scripted generator replies.
//!
//! These tests verify the orchestrator end to end without API calls:
//! - Opening scene and plain turns
//! - The dice sub-protocol and its HP/XP arithmetic
//! - Degraded and failed generator replies
//! - NPC tracking, leveling and session endings
//!
//! Run with: `cargo test -p narrator-core --test qa_turn_flow`

use narrator_core::dm::{GeneratorError, OPENING_REQUEST};
use narrator_core::session::{Notice, Outcome, SessionConfig, SessionError, TurnPhase, TurnProgress};
use narrator_core::testing::{assert_has_npc, assert_hp, sample_character, MockReply, TestHarness};
use narrator_core::{Effect, SessionStatus, Stat};
use serde_json::json;
use std::time::Duration;

// =============================================================================
// OPENING AND PLAIN TURNS
// =============================================================================

#[tokio::test]
async fn test_opening_turn_produces_one_turn() {
    let mut harness = TestHarness::new();
    harness.expect_story("Smoke curls over the Ashgate market.");

    let report = harness.session.start().await.unwrap();

    assert_eq!(report.narrative, "Smoke curls over the Ashgate market.");
    assert!(report.dice.is_none());
    assert_eq!(harness.session.history().len(), 1);
    assert_eq!(harness.session.state().turn_count, 1);

    let calls = harness.generator.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].messages.len(), 1);
    assert_eq!(calls[0].messages[0].content, OPENING_REQUEST);
}

#[tokio::test]
async fn test_plain_turn_applies_declared_changes() {
    let mut harness = TestHarness::new();
    harness.expect_json(json!({
        "story": "A vendor tosses you a waterskin and a healing draught.",
        "item_gained": "Healing Draught",
        "hp_change": 4,
        "xp_gained": 3
    }));

    let report = harness.act_complete("I haggle").await;

    assert!(report.effects.contains(&Effect::ItemGained {
        item: "Healing Draught".into()
    }));
    assert_hp(&harness, 100, 100);
    assert_eq!(harness.session.character().xp, 3);
    assert_eq!(harness.session.phase(), TurnPhase::Idle);
}

#[tokio::test]
async fn test_unparseable_primary_degrades_to_raw_text() {
    let mut harness = TestHarness::new();
    harness.expect_reply(MockReply::text("The market falls silent."));

    let report = harness.act_complete("I shout").await;

    assert_eq!(report.narrative, "The market falls silent.");
    assert!(harness.session.history().turns()[0].response.event.is_none());
}

#[tokio::test]
async fn test_code_fenced_reply_is_accepted() {
    let mut harness = TestHarness::new();
    harness.expect_reply(MockReply::text(
        "```json\n{\"story\": \"The bells ring once.\", \"item_gained\": \"Bell Clapper\"}\n```",
    ));

    let report = harness.act_complete("I pull the rope").await;

    assert_eq!(report.narrative, "The bells ring once.");
    assert!(harness.has_item("Bell Clapper"));
}

// =============================================================================
// DICE SUB-PROTOCOL
// =============================================================================

#[tokio::test]
async fn test_passed_check_with_special_ability() {
    let mut harness = TestHarness::new();
    harness
        .expect_check("The gate warden folds her arms.", Stat::Charisma, 16, true)
        .expect_story("She laughs and waves you through.");

    let progress = harness.act("I talk my way past").await.unwrap();
    let TurnProgress::AwaitingRoll(request) = progress else {
        panic!("expected a roll request");
    };
    // CHA 3 + special ability 5
    assert_eq!(request.bonus, 8);
    assert!(request.special_ability_active);
    assert_eq!(request.difficulty, 16);

    let report = harness.session.supply_dice_trigger(10).await.unwrap();
    let dice = report.dice.unwrap();
    assert_eq!(dice.total, 18);
    assert!(dice.passed);

    assert_hp(&harness, 100, 100);
    assert_eq!(harness.session.character().xp, 21);
    assert_eq!(report.narrative, "She laughs and waves you through.");
}

#[tokio::test]
async fn test_failed_important_check_costs_hp() {
    let mut harness = TestHarness::new();
    harness
        .expect_check("The portcullis is rusted shut.", Stat::Strength, 12, true)
        .expect_story("It slams back down on your shoulder.");

    let report = harness.act_and_roll("I heave it open", 3).await;

    assert!(!report.dice.unwrap().passed);
    assert_hp(&harness, 94, 100);
    assert_eq!(harness.session.character().xp, 5);
    assert!(report.effects.contains(&Effect::Damage { amount: 6, hp: 94 }));
}

#[tokio::test]
async fn test_failed_basic_check_costs_no_hp() {
    let mut harness = TestHarness::new();
    harness
        .expect_check("The lock is intricate.", Stat::Dexterity, 15, false)
        .expect_story("The pick snaps.");

    harness.act_and_roll("I pick the lock", 2).await;

    assert_hp(&harness, 100, 100);
    assert_eq!(harness.session.character().xp, 5);
}

#[tokio::test]
async fn test_outcome_mechanics_come_from_engine() {
    let mut harness = TestHarness::new();
    harness
        .expect_check("A rope bridge sways.", Stat::Dexterity, 10, true)
        .expect_json(json!({
            "story": "You make it across.",
            "hp_change": -50,
            "xp_gained": 999,
            "item_gained": "Frayed Rope"
        }));

    // DEX 1 + 12 = 13 vs 10
    harness.act_and_roll("I cross", 12).await;

    assert_hp(&harness, 100, 100);
    assert_eq!(harness.session.character().xp, 5 + 5 * 2);
    assert!(harness.has_item("Frayed Rope"));
}

#[tokio::test]
async fn test_primary_side_effects_before_roll_but_not_its_mechanics() {
    let mut harness = TestHarness::new();
    harness
        .expect_json(json!({
            "story": "A brute swings a club at you, then drops it. Old Brannoc watches.",
            "event": {"type": "combat", "stat": "STR", "difficulty": 12, "severity": "important"},
            "item_gained": "Club",
            "new_npc": {"name": "Brannoc", "role": "tavern keeper"},
            "hp_change": -40,
            "xp_gained": 500
        }))
        .expect_story("The brute shoves you into the bar.");

    let progress = harness.act("I grab the club").await.unwrap();
    assert!(matches!(progress, TurnProgress::AwaitingRoll(_)));
    assert_eq!(harness.session.phase(), TurnPhase::AwaitingDiceRoll);
    assert!(harness.has_item("Club"));
    assert_has_npc(&harness, "Brannoc");
    assert_hp(&harness, 100, 100);
    assert_eq!(harness.session.character().xp, 0);

    // STR 2 + 3 = 5 vs 12, important
    let report = harness.session.supply_dice_trigger(3).await.unwrap();

    assert!(!report.dice.unwrap().passed);
    assert_hp(&harness, 94, 100);
    assert_eq!(harness.session.character().xp, 5);
    assert_eq!(harness.session.character().level, 1);
    assert!(harness.has_item("Club"));
    assert_eq!(harness.generator.remaining(), 0);
}

#[tokio::test]
async fn test_unparseable_outcome_uses_stock_narration() {
    let mut harness = TestHarness::new();
    harness
        .expect_check("The beast lunges.", Stat::Strength, 12, true)
        .expect_reply(MockReply::text("ERROR: overloaded"));

    let report = harness.act_and_roll("I grapple it", 20).await;

    assert_eq!(report.narrative, "You succeed.");
    assert!(matches!(report.notices.as_slice(), [Notice::NarrationFallback(_)]));
    // Mechanics stand even though the narration failed.
    assert_eq!(harness.session.character().xp, 5 + 6 * 2);

    let turn = &harness.session.history().turns()[0];
    assert!(turn.outcome_request.is_some());
    assert!(turn.outcome_response.is_none());
}

#[tokio::test]
async fn test_failed_outcome_call_keeps_mechanics() {
    let mut harness = TestHarness::new();
    harness
        .expect_check("Arrows rain down.", Stat::Dexterity, 18, true)
        .expect_reply(MockReply::fail(GeneratorError::provider("connection reset")));

    let report = harness.act_and_roll("I dive for cover", 1).await;

    assert_eq!(report.narrative, "You fail.");
    // -(18/3 + 2)
    assert_hp(&harness, 92, 100);
    assert_eq!(harness.session.state().turn_count, 1);
    assert_eq!(harness.session.phase(), TurnPhase::Idle);
}

#[tokio::test]
async fn test_actions_rejected_while_awaiting_roll() {
    let mut harness = TestHarness::new();
    harness
        .expect_check("A guard blocks the stair.", Stat::Charisma, 10, false)
        .expect_story("He steps aside.");

    harness.act("I approach").await.unwrap();
    assert_eq!(harness.session.phase(), TurnPhase::AwaitingDiceRoll);
    assert!(harness.session.pending_roll().is_some());
    assert!(matches!(harness.act("I leave").await, Err(SessionError::TurnInProgress)));

    harness.session.roll_dice().await.unwrap();
    assert!(!harness.session.is_turn_in_flight());
    assert!(harness.session.pending_roll().is_none());
}

#[tokio::test]
async fn test_roll_without_pending_check() {
    let mut harness = TestHarness::new();
    assert!(matches!(
        harness.session.roll_dice().await,
        Err(SessionError::NoPendingRoll)
    ));
}

#[tokio::test]
async fn test_outcome_call_sees_primary_exchange() {
    let mut harness = TestHarness::new();
    harness
        .expect_json(json!({
            "story": "The archivist squints.",
            "event": {
                "type": "stat_check", "stat": "INT", "difficulty": 14,
                "success_hint": "she finds the ledger", "fail_hint": "she calls the guard"
            }
        }))
        .expect_story("She finds the ledger.");

    harness.act_and_roll("I cite the old charter", 20).await;

    let calls = harness.generator.calls();
    let outcome = &calls[1].messages;
    assert_eq!(outcome[0].content, "I cite the old charter");
    assert!(outcome[1].content.contains("The archivist squints."));
    let request = &outcome[2].content;
    assert!(request.contains("SUCCESS"));
    assert!(request.contains("she finds the ledger"));
    assert!(!request.contains("she calls the guard"));
}

// =============================================================================
// FAILURES AND TIMEOUTS
// =============================================================================

#[tokio::test]
async fn test_primary_failure_leaves_state_untouched() {
    let mut harness = TestHarness::new();
    harness.expect_reply(MockReply::fail(GeneratorError::provider("503")));

    let before = harness.session.state().clone();
    let err = harness.act("I search the stall").await.unwrap_err();

    assert!(matches!(err, SessionError::Generator(GeneratorError::Provider { .. })));
    assert_eq!(harness.session.state(), &before);
    assert!(harness.session.history().is_empty());
    assert!(!harness.session.is_turn_in_flight());
}

#[tokio::test(start_paused = true)]
async fn test_generator_timeout_aborts_turn() {
    let config = SessionConfig::new("tester").with_generator_timeout(Duration::from_secs(5));
    let mut harness = TestHarness::with_config(config);
    harness.expect_reply(MockReply::Hang);

    let err = harness.act("I wait").await.unwrap_err();

    assert!(matches!(err, SessionError::Generator(GeneratorError::Timeout(_))));
    assert_eq!(harness.session.phase(), TurnPhase::Idle);
    assert_eq!(harness.session.state().turn_count, 0);
}

// =============================================================================
// NPCS, PROGRESSION AND HISTORY
// =============================================================================

#[tokio::test]
async fn test_npcs_dedup_and_relationships() {
    let mut harness = TestHarness::new();
    harness
        .expect_json(json!({
            "story": "Bob the smith nods.",
            "new_npc": {"name": "Bob", "role": "smith", "relationship": 90}
        }))
        .expect_json(json!({
            "story": "bob waves again.",
            "new_npc": {"name": "bob", "role": "impostor"},
            "npc_updates": [{"name": "BOB", "change": 40, "reason": "you paid in gold"}]
        }));

    harness.act_complete("I enter the smithy").await;
    harness.act_complete("I pay").await;

    assert_has_npc(&harness, "Bob");
    let npcs = &harness.session.state().npcs;
    assert_eq!(npcs.len(), 1);
    let bob = npcs.find("bob").unwrap();
    assert_eq!(bob.role, "smith");
    assert_eq!(bob.relationship, 100);
}

#[tokio::test]
async fn test_npc_cap_drops_new_npcs() {
    let mut harness = TestHarness::with_config(SessionConfig::new("tester").with_max_npcs(2));
    for name in ["Ada", "Bram", "Cato"] {
        harness.expect_json(json!({
            "story": format!("{name} appears."),
            "new_npc": {"name": name}
        }));
    }

    for _ in 0..3 {
        harness.act_complete("I look around").await;
    }

    assert_eq!(harness.session.state().npcs.len(), 2);
    assert!(!harness.has_npc("Cato"));
}

#[tokio::test]
async fn test_level_up_from_declared_xp() {
    let mut character = sample_character();
    character.xp = 90;
    let mut harness = TestHarness::with_character(SessionConfig::new("tester"), character);
    harness.expect_json(json!({"story": "You finally understand the forge-song.", "xp_gained": 20}));

    let report = harness.act_complete("I listen").await;

    let pc = harness.session.character();
    assert_eq!((pc.level, pc.xp, pc.xp_to_next), (2, 10, 150));
    assert_hp(&harness, 110, 110);
    assert!(report.effects.contains(&Effect::LevelUp { level: 2, max_hp: 110 }));
}

#[tokio::test]
async fn test_history_window_bounds_context() {
    let mut harness = TestHarness::with_config(SessionConfig::new("tester").with_recent_turns_window(3));
    for i in 0..6 {
        harness.expect_story(&format!("Scene {i}."));
    }

    for i in 0..6 {
        harness.act_complete(&format!("step {i}")).await;
    }

    assert_eq!(harness.session.history().len(), 3);
    assert_eq!(harness.session.state().turn_count, 6);

    let last_call = harness.generator.calls().pop().unwrap();
    // Three retained turns (before the sixth was added) plus the current action.
    assert_eq!(last_call.messages.len(), 3 * 2 + 1);
    assert_eq!(last_call.messages[0].content, "step 2");
}

// =============================================================================
// ENDINGS
// =============================================================================

#[tokio::test]
async fn test_story_end_event_is_victory() {
    let mut harness = TestHarness::new();
    harness.expect_json(json!({
        "story": "The bells ring out over Emberfall.",
        "event": {"type": "story_end"}
    }));

    let report = harness.act_complete("I strike the great bell").await;

    assert_eq!(report.ended, Some(Outcome::Victory));
    assert_eq!(harness.session.state().status, SessionStatus::Completed);
    assert_eq!(harness.session.phase(), TurnPhase::SessionEnded(Outcome::Victory));
    assert!(matches!(
        harness.act("I celebrate").await,
        Err(SessionError::SessionEnded(Outcome::Victory))
    ));
    // Final write happens even with autosave far away.
    assert_eq!(harness.store.write_count(), 1);
}

#[tokio::test]
async fn test_game_end_in_outcome_is_victory() {
    let mut harness = TestHarness::new();
    harness
        .expect_check("The forge-priest raises her hammer.", Stat::Willpower, 12, true)
        .expect_json(json!({"story": "She kneels. It is over.", "game_end": true}));

    let report = harness.act_and_roll("I stand my ground", 15).await;

    assert_eq!(report.ended, Some(Outcome::Victory));
    assert_eq!(harness.session.outcome(), Some(Outcome::Victory));
}

#[tokio::test]
async fn test_death_is_defeat_even_when_story_ends() {
    let mut harness = TestHarness::new();
    harness.expect_json(json!({
        "story": "The mountain wakes.",
        "hp_change": -150,
        "game_end": true
    }));

    let report = harness.act_complete("I descend into the caldera").await;

    assert_eq!(report.ended, Some(Outcome::Defeat));
    assert_hp(&harness, 0, 100);
    assert_eq!(harness.session.state().status, SessionStatus::Failed);
}

#[tokio::test]
async fn test_abandon_while_awaiting_roll() {
    let mut harness = TestHarness::new();
    harness.expect_check("A riddle is posed.", Stat::Intelligence, 20, false);
    harness.act("I think").await.unwrap();

    let notices = harness.session.abandon().await.unwrap();

    assert!(matches!(notices.as_slice(), [Notice::Saved(_)]));
    assert_eq!(harness.session.outcome(), Some(Outcome::Abandoned));
    assert!(harness.session.pending_roll().is_none());
    assert_eq!(harness.session.state().turn_count, 1);
    assert_eq!(harness.session.history().len(), 1);
    assert!(matches!(
        harness.session.roll_dice().await,
        Err(SessionError::SessionEnded(Outcome::Abandoned))
    ));
}
