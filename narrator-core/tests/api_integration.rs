//! Integration tests that call the real Claude API.
//!
//! These tests require ANTHROPIC_API_KEY to be set (via .env file or environment).
//! Run with: `cargo test -p narrator-core --test api_integration -- --ignored --nocapture`
//!
//! These are marked #[ignore] by default to avoid:
//! - API costs in CI
//! - Test failures when no API key is available
//! - Slow test runs (API calls take seconds)

use narrator_core::dm::{generate_world, ClaudeGenerator, GeneratorConfig};
use narrator_core::headless::{HeadlessConfig, HeadlessGame};
use narrator_core::session::{GameSession, SessionConfig, TurnProgress};
use narrator_core::testing::{sample_character, sample_world};
use std::sync::Arc;
use tempfile::TempDir;

/// Load environment variables from .env file
fn setup() {
    let _ = dotenvy::dotenv();
}

/// Check if API key is available
fn has_api_key() -> bool {
    std::env::var("ANTHROPIC_API_KEY").is_ok()
}

fn generator() -> Arc<ClaudeGenerator> {
    let config = GeneratorConfig::default().with_max_tokens(1024);
    Arc::new(ClaudeGenerator::from_env(config).expect("Failed to create generator"))
}

#[tokio::test]
#[ignore]
async fn test_generate_world_from_premise() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: ANTHROPIC_API_KEY not set");
        return;
    }

    let world = generate_world(generator(), "a desert caravan hunted by a sandstorm that thinks")
        .await
        .expect("world generation should succeed");

    println!("World: {:#?}", world.data);
    println!("Repairs: {:?}", world.errors);
    assert!(world.valid, "Claude should return JSON");
    assert!(!world.data.world_name.is_empty());
}

#[tokio::test]
#[ignore]
async fn test_opening_and_action() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: ANTHROPIC_API_KEY not set");
        return;
    }

    let mut session = GameSession::new(
        SessionConfig::new("api-test"),
        sample_world(),
        sample_character(),
        generator(),
    )
    .expect("valid config");

    let opening = session.start().await.expect("opening should succeed");
    println!("Opening: {}", opening.narrative);
    assert!(!opening.narrative.is_empty());
    assert_eq!(session.history().len(), 1);

    match session
        .player_action("I try to persuade the nearest forge-priest to tell me why the bells stopped")
        .await
        .expect("action should succeed")
    {
        TurnProgress::Complete(report) => println!("Narrative: {}", report.narrative),
        TurnProgress::AwaitingRoll(request) => {
            println!("Roll requested: {} {} DC {}", request.kind, request.stat, request.difficulty);
            let report = session.roll_dice().await.expect("roll should resolve");
            println!("Dice: {:?}", report.dice);
            println!("Outcome: {}", report.narrative);
            assert!(report.dice.is_some());
        }
    }
    assert_eq!(session.state().turn_count, 2);
}

#[tokio::test]
#[ignore]
async fn test_headless_game_save_and_load() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: ANTHROPIC_API_KEY not set");
        return;
    }

    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config = HeadlessConfig::quick_start("Tam")
        .with_world(sample_world())
        .with_save_dir(temp_dir.path());

    let mut game = HeadlessGame::new(config.clone()).await.expect("game should start");
    let response = game.send("I look for someone selling maps").await.expect("turn should succeed");
    println!("Response: {}", response.narrative);

    let slot = game.save().await.expect("save should succeed");
    let loaded = HeadlessGame::load(config, slot).await.expect("load should succeed");
    assert_eq!(loaded.turn_count(), game.turn_count());
    assert_eq!(loaded.character(), game.character());
}
