//! Headless game interface for programmatic use.
//!
//! This module provides a simplified interface for running narrated games
//! without any rendering. It's designed for:
//! - Automated testing with real AI responses
//! - Coding agents playing the game
//! - Script-driven game sessions
//!
//! Dice checks are rolled automatically, so every `send` returns a finished
//! turn.
//!
//! # Example
//!
//! ```ignore
//! use narrator_core::headless::{HeadlessConfig, HeadlessGame};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HeadlessConfig::quick_start("Mira")
//!         .with_premise("A lighthouse keeper's last night on a haunted coast");
//!     let mut game = HeadlessGame::new(config).await?;
//!
//!     let response = game.send("I climb the stairs to the lamp room").await?;
//!     println!("{}", response.narrative);
//!     println!("HP: {}/{}", response.hp, response.max_hp);
//!
//!     let slot = game.save().await?;
//!     println!("Saved to {slot}");
//!     Ok(())
//! }
//! ```

use crate::dice::DiceResult;
use crate::dm::{generate_world, ClaudeGenerator, Generator, GeneratorConfig, GeneratorError};
use crate::persist::{JsonFileStore, SaveStore, SlotId, SlotMetadata};
use crate::rules::Effect;
use crate::session::{GameSession, Notice, Outcome, SessionConfig, SessionError, TurnProgress, TurnReport};
use crate::world::{Character, GameState, SpecialAbility, Stat, Stats, WorldInfo};
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a headless game session.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    /// Character name.
    pub name: String,
    pub gender: String,
    pub stats: Stats,
    pub special_ability: SpecialAbility,
    /// A fixed world. When absent, one is generated from `premise`.
    pub world: Option<WorldInfo>,
    pub premise: String,
    /// Directory for save slots.
    pub save_dir: PathBuf,
    pub session: SessionConfig,
    pub generator: GeneratorConfig,
}

impl HeadlessConfig {
    /// Create a quick-start configuration with sensible defaults.
    ///
    /// Balanced stats with a Strength-based special ability and a generated
    /// world.
    pub fn quick_start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gender: String::new(),
            stats: Stats::new(2, 1, 1, 1, 1),
            special_ability: SpecialAbility::new("Iron Grip", Stat::Strength, "Never lets go."),
            world: None,
            premise: "A lone wanderer arrives at a frontier town with a secret.".to_string(),
            save_dir: PathBuf::from("saves"),
            session: SessionConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }

    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = gender.into();
        self
    }

    pub fn with_stats(mut self, stats: Stats) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_special_ability(mut self, ability: SpecialAbility) -> Self {
        self.special_ability = ability;
        self
    }

    /// Use a fixed world instead of generating one.
    pub fn with_world(mut self, world: WorldInfo) -> Self {
        self.world = Some(world);
        self
    }

    pub fn with_premise(mut self, premise: impl Into<String>) -> Self {
        self.premise = premise.into();
        self
    }

    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = dir.into();
        self
    }

    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session = config;
        self
    }

    pub fn with_generator_config(mut self, config: GeneratorConfig) -> Self {
        self.generator = config;
        self
    }

    fn build_character(&self) -> Character {
        Character::new(
            self.name.trim(),
            self.gender.trim(),
            self.stats,
            self.special_ability.clone(),
        )
    }

    fn store(&self) -> JsonFileStore {
        JsonFileStore::new(&self.save_dir)
    }
}

/// A simplified response from the game.
#[derive(Debug, Clone)]
pub struct GameResponse {
    /// Primary narration, followed by the outcome narration when dice were rolled.
    pub narrative: String,
    pub dice: Option<DiceResult>,
    pub effects: Vec<Effect>,
    pub notices: Vec<Notice>,
    pub hp: i32,
    pub max_hp: i32,
    pub level: u32,
    /// Set when this turn ended the session.
    pub ended: Option<Outcome>,
}

/// An entry in the game transcript.
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    /// Player input. `None` for the opening scene.
    pub player_input: Option<String>,
    pub narrative: String,
    pub dice: Option<DiceResult>,
    /// Turn number after this exchange.
    pub turn: u32,
}

/// A headless game that can be controlled programmatically.
///
/// This wraps `GameSession` with a simpler interface for automated use.
pub struct HeadlessGame {
    session: GameSession,
    /// Transcript of all exchanges.
    transcript: Vec<TranscriptEntry>,
}

impl HeadlessGame {
    /// Create a new game backed by Claude and play the opening scene.
    ///
    /// Requires `ANTHROPIC_API_KEY` environment variable to be set.
    pub async fn new(config: HeadlessConfig) -> Result<Self, SessionError> {
        let generator = claude_generator(&config)?;
        Self::with_generator(config, Arc::new(generator)).await
    }

    /// Create a new game with any generator and play the opening scene.
    pub async fn with_generator(
        config: HeadlessConfig,
        generator: impl Generator + Clone + 'static,
    ) -> Result<Self, SessionError> {
        let world = match config.world.clone() {
            Some(world) => world,
            None => {
                let generated = generate_world(generator.clone(), &config.premise).await?;
                if !generated.errors.is_empty() {
                    tracing::warn!(errors = ?generated.errors, "Generated world was repaired");
                }
                generated.data
            }
        };
        tracing::info!(world = %world.world_name, character = %config.name, "Starting headless game");

        let session = GameSession::new(
            config.session.clone(),
            world,
            config.build_character(),
            generator,
        )?
        .with_store(config.store());

        let mut game = Self {
            session,
            transcript: Vec::new(),
        };
        let opening = game.session.start().await?;
        game.record(None, &opening);
        Ok(game)
    }

    /// Load a saved game from the configured save directory.
    ///
    /// Requires `ANTHROPIC_API_KEY` environment variable to be set.
    pub async fn load(config: HeadlessConfig, slot_id: SlotId) -> Result<Self, SessionError> {
        let generator = claude_generator(&config)?;
        Self::load_with_generator(config, slot_id, Arc::new(generator)).await
    }

    pub async fn load_with_generator(
        config: HeadlessConfig,
        slot_id: SlotId,
        generator: impl Generator + 'static,
    ) -> Result<Self, SessionError> {
        let store = config.store();
        let snapshot = store.load_slot(slot_id).await?;
        let session = GameSession::from_snapshot(config.session.clone(), snapshot, generator)?
            .with_store(store)
            .with_slot(slot_id);

        Ok(Self {
            session,
            transcript: Vec::new(),
        })
    }

    /// List the saves of the configured player.
    pub async fn list_saves(config: &HeadlessConfig) -> Result<Vec<SlotMetadata>, SessionError> {
        Ok(config.store().list_slots(&config.session.player_id).await?)
    }

    /// Send player input to the game and get a response.
    pub async fn send(&mut self, input: &str) -> Result<GameResponse, SessionError> {
        let report = match self.session.player_action(input).await? {
            TurnProgress::Complete(report) => report,
            TurnProgress::AwaitingRoll(request) => {
                let mut report = self.session.roll_dice().await?;
                report.narrative = format!("{}\n\n{}", request.narrative, report.narrative);
                report
            }
        };

        self.record(Some(input), &report);
        Ok(self.response(report))
    }

    /// Roll a check left pending by a loaded save.
    pub async fn roll_pending(&mut self) -> Result<Option<GameResponse>, SessionError> {
        if self.session.pending_roll().is_none() {
            return Ok(None);
        }
        let report = self.session.roll_dice().await?;
        self.record(None, &report);
        Ok(Some(self.response(report)))
    }

    /// Save the current game.
    pub async fn save(&mut self) -> Result<SlotId, SessionError> {
        self.session.save().await
    }

    /// Give up on the current game.
    pub async fn abandon(&mut self) -> Result<Vec<Notice>, SessionError> {
        self.session.abandon().await
    }

    // ========================================================================
    // Game State Queries
    // ========================================================================

    pub fn character(&self) -> &Character {
        self.session.character()
    }

    pub fn state(&self) -> &GameState {
        self.session.state()
    }

    pub fn turn_count(&self) -> u32 {
        self.session.state().turn_count
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.session.outcome()
    }

    pub fn is_ended(&self) -> bool {
        self.session.is_ended()
    }

    /// Get the transcript of all exchanges.
    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn last_response(&self) -> Option<&str> {
        self.transcript.last().map(|e| e.narrative.as_str())
    }

    /// Get the underlying session for advanced use.
    pub fn session(&self) -> &GameSession {
        &self.session
    }

    /// Get mutable access to the underlying session.
    pub fn session_mut(&mut self) -> &mut GameSession {
        &mut self.session
    }

    fn record(&mut self, input: Option<&str>, report: &TurnReport) {
        self.transcript.push(TranscriptEntry {
            player_input: input.map(str::to_string),
            narrative: report.narrative.clone(),
            dice: report.dice,
            turn: self.session.state().turn_count,
        });
    }

    fn response(&self, report: TurnReport) -> GameResponse {
        let character = self.session.character();
        GameResponse {
            narrative: report.narrative,
            dice: report.dice,
            effects: report.effects,
            notices: report.notices,
            hp: character.hp,
            max_hp: character.max_hp,
            level: character.level,
            ended: report.ended,
        }
    }
}

fn claude_generator(config: &HeadlessConfig) -> Result<ClaudeGenerator, SessionError> {
    ClaudeGenerator::from_env(config.generator.clone()).map_err(|e| match e {
        GeneratorError::NoApiKey => SessionError::NoApiKey,
        other => SessionError::Generator(other),
    })
}
