//! Turn-based narrative RPG engine with an AI narrator.
//!
//! This crate provides:
//! - A tolerant validator that repairs generator JSON into typed responses
//! - d20 checks, HP/XP progression and an NPC registry
//! - A turn orchestrator with a two-call dice protocol
//! - Snapshot persistence behind a pluggable save store
//!
//! # Quick Start
//!
//! ```ignore
//! use narrator_core::{ClaudeGenerator, GameSession, GeneratorConfig, SessionConfig, TurnProgress};
//! use narrator_core::testing::{sample_character, sample_world};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let generator = ClaudeGenerator::from_env(GeneratorConfig::default())?;
//!     let mut session = GameSession::new(
//!         SessionConfig::new("player-1"),
//!         sample_world(),
//!         sample_character(),
//!         generator,
//!     )?;
//!
//!     println!("{}", session.start().await?.narrative);
//!
//!     match session.player_action("I look around the market").await? {
//!         TurnProgress::Complete(report) => println!("{}", report.narrative),
//!         TurnProgress::AwaitingRoll(request) => {
//!             println!("{}", request.narrative);
//!             println!("{}", session.roll_dice().await?.narrative);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod dice;
pub mod dm;
pub mod headless;
pub mod npc;
pub mod persist;
pub mod rules;
pub mod session;
pub mod testing;
pub mod validate;
pub mod world;

// Primary public API
pub use dice::{D20Source, DiceResult, RngD20};
pub use dm::{ClaudeGenerator, Generator, GeneratorConfig, GeneratorError};
pub use headless::{HeadlessConfig, HeadlessGame};
pub use persist::{JsonFileStore, PersistError, SaveStore, SlotId, Snapshot};
pub use rules::Effect;
pub use session::{
    GameSession, Notice, Outcome, RollRequest, SessionConfig, SessionError, TurnPhase,
    TurnProgress, TurnReport,
};
pub use testing::{MockGenerator, MockReply, TestHarness};
pub use validate::{validate_outcome, validate_turn, validate_world, Event, Validated};
pub use world::{Character, GameState, SessionStatus, SpecialAbility, Stat, Stats, WorldInfo};
