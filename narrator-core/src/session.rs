//! GameSession - the turn orchestrator.
//!
//! A session owns the game state, the retained turn history, the narrator
//! and (optionally) a save store, and moves one player turn at a time
//! through these phases:
//!
//! ```text
//! Idle -> AwaitingPrimaryNarration -+-> TurnComplete -> Idle | SessionEnded
//!                                   |
//!                                   +-> AwaitingDiceRoll -> AwaitingOutcomeNarration -> TurnComplete
//! ```
//!
//! A check declared by the primary narration suspends the turn in
//! `AwaitingDiceRoll` until [`GameSession::roll_dice`] or
//! [`GameSession::supply_dice_trigger`] is called. The roll's HP and XP are
//! applied before the outcome narration is requested, so a failed outcome
//! call only costs narrative detail, never state.

use crate::dice::{resolve_with_bonus, D20Source, DiceResult, RngD20, D20_MAX, D20_MIN, SPECIAL_ABILITY_BONUS};
use crate::dm::{
    outcome_request, stock_outcome, Generator, GeneratorError, Narrator, RetryPolicy, Turn,
    TurnHistory, DEFAULT_RECENT_TURNS, OPENING_REQUEST,
};
use crate::npc::DEFAULT_MAX_NPCS;
use crate::persist::{PersistError, SaveStore, SlotId, Snapshot};
use crate::rules::{apply_hp, apply_xp, check_hp_penalty, check_xp_reward, Effect};
use crate::validate::{Event, OutcomeResponse, Severity, TurnResponse, Validated};
use crate::world::{Character, GameState, SessionStatus, Stat, WorldInfo};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors from GameSession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Generator error: {0}")]
    Generator(#[from] GeneratorError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("A turn is already in progress")]
    TurnInProgress,

    #[error("No dice roll is pending")]
    NoPendingRoll,

    #[error("The session has ended ({0})")]
    SessionEnded(Outcome),

    #[error("The session has already started")]
    AlreadyStarted,

    #[error("Invalid session configuration: {0}")]
    Config(String),

    #[error("No API key configured - set ANTHROPIC_API_KEY environment variable")]
    NoApiKey,
}

/// Configuration for a game session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Owner of the save slots this session writes.
    pub player_id: String,

    /// Slot number used when the session creates its save slot.
    pub slot_number: u32,

    /// Turns kept in full and replayed to the generator.
    pub recent_turns_window: usize,

    /// NPCs tracked before new ones are dropped.
    pub max_npcs: usize,

    /// Turns between autosaves. Zero disables autosave.
    pub autosave_interval: u32,

    /// Bonus added when the checked stat matches the special ability.
    pub special_ability_bonus: i32,

    /// Upper bound on a single generator call.
    pub generator_timeout: Duration,

    /// Retries after a transient generator failure.
    pub generator_retries: u32,

    /// Delay before the first retry; doubles afterwards.
    pub retry_base_delay: Duration,
}

impl SessionConfig {
    pub fn new(player_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            slot_number: 1,
            recent_turns_window: DEFAULT_RECENT_TURNS,
            max_npcs: DEFAULT_MAX_NPCS,
            autosave_interval: 5,
            special_ability_bonus: SPECIAL_ABILITY_BONUS,
            generator_timeout: Duration::from_secs(90),
            generator_retries: 2,
            retry_base_delay: Duration::from_millis(500),
        }
    }

    pub fn with_slot_number(mut self, slot_number: u32) -> Self {
        self.slot_number = slot_number;
        self
    }

    pub fn with_recent_turns_window(mut self, window: usize) -> Self {
        self.recent_turns_window = window;
        self
    }

    pub fn with_max_npcs(mut self, max_npcs: usize) -> Self {
        self.max_npcs = max_npcs;
        self
    }

    pub fn with_autosave_interval(mut self, turns: u32) -> Self {
        self.autosave_interval = turns;
        self
    }

    pub fn with_special_ability_bonus(mut self, bonus: i32) -> Self {
        self.special_ability_bonus = bonus;
        self
    }

    pub fn with_generator_timeout(mut self, timeout: Duration) -> Self {
        self.generator_timeout = timeout;
        self
    }

    pub fn with_generator_retries(mut self, retries: u32, base_delay: Duration) -> Self {
        self.generator_retries = retries;
        self.retry_base_delay = base_delay;
        self
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.recent_turns_window == 0 {
            return Err(SessionError::Config(
                "recent_turns_window must be at least 1".to_string(),
            ));
        }
        if self.max_npcs == 0 {
            return Err(SessionError::Config("max_npcs must be at least 1".to_string()));
        }
        if self.generator_timeout.is_zero() {
            return Err(SessionError::Config(
                "generator_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: self.generator_timeout,
            max_retries: self.generator_retries,
            base_delay: self.retry_base_delay,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new("local")
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Victory,
    Defeat,
    Abandoned,
}

impl Outcome {
    /// Lifecycle status recorded for this outcome.
    pub fn status(&self) -> SessionStatus {
        match self {
            Outcome::Victory => SessionStatus::Completed,
            Outcome::Defeat | Outcome::Abandoned => SessionStatus::Failed,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Victory => write!(f, "victory"),
            Outcome::Defeat => write!(f, "defeat"),
            Outcome::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Where the session is within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    AwaitingPrimaryNarration,
    AwaitingDiceRoll,
    AwaitingOutcomeNarration,
    TurnComplete,
    SessionEnded(Outcome),
}

/// A check waiting for its roll. Part of the snapshot so a suspended turn
/// survives a save and load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCheck {
    pub action: String,
    pub response: TurnResponse,
    /// A stat check or combat event.
    pub event: Event,
    /// Effects already applied by the primary narration.
    #[serde(default)]
    pub effects: Vec<Effect>,
}

/// What the player is asked to roll for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollRequest {
    /// The primary narration, stopped before the outcome.
    pub narrative: String,
    /// `stat_check` or `combat`.
    pub kind: &'static str,
    pub stat: Stat,
    pub difficulty: u8,
    pub severity: Severity,
    /// Added to the d20 draw.
    pub bonus: i32,
    pub special_ability_active: bool,
    /// Effects already applied by the primary narration.
    pub effects: Vec<Effect>,
}

/// Non-fatal problems and confirmations surfaced alongside a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The outcome narration failed; stock text was used.
    NarrationFallback(String),
    Saved(SlotId),
    SaveFailed(String),
}

/// The result of a completed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub narrative: String,
    pub dice: Option<DiceResult>,
    pub effects: Vec<Effect>,
    pub notices: Vec<Notice>,
    /// Set when this turn ended the session.
    pub ended: Option<Outcome>,
}

/// Result of submitting an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnProgress {
    Complete(TurnReport),
    AwaitingRoll(RollRequest),
}

/// A check whose mechanics are applied, waiting on outcome narration.
#[derive(Debug)]
struct ResolvedCheck {
    pending: PendingCheck,
    dice: DiceResult,
    outcome_request: String,
    effects: Vec<Effect>,
}

/// A narrated game session.
///
/// At most one turn is in flight: from the moment an action is submitted
/// until that turn completes, further submissions fail with
/// [`SessionError::TurnInProgress`]. A turn suspended on a dice roll counts
/// as in flight.
pub struct GameSession {
    config: SessionConfig,
    state: GameState,
    history: TurnHistory,
    narrator: Narrator,
    dice: Box<dyn D20Source>,
    store: Option<Box<dyn SaveStore>>,
    slot_id: Option<SlotId>,
    phase: TurnPhase,
    pending: Option<PendingCheck>,
    resolving: Option<ResolvedCheck>,
    outcome: Option<Outcome>,
    turn_in_flight: bool,
}

impl GameSession {
    /// Create a session for a fresh character in `world`.
    pub fn new(
        config: SessionConfig,
        world: WorldInfo,
        character: Character,
        generator: impl Generator + 'static,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let history = TurnHistory::new(config.recent_turns_window);
        let narrator = Narrator::new(generator).with_retry(config.retry_policy());

        Ok(Self {
            state: GameState::new(world, character),
            history,
            narrator,
            dice: Box::new(RngD20::from_entropy()),
            store: None,
            slot_id: None,
            phase: TurnPhase::Idle,
            pending: None,
            resolving: None,
            outcome: None,
            turn_in_flight: false,
            config,
        })
    }

    /// Rebuild a session from a snapshot. A pending check resumes in
    /// `AwaitingDiceRoll`; an ended session stays ended.
    pub fn from_snapshot(
        config: SessionConfig,
        snapshot: Snapshot,
        generator: impl Generator + 'static,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        snapshot.check_version()?;

        let history = snapshot.history(config.recent_turns_window);
        let narrator = Narrator::new(generator).with_retry(config.retry_policy());
        let state = snapshot.game_state();

        let (phase, pending) = match (snapshot.outcome, snapshot.pending_check) {
            (Some(outcome), _) => (TurnPhase::SessionEnded(outcome), None),
            (None, Some(pending)) if pending.event.requires_roll() => {
                (TurnPhase::AwaitingDiceRoll, Some(pending))
            }
            (None, Some(_)) => {
                tracing::warn!("Discarding saved pending check without a rollable event");
                (TurnPhase::Idle, None)
            }
            (None, None) => (TurnPhase::Idle, None),
        };

        tracing::info!(
            turn = state.turn_count,
            retained = history.len(),
            ?phase,
            "Session restored from snapshot"
        );

        Ok(Self {
            turn_in_flight: pending.is_some(),
            state,
            history,
            narrator,
            dice: Box::new(RngD20::from_entropy()),
            store: None,
            slot_id: None,
            phase,
            pending,
            resolving: None,
            outcome: snapshot.outcome,
            config,
        })
    }

    /// Use a specific d20 source.
    pub fn with_dice(mut self, dice: impl D20Source + 'static) -> Self {
        self.dice = Box::new(dice);
        self
    }

    /// Persist through `store`.
    pub fn with_store(mut self, store: impl SaveStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Write to an existing slot instead of creating one on first save.
    pub fn with_slot(mut self, slot_id: SlotId) -> Self {
        self.slot_id = Some(slot_id);
        self
    }

    /// Add a free-text summary of history older than the retained window.
    pub fn with_story_summary(mut self, summary: impl Into<String>) -> Self {
        self.history.set_summary(summary);
        self
    }

    // ========================================================================
    // Turns
    // ========================================================================

    /// Run the opening turn. It has no player action and never asks for a roll.
    pub async fn start(&mut self) -> Result<TurnReport, SessionError> {
        self.ensure_can_submit()?;
        if self.state.turn_count > 0 || !self.history.is_empty() {
            return Err(SessionError::AlreadyStarted);
        }

        match self.run_turn(None).await? {
            TurnProgress::Complete(report) => Ok(report),
            // The opening turn strips rollable events before branching.
            TurnProgress::AwaitingRoll(_) => Err(SessionError::TurnInProgress),
        }
    }

    /// Submit a player action.
    pub async fn player_action(&mut self, input: &str) -> Result<TurnProgress, SessionError> {
        self.ensure_can_submit()?;
        self.run_turn(Some(input.trim().to_string())).await
    }

    /// Roll the pending check with the session's d20 source.
    pub async fn roll_dice(&mut self) -> Result<TurnReport, SessionError> {
        self.ensure_roll_pending()?;
        let draw = self.dice.roll();
        self.resolve_roll(draw).await
    }

    /// Resolve the pending check with an externally produced draw, clamped to 1..=20.
    pub async fn supply_dice_trigger(&mut self, draw: u8) -> Result<TurnReport, SessionError> {
        self.ensure_roll_pending()?;
        self.resolve_roll(draw.clamp(D20_MIN, D20_MAX)).await
    }

    /// End the session at the player's request.
    ///
    /// A pending check is never rolled, but its primary narration is kept as
    /// a turn since its item and NPC changes already stand. Returns the
    /// notices of the final save.
    pub async fn abandon(&mut self) -> Result<Vec<Notice>, SessionError> {
        if let TurnPhase::SessionEnded(outcome) = self.phase {
            return Err(SessionError::SessionEnded(outcome));
        }
        if !matches!(self.phase, TurnPhase::Idle | TurnPhase::AwaitingDiceRoll) {
            return Err(SessionError::TurnInProgress);
        }

        if let Some(pending) = self.pending.take() {
            self.history.push_turn(Turn::new(Some(pending.action), pending.response));
            self.state.turn_count += 1;
        }
        let mut notices = Vec::new();
        self.end_session(Outcome::Abandoned, &mut notices).await;
        self.turn_in_flight = false;
        Ok(notices)
    }

    /// Settle a turn whose future was dropped mid-call.
    ///
    /// An interrupted primary call leaves no trace. An interrupted outcome
    /// call completes the turn with stock narration, since its mechanics
    /// were already applied.
    pub async fn recover_interrupted_turn(&mut self) -> Option<TurnReport> {
        match self.phase {
            TurnPhase::AwaitingPrimaryNarration | TurnPhase::TurnComplete => {
                tracing::warn!(phase = ?self.phase, "Recovering interrupted turn");
                self.phase = TurnPhase::Idle;
                self.turn_in_flight = false;
                None
            }
            TurnPhase::AwaitingOutcomeNarration => {
                tracing::warn!("Recovering interrupted outcome narration");
                let resolved = self.resolving.take()?;
                let interrupted = Err(GeneratorError::provider("outcome narration interrupted"));
                Some(self.finish_outcome(resolved, interrupted).await)
            }
            _ => None,
        }
    }

    async fn run_turn(&mut self, action: Option<String>) -> Result<TurnProgress, SessionError> {
        self.turn_in_flight = true;
        self.phase = TurnPhase::AwaitingPrimaryNarration;
        tracing::info!(turn = self.state.turn_count + 1, opening = action.is_none(), "Turn started");

        let request = action.as_deref().unwrap_or(OPENING_REQUEST);
        let validated = match self.narrator.narrate_turn(&self.state, &self.history, request).await {
            Ok(validated) => validated,
            Err(e) => {
                tracing::warn!(error = %e, "Primary narration failed, turn aborted");
                self.phase = TurnPhase::Idle;
                self.turn_in_flight = false;
                return Err(e.into());
            }
        };

        let mut response = validated.data;
        if action.is_none() && response.event.as_ref().is_some_and(Event::requires_roll) {
            tracing::warn!("Opening narration requested a roll, event dropped");
            response.event = None;
        }

        // Item and NPC changes never depend on a roll.
        let mut effects = self
            .state
            .apply_story_changes(response.story_changes(), self.config.max_npcs);

        if let Some(event) = response.event.clone().filter(Event::requires_roll) {
            let pending = PendingCheck {
                action: action.unwrap_or_else(|| OPENING_REQUEST.to_string()),
                response,
                event,
                effects,
            };
            let request = self.roll_request(&pending);
            tracing::info!(kind = request.kind, stat = %request.stat, difficulty = request.difficulty, "Awaiting dice roll");

            self.pending = Some(pending);
            self.phase = TurnPhase::AwaitingDiceRoll;
            return Ok(TurnProgress::AwaitingRoll(request));
        }

        effects.extend(apply_hp(&mut self.state.character, response.hp_change));
        effects.extend(apply_xp(&mut self.state.character, response.xp_gained));

        let narrative = response.story.clone();
        let declares_end = response.declares_end();
        let turn = Turn::new(action, response);
        let report = self
            .complete_turn(turn, narrative, None, effects, Vec::new(), declares_end)
            .await;
        Ok(TurnProgress::Complete(report))
    }

    async fn resolve_roll(&mut self, draw: u8) -> Result<TurnReport, SessionError> {
        let pending = self.pending.take().ok_or(SessionError::NoPendingRoll)?;
        let Some(check) = pending.event.check().cloned() else {
            self.phase = TurnPhase::Idle;
            self.turn_in_flight = false;
            return Err(SessionError::NoPendingRoll);
        };

        let character = &mut self.state.character;
        let dice = resolve_with_bonus(
            draw,
            character.stat_value(check.stat),
            check.difficulty,
            character.special_ability.applies_to(check.stat),
            self.config.special_ability_bonus,
        );
        tracing::info!(
            draw = dice.draw,
            total = dice.total,
            difficulty = dice.difficulty,
            passed = dice.passed,
            "Dice resolved"
        );

        // Mechanics first; the outcome call below cannot undo them.
        let hp_delta = check_hp_penalty(check.severity, check.difficulty, dice.passed);
        let xp = check_xp_reward(check.difficulty, dice.passed);
        let mut effects = pending.effects.clone();
        effects.extend(apply_hp(character, hp_delta));
        effects.extend(apply_xp(character, xp));

        let request = outcome_request(&pending.action, &pending.event, &dice, hp_delta, xp, character);
        self.phase = TurnPhase::AwaitingOutcomeNarration;
        self.resolving = Some(ResolvedCheck {
            pending,
            dice,
            outcome_request: request,
            effects,
        });

        let result = match self.resolving.as_ref() {
            Some(resolved) => {
                self.narrator
                    .narrate_outcome(
                        &self.state,
                        &self.history,
                        &resolved.pending.action,
                        &resolved.pending.response,
                        &resolved.outcome_request,
                    )
                    .await
            }
            None => return Err(SessionError::NoPendingRoll),
        };

        let resolved = self.resolving.take().ok_or(SessionError::NoPendingRoll)?;
        Ok(self.finish_outcome(resolved, result).await)
    }

    async fn finish_outcome(
        &mut self,
        resolved: ResolvedCheck,
        result: Result<Validated<OutcomeResponse>, GeneratorError>,
    ) -> TurnReport {
        let ResolvedCheck {
            pending,
            dice,
            outcome_request,
            mut effects,
        } = resolved;
        let mut notices = Vec::new();
        let mut declares_end = pending.response.declares_end();

        let (narrative, outcome_response) = match result {
            Ok(validated) if validated.valid => {
                let outcome = validated.data;
                effects.extend(
                    self.state
                        .apply_story_changes(outcome.story_changes(), self.config.max_npcs),
                );
                declares_end |= outcome.game_end;
                (outcome.story.clone(), Some(outcome))
            }
            Ok(_) => {
                tracing::warn!("Outcome narration unparseable, using stock text");
                notices.push(Notice::NarrationFallback(
                    "outcome narration could not be parsed".to_string(),
                ));
                (stock_outcome(dice.passed).to_string(), None)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Outcome narration failed, using stock text");
                notices.push(Notice::NarrationFallback(e.to_string()));
                (stock_outcome(dice.passed).to_string(), None)
            }
        };

        let mut turn = Turn::new(Some(pending.action), pending.response);
        turn.dice = Some(dice);
        turn.outcome_request = Some(outcome_request);
        turn.outcome_response = outcome_response;

        self.complete_turn(turn, narrative, Some(dice), effects, notices, declares_end)
            .await
    }

    async fn complete_turn(
        &mut self,
        turn: Turn,
        narrative: String,
        dice: Option<DiceResult>,
        effects: Vec<Effect>,
        mut notices: Vec<Notice>,
        declares_end: bool,
    ) -> TurnReport {
        self.phase = TurnPhase::TurnComplete;
        self.history.push_turn(turn);
        self.state.turn_count += 1;

        let ended = if !self.state.character.is_alive() {
            Some(Outcome::Defeat)
        } else if declares_end {
            Some(Outcome::Victory)
        } else {
            None
        };

        match ended {
            Some(outcome) => self.end_session(outcome, &mut notices).await,
            None => {
                self.maybe_autosave(&mut notices).await;
                self.phase = TurnPhase::Idle;
            }
        }

        tracing::info!(turn = self.state.turn_count, ended = ?ended, "Turn complete");
        self.turn_in_flight = false;

        TurnReport {
            narrative,
            dice,
            effects,
            notices,
            ended,
        }
    }

    async fn end_session(&mut self, outcome: Outcome, notices: &mut Vec<Notice>) {
        tracing::info!(%outcome, turn = self.state.turn_count, "Session ended");
        self.outcome = Some(outcome);
        self.state.status = outcome.status();
        self.phase = TurnPhase::SessionEnded(outcome);

        if self.store.is_some() {
            notices.push(self.write_notice().await);
        }
    }

    async fn maybe_autosave(&mut self, notices: &mut Vec<Notice>) {
        let interval = self.config.autosave_interval;
        if interval == 0 || self.store.is_none() {
            return;
        }
        if self.state.turn_count.saturating_sub(self.state.last_saved_turn) >= interval {
            notices.push(self.write_notice().await);
        }
    }

    async fn write_notice(&mut self) -> Notice {
        match self.write_snapshot().await {
            Ok(slot_id) => Notice::Saved(slot_id),
            Err(e) => {
                tracing::warn!(error = %e, turn = self.state.turn_count, "Save failed");
                Notice::SaveFailed(e.to_string())
            }
        }
    }

    /// Write the current snapshot, creating the slot on first use.
    /// On failure the game state is left as it was.
    async fn write_snapshot(&mut self) -> Result<SlotId, SessionError> {
        let Some(store) = self.store.as_ref() else {
            return Err(SessionError::Config("no save store configured".to_string()));
        };

        let previous = self.state.last_saved_turn;
        self.state.last_saved_turn = self.state.turn_count;
        let snapshot = Snapshot::build(&self.state, &self.history, self.outcome, self.pending.as_ref());

        let result = match self.slot_id {
            Some(slot_id) => store
                .update_slot(slot_id, &snapshot, self.state.status)
                .await
                .map(|()| slot_id),
            None => {
                store
                    .create_slot(&self.config.player_id, self.config.slot_number, &snapshot)
                    .await
            }
        };

        match result {
            Ok(slot_id) => {
                self.slot_id = Some(slot_id);
                tracing::info!(%slot_id, turn = self.state.turn_count, "Session saved");
                Ok(slot_id)
            }
            Err(e) => {
                self.state.last_saved_turn = previous;
                Err(e.into())
            }
        }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Save now. Allowed between turns and while waiting for a roll.
    pub async fn save(&mut self) -> Result<SlotId, SessionError> {
        if !matches!(
            self.phase,
            TurnPhase::Idle | TurnPhase::AwaitingDiceRoll | TurnPhase::SessionEnded(_)
        ) {
            return Err(SessionError::TurnInProgress);
        }
        self.write_snapshot().await
    }

    /// Project the session into a snapshot.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::build(&self.state, &self.history, self.outcome, self.pending.as_ref())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn character(&self) -> &Character {
        &self.state.character
    }

    pub fn history(&self) -> &TurnHistory {
        &self.history
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn slot_id(&self) -> Option<SlotId> {
        self.slot_id
    }

    pub fn is_turn_in_flight(&self) -> bool {
        self.turn_in_flight
    }

    pub fn is_ended(&self) -> bool {
        self.outcome.is_some()
    }

    /// The roll the session is waiting for, if any.
    pub fn pending_roll(&self) -> Option<RollRequest> {
        self.pending.as_ref().map(|pending| self.roll_request(pending))
    }

    pub fn store(&self) -> Option<&dyn SaveStore> {
        self.store.as_deref()
    }

    fn roll_request(&self, pending: &PendingCheck) -> RollRequest {
        let check = pending.event.check();
        let stat = check.map(|c| c.stat).unwrap_or_default();
        let special = self.state.character.special_ability.applies_to(stat);
        let bonus = self.state.character.stat_value(stat)
            + if special { self.config.special_ability_bonus } else { 0 };

        RollRequest {
            narrative: pending.response.story.clone(),
            kind: pending.event.kind(),
            stat,
            difficulty: check.map(|c| c.difficulty).unwrap_or(crate::validate::DEFAULT_DIFFICULTY),
            severity: check.map(|c| c.severity).unwrap_or_default(),
            bonus,
            special_ability_active: special,
            effects: pending.effects.clone(),
        }
    }

    fn ensure_can_submit(&self) -> Result<(), SessionError> {
        if let TurnPhase::SessionEnded(outcome) = self.phase {
            return Err(SessionError::SessionEnded(outcome));
        }
        if self.turn_in_flight {
            return Err(SessionError::TurnInProgress);
        }
        Ok(())
    }

    fn ensure_roll_pending(&self) -> Result<(), SessionError> {
        if let TurnPhase::SessionEnded(outcome) = self.phase {
            return Err(SessionError::SessionEnded(outcome));
        }
        if self.phase != TurnPhase::AwaitingDiceRoll || self.pending.is_none() {
            return Err(SessionError::NoPendingRoll);
        }
        Ok(())
    }
}
