//! The narrator agent.
//!
//! [`Narrator`] owns the generator and its retry policy and knows how to
//! phrase each kind of request: a primary turn, a dice-outcome narration
//! and a world generation. Every reply is passed through the validator, so
//! callers only ever see repaired, typed responses or a generator error.

use super::generator::{send_with_retry, Generator, GeneratorError, PromptMessage, RetryPolicy};
use super::memory::TurnHistory;
use crate::dice::DiceResult;
use crate::validate::{
    validate_outcome, validate_turn, validate_world, Event, OutcomeResponse, TurnResponse,
    Validated,
};
use crate::world::{Character, GameState, WorldInfo};

const TURN_PROMPT: &str = include_str!("prompts/turn.txt");
const OUTCOME_PROMPT: &str = include_str!("prompts/outcome.txt");
const WORLD_PROMPT: &str = include_str!("prompts/world.txt");

/// Narration used when the outcome call fails after the roll was applied.
pub fn stock_outcome(passed: bool) -> &'static str {
    if passed {
        "You succeed."
    } else {
        "You fail."
    }
}

/// Drives generator calls for a session.
pub struct Narrator {
    generator: Box<dyn Generator>,
    retry: RetryPolicy,
}

impl Narrator {
    pub fn new(generator: impl Generator + 'static) -> Self {
        Self {
            generator: Box::new(generator),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Request the primary narration for `request` (a player action or the
    /// opening request).
    pub async fn narrate_turn(
        &self,
        state: &GameState,
        history: &TurnHistory,
        request: &str,
    ) -> Result<Validated<TurnResponse>, GeneratorError> {
        let messages = history.build_messages(request);
        let system_prompt = build_system_prompt(TURN_PROMPT, state);

        let raw = self.send(&messages, &system_prompt, "turn").await?;
        let validated = validate_turn(&raw);
        log_repairs("turn", &validated);
        Ok(validated)
    }

    /// Request narration of an already-resolved check.
    pub async fn narrate_outcome(
        &self,
        state: &GameState,
        history: &TurnHistory,
        action: &str,
        primary: &TurnResponse,
        outcome_request: &str,
    ) -> Result<Validated<OutcomeResponse>, GeneratorError> {
        let messages = history.build_outcome_messages(action, primary, outcome_request);
        let system_prompt = build_system_prompt(OUTCOME_PROMPT, state);

        let raw = self.send(&messages, &system_prompt, "outcome").await?;
        let validated = validate_outcome(&raw);
        log_repairs("outcome", &validated);
        Ok(validated)
    }

    /// Invent a world from a player-supplied premise.
    pub async fn generate_world(&self, premise: &str) -> Result<Validated<WorldInfo>, GeneratorError> {
        let messages = [PromptMessage::user(format!("Premise: {premise}"))];
        let raw = self.send(&messages, WORLD_PROMPT, "world").await?;
        let validated = validate_world(&raw);
        log_repairs("world", &validated);
        Ok(validated)
    }

    async fn send(
        &self,
        messages: &[PromptMessage],
        system_prompt: &str,
        operation: &str,
    ) -> Result<String, GeneratorError> {
        tracing::debug!(operation, messages = messages.len(), "Sending prompt");
        let raw = send_with_retry(&*self.generator, messages, system_prompt, &self.retry, operation).await?;
        tracing::debug!(operation, response = %raw, "Generator replied");
        Ok(raw)
    }
}

/// Generate a world with the default retry policy.
pub async fn generate_world(
    generator: impl Generator + 'static,
    premise: &str,
) -> Result<Validated<WorldInfo>, GeneratorError> {
    Narrator::new(generator).generate_world(premise).await
}

fn log_repairs<T>(kind: &str, validated: &Validated<T>) {
    if !validated.valid {
        tracing::warn!(kind, errors = ?validated.errors, "Unparseable generator response, using raw text");
        return;
    }
    for error in &validated.errors {
        tracing::warn!(kind, repair = %error, "Repaired generator response");
    }
}

/// Template plus the live state the generator should respect.
pub fn build_system_prompt(template: &str, state: &GameState) -> String {
    let mut prompt = String::from(template.trim_end());

    let world = &state.world;
    prompt.push_str(&format!("\n\n## World: {}\n", world.world_name));
    for (label, value) in [
        ("Setting", &world.setting),
        ("Tone", &world.tone),
        ("Premise", &world.premise),
        ("Starting location", &world.starting_location),
    ] {
        if !value.is_empty() {
            prompt.push_str(&format!("{label}: {value}\n"));
        }
    }

    let pc = &state.character;
    prompt.push_str("\n## Player Character\n");
    if pc.gender.is_empty() {
        prompt.push_str(&format!("Name: {}\n", pc.name));
    } else {
        prompt.push_str(&format!("Name: {} ({})\n", pc.name, pc.gender));
    }
    prompt.push_str(&format!(
        "Level {} | HP {}/{} ({}) | XP {}/{}\n",
        pc.level,
        pc.hp,
        pc.max_hp,
        describe_hp_status(pc.hp, pc.max_hp),
        pc.xp,
        pc.xp_to_next
    ));
    let stats: Vec<String> = crate::world::Stat::ALL
        .iter()
        .map(|stat| format!("{stat} {}", pc.stat_value(*stat)))
        .collect();
    prompt.push_str(&format!("Stats: {}\n", stats.join(", ")));
    if !pc.special_ability.name.trim().is_empty() {
        prompt.push_str(&format!(
            "Special ability: {} ({})",
            pc.special_ability.name, pc.special_ability.stat
        ));
        if !pc.special_ability.description.is_empty() {
            prompt.push_str(&format!(": {}", pc.special_ability.description));
        }
        prompt.push('\n');
    }

    if !state.npcs.is_empty() {
        prompt.push_str("\n## Known NPCs\n");
        for npc in state.npcs.iter() {
            prompt.push_str(&format!("- {}", npc.name));
            if !npc.role.is_empty() {
                prompt.push_str(&format!(" ({})", npc.role));
            }
            prompt.push_str(&format!(", relationship {}", npc.relationship));
            if !npc.personality.is_empty() {
                prompt.push_str(&format!(": {}", npc.personality));
            }
            prompt.push('\n');
        }
    }

    prompt.push_str("\n## Inventory\n");
    if state.inventory.is_empty() {
        prompt.push_str("(empty)\n");
    } else {
        for item in state.inventory.items() {
            prompt.push_str(&format!("- {item}\n"));
        }
    }

    prompt
}

/// Text of the user message asking for an outcome narration.
pub fn outcome_request(
    action: &str,
    event: &Event,
    dice: &DiceResult,
    hp_delta: i32,
    xp_gained: i32,
    character: &Character,
) -> String {
    let verdict = if dice.passed { "SUCCESS" } else { "FAILURE" };
    let mut request = format!("[DICE RESULT] The character attempted: {action}\n");

    if let Some(check) = event.check() {
        request.push_str(&format!("Check: {} ({}), {} severity\n", event.kind(), check.stat, check.severity));
    }
    request.push_str(&format!("Roll: {dice}\nResult: {verdict}\n"));
    request.push_str(&format!(
        "Already applied: HP {hp_delta:+}, XP {xp_gained:+} (HP now {}/{})\n",
        character.hp, character.max_hp
    ));

    let hint = event.check().and_then(|check| {
        if dice.passed {
            check.success_hint.as_deref()
        } else {
            check.fail_hint.as_deref()
        }
    });
    if let Some(hint) = hint {
        request.push_str(&format!("Hint: {hint}\n"));
    }

    request.push_str("Narrate the outcome.");
    request
}

/// Describe HP in narrative terms.
fn describe_hp_status(current: i32, max: i32) -> &'static str {
    if current <= 0 {
        "down"
    } else if current >= max {
        "uninjured"
    } else {
        let ratio = current as f32 / max as f32;
        if ratio > 0.75 {
            "lightly wounded"
        } else if ratio > 0.5 {
            "bloodied"
        } else if ratio > 0.25 {
            "badly wounded"
        } else {
            "near death"
        }
    }
}
