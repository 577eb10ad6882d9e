//! Testing utilities for the narrative engine.
//!
//! This module provides tools for integration testing:
//! - `MockGenerator` for deterministic testing without API calls
//! - `FixedD20` and `MemoryStore` for scripted dice and in-memory saves
//! - `TestHarness` for scripted game scenarios
//! - Assertion helpers for verifying game state

use crate::dice::{D20Source, D20_MAX, D20_MIN};
use crate::dm::{Generator, GeneratorError, PromptMessage};
use crate::persist::{PersistError, SaveStore, SlotId, SlotMetadata, Snapshot};
use crate::session::{GameSession, SessionConfig, SessionError, TurnProgress, TurnReport};
use crate::world::{Character, SessionStatus, SpecialAbility, Stat, Stats, WorldInfo};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A scripted generator reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Fail(GeneratorError),
    /// Never resolves; exercises timeouts.
    Hang,
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(text.into())
    }

    pub fn json(value: serde_json::Value) -> Self {
        MockReply::Text(value.to_string())
    }

    pub fn fail(error: GeneratorError) -> Self {
        MockReply::Fail(error)
    }
}

/// One recorded call to a [`MockGenerator`].
#[derive(Debug, Clone)]
pub struct MockCall {
    pub messages: Vec<PromptMessage>,
    pub system_prompt: String,
}

#[derive(Debug, Default)]
struct MockState {
    replies: VecDeque<MockReply>,
    calls: Vec<MockCall>,
}

/// A generator that returns scripted replies in order.
///
/// Clones share their script and call log, so a test can keep one handle
/// while the session owns another. An exhausted script fails with a
/// non-retryable provider error.
#[derive(Debug, Clone, Default)]
pub struct MockGenerator {
    state: Arc<Mutex<MockState>>,
}

impl MockGenerator {
    pub fn new(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                replies: replies.into_iter().collect(),
                calls: Vec::new(),
            })),
        }
    }

    /// Append a reply to the script.
    pub fn push(&self, reply: MockReply) {
        self.lock().replies.push_back(reply);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn remaining(&self) -> usize {
        self.lock().replies.len()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn send_prompt(
        &self,
        messages: &[PromptMessage],
        system_prompt: &str,
    ) -> Result<String, GeneratorError> {
        let reply = {
            let mut state = self.lock();
            state.calls.push(MockCall {
                messages: messages.to_vec(),
                system_prompt: system_prompt.to_string(),
            });
            state.replies.pop_front()
        };

        match reply {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Fail(error)) => Err(error),
            Some(MockReply::Hang) => std::future::pending().await,
            None => Err(GeneratorError::Provider {
                message: "mock generator has no more scripted replies".to_string(),
                transient: false,
            }),
        }
    }
}

/// A d20 that returns scripted draws, then `fallback`.
#[derive(Debug, Clone)]
pub struct FixedD20 {
    draws: VecDeque<u8>,
    fallback: u8,
}

impl FixedD20 {
    pub fn new(draws: impl IntoIterator<Item = u8>) -> Self {
        Self {
            draws: draws.into_iter().collect(),
            fallback: 10,
        }
    }

    pub fn with_fallback(mut self, fallback: u8) -> Self {
        self.fallback = fallback;
        self
    }
}

impl D20Source for FixedD20 {
    fn roll(&mut self) -> u8 {
        self.draws
            .pop_front()
            .unwrap_or(self.fallback)
            .clamp(D20_MIN, D20_MAX)
    }
}

#[derive(Debug, Default)]
struct StoreState {
    slots: HashMap<SlotId, (SlotMetadata, Snapshot)>,
    writes: usize,
    fail_writes: bool,
}

/// A [`SaveStore`] held in memory. Clones share their slots.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent create or update fail with an IO error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Successful creates and updates so far.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    pub fn slot_count(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn snapshot(&self, slot_id: SlotId) -> Option<Snapshot> {
        self.lock().slots.get(&slot_id).map(|(_, snapshot)| snapshot.clone())
    }

    pub fn metadata(&self, slot_id: SlotId) -> Option<SlotMetadata> {
        self.lock().slots.get(&slot_id).map(|(metadata, _)| metadata.clone())
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(state: &StoreState) -> Result<(), PersistError> {
        if state.fail_writes {
            return Err(PersistError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated write failure",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SaveStore for MemoryStore {
    async fn create_slot(
        &self,
        player_id: &str,
        slot_number: u32,
        snapshot: &Snapshot,
    ) -> Result<SlotId, PersistError> {
        let mut state = self.lock();
        Self::check_writable(&state)?;
        let metadata = SlotMetadata::for_new_slot(player_id, slot_number, snapshot);
        let slot_id = metadata.slot_id;
        state.slots.insert(slot_id, (metadata, snapshot.clone()));
        state.writes += 1;
        Ok(slot_id)
    }

    async fn update_slot(
        &self,
        slot_id: SlotId,
        snapshot: &Snapshot,
        status: SessionStatus,
    ) -> Result<(), PersistError> {
        let mut state = self.lock();
        Self::check_writable(&state)?;
        let metadata = match state.slots.get(&slot_id) {
            Some((metadata, _)) => metadata.updated(snapshot, status),
            None => return Err(PersistError::SlotNotFound(slot_id)),
        };
        state.slots.insert(slot_id, (metadata, snapshot.clone()));
        state.writes += 1;
        Ok(())
    }

    async fn list_slots(&self, player_id: &str) -> Result<Vec<SlotMetadata>, PersistError> {
        let mut slots: Vec<SlotMetadata> = self
            .lock()
            .slots
            .values()
            .filter(|(metadata, _)| metadata.player_id == player_id)
            .map(|(metadata, _)| metadata.clone())
            .collect();
        slots.sort_by_key(|metadata| metadata.slot_number);
        Ok(slots)
    }

    async fn delete_slot(&self, slot_id: SlotId) -> Result<(), PersistError> {
        match self.lock().slots.remove(&slot_id) {
            Some(_) => Ok(()),
            None => Err(PersistError::SlotNotFound(slot_id)),
        }
    }

    async fn load_slot(&self, slot_id: SlotId) -> Result<Snapshot, PersistError> {
        let snapshot = self
            .lock()
            .slots
            .get(&slot_id)
            .map(|(_, snapshot)| snapshot.clone())
            .ok_or(PersistError::SlotNotFound(slot_id))?;
        snapshot.check_version()?;
        Ok(snapshot)
    }
}

/// A small world for tests.
pub fn sample_world() -> WorldInfo {
    WorldInfo::new("Emberfall", "a city built inside a dormant volcano")
        .with_tone("tense, smoky intrigue")
        .with_premise("The forge-priests have stopped the bells. Find out why.")
        .with_starting_location("the Ashgate market")
}

/// A level 1 character: STR 2, DEX 1, INT 0, CHA 3, WIL 1, silver-tongued (CHA).
pub fn sample_character() -> Character {
    Character::new(
        "Mira",
        "female",
        Stats::new(2, 1, 0, 3, 1),
        SpecialAbility::new("Silver Tongue", Stat::Charisma, "Talks her way past almost anyone."),
    )
}

/// Test harness for running scripted sessions.
///
/// The generator, dice and store are shared with the session, so replies
/// and draws can be queued while it runs.
pub struct TestHarness {
    pub session: GameSession,
    pub generator: MockGenerator,
    pub store: MemoryStore,
}

impl TestHarness {
    /// A session with the sample world and character, no retries and a
    /// memory store.
    pub fn new() -> Self {
        Self::with_config(SessionConfig::new("tester"))
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self::with_character(config, sample_character())
    }

    pub fn with_character(config: SessionConfig, character: Character) -> Self {
        let generator = MockGenerator::default();
        let store = MemoryStore::new();
        let config = config.with_generator_retries(0, Duration::ZERO);
        let session = match GameSession::new(config, sample_world(), character, generator.clone()) {
            Ok(session) => session.with_store(store.clone()),
            Err(e) => panic!("invalid test session config: {e}"),
        };

        Self {
            session,
            generator,
            store,
        }
    }

    /// Queue a plain narration with no mechanics.
    pub fn expect_story(&mut self, story: &str) -> &mut Self {
        self.generator.push(MockReply::json(serde_json::json!({ "story": story })));
        self
    }

    /// Queue an arbitrary JSON reply.
    pub fn expect_json(&mut self, value: serde_json::Value) -> &mut Self {
        self.generator.push(MockReply::json(value));
        self
    }

    /// Queue a narration that asks for a stat check.
    pub fn expect_check(&mut self, story: &str, stat: Stat, difficulty: u8, important: bool) -> &mut Self {
        self.expect_json(serde_json::json!({
            "story": story,
            "event": {
                "type": "stat_check",
                "stat": stat.abbreviation(),
                "difficulty": difficulty,
                "severity": if important { "important" } else { "basic" },
            }
        }))
    }

    pub fn expect_reply(&mut self, reply: MockReply) -> &mut Self {
        self.generator.push(reply);
        self
    }

    /// Submit an action and return the progress.
    pub async fn act(&mut self, action: &str) -> Result<TurnProgress, SessionError> {
        self.session.player_action(action).await
    }

    /// Submit an action that must complete without a roll.
    pub async fn act_complete(&mut self, action: &str) -> TurnReport {
        match self.act(action).await {
            Ok(TurnProgress::Complete(report)) => report,
            Ok(TurnProgress::AwaitingRoll(request)) => {
                panic!("expected '{action}' to complete, but it awaits a {} roll", request.stat)
            }
            Err(e) => panic!("action '{action}' failed: {e}"),
        }
    }

    /// Submit an action, then resolve its check with `draw`.
    pub async fn act_and_roll(&mut self, action: &str, draw: u8) -> TurnReport {
        match self.act(action).await {
            Ok(TurnProgress::AwaitingRoll(_)) => {}
            Ok(TurnProgress::Complete(_)) => panic!("expected '{action}' to ask for a roll"),
            Err(e) => panic!("action '{action}' failed: {e}"),
        }
        match self.session.supply_dice_trigger(draw).await {
            Ok(report) => report,
            Err(e) => panic!("roll for '{action}' failed: {e}"),
        }
    }

    pub fn hp(&self) -> (i32, i32) {
        let character = self.session.character();
        (character.hp, character.max_hp)
    }

    pub fn has_item(&self, item: &str) -> bool {
        self.session.state().inventory.contains(item)
    }

    pub fn has_npc(&self, name: &str) -> bool {
        self.session.state().npcs.find(name).is_some()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert player HP is at expected values.
#[track_caller]
pub fn assert_hp(harness: &TestHarness, current: i32, max: i32) {
    let (actual_current, actual_max) = harness.hp();
    assert_eq!(
        (actual_current, actual_max),
        (current, max),
        "Expected HP {current}/{max}, got {actual_current}/{actual_max}"
    );
}

/// Assert the inventory holds `item`.
#[track_caller]
pub fn assert_has_item(harness: &TestHarness, item: &str) {
    assert!(harness.has_item(item), "Expected '{item}' in inventory");
}

/// Assert an NPC named `name` is tracked.
#[track_caller]
pub fn assert_has_npc(harness: &TestHarness, name: &str) {
    assert!(harness.has_npc(name), "Expected NPC '{name}' to be tracked");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dm::PromptMessage;

    #[tokio::test]
    async fn test_mock_generator_script() {
        let generator = MockGenerator::new([MockReply::text("one")]);
        generator.push(MockReply::text("two"));
        let prompt = [PromptMessage::user("hi")];

        assert_eq!(generator.send_prompt(&prompt, "sys").await.unwrap(), "one");
        assert_eq!(generator.clone().send_prompt(&prompt, "sys").await.unwrap(), "two");

        let exhausted = generator.send_prompt(&prompt, "sys").await.unwrap_err();
        assert!(!exhausted.is_retryable());
        assert_eq!(generator.call_count(), 3);
        assert_eq!(generator.calls()[0].system_prompt, "sys");
    }

    #[test]
    fn test_fixed_d20() {
        let mut d20 = FixedD20::new([25, 0, 7]).with_fallback(13);
        assert_eq!(d20.roll(), 20);
        assert_eq!(d20.roll(), 1);
        assert_eq!(d20.roll(), 7);
        assert_eq!(d20.roll(), 13);
    }

    #[tokio::test]
    async fn test_memory_store_failures() {
        let store = MemoryStore::new();
        let snapshot = TestHarness::new().session.snapshot();

        store.set_fail_writes(true);
        assert!(store.create_slot("p", 1, &snapshot).await.is_err());
        assert_eq!(store.write_count(), 0);

        store.set_fail_writes(false);
        let slot = store.create_slot("p", 1, &snapshot).await.unwrap();
        assert_eq!(store.load_slot(slot).await.unwrap(), snapshot);
        assert_eq!(store.list_slots("p").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_harness_basic_turn() {
        let mut harness = TestHarness::new();
        harness.expect_json(serde_json::json!({
            "story": "A merchant presses a lantern into your hands.",
            "item_gained": "Lantern",
            "new_npc": {"name": "Oren", "role": "merchant"}
        }));

        let report = harness.act_complete("I browse the stalls").await;
        assert!(report.narrative.contains("lantern"));
        assert_has_item(&harness, "Lantern");
        assert_has_npc(&harness, "Oren");
        assert_hp(&harness, 100, 100);
    }
}
