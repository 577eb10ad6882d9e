//! Decoding and repair of generator output.
//!
//! Generator text is untrusted. Decoding happens in two steps:
//!
//! 1. [`decode`] strips code fences and parses the text into a JSON object,
//!    or reports the text as [`Decoded::Degraded`].
//! 2. A [`ResponseSchema`] builds its typed record from the object field by
//!    field, repairing anything malformed and recording each repair.
//!
//! [`validate`] never fails. A degraded record carries the raw text as its
//! narrative and leaves every mechanical field inert, so the turn can still
//! be shown without touching game state.

use crate::world::{Stat, WorldInfo};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Difficulty used when a check omits one.
pub const DEFAULT_DIFFICULTY: u8 = 10;

/// Bounds for a check's difficulty class.
pub const MIN_DIFFICULTY: u8 = 1;
pub const MAX_DIFFICULTY: u8 = 20;

/// Whether a failed check costs HP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Basic,
    Important,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Basic => write!(f, "basic"),
            Severity::Important => write!(f, "important"),
        }
    }
}

/// The mechanical part of a stat check or combat event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Check {
    pub stat: Stat,
    pub difficulty: u8,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_hint: Option<String>,
}

/// Narrative hints carried by events that need no roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Hints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_hint: Option<String>,
}

/// A generator-declared trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    StatCheck(Check),
    Combat(Check),
    ItemFound(Hints),
    NpcEncounter(Hints),
    StoryEnd(Hints),
}

impl Event {
    /// Wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::StatCheck(_) => "stat_check",
            Event::Combat(_) => "combat",
            Event::ItemFound(_) => "item_found",
            Event::NpcEncounter(_) => "npc_encounter",
            Event::StoryEnd(_) => "story_end",
        }
    }

    /// The check to roll, for stat checks and combat.
    pub fn check(&self) -> Option<&Check> {
        match self {
            Event::StatCheck(check) | Event::Combat(check) => Some(check),
            _ => None,
        }
    }

    pub fn requires_roll(&self) -> bool {
        self.check().is_some()
    }

    pub fn is_story_end(&self) -> bool {
        matches!(self, Event::StoryEnd(_))
    }
}

/// An NPC introduced by a narration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcData {
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub appearance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<i32>,
}

/// A relationship shift for a known NPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcUpdate {
    pub name: String,
    pub change: i32,
    #[serde(default)]
    pub reason: String,
}

/// The primary response to a player action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TurnResponse {
    pub story: String,
    #[serde(default)]
    pub event: Option<Event>,
    #[serde(default)]
    pub item_gained: Option<String>,
    #[serde(default)]
    pub item_lost: Option<String>,
    #[serde(default)]
    pub new_npc: Option<NpcData>,
    #[serde(default)]
    pub npc_updates: Vec<NpcUpdate>,
    #[serde(default)]
    pub hp_change: i32,
    #[serde(default)]
    pub xp_gained: i32,
    #[serde(default)]
    pub game_end: bool,
}

impl TurnResponse {
    pub fn story_changes(&self) -> StoryChanges<'_> {
        StoryChanges {
            item_gained: self.item_gained.as_deref(),
            item_lost: self.item_lost.as_deref(),
            new_npc: self.new_npc.as_ref(),
            npc_updates: &self.npc_updates,
        }
    }

    /// Whether this response declares the story over.
    pub fn declares_end(&self) -> bool {
        self.game_end || self.event.as_ref().is_some_and(Event::is_story_end)
    }
}

/// Narration of a resolved check. HP and XP are engine-computed and never
/// read from this response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct OutcomeResponse {
    pub story: String,
    #[serde(default)]
    pub item_gained: Option<String>,
    #[serde(default)]
    pub item_lost: Option<String>,
    #[serde(default)]
    pub new_npc: Option<NpcData>,
    #[serde(default)]
    pub npc_updates: Vec<NpcUpdate>,
    #[serde(default)]
    pub game_end: bool,
}

impl OutcomeResponse {
    pub fn story_changes(&self) -> StoryChanges<'_> {
        StoryChanges {
            item_gained: self.item_gained.as_deref(),
            item_lost: self.item_lost.as_deref(),
            new_npc: self.new_npc.as_ref(),
            npc_updates: &self.npc_updates,
        }
    }
}

/// Item and NPC changes shared by turn and outcome responses.
#[derive(Debug, Clone, Copy)]
pub struct StoryChanges<'a> {
    pub item_gained: Option<&'a str>,
    pub item_lost: Option<&'a str>,
    pub new_npc: Option<&'a NpcData>,
    pub npc_updates: &'a [NpcUpdate],
}

/// Result of validating generator text.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated<T> {
    /// False only when the text could not be parsed at all.
    pub valid: bool,
    /// Always usable, possibly degraded.
    pub data: T,
    /// One human-readable line per repair.
    pub errors: Vec<String>,
}

/// First decoding step: either a JSON object or the raw text.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Object(Map<String, Value>),
    Degraded { raw: String, reason: String },
}

/// A response shape that can be rebuilt from an untrusted JSON object.
pub trait ResponseSchema: Sized {
    /// The record used when parsing fails outright.
    fn degraded(raw: &str) -> Self;

    /// Build the record field by field, pushing a message for every repair.
    fn from_object(object: &Map<String, Value>, raw: &str, errors: &mut Vec<String>) -> Self;
}

/// Strip a surrounding Markdown code fence, if any.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string ("json"), which may share a line with the body.
    let info_len = rest
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(rest.len());
    let body = rest[info_len..].trim();
    body
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Parse generator text into a JSON object.
pub fn decode(raw: &str) -> Decoded {
    let body = strip_code_fence(raw);
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(object)) => Decoded::Object(object),
        Ok(other) => Decoded::Degraded {
            raw: raw.to_string(),
            reason: format!("expected a JSON object, found {}", json_type_name(&other)),
        },
        Err(e) => Decoded::Degraded {
            raw: raw.to_string(),
            reason: format!("response is not valid JSON: {e}"),
        },
    }
}

/// Validate generator text as response shape `T`. Never fails.
pub fn validate<T: ResponseSchema>(raw: &str) -> Validated<T> {
    match decode(raw) {
        Decoded::Object(object) => {
            let mut errors = Vec::new();
            let data = T::from_object(&object, raw, &mut errors);
            Validated {
                valid: true,
                data,
                errors,
            }
        }
        Decoded::Degraded { raw, reason } => Validated {
            valid: false,
            data: T::degraded(&raw),
            errors: vec![reason],
        },
    }
}

/// Validate a primary turn response.
pub fn validate_turn(raw: &str) -> Validated<TurnResponse> {
    validate(raw)
}

/// Validate a dice-outcome narration.
pub fn validate_outcome(raw: &str) -> Validated<OutcomeResponse> {
    validate(raw)
}

/// Validate a world-generation response.
pub fn validate_world(raw: &str) -> Validated<WorldInfo> {
    validate(raw)
}

impl ResponseSchema for TurnResponse {
    fn degraded(raw: &str) -> Self {
        Self {
            story: raw.to_string(),
            ..Self::default()
        }
    }

    fn from_object(object: &Map<String, Value>, raw: &str, errors: &mut Vec<String>) -> Self {
        Self {
            story: read_story(object, raw, errors),
            event: read_event(object.get("event"), errors),
            item_gained: read_item(object, "item_gained", errors),
            item_lost: read_item(object, "item_lost", errors),
            new_npc: read_new_npc(object.get("new_npc"), errors),
            npc_updates: read_npc_updates(object.get("npc_updates"), errors),
            hp_change: read_int(object, "hp_change", errors),
            xp_gained: read_int(object, "xp_gained", errors),
            game_end: read_bool(object, "game_end", errors),
        }
    }
}

impl ResponseSchema for OutcomeResponse {
    fn degraded(raw: &str) -> Self {
        Self {
            story: raw.to_string(),
            ..Self::default()
        }
    }

    fn from_object(object: &Map<String, Value>, raw: &str, errors: &mut Vec<String>) -> Self {
        for key in ["hp_change", "xp_gained"] {
            if object.get(key).is_some_and(|v| !v.is_null()) {
                errors.push(format!(
                    "'{key}' is computed by the engine for dice outcomes; value ignored"
                ));
            }
        }

        Self {
            story: read_story(object, raw, errors),
            item_gained: read_item(object, "item_gained", errors),
            item_lost: read_item(object, "item_lost", errors),
            new_npc: read_new_npc(object.get("new_npc"), errors),
            npc_updates: read_npc_updates(object.get("npc_updates"), errors),
            game_end: read_bool(object, "game_end", errors),
        }
    }
}

impl ResponseSchema for WorldInfo {
    fn degraded(raw: &str) -> Self {
        Self {
            premise: raw.to_string(),
            ..Self::default()
        }
    }

    fn from_object(object: &Map<String, Value>, _raw: &str, errors: &mut Vec<String>) -> Self {
        let mut field = |key: &str| match object.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::String(_)) | Some(Value::Null) | None => {
                errors.push(format!("missing required field '{key}'"));
                String::new()
            }
            Some(other) => {
                errors.push(format!(
                    "field '{key}' should be a string, found {}",
                    json_type_name(other)
                ));
                String::new()
            }
        };

        Self {
            world_name: field("world_name"),
            setting: field("setting"),
            tone: field("tone"),
            premise: field("premise"),
            starting_location: field("starting_location"),
        }
    }
}

fn read_story(object: &Map<String, Value>, raw: &str, errors: &mut Vec<String>) -> String {
    match object.get("story") {
        Some(Value::String(story)) if !story.trim().is_empty() => story.clone(),
        _ => {
            errors.push("missing or invalid 'story'; using raw text".to_string());
            raw.to_string()
        }
    }
}

fn read_event(value: Option<&Value>, errors: &mut Vec<String>) -> Option<Event> {
    let object = match value {
        None | Some(Value::Null) => return None,
        Some(Value::Object(object)) => object,
        Some(other) => {
            errors.push(format!(
                "'event' should be an object, found {}; event dropped",
                json_type_name(other)
            ));
            return None;
        }
    };

    let kind = object.get("type").and_then(Value::as_str).map(str::trim);
    let hints = Hints {
        success_hint: read_optional_string(object, "success_hint"),
        fail_hint: read_optional_string(object, "fail_hint"),
    };

    match kind {
        Some("stat_check") => Some(Event::StatCheck(read_check(object, hints, errors))),
        Some("combat") => Some(Event::Combat(read_check(object, hints, errors))),
        Some("item_found") => Some(Event::ItemFound(hints)),
        Some("npc_encounter") => Some(Event::NpcEncounter(hints)),
        Some("story_end") => Some(Event::StoryEnd(hints)),
        Some(other) => {
            errors.push(format!("unrecognized event type '{other}'; event dropped"));
            None
        }
        None => {
            errors.push("event has no 'type'; event dropped".to_string());
            None
        }
    }
}

fn read_check(object: &Map<String, Value>, hints: Hints, errors: &mut Vec<String>) -> Check {
    let stat = match object.get("stat").and_then(Value::as_str) {
        Some(name) => name.parse::<Stat>().unwrap_or_else(|e| {
            errors.push(format!("{e}; defaulting to {}", Stat::default()));
            Stat::default()
        }),
        None => {
            errors.push(format!("check has no 'stat'; defaulting to {}", Stat::default()));
            Stat::default()
        }
    };

    let difficulty = match object.get("difficulty").and_then(as_integer) {
        Some(dc) => {
            let clamped = dc.clamp(i64::from(MIN_DIFFICULTY), i64::from(MAX_DIFFICULTY));
            if clamped != dc {
                errors.push(format!("difficulty {dc} out of range; clamped to {clamped}"));
            }
            // Clamped into 1..=20 above.
            clamped as u8
        }
        None => {
            errors.push(format!(
                "check has no numeric 'difficulty'; defaulting to {DEFAULT_DIFFICULTY}"
            ));
            DEFAULT_DIFFICULTY
        }
    };

    let severity = match object.get("severity") {
        None | Some(Value::Null) => Severity::Basic,
        Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("important") => {
            Severity::Important
        }
        Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("basic") => Severity::Basic,
        Some(other) => {
            errors.push(format!("unrecognized severity {other}; using basic"));
            Severity::Basic
        }
    };

    Check {
        stat,
        difficulty,
        severity,
        success_hint: hints.success_hint,
        fail_hint: hints.fail_hint,
    }
}

fn read_item(object: &Map<String, Value>, key: &str, errors: &mut Vec<String>) -> Option<String> {
    match object.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(item)) if item.trim().is_empty() => None,
        Some(Value::String(item)) => Some(item.trim().to_string()),
        Some(other) => {
            errors.push(format!(
                "'{key}' should be a string, found {}; ignored",
                json_type_name(other)
            ));
            None
        }
    }
}

fn read_new_npc(value: Option<&Value>, errors: &mut Vec<String>) -> Option<NpcData> {
    let object = match value {
        None | Some(Value::Null) => return None,
        Some(Value::Object(object)) => object,
        Some(other) => {
            errors.push(format!(
                "'new_npc' should be an object, found {}; ignored",
                json_type_name(other)
            ));
            return None;
        }
    };

    let Some(name) = read_optional_string(object, "name") else {
        errors.push("'new_npc' has no name; ignored".to_string());
        return None;
    };

    let relationship = match object.get("relationship") {
        None | Some(Value::Null) => None,
        Some(value) => match as_integer(value) {
            Some(r) => Some(saturate_i32(r)),
            None => {
                errors.push(format!("NPC '{name}' has a non-numeric relationship; using 0"));
                None
            }
        },
    };

    Some(NpcData {
        name,
        role: read_optional_string(object, "role").unwrap_or_default(),
        personality: read_optional_string(object, "personality").unwrap_or_default(),
        appearance: read_optional_string(object, "appearance").unwrap_or_default(),
        relationship,
    })
}

fn read_npc_updates(value: Option<&Value>, errors: &mut Vec<String>) -> Vec<NpcUpdate> {
    let entries = match value {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            errors.push(format!(
                "'npc_updates' should be an array, found {}; ignored",
                json_type_name(other)
            ));
            return Vec::new();
        }
    };

    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let Some(object) = entry.as_object() else {
                errors.push(format!("npc_updates[{index}] is not an object; skipped"));
                return None;
            };
            let Some(name) = read_optional_string(object, "name") else {
                errors.push(format!("npc_updates[{index}] has no name; skipped"));
                return None;
            };
            let Some(change) = object.get("change").and_then(as_integer) else {
                errors.push(format!("npc_updates[{index}] has no numeric change; skipped"));
                return None;
            };
            Some(NpcUpdate {
                name,
                change: saturate_i32(change),
                reason: read_optional_string(object, "reason").unwrap_or_default(),
            })
        })
        .collect()
}

fn read_int(object: &Map<String, Value>, key: &str, errors: &mut Vec<String>) -> i32 {
    match object.get(key) {
        None | Some(Value::Null) => 0,
        Some(value) => match as_integer(value) {
            Some(n) => saturate_i32(n),
            None => {
                errors.push(format!("'{key}' is not a number; using 0"));
                0
            }
        },
    }
}

fn read_bool(object: &Map<String, Value>, key: &str, errors: &mut Vec<String>) -> bool {
    match object.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("true") => true,
        Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("false") => false,
        Some(other) => {
            errors.push(format!("'{key}' is not a boolean ({other}); using false"));
            false
        }
    }
}

fn read_optional_string(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Integers, floats (truncated) and numeric strings.
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn saturate_i32(n: i64) -> i32 {
    n.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_not_json_degrades() {
        let result = validate_turn("not json");
        assert!(!result.valid);
        assert_eq!(result.data.story, "not json");
        assert_eq!(result.data.event, None);
        assert_eq!(result.data.hp_change, 0);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_json_array_degrades() {
        let result = validate_turn("[1, 2, 3]");
        assert!(!result.valid);
        assert_eq!(result.data.story, "[1, 2, 3]");
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```  "), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
        assert_eq!(strip_code_fence("```json {\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```JSON{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn test_single_line_fence_parses() {
        let result = validate_turn("```json {\"story\":\"x\"}```");
        assert!(result.valid);
        assert_eq!(result.data.story, "x");
    }

    #[test]
    fn test_fenced_response_parses() {
        let raw = "```json\n{\"story\": \"You wake.\", \"xp_gained\": 3}\n```";
        let result = validate_turn(raw);
        assert!(result.valid);
        assert_eq!(result.data.story, "You wake.");
        assert_eq!(result.data.xp_gained, 3);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_full_turn_response() {
        let raw = json!({
            "story": "A guard blocks the gate.",
            "event": {
                "type": "stat_check",
                "stat": "CHA",
                "difficulty": 14,
                "severity": "important",
                "success_hint": "he waves you through",
                "fail_hint": "he calls for help"
            },
            "item_gained": "Gate Pass",
            "new_npc": {"name": "Harl", "role": "guard", "personality": "gruff", "appearance": "scarred"},
            "npc_updates": [{"name": "Harl", "change": -5, "reason": "suspicion"}],
            "hp_change": 0,
            "xp_gained": 0,
            "game_end": false
        })
        .to_string();

        let result = validate_turn(&raw);
        assert!(result.valid);
        assert!(result.errors.is_empty(), "{:?}", result.errors);

        let check = result.data.event.as_ref().and_then(Event::check).unwrap();
        assert_eq!(check.stat, Stat::Charisma);
        assert_eq!(check.difficulty, 14);
        assert_eq!(check.severity, Severity::Important);
        assert_eq!(check.fail_hint.as_deref(), Some("he calls for help"));
        assert_eq!(result.data.item_gained.as_deref(), Some("Gate Pass"));
        assert_eq!(result.data.new_npc.as_ref().map(|n| n.name.as_str()), Some("Harl"));
        assert_eq!(result.data.npc_updates[0].change, -5);
    }

    #[test]
    fn test_difficulty_clamped() {
        for (dc, expected) in [(0, 1), (-7, 1), (21, 20), (99, 20)] {
            let raw = json!({"story": "s", "event": {"type": "combat", "stat": "STR", "difficulty": dc}})
                .to_string();
            let result = validate_turn(&raw);
            let check = result.data.event.as_ref().and_then(Event::check).unwrap();
            assert_eq!(check.difficulty, expected);
            assert!(result.errors.iter().any(|e| e.contains("clamped")));
            assert!(result.valid);
        }
    }

    #[test]
    fn test_unknown_event_type_dropped() {
        let raw = json!({"story": "s", "event": {"type": "dance_off", "stat": "DEX"}}).to_string();
        let result = validate_turn(&raw);
        assert!(result.valid);
        assert_eq!(result.data.event, None);
        assert!(result.errors.iter().any(|e| e.contains("dance_off")));
        assert_eq!(result.data.story, "s");
    }

    #[test]
    fn test_unknown_stat_and_severity_fall_back() {
        let raw = json!({
            "story": "s",
            "event": {"type": "stat_check", "stat": "LUCK", "difficulty": 8, "severity": "deadly"}
        })
        .to_string();
        let result = validate_turn(&raw);
        let check = result.data.event.as_ref().and_then(Event::check).unwrap();
        assert_eq!(check.stat, Stat::Strength);
        assert_eq!(check.severity, Severity::Basic);
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_missing_story_uses_raw_text() {
        let raw = json!({"hp_change": -3}).to_string();
        let result = validate_turn(&raw);
        assert!(result.valid);
        assert_eq!(result.data.story, raw);
        assert_eq!(result.data.hp_change, -3);
    }

    #[test]
    fn test_numeric_defaults_and_coercion() {
        let raw = json!({"story": "s", "hp_change": "-4", "xp_gained": 2.9}).to_string();
        let result = validate_turn(&raw);
        assert_eq!(result.data.hp_change, -4);
        assert_eq!(result.data.xp_gained, 2);
        assert!(!result.data.game_end);

        let raw = json!({"story": "s", "hp_change": "lots", "game_end": "yes"}).to_string();
        let result = validate_turn(&raw);
        assert_eq!(result.data.hp_change, 0);
        assert!(!result.data.game_end);
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_bad_npc_updates_skipped() {
        let raw = json!({
            "story": "s",
            "npc_updates": [{"name": "Ada", "change": 5}, {"change": 3}, "oops", {"name": "Bo"}]
        })
        .to_string();
        let result = validate_turn(&raw);
        assert_eq!(result.data.npc_updates.len(), 1);
        assert_eq!(result.errors.len(), 3);
    }

    #[test]
    fn test_outcome_ignores_hp_and_xp() {
        let raw = json!({"story": "You slip.", "hp_change": -50, "xp_gained": 999, "item_lost": "Rope"})
            .to_string();
        let result = validate_outcome(&raw);
        assert!(result.valid);
        assert_eq!(result.data.story, "You slip.");
        assert_eq!(result.data.item_lost.as_deref(), Some("Rope"));
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_world_reports_missing_fields() {
        let raw = json!({"world_name": "Vael", "setting": "drowned city", "tone": 3}).to_string();
        let result = validate_world(&raw);
        assert!(result.valid);
        assert_eq!(result.data.world_name, "Vael");
        assert_eq!(result.data.tone, "");
        assert_eq!(result.errors.len(), 3);
    }

    #[test]
    fn test_story_end_declares_end() {
        let raw = json!({"story": "The curtain falls.", "event": {"type": "story_end"}}).to_string();
        let result = validate_turn(&raw);
        assert!(result.data.declares_end());
        assert!(!result.data.event.as_ref().unwrap().requires_roll());
    }

    #[test]
    fn test_event_serializes_to_wire_shape() {
        let event = Event::StatCheck(Check {
            stat: Stat::Dexterity,
            difficulty: 11,
            severity: Severity::Basic,
            success_hint: None,
            fail_hint: None,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"type": "stat_check", "stat": "DEX", "difficulty": 11, "severity": "basic"}));
        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}
