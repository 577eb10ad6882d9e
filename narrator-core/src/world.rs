//! Game state for a single narrated session.
//!
//! Holds the world descriptor, the player character, the NPCs met so far,
//! the inventory and the lifecycle status. The session orchestrator owns one
//! `GameState` and is the only thing that mutates it.

use crate::npc::NpcRegistry;
use crate::rules::Effect;
use crate::validate::StoryChanges;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// XP needed to reach level 2.
pub const STARTING_XP_TO_NEXT: u32 = 100;

/// Hit points a fresh character starts with.
pub const STARTING_MAX_HP: i32 = 100;

/// The five statistics an event can check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Stat {
    #[default]
    #[serde(rename = "STR")]
    Strength,
    #[serde(rename = "DEX")]
    Dexterity,
    #[serde(rename = "INT")]
    Intelligence,
    #[serde(rename = "CHA")]
    Charisma,
    #[serde(rename = "WIL")]
    Willpower,
}

impl Stat {
    pub const ALL: [Stat; 5] = [
        Stat::Strength,
        Stat::Dexterity,
        Stat::Intelligence,
        Stat::Charisma,
        Stat::Willpower,
    ];

    /// Three-letter code used on the wire.
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Stat::Strength => "STR",
            Stat::Dexterity => "DEX",
            Stat::Intelligence => "INT",
            Stat::Charisma => "CHA",
            Stat::Willpower => "WIL",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stat::Strength => "Strength",
            Stat::Dexterity => "Dexterity",
            Stat::Intelligence => "Intelligence",
            Stat::Charisma => "Charisma",
            Stat::Willpower => "Willpower",
        }
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

/// Error returned when a stat name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown stat '{0}'")]
pub struct UnknownStat(pub String);

impl FromStr for Stat {
    type Err = UnknownStat;

    /// Accepts the wire abbreviation or the full name, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        Stat::ALL
            .into_iter()
            .find(|stat| {
                normalized == stat.abbreviation() || normalized == stat.name().to_ascii_uppercase()
            })
            .ok_or_else(|| UnknownStat(s.to_string()))
    }
}

/// Stat values for a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Stats {
    #[serde(rename = "STR", default)]
    pub strength: i32,
    #[serde(rename = "DEX", default)]
    pub dexterity: i32,
    #[serde(rename = "INT", default)]
    pub intelligence: i32,
    #[serde(rename = "CHA", default)]
    pub charisma: i32,
    #[serde(rename = "WIL", default)]
    pub willpower: i32,
}

impl Stats {
    pub fn new(strength: i32, dexterity: i32, intelligence: i32, charisma: i32, willpower: i32) -> Self {
        Self {
            strength,
            dexterity,
            intelligence,
            charisma,
            willpower,
        }
    }

    pub fn get(&self, stat: Stat) -> i32 {
        match stat {
            Stat::Strength => self.strength,
            Stat::Dexterity => self.dexterity,
            Stat::Intelligence => self.intelligence,
            Stat::Charisma => self.charisma,
            Stat::Willpower => self.willpower,
        }
    }
}

/// A character trait granting a bonus to checks on one stat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SpecialAbility {
    pub name: String,
    pub stat: Stat,
    #[serde(default)]
    pub description: String,
}

impl SpecialAbility {
    pub fn new(name: impl Into<String>, stat: Stat, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stat,
            description: description.into(),
        }
    }

    /// An unnamed ability never applies.
    pub fn applies_to(&self, stat: Stat) -> bool {
        !self.name.trim().is_empty() && self.stat == stat
    }
}

/// The player character.
///
/// `0 <= hp <= max_hp` always holds, and `xp < xp_to_next` holds whenever
/// progression has settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    #[serde(default)]
    pub gender: String,
    pub level: u32,
    pub xp: u32,
    pub xp_to_next: u32,
    pub hp: i32,
    pub max_hp: i32,
    pub stats: Stats,
    #[serde(default)]
    pub special_ability: SpecialAbility,
}

impl Character {
    /// Create a level 1 character at full health.
    pub fn new(
        name: impl Into<String>,
        gender: impl Into<String>,
        stats: Stats,
        special_ability: SpecialAbility,
    ) -> Self {
        Self {
            name: name.into(),
            gender: gender.into(),
            level: 1,
            xp: 0,
            xp_to_next: STARTING_XP_TO_NEXT,
            hp: STARTING_MAX_HP,
            max_hp: STARTING_MAX_HP,
            stats,
            special_ability,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    /// Value added to a d20 draw for a check on `stat`, before any ability bonus.
    pub fn stat_value(&self, stat: Stat) -> i32 {
        self.stats.get(stat)
    }
}

/// A non-player character met during the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Npc {
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub appearance: String,
    /// Clamped to [-100, 100].
    #[serde(default)]
    pub relationship: i32,
}

impl Npc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: String::new(),
            personality: String::new(),
            appearance: String::new(),
            relationship: 0,
        }
    }

    /// Case-insensitive name comparison.
    pub fn is_named(&self, name: &str) -> bool {
        self.name.trim().to_lowercase() == name.trim().to_lowercase()
    }
}

/// Items carried by the player. Duplicates are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Inventory(Vec<String>);

impl Inventory {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn add(&mut self, item: impl Into<String>) {
        self.0.push(item.into());
    }

    /// Remove the first item named exactly `item`. Returns whether anything
    /// was removed.
    pub fn remove(&mut self, item: &str) -> bool {
        match self.0.iter().position(|i| i == item) {
            Some(index) => {
                self.0.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, item: &str) -> bool {
        self.0.iter().any(|i| i == item)
    }

    pub fn items(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for Inventory {
    fn from(items: Vec<String>) -> Self {
        Self(items)
    }
}

/// Descriptive fields of a generated world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WorldInfo {
    #[serde(default)]
    pub world_name: String,
    #[serde(default)]
    pub setting: String,
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub premise: String,
    #[serde(default)]
    pub starting_location: String,
}

impl WorldInfo {
    pub fn new(world_name: impl Into<String>, setting: impl Into<String>) -> Self {
        Self {
            world_name: world_name.into(),
            setting: setting.into(),
            ..Self::default()
        }
    }

    pub fn with_tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = tone.into();
        self
    }

    pub fn with_premise(mut self, premise: impl Into<String>) -> Self {
        self.premise = premise.into();
        self
    }

    pub fn with_starting_location(mut self, location: impl Into<String>) -> Self {
        self.starting_location = location.into();
        self
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Active,
    Completed,
    Failed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// The authoritative state of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub world: WorldInfo,
    pub character: Character,
    pub npcs: NpcRegistry,
    pub inventory: Inventory,
    pub turn_count: u32,
    pub last_saved_turn: u32,
    pub status: SessionStatus,
}

impl GameState {
    pub fn new(world: WorldInfo, character: Character) -> Self {
        Self {
            world,
            character,
            npcs: NpcRegistry::new(),
            inventory: Inventory::new(),
            turn_count: 0,
            last_saved_turn: 0,
            status: SessionStatus::Active,
        }
    }

    /// Apply item and NPC changes declared by a narration. These never
    /// depend on a check's outcome.
    pub fn apply_story_changes(&mut self, changes: StoryChanges<'_>, max_npcs: usize) -> Vec<Effect> {
        let mut effects = Vec::new();

        if let Some(item) = changes.item_gained {
            self.inventory.add(item);
            effects.push(Effect::ItemGained {
                item: item.to_string(),
            });
        }

        if let Some(item) = changes.item_lost {
            if self.inventory.remove(item) {
                effects.push(Effect::ItemLost {
                    item: item.to_string(),
                });
            } else {
                tracing::debug!(item = %item, "Lost item not in inventory, ignoring");
            }
        }

        if let Some(npc) = changes.new_npc {
            if self.npcs.upsert_new(npc, max_npcs) {
                effects.push(Effect::NpcMet {
                    name: npc.name.clone(),
                });
            }
        }

        effects.extend(self.npcs.apply_relationship_updates(changes.npc_updates));
        effects
    }
}
