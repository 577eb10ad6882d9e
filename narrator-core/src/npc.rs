//! NPC registry with case-insensitive dedup and relationship clamping.

use crate::rules::Effect;
use crate::validate::{NpcData, NpcUpdate};
use crate::world::Npc;
use serde::{Deserialize, Serialize};

/// Default cap on NPCs tracked per session.
pub const DEFAULT_MAX_NPCS: usize = 10;

/// Lower bound of an NPC relationship.
pub const MIN_RELATIONSHIP: i32 = -100;

/// Upper bound of an NPC relationship.
pub const MAX_RELATIONSHIP: i32 = 100;

/// The NPCs known to a session, in the order they were met.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct NpcRegistry(Vec<Npc>);

impl NpcRegistry {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert a newly introduced NPC.
    ///
    /// Dropped when the registry already holds `max` NPCs or when an NPC of
    /// the same name (case-insensitive) exists; the first one seen wins.
    /// Returns whether the NPC was inserted.
    pub fn upsert_new(&mut self, data: &NpcData, max: usize) -> bool {
        if self.0.len() >= max {
            tracing::debug!(npc = %data.name, max, "NPC registry full, dropping new NPC");
            return false;
        }

        if self.find(&data.name).is_some() {
            tracing::debug!(npc = %data.name, "NPC already known, keeping first-seen entry");
            return false;
        }

        self.0.push(Npc {
            name: data.name.clone(),
            role: data.role.clone(),
            personality: data.personality.clone(),
            appearance: data.appearance.clone(),
            relationship: data
                .relationship
                .unwrap_or(0)
                .clamp(MIN_RELATIONSHIP, MAX_RELATIONSHIP),
        });
        true
    }

    /// Shift relationships of known NPCs. Unknown names are ignored.
    pub fn apply_relationship_updates(&mut self, updates: &[NpcUpdate]) -> Vec<Effect> {
        let mut effects = Vec::new();

        for update in updates {
            let Some(npc) = self.find_mut(&update.name) else {
                tracing::debug!(npc = %update.name, "Relationship update for unknown NPC ignored");
                continue;
            };

            npc.relationship =
                (npc.relationship.saturating_add(update.change)).clamp(MIN_RELATIONSHIP, MAX_RELATIONSHIP);

            effects.push(Effect::RelationshipChanged {
                name: npc.name.clone(),
                change: update.change,
                relationship: npc.relationship,
            });
        }

        effects
    }

    pub fn find(&self, name: &str) -> Option<&Npc> {
        self.0.iter().find(|npc| npc.is_named(name))
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Npc> {
        self.0.iter_mut().find(|npc| npc.is_named(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Npc> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Npc] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Npc>> for NpcRegistry {
    fn from(npcs: Vec<Npc>) -> Self {
        Self(npcs)
    }
}
