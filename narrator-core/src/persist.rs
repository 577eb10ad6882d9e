//! Snapshots and save slots.
//!
//! A [`Snapshot`] is the only unit exchanged with a save store. It holds the
//! world, character, NPCs, inventory, the retained turn window, the story
//! summary and counters, plus any dice roll the session was waiting on.
//! [`SaveStore`] is the storage contract; [`JsonFileStore`] keeps one JSON
//! file per slot in a directory.

use crate::dm::{Turn, TurnHistory};
use crate::npc::NpcRegistry;
use crate::session::{Outcome, PendingCheck};
use crate::world::{Character, GameState, Inventory, SessionStatus, WorldInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Save slot not found: {0}")]
    SlotNotFound(SlotId),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Identifier of a save slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(Uuid);

impl SlotId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SlotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SlotId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// The serializable projection of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub world: WorldInfo,
    pub character: Character,
    pub npcs: NpcRegistry,
    pub inventory: Inventory,
    pub recent_turns: Vec<Turn>,
    #[serde(default)]
    pub story_summary: Option<String>,
    pub turn_count: u32,
    pub last_saved_turn: u32,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    /// Present when the session was saved while waiting for a roll.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_check: Option<PendingCheck>,
}

impl Snapshot {
    /// Deep-copy the live session into a snapshot.
    pub fn build(
        state: &GameState,
        history: &TurnHistory,
        outcome: Option<Outcome>,
        pending_check: Option<&PendingCheck>,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            world: state.world.clone(),
            character: state.character.clone(),
            npcs: state.npcs.clone(),
            inventory: state.inventory.clone(),
            recent_turns: history.turns().to_vec(),
            story_summary: history.story_summary.clone(),
            turn_count: state.turn_count,
            last_saved_turn: state.last_saved_turn,
            status: state.status,
            outcome,
            pending_check: pending_check.cloned(),
        }
    }

    /// Fail on snapshots written by a different format version.
    pub fn check_version(&self) -> Result<(), PersistError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: self.version,
            });
        }
        Ok(())
    }

    /// The game state this snapshot describes.
    pub fn game_state(&self) -> GameState {
        GameState {
            world: self.world.clone(),
            character: self.character.clone(),
            npcs: self.npcs.clone(),
            inventory: self.inventory.clone(),
            turn_count: self.turn_count,
            last_saved_turn: self.last_saved_turn,
            status: self.status,
        }
    }

    /// The retained turns and summary, trimmed to `window`.
    pub fn history(&self, window: usize) -> TurnHistory {
        TurnHistory::restore(self.recent_turns.clone(), self.story_summary.clone(), window)
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        let snapshot: Self = serde_json::from_str(json)?;
        snapshot.check_version()?;
        Ok(snapshot)
    }
}

/// What a slot listing shows without loading the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotMetadata {
    pub slot_id: SlotId,
    pub player_id: String,
    pub slot_number: u32,
    pub character_name: String,
    pub world_name: String,
    pub level: u32,
    pub turn_count: u32,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SlotMetadata {
    fn describe(
        slot_id: SlotId,
        player_id: &str,
        slot_number: u32,
        snapshot: &Snapshot,
        status: SessionStatus,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            slot_id,
            player_id: player_id.to_string(),
            slot_number,
            character_name: snapshot.character.name.clone(),
            world_name: snapshot.world.world_name.clone(),
            level: snapshot.character.level,
            turn_count: snapshot.turn_count,
            status,
            created_at,
            updated_at: snapshot.saved_at,
        }
    }

    /// Same slot, refreshed from a newer snapshot.
    pub fn updated(&self, snapshot: &Snapshot, status: SessionStatus) -> Self {
        Self::describe(
            self.slot_id,
            &self.player_id,
            self.slot_number,
            snapshot,
            status,
            self.created_at,
        )
    }

    /// Metadata for a brand-new slot.
    pub fn for_new_slot(player_id: &str, slot_number: u32, snapshot: &Snapshot) -> Self {
        Self::describe(
            SlotId::new(),
            player_id,
            slot_number,
            snapshot,
            snapshot.status,
            snapshot.saved_at,
        )
    }
}

/// Storage for session snapshots, keyed by slot.
#[async_trait]
pub trait SaveStore: Send + Sync {
    async fn create_slot(
        &self,
        player_id: &str,
        slot_number: u32,
        snapshot: &Snapshot,
    ) -> Result<SlotId, PersistError>;

    async fn update_slot(
        &self,
        slot_id: SlotId,
        snapshot: &Snapshot,
        status: SessionStatus,
    ) -> Result<(), PersistError>;

    /// Slots belonging to `player_id`, ordered by slot number.
    async fn list_slots(&self, player_id: &str) -> Result<Vec<SlotMetadata>, PersistError>;

    async fn delete_slot(&self, slot_id: SlotId) -> Result<(), PersistError>;

    async fn load_slot(&self, slot_id: SlotId) -> Result<Snapshot, PersistError>;
}

#[async_trait]
impl<T: SaveStore + ?Sized> SaveStore for Arc<T> {
    async fn create_slot(
        &self,
        player_id: &str,
        slot_number: u32,
        snapshot: &Snapshot,
    ) -> Result<SlotId, PersistError> {
        (**self).create_slot(player_id, slot_number, snapshot).await
    }

    async fn update_slot(
        &self,
        slot_id: SlotId,
        snapshot: &Snapshot,
        status: SessionStatus,
    ) -> Result<(), PersistError> {
        (**self).update_slot(slot_id, snapshot, status).await
    }

    async fn list_slots(&self, player_id: &str) -> Result<Vec<SlotMetadata>, PersistError> {
        (**self).list_slots(player_id).await
    }

    async fn delete_slot(&self, slot_id: SlotId) -> Result<(), PersistError> {
        (**self).delete_slot(slot_id).await
    }

    async fn load_slot(&self, slot_id: SlotId) -> Result<Snapshot, PersistError> {
        (**self).load_slot(slot_id).await
    }
}

/// On-disk layout of one slot file.
#[derive(Debug, Serialize, Deserialize)]
struct StoredSlot {
    version: u32,
    metadata: SlotMetadata,
    snapshot: Snapshot,
}

/// A [`SaveStore`] keeping `<slot id>.json` files in one directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn slot_path(&self, slot_id: SlotId) -> PathBuf {
        self.dir.join(format!("{slot_id}.json"))
    }

    async fn write_slot(&self, stored: &StoredSlot) -> Result<(), PersistError> {
        fs::create_dir_all(&self.dir).await?;
        let content = serde_json::to_string_pretty(stored)?;

        // Write then rename so a crash never leaves a half-written slot.
        let path = self.slot_path(stored.metadata.slot_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn read_slot(&self, slot_id: SlotId) -> Result<StoredSlot, PersistError> {
        let content = match fs::read_to_string(self.slot_path(slot_id)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PersistError::SlotNotFound(slot_id))
            }
            Err(e) => return Err(e.into()),
        };

        let stored: StoredSlot = serde_json::from_str(&content)?;
        if stored.version != SNAPSHOT_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: stored.version,
            });
        }
        Ok(stored)
    }

    /// Read only the metadata of a slot file.
    async fn peek_metadata(path: &Path) -> Result<SlotMetadata, PersistError> {
        let content = fs::read_to_string(path).await?;

        #[derive(Deserialize)]
        struct Partial {
            version: u32,
            metadata: SlotMetadata,
        }

        let partial: Partial = serde_json::from_str(&content)?;
        if partial.version != SNAPSHOT_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: partial.version,
            });
        }
        Ok(partial.metadata)
    }
}

#[async_trait]
impl SaveStore for JsonFileStore {
    async fn create_slot(
        &self,
        player_id: &str,
        slot_number: u32,
        snapshot: &Snapshot,
    ) -> Result<SlotId, PersistError> {
        let metadata = SlotMetadata::for_new_slot(player_id, slot_number, snapshot);
        let slot_id = metadata.slot_id;
        self.write_slot(&StoredSlot {
            version: SNAPSHOT_VERSION,
            metadata,
            snapshot: snapshot.clone(),
        })
        .await?;

        tracing::info!(%slot_id, player_id, slot_number, "Created save slot");
        Ok(slot_id)
    }

    async fn update_slot(
        &self,
        slot_id: SlotId,
        snapshot: &Snapshot,
        status: SessionStatus,
    ) -> Result<(), PersistError> {
        let existing = self.read_slot(slot_id).await?;
        self.write_slot(&StoredSlot {
            version: SNAPSHOT_VERSION,
            metadata: existing.metadata.updated(snapshot, status),
            snapshot: snapshot.clone(),
        })
        .await?;

        tracing::debug!(%slot_id, turn = snapshot.turn_count, %status, "Updated save slot");
        Ok(())
    }

    async fn list_slots(&self, player_id: &str) -> Result<Vec<SlotMetadata>, PersistError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut slots = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                match Self::peek_metadata(&path).await {
                    Ok(metadata) if metadata.player_id == player_id => slots.push(metadata),
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable save slot");
                    }
                }
            }
        }

        slots.sort_by(|a, b| {
            a.slot_number
                .cmp(&b.slot_number)
                .then(b.updated_at.cmp(&a.updated_at))
        });
        Ok(slots)
    }

    async fn delete_slot(&self, slot_id: SlotId) -> Result<(), PersistError> {
        match fs::remove_file(self.slot_path(slot_id)).await {
            Ok(()) => {
                tracing::info!(%slot_id, "Deleted save slot");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PersistError::SlotNotFound(slot_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn load_slot(&self, slot_id: SlotId) -> Result<Snapshot, PersistError> {
        let stored = self.read_slot(slot_id).await?;
        stored.snapshot.check_version()?;
        Ok(stored.snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_character, sample_world};
    use tempfile::tempdir;

    fn snapshot() -> Snapshot {
        let state = GameState::new(sample_world(), sample_character());
        Snapshot::build(&state, &TurnHistory::default(), None, None)
    }

    #[test]
    fn test_snapshot_version_checked() {
        let mut snap = snapshot();
        snap.version = 99;
        let json = serde_json::to_string(&snap).unwrap();
        assert!(matches!(
            Snapshot::from_json(&json),
            Err(PersistError::VersionMismatch { expected: 1, found: 99 })
        ));
    }

    #[test]
    fn test_snapshot_json_round_trip() {
        let mut snap = snapshot();
        snap.story_summary = Some("The bell was found.".into());
        let back = Snapshot::from_json(&snap.to_json().unwrap()).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn test_slot_id_parse() {
        let id = SlotId::new();
        assert_eq!(id.to_string().parse::<SlotId>().unwrap(), id);
        assert!("not-a-uuid".parse::<SlotId>().is_err());
    }

    #[tokio::test]
    async fn test_file_store_lifecycle() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("saves"));
        let mut snap = snapshot();

        let slot = store.create_slot("player-1", 1, &snap).await.unwrap();
        assert!(dir.path().join("saves").join(format!("{slot}.json")).exists());

        snap.turn_count = 4;
        snap.status = SessionStatus::Completed;
        store.update_slot(slot, &snap, SessionStatus::Completed).await.unwrap();

        let slots = store.list_slots("player-1").await.unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].turn_count, 4);
        assert_eq!(slots[0].status, SessionStatus::Completed);
        assert_eq!(slots[0].character_name, "Mira");

        let loaded = store.load_slot(slot).await.unwrap();
        assert_eq!(loaded.turn_count, 4);

        store.delete_slot(slot).await.unwrap();
        assert!(matches!(store.load_slot(slot).await, Err(PersistError::SlotNotFound(_))));
        assert!(matches!(store.delete_slot(slot).await, Err(PersistError::SlotNotFound(_))));
    }

    #[tokio::test]
    async fn test_list_slots_filters_by_player() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let snap = snapshot();

        store.create_slot("alice", 2, &snap).await.unwrap();
        store.create_slot("alice", 1, &snap).await.unwrap();
        store.create_slot("bob", 1, &snap).await.unwrap();

        let slots = store.list_slots("alice").await.unwrap();
        assert_eq!(slots.iter().map(|s| s.slot_number).collect::<Vec<_>>(), [1, 2]);
        assert!(store.list_slots("carol").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_slots_missing_dir() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("never-created"));
        assert!(store.list_slots("anyone").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_slot() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let result = store
            .update_slot(SlotId::new(), &snapshot(), SessionStatus::Active)
            .await;
        assert!(matches!(result, Err(PersistError::SlotNotFound(_))));
    }
}
