//! Entity persistence behind a minimal load/save/remove interface.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy_primitives::Address;
use mines_proto::{player_entity_id, GameKey};
use serde::{Deserialize, Serialize};

use super::error::IndexerError;
use super::game::Game;
use super::journal::AppliedEventRecord;
use super::player::PlayerRecord;
use super::stats::PlatformStats;
use super::types::PLATFORM_STATS_ID;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Game,
    Player,
    PlatformStats,
    AppliedEvent,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Game => "game",
            EntityKind::Player => "player",
            EntityKind::PlatformStats => "platform_stats",
            EntityKind::AppliedEvent => "applied_event",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum Entity {
    Game(Game),
    Player(PlayerRecord),
    PlatformStats(PlatformStats),
    AppliedEvent(AppliedEventRecord),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Game(_) => EntityKind::Game,
            Entity::Player(_) => EntityKind::Player,
            Entity::PlatformStats(_) => EntityKind::PlatformStats,
            Entity::AppliedEvent(_) => EntityKind::AppliedEvent,
        }
    }

    pub fn id(&self) -> String {
        match self {
            Entity::Game(game) => game.entity_id(),
            Entity::Player(player) => player.entity_id(),
            Entity::PlatformStats(stats) => stats.entity_id().to_string(),
            Entity::AppliedEvent(record) => record.entity_id().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Save(Entity),
    /// Only reorg undo removes entities.
    Remove { kind: EntityKind, id: String },
}

impl WriteOp {
    pub fn target(&self) -> (EntityKind, String) {
        match self {
            WriteOp::Save(entity) => (entity.kind(), entity.id()),
            WriteOp::Remove { kind, id } => (*kind, id.clone()),
        }
    }
}

/// Writes that must land together for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&mut self, entity: Entity) -> &mut Self {
        self.ops.push(WriteOp::Save(entity));
        self
    }

    pub fn remove(&mut self, kind: EntityKind, id: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Remove {
            kind,
            id: id.into(),
        });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

pub trait EntityStore {
    fn load(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>, IndexerError>;
    fn save(&self, entity: &Entity) -> Result<(), IndexerError>;
    fn remove(&self, kind: EntityKind, id: &str) -> Result<(), IndexerError>;
    fn ids(&self, kind: EntityKind) -> Result<Vec<String>, IndexerError>;

    /// Applies the batch in order. On failure, already written ops are rolled
    /// back to their prior values before the error is returned.
    fn commit(&self, batch: WriteBatch) -> Result<(), IndexerError> {
        let mut undo: Vec<(EntityKind, String, Option<Entity>)> = Vec::with_capacity(batch.len());
        for op in batch.ops {
            let (kind, id) = op.target();
            let prior = match self.load(kind, &id) {
                Ok(prior) => prior,
                Err(err) => {
                    rollback(self, undo);
                    return Err(err);
                }
            };
            let written = match &op {
                WriteOp::Save(entity) => self.save(entity),
                WriteOp::Remove { kind, id } => self.remove(*kind, id),
            };
            if let Err(err) = written {
                rollback(self, undo);
                return Err(err);
            }
            undo.push((kind, id, prior));
        }
        Ok(())
    }

    fn load_game(&self, key: &GameKey) -> Result<Option<Game>, IndexerError> {
        match self.load(EntityKind::Game, &key.entity_id())? {
            Some(Entity::Game(game)) => Ok(Some(game)),
            Some(other) => Err(kind_mismatch(&other, EntityKind::Game)),
            None => Ok(None),
        }
    }

    fn load_player(&self, player: &Address) -> Result<Option<PlayerRecord>, IndexerError> {
        match self.load(EntityKind::Player, &player_entity_id(player))? {
            Some(Entity::Player(record)) => Ok(Some(record)),
            Some(other) => Err(kind_mismatch(&other, EntityKind::Player)),
            None => Ok(None),
        }
    }

    fn load_platform_stats(&self) -> Result<Option<PlatformStats>, IndexerError> {
        match self.load(EntityKind::PlatformStats, PLATFORM_STATS_ID)? {
            Some(Entity::PlatformStats(stats)) => Ok(Some(stats)),
            Some(other) => Err(kind_mismatch(&other, EntityKind::PlatformStats)),
            None => Ok(None),
        }
    }

    fn load_applied_event(
        &self,
        event_id: &str,
    ) -> Result<Option<AppliedEventRecord>, IndexerError> {
        match self.load(EntityKind::AppliedEvent, event_id)? {
            Some(Entity::AppliedEvent(record)) => Ok(Some(record)),
            Some(other) => Err(kind_mismatch(&other, EntityKind::AppliedEvent)),
            None => Ok(None),
        }
    }
}

impl<S: EntityStore + ?Sized> EntityStore for Arc<S> {
    fn load(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>, IndexerError> {
        (**self).load(kind, id)
    }

    fn save(&self, entity: &Entity) -> Result<(), IndexerError> {
        (**self).save(entity)
    }

    fn remove(&self, kind: EntityKind, id: &str) -> Result<(), IndexerError> {
        (**self).remove(kind, id)
    }

    fn ids(&self, kind: EntityKind) -> Result<Vec<String>, IndexerError> {
        (**self).ids(kind)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), IndexerError> {
        (**self).commit(batch)
    }
}

fn rollback<S: EntityStore + ?Sized>(store: &S, undo: Vec<(EntityKind, String, Option<Entity>)>) {
    for (kind, id, prior) in undo.into_iter().rev() {
        let restored = match prior {
            Some(entity) => store.save(&entity),
            None => store.remove(kind, &id),
        };
        if let Err(err) = restored {
            tracing::error!(kind = kind.as_str(), %id, error = %err, "batch rollback failed");
        }
    }
}

fn kind_mismatch(found: &Entity, expected: EntityKind) -> IndexerError {
    IndexerError::EntityKindMismatch {
        id: found.id(),
        expected: expected.as_str().to_string(),
        found: found.kind().as_str().to_string(),
    }
}

fn validate_entity_id(id: &str) -> Result<(), IndexerError> {
    if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(IndexerError::EntityIdInvalid { id: id.to_string() });
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryEntityStore {
    entities: Arc<Mutex<BTreeMap<(EntityKind, String), Entity>>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, IndexerError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, IndexerError> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<(EntityKind, String), Entity>>, IndexerError> {
        self.entities.lock().map_err(|_| IndexerError::LockPoisoned {
            what: "in-memory entity store".to_string(),
        })
    }
}

impl EntityStore for InMemoryEntityStore {
    fn load(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>, IndexerError> {
        Ok(self.lock()?.get(&(kind, id.to_string())).cloned())
    }

    fn save(&self, entity: &Entity) -> Result<(), IndexerError> {
        let id = entity.id();
        validate_entity_id(&id)?;
        self.lock()?.insert((entity.kind(), id), entity.clone());
        Ok(())
    }

    fn remove(&self, kind: EntityKind, id: &str) -> Result<(), IndexerError> {
        self.lock()?.remove(&(kind, id.to_string()));
        Ok(())
    }

    fn ids(&self, kind: EntityKind) -> Result<Vec<String>, IndexerError> {
        Ok(self
            .lock()?
            .keys()
            .filter(|(entry_kind, _)| *entry_kind == kind)
            .map(|(_, id)| id.clone())
            .collect())
    }

    /// Validates every op up front, then applies them under one lock.
    fn commit(&self, batch: WriteBatch) -> Result<(), IndexerError> {
        for op in batch.ops() {
            validate_entity_id(&op.target().1)?;
        }
        let mut guard = self.lock()?;
        for op in batch.ops {
            match op {
                WriteOp::Save(entity) => {
                    guard.insert((entity.kind(), entity.id()), entity);
                }
                WriteOp::Remove { kind, id } => {
                    guard.remove(&(kind, id));
                }
            }
        }
        Ok(())
    }
}

/// One JSON file per entity under `<root>/<kind>/<id>.json`.
#[derive(Debug, Clone)]
pub struct FileEntityStore {
    root: PathBuf,
}

impl FileEntityStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir(&self, kind: EntityKind) -> PathBuf {
        self.root.join(kind.as_str())
    }

    fn entity_path(&self, kind: EntityKind, id: &str) -> Result<PathBuf, IndexerError> {
        validate_entity_id(id)?;
        Ok(self.kind_dir(kind).join(format!("{id}.json")))
    }
}

impl EntityStore for FileEntityStore {
    fn load(&self, kind: EntityKind, id: &str) -> Result<Option<Entity>, IndexerError> {
        let path = self.entity_path(kind, id)?;
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let entity: Entity =
            serde_json::from_slice(&bytes).map_err(|err| IndexerError::CorruptEntity {
                kind: kind.as_str().to_string(),
                id: id.to_string(),
                reason: err.to_string(),
            })?;
        if entity.kind() != kind {
            return Err(kind_mismatch(&entity, kind));
        }
        Ok(Some(entity))
    }

    fn save(&self, entity: &Entity) -> Result<(), IndexerError> {
        let path = self.entity_path(entity.kind(), &entity.id())?;
        fs::create_dir_all(self.kind_dir(entity.kind()))?;
        let bytes = serde_json::to_vec_pretty(entity)?;
        write_bytes_atomic(&path, &bytes)
    }

    fn remove(&self, kind: EntityKind, id: &str) -> Result<(), IndexerError> {
        let path = self.entity_path(kind, id)?;
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    /// Sorted ids of every `<id>.json` under the kind directory.
    fn ids(&self, kind: EntityKind) -> Result<Vec<String>, IndexerError> {
        let dir = self.kind_dir(kind);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if let Some(id) = file_name.strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<(), IndexerError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(tmp, path)?;
    Ok(())
}
