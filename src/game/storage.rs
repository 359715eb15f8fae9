//! Member ledger gateway.
//!
//! Every write to a player document goes through [`MemberStore`] as one typed
//! [`MemberUpdate`]. The sled implementation applies an update with a compare-and-swap loop
//! (`Tree::fetch_and_update`), so counters bumped by interleaved handlers never lose an
//! increment and guards are always evaluated against the document actually being replaced.
//! After a write commits, every registered [`InvalidationHook`] is called with the player id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, trace};
use sled::IVec;
use uuid::Uuid;

use super::errors::GameError;
use super::types::{
    Cadence, Creature, Field, PlayerId, PlayerRecord, QuestRecord, CREATURE_SCHEMA_VERSION,
    PLAYER_SCHEMA_VERSION,
};

const TREE_MEMBERS: &str = "members";
const TREE_CREATURES: &str = "creatures";
const TREE_COUNTERS: &str = "counters";

// ============================================================================
// Typed deltas
// ============================================================================

/// Non-numeric fields an update may overwrite.
#[derive(Debug, Clone, PartialEq)]
pub enum SetField {
    Username(String),
    QuestsNotify(bool),
    ShinyHunt(u32),
    ShinyCharmExpires(DateTime<Utc>),
    Counter(Field, i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsetField {
    ShinyHunt,
    ShinyCharm,
}

/// Precondition evaluated against the current document before anything is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Guard {
    /// Quest exists and is not completed.
    QuestIncomplete(Uuid),
    /// Quest exists, is not completed, and has reached its target.
    QuestReady(Uuid),
    /// Every record of the cadence has expired (or there are none).
    QuestSetExpired { cadence: Cadence, now: DateTime<Utc> },
    AtLeast(Field, i64),
    Equals(Field, i64),
    BadgeAbsent(String),
}

impl Guard {
    fn holds(&self, record: &PlayerRecord) -> bool {
        match self {
            Guard::QuestIncomplete(id) => record
                .quests
                .iter()
                .any(|q| q.id == *id && !q.completed),
            Guard::QuestReady(id) => record.quests.iter().any(|q| q.id == *id && q.is_ready()),
            Guard::QuestSetExpired { cadence, now } => record.quest_set_expired(*cadence, *now),
            Guard::AtLeast(field, min) => record.counter(*field) >= *min,
            Guard::Equals(field, value) => record.counter(*field) == *value,
            Guard::BadgeAbsent(badge) => !record.badges.contains(badge),
        }
    }
}

/// A single atomic mutation of one player document.
///
/// Operations are applied in a fixed order: sets, unsets, increments, quest replacements,
/// quest progress, quest completions, badges. Guards are checked first; if any fails the
/// document is left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberUpdate {
    guards: Vec<Guard>,
    sets: Vec<SetField>,
    unsets: Vec<UnsetField>,
    increments: Vec<(Field, i64)>,
    replacements: Vec<(Cadence, Vec<QuestRecord>)>,
    progress: Vec<(Uuid, u32)>,
    completions: Vec<Uuid>,
    badges: Vec<String>,
}

impl MemberUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(mut self, field: Field, by: i64) -> Self {
        if by != 0 {
            self.increments.push((field, by));
        }
        self
    }

    pub fn set(mut self, value: SetField) -> Self {
        self.sets.push(value);
        self
    }

    pub fn unset(mut self, field: UnsetField) -> Self {
        self.unsets.push(field);
        self
    }

    /// Add `by` to a quest's progress, clamped to its target. Completed records are skipped.
    pub fn quest_progress(mut self, quest: Uuid, by: u32) -> Self {
        self.progress.push((quest, by));
        self
    }

    pub fn complete_quest(mut self, quest: Uuid) -> Self {
        self.completions.push(quest);
        self
    }

    /// Drop every record of `cadence` and append `records` in their place.
    pub fn replace_quests(mut self, cadence: Cadence, records: Vec<QuestRecord>) -> Self {
        self.replacements.push((cadence, records));
        self
    }

    pub fn add_badge(mut self, badge: impl Into<String>) -> Self {
        self.badges.push(badge.into());
        self
    }

    pub fn guard(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    /// Fold another update into this one. Guards of both must hold.
    pub fn merge(mut self, other: MemberUpdate) -> Self {
        self.guards.extend(other.guards);
        self.sets.extend(other.sets);
        self.unsets.extend(other.unsets);
        self.increments.extend(other.increments);
        self.replacements.extend(other.replacements);
        self.progress.extend(other.progress);
        self.completions.extend(other.completions);
        self.badges.extend(other.badges);
        self
    }

    /// Undo for a committed counter-only update: every increment negated, no guards.
    /// `None` when the update touches anything besides counters.
    pub fn inverse(&self) -> Option<MemberUpdate> {
        let counters_only = self.sets.is_empty()
            && self.unsets.is_empty()
            && self.replacements.is_empty()
            && self.progress.is_empty()
            && self.completions.is_empty()
            && self.badges.is_empty();
        if !counters_only {
            return None;
        }
        Some(MemberUpdate {
            increments: self
                .increments
                .iter()
                .map(|(field, by)| (*field, by.saturating_neg()))
                .collect(),
            ..MemberUpdate::default()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
            && self.unsets.is_empty()
            && self.increments.is_empty()
            && self.replacements.is_empty()
            && self.progress.is_empty()
            && self.completions.is_empty()
            && self.badges.is_empty()
    }

    /// Apply to `record` in place. Returns whether the document changed.
    pub fn apply(&self, record: &mut PlayerRecord) -> bool {
        if !self.guards.iter().all(|g| g.holds(record)) {
            return false;
        }
        let before = record.clone();

        for set in &self.sets {
            match set {
                SetField::Username(name) => record.username = name.clone(),
                SetField::QuestsNotify(on) => record.quests_notify = *on,
                SetField::ShinyHunt(dex) => {
                    if record.shiny_hunt != Some(*dex) {
                        record.shiny_streak = 0;
                    }
                    record.shiny_hunt = Some(*dex);
                }
                SetField::ShinyCharmExpires(at) => record.shiny_charm_expires = Some(*at),
                SetField::Counter(field, value) => *record.counter_mut(*field) = *value,
            }
        }
        for unset in &self.unsets {
            match unset {
                UnsetField::ShinyHunt => {
                    record.shiny_hunt = None;
                    record.shiny_streak = 0;
                }
                UnsetField::ShinyCharm => record.shiny_charm_expires = None,
            }
        }
        for (field, by) in &self.increments {
            let slot = record.counter_mut(*field);
            *slot = slot.saturating_add(*by);
        }
        for (cadence, records) in &self.replacements {
            record.quests.retain(|q| q.cadence != *cadence);
            record.quests.extend(records.iter().cloned());
        }
        for (id, by) in &self.progress {
            if let Some(quest) = record.quests.iter_mut().find(|q| q.id == *id) {
                if !quest.completed {
                    quest.progress = quest.progress.saturating_add(*by).min(quest.count);
                }
            }
        }
        for id in &self.completions {
            if let Some(quest) = record.quests.iter_mut().find(|q| q.id == *id) {
                quest.completed = true;
            }
        }
        for badge in &self.badges {
            record.badges.insert(badge.clone());
        }

        if *record == before {
            return false;
        }
        record.touch();
        true
    }
}

/// Pre- and post-image of a `find_and_update`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub before: PlayerRecord,
    pub after: PlayerRecord,
    pub modified: bool,
}

// ============================================================================
// Store interface
// ============================================================================

#[async_trait]
pub trait MemberStore: Send + Sync {
    async fn get(&self, id: PlayerId) -> Result<Option<PlayerRecord>, GameError>;

    /// Create the player if absent. Returns the stored document either way.
    async fn create(&self, id: PlayerId, username: &str) -> Result<PlayerRecord, GameError>;

    /// Atomically apply `update`. `None` when the player does not exist.
    async fn find_and_update(
        &self,
        id: PlayerId,
        update: &MemberUpdate,
    ) -> Result<Option<UpdateOutcome>, GameError>;

    async fn insert_creatures(&self, creatures: &[Creature]) -> Result<(), GameError>;

    async fn creatures_of(&self, owner: PlayerId) -> Result<Vec<Creature>, GameError>;

    async fn list_ids(&self) -> Result<Vec<PlayerId>, GameError>;

    /// Bump a global named counter, returning the new value.
    async fn increment_counter(&self, name: &str, by: i64) -> Result<i64, GameError>;

    async fn counter(&self, name: &str) -> Result<i64, GameError>;

    /// Number of documents modified (0 or 1).
    async fn update(&self, id: PlayerId, update: &MemberUpdate) -> Result<u64, GameError> {
        Ok(self
            .find_and_update(id, update)
            .await?
            .map_or(0, |outcome| outcome.modified as u64))
    }

    async fn require(&self, id: PlayerId) -> Result<PlayerRecord, GameError> {
        self.get(id)
            .await?
            .ok_or_else(|| GameError::NotFound(format!("player {}", id)))
    }

    /// Reserve `reserve` creature indices for `id` and return the first one.
    /// The bump persists whether or not the caller ends up using the indices.
    async fn next_index(&self, id: PlayerId, reserve: u32) -> Result<i64, GameError> {
        if reserve == 0 {
            return Err(GameError::InvalidInput(
                "must reserve at least one index".to_string(),
            ));
        }
        let update = MemberUpdate::new().increment(Field::NextIdx, reserve as i64);
        match self.find_and_update(id, &update).await? {
            Some(outcome) => Ok(outcome.before.next_idx),
            None => Err(GameError::NotFound(format!("player {}", id))),
        }
    }
}

/// Called synchronously after every committed write.
pub trait InvalidationHook: Send + Sync {
    fn invalidate(&self, id: PlayerId);
}

// ============================================================================
// Read-through cache
// ============================================================================

/// Read-through cache of player documents.
///
/// A read that raced with a write must not re-populate the entry with the stale image, so
/// fills carry the generation observed before the store read and are dropped if any
/// invalidation happened since.
#[derive(Debug, Default)]
pub struct MemberCache {
    entries: Mutex<HashMap<PlayerId, PlayerRecord>>,
    generation: AtomicU64,
}

impl MemberCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn lookup(&self, id: PlayerId) -> Option<PlayerRecord> {
        self.entries.lock().ok()?.get(&id).cloned()
    }

    pub fn fill(&self, record: &PlayerRecord, observed_generation: u64) {
        if let Ok(mut entries) = self.entries.lock() {
            if self.generation.load(Ordering::SeqCst) == observed_generation {
                entries.insert(record.id, record.clone());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InvalidationHook for MemberCache {
    fn invalidate(&self, id: PlayerId) {
        if let Ok(mut entries) = self.entries.lock() {
            self.generation.fetch_add(1, Ordering::SeqCst);
            entries.remove(&id);
        }
    }
}

// ============================================================================
// Sled implementation
// ============================================================================

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct SledMemberStoreBuilder {
    path: PathBuf,
    cache: bool,
    hooks: Vec<Arc<dyn InvalidationHook>>,
}

impl SledMemberStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: true,
            hooks: Vec::new(),
        }
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn InvalidationHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn open(self) -> Result<SledMemberStore, GameError> {
        let cache = self.cache.then(|| Arc::new(MemberCache::new()));
        let mut hooks = self.hooks;
        if let Some(ref cache) = cache {
            hooks.push(cache.clone());
        }
        SledMemberStore::open_with(self.path, cache, hooks)
    }
}

pub struct SledMemberStore {
    _db: sled::Db,
    members: sled::Tree,
    creatures: sled::Tree,
    counters: sled::Tree,
    cache: Option<Arc<MemberCache>>,
    hooks: Vec<Arc<dyn InvalidationHook>>,
}

impl SledMemberStore {
    /// Open (or create) the store rooted at `path` with the read-through cache enabled.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GameError> {
        SledMemberStoreBuilder::new(path.as_ref()).open()
    }

    fn open_with<P: AsRef<Path>>(
        path: P,
        cache: Option<Arc<MemberCache>>,
        hooks: Vec<Arc<dyn InvalidationHook>>,
    ) -> Result<Self, GameError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let members = db.open_tree(TREE_MEMBERS)?;
        let creatures = db.open_tree(TREE_CREATURES)?;
        let counters = db.open_tree(TREE_COUNTERS)?;
        debug!(
            "opened member store at {} (cache {})",
            path_ref.display(),
            if cache.is_some() { "on" } else { "off" }
        );
        Ok(Self {
            _db: db,
            members,
            creatures,
            counters,
            cache,
            hooks,
        })
    }

    pub fn cache(&self) -> Option<&Arc<MemberCache>> {
        self.cache.as_ref()
    }

    fn member_key(id: PlayerId) -> [u8; 8] {
        id.to_be_bytes()
    }

    fn creature_prefix(owner: PlayerId) -> String {
        format!("{:020}:", owner)
    }

    fn creature_key(owner: PlayerId, idx: i64) -> Vec<u8> {
        format!("{}{:020}", Self::creature_prefix(owner), idx).into_bytes()
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, GameError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, GameError> {
        Ok(bincode::deserialize::<T>(bytes)?)
    }

    fn decode_member(bytes: &[u8]) -> Result<PlayerRecord, GameError> {
        let record: PlayerRecord = Self::deserialize(bytes)?;
        if record.schema_version != PLAYER_SCHEMA_VERSION {
            return Err(GameError::SchemaMismatch {
                entity: "player",
                expected: PLAYER_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    fn notify_write(&self, id: PlayerId) {
        for hook in &self.hooks {
            hook.invalidate(id);
        }
    }

    fn read_member(&self, id: PlayerId) -> Result<Option<PlayerRecord>, GameError> {
        match self.members.get(Self::member_key(id))? {
            Some(bytes) => Ok(Some(Self::decode_member(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl MemberStore for SledMemberStore {
    async fn get(&self, id: PlayerId) -> Result<Option<PlayerRecord>, GameError> {
        let Some(ref cache) = self.cache else {
            return self.read_member(id);
        };
        if let Some(hit) = cache.lookup(id) {
            trace!("member cache hit for {}", id);
            return Ok(Some(hit));
        }
        let generation = cache.generation();
        let record = self.read_member(id)?;
        if let Some(ref record) = record {
            cache.fill(record, generation);
        }
        Ok(record)
    }

    async fn create(&self, id: PlayerId, username: &str) -> Result<PlayerRecord, GameError> {
        let record = PlayerRecord::new(id, username);
        let bytes = Self::serialize(&record)?;
        let key = Self::member_key(id);
        match self
            .members
            .compare_and_swap(key, None as Option<&[u8]>, Some(bytes))?
        {
            Ok(()) => {
                self.members.flush()?;
                self.notify_write(id);
                debug!("created player {}", id);
                Ok(record)
            }
            Err(existing) => match existing.current {
                Some(bytes) => Self::decode_member(&bytes),
                None => Err(GameError::Internal(format!(
                    "player {} vanished during create",
                    id
                ))),
            },
        }
    }

    async fn find_and_update(
        &self,
        id: PlayerId,
        update: &MemberUpdate,
    ) -> Result<Option<UpdateOutcome>, GameError> {
        let key = Self::member_key(id);
        let mut outcome: Option<UpdateOutcome> = None;
        let mut failure: Option<GameError> = None;

        // The closure may run several times under contention; only the last run counts.
        self.members.fetch_and_update(key, |current| {
            outcome = None;
            failure = None;
            let bytes = current?;
            let mut record = match Self::decode_member(bytes) {
                Ok(record) => record,
                Err(e) => {
                    failure = Some(e);
                    return Some(IVec::from(bytes));
                }
            };
            let before = record.clone();
            if !update.apply(&mut record) {
                outcome = Some(UpdateOutcome {
                    after: before.clone(),
                    before,
                    modified: false,
                });
                return Some(IVec::from(bytes));
            }
            match Self::serialize(&record) {
                Ok(encoded) => {
                    outcome = Some(UpdateOutcome {
                        before,
                        after: record,
                        modified: true,
                    });
                    Some(IVec::from(encoded))
                }
                Err(e) => {
                    failure = Some(e);
                    Some(IVec::from(bytes))
                }
            }
        })?;

        if let Some(e) = failure {
            return Err(e);
        }
        if let Some(ref done) = outcome {
            if done.modified {
                self.members.flush()?;
                self.notify_write(id);
            }
        }
        Ok(outcome)
    }

    async fn insert_creatures(&self, creatures: &[Creature]) -> Result<(), GameError> {
        if creatures.is_empty() {
            return Ok(());
        }
        let mut batch = sled::Batch::default();
        for creature in creatures {
            let mut stored = creature.clone();
            stored.schema_version = CREATURE_SCHEMA_VERSION;
            batch.insert(
                Self::creature_key(stored.owner_id, stored.idx),
                Self::serialize(&stored)?,
            );
        }
        self.creatures.apply_batch(batch)?;
        self.creatures.flush()?;
        debug!("inserted {} creature(s)", creatures.len());
        Ok(())
    }

    async fn creatures_of(&self, owner: PlayerId) -> Result<Vec<Creature>, GameError> {
        let mut out = Vec::new();
        for entry in self.creatures.scan_prefix(Self::creature_prefix(owner).as_bytes()) {
            let (_, bytes) = entry?;
            let creature: Creature = Self::deserialize(&bytes)?;
            if creature.schema_version != CREATURE_SCHEMA_VERSION {
                return Err(GameError::SchemaMismatch {
                    entity: "creature",
                    expected: CREATURE_SCHEMA_VERSION,
                    found: creature.schema_version,
                });
            }
            out.push(creature);
        }
        Ok(out)
    }

    async fn list_ids(&self) -> Result<Vec<PlayerId>, GameError> {
        let mut ids = Vec::new();
        for key in self.members.iter().keys() {
            let key = key?;
            let raw: [u8; 8] = key.as_ref().try_into().map_err(|_| {
                GameError::Internal(format!("malformed member key of {} bytes", key.len()))
            })?;
            ids.push(PlayerId::from_be_bytes(raw));
        }
        Ok(ids)
    }

    async fn increment_counter(&self, name: &str, by: i64) -> Result<i64, GameError> {
        let updated = self.counters.update_and_fetch(name.as_bytes(), |current| {
            let value = current.map(decode_i64).unwrap_or(0);
            Some(value.saturating_add(by).to_be_bytes().to_vec())
        })?;
        self.counters.flush()?;
        Ok(updated.as_deref().map(decode_i64).unwrap_or(0))
    }

    async fn counter(&self, name: &str) -> Result<i64, GameError> {
        Ok(self
            .counters
            .get(name.as_bytes())?
            .as_deref()
            .map(decode_i64)
            .unwrap_or(0))
    }
}

fn decode_i64(bytes: &[u8]) -> i64 {
    let mut raw = [0u8; 8];
    let n = bytes.len().min(8);
    raw[..n].copy_from_slice(&bytes[..n]);
    i64::from_be_bytes(raw)
}
