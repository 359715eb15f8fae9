//! Test utilities & fixtures.
//! Builds a full game against a throwaway sled store, the bundled species catalog and a
//! manual clock.
#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use critterbot::game::catalog::StaticCatalog;
use critterbot::game::clock::ManualClock;
use critterbot::game::errors::GameError;
use critterbot::game::storage::{MemberStore, MemberUpdate, SledMemberStore, UpdateOutcome};
use critterbot::game::types::{Cadence, Creature, PlayerId, PlayerRecord, QuestRecord};
use critterbot::game::{Game, GameSettings};
use tempfile::TempDir;

/// Game plus the handles tests poke at. `game` is declared first so the store closes before
/// the directory goes away.
pub struct Harness {
    pub game: Game,
    pub clock: ManualClock,
    pub dir: TempDir,
}

/// Saturday morning, the day before Easter 2024.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 30, 10, 0, 0).unwrap()
}

pub fn species_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("data")
        .join("species.json")
}

pub fn catalog() -> StaticCatalog {
    StaticCatalog::load_from_json(species_path()).expect("bundled species catalog")
}

pub fn harness(settings: GameSettings) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SledMemberStore::open(dir.path().join("members")).expect("store");
    assemble(Arc::new(store), dir, settings)
}

/// Like [`harness`] but every store call goes through a [`FlakyStore`] the test can arm.
pub fn flaky_harness(settings: GameSettings) -> (Harness, Arc<FlakyStore>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SledMemberStore::open(dir.path().join("members")).expect("store");
    let flaky = Arc::new(FlakyStore::new(store));
    (assemble(flaky.clone(), dir, settings), flaky)
}

fn assemble(store: Arc<dyn MemberStore>, dir: TempDir, settings: GameSettings) -> Harness {
    let clock = ManualClock::new(start_time());
    let game = Game::assemble(store, Arc::new(catalog()), Arc::new(clock.clone()), settings)
        .expect("assemble game");
    Harness { game, clock, dir }
}

fn injected(what: &str) -> GameError {
    GameError::Internal(format!("injected {} failure", what))
}

/// Sled store with switchable failures.
pub struct FlakyStore {
    inner: SledMemberStore,
    failing_inserts: AtomicUsize,
    fail_read_after_write: AtomicBool,
    next_read_fails: AtomicBool,
    unreadable: Mutex<HashSet<PlayerId>>,
}

impl FlakyStore {
    pub fn new(inner: SledMemberStore) -> Self {
        Self {
            inner,
            failing_inserts: AtomicUsize::new(0),
            fail_read_after_write: AtomicBool::new(false),
            next_read_fails: AtomicBool::new(false),
            unreadable: Mutex::new(HashSet::new()),
        }
    }

    /// The next `n` creature inserts fail without writing anything.
    pub fn fail_inserts(&self, n: usize) {
        self.failing_inserts.store(n, Ordering::SeqCst);
    }

    /// The first read after the next modifying write fails, once.
    pub fn fail_read_after_next_write(&self) {
        self.fail_read_after_write.store(true, Ordering::SeqCst);
    }

    /// Every read of `id` fails until the test ends.
    pub fn make_unreadable(&self, id: PlayerId) {
        self.unreadable.lock().unwrap().insert(id);
    }
}

#[async_trait]
impl MemberStore for FlakyStore {
    async fn get(&self, id: PlayerId) -> Result<Option<PlayerRecord>, GameError> {
        if self.unreadable.lock().unwrap().contains(&id) {
            return Err(injected("read"));
        }
        if self.next_read_fails.swap(false, Ordering::SeqCst) {
            return Err(injected("read"));
        }
        self.inner.get(id).await
    }

    async fn create(&self, id: PlayerId, username: &str) -> Result<PlayerRecord, GameError> {
        self.inner.create(id, username).await
    }

    async fn find_and_update(
        &self,
        id: PlayerId,
        update: &MemberUpdate,
    ) -> Result<Option<UpdateOutcome>, GameError> {
        let outcome = self.inner.find_and_update(id, update).await?;
        if outcome.as_ref().is_some_and(|o| o.modified)
            && self.fail_read_after_write.swap(false, Ordering::SeqCst)
        {
            self.next_read_fails.store(true, Ordering::SeqCst);
        }
        Ok(outcome)
    }

    async fn insert_creatures(&self, creatures: &[Creature]) -> Result<(), GameError> {
        let armed = self
            .failing_inserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            return Err(injected("insert"));
        }
        self.inner.insert_creatures(creatures).await
    }

    async fn creatures_of(&self, owner: PlayerId) -> Result<Vec<Creature>, GameError> {
        self.inner.creatures_of(owner).await
    }

    async fn list_ids(&self) -> Result<Vec<PlayerId>, GameError> {
        self.inner.list_ids().await
    }

    async fn increment_counter(&self, name: &str, by: i64) -> Result<i64, GameError> {
        self.inner.increment_counter(name, by).await
    }

    async fn counter(&self, name: &str) -> Result<i64, GameError> {
        self.inner.counter(name).await
    }
}

impl Harness {
    pub async fn register(&self, id: u64, name: &str) -> PlayerRecord {
        self.game.store.create(id, name).await.expect("create player")
    }

    pub async fn record(&self, id: u64) -> PlayerRecord {
        self.game.store.require(id).await.expect("player exists")
    }

    /// Overwrite a player's quest set for `cadence` with `records`.
    pub async fn install_quests(&self, id: u64, cadence: Cadence, records: Vec<QuestRecord>) {
        let update = MemberUpdate::new().replace_quests(cadence, records);
        self.game.store.update(id, &update).await.expect("install quests");
    }
}
