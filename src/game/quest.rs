//! Timed quest sets.
//!
//! Each player holds one daily and one weekly set. Every record in a set shares the set's
//! expiry, and a set is only ever replaced whole, once every record in it has expired. The
//! replacement write carries a [`Guard::QuestSetExpired`] so two callers racing to refresh
//! the same set cannot both win.
//!
//! Progress from one game event is written as a single batched update across every matching
//! record; completions are settled afterwards, each through a guarded write that marks the
//! record completed and grants the cadence's XP in the same operation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use super::bingo;
use super::clock::Clock;
use super::errors::GameError;
use super::progression::{LevelUpReport, ProgressionLedger};
use super::reward::weighted_index;
use super::storage::{Guard, MemberStore, MemberUpdate};
use super::types::{
    BoxKind, Cadence, Field, Gender, PlayerId, PlayerRecord, QuestCondition, QuestEvent,
    QuestRecord, QuestSubject, Rarity,
};

/// Inclusive target-count range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountRange {
    pub min: u32,
    pub max: u32,
}

impl CountRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        rng.gen_range(self.min..=self.max)
    }

    fn scaled(&self, factor: u32) -> Self {
        Self {
            min: self.min.saturating_mul(factor),
            max: self.max.saturating_mul(factor),
        }
    }

    fn validate(&self) -> Result<(), GameError> {
        if self.min == 0 || self.min > self.max {
            return Err(GameError::Config(format!(
                "quest count range {}..={} is invalid",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateKind {
    Plain { event: QuestEvent, counts: CountRange },
    CatchType(Vec<(String, CountRange)>),
    CatchRegion(Vec<(String, CountRange)>),
    CatchRarity(Vec<(Rarity, CountRange)>),
    CatchGender(Vec<(Gender, CountRange)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestTemplate {
    pub weight: f64,
    pub kind: TemplateKind,
}

fn pick<'a, T, R: Rng + ?Sized>(rng: &mut R, choices: &'a [(T, CountRange)]) -> &'a (T, CountRange) {
    &choices[rng.gen_range(0..choices.len())]
}

impl QuestTemplate {
    pub fn new(weight: f64, kind: TemplateKind) -> Self {
        Self { weight, kind }
    }

    fn validate(&self) -> Result<(), GameError> {
        fn check<T>(choices: &[(T, CountRange)]) -> Result<(), GameError> {
            if choices.is_empty() {
                return Err(GameError::Config(
                    "parameterized quest template has no choices".to_string(),
                ));
            }
            choices.iter().try_for_each(|(_, c)| c.validate())
        }
        match &self.kind {
            TemplateKind::Plain { counts, .. } => counts.validate(),
            TemplateKind::CatchType(choices) => check(choices),
            TemplateKind::CatchRegion(choices) => check(choices),
            TemplateKind::CatchRarity(choices) => check(choices),
            TemplateKind::CatchGender(choices) => check(choices),
        }
    }

    fn scaled(&self, factor: u32) -> Self {
        fn scale<T: Clone>(choices: &[(T, CountRange)], factor: u32) -> Vec<(T, CountRange)> {
            choices
                .iter()
                .map(|(v, c)| (v.clone(), c.scaled(factor)))
                .collect()
        }
        let kind = match &self.kind {
            TemplateKind::Plain { event, counts } => TemplateKind::Plain {
                event: *event,
                counts: counts.scaled(factor),
            },
            TemplateKind::CatchType(c) => TemplateKind::CatchType(scale(c, factor)),
            TemplateKind::CatchRegion(c) => TemplateKind::CatchRegion(scale(c, factor)),
            TemplateKind::CatchRarity(c) => TemplateKind::CatchRarity(scale(c, factor)),
            TemplateKind::CatchGender(c) => TemplateKind::CatchGender(scale(c, factor)),
        };
        Self {
            weight: self.weight,
            kind,
        }
    }

    /// Produce a fresh record with its own randomized count and condition.
    pub fn instantiate<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        cadence: Cadence,
        expires: DateTime<Utc>,
    ) -> QuestRecord {
        let (event, condition, count, description) = match &self.kind {
            TemplateKind::Plain { event, counts } => {
                let n = counts.sample(rng);
                (*event, None, n, plain_description(*event, n))
            }
            TemplateKind::CatchType(choices) => {
                let (name, counts) = pick(rng, choices);
                let n = counts.sample(rng);
                (
                    QuestEvent::Catch,
                    Some(QuestCondition::of_type(name)),
                    n,
                    format!("Catch {} {}-type pokémon", n, name),
                )
            }
            TemplateKind::CatchRegion(choices) => {
                let (name, counts) = pick(rng, choices);
                let n = counts.sample(rng);
                (
                    QuestEvent::Catch,
                    Some(QuestCondition::of_region(name)),
                    n,
                    format!("Catch {} pokémon from the {} region", n, title_case(name)),
                )
            }
            TemplateKind::CatchRarity(choices) => {
                let (rarity, counts) = pick(rng, choices);
                let n = counts.sample(rng);
                (
                    QuestEvent::Catch,
                    Some(QuestCondition::of_rarity(*rarity)),
                    n,
                    format!("Catch {} {} pokémon", n, rarity.name()),
                )
            }
            TemplateKind::CatchGender(choices) => {
                let (gender, counts) = pick(rng, choices);
                let n = counts.sample(rng);
                (
                    QuestEvent::Catch,
                    Some(QuestCondition::of_gender(*gender)),
                    n,
                    format!("Catch {} {} gender pokémon", n, title_case(gender.name())),
                )
            }
        };
        QuestRecord::new(cadence, event, condition, count, description, expires)
    }
}

fn plain_description(event: QuestEvent, n: u32) -> String {
    match event {
        QuestEvent::Catch => format!("Catch {} pokémon", n),
        QuestEvent::Trade => format!("Trade with {} people", n),
        QuestEvent::Evolve => format!("Evolve {} pokémon", n),
        QuestEvent::Release => format!("Release {} pokémon", n),
        QuestEvent::MarketBuy => format!("Spend {} Pokécoins on the market", n),
        QuestEvent::MarketSell => format!("Earn {} Pokécoins from the market", n),
        QuestEvent::OpenBox if n == 1 => "Open an event box".to_string(),
        QuestEvent::OpenBox => format!("Open {} event boxes", n),
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Weighted pool of templates for one cadence.
#[derive(Debug, Clone)]
pub struct QuestPool {
    templates: Vec<QuestTemplate>,
    sampler: WeightedIndex<f64>,
}

impl QuestPool {
    pub fn new(templates: Vec<QuestTemplate>) -> Result<Self, GameError> {
        for template in &templates {
            template.validate()?;
        }
        let weights: Vec<f64> = templates.iter().map(|t| t.weight).collect();
        let sampler = weighted_index(&weights)?;
        Ok(Self { templates, sampler })
    }

    /// Same templates with every count range multiplied by `factor`.
    pub fn scaled(&self, factor: u32) -> Result<Self, GameError> {
        Self::new(self.templates.iter().map(|t| t.scaled(factor)).collect())
    }

    pub fn templates(&self) -> &[QuestTemplate] {
        &self.templates
    }

    /// Draw `n` templates with replacement and instantiate each independently.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        cadence: Cadence,
        n: usize,
        expires: DateTime<Utc>,
    ) -> Vec<QuestRecord> {
        (0..n)
            .map(|_| {
                let template = &self.templates[self.sampler.sample(rng)];
                template.instantiate(rng, cadence, expires)
            })
            .collect()
    }

    /// Default daily pool.
    pub fn standard_daily() -> Result<Self, GameError> {
        let types = [
            (&["Normal", "Water", "Grass", "Flying", "Bug"][..], CountRange::new(16, 19)),
            (
                &["Poison", "Ground", "Psychic", "Rock", "Electric", "Ghost"][..],
                CountRange::new(14, 17),
            ),
            (
                &["Dragon", "Fire", "Fairy", "Dark", "Fighting", "Steel", "Ice"][..],
                CountRange::new(12, 15),
            ),
        ];
        let regions = [
            (&["paldea"][..], CountRange::new(20, 29)),
            (&["kanto", "johto", "hoenn", "unova"][..], CountRange::new(14, 17)),
            (&["sinnoh", "alola", "kalos", "galar"][..], CountRange::new(12, 15)),
        ];
        fn unwind(groups: &[(&[&str], CountRange)]) -> Vec<(String, CountRange)> {
            let mut out = Vec::new();
            for (names, range) in groups {
                out.extend(names.iter().map(|n| (n.to_string(), *range)));
            }
            out
        }

        Self::new(vec![
            QuestTemplate::new(
                3.0,
                TemplateKind::Plain {
                    event: QuestEvent::Catch,
                    counts: CountRange::new(40, 60),
                },
            ),
            QuestTemplate::new(
                1.0,
                TemplateKind::Plain {
                    event: QuestEvent::Trade,
                    counts: CountRange::new(3, 6),
                },
            ),
            QuestTemplate::new(
                1.0,
                TemplateKind::Plain {
                    event: QuestEvent::Evolve,
                    counts: CountRange::new(10, 15),
                },
            ),
            QuestTemplate::new(
                1.0,
                TemplateKind::Plain {
                    event: QuestEvent::Release,
                    counts: CountRange::new(10, 20),
                },
            ),
            QuestTemplate::new(
                1.0,
                TemplateKind::Plain {
                    event: QuestEvent::MarketBuy,
                    counts: CountRange::new(250, 750),
                },
            ),
            QuestTemplate::new(
                1.0,
                TemplateKind::Plain {
                    event: QuestEvent::MarketSell,
                    counts: CountRange::new(250, 500),
                },
            ),
            QuestTemplate::new(
                1.0,
                TemplateKind::Plain {
                    event: QuestEvent::OpenBox,
                    counts: CountRange::new(1, 3),
                },
            ),
            QuestTemplate::new(4.0, TemplateKind::CatchType(unwind(&types))),
            QuestTemplate::new(2.0, TemplateKind::CatchRegion(unwind(&regions))),
            QuestTemplate::new(
                1.0,
                TemplateKind::CatchGender(vec![
                    (Gender::Male, CountRange::new(24, 35)),
                    (Gender::Female, CountRange::new(24, 35)),
                    (Gender::Unknown, CountRange::new(6, 11)),
                ]),
            ),
            QuestTemplate::new(
                0.5,
                TemplateKind::CatchRarity(vec![
                    (Rarity::Legendary, CountRange::new(1, 2)),
                    (Rarity::Mythical, CountRange::new(1, 2)),
                    (Rarity::UltraBeast, CountRange::new(1, 2)),
                ]),
            ),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestSettings {
    pub per_cadence: usize,
    pub daily_xp: i64,
    pub weekly_xp: i64,
    /// Event box granted alongside the XP, if the running event hands one out.
    pub completion_box: Option<BoxKind>,
}

impl Default for QuestSettings {
    fn default() -> Self {
        Self {
            per_cadence: 5,
            daily_xp: 100,
            weekly_xp: 500,
            completion_box: None,
        }
    }
}

impl QuestSettings {
    pub fn xp_for(&self, cadence: Cadence) -> i64 {
        match cadence {
            Cadence::Daily => self.daily_xp,
            Cadence::Weekly => self.weekly_xp,
            // Card squares pay only the completion box.
            Cadence::Card => 0,
        }
    }
}

/// One quest completed by an event, with what it paid.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestCompletion {
    pub quest: QuestRecord,
    pub xp: i64,
    pub box_kind: Option<BoxKind>,
    pub level_up: LevelUpReport,
}

impl QuestCompletion {
    pub fn message_lines(&self) -> Vec<String> {
        let mut rewards = Vec::new();
        if self.xp > 0 {
            rewards.push(format!("{} XP", self.xp));
        }
        if let Some(kind) = self.box_kind {
            rewards.push(format!("a {} box", kind.slug()));
        }
        let headline = format!(
            "You have completed the {} quest \"{}\"",
            self.quest.cadence.name(),
            self.quest.description
        );
        let mut lines = vec![if rewards.is_empty() {
            format!("{}!", headline)
        } else {
            format!("{} and received {}!", headline, rewards.join(" and "))
        }];
        lines.extend(self.level_up.summary_lines());
        lines
    }
}

/// Result of one sweep for a single player.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshNotice {
    pub player_id: PlayerId,
    pub cadences: Vec<Cadence>,
    pub notify: bool,
}

#[derive(Clone)]
pub struct QuestEngine {
    store: Arc<dyn MemberStore>,
    clock: Arc<dyn Clock>,
    progression: ProgressionLedger,
    daily: Arc<QuestPool>,
    weekly: Arc<QuestPool>,
    settings: QuestSettings,
}

impl QuestEngine {
    pub fn new(
        store: Arc<dyn MemberStore>,
        clock: Arc<dyn Clock>,
        progression: ProgressionLedger,
        daily: QuestPool,
        weekly: QuestPool,
        settings: QuestSettings,
    ) -> Result<Self, GameError> {
        if settings.per_cadence == 0 {
            return Err(GameError::Config(
                "quest sets need at least one record".to_string(),
            ));
        }
        Ok(Self {
            store,
            clock,
            progression,
            daily: Arc::new(daily),
            weekly: Arc::new(weekly),
            settings,
        })
    }

    /// Standard pools: the daily pool as-is and the same pool with counts ×5 for weekly sets.
    pub fn with_standard_pools(
        store: Arc<dyn MemberStore>,
        clock: Arc<dyn Clock>,
        progression: ProgressionLedger,
        settings: QuestSettings,
    ) -> Result<Self, GameError> {
        let daily = QuestPool::standard_daily()?;
        let weekly = daily.scaled(5)?;
        Self::new(store, clock, progression, daily, weekly, settings)
    }

    pub fn settings(&self) -> &QuestSettings {
        &self.settings
    }

    pub fn progression(&self) -> &ProgressionLedger {
        &self.progression
    }

    /// Fresh set for `cadence`; every record shares one expiry.
    pub fn generate_set(&self, cadence: Cadence, now: DateTime<Utc>) -> Vec<QuestRecord> {
        let expires = cadence.next_expiry(now);
        let mut rng = rand::thread_rng();
        let pool = match cadence {
            Cadence::Daily => &self.daily,
            Cadence::Weekly => &self.weekly,
            Cadence::Card => return bingo::generate_card(&mut rng, expires),
        };
        pool.generate(&mut rng, cadence, self.settings.per_cadence, expires)
    }

    /// Replace every cadence whose set has fully expired. Returns the cadences replaced.
    pub async fn refresh_expired(&self, player: PlayerId) -> Result<Vec<Cadence>, GameError> {
        let Some(record) = self.store.get(player).await? else {
            return Ok(Vec::new());
        };
        self.refresh_from(&record, false).await
    }

    /// `existing_only` skips cadences with no records at all (players who never looked).
    async fn refresh_from(
        &self,
        record: &PlayerRecord,
        existing_only: bool,
    ) -> Result<Vec<Cadence>, GameError> {
        let now = self.clock.now();
        let mut refreshed = Vec::new();
        for cadence in Cadence::ALL {
            if !record.quest_set_expired(cadence, now) {
                continue;
            }
            if existing_only && record.quests_of(cadence).next().is_none() {
                continue;
            }
            let fresh = self.generate_set(cadence, now);
            let update = MemberUpdate::new()
                .guard(Guard::QuestSetExpired { cadence, now })
                .replace_quests(cadence, fresh);
            if self.store.update(record.id, &update).await? > 0 {
                debug!("regenerated {} quests for {}", cadence.name(), record.id);
                refreshed.push(cadence);
            }
        }
        Ok(refreshed)
    }

    /// Current quests, regenerating expired sets first.
    pub async fn active_quests(&self, player: PlayerId) -> Result<Vec<QuestRecord>, GameError> {
        self.refresh_expired(player).await?;
        let record = self.store.require(player).await?;
        Ok(record.quests)
    }

    /// Feed a game event into the player's quests: [`apply_progress`](Self::apply_progress)
    /// followed by [`settle`](Self::settle).
    pub async fn on_event(
        &self,
        player: PlayerId,
        event: QuestEvent,
        subjects: &[QuestSubject],
        count: u32,
    ) -> Result<Vec<QuestCompletion>, GameError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        self.apply_progress(player, event, subjects, count).await?;
        self.settle(player).await
    }

    /// Advance every active record for `event` whose condition matches one of `subjects` by
    /// `count`, clamped to its target, in one write. Returns how many records moved.
    ///
    /// Not idempotent: running it twice counts the event twice. [`settle`](Self::settle) is
    /// the part that may be repeated.
    pub async fn apply_progress(
        &self,
        player: PlayerId,
        event: QuestEvent,
        subjects: &[QuestSubject],
        count: u32,
    ) -> Result<usize, GameError> {
        if count == 0 {
            return Ok(0);
        }
        self.refresh_expired(player).await?;
        let Some(record) = self.store.get(player).await? else {
            return Ok(0);
        };

        let now = self.clock.now();
        let mut update = MemberUpdate::new();
        let mut matched = 0usize;
        for quest in &record.quests {
            if quest.event != event || !quest.is_active(now) || !quest.matches(subjects) {
                continue;
            }
            let step = count.min(quest.remaining());
            if step > 0 {
                update = update.quest_progress(quest.id, step);
                matched += 1;
            }
        }
        if matched > 0 {
            self.store.update(player, &update).await?;
            debug!(
                "{:?} x{} advanced {} quest(s) for {}",
                event, count, matched, player
            );
        }
        Ok(matched)
    }

    /// Complete every record that reached its target and pay it, once.
    pub async fn settle(&self, player: PlayerId) -> Result<Vec<QuestCompletion>, GameError> {
        let Some(record) = self.store.get(player).await? else {
            return Ok(Vec::new());
        };
        let mut done = Vec::new();
        for quest in record.quests.iter().filter(|q| q.is_ready()) {
            let xp = self.settings.xp_for(quest.cadence);
            let mut alongside = MemberUpdate::new()
                .guard(Guard::QuestReady(quest.id))
                .complete_quest(quest.id);
            if let Some(kind) = self.settings.completion_box {
                alongside = alongside.increment(Field::Boxes(kind), 1);
            }
            let Some(level_up) = self
                .progression
                .grant_xp_with(player, xp, alongside)
                .await?
            else {
                continue;
            };
            info!(
                "player {} completed {} quest '{}'",
                player,
                quest.cadence.name(),
                crate::logutil::escape_log(&quest.description)
            );
            let mut completed = quest.clone();
            completed.completed = true;
            done.push(QuestCompletion {
                quest: completed,
                xp,
                box_kind: self.settings.completion_box,
                level_up,
            });
        }
        Ok(done)
    }

    /// Regenerate every player's fully-expired sets. Used by the background watcher.
    /// A player whose document cannot be read or refreshed is logged and skipped.
    pub async fn sweep_expired(&self) -> Result<Vec<RefreshNotice>, GameError> {
        let mut notices = Vec::new();
        for id in self.store.list_ids().await? {
            let record = match self.store.get(id).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!("quest sweep skipped player {}: {}", id, e);
                    continue;
                }
            };
            let cadences = match self.refresh_from(&record, true).await {
                Ok(cadences) => cadences,
                Err(e) => {
                    warn!("quest sweep could not refresh player {}: {}", id, e);
                    continue;
                }
            };
            if !cadences.is_empty() {
                notices.push(RefreshNotice {
                    player_id: id,
                    cadences,
                    notify: record.quests_notify,
                });
            }
        }
        Ok(notices)
    }

    /// Throw away both sets and start over, expired or not.
    pub async fn reset_quests(&self, player: PlayerId) -> Result<(), GameError> {
        let now = self.clock.now();
        let mut update = MemberUpdate::new();
        for cadence in Cadence::ALL {
            update = update.replace_quests(cadence, self.generate_set(cadence, now));
        }
        if self.store.update(player, &update).await? == 0 {
            return Err(GameError::NotFound(format!("player {}", player)));
        }
        Ok(())
    }

    /// Deal a bingo card unless the player already holds one. Returns whether one was dealt.
    pub async fn deal_card(&self, player: PlayerId) -> Result<bool, GameError> {
        let now = self.clock.now();
        let update = MemberUpdate::new()
            .guard(Guard::QuestSetExpired {
                cadence: Cadence::Card,
                now,
            })
            .replace_quests(Cadence::Card, self.generate_set(Cadence::Card, now));
        Ok(self.store.update(player, &update).await? > 0)
    }

    /// Swap in a fresh card in the same write as `alongside`, whose guards decide whether
    /// the swap happens.
    pub async fn redeal_card(
        &self,
        player: PlayerId,
        alongside: MemberUpdate,
    ) -> Result<bool, GameError> {
        let fresh = self.generate_set(Cadence::Card, self.clock.now());
        let update = alongside.replace_quests(Cadence::Card, fresh);
        Ok(self.store.update(player, &update).await? > 0)
    }

    /// Push up to `n` incomplete active records to their target and settle them.
    pub async fn force_complete(
        &self,
        player: PlayerId,
        n: usize,
    ) -> Result<Vec<QuestCompletion>, GameError> {
        let quests = self.active_quests(player).await?;
        let now = self.clock.now();
        let mut update = MemberUpdate::new();
        for quest in quests.iter().filter(|q| q.is_active(now)).take(n) {
            update = update.quest_progress(quest.id, quest.remaining());
        }
        self.store.update(player, &update).await?;
        self.settle(player).await
    }
}
