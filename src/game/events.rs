//! Seasonal events: openable boxes, coin shops and catch drops.
//!
//! An [`EventSpec`] is pure data: which box kinds exist, what each box's weighted reward table
//! looks like, which species each creature pool draws from, and the optional shop and drop
//! rules. [`EventCog`] runs the player-facing operations against the store.
//!
//! Bounds and balance checks never write: quantity limits are checked before the store is
//! touched, and the box/coin decrement is a guarded update that simply does not apply when the
//! player cannot afford it. Opening rolls everything first, then takes the boxes and pays the
//! currency in one write; if the creatures cannot be stored afterwards that write is undone.
//!
//! Events with a [`BingoSpec`] also deal each player a bingo card (see [`super::bingo`]) and
//! pay for every finished line.

use std::fmt;
use std::sync::Arc;

use log::{debug, error, info, warn};
use rand::distributions::Distribution;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::bingo::{self, BINGOS_PER_CARD};
use super::catalog::SpeciesCatalog;
use super::creature::{check_species, CreatureFactory, CreatureOptions, LevelSpec};
use super::errors::GameError;
use super::quest::{QuestCompletion, QuestEngine};
use super::reward::{weighted_index, AmountRange, RewardDescriptor, RewardEntry, RewardTable};
use super::storage::{Guard, MemberStore, MemberUpdate, SetField};
use super::types::{
    group_thousands, BoxKind, Cadence, Creature, Currency, Field, PlayerId, QuestEvent,
    QuestRecord, Species, SpeciesId,
};

/// Most boxes a player may open in one command.
pub const MAX_OPEN_PER_COMMAND: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPreset {
    #[serde(rename = "easter_2024")]
    Easter2024,
    #[serde(rename = "valentines_2024")]
    Valentines2024,
    #[serde(rename = "christmas_2022")]
    Christmas2022,
    #[serde(rename = "none")]
    None,
}

impl EventPreset {
    pub fn spec(&self) -> Result<Option<EventSpec>, GameError> {
        match self {
            EventPreset::Easter2024 => EventSpec::easter_2024().map(Some),
            EventPreset::Valentines2024 => EventSpec::valentines_2024().map(Some),
            EventPreset::Christmas2022 => EventSpec::christmas_2022().map(Some),
            EventPreset::None => Ok(None),
        }
    }
}

impl fmt::Display for EventPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventPreset::Easter2024 => "easter_2024",
            EventPreset::Valentines2024 => "valentines_2024",
            EventPreset::Christmas2022 => "christmas_2022",
            EventPreset::None => "none",
        })
    }
}

/// Named creature pools a box reward can draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolId {
    Event,
    Special,
    Blackout,
    Rare,
    Common,
    Shiny,
    Santa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxReward {
    Currency(Currency),
    Creature(PoolId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PoolSource {
    /// Uniform over the listed species.
    Fixed(Vec<SpeciesId>),
    Weighted(Vec<(SpeciesId, f64)>),
    /// Catchable legendaries, mythicals and ultra beasts, weighted by abundance.
    Rare,
    /// Every catchable species, weighted by abundance.
    Catchable,
    /// Every listed species at once.
    Bundle(Vec<SpeciesId>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolSpec {
    pub id: PoolId,
    pub source: PoolSource,
    pub shiny_boost: f64,
    pub force_shiny: bool,
}

impl PoolSpec {
    pub fn new(id: PoolId, source: PoolSource) -> Self {
        Self {
            id,
            source,
            shiny_boost: 1.0,
            force_shiny: false,
        }
    }

    pub fn boosted(mut self, boost: f64) -> Self {
        self.shiny_boost = boost;
        self
    }

    pub fn always_shiny(mut self) -> Self {
        self.force_shiny = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct BoxSpec {
    pub kind: BoxKind,
    pub name: String,
    pub plural: String,
    /// Event-coin price; `None` means the box cannot be bought.
    pub cost: Option<i64>,
    pub table: RewardTable<BoxReward>,
}

impl BoxSpec {
    pub fn new(
        kind: BoxKind,
        name: &str,
        plural: &str,
        cost: Option<i64>,
        entries: Vec<RewardEntry<BoxReward>>,
    ) -> Result<Self, GameError> {
        Ok(Self {
            kind,
            name: name.to_string(),
            plural: plural.to_string(),
            cost,
            table: RewardTable::new(entries)?,
        })
    }

    pub fn label(&self, qty: i64) -> &str {
        if qty == 1 {
            &self.name
        } else {
            &self.plural
        }
    }
}

/// "Every `every` catches earns one `kind` box."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchDrop {
    pub every: i64,
    pub kind: BoxKind,
}

/// Bingo card payouts. Every finished line pays `coins` and one `box_kind` box; the third
/// line of a card adds a creature from `third_pool` and a full card one from `blackout_pool`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BingoSpec {
    pub box_kind: BoxKind,
    pub coins: i64,
    pub third_pool: PoolId,
    pub blackout_pool: PoolId,
}

#[derive(Debug, Clone)]
pub struct EventSpec {
    pub key: String,
    pub title: String,
    pub blurb: String,
    pub boxes: Vec<BoxSpec>,
    pub pools: Vec<PoolSpec>,
    pub level: LevelSpec,
    pub catch_drop: Option<CatchDrop>,
    /// Box granted for every completed quest.
    pub quest_box: Option<BoxKind>,
    /// Global counter bumped by shop purchases.
    pub community_counter: String,
    pub bingo: Option<BingoSpec>,
}

fn entry(reward: BoxReward, weight: f64, amount: AmountRange) -> RewardEntry<BoxReward> {
    RewardEntry::new(reward, weight, amount)
}

fn creature(pool: PoolId, weight: f64) -> RewardEntry<BoxReward> {
    RewardEntry::new(BoxReward::Creature(pool), weight, AmountRange::exactly(1))
}

impl EventSpec {
    pub fn easter_2024() -> Result<Self, GameError> {
        let eggs = BoxSpec::new(
            BoxKind::Event,
            "Easter Egg",
            "Easter Eggs",
            None,
            vec![
                entry(
                    BoxReward::Currency(Currency::Shards),
                    30.0,
                    AmountRange::between(15, 55),
                ),
                creature(PoolId::Event, 33.0),
                entry(
                    BoxReward::Currency(Currency::Pokecoins),
                    17.0,
                    AmountRange::between(2000, 4000),
                ),
                creature(PoolId::Rare, 10.8),
                creature(PoolId::Blackout, 2.0),
                creature(PoolId::Special, 4.0),
                creature(PoolId::Shiny, 0.2),
                entry(
                    BoxReward::Currency(Currency::Redeems),
                    3.0,
                    AmountRange::exactly(1),
                ),
            ],
        )?;
        Ok(Self {
            key: "easter_2024".to_string(),
            title: "Easter 2024".to_string(),
            blurb: "Complete quests to collect Easter Eggs and crack them open for rewards!"
                .to_string(),
            boxes: vec![eggs],
            pools: vec![
                PoolSpec::new(PoolId::Event, PoolSource::Fixed(vec![50164, 50166, 50167])),
                PoolSpec::new(PoolId::Special, PoolSource::Fixed(vec![50163])),
                PoolSpec::new(PoolId::Blackout, PoolSource::Fixed(vec![50165])),
                PoolSpec::new(PoolId::Rare, PoolSource::Rare),
                PoolSpec::new(PoolId::Shiny, PoolSource::Catchable).always_shiny(),
            ],
            level: LevelSpec::EVENT,
            catch_drop: None,
            quest_box: Some(BoxKind::Event),
            community_counter: "easter_2024".to_string(),
            bingo: Some(BingoSpec {
                box_kind: BoxKind::Event,
                coins: 5_000,
                third_pool: PoolId::Special,
                blackout_pool: PoolId::Blackout,
            }),
        })
    }

    pub fn valentines_2024() -> Result<Self, GameError> {
        let chocolates = BoxSpec::new(
            BoxKind::Event,
            "Chocolate Box",
            "Chocolate Boxes",
            None,
            vec![
                entry(
                    BoxReward::Currency(Currency::Pokecoins),
                    0.5,
                    AmountRange::between(2000, 3999),
                ),
                entry(
                    BoxReward::Currency(Currency::Shards),
                    0.25,
                    AmountRange::between(5, 19),
                ),
                entry(
                    BoxReward::Currency(Currency::Redeems),
                    0.025,
                    AmountRange::exactly(1),
                ),
                creature(PoolId::Event, 0.05),
                creature(PoolId::Common, 0.174),
                creature(PoolId::Shiny, 0.001),
            ],
        )?;
        Ok(Self {
            key: "valentines_2024".to_string(),
            title: "Valentine's 2024".to_string(),
            blurb: "Every 10 catches earns you a Chocolate Box.".to_string(),
            boxes: vec![chocolates],
            pools: vec![
                PoolSpec::new(
                    PoolId::Event,
                    PoolSource::Weighted(vec![(50156, 0.5), (50157, 0.5)]),
                )
                .boosted(5.0),
                PoolSpec::new(PoolId::Common, PoolSource::Catchable),
                PoolSpec::new(PoolId::Shiny, PoolSource::Catchable).boosted(4096.0),
            ],
            level: LevelSpec::EVENT,
            catch_drop: Some(CatchDrop {
                every: 10,
                kind: BoxKind::Event,
            }),
            quest_box: None,
            community_counter: "valentines_2024".to_string(),
            bingo: None,
        })
    }

    pub fn christmas_2022() -> Result<Self, GameError> {
        let pokecoins = |weight: f64| {
            entry(
                BoxReward::Currency(Currency::Pokecoins),
                weight,
                AmountRange::between(3000, 7000),
            )
        };
        let boxes = vec![
            BoxSpec::new(
                BoxKind::Random,
                "Random Box",
                "Random Boxes",
                Some(1),
                vec![
                    creature(PoolId::Event, 10.0),
                    creature(PoolId::Common, 40.0),
                    entry(
                        BoxReward::Currency(Currency::Shards),
                        20.0,
                        AmountRange::between(17, 27),
                    ),
                    pokecoins(30.0),
                ],
            )?,
            BoxSpec::new(
                BoxKind::Creature,
                "Pokémon Box",
                "Pokémon Boxes",
                Some(4),
                vec![
                    creature(PoolId::Event, 40.0),
                    creature(PoolId::Shiny, 1.0),
                    creature(PoolId::Rare, 9.0),
                    creature(PoolId::Common, 50.0),
                ],
            )?,
            BoxSpec::new(
                BoxKind::Currency,
                "Currency Box",
                "Currency Boxes",
                Some(4),
                vec![
                    entry(
                        BoxReward::Currency(Currency::Shards),
                        40.0,
                        AmountRange::between(35, 55),
                    ),
                    pokecoins(50.0),
                    entry(
                        BoxReward::Currency(Currency::Redeems),
                        10.0,
                        AmountRange::exactly(1),
                    ),
                ],
            )?,
            BoxSpec::new(
                BoxKind::Event,
                "Event Box",
                "Event Boxes",
                Some(8),
                vec![creature(PoolId::Event, 100.0)],
            )?,
            BoxSpec::new(
                BoxKind::Special,
                "Santa Box",
                "Santa Boxes",
                None,
                vec![creature(PoolId::Santa, 100.0)],
            )?,
        ];
        Ok(Self {
            key: "christmas_2022".to_string(),
            title: "Christmas 2022".to_string(),
            blurb: "Spend Christmas coins on boxes in the shop and open them for presents!"
                .to_string(),
            boxes,
            pools: vec![
                PoolSpec::new(PoolId::Event, PoolSource::Fixed((50079..=50086).collect())),
                PoolSpec::new(PoolId::Common, PoolSource::Catchable),
                PoolSpec::new(PoolId::Rare, PoolSource::Rare),
                PoolSpec::new(PoolId::Shiny, PoolSource::Catchable).always_shiny(),
                PoolSpec::new(PoolId::Santa, PoolSource::Bundle(vec![50087, 50088])),
            ],
            level: LevelSpec::GENERAL,
            catch_drop: None,
            quest_box: None,
            community_counter: "christmas_2022".to_string(),
            bingo: None,
        })
    }

    pub fn box_spec(&self, kind: BoxKind) -> Option<&BoxSpec> {
        self.boxes.iter().find(|b| b.kind == kind)
    }

    pub fn pool(&self, id: PoolId) -> Option<&PoolSpec> {
        self.pools.iter().find(|p| p.id == id)
    }

    /// Every reward must point at a pool, and every pool must be able to produce a creature:
    /// listed species exist and can be rolled, and broad pools match at least one species.
    pub fn validate(&self, catalog: &dyn SpeciesCatalog) -> Result<(), GameError> {
        if self.boxes.is_empty() {
            return Err(GameError::Config(format!("event {} has no boxes", self.key)));
        }
        for spec in &self.boxes {
            for e in spec.table.entries() {
                if let BoxReward::Creature(pool) = e.kind {
                    if self.pool(pool).is_none() {
                        return Err(GameError::Config(format!(
                            "{} rewards draw from undefined pool {:?}",
                            spec.name, pool
                        )));
                    }
                }
            }
        }
        for pool in &self.pools {
            self.validate_pool(pool, catalog)?;
        }
        if let Some(rules) = self.bingo {
            if self.box_spec(rules.box_kind).is_none() {
                return Err(GameError::Config(format!(
                    "bingo pays {} boxes, which event {} does not have",
                    rules.box_kind.slug(),
                    self.key
                )));
            }
            for pool in [rules.third_pool, rules.blackout_pool] {
                if self.pool(pool).is_none() {
                    return Err(GameError::Config(format!(
                        "bingo draws from undefined pool {:?}",
                        pool
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_pool(&self, pool: &PoolSpec, catalog: &dyn SpeciesCatalog) -> Result<(), GameError> {
        let listed: Vec<SpeciesId> = match &pool.source {
            PoolSource::Fixed(ids) | PoolSource::Bundle(ids) => ids.clone(),
            PoolSource::Weighted(pairs) => {
                let weights: Vec<f64> = pairs.iter().map(|(_, w)| *w).collect();
                weighted_index(&weights).map_err(|e| {
                    GameError::Config(format!("pool {:?} weights: {}", pool.id, e))
                })?;
                pairs.iter().map(|(id, _)| *id).collect()
            }
            PoolSource::Rare | PoolSource::Catchable => {
                let rare_only = matches!(pool.source, PoolSource::Rare);
                if catchable_pool(catalog, rare_only).is_empty() {
                    return Err(GameError::Config(format!(
                        "pool {:?} matches no catchable species with moves",
                        pool.id
                    )));
                }
                Vec::new()
            }
        };
        if listed.is_empty() && !matches!(pool.source, PoolSource::Rare | PoolSource::Catchable) {
            return Err(GameError::Config(format!("pool {:?} lists no species", pool.id)));
        }
        for id in listed {
            let species = catalog.by_id(id).ok_or_else(|| {
                GameError::Config(format!("pool {:?} names unknown species {}", pool.id, id))
            })?;
            check_species(species)?;
        }
        self.pool_options(pool)
            .validate()
            .map_err(|e| GameError::Config(format!("pool {:?}: {}", pool.id, e)))
    }

    fn pool_options(&self, pool: &PoolSpec) -> CreatureOptions {
        let options = CreatureOptions::with_boost(pool.shiny_boost).with_level(self.level);
        if pool.force_shiny {
            options.shiny()
        } else {
            options
        }
    }
}

/// Catchable species with a moveset, optionally only legendaries, mythicals and ultra beasts.
fn catchable_pool(catalog: &dyn SpeciesCatalog, rare_only: bool) -> Vec<&Species> {
    catalog
        .catchable()
        .into_iter()
        .filter(|s| !s.moves.is_empty() && (!rare_only || s.rarity.is_rare()))
        .collect()
}

/// Outcome of a box or shop command. `Rejected` carries the reply and means nothing was written.
#[derive(Debug, Clone, PartialEq)]
pub enum OpenOutcome {
    Rejected(String),
    Opened {
        title: String,
        rewards: Vec<RewardDescriptor>,
        completions: Vec<QuestCompletion>,
        /// Bingo payouts triggered by quests the opening completed.
        bingo: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResetOutcome {
    Rejected(String),
    Reset { boards_completed: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuyOutcome {
    Rejected(String),
    Bought {
        qty: i64,
        spent: i64,
        community_total: i64,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchOutcome {
    pub catches: i64,
    pub box_awarded: Option<BoxKind>,
    pub message: Option<String>,
}

/// A planned box roll before anything is written.
enum Slot<'a> {
    Ready(RewardDescriptor),
    Creature(Vec<(&'a Species, CreatureOptions)>),
}

#[derive(Clone)]
pub struct EventCog {
    spec: Arc<EventSpec>,
    store: Arc<dyn MemberStore>,
    catalog: Arc<dyn SpeciesCatalog>,
    factory: CreatureFactory,
    quests: QuestEngine,
}

impl EventCog {
    pub fn new(
        spec: EventSpec,
        store: Arc<dyn MemberStore>,
        catalog: Arc<dyn SpeciesCatalog>,
        factory: CreatureFactory,
        quests: QuestEngine,
    ) -> Result<Self, GameError> {
        spec.validate(catalog.as_ref())?;
        info!("event {} loaded with {} box kind(s)", spec.key, spec.boxes.len());
        Ok(Self {
            spec: Arc::new(spec),
            store,
            catalog,
            factory,
            quests,
        })
    }

    pub fn spec(&self) -> &EventSpec {
        &self.spec
    }

    /// Box kind used when a command names none: the event's only kind, if it has one.
    pub fn default_box(&self) -> Option<BoxKind> {
        match self.spec.boxes.as_slice() {
            [only] => Some(only.kind),
            _ => None,
        }
    }

    pub async fn open_boxes(
        &self,
        player: PlayerId,
        kind: BoxKind,
        qty: i64,
    ) -> Result<OpenOutcome, GameError> {
        let Some(spec) = self.spec.box_spec(kind) else {
            return Ok(OpenOutcome::Rejected(format!(
                "There are no {} boxes in this event.",
                kind.slug()
            )));
        };
        if qty <= 0 {
            return Ok(OpenOutcome::Rejected("Nice try...".to_string()));
        }
        if qty > MAX_OPEN_PER_COMMAND {
            return Ok(OpenOutcome::Rejected(format!(
                "You can only open up to {} {} at once!",
                MAX_OPEN_PER_COMMAND, spec.plural
            )));
        }
        let not_enough = || {
            OpenOutcome::Rejected(format!("You don't have enough {} to do that!", spec.plural))
        };
        match self.store.get(player).await? {
            Some(record) if record.boxes.get(kind) >= qty => {}
            _ => return Ok(not_enough()),
        }

        let (slots, payout) = self.plan(spec, qty as usize)?;
        let requests: Vec<(&Species, CreatureOptions)> = slots
            .iter()
            .filter_map(|s| match s {
                Slot::Creature(batch) => Some(batch.iter().cloned()),
                Slot::Ready(_) => None,
            })
            .flatten()
            .collect();
        let rolled = self.factory.roll_batch(player, &requests).await?;

        // The guard is re-checked against the live document; a racing open can still win.
        let spend = MemberUpdate::new()
            .guard(Guard::AtLeast(Field::Boxes(kind), qty))
            .increment(Field::Boxes(kind), -qty)
            .increment(Field::BoxesOpened(kind), qty)
            .merge(payout);
        if self.store.update(player, &spend).await? == 0 {
            return Ok(not_enough());
        }
        if let Err(e) = self.store.insert_creatures(&rolled).await {
            self.undo(player, &spend, "box opening").await;
            return Err(e);
        }

        let mut creatures = rolled.iter();
        let mut rewards = Vec::with_capacity(slots.len());
        for slot in slots {
            match slot {
                Slot::Ready(descriptor) => rewards.push(descriptor),
                Slot::Creature(batch) => {
                    for (species, _) in batch {
                        let made = creatures.next().ok_or_else(|| {
                            GameError::Internal("creature batch shorter than planned".to_string())
                        })?;
                        rewards.push(describe_creature(species, made));
                    }
                }
            }
        }
        debug!(
            "player {} opened {} {} ({} creature(s))",
            player,
            qty,
            spec.plural,
            requests.len()
        );

        // The boxes are opened and paid for; quest follow-ups must not turn that into an error.
        let completions = match self
            .quests
            .on_event(player, QuestEvent::OpenBox, &[], qty as u32)
            .await
        {
            Ok(done) => done,
            Err(e) => {
                warn!("open-box quest progress for {} failed: {}", player, e);
                Vec::new()
            }
        };
        let bingo = match self.settle_bingos(player).await {
            Ok(lines) => lines,
            Err(e) => {
                warn!("bingo check for {} failed: {}", player, e);
                Vec::new()
            }
        };

        Ok(OpenOutcome::Opened {
            title: format!("Opening {} {}...", qty, spec.label(qty)),
            rewards,
            completions,
            bingo,
        })
    }

    /// Reverse a committed counter-only write after a later step failed.
    async fn undo(&self, player: PlayerId, committed: &MemberUpdate, what: &str) {
        let Some(undo) = committed.inverse() else {
            error!("{} for {} cannot be undone automatically", what, player);
            return;
        };
        match self.store.update(player, &undo).await {
            Ok(_) => warn!("rolled back {} for {} after a failed insert", what, player),
            Err(e) => error!("rolling back {} for {} failed: {}", what, player, e),
        }
    }

    /// Roll every reward for `qty` boxes. Currency is collected into one update; creatures
    /// are planned but not yet rolled.
    fn plan<'a>(
        &'a self,
        spec: &BoxSpec,
        qty: usize,
    ) -> Result<(Vec<Slot<'a>>, MemberUpdate), GameError> {
        let mut rng = rand::thread_rng();
        let mut payout = MemberUpdate::new();
        let mut slots = Vec::with_capacity(qty);
        for rolled in spec.table.draw(&mut rng, qty) {
            match rolled.kind {
                BoxReward::Currency(currency) => {
                    let amount = rolled.amount as i64;
                    payout = payout.increment(Field::Currency(currency), amount);
                    slots.push(Slot::Ready(RewardDescriptor::Currency { currency, amount }));
                }
                BoxReward::Creature(pool_id) => {
                    slots.push(Slot::Creature(self.pool_requests(&mut rng, pool_id)?));
                }
            }
        }
        Ok((slots, payout))
    }

    /// Species and options for one draw from `pool_id`.
    fn pool_requests<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        pool_id: PoolId,
    ) -> Result<Vec<(&Species, CreatureOptions)>, GameError> {
        let pool = self
            .spec
            .pool(pool_id)
            .ok_or_else(|| GameError::Config(format!("undefined creature pool {:?}", pool_id)))?;
        let options = self.spec.pool_options(pool);
        Ok(self
            .draw_species(rng, &pool.source)?
            .into_iter()
            .map(|sp| (sp, options.clone()))
            .collect())
    }

    fn draw_species<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        source: &PoolSource,
    ) -> Result<Vec<&Species>, GameError> {
        match source {
            PoolSource::Fixed(ids) => {
                let id = ids
                    .choose(rng)
                    .ok_or_else(|| GameError::Config("empty species pool".to_string()))?;
                Ok(vec![self.catalog.require(*id)?])
            }
            PoolSource::Weighted(pairs) => {
                let weights: Vec<f64> = pairs.iter().map(|(_, w)| *w).collect();
                let (id, _) = pairs[weighted_index(&weights)?.sample(rng)];
                Ok(vec![self.catalog.require(id)?])
            }
            PoolSource::Bundle(ids) => ids.iter().map(|id| self.catalog.require(*id)).collect(),
            PoolSource::Rare | PoolSource::Catchable => {
                let pool = catchable_pool(self.catalog.as_ref(), matches!(source, PoolSource::Rare));
                if pool.is_empty() {
                    return Err(GameError::Config(format!(
                        "no catchable species for {:?} pool",
                        source
                    )));
                }
                let weights: Vec<f64> = pool.iter().map(|s| s.abundance as f64 + 1.0).collect();
                Ok(vec![pool[weighted_index(&weights)?.sample(rng)]])
            }
        }
    }

    pub fn has_bingo(&self) -> bool {
        self.spec.bingo.is_some()
    }

    /// Deal a card if the event runs bingo and the player has none yet.
    pub async fn ensure_card(&self, player: PlayerId) -> Result<(), GameError> {
        if self.has_bingo() && self.quests.deal_card(player).await? {
            debug!("dealt a bingo card to {}", player);
        }
        Ok(())
    }

    /// The player's card, dealing one first if needed. Empty when the event has no bingo.
    pub async fn card(&self, player: PlayerId) -> Result<Vec<QuestRecord>, GameError> {
        if !self.has_bingo() {
            return Ok(Vec::new());
        }
        self.ensure_card(player).await?;
        let record = self.store.require(player).await?;
        Ok(record.quests_of(Cadence::Card).cloned().collect())
    }

    /// The card as display lines: grid, line count and every square's quest.
    pub async fn card_lines(&self, player: PlayerId) -> Result<Vec<String>, GameError> {
        if !self.has_bingo() {
            return Ok(vec!["This event has no bingo card.".to_string()]);
        }
        let card = self.card(player).await?;
        let record = self.store.require(player).await?;
        let refs: Vec<&QuestRecord> = card.iter().collect();
        let done = bingo::filled(&refs);

        let mut lines = vec![format!("**Bingo card #{}**", record.boards_completed + 1)];
        lines.extend(bingo::render_grid(&done));
        lines.push(format!(
            "Bingos: {}/{}",
            bingo::count_bingos(&done),
            BINGOS_PER_CARD
        ));
        for (slot, quest) in card.iter().enumerate() {
            let mark = if done[slot] { "✅" } else { "▫️" };
            lines.push(format!(
                "{} {} {} ({}/{})",
                mark,
                bingo::slot_label(slot),
                quest.description,
                quest.progress.min(quest.count),
                quest.count
            ));
        }
        lines.push(
            "Every row, column and diagonal pays a bingo. Fill the whole card, then use `reset` \
             for a new one."
                .to_string(),
        );
        Ok(lines)
    }

    /// Pay every line finished on the card since the last payout.
    ///
    /// Creatures are rolled before anything is paid. The payout write is pinned to the
    /// `bingos_awarded` value it was computed from, so two handlers settling the same card
    /// cannot both pay a line.
    pub async fn settle_bingos(&self, player: PlayerId) -> Result<Vec<String>, GameError> {
        let Some(rules) = self.spec.bingo else {
            return Ok(Vec::new());
        };
        let Some(record) = self.store.get(player).await? else {
            return Ok(Vec::new());
        };
        let card: Vec<&QuestRecord> = record.quests_of(Cadence::Card).collect();
        let bingos = bingo::count_bingos(&bingo::filled(&card));
        let awarded = record.bingos_awarded;
        if bingos <= awarded {
            return Ok(Vec::new());
        }
        let fresh = bingos - awarded;

        let mut milestones = Vec::new();
        if (awarded..bingos).contains(&2) {
            milestones.push((rules.third_pool, "Since this is your third Bingo, you have received"));
        }
        if bingos == BINGOS_PER_CARD {
            milestones.push((
                rules.blackout_pool,
                "Since you've completed all bingos on your card, you have received",
            ));
        }
        let mut requests = Vec::new();
        let mut bonuses = Vec::new();
        {
            let mut rng = rand::thread_rng();
            for (pool, bonus) in milestones {
                let drawn = self.pool_requests(&mut rng, pool)?;
                bonuses.extend(drawn.iter().map(|_| bonus));
                requests.extend(drawn);
            }
        }
        let rolled = self.factory.roll_batch(player, &requests).await?;

        let coins = rules.coins.saturating_mul(fresh);
        let award = MemberUpdate::new()
            .guard(Guard::Equals(Field::BingosAwarded, awarded))
            .set(SetField::Counter(Field::BingosAwarded, bingos))
            .increment(Field::Boxes(rules.box_kind), fresh)
            .increment(Field::Currency(Currency::Pokecoins), coins);
        if self.store.update(player, &award).await? == 0 {
            debug!("bingos for {} were settled concurrently", player);
            return Ok(Vec::new());
        }
        if let Err(e) = self.store.insert_creatures(&rolled).await {
            let undo = MemberUpdate::new()
                .guard(Guard::Equals(Field::BingosAwarded, bingos))
                .set(SetField::Counter(Field::BingosAwarded, awarded))
                .increment(Field::Boxes(rules.box_kind), -fresh)
                .increment(Field::Currency(Currency::Pokecoins), -coins);
            match self.store.update(player, &undo).await {
                Ok(_) => warn!("rolled back bingo payout for {} after a failed insert", player),
                Err(undo_err) => {
                    error!("rolling back bingo payout for {} failed: {}", player, undo_err)
                }
            }
            return Err(e);
        }
        info!(
            "player {} finished {} bingo(s), {} of {} on the card",
            player, fresh, bingos, BINGOS_PER_CARD
        );

        let box_name = self
            .spec
            .box_spec(rules.box_kind)
            .map(|b| b.name.clone())
            .unwrap_or_else(|| format!("{} box", rules.box_kind.slug()));
        let mut lines: Vec<String> = (0..fresh)
            .map(|_| {
                format!(
                    "You have completed a Bingo and received {} **{}** and **{}**!",
                    article(&box_name),
                    box_name,
                    Currency::Pokecoins.format_amount(rules.coins)
                )
            })
            .collect();
        for ((species, _), (made, bonus)) in requests.iter().zip(rolled.iter().zip(bonuses)) {
            lines.push(format!(
                "{} **{}**!",
                bonus,
                describe_creature(species, made).describe()
            ));
        }
        Ok(lines)
    }

    /// Start a new card once every line on the current one has been paid.
    pub async fn reset_card(&self, player: PlayerId) -> Result<ResetOutcome, GameError> {
        if !self.has_bingo() {
            return Ok(ResetOutcome::Rejected(
                "This event has no bingo card.".to_string(),
            ));
        }
        let full = || ResetOutcome::Rejected("You must have a full card to do this!".to_string());
        let alongside = MemberUpdate::new()
            .guard(Guard::Equals(Field::BingosAwarded, BINGOS_PER_CARD))
            .set(SetField::Counter(Field::BingosAwarded, 0))
            .increment(Field::BoardsCompleted, 1);
        if !self.quests.redeal_card(player, alongside).await? {
            return Ok(full());
        }
        let record = self.store.require(player).await?;
        info!(
            "player {} reset their bingo card ({} completed)",
            player, record.boards_completed
        );
        Ok(ResetOutcome::Reset {
            boards_completed: record.boards_completed,
        })
    }

    pub async fn buy_boxes(
        &self,
        player: PlayerId,
        kind: BoxKind,
        qty: i64,
    ) -> Result<BuyOutcome, GameError> {
        let Some(spec) = self.spec.box_spec(kind) else {
            return Ok(BuyOutcome::Rejected(format!(
                "There are no {} boxes in this event.",
                kind.slug()
            )));
        };
        let Some(cost) = spec.cost else {
            return Ok(BuyOutcome::Rejected(format!(
                "{} can't be bought.",
                spec.plural
            )));
        };
        if qty <= 0 {
            return Ok(BuyOutcome::Rejected("Nice try...".to_string()));
        }
        let Some(total) = cost.checked_mul(qty) else {
            return Ok(BuyOutcome::Rejected("That's far too many boxes.".to_string()));
        };

        let purchase = MemberUpdate::new()
            .guard(Guard::AtLeast(Field::EventCoins, total))
            .increment(Field::EventCoins, -total)
            .increment(Field::Boxes(kind), qty);
        if self.store.update(player, &purchase).await? == 0 {
            return Ok(BuyOutcome::Rejected(
                "You don't have enough coins for that!".to_string(),
            ));
        }
        let community_total = self
            .store
            .increment_counter(&self.spec.community_counter, total)
            .await?;
        info!("player {} bought {} {} for {}", player, qty, spec.plural, total);
        Ok(BuyOutcome::Bought {
            qty,
            spent: total,
            community_total,
            message: format!(
                "You purchased {}x {} for 🪙 {}! Open with `open {}`.",
                qty,
                spec.name,
                group_thousands(total),
                kind.slug()
            ),
        })
    }

    /// Count a catch and award a box whenever the running total hits a multiple of the drop
    /// interval.
    pub async fn record_catch(&self, player: PlayerId) -> Result<CatchOutcome, GameError> {
        let outcome = self
            .store
            .find_and_update(player, &MemberUpdate::new().increment(Field::Catches, 1))
            .await?
            .ok_or_else(|| GameError::NotFound(format!("player {}", player)))?;
        let catches = outcome.after.catches;

        let Some(drop) = self.spec.catch_drop else {
            return Ok(CatchOutcome {
                catches,
                box_awarded: None,
                message: None,
            });
        };
        if drop.every <= 0 || catches % drop.every != 0 {
            return Ok(CatchOutcome {
                catches,
                box_awarded: None,
                message: None,
            });
        }
        self.store
            .update(player, &MemberUpdate::new().increment(Field::Boxes(drop.kind), 1))
            .await?;
        let name = self
            .spec
            .box_spec(drop.kind)
            .map(|b| b.name.clone())
            .unwrap_or_else(|| format!("{} box", drop.kind.slug()));
        Ok(CatchOutcome {
            catches,
            box_awarded: Some(drop.kind),
            message: Some(format!("You've earned a {}! Use `open` to open it.", name)),
        })
    }

    pub async fn add_boxes(
        &self,
        player: PlayerId,
        kind: BoxKind,
        n: i64,
    ) -> Result<bool, GameError> {
        let update = MemberUpdate::new().increment(Field::Boxes(kind), n);
        Ok(self.store.update(player, &update).await? > 0)
    }

    pub async fn add_coins(&self, player: PlayerId, n: i64) -> Result<bool, GameError> {
        let update = MemberUpdate::new().increment(Field::EventCoins, n);
        Ok(self.store.update(player, &update).await? > 0)
    }

    /// Event overview lines for one player.
    pub async fn overview(&self, player: PlayerId) -> Result<Vec<String>, GameError> {
        let record = self.store.require(player).await?;
        let mut lines = vec![
            format!("**{}**", self.spec.title),
            self.spec.blurb.clone(),
        ];
        for spec in &self.spec.boxes {
            let owned = record.boxes.get(spec.kind);
            let opened = record.boxes_opened.get(spec.kind);
            let price = spec
                .cost
                .map(|c| format!(" (🪙 {} each)", c))
                .unwrap_or_default();
            lines.push(format!(
                "{}: {} owned, {} opened{}",
                spec.plural,
                group_thousands(owned),
                group_thousands(opened),
                price
            ));
        }
        if self.spec.boxes.iter().any(|b| b.cost.is_some()) {
            lines.push(format!("Coins: 🪙 {}", group_thousands(record.event_coins)));
            let community = self.store.counter(&self.spec.community_counter).await?;
            lines.push(format!(
                "Community coins spent: 🪙 {}",
                group_thousands(community)
            ));
        }
        if let Some(drop) = self.spec.catch_drop {
            lines.push(format!(
                "Catches toward next box: {}/{}",
                record.catches.rem_euclid(drop.every.max(1)),
                drop.every
            ));
        }
        Ok(lines)
    }
}

fn describe_creature(species: &Species, made: &Creature) -> RewardDescriptor {
    RewardDescriptor::Creature {
        species_id: species.id,
        species: species.name.clone(),
        idx: made.idx,
        level: made.level,
        shiny: made.shiny,
        iv_percent: made.ivs.percentage(),
    }
}

fn article(noun: &str) -> &'static str {
    match noun.chars().next().map(|c| c.to_ascii_lowercase()) {
        Some('a' | 'e' | 'i' | 'o' | 'u') => "an",
        _ => "a",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::catalog::StaticCatalog;

    #[test]
    fn presets_build() {
        for preset in [
            EventPreset::Easter2024,
            EventPreset::Valentines2024,
            EventPreset::Christmas2022,
        ] {
            let spec = preset.spec().unwrap().unwrap();
            assert!(!spec.boxes.is_empty());
            for b in &spec.boxes {
                for e in b.table.entries() {
                    if let BoxReward::Creature(pool) = e.kind {
                        assert!(spec.pool(pool).is_some(), "{} missing {:?}", spec.key, pool);
                    }
                }
            }
        }
        assert!(EventPreset::None.spec().unwrap().is_none());

        let easter = EventSpec::easter_2024().unwrap().bingo.unwrap();
        assert_eq!(easter.coins, 5_000);
        assert_eq!(easter.third_pool, PoolId::Special);
        assert_eq!(easter.blackout_pool, PoolId::Blackout);
        assert!(EventSpec::christmas_2022().unwrap().bingo.is_none());
    }

    const SMALL_CATALOG: &str = r#"[
        {"id": 25, "name": "Pikachu", "dex_number": 25, "types": ["Electric"],
         "region": "kanto", "rarity": "common",
         "gender_ratio": {"split": {"male_percent": 50.0}},
         "moves": [{"move_id": 84, "level": 1}]},
        {"id": 132, "name": "Ditto", "dex_number": 132, "types": ["Normal"],
         "region": "kanto", "rarity": "common", "gender_ratio": "genderless"}
    ]"#;

    fn one_pool_event(source: PoolSource) -> EventSpec {
        EventSpec {
            key: "test".to_string(),
            title: "Test".to_string(),
            blurb: String::new(),
            boxes: vec![BoxSpec::new(
                BoxKind::Event,
                "Box",
                "Boxes",
                None,
                vec![creature(PoolId::Event, 1.0)],
            )
            .unwrap()],
            pools: vec![PoolSpec::new(PoolId::Event, source)],
            level: LevelSpec::GENERAL,
            catch_drop: None,
            quest_box: None,
            community_counter: "test".to_string(),
            bingo: None,
        }
    }

    #[test]
    fn listed_pools_must_name_rollable_species() {
        let catalog = StaticCatalog::from_json_str(SMALL_CATALOG).unwrap();
        assert!(one_pool_event(PoolSource::Fixed(vec![25]))
            .validate(&catalog)
            .is_ok());
        for source in [
            PoolSource::Fixed(vec![132]),
            PoolSource::Fixed(vec![999]),
            PoolSource::Fixed(vec![]),
            PoolSource::Weighted(vec![(25, 1.0), (132, 1.0)]),
            PoolSource::Bundle(vec![25, 132]),
        ] {
            let err = one_pool_event(source.clone()).validate(&catalog);
            assert!(matches!(err, Err(GameError::Config(_))), "{:?} accepted", source);
        }
    }

    #[test]
    fn broad_pools_must_match_something() {
        let catalog = StaticCatalog::from_json_str(SMALL_CATALOG).unwrap();
        assert!(one_pool_event(PoolSource::Catchable).validate(&catalog).is_ok());
        assert!(matches!(
            one_pool_event(PoolSource::Rare).validate(&catalog),
            Err(GameError::Config(_))
        ));
    }

    #[test]
    fn bingo_pools_must_exist() {
        let catalog = StaticCatalog::from_json_str(SMALL_CATALOG).unwrap();
        let mut spec = one_pool_event(PoolSource::Fixed(vec![25]));
        spec.bingo = Some(BingoSpec {
            box_kind: BoxKind::Event,
            coins: 5_000,
            third_pool: PoolId::Event,
            blackout_pool: PoolId::Blackout,
        });
        assert!(spec.validate(&catalog).is_err());
    }

    #[test]
    fn articles_follow_the_first_letter() {
        assert_eq!(article("Easter Egg"), "an");
        assert_eq!(article("Gift Box"), "a");
    }

    #[test]
    fn easter_box_odds_match_weights() {
        let spec = EventSpec::easter_2024().unwrap();
        let eggs = spec.box_spec(BoxKind::Event).unwrap();
        let p = eggs.table.probability(BoxReward::Creature(PoolId::Shiny));
        assert!((p - 0.2 / 100.0).abs() < 1e-12);
        let p = eggs.table.probability(BoxReward::Currency(Currency::Shards));
        assert!((p - 0.30).abs() < 1e-12);
    }

    #[test]
    fn only_christmas_has_a_shop() {
        assert!(EventSpec::easter_2024()
            .unwrap()
            .boxes
            .iter()
            .all(|b| b.cost.is_none()));
        let xmas = EventSpec::christmas_2022().unwrap();
        assert_eq!(xmas.box_spec(BoxKind::Event).unwrap().cost, Some(8));
        assert_eq!(xmas.box_spec(BoxKind::Special).unwrap().cost, None);
    }

    #[test]
    fn preset_names_round_trip_through_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            preset: EventPreset,
        }
        let w: Wrapper = toml::from_str("preset = \"valentines_2024\"").unwrap();
        assert_eq!(w.preset, EventPreset::Valentines2024);
        assert_eq!(w.preset.to_string(), "valentines_2024");
    }
}
