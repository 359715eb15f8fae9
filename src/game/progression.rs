//! Event XP and level rewards.
//!
//! Cumulative XP is the only stored progression state. Level and the remainder inside the
//! current level are always derived from it through [`XpCurve::level_for`], so two grants of
//! `a` and `b` land exactly where one grant of `a + b` would.
//!
//! The curve is a two-regime step function: going from level `n` to `n + 1` costs `base` XP
//! while `n < capped_level` and `extra` XP afterwards. Levels start at 0.
//!
//! A grant is one atomic increment; the pre- and post-image returned by the store decide
//! which levels that particular grant crossed, so concurrent grants never both reward the
//! same level and never lose XP. Reward tables are checked against the species catalog when
//! the ledger is built; a level whose payout still fails is reported and the remaining levels
//! are paid regardless.

use std::sync::Arc;

use log::{debug, error, info};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use super::catalog::SpeciesCatalog;
use super::creature::{check_species, CreatureFactory, CreatureOptions, LevelSpec};
use super::errors::GameError;
use super::reward::RewardDescriptor;
use super::storage::{Guard, MemberStore, MemberUpdate};
use super::types::{BoxKind, Currency, Field, PlayerId, Rarity, Species, SpeciesId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpCurve {
    pub base: u64,
    pub extra: u64,
    pub capped_level: u32,
}

impl Default for XpCurve {
    fn default() -> Self {
        Self {
            base: 1000,
            extra: 500,
            capped_level: 50,
        }
    }
}

/// Level derived from cumulative XP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelProgress {
    pub level: u32,
    pub xp_into_level: u64,
    pub xp_to_next: u64,
}

impl XpCurve {
    pub fn new(base: u64, extra: u64, capped_level: u32) -> Result<Self, GameError> {
        let curve = Self {
            base,
            extra,
            capped_level,
        };
        curve.validate()?;
        Ok(curve)
    }

    pub fn validate(&self) -> Result<(), GameError> {
        if self.base == 0 || self.extra == 0 {
            return Err(GameError::Config(
                "XP curve needs a non-zero cost for every level".to_string(),
            ));
        }
        Ok(())
    }

    /// XP needed to go from `level` to `level + 1`.
    pub fn requirement(&self, level: u32) -> u64 {
        if level < self.capped_level {
            self.base
        } else {
            self.extra
        }
    }

    /// Cumulative XP at which `level` is reached.
    pub fn threshold(&self, level: u32) -> u64 {
        let capped = level.min(self.capped_level) as u64;
        let beyond = level.saturating_sub(self.capped_level) as u64;
        capped
            .saturating_mul(self.base)
            .saturating_add(beyond.saturating_mul(self.extra))
    }

    pub fn level_for(&self, xp: i64) -> LevelProgress {
        let xp = xp.max(0) as u64;
        let cap_xp = self.threshold(self.capped_level);
        let (level, into) = if xp < cap_xp {
            ((xp / self.base) as u32, xp % self.base)
        } else {
            let past = xp - cap_xp;
            (
                self.capped_level + (past / self.extra) as u32,
                past % self.extra,
            )
        };
        LevelProgress {
            level,
            xp_into_level: into,
            xp_to_next: self.requirement(level) - into,
        }
    }
}

/// Reward granted on reaching a level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LevelReward {
    Currency {
        currency: Currency,
        amount: i64,
    },
    Creature {
        species_id: SpeciesId,
        #[serde(default)]
        shiny: bool,
        #[serde(default)]
        min_iv_percent: f64,
    },
    RandomCreature {
        rarity: Rarity,
        #[serde(default = "default_boost")]
        shiny_boost: f64,
    },
    Badge {
        badge: String,
    },
    Boxes {
        box_kind: BoxKind,
        amount: i64,
    },
}

fn default_boost() -> f64 {
    1.0
}

impl LevelReward {
    /// Checks that need no species data.
    pub fn check_shape(&self) -> Result<(), GameError> {
        match self {
            LevelReward::Currency { amount, .. } | LevelReward::Boxes { amount, .. }
                if *amount < 0 =>
            {
                Err(GameError::Config(format!(
                    "level reward amount cannot be negative ({})",
                    amount
                )))
            }
            LevelReward::Creature { min_iv_percent, .. }
                if !(0.0..=100.0).contains(min_iv_percent) =>
            {
                Err(GameError::Config(format!(
                    "level reward IV floor {} is outside 0..=100",
                    min_iv_percent
                )))
            }
            LevelReward::RandomCreature { shiny_boost, .. }
                if !shiny_boost.is_finite() || *shiny_boost <= 0.0 =>
            {
                Err(GameError::Config(format!(
                    "level reward shiny boost must be positive, got {}",
                    shiny_boost
                )))
            }
            LevelReward::Badge { badge } if badge.trim().is_empty() => Err(GameError::Config(
                "level reward badge name is empty".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Shape checks plus every species the reward can produce.
    pub fn validate(&self, catalog: &dyn SpeciesCatalog) -> Result<(), GameError> {
        self.check_shape()?;
        match self {
            LevelReward::Creature { species_id, .. } => {
                let species = catalog.by_id(*species_id).ok_or_else(|| {
                    GameError::Config(format!("level reward names unknown species {}", species_id))
                })?;
                check_species(species)
            }
            LevelReward::RandomCreature { rarity, .. } => {
                if catalog.by_rarity(*rarity).iter().any(|s| !s.moves.is_empty()) {
                    Ok(())
                } else {
                    Err(GameError::Config(format!(
                        "no {} species to reward",
                        rarity.name()
                    )))
                }
            }
            _ => Ok(()),
        }
    }
}

/// Rewards for levels `1..=N` followed by a repeating fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelRewardTable {
    #[serde(default)]
    pub rewards: Vec<LevelReward>,
    pub fallback: LevelReward,
}

impl Default for LevelRewardTable {
    fn default() -> Self {
        Self {
            rewards: Vec::new(),
            fallback: LevelReward::Currency {
                currency: Currency::Redeems,
                amount: 1,
            },
        }
    }
}

impl LevelRewardTable {
    pub fn check_shape(&self) -> Result<(), GameError> {
        self.entries().try_for_each(|(level, reward)| {
            reward
                .check_shape()
                .map_err(|e| GameError::Config(format!("{}: {}", level, e)))
        })
    }

    pub fn validate(&self, catalog: &dyn SpeciesCatalog) -> Result<(), GameError> {
        self.entries().try_for_each(|(level, reward)| {
            reward
                .validate(catalog)
                .map_err(|e| GameError::Config(format!("{}: {}", level, e)))
        })
    }

    fn entries(&self) -> impl Iterator<Item = (String, &LevelReward)> {
        self.rewards
            .iter()
            .enumerate()
            .map(|(i, r)| (format!("level {}", i + 1), r))
            .chain(std::iter::once(("fallback".to_string(), &self.fallback)))
    }

    pub fn reward_for(&self, level: u32) -> &LevelReward {
        level
            .checked_sub(1)
            .and_then(|i| self.rewards.get(i as usize))
            .unwrap_or(&self.fallback)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevelGrant {
    pub level: u32,
    pub reward: RewardDescriptor,
}

/// A crossed level whose reward could not be delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelFailure {
    pub level: u32,
    pub reward: LevelReward,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevelUpReport {
    pub player_id: PlayerId,
    pub xp_added: i64,
    pub before: LevelProgress,
    pub after: LevelProgress,
    /// Paid levels, ascending. Together with `failed` there is one entry per level crossed.
    pub grants: Vec<LevelGrant>,
    pub failed: Vec<LevelFailure>,
}

impl LevelUpReport {
    pub fn levels_gained(&self) -> u32 {
        self.after.level - self.before.level
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .grants
            .iter()
            .map(|g| format!("Level {} reached! You received {}.", g.level, g.reward.describe()))
            .collect();
        lines.extend(self.failed.iter().map(|f| {
            format!(
                "Level {} reached, but its reward could not be delivered. Please contact staff.",
                f.level
            )
        }));
        lines
    }
}

#[derive(Clone)]
pub struct ProgressionLedger {
    store: Arc<dyn MemberStore>,
    catalog: Arc<dyn SpeciesCatalog>,
    factory: CreatureFactory,
    curve: XpCurve,
    rewards: Arc<LevelRewardTable>,
}

impl ProgressionLedger {
    pub fn new(
        store: Arc<dyn MemberStore>,
        catalog: Arc<dyn SpeciesCatalog>,
        factory: CreatureFactory,
        curve: XpCurve,
        rewards: LevelRewardTable,
    ) -> Result<Self, GameError> {
        curve.validate()?;
        rewards.validate(catalog.as_ref())?;
        Ok(Self {
            store,
            catalog,
            factory,
            curve,
            rewards: Arc::new(rewards),
        })
    }

    pub fn curve(&self) -> &XpCurve {
        &self.curve
    }

    pub async fn progress_of(&self, player: PlayerId) -> Result<LevelProgress, GameError> {
        let record = self.store.require(player).await?;
        Ok(self.curve.level_for(record.xp))
    }

    /// Add XP and pay every level crossed.
    pub async fn grant_xp(&self, player: PlayerId, amount: i64) -> Result<LevelUpReport, GameError> {
        match self.grant_xp_with(player, amount, MemberUpdate::new()).await? {
            Some(report) => Ok(report),
            None => {
                let record = self.store.require(player).await?;
                let now = self.curve.level_for(record.xp);
                Ok(LevelUpReport {
                    player_id: player,
                    xp_added: 0,
                    before: now,
                    after: now,
                    grants: Vec::new(),
                    failed: Vec::new(),
                })
            }
        }
    }

    /// Add XP in the same atomic write as `alongside`. Returns `None` when nothing was
    /// written (a guard in `alongside` failed, or there was nothing to do).
    pub async fn grant_xp_with(
        &self,
        player: PlayerId,
        amount: i64,
        alongside: MemberUpdate,
    ) -> Result<Option<LevelUpReport>, GameError> {
        if amount < 0 {
            return Err(GameError::InvalidInput(format!(
                "cannot grant negative XP ({})",
                amount
            )));
        }
        let update = alongside.increment(Field::Xp, amount);
        let outcome = self
            .store
            .find_and_update(player, &update)
            .await?
            .ok_or_else(|| GameError::NotFound(format!("player {}", player)))?;
        if !outcome.modified {
            return Ok(None);
        }

        let before = self.curve.level_for(outcome.before.xp);
        let after = self.curve.level_for(outcome.after.xp);
        let mut grants = Vec::new();
        let mut failed = Vec::new();
        // The XP is committed; every crossed level gets its attempt.
        for level in (before.level + 1)..=after.level {
            let reward = self.rewards.reward_for(level).clone();
            match self.materialize(player, &reward).await {
                Ok(granted) => grants.push(LevelGrant {
                    level,
                    reward: granted,
                }),
                Err(e) => {
                    error!(
                        "player {} reached level {} but {:?} failed: {}",
                        player, level, reward, e
                    );
                    failed.push(LevelFailure {
                        level,
                        reward,
                        error: e.to_string(),
                    });
                }
            }
        }
        if !grants.is_empty() {
            info!(
                "player {} went from level {} to {} ({} reward(s))",
                player,
                before.level,
                after.level,
                grants.len()
            );
        } else {
            debug!("player {} +{} xp (level {})", player, amount, after.level);
        }
        Ok(Some(LevelUpReport {
            player_id: player,
            xp_added: amount,
            before,
            after,
            grants,
            failed,
        }))
    }

    async fn materialize(
        &self,
        player: PlayerId,
        reward: &LevelReward,
    ) -> Result<RewardDescriptor, GameError> {
        match reward {
            LevelReward::Currency { currency, amount } => {
                self.store
                    .update(
                        player,
                        &MemberUpdate::new().increment(Field::Currency(*currency), *amount),
                    )
                    .await?;
                Ok(RewardDescriptor::Currency {
                    currency: *currency,
                    amount: *amount,
                })
            }
            LevelReward::Boxes { box_kind, amount } => {
                self.store
                    .update(
                        player,
                        &MemberUpdate::new().increment(Field::Boxes(*box_kind), *amount),
                    )
                    .await?;
                Ok(RewardDescriptor::Boxes {
                    kind: *box_kind,
                    amount: *amount,
                })
            }
            LevelReward::Badge { badge } => {
                let update = MemberUpdate::new()
                    .guard(Guard::BadgeAbsent(badge.clone()))
                    .add_badge(badge.clone());
                let modified = self.store.update(player, &update).await?;
                Ok(RewardDescriptor::Badge {
                    badge: badge.clone(),
                    newly_granted: modified > 0,
                })
            }
            LevelReward::Creature {
                species_id,
                shiny,
                min_iv_percent,
            } => {
                let species = self.catalog.require(*species_id)?;
                let mut options = CreatureOptions::default()
                    .with_min_iv(*min_iv_percent)
                    .with_level(LevelSpec::GENERAL);
                if *shiny {
                    options = options.shiny();
                }
                self.make_creature(player, species, &options).await
            }
            LevelReward::RandomCreature { rarity, shiny_boost } => {
                let species = self.pick_species(*rarity)?;
                let options =
                    CreatureOptions::with_boost(*shiny_boost).with_level(LevelSpec::GENERAL);
                self.make_creature(player, species, &options).await
            }
        }
    }

    fn pick_species(&self, rarity: Rarity) -> Result<&Species, GameError> {
        let pool: Vec<&Species> = self
            .catalog
            .by_rarity(rarity)
            .into_iter()
            .filter(|s| !s.moves.is_empty())
            .collect();
        pool.choose(&mut rand::thread_rng())
            .copied()
            .ok_or_else(|| GameError::Config(format!("no {} species to reward", rarity.name())))
    }

    async fn make_creature(
        &self,
        player: PlayerId,
        species: &Species,
        options: &CreatureOptions,
    ) -> Result<RewardDescriptor, GameError> {
        let creature = self.factory.make(player, species, options).await?;
        Ok(RewardDescriptor::Creature {
            species_id: species.id,
            species: species.name.clone(),
            idx: creature.idx,
            level: creature.level,
            shiny: creature.shiny,
            iv_percent: creature.ivs.percentage(),
        })
    }
}
