//! Creature factory.
//!
//! Rolling is pure: [`roll_creature`] takes an RNG, a species, options and the player's shiny
//! modifiers and returns a finished [`Creature`]. [`CreatureFactory`] wraps that with the two
//! store calls a real grant needs: reserving per-owner indices and inserting the result.
//!
//! Individual values with a quality floor are drawn exactly uniformly over every six-tuple in
//! `[0,31]^6` whose sum lies in the requested band, by counting compositions per total
//! instead of rejecting whole tuples. This never loops, even for a 100% floor.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use rand::distributions::Distribution;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::Normal;

use super::clock::Clock;
use super::errors::GameError;
use super::reward::weighted_index;
use super::storage::MemberStore;
use super::types::{
    iv_percent_to_total, Creature, Gender, GenderRatio, Ivs, PlayerId, PlayerRecord, Species,
    CREATURE_SCHEMA_VERSION, MAX_IV, MAX_IV_TOTAL, NATURES,
};

pub const BASE_SHINY_CHANCE: f64 = 1.0 / 4096.0;
pub const SHINY_CHARM_MULTIPLIER: f64 = 1.2;
pub const MAX_STARTING_MOVES: usize = 4;

const IV_SLOTS: usize = 6;

/// Normal level distribution, clamped and floored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelSpec {
    pub mean: f64,
    pub std_dev: f64,
    pub min: u8,
    pub max: u8,
}

impl LevelSpec {
    /// Event rewards: N(20, 10) clamped to 1..=50.
    pub const EVENT: LevelSpec = LevelSpec {
        mean: 20.0,
        std_dev: 10.0,
        min: 1,
        max: 50,
    };

    /// General rewards: N(30, 10) clamped to 1..=100.
    pub const GENERAL: LevelSpec = LevelSpec {
        mean: 30.0,
        std_dev: 10.0,
        min: 1,
        max: 100,
    };

    pub fn fixed(level: u8) -> Self {
        LevelSpec {
            mean: level as f64,
            std_dev: 0.0,
            min: level,
            max: level,
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u8 {
        // A negative spread degenerates to the mean.
        let raw = match Normal::new(self.mean, self.std_dev) {
            Ok(normal) => normal.sample(rng),
            Err(_) => self.mean,
        };
        raw.clamp(self.min as f64, self.max as f64).floor() as u8
    }
}

impl Default for LevelSpec {
    fn default() -> Self {
        LevelSpec::EVENT
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatureOptions {
    /// Multiplier on the base shiny chance. Must be positive.
    pub shiny_boost: f64,
    pub min_iv_percent: f64,
    pub max_iv_percent: f64,
    pub force_shiny: bool,
    pub level: LevelSpec,
}

impl Default for CreatureOptions {
    fn default() -> Self {
        Self {
            shiny_boost: 1.0,
            min_iv_percent: 0.0,
            max_iv_percent: 100.0,
            force_shiny: false,
            level: LevelSpec::EVENT,
        }
    }
}

impl CreatureOptions {
    pub fn with_boost(shiny_boost: f64) -> Self {
        Self {
            shiny_boost,
            ..Self::default()
        }
    }

    pub fn with_min_iv(mut self, percent: f64) -> Self {
        self.min_iv_percent = percent;
        self
    }

    pub fn with_level(mut self, level: LevelSpec) -> Self {
        self.level = level;
        self
    }

    pub fn shiny(mut self) -> Self {
        self.force_shiny = true;
        self
    }

    pub fn validate(&self) -> Result<(), GameError> {
        if !self.shiny_boost.is_finite() || self.shiny_boost <= 0.0 {
            return Err(GameError::InvalidInput(format!(
                "shiny boost must be positive, got {}",
                self.shiny_boost
            )));
        }
        let pct = 0.0..=100.0;
        if !pct.contains(&self.min_iv_percent)
            || !pct.contains(&self.max_iv_percent)
            || self.min_iv_percent > self.max_iv_percent
        {
            return Err(GameError::InvalidInput(format!(
                "invalid IV band {}%..{}%",
                self.min_iv_percent, self.max_iv_percent
            )));
        }
        if self.level.min == 0
            || self.level.min > self.level.max
            || !self.level.mean.is_finite()
            || !self.level.std_dev.is_finite()
            || self.level.std_dev < 0.0
        {
            return Err(GameError::InvalidInput(format!(
                "invalid level spec {:?}",
                self.level
            )));
        }
        Ok(())
    }
}

/// Player-level shiny multipliers in effect for one roll.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShinyModifiers {
    pub charm_active: bool,
    /// Streak of the player's shiny hunt, present only when hunting this species.
    pub hunt_streak: Option<i64>,
}

impl ShinyModifiers {
    pub fn for_player(player: &PlayerRecord, species: &Species, now: DateTime<Utc>) -> Self {
        Self {
            charm_active: player.shiny_charm_active(now),
            hunt_streak: (player.shiny_hunt == Some(species.dex_number))
                .then_some(player.shiny_streak.max(0)),
        }
    }

    pub fn multiplier(&self) -> f64 {
        let mut m = 1.0;
        if self.charm_active {
            m *= SHINY_CHARM_MULTIPLIER;
        }
        if let Some(streak) = self.hunt_streak {
            m *= 1.0 + (streak as f64).sqrt() / 7.0;
        }
        m
    }
}

pub fn shiny_probability(boost: f64, modifiers: &ShinyModifiers) -> f64 {
    BASE_SHINY_CHANCE * boost * modifiers.multiplier()
}

/// A probability at or above 1 is a guarantee.
fn roll_shiny<R: Rng + ?Sized>(rng: &mut R, probability: f64) -> bool {
    probability >= 1.0 || rng.gen::<f64>() < probability
}

pub fn roll_gender<R: Rng + ?Sized>(rng: &mut R, ratio: &GenderRatio) -> Result<Gender, GameError> {
    match *ratio {
        GenderRatio::Genderless => Ok(Gender::Unknown),
        GenderRatio::MaleOnly => Ok(Gender::Male),
        GenderRatio::FemaleOnly => Ok(Gender::Female),
        GenderRatio::Split { male_percent } => {
            if !male_percent.is_finite() || !(0.0..=100.0).contains(&male_percent) {
                return Err(GameError::Config(format!(
                    "invalid male percentage {}",
                    male_percent
                )));
            }
            if rng.gen::<f64>() * 100.0 < male_percent {
                Ok(Gender::Male)
            } else {
                Ok(Gender::Female)
            }
        }
    }
}

/// `table[k][s]` = number of ways `k` values in `[0,31]` sum to `s`.
fn composition_counts() -> Vec<Vec<f64>> {
    let max = MAX_IV_TOTAL as usize;
    let mut table = vec![vec![0.0f64; max + 1]; IV_SLOTS + 1];
    table[0][0] = 1.0;
    for k in 1..=IV_SLOTS {
        for s in 0..=max {
            let top = s.min(MAX_IV as usize);
            let ways: f64 = (0..=top).map(|v| table[k - 1][s - v]).sum();
            table[k][s] = ways;
        }
    }
    table
}

/// Uniform draw over all IV tuples whose total lies in `min_total..=max_total`.
pub fn roll_ivs<R: Rng + ?Sized>(
    rng: &mut R,
    min_total: u32,
    max_total: u32,
) -> Result<Ivs, GameError> {
    let max_total = max_total.min(MAX_IV_TOTAL);
    if min_total > max_total {
        return Err(GameError::InvalidInput(format!(
            "IV total band {}..={} is empty",
            min_total, max_total
        )));
    }
    if min_total == 0 && max_total == MAX_IV_TOTAL {
        let mut values = [0u8; IV_SLOTS];
        for v in values.iter_mut() {
            *v = rng.gen_range(0..=MAX_IV);
        }
        return Ok(Ivs::from_array(values));
    }

    let table = composition_counts();
    let totals: Vec<f64> = (min_total..=max_total)
        .map(|s| table[IV_SLOTS][s as usize])
        .collect();
    let mut remaining = min_total as usize + weighted_index(&totals)?.sample(rng);

    let mut values = [0u8; IV_SLOTS];
    for (slot, value) in values.iter_mut().enumerate() {
        let left_after = IV_SLOTS - slot - 1;
        let top = remaining.min(MAX_IV as usize);
        let weights: Vec<f64> = (0..=top).map(|v| table[left_after][remaining - v]).collect();
        let pick = weighted_index(&weights)?.sample(rng);
        *value = pick as u8;
        remaining -= pick;
    }
    Ok(Ivs::from_array(values))
}

/// Up to four distinct starting moves unlocked at or below `level`.
pub fn roll_moves<R: Rng + ?Sized>(
    rng: &mut R,
    species: &Species,
    level: u8,
) -> Result<Vec<u32>, GameError> {
    if species.moves.is_empty() {
        return Err(GameError::Config(format!(
            "species {} ({}) has no moveset",
            species.id, species.name
        )));
    }
    let mut unlocked: Vec<u32> = species
        .moves
        .iter()
        .filter(|m| m.level <= level)
        .map(|m| m.move_id)
        .collect();
    unlocked.sort_unstable();
    unlocked.dedup();
    Ok(unlocked
        .choose_multiple(rng, MAX_STARTING_MOVES)
        .copied()
        .collect())
}

/// Roll every random attribute of a new creature. The caller supplies `idx`.
pub fn roll_creature<R: Rng + ?Sized>(
    rng: &mut R,
    owner_id: PlayerId,
    idx: i64,
    species: &Species,
    options: &CreatureOptions,
    modifiers: &ShinyModifiers,
    now: DateTime<Utc>,
) -> Result<Creature, GameError> {
    options.validate()?;
    let level = options.level.sample(rng);
    let min_total = iv_percent_to_total(options.min_iv_percent);
    let max_total = (options.max_iv_percent / 100.0 * MAX_IV_TOTAL as f64).floor() as u32;
    let ivs = roll_ivs(rng, min_total, max_total)?;
    let shiny = options.force_shiny
        || roll_shiny(rng, shiny_probability(options.shiny_boost, modifiers));
    let gender = roll_gender(rng, &species.gender_ratio)?;
    let moves = roll_moves(rng, species, level)?;
    let nature = NATURES[rng.gen_range(0..NATURES.len())].to_string();

    Ok(Creature {
        owner_id,
        idx,
        species_id: species.id,
        level,
        xp: 0,
        nature,
        ivs,
        iv_total: ivs.total(),
        shiny,
        gender,
        moves,
        created_at: now,
        schema_version: CREATURE_SCHEMA_VERSION,
    })
}

/// Fail on species data that could never produce a valid creature.
pub fn check_species(species: &Species) -> Result<(), GameError> {
    if species.moves.is_empty() {
        return Err(GameError::Config(format!(
            "species {} ({}) has no moveset",
            species.id, species.name
        )));
    }
    if let GenderRatio::Split { male_percent } = species.gender_ratio {
        if !male_percent.is_finite() || !(0.0..=100.0).contains(&male_percent) {
            return Err(GameError::Config(format!(
                "species {} has invalid male percentage {}",
                species.id, male_percent
            )));
        }
    }
    Ok(())
}

/// Store-backed creature creation.
#[derive(Clone)]
pub struct CreatureFactory {
    store: Arc<dyn MemberStore>,
    clock: Arc<dyn Clock>,
}

impl CreatureFactory {
    pub fn new(store: Arc<dyn MemberStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create, persist and return one creature for `owner`.
    pub async fn make(
        &self,
        owner: PlayerId,
        species: &Species,
        options: &CreatureOptions,
    ) -> Result<Creature, GameError> {
        let mut made = self.make_batch(owner, &[(species, options.clone())]).await?;
        made.pop()
            .ok_or_else(|| GameError::Internal("creature batch came back empty".to_string()))
    }

    /// Roll several creatures, reserving all indices in one counter bump and inserting them
    /// in one batch.
    pub async fn make_batch(
        &self,
        owner: PlayerId,
        requests: &[(&Species, CreatureOptions)],
    ) -> Result<Vec<Creature>, GameError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let creatures = self.roll_batch(owner, requests).await?;
        self.store.insert_creatures(&creatures).await?;
        Ok(creatures)
    }

    /// Like [`make_batch`](Self::make_batch) but leaves inserting to the caller.
    pub async fn roll_batch(
        &self,
        owner: PlayerId,
        requests: &[(&Species, CreatureOptions)],
    ) -> Result<Vec<Creature>, GameError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        for (species, options) in requests {
            check_species(species)?;
            options.validate()?;
        }
        let player = self.store.require(owner).await?;
        let first = self.store.next_index(owner, requests.len() as u32).await?;
        let now = self.clock.now();

        let mut rng = rand::thread_rng();
        let mut creatures = Vec::with_capacity(requests.len());
        for (offset, (species, options)) in requests.iter().enumerate() {
            let modifiers = ShinyModifiers::for_player(&player, species, now);
            creatures.push(roll_creature(
                &mut rng,
                owner,
                first + offset as i64,
                species,
                options,
                &modifiers,
                now,
            )?);
        }
        debug!(
            "rolled {} creature(s) for {} starting at idx {}",
            creatures.len(),
            owner,
            first
        );
        Ok(creatures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::types::{BaseStats, LearnableMove, Rarity};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn species(ratio: GenderRatio, moves: Vec<LearnableMove>) -> Species {
        Species {
            id: 50163,
            name: "Easter Bunnelby".to_string(),
            dex_number: 659,
            types: vec!["Normal".to_string()],
            region: "kalos".to_string(),
            rarity: Rarity::Event,
            form: Some("easter".to_string()),
            gender_ratio: ratio,
            moves,
            base_stats: BaseStats::default(),
            abundance: 0,
            catchable: false,
        }
    }

    fn moves(levels: &[u8]) -> Vec<LearnableMove> {
        levels
            .iter()
            .enumerate()
            .map(|(i, &level)| LearnableMove {
                move_id: 100 + i as u32,
                level,
            })
            .collect()
    }

    fn roll(rng: &mut StdRng, sp: &Species, opts: &CreatureOptions) -> Result<Creature, GameError> {
        roll_creature(rng, 1, 1, sp, opts, &ShinyModifiers::default(), Utc::now())
    }

    #[test]
    fn quality_floor_is_respected() {
        let sp = species(GenderRatio::Split { male_percent: 50.0 }, moves(&[1, 1]));
        let opts = CreatureOptions::default().with_min_iv(80.0);
        let mut rng = StdRng::seed_from_u64(80);
        for _ in 0..2_000 {
            let c = roll(&mut rng, &sp, &opts).unwrap();
            assert!(c.iv_total >= 149, "total {}", c.iv_total);
            assert_eq!(c.iv_total, c.ivs.total());
            assert!(c.ivs.as_array().iter().all(|v| *v <= 31));
        }
    }

    #[test]
    fn perfect_floor_terminates() {
        let mut rng = StdRng::seed_from_u64(1);
        let ivs = roll_ivs(&mut rng, 186, 186).unwrap();
        assert_eq!(ivs.as_array(), [31; 6]);
    }

    #[test]
    fn constrained_draw_is_spread_over_slots() {
        // With a high floor every slot should still see values below 31.
        let mut rng = StdRng::seed_from_u64(5);
        let mut seen_low = [false; 6];
        for _ in 0..2_000 {
            let ivs = roll_ivs(&mut rng, 160, 186).unwrap();
            for (i, v) in ivs.as_array().iter().enumerate() {
                if *v < 25 {
                    seen_low[i] = true;
                }
            }
        }
        assert!(seen_low.iter().all(|s| *s));
    }

    #[test]
    fn composition_table_matches_total_space() {
        let table = composition_counts();
        let total: f64 = table[IV_SLOTS].iter().sum();
        assert_eq!(total, 32f64.powi(6));
        assert_eq!(table[IV_SLOTS][0], 1.0);
        assert_eq!(table[IV_SLOTS][186], 1.0);
        assert_eq!(table[IV_SLOTS][1], 6.0);
    }

    #[test]
    fn huge_boost_guarantees_shiny() {
        let sp = species(GenderRatio::Genderless, moves(&[1]));
        let opts = CreatureOptions::with_boost(10_000.0);
        let mut rng = StdRng::seed_from_u64(4096);
        for _ in 0..100 {
            assert!(roll(&mut rng, &sp, &opts).unwrap().shiny);
        }
    }

    #[test]
    fn non_positive_boost_is_rejected() {
        let sp = species(GenderRatio::Genderless, moves(&[1]));
        let mut rng = StdRng::seed_from_u64(0);
        for boost in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                roll(&mut rng, &sp, &CreatureOptions::with_boost(boost)),
                Err(GameError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn shiny_modifiers_stack() {
        let sp = species(GenderRatio::Genderless, moves(&[1]));
        let now = Utc::now();
        let mut player = PlayerRecord::new(1, "ash");
        assert_eq!(ShinyModifiers::for_player(&player, &sp, now).multiplier(), 1.0);

        player.shiny_charm_expires = Some(now + chrono::Duration::minutes(5));
        player.shiny_hunt = Some(659);
        player.shiny_streak = 49;
        let mods = ShinyModifiers::for_player(&player, &sp, now);
        assert!((mods.multiplier() - 1.2 * 2.0).abs() < 1e-12);

        player.shiny_hunt = Some(1);
        let mods = ShinyModifiers::for_player(&player, &sp, now);
        assert!((mods.multiplier() - 1.2).abs() < 1e-12);
    }

    #[test]
    fn gender_follows_ratio() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            assert_eq!(roll_gender(&mut rng, &GenderRatio::MaleOnly).unwrap(), Gender::Male);
            assert_eq!(
                roll_gender(&mut rng, &GenderRatio::FemaleOnly).unwrap(),
                Gender::Female
            );
            assert_eq!(
                roll_gender(&mut rng, &GenderRatio::Genderless).unwrap(),
                Gender::Unknown
            );
            assert_eq!(
                roll_gender(&mut rng, &GenderRatio::Split { male_percent: 100.0 }).unwrap(),
                Gender::Male
            );
            assert_eq!(
                roll_gender(&mut rng, &GenderRatio::Split { male_percent: 0.0 }).unwrap(),
                Gender::Female
            );
        }
        assert!(roll_gender(&mut rng, &GenderRatio::Split { male_percent: -3.0 }).is_err());
    }

    #[test]
    fn empty_moveset_is_a_config_error() {
        let sp = species(GenderRatio::Genderless, Vec::new());
        let mut rng = StdRng::seed_from_u64(2);
        assert!(matches!(
            roll(&mut rng, &sp, &CreatureOptions::default()),
            Err(GameError::Config(_))
        ));
    }

    #[test]
    fn moves_are_level_gated_and_capped() {
        let sp = species(GenderRatio::Genderless, moves(&[1, 1, 5, 9, 12, 30, 60]));
        let mut rng = StdRng::seed_from_u64(3);
        let picked = roll_moves(&mut rng, &sp, 10).unwrap();
        assert_eq!(picked.len(), 4);
        assert!(picked.iter().all(|m| *m <= 103));
        let low = roll_moves(&mut rng, &sp, 1).unwrap();
        assert_eq!(low.len(), 2);
    }

    #[test]
    fn levels_stay_clamped() {
        let mut rng = StdRng::seed_from_u64(77);
        for _ in 0..5_000 {
            let l = LevelSpec::EVENT.sample(&mut rng);
            assert!((1..=50).contains(&l));
        }
        assert_eq!(LevelSpec::fixed(42).sample(&mut rng), 42);
    }

    #[test]
    fn level_rolls_centre_on_the_mean() {
        let mut rng = StdRng::seed_from_u64(5);
        let n = 20_000;
        let total: u64 = (0..n)
            .map(|_| LevelSpec::GENERAL.sample(&mut rng) as u64)
            .sum();
        let mean = total as f64 / n as f64;
        // Flooring pulls the average about half a level under 30.
        assert!((28.5..31.0).contains(&mean), "mean level {}", mean);
    }

    #[test]
    fn negative_level_spread_is_rejected() {
        let options = CreatureOptions::default().with_level(LevelSpec {
            std_dev: -1.0,
            ..LevelSpec::EVENT
        });
        assert!(matches!(options.validate(), Err(GameError::InvalidInput(_))));
    }
}
