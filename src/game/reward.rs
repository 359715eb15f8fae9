//! Weighted reward tables.
//!
//! A table pairs each reward kind with a relative weight and a payout range. Drawing picks
//! `k` kinds independently with replacement (probability `weight / sum(weights)`), then rolls
//! a payout amount for each pick on its own. Selection never touches materialization: the
//! caller turns a [`RolledReward`] into a currency delta or a creature with an exhaustive match
//! over its own kind enum.
//!
//! Tables are validated on construction. A zero weight is allowed and is never drawn; a
//! negative, NaN or infinite weight, an empty table, or a table whose weights sum to zero is a
//! configuration error.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::errors::GameError;
use super::types::{group_thousands, BoxKind, Currency, SpeciesId};

/// Inclusive payout range or a fixed list to pick from uniformly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmountRange {
    Range { min: u32, max: u32 },
    Fixed(Vec<u32>),
}

impl AmountRange {
    pub fn exactly(amount: u32) -> Self {
        AmountRange::Fixed(vec![amount])
    }

    pub fn between(min: u32, max: u32) -> Self {
        AmountRange::Range { min, max }
    }

    fn validate(&self) -> Result<(), GameError> {
        match self {
            AmountRange::Range { min, max } if min > max => Err(GameError::Config(format!(
                "amount range {}..={} is empty",
                min, max
            ))),
            AmountRange::Fixed(values) if values.is_empty() => {
                Err(GameError::Config("fixed amount list is empty".to_string()))
            }
            _ => Ok(()),
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        match self {
            AmountRange::Range { min, max } => rng.gen_range(*min..=*max),
            AmountRange::Fixed(values) => values[rng.gen_range(0..values.len())],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewardEntry<K> {
    pub kind: K,
    pub weight: f64,
    pub amount: AmountRange,
}

impl<K> RewardEntry<K> {
    pub fn new(kind: K, weight: f64, amount: AmountRange) -> Self {
        Self {
            kind,
            weight,
            amount,
        }
    }
}

/// One draw: which reward and how much of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolledReward<K> {
    pub kind: K,
    pub amount: u32,
}

#[derive(Debug, Clone)]
pub struct RewardTable<K> {
    entries: Vec<RewardEntry<K>>,
    index: WeightedIndex<f64>,
    total: f64,
}

impl<K: Copy + PartialEq> RewardTable<K> {
    pub fn new(entries: Vec<RewardEntry<K>>) -> Result<Self, GameError> {
        for entry in &entries {
            entry.amount.validate()?;
        }
        let weights: Vec<f64> = entries.iter().map(|e| e.weight).collect();
        let index = weighted_index(&weights)?;
        let total = weights.iter().sum();
        Ok(Self {
            entries,
            index,
            total,
        })
    }

    pub fn entries(&self) -> &[RewardEntry<K>] {
        &self.entries
    }

    /// Draw `k` rewards with replacement. No upper bound is applied here.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R, k: usize) -> Vec<RolledReward<K>> {
        (0..k).map(|_| self.draw_one(rng)).collect()
    }

    pub fn draw_one<R: Rng + ?Sized>(&self, rng: &mut R) -> RolledReward<K> {
        let entry = &self.entries[self.index.sample(rng)];
        RolledReward {
            kind: entry.kind,
            amount: entry.amount.sample(rng),
        }
    }

    /// Exact draw probability of `kind` (summed over every entry carrying it).
    pub fn probability(&self, kind: K) -> f64 {
        self.entries
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.weight)
            .sum::<f64>()
            / self.total
    }
}

/// What a roll or level-up actually produced, after materialization.
#[derive(Debug, Clone, PartialEq)]
pub enum RewardDescriptor {
    Currency {
        currency: Currency,
        amount: i64,
    },
    Boxes {
        kind: BoxKind,
        amount: i64,
    },
    Creature {
        species_id: SpeciesId,
        species: String,
        idx: i64,
        level: u8,
        shiny: bool,
        iv_percent: f64,
    },
    Badge {
        badge: String,
        newly_granted: bool,
    },
}

impl RewardDescriptor {
    pub fn describe(&self) -> String {
        match self {
            RewardDescriptor::Currency { currency, amount } => currency.format_amount(*amount),
            RewardDescriptor::Boxes { kind, amount } => {
                format!("{} {} box(es)", group_thousands(*amount), kind.slug())
            }
            RewardDescriptor::Creature {
                species,
                idx,
                level,
                shiny,
                iv_percent,
                ..
            } => format!(
                "{}Level {} {} ({:.2}%) No. {}",
                if *shiny { "✨ " } else { "" },
                level,
                species,
                iv_percent,
                idx
            ),
            RewardDescriptor::Badge {
                badge,
                newly_granted: true,
            } => format!("the {} badge", badge),
            RewardDescriptor::Badge { badge, .. } => format!("the {} badge (already owned)", badge),
        }
    }

    pub fn is_creature(&self) -> bool {
        matches!(self, RewardDescriptor::Creature { .. })
    }
}

/// Build a categorical sampler, rejecting weights that would make it meaningless.
pub fn weighted_index(weights: &[f64]) -> Result<WeightedIndex<f64>, GameError> {
    if weights.is_empty() {
        return Err(GameError::Config("reward table has no entries".to_string()));
    }
    if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(GameError::Config(format!("invalid reward weight {}", bad)));
    }
    WeightedIndex::new(weights)
        .map_err(|e| GameError::Config(format!("unusable reward weights: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Kind {
        Coins,
        Shards,
        Shiny,
    }

    fn table(weights: [f64; 3]) -> Result<RewardTable<Kind>, GameError> {
        RewardTable::new(vec![
            RewardEntry::new(Kind::Coins, weights[0], AmountRange::between(2000, 4000)),
            RewardEntry::new(Kind::Shards, weights[1], AmountRange::between(15, 55)),
            RewardEntry::new(Kind::Shiny, weights[2], AmountRange::exactly(1)),
        ])
    }

    #[test]
    fn zero_weight_is_never_drawn() {
        let t = table([0.7, 0.3, 0.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let draws = t.draw(&mut rng, 50_000);
        assert_eq!(draws.len(), 50_000);
        assert!(draws.iter().all(|d| d.kind != Kind::Shiny));
        assert_eq!(t.probability(Kind::Shiny), 0.0);
    }

    #[test]
    fn frequencies_converge_to_weights() {
        // Weights deliberately do not sum to 1.
        let t = table([5.0, 3.0, 2.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(2024);
        let n = 200_000;
        let draws = t.draw(&mut rng, n);
        for (kind, expected) in [(Kind::Coins, 0.5), (Kind::Shards, 0.3), (Kind::Shiny, 0.2)] {
            let seen = draws.iter().filter(|d| d.kind == kind).count() as f64 / n as f64;
            assert!(
                (seen - expected).abs() < 0.01,
                "{:?}: expected {} got {}",
                kind,
                expected,
                seen
            );
            assert!((t.probability(kind) - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn amounts_stay_in_range() {
        let t = table([1.0, 1.0, 1.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for d in t.draw(&mut rng, 5_000) {
            match d.kind {
                Kind::Coins => assert!((2000..=4000).contains(&d.amount)),
                Kind::Shards => assert!((15..=55).contains(&d.amount)),
                Kind::Shiny => assert_eq!(d.amount, 1),
            }
        }
    }

    #[test]
    fn fixed_lists_pick_members() {
        let amount = AmountRange::Fixed(vec![3, 7]);
        let mut rng = StdRng::seed_from_u64(3);
        let picks: Vec<u32> = (0..200).map(|_| amount.sample(&mut rng)).collect();
        assert!(picks.iter().all(|p| *p == 3 || *p == 7));
        assert!(picks.contains(&3) && picks.contains(&7));
    }

    #[test]
    fn rejects_malformed_tables() {
        assert!(matches!(table([0.0, 0.0, 0.0]), Err(GameError::Config(_))));
        assert!(matches!(table([1.0, -0.5, 0.0]), Err(GameError::Config(_))));
        assert!(matches!(table([f64::NAN, 1.0, 0.0]), Err(GameError::Config(_))));
        assert!(matches!(
            RewardTable::<Kind>::new(Vec::new()),
            Err(GameError::Config(_))
        ));
        assert!(matches!(
            RewardTable::new(vec![RewardEntry::new(
                Kind::Coins,
                1.0,
                AmountRange::between(10, 5)
            )]),
            Err(GameError::Config(_))
        ));
    }

    #[test]
    fn single_entry_always_wins() {
        let t = RewardTable::new(vec![RewardEntry::new(
            Kind::Coins,
            1.0,
            AmountRange::between(100, 100),
        )])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let draws = t.draw(&mut rng, 15);
        assert!(draws
            .iter()
            .all(|d| d.kind == Kind::Coins && d.amount == 100));
    }
}
