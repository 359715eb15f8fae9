use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PLAYER_SCHEMA_VERSION: u8 = 2;
pub const CREATURE_SCHEMA_VERSION: u8 = 1;

/// Stable chat-platform id of a player.
pub type PlayerId = u64;
pub type SpeciesId = u32;

/// Maximum possible sum of the six individual values (6 × 31).
pub const MAX_IV_TOTAL: u32 = 186;
pub const MAX_IV: u8 = 31;

pub const NATURES: [&str; 25] = [
    "Adamant", "Bashful", "Bold", "Brave", "Calm", "Careful", "Docile", "Gentle", "Hardy",
    "Hasty", "Impish", "Jolly", "Lax", "Lonely", "Mild", "Modest", "Naive", "Naughty", "Quiet",
    "Quirky", "Rash", "Relaxed", "Sassy", "Serious", "Timid",
];

// ============================================================================
// Currencies and counters
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    Pokecoins,
    Shards,
    Redeems,
}

impl Currency {
    pub fn name(&self) -> &'static str {
        match self {
            Currency::Pokecoins => "Pokécoins",
            Currency::Shards => "Shards",
            Currency::Redeems => "Redeems",
        }
    }

    /// "1 Redeem", "2,500 Pokécoins"
    pub fn format_amount(&self, amount: i64) -> String {
        match self {
            Currency::Redeems if amount.abs() == 1 => format!("{} Redeem", amount),
            _ => format!("{} {}", group_thousands(amount), self.name()),
        }
    }
}

/// Kinds of openable event boxes. Each seasonal event decides which kinds it uses and
/// what they are called.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum BoxKind {
    Random,
    Creature,
    Currency,
    Event,
    Special,
}

impl BoxKind {
    pub const ALL: [BoxKind; 5] = [
        BoxKind::Random,
        BoxKind::Creature,
        BoxKind::Currency,
        BoxKind::Event,
        BoxKind::Special,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            BoxKind::Random => "random",
            BoxKind::Creature => "pokemon",
            BoxKind::Currency => "currency",
            BoxKind::Event => "event",
            BoxKind::Special => "special",
        }
    }

    /// Parse a user-typed box name, accepting single-letter shortcuts.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "random" | "r" => Some(BoxKind::Random),
            "pokemon" | "creature" | "p" => Some(BoxKind::Creature),
            "currency" | "c" => Some(BoxKind::Currency),
            "event" | "e" => Some(BoxKind::Event),
            "special" | "santa" | "s" => Some(BoxKind::Special),
            _ => None,
        }
    }
}

/// Per-kind box tallies stored on the player document.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoxCounts {
    #[serde(default)]
    pub random: i64,
    #[serde(default)]
    pub creature: i64,
    #[serde(default)]
    pub currency: i64,
    #[serde(default)]
    pub event: i64,
    #[serde(default)]
    pub special: i64,
}

impl BoxCounts {
    pub fn get(&self, kind: BoxKind) -> i64 {
        match kind {
            BoxKind::Random => self.random,
            BoxKind::Creature => self.creature,
            BoxKind::Currency => self.currency,
            BoxKind::Event => self.event,
            BoxKind::Special => self.special,
        }
    }

    pub fn get_mut(&mut self, kind: BoxKind) -> &mut i64 {
        match kind {
            BoxKind::Random => &mut self.random,
            BoxKind::Creature => &mut self.creature,
            BoxKind::Currency => &mut self.currency,
            BoxKind::Event => &mut self.event,
            BoxKind::Special => &mut self.special,
        }
    }
}

/// Every numeric field of [`PlayerRecord`] that can be adjusted by a signed delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Currency(Currency),
    Xp,
    EventCoins,
    Catches,
    ShinyStreak,
    NextIdx,
    Boxes(BoxKind),
    BoxesOpened(BoxKind),
    BingosAwarded,
    BoardsCompleted,
}

// ============================================================================
// Species catalog data
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Legendary,
    Mythical,
    UltraBeast,
    Event,
}

impl Rarity {
    pub fn name(&self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Legendary => "legendary",
            Rarity::Mythical => "mythical",
            Rarity::UltraBeast => "ultra beast",
            Rarity::Event => "event",
        }
    }

    pub fn is_rare(&self) -> bool {
        matches!(self, Rarity::Legendary | Rarity::Mythical | Rarity::UltraBeast)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

impl Gender {
    pub fn name(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Unknown => "unknown",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Gender::Male => "♂",
            Gender::Female => "♀",
            Gender::Unknown => "",
        }
    }
}

/// How a species splits between genders.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum GenderRatio {
    Genderless,
    MaleOnly,
    FemaleOnly,
    /// Percentage (0–100) of individuals that are male.
    Split { male_percent: f64 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LearnableMove {
    pub move_id: u32,
    /// Level at which the move unlocks.
    pub level: u8,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BaseStats {
    pub hp: u16,
    pub atk: u16,
    pub defn: u16,
    pub satk: u16,
    pub sdef: u16,
    pub spd: u16,
}

/// Read-only catalog entry for one species.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Species {
    pub id: SpeciesId,
    pub name: String,
    /// National dex number; shiny hunts target a dex number, not a form.
    pub dex_number: u32,
    pub types: Vec<String>,
    pub region: String,
    pub rarity: Rarity,
    #[serde(default)]
    pub form: Option<String>,
    pub gender_ratio: GenderRatio,
    #[serde(default)]
    pub moves: Vec<LearnableMove>,
    #[serde(default)]
    pub base_stats: BaseStats,
    #[serde(default)]
    pub abundance: u32,
    #[serde(default = "default_catchable")]
    pub catchable: bool,
}

fn default_catchable() -> bool {
    true
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ============================================================================
// Quests
// ============================================================================

/// Days a bingo card stays open. Cards are replaced by a reset, never by expiry.
const CARD_LIFETIME_DAYS: i64 = 36_500;

/// Quest refresh period.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Daily,
    Weekly,
    /// Event bingo card.
    Card,
}

impl Cadence {
    /// Cadences that expire on the calendar and are regenerated by the sweep.
    pub const ALL: [Cadence; 2] = [Cadence::Daily, Cadence::Weekly];

    pub fn name(&self) -> &'static str {
        match self {
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::Card => "bingo",
        }
    }

    /// Next UTC boundary after `now`: midnight for daily sets, Monday midnight for weekly.
    /// Bingo cards get a far-off expiry so the sweep never touches them.
    pub fn next_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = now
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc();
        match self {
            Cadence::Daily => midnight + Duration::days(1),
            Cadence::Weekly => {
                let days_since_monday = now.weekday().num_days_from_monday() as i64;
                midnight + Duration::days(7 - days_since_monday)
            }
            Cadence::Card => midnight + Duration::days(CARD_LIFETIME_DAYS),
        }
    }
}

/// Game actions a quest can count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestEvent {
    Catch,
    Trade,
    Evolve,
    Release,
    MarketBuy,
    MarketSell,
    OpenBox,
}

/// Conjunctive filter over a subject's static attributes. Absent keys match anything.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QuestCondition {
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub rarity: Option<Rarity>,
    #[serde(default)]
    pub form: Option<String>,
    #[serde(default)]
    pub gender: Option<Gender>,
}

impl QuestCondition {
    pub fn of_type(type_name: &str) -> Self {
        Self {
            type_name: Some(type_name.to_string()),
            ..Self::default()
        }
    }

    pub fn of_region(region: &str) -> Self {
        Self {
            region: Some(region.to_string()),
            ..Self::default()
        }
    }

    pub fn of_rarity(rarity: Rarity) -> Self {
        Self {
            rarity: Some(rarity),
            ..Self::default()
        }
    }

    pub fn of_gender(gender: Gender) -> Self {
        Self {
            gender: Some(gender),
            ..Self::default()
        }
    }

    pub fn matches(&self, subject: &QuestSubject) -> bool {
        if let Some(ref t) = self.type_name {
            if !subject.types.iter().any(|x| x.eq_ignore_ascii_case(t)) {
                return false;
            }
        }
        if let Some(ref region) = self.region {
            if !subject.region.eq_ignore_ascii_case(region) {
                return false;
            }
        }
        if let Some(rarity) = self.rarity {
            if subject.rarity != rarity {
                return false;
            }
        }
        if let Some(ref form) = self.form {
            match subject.form {
                Some(ref f) if f.eq_ignore_ascii_case(form) => {}
                _ => return false,
            }
        }
        if let Some(gender) = self.gender {
            if subject.gender != Some(gender) {
                return false;
            }
        }
        true
    }
}

/// Static attributes of whatever an event was about (usually the caught creature).
#[derive(Debug, Clone, PartialEq)]
pub struct QuestSubject {
    pub species_id: SpeciesId,
    pub types: Vec<String>,
    pub region: String,
    pub rarity: Rarity,
    pub form: Option<String>,
    pub gender: Option<Gender>,
}

impl QuestSubject {
    pub fn from_species(species: &Species, gender: Option<Gender>) -> Self {
        Self {
            species_id: species.id,
            types: species.types.clone(),
            region: species.region.clone(),
            rarity: species.rarity,
            form: species.form.clone(),
            gender,
        }
    }
}

/// One persisted unit of trackable progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestRecord {
    pub id: Uuid,
    pub cadence: Cadence,
    pub event: QuestEvent,
    #[serde(default)]
    pub condition: Option<QuestCondition>,
    pub description: String,
    pub count: u32,
    pub progress: u32,
    pub completed: bool,
    pub expires: DateTime<Utc>,
}

impl QuestRecord {
    pub fn new(
        cadence: Cadence,
        event: QuestEvent,
        condition: Option<QuestCondition>,
        count: u32,
        description: String,
        expires: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            cadence,
            event,
            condition,
            description,
            count: count.max(1),
            progress: 0,
            completed: false,
            expires,
        }
    }

    /// Pre-completed centre square of a bingo card. It never takes progress.
    pub fn free_space(expires: DateTime<Utc>) -> Self {
        Self {
            progress: 1,
            completed: true,
            ..Self::new(
                Cadence::Card,
                QuestEvent::Catch,
                None,
                1,
                "Free Space".to_string(),
                expires,
            )
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires
    }

    /// Still accepting progress.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.completed && !self.is_expired(now)
    }

    pub fn is_ready(&self) -> bool {
        !self.completed && self.progress >= self.count
    }

    pub fn remaining(&self) -> u32 {
        self.count.saturating_sub(self.progress)
    }

    pub fn matches(&self, subjects: &[QuestSubject]) -> bool {
        match self.condition {
            None => true,
            Some(ref condition) => subjects.iter().any(|s| condition.matches(s)),
        }
    }
}

// ============================================================================
// Creatures
// ============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ivs {
    pub hp: u8,
    pub atk: u8,
    pub defn: u8,
    pub satk: u8,
    pub sdef: u8,
    pub spd: u8,
}

impl Ivs {
    pub fn from_array(values: [u8; 6]) -> Self {
        Self {
            hp: values[0],
            atk: values[1],
            defn: values[2],
            satk: values[3],
            sdef: values[4],
            spd: values[5],
        }
    }

    pub fn as_array(&self) -> [u8; 6] {
        [self.hp, self.atk, self.defn, self.satk, self.sdef, self.spd]
    }

    pub fn total(&self) -> u32 {
        self.as_array().iter().map(|&v| v as u32).sum()
    }

    pub fn percentage(&self) -> f64 {
        self.total() as f64 / MAX_IV_TOTAL as f64 * 100.0
    }
}

/// Minimum IV total for a quality floor given in percent, rounded up.
pub fn iv_percent_to_total(percent: f64) -> u32 {
    (percent / 100.0 * MAX_IV_TOTAL as f64).ceil() as u32
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Creature {
    pub owner_id: PlayerId,
    /// Per-owner sequence number, never reused.
    pub idx: i64,
    pub species_id: SpeciesId,
    pub level: u8,
    pub xp: u32,
    pub nature: String,
    pub ivs: Ivs,
    pub iv_total: u32,
    pub shiny: bool,
    pub gender: Gender,
    pub moves: Vec<u32>,
    pub created_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl Creature {
    /// "✨ Level 23 Pikachu♂ (61.29%) No. 42"
    pub fn describe(&self, species: &Species) -> String {
        let mut out = String::new();
        if self.shiny {
            out.push_str("✨ ");
        }
        out.push_str(&format!(
            "Level {} {}{} ({:.2}%) No. {}",
            self.level,
            species.name,
            self.gender.symbol(),
            self.ivs.percentage(),
            self.idx
        ));
        out
    }
}

// ============================================================================
// Player document
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Primary currency.
    #[serde(default)]
    pub balance: i64,
    /// Premium currency.
    #[serde(default)]
    pub premium_balance: i64,
    #[serde(default)]
    pub redeems: i64,
    #[serde(default = "default_next_idx")]
    pub next_idx: i64,
    /// Cumulative event XP. Level is always derived from this.
    #[serde(default)]
    pub xp: i64,
    #[serde(default)]
    pub event_coins: i64,
    #[serde(default)]
    pub catches: i64,
    #[serde(default)]
    pub boxes: BoxCounts,
    #[serde(default)]
    pub boxes_opened: BoxCounts,
    #[serde(default)]
    pub quests: Vec<QuestRecord>,
    #[serde(default = "default_quests_notify")]
    pub quests_notify: bool,
    #[serde(default)]
    pub badges: BTreeSet<String>,
    #[serde(default)]
    pub shiny_hunt: Option<u32>,
    #[serde(default)]
    pub shiny_streak: i64,
    #[serde(default)]
    pub shiny_charm_expires: Option<DateTime<Utc>>,
    /// Bingos already paid on the current card.
    #[serde(default)]
    pub bingos_awarded: i64,
    #[serde(default)]
    pub boards_completed: i64,
    pub schema_version: u8,
}

fn default_next_idx() -> i64 {
    1
}

fn default_quests_notify() -> bool {
    true
}

impl PlayerRecord {
    pub fn new(id: PlayerId, username: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            username: username.to_string(),
            created_at: now,
            updated_at: now,
            balance: 0,
            premium_balance: 0,
            redeems: 0,
            next_idx: 1,
            xp: 0,
            event_coins: 0,
            catches: 0,
            boxes: BoxCounts::default(),
            boxes_opened: BoxCounts::default(),
            quests: Vec::new(),
            quests_notify: true,
            badges: BTreeSet::new(),
            shiny_hunt: None,
            shiny_streak: 0,
            shiny_charm_expires: None,
            bingos_awarded: 0,
            boards_completed: 0,
            schema_version: PLAYER_SCHEMA_VERSION,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn counter(&self, field: Field) -> i64 {
        match field {
            Field::Currency(Currency::Pokecoins) => self.balance,
            Field::Currency(Currency::Shards) => self.premium_balance,
            Field::Currency(Currency::Redeems) => self.redeems,
            Field::Xp => self.xp,
            Field::EventCoins => self.event_coins,
            Field::Catches => self.catches,
            Field::ShinyStreak => self.shiny_streak,
            Field::NextIdx => self.next_idx,
            Field::Boxes(kind) => self.boxes.get(kind),
            Field::BoxesOpened(kind) => self.boxes_opened.get(kind),
            Field::BingosAwarded => self.bingos_awarded,
            Field::BoardsCompleted => self.boards_completed,
        }
    }

    pub fn counter_mut(&mut self, field: Field) -> &mut i64 {
        match field {
            Field::Currency(Currency::Pokecoins) => &mut self.balance,
            Field::Currency(Currency::Shards) => &mut self.premium_balance,
            Field::Currency(Currency::Redeems) => &mut self.redeems,
            Field::Xp => &mut self.xp,
            Field::EventCoins => &mut self.event_coins,
            Field::Catches => &mut self.catches,
            Field::ShinyStreak => &mut self.shiny_streak,
            Field::NextIdx => &mut self.next_idx,
            Field::Boxes(kind) => self.boxes.get_mut(kind),
            Field::BoxesOpened(kind) => self.boxes_opened.get_mut(kind),
            Field::BingosAwarded => &mut self.bingos_awarded,
            Field::BoardsCompleted => &mut self.boards_completed,
        }
    }

    pub fn quests_of(&self, cadence: Cadence) -> impl Iterator<Item = &QuestRecord> {
        self.quests.iter().filter(move |q| q.cadence == cadence)
    }

    /// True when the cadence has no records or every record of it has expired.
    pub fn quest_set_expired(&self, cadence: Cadence, now: DateTime<Utc>) -> bool {
        self.quests_of(cadence).all(|q| q.is_expired(now))
    }

    pub fn shiny_charm_active(&self, now: DateTime<Utc>) -> bool {
        self.shiny_charm_expires.map_or(false, |at| now < at)
    }
}

/// "12,345" style grouping used in reply text.
pub fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0 {
        format!("-{}", out)
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fire_species() -> Species {
        Species {
            id: 4,
            name: "Charmander".to_string(),
            dex_number: 4,
            types: vec!["Fire".to_string()],
            region: "kanto".to_string(),
            rarity: Rarity::Common,
            form: None,
            gender_ratio: GenderRatio::Split { male_percent: 87.5 },
            moves: vec![LearnableMove { move_id: 10, level: 1 }],
            base_stats: BaseStats::default(),
            abundance: 100,
            catchable: true,
        }
    }

    #[test]
    fn daily_expiry_is_next_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 3, 27, 21, 15, 0).unwrap();
        let expiry = Cadence::Daily.next_expiry(now);
        assert_eq!(expiry, Utc.with_ymd_and_hms(2024, 3, 28, 0, 0, 0).unwrap());
    }

    #[test]
    fn weekly_expiry_is_next_monday() {
        // 2024-03-27 is a Wednesday
        let now = Utc.with_ymd_and_hms(2024, 3, 27, 9, 0, 0).unwrap();
        let expiry = Cadence::Weekly.next_expiry(now);
        assert_eq!(expiry, Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());

        // On a Monday the set runs until the following Monday
        let monday = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        assert_eq!(
            Cadence::Weekly.next_expiry(monday),
            Utc.with_ymd_and_hms(2024, 4, 8, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn condition_is_conjunctive() {
        let subject = QuestSubject::from_species(&fire_species(), Some(Gender::Male));
        assert!(QuestCondition::of_type("fire").matches(&subject));
        assert!(!QuestCondition::of_type("Water").matches(&subject));

        let both = QuestCondition {
            type_name: Some("Fire".to_string()),
            region: Some("johto".to_string()),
            ..QuestCondition::default()
        };
        assert!(!both.matches(&subject));

        assert!(QuestCondition::of_gender(Gender::Male).matches(&subject));
        assert!(!QuestCondition::of_gender(Gender::Female).matches(&subject));
        assert!(QuestCondition::default().matches(&subject));
    }

    #[test]
    fn unconditioned_quest_matches_without_subjects() {
        let now = Utc::now();
        let quest = QuestRecord::new(
            Cadence::Daily,
            QuestEvent::Trade,
            None,
            3,
            "Trade with 3 people".to_string(),
            now + Duration::hours(1),
        );
        assert!(quest.matches(&[]));

        let conditioned = QuestRecord {
            condition: Some(QuestCondition::of_type("Fire")),
            ..quest
        };
        assert!(!conditioned.matches(&[]));
    }

    #[test]
    fn counters_map_to_fields() {
        let mut player = PlayerRecord::new(1, "ash");
        *player.counter_mut(Field::Currency(Currency::Shards)) += 25;
        *player.counter_mut(Field::Boxes(BoxKind::Event)) += 3;
        assert_eq!(player.premium_balance, 25);
        assert_eq!(player.boxes.event, 3);
        assert_eq!(player.counter(Field::Boxes(BoxKind::Event)), 3);
        assert_eq!(player.counter(Field::NextIdx), 1);
    }

    #[test]
    fn bingo_cards_outlive_every_sweep() {
        let now = Utc.with_ymd_and_hms(2024, 3, 30, 10, 0, 0).unwrap();
        let free = QuestRecord::free_space(Cadence::Card.next_expiry(now));
        assert!(free.expires > now + Duration::days(365 * 50));
        assert!(free.completed && !free.is_ready() && !free.is_active(now));
        assert!(!Cadence::ALL.contains(&Cadence::Card));
    }

    #[test]
    fn empty_quest_set_counts_as_expired() {
        let player = PlayerRecord::new(1, "ash");
        assert!(player.quest_set_expired(Cadence::Daily, Utc::now()));
    }

    #[test]
    fn formats_amounts() {
        assert_eq!(group_thousands(1234567), "1,234,567");
        assert_eq!(group_thousands(-5000), "-5,000");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(Currency::Redeems.format_amount(1), "1 Redeem");
        assert_eq!(Currency::Pokecoins.format_amount(2500), "2,500 Pokécoins");
    }

    #[test]
    fn iv_floor_rounds_up() {
        assert_eq!(iv_percent_to_total(80.0), 149);
        assert_eq!(iv_percent_to_total(100.0), 186);
        assert_eq!(iv_percent_to_total(0.0), 0);
    }
}
