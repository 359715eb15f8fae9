//! Easter bingo card.
//!
//! A card is 25 [`Cadence::Card`] quest records laid out row-major on a 5×5 grid, with a
//! pre-completed free space in the centre. The card rides on the ordinary quest machinery:
//! events advance its records and completions are settled like any other quest. What this
//! module adds is the card layout and counting finished lines.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use super::quest::{CountRange, QuestTemplate, TemplateKind};
use super::types::{Cadence, Gender, QuestEvent, QuestRecord};

pub const CARD_SIDE: usize = 5;
pub const CARD_SLOTS: usize = CARD_SIDE * CARD_SIDE;
pub const FREE_SLOT: usize = CARD_SLOTS / 2;
/// Rows, columns and both diagonals.
pub const BINGOS_PER_CARD: i64 = (2 * CARD_SIDE + 2) as i64;

const OPEN_BOX_QUEST_CHANCE: f64 = 0.5;

/// Quests every card carries.
fn guaranteed() -> Vec<QuestTemplate> {
    let plain = |event, min, max| {
        QuestTemplate::new(
            1.0,
            TemplateKind::Plain {
                event,
                counts: CountRange::new(min, max),
            },
        )
    };
    vec![
        plain(QuestEvent::Catch, 40, 60),
        plain(QuestEvent::Trade, 3, 6),
        plain(QuestEvent::Evolve, 10, 15),
        plain(QuestEvent::Release, 10, 20),
        plain(QuestEvent::MarketBuy, 250, 750),
        plain(QuestEvent::MarketSell, 250, 500),
    ]
}

/// One single-choice template per type, region and gender; the card samples without
/// replacement from these.
fn optional() -> Vec<QuestTemplate> {
    let types: [(&[&str], CountRange); 3] = [
        (&["Normal", "Water", "Grass", "Flying", "Bug"], CountRange::new(16, 19)),
        (
            &["Poison", "Ground", "Psychic", "Rock", "Electric", "Ghost"],
            CountRange::new(14, 17),
        ),
        (
            &["Dragon", "Fire", "Fairy", "Dark", "Fighting", "Steel", "Ice"],
            CountRange::new(12, 15),
        ),
    ];
    let regions: [(&[&str], CountRange); 3] = [
        (&["paldea"], CountRange::new(20, 29)),
        (&["kanto", "johto", "hoenn", "unova"], CountRange::new(14, 17)),
        (&["sinnoh", "alola", "kalos", "galar"], CountRange::new(12, 15)),
    ];

    let mut out = Vec::new();
    for (names, counts) in types {
        out.extend(names.iter().map(|name| {
            QuestTemplate::new(1.0, TemplateKind::CatchType(vec![(name.to_string(), counts)]))
        }));
    }
    for (names, counts) in regions {
        out.extend(names.iter().map(|name| {
            QuestTemplate::new(1.0, TemplateKind::CatchRegion(vec![(name.to_string(), counts)]))
        }));
    }
    for (gender, counts) in [
        (Gender::Male, CountRange::new(24, 35)),
        (Gender::Female, CountRange::new(24, 35)),
        (Gender::Unknown, CountRange::new(6, 11)),
    ] {
        out.push(QuestTemplate::new(1.0, TemplateKind::CatchGender(vec![(gender, counts)])));
    }
    out
}

/// A fresh shuffled card with the free space at the centre.
pub fn generate_card<R: Rng + ?Sized>(rng: &mut R, expires: DateTime<Utc>) -> Vec<QuestRecord> {
    let mut templates = guaranteed();
    if rng.gen::<f64>() < OPEN_BOX_QUEST_CHANCE {
        templates.push(QuestTemplate::new(
            1.0,
            TemplateKind::Plain {
                event: QuestEvent::OpenBox,
                counts: CountRange::new(1, 1),
            },
        ));
    }
    let wanted = (CARD_SLOTS - 1).saturating_sub(templates.len());
    let optional = optional();
    templates.extend(optional.choose_multiple(rng, wanted).cloned());

    let mut card: Vec<QuestRecord> = templates
        .iter()
        .map(|t| t.instantiate(rng, Cadence::Card, expires))
        .collect();
    card.shuffle(rng);
    card.insert(FREE_SLOT.min(card.len()), QuestRecord::free_space(expires));
    card
}

/// Finished lines on a row-major grid of `CARD_SIDE`² squares. Any other size has none.
pub fn count_bingos(done: &[bool]) -> i64 {
    if done.len() != CARD_SLOTS {
        return 0;
    }
    let at = |row: usize, col: usize| done[row * CARD_SIDE + col];
    let mut lines = 0;
    for i in 0..CARD_SIDE {
        lines += (0..CARD_SIDE).all(|col| at(i, col)) as i64;
        lines += (0..CARD_SIDE).all(|row| at(row, i)) as i64;
    }
    lines += (0..CARD_SIDE).all(|i| at(i, i)) as i64;
    lines += (0..CARD_SIDE).all(|i| at(i, CARD_SIDE - 1 - i)) as i64;
    lines
}

/// Squares that count toward a line. Progress at target counts even before settling.
pub fn filled(card: &[&QuestRecord]) -> Vec<bool> {
    card.iter()
        .map(|q| q.completed || q.progress >= q.count)
        .collect()
}

/// "A1" is the top-left square, "E5" the bottom-right.
pub fn slot_label(slot: usize) -> String {
    let column = (b'A' + (slot % CARD_SIDE) as u8) as char;
    format!("{}{}", column, slot / CARD_SIDE + 1)
}

/// The grid as text, one row per line.
pub fn render_grid(done: &[bool]) -> Vec<String> {
    let mut lines = vec!["   A  B  C  D  E".to_string()];
    for (row, squares) in done.chunks(CARD_SIDE).enumerate() {
        let marks: Vec<&str> = squares
            .iter()
            .map(|d| if *d { "🥚" } else { "⬜" })
            .collect();
        lines.push(format!("{}  {}", row + 1, marks.join(" ")));
    }
    lines
}
