//! Game domain: rewards, creatures, progression, quests and seasonal events.
//!
//! Everything here talks to persistence through [`storage::MemberStore`] and to time through
//! [`clock::Clock`], so the whole domain can run against a temporary sled database and a
//! manual clock in tests. [`Game`] wires the services together the way the bot uses them.

pub mod bingo;
pub mod catalog;
pub mod clock;
pub mod commands;
pub mod creature;
pub mod errors;
pub mod events;
pub mod hooks;
pub mod progression;
pub mod quest;
pub mod reward;
pub mod storage;
pub mod types;

use std::sync::Arc;

use log::info;

use catalog::SpeciesCatalog;
use clock::Clock;
use creature::CreatureFactory;
use errors::GameError;
use events::{EventCog, EventPreset};
use hooks::GameHooks;
use progression::{LevelRewardTable, ProgressionLedger, XpCurve};
use quest::{QuestEngine, QuestSettings};
use storage::MemberStore;

/// Tunables the services are built from; usually filled from the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct GameSettings {
    pub curve: XpCurve,
    pub level_rewards: LevelRewardTable,
    pub quests: QuestSettings,
    pub event: EventPreset,
    /// XP granted for every catch.
    pub catch_xp: i64,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            curve: XpCurve::default(),
            level_rewards: LevelRewardTable::default(),
            quests: QuestSettings::default(),
            event: EventPreset::None,
            catch_xp: 10,
        }
    }
}

/// All game services sharing one store, catalog and clock.
#[derive(Clone)]
pub struct Game {
    pub store: Arc<dyn MemberStore>,
    pub catalog: Arc<dyn SpeciesCatalog>,
    pub clock: Arc<dyn Clock>,
    pub factory: CreatureFactory,
    pub progression: ProgressionLedger,
    pub quests: QuestEngine,
    pub event: Option<EventCog>,
    pub hooks: GameHooks,
}

impl Game {
    pub fn assemble(
        store: Arc<dyn MemberStore>,
        catalog: Arc<dyn SpeciesCatalog>,
        clock: Arc<dyn Clock>,
        settings: GameSettings,
    ) -> Result<Self, GameError> {
        let factory = CreatureFactory::new(store.clone(), clock.clone());
        let progression = ProgressionLedger::new(
            store.clone(),
            catalog.clone(),
            factory.clone(),
            settings.curve,
            settings.level_rewards,
        )?;

        let spec = settings.event.spec()?;
        let mut quest_settings = settings.quests;
        if let Some(ref spec) = spec {
            quest_settings.completion_box = quest_settings.completion_box.or(spec.quest_box);
        }
        let quests = QuestEngine::with_standard_pools(
            store.clone(),
            clock.clone(),
            progression.clone(),
            quest_settings,
        )?;

        let event = match spec {
            Some(spec) => Some(EventCog::new(
                spec,
                store.clone(),
                catalog.clone(),
                factory.clone(),
                quests.clone(),
            )?),
            None => None,
        };
        info!(
            "game assembled: event={}, {} quests per cadence",
            settings.event,
            quests.settings().per_cadence
        );

        let hooks = GameHooks::new(
            store.clone(),
            catalog.clone(),
            quests.clone(),
            progression.clone(),
            event.clone(),
            settings.catch_xp,
        );
        Ok(Self {
            store,
            catalog,
            clock,
            factory,
            progression,
            quests,
            event,
            hooks,
        })
    }
}
