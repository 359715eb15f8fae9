//! Fan-out of external game events into quests, progression and the running event.

use std::sync::Arc;

use log::{error, warn};

use super::catalog::SpeciesCatalog;
use super::errors::GameError;
use super::events::EventCog;
use super::progression::ProgressionLedger;
use super::quest::{QuestCompletion, QuestEngine};
use super::storage::{MemberStore, MemberUpdate, SetField};
use super::types::{Field, Gender, PlayerId, QuestEvent, QuestSubject, SpeciesId};

/// Something that happened in the wider game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    Catch {
        player: PlayerId,
        species_id: SpeciesId,
        gender: Gender,
        shiny: bool,
    },
    Trade {
        first: PlayerId,
        second: PlayerId,
    },
    Evolve {
        player: PlayerId,
        species_id: SpeciesId,
        gender: Gender,
    },
    Release {
        player: PlayerId,
        count: u32,
    },
    MarketPurchase {
        buyer: PlayerId,
        seller: PlayerId,
        price: u32,
    },
}

/// Lines to deliver to one player by direct message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub player_id: PlayerId,
    pub lines: Vec<String>,
}

#[derive(Clone)]
pub struct GameHooks {
    store: Arc<dyn MemberStore>,
    catalog: Arc<dyn SpeciesCatalog>,
    quests: QuestEngine,
    progression: ProgressionLedger,
    event: Option<EventCog>,
    catch_xp: i64,
}

impl GameHooks {
    pub fn new(
        store: Arc<dyn MemberStore>,
        catalog: Arc<dyn SpeciesCatalog>,
        quests: QuestEngine,
        progression: ProgressionLedger,
        event: Option<EventCog>,
        catch_xp: i64,
    ) -> Self {
        Self {
            store,
            catalog,
            quests,
            progression,
            event,
            catch_xp,
        }
    }

    pub async fn dispatch(&self, event: GameEvent) -> Result<Vec<Notice>, GameError> {
        match event {
            GameEvent::Catch {
                player,
                species_id,
                gender,
                shiny,
            } => self.on_catch(player, species_id, gender, shiny).await,
            GameEvent::Trade { first, second } => {
                let mut notices = Vec::new();
                for side in [first, second] {
                    // Each side is its own atomic write; one failing must not undo the other.
                    if let Some(done) = self.with_retry(side, QuestEvent::Trade, 1).await {
                        notices.extend(self.notice(side, &done).await);
                    }
                }
                Ok(notices)
            }
            GameEvent::Evolve {
                player,
                species_id,
                gender,
            } => {
                let species = self.catalog.require(species_id)?;
                let subject = QuestSubject::from_species(species, Some(gender));
                let done = self
                    .quests
                    .on_event(player, QuestEvent::Evolve, &[subject], 1)
                    .await?;
                Ok(self.notice(player, &done).await.into_iter().collect())
            }
            GameEvent::Release { player, count } => {
                let done = self
                    .quests
                    .on_event(player, QuestEvent::Release, &[], count)
                    .await?;
                Ok(self.notice(player, &done).await.into_iter().collect())
            }
            GameEvent::MarketPurchase {
                buyer,
                seller,
                price,
            } => {
                let mut notices = Vec::new();
                for (side, event) in [(buyer, QuestEvent::MarketBuy), (seller, QuestEvent::MarketSell)] {
                    if let Some(done) = self.with_retry(side, event, price).await {
                        notices.extend(self.notice(side, &done).await);
                    }
                }
                Ok(notices)
            }
        }
    }

    async fn on_catch(
        &self,
        player: PlayerId,
        species_id: SpeciesId,
        gender: Gender,
        shiny: bool,
    ) -> Result<Vec<Notice>, GameError> {
        let species = self.catalog.require(species_id)?;
        let Some(record) = self.store.get(player).await? else {
            return Ok(Vec::new());
        };
        let mut lines = Vec::new();

        if record.shiny_hunt == Some(species.dex_number) {
            let streak = if shiny {
                MemberUpdate::new().set(SetField::Counter(Field::ShinyStreak, 0))
            } else {
                MemberUpdate::new().increment(Field::ShinyStreak, 1)
            };
            self.store.update(player, &streak).await?;
        }

        match self.event {
            Some(ref cog) => {
                let outcome = cog.record_catch(player).await?;
                lines.extend(outcome.message);
            }
            None => {
                self.store
                    .update(player, &MemberUpdate::new().increment(Field::Catches, 1))
                    .await?;
            }
        }

        if self.catch_xp > 0 {
            let report = self.progression.grant_xp(player, self.catch_xp).await?;
            lines.extend(report.summary_lines());
        }

        let subject = QuestSubject::from_species(species, Some(gender));
        let done = self
            .quests
            .on_event(player, QuestEvent::Catch, &[subject], 1)
            .await?;
        if let Some(notice) = self.notice(player, &done).await {
            lines.extend(notice.lines);
        }

        if lines.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Notice {
            player_id: player,
            lines,
        }])
    }

    /// Feed one side of a two-player event. Progress and settlement are retried once each,
    /// separately, so a failed settlement never counts the event twice. Failures are logged,
    /// not raised.
    async fn with_retry(
        &self,
        player: PlayerId,
        event: QuestEvent,
        count: u32,
    ) -> Option<Vec<QuestCompletion>> {
        if count == 0 {
            return Some(Vec::new());
        }
        let progressed = match self.quests.apply_progress(player, event, &[], count).await {
            Ok(n) => Ok(n),
            Err(first) => {
                warn!(
                    "{:?} progress for {} failed ({}), retrying",
                    event, player, first
                );
                self.quests.apply_progress(player, event, &[], count).await
            }
        };
        if let Err(e) = progressed {
            error!("{:?} progress for {} failed after retry: {}", event, player, e);
            return None;
        }

        match self.quests.settle(player).await {
            Ok(done) => Some(done),
            Err(first) => {
                warn!("settling quests for {} failed ({}), retrying", player, first);
                match self.quests.settle(player).await {
                    Ok(done) => Some(done),
                    Err(second) => {
                        error!(
                            "settling quests for {} failed after retry: {}",
                            player, second
                        );
                        None
                    }
                }
            }
        }
    }

    /// Completion lines plus any bingo lines they finished.
    async fn notice(&self, player: PlayerId, done: &[QuestCompletion]) -> Option<Notice> {
        let mut lines: Vec<String> = done.iter().flat_map(|c| c.message_lines()).collect();
        if !done.is_empty() {
            if let Some(ref cog) = self.event {
                match cog.settle_bingos(player).await {
                    Ok(bingo) => lines.extend(bingo),
                    Err(e) => warn!("bingo check for {} failed: {}", player, e),
                }
            }
        }
        if lines.is_empty() {
            return None;
        }
        Some(Notice {
            player_id: player,
            lines,
        })
    }
}

