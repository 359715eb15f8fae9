//! Bot runtime: wires config, storage and game services together and drives them from a
//! console stand-in for the chat gateway.
//!
//! # Console protocol
//!
//! Each stdin line is `<player_id>[:name] <message>`. Messages starting with the command
//! prefix are chat commands; their replies are printed. Messages starting with `@` inject a
//! game event for that player, for example `42 @catch 4` or `42 @trade 7`. Direct messages
//! produced by the game go through the dispatcher and are printed by [`ConsoleNotifier`].
//!
//! ```rust,no_run
//! use critterbot::bot::BotServer;
//! use critterbot::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let mut server = BotServer::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use super::dispatch::{start_dispatcher, NotificationHandle, Notifier};
use super::expiry::start_expiry_watcher;
use crate::config::Config;
use crate::game::catalog::{SpeciesCatalog, StaticCatalog};
use crate::game::clock::SystemClock;
use crate::game::commands::CommandHandler;
use crate::game::creature::{roll_gender, BASE_SHINY_CHANCE};
use crate::game::errors::GameError;
use crate::game::hooks::GameEvent;
use crate::game::storage::{MemberStore, SledMemberStoreBuilder};
use crate::game::types::{Gender, PlayerId, SpeciesId};
use crate::game::Game;
use crate::logutil::escape_log;

/// Prints direct messages to stdout.
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, player: PlayerId, text: &str) -> Result<(), GameError> {
        println!("[DM -> {}]\n{}", player, text);
        Ok(())
    }
}

/// Totals from a [`BotServer::simulate`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationReport {
    pub players: u32,
    pub events: u64,
    pub notices: u64,
    pub failures: u64,
}

pub struct BotServer {
    config: Config,
    game: Game,
    commands: CommandHandler,
}

impl BotServer {
    /// Open storage, load the species catalog and assemble the game.
    pub async fn new(config: Config) -> Result<Self> {
        tokio::fs::create_dir_all(&config.storage.data_dir)
            .await
            .with_context(|| format!("Failed to create data dir {}", config.storage.data_dir))?;
        let species_path = config.storage.species_path();
        let catalog = StaticCatalog::load_from_json(&species_path)
            .with_context(|| format!("Failed to load species from {}", species_path.display()))?;
        info!("loaded {} species", catalog.len());

        let store = SledMemberStoreBuilder::new(config.storage.members_path())
            .with_cache(config.storage.cache_enabled)
            .open()
            .context("Failed to open member store")?;

        let game = Game::assemble(
            Arc::new(store),
            Arc::new(catalog),
            Arc::new(SystemClock),
            config.game_settings()?,
        )?;
        Ok(Self::with_game(config, game))
    }

    /// Build around an already assembled game.
    pub fn with_game(config: Config, game: Game) -> Self {
        let commands = CommandHandler::new(
            game.clone(),
            config.bot.command_prefix.clone(),
            config.bot.owner_ids.clone(),
        );
        Self {
            config,
            game,
            commands,
        }
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub async fn run(&mut self) -> Result<()> {
        info!(
            "{} starting (event: {})",
            self.config.bot.name, self.config.event.preset
        );
        let notifications = start_dispatcher(Arc::new(ConsoleNotifier));
        let (ready_tx, ready_rx) = watch::channel(false);
        let watcher = start_expiry_watcher(
            self.game.quests.clone(),
            notifications.clone(),
            self.config.quests.watcher_interval(),
            ready_rx,
            self.config.quests.notify_on_refresh,
            self.config.bot.command_prefix.clone(),
        );

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let _ = ready_tx.send(true);
        info!("{} ready; reading console input", self.config.bot.name);

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            for reply in self.handle_line(&line, &notifications).await {
                                println!("{}", reply);
                            }
                        }
                        Ok(None) => {
                            info!("console input closed");
                            break;
                        }
                        Err(e) => {
                            warn!("console read failed: {}", e);
                            break;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        watcher.stop().await;
        notifications.shutdown().await;
        info!("{} stopped", self.config.bot.name);
        Ok(())
    }

    /// Handle one console line and return what should be printed back.
    pub async fn handle_line(&self, line: &str, notifications: &NotificationHandle) -> Vec<String> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }
        let Some((player, username, text)) = split_console_line(line) else {
            return vec!["Console lines look like `<player_id>[:name] <message>`.".into()];
        };

        if let Some(spec) = text.strip_prefix('@') {
            return match self.console_event(player, spec) {
                Ok(event) => match self.game.hooks.dispatch(event).await {
                    Ok(notices) => {
                        let count = notices.len();
                        for notice in notices {
                            notifications.enqueue(notice);
                        }
                        vec![format!("ok ({} notice(s))", count)]
                    }
                    Err(e) => {
                        warn!("game event from console failed: {}", e);
                        vec![format!("event failed: {}", e)]
                    }
                },
                Err(usage) => vec![usage],
            };
        }

        match self.commands.handle(player, &username, text).await {
            Ok(Some(replies)) => replies,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(
                    "command '{}' from {} failed: {}",
                    escape_log(text),
                    player,
                    e
                );
                vec!["Something went wrong, please try again.".into()]
            }
        }
    }

    fn console_event(&self, player: PlayerId, spec: &str) -> Result<GameEvent, String> {
        let words: Vec<&str> = spec.split_whitespace().collect();
        let num = |at: usize| words.get(at).and_then(|w| w.parse::<u64>().ok());
        match words.first().copied() {
            Some("catch") => {
                let species_id = num(1).ok_or("usage: @catch <species_id> [shiny]")? as SpeciesId;
                let gender = self.roll_console_gender(species_id)?;
                Ok(GameEvent::Catch {
                    player,
                    species_id,
                    gender,
                    shiny: words.get(2) == Some(&"shiny"),
                })
            }
            Some("evolve") => {
                let species_id = num(1).ok_or("usage: @evolve <species_id>")? as SpeciesId;
                let gender = self.roll_console_gender(species_id)?;
                Ok(GameEvent::Evolve {
                    player,
                    species_id,
                    gender,
                })
            }
            Some("trade") => Ok(GameEvent::Trade {
                first: player,
                second: num(1).ok_or("usage: @trade <other_player>")?,
            }),
            Some("release") => Ok(GameEvent::Release {
                player,
                count: num(1).unwrap_or(1) as u32,
            }),
            Some("sell") => Ok(GameEvent::MarketPurchase {
                buyer: num(1).ok_or("usage: @sell <buyer> <price>")?,
                seller: player,
                price: num(2).ok_or("usage: @sell <buyer> <price>")? as u32,
            }),
            _ => Err("events: @catch, @evolve, @trade, @release, @sell".into()),
        }
    }

    fn roll_console_gender(&self, species_id: SpeciesId) -> Result<Gender, String> {
        let species = self
            .game
            .catalog
            .by_id(species_id)
            .ok_or_else(|| format!("unknown species {}", species_id))?;
        roll_gender(&mut rand::thread_rng(), &species.gender_ratio).map_err(|e| e.to_string())
    }

    /// Register `players` synthetic trainers and push `rounds` of random game events through
    /// the hooks. Notices go to `notifications`.
    pub async fn simulate(
        &self,
        players: u32,
        rounds: u32,
        seed: u64,
        notifications: &NotificationHandle,
    ) -> Result<SimulationReport> {
        let mut report = SimulationReport {
            players,
            ..SimulationReport::default()
        };
        if players == 0 {
            return Ok(report);
        }
        let ids: Vec<PlayerId> = (1..=players as PlayerId).collect();
        for id in &ids {
            self.game.store.create(*id, &format!("trainer{}", id)).await?;
        }

        let mut rng = StdRng::seed_from_u64(seed);
        for round in 0..rounds {
            for (i, id) in ids.iter().enumerate() {
                for event in self.random_events(&mut rng, *id, ids[(i + 1) % ids.len()], round)? {
                    report.events += 1;
                    match self.game.hooks.dispatch(event).await {
                        Ok(notices) => {
                            report.notices += notices.len() as u64;
                            for notice in notices {
                                notifications.enqueue(notice);
                            }
                        }
                        Err(e) => {
                            report.failures += 1;
                            warn!("simulated event failed: {}", e);
                        }
                    }
                }
            }
            debug!("simulation round {} done", round + 1);
        }
        info!(
            "simulated {} event(s) for {} player(s): {} notice(s), {} failure(s)",
            report.events, report.players, report.notices, report.failures
        );
        Ok(report)
    }

    fn random_events(
        &self,
        rng: &mut StdRng,
        player: PlayerId,
        partner: PlayerId,
        round: u32,
    ) -> Result<Vec<GameEvent>, GameError> {
        let pool = self.game.catalog.catchable();
        let Some(species) = pool.choose(rng) else {
            return Ok(Vec::new());
        };
        let mut events = vec![GameEvent::Catch {
            player,
            species_id: species.id,
            gender: roll_gender(rng, &species.gender_ratio)?,
            shiny: rng.gen_bool(BASE_SHINY_CHANCE),
        }];
        if round % 3 == 2 && partner != player {
            events.push(GameEvent::Trade {
                first: player,
                second: partner,
            });
            events.push(GameEvent::MarketPurchase {
                buyer: partner,
                seller: player,
                price: rng.gen_range(100..5_000),
            });
        }
        if round % 5 == 4 {
            events.push(GameEvent::Evolve {
                player,
                species_id: species.id,
                gender: Gender::Unknown,
            });
            events.push(GameEvent::Release {
                player,
                count: rng.gen_range(1..4),
            });
        }
        Ok(events)
    }

    pub async fn show_status(&self) -> Result<()> {
        println!("=== {} Status ===", self.config.bot.name);
        println!("Event: {}", self.config.event.preset);
        println!("Command prefix: {}", self.config.bot.command_prefix);
        println!("Species loaded: {}", self.game.catalog.all().len());
        let ids = self.game.store.list_ids().await?;
        println!("Registered players: {}", ids.len());
        if let Some(ref cog) = self.game.event {
            let spent = self.game.store.counter(&cog.spec().community_counter).await?;
            println!("Community coins spent: {}", spent);
        }
        Ok(())
    }
}

fn split_console_line(line: &str) -> Option<(PlayerId, String, &str)> {
    let (who, text) = line.split_once(char::is_whitespace)?;
    let (id, name) = match who.split_once(':') {
        Some((id, name)) => (id, name.to_string()),
        None => (who, format!("player{}", who)),
    };
    Some((id.parse().ok()?, name, text.trim()))
}
