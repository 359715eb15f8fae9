//! # Configuration
//!
//! TOML configuration for the bot, loaded once at startup.
//!
//! ## Sections
//!
//! - [`BotConfig`] - display name, command prefix, admin owner ids
//! - [`StorageConfig`] - data directory, species catalog, member cache
//! - [`LoggingConfig`] - level and optional log file
//! - [`QuestConfig`] - quest set size, XP payouts, expiry watcher cadence
//! - [`ProgressionConfig`] - XP curve, per-level rewards, XP per catch
//! - [`EventConfig`] - which seasonal event is running
//!
//! ## Example
//!
//! ```toml
//! [bot]
//! name = "Critterbot"
//! command_prefix = "!"
//! owner_ids = [398686833153933313]
//!
//! [storage]
//! data_dir = "./data"
//! species_file = "./data/species.json"
//! cache_enabled = true
//!
//! [logging]
//! level = "info"
//!
//! [quests]
//! per_cadence = 5
//! daily_xp = 100
//! weekly_xp = 500
//! watcher_interval_secs = 20
//! notify_on_refresh = true
//!
//! [progression]
//! base_xp = 1000
//! extra_xp = 500
//! capped_level = 50
//! catch_xp = 10
//!
//! [[progression.rewards]]
//! kind = "currency"
//! currency = "shards"
//! amount = 50
//!
//! [event]
//! preset = "easter_2024"
//! ```
//!
//! `critterbot init` writes a file like this with every default filled in.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::game::events::EventPreset;
use crate::game::progression::{LevelReward, LevelRewardTable, XpCurve};
use crate::game::quest::QuestSettings;
use crate::game::types::{Currency, PlayerId};
use crate::game::GameSettings;

/// Prefixes a command may start with.
pub const ALLOWED_PREFIXES: [&str; 6] = ["!", "?", "$", ".", ">", "+"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub bot: BotConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub quests: QuestConfig,
    #[serde(default)]
    pub progression: ProgressionConfig,
    #[serde(default)]
    pub event: EventConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BotConfig {
    pub name: String,
    #[serde(default = "default_prefix")]
    pub command_prefix: String,
    /// Players allowed to run admin commands.
    #[serde(default)]
    pub owner_ids: Vec<PlayerId>,
}

fn default_prefix() -> String {
    "!".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    pub data_dir: String,
    /// JSON species catalog; defaults to `<data_dir>/species.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species_file: Option<String>,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
}

impl StorageConfig {
    pub fn members_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("members")
    }

    pub fn species_path(&self) -> PathBuf {
        match self.species_file {
            Some(ref file) => PathBuf::from(file),
            None => PathBuf::from(&self.data_dir).join("species.json"),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestConfig {
    pub per_cadence: usize,
    pub daily_xp: i64,
    pub weekly_xp: i64,
    pub watcher_interval_secs: u64,
    #[serde(default = "default_true")]
    pub notify_on_refresh: bool,
}

impl Default for QuestConfig {
    fn default() -> Self {
        let settings = QuestSettings::default();
        Self {
            per_cadence: settings.per_cadence,
            daily_xp: settings.daily_xp,
            weekly_xp: settings.weekly_xp,
            watcher_interval_secs: 20,
            notify_on_refresh: true,
        }
    }
}

impl QuestConfig {
    pub fn watcher_interval(&self) -> Duration {
        Duration::from_secs(self.watcher_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressionConfig {
    pub base_xp: u64,
    pub extra_xp: u64,
    pub capped_level: u32,
    #[serde(default = "default_catch_xp")]
    pub catch_xp: i64,
    /// Reward for reaching level `n + 1` is `rewards[n]`; later levels get `fallback`.
    #[serde(default)]
    pub rewards: Vec<LevelReward>,
    #[serde(default = "default_fallback")]
    pub fallback: LevelReward,
}

fn default_catch_xp() -> i64 {
    10
}

fn default_fallback() -> LevelReward {
    LevelRewardTable::default().fallback
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        let curve = XpCurve::default();
        Self {
            base_xp: curve.base,
            extra_xp: curve.extra,
            capped_level: curve.capped_level,
            catch_xp: default_catch_xp(),
            rewards: vec![
                LevelReward::Currency {
                    currency: Currency::Pokecoins,
                    amount: 5_000,
                },
                LevelReward::Currency {
                    currency: Currency::Shards,
                    amount: 50,
                },
                LevelReward::Badge {
                    badge: "event_veteran".to_string(),
                },
            ],
            fallback: default_fallback(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventConfig {
    pub preset: EventPreset,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            preset: EventPreset::None,
        }
    }
}

impl Config {
    /// Load and validate a configuration file.
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path))?;
        let config = Self::from_toml(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write a default configuration file.
    pub async fn create_default(path: &str) -> Result<()> {
        let content = toml::to_string_pretty(&Config::default())
            .context("Failed to serialize default config")?;
        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config file {}", path))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !ALLOWED_PREFIXES.contains(&self.bot.command_prefix.as_str()) {
            bail!(
                "command_prefix '{}' must be one of {}",
                self.bot.command_prefix,
                ALLOWED_PREFIXES.join(" ")
            );
        }
        if self.quests.per_cadence == 0 {
            bail!("quests.per_cadence must be at least 1");
        }
        if self.quests.watcher_interval_secs == 0 {
            bail!("quests.watcher_interval_secs must be at least 1");
        }
        if self.quests.daily_xp < 0 || self.quests.weekly_xp < 0 || self.progression.catch_xp < 0
        {
            bail!("XP payouts cannot be negative");
        }
        self.curve()?;
        self.level_rewards()
            .check_shape()
            .map_err(|e| anyhow!("progression rewards: {}", e))?;
        Ok(())
    }

    fn level_rewards(&self) -> LevelRewardTable {
        LevelRewardTable {
            rewards: self.progression.rewards.clone(),
            fallback: self.progression.fallback.clone(),
        }
    }

    pub fn curve(&self) -> Result<XpCurve> {
        XpCurve::new(
            self.progression.base_xp,
            self.progression.extra_xp,
            self.progression.capped_level,
        )
        .map_err(|e| anyhow!("progression: {}", e))
    }

    /// Game tunables derived from this file.
    pub fn game_settings(&self) -> Result<GameSettings> {
        Ok(GameSettings {
            curve: self.curve()?,
            level_rewards: self.level_rewards(),
            quests: QuestSettings {
                per_cadence: self.quests.per_cadence,
                daily_xp: self.quests.daily_xp,
                weekly_xp: self.quests.weekly_xp,
                completion_box: None,
            },
            event: self.event.preset,
            catch_xp: self.progression.catch_xp,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bot: BotConfig {
                name: "Critterbot".to_string(),
                command_prefix: default_prefix(),
                owner_ids: Vec::new(),
            },
            storage: StorageConfig {
                data_dir: "./data".to_string(),
                species_file: None,
                cache_enabled: true,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("critterbot.log".to_string()),
            },
            quests: QuestConfig::default(),
            progression: ProgressionConfig::default(),
            event: EventConfig::default(),
        }
    }
}
