//! # Critterbot - seasonal events and progression for a creature-collection chat game
//!
//! Critterbot runs the event side of a chat-driven creature-collection game: openable boxes
//! with weighted reward tables, an XP ledger with per-level rewards, daily and weekly quests
//! that react to game events, and the background task that refreshes expired quests.
//!
//! ## Features
//!
//! - **Reward tables**: weighted draws with validated weights and per-entry amount ranges.
//! - **Creature factory**: level, IV, nature, gender, moves and shiny rolls with batch inserts.
//! - **Progression**: cumulative XP, closed-form levels, exactly one reward per level crossed.
//! - **Quests**: conditional daily/weekly quests with exactly-once completion payouts.
//! - **Seasonal events**: Easter, Valentine's and Christmas presets with shops and drops.
//! - **Atomic storage**: player documents in `sled`, updated by compare-and-swap.
//!
//! ## Quick Start
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
//!
//! ## Module Organization
//!
//! - [`game`] - domain services, data model and the member store
//! - [`bot`] - dispatcher, expiry watcher and console runtime
//! - [`config`] - TOML configuration and validation
//! - [`logutil`] - single-line log escaping
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  Console / Gateway   │ ← commands and game events in, replies out
//! └──────────────────────┘
//!            │
//! ┌──────────────────────┐
//! │   Game services      │ ← events, quests, progression, creatures
//! └──────────────────────┘
//!            │
//! ┌──────────────────────┐
//! │   Member store       │ ← sled documents, atomic updates, cache
//! └──────────────────────┘
//! ```

pub mod bot;
pub mod config;
pub mod game;
pub mod logutil;
