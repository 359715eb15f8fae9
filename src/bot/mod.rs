//! Runtime around the game: outbound message dispatch, the quest-expiry watcher and the
//! console server that feeds commands and game events in.

pub mod dispatch;
pub mod expiry;
pub mod server;

pub use dispatch::{start_dispatcher, NotificationHandle, Notifier};
pub use expiry::{start_expiry_watcher, ExpiryWatcher};
pub use server::{BotServer, ConsoleNotifier, SimulationReport};
