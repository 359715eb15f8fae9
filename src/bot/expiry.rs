//! Background quest-expiry watcher.
//!
//! Waits until the bot reports ready, then sweeps every player on a fixed interval and
//! regenerates fully-expired quest sets. Players who keep notifications on get a DM for each
//! refresh. A failed sweep is logged and retried on the next tick.

use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use super::dispatch::NotificationHandle;
use crate::game::quest::{QuestEngine, RefreshNotice};
use crate::game::types::Cadence;

pub struct ExpiryWatcher {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ExpiryWatcher {
    /// Stop the loop and wait for the current sweep to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            warn!("expiry watcher ended abnormally: {}", e);
        }
    }
}

pub fn refresh_lines(notice: &RefreshNotice, prefix: &str) -> Vec<String> {
    let names: Vec<&str> = notice.cadences.iter().map(Cadence::name).collect();
    vec![
        format!("Your {} quests have been refreshed!", names.join(" and ")),
        format!(
            "Check them with `{}quests`, or turn these messages off with `{}notify off`.",
            prefix, prefix
        ),
    ]
}

pub fn start_expiry_watcher(
    engine: QuestEngine,
    notifications: NotificationHandle,
    every: Duration,
    mut ready: watch::Receiver<bool>,
    notify_on_refresh: bool,
    prefix: String,
) -> ExpiryWatcher {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        while !*ready.borrow_and_update() {
            tokio::select! {
                changed = ready.changed() => {
                    if changed.is_err() {
                        debug!("ready signal dropped before startup; watcher not started");
                        return;
                    }
                }
                _ = &mut shutdown_rx => return,
            }
        }
        info!("quest expiry watcher running every {:?}", every);

        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match engine.sweep_expired().await {
                        Ok(notices) => {
                            if !notices.is_empty() {
                                debug!("refreshed quests for {} player(s)", notices.len());
                            }
                            for notice in notices {
                                if notify_on_refresh && notice.notify {
                                    notifications.notify(notice.player_id, refresh_lines(&notice, &prefix));
                                }
                            }
                        }
                        Err(e) => warn!("quest sweep failed: {}", e),
                    }
                }
                _ = &mut shutdown_rx => break,
            }
        }
        debug!("quest expiry watcher stopped");
    });

    ExpiryWatcher {
        shutdown: Some(shutdown_tx),
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_message_names_cadences() {
        let notice = RefreshNotice {
            player_id: 1,
            cadences: vec![Cadence::Daily, Cadence::Weekly],
            notify: true,
        };
        let lines = refresh_lines(&notice, "!");
        assert_eq!(lines[0], "Your daily and weekly quests have been refreshed!");
        assert!(lines[1].contains("!notify off"));
    }
}
