//! Outbound direct-message dispatcher.
//!
//! Game code never talks to the chat platform directly. It hands [`Notice`]s to a
//! [`NotificationHandle`]; one background task drains the queue in order, splits long notices
//! into messages of at most [`LINES_PER_MESSAGE`] lines and passes each to the [`Notifier`].
//!
//! A failed send (closed DMs, unknown user) is logged at `warn` and dropped. It never reaches
//! the caller and never stops the loop, so one unreachable player cannot hold up anyone else.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};

use crate::game::errors::GameError;
use crate::game::hooks::Notice;
use crate::game::types::PlayerId;

/// Lines packed into one direct message.
pub const LINES_PER_MESSAGE: usize = 10;

/// Whatever delivers a direct message to a player.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, player: PlayerId, text: &str) -> Result<(), GameError>;
}

enum DispatchCommand {
    Enqueue(Notice),
    Snapshot(oneshot::Sender<DispatchStats>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub notices: u64,
    pub delivered: u64,
    pub failed: u64,
}

#[derive(Clone, Debug)]
pub struct NotificationHandle {
    tx: mpsc::UnboundedSender<DispatchCommand>,
}

impl NotificationHandle {
    pub fn enqueue(&self, notice: Notice) {
        if notice.lines.is_empty() {
            return;
        }
        if self.tx.send(DispatchCommand::Enqueue(notice)).is_err() {
            warn!("notification dispatcher is gone; dropping notice");
        }
    }

    pub fn notify(&self, player: PlayerId, lines: Vec<String>) {
        self.enqueue(Notice {
            player_id: player,
            lines,
        });
    }

    /// Counters as of every notice enqueued before this call.
    pub async fn snapshot(&self) -> Option<DispatchStats> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(DispatchCommand::Snapshot(tx)).ok()?;
        rx.await.ok()
    }

    /// Deliver everything already queued, then stop.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(DispatchCommand::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

/// Split `lines` into newline-joined messages of at most `per` lines each.
pub fn chunk_lines(lines: &[String], per: usize) -> Vec<String> {
    lines.chunks(per.max(1)).map(|c| c.join("\n")).collect()
}

pub fn start_dispatcher(notifier: Arc<dyn Notifier>) -> NotificationHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<DispatchCommand>();
    let handle = NotificationHandle { tx };

    tokio::spawn(async move {
        let mut stats = DispatchStats::default();
        while let Some(cmd) = rx.recv().await {
            match cmd {
                DispatchCommand::Enqueue(notice) => {
                    stats.notices += 1;
                    for message in chunk_lines(&notice.lines, LINES_PER_MESSAGE) {
                        match notifier.send(notice.player_id, &message).await {
                            Ok(()) => stats.delivered += 1,
                            Err(e) => {
                                stats.failed += 1;
                                warn!("could not message player {}: {}", notice.player_id, e);
                            }
                        }
                    }
                }
                DispatchCommand::Snapshot(resp) => {
                    let _ = resp.send(stats);
                }
                DispatchCommand::Shutdown(done) => {
                    let _ = done.send(());
                    break;
                }
            }
        }
        debug!(
            "dispatcher stopped: {} notice(s), {} delivered, {} failed",
            stats.notices, stats.delivered, stats.failed
        );
    });

    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(PlayerId, String)>>,
    }

    #[async_trait]
    impl Notifier for Recorder {
        async fn send(&self, player: PlayerId, text: &str) -> Result<(), GameError> {
            if player == 13 {
                return Err(GameError::Delivery("DMs closed".into()));
            }
            self.sent.lock().unwrap().push((player, text.to_string()));
            Ok(())
        }
    }

    fn lines(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("line {}", i)).collect()
    }

    #[test]
    fn chunks_by_ten() {
        let chunks = chunk_lines(&lines(25), LINES_PER_MESSAGE);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].starts_with("line 1\n") && chunks[0].ends_with("line 10"));
        assert_eq!(chunks[2], "line 21\nline 22\nline 23\nline 24\nline 25");
        assert!(chunk_lines(&[], LINES_PER_MESSAGE).is_empty());
    }

    #[tokio::test]
    async fn failures_are_swallowed_and_later_notices_still_go_out() {
        let recorder = Arc::new(Recorder::default());
        let handle = start_dispatcher(recorder.clone());
        handle.notify(13, lines(3));
        handle.notify(7, lines(12));
        handle.notify(8, Vec::new());
        let stats = handle.snapshot().await.unwrap();
        assert_eq!(
            stats,
            DispatchStats {
                notices: 2,
                delivered: 2,
                failed: 1
            }
        );
        handle.shutdown().await;
        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(p, _)| *p == 7));
        assert_eq!(sent[1].1, "line 11\nline 12");
    }
}
