//! Hooks and the quest sweep when the store fails part way through.
mod common;

use chrono::Duration;
use common::{flaky_harness, start_time};
use critterbot::game::hooks::GameEvent;
use critterbot::game::types::{Cadence, QuestEvent, QuestRecord};
use critterbot::game::GameSettings;

fn daily(event: QuestEvent, count: u32, expires_in: Duration) -> QuestRecord {
    QuestRecord::new(
        Cadence::Daily,
        event,
        None,
        count,
        "Test quest".to_string(),
        start_time() + expires_in,
    )
}

fn parked_weekly() -> QuestRecord {
    QuestRecord::new(
        Cadence::Weekly,
        QuestEvent::Evolve,
        None,
        5,
        "Evolve 5 pokémon".to_string(),
        start_time() + Duration::days(7),
    )
}

#[tokio::test]
async fn test_failed_settle_does_not_count_a_trade_twice() {
    let (h, store) = flaky_harness(GameSettings::default());
    for (id, name) in [(1, "ash"), (2, "misty")] {
        h.register(id, name).await;
        h.install_quests(
            id,
            Cadence::Daily,
            vec![daily(QuestEvent::Trade, 3, Duration::days(1))],
        )
        .await;
        h.install_quests(id, Cadence::Weekly, vec![parked_weekly()]).await;
    }

    // Ash's progress write lands, then the read that settles it fails once
    store.fail_read_after_next_write();
    let notices = h
        .game
        .hooks
        .dispatch(GameEvent::Trade { first: 1, second: 2 })
        .await
        .unwrap();
    assert!(notices.is_empty());

    for id in [1, 2] {
        let record = h.record(id).await;
        let trade = record.quests_of(Cadence::Daily).next().unwrap();
        assert_eq!(trade.progress, 1, "player {} trade progress", id);
        assert!(!trade.completed);
    }
}

#[tokio::test]
async fn test_failed_settle_is_retried_and_pays_once() {
    let (h, store) = flaky_harness(GameSettings::default());
    h.register(1, "ash").await;
    h.register(2, "misty").await;
    h.install_quests(
        1,
        Cadence::Daily,
        vec![daily(QuestEvent::MarketBuy, 100, Duration::days(1))],
    )
    .await;
    h.install_quests(1, Cadence::Weekly, vec![parked_weekly()]).await;

    store.fail_read_after_next_write();
    let notices = h
        .game
        .hooks
        .dispatch(GameEvent::MarketPurchase {
            buyer: 1,
            seller: 2,
            price: 250,
        })
        .await
        .unwrap();
    let to_ash: Vec<_> = notices.iter().filter(|n| n.player_id == 1).collect();
    assert_eq!(to_ash.len(), 1);

    let record = h.record(1).await;
    let quest = record.quests_of(Cadence::Daily).next().unwrap();
    assert_eq!(quest.progress, 100);
    assert!(quest.completed);
    assert_eq!(record.xp, 100);
}

#[tokio::test]
async fn test_sweep_skips_unreadable_players() {
    let (h, store) = flaky_harness(GameSettings::default());
    for (id, name) in [(1, "ash"), (2, "brock"), (3, "misty")] {
        h.register(id, name).await;
        h.install_quests(
            id,
            Cadence::Daily,
            vec![daily(QuestEvent::Release, 3, Duration::hours(1))],
        )
        .await;
        h.install_quests(id, Cadence::Weekly, vec![parked_weekly()]).await;
    }
    h.clock.advance(Duration::hours(2));
    store.make_unreadable(2);

    let notices = h.game.quests.sweep_expired().await.unwrap();
    let mut refreshed: Vec<u64> = notices.iter().map(|n| n.player_id).collect();
    refreshed.sort_unstable();
    assert_eq!(refreshed, vec![1, 3]);
    for id in [1, 3] {
        assert_eq!(h.record(id).await.quests_of(Cadence::Daily).count(), 5);
    }
}
