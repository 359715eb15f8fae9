//! Quest progress, exactly-once completion and set regeneration against a real store.
mod common;

use chrono::Duration;
use common::{harness, start_time};
use critterbot::game::clock::Clock;
use critterbot::game::types::{
    Cadence, Gender, QuestCondition, QuestEvent, QuestRecord, QuestSubject,
};
use critterbot::game::GameSettings;

fn fire_quest(count: u32) -> QuestRecord {
    QuestRecord::new(
        Cadence::Daily,
        QuestEvent::Catch,
        Some(QuestCondition::of_type("Fire")),
        count,
        format!("Catch {} Fire-type pokémon", count),
        start_time() + Duration::days(1),
    )
}

/// Unrelated weekly quest far in the future so the weekly set is never regenerated.
fn parked_weekly() -> QuestRecord {
    QuestRecord::new(
        Cadence::Weekly,
        QuestEvent::Trade,
        None,
        5,
        "Trade 5 times".to_string(),
        start_time() + Duration::days(7),
    )
}

fn daily_quest(description: &str, expires_in: Duration) -> QuestRecord {
    QuestRecord::new(
        Cadence::Daily,
        QuestEvent::Release,
        None,
        3,
        description.to_string(),
        start_time() + expires_in,
    )
}

#[tokio::test]
async fn test_fire_quest_completes_on_tenth_matching_catch() {
    let h = harness(GameSettings::default());
    h.register(1, "ash").await;
    let quest = fire_quest(10);
    let quest_id = quest.id;
    h.install_quests(1, Cadence::Daily, vec![quest]).await;
    h.install_quests(1, Cadence::Weekly, vec![parked_weekly()]).await;

    let charmander = QuestSubject::from_species(
        h.game.catalog.require(4).unwrap(),
        Some(Gender::Male),
    );
    let squirtle = QuestSubject::from_species(
        h.game.catalog.require(7).unwrap(),
        Some(Gender::Female),
    );

    for _ in 0..9 {
        let done = h
            .game
            .quests
            .on_event(1, QuestEvent::Catch, &[charmander.clone()], 1)
            .await
            .unwrap();
        assert!(done.is_empty());
    }

    // Water catches do not count toward a Fire quest
    let done = h
        .game
        .quests
        .on_event(1, QuestEvent::Catch, &[squirtle], 1)
        .await
        .unwrap();
    assert!(done.is_empty());
    let record = h.record(1).await;
    assert_eq!(record.quests.iter().find(|q| q.id == quest_id).unwrap().progress, 9);

    let done = h
        .game
        .quests
        .on_event(1, QuestEvent::Catch, &[charmander.clone()], 1)
        .await
        .unwrap();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].quest.id, quest_id);
    assert_eq!(done[0].xp, 100);
    assert!(done[0]
        .message_lines()
        .first()
        .unwrap()
        .contains("daily quest"));

    let record = h.record(1).await;
    assert_eq!(record.xp, 100);
    let stored = record.quests.iter().find(|q| q.id == quest_id).unwrap();
    assert!(stored.completed);
    assert_eq!(stored.progress, 10);

    // A finished quest never pays twice
    let done = h
        .game
        .quests
        .on_event(1, QuestEvent::Catch, &[charmander], 1)
        .await
        .unwrap();
    assert!(done.is_empty());
    assert_eq!(h.record(1).await.xp, 100);
}

#[tokio::test]
async fn test_progress_is_clamped_to_target() {
    let h = harness(GameSettings::default());
    h.register(1, "ash").await;
    let quest = fire_quest(3);
    let quest_id = quest.id;
    h.install_quests(1, Cadence::Daily, vec![quest]).await;
    h.install_quests(1, Cadence::Weekly, vec![parked_weekly()]).await;

    let vulpix = QuestSubject::from_species(h.game.catalog.require(37).unwrap(), None);
    let done = h
        .game
        .quests
        .on_event(1, QuestEvent::Catch, &[vulpix], 25)
        .await
        .unwrap();
    assert_eq!(done.len(), 1);
    let record = h.record(1).await;
    let stored = record.quests.iter().find(|q| q.id == quest_id).unwrap();
    assert_eq!(stored.progress, 3);
    assert_eq!(record.xp, 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_events_complete_quest_once() {
    let h = harness(GameSettings::default());
    h.register(1, "ash").await;
    let quest = QuestRecord::new(
        Cadence::Daily,
        QuestEvent::Release,
        None,
        2,
        "Release 2 pokémon".to_string(),
        start_time() + Duration::days(1),
    );
    h.install_quests(1, Cadence::Daily, vec![quest]).await;
    h.install_quests(1, Cadence::Weekly, vec![parked_weekly()]).await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let quests = h.game.quests.clone();
        tasks.push(tokio::spawn(async move {
            quests
                .on_event(1, QuestEvent::Release, &[], 1)
                .await
                .unwrap()
                .len()
        }));
    }
    let mut completions = 0;
    for task in tasks {
        completions += task.await.unwrap();
    }

    assert_eq!(completions, 1);
    assert_eq!(h.record(1).await.xp, 100);
}

#[tokio::test]
async fn test_set_regenerates_only_when_every_record_expired() {
    let h = harness(GameSettings::default());
    h.register(1, "ash").await;
    let early = daily_quest("Release 3 pokémon", Duration::hours(1));
    let late = daily_quest("Release 3 more pokémon", Duration::hours(3));
    let old_ids = [early.id, late.id];
    h.install_quests(1, Cadence::Daily, vec![early, late]).await;
    h.install_quests(1, Cadence::Weekly, vec![parked_weekly()]).await;

    h.clock.advance(Duration::hours(2));
    let refreshed = h.game.quests.refresh_expired(1).await.unwrap();
    assert!(refreshed.is_empty());
    let daily: Vec<_> = h.record(1).await.quests_of(Cadence::Daily).map(|q| q.id).collect();
    assert_eq!(daily, old_ids);

    h.clock.advance(Duration::hours(2));
    let refreshed = h.game.quests.refresh_expired(1).await.unwrap();
    assert_eq!(refreshed, vec![Cadence::Daily]);

    let now = h.clock.now();
    let record = h.record(1).await;
    let daily: Vec<_> = record.quests_of(Cadence::Daily).cloned().collect();
    assert_eq!(daily.len(), 5);
    assert!(daily.iter().all(|q| !old_ids.contains(&q.id)));
    assert!(daily.iter().all(|q| q.expires == daily[0].expires && q.expires > now));
    assert!(daily.iter().all(|q| q.progress == 0 && !q.completed));
    assert_eq!(record.quests_of(Cadence::Weekly).count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_replaces_set_once() {
    let h = harness(GameSettings::default());
    h.register(1, "ash").await;
    h.install_quests(
        1,
        Cadence::Daily,
        vec![daily_quest("Release 3 pokémon", Duration::hours(1))],
    )
    .await;
    h.install_quests(1, Cadence::Weekly, vec![parked_weekly()]).await;
    h.clock.advance(Duration::hours(2));

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let quests = h.game.quests.clone();
        tasks.push(tokio::spawn(async move {
            quests.refresh_expired(1).await.unwrap()
        }));
    }
    let mut replaced = 0;
    for task in tasks {
        replaced += task
            .await
            .unwrap()
            .iter()
            .filter(|c| **c == Cadence::Daily)
            .count();
    }

    assert_eq!(replaced, 1);
    assert_eq!(h.record(1).await.quests_of(Cadence::Daily).count(), 5);
}

#[tokio::test]
async fn test_sweep_skips_players_without_quests() {
    let h = harness(GameSettings::default());
    h.register(1, "never_looked").await;
    h.register(2, "misty").await;
    h.install_quests(
        2,
        Cadence::Daily,
        vec![daily_quest("Release 3 pokémon", Duration::hours(1))],
    )
    .await;
    h.install_quests(2, Cadence::Weekly, vec![parked_weekly()]).await;
    h.clock.advance(Duration::hours(2));

    let notices = h.game.quests.sweep_expired().await.unwrap();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].player_id, 2);
    assert_eq!(notices[0].cadences, vec![Cadence::Daily]);
    assert!(notices[0].notify);
    assert!(h.record(1).await.quests.is_empty());

    // Nothing left to do on a second pass
    assert!(h.game.quests.sweep_expired().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_first_look_generates_both_sets() {
    let h = harness(GameSettings::default());
    h.register(1, "ash").await;
    let quests = h.game.quests.active_quests(1).await.unwrap();
    assert_eq!(quests.iter().filter(|q| q.cadence == Cadence::Daily).count(), 5);
    assert_eq!(quests.iter().filter(|q| q.cadence == Cadence::Weekly).count(), 5);
}
