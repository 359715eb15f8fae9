//! XP ledger: one reward per level crossed, idempotent badges, concurrent grants.
mod common;

use std::sync::Arc;

use common::{catalog, flaky_harness, harness, start_time};
use critterbot::game::clock::ManualClock;
use critterbot::game::errors::GameError;
use critterbot::game::progression::{LevelReward, LevelRewardTable, XpCurve};
use critterbot::game::reward::RewardDescriptor;
use critterbot::game::storage::SledMemberStore;
use critterbot::game::types::{BoxKind, Currency, MAX_IV_TOTAL};
use critterbot::game::{Game, GameSettings};

/// Levels 1..=3 cost 100 each, every level after that 50.
fn settings(rewards: Vec<LevelReward>) -> GameSettings {
    GameSettings {
        curve: XpCurve::new(100, 50, 3).unwrap(),
        level_rewards: LevelRewardTable {
            rewards,
            ..LevelRewardTable::default()
        },
        ..GameSettings::default()
    }
}

#[tokio::test]
async fn test_crossing_k_levels_pays_k_rewards() {
    let h = harness(settings(vec![
        LevelReward::Currency {
            currency: Currency::Pokecoins,
            amount: 500,
        },
        LevelReward::Badge {
            badge: "hatched".to_string(),
        },
        LevelReward::Boxes {
            box_kind: BoxKind::Event,
            amount: 2,
        },
    ]));
    h.register(1, "ash").await;

    // 400 = 100 + 100 + 100 + 50 + 50
    let report = h.game.progression.grant_xp(1, 400).await.unwrap();
    assert_eq!(report.before.level, 0);
    assert_eq!(report.after.level, 5);
    assert_eq!(report.levels_gained(), 5);
    let levels: Vec<u32> = report.grants.iter().map(|g| g.level).collect();
    assert_eq!(levels, vec![1, 2, 3, 4, 5]);
    assert_eq!(report.summary_lines().len(), 5);

    let record = h.record(1).await;
    assert_eq!(record.xp, 400);
    assert_eq!(record.balance, 500);
    assert!(record.badges.contains("hatched"));
    assert_eq!(record.boxes.event, 2);
    // Levels 4 and 5 fall back to one redeem each
    assert_eq!(record.redeems, 2);

    let progress = h.game.progression.progress_of(1).await.unwrap();
    assert_eq!(progress.level, 5);
    assert_eq!(progress.xp_into_level, 0);
    assert_eq!(progress.xp_to_next, 50);
}

#[tokio::test]
async fn test_badge_is_granted_once() {
    let badge = || LevelReward::Badge {
        badge: "hatched".to_string(),
    };
    let h = harness(settings(vec![badge(), badge()]));
    h.register(1, "ash").await;

    let report = h.game.progression.grant_xp(1, 200).await.unwrap();
    assert_eq!(report.grants.len(), 2);
    assert_eq!(
        report.grants[0].reward,
        RewardDescriptor::Badge {
            badge: "hatched".to_string(),
            newly_granted: true
        }
    );
    assert_eq!(
        report.grants[1].reward,
        RewardDescriptor::Badge {
            badge: "hatched".to_string(),
            newly_granted: false
        }
    );
    assert_eq!(h.record(1).await.badges.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_grants_keep_every_point() {
    let h = harness(settings(Vec::new()));
    h.register(1, "ash").await;

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let progression = h.game.progression.clone();
        tasks.push(tokio::spawn(async move {
            progression.grant_xp(1, 35).await.unwrap().grants.len()
        }));
    }
    let mut grants = 0;
    for task in tasks {
        grants += task.await.unwrap();
    }

    let record = h.record(1).await;
    assert_eq!(record.xp, 350);
    // 350 XP is level 4; each level paid exactly one fallback redeem
    assert_eq!(grants, 4);
    assert_eq!(record.redeems, 4);
}

#[tokio::test]
async fn test_split_grants_match_single_grant() {
    let h = harness(settings(Vec::new()));
    h.register(1, "split").await;
    h.register(2, "single").await;

    let a = h.game.progression.grant_xp(1, 130).await.unwrap();
    let b = h.game.progression.grant_xp(1, 170).await.unwrap();
    let whole = h.game.progression.grant_xp(2, 300).await.unwrap();

    assert_eq!(b.after, whole.after);
    assert_eq!(a.grants.len() + b.grants.len(), whole.grants.len());
    let split = h.record(1).await;
    let single = h.record(2).await;
    assert_eq!(split.xp, single.xp);
    assert_eq!(split.redeems, single.redeems);
}

#[tokio::test]
async fn test_creature_reward_honours_shiny_and_iv_floor() {
    let h = harness(settings(vec![LevelReward::Creature {
        species_id: 150,
        shiny: true,
        min_iv_percent: 90.0,
    }]));
    h.register(1, "ash").await;

    let report = h.game.progression.grant_xp(1, 100).await.unwrap();
    assert_eq!(report.grants.len(), 1);
    match &report.grants[0].reward {
        RewardDescriptor::Creature {
            species_id,
            shiny,
            iv_percent,
            ..
        } => {
            assert_eq!(*species_id, 150);
            assert!(*shiny);
            assert!(*iv_percent >= 90.0);
        }
        other => panic!("expected a creature, got {:?}", other),
    }

    let owned = h.game.store.creatures_of(1).await.unwrap();
    assert_eq!(owned.len(), 1);
    assert!(owned[0].shiny);
    assert!(owned[0].iv_total >= 168 && owned[0].iv_total <= MAX_IV_TOTAL);
    assert_eq!(owned[0].idx, 1);
}

#[tokio::test]
async fn test_negative_xp_is_rejected() {
    let h = harness(settings(Vec::new()));
    h.register(1, "ash").await;
    h.game.progression.grant_xp(1, 50).await.unwrap();

    let err = h.game.progression.grant_xp(1, -5).await.unwrap_err();
    assert!(matches!(err, GameError::InvalidInput(_)));
    assert_eq!(h.record(1).await.xp, 50);
}

#[tokio::test]
async fn test_unknown_player_is_not_found() {
    let h = harness(settings(Vec::new()));
    let err = h.game.progression.grant_xp(404, 10).await.unwrap_err();
    assert!(matches!(err, GameError::NotFound(_)));
}

#[tokio::test]
async fn test_rewards_naming_unknown_species_fail_assembly() {
    let dir = tempfile::tempdir().unwrap();
    let store = SledMemberStore::open(dir.path().join("members")).unwrap();
    let result = Game::assemble(
        Arc::new(store),
        Arc::new(catalog()),
        Arc::new(ManualClock::new(start_time())),
        settings(vec![
            LevelReward::Currency {
                currency: Currency::Pokecoins,
                amount: 50,
            },
            LevelReward::Creature {
                species_id: 999_999,
                shiny: false,
                min_iv_percent: 0.0,
            },
        ]),
    );
    match result {
        Err(GameError::Config(msg)) => assert!(msg.contains("level 2"), "{}", msg),
        Err(other) => panic!("expected a config error, got {}", other),
        Ok(_) => panic!("unknown reward species was accepted"),
    }
}

#[tokio::test]
async fn test_failed_level_reward_does_not_block_later_levels() {
    let (h, store) = flaky_harness(settings(vec![
        LevelReward::Creature {
            species_id: 150,
            shiny: false,
            min_iv_percent: 0.0,
        },
        LevelReward::Currency {
            currency: Currency::Pokecoins,
            amount: 50,
        },
        LevelReward::Currency {
            currency: Currency::Pokecoins,
            amount: 50,
        },
    ]));
    h.register(1, "ash").await;

    store.fail_inserts(1);
    let report = h.game.progression.grant_xp(1, 300).await.unwrap();
    assert_eq!(report.after.level, 3);
    let paid: Vec<u32> = report.grants.iter().map(|g| g.level).collect();
    assert_eq!(paid, vec![2, 3]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].level, 1);
    assert!(report
        .summary_lines()
        .iter()
        .any(|l| l.starts_with("Level 1 reached, but its reward could not be delivered")));

    let record = h.record(1).await;
    assert_eq!(record.xp, 300);
    assert_eq!(record.balance, 100);
    assert!(h.game.store.creatures_of(1).await.unwrap().is_empty());
}
