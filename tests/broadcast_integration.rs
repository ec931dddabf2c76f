//! Broadcast integration tests
//!
//! What a subscriber of a war sees, and in which order.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::*;
use guild_war::broadcast::WarMessage;
use guild_war::core::config::WarConfig;
use guild_war::core::types::TerritoryId;
use guild_war::territory::TerritoryStatus;
use guild_war::war::WarPhase;

const OUTPOST: TerritoryId = TerritoryId(16);

fn kind(message: &WarMessage) -> &'static str {
    match message {
        WarMessage::TerritoryUpdate { .. } => "territory",
        WarMessage::ScoreUpdate { .. } => "score",
        WarMessage::Event { .. } => "event",
        WarMessage::PhaseUpdate { .. } => "phase",
    }
}

#[test]
fn test_capture_message_order() {
    let h = Harness::new(WarConfig::default(), always_succeed());
    let war_id = h.active_war(2);
    let mut sub = h.manager.subscribe(war_id).unwrap();

    h.manager.attack(war_id, red(1), OUTPOST, 200).unwrap();
    let messages = sub.drain();
    assert_eq!(
        messages.iter().map(kind).collect::<Vec<_>>(),
        vec!["territory", "territory", "event", "score"]
    );

    match (&messages[0], &messages[1]) {
        (
            WarMessage::TerritoryUpdate { territory: during, .. },
            WarMessage::TerritoryUpdate { territory: after, .. },
        ) => {
            assert_eq!(during.id, OUTPOST);
            assert_eq!(during.status, TerritoryStatus::Contested);
            assert_eq!(after.status, TerritoryStatus::ControlledByChallenger);
            assert_eq!(after.controller_guild_id, Some(RED));
        }
        other => panic!("unexpected {:?}", other),
    }
    match &messages[3] {
        WarMessage::ScoreUpdate { scores, .. } => assert_eq!(scores[&RED], 30),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_failed_neutral_attack_publishes_no_score() {
    let h = Harness::new(WarConfig::default(), always_fail());
    let war_id = h.active_war(2);
    let mut sub = h.manager.subscribe(war_id).unwrap();

    h.manager.attack(war_id, blue(1), OUTPOST, 200).unwrap();
    let messages = sub.drain();
    assert_eq!(
        messages.iter().map(kind).collect::<Vec<_>>(),
        vec!["territory", "territory", "event"]
    );
    match &messages[1] {
        WarMessage::TerritoryUpdate { territory, .. } => {
            assert_eq!(territory.status, TerritoryStatus::Neutral)
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_rejected_persistence_restores_territory_view() {
    let h = Harness::new(WarConfig::default(), always_succeed());
    let war_id = h.active_war(2);
    let mut sub = h.manager.subscribe(war_id).unwrap();

    h.journal.fail_next(3);
    h.manager.attack(war_id, red(1), OUTPOST, 200).unwrap_err();
    let messages = sub.drain();
    assert_eq!(messages.len(), 2);
    match messages.last() {
        Some(WarMessage::TerritoryUpdate { territory, .. }) => {
            assert_eq!(territory.status, TerritoryStatus::Neutral);
            assert_eq!(territory.controller_guild_id, None);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_every_subscriber_sees_the_same_sequence() {
    let h = Harness::new(WarConfig::default(), always_succeed());
    let war_id = h.active_war(3);
    let mut first = h.manager.subscribe(war_id).unwrap();
    let mut second = h.manager.subscribe(war_id).unwrap();

    h.manager.attack(war_id, red(1), OUTPOST, 200).unwrap();
    h.manager.report_kill(war_id, blue(1), red(2).member_id).unwrap();
    h.manager.report_boss_defeat(war_id, red(3), "Ashen Wyrm").unwrap();

    let a = first.drain();
    let b = second.drain();
    assert!(!a.is_empty());
    assert_eq!(a, b);
    assert!(a.iter().all(|m| m.war_id() == war_id));
}

#[test]
fn test_dropped_subscriber_does_not_block_others() {
    let h = Harness::new(WarConfig::default(), always_succeed());
    let war_id = h.active_war(2);
    let gone = h.manager.subscribe(war_id).unwrap();
    let mut kept = h.manager.subscribe(war_id).unwrap();
    drop(gone);

    h.manager.report_kill(war_id, red(1), blue(1).member_id).unwrap();
    assert_eq!(kept.drain().len(), 2);
    assert_eq!(h.manager.broadcaster().subscriber_count(war_id), 1);
}

#[test]
fn test_concurrent_reports_publish_in_log_order() {
    for _ in 0..50 {
        let h = Harness::new(WarConfig::default(), always_succeed());
        let war_id = h.active_war(MEMBERS);
        let mut sub = h.manager.subscribe(war_id).unwrap();
        let barrier = Arc::new(Barrier::new(MEMBERS as usize));

        let handles: Vec<_> = (1..=MEMBERS)
            .map(|n| {
                let manager = Arc::clone(&h.manager);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..4 {
                        manager.report_kill(war_id, red(n), blue(n).member_id).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let messages = sub.drain();
        let seqs: Vec<u64> = messages
            .iter()
            .filter_map(|m| match m {
                WarMessage::Event { event, .. } => Some(event.seq),
                _ => None,
            })
            .collect();
        assert_eq!(seqs, (0..MEMBERS * 4).collect::<Vec<_>>());

        let red_scores: Vec<u64> = messages
            .iter()
            .filter_map(|m| match m {
                WarMessage::ScoreUpdate { scores, .. } => Some(scores[&RED]),
                _ => None,
            })
            .collect();
        assert_eq!(red_scores.len(), seqs.len());
        assert!(red_scores.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(red_scores.last().copied(), Some(MEMBERS * 4 * 10));

        // Each event is followed by the score that includes it
        for pair in messages.chunks(2) {
            match pair {
                [WarMessage::Event { event, .. }, WarMessage::ScoreUpdate { scores, .. }] => {
                    assert_eq!(scores[&RED], (event.seq + 1) * 10)
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }
}

#[test]
fn test_concurrent_captures_publish_in_log_order() {
    for _ in 0..20 {
        let h = Harness::new(WarConfig::default(), always_succeed());
        let war_id = h.active_war(MEMBERS);
        let mut sub = h.manager.subscribe(war_id).unwrap();
        let barrier = Arc::new(Barrier::new(MEMBERS as usize));

        let handles: Vec<_> = (1..=MEMBERS)
            .map(|n| {
                let manager = Arc::clone(&h.manager);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    manager.attack(war_id, red(n), TerritoryId(n as u32), 200).unwrap();
                    manager.report_kill(war_id, red(n), blue(n).member_id).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut next_seq = 0;
        let mut last_red = 0;
        for message in sub.drain() {
            match message {
                WarMessage::Event { event, .. } => {
                    assert_eq!(event.seq, next_seq);
                    next_seq += 1;
                }
                WarMessage::ScoreUpdate { scores, .. } => {
                    assert!(scores[&RED] >= last_red);
                    last_red = scores[&RED];
                }
                _ => {}
            }
        }
        assert_eq!(next_seq, 2 * MEMBERS);
        assert_eq!(last_red, h.manager.snapshot(war_id).unwrap().war.scores[&RED]);
    }
}

#[tokio::test]
async fn test_phase_updates_then_close_after_archive() {
    let h = Harness::new(WarConfig::default(), always_succeed());
    let war_id = h.preparing_war(2);
    let mut sub = h.manager.subscribe(war_id).unwrap();

    h.clock.advance(DAY);
    h.tick();
    h.manager.report_kill(war_id, red(1), blue(1).member_id).unwrap();
    h.clock.set(h.end_time(war_id));
    h.tick();

    let mut phases = Vec::new();
    let mut winner = None;
    while let Some(message) = sub.recv().await {
        if let WarMessage::PhaseUpdate {
            phase, winner: w, ..
        } = message
        {
            phases.push(phase);
            winner = w;
        }
    }
    assert_eq!(
        phases,
        vec![WarPhase::Active, WarPhase::Concluded, WarPhase::Archived]
    );
    assert_eq!(winner, Some(RED));
    assert_eq!(h.manager.broadcaster().subscriber_count(war_id), 0);
    assert!(h.manager.subscribe(war_id).is_err());
}

#[test]
fn test_messages_serialize_with_type_tag() {
    let h = Harness::new(WarConfig::default(), always_succeed());
    let war_id = h.active_war(2);
    let mut sub = h.manager.subscribe(war_id).unwrap();
    h.manager.attack(war_id, red(1), OUTPOST, 200).unwrap();

    let types: Vec<String> = sub
        .drain()
        .iter()
        .map(|m| {
            let value: serde_json::Value = serde_json::from_str(&m.to_json().unwrap()).unwrap();
            value["type"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(
        types,
        vec!["territory_update", "territory_update", "event", "score_update"]
    );
}
