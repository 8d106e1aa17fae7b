//! Epoch ticks: top-up, decay, edge collapse, queue retention, and
//! claim-time decay.

use ember_core::config::EngineConfig;
use ember_core::error::TransferError;
use ember_tests::helpers::*;

#[test]
fn own_points_are_replenished() {
    let ledger = new_ledger();
    create_accounts(&ledger, &["alice", "bob"], 0);
    ledger.assign(&key("alice"), &key("bob"), 20, 1).unwrap();
    ledger.assign(&key("bob"), &key("alice"), 150, 1).unwrap();
    assert_eq!(own_points(&ledger, "alice"), 980);
    assert_eq!(own_points(&ledger, "bob"), 852);

    ledger.epoch_tick(1).unwrap();
    assert_eq!(own_points(&ledger, "alice"), 1000);
    assert_eq!(own_points(&ledger, "bob"), 1000);
    let alice = ledger.account(&key("alice")).unwrap().unwrap();
    assert_eq!(alice.last_refresh_epoch, 1);
    assert_eq!(ledger.current_epoch().unwrap(), 1);
}

#[test]
fn ticks_work_in_small_batches() {
    let config = EngineConfig {
        epoch_batch_size: 7,
        ..EngineConfig::default()
    };
    let ledger = new_ledger_with(config);
    let names: Vec<String> = (0..100).map(|i| format!("user{i:03}")).collect();
    for name in &names {
        ledger.create_account(key(name), 0, true).unwrap();
    }
    // a ring of assignments so everyone but user000 spent 50
    for i in 0..99 {
        ledger.assign(&key(&names[i + 1]), &key(&names[i]), 50, 0).unwrap();
    }
    assert_eq!(own_points(&ledger, "user000"), 1000);
    for name in &names[1..] {
        assert_eq!(own_points(&ledger, name), 950);
    }

    ledger.epoch_tick(1).unwrap();
    for name in &names {
        assert_eq!(own_points(&ledger, name), 1000);
    }
    assert_eq!(ledger.current_epoch().unwrap(), 1);
}

#[test]
fn held_points_decay_and_zero_edges_vanish() {
    let ledger = new_ledger();
    create_accounts(&ledger, &["alice", "bob", "charlie", "drew"], 0);
    ledger.assign(&key("alice"), &key("bob"), 20, 1).unwrap();
    ledger.assign(&key("alice"), &key("charlie"), 40, 1).unwrap();
    ledger.assign(&key("bob"), &key("charlie"), 100, 1).unwrap();
    ledger.assign(&key("drew"), &key("alice"), 1, 1).unwrap();

    assert_eq!(assigned(&ledger, "alice"), 1);
    assert_eq!(assigned(&ledger, "bob"), 19);
    assert_eq!(assigned(&ledger, "charlie"), 139);

    ledger.epoch_tick(1).unwrap();
    // alice's single point floored to zero and the edge was removed
    assert!(ledger.attributions(&key("alice")).unwrap().is_empty());
    assert_eq!(assigned(&ledger, "bob"), 17);
    assert_eq!(assigned(&ledger, "charlie"), 124);

    ledger.epoch_tick(2).unwrap();
    assert_eq!(assigned(&ledger, "bob"), 15);
    assert_eq!(assigned(&ledger, "charlie"), 111);

    for name in ["alice", "bob", "charlie", "drew"] {
        let account = ledger.account(&key(name)).unwrap().unwrap();
        assert_eq!(account.last_refresh_epoch, 2);
    }
    assert_eq!(ledger.current_epoch().unwrap(), 2);
}

#[test]
fn every_tick_leaves_an_epoch_record() {
    let ledger = new_ledger();
    create_accounts(&ledger, &["alice", "bob"], 0);
    ledger.assign(&key("alice"), &key("bob"), 20, 1).unwrap();
    ledger.epoch_tick(1).unwrap();
    ledger.epoch_tick(2).unwrap();
    ledger.epoch_tick(7).unwrap();
    assert_eq!(ledger.epoch_records().unwrap(), vec![1, 2, 7]);
    assert_eq!(ledger.current_epoch().unwrap(), 7);
}

#[test]
fn skipping_epochs_decays_once_per_tick() {
    let ledger = new_ledger();
    create_accounts(&ledger, &["alice", "bob"], 0);
    ledger.assign(&key("alice"), &key("bob"), 100, 1).unwrap();
    assert_eq!(assigned(&ledger, "bob"), 99);
    // jumping straight to epoch 5 is still a single decay step
    ledger.epoch_tick(5).unwrap();
    assert_eq!(assigned(&ledger, "bob"), 89);
}

#[test]
fn long_tail_collapses_into_the_others_bucket() {
    let config = EngineConfig {
        keep_top_edges: 2,
        ..EngineConfig::default()
    };
    let ledger = new_ledger_with(config);
    create_accounts(&ledger, &["a", "b", "c", "d", "hub"], 0);
    ledger.assign(&key("a"), &key("hub"), 400, 1).unwrap();
    ledger.assign(&key("b"), &key("hub"), 300, 1).unwrap();
    ledger.assign(&key("c"), &key("hub"), 200, 1).unwrap();
    ledger.assign(&key("d"), &key("hub"), 100, 1).unwrap();
    // taxed sends: hub holds 396/297/198/99
    assert_eq!(assigned(&ledger, "hub"), 990);

    ledger.epoch_tick(1).unwrap();
    // top two edges survive (decayed); the 198+99 tail folded into the
    // others bucket and decayed with it: floor(297 * 0.9) = 267
    assert_eq!(edge(&ledger, "hub", "a"), Some((356, 1)));
    assert_eq!(edge(&ledger, "hub", "b"), Some((267, 1)));
    assert_eq!(edge(&ledger, "hub", "c"), None);
    assert_eq!(edge(&ledger, "hub", "d"), None);
    let summary = ledger.tally(&key("hub")).unwrap().unwrap();
    assert_eq!(summary.others_points, 267);
    assert_eq!(summary.own_points, 1000);
}

#[test]
fn others_bucket_keeps_decaying() {
    let config = EngineConfig {
        keep_top_edges: 0,
        ..EngineConfig::default()
    };
    let ledger = new_ledger_with(config);
    create_accounts(&ledger, &["a", "hub"], 0);
    ledger.assign(&key("a"), &key("hub"), 400, 1).unwrap();
    ledger.epoch_tick(1).unwrap();
    let summary = ledger.tally(&key("hub")).unwrap().unwrap();
    assert_eq!(summary.assigned_points, 0);
    assert_eq!(summary.others_points, 356); // floor(396 * 0.9)
    ledger.epoch_tick(2).unwrap();
    let summary = ledger.tally(&key("hub")).unwrap().unwrap();
    assert_eq!(summary.others_points, 320); // floor(356 * 0.9)
}

// --- holding queue across ticks ---

#[test]
fn queued_bundles_do_not_decay_per_epoch() {
    let ledger = new_ledger();
    create_accounts(&ledger, &["alice", "bob", "charlie"], 0);
    ledger.assign(&key("alice"), &key("bob"), 100, 1).unwrap();
    ledger.assign(&key("bob"), &key("charlie"), 150, 1).unwrap();
    ledger.create_account(key("anti"), 1, false).unwrap();

    ledger.assign(&key("charlie"), &key("anti"), 100, 1).unwrap();
    let before = ledger.queued_bundles(&key("anti"));
    let amounts: Vec<(&str, u64)> = before[0]
        .entries
        .iter()
        .map(|e| (e.contributor.as_str(), e.amount))
        .collect();
    assert_eq!(amounts, vec![("alice", 1), ("bob", 10), ("charlie", 87)]);

    ledger.epoch_tick(2).unwrap();
    assert_eq!(ledger.queued_bundles(&key("anti")), before);
}

#[test]
fn claims_decay_linearly_by_wait_time() {
    let ledger = new_ledger();
    create_accounts(&ledger, &["alice", "bob", "charlie"], 0);
    ledger.assign(&key("alice"), &key("bob"), 100, 1).unwrap();
    ledger.assign(&key("bob"), &key("charlie"), 150, 1).unwrap();
    ledger.create_account(key("anti"), 1, false).unwrap();

    ledger.assign(&key("charlie"), &key("anti"), 100, 1).unwrap();
    ledger.epoch_tick(2).unwrap();
    ledger.assign(&key("charlie"), &key("anti"), 150, 2).unwrap();
    ledger.epoch_tick(3).unwrap();

    assert_eq!(ledger.queued_bundles(&key("anti")).len(), 2);

    // claiming a non-existent index fails
    assert_eq!(
        ledger.claim(&key("anti"), 3, 3),
        Err(TransferError::DeductFailed)
    );

    // the epoch-2 bundle {alice 1, bob 14, charlie 133} claimed at
    // epoch 4: two epochs of wait, 20% gone, floors applied
    ledger.claim(&key("anti"), 1, 4).unwrap();
    assert_eq!(edge(&ledger, "anti", "alice"), None); // floor(0.8) = 0
    assert_eq!(edge(&ledger, "anti", "bob"), Some((11, 4)));
    assert_eq!(edge(&ledger, "anti", "charlie"), Some((106, 4)));
    assert_eq!(ledger.queued_bundles(&key("anti")).len(), 1);

    // the epoch-1 bundle {alice 1, bob 10, charlie 87} claimed at
    // epoch 8: seven epochs of wait leaves 30%
    ledger.claim(&key("anti"), 0, 8).unwrap();
    assert_eq!(edge(&ledger, "anti", "bob"), Some((14, 8))); // 11 + floor(3.0)
    assert_eq!(edge(&ledger, "anti", "charlie"), Some((132, 8))); // 106 + floor(26.1)
    assert!(ledger.queued_bundles(&key("anti")).is_empty());
}

#[test]
fn fully_decayed_claims_credit_nothing() {
    let ledger = new_ledger();
    create_accounts(&ledger, &["alice", "bob"], 0);
    ledger.create_account(key("anti"), 0, false).unwrap();
    ledger.assign(&key("alice"), &key("anti"), 100, 1).unwrap();

    // ten epochs of wait reaches 100% decay; the bundle is consumed
    // without crediting
    ledger.claim(&key("anti"), 0, 11).unwrap();
    assert!(ledger.attributions(&key("anti")).unwrap().is_empty());
    assert!(ledger.queued_bundles(&key("anti")).is_empty());
}

#[test]
fn stale_bundles_are_pruned_after_the_horizon() {
    let ledger = new_ledger();
    create_accounts(&ledger, &["alice", "bob", "charlie"], 0);
    ledger.assign(&key("alice"), &key("bob"), 100, 1).unwrap();
    ledger.assign(&key("bob"), &key("charlie"), 150, 1).unwrap();
    ledger.create_account(key("anti"), 1, false).unwrap();

    ledger.assign(&key("charlie"), &key("anti"), 100, 1).unwrap();
    ledger.epoch_tick(2).unwrap();
    ledger.assign(&key("charlie"), &key("anti"), 150, 2).unwrap();
    ledger.epoch_tick(3).unwrap();
    assert_eq!(ledger.queued_bundles(&key("anti")).len(), 2);

    // age 10 is still within the horizon
    ledger.epoch_tick(11).unwrap();
    assert_eq!(ledger.queued_bundles(&key("anti")).len(), 2);
    // age 11 is not
    ledger.epoch_tick(12).unwrap();
    let remaining = ledger.queued_bundles(&key("anti"));
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].epoch, 2);
    ledger.epoch_tick(13).unwrap();
    assert!(ledger.queued_bundles(&key("anti")).is_empty());
}

#[test]
fn advance_epoch_ticks_the_next_one() {
    let ledger = new_ledger();
    create_accounts(&ledger, &["alice"], 0);
    assert_eq!(ledger.advance_epoch().unwrap(), 1);
    assert_eq!(ledger.advance_epoch().unwrap(), 2);
    assert_eq!(ledger.epoch_records().unwrap(), vec![1, 2]);
}
