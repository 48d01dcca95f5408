use super::*;

/// Observable state: every game and player plus the stats record.
fn state_of(dispatcher: &EventDispatcher<InMemoryEntityStore>) -> Vec<Option<Entity>> {
    let store = dispatcher.store();
    let mut state = Vec::new();
    for kind in [EntityKind::Game, EntityKind::Player] {
        for id in store.ids(kind).unwrap() {
            state.push(store.load(kind, &id).unwrap());
        }
    }
    state.push(Some(Entity::PlatformStats(dispatcher.platform_stats().unwrap())));
    state
}

fn assert_round_trip(history: &[EventEnvelope], event: EventEnvelope) {
    let mut dispatcher = in_memory_dispatcher();
    dispatch_all(&mut dispatcher, history);
    let before = state_of(&dispatcher);

    assert!(dispatcher.dispatch(&event).unwrap().is_applied());
    let after_once = state_of(&dispatcher);

    let outcome = dispatcher.dispatch(&event.reverted()).unwrap();
    assert!(
        matches!(outcome, DispatchOutcome::Reverted { .. }),
        "{outcome:?}"
    );
    assert_eq!(state_of(&dispatcher), before);

    assert!(dispatcher.dispatch(&event).unwrap().is_applied());
    assert_eq!(state_of(&dispatcher), after_once);
}

#[test]
fn create_round_trips_through_revert() {
    let alice = player(0xa1);
    assert_round_trip(&[], created(1, alice, 1, wad(2), 25));
}

#[test]
fn create_of_returning_player_round_trips() {
    let alice = player(0xa1);
    assert_round_trip(
        &[created(1, alice, 1, wad(2), 25), cashed_out(2, alice, 1, wad(1))],
        created(3, alice, 2, wad(5), 49),
    );
}

#[test]
fn commit_and_resolve_round_trip() {
    let alice = player(0xa1);
    assert_round_trip(
        &[created(1, alice, 1, wad(2), 25)],
        committed(2, alice, 1, 4),
    );
    assert_round_trip(
        &[created(1, alice, 1, wad(2), 25), committed(2, alice, 1, 4)],
        resolved(3, alice, 1, false, wad_fraction(1, 250_000_000_000_000_000)),
    );
}

#[test]
fn cash_out_round_trips() {
    let alice = player(0xa1);
    assert_round_trip(
        &[created(1, alice, 1, wad(2), 25), committed(2, alice, 1, 4)],
        cashed_out(3, alice, 1, wad(3)),
    );
}

#[test]
fn revert_of_create_removes_game_and_counts() {
    let mut dispatcher = in_memory_dispatcher();
    let alice = player(0xa1);
    let create = created(1, alice, 1, wad(2), 25);
    dispatcher.dispatch(&create).unwrap();
    dispatcher.dispatch(&create.reverted()).unwrap();

    assert_eq!(load_game(&dispatcher, alice, 1), None);
    assert_eq!(dispatcher.store().load_player(&alice).unwrap(), None);
    let stats = dispatcher.platform_stats().unwrap();
    assert_eq!(stats.total_games, 0);
    assert_eq!(stats.total_users, 0);
    assert_eq!(stats.total_stakers, 0);
    assert_eq!(stats.total_staked, U256::ZERO);
    assert_eq!(
        dispatcher
            .store()
            .load_applied_event(&create.event_id())
            .unwrap(),
        None
    );
}

#[test]
fn reorg_unwinds_newest_first() {
    let mut dispatcher = in_memory_dispatcher();
    let alice = player(0xa1);
    let history = [
        created(1, alice, 1, wad(2), 25),
        committed(2, alice, 1, 7),
        resolved(3, alice, 1, false, WAD),
        cashed_out(4, alice, 1, wad(2)),
    ];
    dispatch_all(&mut dispatcher, &history);

    let out_of_order = dispatcher.dispatch(&history[1].reverted()).unwrap();
    let DispatchOutcome::Rejected(rejected) = out_of_order else {
        panic!("expected out-of-order rejection");
    };
    assert!(matches!(
        rejected.error,
        IndexerError::ProtocolViolation {
            violation: ProtocolViolation::RevertOutOfOrder { .. },
            ..
        }
    ));

    for envelope in history[1..].iter().rev() {
        let outcome = dispatcher.dispatch(&envelope.reverted()).unwrap();
        assert!(matches!(outcome, DispatchOutcome::Reverted { .. }));
    }
    let game = load_game(&dispatcher, alice, 1).unwrap();
    assert_eq!(game.phase, GamePhase::Created);
    assert!(game.revealed_cells.is_empty());
    assert_eq!(game.last_event_id, Some(history[0].event_id()));

    let stats = dispatcher.platform_stats().unwrap();
    assert_eq!(stats.total_staked, wad(2));
    assert_eq!(stats.total_stakers, 1);
    assert_eq!(stats.updated_at, history[0].meta.block_timestamp);
}

#[test]
fn revert_of_unknown_event_is_skipped() {
    let mut dispatcher = in_memory_dispatcher();
    let alice = player(0xa1);
    let outcome = dispatcher
        .dispatch(&created(1, alice, 1, wad(2), 25).reverted())
        .unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Skipped {
            event_id: created(1, alice, 1, wad(2), 25).event_id(),
            reason: SkipReason::NotApplied,
        }
    );
    assert!(dispatcher.rejected_events().is_empty());
}

#[test]
fn revert_with_different_payload_is_rejected() {
    let mut dispatcher = in_memory_dispatcher();
    let alice = player(0xa1);
    let create = created(1, alice, 1, wad(2), 25);
    dispatcher.dispatch(&create).unwrap();

    let mut forged = create.reverted();
    if let MinesEvent::GameCreated { stake, .. } = &mut forged.event {
        *stake = wad(9);
    }
    let outcome = dispatcher.dispatch(&forged).unwrap();
    assert!(outcome.is_rejected());
    assert!(load_game(&dispatcher, alice, 1).is_some());
    assert_eq!(dispatcher.platform_stats().unwrap().total_staked, wad(2));
}

#[test]
fn revert_after_other_game_touched_stats_stamps_revert_time() {
    let mut dispatcher = in_memory_dispatcher();
    let alice = player(0xa1);
    let bob = player(0xb0);
    let alice_create = created(1, alice, 1, wad(2), 25);
    dispatch_all(
        &mut dispatcher,
        &[alice_create.clone(), created(2, bob, 1, wad(1), 25)],
    );
    dispatcher.dispatch(&alice_create.reverted()).unwrap();

    let stats = dispatcher.platform_stats().unwrap();
    assert_eq!(stats.total_games, 1);
    assert_eq!(stats.total_users, 1);
    assert_eq!(stats.total_staked, wad(1));
    assert_eq!(stats.updated_at, alice_create.meta.block_timestamp);
}

#[test]
fn stake_reverts_unwind_in_player_order_across_games() {
    let mut dispatcher = in_memory_dispatcher();
    let alice = player(0xa1);
    let first = created(1, alice, 1, wad(2), 25);
    let second = created(2, alice, 2, wad(3), 25);
    dispatch_all(&mut dispatcher, &[first.clone(), second.clone()]);
    let before = dispatcher.platform_stats().unwrap();

    let outcome = dispatcher.dispatch(&first.reverted()).unwrap();
    let DispatchOutcome::Rejected(rejected) = outcome else {
        panic!("older game's create reverted while a newer one stands");
    };
    assert!(matches!(
        rejected.error,
        IndexerError::ProtocolViolation {
            violation: ProtocolViolation::RevertOutOfOrder { ref latest, .. },
            ..
        } if *latest == Some(second.event_id())
    ));
    assert_eq!(dispatcher.platform_stats().unwrap(), before);
    assert!(load_game(&dispatcher, alice, 1).is_some());

    let cash_out = cashed_out(3, alice, 2, wad(4));
    assert!(dispatcher.dispatch(&cash_out).unwrap().is_applied());
    let stats = dispatcher.platform_stats().unwrap();
    assert_eq!(stats.total_users, 1);
    assert_eq!(stats.total_stakers, 1);
    assert_eq!(stats.total_staked, wad(2));

    for envelope in [&cash_out, &second, &first] {
        let outcome = dispatcher.dispatch(&envelope.reverted()).unwrap();
        assert!(
            matches!(outcome, DispatchOutcome::Reverted { .. }),
            "{outcome:?}"
        );
    }
    let stats = dispatcher.platform_stats().unwrap();
    assert_eq!(stats.total_games, 0);
    assert_eq!(stats.total_users, 0);
    assert_eq!(stats.total_stakers, 0);
    assert_eq!(stats.total_staked, U256::ZERO);
    assert_eq!(dispatcher.store().load_player(&alice).unwrap(), None);
}

#[test]
fn player_ledger_top_is_restored_by_revert() {
    let mut dispatcher = in_memory_dispatcher();
    let alice = player(0xa1);
    let first = created(1, alice, 1, wad(2), 25);
    let second = created(2, alice, 2, wad(3), 25);
    dispatch_all(&mut dispatcher, &[first.clone(), second.clone()]);
    let ledger_top = |dispatcher: &EventDispatcher<InMemoryEntityStore>| {
        dispatcher
            .store()
            .load_player(&alice)
            .unwrap()
            .and_then(|record| record.last_event_id)
    };
    assert_eq!(ledger_top(&dispatcher), Some(second.event_id()));

    dispatcher.dispatch(&second.reverted()).unwrap();
    assert_eq!(ledger_top(&dispatcher), Some(first.event_id()));
    let stats = dispatcher.platform_stats().unwrap();
    assert_eq!(stats.total_users, 1);
    assert_eq!(stats.total_stakers, 1);
    assert_eq!(stats.total_staked, wad(2));
}

#[test]
fn compacted_events_stay_duplicates_but_cannot_be_reverted() {
    let mut dispatcher = in_memory_dispatcher();
    let alice = player(0xa1);
    let create = created(1, alice, 1, wad(2), 25);
    let commit = committed(40, alice, 1, 4);
    dispatch_all(&mut dispatcher, &[create.clone(), commit.clone()]);

    let compacted = dispatcher.compact_journal(70, 64, |_| true).unwrap();
    assert_eq!(compacted, 1);
    let record = dispatcher
        .store()
        .load_applied_event(&create.event_id())
        .unwrap()
        .expect("record kept");
    assert!(record.is_final());
    assert!(!dispatcher
        .store()
        .load_applied_event(&commit.event_id())
        .unwrap()
        .unwrap()
        .is_final());
    assert_eq!(dispatcher.compact_journal(70, 64, |_| true).unwrap(), 0);

    let duplicate = dispatcher.dispatch(&create).unwrap();
    assert!(duplicate.is_rejected());

    assert!(matches!(
        dispatcher.dispatch(&commit.reverted()).unwrap(),
        DispatchOutcome::Reverted { .. }
    ));
    let DispatchOutcome::Rejected(rejected) = dispatcher.dispatch(&create.reverted()).unwrap()
    else {
        panic!("final event reverted");
    };
    assert!(matches!(
        rejected.error,
        IndexerError::ProtocolViolation {
            violation: ProtocolViolation::RevertOfFinalEvent { .. },
            ..
        }
    ));
    assert!(load_game(&dispatcher, alice, 1).is_some());
    assert_eq!(dispatcher.platform_stats().unwrap().total_games, 1);
}

#[test]
fn compaction_skips_games_owned_elsewhere() {
    let mut dispatcher = in_memory_dispatcher();
    let alice = player(0xa1);
    let bob = player(0xb0);
    dispatch_all(
        &mut dispatcher,
        &[created(1, alice, 1, wad(2), 25), created(2, bob, 1, wad(1), 25)],
    );

    let compacted = dispatcher
        .compact_journal(100, 10, |key| key.player == alice)
        .unwrap();
    assert_eq!(compacted, 1);
    let bob_record = dispatcher
        .store()
        .load_applied_event(&created(2, bob, 1, wad(1), 25).event_id())
        .unwrap()
        .unwrap();
    assert!(!bob_record.is_final());
    assert_eq!(dispatcher.compact_journal(100, 0, |_| true).unwrap(), 0);
}
